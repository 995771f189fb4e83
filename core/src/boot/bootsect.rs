//! FAT boot sector recognition and stamping.
//!
//! A [`BootSector`] can only be obtained through [`BootSector::validate`], so
//! every buffer that gets stamped has already been recognized as FAT12, FAT16
//! or FAT32. Stamping replaces the jump instruction and the boot code; the
//! OEM name, the BIOS parameter block and the trailing signature stay as they
//! were on disk.

use core::fmt;

use super::{get_u16, get_u32};
use crate::SECTOR_SIZE;

/// Length of the x86 jump at the start of the sector.
pub const JUMP_LEN: usize = 3;
/// First byte of boot code. FAT32's extended BPB ends here, so this offset is
/// safe for every FAT variant.
pub const CODE_OFFSET: usize = 90;
/// End of the boot code (the 0x55AA signature follows).
pub const CODE_END: usize = 510;

// BPB field offsets
const BPB_BYTES_PER_SECTOR: usize = 11;
const BPB_SECTORS_PER_CLUSTER: usize = 13;
const BPB_RESERVED_SECTORS: usize = 14;
const BPB_NUM_FATS: usize = 16;
const BPB_ROOT_ENTRIES: usize = 17;
const BPB_TOTAL_SECTORS_16: usize = 19;
const BPB_MEDIA: usize = 21;
const BPB_FAT_SIZE_16: usize = 22;
const BPB_TOTAL_SECTORS_32: usize = 32;

// FAT12/16 extended BPB
const BS16_BOOT_SIGNATURE: usize = 38;
const BS16_FS_TYPE: usize = 54;

// FAT32 extended BPB
const BS32_FAT_SIZE: usize = 36;
const BS32_ROOT_CLUSTER: usize = 44;
const BS32_FS_INFO: usize = 48;
const BS32_BOOT_SIGNATURE: usize = 66;
const BS32_FS_TYPE: usize = 82;

const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatKind {
    Fat12,
    Fat16,
    Fat32,
}

impl FatKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fat12 => "FAT12",
            Self::Fat16 => "FAT16",
            Self::Fat32 => "FAT32",
        }
    }
}

impl fmt::Display for FatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootSectorError {
    InvalidMedia(u8),
    UnsupportedSectorSize(u16),
    ImpossibleSectorSize(u16),
    ImpossibleClusterSize(u8),
    NegativeDataSectors,
    ZeroFatSectors,
    Fat12TooManyClusters,
    Fat16TooFewClusters,
    ClaimsFat32,
    UnsupportedType([u8; 8]),
    NotFat,
}

impl fmt::Display for BootSectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMedia(_) => write!(f, "invalid media signature (not a FAT volume?)"),
            Self::UnsupportedSectorSize(size) => write!(f, "unsupported sector size {}", size),
            Self::ImpossibleSectorSize(size) => write!(f, "impossible sector size {}", size),
            Self::ImpossibleClusterSize(_) => write!(f, "impossible cluster size on a FAT volume"),
            Self::NegativeDataSectors => {
                write!(f, "negative number of data sectors on a FAT volume")
            }
            Self::ZeroFatSectors => write!(f, "zero FAT sectors (FAT12/16)"),
            Self::Fat12TooManyClusters => write!(f, "more than 4084 clusters but claims FAT12"),
            Self::Fat16TooFewClusters => write!(f, "less than 4084 clusters but claims FAT16"),
            Self::ClaimsFat32 => write!(f, "less than 65525 clusters but claims FAT32"),
            Self::UnsupportedType(name) => write!(
                f,
                "filesystem type \"{}\" not supported",
                String::from_utf8_lossy(name)
            ),
            Self::NotFat => write!(f, "this doesn't look like a valid FAT filesystem"),
        }
    }
}

impl std::error::Error for BootSectorError {}

/// BIOS parameter block fields the installer and the FAT backend care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub total_sectors: u32,
    pub media: u8,
    /// Sectors per FAT copy (16-bit field, or the FAT32 one when that is zero)
    pub fat_size: u32,
    /// FAT32 only
    pub root_cluster: u32,
    /// FAT32 only
    pub fs_info_sector: u16,
}

impl Bpb {
    pub fn parse(bs: &[u8; SECTOR_SIZE]) -> Self {
        let total_16 = get_u16(bs, BPB_TOTAL_SECTORS_16) as u32;
        let fat_16 = get_u16(bs, BPB_FAT_SIZE_16) as u32;
        Self {
            bytes_per_sector: get_u16(bs, BPB_BYTES_PER_SECTOR),
            sectors_per_cluster: bs[BPB_SECTORS_PER_CLUSTER],
            reserved_sectors: get_u16(bs, BPB_RESERVED_SECTORS),
            num_fats: bs[BPB_NUM_FATS],
            root_entries: get_u16(bs, BPB_ROOT_ENTRIES),
            total_sectors: if total_16 != 0 {
                total_16
            } else {
                get_u32(bs, BPB_TOTAL_SECTORS_32)
            },
            media: bs[BPB_MEDIA],
            fat_size: if fat_16 != 0 {
                fat_16
            } else {
                get_u32(bs, BS32_FAT_SIZE)
            },
            root_cluster: get_u32(bs, BS32_ROOT_CLUSTER),
            fs_info_sector: get_u16(bs, BS32_FS_INFO),
        }
    }

    /// Sectors taken by the fixed root directory (zero on FAT32).
    pub fn root_dir_sectors(&self) -> u32 {
        let bytes = self.root_entries as u32 * 32;
        let sector = self.bytes_per_sector.max(1) as u32;
        (bytes + sector - 1) / sector
    }

    /// First sector of the fixed root directory region.
    pub fn root_dir_start(&self) -> u64 {
        self.reserved_sectors as u64 + self.num_fats as u64 * self.fat_size as u64
    }

    pub fn first_data_sector(&self) -> u64 {
        self.root_dir_start() + self.root_dir_sectors() as u64
    }

    /// Sectors available for clusters; negative on a corrupt BPB.
    pub fn data_sectors(&self) -> i64 {
        self.total_sectors as i64 - self.first_data_sector() as i64
    }

    pub fn cluster_count(&self) -> u64 {
        match self.data_sectors() {
            n if n > 0 && self.sectors_per_cluster > 0 => {
                n as u64 / self.sectors_per_cluster as u64
            }
            _ => 0,
        }
    }
}

/// A boot sector that passed validation.
#[derive(Clone)]
pub struct BootSector {
    bytes: [u8; SECTOR_SIZE],
    kind: FatKind,
    bpb: Bpb,
}

impl BootSector {
    /// Recognize a FAT boot sector.
    pub fn validate(bytes: [u8; SECTOR_SIZE]) -> Result<Self, BootSectorError> {
        let media = bytes[BPB_MEDIA];
        if media != 0xF0 && media < 0xF8 {
            return Err(BootSectorError::InvalidMedia(media));
        }

        let bpb = Bpb::parse(&bytes);
        match bpb.bytes_per_sector {
            512 => {}
            size if (512..=4096).contains(&size) && size.is_power_of_two() => {
                return Err(BootSectorError::UnsupportedSectorSize(size))
            }
            size => return Err(BootSectorError::ImpossibleSectorSize(size)),
        }

        let kind = Self::check_fat(&bytes, &bpb)?;
        Ok(Self { bytes, kind, bpb })
    }

    fn check_fat(bytes: &[u8; SECTOR_SIZE], bpb: &Bpb) -> Result<FatKind, BootSectorError> {
        let spc = bpb.sectors_per_cluster;
        if spc == 0 || !spc.is_power_of_two() {
            return Err(BootSectorError::ImpossibleClusterSize(spc));
        }

        if bpb.data_sectors() < 0 {
            return Err(BootSectorError::NegativeDataSectors);
        }
        let clusters = bpb.cluster_count();

        if clusters < 0xFFF5 {
            if get_u16(bytes, BPB_FAT_SIZE_16) == 0 {
                return Err(BootSectorError::ZeroFatSectors);
            }

            let mut kind = if clusters < 0xFF5 {
                FatKind::Fat12
            } else {
                FatKind::Fat16
            };

            if bytes[BS16_BOOT_SIGNATURE] == EXTENDED_BOOT_SIGNATURE {
                let mut name = [0u8; 8];
                name.copy_from_slice(&bytes[BS16_FS_TYPE..BS16_FS_TYPE + 8]);
                match &name {
                    b"FAT12   " if clusters >= 0xFF5 => {
                        return Err(BootSectorError::Fat12TooManyClusters)
                    }
                    b"FAT12   " => kind = FatKind::Fat12,
                    b"FAT16   " if clusters < 0xFF5 => {
                        return Err(BootSectorError::Fat16TooFewClusters)
                    }
                    b"FAT16   " => kind = FatKind::Fat16,
                    b"FAT32   " => return Err(BootSectorError::ClaimsFat32),
                    b"FAT     " => {}
                    _ => return Err(BootSectorError::UnsupportedType(name)),
                }
            }
            Ok(kind)
        } else if clusters < 0x0FFF_FFF5 {
            if bytes[BS32_BOOT_SIGNATURE] != EXTENDED_BOOT_SIGNATURE
                || &bytes[BS32_FS_TYPE..BS32_FS_TYPE + 8] != b"FAT32   "
            {
                return Err(BootSectorError::NotFat);
            }
            Ok(FatKind::Fat32)
        } else {
            Err(BootSectorError::NotFat)
        }
    }

    pub fn kind(&self) -> FatKind {
        self.kind
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.bytes
    }

    /// Replace the jump and boot code with the loader's entry stub.
    pub fn stamp(&mut self, stub: &[u8; SECTOR_SIZE]) {
        self.bytes[..JUMP_LEN].copy_from_slice(&stub[..JUMP_LEN]);
        self.bytes[CODE_OFFSET..CODE_END].copy_from_slice(&stub[CODE_OFFSET..CODE_END]);
    }
}

impl fmt::Debug for BootSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootSector")
            .field("kind", &self.kind)
            .field("bpb", &self.bpb)
            .finish()
    }
}
