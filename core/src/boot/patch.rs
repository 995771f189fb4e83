//! Loader self-location patching.
//!
//! At boot the loader has no filesystem driver, so it must be told where its
//! own sectors are. The loader image carries a patch area (found by its magic
//! number) and an extended patch area that points at the fields to fill in:
//!
//! ```text
//! patch area                      extended patch area (offsets into the image
//! +0  magic        0x3eb202fe                          or the boot stub)
//! +4  instance                    +0  adv pointer table
//! +8  data sectors                +2  directory field, +4 its length
//! +10 adv sectors                 +6  subvolume field, +8 its length
//! +12 dwords                      +10 sector extent table, +12 entries
//! +16 checksum                    +14 boot stub: first sector ptr (low)
//! +20 max transfer                +16 boot stub: first sector ptr (high)
//! +22 extended area offset        +18 boot stub: RAID patch
//! ```
//!
//! Patching is pure: the same image, chain, directory and flags always give
//! the same bytes.

use bitflags::bitflags;
use core::fmt;

use super::adv::ADV_SIZE;
use super::{get_u16, get_u32};
use crate::SECTOR_SIZE;

pub const LDLINUX_MAGIC: u32 = 0x3eb2_02fe;

/// Where the loader puts its second sector in memory.
const LOAD_ADDRESS: u32 = 0x8000 + SECTOR_SIZE as u32;
/// `int 18h`: hand control back to the BIOS instead of hanging
const RAID_PATCH: u16 = 0x18CD;

const PA_DATA_SECTORS: usize = 8;
const PA_ADV_SECTORS: usize = 10;
const PA_DWORDS: usize = 12;
const PA_CHECKSUM: usize = 16;
const PA_MAX_TRANSFER: usize = 20;
const PA_EPA_OFFSET: usize = 22;
const PA_LEN: usize = 24;

const EPA_ADV_PTR: usize = 0;
const EPA_DIR: usize = 2;
const EPA_DIR_LEN: usize = 4;
const EPA_SECPTR: usize = 10;
const EPA_SECPTR_COUNT: usize = 12;
const EPA_SECT1PTR0: usize = 14;
const EPA_SECT1PTR1: usize = 16;
const EPA_RAID_PATCH: usize = 18;
const EPA_LEN: usize = 20;

/// Packed on-disk extent: u64 LBA followed by u16 length.
const EXTENT_SIZE: usize = 10;

bitflags! {
    /// Compatibility toggles baked into the loader.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PatchFlags: u8 {
        /// Read one sector at a time at boot.
        const STUPID = 1 << 0;
        /// On boot failure, return to the BIOS so it can try the next disk.
        const RAID = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The resolved chain covers fewer sectors than the loader file needs.
    ChainTooShort { needed: usize, found: usize },
    /// No patch area magic in the loader image.
    NoPatchArea,
    /// A field of the patch area points outside the image or boot stub.
    FieldOutOfRange { field: &'static str, offset: usize },
    /// More extents than the loader has room for.
    ExtentOverflow { needed: usize, capacity: usize },
    /// Install directory does not fit the loader's directory field.
    DirectoryTooLong { len: usize, capacity: usize },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChainTooShort { needed, found } => write!(
                f,
                "sector chain too short: loader needs {} sectors, found {}",
                needed, found
            ),
            Self::NoPatchArea => write!(f, "loader image has no patch area"),
            Self::FieldOutOfRange { field, offset } => {
                write!(f, "{} at offset {:#x} is out of range", field, offset)
            }
            Self::ExtentOverflow { needed, capacity } => write!(
                f,
                "insufficient extent space: {} extents, room for {}",
                needed, capacity
            ),
            Self::DirectoryTooLong { len, capacity } => write!(
                f,
                "subdirectory path too long ({} bytes, room for {})",
                len, capacity
            ),
        }
    }
}

impl std::error::Error for PatchError {}

/// Everything the patch depends on.
#[derive(Debug, Clone, Copy)]
pub struct PatchInput<'a> {
    /// Primary loader image as shipped
    pub image: &'a [u8],
    /// Boot sector template that jumps into the loader
    pub boot_stub: &'a [u8; SECTOR_SIZE],
    /// File content that follows the image on disk (the ADV)
    pub trailer: &'a [u8],
    /// Absolute sectors backing the loader file, in file order
    pub chain: &'a [u64],
    pub directory: Option<&'a str>,
    pub flags: PatchFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    /// Leading sectors of the loader file, patched
    pub bytes: Vec<u8>,
    pub sector_count: usize,
    /// Boot stub with the first-sector pointer filled in
    pub boot_stub: [u8; SECTOR_SIZE],
}

/// One run of contiguous sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lba: u64,
    pub len: u16,
}

/// Sectors the loader file occupies: the image plus both ADV slots.
pub fn needed_sectors(image_len: usize) -> usize {
    (image_len + 2 * ADV_SIZE + SECTOR_SIZE - 1) / SECTOR_SIZE
}

/// Compute the patched leading sectors of the loader file.
pub fn patch(input: &PatchInput<'_>) -> Result<Patched, PatchError> {
    let needed = needed_sectors(input.image.len());
    if input.chain.len() < needed {
        return Err(PatchError::ChainTooShort {
            needed,
            found: input.chain.len(),
        });
    }
    let chain = &input.chain[..needed];

    let mut image = input.image.to_vec();
    let pa = find_patch_area(&image).ok_or(PatchError::NoPatchArea)?;
    if pa + PA_LEN > image.len() {
        return Err(PatchError::FieldOutOfRange {
            field: "patch area",
            offset: pa,
        });
    }
    let epa = ExtPatchArea::read(&image, get_u16(&image, pa + PA_EPA_OFFSET) as usize)?;

    // The boot sector loads the first sector itself
    let mut boot_stub = *input.boot_stub;
    let first = chain[0];
    put(&mut boot_stub, epa.sect1ptr0, &(first as u32).to_le_bytes(), "sector 1 pointer")?;
    put(
        &mut boot_stub,
        epa.sect1ptr1,
        &((first >> 32) as u32).to_le_bytes(),
        "sector 1 pointer",
    )?;
    if input.flags.contains(PatchFlags::RAID) {
        put(&mut boot_stub, epa.raid_patch, &RAID_PATCH.to_le_bytes(), "RAID patch")?;
    }

    // Totals; dwords covers complete dwords of the image only, not the ADV
    let dwords = image.len() / 4;
    let data_sectors = u16::try_from(needed - 2).map_err(|_| PatchError::FieldOutOfRange {
        field: "data sector count",
        offset: pa + PA_DATA_SECTORS,
    })?;
    put(&mut image, pa + PA_DATA_SECTORS, &data_sectors.to_le_bytes(), "data sectors")?;
    put(&mut image, pa + PA_ADV_SECTORS, &2u16.to_le_bytes(), "adv sectors")?;
    put(&mut image, pa + PA_DWORDS, &(dwords as u32).to_le_bytes(), "dwords")?;
    if input.flags.contains(PatchFlags::STUPID) {
        put(&mut image, pa + PA_MAX_TRANSFER, &1u16.to_le_bytes(), "max transfer")?;
    }

    // Sectors after the first, minus the two ADV sectors at the end
    let extents = generate_extents(&chain[1..needed - 2]);
    if extents.len() > epa.secptr_count {
        return Err(PatchError::ExtentOverflow {
            needed: extents.len(),
            capacity: epa.secptr_count,
        });
    }
    let table = vec![0u8; epa.secptr_count * EXTENT_SIZE];
    put(&mut image, epa.secptr, &table, "extent table")?;
    for (i, extent) in extents.iter().enumerate() {
        let at = epa.secptr + i * EXTENT_SIZE;
        put(&mut image, at, &extent.lba.to_le_bytes(), "extent")?;
        put(&mut image, at + 8, &extent.len.to_le_bytes(), "extent")?;
    }

    put(&mut image, epa.adv_ptr, &chain[needed - 2].to_le_bytes(), "ADV pointer")?;
    put(&mut image, epa.adv_ptr + 8, &chain[needed - 1].to_le_bytes(), "ADV pointer")?;

    if let Some(dir) = input.directory {
        let mut field = dir.as_bytes().to_vec();
        field.push(0);
        if field.len() > epa.dir_len {
            return Err(PatchError::DirectoryTooLong {
                len: field.len(),
                capacity: epa.dir_len,
            });
        }
        put(&mut image, epa.dir, &field, "directory")?;
    }

    // Negative checksum over the image dwords
    put(&mut image, pa + PA_CHECKSUM, &0u32.to_le_bytes(), "checksum")?;
    let mut csum = LDLINUX_MAGIC;
    for i in 0..dwords {
        csum = csum.wrapping_sub(get_u32(&image, i * 4));
    }
    put(&mut image, pa + PA_CHECKSUM, &csum.to_le_bytes(), "checksum")?;

    // Every dword may have changed
    let sector_count = (dwords * 4 + SECTOR_SIZE - 1) / SECTOR_SIZE;
    let mut bytes = image;
    bytes.extend_from_slice(input.trailer);
    bytes.resize(sector_count * SECTOR_SIZE, 0);

    Ok(Patched {
        bytes,
        sector_count,
        boot_stub,
    })
}

/// Coalesce sectors into extents the loader can read in one request each.
pub fn generate_extents(sectors: &[u64]) -> Vec<Extent> {
    let mut extents = Vec::new();
    let mut addr = LOAD_ADDRESS;
    let mut base = addr;
    let mut current: Option<Extent> = None;

    for &sect in sectors {
        if let Some(ext) = current.as_mut() {
            let xbytes = (ext.len as u32 + 1) * SECTOR_SIZE as u32;
            if sect == ext.lba + ext.len as u64
                && xbytes < 0x10000
                && (addr ^ base.wrapping_add(xbytes - 1)) & 0xffff_0000 == 0
            {
                ext.len += 1;
                addr = addr.wrapping_add(SECTOR_SIZE as u32);
                continue;
            }
            extents.push(*ext);
        }

        base = addr;
        current = Some(Extent { lba: sect, len: 1 });
        addr = addr.wrapping_add(SECTOR_SIZE as u32);
    }

    extents.extend(current);
    extents
}

fn find_patch_area(image: &[u8]) -> Option<usize> {
    let magic = LDLINUX_MAGIC.to_le_bytes();
    image
        .chunks_exact(4)
        .position(|word| word == &magic[..])
        .map(|i| i * 4)
}

struct ExtPatchArea {
    adv_ptr: usize,
    dir: usize,
    dir_len: usize,
    secptr: usize,
    secptr_count: usize,
    sect1ptr0: usize,
    sect1ptr1: usize,
    raid_patch: usize,
}

impl ExtPatchArea {
    fn read(image: &[u8], at: usize) -> Result<Self, PatchError> {
        if at + EPA_LEN > image.len() {
            return Err(PatchError::FieldOutOfRange {
                field: "extended patch area",
                offset: at,
            });
        }
        let field = |off: usize| get_u16(image, at + off) as usize;
        Ok(Self {
            adv_ptr: field(EPA_ADV_PTR),
            dir: field(EPA_DIR),
            dir_len: field(EPA_DIR_LEN),
            secptr: field(EPA_SECPTR),
            secptr_count: field(EPA_SECPTR_COUNT),
            sect1ptr0: field(EPA_SECT1PTR0),
            sect1ptr1: field(EPA_SECT1PTR1),
            raid_patch: field(EPA_RAID_PATCH),
        })
    }
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8], field: &'static str) -> Result<(), PatchError> {
    let end = offset
        .checked_add(bytes.len())
        .filter(|&end| end <= buf.len())
        .ok_or(PatchError::FieldOutOfRange { field, offset })?;
    buf[offset..end].copy_from_slice(bytes);
    Ok(())
}
