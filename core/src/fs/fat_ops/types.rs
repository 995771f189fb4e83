// FAT directory entry layout

use bitflags::bitflags;

pub const DIR_ENTRY_SIZE: usize = 32;
pub const DELETED_MARK: u8 = 0xE5;
/// Attribute value of a long-file-name entry
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// 1980-01-01, the DOS epoch
const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// NT case bits: base / extension stored upper case but shown lower case
pub const CASE_LOWER_BASE: u8 = 0x08;
pub const CASE_LOWER_EXT: u8 = 0x10;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

impl Attributes {
    /// Bits that keep a loader file from casual deletion
    pub const PROTECTED: Self = Self::from_bits_retain(0x07);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attr: Attributes,
    pub nt_case: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster: u32,
    pub file_size: u32,
}

impl DirEntry {
    /// New archive-flagged file entry stamped with the DOS epoch.
    pub fn file(name: [u8; 11], nt_case: u8, first_cluster: u32, file_size: u32) -> Self {
        Self {
            name,
            attr: Attributes::ARCHIVE,
            nt_case,
            create_time_tenth: 0,
            create_time: 0,
            create_date: DOS_EPOCH_DATE,
            access_date: DOS_EPOCH_DATE,
            write_time: 0,
            write_date: DOS_EPOCH_DATE,
            first_cluster,
            file_size,
        }
    }

    pub fn parse(raw: &[u8]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([raw[off], raw[off + 1]]);
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[..11]);
        Self {
            name,
            attr: Attributes::from_bits_retain(raw[11]),
            nt_case: raw[12],
            create_time_tenth: raw[13],
            create_time: u16_at(14),
            create_date: u16_at(16),
            access_date: u16_at(18),
            write_time: u16_at(22),
            write_date: u16_at(24),
            first_cluster: ((u16_at(20) as u32) << 16) | u16_at(26) as u32,
            file_size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn write_to(&self, raw: &mut [u8]) {
        raw[..11].copy_from_slice(&self.name);
        raw[11] = self.attr.bits();
        raw[12] = self.nt_case;
        raw[13] = self.create_time_tenth;
        raw[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        raw[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        raw[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        raw[20..22].copy_from_slice(&((self.first_cluster >> 16) as u16).to_le_bytes());
        raw[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        raw[26..28].copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&self.file_size.to_le_bytes());
    }

    pub fn is_directory(&self) -> bool {
        self.attr.contains(Attributes::DIRECTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_layout() {
        let entry = DirEntry::file(*b"LDLINUX SYS", CASE_LOWER_BASE, 0x0012_3456, 27224);
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        entry.write_to(&mut raw);

        assert_eq!(&raw[..11], b"LDLINUX SYS");
        assert_eq!(raw[11], 0x20);
        assert_eq!(&raw[20..22], &[0x12, 0x00]);
        assert_eq!(&raw[26..28], &[0x56, 0x34]);
        assert_eq!(&raw[28..32], &27224u32.to_le_bytes());
        assert_eq!(DirEntry::parse(&raw), entry);
    }

    #[test]
    fn test_protected_bits() {
        let mut attr = Attributes::ARCHIVE;
        attr.insert(Attributes::PROTECTED);
        assert_eq!(attr.bits(), 0x27);
        attr.remove(Attributes::PROTECTED);
        assert_eq!(attr, Attributes::ARCHIVE);
    }
}
