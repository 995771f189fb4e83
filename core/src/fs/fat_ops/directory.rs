// FAT directory operations

use std::collections::BTreeSet;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::context::FatContext;
use super::table::FatTable;
use super::types::{Attributes, DirEntry, ATTR_LONG_NAME, DELETED_MARK, DIR_ENTRY_SIZE};
use crate::fs::FatError;
use crate::SECTOR_SIZE;

/// Where a directory's entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    /// FAT12/16 root: a fixed run of sectors before the data area
    FixedRoot,
    /// Any directory stored in a cluster chain, including the FAT32 root
    Chain(u32),
}

/// A whole directory held in memory, written back with [`Directory::flush`].
pub struct Directory {
    location: DirLocation,
    clusters: Vec<u32>,
    sectors: Vec<u64>,
    data: Vec<u8>,
    dirty: BTreeSet<usize>,
}

impl Directory {
    pub fn open<B: BlockIo>(
        block_io: &mut B,
        ctx: &FatContext,
        fat: &FatTable,
        location: DirLocation,
    ) -> Result<Self, FatError> {
        let (clusters, sectors) = match location {
            DirLocation::FixedRoot => {
                let start = ctx.root_dir_start;
                let sectors: Vec<u64> = (start..start + ctx.root_dir_sectors as u64).collect();
                (Vec::new(), sectors)
            }
            DirLocation::Chain(first) => {
                let clusters = fat.chain(first)?;
                let sectors: Vec<u64> = clusters
                    .iter()
                    .flat_map(|&c| {
                        let base = ctx.cluster_to_sector(c);
                        base..base + ctx.sectors_per_cluster as u64
                    })
                    .collect();
                (clusters, sectors)
            }
        };

        let mut data = vec![0u8; sectors.len() * SECTOR_SIZE];
        for (i, &lba) in sectors.iter().enumerate() {
            block_io
                .read_blocks(Lba(lba), &mut data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE])
                .map_err(FatError::block)?;
        }

        Ok(Self {
            location,
            clusters,
            sectors,
            data,
            dirty: BTreeSet::new(),
        })
    }

    pub fn location(&self) -> DirLocation {
        self.location
    }

    fn slots(&self) -> usize {
        self.data.len() / DIR_ENTRY_SIZE
    }

    fn raw(&self, index: usize) -> &[u8] {
        &self.data[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE]
    }

    /// Index of the short-name entry called `name`. Deleted, long-name and
    /// volume-label entries are skipped.
    pub fn find(&self, name: &[u8; 11]) -> Option<usize> {
        for index in 0..self.slots() {
            let raw = self.raw(index);
            match raw[0] {
                0x00 => return None,
                DELETED_MARK => continue,
                _ => {}
            }
            if raw[11] == ATTR_LONG_NAME || raw[11] & Attributes::VOLUME_ID.bits() != 0 {
                continue;
            }
            if raw[..11].eq_ignore_ascii_case(name) {
                return Some(index);
            }
        }
        None
    }

    pub fn entry(&self, index: usize) -> DirEntry {
        DirEntry::parse(self.raw(index))
    }

    pub fn set_entry(&mut self, index: usize, entry: &DirEntry) {
        let start = index * DIR_ENTRY_SIZE;
        entry.write_to(&mut self.data[start..start + DIR_ENTRY_SIZE]);
        self.dirty.insert(start / SECTOR_SIZE);
    }

    fn free_slot(&self) -> Option<usize> {
        (0..self.slots()).find(|&i| matches!(self.raw(i)[0], 0x00 | DELETED_MARK))
    }

    /// Mark an entry deleted, along with the long-name entries in front of it.
    pub fn delete(&mut self, index: usize) {
        self.mark_deleted(index);
        let mut prev = index;
        while prev > 0 {
            prev -= 1;
            let raw = self.raw(prev);
            if raw[11] != ATTR_LONG_NAME || raw[0] == DELETED_MARK {
                break;
            }
            self.mark_deleted(prev);
        }
    }

    fn mark_deleted(&mut self, index: usize) {
        let start = index * DIR_ENTRY_SIZE;
        self.data[start] = DELETED_MARK;
        self.dirty.insert(start / SECTOR_SIZE);
    }

    /// Extend a chained directory by one zeroed cluster.
    fn grow(&mut self, ctx: &FatContext, fat: &mut FatTable) -> Result<usize, FatError> {
        let last = match (self.location, self.clusters.last()) {
            (DirLocation::Chain(_), Some(&last)) => last,
            _ => return Err(FatError::DirectoryFull),
        };
        let cluster = match fat.allocate(1) {
            Ok(c) => c[0],
            Err(FatError::NoSpace) => return Err(FatError::DirectoryFull),
            Err(e) => return Err(e),
        };
        fat.set(last, cluster);

        let first_new = self.slots();
        let base = ctx.cluster_to_sector(cluster);
        for lba in base..base + ctx.sectors_per_cluster as u64 {
            self.dirty.insert(self.sectors.len());
            self.sectors.push(lba);
        }
        self.clusters.push(cluster);
        self.data.resize(self.sectors.len() * SECTOR_SIZE, 0);
        Ok(first_new)
    }

    /// Store `entry` in the first free slot, growing the directory if needed.
    pub fn insert(
        &mut self,
        ctx: &FatContext,
        fat: &mut FatTable,
        entry: &DirEntry,
    ) -> Result<usize, FatError> {
        let index = match self.free_slot() {
            Some(index) => index,
            None => self.grow(ctx, fat)?,
        };
        self.set_entry(index, entry);
        Ok(index)
    }

    pub fn flush<B: BlockIo>(&mut self, block_io: &mut B) -> Result<(), FatError> {
        for &i in &self.dirty {
            block_io
                .write_blocks(
                    Lba(self.sectors[i]),
                    &self.data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE],
                )
                .map_err(FatError::block)?;
        }
        self.dirty.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::FatKind;
    use crate::disk::VolumeIo;
    use crate::testing::format_volume;

    #[test]
    fn test_fixed_root_spans_root_region() {
        let dev = format_volume(FatKind::Fat16);
        let mut io = VolumeIo::new(&dev, 0);
        let ctx = FatContext::from_boot_sector(&mut io).unwrap();
        let fat = FatTable::load(&mut io, &ctx).unwrap();

        let dir = Directory::open(&mut io, &ctx, &fat, DirLocation::FixedRoot).unwrap();
        let expected: Vec<u64> =
            (ctx.root_dir_start..ctx.root_dir_start + ctx.root_dir_sectors as u64).collect();
        assert_eq!(dir.sectors, expected);
        assert_eq!(dir.data.len(), expected.len() * SECTOR_SIZE);
        assert!(dir.clusters.is_empty());
    }

    #[test]
    fn test_insert_find_delete_in_fixed_root() {
        let dev = format_volume(FatKind::Fat12);
        let mut io = VolumeIo::new(&dev, 0);
        let ctx = FatContext::from_boot_sector(&mut io).unwrap();
        let fat = FatTable::load(&mut io, &ctx).unwrap();

        let mut dir = Directory::open(&mut io, &ctx, &fat, ctx.root()).unwrap();
        assert_eq!(dir.find(b"LDLINUX SYS"), None);

        let entry = DirEntry::file(*b"LDLINUX SYS", 0, 5, 100);
        let mut fat = fat;
        let index = dir.insert(&ctx, &mut fat, &entry).unwrap();
        dir.flush(&mut io).unwrap();

        let reopened = Directory::open(&mut io, &ctx, &fat, ctx.root()).unwrap();
        assert_eq!(reopened.find(b"ldlinux sys"), Some(index));
        assert_eq!(reopened.entry(index).first_cluster, 5);

        let mut dir = reopened;
        dir.delete(index);
        assert_eq!(dir.find(b"LDLINUX SYS"), None);
    }

    #[test]
    fn test_fixed_root_does_not_grow() {
        let dev = format_volume(FatKind::Fat12);
        let mut io = VolumeIo::new(&dev, 0);
        let ctx = FatContext::from_boot_sector(&mut io).unwrap();
        let mut fat = FatTable::load(&mut io, &ctx).unwrap();
        let mut dir = Directory::open(&mut io, &ctx, &fat, ctx.root()).unwrap();

        // 224 root entries
        for i in 0..224u32 {
            let name = format!("F{:<7}BIN", i);
            let mut bytes = [0u8; 11];
            bytes.copy_from_slice(name.as_bytes());
            dir.insert(&ctx, &mut fat, &DirEntry::file(bytes, 0, 0, 0)).unwrap();
        }
        let overflow = DirEntry::file(*b"ONEMORE BIN", 0, 0, 0);
        assert_eq!(dir.insert(&ctx, &mut fat, &overflow), Err(FatError::DirectoryFull));
    }

    #[test]
    fn test_chained_directory_grows() {
        let dev = format_volume(FatKind::Fat32);
        let mut io = VolumeIo::new(&dev, 0);
        let ctx = FatContext::from_boot_sector(&mut io).unwrap();
        let mut fat = FatTable::load(&mut io, &ctx).unwrap();
        let mut dir = Directory::open(&mut io, &ctx, &fat, ctx.root()).unwrap();

        // one 512-byte cluster holds 16 entries
        for i in 0..17u32 {
            let name = format!("F{:<7}BIN", i);
            let mut bytes = [0u8; 11];
            bytes.copy_from_slice(name.as_bytes());
            dir.insert(&ctx, &mut fat, &DirEntry::file(bytes, 0, 0, 0)).unwrap();
        }
        assert_eq!(fat.chain(2).unwrap().len(), 2);
        assert_eq!(dir.find(b"F16     BIN"), Some(16));
    }

    #[test]
    fn test_delete_clears_long_name_run() {
        let dev = format_volume(FatKind::Fat16);
        let mut io = VolumeIo::new(&dev, 0);
        let ctx = FatContext::from_boot_sector(&mut io).unwrap();
        let mut fat = FatTable::load(&mut io, &ctx).unwrap();
        let mut dir = Directory::open(&mut io, &ctx, &fat, ctx.root()).unwrap();

        let mut lfn = DirEntry::file(*b"Alongname  ", 0, 0, 0);
        lfn.attr = Attributes::from_bits_retain(ATTR_LONG_NAME);
        dir.insert(&ctx, &mut fat, &lfn).unwrap();
        let index = dir
            .insert(&ctx, &mut fat, &DirEntry::file(*b"LONGNA~1TXT", 0, 0, 0))
            .unwrap();
        assert_eq!(dir.find(b"ALONGNAME  "), None);

        dir.delete(index);
        assert_eq!(dir.raw(0)[0], DELETED_MARK);
        assert_eq!(dir.raw(1)[0], DELETED_MARK);
    }
}
