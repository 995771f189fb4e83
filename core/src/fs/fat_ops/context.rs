// Volume geometry derived from the boot sector

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::directory::DirLocation;
use crate::boot::{BootSector, FatKind};
use crate::fs::FatError;
use crate::SECTOR_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatContext {
    pub kind: FatKind,
    pub sectors_per_cluster: u32,
    pub num_fats: u32,
    pub fat_start: u64,
    pub fat_size: u32,
    pub root_dir_start: u64,
    pub root_dir_sectors: u32,
    /// FAT32 only
    pub root_cluster: u32,
    pub data_start: u64,
    pub cluster_count: u32,
    /// FAT32 FSInfo sector, when the BPB names a plausible one
    pub fs_info_sector: Option<u64>,
}

impl FatContext {
    /// Read and validate the boot sector at LBA 0 of the volume.
    pub fn from_boot_sector<B: BlockIo>(block_io: &mut B) -> Result<Self, FatError> {
        let mut sector = [0u8; SECTOR_SIZE];
        block_io
            .read_blocks(Lba(0), &mut sector)
            .map_err(FatError::block)?;
        let bs = BootSector::validate(sector)?;
        Ok(Self::from_validated(&bs))
    }

    pub fn from_validated(bs: &BootSector) -> Self {
        let bpb = bs.bpb();
        let kind = bs.kind();
        let fs_info_sector = match kind {
            FatKind::Fat32
                if bpb.fs_info_sector != 0
                    && bpb.fs_info_sector != 0xFFFF
                    && bpb.fs_info_sector < bpb.reserved_sectors =>
            {
                Some(bpb.fs_info_sector as u64)
            }
            _ => None,
        };

        Self {
            kind,
            sectors_per_cluster: bpb.sectors_per_cluster as u32,
            num_fats: bpb.num_fats as u32,
            fat_start: bpb.reserved_sectors as u64,
            fat_size: bpb.fat_size,
            root_dir_start: bpb.root_dir_start(),
            root_dir_sectors: bpb.root_dir_sectors(),
            root_cluster: bpb.root_cluster,
            data_start: bpb.first_data_sector(),
            cluster_count: bpb.cluster_count().min(u32::MAX as u64 - 2) as u32,
            fs_info_sector,
        }
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    pub fn max_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster <= self.max_cluster()
    }

    pub fn cluster_to_sector(&self, cluster: u32) -> u64 {
        self.data_start + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    /// Cluster holding a data-area sector.
    pub fn sector_to_cluster(&self, sector: u64) -> Option<u32> {
        if sector < self.data_start {
            return None;
        }
        let cluster = (sector - self.data_start) / self.sectors_per_cluster as u64 + 2;
        u32::try_from(cluster)
            .ok()
            .filter(|&c| self.is_data_cluster(c))
    }

    pub fn root(&self) -> DirLocation {
        match self.kind {
            FatKind::Fat32 => DirLocation::Chain(self.root_cluster),
            FatKind::Fat12 | FatKind::Fat16 => DirLocation::FixedRoot,
        }
    }

    /// Directory a `first_cluster` field refers to; cluster 0 means the root.
    pub fn dir_location(&self, first_cluster: u32) -> DirLocation {
        if first_cluster == 0 {
            self.root()
        } else {
            DirLocation::Chain(first_cluster)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::boot_sector;

    fn context(kind: FatKind) -> FatContext {
        FatContext::from_validated(&BootSector::validate(boot_sector(kind)).unwrap())
    }

    #[test]
    fn test_fat16_geometry() {
        let ctx = context(FatKind::Fat16);
        assert_eq!(ctx.fat_start, 4);
        assert_eq!(ctx.root_dir_start, 68);
        assert_eq!(ctx.data_start, 100);
        assert_eq!(ctx.cluster_to_sector(2), 100);
        assert_eq!(ctx.cluster_to_sector(3), 104);
        assert_eq!(ctx.sector_to_cluster(107), Some(3));
        assert_eq!(ctx.sector_to_cluster(99), None);
        assert_eq!(ctx.root(), DirLocation::FixedRoot);
        assert_eq!(ctx.fs_info_sector, None);
    }

    #[test]
    fn test_fat32_root_is_a_chain() {
        let ctx = context(FatKind::Fat32);
        assert_eq!(ctx.root(), DirLocation::Chain(2));
        assert_eq!(ctx.dir_location(0), DirLocation::Chain(2));
        assert_eq!(ctx.dir_location(9), DirLocation::Chain(9));
        assert_eq!(ctx.fs_info_sector, Some(1));
        assert_eq!(ctx.root_dir_sectors, 0);
    }

    #[test]
    fn test_sector_past_last_cluster() {
        let ctx = context(FatKind::Fat12);
        let last = ctx.cluster_to_sector(ctx.max_cluster());
        assert_eq!(ctx.sector_to_cluster(last), Some(ctx.max_cluster()));
        assert_eq!(ctx.sector_to_cluster(last + 1), None);
    }
}
