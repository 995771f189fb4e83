// FAT12/16/32 operations - just enough to install a loader without a mount

mod context;
mod directory;
mod file_ops;
pub mod filename;
mod path;
mod table;
mod types;

pub use context::FatContext;
pub use directory::DirLocation;
pub use path::DiskPath;
pub use types::Attributes;

use gpt_disk_io::BlockIo;

use super::{ChainVolume, FatChainResolver, FatError, FatFileWriter};
use crate::disk::{RawDevice, VolumeIo};
use directory::Directory;
use table::FatTable;

/// An open FAT volume: geometry plus the in-memory FAT.
pub struct FatVolume<B: BlockIo> {
    io: B,
    ctx: FatContext,
    fat: FatTable,
}

impl<B: BlockIo> FatVolume<B> {
    pub fn open(mut io: B) -> Result<Self, FatError> {
        let ctx = FatContext::from_boot_sector(&mut io)?;
        let fat = FatTable::load(&mut io, &ctx)?;
        log::debug!(
            "opened {} volume: {} clusters of {} bytes",
            ctx.kind,
            ctx.cluster_count,
            ctx.cluster_size()
        );
        Ok(Self { io, ctx, fat })
    }

    pub fn context(&self) -> &FatContext {
        &self.ctx
    }

    pub fn free_clusters(&self) -> usize {
        self.fat.free_count()
    }
}

impl<B: BlockIo> ChainVolume for FatVolume<B> {
    fn find_root_entry(&mut self, name: &str) -> Result<Option<u32>, FatError> {
        let name = filename::short_name(name)?;
        let root = Directory::open(&mut self.io, &self.ctx, &self.fat, self.ctx.root())?;
        Ok(root
            .find(&name.bytes)
            .map(|index| root.entry(index).first_cluster))
    }

    fn cluster_to_sector(&self, cluster: u32) -> Option<u64> {
        (cluster >= 2 && cluster <= self.fat.max_cluster())
            .then(|| self.ctx.cluster_to_sector(cluster))
    }

    fn next_sector(&mut self, sector: u64) -> Result<Option<u64>, FatError> {
        let cluster = self
            .ctx
            .sector_to_cluster(sector)
            .ok_or(FatError::OutsideDataArea(sector))?;

        let within = (sector - self.ctx.data_start) % self.ctx.sectors_per_cluster as u64;
        if within + 1 < self.ctx.sectors_per_cluster as u64 {
            return Ok(Some(sector + 1));
        }

        Ok(self
            .fat
            .next(cluster)?
            .map(|next| self.ctx.cluster_to_sector(next)))
    }
}

/// Native [`FatFileWriter`]: every call reopens the volume at the configured
/// offset, so each operation sees what the previous one flushed.
#[derive(Debug, Default)]
pub struct NativeFat {
    offset: Option<u64>,
}

impl NativeFat {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_volume<'d, D, R>(
        &self,
        dev: &'d D,
        op: impl FnOnce(&mut FatVolume<VolumeIo<'d, D>>) -> Result<R, FatError>,
    ) -> Result<R, FatError>
    where
        D: RawDevice + ?Sized,
    {
        let offset = self.offset.ok_or(FatError::NotConfigured)?;
        let mut volume = FatVolume::open(VolumeIo::new(dev, offset))?;
        op(&mut volume)
    }
}

impl<D: RawDevice + ?Sized> FatFileWriter<D> for NativeFat {
    fn configure(&mut self, dev: &D, offset: u64) -> Result<(), FatError> {
        FatVolume::open(VolumeIo::new(dev, offset))?;
        self.offset = Some(offset);
        Ok(())
    }

    fn clear_attributes(&mut self, dev: &D, path: &str) -> Result<(), FatError> {
        self.with_volume(dev, |vol| vol.set_protection(path, false))
    }

    fn set_attributes(&mut self, dev: &D, path: &str) -> Result<(), FatError> {
        self.with_volume(dev, |vol| vol.set_protection(path, true))
    }

    fn create_file(
        &mut self,
        dev: &D,
        path: &str,
        primary: &[u8],
        secondary: &[u8],
    ) -> Result<(), FatError> {
        self.with_volume(dev, |vol| vol.create_file(path, primary, secondary))
    }

    fn move_file(&mut self, dev: &D, old_path: &str, new_path: &str) -> Result<(), FatError> {
        self.with_volume(dev, |vol| vol.move_file(old_path, new_path))
    }
}

/// Native [`FatChainResolver`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeResolver;

impl<D: RawDevice + ?Sized> FatChainResolver<D> for NativeResolver {
    type Volume<'d> = FatVolume<VolumeIo<'d, D>>
    where
        D: 'd;

    fn open<'d>(&self, dev: &'d D, offset: u64) -> Result<Self::Volume<'d>, FatError> {
        FatVolume::open(VolumeIo::new(dev, offset))
    }
}
