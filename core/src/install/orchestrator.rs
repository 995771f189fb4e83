//! Install orchestrator.
//!
//! # Entry Point Contract
//!
//! **SOLE ENTRY**: [`Installer::run`] or the convenience wrapper
//! [`install`](super::install).
//!
//! **WHAT THIS MODULE RECEIVES**:
//! - `&D` - target opened read/write, implementing `RawDevice`
//! - `&mut W` - a `FatFileWriter` for the same device
//! - `&R` - a `FatChainResolver` for the same device
//! - `&LoaderSet` - boot stub, primary image, optional secondary module
//!
//! **WHAT THIS MODULE DOES NOT DO**:
//! - open the device or read loader files (caller's job)
//! - walk FAT structures (the collaborators' job)
//! - undo anything on abort
//!
//! # Step Flow
//! ```text
//! OpenValidate → ConfigureBackend → ResetAux → CreatePrimary → ResolveChain
//!     → PatchPrimary → PlacePrimary → [CreateSecondary] → RestampBootSector
//! ```

use crate::boot::{needed_sectors, patch, AuxData, BootSector, PatchInput, Patched};
use crate::disk::{positioned_read, positioned_write, DeviceKind, RawDevice};
use crate::fs::{ChainVolume, FatChainResolver, FatError, FatFileWriter};
use crate::SECTOR_SIZE;

use super::context::{InstallContext, LoaderSet};
use super::error::{InstallError, InstallStep};
use super::paths::{install_directory, root_path, target_path, PRIMARY_NAME, SECONDARY_NAME};

/// What a completed install did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Sectors backing the primary loader file, relative to the volume
    pub chain: Vec<u64>,
    /// Leading sectors rewritten with patched content
    pub patched_sectors: usize,
    /// Final location of the primary loader
    pub primary_path: String,
}

/// One install run against one device.
pub struct Installer<'a, D: ?Sized, W, R> {
    dev: &'a D,
    writer: &'a mut W,
    resolver: &'a R,
    loaders: &'a LoaderSet,
    step: InstallStep,
}

impl<'a, D, W, R> Installer<'a, D, W, R>
where
    D: RawDevice + ?Sized,
    W: FatFileWriter<D>,
    R: FatChainResolver<D>,
{
    pub fn new(dev: &'a D, writer: &'a mut W, resolver: &'a R, loaders: &'a LoaderSet) -> Self {
        Self {
            dev,
            writer,
            resolver,
            loaders,
            step: InstallStep::OpenValidate,
        }
    }

    /// Step currently executing, or the one that failed.
    pub fn step(&self) -> InstallStep {
        self.step
    }

    fn enter(&mut self, step: InstallStep) {
        log::debug!("step: {}", step);
        self.step = step;
    }

    pub fn run(&mut self, ctx: &mut InstallContext) -> Result<InstallReport, InstallError> {
        let loaders = self.loaders;
        let offset = ctx.options.offset;
        let directory = install_directory(ctx.options.directory.as_deref()).map(str::to_owned);

        self.enter(InstallStep::OpenValidate);
        self.check_device(ctx)?;
        let bs = self.read_boot_sector(offset)?;
        log::info!("{}: {} filesystem at offset {}", ctx.device, bs.kind(), offset);

        self.enter(InstallStep::ConfigureBackend);
        self.writer
            .configure(self.dev, offset)
            .map_err(InstallError::BackendConfigFailed)?;

        self.enter(InstallStep::ResetAux);
        let aux = AuxData::vacuous();

        self.enter(InstallStep::CreatePrimary);
        let primary_root = root_path(PRIMARY_NAME);
        if let Err(err) = self.writer.clear_attributes(self.dev, &primary_root) {
            log::debug!("clearing attributes of {}: {}", primary_root, err);
        }
        self.writer
            .create_file(self.dev, &primary_root, &loaders.primary, aux.as_bytes())
            .map_err(|source| InstallError::PrimaryCreateFailed {
                name: PRIMARY_NAME,
                source,
            })?;

        self.enter(InstallStep::ResolveChain);
        let needed = needed_sectors(loaders.primary.len());
        let chain = self.resolve_chain(offset, needed)?;

        self.enter(InstallStep::PatchPrimary);
        let patched = patch(&PatchInput {
            image: &loaders.primary,
            boot_stub: &loaders.boot_stub,
            trailer: aux.as_bytes(),
            chain: &chain,
            directory: directory.as_deref(),
            flags: ctx.options.flags,
        })?;
        self.write_patched(offset, &chain, &patched)?;
        log::info!(
            "patched {} of {} sectors of {}",
            patched.sector_count,
            chain.len(),
            PRIMARY_NAME
        );

        self.enter(InstallStep::PlacePrimary);
        let primary_path = self.place(ctx, directory.as_deref(), PRIMARY_NAME);

        if let Some(secondary) = &loaders.secondary {
            self.enter(InstallStep::CreateSecondary);
            let secondary_root = root_path(SECONDARY_NAME);
            if let Err(err) = self.writer.clear_attributes(self.dev, &secondary_root) {
                log::debug!("clearing attributes of {}: {}", secondary_root, err);
            }
            self.writer
                .create_file(self.dev, &secondary_root, secondary, &[])
                .map_err(|source| InstallError::SecondaryCreateFailed {
                    name: SECONDARY_NAME,
                    source,
                })?;
            self.place(ctx, directory.as_deref(), SECONDARY_NAME);
        }

        self.enter(InstallStep::RestampBootSector);
        // The backend may have rewritten geometry fields; start from disk
        let mut bs = self.read_boot_sector(offset)?;
        bs.stamp(&patched.boot_stub);
        positioned_write(self.dev, bs.as_bytes(), offset).map_err(|source| {
            InstallError::Transfer {
                step: self.step,
                source,
            }
        })?;
        self.dev.sync().map_err(InstallError::Sync)?;
        log::info!("boot sector written");

        Ok(InstallReport {
            chain,
            patched_sectors: patched.sector_count,
            primary_path,
        })
    }

    fn check_device(&self, ctx: &InstallContext) -> Result<(), InstallError> {
        let kind = self.dev.kind().map_err(|source| InstallError::DeviceAccess {
            path: ctx.device.clone(),
            source,
        })?;
        if kind == DeviceKind::Other && !ctx.options.force {
            return Err(InstallError::NotABlockDevice {
                path: ctx.device.clone(),
            });
        }
        Ok(())
    }

    fn read_boot_sector(&self, offset: u64) -> Result<BootSector, InstallError> {
        let mut sector = [0u8; SECTOR_SIZE];
        positioned_read(self.dev, &mut sector, offset).map_err(|source| {
            InstallError::Transfer {
                step: self.step,
                source,
            }
        })?;
        BootSector::validate(sector).map_err(|source| InstallError::UnrecognizedFilesystem {
            step: self.step,
            source,
        })
    }

    /// Sectors of the primary file in file order, at most `needed` of them.
    fn resolve_chain(&self, offset: u64, needed: usize) -> Result<Vec<u64>, InstallError> {
        let lookup = |source: FatError| InstallError::ChainResolutionFailed {
            name: PRIMARY_NAME,
            source,
        };

        let mut volume = self.resolver.open(self.dev, offset).map_err(lookup)?;
        let cluster = volume
            .find_root_entry(PRIMARY_NAME)
            .map_err(lookup)?
            .ok_or_else(|| lookup(FatError::NotFound))?;

        let mut chain = Vec::with_capacity(needed);
        let mut sector = volume.cluster_to_sector(cluster);
        while let Some(current) = sector {
            chain.push(current);
            if chain.len() == needed {
                break;
            }
            sector = volume.next_sector(current).map_err(lookup)?;
        }

        if chain.len() < needed {
            return Err(InstallError::ChainTooShort {
                needed,
                found: chain.len(),
            });
        }
        log::debug!("{} chain: {:?}", PRIMARY_NAME, chain);
        Ok(chain)
    }

    /// One sector at a time, in chain order.
    fn write_patched(
        &self,
        offset: u64,
        chain: &[u64],
        patched: &Patched,
    ) -> Result<(), InstallError> {
        for (sector, data) in chain
            .iter()
            .zip(patched.bytes.chunks_exact(SECTOR_SIZE))
            .take(patched.sector_count)
        {
            let at = offset + (sector << crate::SECTOR_SHIFT);
            positioned_write(self.dev, data, at).map_err(|source| InstallError::Transfer {
                step: self.step,
                source,
            })?;
        }
        Ok(())
    }

    /// Move `name` into the install directory and protect it. Failures only
    /// warn; returns where the file ended up.
    fn place(&mut self, ctx: &mut InstallContext, directory: Option<&str>, name: &str) -> String {
        let root = root_path(name);
        let (path, protected) = match directory {
            Some(dir) => {
                let target = target_path(dir, name);
                if let Err(err) = self.writer.clear_attributes(self.dev, &target) {
                    log::debug!("clearing attributes of {}: {}", target, err);
                }
                match self.writer.move_file(self.dev, &root, &target) {
                    Ok(()) => {
                        let protected = self.writer.set_attributes(self.dev, &target);
                        (target, protected)
                    }
                    Err(err) => {
                        log::debug!("moving {} to {}: {}", root, target, err);
                        ctx.warn(format!("unable to move {}", name));
                        let protected = self.writer.set_attributes(self.dev, &root);
                        (root, protected)
                    }
                }
            }
            None => {
                let protected = self.writer.set_attributes(self.dev, &root);
                (root, protected)
            }
        };

        if let Err(err) = protected {
            log::debug!("setting attributes of {}: {}", path, err);
            ctx.warn(format!("failed to set system bit on {}", name));
        }
        path
    }
}
