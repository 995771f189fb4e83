//! Install protocol.
//!
//! Writes a bootable loader onto an unmounted FAT volume in nine ordered
//! steps. The orchestrator owns the failure policy: device, format, backend
//! and transfer failures abort the run, attribute and move failures only
//! warn.
//!
//! # Architecture
//! - `context` - options, loader payloads and the per-run warning list
//! - `error` - `InstallError`, its `ErrorKind` and the failing `InstallStep`
//! - `paths` - writer paths for the loader files
//! - `orchestrator` - the step sequence
//!
//! # Step Flow
//! ```text
//! OpenValidate ──► ConfigureBackend ──► ResetAux ──► CreatePrimary
//!                                                         │
//!      ┌──────────────────────────────────────────────────┘
//!      ▼
//! ResolveChain ──► PatchPrimary ──► PlacePrimary ──┬──► CreateSecondary ──┐
//!                                                  │                      │
//!                                                  └──────────────────────┴──► RestampBootSector
//! ```
//!
//! Nothing is undone on abort. A run that fails after `CreatePrimary` leaves
//! a loader file that will not boot until the install is repeated.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod paths;

pub use context::{InstallContext, InstallOptions, LoaderSet};
pub use error::{ErrorKind, InstallError, InstallStep};
pub use orchestrator::{InstallReport, Installer};

use crate::disk::RawDevice;
use crate::fs::{FatChainResolver, FatFileWriter};

/// Run one install with the given collaborators.
pub fn install<D, W, R>(
    ctx: &mut InstallContext,
    dev: &D,
    writer: &mut W,
    resolver: &R,
    loaders: &LoaderSet,
) -> Result<InstallReport, InstallError>
where
    D: RawDevice + ?Sized,
    W: FatFileWriter<D>,
    R: FatChainResolver<D>,
{
    Installer::new(dev, writer, resolver, loaders).run(ctx)
}
