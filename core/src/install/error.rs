//! Install failures.
//!
//! Every fatal condition of the install protocol is one [`InstallError`]
//! variant. Non-fatal conditions (attribute changes, moves) never reach this
//! type; they become warnings on the [`InstallContext`](super::InstallContext).

use core::fmt;
use std::io;

use crate::boot::{BootSectorError, PatchError};
use crate::disk::TransferError;
use crate::fs::FatError;

/// Protocol steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallStep {
    OpenValidate,
    ConfigureBackend,
    ResetAux,
    CreatePrimary,
    ResolveChain,
    PatchPrimary,
    PlacePrimary,
    CreateSecondary,
    RestampBootSector,
}

impl InstallStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenValidate => "open and validate",
            Self::ConfigureBackend => "configure backend",
            Self::ResetAux => "reset auxiliary data",
            Self::CreatePrimary => "create primary loader",
            Self::ResolveChain => "resolve sector chain",
            Self::PatchPrimary => "patch primary loader",
            Self::PlacePrimary => "place primary loader",
            Self::CreateSecondary => "create secondary loader",
            Self::RestampBootSector => "restamp boot sector",
        }
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse classification of an [`InstallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target cannot be opened, inspected or is the wrong kind of file
    DeviceAccess,
    /// Target does not hold a usable FAT filesystem
    Format,
    /// The filesystem collaborators failed
    Backend,
    /// A raw transfer or the final sync failed
    IoTransfer,
    /// Loader file layout does not match what was computed
    Consistency,
}

#[derive(Debug)]
pub enum InstallError {
    DeviceAccess { path: String, source: io::Error },
    NotABlockDevice { path: String },
    UnrecognizedFilesystem {
        step: InstallStep,
        source: BootSectorError,
    },
    BackendConfigFailed(FatError),
    PrimaryCreateFailed { name: &'static str, source: FatError },
    ChainResolutionFailed { name: &'static str, source: FatError },
    ChainTooShort { needed: usize, found: usize },
    PatchFailed(PatchError),
    Transfer {
        step: InstallStep,
        source: TransferError,
    },
    SecondaryCreateFailed { name: &'static str, source: FatError },
    Sync(io::Error),
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceAccess { .. } | Self::NotABlockDevice { .. } => ErrorKind::DeviceAccess,
            Self::UnrecognizedFilesystem { .. } => ErrorKind::Format,
            Self::BackendConfigFailed(_)
            | Self::PrimaryCreateFailed { .. }
            | Self::ChainResolutionFailed { .. }
            | Self::SecondaryCreateFailed { .. } => ErrorKind::Backend,
            Self::ChainTooShort { .. } | Self::PatchFailed(_) => ErrorKind::Consistency,
            Self::Transfer { .. } | Self::Sync(_) => ErrorKind::IoTransfer,
        }
    }

    /// The step that failed.
    pub fn step(&self) -> InstallStep {
        match self {
            Self::DeviceAccess { .. } | Self::NotABlockDevice { .. } => InstallStep::OpenValidate,
            Self::UnrecognizedFilesystem { step, .. } | Self::Transfer { step, .. } => *step,
            Self::BackendConfigFailed(_) => InstallStep::ConfigureBackend,
            Self::PrimaryCreateFailed { .. } => InstallStep::CreatePrimary,
            Self::ChainResolutionFailed { .. } | Self::ChainTooShort { .. } => {
                InstallStep::ResolveChain
            }
            Self::PatchFailed(_) => InstallStep::PatchPrimary,
            Self::SecondaryCreateFailed { .. } => InstallStep::CreateSecondary,
            Self::Sync(_) => InstallStep::RestampBootSector,
        }
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceAccess { path, source } => write!(f, "{}: {}", path, source),
            Self::NotABlockDevice { path } => write!(
                f,
                "{}: not a block device or regular file (use -f to override)",
                path
            ),
            Self::UnrecognizedFilesystem { source, .. } => write!(f, "{}", source),
            Self::BackendConfigFailed(err) => write!(f, "configuration: {}", err),
            Self::PrimaryCreateFailed { name, source }
            | Self::SecondaryCreateFailed { name, source } => {
                write!(f, "failed to create {}: {}", name, source)
            }
            Self::ChainResolutionFailed { name, source } => {
                write!(f, "cannot map sectors of {}: {}", name, source)
            }
            Self::ChainTooShort { needed, found } => write!(
                f,
                "sector chain too short: loader needs {} sectors, found {}",
                needed, found
            ),
            Self::PatchFailed(err) => write!(f, "{}", err),
            Self::Transfer { source, .. } => write!(f, "{}", source),
            Self::Sync(err) => write!(f, "sync: {}", err),
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DeviceAccess { source, .. } => Some(source),
            Self::UnrecognizedFilesystem { source, .. } => Some(source),
            Self::BackendConfigFailed(err) => Some(err),
            Self::PrimaryCreateFailed { source, .. }
            | Self::ChainResolutionFailed { source, .. }
            | Self::SecondaryCreateFailed { source, .. } => Some(source),
            Self::PatchFailed(err) => Some(err),
            Self::Transfer { source, .. } => Some(source),
            Self::Sync(err) => Some(err),
            Self::NotABlockDevice { .. } | Self::ChainTooShort { .. } => None,
        }
    }
}

impl From<PatchError> for InstallError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::ChainTooShort { needed, found } => Self::ChainTooShort { needed, found },
            other => Self::PatchFailed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_step_classification() {
        let err = InstallError::ChainTooShort {
            needed: 54,
            found: 53,
        };
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(err.step(), InstallStep::ResolveChain);

        let err = InstallError::Transfer {
            step: InstallStep::PatchPrimary,
            source: TransferError::Short {
                direction: crate::disk::Direction::Write,
                offset: 512,
            },
        };
        assert_eq!(err.kind(), ErrorKind::IoTransfer);
        assert_eq!(err.step(), InstallStep::PatchPrimary);
        assert_eq!(err.to_string(), "short write");

        let err = InstallError::BackendConfigFailed(FatError::NotConfigured);
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(err.to_string(), "configuration: backend not configured");
    }

    #[test]
    fn test_patch_shortfall_maps_to_chain_error() {
        let err: InstallError = PatchError::ChainTooShort {
            needed: 10,
            found: 9,
        }
        .into();
        assert!(matches!(err, InstallError::ChainTooShort { needed: 10, found: 9 }));

        let err: InstallError = PatchError::NoPatchArea.into();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(err.step(), InstallStep::PatchPrimary);
    }

    #[test]
    fn test_steps_are_ordered() {
        assert!(InstallStep::OpenValidate < InstallStep::ResolveChain);
        assert!(InstallStep::CreateSecondary < InstallStep::RestampBootSector);
    }
}
