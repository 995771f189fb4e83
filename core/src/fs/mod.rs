//! Filesystem collaborators.
//!
//! The installer never walks FAT structures itself. It talks to two
//! collaborators:
//! - [`FatFileWriter`] creates, retags and moves files without a mount
//! - [`FatChainResolver`] opens the volume and maps a root file to sectors
//!
//! [`fat_ops`] provides the native implementation of both. Tests substitute
//! in-memory fakes.

pub mod fat_ops;

pub use fat_ops::{FatVolume, NativeFat, NativeResolver};

use core::fmt;

use crate::boot::BootSectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatError {
    /// Block transfer failed
    Io(String),
    /// The volume's boot sector is not FAT
    NotFat(BootSectorError),
    /// Writer used before `configure`
    NotConfigured,
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    ReadOnly,
    InvalidName(String),
    InvalidPath(String),
    DirectoryFull,
    NoSpace,
    FileTooLarge,
    /// Cluster chain points at a free, bad or out-of-range cluster
    CorruptChain(u32),
    /// Sector lies outside the data area
    OutsideDataArea(u64),
}

impl FatError {
    pub(crate) fn block<E: fmt::Display>(err: E) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<BootSectorError> for FatError {
    fn from(err: BootSectorError) -> Self {
        Self::NotFat(err)
    }
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::NotFat(err) => write!(f, "{}", err),
            Self::NotConfigured => write!(f, "backend not configured"),
            Self::NotFound => write!(f, "no such file or directory"),
            Self::AlreadyExists => write!(f, "file exists"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::ReadOnly => write!(f, "file is read-only"),
            Self::InvalidName(name) => write!(f, "invalid 8.3 file name \"{}\"", name),
            Self::InvalidPath(path) => write!(f, "invalid path \"{}\"", path),
            Self::DirectoryFull => write!(f, "directory full"),
            Self::NoSpace => write!(f, "no free clusters"),
            Self::FileTooLarge => write!(f, "file too large"),
            Self::CorruptChain(cluster) => write!(f, "corrupt cluster chain at {}", cluster),
            Self::OutsideDataArea(sector) => {
                write!(f, "sector {} is outside the data area", sector)
            }
        }
    }
}

impl std::error::Error for FatError {}

/// Writes files into a FAT volume that is not mounted.
///
/// Paths use the writer grammar: `s:/DIR/NAME`, with `'...'` quoting and `\`
/// escapes inside quotes.
pub trait FatFileWriter<D: ?Sized> {
    /// Point the writer at the volume starting `offset` bytes into `dev`.
    fn configure(&mut self, dev: &D, offset: u64) -> Result<(), FatError>;

    /// Remove the hidden, read-only and system bits.
    fn clear_attributes(&mut self, dev: &D, path: &str) -> Result<(), FatError>;

    /// Add the hidden, read-only and system bits.
    fn set_attributes(&mut self, dev: &D, path: &str) -> Result<(), FatError>;

    /// Create (or overwrite) `path` with `primary ++ secondary`.
    fn create_file(
        &mut self,
        dev: &D,
        path: &str,
        primary: &[u8],
        secondary: &[u8],
    ) -> Result<(), FatError>;

    fn move_file(&mut self, dev: &D, old_path: &str, new_path: &str) -> Result<(), FatError>;
}

/// Opens a FAT volume for sector-chain lookups. Dropping the volume closes it.
pub trait FatChainResolver<D: ?Sized> {
    type Volume<'d>: ChainVolume
    where
        D: 'd;

    fn open<'d>(&self, dev: &'d D, offset: u64) -> Result<Self::Volume<'d>, FatError>;
}

/// An open volume. Sector numbers are relative to the start of the volume.
pub trait ChainVolume {
    /// First cluster of a file in the root directory.
    fn find_root_entry(&mut self, name: &str) -> Result<Option<u32>, FatError>;

    /// First sector of a data cluster; `None` for clusters outside the data area.
    fn cluster_to_sector(&self, cluster: u32) -> Option<u64>;

    /// Sector following `sector` in its file, `None` at end of chain.
    fn next_sector(&mut self, sector: u64) -> Result<Option<u64>, FatError>;
}
