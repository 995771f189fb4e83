//! sysfat core: installs a first-stage boot loader onto a FAT12/16/32 volume
//! without mounting it.
//!
//! The pieces, leaves first:
//! - [`disk`]: retry-safe positioned I/O and a `BlockIo` view of a volume
//! - [`boot`]: boot sector codec, auxiliary data block, loader patching
//! - [`fs`]: collaborator traits plus the native FAT backend
//! - [`install`]: the install protocol and its failure policy

pub mod boot;
pub mod disk;
pub mod fs;
pub mod install;
pub mod logger;

#[cfg(test)]
pub(crate) mod testing;

/// Logical sector size. Only 512-byte sector volumes are supported.
pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_SHIFT: u32 = 9;
