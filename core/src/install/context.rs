//! Per-run install state.
//!
//! Self-contained: the caller opens the device and reads the loader files,
//! the orchestrator only ever sees these values.

use crate::boot::PatchFlags;
use crate::SECTOR_SIZE;

/// What the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Byte offset of the filesystem inside the device
    pub offset: u64,
    /// Install subdirectory, as given
    pub directory: Option<String>,
    /// Skip the block-device / regular-file check
    pub force: bool,
    pub flags: PatchFlags,
}

/// Loader payloads, as shipped.
#[derive(Debug, Clone)]
pub struct LoaderSet {
    /// Boot sector template
    pub boot_stub: [u8; SECTOR_SIZE],
    /// Primary loader image; gets patched
    pub primary: Vec<u8>,
    /// Secondary loader module; copied as is
    pub secondary: Option<Vec<u8>>,
}

/// State shared by every step of one run.
#[derive(Debug)]
pub struct InstallContext {
    /// Prefix for diagnostics
    pub program: String,
    /// Target path, for diagnostics
    pub device: String,
    pub options: InstallOptions,
    warnings: Vec<String>,
}

impl InstallContext {
    pub fn new(program: impl Into<String>, device: impl Into<String>, options: InstallOptions) -> Self {
        Self {
            program: program.into(),
            device: device.into(),
            options,
            warnings: Vec::new(),
        }
    }

    /// Report a non-fatal problem and keep going.
    pub fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
