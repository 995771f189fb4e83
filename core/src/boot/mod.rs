//! On-disk formats owned by the installer: the boot sector, the auxiliary
//! data block appended to the loader, and the loader's self-location patch.

pub mod adv;
pub mod bootsect;
pub mod patch;

pub use adv::{AuxData, ADV_SIZE};
pub use bootsect::{BootSector, BootSectorError, Bpb, FatKind};
pub use patch::{needed_sectors, patch, PatchError, PatchFlags, PatchInput, Patched};

pub(crate) fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

pub(crate) fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
