//! Auxiliary data vector (ADV).
//!
//! Two identical 512-byte slots are stored right after the loader image. Each
//! slot is framed by two magic numbers and carries a checksum over its data
//! area. The installer always writes the empty ("vacuous") block; whatever a
//! previous install left behind is not carried over.

use super::get_u32;

pub const ADV_SIZE: usize = 512;
/// Payload bytes per slot (slot minus head magic, checksum, tail magic)
pub const ADV_LEN: usize = ADV_SIZE - 3 * 4;

pub const ADV_MAGIC1: u32 = 0x5a2d_2fa5; // head
pub const ADV_MAGIC2: u32 = 0xa304_1767; // checksum total
pub const ADV_MAGIC3: u32 = 0xdd28_bf64; // tail

/// Both ADV slots, back to back.
#[derive(Clone, PartialEq, Eq)]
pub struct AuxData([u8; 2 * ADV_SIZE]);

impl AuxData {
    /// An ADV with an all-zero payload and valid framing in both slots.
    pub fn vacuous() -> Self {
        let mut slot = [0u8; ADV_SIZE];
        seal(&mut slot);

        let mut bytes = [0u8; 2 * ADV_SIZE];
        bytes[..ADV_SIZE].copy_from_slice(&slot);
        bytes[ADV_SIZE..].copy_from_slice(&slot);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check framing and checksum of one slot.
    pub fn slot_is_valid(slot: &[u8]) -> bool {
        if slot.len() != ADV_SIZE {
            return false;
        }
        if get_u32(slot, 0) != ADV_MAGIC1 || get_u32(slot, ADV_SIZE - 4) != ADV_MAGIC3 {
            return false;
        }

        let total = (4..ADV_SIZE - 4)
            .step_by(4)
            .fold(0u32, |acc, off| acc.wrapping_add(get_u32(slot, off)));
        total == ADV_MAGIC2
    }
}

impl core::fmt::Debug for AuxData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuxData")
            .field("len", &self.0.len())
            .finish()
    }
}

fn seal(slot: &mut [u8; ADV_SIZE]) {
    slot[..4].copy_from_slice(&ADV_MAGIC1.to_le_bytes());

    let mut csum = ADV_MAGIC2;
    for off in (8..ADV_SIZE - 4).step_by(4) {
        csum = csum.wrapping_sub(get_u32(slot, off));
    }
    slot[4..8].copy_from_slice(&csum.to_le_bytes());
    slot[ADV_SIZE - 4..].copy_from_slice(&ADV_MAGIC3.to_le_bytes());
}
