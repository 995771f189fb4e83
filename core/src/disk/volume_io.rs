//! BlockIo adapter for a FAT volume living at a byte offset inside a device.
//!
//! The native FAT backend is written against `gpt_disk_io::BlockIo`; this
//! adapter maps its logical blocks onto the raw device so that LBA 0 is the
//! volume's boot sector, whatever the install offset is.
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │        FAT backend (fs::fat_ops)       │
//! └───────────────────┬────────────────────┘
//!                     │ gpt_disk_io::BlockIo
//!                     ▼
//! ┌────────────────────────────────────────┐
//! │        VolumeIo (this)                 │
//! │  LBA n -> offset + n * 512             │
//! └───────────────────┬────────────────────┘
//!                     │ positioned_read / positioned_write
//!                     ▼
//! ┌────────────────────────────────────────┐
//! │        RawDevice                       │
//! └────────────────────────────────────────┘
//! ```

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use std::io;

use super::{positioned_read, positioned_write, Direction, RawDevice, TransferError};
use crate::SECTOR_SIZE;

/// Block view of one volume on a raw device.
pub struct VolumeIo<'d, D: RawDevice + ?Sized> {
    dev: &'d D,
    offset: u64,
}

impl<'d, D: RawDevice + ?Sized> VolumeIo<'d, D> {
    pub fn new(dev: &'d D, offset: u64) -> Self {
        Self { dev, offset }
    }

    fn byte_offset(&self, lba: Lba, direction: Direction) -> Result<u64, TransferError> {
        lba.0
            .checked_mul(SECTOR_SIZE as u64)
            .and_then(|b| b.checked_add(self.offset))
            .ok_or(TransferError::Io {
                direction,
                offset: u64::MAX,
                source: io::Error::new(io::ErrorKind::InvalidInput, "block address overflow"),
            })
    }

    fn check_len(len: usize, direction: Direction, offset: u64) -> Result<(), TransferError> {
        if len % SECTOR_SIZE != 0 {
            return Err(TransferError::Io {
                direction,
                offset,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "buffer is not a whole number of blocks",
                ),
            });
        }
        Ok(())
    }
}

impl<'d, D: RawDevice + ?Sized> BlockIo for VolumeIo<'d, D> {
    type Error = TransferError;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        // Probe for the last readable block; the device size is not known
        // through RawDevice alone.
        let mut probe = [0u8; SECTOR_SIZE];
        let (mut lo, mut hi) = (0u64, 1u64 << 40);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let at = self.offset + mid * SECTOR_SIZE as u64;
            match self.dev.read_at(&mut probe[..1], at) {
                Ok(n) if n > 0 => lo = mid + 1,
                _ => hi = mid,
            }
        }
        Ok(lo)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = self.byte_offset(start_lba, Direction::Read)?;
        Self::check_len(dst.len(), Direction::Read, offset)?;
        positioned_read(self.dev, dst, offset)?;
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = self.byte_offset(start_lba, Direction::Write)?;
        Self::check_len(src.len(), Direction::Write, offset)?;
        positioned_write(self.dev, src, offset)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.dev.sync().map_err(|source| TransferError::Io {
            direction: Direction::Write,
            offset: self.offset,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemDevice;

    #[test]
    fn test_lba_is_relative_to_offset() {
        let dev = MemDevice::zeroed(8 * SECTOR_SIZE);
        let mut io = VolumeIo::new(&dev, 2 * SECTOR_SIZE as u64);

        io.write_blocks(Lba(1), &[0x5Au8; SECTOR_SIZE]).unwrap();

        let image = dev.snapshot();
        assert!(image[3 * SECTOR_SIZE..4 * SECTOR_SIZE].iter().all(|&b| b == 0x5A));
        assert!(image[..3 * SECTOR_SIZE].iter().all(|&b| b == 0));

        let mut back = [0u8; SECTOR_SIZE];
        io.read_blocks(Lba(1), &mut back).unwrap();
        assert_eq!(back, [0x5Au8; SECTOR_SIZE]);
    }

    #[test]
    fn test_partial_block_buffers_are_rejected() {
        let dev = MemDevice::zeroed(4 * SECTOR_SIZE);
        let mut io = VolumeIo::new(&dev, 0);
        assert!(io.write_blocks(Lba(0), &[0u8; 100]).is_err());
        assert!(dev.write_log().is_empty());
    }

    #[test]
    fn test_num_blocks_probes_device_size() {
        let dev = MemDevice::zeroed(10 * SECTOR_SIZE);
        let mut io = VolumeIo::new(&dev, SECTOR_SIZE as u64);
        assert_eq!(io.num_blocks().unwrap(), 9);
    }
}
