//! Raw device access.
//!
//! Every byte that reaches the target goes through [`positioned_read`] or
//! [`positioned_write`]. Both keep going until the whole buffer has moved,
//! retry transparently when a transfer is interrupted, and treat a zero-byte
//! transfer as fatal: a half-written boot sector cannot be resumed safely.

mod volume_io;

pub use volume_io::VolumeIo;

use std::fmt;
use std::io;

/// What `stat` says the target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    BlockDevice,
    RegularFile,
    Other,
}

/// A device that supports positioned transfers.
///
/// A single call may move fewer bytes than asked; callers that need the full
/// buffer use [`positioned_read`] / [`positioned_write`].
pub trait RawDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;
    fn kind(&self) -> io::Result<DeviceKind>;
    fn sync(&self) -> io::Result<()>;
}

#[cfg(unix)]
impl RawDevice for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }

    fn kind(&self) -> io::Result<DeviceKind> {
        use std::os::unix::fs::FileTypeExt;

        let file_type = self.metadata()?.file_type();
        Ok(if file_type.is_block_device() {
            DeviceKind::BlockDevice
        } else if file_type.is_file() {
            DeviceKind::RegularFile
        } else {
            DeviceKind::Other
        })
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }
}

impl<D: RawDevice + ?Sized> RawDevice for &D {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset)
    }

    fn kind(&self) -> io::Result<DeviceKind> {
        (**self).kind()
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// A positioned transfer that could not be completed.
#[derive(Debug)]
pub enum TransferError {
    /// The device accepted or delivered zero bytes.
    Short { direction: Direction, offset: u64 },
    /// The device reported an error other than interruption.
    Io {
        direction: Direction,
        offset: u64,
        source: io::Error,
    },
}

impl TransferError {
    pub fn offset(&self) -> u64 {
        match self {
            Self::Short { offset, .. } | Self::Io { offset, .. } => *offset,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short {
                direction: Direction::Read,
                ..
            } => write!(f, "short read"),
            Self::Short {
                direction: Direction::Write,
                ..
            } => write!(f, "short write"),
            Self::Io { source, .. } => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Short { .. } => None,
        }
    }
}

/// Read exactly `buf.len()` bytes starting at `offset`.
pub fn positioned_read<D: RawDevice + ?Sized>(
    dev: &D,
    buf: &mut [u8],
    offset: u64,
) -> Result<usize, TransferError> {
    let mut done = 0;
    while done < buf.len() {
        let at = offset + done as u64;
        match dev.read_at(&mut buf[done..], at) {
            Ok(0) => {
                return Err(TransferError::Short {
                    direction: Direction::Read,
                    offset: at,
                })
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransferError::Io {
                    direction: Direction::Read,
                    offset: at,
                    source,
                })
            }
        }
    }
    Ok(done)
}

/// Write all of `buf` starting at `offset`.
pub fn positioned_write<D: RawDevice + ?Sized>(
    dev: &D,
    buf: &[u8],
    offset: u64,
) -> Result<usize, TransferError> {
    let mut done = 0;
    while done < buf.len() {
        let at = offset + done as u64;
        match dev.write_at(&buf[done..], at) {
            Ok(0) => {
                return Err(TransferError::Short {
                    direction: Direction::Write,
                    offset: at,
                })
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransferError::Io {
                    direction: Direction::Write,
                    offset: at,
                    source,
                })
            }
        }
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemDevice;

    // --- Reassembly Tests ---

    #[test]
    fn test_read_reassembles_partial_chunks() {
        let dev = MemDevice::new((0..8192).map(|i| (i % 251) as u8).collect());
        dev.set_max_chunk(Some(300));

        let mut buf = vec![0u8; 4096];
        let n = positioned_read(&dev, &mut buf, 1000).unwrap();

        assert_eq!(n, 4096);
        let expected: Vec<u8> = (1000..5096).map(|i| (i % 251) as u8).collect();
        assert_eq!(buf, expected);

        let calls = dev.read_log();
        // 13 chunks of 300 plus a 196-byte remainder
        assert_eq!(calls.len(), 14);
        let mut next = 1000u64;
        for (offset, len) in &calls {
            assert_eq!(*offset, next);
            next += *len as u64;
        }
        assert_eq!(next, 1000 + 4096);
    }

    #[test]
    fn test_write_reassembles_partial_chunks() {
        let dev = MemDevice::zeroed(8192);
        dev.set_max_chunk(Some(300));

        let data = vec![0xA5u8; 4096];
        let n = positioned_write(&dev, &data, 512).unwrap();

        assert_eq!(n, 4096);
        assert!(dev.snapshot()[512..4608].iter().all(|&b| b == 0xA5));
        assert!(dev.snapshot()[..512].iter().all(|&b| b == 0));

        let sizes: Vec<usize> = dev.write_log().iter().map(|(_, len)| *len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 4096);
        assert!(sizes[..sizes.len() - 1].iter().all(|&s| s == 300));
    }

    // --- Failure Policy Tests ---

    #[test]
    fn test_interrupted_transfers_are_retried() {
        let dev = MemDevice::zeroed(4096);
        dev.interrupt_next(3);

        let mut buf = [0u8; 512];
        assert_eq!(positioned_read(&dev, &mut buf, 0).unwrap(), 512);
        dev.interrupt_next(2);
        assert_eq!(positioned_write(&dev, &buf, 512).unwrap(), 512);
    }

    #[test]
    fn test_read_past_end_is_short_read() {
        let dev = MemDevice::zeroed(1024);
        let mut buf = [0u8; 512];
        let err = positioned_read(&dev, &mut buf, 768).unwrap_err();

        assert!(matches!(
            err,
            TransferError::Short {
                direction: Direction::Read,
                offset: 1024
            }
        ));
        assert_eq!(err.to_string(), "short read");
    }

    #[test]
    fn test_write_past_end_is_short_write() {
        let dev = MemDevice::zeroed(1024);
        let err = positioned_write(&dev, &[1u8; 512], 1024).unwrap_err();
        assert_eq!(err.to_string(), "short write");
        assert_eq!(err.offset(), 1024);
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let dev = MemDevice::zeroed(1024);
        dev.fail_with(io::ErrorKind::PermissionDenied);

        let err = positioned_write(&dev, &[1u8; 16], 0).unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
        assert!(dev.write_log().is_empty());
    }
}
