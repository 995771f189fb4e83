//! Test fixtures: an in-memory device, formatted FAT images and a synthetic
//! loader image with a patch area at known offsets.

use std::cell::RefCell;
use std::io;

use crate::boot::patch::LDLINUX_MAGIC;
use crate::boot::FatKind;
use crate::disk::{DeviceKind, RawDevice};
use crate::SECTOR_SIZE;

#[derive(Debug)]
struct State {
    data: Vec<u8>,
    kind: DeviceKind,
    max_chunk: Option<usize>,
    interrupts: usize,
    failure: Option<io::ErrorKind>,
    write_failure: Option<(u64, io::ErrorKind)>,
    sync_failure: Option<io::ErrorKind>,
    reads: Vec<(u64, usize)>,
    writes: Vec<(u64, usize)>,
    syncs: usize,
}

/// Fixed-size device backed by a `Vec`. Transfers never extend it: reading
/// or writing at the end moves zero bytes.
#[derive(Debug)]
pub struct MemDevice {
    state: RefCell<State>,
}

impl MemDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            state: RefCell::new(State {
                data,
                kind: DeviceKind::BlockDevice,
                max_chunk: None,
                interrupts: 0,
                failure: None,
                write_failure: None,
                sync_failure: None,
                reads: Vec::new(),
                writes: Vec::new(),
                syncs: 0,
            }),
        }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Cap every single transfer at `max` bytes.
    pub fn set_max_chunk(&self, max: Option<usize>) {
        self.state.borrow_mut().max_chunk = max;
    }

    /// Fail the next `n` transfers with `Interrupted`.
    pub fn interrupt_next(&self, n: usize) {
        self.state.borrow_mut().interrupts = n;
    }

    /// Fail every transfer from now on.
    pub fn fail_with(&self, kind: io::ErrorKind) {
        self.state.borrow_mut().failure = Some(kind);
    }

    /// Fail writes that start at `offset`; everything else goes through.
    pub fn fail_writes_at(&self, offset: u64, kind: io::ErrorKind) {
        self.state.borrow_mut().write_failure = Some((offset, kind));
    }

    pub fn fail_sync(&self, kind: io::ErrorKind) {
        self.state.borrow_mut().sync_failure = Some(kind);
    }

    pub fn set_kind(&self, kind: DeviceKind) {
        self.state.borrow_mut().kind = kind;
    }

    /// `(offset, len)` of every read that moved data.
    pub fn read_log(&self) -> Vec<(u64, usize)> {
        self.state.borrow().reads.clone()
    }

    /// `(offset, len)` of every write that moved data.
    pub fn write_log(&self) -> Vec<(u64, usize)> {
        self.state.borrow().writes.clone()
    }

    pub fn syncs(&self) -> usize {
        self.state.borrow().syncs
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.state.borrow().data.clone()
    }

    fn span(state: &State, len: usize, offset: u64) -> Option<(usize, usize)> {
        let start = usize::try_from(offset).ok()?;
        if start >= state.data.len() {
            return None;
        }
        let mut n = len.min(state.data.len() - start);
        if let Some(max) = state.max_chunk {
            n = n.min(max);
        }
        Some((start, n))
    }

    fn check_failure(state: &mut State) -> io::Result<()> {
        if state.interrupts > 0 {
            state.interrupts -= 1;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        match state.failure {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }
}

impl RawDevice for MemDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        Self::check_failure(&mut state)?;
        let Some((start, n)) = Self::span(&state, buf.len(), offset) else {
            return Ok(0);
        };
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        if n > 0 {
            state.reads.push((offset, n));
        }
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        Self::check_failure(&mut state)?;
        if let Some((at, kind)) = state.write_failure {
            if at == offset {
                return Err(io::Error::from(kind));
            }
        }
        let Some((start, n)) = Self::span(&state, buf.len(), offset) else {
            return Ok(0);
        };
        state.data[start..start + n].copy_from_slice(&buf[..n]);
        if n > 0 {
            state.writes.push((offset, n));
        }
        Ok(n)
    }

    fn kind(&self) -> io::Result<DeviceKind> {
        Ok(self.state.borrow().kind)
    }

    fn sync(&self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        Self::check_failure(&mut state)?;
        if let Some(kind) = state.sync_failure {
            return Err(io::Error::from(kind));
        }
        state.syncs += 1;
        Ok(())
    }
}

// --- FAT images ---

struct Geometry {
    total_sectors: u32,
    sectors_per_cluster: u8,
    reserved: u16,
    fat_size: u32,
    root_entries: u16,
    media: u8,
}

fn geometry(kind: FatKind) -> Geometry {
    match kind {
        FatKind::Fat12 => Geometry {
            total_sectors: 2880,
            sectors_per_cluster: 1,
            reserved: 1,
            fat_size: 9,
            root_entries: 224,
            media: 0xF0,
        },
        FatKind::Fat16 => Geometry {
            total_sectors: 32768,
            sectors_per_cluster: 4,
            reserved: 4,
            fat_size: 32,
            root_entries: 512,
            media: 0xF8,
        },
        FatKind::Fat32 => Geometry {
            total_sectors: 66600,
            sectors_per_cluster: 1,
            reserved: 32,
            fat_size: 516,
            root_entries: 0,
            media: 0xF8,
        },
    }
}

/// A freshly formatted boot sector with two FATs.
pub fn boot_sector(kind: FatKind) -> [u8; SECTOR_SIZE] {
    let g = geometry(kind);
    let mut bs = [0u8; SECTOR_SIZE];
    bs[..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    bs[3..11].copy_from_slice(b"MSWIN4.1");
    bs[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    bs[13] = g.sectors_per_cluster;
    bs[14..16].copy_from_slice(&g.reserved.to_le_bytes());
    bs[16] = 2;
    bs[17..19].copy_from_slice(&g.root_entries.to_le_bytes());
    bs[21] = g.media;
    bs[24..26].copy_from_slice(&63u16.to_le_bytes());
    bs[26..28].copy_from_slice(&255u16.to_le_bytes());

    match kind {
        FatKind::Fat12 | FatKind::Fat16 => {
            bs[19..21].copy_from_slice(&(g.total_sectors as u16).to_le_bytes());
            bs[22..24].copy_from_slice(&(g.fat_size as u16).to_le_bytes());
            bs[38] = 0x29;
            bs[39..43].copy_from_slice(&0x1234_5678u32.to_le_bytes());
            bs[43..54].copy_from_slice(b"NO NAME    ");
            let name: &[u8; 8] = if kind == FatKind::Fat12 {
                b"FAT12   "
            } else {
                b"FAT16   "
            };
            bs[54..62].copy_from_slice(name);
        }
        FatKind::Fat32 => {
            bs[32..36].copy_from_slice(&g.total_sectors.to_le_bytes());
            bs[36..40].copy_from_slice(&g.fat_size.to_le_bytes());
            bs[44..48].copy_from_slice(&2u32.to_le_bytes());
            bs[48..50].copy_from_slice(&1u16.to_le_bytes());
            bs[50..52].copy_from_slice(&6u16.to_le_bytes());
            bs[66] = 0x29;
            bs[67..71].copy_from_slice(&0x1234_5678u32.to_le_bytes());
            bs[71..82].copy_from_slice(b"NO NAME    ");
            bs[82..90].copy_from_slice(b"FAT32   ");
        }
    }

    bs[510] = 0x55;
    bs[511] = 0xAA;
    bs
}

/// A whole empty volume: boot sector, reserved FAT entries, empty root.
pub fn format_volume(kind: FatKind) -> MemDevice {
    format_volume_at(kind, 0)
}

/// Same as [`format_volume`], with `offset` bytes of zeros in front.
pub fn format_volume_at(kind: FatKind, offset: u64) -> MemDevice {
    let g = geometry(kind);
    let base = offset as usize;
    let mut image = vec![0u8; base + g.total_sectors as usize * SECTOR_SIZE];
    let bs = boot_sector(kind);
    image[base..base + SECTOR_SIZE].copy_from_slice(&bs);

    let reserved_entries: &[u8] = match kind {
        FatKind::Fat12 => &[g.media, 0xFF, 0xFF],
        FatKind::Fat16 => &[g.media, 0xFF, 0xFF, 0xFF],
        // entry 2 terminates the one-cluster root directory
        FatKind::Fat32 => &[
            g.media, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F,
        ],
    };
    for copy in 0..2 {
        let at = base + (g.reserved as usize + copy * g.fat_size as usize) * SECTOR_SIZE;
        image[at..at + reserved_entries.len()].copy_from_slice(reserved_entries);
    }

    if kind == FatKind::Fat32 {
        let at = base + SECTOR_SIZE;
        let info = &mut image[at..at + SECTOR_SIZE];
        info[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
        info[484..488].copy_from_slice(&0x6141_7272u32.to_le_bytes());
        info[488..492].copy_from_slice(&65535u32.to_le_bytes());
        info[492..496].copy_from_slice(&3u32.to_le_bytes());
        info[508..512].copy_from_slice(&0xAA55_0000u32.to_le_bytes());
    }

    MemDevice::new(image)
}

// --- Loader images ---

/// Layout of the synthetic loader image.
pub mod fixture {
    pub const PATCH_AREA: usize = 64;
    pub const EPA: usize = 96;
    pub const ADV_PTR: usize = 128;
    pub const DIR: usize = 144;
    pub const DIR_LEN: usize = 64;
    pub const SUBVOL: usize = 208;
    pub const SUBVOL_LEN: usize = 32;
    pub const SECPTR: usize = 256;
    pub const SECPTR_COUNT: usize = 64;
    /// Boot stub offsets
    pub const SECT1PTR0: usize = 492;
    pub const SECT1PTR1: usize = 496;
    pub const RAID_PATCH: usize = 500;
    pub const DEFAULT_MAX_TRANSFER: u16 = 127;
    /// Smallest image that holds every field
    pub const MIN_IMAGE: usize = SECPTR + SECPTR_COUNT * 10;
}

/// A boot sector template; its code bytes are recognizable.
pub fn boot_stub() -> [u8; SECTOR_SIZE] {
    let mut stub = [0u8; SECTOR_SIZE];
    for (i, b) in stub.iter_mut().enumerate() {
        *b = (i * 3 % 256) as u8;
    }
    stub[..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    stub[510] = 0x55;
    stub[511] = 0xAA;
    stub
}

pub fn loader_image(len: usize) -> Vec<u8> {
    loader_image_with(len, fixture::SECPTR_COUNT)
}

/// Loader image of `len` bytes with room for `secptr_count` extents.
pub fn loader_image_with(len: usize, secptr_count: usize) -> Vec<u8> {
    use fixture::*;

    assert!(len >= MIN_IMAGE, "loader image too small");
    let mut image: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let put16 = |image: &mut Vec<u8>, at: usize, v: u16| {
        image[at..at + 2].copy_from_slice(&v.to_le_bytes());
    };

    image[PATCH_AREA..PATCH_AREA + 4].copy_from_slice(&LDLINUX_MAGIC.to_le_bytes());
    image[PATCH_AREA + 4..PATCH_AREA + 8].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    put16(&mut image, PATCH_AREA + 20, DEFAULT_MAX_TRANSFER);
    put16(&mut image, PATCH_AREA + 22, EPA as u16);

    let fields = [
        ADV_PTR,
        DIR,
        DIR_LEN,
        SUBVOL,
        SUBVOL_LEN,
        SECPTR,
        secptr_count,
        SECT1PTR0,
        SECT1PTR1,
        RAID_PATCH,
    ];
    for (i, value) in fields.into_iter().enumerate() {
        put16(&mut image, EPA + i * 2, value as u16);
    }
    image
}
