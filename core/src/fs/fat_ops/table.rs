// In-memory copy of the file allocation table

use std::collections::BTreeSet;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::context::FatContext;
use crate::boot::FatKind;
use crate::fs::FatError;
use crate::SECTOR_SIZE;

const FSINFO_LEAD_SIG: u32 = 0x4161_5252;
const FSINFO_STRUCT_SIG: u32 = 0x6141_7272;
const FSINFO_FREE_COUNT: usize = 488;
const FSINFO_NEXT_FREE: usize = 492;

/// The first FAT copy, loaded whole. Modified sectors are written back to
/// every copy on [`FatTable::flush`].
pub struct FatTable {
    kind: FatKind,
    bytes: Vec<u8>,
    dirty: BTreeSet<usize>,
    max_cluster: u32,
}

impl FatTable {
    pub fn load<B: BlockIo>(block_io: &mut B, ctx: &FatContext) -> Result<Self, FatError> {
        let mut bytes = vec![0u8; ctx.fat_size as usize * SECTOR_SIZE];
        block_io
            .read_blocks(Lba(ctx.fat_start), &mut bytes)
            .map_err(FatError::block)?;

        // Never index past what the table can hold, whatever the BPB claims
        let capacity = match ctx.kind {
            FatKind::Fat12 => bytes.len() * 2 / 3,
            FatKind::Fat16 => bytes.len() / 2,
            FatKind::Fat32 => bytes.len() / 4,
        };
        let max_cluster = ctx
            .max_cluster()
            .min(capacity.saturating_sub(1).min(u32::MAX as usize) as u32);

        Ok(Self {
            kind: ctx.kind,
            bytes,
            dirty: BTreeSet::new(),
            max_cluster,
        })
    }

    pub fn max_cluster(&self) -> u32 {
        self.max_cluster
    }

    pub fn end_marker(&self) -> u32 {
        match self.kind {
            FatKind::Fat12 => 0xFFF,
            FatKind::Fat16 => 0xFFFF,
            FatKind::Fat32 => 0x0FFF_FFFF,
        }
    }

    pub fn is_end(&self, value: u32) -> bool {
        match self.kind {
            FatKind::Fat12 => value >= 0xFF8,
            FatKind::Fat16 => value >= 0xFFF8,
            FatKind::Fat32 => value >= 0x0FFF_FFF8,
        }
    }

    pub fn get(&self, cluster: u32) -> u32 {
        let c = cluster as usize;
        match self.kind {
            FatKind::Fat12 => {
                let off = c + c / 2;
                let pair = u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]]);
                if c & 1 == 1 {
                    (pair >> 4) as u32
                } else {
                    (pair & 0x0FFF) as u32
                }
            }
            FatKind::Fat16 => u16::from_le_bytes([self.bytes[c * 2], self.bytes[c * 2 + 1]]) as u32,
            FatKind::Fat32 => {
                let off = c * 4;
                u32::from_le_bytes([
                    self.bytes[off],
                    self.bytes[off + 1],
                    self.bytes[off + 2],
                    self.bytes[off + 3],
                ]) & 0x0FFF_FFFF
            }
        }
    }

    pub fn set(&mut self, cluster: u32, value: u32) {
        let c = cluster as usize;
        match self.kind {
            FatKind::Fat12 => {
                let off = c + c / 2;
                let mut pair = u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]]);
                let v = (value & 0x0FFF) as u16;
                pair = if c & 1 == 1 {
                    (pair & 0x000F) | (v << 4)
                } else {
                    (pair & 0xF000) | v
                };
                self.bytes[off..off + 2].copy_from_slice(&pair.to_le_bytes());
                self.mark(off, 2);
            }
            FatKind::Fat16 => {
                let off = c * 2;
                self.bytes[off..off + 2].copy_from_slice(&(value as u16).to_le_bytes());
                self.mark(off, 2);
            }
            FatKind::Fat32 => {
                let off = c * 4;
                // top nibble is reserved and must be preserved
                let old = u32::from_le_bytes([
                    self.bytes[off],
                    self.bytes[off + 1],
                    self.bytes[off + 2],
                    self.bytes[off + 3],
                ]);
                let new = (old & 0xF000_0000) | (value & 0x0FFF_FFFF);
                self.bytes[off..off + 4].copy_from_slice(&new.to_le_bytes());
                self.mark(off, 4);
            }
        }
    }

    fn mark(&mut self, off: usize, len: usize) {
        self.dirty.insert(off / SECTOR_SIZE);
        self.dirty.insert((off + len - 1) / SECTOR_SIZE);
    }

    fn is_valid(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster <= self.max_cluster
    }

    /// Successor of `cluster`, `None` at end of chain.
    pub fn next(&self, cluster: u32) -> Result<Option<u32>, FatError> {
        if !self.is_valid(cluster) {
            return Err(FatError::CorruptChain(cluster));
        }
        let value = self.get(cluster);
        if self.is_end(value) {
            Ok(None)
        } else if self.is_valid(value) {
            Ok(Some(value))
        } else {
            Err(FatError::CorruptChain(cluster))
        }
    }

    /// All clusters of the chain starting at `first`.
    pub fn chain(&self, first: u32) -> Result<Vec<u32>, FatError> {
        let mut clusters = vec![first];
        let mut current = first;
        while let Some(next) = self.next(current)? {
            if clusters.len() > self.max_cluster as usize {
                return Err(FatError::CorruptChain(next));
            }
            clusters.push(next);
            current = next;
        }
        Ok(clusters)
    }

    /// Allocate and link `count` free clusters, first fit.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<u32>, FatError> {
        let clusters: Vec<u32> = (2..=self.max_cluster)
            .filter(|&c| self.get(c) == 0)
            .take(count)
            .collect();
        if clusters.len() < count {
            return Err(FatError::NoSpace);
        }

        for pair in clusters.windows(2) {
            self.set(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            let end = self.end_marker();
            self.set(last, end);
        }
        Ok(clusters)
    }

    pub fn free_chain(&mut self, first: u32) -> Result<(), FatError> {
        for cluster in self.chain(first)? {
            self.set(cluster, 0);
        }
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        (2..=self.max_cluster).filter(|&c| self.get(c) == 0).count()
    }

    /// Write modified sectors to every FAT copy.
    pub fn flush<B: BlockIo>(&mut self, block_io: &mut B, ctx: &FatContext) -> Result<(), FatError> {
        if self.dirty.is_empty() {
            return Ok(());
        }

        for &sector in &self.dirty {
            let data = &self.bytes[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE];
            for copy in 0..ctx.num_fats as u64 {
                let lba = ctx.fat_start + copy * ctx.fat_size as u64 + sector as u64;
                #[cfg(feature = "fat_debug")]
                log::debug!("FAT sector {} -> LBA {}", sector, lba);
                block_io
                    .write_blocks(Lba(lba), data)
                    .map_err(FatError::block)?;
            }
        }
        self.dirty.clear();

        if let Some(fs_info) = ctx.fs_info_sector {
            invalidate_fs_info(block_io, fs_info)?;
        }
        Ok(())
    }
}

/// The free-cluster hints are no longer true; mark them unknown.
fn invalidate_fs_info<B: BlockIo>(block_io: &mut B, sector: u64) -> Result<(), FatError> {
    let mut data = [0u8; SECTOR_SIZE];
    block_io
        .read_blocks(Lba(sector), &mut data)
        .map_err(FatError::block)?;

    let sig = |off: usize| u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);
    if sig(0) != FSINFO_LEAD_SIG || sig(484) != FSINFO_STRUCT_SIG {
        return Ok(());
    }

    data[FSINFO_FREE_COUNT..FSINFO_FREE_COUNT + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    data[FSINFO_NEXT_FREE..FSINFO_NEXT_FREE + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    block_io
        .write_blocks(Lba(sector), &data)
        .map_err(FatError::block)
}
