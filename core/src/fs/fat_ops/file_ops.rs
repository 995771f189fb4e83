// FAT file create/move/retag operations

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::directory::{DirLocation, Directory};
use super::filename::short_name;
use super::path::DiskPath;
use super::types::{Attributes, DirEntry, DIR_ENTRY_SIZE};
use super::FatVolume;
use crate::fs::FatError;
use crate::SECTOR_SIZE;

impl<B: BlockIo> FatVolume<B> {
    /// Walk `components` from the root; every one must be a directory.
    fn resolve_dir(&mut self, components: &[String]) -> Result<DirLocation, FatError> {
        let mut location = self.ctx.root();
        for component in components {
            let name = short_name(component)?;
            let dir = Directory::open(&mut self.io, &self.ctx, &self.fat, location)?;
            let index = dir.find(&name.bytes).ok_or(FatError::NotFound)?;
            let entry = dir.entry(index);
            if !entry.is_directory() {
                return Err(FatError::NotADirectory);
            }
            location = self.ctx.dir_location(entry.first_cluster);
        }
        Ok(location)
    }

    /// Parent directory of `path` plus the final component.
    fn open_parent(&mut self, path: &DiskPath) -> Result<(Directory, String), FatError> {
        let (parents, name) = path
            .split_last()
            .ok_or_else(|| FatError::InvalidPath("/".to_string()))?;
        let name = name.to_string();
        let location = self.resolve_dir(parents)?;
        let dir = Directory::open(&mut self.io, &self.ctx, &self.fat, location)?;
        Ok((dir, name))
    }

    /// Add or remove the read-only, hidden and system bits of `path`.
    pub fn set_protection(&mut self, path: &str, protect: bool) -> Result<(), FatError> {
        let path = DiskPath::parse(path)?;
        let (mut dir, name) = self.open_parent(&path)?;
        let index = dir
            .find(&short_name(&name)?.bytes)
            .ok_or(FatError::NotFound)?;

        let mut entry = dir.entry(index);
        entry.attr.set(Attributes::PROTECTED, protect);
        dir.set_entry(index, &entry);
        dir.flush(&mut self.io)
    }

    /// Create or overwrite `path` with `primary` followed by `secondary`.
    pub fn create_file(
        &mut self,
        path: &str,
        primary: &[u8],
        secondary: &[u8],
    ) -> Result<(), FatError> {
        let path = DiskPath::parse(path)?;
        let (mut dir, name) = self.open_parent(&path)?;
        let sn = short_name(&name)?;

        let total = primary.len() + secondary.len();
        let size = u32::try_from(total).map_err(|_| FatError::FileTooLarge)?;

        let existing = dir.find(&sn.bytes);
        if let Some(index) = existing {
            let old = dir.entry(index);
            if old.is_directory() {
                return Err(FatError::IsADirectory);
            }
            if old.attr.contains(Attributes::READ_ONLY) {
                return Err(FatError::ReadOnly);
            }
            if old.first_cluster != 0 {
                self.fat.free_chain(old.first_cluster)?;
            }
        }

        let cluster_size = self.ctx.cluster_size();
        let clusters = self.fat.allocate(total.div_ceil(cluster_size))?;

        let mut buf = vec![0u8; cluster_size];
        let mut source = primary.iter().chain(secondary.iter());
        for &cluster in &clusters {
            let mut filled = 0;
            for (dst, src) in buf.iter_mut().zip(source.by_ref()) {
                *dst = *src;
                filled += 1;
            }
            buf[filled..].fill(0);
            self.io
                .write_blocks(Lba(self.ctx.cluster_to_sector(cluster)), &buf)
                .map_err(FatError::block)?;
        }

        let first = clusters.first().copied().unwrap_or(0);
        let entry = DirEntry::file(sn.bytes, sn.case, first, size);
        match existing {
            Some(index) => dir.set_entry(index, &entry),
            None => {
                dir.insert(&self.ctx, &mut self.fat, &entry)?;
            }
        }

        self.fat.flush(&mut self.io, &self.ctx)?;
        dir.flush(&mut self.io)
    }

    /// Rename or relocate a file. The target's parent must already exist;
    /// an existing target file is replaced.
    pub fn move_file(&mut self, old_path: &str, new_path: &str) -> Result<(), FatError> {
        let old_path = DiskPath::parse(old_path)?;
        let new_path = DiskPath::parse(new_path)?;

        let (mut src, old_name) = self.open_parent(&old_path)?;
        let src_index = src
            .find(&short_name(&old_name)?.bytes)
            .ok_or(FatError::NotFound)?;
        let mut entry = src.entry(src_index);
        if entry.is_directory() {
            return Err(FatError::IsADirectory);
        }

        let (parents, new_name) = new_path
            .split_last()
            .ok_or_else(|| FatError::InvalidPath("/".to_string()))?;
        let target = short_name(new_name)?;
        let dst_location = self.resolve_dir(parents)?;
        entry.name = target.bytes;
        entry.nt_case = target.case;

        if dst_location == src.location() {
            if let Some(index) = src.find(&target.bytes).filter(|&i| i != src_index) {
                self.replace(&mut src, index)?;
            }
            src.set_entry(src_index, &entry);
            self.fat.flush(&mut self.io, &self.ctx)?;
            return src.flush(&mut self.io);
        }

        let mut dst = Directory::open(&mut self.io, &self.ctx, &self.fat, dst_location)?;
        match dst.find(&target.bytes) {
            Some(index) => {
                self.replace(&mut dst, index)?;
                dst.set_entry(index, &entry);
            }
            None => {
                dst.insert(&self.ctx, &mut self.fat, &entry)?;
            }
        }
        src.delete(src_index);

        self.fat.flush(&mut self.io, &self.ctx)?;
        dst.flush(&mut self.io)?;
        src.flush(&mut self.io)
    }

    /// Drop an existing move target and its clusters.
    fn replace(&mut self, dir: &mut Directory, index: usize) -> Result<(), FatError> {
        let victim = dir.entry(index);
        if victim.is_directory() {
            return Err(FatError::IsADirectory);
        }
        if victim.attr.contains(Attributes::READ_ONLY) {
            return Err(FatError::ReadOnly);
        }
        if victim.first_cluster != 0 {
            self.fat.free_chain(victim.first_cluster)?;
        }
        dir.delete(index);
        Ok(())
    }

    /// Create an empty directory; its parent must exist.
    pub fn create_directory(&mut self, path: &str) -> Result<(), FatError> {
        let path = DiskPath::parse(path)?;
        let (mut parent, name) = self.open_parent(&path)?;
        let sn = short_name(&name)?;
        if parent.find(&sn.bytes).is_some() {
            return Err(FatError::AlreadyExists);
        }

        let cluster = self.fat.allocate(1)?[0];
        // ".." of a first-level directory points at cluster 0
        let parent_cluster = match parent.location() {
            DirLocation::Chain(c) if c != self.ctx.root_cluster => c,
            _ => 0,
        };

        let mut data = vec![0u8; self.ctx.cluster_size()];
        let dot_entries = [(*b".          ", cluster), (*b"..         ", parent_cluster)];
        for (slot, (dot_name, first)) in dot_entries.into_iter().enumerate() {
            let mut dot = DirEntry::file(dot_name, 0, first, 0);
            dot.attr = Attributes::DIRECTORY;
            dot.write_to(&mut data[slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE]);
        }

        let mut entry = DirEntry::file(sn.bytes, sn.case, cluster, 0);
        entry.attr = Attributes::DIRECTORY;
        parent.insert(&self.ctx, &mut self.fat, &entry)?;

        let base = self.ctx.cluster_to_sector(cluster);
        for (i, sector) in data.chunks_exact(SECTOR_SIZE).enumerate() {
            self.io
                .write_blocks(Lba(base + i as u64), sector)
                .map_err(FatError::block)?;
        }
        self.fat.flush(&mut self.io, &self.ctx)?;
        parent.flush(&mut self.io)
    }

    /// Contents of a file, for verification.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, FatError> {
        let path = DiskPath::parse(path)?;
        let (dir, name) = self.open_parent(&path)?;
        let index = dir
            .find(&short_name(&name)?.bytes)
            .ok_or(FatError::NotFound)?;
        let entry = dir.entry(index);
        if entry.is_directory() {
            return Err(FatError::IsADirectory);
        }

        let size = entry.file_size as usize;
        let mut data = Vec::with_capacity(size);
        if entry.first_cluster != 0 {
            let mut buf = vec![0u8; self.ctx.cluster_size()];
            for cluster in self.fat.chain(entry.first_cluster)? {
                self.io
                    .read_blocks(Lba(self.ctx.cluster_to_sector(cluster)), &mut buf)
                    .map_err(FatError::block)?;
                data.extend_from_slice(&buf);
            }
        }
        data.truncate(size);
        Ok(data)
    }

    /// Attributes of an entry, for verification.
    pub fn attributes(&mut self, path: &str) -> Result<Attributes, FatError> {
        let path = DiskPath::parse(path)?;
        let (dir, name) = self.open_parent(&path)?;
        let index = dir
            .find(&short_name(&name)?.bytes)
            .ok_or(FatError::NotFound)?;
        Ok(dir.entry(index).attr)
    }
}
