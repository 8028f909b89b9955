//! Fixed-size file parts: slicing shared files and staging downloads.
//!
//! A download stages each part as `{index}.part` under
//! `parts/{hash}/`, then concatenates them in order once all are present.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use swarm_core::crypto::Hasher;
use swarm_core::wire::{FileHash, PART_SIZE};

/// Number of parts for a file of `size` bytes. Zero for an empty file.
pub fn num_parts(size: u64) -> u64 {
    size.div_ceil(PART_SIZE as u64)
}

/// Data length of part `index` of a `size`-byte file, or None when the
/// index is past the end.
pub fn expected_part_len(size: u64, index: u64) -> Option<usize> {
    let start = index.checked_mul(PART_SIZE as u64)?;
    if start >= size {
        return None;
    }
    Some((size - start).min(PART_SIZE as u64) as usize)
}

/// Read bytes `[part*1024, part*1024+1024)` of a file. The final part may
/// be short; a part past the end is empty.
pub fn read_part(path: &Path, part: u16) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(part as u64 * PART_SIZE as u64))?;
    let mut data = Vec::with_capacity(PART_SIZE);
    file.take(PART_SIZE as u64).read_to_end(&mut data)?;
    Ok(data)
}

/// A finished concatenation waiting to be moved into place.
#[derive(Debug)]
pub struct Assembled {
    pub path: PathBuf,
    pub hash: FileHash,
    pub size: u64,
}

/// Staging directory for one in-flight download.
#[derive(Debug, Clone)]
pub struct PartStore {
    dir: PathBuf,
}

impl PartStore {
    /// Create (or reuse) `parts_root/{hex hash}`.
    pub fn open(parts_root: &Path, hash: &FileHash) -> Result<Self> {
        let dir = parts_root.join(hex::encode(hash));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create parts dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn part_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{index}.part"))
    }

    /// Store one part. Writes are atomic: temp file, then rename.
    pub fn write_part(&self, index: u16, data: &[u8]) -> Result<()> {
        let path = self.part_path(index as u64);
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("failed to create temp part: {}", tmp.display()))?;
        file.write_all(data)
            .with_context(|| format!("failed to write part: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename part into place: {}", path.display()))?;
        Ok(())
    }

    pub fn has_part(&self, index: u16) -> bool {
        self.part_path(index as u64).exists()
    }

    /// Concatenate parts `0..num_parts` into a file inside the staging
    /// directory, hashing as it goes.
    pub fn assemble(&self, num_parts: u64) -> Result<Assembled> {
        let path = self.dir.join("assembled.tmp");
        let mut out = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut hasher = Hasher::new();
        let mut size = 0u64;

        for index in 0..num_parts {
            let part_path = self.part_path(index);
            let data = fs::read(&part_path)
                .with_context(|| format!("missing part: {}", part_path.display()))?;
            hasher.update(&data);
            out.write_all(&data)
                .with_context(|| format!("failed to write {}", path.display()))?;
            size += data.len() as u64;
        }
        out.sync_all()
            .with_context(|| format!("failed to sync {}", path.display()))?;

        Ok(Assembled {
            path,
            hash: hasher.finalize(),
            size,
        })
    }

    /// Delete the staging directory and everything in it.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove parts dir: {}", self.dir.display())),
        }
    }
}
