//! On-disk store for cover thumbnails.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error, anyhow};
use tempfile::NamedTempFile;

use crate::types::ImageKey;

use super::Result;

const SHARD_LEN: usize = 2;
const FILE_EXTENSION: &str = "jpg";

/// Content-addressed files under a two-level sharded directory layout (`ab/cd/<rest>.jpg`).
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Create or reuse a disk cache rooted at the provided path.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating cache root directory at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the on-disk path associated with an image key.
    pub fn path_for(&self, key: &ImageKey) -> PathBuf {
        let hash = blake3::hash(key.cache_key.as_bytes());
        let hex = hash.to_hex();
        let (shard_one, remainder) = hex.as_str().split_at(SHARD_LEN);
        let (shard_two, remainder) = remainder.split_at(SHARD_LEN);

        self.root.join(shard_one).join(shard_two).join(format!("{remainder}.{FILE_EXTENSION}"))
    }

    pub fn read(&self, key: &ImageKey) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist bytes for the key atomically, returning the final path.
    pub fn write(&self, key: &ImageKey, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(key);
        let Some(parent) = path.parent() else {
            return Err(anyhow!("cache path {} has no parent directory", path.display()));
        };

        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache shard directory at {}", parent.display()))?;
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("allocating temp file in {}", parent.display()))?;
        tmp.write_all(bytes).with_context(|| format!("writing {}", path.display()))?;
        tmp.flush().with_context(|| format!("flushing {}", path.display()))?;
        tmp.persist(&path).map_err(|err| Error::from(err.error))?;

        Ok(path)
    }

    /// Remove a cached entry if present.
    pub fn remove(&self, key: &ImageKey) -> Result<()> {
        self.remove_path(&self.path_for(key))
    }

    /// Remove a file previously returned by [`DiskCache::write`]. Paths outside the cache root
    /// are ignored.
    pub fn remove_path(&self, path: &Path) -> Result<()> {
        if !path.starts_with(&self.root) {
            return Ok(());
        }
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
