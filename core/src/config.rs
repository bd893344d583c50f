//! User configuration persisted as JSON next to the platform's config directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::Result;
use crate::fs::ScanOptions;
use crate::types::{CacheBudget, ImageDimensions, PrefetchPolicy};

pub(crate) const APP_QUALIFIER: &str = "org";
pub(crate) const APP_ORGANISATION: &str = "ComicShelf";
pub(crate) const APP_NAME: &str = "comic-shelf";

/// Environment variable overriding [`ShelfConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "COMIC_SHELF_DATA_DIR";

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "library.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    /// Directory holding the database, cover thumbnails, and logs.
    pub data_dir: PathBuf,
    /// Byte budget of each viewer's decoded-page cache.
    pub cache_budget_bytes: usize,
    pub prefetch: PrefetchPolicy,
    /// Default number of comics per listing page.
    pub page_size: u32,
    /// Pages larger than this are downscaled after decoding. `None` keeps full resolution.
    pub viewport: Option<ImageDimensions>,
    pub thumbnail: ThumbnailConfig,
    pub scan: ScanOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { max_width: 320, max_height: 480, quality: 82 }
    }
}

impl ThumbnailConfig {
    pub fn bounds(&self) -> ImageDimensions {
        ImageDimensions { width: self.max_width.max(1), height: self.max_height.max(1) }
    }
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_budget_bytes: CacheBudget::default().bytes_max,
            prefetch: PrefetchPolicy::default(),
            page_size: 30,
            viewport: None,
            thumbnail: ThumbnailConfig::default(),
            scan: ScanOptions::default(),
        }
    }
}

impl ShelfConfig {
    /// Load the configuration from `path` (or the default location), falling back to defaults
    /// when the file does not exist, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        let mut config = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Self>(&bytes)
                .with_context(|| format!("parsing config {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()));
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides looked up through `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|value| !value.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Write the configuration atomically as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("config path {} has no parent directory", path.display()))?;
        fs::create_dir_all(parent)?;

        let data = serde_json::to_vec_pretty(self)?;
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&data)?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| anyhow!("saving config {}: {}", path.display(), err.error))?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn cover_dir(&self) -> PathBuf {
        self.data_dir.join("covers")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn cache_budget(&self) -> CacheBudget {
        CacheBudget { bytes_max: self.cache_budget_bytes }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .ok_or_else(|| anyhow!("unable to resolve the configuration directory"))
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANISATION, APP_NAME)
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}
