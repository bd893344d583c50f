//! Page sources: where the bytes of each page of an open comic come from.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use zip::ZipArchive;

use crate::codec::{DecodedImage, decode_page};
use crate::error::ShelfError;
use crate::fs::{archive, folder};
use crate::types::{ArchiveEntry, ComicKind};

use super::Result;

/// Random access to the decoded pages of one comic.
pub trait PageSource: Send + Sync + fmt::Debug {
    fn page_count(&self) -> u32;

    /// Name of the page inside its comic, when the format has one.
    fn page_name(&self, index: u32) -> Option<&Path>;

    /// Decode page `index` at its native resolution.
    fn load(&self, index: u32) -> Result<DecodedImage>;
}

fn out_of_range(index: u32, count: u32) -> anyhow::Error {
    ShelfError::PageOutOfRange { index, count }.into()
}

/// Open the page source matching `kind`.
pub fn open_source(path: &Path, kind: ComicKind) -> Result<Box<dyn PageSource>> {
    match kind {
        ComicKind::Zip => Ok(Box::new(ArchiveSource::open(path)?)),
        ComicKind::ImageFolder => Ok(Box::new(FolderSource::open(path)?)),
        #[cfg(feature = "pdf")]
        ComicKind::Pdf => Ok(Box::new(PdfSource::open(path)?)),
        _ => Err(ShelfError::UnsupportedFormat { path: path.to_path_buf(), kind }.into()),
    }
}

/// Zip/cbz archive. The archive handle stays open for the lifetime of the source.
#[derive(Debug)]
pub struct ArchiveSource {
    path: PathBuf,
    entries: Vec<ArchiveEntry>,
    archive: Mutex<ZipArchive<File>>,
}

impl ArchiveSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut handle = archive::open_archive(path)?;
        let entries = archive::collect_entries(&mut handle)?;
        Ok(Self { path: path.to_path_buf(), entries, archive: Mutex::new(handle) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageSource for ArchiveSource {
    fn page_count(&self) -> u32 {
        self.entries.len() as u32
    }

    fn page_name(&self, index: u32) -> Option<&Path> {
        self.entries.get(index as usize).map(|entry| entry.path.as_path())
    }

    fn load(&self, index: u32) -> Result<DecodedImage> {
        let entry = self
            .entries
            .get(index as usize)
            .ok_or_else(|| out_of_range(index, self.page_count()))?;
        let bytes = {
            let mut handle = self.archive.lock();
            archive::read_entry(&mut handle, &entry.name)?
        };
        decode_page(&entry.path, &bytes)
    }
}

/// Directory whose image files are the pages.
#[derive(Debug)]
pub struct FolderSource {
    root: PathBuf,
    pages: Vec<PathBuf>,
}

impl FolderSource {
    pub fn open(root: &Path) -> Result<Self> {
        let pages = folder::collect_entries(root)?;
        Ok(Self { root: root.to_path_buf(), pages })
    }
}

impl PageSource for FolderSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_name(&self, index: u32) -> Option<&Path> {
        self.pages.get(index as usize).map(PathBuf::as_path)
    }

    fn load(&self, index: u32) -> Result<DecodedImage> {
        let rel =
            self.pages.get(index as usize).ok_or_else(|| out_of_range(index, self.page_count()))?;
        let bytes = folder::read_page(&self.root, rel)?;
        decode_page(rel, &bytes)
    }
}

/// PDF document rasterised page by page.
#[cfg(feature = "pdf")]
#[derive(Debug)]
pub struct PdfSource {
    path: PathBuf,
    count: u32,
}

#[cfg(feature = "pdf")]
impl PdfSource {
    pub fn open(path: &Path) -> Result<Self> {
        let count = crate::fs::pdf::page_count(path)?;
        Ok(Self { path: path.to_path_buf(), count })
    }
}

#[cfg(feature = "pdf")]
impl PageSource for PdfSource {
    fn page_count(&self) -> u32 {
        self.count
    }

    fn page_name(&self, _index: u32) -> Option<&Path> {
        None
    }

    fn load(&self, index: u32) -> Result<DecodedImage> {
        if index >= self.count {
            return Err(out_of_range(index, self.count));
        }
        crate::fs::pdf::render_page(&self.path, index, crate::fs::pdf::DEFAULT_RENDER_WIDTH)
    }
}
