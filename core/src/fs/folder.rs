//! Directory-based comics: a folder whose image files are the pages.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::ShelfError;

use super::{Result, util};

/// Relative paths of the page images directly inside `root`, in natural order.
pub fn collect_entries(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ShelfError::NotADirectory(root.to_path_buf()).into());
    }

    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("listing {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        if util::is_hidden(&path) || !util::is_supported_image(&path) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path.as_path()).to_path_buf();
        entries.push(rel);
    }

    entries.sort_by(|a, b| util::natural_cmp_path(a, b));
    Ok(entries)
}

/// Read a page image relative to the folder root.
pub fn read_page(root: &Path, rel_path: &Path) -> Result<Vec<u8>> {
    let path = root.join(rel_path);
    fs::read(&path).with_context(|| format!("reading page {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn filters_and_sorts_pages() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let files = ["10.jpg", "2.png", "001.jpeg", "cover.bmp", "notes.txt"];

        for name in files {
            fs::write(root.join(name), b"test").unwrap();
        }
        fs::create_dir(root.join("extras.png")).unwrap();

        let order: Vec<String> = collect_entries(root)
            .expect("list pages")
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, vec!["001.jpeg", "2.png", "10.jpg", "cover.bmp"]);
    }

    #[test]
    fn skips_hidden_and_non_images() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for name in [".hidden.png", "visible.webp", "thumb.GIF", "README.md"] {
            fs::write(root.join(name), b"test").unwrap();
        }
        let names: Vec<String> = collect_entries(root)
            .unwrap()
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["thumb.GIF", "visible.webp"]);
    }

    #[test]
    fn reading_a_file_root_is_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("page.png");
        fs::write(&file, b"x").unwrap();
        let err = collect_entries(&file).unwrap_err();
        assert!(matches!(err.downcast_ref::<ShelfError>(), Some(ShelfError::NotADirectory(_))));
    }

    #[test]
    fn reads_page_bytes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1.png"), b"page-one").unwrap();
        assert_eq!(read_page(dir.path(), Path::new("1.png")).unwrap(), b"page-one");
    }
}
