//! ZIP/CBZ archive handling.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use anyhow::{Context, anyhow};
use zip::read::ZipArchive;

use crate::types::ArchiveEntry;

use super::{Result, util};

const COMIC_INFO_NAME: &str = "comicinfo.xml";
/// Upper bound on the buffer reserved from a member's declared size.
const MAX_PREALLOCATION: usize = 64 << 20;

pub fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("opening archive {}", path.display()))?;
    ZipArchive::new(file).map_err(|err| anyhow!("reading archive {}: {err}", path.display()))
}

/// Image entries of the archive at `path`, in natural page order.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open_archive(path)?;
    collect_entries(&mut archive)
}

pub fn collect_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<ArchiveEntry>> {
    let mut entries: Vec<ArchiveEntry> = Vec::new();

    for idx in 0..archive.len() {
        let file = archive.by_index(idx).map_err(|err| anyhow!("{}", err))?;
        if file.is_dir() {
            continue;
        }

        let Some(sanitized) = file.enclosed_name().and_then(util::sanitize_zip_path) else {
            continue;
        };
        if util::has_skipped_component(&sanitized) || !util::is_supported_image(&sanitized) {
            continue;
        }

        entries.push(ArchiveEntry { path: sanitized, name: file.name().to_string() });
    }

    entries.sort_by(|a, b| util::natural_cmp_path(&a.path, &b.path));
    Ok(entries)
}

/// Read the full contents of the member stored under `name`.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_name(name).map_err(|err| anyhow!("archive member {name:?}: {err}"))?;
    let mut bytes = Vec::with_capacity((file.size() as usize).min(MAX_PREALLOCATION));
    file.read_to_end(&mut bytes).with_context(|| format!("inflating archive member {name:?}"))?;
    Ok(bytes)
}

/// Bytes of the first page of the archive, if it has any.
pub fn read_first_page(path: &Path) -> Result<Option<(ArchiveEntry, Vec<u8>)>> {
    let mut archive = open_archive(path)?;
    let entries = collect_entries(&mut archive)?;
    let Some(first) = entries.into_iter().next() else {
        return Ok(None);
    };
    let bytes = read_entry(&mut archive, &first.name)?;
    Ok(Some((first, bytes)))
}

/// Contents of a `ComicInfo.xml` member, matched case-insensitively. Root-level members win over
/// nested ones.
pub fn read_comic_info<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Option<Vec<u8>>> {
    let mut candidate: Option<(usize, String)> = None;
    for name in archive.file_names() {
        let base = name.rsplit('/').next().unwrap_or(name);
        if !base.eq_ignore_ascii_case(COMIC_INFO_NAME) {
            continue;
        }
        let depth = name.matches('/').count();
        if candidate.as_ref().map(|(best, _)| depth < *best).unwrap_or(true) {
            candidate = Some((depth, name.to_string()));
        }
    }

    match candidate {
        Some((_, name)) => read_entry(archive, &name).map(Some),
        None => Ok(None),
    }
}
