use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::types::ComicKind;

/// Page image extensions the decoder understands (lowercase, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Extensions of files that are catalogued as comics.
pub const COMIC_EXTENSIONS: &[&str] = &["cbz", "zip", "cbr", "rar", "cb7", "7z", "pdf"];

/// Directory names written by archivers and file managers that never hold pages.
const JUNK_DIRS: &[&str] = &["__macosx", "@eadir", "$recycle.bin"];

pub fn is_hidden(path: &Path) -> bool {
    file_name(path).map(|name| name.starts_with('.')).unwrap_or(false)
}

pub fn is_junk_dir(path: &Path) -> bool {
    file_name(path)
        .map(|name| JUNK_DIRS.iter().any(|junk| name.eq_ignore_ascii_case(junk)))
        .unwrap_or(false)
}

/// True when any component of `path` is a hidden or junk directory.
pub fn has_skipped_component(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(part) => {
            let part = Path::new(part);
            is_hidden(part) || is_junk_dir(part)
        }
        _ => false,
    })
}

pub fn is_supported_image(path: &Path) -> bool {
    extension_in(path, IMAGE_EXTENSIONS)
}

pub fn is_comic_file(path: &Path) -> bool {
    extension_in(path, COMIC_EXTENSIONS) && ComicKind::from_path(path).is_some()
}

fn extension_in(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| allowed.iter().any(|candidate| ext.eq_ignore_ascii_case(candidate)))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(OsStr::to_str)
}

pub fn natural_cmp_path(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&a.to_string_lossy().to_lowercase(), &b.to_string_lossy().to_lowercase())
}

/// Compare two strings so that embedded digit runs order by numeric value
/// (`page2` < `page10`). Equal values with more leading zeros sort later.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);

    for pair in left.iter().zip(right.iter()) {
        let ordering = match pair {
            (Token::Number(a_digits, a_val), Token::Number(b_digits, b_val)) => {
                a_val.cmp(b_val).then_with(|| a_digits.len().cmp(&b_digits.len()))
            }
            (Token::Text(a_text), Token::Text(b_text)) => a_text.cmp(b_text),
            (Token::Number(..), Token::Text(..)) => Ordering::Less,
            (Token::Text(..), Token::Number(..)) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, PartialEq)]
pub enum Token<'a> {
    Text(&'a str),
    Number(&'a str, u128),
}

/// Split `input` into alternating text and ASCII digit runs.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut run_start = 0;
    let mut in_digits = None;

    for (idx, ch) in input.char_indices() {
        let digit = ch.is_ascii_digit();
        match in_digits {
            Some(previous) if previous != digit => {
                tokens.push(make_token(&input[run_start..idx], previous));
                run_start = idx;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }

    if let Some(digit) = in_digits {
        tokens.push(make_token(&input[run_start..], digit));
    }

    tokens
}

fn make_token(run: &str, digits: bool) -> Token<'_> {
    if digits {
        Token::Number(run, run.parse::<u128>().unwrap_or(u128::MAX))
    } else {
        Token::Text(run)
    }
}

/// Reject archive member names that would escape the archive root.
pub fn sanitize_zip_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }

    if clean.as_os_str().is_empty() { None } else { Some(clean) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comic_files_match_known_extensions() {
        assert!(is_comic_file(Path::new("Saga 01.cbz")));
        assert!(is_comic_file(Path::new("saga.PDF")));
        assert!(!is_comic_file(Path::new("saga.epub")));
        assert!(!is_comic_file(Path::new("cbz")));
    }

    #[test]
    fn junk_components_are_detected() {
        assert!(has_skipped_component(Path::new("__MACOSX/page1.png")));
        assert!(has_skipped_component(Path::new("issue/.thumbs/page1.png")));
        assert!(!has_skipped_component(Path::new("issue/pages/page1.png")));
    }

    #[test]
    fn rejects_escaping_zip_members() {
        assert!(sanitize_zip_path(Path::new("../evil.png")).is_none());
        assert!(sanitize_zip_path(Path::new("/abs.png")).is_none());
        assert_eq!(sanitize_zip_path(Path::new("./a/b.png")), Some(PathBuf::from("a/b.png")));
    }

    #[test]
    fn leading_zeros_break_ties() {
        assert_eq!(natural_cmp("01", "1"), Ordering::Greater);
        assert_eq!(natural_cmp("a", "a"), Ordering::Equal);
    }
}
