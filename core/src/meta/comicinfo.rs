//! `ComicInfo.xml` parsing and display-title derivation.

use std::path::Path;

use anyhow::anyhow;
use quick_xml::Reader;
use quick_xml::events::Event;

use super::Result;

/// Subset of the ComicRack `ComicInfo.xml` schema the catalogue uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComicInfo {
    pub title: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub volume: Option<String>,
    pub writer: Option<String>,
    pub publisher: Option<String>,
    pub summary: Option<String>,
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Series,
    Number,
    Volume,
    Writer,
    Publisher,
    Summary,
    PageCount,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"Title" => Some(Self::Title),
            b"Series" => Some(Self::Series),
            b"Number" => Some(Self::Number),
            b"Volume" => Some(Self::Volume),
            b"Writer" => Some(Self::Writer),
            b"Publisher" => Some(Self::Publisher),
            b"Summary" => Some(Self::Summary),
            b"PageCount" => Some(Self::PageCount),
            _ => None,
        }
    }
}

pub fn parse_bytes(bytes: &[u8]) -> Result<ComicInfo> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut info = ComicInfo::default();
    let mut current: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            anyhow!("malformed ComicInfo.xml at byte {}: {err}", reader.buffer_position())
        })?;
        match event {
            Event::Start(start) => current = Field::from_tag(start.local_name().as_ref()),
            Event::End(_) => current = None,
            Event::Text(text) => {
                if let Some(field) = current {
                    let value =
                        text.unescape().map_err(|err| anyhow!("ComicInfo.xml text: {err}"))?;
                    info.set(field, &value);
                }
            }
            Event::CData(data) => {
                if let Some(field) = current {
                    info.set(field, &String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(info)
}

impl ComicInfo {
    fn set(&mut self, field: Field, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            return;
        }
        let value = value.to_string();
        match field {
            Field::Title => self.title = Some(value),
            Field::Series => self.series = Some(value),
            Field::Number => self.number = Some(value),
            Field::Volume => self.volume = Some(value),
            Field::Writer => self.writer = Some(value),
            Field::Publisher => self.publisher = Some(value),
            Field::Summary => self.summary = Some(value),
            Field::PageCount => self.page_count = value.parse().ok(),
        }
    }
}

/// Title shown for a comic: the embedded title, else `Series #Number`, else a cleaned-up file
/// stem (`Saga_v01.cbz` becomes `Saga v01`).
pub fn display_title(info: Option<&ComicInfo>, path: &Path) -> String {
    if let Some(info) = info {
        if let Some(title) = &info.title {
            return title.clone();
        }
        if let Some(series) = &info.series {
            return match &info.number {
                Some(number) => format!("{series} #{number}"),
                None => series.clone(),
            };
        }
    }
    title_from_path(path)
}

fn title_from_path(path: &Path) -> String {
    let stem = if path.is_dir() || path.extension().is_none() {
        path.file_name()
    } else {
        path.file_stem()
    };
    let raw = stem.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let cleaned = raw
        .replace(['_', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() { raw } else { cleaned }
}
