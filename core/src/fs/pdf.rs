//! PDF comics rendered through the system pdfium library.

use std::path::Path;

use anyhow::{Context, anyhow, ensure};
use pdfium_render::prelude::*;

use crate::codec::DecodedImage;
use crate::types::ImageDimensions;

use super::Result;

/// Width used when the caller does not ask for a specific raster size.
pub const DEFAULT_RENDER_WIDTH: u32 = 1600;

fn bind() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|err| anyhow!("loading the pdfium library: {err:?}"))?;
    Ok(Pdfium::new(bindings))
}

pub fn page_count(path: &Path) -> Result<u32> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|err| anyhow!("opening pdf {}: {err:?}", path.display()))?;
    Ok(u32::from(document.pages().len()))
}

/// Rasterise one page to RGBA at `target_width` pixels wide.
pub fn render_page(path: &Path, index: u32, target_width: u32) -> Result<DecodedImage> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|err| anyhow!("opening pdf {}: {err:?}", path.display()))?;

    let index = u16::try_from(index).context("pdf page index exceeds u16")?;
    let page = document
        .pages()
        .get(index)
        .map_err(|err| anyhow!("pdf page {index} of {}: {err:?}", path.display()))?;

    let config = PdfRenderConfig::new().set_target_width(target_width.max(1) as i32);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|err| anyhow!("rendering pdf page {index}: {err:?}"))?;

    let dimensions = ImageDimensions {
        width: bitmap.width().max(0) as u32,
        height: bitmap.height().max(0) as u32,
    };
    let pixels = bitmap.as_rgba_bytes();
    ensure!(
        pixels.len() == dimensions.width as usize * dimensions.height as usize * 4,
        "pdfium returned a truncated bitmap"
    );

    Ok(DecodedImage { dimensions, pixels })
}
