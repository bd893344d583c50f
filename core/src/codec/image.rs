//! Page decoding into RGBA frames and cover thumbnail encoding.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, anyhow, ensure};
use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder as _, ImageFormat, ImageReader, RgbImage, RgbaImage};
use moxcms::{CmsError, ColorProfile, Layout, TransformOptions};
use tracing::warn;

use crate::types::ImageDimensions;

use super::Result;

/// Straight-alpha RGBA8888 frame, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub dimensions: ImageDimensions,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Returns the width of the decoded image in pixels.
    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Returns the height of the decoded image in pixels.
    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Returns a reference to the raw RGBA8888 pixel buffer.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes held by the pixel buffer; the cost charged against cache budgets.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Decode a page image into an RGBA frame with EXIF orientation applied.
///
/// `name` is the page's file name inside its comic and only serves as a format hint; content
/// sniffing takes over when the extension is missing or unknown. Embedded ICC profiles are
/// converted to sRGB; a profile that cannot be converted is logged and ignored.
pub fn decode_page(name: &Path, data: &[u8]) -> Result<DecodedImage> {
    ensure!(!data.is_empty(), "empty image data for {}", name.display());

    let reader = match infer_format(name) {
        Some(format) => ImageReader::with_format(Cursor::new(data), format),
        None => ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("guessing image format")?,
    };

    let mut decoder = reader
        .into_decoder()
        .with_context(|| format!("constructing decoder for {}", name.display()))?;

    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let icc_profile = decoder.icc_profile().unwrap_or(None);

    let mut image = DynamicImage::from_decoder(decoder)
        .with_context(|| format!("decoding page {}", name.display()))?;
    if orientation != Orientation::NoTransforms {
        image.apply_orientation(orientation);
    }

    let mut rgba = image.into_rgba8();
    if let Some(profile) = icc_profile {
        if let Err(err) = convert_to_srgb_in_place(&mut rgba, &profile) {
            warn!(target: "codec::image", page = %name.display(), "ICC conversion skipped: {err}");
        }
    }

    let dimensions = ImageDimensions { width: rgba.width(), height: rgba.height() };
    Ok(DecodedImage { dimensions, pixels: rgba.into_raw() })
}

/// Encode a frame as a baseline JPEG, flattening alpha onto white.
pub fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>> {
    let expected = image.width() as usize * image.height() as usize * 4;
    ensure!(image.pixels.len() == expected, "frame buffer does not match its dimensions");

    let mut rgb = RgbImage::new(image.width(), image.height());
    for (dst, src) in rgb.pixels_mut().zip(image.pixels.chunks_exact(4)) {
        let alpha = u16::from(src[3]);
        for channel in 0..3 {
            let blended = (u16::from(src[channel]) * alpha + 255 * (255 - alpha)) / 255;
            dst.0[channel] = blended as u8;
        }
    }

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder).context("encoding jpeg")?;
    Ok(out.into_inner())
}

fn infer_format(path: &Path) -> Option<ImageFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| ImageFormat::from_extension(&ext))
}

fn convert_to_srgb_in_place(image: &mut RgbaImage, profile_bytes: &[u8]) -> Result<()> {
    let src_profile = ColorProfile::new_from_slice(profile_bytes)
        .map_err(|err| anyhow!("invalid ICC profile: {err}"))?;
    let dest_profile = ColorProfile::new_srgb();
    let (width, height) = image.dimensions();
    let raw = image.as_mut();

    match src_profile.create_transform_8bit(
        Layout::Rgba,
        &dest_profile,
        Layout::Rgba,
        TransformOptions::default(),
    ) {
        Ok(transform) => {
            let mut dst = vec![0u8; raw.len()];
            let raw_slice: &[u8] = &raw[..];
            transform
                .transform(raw_slice, &mut dst)
                .map_err(|err| anyhow!("icc transform failed: {err}"))?;
            raw.copy_from_slice(&dst);
            Ok(())
        }
        Err(CmsError::InvalidLayout) => {
            let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
            for px in raw.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
            }
            let mut dst_rgb = vec![0u8; rgb.len()];
            let transform = src_profile.create_transform_8bit(
                Layout::Rgb,
                &dest_profile,
                Layout::Rgb,
                TransformOptions::default(),
            )?;
            transform
                .transform(&rgb, &mut dst_rgb)
                .map_err(|err| anyhow!("icc transform failed: {err}"))?;
            for (rgba_px, rgb_px) in raw.chunks_exact_mut(4).zip(dst_rgb.chunks_exact(3)) {
                rgba_px[0..3].copy_from_slice(rgb_px);
            }
            Ok(())
        }
        Err(err) => Err(anyhow!("icc transform setup failed: {err}")),
    }
}
