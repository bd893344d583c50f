//! Downscaling of decoded pages to the viewport and of covers to thumbnail bounds.

use anyhow::{anyhow, ensure};
use fast_image_resize as fir;

use crate::codec::DecodedImage;
use crate::types::ImageDimensions;

use super::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
    /// Sharp enough for line art; slower than bilinear.
    CatmullRom,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for fir::ResizeAlg {
    fn from(value: ResizeFilter) -> Self {
        use fir::FilterType;
        match value {
            ResizeFilter::Nearest => fir::ResizeAlg::Nearest,
            ResizeFilter::Bilinear => fir::ResizeAlg::Convolution(FilterType::Bilinear),
            ResizeFilter::CatmullRom => fir::ResizeAlg::Convolution(FilterType::CatmullRom),
            ResizeFilter::Lanczos3 => fir::ResizeAlg::Convolution(FilterType::Lanczos3),
        }
    }
}

/// Largest dimensions with the aspect ratio of `source` that fit inside `bounds`. Never upscales;
/// each side is at least one pixel.
pub fn fit_within(source: ImageDimensions, bounds: ImageDimensions) -> ImageDimensions {
    if source.width == 0 || source.height == 0 {
        return source;
    }
    if source.width <= bounds.width && source.height <= bounds.height {
        return source;
    }

    let scale = f64::min(
        f64::from(bounds.width) / f64::from(source.width),
        f64::from(bounds.height) / f64::from(source.height),
    );
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    ImageDimensions { width: scaled(source.width), height: scaled(source.height) }
}

/// Downscale `source` so that it fits inside `bounds`, returning it untouched when it already
/// does.
pub fn shrink_to_fit(source: DecodedImage, bounds: ImageDimensions) -> Result<DecodedImage> {
    let target = fit_within(source.dimensions, bounds);
    if target == source.dimensions {
        return Ok(source);
    }
    resize_rgba(&source, target, ResizeFilter::default())
}

/// Resample an RGBA frame to exactly `target`, filtering with premultiplied alpha.
pub fn resize_rgba(
    source: &DecodedImage,
    target: ImageDimensions,
    filter: ResizeFilter,
) -> Result<DecodedImage> {
    let (width, height) = (source.width(), source.height());
    ensure!(width > 0 && height > 0, "source image has zero dimensions");
    ensure!(target.width > 0 && target.height > 0, "target dimensions must be non-zero");
    ensure!(
        source.pixels().len() >= width as usize * height as usize * 4,
        "source buffer is smaller than {width}x{height}"
    );

    if source.dimensions == target {
        return Ok(source.clone());
    }

    let src = fir::images::ImageRef::new(width, height, source.pixels(), fir::PixelType::U8x4)
        .map_err(|err| anyhow!("preparing source frame: {err}"))?;
    let mut dst = fir::images::Image::new(target.width, target.height, fir::PixelType::U8x4);

    let options = fir::ResizeOptions::new().resize_alg(filter.into()).use_alpha(true);
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .map_err(|err| anyhow!("resizing {width}x{height} frame: {err}"))?;

    Ok(DecodedImage { dimensions: target, pixels: dst.into_vec() })
}
