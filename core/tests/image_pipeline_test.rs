use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use moxcms::{ColorProfile, RenderingIntent};
use shelf_core::codec::{DecodedImage, decode_page, encode_jpeg};
use shelf_core::pipeline::resize::{ResizeFilter, fit_within, resize_rgba, shrink_to_fit};
use shelf_core::types::ImageDimensions;

fn encode_sample(width: u32, height: u32, pixels: &[[u8; 4]]) -> Vec<u8> {
    let mut image = ImageBuffer::<Rgba<u8>, Vec<u8>>::new(width, height);
    for (i, pixel) in image.pixels_mut().enumerate() {
        pixel.0 = pixels[i];
    }
    let dynamic = DynamicImage::ImageRgba8(image);
    let mut buf = Cursor::new(Vec::new());
    dynamic.write_to(&mut buf, ImageFormat::Jpeg).expect("encode baseline jpeg");
    buf.into_inner()
}

fn inject_exif_and_icc(base: &[u8], orientation: u16, icc: Option<&[u8]>) -> Vec<u8> {
    assert!(base.starts_with(&[0xFF, 0xD8]));
    let mut output = Vec::with_capacity(base.len() + 128 + icc.map_or(0, |icc| icc.len()));
    output.extend_from_slice(&base[..2]); // SOI
    output.extend_from_slice(&build_exif_segment(orientation));
    if let Some(profile) = icc {
        output.extend_from_slice(&build_icc_segment(profile));
    }
    output.extend_from_slice(&base[2..]);
    output
}

fn build_exif_segment(orientation: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"Exif\0\0");
    payload.extend_from_slice(b"II*\0");
    payload.extend_from_slice(&8u32.to_le_bytes());
    payload.extend_from_slice(&1u16.to_le_bytes());
    payload.extend_from_slice(&0x0112u16.to_le_bytes());
    payload.extend_from_slice(&3u16.to_le_bytes()); // SHORT
    payload.extend_from_slice(&1u32.to_le_bytes());
    let mut value = orientation.to_le_bytes().to_vec();
    value.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&value);
    payload.extend_from_slice(&0u32.to_le_bytes());

    let length = (payload.len() + 2) as u16;
    let mut segment = Vec::with_capacity(2 + payload.len());
    segment.extend_from_slice(&[0xFF, 0xE1]);
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend_from_slice(&payload);
    segment
}

fn build_icc_segment(icc: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"ICC_PROFILE\0");
    payload.push(1); // sequence number
    payload.push(1); // total chunks
    payload.extend_from_slice(icc);

    let length = (payload.len() + 2) as u16;
    let mut segment = Vec::with_capacity(2 + payload.len());
    segment.extend_from_slice(&[0xFF, 0xE2]);
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend_from_slice(&payload);
    segment
}

#[test]
fn decode_applies_orientation_and_icc_conversion() {
    let base = encode_sample(2, 1, &[[200, 80, 40, 255], [40, 160, 220, 255]]);
    let orientation_only = inject_exif_and_icc(&base, 6, None);

    let mut profile = ColorProfile::new_display_p3();
    profile.rendering_intent = RenderingIntent::RelativeColorimetric;
    let icc_bytes = profile.encode().expect("encode icc");
    let orientation_and_icc = inject_exif_and_icc(&base, 6, Some(&icc_bytes));

    let decoded_plain = decode_page(Path::new("plain.jpg"), &base).expect("decode");
    let decoded_oriented =
        decode_page(Path::new("oriented.jpg"), &orientation_only).expect("decode oriented");
    let decoded_icc =
        decode_page(Path::new("icc.jpg"), &orientation_and_icc).expect("decode icc");

    assert_eq!(decoded_plain.dimensions, ImageDimensions { width: 2, height: 1 });
    assert_eq!(decoded_oriented.dimensions, ImageDimensions { width: 1, height: 2 });
    assert_eq!(decoded_icc.dimensions, decoded_oriented.dimensions);

    let plain_first = &decoded_plain.pixels()[0..3];
    let oriented_top = &decoded_oriented.pixels()[0..3];
    let icc_top = &decoded_icc.pixels()[0..3];
    // Orientation should preserve the original first pixel's colour (aside from JPEG loss).
    for (o, p) in oriented_top.iter().zip(plain_first.iter()) {
        assert!((*o as i16 - *p as i16).abs() <= 5);
    }
    assert_ne!(oriented_top, icc_top, "ICC conversion should adjust colour channels");
}

#[test]
fn resize_errors_on_zero_dimension() {
    let image =
        DecodedImage { dimensions: ImageDimensions { width: 2, height: 2 }, pixels: vec![255; 16] };
    let target = ImageDimensions { width: 0, height: 2 };
    let err = resize_rgba(&image, target, ResizeFilter::Nearest).expect_err("zero width must fail");
    assert!(err.to_string().contains("target dimensions"));
}

#[test]
fn decode_sniffs_content_when_the_name_has_no_extension() {
    let jpeg = encode_sample(3, 2, &[[10, 20, 30, 255]; 6]);
    let decoded = decode_page(Path::new("page-without-extension"), &jpeg).expect("decode");
    assert_eq!(decoded.dimensions, ImageDimensions { width: 3, height: 2 });
    assert!(decode_page(Path::new("empty.png"), &[]).is_err());
}

#[test]
fn bmp_pages_decode_by_extension() {
    let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(4, 3, Rgba([0, 120, 240, 255]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut buf, ImageFormat::Bmp).expect("encode bmp");

    let decoded = decode_page(Path::new("scans/01.BMP"), buf.get_ref()).expect("decode bmp");
    assert_eq!(decoded.dimensions, ImageDimensions { width: 4, height: 3 });
    assert_eq!(&decoded.pixels()[..4], &[0, 120, 240, 255]);
}

#[test]
fn covers_shrink_into_thumbnail_bounds() {
    let page = DecodedImage {
        dimensions: ImageDimensions { width: 400, height: 600 },
        pixels: vec![128; 400 * 600 * 4],
    };
    let bounds = ImageDimensions { width: 100, height: 100 };
    assert_eq!(fit_within(page.dimensions, bounds), ImageDimensions { width: 67, height: 100 });

    let thumb = shrink_to_fit(page, bounds).expect("shrink");
    assert_eq!(thumb.dimensions, ImageDimensions { width: 67, height: 100 });

    let jpeg = encode_jpeg(&thumb, 80).expect("encode");
    assert!(jpeg.starts_with(&[0xFF, 0xD8]));
}

#[test]
fn small_pages_are_never_upscaled() {
    let page = DecodedImage {
        dimensions: ImageDimensions { width: 20, height: 10 },
        pixels: vec![0; 20 * 10 * 4],
    };
    let bounds = ImageDimensions { width: 100, height: 100 };
    let same = shrink_to_fit(page.clone(), bounds).expect("shrink");
    assert_eq!(same, page);
}
