//! Page decoding and thumbnail encoding.

pub mod image;

pub use self::image::{DecodedImage, decode_page, encode_jpeg};

pub type Result<T> = crate::Result<T>;
