//! Image resizing, webp encoding and placeholder hashing

pub mod codec;
pub mod resize;

pub use codec::WebpImageCodec;
pub use resize::{ImageResize, StretchMode};
