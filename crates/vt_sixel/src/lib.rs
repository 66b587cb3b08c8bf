//! # vt_sixel
//!
//! A 100% Rust SIXEL library for drawing raster images inside a terminal.
//!
//! ## Features
//!
//! - **Packed color model**: fixed-precision RGB with palette index and flags
//! - **Palette engine**: ≤256-color quantization with Floyd–Steinberg dithering
//!   and perceptual (L\*a\*b\*) nearest-color matching
//! - **Encoder**: run-length compressed DEC VT340 SIXEL streams
//! - **Decoder**: strict SIXEL grammar parser with byte-offset diagnostics
//! - **Renderer**: terminal-cell measurement and cursor-disciplined output
//!   through a [`Console`] collaborator
//!
//! ## Quick Start
//!
//! ### Encoding an image to SIXEL
//!
//! ```ignore
//! use vt_sixel::{SixelImage, RenderSettings};
//!
//! // RGBA image data (4 bytes per pixel)
//! let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255]; // red and green pixels
//! let image = SixelImage::from_rgba(2, 1, &rgba)?;
//! print!("{}", image.encode(&RenderSettings::default())?);
//! ```
//!
//! ### Decoding SIXEL to image data
//!
//! ```ignore
//! use vt_sixel::SixelImage;
//!
//! let sixel_data = b"\x1bP7;1;;q#0;2;100;0;0~-\x1b\\";
//! let image = SixelImage::decode(sixel_data)?;
//! println!("{}x{}", image.width(), image.height());
//! ```

use thiserror::Error;

pub mod color;
pub mod decoder;
pub mod encoder;
pub mod image;
pub mod palette;
pub mod render;

pub use color::{Color, ColorSpace, Lab};
pub use decoder::{sixel_decode, sixel_decode_full};
pub use image::SixelImage;
pub use render::{
    measure, render, CellRect, CellSize, Console, PixelAspectRatio, Position, RenderSettings,
};

/// Errors that can occur while constructing, encoding, decoding or rendering
/// SIXEL images.
#[derive(Debug, Error)]
pub enum SixelError {
    /// Invalid image dimensions (width or height is zero or too large)
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Pixel buffer size doesn't match the declared dimensions
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A replacement universal palette must have exactly 256 entries
    #[error("invalid palette size: expected 256 entries, got {actual}")]
    InvalidPaletteSize { actual: usize },

    /// Pixel coordinate outside the image
    #[error("pixel ({x}, {y}) out of bounds for {width}x{height} image")]
    PixelOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    /// Malformed or truncated SIXEL stream
    #[error("decode error at byte {offset}: {message}")]
    Decode { offset: usize, message: String },

    /// Operation not implemented yet; fails loudly instead of no-oping
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// I/O failure while writing a stream or talking to the console
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SIXEL operations.
pub type Result<T> = core::result::Result<T, SixelError>;

// Internal limits shared by the codec
pub(crate) const SIXEL_PALETTE_MAX: usize = 256;
pub(crate) const SIXEL_WIDTH_LIMIT: usize = 1000000;
pub(crate) const SIXEL_HEIGHT_LIMIT: usize = 1000000;
