//! The pixel buffer and its lazily-optimized palette.

use crate::color::Color;
use crate::palette::{optimize_palette, universal_palette};
use crate::render::{CellRect, CellSize, Console, RenderSettings};
use crate::{decoder, encoder, render};
use crate::{Result, SixelError, SIXEL_HEIGHT_LIMIT, SIXEL_PALETTE_MAX, SIXEL_WIDTH_LIMIT};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Palette optimization progress. A single synchronized transition function
/// ([`SixelImage::lock_quantized`]) moves `NotComputed → Computing → Ready`;
/// any pixel write drops the state back to `NotComputed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaletteState {
    NotComputed,
    Computing,
    Ready,
}

#[derive(Debug, Clone)]
struct ImageData {
    pixels: Vec<Color>,
    universal: Vec<Color>,
    state: PaletteState,
    palette: Vec<Color>,
}

/// A width×height raster image holding packed [`Color`] values, row-major.
///
/// Palette quantization happens lazily on the first encode/save and at most
/// once until a pixel write invalidates it. Concurrent encodes on a shared
/// image quantize once; mutation from multiple threads needs external
/// locking by the caller.
#[derive(Debug)]
pub struct SixelImage {
    width: usize,
    height: usize,
    ready: AtomicBool,
    inner: Mutex<ImageData>,
}

impl SixelImage {
    /// Creates a fully transparent image.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Self::from_pixels(width, height, vec![Color::TRANSPARENT; width * height])
    }

    /// Wraps an existing pixel buffer; `pixels.len()` must equal
    /// `width * height`.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Color>) -> Result<Self> {
        if width > SIXEL_WIDTH_LIMIT || height > SIXEL_HEIGHT_LIMIT {
            return Err(SixelError::InvalidDimensions { width, height });
        }
        let expected = width * height;
        if pixels.len() != expected {
            return Err(SixelError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            ready: AtomicBool::new(false),
            inner: Mutex::new(ImageData {
                pixels,
                universal: universal_palette(),
                state: PaletteState::NotComputed,
                palette: Vec::new(),
            }),
        })
    }

    /// Imports 8-bit RGBA data (4 bytes per pixel); alpha < 128 becomes
    /// transparent. Each pixel converts independently.
    pub fn from_rgba(width: usize, height: usize, rgba: &[u8]) -> Result<Self> {
        let expected = Self::byte_len(width, height)?;
        if rgba.len() != expected {
            return Err(SixelError::BufferSizeMismatch {
                expected,
                actual: rgba.len(),
            });
        }
        let pixels = rgba
            .chunks_exact(4)
            .map(|c| Color::from_rgba8(c[0], c[1], c[2], c[3]))
            .collect();
        Self::from_pixels(width, height, pixels)
    }

    /// Imports 32-bit BGRA bitmap data (4 bytes per pixel).
    pub fn from_bgra(width: usize, height: usize, bgra: &[u8]) -> Result<Self> {
        let expected = Self::byte_len(width, height)?;
        if bgra.len() != expected {
            return Err(SixelError::BufferSizeMismatch {
                expected,
                actual: bgra.len(),
            });
        }
        let pixels = bgra
            .chunks_exact(4)
            .map(|c| Color::from_rgba8(c[2], c[1], c[0], c[3]))
            .collect();
        Self::from_pixels(width, height, pixels)
    }

    /// Exports 8-bit RGBA data; transparent pixels come out as all zeros.
    pub fn to_rgba(&self) -> Vec<u8> {
        let data = self.lock();
        let mut out = Vec::with_capacity(data.pixels.len() * 4);
        for pixel in &data.pixels {
            out.extend_from_slice(&pixel.to_rgba8());
        }
        out
    }

    /// Exports 32-bit BGRA bitmap data.
    pub fn to_bgra(&self) -> Vec<u8> {
        let data = self.lock();
        let mut out = Vec::with_capacity(data.pixels.len() * 4);
        for pixel in &data.pixels {
            let [r, g, b, a] = pixel.to_rgba8();
            out.extend_from_slice(&[b, g, r, a]);
        }
        out
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Result<Color> {
        self.check_bounds(x, y)?;
        Ok(self.lock().pixels[y * self.width + x])
    }

    /// Writes one pixel and invalidates the optimized palette.
    pub fn set_pixel(&self, x: usize, y: usize, color: Color) -> Result<()> {
        self.check_bounds(x, y)?;
        let mut data = self.lock();
        data.pixels[y * self.width + x] = color;
        data.state = PaletteState::NotComputed;
        data.palette.clear();
        self.ready.store(false, Ordering::Release);
        Ok(())
    }

    /// Expected byte length of a 4-byte-per-pixel buffer, rejecting
    /// dimensions that fail the size limits or overflow the multiply.
    fn byte_len(width: usize, height: usize) -> Result<usize> {
        if width > SIXEL_WIDTH_LIMIT || height > SIXEL_HEIGHT_LIMIT {
            return Err(SixelError::InvalidDimensions { width, height });
        }
        width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or(SixelError::InvalidDimensions { width, height })
    }

    fn check_bounds(&self, x: usize, y: usize) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(SixelError::PixelOutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Replaces the fallback palette used for >256-color images.
    pub fn set_universal_palette(&self, palette: Vec<Color>) -> Result<()> {
        if palette.len() != SIXEL_PALETTE_MAX {
            return Err(SixelError::InvalidPaletteSize {
                actual: palette.len(),
            });
        }
        let mut data = self.lock();
        data.universal = palette;
        data.state = PaletteState::NotComputed;
        data.palette.clear();
        self.ready.store(false, Ordering::Release);
        Ok(())
    }

    /// True once the optimized palette has been computed and no write has
    /// invalidated it since. Cheap, lock-free check.
    pub fn palette_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The optimized palette, computing it first if needed.
    pub fn palette(&self) -> Vec<Color> {
        self.lock_quantized().palette.clone()
    }

    pub fn palette_size(&self) -> usize {
        self.lock_quantized().palette.len()
    }

    fn lock(&self) -> MutexGuard<'_, ImageData> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Double-checked palette optimization: test the ready flag, take the
    /// lock, re-test the state, then compute at most once.
    fn lock_quantized(&self) -> MutexGuard<'_, ImageData> {
        let mut data = self.lock();
        if !self.palette_ready() || data.state != PaletteState::Ready {
            if data.state != PaletteState::Ready {
                data.state = PaletteState::Computing;
                let ImageData {
                    pixels,
                    universal,
                    palette,
                    state,
                } = &mut *data;
                *palette = optimize_palette(pixels, self.width, universal);
                *state = PaletteState::Ready;
            }
            self.ready.store(true, Ordering::Release);
        }
        data
    }

    /// Encodes the image as a complete SIXEL escape sequence. The whole
    /// stream is built in memory; nothing is ever partially emitted.
    pub fn encode(&self, settings: &RenderSettings) -> Result<String> {
        let data = self.lock_quantized();
        Ok(encoder::encode_quantized(
            &data.pixels,
            &data.palette,
            self.width,
            self.height,
            settings,
        ))
    }

    /// Parses a SIXEL escape sequence into an image.
    pub fn decode(data: &[u8]) -> Result<SixelImage> {
        decoder::sixel_decode(data)
    }

    /// Terminal-cell bounding box for this image at the given cell size.
    pub fn measure(&self, settings: &RenderSettings, cell: CellSize) -> CellRect {
        render::measure(self, settings, cell)
    }

    /// Draws the image through a console collaborator, restoring the cursor
    /// (and optionally the graphic rendition) afterwards.
    pub fn print(&self, settings: &RenderSettings, console: &mut dyn Console) -> Result<()> {
        render::render(self, settings, console)
    }

    /// Writes the encoded SIXEL text to a stream.
    pub fn save_as<W: Write>(&self, writer: &mut W, settings: &RenderSettings) -> Result<()> {
        let stream = self.encode(settings)?;
        writer.write_all(stream.as_bytes())?;
        Ok(())
    }

    /// Scales the image to new dimensions.
    pub fn resized(&self, _width: usize, _height: usize) -> Result<SixelImage> {
        Err(SixelError::Unsupported("image resizing"))
    }
}

impl Clone for SixelImage {
    fn clone(&self) -> Self {
        let data = self.lock().clone();
        Self {
            width: self.width,
            height: self.height,
            ready: AtomicBool::new(data.state == PaletteState::Ready),
            inner: Mutex::new(data),
        }
    }
}

impl PartialEq for SixelImage {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.width != other.width || self.height != other.height {
            return false;
        }
        // Lock both sides in address order so two threads comparing the
        // same pair in opposite directions cannot deadlock.
        let (first, second) = if (self as *const Self) < (other as *const Self) {
            (self, other)
        } else {
            (other, self)
        };
        let a = first.lock();
        let b = second.lock();
        a.pixels == b.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_buffer_length() {
        let err = SixelImage::from_pixels(3, 2, vec![Color::TRANSPARENT; 5]).unwrap_err();
        assert!(matches!(
            err,
            SixelError::BufferSizeMismatch {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn empty_image_is_valid_and_degenerate() {
        let image = SixelImage::new(0, 0).unwrap();
        assert_eq!(image.palette_size(), 0);
    }

    #[test]
    fn set_pixel_invalidates_palette() {
        let image = SixelImage::new(2, 2).unwrap();
        image.set_pixel(0, 0, Color::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(image.palette_size(), 1);
        assert!(image.palette_ready());

        image.set_pixel(1, 0, Color::new(0.0, 1.0, 0.0)).unwrap();
        assert!(!image.palette_ready());
        assert_eq!(image.palette_size(), 2);
        assert!(image.palette_ready());
    }

    #[test]
    fn set_pixel_out_of_bounds_fails() {
        let image = SixelImage::new(2, 2).unwrap();
        assert!(image.set_pixel(2, 0, Color::TRANSPARENT).is_err());
        assert!(image.pixel(0, 5).is_err());
    }

    #[test]
    fn universal_palette_must_have_256_entries() {
        let image = SixelImage::new(1, 1).unwrap();
        let err = image.set_universal_palette(vec![Color::TRANSPARENT; 17]);
        assert!(matches!(
            err,
            Err(SixelError::InvalidPaletteSize { actual: 17 })
        ));
    }

    #[test]
    fn quantization_runs_at_most_once_across_threads() {
        let image =
            std::sync::Arc::new(SixelImage::from_rgba(2, 1, &[255, 0, 0, 255, 0, 255, 0, 255]).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let image = image.clone();
                std::thread::spawn(move || image.palette_size())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
        assert!(image.palette_ready());
    }

    #[test]
    fn equality_from_both_directions_across_threads() {
        let image_a = std::sync::Arc::new(SixelImage::new(4, 4).unwrap());
        let image_b = std::sync::Arc::new(SixelImage::new(4, 4).unwrap());

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let a = image_a.clone();
                let b = image_b.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let equal = if i == 0 { *a == *b } else { *b == *a };
                        assert!(equal);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn absurd_import_dimensions_fail_instead_of_overflowing() {
        assert!(matches!(
            SixelImage::from_rgba(usize::MAX, 2, &[]),
            Err(SixelError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            SixelImage::from_bgra(2, usize::MAX, &[]),
            Err(SixelError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn rgba_round_trip_preserves_transparency() {
        let rgba = [255, 0, 0, 255, 0, 0, 0, 0];
        let image = SixelImage::from_rgba(2, 1, &rgba).unwrap();
        assert!(image.pixel(1, 0).unwrap().is_transparent());
        let out = image.to_rgba();
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn bgra_swaps_channel_order() {
        let bgra = [0, 0, 255, 255]; // blue-first byte order, so this is red
        let image = SixelImage::from_bgra(1, 1, &bgra).unwrap();
        let pixel = image.pixel(0, 0).unwrap();
        assert_eq!(pixel.red_percent(), 100);
        assert_eq!(pixel.blue_percent(), 0);
        assert_eq!(image.to_bgra(), bgra.to_vec());
    }

    #[test]
    fn resizing_is_unsupported() {
        let image = SixelImage::new(2, 2).unwrap();
        assert!(matches!(
            image.resized(4, 4),
            Err(SixelError::Unsupported(_))
        ));
    }
}
