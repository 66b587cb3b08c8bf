//! Strict SIXEL stream parser.
//!
//! The decoder locates the DCS introducer, reads its numeric parameters and
//! then runs a state machine over the four payload token classes (`#`, `!`,
//! `$`, `-`) plus raster attributes (`"`) and sixel data bytes. Unknown or
//! malformed bytes fail with the absolute byte offset instead of being
//! skipped; interior line breaks are tolerated because real emitters wrap
//! their output.

use crate::color::Color;
use crate::image::SixelImage;
use crate::palette::universal_palette;
use crate::render::PixelAspectRatio;
use crate::{Result, SixelError, SIXEL_HEIGHT_LIMIT, SIXEL_PALETTE_MAX, SIXEL_WIDTH_LIMIT};

const BAND_HEIGHT: usize = 6;
const MAX_REPEAT: usize = 0xffff;

/// Decodes a complete SIXEL escape sequence into an image.
///
/// The sequence must contain a DCS introducer (`ESC P` or 0x90). The string
/// terminator (`ESC \` or 0x9C) is optional at end of input; the payload is
/// self-delimiting. Cells never painted stay transparent.
pub fn sixel_decode(data: &[u8]) -> Result<SixelImage> {
    sixel_decode_full(data).map(|(image, _)| image)
}

/// Like [`sixel_decode`], additionally returning the pixel aspect ratio
/// announced in the DCS parameters.
pub fn sixel_decode_full(data: &[u8]) -> Result<(SixelImage, PixelAspectRatio)> {
    let (params, payload_start) = parse_dcs(data)?;
    let aspect_ratio = match params.aspect_code {
        Some(code) => PixelAspectRatio::from_dcs_code(code).ok_or_else(|| SixelError::Decode {
            offset: params.offset,
            message: format!("invalid aspect ratio code {code}"),
        })?,
        None => PixelAspectRatio::OneToOne,
    };

    let mut decoder = SixelDecoder::new();
    decoder.process(data, payload_start)?;
    Ok((decoder.finish()?, aspect_ratio))
}

struct DcsParams {
    aspect_code: Option<u16>,
    /// Offset of the first parameter byte, for diagnostics.
    offset: usize,
}

/// Finds the DCS introducer and consumes `<params> q`, returning the payload
/// start offset.
fn parse_dcs(data: &[u8]) -> Result<(DcsParams, usize)> {
    let mut idx = 0;
    let param_start = loop {
        match data.get(idx) {
            Some(0x90) => break idx + 1,
            Some(0x1b) if data.get(idx + 1) == Some(&b'P') => break idx + 2,
            Some(_) => idx += 1,
            None => {
                return Err(SixelError::Decode {
                    offset: 0,
                    message: "missing DCS introducer".into(),
                })
            }
        }
    };

    let mut params: Vec<u16> = Vec::new();
    let mut current: u16 = 0;
    let mut has_digit = false;
    let mut idx = param_start;
    loop {
        match data.get(idx) {
            Some(b @ b'0'..=b'9') => {
                current = current.saturating_mul(10).saturating_add((b - b'0') as u16);
                has_digit = true;
                idx += 1;
            }
            Some(b';') => {
                params.push(if has_digit { current } else { 0 });
                current = 0;
                has_digit = false;
                idx += 1;
            }
            Some(b'q') => {
                if has_digit {
                    params.push(current);
                }
                idx += 1;
                break;
            }
            Some(&b) => {
                return Err(SixelError::Decode {
                    offset: idx,
                    message: format!("unexpected byte 0x{b:02x} in DCS parameters"),
                })
            }
            None => {
                return Err(SixelError::Decode {
                    offset: idx,
                    message: "truncated DCS introducer (missing 'q')".into(),
                })
            }
        }
    }

    Ok((
        DcsParams {
            aspect_code: params.first().copied(),
            offset: param_start,
        },
        idx,
    ))
}

/// Growable pixel canvas; unknown cells are transparent.
struct Canvas {
    pixels: Vec<Color>,
    width: usize,
    height: usize,
}

impl Canvas {
    fn new() -> Self {
        Self {
            pixels: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    fn ensure_visible(&mut self, width: usize, height: usize) -> Result<()> {
        if width > SIXEL_WIDTH_LIMIT || height > SIXEL_HEIGHT_LIMIT {
            return Err(SixelError::InvalidDimensions { width, height });
        }
        if width <= self.width && height <= self.height {
            return Ok(());
        }
        let new_width = width.max(self.width);
        let new_height = height.max(self.height);

        // Per-axis limits alone still admit a multi-terabyte canvas from a
        // tiny stream; cap the total pixel count (256 MB of pixel data).
        const MAX_PIXELS: usize = 64 * 1024 * 1024;
        if new_width.saturating_mul(new_height) > MAX_PIXELS {
            return Err(SixelError::InvalidDimensions { width, height });
        }

        let mut grown = vec![Color::TRANSPARENT; new_width * new_height];
        for row in 0..self.height {
            let src = row * self.width;
            let dst = row * new_width;
            grown[dst..dst + self.width].copy_from_slice(&self.pixels[src..src + self.width]);
        }
        self.pixels = grown;
        self.width = new_width;
        self.height = new_height;
        Ok(())
    }

    #[inline]
    fn paint_span(&mut self, y: usize, x: usize, len: usize, color: Color) {
        if len == 0 || y >= self.height || x >= self.width {
            return;
        }
        let len = len.min(self.width - x);
        let start = y * self.width + x;
        self.pixels[start..start + len].fill(color);
    }
}

struct SixelDecoder {
    canvas: Canvas,
    palette: Vec<Color>,
    current_color: Color,
    repeat: usize,
    pos_x: usize,
    pos_y: usize,
    max_x: usize,
    max_y: usize,
    seen_data: bool,
    touched: bool,
    target_width: usize,
    target_height: usize,
}

impl SixelDecoder {
    fn new() -> Self {
        let palette = universal_palette();
        let current_color = palette[0];
        Self {
            canvas: Canvas::new(),
            palette,
            current_color,
            repeat: 1,
            pos_x: 0,
            pos_y: 0,
            max_x: 0,
            max_y: 0,
            seen_data: false,
            touched: false,
            target_width: 0,
            target_height: 0,
        }
    }

    fn process(&mut self, data: &[u8], start: usize) -> Result<()> {
        let mut idx = start;
        while idx < data.len() {
            match data[idx] {
                b'\n' | b'\r' | b'\t' | b'\x0c' => idx += 1,
                b'$' => {
                    self.pos_x = 0;
                    idx += 1;
                }
                b'-' => {
                    self.pos_x = 0;
                    self.pos_y =
                        self.pos_y
                            .checked_add(BAND_HEIGHT)
                            .ok_or(SixelError::Decode {
                                offset: idx,
                                message: "band position overflow".into(),
                            })?;
                    idx += 1;
                }
                b'!' => {
                    let (value, consumed) = read_number(data, idx + 1);
                    if consumed == 0 {
                        return Err(SixelError::Decode {
                            offset: idx,
                            message: "repeat operator without a count".into(),
                        });
                    }
                    let repeat = value.max(1);
                    if repeat > MAX_REPEAT {
                        return Err(SixelError::Decode {
                            offset: idx,
                            message: format!("repeat count {repeat} exceeds {MAX_REPEAT}"),
                        });
                    }
                    self.repeat = repeat;
                    idx += 1 + consumed;
                }
                b'#' => {
                    let consumed = self.handle_color(data, idx)?;
                    idx += 1 + consumed;
                }
                b'"' => {
                    let consumed = self.handle_raster(data, idx)?;
                    idx += 1 + consumed;
                }
                b'?'..=b'~' => {
                    self.handle_sixel(data[idx], idx)?;
                    idx += 1;
                }
                0x9c => break,
                0x1b => {
                    if data.get(idx + 1) == Some(&b'\\') {
                        break;
                    }
                    return Err(SixelError::Decode {
                        offset: idx,
                        message: "escape without string terminator".into(),
                    });
                }
                b => {
                    return Err(SixelError::Decode {
                        offset: idx,
                        message: format!("unexpected byte 0x{b:02x} in SIXEL payload"),
                    });
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn handle_sixel(&mut self, ch: u8, offset: usize) -> Result<()> {
        let bits = ch - b'?';
        let span = self.repeat;
        self.repeat = 1;

        let width_needed = self.pos_x + span;
        let height_needed = self.pos_y + BAND_HEIGHT;
        self.canvas
            .ensure_visible(width_needed, height_needed)
            .map_err(|_| SixelError::Decode {
                offset,
                message: "image dimensions exceed limits".into(),
            })?;

        for bit in 0..BAND_HEIGHT {
            if bits & (1 << bit) != 0 {
                self.canvas
                    .paint_span(self.pos_y + bit, self.pos_x, span, self.current_color);
                self.touched = true;
                self.max_y = self.max_y.max(self.pos_y + bit);
            }
        }

        self.seen_data = true;
        self.max_x = self.max_x.max(width_needed - 1);
        self.pos_x = width_needed;
        Ok(())
    }

    /// `#<index>` selects a register; `#<index>;<space>;<p1>;<p2>;<p3>`
    /// defines and selects it (space 2 = RGB percent, space 1 = HLS).
    fn handle_color(&mut self, data: &[u8], offset: usize) -> Result<usize> {
        let mut params = [0i32; 5];
        let (consumed, count) = collect_params(data, offset + 1, &mut params);

        let index = match count {
            1 | 5 => (params[0].max(0) as usize).min(SIXEL_PALETTE_MAX - 1),
            _ => {
                return Err(SixelError::Decode {
                    offset,
                    message: format!("color introducer with {count} parameters"),
                })
            }
        };

        if count == 5 {
            let mut entry = match params[1] {
                1 => hls_to_color(params[2], params[3], params[4]),
                2 => Color::from_percent(
                    params[2].clamp(0, 100) as u8,
                    params[3].clamp(0, 100) as u8,
                    params[4].clamp(0, 100) as u8,
                ),
                space => {
                    return Err(SixelError::Decode {
                        offset,
                        message: format!("unknown color space {space}"),
                    })
                }
            };
            entry.set_palette_index(index as u8);
            self.palette[index] = entry;
        }

        self.current_color = self.palette[index];
        Ok(consumed)
    }

    /// `"<pan>;<pad>;<height>;<width>` presizes the canvas.
    fn handle_raster(&mut self, data: &[u8], offset: usize) -> Result<usize> {
        let mut params = [0i32; 4];
        let (consumed, count) = collect_params(data, offset + 1, &mut params);
        if count > 2 {
            self.target_height = params[2].max(0) as usize;
        }
        if count > 3 {
            self.target_width = params[3].max(0) as usize;
        }
        if self.target_width > 0 || self.target_height > 0 {
            self.canvas
                .ensure_visible(self.target_width.max(1), self.target_height.max(1))
                .map_err(|_| SixelError::Decode {
                    offset,
                    message: "raster attributes exceed dimension limits".into(),
                })?;
        }
        Ok(consumed)
    }

    fn finish(self) -> Result<SixelImage> {
        let mut width = self.target_width;
        let mut height = self.target_height;
        if self.seen_data {
            width = width.max(self.max_x + 1);
        }
        if self.touched {
            height = height.max(self.max_y + 1);
        }

        let mut canvas = self.canvas;
        canvas.ensure_visible(width, height)?;

        // crop to the announced/painted extent
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            let start = y * canvas.width;
            pixels.extend_from_slice(&canvas.pixels[start..start + width]);
        }
        SixelImage::from_pixels(width, height, pixels)
    }
}

fn read_number(data: &[u8], start: usize) -> (usize, usize) {
    let mut idx = start;
    let mut value = 0usize;
    while idx < data.len() && data[idx].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add((data[idx] - b'0') as usize);
        idx += 1;
    }
    (value, idx - start)
}

fn collect_params(data: &[u8], start: usize, storage: &mut [i32]) -> (usize, usize) {
    let mut idx = start;
    let mut written = 0usize;
    let mut current = 0i32;
    let mut has_digit = false;
    let mut last_was_separator = false;

    while idx < data.len() {
        match data[idx] {
            b'0'..=b'9' => {
                current = current
                    .saturating_mul(10)
                    .saturating_add((data[idx] - b'0') as i32);
                has_digit = true;
                last_was_separator = false;
                idx += 1;
            }
            b';' => {
                if written < storage.len() {
                    storage[written] = if has_digit { current } else { 0 };
                    written += 1;
                }
                current = 0;
                has_digit = false;
                last_was_separator = true;
                idx += 1;
            }
            _ => break,
        }
    }

    if (has_digit || last_was_separator) && written < storage.len() {
        storage[written] = if has_digit { current } else { 0 };
        written += 1;
    }

    (idx - start, written)
}

/// VT340 HLS color definition, hue rotated so 0° is blue.
fn hls_to_color(h: i32, l: i32, s: i32) -> Color {
    let lum = l.clamp(0, 100) as f32 / 100.0;
    if s <= 0 {
        return Color::new(lum, lum, lum);
    }

    let hue = (((h + 240) % 360 + 360) % 360) as f32 / 360.0;
    let sat = s.clamp(0, 100) as f32 / 100.0;

    let q = if lum < 0.5 {
        lum * (1.0 + sat)
    } else {
        lum + sat - lum * sat
    };
    let p = 2.0 * lum - q;

    Color::new(
        hue_to_channel(p, q, hue + 1.0 / 3.0),
        hue_to_channel(p, q, hue),
        hue_to_channel(p, q, hue - 1.0 / 3.0),
    )
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
