//! Packed fixed-precision color values.
//!
//! A [`Color`] packs three RGB channels (1% steps, 7 bits each), a palette
//! index and a small flag set into a single 32-bit word. Equality and hashing
//! look only at the visual part of the word so that pixels carrying different
//! provisional palette indices still dedupe to one palette entry.

use crate::{Result, SixelError};
use std::hash::{Hash, Hasher};

const CHANNEL_MASK: u32 = 0x7f;
const RED_SHIFT: u32 = 0;
const GREEN_SHIFT: u32 = 7;
const BLUE_SHIFT: u32 = 14;
const INDEX_SHIFT: u32 = 21;
const INDEX_MASK: u32 = 0xff;
const FLAG_SHIFT: u32 = 29;

const FLAG_USE_PALETTE: u32 = 1;
const FLAG_UNDEFINED_INDEX: u32 = 2;
const FLAG_TRANSPARENT: u32 = 4;

/// Color space used for distance computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Plain Euclidean distance over the three RGB channels.
    Rgb,
    /// Perceptual distance in CIE L\*a\*b\* with chroma/hue damping.
    Lab,
}

/// CIE L\*a\*b\* triple derived from a [`Color`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl Lab {
    /// Simplified delta-E: Euclidean over (L, C, H) with the chroma and hue
    /// terms damped by `1 + k·c1`, where `c1` is the chroma of `self`
    /// (k = 0.045 for chroma, 0.015 for hue).
    pub fn distance_to(&self, other: &Lab) -> f32 {
        let c1 = (self.a * self.a + self.b * self.b).sqrt();
        let c2 = (other.a * other.a + other.b * other.b).sqrt();
        let dl = self.l - other.l;
        let dc = c1 - c2;
        let da = self.a - other.a;
        let db = self.b - other.b;
        // ΔH² can go slightly negative from rounding
        let dh2 = (da * da + db * db - dc * dc).max(0.0);
        let sc = 1.0 + 0.045 * c1;
        let sh = 1.0 + 0.015 * c1;
        (dl * dl + (dc / sc) * (dc / sc) + dh2 / (sh * sh)).sqrt()
    }
}

/// A packed color value.
///
/// Bit layout of the word:
///
/// ```text
/// bits  0..7   red      (0..=100, 1% steps)
/// bits  7..14  green
/// bits 14..21  blue
/// bits 21..29  palette index (0..=255)
/// bits 29..32  flags {UsePalette=1, UndefinedIndex=2, Transparent=4}
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Color(u32);

impl Color {
    /// Fully transparent sentinel. Its RGB channels are ignored everywhere.
    pub const TRANSPARENT: Color = Color(FLAG_TRANSPARENT << FLAG_SHIFT);

    /// Creates an opaque color from `[0, 1]` channel values.
    /// Out-of-range values are clamped before quantization.
    pub fn new(red: f32, green: f32, blue: f32) -> Self {
        let mut color = Color(0);
        color.set_red(red);
        color.set_green(green);
        color.set_blue(blue);
        color
    }

    /// Creates an opaque color from integer percentages, each clamped to 100.
    pub fn from_percent(red: u8, green: u8, blue: u8) -> Self {
        let r = red.min(100) as u32;
        let g = green.min(100) as u32;
        let b = blue.min(100) as u32;
        Color((r << RED_SHIFT) | (g << GREEN_SHIFT) | (b << BLUE_SHIFT))
    }

    #[inline]
    fn channel(&self, shift: u32) -> u32 {
        (self.0 >> shift) & CHANNEL_MASK
    }

    #[inline]
    fn set_channel(&mut self, shift: u32, value: f32) {
        let quantized = (value.clamp(0.0, 1.0) * 100.0).round() as u32;
        self.0 = (self.0 & !(CHANNEL_MASK << shift)) | (quantized << shift);
    }

    pub fn red(&self) -> f32 {
        self.channel(RED_SHIFT) as f32 / 100.0
    }

    pub fn green(&self) -> f32 {
        self.channel(GREEN_SHIFT) as f32 / 100.0
    }

    pub fn blue(&self) -> f32 {
        self.channel(BLUE_SHIFT) as f32 / 100.0
    }

    pub fn set_red(&mut self, value: f32) {
        self.set_channel(RED_SHIFT, value);
    }

    pub fn set_green(&mut self, value: f32) {
        self.set_channel(GREEN_SHIFT, value);
    }

    pub fn set_blue(&mut self, value: f32) {
        self.set_channel(BLUE_SHIFT, value);
    }

    /// Red channel as an integer percentage (the wire representation).
    pub fn red_percent(&self) -> u8 {
        self.channel(RED_SHIFT) as u8
    }

    pub fn green_percent(&self) -> u8 {
        self.channel(GREEN_SHIFT) as u8
    }

    pub fn blue_percent(&self) -> u8 {
        self.channel(BLUE_SHIFT) as u8
    }

    pub fn palette_index(&self) -> u8 {
        ((self.0 >> INDEX_SHIFT) & INDEX_MASK) as u8
    }

    pub fn set_palette_index(&mut self, index: u8) {
        self.0 = (self.0 & !(INDEX_MASK << INDEX_SHIFT)) | ((index as u32) << INDEX_SHIFT);
    }

    pub fn is_transparent(&self) -> bool {
        self.0 >> FLAG_SHIFT & FLAG_TRANSPARENT != 0
    }

    /// True when the palette index refers to an already-defined palette entry.
    pub fn uses_palette(&self) -> bool {
        self.0 >> FLAG_SHIFT & FLAG_USE_PALETTE != 0
    }

    /// True when the color carries an index the encoder still has to define.
    pub fn index_undefined(&self) -> bool {
        self.0 >> FLAG_SHIFT & FLAG_UNDEFINED_INDEX != 0
    }

    pub(crate) fn mark_use_palette(&mut self) {
        self.0 &= !((FLAG_UNDEFINED_INDEX) << FLAG_SHIFT);
        self.0 |= FLAG_USE_PALETTE << FLAG_SHIFT;
    }

    pub(crate) fn mark_index_undefined(&mut self) {
        self.0 &= !((FLAG_USE_PALETTE) << FLAG_SHIFT);
        self.0 |= FLAG_UNDEFINED_INDEX << FLAG_SHIFT;
    }

    /// The visual part of the word (RGB channels only, no index, no flags).
    #[inline]
    pub(crate) fn rgb_bits(&self) -> u32 {
        self.0 & 0x1f_ffff
    }

    /// Converts to CIE L\*a\*b\* via sRGB gamma decoding, the linear XYZ
    /// transform (D65 white point) and cube-root companding.
    pub fn lab(&self) -> Lab {
        fn srgb_to_linear(c: f32) -> f32 {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        // linear fallback below the companding threshold
        fn f(t: f32) -> f32 {
            if t > 0.008856 {
                t.cbrt()
            } else {
                7.787 * t + 16.0 / 116.0
            }
        }

        let r = srgb_to_linear(self.red());
        let g = srgb_to_linear(self.green());
        let b = srgb_to_linear(self.blue());

        let x = 0.4124 * r + 0.3576 * g + 0.1805 * b;
        let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let z = 0.0193 * r + 0.1192 * g + 0.9505 * b;

        let fx = f(x / 0.95047);
        let fy = f(y / 1.0);
        let fz = f(z / 1.08883);

        Lab {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }

    /// Distance to `other` in the given color space.
    ///
    /// Identical packed colors return 0.0 without touching the LAB math.
    pub fn distance(&self, other: &Color, space: ColorSpace) -> f32 {
        if self == other {
            return 0.0;
        }
        match space {
            ColorSpace::Rgb => self.rgb_distance(other),
            ColorSpace::Lab => self.lab().distance_to(&other.lab()),
        }
    }

    fn rgb_distance(&self, other: &Color) -> f32 {
        let dr = self.red() - other.red();
        let dg = self.green() - other.green();
        let db = self.blue() - other.blue();
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// The candidate minimizing [`Color::distance`]; ties go to the earliest
    /// candidate. A transparent input maps to [`Color::TRANSPARENT`]
    /// regardless of the candidate set; an empty candidate set returns the
    /// input unchanged.
    pub fn find_closest<'a, I>(&self, candidates: I, space: ColorSpace) -> Color
    where
        I: IntoIterator<Item = &'a Color>,
    {
        if self.is_transparent() {
            return Color::TRANSPARENT;
        }
        // Convert the source to LAB once instead of per candidate.
        let source_lab = match space {
            ColorSpace::Rgb => None,
            ColorSpace::Lab => Some(self.lab()),
        };
        let mut best: Option<(Color, f32)> = None;
        for candidate in candidates {
            let dist = if self == candidate {
                0.0
            } else {
                match &source_lab {
                    None => self.rgb_distance(candidate),
                    Some(lab) => lab.distance_to(&candidate.lab()),
                }
            };
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((*candidate, dist));
                if dist == 0.0 {
                    break;
                }
            }
        }
        best.map_or(*self, |(color, _)| color)
    }

    /// Looks up one of the 256 universal colors by its console code.
    pub fn from_universal_code(_code: u8) -> Result<Color> {
        Err(SixelError::Unsupported("universal color lookup by code"))
    }

    /// Builds a color from 8-bit RGBA. Alpha below 128 maps to
    /// [`Color::TRANSPARENT`], matching the encoder's opacity threshold.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Color {
        if a < 128 {
            Color::TRANSPARENT
        } else {
            Color::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
        }
    }

    /// 8-bit RGBA representation; transparent colors come out as all zeros.
    pub fn to_rgba8(&self) -> [u8; 4] {
        if self.is_transparent() {
            [0, 0, 0, 0]
        } else {
            [
                percent_to_byte(self.red_percent()),
                percent_to_byte(self.green_percent()),
                percent_to_byte(self.blue_percent()),
                0xff,
            ]
        }
    }
}

#[inline]
pub(crate) fn percent_to_byte(value: u8) -> u8 {
    ((value.min(100) as u32 * 255 + 50) / 100) as u8
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_transparent(), other.is_transparent()) {
            (true, true) => true,
            (false, false) => self.rgb_bits() == other.rgb_bits(),
            _ => false,
        }
    }
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_transparent() {
            state.write_u32(u32::MAX);
        } else {
            state.write_u32(self.rgb_bits());
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::TRANSPARENT
    }
}
