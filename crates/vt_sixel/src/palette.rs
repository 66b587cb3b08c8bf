//! Palette construction and color quantization.
//!
//! Images with at most 256 distinct colors keep their exact colors and get
//! indices assigned in order of first appearance. Richer images fall back to
//! a fixed 256-entry universal palette combined with Floyd–Steinberg error
//! diffusion, after which the exact path applies again.

use crate::color::{Color, Lab};
use crate::SIXEL_PALETTE_MAX;
use std::collections::{HashMap, HashSet};

/// VT340-style base colors, in integer RGB percent.
const UNIVERSAL_BASE: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (20, 20, 80),
    (80, 13, 13),
    (20, 80, 20),
    (80, 20, 80),
    (20, 80, 80),
    (80, 80, 20),
    (53, 53, 53),
    (26, 26, 26),
    (33, 33, 60),
    (60, 26, 26),
    (33, 60, 33),
    (60, 33, 60),
    (33, 60, 60),
    (60, 60, 33),
    (80, 80, 80),
];

/// Builds the fixed device-independent 256-color palette: 16 base colors,
/// a 6×6×6 color cube at 20% steps and a 24-step gray ramp. Each entry is
/// tagged with its own index.
pub fn universal_palette() -> Vec<Color> {
    let mut colors = Vec::with_capacity(SIXEL_PALETTE_MAX);

    for &(r, g, b) in &UNIVERSAL_BASE {
        colors.push(Color::from_percent(r, g, b));
    }

    for r in 0..6u8 {
        for g in 0..6u8 {
            for b in 0..6u8 {
                colors.push(Color::from_percent(r * 20, g * 20, b * 20));
            }
        }
    }

    for level in 0..24u32 {
        let value = (level * 100 / 23) as u8;
        colors.push(Color::from_percent(value, value, value));
    }

    debug_assert_eq!(colors.len(), SIXEL_PALETTE_MAX);
    for (index, color) in colors.iter_mut().enumerate() {
        color.set_palette_index(index as u8);
    }
    colors
}

/// Nearest-color search over a fixed palette, memoized per distinct source
/// color. The memo pays off because real images repeat colors heavily and the
/// LAB scan over 256 entries is the dominant cost of dithering.
pub(crate) struct NearestCache<'a> {
    palette: &'a [Color],
    palette_labs: Vec<Lab>,
    memo: HashMap<Color, Color>,
}

impl<'a> NearestCache<'a> {
    pub(crate) fn new(palette: &'a [Color]) -> Self {
        Self {
            palette,
            palette_labs: palette.iter().map(Color::lab).collect(),
            memo: HashMap::new(),
        }
    }

    pub(crate) fn nearest(&mut self, color: Color) -> Color {
        if let Some(&hit) = self.memo.get(&color) {
            return hit;
        }
        let source = color.lab();
        let mut best = self.palette[0];
        let mut best_dist = f32::INFINITY;
        for (entry, lab) in self.palette.iter().zip(&self.palette_labs) {
            let dist = source.distance_to(lab);
            if dist < best_dist {
                best = *entry;
                best_dist = dist;
                if dist == 0.0 {
                    break;
                }
            }
        }
        self.memo.insert(color, best);
        best
    }
}

/// Quantizes `pixels` in place to at most 256 palette entries and returns the
/// palette. Transparent pixels are left untouched and never enter the palette.
pub(crate) fn optimize_palette(
    pixels: &mut [Color],
    width: usize,
    universal: &[Color],
) -> Vec<Color> {
    let distinct: HashSet<Color> = pixels
        .iter()
        .filter(|p| !p.is_transparent())
        .copied()
        .collect();

    if distinct.len() > SIXEL_PALETTE_MAX {
        dither(pixels, width, universal);
    }
    assign_indices(pixels)
}

/// Index assignment for images already reduced to ≤256 distinct colors.
///
/// The first occurrence of each distinct color keeps the `UndefinedIndex`
/// flag so the encoder emits its inline RGB definition exactly once; every
/// later occurrence is flagged `UsePalette`.
fn assign_indices(pixels: &mut [Color]) -> Vec<Color> {
    let mut lookup: HashMap<Color, u8> = HashMap::new();
    let mut palette: Vec<Color> = Vec::new();

    for pixel in pixels.iter_mut() {
        if pixel.is_transparent() {
            continue;
        }
        if let Some(&index) = lookup.get(pixel) {
            pixel.set_palette_index(index);
            pixel.mark_use_palette();
        } else {
            let index = palette.len() as u8;
            lookup.insert(*pixel, index);
            pixel.set_palette_index(index);
            pixel.mark_index_undefined();
            palette.push(*pixel);
        }
    }
    palette
}

/// Floyd–Steinberg error diffusion against the universal palette.
///
/// Strictly sequential: each pixel's result depends on error propagated from
/// already-visited neighbors. Error accumulates in an owned scratch buffer so
/// production pixel storage is never aliased mid-pass.
fn dither(pixels: &mut [Color], width: usize, universal: &[Color]) {
    if width == 0 || pixels.is_empty() {
        return;
    }
    let height = pixels.len() / width;
    let mut scratch: Vec<[f32; 3]> = pixels
        .iter()
        .map(|p| [p.red(), p.green(), p.blue()])
        .collect();
    let mut cache = NearestCache::new(universal);

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            if pixels[index].is_transparent() {
                continue;
            }
            let [r, g, b] = scratch[index];
            let source = Color::new(r, g, b); // clamps accumulated error
            let chosen = cache.nearest(source);
            pixels[index] = chosen;

            let err = [
                (source.red() - chosen.red()) / 16.0,
                (source.green() - chosen.green()) / 16.0,
                (source.blue() - chosen.blue()) / 16.0,
            ];
            let mut spread = |dx: isize, dy: isize, weight: f32| {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    return;
                }
                let target = &mut scratch[ny as usize * width + nx as usize];
                target[0] += err[0] * weight;
                target[1] += err[1] * weight;
                target[2] += err[2] * weight;
            };
            spread(1, 0, 7.0);
            spread(-1, 1, 3.0);
            spread(0, 1, 5.0);
            spread(1, 1, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_palette_has_256_tagged_entries() {
        let palette = universal_palette();
        assert_eq!(palette.len(), 256);
        assert_eq!(palette[0].palette_index(), 0);
        assert_eq!(palette[255].palette_index(), 255);
        // last gray ramp entry is white
        assert_eq!(palette[255].red_percent(), 100);
    }

    #[test]
    fn exact_palette_preserves_colors() {
        let red = Color::new(1.0, 0.0, 0.0);
        let blue = Color::new(0.0, 0.0, 1.0);
        let mut pixels = vec![red, blue, red, red];
        let universal = universal_palette();
        let palette = optimize_palette(&mut pixels, 2, &universal);

        assert_eq!(palette.len(), 2);
        assert_eq!(palette[0], red);
        assert_eq!(palette[1], blue);
        // first occurrence defines, later ones reference
        assert!(pixels[0].index_undefined());
        assert!(pixels[2].uses_palette());
        assert_eq!(pixels[2].palette_index(), 0);
        assert_eq!(pixels[1].palette_index(), 1);
    }

    #[test]
    fn transparent_pixels_stay_out_of_the_palette() {
        let mut pixels = vec![Color::TRANSPARENT; 8];
        let universal = universal_palette();
        let palette = optimize_palette(&mut pixels, 4, &universal);
        assert!(palette.is_empty());
        assert!(pixels.iter().all(Color::is_transparent));
    }

    #[test]
    fn empty_image_yields_empty_palette() {
        let mut pixels: Vec<Color> = Vec::new();
        let universal = universal_palette();
        assert!(optimize_palette(&mut pixels, 0, &universal).is_empty());
    }

    #[test]
    fn nearest_cache_returns_exact_palette_member() {
        let universal = universal_palette();
        let mut cache = NearestCache::new(&universal);
        let probe = Color::from_percent(20, 80, 20);
        assert_eq!(cache.nearest(probe), probe);
        // memoized second call
        assert_eq!(cache.nearest(probe), probe);
    }
}
