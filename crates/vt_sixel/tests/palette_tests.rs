use vt_sixel::palette::universal_palette;
use vt_sixel::{Color, ColorSpace, SixelImage};

/// Image with one distinct color per pixel column/row combination.
fn gradient_image(width: usize, height: usize) -> (SixelImage, Vec<Color>) {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            // constant 45% red keeps every pixel between two universal
            // palette levels; green/blue vary to make each pixel distinct
            pixels.push(Color::new(0.45, x as f32 / 100.0, y as f32 / 100.0));
        }
    }
    let image = SixelImage::from_pixels(width, height, pixels.clone()).unwrap();
    (image, pixels)
}

#[test]
fn small_images_keep_exact_colors() {
    let colors = [
        Color::new(1.0, 0.0, 0.0),
        Color::new(0.0, 1.0, 0.0),
        Color::new(0.13, 0.57, 0.99),
    ];
    let mut pixels = Vec::new();
    for i in 0..60 {
        pixels.push(colors[i % colors.len()]);
    }
    let image = SixelImage::from_pixels(6, 10, pixels.clone()).unwrap();

    assert_eq!(image.palette_size(), colors.len());
    let palette = image.palette();
    for (i, original) in pixels.iter().enumerate() {
        let quantized = image.pixel(i % 6, i / 6).unwrap();
        // index maps back to the original visual color, zero error
        assert_eq!(palette[quantized.palette_index() as usize], *original);
        assert_eq!(quantized, *original);
    }
}

#[test]
fn distinct_count_equals_palette_size_up_to_256() {
    // 16x16 = exactly 256 distinct colors, still the exact path
    let mut pixels = Vec::new();
    for y in 0..16 {
        for x in 0..16 {
            pixels.push(Color::new(x as f32 / 20.0, y as f32 / 20.0, 0.5));
        }
    }
    let image = SixelImage::from_pixels(16, 16, pixels).unwrap();
    assert_eq!(image.palette_size(), 256);
}

#[test]
fn rich_images_fall_back_to_universal_palette() {
    let (image, _) = gradient_image(20, 16); // 320 distinct colors
    assert!(image.palette_size() <= 256);

    let universal = universal_palette();
    let palette = image.palette();
    for entry in &palette {
        assert!(
            universal.contains(entry),
            "palette entry outside the universal set"
        );
    }
}

#[test]
fn dithering_reduces_net_quantization_error() {
    let (image, originals) = gradient_image(20, 16);
    image.palette(); // trigger quantization + dithering

    // Net signed error per channel; error diffusion should drive each
    // channel's bias toward zero while plain nearest-neighbor keeps the
    // constant 45%-red offset.
    let universal = universal_palette();
    let mut dithered_bias = [0.0f32; 3];
    let mut nearest_bias = [0.0f32; 3];
    for (i, original) in originals.iter().enumerate() {
        let dithered = image.pixel(i % 20, i / 20).unwrap();
        dithered_bias[0] += original.red() - dithered.red();
        dithered_bias[1] += original.green() - dithered.green();
        dithered_bias[2] += original.blue() - dithered.blue();

        let nearest = original.find_closest(universal.iter(), ColorSpace::Lab);
        nearest_bias[0] += original.red() - nearest.red();
        nearest_bias[1] += original.green() - nearest.green();
        nearest_bias[2] += original.blue() - nearest.blue();
    }

    let dithered_total: f32 = dithered_bias.iter().map(|b| b.abs()).sum();
    let nearest_total: f32 = nearest_bias.iter().map(|b| b.abs()).sum();
    assert!(
        nearest_total > 1.0,
        "plain nearest-neighbor should carry a visible bias, got {nearest_bias:?}"
    );
    assert!(
        dithered_total < nearest_total,
        "dithering should cancel quantization bias: {dithered_bias:?} vs {nearest_bias:?}"
    );
}

#[test]
fn quantization_is_idempotent() {
    let (image, _) = gradient_image(20, 16);
    let first = image.palette();
    assert!(image.palette_ready());
    let second = image.palette();
    assert_eq!(first, second);

    let snapshot = image.to_rgba();
    image.palette();
    assert_eq!(snapshot, image.to_rgba(), "repeated calls must not re-dither");
}

#[test]
fn fully_transparent_image_has_empty_palette() {
    let image = SixelImage::new(300, 2).unwrap(); // 600 pixels, all transparent
    assert_eq!(image.palette_size(), 0);
}
