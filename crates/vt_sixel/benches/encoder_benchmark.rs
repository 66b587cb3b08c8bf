use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use vt_sixel::{RenderSettings, SixelImage};

fn generate_gradient_rgba(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.push(((x * 255) / width.max(1)) as u8);
            pixels.push(((y * 255) / height.max(1)) as u8);
            pixels.push(128);
            pixels.push(255);
        }
    }
    pixels
}

fn bench_encode_gradient(c: &mut Criterion) {
    // >256 distinct colors: exercises the dithering path
    let rgba = generate_gradient_rgba(320, 240);
    let settings = RenderSettings::default();

    c.bench_function("encode_gradient_320x240", |b| {
        b.iter(|| {
            let image = SixelImage::from_rgba(320, 240, black_box(&rgba)).unwrap();
            image.encode(&settings).unwrap()
        })
    });
}

fn bench_encode_flat(c: &mut Criterion) {
    // few distinct colors: exercises the exact-palette path
    let mut rgba = vec![0u8; 128 * 128 * 4];
    for (i, chunk) in rgba.chunks_exact_mut(4).enumerate() {
        let v = if (i / 128 + i % 128) % 2 == 0 { 255 } else { 32 };
        chunk.copy_from_slice(&[v, 64, 200, 255]);
    }
    let settings = RenderSettings::default();

    c.bench_function("encode_checker_128x128", |b| {
        b.iter(|| {
            let image = SixelImage::from_rgba(128, 128, black_box(&rgba)).unwrap();
            image.encode(&settings).unwrap()
        })
    });
}

fn bench_decode_gradient(c: &mut Criterion) {
    let rgba = generate_gradient_rgba(320, 240);
    let image = SixelImage::from_rgba(320, 240, &rgba).unwrap();
    let encoded = image.encode(&RenderSettings::default()).unwrap();

    c.bench_function("decode_gradient_320x240", |b| {
        b.iter(|| SixelImage::decode(black_box(encoded.as_bytes())).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_gradient,
    bench_encode_flat,
    bench_decode_gradient
);
criterion_main!(benches);
