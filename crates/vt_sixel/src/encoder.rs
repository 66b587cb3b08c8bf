//! SIXEL stream generation.
//!
//! Walks the quantized pixel buffer in 6-row bands. Within a band each pixel
//! row is one bit-plane pass: runs of equal color select (or inline-define)
//! a palette register, then emit the run-length-compressed sixel character
//! for that row's bit. `$` rewinds to the band start, `-` advances bands.

use crate::color::Color;
use crate::render::RenderSettings;

const BAND_HEIGHT: usize = 6;

/// Encodes an already-quantized pixel buffer into a complete SIXEL escape
/// sequence. Every non-transparent pixel must carry a palette index assigned
/// by the palette engine.
pub(crate) fn encode_quantized(
    pixels: &[Color],
    palette: &[Color],
    width: usize,
    height: usize,
    settings: &RenderSettings,
) -> String {
    let mut out = String::new();

    // DCS introducer: ESC P <aspect>;<background>;<grid> q
    // P2=1 keeps transparent pixels unchanged on the terminal.
    out.push('\x1b');
    out.push('P');
    write_number(&mut out, settings.aspect_ratio.dcs_code() as usize);
    out.push_str(";1;;q");

    // Raster attributes: "<pan>;<pad>;<height>;<width>
    out.push('"');
    write_number(&mut out, settings.aspect_ratio.multiplier());
    out.push_str(";1;");
    write_number(&mut out, height);
    out.push(';');
    write_number(&mut out, width);

    let bands = height.div_ceil(BAND_HEIGHT);
    for band in 0..bands {
        let y0 = band * BAND_HEIGHT;
        let rows = (height - y0).min(BAND_HEIGHT);
        for row in 0..rows {
            let y = y0 + row;
            let sixel_char = char::from(63 + (1u8 << row));
            let line = &pixels[y * width..(y + 1) * width];

            let mut x = 0;
            while x < width {
                let color = line[x];
                let mut run = 1;
                while x + run < width && line[x + run] == color {
                    run += 1;
                }

                if color.is_transparent() {
                    // nothing may be painted, so no bit-plane character
                    emit_run(&mut out, '?', run);
                } else {
                    let index = color.palette_index() as usize;
                    out.push('#');
                    write_number(&mut out, index);
                    if !color.uses_palette() {
                        // first use of this register: define it inline
                        let entry = palette.get(index).copied().unwrap_or(color);
                        out.push_str(";2;");
                        write_number(&mut out, entry.red_percent() as usize);
                        out.push(';');
                        write_number(&mut out, entry.green_percent() as usize);
                        out.push(';');
                        write_number(&mut out, entry.blue_percent() as usize);
                    }
                    emit_run(&mut out, sixel_char, run);
                }
                x += run;
            }
            out.push('$');
        }
        out.push('-');
    }

    // String terminator: ESC \
    out.push('\x1b');
    out.push('\\');
    out
}

/// Run-length emission. Short runs cost less as literals; the repeat
/// operator's count field saturates at 255, so longer runs split into
/// full chunks plus a remainder.
fn emit_run(out: &mut String, ch: char, mut count: usize) {
    while count > 255 {
        out.push('!');
        write_number(out, 255);
        out.push(ch);
        count -= 255;
    }
    if count > 4 {
        out.push('!');
        write_number(out, count);
        out.push(ch);
    } else {
        for _ in 0..count {
            out.push(ch);
        }
    }
}

/// Fast number to string without allocation
#[inline]
fn write_number(out: &mut String, mut n: usize) {
    if n == 0 {
        out.push('0');
        return;
    }

    let mut buf = [0u8; 20];
    let mut i = buf.len();

    while n > 0 {
        i -= 1;
        buf[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }

    out.push_str(unsafe { std::str::from_utf8_unchecked(&buf[i..]) });
}
