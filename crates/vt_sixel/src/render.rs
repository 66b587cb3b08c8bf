//! Render settings, terminal-cell measurement and console output.
//!
//! Everything terminal-specific (cursor movement, SGR state, raw writes)
//! stays behind the [`Console`] trait; the codec only ever asks for cursor
//! positions, writes one fully-built escape string and puts things back the
//! way it found them.

use crate::image::SixelImage;
use crate::Result;

/// Pixel aspect ratio of the emitted image, with the historical DCS
/// parameter codes VT340-class terminals expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelAspectRatio {
    #[default]
    OneToOne,
    TwoToOne,
    ThreeToOne,
    FiveToOne,
}

impl PixelAspectRatio {
    /// The P1 parameter code placed in the DCS introducer.
    pub fn dcs_code(self) -> u8 {
        match self {
            PixelAspectRatio::OneToOne => 7,
            PixelAspectRatio::TwoToOne => 5,
            PixelAspectRatio::ThreeToOne => 2,
            PixelAspectRatio::FiveToOne => 0,
        }
    }

    /// Vertical stretch factor applied by the terminal.
    pub fn multiplier(self) -> usize {
        match self {
            PixelAspectRatio::OneToOne => 1,
            PixelAspectRatio::TwoToOne => 2,
            PixelAspectRatio::ThreeToOne => 3,
            PixelAspectRatio::FiveToOne => 5,
        }
    }

    /// Inverse of [`Self::dcs_code`] over the historical 0..=9 range.
    pub fn from_dcs_code(code: u16) -> Option<Self> {
        match code {
            7..=9 => Some(PixelAspectRatio::OneToOne),
            5 | 6 => Some(PixelAspectRatio::TwoToOne),
            2..=4 => Some(PixelAspectRatio::ThreeToOne),
            0 | 1 => Some(PixelAspectRatio::FiveToOne),
            _ => None,
        }
    }
}

/// Where to draw, in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// Draw at the current cursor position.
    #[default]
    Cursor,
    /// Draw at an absolute cell position.
    Absolute { col: u16, row: u16 },
    /// Draw relative to the current cursor position.
    Relative { dx: i16, dy: i16 },
}

/// Per-render-call settings. A value record: build one, pass it by
/// reference, never mutate it mid-render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSettings {
    pub aspect_ratio: PixelAspectRatio,
    pub position: Position,
    /// Snapshot the graphic rendition before drawing and restore it after.
    pub restore_rendition: bool,
}

/// Size of one terminal cell in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    pub width: usize,
    pub height: usize,
}

impl Default for CellSize {
    fn default() -> Self {
        // common raster font cell
        Self {
            width: 10,
            height: 20,
        }
    }
}

/// A bounding box measured in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub cols: usize,
    pub rows: usize,
}

/// The console collaborator the renderer drives. Cursor coordinates are
/// (column, row); the graphic rendition is an opaque snapshot/restore pair.
pub trait Console {
    fn cursor_position(&mut self) -> Result<(u16, u16)>;
    fn set_cursor_position(&mut self, col: u16, row: u16) -> Result<()>;
    fn write(&mut self, text: &str) -> Result<()>;
    fn graphic_rendition(&mut self) -> Result<String>;
    fn set_graphic_rendition(&mut self, value: &str) -> Result<()>;
    fn window_width(&self) -> u16;
}

/// Terminal-cell bounding box of `image` drawn at `cell` pixels per cell.
///
/// The row count scales with the aspect-ratio multiplier since the terminal
/// stretches each pixel row vertically.
pub fn measure(image: &SixelImage, settings: &RenderSettings, cell: CellSize) -> CellRect {
    let cell_width = cell.width.max(1);
    let cell_height = cell.height.max(1);
    let stretched_height = image.height() * settings.aspect_ratio.multiplier();
    CellRect {
        cols: image.width().div_ceil(cell_width),
        rows: stretched_height.div_ceil(cell_height),
    }
}

/// Encodes `image` and draws it through `console`.
///
/// The stream is produced completely before the first console write; the
/// cursor goes back where it started, and the graphic rendition is restored
/// when the settings ask for it.
pub fn render(
    image: &SixelImage,
    settings: &RenderSettings,
    console: &mut dyn Console,
) -> Result<()> {
    let stream = image.encode(settings)?;

    let saved_rendition = if settings.restore_rendition {
        Some(console.graphic_rendition()?)
    } else {
        None
    };

    let (origin_col, origin_row) = console.cursor_position()?;
    let (col, row) = match settings.position {
        Position::Cursor => (origin_col, origin_row),
        Position::Absolute { col, row } => (col, row),
        Position::Relative { dx, dy } => (
            origin_col.saturating_add_signed(dx),
            origin_row.saturating_add_signed(dy),
        ),
    };

    console.set_cursor_position(col, row)?;
    console.write(&stream)?;
    console.set_cursor_position(origin_col, origin_row)?;

    if let Some(rendition) = saved_rendition {
        console.set_graphic_rendition(&rendition)?;
    }
    Ok(())
}
