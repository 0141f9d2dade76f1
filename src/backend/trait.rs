//! Drawing surface and font metrics collaborators
//!
//! The protocol core never rasterizes by itself. Every window and pixmap owns a
//! `Surface` made by the server's `SurfaceFactory`; text measurement goes through
//! `FontMetrics`. Holding `&mut dyn Surface` is what it means for a drawable to
//! be locked for drawing.

use crate::protocol::{Arc, Point, Rect, Segment, X11Result};
use crate::resources::GraphicsContext;

/// Pixels read back from a surface, row-major, one `u32` per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        PixelBuffer {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, pixel: u32) {
        let idx = (y * self.width + x) as usize;
        self.pixels[idx] = pixel;
    }
}

pub trait Surface: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn depth(&self) -> u8;

    fn draw_points(&mut self, gc: &GraphicsContext, points: &[Point]);
    /// Connected line through `points`.
    fn draw_lines(&mut self, gc: &GraphicsContext, points: &[Point]);
    fn draw_segments(&mut self, gc: &GraphicsContext, segments: &[Segment]);
    fn draw_rects(&mut self, gc: &GraphicsContext, rects: &[Rect]);
    fn fill_rects(&mut self, gc: &GraphicsContext, rects: &[Rect]);
    fn draw_arcs(&mut self, gc: &GraphicsContext, arcs: &[Arc]);
    fn fill_arcs(&mut self, gc: &GraphicsContext, arcs: &[Arc]);
    fn fill_polygon(&mut self, gc: &GraphicsContext, points: &[Point]);

    /// Draw `text` with its baseline origin at (x, y). `image` also fills the
    /// character cells with the background first.
    fn draw_text(
        &mut self,
        gc: &GraphicsContext,
        font: &FontHandle,
        x: i32,
        y: i32,
        text: &[u16],
        image: bool,
    );

    /// Clipped to the surface; pixels outside it read as 0.
    fn read_pixels(&self, rect: Rect) -> PixelBuffer;
    /// Store pixels at (x, y). With a GC the raster function, plane mask and
    /// clip apply; without one the pixels are copied as is.
    fn write_pixels(&mut self, x: i32, y: i32, pixels: &PixelBuffer, gc: Option<&GraphicsContext>);
    /// Plain fill, no GC involved. Used for window backgrounds.
    fn clear(&mut self, rect: Rect, pixel: u32);
}

pub trait SurfaceFactory: Send + Sync {
    fn create_surface(&self, width: u32, height: u32, depth: u8) -> X11Result<Box<dyn Surface>>;
}

/// A resolved font as seen by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontHandle {
    pub name: String,
    pub ascent: i16,
    pub descent: i16,
    pub min_char: u16,
    pub max_char: u16,
    pub default_char: u16,
    /// Widest advance of any character
    pub max_advance: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharMetrics {
    pub left_bearing: i16,
    pub right_bearing: i16,
    pub width: i16,
    pub ascent: i16,
    pub descent: i16,
    pub attributes: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextExtents {
    pub font_ascent: i16,
    pub font_descent: i16,
    pub overall_ascent: i16,
    pub overall_descent: i16,
    pub overall_width: i32,
    pub overall_left: i32,
    pub overall_right: i32,
}

pub trait FontMetrics: Send + Sync {
    /// Resolve a font name (XLFD, alias, or pattern) to a concrete font.
    fn resolve(&self, name: &str) -> Option<FontHandle>;
    /// Names of all fonts this provider can resolve.
    fn font_names(&self) -> Vec<String>;
    fn char_metrics(&self, font: &FontHandle, ch: u16) -> CharMetrics;

    fn text_extents(&self, font: &FontHandle, text: &[u16]) -> TextExtents {
        let mut extents = TextExtents {
            font_ascent: font.ascent,
            font_descent: font.descent,
            ..Default::default()
        };
        for (i, &ch) in text.iter().enumerate() {
            let m = self.char_metrics(font, ch);
            if i == 0 {
                extents.overall_left = m.left_bearing as i32;
            }
            extents.overall_ascent = extents.overall_ascent.max(m.ascent);
            extents.overall_descent = extents.overall_descent.max(m.descent);
            extents.overall_right = extents
                .overall_right
                .max(extents.overall_width + m.right_bearing as i32);
            extents.overall_width += m.width as i32;
        }
        extents
    }
}
