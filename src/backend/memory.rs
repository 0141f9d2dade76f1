//! In-memory backend
//!
//! Surfaces are plain `u32` pixel arrays and fonts are fixed-cell. Nothing is
//! shown anywhere; clients can read their drawing back with GetImage, which is
//! what the tests do.

use super::*;
use crate::protocol::{Arc, Point, Rect, Segment, X11Error, X11Result};
use crate::resources::fonts::font_pattern_matches;
use crate::resources::{ArcMode, FillRule, GcFunction, GraphicsContext};

/// Full circle in X11 angle units (1/64 degree)
const FULL_CIRCLE: i32 = 360 * 64;

/// Largest surface handed out, 8192x8192 pixels
pub const MAX_SURFACE_PIXELS: usize = 1 << 26;

pub struct MemorySurface {
    width: u32,
    height: u32,
    depth: u8,
    pixels: Vec<u32>,
}

impl MemorySurface {
    /// A zeroed surface. Sizes the server cannot hold are an Alloc error.
    pub fn new(width: u32, height: u32, depth: u8) -> X11Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .filter(|&n| n <= MAX_SURFACE_PIXELS)
            .ok_or_else(X11Error::bad_alloc)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| X11Error::bad_alloc())?;
        pixels.resize(len, 0);
        Ok(MemorySurface {
            width,
            height,
            depth,
            pixels,
        })
    }

    fn depth_mask(&self) -> u32 {
        if self.depth >= 32 {
            0xffff_ffff
        } else {
            (1u32 << self.depth) - 1
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    fn plot(&mut self, gc: &GraphicsContext, x: i32, y: i32, src: u32) {
        let Some(idx) = self.index(x, y) else {
            return;
        };
        if !gc.clip_allows(x, y) {
            return;
        }
        let dst = self.pixels[idx];
        let value = gc.function.apply(src, dst);
        let merged = (value & gc.plane_mask) | (dst & !gc.plane_mask);
        self.pixels[idx] = merged & self.depth_mask();
    }

    /// A square pen of the GC line width; width 0 is a one-pixel line.
    fn pen(&mut self, gc: &GraphicsContext, x: i32, y: i32) {
        let w = gc.line_width.max(1) as i32;
        if w == 1 {
            self.plot(gc, x, y, gc.foreground);
            return;
        }
        let half = w / 2;
        for dy in 0..w {
            for dx in 0..w {
                self.plot(gc, x - half + dx, y - half + dy, gc.foreground);
            }
        }
    }

    fn line(&mut self, gc: &GraphicsContext, x0: i32, y0: i32, x1: i32, y1: i32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.pen(gc, x, y);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn span(&mut self, gc: &GraphicsContext, y: i32, x_start: i32, x_end: i32) {
        let x_start = x_start.max(0);
        let x_end = x_end.min(self.width as i32);
        for x in x_start..x_end {
            self.plot(gc, x, y, gc.foreground);
        }
    }

    fn arc_points(arc: &Arc) -> Vec<(i32, i32)> {
        let rx = arc.width as f64 / 2.0;
        let ry = arc.height as f64 / 2.0;
        let cx = arc.x as f64 + rx;
        let cy = arc.y as f64 + ry;
        let sweep = arc.angle2.clamp(-FULL_CIRCLE, FULL_CIRCLE);
        let steps = ((rx + ry) * 2.0).max(16.0) as i32;
        (0..=steps)
            .map(|i| {
                let a = (arc.angle1 as f64 + sweep as f64 * i as f64 / steps as f64) / 64.0;
                let t = a.to_radians();
                ((cx + rx * t.cos()).round() as i32, (cy - ry * t.sin()).round() as i32)
            })
            .collect()
    }

    fn inside_arc(arc: &Arc, mode: ArcMode, px: f64, py: f64) -> bool {
        let rx = arc.width as f64 / 2.0;
        let ry = arc.height as f64 / 2.0;
        if rx <= 0.0 || ry <= 0.0 {
            return false;
        }
        let nx = (px - (arc.x as f64 + rx)) / rx;
        let ny = ((arc.y as f64 + ry) - py) / ry;
        if nx * nx + ny * ny > 1.0 {
            return false;
        }
        if arc.angle2.abs() >= FULL_CIRCLE {
            return true;
        }

        let (start, sweep) = if arc.angle2 < 0 {
            (arc.angle1 + arc.angle2, -arc.angle2)
        } else {
            (arc.angle1, arc.angle2)
        };
        let start = start as f64 / 64.0;
        let sweep = sweep as f64 / 64.0;
        match mode {
            ArcMode::PieSlice => {
                let angle = ny.atan2(nx).to_degrees();
                let rel = (angle - start).rem_euclid(360.0);
                rel <= sweep
            }
            ArcMode::Chord => {
                let (a, b) = (start.to_radians(), (start + sweep).to_radians());
                let (x1, y1, x2, y2) = (a.cos(), a.sin(), b.cos(), b.sin());
                let side = |x: f64, y: f64| (x2 - x1) * (y - y1) - (y2 - y1) * (x - x1);
                let mid = (start + sweep / 2.0).to_radians();
                side(nx, ny) * side(mid.cos(), mid.sin()) >= 0.0
            }
        }
    }
}

impl Surface for MemorySurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn depth(&self) -> u8 {
        self.depth
    }

    fn draw_points(&mut self, gc: &GraphicsContext, points: &[Point]) {
        for p in points {
            self.plot(gc, p.x, p.y, gc.foreground);
        }
    }

    fn draw_lines(&mut self, gc: &GraphicsContext, points: &[Point]) {
        if points.len() == 1 {
            self.pen(gc, points[0].x, points[0].y);
        }
        for pair in points.windows(2) {
            self.line(gc, pair[0].x, pair[0].y, pair[1].x, pair[1].y);
        }
    }

    fn draw_segments(&mut self, gc: &GraphicsContext, segments: &[Segment]) {
        for s in segments {
            self.line(gc, s.x1, s.y1, s.x2, s.y2);
        }
    }

    fn draw_rects(&mut self, gc: &GraphicsContext, rects: &[Rect]) {
        for r in rects {
            let (x0, y0, x1, y1) = (r.x, r.y, r.x + r.width, r.y + r.height);
            self.draw_lines(
                gc,
                &[
                    Point::new(x0, y0),
                    Point::new(x1, y0),
                    Point::new(x1, y1),
                    Point::new(x0, y1),
                    Point::new(x0, y0),
                ],
            );
        }
    }

    fn fill_rects(&mut self, gc: &GraphicsContext, rects: &[Rect]) {
        for r in rects {
            for y in r.y.max(0)..r.bottom().min(self.height as i32) {
                self.span(gc, y, r.x, r.right());
            }
        }
    }

    fn draw_arcs(&mut self, gc: &GraphicsContext, arcs: &[Arc]) {
        for arc in arcs {
            let points: Vec<Point> = Self::arc_points(arc)
                .into_iter()
                .map(|(x, y)| Point::new(x, y))
                .collect();
            self.draw_lines(gc, &points);
        }
    }

    fn fill_arcs(&mut self, gc: &GraphicsContext, arcs: &[Arc]) {
        for arc in arcs {
            for y in arc.y.max(0)..(arc.y + arc.height).min(self.height as i32) {
                for x in arc.x.max(0)..(arc.x + arc.width).min(self.width as i32) {
                    if Self::inside_arc(arc, gc.arc_mode, x as f64 + 0.5, y as f64 + 0.5) {
                        self.plot(gc, x, y, gc.foreground);
                    }
                }
            }
        }
    }

    fn fill_polygon(&mut self, gc: &GraphicsContext, points: &[Point]) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0);
        let max_y = points
            .iter()
            .map(|p| p.y)
            .max()
            .unwrap_or(0)
            .min(self.height as i32);

        for y in min_y..max_y {
            let sample = y as f64 + 0.5;
            let mut crossings: Vec<(f64, i32)> = Vec::new();
            for i in 0..points.len() {
                let a = points[i];
                let b = points[(i + 1) % points.len()];
                if a.y == b.y {
                    continue;
                }
                let (lo, hi, dir) = if a.y < b.y { (a, b, 1) } else { (b, a, -1) };
                if sample < lo.y as f64 || sample >= hi.y as f64 {
                    continue;
                }
                let t = (sample - lo.y as f64) / (hi.y - lo.y) as f64;
                crossings.push((lo.x as f64 + t * (hi.x - lo.x) as f64, dir));
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for (i, &(x, dir)) in crossings.iter().enumerate() {
                winding += dir;
                let inside = match gc.fill_rule {
                    FillRule::EvenOdd => (i + 1) % 2 == 1,
                    FillRule::Winding => winding != 0,
                };
                if inside {
                    if let Some(&(next, _)) = crossings.get(i + 1) {
                        self.span(gc, y, x.round() as i32, next.round() as i32);
                    }
                }
            }
        }
    }

    fn draw_text(
        &mut self,
        gc: &GraphicsContext,
        font: &FontHandle,
        x: i32,
        y: i32,
        text: &[u16],
        image: bool,
    ) {
        let advance = font.max_advance as i32;
        let ascent = font.ascent as i32;
        let height = ascent + font.descent as i32;

        if image {
            // ImageText ignores the raster function
            let cell = GraphicsContext {
                function: GcFunction::Copy,
                foreground: gc.background,
                ..gc.clone()
            };
            let width = advance * text.len() as i32;
            self.fill_rects(&cell, &[Rect::new(x, y - ascent, width, height)]);
        }

        // Glyphs are drawn as boxes inside their cell
        for (i, &ch) in text.iter().enumerate() {
            if ch == b' ' as u16 || advance < 3 || height < 3 {
                continue;
            }
            let cx = x + i as i32 * advance;
            let glyph = Rect::new(cx + 1, y - ascent + 1, advance - 3, height - 3);
            self.draw_rects(gc, &[glyph]);
        }
    }

    fn read_pixels(&self, rect: Rect) -> PixelBuffer {
        let mut out = PixelBuffer::new(rect.width.max(0) as u32, rect.height.max(0) as u32);
        for dy in 0..out.height {
            for dx in 0..out.width {
                if let Some(idx) = self.index(rect.x + dx as i32, rect.y + dy as i32) {
                    out.set(dx, dy, self.pixels[idx]);
                }
            }
        }
        out
    }

    fn write_pixels(&mut self, x: i32, y: i32, pixels: &PixelBuffer, gc: Option<&GraphicsContext>) {
        for dy in 0..pixels.height {
            for dx in 0..pixels.width {
                let (px, py) = (x + dx as i32, y + dy as i32);
                let src = pixels.get(dx, dy);
                match gc {
                    Some(gc) => self.plot(gc, px, py, src),
                    None => {
                        if let Some(idx) = self.index(px, py) {
                            self.pixels[idx] = src & self.depth_mask();
                        }
                    }
                }
            }
        }
    }

    fn clear(&mut self, rect: Rect, pixel: u32) {
        let area = rect.intersect(&Rect::new(0, 0, self.width as i32, self.height as i32));
        let value = pixel & self.depth_mask();
        for y in area.y..area.bottom() {
            let row = y as usize * self.width as usize;
            self.pixels[row + area.x as usize..row + area.right() as usize].fill(value);
        }
    }
}

pub struct MemorySurfaceFactory;

impl SurfaceFactory for MemorySurfaceFactory {
    fn create_surface(&self, width: u32, height: u32, depth: u8) -> X11Result<Box<dyn Surface>> {
        Ok(Box::new(MemorySurface::new(width, height, depth)?))
    }
}

struct FixedFont {
    name: &'static str,
    aliases: &'static [&'static str],
    width: i16,
    ascent: i16,
    descent: i16,
}

const FIXED_FONTS: &[FixedFont] = &[
    FixedFont {
        name: "-misc-fixed-medium-r-semicondensed--13-120-75-75-c-60-iso8859-1",
        aliases: &["fixed", "6x13"],
        width: 6,
        ascent: 11,
        descent: 2,
    },
    FixedFont {
        name: "-misc-fixed-medium-r-normal--15-140-75-75-c-90-iso8859-1",
        aliases: &["9x15"],
        width: 9,
        ascent: 12,
        descent: 3,
    },
    FixedFont {
        name: "-misc-fixed-bold-r-normal--15-140-75-75-c-90-iso8859-1",
        aliases: &["9x15bold"],
        width: 9,
        ascent: 12,
        descent: 3,
    },
    FixedFont {
        name: "-misc-fixed-medium-r-normal--20-200-75-75-c-100-iso8859-1",
        aliases: &["10x20"],
        width: 10,
        ascent: 16,
        descent: 4,
    },
    FixedFont {
        name: "cursor",
        aliases: &[],
        width: 16,
        ascent: 16,
        descent: 0,
    },
];

/// Fixed-cell metrics for a handful of misc-fixed fonts
pub struct FixedFontMetrics;

impl FixedFontMetrics {
    fn handle(font: &FixedFont) -> FontHandle {
        FontHandle {
            name: font.name.to_string(),
            ascent: font.ascent,
            descent: font.descent,
            min_char: 0,
            max_char: 255,
            default_char: b' ' as u16,
            max_advance: font.width,
        }
    }
}

impl FontMetrics for FixedFontMetrics {
    fn resolve(&self, name: &str) -> Option<FontHandle> {
        let exact = FIXED_FONTS.iter().find(|f| {
            f.name.eq_ignore_ascii_case(name) || f.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
        });
        exact
            .or_else(|| FIXED_FONTS.iter().find(|f| font_pattern_matches(name, f.name)))
            .map(Self::handle)
    }

    fn font_names(&self) -> Vec<String> {
        FIXED_FONTS
            .iter()
            .flat_map(|f| std::iter::once(f.name).chain(f.aliases.iter().copied()))
            .map(str::to_string)
            .collect()
    }

    fn char_metrics(&self, font: &FontHandle, ch: u16) -> CharMetrics {
        if ch < font.min_char || ch > font.max_char {
            return CharMetrics::default();
        }
        CharMetrics {
            left_bearing: 0,
            right_bearing: font.max_advance,
            width: font.max_advance,
            ascent: font.ascent,
            descent: font.descent,
            attributes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gc(fg: u32) -> GraphicsContext {
        GraphicsContext {
            foreground: fg,
            ..Default::default()
        }
    }

    #[test]
    fn test_fill_and_read_back() {
        let mut s = MemorySurface::new(8, 8, 32).unwrap();
        s.fill_rects(&gc(0xff112233), &[Rect::new(2, 2, 3, 3)]);
        let px = s.read_pixels(Rect::new(0, 0, 8, 8));
        assert_eq!(px.get(2, 2), 0xff112233);
        assert_eq!(px.get(4, 4), 0xff112233);
        assert_eq!(px.get(5, 5), 0);
        assert_eq!(px.get(1, 2), 0);
    }

    #[test]
    fn test_clip_rects_limit_drawing() {
        let mut s = MemorySurface::new(8, 8, 32).unwrap();
        let clipped = GraphicsContext {
            foreground: 1,
            clip_rects: Some(vec![Rect::new(0, 0, 2, 2)]),
            clip_x_origin: 1,
            clip_y_origin: 1,
            ..Default::default()
        };
        s.fill_rects(&clipped, &[Rect::new(0, 0, 8, 8)]);
        let px = s.read_pixels(Rect::new(0, 0, 8, 8));
        assert_eq!(px.pixels.iter().filter(|&&p| p == 1).count(), 4);
        assert_eq!(px.get(1, 1), 1);
        assert_eq!(px.get(0, 0), 0);
    }

    #[test]
    fn test_xor_function_and_depth_mask() {
        let mut s = MemorySurface::new(2, 1, 1).unwrap();
        let xor = GraphicsContext {
            function: GcFunction::Xor,
            foreground: 0xffff_ffff,
            ..Default::default()
        };
        s.draw_points(&xor, &[Point::new(0, 0)]);
        assert_eq!(s.read_pixels(Rect::new(0, 0, 2, 1)).pixels, vec![1, 0]);
        s.draw_points(&xor, &[Point::new(0, 0)]);
        assert_eq!(s.read_pixels(Rect::new(0, 0, 2, 1)).pixels, vec![0, 0]);
    }

    #[test]
    fn test_line_endpoints() {
        let mut s = MemorySurface::new(10, 10, 32).unwrap();
        s.draw_lines(&gc(7), &[Point::new(0, 0), Point::new(9, 9)]);
        let px = s.read_pixels(Rect::new(0, 0, 10, 10));
        for i in 0..10 {
            assert_eq!(px.get(i, i), 7);
        }
    }

    #[test]
    fn test_fill_polygon_triangle() {
        let mut s = MemorySurface::new(10, 10, 32).unwrap();
        s.fill_polygon(
            &gc(5),
            &[Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)],
        );
        let px = s.read_pixels(Rect::new(0, 0, 10, 10));
        assert_eq!(px.get(1, 1), 5);
        assert_eq!(px.get(9, 9), 0);
    }

    #[test]
    fn test_full_fill_arc_is_ellipse() {
        let mut s = MemorySurface::new(10, 10, 32).unwrap();
        let arc = Arc {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            angle1: 0,
            angle2: FULL_CIRCLE,
        };
        s.fill_arcs(&gc(3), &[arc]);
        let px = s.read_pixels(Rect::new(0, 0, 10, 10));
        assert_eq!(px.get(5, 5), 3);
        assert_eq!(px.get(0, 0), 0);
    }

    #[test]
    fn test_clear_is_clipped_to_surface() {
        let mut s = MemorySurface::new(4, 4, 32).unwrap();
        s.clear(Rect::new(-2, -2, 4, 4), 9);
        let px = s.read_pixels(Rect::new(0, 0, 4, 4));
        assert_eq!(px.get(1, 1), 9);
        assert_eq!(px.get(2, 2), 0);
    }

    #[test]
    fn test_oversized_surface_is_alloc_error() {
        use crate::protocol::ErrorCode;
        let err = MemorySurface::new(65535, 65535, 32).err().unwrap();
        assert_eq!(err.code, ErrorCode::Alloc);
        assert!(MemorySurface::new(8192, 1, 32).is_ok());
        let factory = MemorySurfaceFactory;
        assert!(factory.create_surface(u32::MAX, 2, 32).is_err());
    }

    #[test]
    fn test_fixed_metrics() {
        let metrics = FixedFontMetrics;
        let font = metrics.resolve("FIXED").unwrap();
        assert_eq!(font.max_advance, 6);
        let ext = metrics.text_extents(&font, &[b'a' as u16, b'b' as u16]);
        assert_eq!(ext.overall_width, 12);
        assert_eq!(ext.overall_right, 12);
        assert_eq!(ext.overall_ascent, 11);
        assert!(metrics.resolve("-misc-fixed-*-20-*").is_some());
        assert!(metrics.resolve("helvetica").is_none());
    }
}
