//! Graphics contexts
//!
//! A GC is only a parameter set; drawing requests look it up by id and hand a
//! snapshot to the surface they draw on.

use super::table::ResourceTable;
use crate::protocol::{Packet, Rect, X11Error, X11Result};

/// Raster operation applied between source and destination pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcFunction {
    Clear = 0,
    And = 1,
    AndReverse = 2,
    Copy = 3,
    AndInverted = 4,
    NoOp = 5,
    Xor = 6,
    Or = 7,
    Nor = 8,
    Equiv = 9,
    Invert = 10,
    OrReverse = 11,
    CopyInverted = 12,
    OrInverted = 13,
    Nand = 14,
    Set = 15,
}

impl GcFunction {
    pub fn from_u8(value: u8) -> Option<Self> {
        use GcFunction::*;
        const ALL: [GcFunction; 16] = [
            Clear, And, AndReverse, Copy, AndInverted, NoOp, Xor, Or, Nor, Equiv, Invert,
            OrReverse, CopyInverted, OrInverted, Nand, Set,
        ];
        ALL.get(value as usize).copied()
    }

    pub fn apply(self, src: u32, dst: u32) -> u32 {
        use GcFunction::*;
        match self {
            Clear => 0,
            And => src & dst,
            AndReverse => src & !dst,
            Copy => src,
            AndInverted => !src & dst,
            NoOp => dst,
            Xor => src ^ dst,
            Or => src | dst,
            Nor => !(src | dst),
            Equiv => !src ^ dst,
            Invert => !dst,
            OrReverse => src | !dst,
            CopyInverted => !src,
            OrInverted => !src | dst,
            Nand => !(src & dst),
            Set => 0xffff_ffff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid = 0,
    OnOffDash = 1,
    DoubleDash = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapStyle {
    NotLast = 0,
    Butt = 1,
    Round = 2,
    Projecting = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStyle {
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStyle {
    Solid = 0,
    Tiled = 1,
    Stippled = 2,
    OpaqueStippled = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    EvenOdd = 0,
    Winding = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcMode {
    Chord = 0,
    PieSlice = 1,
}

/// ChangeGC / CreateGC value-mask bits, in wire order
pub mod gc_mask {
    pub const FUNCTION: u32 = 1 << 0;
    pub const PLANE_MASK: u32 = 1 << 1;
    pub const FOREGROUND: u32 = 1 << 2;
    pub const BACKGROUND: u32 = 1 << 3;
    pub const LINE_WIDTH: u32 = 1 << 4;
    pub const LINE_STYLE: u32 = 1 << 5;
    pub const CAP_STYLE: u32 = 1 << 6;
    pub const JOIN_STYLE: u32 = 1 << 7;
    pub const FILL_STYLE: u32 = 1 << 8;
    pub const FILL_RULE: u32 = 1 << 9;
    pub const TILE: u32 = 1 << 10;
    pub const STIPPLE: u32 = 1 << 11;
    pub const TILE_STIPPLE_X_ORIGIN: u32 = 1 << 12;
    pub const TILE_STIPPLE_Y_ORIGIN: u32 = 1 << 13;
    pub const FONT: u32 = 1 << 14;
    pub const SUBWINDOW_MODE: u32 = 1 << 15;
    pub const GRAPHICS_EXPOSURES: u32 = 1 << 16;
    pub const CLIP_X_ORIGIN: u32 = 1 << 17;
    pub const CLIP_Y_ORIGIN: u32 = 1 << 18;
    pub const CLIP_MASK: u32 = 1 << 19;
    pub const DASH_OFFSET: u32 = 1 << 20;
    pub const DASHES: u32 = 1 << 21;
    pub const ARC_MODE: u32 = 1 << 22;
    pub const ALL: u32 = (1 << 23) - 1;
}

#[derive(Debug, Clone)]
pub struct GraphicsContext {
    pub function: GcFunction,
    pub plane_mask: u32,
    pub foreground: u32,
    pub background: u32,
    pub line_width: u16,
    pub line_style: LineStyle,
    pub cap_style: CapStyle,
    pub join_style: JoinStyle,
    pub fill_style: FillStyle,
    pub fill_rule: FillRule,
    pub tile: u32,
    pub stipple: u32,
    pub tile_stipple_x_origin: i16,
    pub tile_stipple_y_origin: i16,
    pub font: u32,
    pub subwindow_mode: u8,
    pub graphics_exposures: bool,
    pub clip_x_origin: i16,
    pub clip_y_origin: i16,
    /// `None` draws unclipped; otherwise only inside these rectangles,
    /// relative to the clip origin.
    pub clip_rects: Option<Vec<Rect>>,
    pub dash_offset: u16,
    pub dashes: Vec<u8>,
    pub arc_mode: ArcMode,
}

impl Default for GraphicsContext {
    fn default() -> Self {
        GraphicsContext {
            function: GcFunction::Copy,
            plane_mask: 0xffff_ffff,
            foreground: 0,
            background: 1,
            line_width: 0,
            line_style: LineStyle::Solid,
            cap_style: CapStyle::Butt,
            join_style: JoinStyle::Miter,
            fill_style: FillStyle::Solid,
            fill_rule: FillRule::EvenOdd,
            tile: 0,
            stipple: 0,
            tile_stipple_x_origin: 0,
            tile_stipple_y_origin: 0,
            font: 0,
            subwindow_mode: 0,
            graphics_exposures: true,
            clip_x_origin: 0,
            clip_y_origin: 0,
            clip_rects: None,
            dash_offset: 0,
            dashes: vec![4, 4],
            arc_mode: ArcMode::PieSlice,
        }
    }
}

fn enum_value<T>(value: u32, f: impl Fn(u32) -> Option<T>) -> X11Result<T> {
    f(value).ok_or_else(|| X11Error::bad_value(value))
}

impl GraphicsContext {
    /// Apply a value list: one CARD32 per bit set in `mask`, lowest bit first.
    pub fn apply_values(&mut self, mask: u32, packet: &mut Packet) -> X11Result<()> {
        if mask & !gc_mask::ALL != 0 {
            return Err(X11Error::bad_value(mask));
        }
        for bit in 0..23 {
            let flag = 1u32 << bit;
            if mask & flag == 0 {
                continue;
            }
            let v = packet.read_card32()?;
            match flag {
                gc_mask::FUNCTION => {
                    self.function = enum_value(v, |v| GcFunction::from_u8(v as u8).filter(|_| v < 16))?
                }
                gc_mask::PLANE_MASK => self.plane_mask = v,
                gc_mask::FOREGROUND => self.foreground = v,
                gc_mask::BACKGROUND => self.background = v,
                gc_mask::LINE_WIDTH => self.line_width = v as u16,
                gc_mask::LINE_STYLE => {
                    self.line_style = enum_value(v, |v| match v {
                        0 => Some(LineStyle::Solid),
                        1 => Some(LineStyle::OnOffDash),
                        2 => Some(LineStyle::DoubleDash),
                        _ => None,
                    })?
                }
                gc_mask::CAP_STYLE => {
                    self.cap_style = enum_value(v, |v| match v {
                        0 => Some(CapStyle::NotLast),
                        1 => Some(CapStyle::Butt),
                        2 => Some(CapStyle::Round),
                        3 => Some(CapStyle::Projecting),
                        _ => None,
                    })?
                }
                gc_mask::JOIN_STYLE => {
                    self.join_style = enum_value(v, |v| match v {
                        0 => Some(JoinStyle::Miter),
                        1 => Some(JoinStyle::Round),
                        2 => Some(JoinStyle::Bevel),
                        _ => None,
                    })?
                }
                gc_mask::FILL_STYLE => {
                    self.fill_style = enum_value(v, |v| match v {
                        0 => Some(FillStyle::Solid),
                        1 => Some(FillStyle::Tiled),
                        2 => Some(FillStyle::Stippled),
                        3 => Some(FillStyle::OpaqueStippled),
                        _ => None,
                    })?
                }
                gc_mask::FILL_RULE => {
                    self.fill_rule = enum_value(v, |v| match v {
                        0 => Some(FillRule::EvenOdd),
                        1 => Some(FillRule::Winding),
                        _ => None,
                    })?
                }
                gc_mask::TILE => self.tile = v,
                gc_mask::STIPPLE => self.stipple = v,
                gc_mask::TILE_STIPPLE_X_ORIGIN => self.tile_stipple_x_origin = v as i16,
                gc_mask::TILE_STIPPLE_Y_ORIGIN => self.tile_stipple_y_origin = v as i16,
                gc_mask::FONT => self.font = v,
                gc_mask::SUBWINDOW_MODE => self.subwindow_mode = v as u8,
                gc_mask::GRAPHICS_EXPOSURES => self.graphics_exposures = v != 0,
                gc_mask::CLIP_X_ORIGIN => self.clip_x_origin = v as i16,
                gc_mask::CLIP_Y_ORIGIN => self.clip_y_origin = v as i16,
                gc_mask::CLIP_MASK => {
                    // Pixmap clip masks are not supported, only None
                    if v != 0 {
                        return Err(X11Error::bad_value(v));
                    }
                    self.clip_rects = None;
                }
                gc_mask::DASH_OFFSET => self.dash_offset = v as u16,
                gc_mask::DASHES => {
                    if v & 0xff == 0 {
                        return Err(X11Error::bad_value(v));
                    }
                    self.dashes = vec![v as u8];
                }
                gc_mask::ARC_MODE => {
                    self.arc_mode = enum_value(v, |v| match v {
                        0 => Some(ArcMode::Chord),
                        1 => Some(ArcMode::PieSlice),
                        _ => None,
                    })?
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// CopyGC: take the components selected by `mask` from `src`.
    pub fn copy_from(&mut self, src: &GraphicsContext, mask: u32) {
        let take = |flag: u32| mask & flag != 0;
        if take(gc_mask::FUNCTION) {
            self.function = src.function;
        }
        if take(gc_mask::PLANE_MASK) {
            self.plane_mask = src.plane_mask;
        }
        if take(gc_mask::FOREGROUND) {
            self.foreground = src.foreground;
        }
        if take(gc_mask::BACKGROUND) {
            self.background = src.background;
        }
        if take(gc_mask::LINE_WIDTH) {
            self.line_width = src.line_width;
        }
        if take(gc_mask::LINE_STYLE) {
            self.line_style = src.line_style;
        }
        if take(gc_mask::CAP_STYLE) {
            self.cap_style = src.cap_style;
        }
        if take(gc_mask::JOIN_STYLE) {
            self.join_style = src.join_style;
        }
        if take(gc_mask::FILL_STYLE) {
            self.fill_style = src.fill_style;
        }
        if take(gc_mask::FILL_RULE) {
            self.fill_rule = src.fill_rule;
        }
        if take(gc_mask::TILE) {
            self.tile = src.tile;
        }
        if take(gc_mask::STIPPLE) {
            self.stipple = src.stipple;
        }
        if take(gc_mask::TILE_STIPPLE_X_ORIGIN) {
            self.tile_stipple_x_origin = src.tile_stipple_x_origin;
        }
        if take(gc_mask::TILE_STIPPLE_Y_ORIGIN) {
            self.tile_stipple_y_origin = src.tile_stipple_y_origin;
        }
        if take(gc_mask::FONT) {
            self.font = src.font;
        }
        if take(gc_mask::SUBWINDOW_MODE) {
            self.subwindow_mode = src.subwindow_mode;
        }
        if take(gc_mask::GRAPHICS_EXPOSURES) {
            self.graphics_exposures = src.graphics_exposures;
        }
        if take(gc_mask::CLIP_X_ORIGIN) {
            self.clip_x_origin = src.clip_x_origin;
        }
        if take(gc_mask::CLIP_Y_ORIGIN) {
            self.clip_y_origin = src.clip_y_origin;
        }
        if take(gc_mask::CLIP_MASK) {
            self.clip_rects = src.clip_rects.clone();
        }
        if take(gc_mask::DASH_OFFSET) {
            self.dash_offset = src.dash_offset;
        }
        if take(gc_mask::DASHES) {
            self.dashes = src.dashes.clone();
        }
        if take(gc_mask::ARC_MODE) {
            self.arc_mode = src.arc_mode;
        }
    }

    /// Whether a pixel passes the clip rectangles.
    pub fn clip_allows(&self, x: i32, y: i32) -> bool {
        match &self.clip_rects {
            None => true,
            Some(rects) => {
                let cx = x - self.clip_x_origin as i32;
                let cy = y - self.clip_y_origin as i32;
                rects.iter().any(|r| r.contains(cx, cy))
            }
        }
    }
}

pub type GcTable = ResourceTable<GraphicsContext>;

pub fn new_gc_table() -> GcTable {
    ResourceTable::new(X11Error::bad_gc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BufferPool, ByteOrder, ErrorCode};

    fn packet(words: &[u32]) -> Packet {
        let pool = BufferPool::new();
        let mut buf = pool.acquire(words.len() * 4);
        for (i, w) in words.iter().enumerate() {
            buf.as_mut_slice()[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        Packet::new(56, 0, buf, ByteOrder::LSBFirst)
    }

    #[test]
    fn test_values_follow_mask_order() {
        let mut gc = GraphicsContext::default();
        let mask = gc_mask::FUNCTION | gc_mask::FOREGROUND | gc_mask::LINE_WIDTH;
        let mut p = packet(&[6, 0xff00ff00, 3]);
        gc.apply_values(mask, &mut p).unwrap();
        assert_eq!(gc.function, GcFunction::Xor);
        assert_eq!(gc.foreground, 0xff00ff00);
        assert_eq!(gc.line_width, 3);
        assert_eq!(gc.background, 1);
    }

    #[test]
    fn test_clip_mask_pixmap_rejected() {
        let mut gc = GraphicsContext::default();
        let mut p = packet(&[0x200001]);
        let err = gc.apply_values(gc_mask::CLIP_MASK, &mut p).unwrap_err();
        assert_eq!(err.code, ErrorCode::Value);

        let mut gc = GraphicsContext {
            clip_rects: Some(vec![Rect::new(0, 0, 1, 1)]),
            ..Default::default()
        };
        let mut p = packet(&[0]);
        gc.apply_values(gc_mask::CLIP_MASK, &mut p).unwrap();
        assert!(gc.clip_rects.is_none());
    }

    #[test]
    fn test_bad_enum_value() {
        let mut gc = GraphicsContext::default();
        let mut p = packet(&[9]);
        assert_eq!(
            gc.apply_values(gc_mask::ARC_MODE, &mut p).unwrap_err().bad_value,
            9
        );
    }

    #[test]
    fn test_copy_from_mask() {
        let src = GraphicsContext {
            foreground: 7,
            background: 8,
            ..Default::default()
        };
        let mut dst = GraphicsContext::default();
        dst.copy_from(&src, gc_mask::FOREGROUND);
        assert_eq!(dst.foreground, 7);
        assert_eq!(dst.background, 1);
    }

    #[test]
    fn test_functions() {
        assert_eq!(GcFunction::Xor.apply(0b1100, 0b1010), 0b0110);
        assert_eq!(GcFunction::from_u8(3), Some(GcFunction::Copy));
        assert_eq!(GcFunction::from_u8(16), None);
    }
}
