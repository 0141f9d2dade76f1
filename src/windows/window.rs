//! A single node of the window tree

use super::listener::{ClientWindowCallback, EventSink, WindowObserver};
use crate::backend::{PixelBuffer, Surface};
use crate::protocol::{Atom, Gravity, MapState, Rect, WindowClass, X11Error, X11Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Visibility flag: the client asked for the window to be mapped
pub const FLAG_MAPPED: u8 = 0x01;
/// Visibility flag: mapped and every ancestor is viewable
pub const FLAG_VISIBLE: u8 = 0x02;

/// ChangeProperty modes
pub const PROP_MODE_REPLACE: u8 = 0;
pub const PROP_MODE_PREPEND: u8 = 1;
pub const PROP_MODE_APPEND: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub type_atom: Atom,
    /// 8, 16 or 32
    pub format: u8,
    pub data: Vec<u8>,
}

impl Property {
    pub fn new(type_atom: Atom, format: u8) -> Self {
        Property {
            type_atom,
            format,
            data: Vec::new(),
        }
    }

    /// Length in units of `format`.
    pub fn item_count(&self) -> u32 {
        match self.format {
            16 => (self.data.len() / 2) as u32,
            32 => (self.data.len() / 4) as u32,
            8 => self.data.len() as u32,
            _ => 0,
        }
    }

    /// Replace, prepend or append. Prepend and append require the stored
    /// type and format to match.
    pub fn change(&mut self, mode: u8, type_atom: Atom, format: u8, bytes: Vec<u8>) -> X11Result<()> {
        match mode {
            PROP_MODE_REPLACE => {
                self.type_atom = type_atom;
                self.format = format;
                self.data = bytes;
            }
            PROP_MODE_PREPEND | PROP_MODE_APPEND => {
                if self.type_atom != type_atom {
                    return Err(X11Error::bad_match());
                }
                if self.format != format {
                    return Err(X11Error::bad_match());
                }
                if mode == PROP_MODE_APPEND {
                    self.data.extend_from_slice(&bytes);
                } else {
                    let mut data = bytes;
                    data.append(&mut self.data);
                    self.data = data;
                }
            }
            other => return Err(X11Error::bad_value(other as u32)),
        }
        Ok(())
    }
}

/// How a window's background or border is painted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paint {
    Pixel(u32),
    /// Tiled from a snapshot of a pixmap
    Tile(PixelBuffer),
}

pub struct XWindow {
    pub id: u32,
    pub parent: Option<u32>,
    /// Stacking order; index 0 is the top of the stack
    pub children: Vec<u32>,
    /// Position relative to the parent and size
    pub bounds: Rect,
    pub border_width: u16,
    /// `bounds` shrunk by the border, in window coordinates
    pub inner_bounds: Rect,
    pub class: WindowClass,
    pub depth: u8,
    pub visual: u32,
    pub background: Option<Paint>,
    pub border: Option<Paint>,
    pub bit_gravity: u8,
    pub win_gravity: u8,
    pub backing_store: u8,
    pub backing_planes: u32,
    pub backing_pixel: u32,
    pub override_redirect: bool,
    pub save_under: bool,
    pub do_not_propagate: u32,
    pub colormap: u32,
    pub cursor: u32,
    pub properties: BTreeMap<Atom, Property>,
    pub listeners: Vec<ClientWindowCallback>,
    /// Connection that created the window; SendEvent with an empty mask goes here
    pub creator: Option<Arc<dyn EventSink>>,
    pub visibility: u8,
    pub observer: Option<Box<dyn WindowObserver>>,
    pub surface: Box<dyn Surface>,
}

impl XWindow {
    pub fn new(id: u32, bounds: Rect, class: WindowClass, surface: Box<dyn Surface>) -> Self {
        XWindow {
            id,
            parent: None,
            children: Vec::new(),
            bounds,
            border_width: 0,
            inner_bounds: Rect::new(0, 0, bounds.width, bounds.height),
            class,
            depth: surface.depth(),
            visual: crate::protocol::ROOT_VISUAL_ID,
            background: None,
            border: None,
            bit_gravity: 0,
            win_gravity: Gravity::NorthWest as u8,
            backing_store: 0,
            backing_planes: 0xffff_ffff,
            backing_pixel: 0,
            override_redirect: false,
            save_under: false,
            do_not_propagate: 0,
            colormap: 0,
            cursor: 0,
            properties: BTreeMap::new(),
            listeners: Vec::new(),
            creator: None,
            visibility: 0,
            observer: None,
            surface,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.visibility & FLAG_MAPPED != 0
    }

    pub fn is_visible(&self) -> bool {
        self.visibility & FLAG_VISIBLE != 0
    }

    pub fn map_state(&self) -> MapState {
        if !self.is_mapped() {
            MapState::Unmapped
        } else if self.is_visible() {
            MapState::Viewable
        } else {
            MapState::Unviewable
        }
    }

    pub fn width(&self) -> i32 {
        self.bounds.width
    }

    pub fn height(&self) -> i32 {
        self.bounds.height
    }

    /// Union of every client's mask.
    pub fn all_event_masks(&self) -> u32 {
        self.listeners.iter().fold(0, |mask, l| mask | l.mask)
    }

    pub fn event_mask_of(&self, client_id: u32) -> u32 {
        self.listeners
            .iter()
            .find(|l| l.client_id() == client_id)
            .map_or(0, |l| l.mask)
    }

    /// One listener per client; a zero mask removes it.
    pub fn set_event_mask(&mut self, sink: &Arc<dyn EventSink>, mask: u32) {
        let client_id = sink.client_id();
        let existing = self.listeners.iter().position(|l| l.client_id() == client_id);
        match (existing, mask) {
            (Some(i), 0) => {
                self.listeners.remove(i);
            }
            (Some(i), mask) => self.listeners[i].mask = mask,
            (None, 0) => {}
            (None, mask) => self
                .listeners
                .push(ClientWindowCallback::new(Arc::clone(sink), mask)),
        }
    }

    pub fn remove_client(&mut self, client_id: u32) {
        self.listeners.retain(|l| l.client_id() != client_id);
        if self.creator.as_ref().is_some_and(|c| c.client_id() == client_id) {
            self.creator = None;
        }
    }

    pub(super) fn recompute_inner_bounds(&mut self) {
        let bw = self.border_width as i32;
        self.inner_bounds = Rect::new(
            bw,
            bw,
            (self.bounds.width - 2 * bw).max(0),
            (self.bounds.height - 2 * bw).max(0),
        );
    }

    /// Paint `area` (window coordinates) with the background. With no
    /// background the contents are left alone.
    pub fn clear_area(&mut self, area: Rect) {
        let area = area.intersect(&self.inner_bounds);
        if area.is_empty() {
            return;
        }
        if let Some(paint) = &self.background {
            fill_with(self.surface.as_mut(), area, paint);
        }
    }

    /// Repaint the border band and the whole background.
    pub fn paint_background(&mut self) {
        let full = Rect::new(0, 0, self.bounds.width, self.bounds.height);
        if self.border_width > 0 {
            if let Some(paint) = &self.border {
                fill_with(self.surface.as_mut(), full, paint);
            }
        }
        self.clear_area(full);
    }
}

fn fill_with(surface: &mut dyn Surface, area: Rect, paint: &Paint) {
    match paint {
        Paint::Pixel(pixel) => surface.clear(area, *pixel),
        Paint::Tile(tile) => {
            if tile.width == 0 || tile.height == 0 {
                return;
            }
            let mut patch = PixelBuffer::new(area.width as u32, area.height as u32);
            for y in 0..area.height {
                for x in 0..area.width {
                    let tx = (area.x + x).rem_euclid(tile.width as i32) as u32;
                    let ty = (area.y + y).rem_euclid(tile.height as i32) as u32;
                    patch.set(x as u32, y as u32, tile.get(tx, ty));
                }
            }
            surface.write_pixels(area.x, area.y, &patch, None);
        }
    }
}

impl std::fmt::Debug for XWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XWindow")
            .field("id", &format_args!("0x{:08x}", self.id))
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("bounds", &self.bounds)
            .field("visibility", &self.visibility)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemorySurface;
    use crate::protocol::ErrorCode;

    fn window(w: i32, h: i32) -> XWindow {
        XWindow::new(
            10,
            Rect::new(0, 0, w, h),
            WindowClass::InputOutput,
            Box::new(MemorySurface::new(w as u32, h as u32, 32).unwrap()),
        )
    }

    #[test]
    fn test_property_modes() {
        let mut prop = Property::new(Atom::STRING, 8);
        prop.change(PROP_MODE_REPLACE, Atom::STRING, 8, b"bc".to_vec()).unwrap();
        prop.change(PROP_MODE_APPEND, Atom::STRING, 8, b"d".to_vec()).unwrap();
        prop.change(PROP_MODE_PREPEND, Atom::STRING, 8, b"a".to_vec()).unwrap();
        assert_eq!(prop.data, b"abcd");

        let err = prop
            .change(PROP_MODE_APPEND, Atom::INTEGER, 8, vec![1])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Match);
        let err = prop.change(PROP_MODE_APPEND, Atom::STRING, 32, vec![0; 4]).unwrap_err();
        assert_eq!(err.code, ErrorCode::Match);

        // Replace may change the type
        prop.change(PROP_MODE_REPLACE, Atom::CARDINAL, 32, vec![1, 0, 0, 0]).unwrap();
        assert_eq!(prop.item_count(), 1);
        assert_eq!(prop.change(7, Atom::CARDINAL, 32, vec![]).unwrap_err().code, ErrorCode::Value);
    }

    #[test]
    fn test_inner_bounds_follow_border() {
        let mut w = window(20, 10);
        w.border_width = 2;
        w.recompute_inner_bounds();
        assert_eq!(w.inner_bounds, Rect::new(2, 2, 16, 6));
    }

    #[test]
    fn test_background_and_border_paint() {
        let mut w = window(6, 6);
        w.border_width = 1;
        w.recompute_inner_bounds();
        w.border = Some(Paint::Pixel(0xff00_0000));
        w.background = Some(Paint::Pixel(0xffff_ffff));
        w.paint_background();
        let px = w.surface.read_pixels(Rect::new(0, 0, 6, 6));
        assert_eq!(px.get(0, 0), 0xff00_0000);
        assert_eq!(px.get(3, 3), 0xffff_ffff);
        assert_eq!(px.get(5, 2), 0xff00_0000);
    }

    #[test]
    fn test_tiled_background() {
        let mut w = window(4, 2);
        let mut tile = PixelBuffer::new(2, 1);
        tile.set(0, 0, 1);
        tile.set(1, 0, 2);
        w.background = Some(Paint::Tile(tile));
        w.clear_area(Rect::new(0, 0, 4, 2));
        let px = w.surface.read_pixels(Rect::new(0, 0, 4, 2));
        assert_eq!(px.pixels, vec![1, 2, 1, 2, 1, 2, 1, 2]);
    }

    #[test]
    fn test_map_state() {
        let mut w = window(1, 1);
        assert_eq!(w.map_state(), MapState::Unmapped);
        w.visibility = FLAG_MAPPED;
        assert_eq!(w.map_state(), MapState::Unviewable);
        w.visibility = FLAG_MAPPED | FLAG_VISIBLE;
        assert_eq!(w.map_state(), MapState::Viewable);
    }
}
