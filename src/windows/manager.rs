//! The window tree
//!
//! All windows live in one arena behind one lock, so a request never holds
//! two window locks at once. Events raised while the tree is locked are
//! queued and handed to their connections once the lock is released.

use super::attributes::{BackgroundSetting, BorderSetting, WindowAttributes, WindowChanges};
use super::listener::{EventSink, TopLevelLogger};
use super::window::*;
use crate::backend::{Surface, SurfaceFactory};
use crate::protocol::{
    event_mask, Atom, Event, Gravity, HandlerError, HandlerResult, Rect, StackMode, WindowClass,
    X11Error, X11Result, DEFAULT_COLORMAP_ID, PROPERTY_DELETED, PROPERTY_NEW_VALUE, ROOT_DEPTH,
    ROOT_VISUAL_ID, ROOT_WINDOW_ID,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// GetProperty type that matches any stored type
pub const ANY_PROPERTY_TYPE: Atom = Atom(0);

/// Geometry and class of a window about to be created
#[derive(Debug, Clone, Copy)]
pub struct NewWindow {
    pub id: u32,
    pub parent: u32,
    pub bounds: Rect,
    pub border_width: u16,
    /// 0 copies the parent's class
    pub class: u16,
    /// 0 copies the parent's depth
    pub depth: u8,
    /// 0 copies the parent's visual
    pub visual: u32,
}

/// GetProperty result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyReply {
    pub format: u8,
    pub type_atom: Atom,
    pub bytes_after: u32,
    pub item_count: u32,
    pub data: Vec<u8>,
}

impl PropertyReply {
    fn none() -> Self {
        PropertyReply {
            format: 0,
            type_atom: Atom::NONE,
            bytes_after: 0,
            item_count: 0,
            data: Vec::new(),
        }
    }
}

pub struct WindowTree {
    windows: HashMap<u32, XWindow>,
    factory: Arc<dyn SurfaceFactory>,
    outbox: Vec<(Arc<dyn EventSink>, Event)>,
    epoch: Instant,
}

impl WindowTree {
    fn new(
        width: u16,
        height: u16,
        factory: Arc<dyn SurfaceFactory>,
        epoch: Instant,
    ) -> X11Result<Self> {
        let surface = factory.create_surface(width as u32, height as u32, ROOT_DEPTH)?;
        let mut root = XWindow::new(
            ROOT_WINDOW_ID,
            Rect::new(0, 0, width as i32, height as i32),
            WindowClass::InputOutput,
            surface,
        );
        root.visibility = FLAG_MAPPED | FLAG_VISIBLE;
        root.colormap = DEFAULT_COLORMAP_ID;
        root.background = Some(Paint::Pixel(0xff00_0000));
        root.border = Some(Paint::Pixel(0xff00_0000));
        root.observer = Some(Box::new(TopLevelLogger::default()));
        root.paint_background();

        let mut windows = HashMap::new();
        windows.insert(ROOT_WINDOW_ID, root);
        Ok(WindowTree {
            windows,
            factory,
            outbox: Vec::new(),
            epoch,
        })
    }

    /// Server time in milliseconds.
    pub fn timestamp(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    pub fn root(&self) -> u32 {
        ROOT_WINDOW_ID
    }

    pub fn contains(&self, id: u32) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&self, id: u32) -> X11Result<&XWindow> {
        self.windows.get(&id).ok_or_else(|| X11Error::bad_window(id))
    }

    pub fn get_mut(&mut self, id: u32) -> X11Result<&mut XWindow> {
        self.windows
            .get_mut(&id)
            .ok_or_else(|| X11Error::bad_window(id))
    }

    /// The window's drawing surface; holding it is holding the window locked.
    pub fn surface_mut(&mut self, id: u32) -> X11Result<&mut dyn Surface> {
        let window = self.get_mut(id)?;
        if window.class == WindowClass::InputOnly {
            return Err(X11Error::bad_match());
        }
        Ok(window.surface.as_mut())
    }

    fn take_outbox(&mut self) -> Vec<(Arc<dyn EventSink>, Event)> {
        std::mem::take(&mut self.outbox)
    }

    /// Queue `event` for every listener on `window` whose mask covers
    /// `required`.
    pub fn deliver(&mut self, window: u32, event: Event, required: u32) {
        let Some(w) = self.windows.get(&window) else {
            return;
        };
        for listener in w.listeners.iter().filter(|l| l.wants(required)) {
            log::debug!(
                "Event {} on 0x{:08x} -> client {}",
                event.code(),
                window,
                listener.client_id()
            );
            self.outbox.push((Arc::clone(&listener.sink), event.clone()));
        }
    }

    /// Queue an event for one specific connection.
    pub fn deliver_to(&mut self, sink: &Arc<dyn EventSink>, event: Event) {
        self.outbox.push((Arc::clone(sink), event));
    }

    // --- structure -------------------------------------------------------

    pub fn create_window(
        &mut self,
        params: NewWindow,
        attrs: &WindowAttributes,
        client: &Arc<dyn EventSink>,
    ) -> HandlerResult {
        let parent = self.get(params.parent)?;
        if self.windows.contains_key(&params.id) {
            return Err(X11Error::bad_id_choice(params.id).into());
        }
        if params.bounds.width <= 0 || params.bounds.height <= 0 {
            return Err(X11Error::bad_value(0).into());
        }

        let class = match WindowClass::from_u16(params.class) {
            Some(WindowClass::CopyFromParent) => parent.class,
            Some(class) => class,
            None => return Err(X11Error::bad_value(params.class as u32).into()),
        };
        if class == WindowClass::InputOutput && parent.class == WindowClass::InputOnly {
            return Err(X11Error::bad_match().into());
        }
        let depth = match (class, params.depth) {
            (WindowClass::InputOnly, 0) => 0,
            (WindowClass::InputOnly, _) => return Err(X11Error::bad_match().into()),
            (_, 0) => parent.depth,
            (_, ROOT_DEPTH) => ROOT_DEPTH,
            (_, _) => return Err(X11Error::bad_match().into()),
        };
        if class == WindowClass::InputOnly && params.border_width != 0 {
            return Err(X11Error::bad_match().into());
        }
        let visual = match params.visual {
            0 => parent.visual,
            ROOT_VISUAL_ID => ROOT_VISUAL_ID,
            _ => return Err(X11Error::bad_match().into()),
        };

        let surface = self.factory.create_surface(
            params.bounds.width as u32,
            params.bounds.height as u32,
            depth.max(1),
        )?;
        let mut window = XWindow::new(params.id, params.bounds, class, surface);
        window.depth = depth;
        window.visual = visual;
        window.border_width = params.border_width;
        window.recompute_inner_bounds();
        window.colormap = parent.colormap;
        window.creator = Some(Arc::clone(client));
        self.windows.insert(params.id, window);

        if let Err(err) = self.apply_attributes(params.id, attrs, client) {
            self.windows.remove(&params.id);
            return Err(err.into());
        }
        self.add_child(params.parent, params.id)?;
        if let Ok(w) = self.get_mut(params.id) {
            w.paint_background();
        }

        let w = self.get(params.id)?;
        let event = Event::CreateNotify {
            parent: params.parent,
            window: params.id,
            x: w.bounds.x as i16,
            y: w.bounds.y as i16,
            width: w.bounds.width as u16,
            height: w.bounds.height as u16,
            border_width: w.border_width,
            override_redirect: w.override_redirect,
        };
        self.deliver(params.parent, event, event_mask::SUBSTRUCTURE_NOTIFY);
        log::debug!("Created window 0x{:08x} under 0x{:08x}", params.id, params.parent);
        Ok(())
    }

    /// Apply a parsed attribute list; the event mask is recorded for `client`.
    pub fn apply_attributes(
        &mut self,
        id: u32,
        attrs: &WindowAttributes,
        client: &Arc<dyn EventSink>,
    ) -> X11Result<()> {
        let parent = self.get(id)?.parent;
        let parent_window = parent.and_then(|p| self.windows.get(&p));
        let parent_background = parent_window.and_then(|p| p.background.clone());
        let parent_border = parent_window.and_then(|p| p.border.clone());
        let parent_colormap = parent_window.map_or(DEFAULT_COLORMAP_ID, |p| p.colormap);

        if let Some(mask) = attrs.event_mask {
            self.check_redirect_selection(id, client.client_id(), mask)?;
        }

        let w = self.get_mut(id)?;
        if let Some(background) = &attrs.background {
            w.background = match background {
                BackgroundSetting::None => None,
                BackgroundSetting::ParentRelative => {
                    if parent.is_none() {
                        return Err(X11Error::bad_match());
                    }
                    parent_background
                }
                BackgroundSetting::Paint(paint) => Some(paint.clone()),
            };
        }
        if let Some(border) = &attrs.border {
            w.border = match border {
                BorderSetting::CopyFromParent => parent_border,
                BorderSetting::Paint(paint) => Some(paint.clone()),
            };
        }
        if let Some(v) = attrs.bit_gravity {
            w.bit_gravity = v;
        }
        if let Some(v) = attrs.win_gravity {
            w.win_gravity = v;
        }
        if let Some(v) = attrs.backing_store {
            w.backing_store = v;
        }
        if let Some(v) = attrs.backing_planes {
            w.backing_planes = v;
        }
        if let Some(v) = attrs.backing_pixel {
            w.backing_pixel = v;
        }
        if let Some(v) = attrs.override_redirect {
            w.override_redirect = v;
        }
        if let Some(v) = attrs.save_under {
            w.save_under = v;
        }
        if let Some(v) = attrs.do_not_propagate {
            w.do_not_propagate = v;
        }
        if let Some(v) = attrs.colormap {
            w.colormap = if v == 0 { parent_colormap } else { v };
        }
        if let Some(v) = attrs.cursor {
            w.cursor = v;
        }
        if let Some(mask) = attrs.event_mask {
            w.set_event_mask(client, mask);
        }
        Ok(())
    }

    /// Only one client at a time may select redirection on a window.
    fn check_redirect_selection(&self, id: u32, client_id: u32, mask: u32) -> X11Result<()> {
        let w = self.get(id)?;
        for exclusive in [
            event_mask::SUBSTRUCTURE_REDIRECT,
            event_mask::RESIZE_REDIRECT,
            event_mask::BUTTON_PRESS,
        ] {
            if mask & exclusive == 0 {
                continue;
            }
            let taken = w
                .listeners
                .iter()
                .any(|l| l.client_id() != client_id && l.mask & exclusive != 0);
            if taken {
                return Err(X11Error::bad_access());
            }
        }
        Ok(())
    }

    /// Link `child` as the last child of `parent`. A child that already has
    /// a parent is a server bug, not a client error.
    pub fn add_child(&mut self, parent: u32, child: u32) -> HandlerResult {
        let c = self.get_mut(child)?;
        if let Some(existing) = c.parent {
            return Err(HandlerError::fatal(format!(
                "window 0x{:08x} is already a child of 0x{:08x}",
                child, existing
            )));
        }
        c.parent = Some(parent);
        let p = self.get_mut(parent)?;
        p.children.push(child);
        if let Some(observer) = p.observer.as_mut() {
            observer.child_added(parent, child);
        }
        Ok(())
    }

    /// Unlink without telling anyone.
    fn unlink(&mut self, child: u32) -> Option<u32> {
        let parent = self.windows.get_mut(&child)?.parent.take()?;
        if let Some(p) = self.windows.get_mut(&parent) {
            p.children.retain(|&c| c != child);
        }
        Some(parent)
    }

    /// Unlink `child` and report its destruction to the parent's listeners.
    pub fn remove_child(&mut self, parent: u32, child: u32) {
        if self.unlink(child).is_none() {
            return;
        }
        if let Some(p) = self.windows.get_mut(&parent) {
            if let Some(observer) = p.observer.as_mut() {
                observer.child_removed(parent, child);
            }
        }
        self.deliver(
            parent,
            Event::DestroyNotify {
                event: parent,
                window: child,
            },
            event_mask::SUBSTRUCTURE_NOTIFY,
        );
    }

    /// Destroy `id` and everything below it. Returns every destroyed id,
    /// deepest first. The root cannot be destroyed.
    pub fn destroy(&mut self, id: u32) -> X11Result<Vec<u32>> {
        self.get(id)?;
        let mut destroyed = Vec::new();
        if id != ROOT_WINDOW_ID {
            self.destroy_recursive(id, &mut destroyed);
        }
        Ok(destroyed)
    }

    fn destroy_recursive(&mut self, id: u32, destroyed: &mut Vec<u32>) {
        self.set_mapped(id, false);
        let children = match self.windows.get(&id) {
            Some(w) => w.children.clone(),
            None => return,
        };
        for &child in children.iter().rev() {
            self.destroy_recursive(child, destroyed);
        }
        if let Some(parent) = self.windows.get(&id).and_then(|w| w.parent) {
            self.remove_child(parent, id);
        }
        self.deliver(
            id,
            Event::DestroyNotify {
                event: id,
                window: id,
            },
            event_mask::STRUCTURE_NOTIFY,
        );
        self.windows.remove(&id);
        destroyed.push(id);
        log::debug!("Destroyed window 0x{:08x}", id);
    }

    /// DestroySubwindows: every child, last to first.
    pub fn destroy_subwindows(&mut self, id: u32) -> X11Result<Vec<u32>> {
        let children = self.get(id)?.children.clone();
        let mut destroyed = Vec::new();
        for &child in children.iter().rev() {
            self.destroy_recursive(child, &mut destroyed);
        }
        Ok(destroyed)
    }

    pub fn reparent(&mut self, id: u32, new_parent: u32, x: i32, y: i32) -> HandlerResult {
        self.get(id)?;
        self.get(new_parent)?;
        if id == ROOT_WINDOW_ID || self.is_ancestor_or_self(id, new_parent) {
            return Err(X11Error::bad_match().into());
        }

        let mapped = self.get(id)?.is_mapped();
        if mapped {
            self.request_unmap(id)?;
        }
        let old_parent = self.unlink(id);
        {
            let w = self.get_mut(id)?;
            w.bounds.x = x;
            w.bounds.y = y;
        }
        self.add_child(new_parent, id)?;

        let override_redirect = self.get(id)?.override_redirect;
        let notify = |event: u32| Event::ReparentNotify {
            event,
            window: id,
            parent: new_parent,
            x: x as i16,
            y: y as i16,
            override_redirect,
        };
        self.deliver(id, notify(id), event_mask::STRUCTURE_NOTIFY);
        if let Some(old) = old_parent {
            self.deliver(old, notify(old), event_mask::SUBSTRUCTURE_NOTIFY);
        }
        if old_parent != Some(new_parent) {
            self.deliver(new_parent, notify(new_parent), event_mask::SUBSTRUCTURE_NOTIFY);
        }

        self.refresh_visibility(id);
        if mapped {
            self.request_map(id)?;
        }
        Ok(())
    }

    /// True when `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: u32, id: u32) -> bool {
        let mut current = Some(id);
        while let Some(w) = current {
            if w == ancestor {
                return true;
            }
            current = self.windows.get(&w).and_then(|w| w.parent);
        }
        false
    }

    // --- mapping ---------------------------------------------------------

    /// Change the bits selected by `mask` to `value`. Nothing happens, and
    /// nothing is reported, unless the flags actually change.
    pub fn set_visibility_flag(&mut self, id: u32, mask: u8, value: u8) {
        self.change_visibility(id, mask, value, false);
    }

    fn change_visibility(&mut self, id: u32, mask: u8, value: u8, from_configure: bool) {
        let (parent, bounds, override_redirect) = {
            let Some(w) = self.windows.get_mut(&id) else {
                return;
            };
            if w.visibility & mask == value {
                return;
            }
            w.visibility = (w.visibility & !mask) | value;
            (w.parent, w.bounds, w.override_redirect)
        };

        if mask & FLAG_MAPPED != 0 {
            let mapped = value & FLAG_MAPPED != 0;
            if let Some(parent) = parent {
                if let Some(p) = self.windows.get_mut(&parent) {
                    if let Some(observer) = p.observer.as_mut() {
                        observer.child_mapping_changed(parent, id, mapped);
                    }
                }
                self.deliver(
                    parent,
                    mapping_event(parent, id, mapped, override_redirect, from_configure),
                    event_mask::SUBSTRUCTURE_NOTIFY,
                );
            }
            self.deliver(
                id,
                mapping_event(id, id, mapped, override_redirect, from_configure),
                event_mask::STRUCTURE_NOTIFY,
            );
        }

        if mask & FLAG_VISIBLE != 0 && value & FLAG_VISIBLE != 0 {
            self.deliver(
                id,
                Event::Expose {
                    window: id,
                    x: 0,
                    y: 0,
                    width: bounds.width as u16,
                    height: bounds.height as u16,
                    count: 0,
                },
                event_mask::EXPOSURE,
            );
        }
    }

    fn set_mapped(&mut self, id: u32, mapped: bool) {
        self.set_visibility_flag(id, FLAG_MAPPED, if mapped { FLAG_MAPPED } else { 0 });
        self.refresh_visibility(id);
    }

    /// Unmap caused by a resize under Unmap gravity; UnmapNotify carries
    /// from-configure.
    fn unmap_for_configure(&mut self, id: u32) {
        self.change_visibility(id, FLAG_MAPPED, 0, true);
        self.refresh_visibility(id);
    }

    /// Recompute VISIBLE for `id` and its subtree: a window is visible when it
    /// is mapped and its parent is visible.
    pub fn refresh_visibility(&mut self, id: u32) {
        let Some(w) = self.windows.get(&id) else {
            return;
        };
        let viewable = w.is_mapped()
            && match w.parent {
                Some(p) => self.windows.get(&p).is_some_and(|p| p.is_visible()),
                None => true,
            };
        let children = w.children.clone();
        self.set_visibility_flag(id, FLAG_VISIBLE, if viewable { FLAG_VISIBLE } else { 0 });
        for child in children {
            self.refresh_visibility(child);
        }
    }

    pub fn request_map(&mut self, id: u32) -> X11Result<()> {
        self.get(id)?;
        self.set_mapped(id, true);
        Ok(())
    }

    pub fn request_unmap(&mut self, id: u32) -> X11Result<()> {
        self.get(id)?;
        if id != ROOT_WINDOW_ID {
            self.set_mapped(id, false);
        }
        Ok(())
    }

    /// MapSubwindows: map each direct child, top of the stack first.
    pub fn map_subwindows(&mut self, id: u32) -> X11Result<()> {
        for child in self.get(id)?.children.clone() {
            self.set_mapped(child, true);
        }
        Ok(())
    }

    /// UnmapSubwindows: unmap each direct child, bottom of the stack first.
    pub fn unmap_subwindows(&mut self, id: u32) -> X11Result<()> {
        for child in self.get(id)?.children.clone().into_iter().rev() {
            self.set_mapped(child, false);
        }
        Ok(())
    }

    // --- geometry and stacking -------------------------------------------

    /// Move `id` within its parent's child list. With a sibling, Above puts
    /// it at the sibling's index and Below right after the sibling; without
    /// one they move it to the front or the back of the list.
    pub fn stack_window(&mut self, id: u32, sibling: Option<u32>, mode: u32) -> X11Result<()> {
        let mode = match StackMode::from_u32(mode) {
            Some(m @ (StackMode::Above | StackMode::Below)) => m,
            Some(_) => {
                log::warn!("Unsupported stack mode {}", mode);
                return Err(X11Error::bad_window(mode));
            }
            None => return Err(X11Error::bad_value(mode)),
        };
        let Some(parent) = self.get(id)?.parent else {
            return Ok(());
        };
        if let Some(sibling) = sibling {
            self.get(sibling)?;
            if sibling == id || self.windows.get(&sibling).and_then(|s| s.parent) != Some(parent) {
                return Err(X11Error::bad_match());
            }
        }

        let p = self.get_mut(parent)?;
        p.children.retain(|&c| c != id);
        let index = match (sibling, mode) {
            (Some(s), StackMode::Above) => p.children.iter().position(|&c| c == s).unwrap_or(0),
            (Some(s), _) => p
                .children
                .iter()
                .position(|&c| c == s)
                .map_or(p.children.len(), |i| i + 1),
            (None, StackMode::Above) => 0,
            (None, _) => p.children.len(),
        };
        p.children.insert(index, id);
        if let Some(observer) = p.observer.as_mut() {
            observer.order_changed(parent);
        }
        Ok(())
    }

    /// Returns whether the bounds changed. A size change reallocates the
    /// surface and places the old contents by window gravity.
    pub fn set_bounds(&mut self, id: u32, bounds: Rect) -> Result<bool, HandlerError> {
        let factory = Arc::clone(&self.factory);
        let w = self.get_mut(id)?;
        if w.bounds == bounds {
            return Ok(false);
        }
        let old = w.bounds;
        let resized = old.width != bounds.width || old.height != bounds.height;
        let gravity = Gravity::from_u8(w.win_gravity).unwrap_or(Gravity::NorthWest);
        if resized && gravity == Gravity::Static {
            return Err(HandlerError::fatal("static window gravity is not supported"));
        }

        if !resized {
            w.bounds = bounds;
            w.recompute_inner_bounds();
            return Ok(true);
        }

        let surface = factory.create_surface(
            bounds.width.max(1) as u32,
            bounds.height.max(1) as u32,
            w.depth.max(1),
        )?;
        let contents = w.surface.read_pixels(Rect::new(0, 0, old.width, old.height));
        w.surface = surface;
        w.bounds = bounds;
        w.recompute_inner_bounds();
        w.paint_background();
        match gravity.offset(old.width, old.height, bounds.width, bounds.height) {
            Some((dx, dy)) => w.surface.write_pixels(dx, dy, &contents, None),
            None => self.unmap_for_configure(id),
        }
        Ok(true)
    }

    pub fn set_border_width(&mut self, id: u32, border_width: u16) -> X11Result<bool> {
        let w = self.get_mut(id)?;
        if w.border_width == border_width {
            return Ok(false);
        }
        w.border_width = border_width;
        w.recompute_inner_bounds();
        w.paint_background();
        Ok(true)
    }

    /// ConfigureWindow. Sends ConfigureNotify when anything changed.
    pub fn configure(&mut self, id: u32, changes: &WindowChanges) -> HandlerResult {
        let current = self.get(id)?.bounds;
        let bounds = Rect::new(
            changes.x.unwrap_or(current.x),
            changes.y.unwrap_or(current.y),
            changes.width.unwrap_or(current.width),
            changes.height.unwrap_or(current.height),
        );
        let mut changed = self.set_bounds(id, bounds)?;
        if let Some(bw) = changes.border_width {
            changed |= self.set_border_width(id, bw)?;
        }
        if let Some(mode) = changes.stack_mode {
            self.stack_window(id, changes.sibling, mode)?;
            changed = true;
        }
        if changed {
            self.notify_configure(id);
        }
        Ok(())
    }

    /// The sibling just under `id` in stacking order, or 0 when `id` is at
    /// the bottom. Child lists run top to bottom.
    pub fn sibling_below(&self, id: u32) -> u32 {
        let Some(parent) = self.windows.get(&id).and_then(|w| w.parent) else {
            return 0;
        };
        let Some(p) = self.windows.get(&parent) else {
            return 0;
        };
        p.children
            .iter()
            .position(|&c| c == id)
            .and_then(|i| p.children.get(i + 1))
            .copied()
            .unwrap_or(0)
    }

    fn notify_configure(&mut self, id: u32) {
        let Some(w) = self.windows.get(&id) else {
            return;
        };
        let (parent, bounds, bw, or) = (w.parent, w.bounds, w.border_width, w.override_redirect);
        let above_sibling = self.sibling_below(id);
        let notify = |event: u32| Event::ConfigureNotify {
            event,
            window: id,
            above_sibling,
            x: bounds.x as i16,
            y: bounds.y as i16,
            width: bounds.width as u16,
            height: bounds.height as u16,
            border_width: bw,
            override_redirect: or,
        };
        self.deliver(id, notify(id), event_mask::STRUCTURE_NOTIFY);
        if let Some(parent) = parent {
            self.deliver(parent, notify(parent), event_mask::SUBSTRUCTURE_NOTIFY);
        }
    }

    /// ClearArea. A zero width or height extends to the window edge.
    pub fn clear_area(&mut self, id: u32, area: Rect, exposures: bool) -> X11Result<()> {
        let w = self.get_mut(id)?;
        if w.class == WindowClass::InputOnly {
            return Err(X11Error::bad_match());
        }
        let width = if area.width == 0 { w.width() - area.x } else { area.width };
        let height = if area.height == 0 { w.height() - area.y } else { area.height };
        let area = Rect::new(area.x, area.y, width, height)
            .intersect(&Rect::new(0, 0, w.width(), w.height()));
        w.clear_area(area);
        if exposures && !area.is_empty() && w.is_visible() {
            self.deliver(
                id,
                Event::Expose {
                    window: id,
                    x: area.x as u16,
                    y: area.y as u16,
                    width: area.width as u16,
                    height: area.height as u16,
                    count: 0,
                },
                event_mask::EXPOSURE,
            );
        }
        Ok(())
    }

    /// Origin of `id` in root coordinates.
    pub fn absolute_origin(&self, id: u32) -> X11Result<(i32, i32)> {
        let mut w = self.get(id)?;
        let (mut x, mut y) = (0, 0);
        loop {
            x += w.bounds.x;
            y += w.bounds.y;
            match w.parent.and_then(|p| self.windows.get(&p)) {
                Some(parent) => w = parent,
                None => return Ok((x, y)),
            }
        }
    }

    /// TranslateCoordinates: the point in `dst` coordinates plus the mapped
    /// child of `dst` containing it (0 if none).
    pub fn translate_coordinates(
        &self,
        src: u32,
        dst: u32,
        x: i32,
        y: i32,
    ) -> X11Result<(i32, i32, u32)> {
        let (sx, sy) = self.absolute_origin(src)?;
        let (dx, dy) = self.absolute_origin(dst)?;
        let (tx, ty) = (sx + x - dx, sy + y - dy);
        Ok((tx, ty, self.child_at(dst, tx, ty)?))
    }

    /// Topmost mapped child of `id` containing (x, y) in `id` coordinates.
    pub fn child_at(&self, id: u32, x: i32, y: i32) -> X11Result<u32> {
        let w = self.get(id)?;
        Ok(w.children
            .iter()
            .filter_map(|c| self.windows.get(c))
            .find(|c| {
                let bw = c.border_width as i32;
                c.is_mapped()
                    && Rect::new(
                        c.bounds.x,
                        c.bounds.y,
                        c.bounds.width + 2 * bw,
                        c.bounds.height + 2 * bw,
                    )
                    .contains(x, y)
            })
            .map_or(0, |c| c.id))
    }

    // --- properties --------------------------------------------------------

    pub fn change_property(
        &mut self,
        id: u32,
        atom: Atom,
        type_atom: Atom,
        format: u8,
        mode: u8,
        data: Vec<u8>,
    ) -> X11Result<()> {
        if !matches!(format, 8 | 16 | 32) {
            return Err(X11Error::bad_value(format as u32));
        }
        if mode > PROP_MODE_APPEND {
            return Err(X11Error::bad_value(mode as u32));
        }
        let time = self.timestamp();
        let w = self.get_mut(id)?;
        w.properties
            .entry(atom)
            .or_insert_with(|| Property::new(type_atom, format))
            .change(mode, type_atom, format, data)?;
        self.deliver(
            id,
            Event::PropertyNotify {
                window: id,
                atom,
                time,
                state: PROPERTY_NEW_VALUE,
            },
            event_mask::PROPERTY_CHANGE,
        );
        Ok(())
    }

    pub fn delete_property(&mut self, id: u32, atom: Atom) -> X11Result<()> {
        let time = self.timestamp();
        if self.get_mut(id)?.properties.remove(&atom).is_some() {
            self.deliver(
                id,
                Event::PropertyNotify {
                    window: id,
                    atom,
                    time,
                    state: PROPERTY_DELETED,
                },
                event_mask::PROPERTY_CHANGE,
            );
        }
        Ok(())
    }

    /// GetProperty. `offset` and `length` count 4-byte units. With `delete`
    /// the property goes away once everything has been read.
    pub fn get_property(
        &mut self,
        id: u32,
        atom: Atom,
        type_filter: Atom,
        offset: u32,
        length: u32,
        delete: bool,
    ) -> X11Result<PropertyReply> {
        let w = self.get(id)?;
        let Some(prop) = w.properties.get(&atom) else {
            return Ok(PropertyReply::none());
        };
        if type_filter != ANY_PROPERTY_TYPE && type_filter != prop.type_atom {
            return Ok(PropertyReply {
                format: prop.format,
                type_atom: prop.type_atom,
                bytes_after: prop.data.len() as u32,
                item_count: 0,
                data: Vec::new(),
            });
        }

        let total = prop.data.len();
        let start = (offset as usize).saturating_mul(4);
        if start > total {
            return Err(X11Error::bad_value(offset));
        }
        let take = (total - start).min((length as usize).saturating_mul(4));
        let data = prop.data[start..start + take].to_vec();
        let bytes_after = (total - start - take) as u32;
        let unit = (prop.format / 8).max(1) as usize;
        let reply = PropertyReply {
            format: prop.format,
            type_atom: prop.type_atom,
            bytes_after,
            item_count: (data.len() / unit) as u32,
            data,
        };

        if delete && bytes_after == 0 {
            self.delete_property(id, atom)?;
        }
        Ok(reply)
    }

    pub fn list_properties(&self, id: u32) -> X11Result<Vec<Atom>> {
        Ok(self.get(id)?.properties.keys().copied().collect())
    }

    // --- clients -----------------------------------------------------------

    /// Drop every listener `client_id` registered.
    pub fn remove_client(&mut self, client_id: u32) {
        for w in self.windows.values_mut() {
            w.remove_client(client_id);
        }
    }

    /// SendEvent: deliver to clients selecting any bit of `mask` on
    /// `window`, walking up to ancestors when `propagate` is set and nobody
    /// is interested. An empty mask targets the window's creator. Returns
    /// whether anyone got it.
    pub fn send_event(
        &mut self,
        window: u32,
        event: Event,
        mask: u32,
        propagate: bool,
    ) -> X11Result<bool> {
        if mask == 0 {
            return Ok(match self.get(window)?.creator.clone() {
                Some(creator) => {
                    self.outbox.push((creator, event));
                    true
                }
                None => false,
            });
        }

        let mut target = Some(window);
        while let Some(id) = target {
            let w = self.get(id)?;
            let sinks: Vec<Arc<dyn EventSink>> = w
                .listeners
                .iter()
                .filter(|l| l.mask & mask != 0)
                .map(|l| Arc::clone(&l.sink))
                .collect();
            let blocked = !propagate || w.do_not_propagate & mask != 0;
            let parent = w.parent;
            if !sinks.is_empty() {
                for sink in sinks {
                    self.outbox.push((sink, event.clone()));
                }
                return Ok(true);
            }
            if blocked {
                break;
            }
            target = parent;
        }
        Ok(false)
    }

    /// Parent/child links agree in both directions and every window but the
    /// root has a parent.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (&id, w) in &self.windows {
            match w.parent {
                None if id != ROOT_WINDOW_ID => return Err(format!("0x{:08x} is orphaned", id)),
                None => {}
                Some(p) => {
                    let parent = self
                        .windows
                        .get(&p)
                        .ok_or_else(|| format!("0x{:08x} has a missing parent", id))?;
                    if parent.children.iter().filter(|&&c| c == id).count() != 1 {
                        return Err(format!("0x{:08x} not listed once under its parent", id));
                    }
                }
            }
            for c in &w.children {
                if self.windows.get(c).and_then(|c| c.parent) != Some(id) {
                    return Err(format!("child 0x{:08x} does not point back to 0x{:08x}", c, id));
                }
            }
        }
        Ok(())
    }
}

fn mapping_event(
    event: u32,
    window: u32,
    mapped: bool,
    override_redirect: bool,
    from_configure: bool,
) -> Event {
    if mapped {
        Event::MapNotify {
            event,
            window,
            override_redirect,
        }
    } else {
        Event::UnmapNotify {
            event,
            window,
            from_configure,
        }
    }
}

/// Owner of the window tree lock
pub struct WindowManager {
    tree: Mutex<WindowTree>,
    epoch: Instant,
}

impl WindowManager {
    /// Fails when the root window's surface cannot be allocated.
    pub fn new(width: u16, height: u16, factory: Arc<dyn SurfaceFactory>) -> X11Result<Self> {
        let epoch = Instant::now();
        Ok(WindowManager {
            tree: Mutex::new(WindowTree::new(width, height, factory, epoch)?),
            epoch,
        })
    }

    /// Run `f` with the tree locked, then hand queued events to their
    /// connections.
    pub fn with_tree<R>(&self, f: impl FnOnce(&mut WindowTree) -> R) -> R {
        let (result, outbox) = {
            let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut tree);
            (result, tree.take_outbox())
        };
        for (sink, event) in outbox {
            sink.send_event(&event);
        }
        result
    }

    pub fn timestamp(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}
