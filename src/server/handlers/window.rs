//! Window, property and event requests

use crate::protocol::{
    event_mask, Event, HandlerResult, Packet, Rect, RequestOpcode, X11Error, X11Result, Atom,
    ROOT_WINDOW_ID, SEND_EVENT_FLAG,
};
use crate::resources::selections::FOCUS_POINTER_ROOT;
use crate::resources::ResourceKind;
use crate::server::dispatcher::{RequestContext, RequestHandler};
use crate::windows::{NewWindow, WindowAttributes, WindowChanges};

pub struct WindowRequests;

impl RequestHandler for WindowRequests {
    fn opcodes(&self) -> &[u8] {
        &[1, 2, 3, 4, 5, 7, 8, 9, 10, 11, 12, 14, 15, 18, 19, 20, 21, 25, 38, 40, 61]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        let Some(op) = RequestOpcode::from_u8(packet.major_opcode()) else {
            return Err(X11Error::bad_request().into());
        };
        match op {
            RequestOpcode::CreateWindow => handle_create_window(ctx, packet),
            RequestOpcode::ChangeWindowAttributes => handle_change_window_attributes(ctx, packet),
            RequestOpcode::GetWindowAttributes => handle_get_window_attributes(ctx, packet),
            RequestOpcode::DestroyWindow => {
                let id = packet.read_card32()?;
                ctx.server.destroy_window(id)?;
                Ok(())
            }
            RequestOpcode::DestroySubwindows => {
                let id = packet.read_card32()?;
                ctx.server.destroy_subwindows(id)?;
                Ok(())
            }
            RequestOpcode::ReparentWindow => handle_reparent_window(ctx, packet),
            RequestOpcode::MapWindow => {
                let id = packet.read_card32()?;
                ctx.server.windows.with_tree(|t| t.request_map(id))?;
                Ok(())
            }
            RequestOpcode::MapSubwindows => {
                let id = packet.read_card32()?;
                ctx.server.windows.with_tree(|t| t.map_subwindows(id))?;
                Ok(())
            }
            RequestOpcode::UnmapWindow => {
                let id = packet.read_card32()?;
                ctx.server.windows.with_tree(|t| t.request_unmap(id))?;
                Ok(())
            }
            RequestOpcode::UnmapSubwindows => {
                let id = packet.read_card32()?;
                ctx.server.windows.with_tree(|t| t.unmap_subwindows(id))?;
                Ok(())
            }
            RequestOpcode::ConfigureWindow => handle_configure_window(ctx, packet),
            RequestOpcode::GetGeometry => handle_get_geometry(ctx, packet),
            RequestOpcode::QueryTree => handle_query_tree(ctx, packet),
            RequestOpcode::ChangeProperty => handle_change_property(ctx, packet),
            RequestOpcode::DeleteProperty => handle_delete_property(ctx, packet),
            RequestOpcode::GetProperty => handle_get_property(ctx, packet),
            RequestOpcode::ListProperties => handle_list_properties(ctx, packet),
            RequestOpcode::SendEvent => handle_send_event(ctx, packet),
            RequestOpcode::QueryPointer => handle_query_pointer(ctx, packet),
            RequestOpcode::TranslateCoordinates => handle_translate_coordinates(ctx, packet),
            RequestOpcode::ClearArea => handle_clear_area(ctx, packet),
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn handle_create_window(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let server = ctx.server;
    let depth = packet.minor_opcode();
    let id = packet.read_card32()?;
    let parent = packet.read_card32()?;
    let x = packet.read_int16()? as i32;
    let y = packet.read_int16()? as i32;
    let width = packet.read_card16()? as i32;
    let height = packet.read_card16()? as i32;
    let border_width = packet.read_card16()?;
    let class = packet.read_card16()?;
    let visual = packet.read_card32()?;
    let mask = packet.read_card32()?;
    // Background pixmaps are read before the tree is locked
    let attrs = WindowAttributes::read(mask, packet, |p| server.pixmap_pixels(p))?;

    let params = NewWindow {
        id,
        parent,
        bounds: Rect::new(x, y, width, height),
        border_width,
        class,
        depth,
        visual,
    };
    let sink = ctx.sink();
    server.windows.with_tree(|t| t.create_window(params, &attrs, &sink))?;
    server.track(ctx.client_id(), ResourceKind::Window, id);
    Ok(())
}

fn handle_change_window_attributes(
    ctx: &mut RequestContext<'_>,
    packet: &mut Packet,
) -> HandlerResult {
    let server = ctx.server;
    let id = packet.read_card32()?;
    let mask = packet.read_card32()?;
    let attrs = WindowAttributes::read(mask, packet, |p| server.pixmap_pixels(p))?;
    if let Some(colormap) = attrs.colormap.filter(|&c| c != 0) {
        if !server.colormaps.contains(colormap) {
            return Err(X11Error::bad_colormap(colormap).into());
        }
    }
    let sink = ctx.sink();
    server.windows.with_tree(|t| t.apply_attributes(id, &attrs, &sink))?;
    Ok(())
}

fn handle_get_window_attributes(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let id = packet.read_card32()?;
    let client_id = ctx.client_id();
    let reply = &mut ctx.reply;
    ctx.server.windows.with_tree(|t| -> X11Result<()> {
        let w = t.get(id)?;
        reply.set_detail(w.backing_store);
        reply.write_card32(w.visual);
        reply.write_card16(w.class as u16);
        reply.write_byte(w.bit_gravity);
        reply.write_byte(w.win_gravity);
        reply.write_card32(w.backing_planes);
        reply.write_card32(w.backing_pixel);
        reply.write_bool(w.save_under);
        reply.write_bool(true); // map-is-installed
        reply.write_byte(w.map_state() as u8);
        reply.write_bool(w.override_redirect);
        reply.write_card32(w.colormap);
        reply.write_card32(w.all_event_masks());
        reply.write_card32(w.event_mask_of(client_id));
        reply.write_card16(w.do_not_propagate as u16);
        reply.write_padding(2);
        Ok(())
    })?;
    Ok(())
}

fn handle_reparent_window(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let id = packet.read_card32()?;
    let parent = packet.read_card32()?;
    let x = packet.read_int16()? as i32;
    let y = packet.read_int16()? as i32;
    ctx.server.windows.with_tree(|t| t.reparent(id, parent, x, y))
}

fn handle_configure_window(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let id = packet.read_card32()?;
    let mask = packet.read_card16()?;
    packet.read_padding(2)?;
    let changes = WindowChanges::read(mask, packet)?;
    ctx.server.windows.with_tree(|t| t.configure(id, &changes))
}

fn handle_get_geometry(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let id = packet.read_card32()?;
    let geometry = ctx.server.windows.with_tree(|t| {
        t.get(id)
            .ok()
            .map(|w| (w.depth, w.bounds, w.border_width))
    });
    let (depth, bounds, border_width) = match geometry {
        Some(g) => g,
        None => ctx
            .server
            .pixmaps
            .with(id, |p| {
                (p.depth, Rect::new(0, 0, p.width as i32, p.height as i32), 0)
            })
            .map_err(|_| X11Error::bad_drawable(id))?,
    };

    let reply = &mut ctx.reply;
    reply.set_detail(depth);
    reply.write_card32(ROOT_WINDOW_ID);
    reply.write_int16(bounds.x as i16);
    reply.write_int16(bounds.y as i16);
    reply.write_card16(bounds.width as u16);
    reply.write_card16(bounds.height as u16);
    reply.write_card16(border_width);
    reply.write_padding(10);
    Ok(())
}

/// Children are listed bottom to top.
fn handle_query_tree(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let id = packet.read_card32()?;
    let (parent, children) = ctx.server.windows.with_tree(|t| {
        t.get(id).map(|w| (w.parent.unwrap_or(0), w.children.clone()))
    })?;

    let reply = &mut ctx.reply;
    reply.write_card32(ROOT_WINDOW_ID);
    reply.write_card32(parent);
    reply.write_card16(children.len() as u16);
    reply.write_padding(14);
    for child in children.iter().rev() {
        reply.write_card32(*child);
    }
    Ok(())
}

fn handle_change_property(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let mode = packet.minor_opcode();
    let window = packet.read_card32()?;
    let property = ctx.server.atoms.validate(Atom(packet.read_card32()?))?;
    let type_atom = ctx.server.atoms.validate(Atom(packet.read_card32()?))?;
    let format = packet.read_byte()?;
    packet.read_padding(3)?;
    let count = packet.read_card32()? as usize;
    if !matches!(format, 8 | 16 | 32) {
        return Err(X11Error::bad_value(format as u32).into());
    }
    let bytes = count
        .checked_mul(format as usize / 8)
        .filter(|&n| n <= packet.remaining())
        .ok_or_else(X11Error::bad_length)?;
    let data = packet.read_padded_bytes(bytes)?;

    ctx.server
        .windows
        .with_tree(|t| t.change_property(window, property, type_atom, format, mode, data))?;
    Ok(())
}

fn handle_delete_property(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let window = packet.read_card32()?;
    let property = ctx.server.atoms.validate(Atom(packet.read_card32()?))?;
    ctx.server.windows.with_tree(|t| t.delete_property(window, property))?;
    Ok(())
}

fn handle_get_property(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let delete = packet.minor_opcode() != 0;
    let window = packet.read_card32()?;
    let property = ctx.server.atoms.validate(Atom(packet.read_card32()?))?;
    let type_filter = Atom(packet.read_card32()?);
    if type_filter != Atom::NONE {
        ctx.server.atoms.validate(type_filter)?;
    }
    let offset = packet.read_card32()?;
    let length = packet.read_card32()?;

    let prop = ctx.server.windows.with_tree(|t| {
        t.get_property(window, property, type_filter, offset, length, delete)
    })?;

    let reply = &mut ctx.reply;
    reply.set_detail(prop.format);
    reply.write_card32(prop.type_atom.get());
    reply.write_card32(prop.bytes_after);
    reply.write_card32(prop.item_count);
    reply.write_padding(12);
    reply.write_padded_bytes(&prop.data);
    Ok(())
}

fn handle_list_properties(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let window = packet.read_card32()?;
    let atoms = ctx.server.windows.with_tree(|t| t.list_properties(window))?;
    let reply = &mut ctx.reply;
    reply.write_card16(atoms.len() as u16);
    reply.write_padding(22);
    for atom in atoms {
        reply.write_card32(atom.get());
    }
    Ok(())
}

/// SendEvent destinations that are not window ids
const DESTINATION_POINTER_WINDOW: u32 = 0;
const DESTINATION_INPUT_FOCUS: u32 = 1;

/// Highest core event code
const LAST_CORE_EVENT: u8 = 34;
const FIRST_EXTENSION_EVENT: u8 = 64;

fn handle_send_event(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let propagate = packet.minor_opcode() != 0;
    let destination = packet.read_card32()?;
    let mask = packet.read_card32()?;
    let code = packet.read_byte()?;
    let detail = packet.read_byte()?;
    packet.read_padding(2)?;
    let mut body = [0u8; 28];
    body.copy_from_slice(&packet.read_bytes(28)?);

    let code = code & !SEND_EVENT_FLAG;
    if code < 2 || (code > LAST_CORE_EVENT && code < FIRST_EXTENSION_EVENT) {
        return Err(X11Error::bad_value(code as u32).into());
    }
    if mask & !event_mask::ALL != 0 {
        return Err(X11Error::bad_value(mask).into());
    }

    let window = match destination {
        // No pointer tracking: the pointer is always over the root
        DESTINATION_POINTER_WINDOW => ROOT_WINDOW_ID,
        DESTINATION_INPUT_FOCUS => match ctx.server.focus.get().window {
            0 | FOCUS_POINTER_ROOT => ROOT_WINDOW_ID,
            focus => focus,
        },
        window => window,
    };

    let event = Event::Raw {
        code: code | SEND_EVENT_FLAG,
        detail,
        body,
    };
    let delivered = ctx
        .server
        .windows
        .with_tree(|t| t.send_event(window, event, mask, propagate))?;
    log::debug!(
        "SendEvent code {} to 0x{:08x}: {}",
        code,
        window,
        if delivered { "delivered" } else { "no listener" }
    );
    Ok(())
}

fn handle_query_pointer(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let window = packet.read_card32()?;
    // The pointer rests at the root origin
    let (win_x, win_y, child) = ctx
        .server
        .windows
        .with_tree(|t| t.translate_coordinates(ROOT_WINDOW_ID, window, 0, 0))?;

    let reply = &mut ctx.reply;
    reply.set_detail(1); // same-screen
    reply.write_card32(ROOT_WINDOW_ID);
    reply.write_card32(child);
    reply.write_int16(0);
    reply.write_int16(0);
    reply.write_int16(win_x as i16);
    reply.write_int16(win_y as i16);
    reply.write_card16(0); // key/button mask
    reply.write_padding(2);
    Ok(())
}

fn handle_translate_coordinates(
    ctx: &mut RequestContext<'_>,
    packet: &mut Packet,
) -> HandlerResult {
    let src = packet.read_card32()?;
    let dst = packet.read_card32()?;
    let x = packet.read_int16()? as i32;
    let y = packet.read_int16()? as i32;
    let (dst_x, dst_y, child) = ctx
        .server
        .windows
        .with_tree(|t| t.translate_coordinates(src, dst, x, y))?;

    let reply = &mut ctx.reply;
    reply.set_detail(1); // same-screen
    reply.write_card32(child);
    reply.write_int16(dst_x as i16);
    reply.write_int16(dst_y as i16);
    reply.write_padding(16);
    Ok(())
}

fn handle_clear_area(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let exposures = packet.minor_opcode() != 0;
    let window = packet.read_card32()?;
    let x = packet.read_int16()? as i32;
    let y = packet.read_int16()? as i32;
    let width = packet.read_card16()? as i32;
    let height = packet.read_card16()? as i32;
    ctx.server
        .windows
        .with_tree(|t| t.clear_area(window, Rect::new(x, y, width, height), exposures))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;
    use crate::server::handlers::harness::{card16_at, card32_at, error_code, Body, Session};

    const W: u32 = 0x01f0_0001;

    fn get_property(s: &Session, window: u32, atom: u32, delete: bool) -> Vec<u8> {
        let body = Body::new()
            .card32(window)
            .card32(atom)
            .card32(0)
            .card32(0)
            .card32(100);
        s.request(20, delete as u8, body)
    }

    #[test]
    fn test_property_round_trip_with_delete() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);

        let body = Body::new()
            .card32(W)
            .card32(Atom::WM_NAME.get())
            .card32(Atom::STRING.get())
            .card8(8)
            .card8(0)
            .card16(0)
            .card32(3)
            .padded(&[1, 2, 3]);
        assert!(s.request(18, 0, body).is_empty());

        for delete in [false, true] {
            let reply = get_property(&s, W, Atom::WM_NAME.get(), delete);
            assert_eq!(reply[0], 1);
            assert_eq!(reply[1], 8);
            assert_eq!(card32_at(&reply, 8), Atom::STRING.get());
            assert_eq!(card32_at(&reply, 12), 0);
            assert_eq!(card32_at(&reply, 16), 3);
            assert_eq!(&reply[32..35], &[1, 2, 3]);
        }

        let reply = get_property(&s, W, Atom::WM_NAME.get(), false);
        assert_eq!(reply.len(), 32);
        assert_eq!(reply[1], 0);
        assert_eq!(card32_at(&reply, 8), 0);
    }

    #[test]
    fn test_property_errors() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);

        // Unknown property atom
        let reply = get_property(&s, W, 0x7fff, false);
        assert_eq!(error_code(&reply), Some(ErrorCode::Atom as u8));

        // Unknown window
        let reply = get_property(&s, 0x0bad, Atom::WM_NAME.get(), false);
        assert_eq!(error_code(&reply), Some(ErrorCode::Window as u8));
        assert_eq!(card32_at(&reply, 4), 0x0bad);

        // Format 7
        let body = Body::new()
            .card32(W)
            .card32(Atom::WM_NAME.get())
            .card32(Atom::STRING.get())
            .card8(7)
            .card8(0)
            .card16(0)
            .card32(0);
        assert_eq!(error_code(&s.request(18, 0, body)), Some(ErrorCode::Value as u8));

        // Declared length longer than the request
        let body = Body::new()
            .card32(W)
            .card32(Atom::WM_NAME.get())
            .card32(Atom::STRING.get())
            .card8(32)
            .card8(0)
            .card16(0)
            .card32(10)
            .card32(1);
        assert_eq!(error_code(&s.request(18, 0, body)), Some(ErrorCode::Length as u8));
    }

    #[test]
    fn test_query_tree_bottom_to_top() {
        let s = Session::new();
        for (i, id) in [0x10u32, 0x11, 0x12].iter().enumerate() {
            s.create_window(*id, ROOT_WINDOW_ID, i as i16, 0, 5, 5);
        }
        // Put 0x12 directly above 0x10
        let body = Body::new()
            .card32(0x12)
            .card16(0x60)
            .card16(0)
            .card32(0x10)
            .card32(0);
        assert!(s.request(12, 0, body).is_empty());

        let reply = s.request(15, 0, Body::new().card32(ROOT_WINDOW_ID));
        assert_eq!(card32_at(&reply, 8), ROOT_WINDOW_ID);
        assert_eq!(card32_at(&reply, 12), 0);
        assert_eq!(card16_at(&reply, 16), 3);
        let children: Vec<u32> = (0..3).map(|i| card32_at(&reply, 32 + i * 4)).collect();
        assert_eq!(children, vec![0x11, 0x10, 0x12]);
    }

    #[test]
    fn test_geometry_of_window_and_pixmap() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 5, -3, 40, 30);
        let reply = s.request(14, 0, Body::new().card32(W));
        assert_eq!(reply[1], 32);
        assert_eq!(card16_at(&reply, 12), 5);
        assert_eq!(card16_at(&reply, 14) as i16, -3);
        assert_eq!(card16_at(&reply, 16), 40);
        assert_eq!(card16_at(&reply, 18), 30);

        // CreatePixmap depth 24 on the window
        let body = Body::new().card32(0x500).card32(W).card16(7).card16(9);
        assert!(s.request(53, 24, body).is_empty());
        let reply = s.request(14, 0, Body::new().card32(0x500));
        assert_eq!(reply[1], 24);
        assert_eq!((card16_at(&reply, 16), card16_at(&reply, 18)), (7, 9));

        let reply = s.request(14, 0, Body::new().card32(0x501));
        assert_eq!(error_code(&reply), Some(ErrorCode::Drawable as u8));
    }

    #[test]
    fn test_map_state_and_expose() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);
        // SelectInput(Exposure | StructureNotify)
        let mask = event_mask::EXPOSURE | event_mask::STRUCTURE_NOTIFY;
        let body = Body::new().card32(W).card32(1 << 11).card32(mask);
        assert!(s.request(2, 0, body).is_empty());

        let events = s.request(8, 0, Body::new().card32(W));
        let codes: Vec<u8> = events.chunks(32).map(|e| e[0]).collect();
        assert_eq!(codes, vec![19, 12]); // MapNotify then Expose

        // Mapping again changes nothing
        assert!(s.request(8, 0, Body::new().card32(W)).is_empty());

        let reply = s.request(3, 0, Body::new().card32(W));
        assert_eq!(reply[26], 2); // Viewable
        assert_eq!(card32_at(&reply, 36), mask);
    }

    #[test]
    fn test_send_event_sets_flag() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);
        let body = Body::new()
            .card32(W)
            .card32(1 << 11)
            .card32(event_mask::PROPERTY_CHANGE);
        s.request(2, 0, body);

        let mut event = Body::new().card8(33).card8(32).card16(0).card32(W);
        event.0.resize(32, 0);
        let mut body = Body::new().card32(W).card32(event_mask::PROPERTY_CHANGE);
        body.0.extend_from_slice(&event.0);
        let out = s.request(25, 0, body);
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 33 | SEND_EVENT_FLAG);
        assert_eq!(out[1], 32);
        assert_eq!(card32_at(&out, 4), W);
    }

    #[test]
    fn test_translate_coordinates() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 10, 20, 50, 50);
        s.request(8, 0, Body::new().card32(W));
        let body = Body::new().card32(ROOT_WINDOW_ID).card32(W).int16(15).int16(25);
        let reply = s.request(40, 0, body);
        assert_eq!(reply[1], 1);
        assert_eq!(card32_at(&reply, 8), 0);
        assert_eq!(card16_at(&reply, 12), 5);
        assert_eq!(card16_at(&reply, 14), 5);
    }

    #[test]
    fn test_huge_window_is_alloc_error() {
        let s = Session::new();
        let body = Body::new()
            .card32(W)
            .card32(ROOT_WINDOW_ID)
            .int16(0)
            .int16(0)
            .card16(65535)
            .card16(65535)
            .card16(0)
            .card16(1)
            .card32(0)
            .card32(0);
        assert_eq!(error_code(&s.request(1, 0, body)), Some(ErrorCode::Alloc as u8));
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);
    }

    #[test]
    fn test_configure_zero_size_is_value_error() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);
        for mask in [4u16, 8] {
            let body = Body::new().card32(W).card16(mask).card16(0).card32(0);
            assert_eq!(error_code(&s.request(12, 0, body)), Some(ErrorCode::Value as u8));
        }
        let reply = s.request(14, 0, Body::new().card32(W));
        assert_eq!((card16_at(&reply, 16), card16_at(&reply, 18)), (10, 10));
    }

    #[test]
    fn test_destroy_frees_tracked_window() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);
        assert!(s.request(4, 0, Body::new().card32(W)).is_empty());
        let reply = s.request(3, 0, Body::new().card32(W));
        assert_eq!(error_code(&reply), Some(ErrorCode::Window as u8));
        // The id is free again
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 10, 10);
    }
}
