//! Colormap requests
//!
//! Every colormap is TrueColor, so allocating is only a conversion between
//! RGB and pixel values and freeing cells does nothing.

use crate::protocol::{
    HandlerResult, Packet, RequestOpcode, X11Error, X11Result, DEFAULT_COLORMAP_ID,
    ROOT_VISUAL_ID,
};
use crate::resources::{lookup_color, Colormap, ResourceKind, Rgb16};
use crate::server::dispatcher::{RequestContext, RequestHandler};
use crate::server::Server;

/// CreateColormap alloc: None, All
const ALLOC_ALL: u8 = 1;

pub struct ColormapRequests;

impl RequestHandler for ColormapRequests {
    fn opcodes(&self) -> &[u8] {
        &[78, 79, 84, 85, 88, 91, 92]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::CreateColormap) => handle_create_colormap(ctx, packet),
            Some(RequestOpcode::FreeColormap) => {
                let cmap = packet.read_card32()?;
                if cmap == DEFAULT_COLORMAP_ID {
                    return Ok(());
                }
                ctx.server
                    .colormaps
                    .remove(cmap)
                    .ok_or_else(|| X11Error::bad_colormap(cmap))?;
                ctx.server.untrack(ResourceKind::Colormap, cmap);
                Ok(())
            }
            Some(RequestOpcode::AllocColor) => handle_alloc_color(ctx, packet),
            Some(RequestOpcode::AllocNamedColor) => {
                let name = read_color_name(ctx.server, packet)?;
                let exact = lookup_color(&name).ok_or_else(X11Error::bad_name)?;
                let visual = exact.visual();
                ctx.reply.write_card32(exact.to_pixel());
                write_rgb(ctx, exact);
                write_rgb(ctx, visual);
                ctx.reply.write_padding(8);
                Ok(())
            }
            Some(RequestOpcode::FreeColors) => {
                let cmap = packet.read_card32()?;
                let _plane_mask = packet.read_card32()?;
                let _pixels = packet.read_rest()?;
                check_colormap(ctx.server, cmap)?;
                Ok(())
            }
            Some(RequestOpcode::QueryColors) => handle_query_colors(ctx, packet),
            Some(RequestOpcode::LookupColor) => {
                let name = read_color_name(ctx.server, packet)?;
                let exact = lookup_color(&name).ok_or_else(X11Error::bad_name)?;
                write_rgb(ctx, exact);
                write_rgb(ctx, exact.visual());
                ctx.reply.write_padding(12);
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn check_colormap(server: &Server, cmap: u32) -> X11Result<()> {
    server.colormaps.with(cmap, |_| ())
}

fn write_rgb(ctx: &mut RequestContext<'_>, rgb: Rgb16) {
    ctx.reply.write_card16(rgb.red);
    ctx.reply.write_card16(rgb.green);
    ctx.reply.write_card16(rgb.blue);
}

/// Colormap then a counted name, as AllocNamedColor and LookupColor send it.
fn read_color_name(server: &Server, packet: &mut Packet) -> X11Result<String> {
    let cmap = packet.read_card32()?;
    let len = packet.read_card16()? as usize;
    packet.read_padding(2)?;
    let name = packet.read_padded_string(len)?;
    check_colormap(server, cmap)?;
    Ok(name)
}

fn handle_create_colormap(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let alloc = packet.minor_opcode();
    let mid = packet.read_card32()?;
    let window = packet.read_card32()?;
    let visual = packet.read_card32()?;
    if alloc > ALLOC_ALL {
        return Err(X11Error::bad_value(alloc as u32).into());
    }
    ctx.server.windows.with_tree(|tree| tree.get(window).map(|_| ()))?;
    // TrueColor has no writable cells to allocate
    if visual != ROOT_VISUAL_ID || alloc == ALLOC_ALL {
        return Err(X11Error::bad_match().into());
    }

    ctx.server.colormaps.insert(mid, Colormap { id: mid, visual })?;
    ctx.server.track(ctx.client_id(), ResourceKind::Colormap, mid);
    log::debug!("CreateColormap 0x{:08x}", mid);
    Ok(())
}

fn handle_alloc_color(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let cmap = packet.read_card32()?;
    let requested = Rgb16 {
        red: packet.read_card16()?,
        green: packet.read_card16()?,
        blue: packet.read_card16()?,
    };
    packet.read_padding(2)?;
    check_colormap(ctx.server, cmap)?;

    write_rgb(ctx, requested.visual());
    ctx.reply.write_padding(2);
    ctx.reply.write_card32(requested.to_pixel());
    ctx.reply.write_padding(12);
    Ok(())
}

fn handle_query_colors(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let cmap = packet.read_card32()?;
    if packet.remaining() % 4 != 0 {
        return Err(X11Error::bad_length().into());
    }
    let mut pixels = Vec::with_capacity(packet.remaining() / 4);
    while packet.remaining() > 0 {
        pixels.push(packet.read_card32()?);
    }
    check_colormap(ctx.server, cmap)?;

    ctx.reply.write_card16(pixels.len() as u16);
    ctx.reply.write_padding(22);
    for pixel in pixels {
        write_rgb(ctx, Rgb16::from_pixel(pixel));
        ctx.reply.write_padding(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, ROOT_WINDOW_ID};
    use crate::server::handlers::harness::{card16_at, card32_at, error_code, Body, Session};

    const CMAP: u32 = 0x01f0_0040;

    fn named(s: &Session, major: u8, name: &str) -> Vec<u8> {
        let body = Body::new()
            .card32(DEFAULT_COLORMAP_ID)
            .card16(name.len() as u16)
            .card16(0)
            .padded(name.as_bytes());
        s.request(major, 0, body)
    }

    #[test]
    fn test_alloc_color_is_true_color() {
        let s = Session::new();
        let body = Body::new()
            .card32(DEFAULT_COLORMAP_ID)
            .card16(0x1234)
            .card16(0xff00)
            .card16(0x0080)
            .card16(0);
        let reply = s.request(84, 0, body);
        assert_eq!(card16_at(&reply, 8), 0x1212);
        assert_eq!(card16_at(&reply, 10), 0xffff);
        assert_eq!(card16_at(&reply, 12), 0x0000);
        assert_eq!(card32_at(&reply, 16), 0xff12_ff00);
    }

    #[test]
    fn test_named_colors() {
        let s = Session::new();
        let reply = named(&s, 85, "Red");
        assert_eq!(card32_at(&reply, 8), 0xffff_0000);
        assert_eq!(card16_at(&reply, 12), 0xffff);

        let reply = named(&s, 92, "#00ff00");
        assert_eq!(card16_at(&reply, 10), 0xffff);
        assert_eq!(card16_at(&reply, 16), 0xffff);

        assert_eq!(error_code(&named(&s, 85, "no such colour")), Some(ErrorCode::Name as u8));
        assert_eq!(error_code(&named(&s, 92, "chartreuse3x")), Some(ErrorCode::Name as u8));
    }

    #[test]
    fn test_query_colors() {
        let s = Session::new();
        let body = Body::new()
            .card32(DEFAULT_COLORMAP_ID)
            .card32(0xff00_00ff)
            .card32(0x00ab_cdef);
        let reply = s.request(91, 0, body);
        assert_eq!(card16_at(&reply, 8), 2);
        assert_eq!(card16_at(&reply, 36), 0xffff);
        assert_eq!(card16_at(&reply, 40), 0xabab);
        assert_eq!(card16_at(&reply, 42), 0xcdcd);
        assert_eq!(card16_at(&reply, 44), 0xefef);
    }

    #[test]
    fn test_create_free_colormap() {
        let s = Session::new();
        let create = |alloc: u8, visual: u32| {
            s.request(78, alloc, Body::new().card32(CMAP).card32(ROOT_WINDOW_ID).card32(visual))
        };
        assert_eq!(error_code(&create(0, 0x77)), Some(ErrorCode::Match as u8));
        assert_eq!(error_code(&create(1, ROOT_VISUAL_ID)), Some(ErrorCode::Match as u8));
        assert!(create(0, ROOT_VISUAL_ID).is_empty());
        assert!(s.server.colormaps.contains(CMAP));

        assert!(s.request(79, 0, Body::new().card32(CMAP)).is_empty());
        let out = s.request(79, 0, Body::new().card32(CMAP));
        assert_eq!(error_code(&out), Some(ErrorCode::Colormap as u8));

        // The default colormap survives FreeColormap
        assert!(s.request(79, 0, Body::new().card32(DEFAULT_COLORMAP_ID)).is_empty());
        assert!(s.server.colormaps.contains(DEFAULT_COLORMAP_ID));
    }
}
