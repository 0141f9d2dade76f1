//! Graphics context requests

use crate::protocol::{HandlerResult, Packet, Rect, RequestOpcode, X11Error, X11Result};
use crate::resources::gc::gc_mask;
use crate::resources::{GraphicsContext, ResourceKind};
use crate::server::dispatcher::{RequestContext, RequestHandler};
use crate::server::Server;

/// SetClipRectangles ordering: UnSorted, YSorted, YXSorted, YXBanded
const MAX_CLIP_ORDERING: u8 = 3;

pub struct GcRequests;

impl RequestHandler for GcRequests {
    fn opcodes(&self) -> &[u8] {
        &[55, 56, 57, 58, 59, 60]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::CreateGC) => handle_create_gc(ctx, packet),
            Some(RequestOpcode::ChangeGC) => {
                let gid = packet.read_card32()?;
                let mask = packet.read_card32()?;
                let mut gc = ctx.server.gcs.get(gid)?;
                gc.apply_values(mask, packet)?;
                check_font(ctx.server, &gc)?;
                ctx.server.gcs.with_mut(gid, |stored| *stored = gc)?;
                Ok(())
            }
            Some(RequestOpcode::CopyGC) => {
                let src = packet.read_card32()?;
                let dst = packet.read_card32()?;
                let mask = packet.read_card32()?;
                if mask & !gc_mask::ALL != 0 {
                    return Err(X11Error::bad_value(mask).into());
                }
                let source = ctx.server.gcs.get(src)?;
                ctx.server.gcs.with_mut(dst, |gc| gc.copy_from(&source, mask))?;
                Ok(())
            }
            Some(RequestOpcode::SetDashes) => handle_set_dashes(ctx, packet),
            Some(RequestOpcode::SetClipRectangles) => handle_set_clip_rectangles(ctx, packet),
            Some(RequestOpcode::FreeGC) => {
                let gid = packet.read_card32()?;
                ctx.server.gcs.remove(gid).ok_or_else(|| X11Error::bad_gc(gid))?;
                ctx.server.untrack(ResourceKind::GContext, gid);
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

/// A font set through the value list has to be open.
fn check_font(server: &Server, gc: &GraphicsContext) -> X11Result<()> {
    if gc.font != 0 && !server.fonts.contains(gc.font) {
        return Err(X11Error::bad_font(gc.font));
    }
    Ok(())
}

fn handle_create_gc(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let gid = packet.read_card32()?;
    let drawable = packet.read_card32()?;
    let mask = packet.read_card32()?;
    if !ctx.server.drawable_exists(drawable) {
        return Err(X11Error::bad_drawable(drawable).into());
    }

    let mut gc = GraphicsContext::default();
    gc.apply_values(mask, packet)?;
    check_font(ctx.server, &gc)?;
    ctx.server.gcs.insert(gid, gc)?;
    ctx.server.track(ctx.client_id(), ResourceKind::GContext, gid);
    log::debug!("CreateGC 0x{:08x} on 0x{:08x}, mask 0x{:06x}", gid, drawable, mask);
    Ok(())
}

fn handle_set_dashes(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let gid = packet.read_card32()?;
    let offset = packet.read_card16()?;
    let n = packet.read_card16()? as usize;
    let dashes = packet.read_padded_bytes(n)?;
    if dashes.is_empty() || dashes.contains(&0) {
        return Err(X11Error::bad_value(n as u32).into());
    }
    ctx.server.gcs.with_mut(gid, |gc| {
        gc.dash_offset = offset;
        gc.dashes = dashes;
    })?;
    Ok(())
}

fn handle_set_clip_rectangles(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let ordering = packet.minor_opcode();
    let gid = packet.read_card32()?;
    let clip_x = packet.read_int16()?;
    let clip_y = packet.read_int16()?;
    if ordering > MAX_CLIP_ORDERING {
        return Err(X11Error::bad_value(ordering as u32).into());
    }
    if packet.remaining() % 8 != 0 {
        return Err(X11Error::bad_length().into());
    }

    let mut rects = Vec::with_capacity(packet.remaining() / 8);
    while packet.remaining() > 0 {
        let x = packet.read_int16()? as i32;
        let y = packet.read_int16()? as i32;
        let w = packet.read_card16()? as i32;
        let h = packet.read_card16()? as i32;
        rects.push(Rect::new(x, y, w, h));
    }
    ctx.server.gcs.with_mut(gid, |gc| {
        gc.clip_x_origin = clip_x;
        gc.clip_y_origin = clip_y;
        gc.clip_rects = Some(rects);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, ROOT_WINDOW_ID};
    use crate::server::handlers::harness::{error_code, Body, Session};

    const GC: u32 = 0x01f0_0030;

    fn create(s: &Session, gid: u32, drawable: u32, mask: u32, values: &[u32]) -> Vec<u8> {
        let mut body = Body::new().card32(gid).card32(drawable).card32(mask);
        for &v in values {
            body = body.card32(v);
        }
        s.request(55, 0, body)
    }

    #[test]
    fn test_create_change_free() {
        let s = Session::new();
        let out = create(&s, GC, ROOT_WINDOW_ID, gc_mask::FOREGROUND | gc_mask::LINE_WIDTH, &[0xff00ff, 3]);
        assert!(out.is_empty());
        let gc = s.server.gcs.get(GC).unwrap();
        assert_eq!(gc.foreground, 0xff00ff);
        assert_eq!(gc.line_width, 3);

        let change = Body::new().card32(GC).card32(gc_mask::BACKGROUND).card32(7);
        assert!(s.request(56, 0, change).is_empty());
        assert_eq!(s.server.gcs.get(GC).unwrap().background, 7);

        // A bad value leaves the GC as it was
        let change = Body::new()
            .card32(GC)
            .card32(gc_mask::FOREGROUND | gc_mask::FUNCTION)
            .card32(99)
            .card32(1);
        assert_eq!(error_code(&s.request(56, 0, change)), Some(ErrorCode::Value as u8));
        assert_eq!(s.server.gcs.get(GC).unwrap().foreground, 0xff00ff);

        assert!(s.request(60, 0, Body::new().card32(GC)).is_empty());
        let out = s.request(60, 0, Body::new().card32(GC));
        assert_eq!(error_code(&out), Some(ErrorCode::GContext as u8));
    }

    #[test]
    fn test_create_errors() {
        let s = Session::new();
        let out = create(&s, GC, 0x999, 0, &[]);
        assert_eq!(error_code(&out), Some(ErrorCode::Drawable as u8));
        let out = create(&s, GC, ROOT_WINDOW_ID, gc_mask::CLIP_MASK, &[0x1234]);
        assert_eq!(error_code(&out), Some(ErrorCode::Value as u8));
        let out = create(&s, GC, ROOT_WINDOW_ID, gc_mask::FONT, &[0x4444]);
        assert_eq!(error_code(&out), Some(ErrorCode::Font as u8));

        assert!(create(&s, GC, ROOT_WINDOW_ID, 0, &[]).is_empty());
        let out = create(&s, GC, ROOT_WINDOW_ID, 0, &[]);
        assert_eq!(error_code(&out), Some(ErrorCode::IDChoice as u8));
    }

    #[test]
    fn test_copy_gc() {
        let s = Session::new();
        create(&s, GC, ROOT_WINDOW_ID, gc_mask::FOREGROUND | gc_mask::BACKGROUND, &[5, 6]);
        create(&s, GC + 1, ROOT_WINDOW_ID, 0, &[]);
        let copy = Body::new().card32(GC).card32(GC + 1).card32(gc_mask::FOREGROUND);
        assert!(s.request(57, 0, copy).is_empty());
        let dst = s.server.gcs.get(GC + 1).unwrap();
        assert_eq!(dst.foreground, 5);
        assert_eq!(dst.background, 1);
    }

    #[test]
    fn test_dashes_and_clip() {
        let s = Session::new();
        create(&s, GC, ROOT_WINDOW_ID, 0, &[]);

        let dashes = Body::new().card32(GC).card16(2).card16(3).padded(&[1, 2, 3]);
        assert!(s.request(58, 0, dashes).is_empty());
        let gc = s.server.gcs.get(GC).unwrap();
        assert_eq!(gc.dashes, vec![1, 2, 3]);
        assert_eq!(gc.dash_offset, 2);

        let zero = Body::new().card32(GC).card16(0).card16(2).padded(&[1, 0]);
        assert_eq!(error_code(&s.request(58, 0, zero)), Some(ErrorCode::Value as u8));

        let clip = Body::new()
            .card32(GC)
            .int16(10)
            .int16(20)
            .int16(0)
            .int16(0)
            .card16(5)
            .card16(5);
        assert!(s.request(59, 0, clip).is_empty());
        let gc = s.server.gcs.get(GC).unwrap();
        assert_eq!(gc.clip_rects, Some(vec![Rect::new(0, 0, 5, 5)]));
        assert!(gc.clip_allows(12, 22));
        assert!(!gc.clip_allows(2, 2));

        let bad = Body::new().card32(GC).int16(0).int16(0);
        assert_eq!(error_code(&s.request(59, 4, bad)), Some(ErrorCode::Value as u8));
    }
}
