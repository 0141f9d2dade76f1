//! Font requests
//!
//! Fonts come from the server's `FontMetrics` provider. A fontable argument
//! may name either an open font or a GC, in which case the GC's font is used.

use crate::backend::{CharMetrics, FontHandle};
use crate::protocol::{
    Atom, HandlerResult, Packet, PacketWriter, RequestOpcode, X11Error, X11Result,
};
use crate::resources::fonts::font_pattern_matches;
use crate::resources::{ResourceKind, XFont};
use crate::server::dispatcher::{RequestContext, RequestHandler};
use crate::server::Server;

/// Directories reported by GetFontPath
const FONT_PATH: &[&str] = &["built-ins"];

/// FontDraw direction LeftToRight
const LEFT_TO_RIGHT: u8 = 0;

pub struct FontRequests;

impl RequestHandler for FontRequests {
    fn opcodes(&self) -> &[u8] {
        &[45, 46, 47, 48, 49, 50, 52]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::OpenFont) => handle_open_font(ctx, packet),
            Some(RequestOpcode::CloseFont) => {
                let fid = packet.read_card32()?;
                ctx.server.fonts.remove(fid).ok_or_else(|| X11Error::bad_font(fid))?;
                ctx.server.untrack(ResourceKind::Font, fid);
                log::debug!("CloseFont 0x{:08x}", fid);
                Ok(())
            }
            Some(RequestOpcode::QueryFont) => handle_query_font(ctx, packet),
            Some(RequestOpcode::QueryTextExtents) => handle_query_text_extents(ctx, packet),
            Some(RequestOpcode::ListFonts) => handle_list_fonts(ctx, packet),
            Some(RequestOpcode::ListFontsWithInfo) => handle_list_fonts_with_info(ctx, packet),
            Some(RequestOpcode::GetFontPath) => {
                ctx.reply.write_card16(FONT_PATH.len() as u16);
                ctx.reply.write_padding(22);
                for dir in FONT_PATH {
                    ctx.reply.write_str(dir);
                }
                ctx.reply.align();
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn handle_open_font(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let fid = packet.read_card32()?;
    let len = packet.read_card16()? as usize;
    packet.read_padding(2)?;
    let name = packet.read_padded_string(len)?;

    let handle = ctx
        .server
        .font_metrics
        .resolve(&name)
        .ok_or_else(X11Error::bad_name)?;
    log::debug!("OpenFont 0x{:08x} {:?} -> {}", fid, name, handle.name);
    ctx.server.fonts.insert(
        fid,
        XFont {
            id: fid,
            requested: name,
            handle,
        },
    )?;
    ctx.server.track(ctx.client_id(), ResourceKind::Font, fid);
    Ok(())
}

/// Font behind a FONTABLE: an open font, or the font of a GC.
fn resolve_fontable(server: &Server, id: u32) -> X11Result<FontHandle> {
    if let Ok(font) = server.fonts.with(id, |f| f.handle.clone()) {
        return Ok(font);
    }
    let font_id = server.gcs.with(id, |gc| gc.font).map_err(|_| X11Error::bad_font(id))?;
    server
        .fonts
        .with(font_id, |f| f.handle.clone())
        .map_err(|_| X11Error::bad_font(id))
}

fn write_char_info(w: &mut PacketWriter, m: &CharMetrics) {
    w.write_int16(m.left_bearing);
    w.write_int16(m.right_bearing);
    w.write_int16(m.width);
    w.write_int16(m.ascent);
    w.write_int16(m.descent);
    w.write_card16(m.attributes);
}

/// Smallest and largest value of each metric over the font's characters.
fn bounds(metrics: &[CharMetrics]) -> (CharMetrics, CharMetrics) {
    let mut lo = metrics.first().copied().unwrap_or_default();
    let mut hi = lo;
    for m in metrics {
        lo.left_bearing = lo.left_bearing.min(m.left_bearing);
        lo.right_bearing = lo.right_bearing.min(m.right_bearing);
        lo.width = lo.width.min(m.width);
        lo.ascent = lo.ascent.min(m.ascent);
        lo.descent = lo.descent.min(m.descent);
        hi.left_bearing = hi.left_bearing.max(m.left_bearing);
        hi.right_bearing = hi.right_bearing.max(m.right_bearing);
        hi.width = hi.width.max(m.width);
        hi.ascent = hi.ascent.max(m.ascent);
        hi.descent = hi.descent.max(m.descent);
    }
    (lo, hi)
}

/// The font description shared by QueryFont and ListFontsWithInfo, up to and
/// including the properties. `trailer` is n-char-infos for QueryFont and
/// replies-hint for ListFontsWithInfo.
fn write_font_info(
    w: &mut PacketWriter,
    server: &Server,
    font: &FontHandle,
    chars: &[CharMetrics],
    trailer: u32,
) {
    let (min_bounds, max_bounds) = bounds(chars);
    let name_atom = server.atoms.intern(&font.name);

    write_char_info(w, &min_bounds);
    w.write_padding(4);
    write_char_info(w, &max_bounds);
    w.write_padding(4);
    w.write_card16(font.min_char);
    w.write_card16(font.max_char);
    w.write_card16(font.default_char);
    w.write_card16(1);
    w.write_byte(LEFT_TO_RIGHT);
    w.write_byte(0);
    w.write_byte(0);
    w.write_bool(true);
    w.write_int16(font.ascent);
    w.write_int16(font.descent);
    w.write_card32(trailer);

    w.write_card32(Atom::FONT.get());
    w.write_card32(name_atom.get());
}

fn char_metrics(server: &Server, font: &FontHandle) -> Vec<CharMetrics> {
    (font.min_char..=font.max_char)
        .map(|ch| server.font_metrics.char_metrics(font, ch))
        .collect()
}

fn handle_query_font(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let fontable = packet.read_card32()?;
    let font = resolve_fontable(ctx.server, fontable)?;
    let chars = char_metrics(ctx.server, &font);

    write_font_info(&mut ctx.reply, ctx.server, &font, &chars, chars.len() as u32);
    for m in &chars {
        write_char_info(&mut ctx.reply, m);
    }
    Ok(())
}

/// The string is CHAR2B; odd-length in the minor byte says the last pair is
/// padding.
fn handle_query_text_extents(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let odd_length = packet.minor_opcode() != 0;
    let fontable = packet.read_card32()?;
    let bytes = packet.read_rest()?;
    let mut count = bytes.len() / 2;
    if odd_length {
        count = count.saturating_sub(1);
    }
    let text: Vec<u16> = bytes
        .chunks_exact(2)
        .take(count)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let font = resolve_fontable(ctx.server, fontable)?;
    let ext = ctx.server.font_metrics.text_extents(&font, &text);

    ctx.reply.set_detail(LEFT_TO_RIGHT);
    ctx.reply.write_int16(ext.font_ascent);
    ctx.reply.write_int16(ext.font_descent);
    ctx.reply.write_int16(ext.overall_ascent);
    ctx.reply.write_int16(ext.overall_descent);
    ctx.reply.write_int32(ext.overall_width);
    ctx.reply.write_int32(ext.overall_left);
    ctx.reply.write_int32(ext.overall_right);
    ctx.reply.write_padding(4);
    Ok(())
}

/// max-names and pattern, shared by both listing requests
fn read_pattern(ctx: &RequestContext<'_>, packet: &mut Packet) -> X11Result<Vec<String>> {
    let max_names = packet.read_card16()? as usize;
    let len = packet.read_card16()? as usize;
    let pattern = packet.read_padded_string(len)?;
    let names: Vec<String> = ctx
        .server
        .font_metrics
        .font_names()
        .into_iter()
        .filter(|name| font_pattern_matches(&pattern, name))
        .take(max_names)
        .collect();
    log::debug!("Font pattern {:?}: {} matches", pattern, names.len());
    Ok(names)
}

fn handle_list_fonts(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let names = read_pattern(ctx, packet)?;
    ctx.reply.write_card16(names.len() as u16);
    ctx.reply.write_padding(22);
    for name in &names {
        ctx.reply.write_str(name);
    }
    ctx.reply.align();
    Ok(())
}

/// One reply per matching font, then a last reply with an empty name.
fn handle_list_fonts_with_info(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let names = read_pattern(ctx, packet)?;
    let total = names.len();
    for (i, name) in names.iter().enumerate() {
        let Some(font) = ctx.server.font_metrics.resolve(name) else {
            continue;
        };
        let chars = char_metrics(ctx.server, &font);
        ctx.reply.set_detail(name.len().min(255) as u8);
        write_font_info(&mut ctx.reply, ctx.server, &font, &chars, (total - i - 1) as u32);
        ctx.reply.write_padded_string(name);
        ctx.flush_reply()?;
    }

    ctx.reply.set_detail(0);
    ctx.reply.write_padding(52);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;
    use crate::server::handlers::harness::{card16_at, card32_at, error_code, Body, Session};

    const FID: u32 = 0x01f0_0010;

    fn open(s: &Session, fid: u32, name: &str) -> Vec<u8> {
        let body = Body::new()
            .card32(fid)
            .card16(name.len() as u16)
            .card16(0)
            .padded(name.as_bytes());
        s.request(45, 0, body)
    }

    fn list(s: &Session, major: u8, max: u16, pattern: &str) -> Vec<u8> {
        let body = Body::new()
            .card16(max)
            .card16(pattern.len() as u16)
            .padded(pattern.as_bytes());
        s.request(major, 0, body)
    }

    #[test]
    fn test_open_query_close() {
        let s = Session::new();
        assert!(open(&s, FID, "fixed").is_empty());
        assert_eq!(error_code(&open(&s, FID + 1, "helvetica")), Some(ErrorCode::Name as u8));

        let reply = s.request(47, 0, Body::new().card32(FID));
        // max-bounds width, then chars 0..=255
        assert_eq!(card16_at(&reply, 28), 6);
        assert_eq!(card16_at(&reply, 40), 0);
        assert_eq!(card16_at(&reply, 42), 255);
        assert_eq!(card16_at(&reply, 46), 1);
        assert_eq!(card16_at(&reply, 52), 11);
        assert_eq!(card32_at(&reply, 56), 256);
        assert_eq!(reply.len(), 60 + 8 + 256 * 12);

        assert!(s.request(46, 0, Body::new().card32(FID)).is_empty());
        let out = s.request(46, 0, Body::new().card32(FID));
        assert_eq!(error_code(&out), Some(ErrorCode::Font as u8));
    }

    #[test]
    fn test_text_extents_through_gc() {
        let s = Session::new();
        open(&s, FID, "9x15");
        let gc = Body::new()
            .card32(0x01f0_0020)
            .card32(crate::protocol::ROOT_WINDOW_ID)
            .card32(crate::resources::gc::gc_mask::FONT)
            .card32(FID);
        assert!(s.request(55, 0, gc).is_empty());

        // "abc" as CHAR2B with the odd-length flag
        let text = [0, b'a', 0, b'b', 0, b'c', 0, 0];
        let reply = s.request(48, 1, Body::new().card32(0x01f0_0020).padded(&text));
        assert_eq!(card16_at(&reply, 8), 12);
        assert_eq!(card32_at(&reply, 16), 27);

        let out = s.request(48, 0, Body::new().card32(0x999));
        assert_eq!(error_code(&out), Some(ErrorCode::Font as u8));
    }

    #[test]
    fn test_list_fonts() {
        let s = Session::new();
        let reply = list(&s, 49, 10, "9X15*");
        assert_eq!(card16_at(&reply, 8), 2);
        assert_eq!(reply[32] as usize, "9x15".len());
        assert_eq!(&reply[33..37], b"9x15");

        let reply = list(&s, 49, 1, "*");
        assert_eq!(card16_at(&reply, 8), 1);
        let reply = list(&s, 49, 10, "nothing-*");
        assert_eq!(card16_at(&reply, 8), 0);
    }

    #[test]
    fn test_list_fonts_with_info_terminates() {
        let s = Session::new();
        let out = list(&s, 50, 10, "10x20");
        // One reply with info and name, then the terminator
        let first_len = 32 + card32_at(&out, 4) as usize * 4;
        assert_eq!(out[1], 5);
        assert_eq!(&out[first_len - 8..first_len - 3], b"10x20");
        let last = &out[first_len..];
        assert_eq!(last.len(), 60);
        assert_eq!(last[0], 1);
        assert_eq!(last[1], 0);
        assert_eq!(card32_at(last, 4), 7);
    }

    #[test]
    fn test_font_path() {
        let s = Session::new();
        let reply = s.request(52, 0, Body::new());
        assert_eq!(card16_at(&reply, 8), 1);
        assert_eq!(&reply[33..42], b"built-ins");
    }
}
