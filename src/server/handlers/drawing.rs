//! Pixmaps, images and drawing requests
//!
//! Drawing goes through the `Surface` of the target window or pixmap. The GC
//! is copied out before the drawable is locked, so no handler holds the GC
//! table and the window tree at the same time.

use crate::backend::{FontHandle, PixelBuffer};
use crate::protocol::{
    Arc, Event, HandlerResult, Packet, PacketWriter, Point, Rect, RequestOpcode, Segment,
    X11Error, X11Result, ROOT_VISUAL_ID,
};
use crate::resources::{GraphicsContext, Pixmap, ResourceKind};
use crate::server::dispatcher::{RequestContext, RequestHandler};
use crate::server::Server;

/// CoordMode Previous: each point is relative to the one before it
const COORD_MODE_PREVIOUS: u8 = 1;

/// Image formats
const FORMAT_BITMAP: u8 = 0;
const FORMAT_XY_PIXMAP: u8 = 1;
const FORMAT_Z_PIXMAP: u8 = 2;

/// NoExposure event code
const NO_EXPOSURE: u8 = 14;

/// Font used by text requests on a GC that never had one set
const DEFAULT_FONT: &str = "fixed";

/// Font change marker in a PolyText item list
const FONT_SHIFT: u8 = 255;

pub struct DrawingRequests;

impl RequestHandler for DrawingRequests {
    fn opcodes(&self) -> &[u8] {
        &[
            53, 54, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 76, 77, 97,
        ]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        let Some(opcode) = RequestOpcode::from_u8(packet.major_opcode()) else {
            return Err(X11Error::bad_request().into());
        };
        match opcode {
            RequestOpcode::CreatePixmap => handle_create_pixmap(ctx, packet),
            RequestOpcode::FreePixmap => {
                let pid = packet.read_card32()?;
                ctx.server.pixmaps.remove(pid).ok_or_else(|| X11Error::bad_pixmap(pid))?;
                ctx.server.untrack(ResourceKind::Pixmap, pid);
                Ok(())
            }
            RequestOpcode::CopyArea => handle_copy_area(ctx, packet, false),
            RequestOpcode::CopyPlane => handle_copy_area(ctx, packet, true),
            RequestOpcode::PolyPoint
            | RequestOpcode::PolyLine
            | RequestOpcode::PolySegment
            | RequestOpcode::PolyRectangle
            | RequestOpcode::PolyArc
            | RequestOpcode::FillPoly
            | RequestOpcode::PolyFillRectangle
            | RequestOpcode::PolyFillArc => handle_primitive(ctx, packet, opcode),
            RequestOpcode::PutImage => handle_put_image(ctx, packet),
            RequestOpcode::GetImage => handle_get_image(ctx, packet),
            RequestOpcode::PolyText8 => handle_poly_text(ctx, packet, false),
            RequestOpcode::PolyText16 => handle_poly_text(ctx, packet, true),
            RequestOpcode::ImageText8 => handle_image_text(ctx, packet, false),
            RequestOpcode::ImageText16 => handle_image_text(ctx, packet, true),
            RequestOpcode::QueryBestSize => {
                let class = packet.minor_opcode();
                let drawable = packet.read_card32()?;
                let width = packet.read_card16()?;
                let height = packet.read_card16()?;
                // Cursor, Tile, Stipple
                if class > 2 {
                    return Err(X11Error::bad_value(class as u32).into());
                }
                if !ctx.server.drawable_exists(drawable) {
                    return Err(X11Error::bad_drawable(drawable).into());
                }
                ctx.reply.write_card16(width);
                ctx.reply.write_card16(height);
                ctx.reply.write_padding(20);
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn handle_create_pixmap(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let depth = packet.minor_opcode();
    let pid = packet.read_card32()?;
    let drawable = packet.read_card32()?;
    let width = packet.read_card16()?;
    let height = packet.read_card16()?;
    if !ctx.server.drawable_exists(drawable) {
        return Err(X11Error::bad_drawable(drawable).into());
    }

    let pixmap = Pixmap::new(pid, depth, width, height, ctx.server.surfaces.as_ref())?;
    ctx.server.pixmaps.insert(pid, pixmap)?;
    ctx.server.track(ctx.client_id(), ResourceKind::Pixmap, pid);
    log::debug!("CreatePixmap 0x{:08x} {}x{} depth {}", pid, width, height, depth);
    Ok(())
}

fn read_points(packet: &mut Packet, coord_mode: u8) -> X11Result<Vec<Point>> {
    if packet.remaining() % 4 != 0 {
        return Err(X11Error::bad_length());
    }
    let mut points = Vec::with_capacity(packet.remaining() / 4);
    let mut last = Point::default();
    while packet.remaining() > 0 {
        let mut p = Point::new(packet.read_int16()? as i32, packet.read_int16()? as i32);
        if coord_mode == COORD_MODE_PREVIOUS && !points.is_empty() {
            p = Point::new(last.x + p.x, last.y + p.y);
        }
        last = p;
        points.push(p);
    }
    Ok(points)
}

/// RECTANGLE list, also the leading part of each ARC
fn read_rect(packet: &mut Packet) -> X11Result<Rect> {
    Ok(Rect::new(
        packet.read_int16()? as i32,
        packet.read_int16()? as i32,
        packet.read_card16()? as i32,
        packet.read_card16()? as i32,
    ))
}

fn read_list<T>(
    packet: &mut Packet,
    item_len: usize,
    mut read: impl FnMut(&mut Packet) -> X11Result<T>,
) -> X11Result<Vec<T>> {
    if packet.remaining() % item_len != 0 {
        return Err(X11Error::bad_length());
    }
    let mut items = Vec::with_capacity(packet.remaining() / item_len);
    while packet.remaining() > 0 {
        items.push(read(packet)?);
    }
    Ok(items)
}

fn read_arcs(packet: &mut Packet) -> X11Result<Vec<Arc>> {
    read_list(packet, 12, |p| {
        let r = read_rect(p)?;
        Ok(Arc {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            angle1: p.read_int16()? as i32,
            angle2: p.read_int16()? as i32,
        })
    })
}

/// Geometry parsed from one drawing request
enum Shape {
    Points(Vec<Point>),
    Lines(Vec<Point>),
    Segments(Vec<Segment>),
    Rects(Vec<Rect>),
    FillRects(Vec<Rect>),
    Arcs(Vec<Arc>),
    FillArcs(Vec<Arc>),
    Polygon(Vec<Point>),
}

fn handle_primitive(
    ctx: &mut RequestContext<'_>,
    packet: &mut Packet,
    opcode: RequestOpcode,
) -> HandlerResult {
    let coord_mode = packet.minor_opcode();
    let drawable = packet.read_card32()?;
    let gid = packet.read_card32()?;

    let shape = match opcode {
        RequestOpcode::PolyPoint => Shape::Points(read_points(packet, coord_mode)?),
        RequestOpcode::PolyLine => Shape::Lines(read_points(packet, coord_mode)?),
        RequestOpcode::PolySegment => Shape::Segments(read_list(packet, 8, |p| {
            Ok(Segment {
                x1: p.read_int16()? as i32,
                y1: p.read_int16()? as i32,
                x2: p.read_int16()? as i32,
                y2: p.read_int16()? as i32,
            })
        })?),
        RequestOpcode::PolyRectangle => Shape::Rects(read_list(packet, 8, read_rect)?),
        RequestOpcode::PolyFillRectangle => Shape::FillRects(read_list(packet, 8, read_rect)?),
        RequestOpcode::PolyArc => Shape::Arcs(read_arcs(packet)?),
        RequestOpcode::PolyFillArc => Shape::FillArcs(read_arcs(packet)?),
        RequestOpcode::FillPoly => {
            let _shape = packet.read_byte()?;
            let mode = packet.read_byte()?;
            packet.read_padding(2)?;
            Shape::Polygon(read_points(packet, mode)?)
        }
        _ => return Err(X11Error::bad_request().into()),
    };

    let gc = ctx.server.gcs.get(gid)?;
    ctx.server.with_drawable(drawable, |surface| match &shape {
        Shape::Points(points) => surface.draw_points(&gc, points),
        Shape::Lines(points) => surface.draw_lines(&gc, points),
        Shape::Segments(segments) => surface.draw_segments(&gc, segments),
        Shape::Rects(rects) => surface.draw_rects(&gc, rects),
        Shape::FillRects(rects) => surface.fill_rects(&gc, rects),
        Shape::Arcs(arcs) => surface.draw_arcs(&gc, arcs),
        Shape::FillArcs(arcs) => surface.fill_arcs(&gc, arcs),
        Shape::Polygon(points) => surface.fill_polygon(&gc, points),
    })?;
    Ok(())
}

/// Tell the client a copy exposed nothing, when the GC asks for exposures.
fn send_no_exposure(ctx: &RequestContext<'_>, gc: &GraphicsContext, drawable: u32, major: u8) {
    if !gc.graphics_exposures {
        return;
    }
    let mut w = PacketWriter::new(ctx.byte_order());
    w.write_card32(drawable);
    w.write_card16(0);
    w.write_byte(major);
    w.write_padding(21);
    let mut body = [0u8; 28];
    body.copy_from_slice(w.body());
    ctx.sink().send_event(&Event::Raw {
        code: NO_EXPOSURE,
        detail: 0,
        body,
    });
}

/// CopyArea, or CopyPlane when `plane` is set: the selected bit plane of the
/// source becomes foreground and background pixels.
fn handle_copy_area(ctx: &mut RequestContext<'_>, packet: &mut Packet, plane: bool) -> HandlerResult {
    let src = packet.read_card32()?;
    let dst = packet.read_card32()?;
    let gid = packet.read_card32()?;
    let src_x = packet.read_int16()? as i32;
    let src_y = packet.read_int16()? as i32;
    let dst_x = packet.read_int16()? as i32;
    let dst_y = packet.read_int16()? as i32;
    let width = packet.read_card16()? as i32;
    let height = packet.read_card16()? as i32;
    let bit_plane = if plane { Some(packet.read_card32()?) } else { None };
    if let Some(bit) = bit_plane {
        if bit.count_ones() != 1 {
            return Err(X11Error::bad_value(bit).into());
        }
    }

    let gc = ctx.server.gcs.get(gid)?;
    let mut pixels = ctx
        .server
        .with_drawable(src, |s| s.read_pixels(Rect::new(src_x, src_y, width, height)))?;
    if let Some(bit) = bit_plane {
        for p in pixels.pixels.iter_mut() {
            *p = if *p & bit != 0 { gc.foreground } else { gc.background };
        }
    }
    ctx.server
        .with_drawable(dst, |s| s.write_pixels(dst_x, dst_y, &pixels, Some(&gc)))?;

    let major = if plane {
        RequestOpcode::CopyPlane
    } else {
        RequestOpcode::CopyArea
    };
    send_no_exposure(ctx, &gc, dst, major as u8);
    Ok(())
}

/// Unpack a 1-bit image, most significant bit leftmost, into foreground
/// and background pixels.
fn unpack_bitmap(
    data: &[u8],
    width: usize,
    height: usize,
    left_pad: usize,
    scanline_pad: usize,
    gc: &GraphicsContext,
) -> X11Result<PixelBuffer> {
    let pad_bits = scanline_pad.max(8);
    let stride = (width + left_pad).div_ceil(pad_bits) * pad_bits / 8;
    if data.len() < stride * height {
        return Err(X11Error::bad_length());
    }
    let mut buf = PixelBuffer::new(width as u32, height as u32);
    for y in 0..height {
        let row = &data[y * stride..(y + 1) * stride];
        for x in 0..width {
            let bit = x + left_pad;
            let set = row[bit / 8] & (0x80 >> (bit % 8)) != 0;
            let pixel = if set { gc.foreground } else { gc.background };
            buf.set(x as u32, y as u32, pixel);
        }
    }
    Ok(buf)
}

/// 32 bits per pixel, least significant byte first.
fn unpack_zpixmap(data: &[u8], width: usize, height: usize, depth: u8) -> X11Result<PixelBuffer> {
    if data.len() < width * height * 4 {
        return Err(X11Error::bad_length());
    }
    let mut buf = PixelBuffer::new(width as u32, height as u32);
    for (i, px) in data.chunks_exact(4).take(width * height).enumerate() {
        let mut pixel = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
        if depth == 24 {
            pixel |= 0xff00_0000;
        }
        buf.pixels[i] = pixel;
    }
    Ok(buf)
}

fn handle_put_image(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let format = packet.minor_opcode();
    let drawable = packet.read_card32()?;
    let gid = packet.read_card32()?;
    let width = packet.read_card16()? as usize;
    let height = packet.read_card16()? as usize;
    let dst_x = packet.read_int16()? as i32;
    let dst_y = packet.read_int16()? as i32;
    let left_pad = packet.read_byte()? as usize;
    let depth = packet.read_byte()?;
    packet.read_padding(2)?;
    let data = packet.read_rest()?;

    let gc = ctx.server.gcs.get(gid)?;
    let pixels = match format {
        FORMAT_BITMAP | FORMAT_XY_PIXMAP if depth == 1 => {
            let pad = ctx.server.info().bitmap_format_scanline_pad as usize;
            unpack_bitmap(&data, width, height, left_pad, pad, &gc)?
        }
        FORMAT_Z_PIXMAP if depth == 24 || depth == 32 => {
            if left_pad != 0 {
                return Err(X11Error::bad_match().into());
            }
            unpack_zpixmap(&data, width, height, depth)?
        }
        FORMAT_BITMAP | FORMAT_XY_PIXMAP | FORMAT_Z_PIXMAP => {
            return Err(X11Error::bad_match().into())
        }
        _ => return Err(X11Error::bad_value(format as u32).into()),
    };

    ctx.server
        .with_drawable(drawable, |s| s.write_pixels(dst_x, dst_y, &pixels, Some(&gc)))?;
    Ok(())
}

fn handle_get_image(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let format = packet.minor_opcode();
    let drawable = packet.read_card32()?;
    let rect = read_rect(packet)?;
    let plane_mask = packet.read_card32()?;
    if format != FORMAT_Z_PIXMAP {
        return Err(X11Error::bad_match().into());
    }

    let is_window = ctx.server.windows.with_tree(|tree| tree.contains(drawable));
    let (depth, pixels) = ctx.server.with_drawable(drawable, |s| {
        let bounds = Rect::new(0, 0, s.width() as i32, s.height() as i32);
        if rect.intersect(&bounds) != rect {
            return None;
        }
        Some((s.depth(), s.read_pixels(rect)))
    })?
    .ok_or_else(X11Error::bad_match)?;

    ctx.reply.set_detail(depth);
    ctx.reply.write_card32(if is_window { ROOT_VISUAL_ID } else { 0 });
    ctx.reply.write_padding(20);
    for pixel in &pixels.pixels {
        ctx.reply.write_bytes(&(pixel & plane_mask).to_le_bytes());
    }
    Ok(())
}

/// Font the GC draws text with
fn gc_font(server: &Server, gc: &GraphicsContext) -> X11Result<FontHandle> {
    if gc.font == 0 {
        return server
            .font_metrics
            .resolve(DEFAULT_FONT)
            .ok_or_else(|| X11Error::bad_font(0));
    }
    server.fonts.with(gc.font, |f| f.handle.clone())
}

/// STRING8 bytes or CHAR2B pairs as character codes
fn decode_text(bytes: &[u8], wide: bool) -> Vec<u16> {
    if wide {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        bytes.iter().map(|&b| b as u16).collect()
    }
}

enum TextItem {
    Font(u32),
    Text { delta: i8, chars: Vec<u16> },
}

fn read_text_items(packet: &mut Packet, wide: bool) -> X11Result<Vec<TextItem>> {
    let char_len = if wide { 2 } else { 1 };
    let mut items = Vec::new();
    // Anything shorter than an item header is padding
    while packet.remaining() >= 2 {
        let len = packet.read_byte()?;
        if len == FONT_SHIFT {
            // Font ids in text items are always most significant byte first
            let b = packet.read_bytes(4)?;
            items.push(TextItem::Font(u32::from_be_bytes([b[0], b[1], b[2], b[3]])));
        } else {
            let delta = packet.read_byte()? as i8;
            let bytes = packet.read_bytes(len as usize * char_len)?;
            items.push(TextItem::Text {
                delta,
                chars: decode_text(&bytes, wide),
            });
        }
    }
    packet.read_rest()?;
    Ok(items)
}

fn handle_poly_text(ctx: &mut RequestContext<'_>, packet: &mut Packet, wide: bool) -> HandlerResult {
    let drawable = packet.read_card32()?;
    let gid = packet.read_card32()?;
    let mut x = packet.read_int16()? as i32;
    let y = packet.read_int16()? as i32;
    let items = read_text_items(packet, wide)?;

    let mut gc = ctx.server.gcs.get(gid)?;
    if !ctx.server.drawable_exists(drawable) {
        return Err(X11Error::bad_drawable(drawable).into());
    }
    for item in items {
        match item {
            TextItem::Font(fid) => {
                ctx.server.fonts.with(fid, |_| ())?;
                gc.font = fid;
                ctx.server.gcs.with_mut(gid, |stored| stored.font = fid)?;
            }
            TextItem::Text { delta, chars } => {
                let font = gc_font(ctx.server, &gc)?;
                x += delta as i32;
                ctx.server
                    .with_drawable(drawable, |s| s.draw_text(&gc, &font, x, y, &chars, false))?;
                x += ctx.server.font_metrics.text_extents(&font, &chars).overall_width;
            }
        }
    }
    Ok(())
}

/// The length is in the minor byte; the cells are filled with the
/// background before the glyphs are drawn.
fn handle_image_text(ctx: &mut RequestContext<'_>, packet: &mut Packet, wide: bool) -> HandlerResult {
    let n = packet.minor_opcode() as usize;
    let drawable = packet.read_card32()?;
    let gid = packet.read_card32()?;
    let x = packet.read_int16()? as i32;
    let y = packet.read_int16()? as i32;
    let bytes = packet.read_padded_bytes(if wide { n * 2 } else { n })?;
    let chars = decode_text(&bytes, wide);

    let gc = ctx.server.gcs.get(gid)?;
    let font = gc_font(ctx.server, &gc)?;
    ctx.server
        .with_drawable(drawable, |s| s.draw_text(&gc, &font, x, y, &chars, true))?;
    Ok(())
}
