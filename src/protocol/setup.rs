//! X11 connection setup protocol
//!
//! This module holds the records exchanged during the connection handshake:
//! the client's setup request and the server's success/failed responses.

use super::codec::{ReadError, WriteError, XProtoReader, XProtoWriter};
use super::packet::PacketWriter;
use super::*;
use std::io::{Read, Write};

/// Connection setup request from client
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub byte_order: ByteOrder,
    pub protocol_major_version: u16,
    pub protocol_minor_version: u16,
    pub authorization_protocol_name: String,
    pub authorization_protocol_data: Vec<u8>,
}

impl SetupRequest {
    /// Read everything after the order byte and its unused companion.
    pub fn read_body<R: Read>(reader: &mut XProtoReader<R>) -> Result<Self, ReadError> {
        let protocol_major_version = reader.read_card16()?;
        let protocol_minor_version = reader.read_card16()?;
        let name_len = reader.read_card16()? as usize;
        let data_len = reader.read_card16()? as usize;
        reader.read_padding(2)?;
        let authorization_protocol_name = reader.read_padded_string(name_len)?;
        let authorization_protocol_data = reader.read_padded_bytes(data_len)?;

        Ok(SetupRequest {
            byte_order: reader.byte_order(),
            protocol_major_version,
            protocol_minor_version,
            authorization_protocol_name,
            authorization_protocol_data,
        })
    }
}

/// Setup response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Failed = 0,
    Success = 1,
}

/// Format information
#[derive(Debug, Clone)]
pub struct Format {
    pub depth: u8,
    pub bits_per_pixel: u8,
    pub scanline_pad: u8,
}

impl Format {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_byte(self.depth);
        w.write_byte(self.bits_per_pixel);
        w.write_byte(self.scanline_pad);
        w.write_padding(5);
    }
}

/// Visual type information
#[derive(Debug, Clone)]
pub struct VisualType {
    pub visual_id: u32,
    pub class: u8,
    pub bits_per_rgb_value: u8,
    pub colormap_entries: u16,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

pub const VISUAL_CLASS_TRUE_COLOR: u8 = 4;

impl VisualType {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_card32(self.visual_id);
        w.write_byte(self.class);
        w.write_byte(self.bits_per_rgb_value);
        w.write_card16(self.colormap_entries);
        w.write_card32(self.red_mask);
        w.write_card32(self.green_mask);
        w.write_card32(self.blue_mask);
        w.write_padding(4);
    }
}

/// Depth information
#[derive(Debug, Clone)]
pub struct Depth {
    pub depth: u8,
    pub visuals: Vec<VisualType>,
}

impl Depth {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_byte(self.depth);
        w.write_padding(1);
        w.write_card16(self.visuals.len() as u16);
        w.write_padding(4);
        for visual in &self.visuals {
            visual.encode(w);
        }
    }
}

/// Screen information
#[derive(Debug, Clone)]
pub struct Screen {
    pub root: u32,
    pub default_colormap: u32,
    pub white_pixel: u32,
    pub black_pixel: u32,
    pub current_input_masks: u32,
    pub width_in_pixels: u16,
    pub height_in_pixels: u16,
    pub width_in_millimeters: u16,
    pub height_in_millimeters: u16,
    pub min_installed_maps: u16,
    pub max_installed_maps: u16,
    pub root_visual: u32,
    pub backing_stores: u8,
    pub save_unders: bool,
    pub root_depth: u8,
    pub allowed_depths: Vec<Depth>,
}

impl Screen {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_card32(self.root);
        w.write_card32(self.default_colormap);
        w.write_card32(self.white_pixel);
        w.write_card32(self.black_pixel);
        w.write_card32(self.current_input_masks);
        w.write_card16(self.width_in_pixels);
        w.write_card16(self.height_in_pixels);
        w.write_card16(self.width_in_millimeters);
        w.write_card16(self.height_in_millimeters);
        w.write_card16(self.min_installed_maps);
        w.write_card16(self.max_installed_maps);
        w.write_card32(self.root_visual);
        w.write_byte(self.backing_stores);
        w.write_bool(self.save_unders);
        w.write_byte(self.root_depth);
        w.write_byte(self.allowed_depths.len() as u8);
        for depth in &self.allowed_depths {
            depth.encode(w);
        }
    }
}

/// Ids fixed by the server for the single screen it exports
pub const ROOT_WINDOW_ID: u32 = 3;
pub const DEFAULT_COLORMAP_ID: u32 = 4;
pub const ROOT_VISUAL_ID: u32 = 1;
pub const ROOT_DEPTH: u8 = 32;

/// Backing-store support advertised for the screen
pub const BACKING_STORE_ALWAYS: u8 = 2;

/// Everything the server tells a client once the handshake is accepted
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub release_number: u32,
    pub resource_id_base: u32,
    pub resource_id_mask: u32,
    pub motion_buffer_size: u32,
    pub maximum_request_length: u16,
    pub image_byte_order: ByteOrder,
    pub bitmap_format_bit_order: ByteOrder,
    pub bitmap_format_scanline_unit: u8,
    pub bitmap_format_scanline_pad: u8,
    pub min_keycode: u8,
    pub max_keycode: u8,
    pub vendor: String,
    pub pixmap_formats: Vec<Format>,
    pub roots: Vec<Screen>,
}

impl ServerInfo {
    /// The one-screen, TrueColor depth-32 layout this server exports.
    pub fn new(width: u16, height: u16) -> Self {
        let visual = VisualType {
            visual_id: ROOT_VISUAL_ID,
            class: VISUAL_CLASS_TRUE_COLOR,
            bits_per_rgb_value: 8,
            colormap_entries: 256,
            red_mask: 0x00ff_0000,
            green_mask: 0x0000_ff00,
            blue_mask: 0x0000_00ff,
        };

        let screen = Screen {
            root: ROOT_WINDOW_ID,
            default_colormap: DEFAULT_COLORMAP_ID,
            white_pixel: 0xffff_ffff,
            black_pixel: 0xff00_0000,
            current_input_masks: 0,
            width_in_pixels: width,
            height_in_pixels: height,
            width_in_millimeters: 300,
            height_in_millimeters: 300,
            min_installed_maps: 1,
            max_installed_maps: 4,
            root_visual: ROOT_VISUAL_ID,
            backing_stores: BACKING_STORE_ALWAYS,
            save_unders: false,
            root_depth: ROOT_DEPTH,
            allowed_depths: vec![Depth {
                depth: ROOT_DEPTH,
                visuals: vec![visual],
            }],
        };

        ServerInfo {
            release_number: 1,
            resource_id_base: 0x01f0_0000,
            resource_id_mask: 0x000f_ffff,
            motion_buffer_size: 5,
            maximum_request_length: 0x7fff,
            image_byte_order: ByteOrder::LSBFirst,
            bitmap_format_bit_order: ByteOrder::MSBFirst,
            bitmap_format_scanline_unit: 8,
            bitmap_format_scanline_pad: 8,
            min_keycode: 8,
            max_keycode: 255,
            vendor: "x11serve".to_string(),
            pixmap_formats: vec![
                Format {
                    depth: 32,
                    bits_per_pixel: 32,
                    scanline_pad: 32,
                },
                Format {
                    depth: 1,
                    bits_per_pixel: 1,
                    scanline_pad: 32,
                },
            ],
            roots: vec![screen],
        }
    }

    pub fn screen(&self) -> Option<&Screen> {
        self.roots.first()
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_card32(self.release_number);
        w.write_card32(self.resource_id_base);
        w.write_card32(self.resource_id_mask);
        w.write_card32(self.motion_buffer_size);
        w.write_card16(self.vendor.len() as u16);
        w.write_card16(self.maximum_request_length);
        w.write_byte(self.roots.len() as u8);
        w.write_byte(self.pixmap_formats.len() as u8);
        w.write_byte(self.image_byte_order as u8);
        w.write_byte(self.bitmap_format_bit_order as u8);
        w.write_byte(self.bitmap_format_scanline_unit);
        w.write_byte(self.bitmap_format_scanline_pad);
        w.write_byte(self.min_keycode);
        w.write_byte(self.max_keycode);
        w.write_padding(4);
        w.write_padded_string(&self.vendor);
        for format in &self.pixmap_formats {
            format.encode(w);
        }
        for screen in &self.roots {
            screen.encode(w);
        }
    }

    /// Status 1, protocol version, length in words, then the info record.
    pub fn write_success<W: Write>(&self, writer: &mut XProtoWriter<W>) -> Result<(), WriteError> {
        let mut info = PacketWriter::new(writer.byte_order());
        self.encode(&mut info);

        writer.write_byte(SetupStatus::Success as u8)?;
        writer.write_byte(0)?;
        writer.write_card16(PROTOCOL_MAJOR_VERSION)?;
        writer.write_card16(PROTOCOL_MINOR_VERSION)?;
        writer.write_card16((info.len() / 4) as u16)?;
        writer.write_bytes(info.body())?;
        writer.flush()
    }
}

/// Status 0, reason length, protocol version, length in words, reason.
pub fn write_setup_failed<W: Write>(
    writer: &mut XProtoWriter<W>,
    reason: &str,
) -> Result<(), WriteError> {
    let reason = &reason[..reason.len().min(255)];
    writer.write_byte(SetupStatus::Failed as u8)?;
    writer.write_byte(reason.len() as u8)?;
    writer.write_card16(PROTOCOL_MAJOR_VERSION)?;
    writer.write_card16(PROTOCOL_MINOR_VERSION)?;
    writer.write_card16((padded_len(reason.len()) / 4) as u16)?;
    writer.write_padded_string(reason)?;
    writer.flush()
}
