//! X11 extensions
//!
//! Extensions get major opcodes above the core range, handed out in the order
//! they are registered. Only BIG-REQUESTS and a stub MIT-SCREEN-SAVER exist.

use super::dispatcher::{RequestContext, RequestHandler};
use crate::protocol::{HandlerResult, Packet, RequestOpcode, X11Error, MAX_EXTENDED_LENGTH};

/// Major opcode given to the first registered extension
pub const EXTENSION_OPCODE_START: u8 = 130;

pub const BIG_REQUESTS: &str = "BIG-REQUESTS";
pub const MIT_SCREEN_SAVER: &str = "MIT-SCREEN-SAVER";

/// Longest request, in words, once BIG-REQUESTS is enabled
pub const BIG_REQUEST_MAX_LENGTH: u32 = MAX_EXTENDED_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: &'static str,
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

#[derive(Debug)]
pub struct ExtensionTable {
    extensions: Vec<Extension>,
    next_opcode: u8,
}

impl ExtensionTable {
    pub fn new() -> Self {
        ExtensionTable {
            extensions: Vec::new(),
            next_opcode: EXTENSION_OPCODE_START,
        }
    }

    /// Allocate the next major opcode for `name`. Registering a name twice
    /// returns the opcode it already has.
    pub fn register(&mut self, name: &'static str) -> u8 {
        if let Some(ext) = self.query(name) {
            return ext.major_opcode;
        }
        let major_opcode = self.next_opcode;
        self.next_opcode = self.next_opcode.saturating_add(1);
        self.extensions.push(Extension {
            name,
            major_opcode,
            first_event: 0,
            first_error: 0,
        });
        log::debug!("Extension {} at opcode {}", name, major_opcode);
        major_opcode
    }

    pub fn query(&self, name: &str) -> Option<&Extension> {
        self.extensions.iter().find(|ext| ext.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions.iter().map(|ext| ext.name)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// QueryExtension and ListExtensions
pub struct ExtensionQueries;

impl RequestHandler for ExtensionQueries {
    fn opcodes(&self) -> &[u8] {
        &[
            RequestOpcode::QueryExtension as u8,
            RequestOpcode::ListExtensions as u8,
        ]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::QueryExtension) => handle_query_extension(ctx, packet),
            Some(RequestOpcode::ListExtensions) => handle_list_extensions(ctx),
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn handle_query_extension(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let len = packet.read_card16()? as usize;
    packet.read_padding(2)?;
    let name = packet.read_padded_string(len)?;

    let reply = &mut ctx.reply;
    match ctx.server.extensions.query(&name) {
        Some(ext) => {
            log::debug!("QueryExtension {}: opcode {}", name, ext.major_opcode);
            reply.write_bool(true);
            reply.write_byte(ext.major_opcode);
            reply.write_byte(ext.first_event);
            reply.write_byte(ext.first_error);
        }
        None => {
            log::debug!("QueryExtension {}: not present", name);
            reply.write_bool(false);
            reply.write_padding(3);
        }
    }
    reply.write_padding(20);
    Ok(())
}

fn handle_list_extensions(ctx: &mut RequestContext<'_>) -> HandlerResult {
    let extensions = &ctx.server.extensions;
    let reply = &mut ctx.reply;
    reply.set_detail(extensions.len() as u8);
    reply.write_padding(24);
    for name in extensions.names() {
        reply.write_str(name);
    }
    reply.align();
    Ok(())
}

/// BIG-REQUESTS: `BigReqEnable` switches the connection to extended lengths.
pub struct BigRequests {
    opcode: [u8; 1],
}

impl BigRequests {
    pub fn new(opcode: u8) -> Self {
        BigRequests { opcode: [opcode] }
    }
}

impl RequestHandler for BigRequests {
    fn opcodes(&self) -> &[u8] {
        &self.opcode
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        if packet.minor_opcode() != 0 {
            return Err(X11Error::bad_request().into());
        }
        ctx.client.enable_big_requests();
        log::debug!("Client {} enabled big requests", ctx.client_id());
        ctx.reply.write_card32(BIG_REQUEST_MAX_LENGTH);
        ctx.reply.write_padding(20);
        Ok(())
    }
}

/// MIT-SCREEN-SAVER: answers `QueryVersion` and ignores everything else.
pub struct ScreenSaver {
    opcode: [u8; 1],
}

impl ScreenSaver {
    pub fn new(opcode: u8) -> Self {
        ScreenSaver { opcode: [opcode] }
    }
}

impl RequestHandler for ScreenSaver {
    fn opcodes(&self) -> &[u8] {
        &self.opcode
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match packet.minor_opcode() {
            0 => {
                let client_major = packet.read_byte()?;
                let client_minor = packet.read_byte()?;
                packet.read_padding(2)?;
                log::debug!(
                    "MIT-SCREEN-SAVER: QueryVersion from client {}.{}",
                    client_major,
                    client_minor
                );
                ctx.reply.write_card16(1);
                ctx.reply.write_card16(1);
                ctx.reply.write_padding(20);
            }
            minor => {
                log::debug!("MIT-SCREEN-SAVER: minor opcode {} ignored", minor);
                packet.read_rest()?;
            }
        }
        Ok(())
    }
}
