//! Opcode to handler table
//!
//! Every major opcode byte has one slot. A handler names the opcodes it
//! serves and registering it fills those slots; a later registration for the
//! same opcode replaces the earlier one.

use super::client::ClientConnection;
use super::Server;
use crate::protocol::{ByteOrder, HandlerError, HandlerResult, Packet, PacketWriter};
use crate::windows::EventSink;
use std::sync::Arc;

/// A group of request handlers sharing one slot set.
pub trait RequestHandler: Send + Sync {
    /// Major opcodes routed to this handler.
    fn opcodes(&self) -> &[u8];

    /// Handle one request. Reply bytes go into `ctx.reply`; leaving it empty
    /// means the request has no reply.
    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult;
}

/// What a handler sees of the connection that sent the request
pub struct RequestContext<'a> {
    pub server: &'a Server,
    pub client: &'a Arc<ClientConnection>,
    /// Sequence number of the request being handled
    pub sequence: u16,
    /// Scratch reply; its detail byte becomes the second header byte
    pub reply: PacketWriter,
}

impl<'a> RequestContext<'a> {
    pub fn new(server: &'a Server, client: &'a Arc<ClientConnection>, sequence: u16) -> Self {
        RequestContext {
            server,
            client,
            sequence,
            reply: PacketWriter::new(client.byte_order()),
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client.id()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.client.byte_order()
    }

    /// The connection as an event destination.
    pub fn sink(&self) -> Arc<dyn EventSink> {
        let client: Arc<ClientConnection> = Arc::clone(self.client);
        client
    }

    /// Write the reply built so far right away and start an empty one. Only
    /// requests answered by a series of replies need this.
    pub fn flush_reply(&mut self) -> HandlerResult {
        self.client
            .write_reply(self.sequence, &self.reply)
            .map_err(|e| HandlerError::fatal(format!("reply write failed: {}", e)))?;
        self.reply.clear();
        Ok(())
    }
}

pub struct Dispatcher {
    slots: Vec<Option<Arc<dyn RequestHandler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            slots: vec![None; 256],
        }
    }

    pub fn register(&mut self, handler: Arc<dyn RequestHandler>) {
        for &opcode in handler.opcodes() {
            self.slots[opcode as usize] = Some(Arc::clone(&handler));
        }
    }

    pub fn resolve(&self, opcode: u8) -> Option<&Arc<dyn RequestHandler>> {
        self.slots[opcode as usize].as_ref()
    }

    /// Opcodes that currently have a handler.
    pub fn registered(&self) -> Vec<u8> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(op, _)| op as u8)
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
