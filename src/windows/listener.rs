//! Event interest records attached to windows

use crate::protocol::Event;
use std::sync::Arc;

/// Anything that can receive events: in practice a client connection.
pub trait EventSink: Send + Sync {
    fn client_id(&self) -> u32;
    fn send_event(&self, event: &Event);
}

/// One client's event mask on one window
#[derive(Clone)]
pub struct ClientWindowCallback {
    pub sink: Arc<dyn EventSink>,
    pub mask: u32,
}

impl ClientWindowCallback {
    pub fn new(sink: Arc<dyn EventSink>, mask: u32) -> Self {
        ClientWindowCallback { sink, mask }
    }

    pub fn client_id(&self) -> u32 {
        self.sink.client_id()
    }

    /// A listener gets an event only if it selected every bit the event
    /// requires.
    pub fn wants(&self, required: u32) -> bool {
        self.mask & required == required
    }
}

impl std::fmt::Debug for ClientWindowCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientWindowCallback")
            .field("client", &self.sink.client_id())
            .field("mask", &format_args!("0x{:08x}", self.mask))
            .finish()
    }
}

/// Server-side hooks on structural changes of a window's children.
///
/// Only the root carries one; it is how top-level windows get noticed.
pub trait WindowObserver: Send {
    fn child_added(&mut self, _parent: u32, _child: u32) {}
    fn child_removed(&mut self, _parent: u32, _child: u32) {}
    fn child_mapping_changed(&mut self, _parent: u32, _child: u32, _mapped: bool) {}
    fn order_changed(&mut self, _parent: u32) {}
}

/// Logs top-level windows coming and going.
#[derive(Debug, Default)]
pub struct TopLevelLogger {
    mapped: usize,
}

impl TopLevelLogger {
    pub fn mapped_count(&self) -> usize {
        self.mapped
    }
}

impl WindowObserver for TopLevelLogger {
    fn child_mapping_changed(&mut self, _parent: u32, child: u32, mapped: bool) {
        if mapped {
            self.mapped += 1;
            log::info!("Top-level window 0x{:08x} mapped", child);
        } else {
            self.mapped = self.mapped.saturating_sub(1);
            log::info!("Top-level window 0x{:08x} unmapped", child);
        }
    }

    fn child_removed(&mut self, _parent: u32, child: u32) {
        log::debug!("Top-level window 0x{:08x} removed", child);
    }
}
