//! X11 protocol events
//!
//! Events are sent from the server to clients to notify them of state changes.
//! Every event is 32 bytes: code, detail, sequence number, 28 bytes of body.

use super::packet::PacketWriter;
use super::types::Atom;
use super::ByteOrder;

/// Event type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    Expose = 12,
    CreateNotify = 16,
    DestroyNotify = 17,
    UnmapNotify = 18,
    MapNotify = 19,
    ReparentNotify = 21,
    ConfigureNotify = 22,
    PropertyNotify = 28,
    SelectionClear = 29,
    SelectionRequest = 30,
    SelectionNotify = 31,
}

/// Set on the code byte of events delivered through SendEvent
pub const SEND_EVENT_FLAG: u8 = 0x80;

/// PropertyNotify state
pub const PROPERTY_NEW_VALUE: u8 = 0;
pub const PROPERTY_DELETED: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Expose {
        window: u32,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        count: u16,
    },
    CreateNotify {
        parent: u32,
        window: u32,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        override_redirect: bool,
    },
    DestroyNotify {
        event: u32,
        window: u32,
    },
    UnmapNotify {
        event: u32,
        window: u32,
        from_configure: bool,
    },
    MapNotify {
        event: u32,
        window: u32,
        override_redirect: bool,
    },
    ReparentNotify {
        event: u32,
        window: u32,
        parent: u32,
        x: i16,
        y: i16,
        override_redirect: bool,
    },
    ConfigureNotify {
        event: u32,
        window: u32,
        above_sibling: u32,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        override_redirect: bool,
    },
    PropertyNotify {
        window: u32,
        atom: Atom,
        time: u32,
        state: u8,
    },
    SelectionClear {
        time: u32,
        owner: u32,
        selection: Atom,
    },
    SelectionRequest {
        time: u32,
        owner: u32,
        requestor: u32,
        selection: Atom,
        target: Atom,
        property: Atom,
    },
    SelectionNotify {
        time: u32,
        requestor: u32,
        selection: Atom,
        target: Atom,
        property: Atom,
    },
    /// A client-built event forwarded by SendEvent. Only the sequence number
    /// is rewritten on delivery.
    Raw {
        code: u8,
        detail: u8,
        body: [u8; 28],
    },
}

impl Event {
    /// The code byte, including the send-event flag for forwarded events.
    pub fn code(&self) -> u8 {
        let ty = match self {
            Event::Expose { .. } => EventType::Expose,
            Event::CreateNotify { .. } => EventType::CreateNotify,
            Event::DestroyNotify { .. } => EventType::DestroyNotify,
            Event::UnmapNotify { .. } => EventType::UnmapNotify,
            Event::MapNotify { .. } => EventType::MapNotify,
            Event::ReparentNotify { .. } => EventType::ReparentNotify,
            Event::ConfigureNotify { .. } => EventType::ConfigureNotify,
            Event::PropertyNotify { .. } => EventType::PropertyNotify,
            Event::SelectionClear { .. } => EventType::SelectionClear,
            Event::SelectionRequest { .. } => EventType::SelectionRequest,
            Event::SelectionNotify { .. } => EventType::SelectionNotify,
            Event::Raw { code, .. } => return *code,
        };
        ty as u8
    }

    /// Encode to the 32-byte wire record.
    pub fn encode(&self, sequence: u16, byte_order: ByteOrder) -> Vec<u8> {
        let mut w = PacketWriter::new(byte_order);
        w.write_byte(self.code());
        if let Event::Raw { detail, body, .. } = self {
            w.write_byte(*detail);
            w.write_card16(sequence);
            w.write_bytes(body);
            return w.into_body();
        }

        w.write_byte(0);
        w.write_card16(sequence);
        match *self {
            Event::Expose {
                window,
                x,
                y,
                width,
                height,
                count,
            } => {
                w.write_card32(window);
                w.write_card16(x);
                w.write_card16(y);
                w.write_card16(width);
                w.write_card16(height);
                w.write_card16(count);
            }
            Event::CreateNotify {
                parent,
                window,
                x,
                y,
                width,
                height,
                border_width,
                override_redirect,
            } => {
                w.write_card32(parent);
                w.write_card32(window);
                w.write_int16(x);
                w.write_int16(y);
                w.write_card16(width);
                w.write_card16(height);
                w.write_card16(border_width);
                w.write_bool(override_redirect);
            }
            Event::DestroyNotify { event, window } => {
                w.write_card32(event);
                w.write_card32(window);
            }
            Event::UnmapNotify {
                event,
                window,
                from_configure,
            } => {
                w.write_card32(event);
                w.write_card32(window);
                w.write_bool(from_configure);
            }
            Event::MapNotify {
                event,
                window,
                override_redirect,
            } => {
                w.write_card32(event);
                w.write_card32(window);
                w.write_bool(override_redirect);
            }
            Event::ReparentNotify {
                event,
                window,
                parent,
                x,
                y,
                override_redirect,
            } => {
                w.write_card32(event);
                w.write_card32(window);
                w.write_card32(parent);
                w.write_int16(x);
                w.write_int16(y);
                w.write_bool(override_redirect);
            }
            Event::ConfigureNotify {
                event,
                window,
                above_sibling,
                x,
                y,
                width,
                height,
                border_width,
                override_redirect,
            } => {
                w.write_card32(event);
                w.write_card32(window);
                w.write_card32(above_sibling);
                w.write_int16(x);
                w.write_int16(y);
                w.write_card16(width);
                w.write_card16(height);
                w.write_card16(border_width);
                w.write_bool(override_redirect);
            }
            Event::PropertyNotify {
                window,
                atom,
                time,
                state,
            } => {
                w.write_card32(window);
                w.write_card32(atom.get());
                w.write_card32(time);
                w.write_byte(state);
            }
            Event::SelectionClear {
                time,
                owner,
                selection,
            } => {
                w.write_card32(time);
                w.write_card32(owner);
                w.write_card32(selection.get());
            }
            Event::SelectionRequest {
                time,
                owner,
                requestor,
                selection,
                target,
                property,
            } => {
                w.write_card32(time);
                w.write_card32(owner);
                w.write_card32(requestor);
                w.write_card32(selection.get());
                w.write_card32(target.get());
                w.write_card32(property.get());
            }
            Event::SelectionNotify {
                time,
                requestor,
                selection,
                target,
                property,
            } => {
                w.write_card32(time);
                w.write_card32(requestor);
                w.write_card32(selection.get());
                w.write_card32(target.get());
                w.write_card32(property.get());
            }
            Event::Raw { .. } => {}
        }
        let used = w.len();
        w.write_padding(32 - used);
        w.into_body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_is_32_bytes() {
        let events = vec![
            Event::Expose {
                window: 1,
                x: 0,
                y: 0,
                width: 10,
                height: 10,
                count: 0,
            },
            Event::DestroyNotify { event: 1, window: 2 },
            Event::ConfigureNotify {
                event: 1,
                window: 2,
                above_sibling: 0,
                x: -5,
                y: 5,
                width: 100,
                height: 50,
                border_width: 1,
                override_redirect: false,
            },
            Event::SelectionRequest {
                time: 0,
                owner: 1,
                requestor: 2,
                selection: Atom::PRIMARY,
                target: Atom::STRING,
                property: Atom::NONE,
            },
        ];
        for event in events {
            assert_eq!(event.encode(1, ByteOrder::LSBFirst).len(), 32);
        }
    }

    #[test]
    fn test_property_notify_layout() {
        let event = Event::PropertyNotify {
            window: 0x0020_0001,
            atom: Atom::WM_NAME,
            time: 5,
            state: PROPERTY_DELETED,
        };
        let bytes = event.encode(0x0102, ByteOrder::MSBFirst);
        assert_eq!(bytes[0], 28);
        assert_eq!(&bytes[2..4], &[0x01, 0x02]);
        assert_eq!(&bytes[4..8], &[0x00, 0x20, 0x00, 0x01]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 39]);
        assert_eq!(bytes[16], PROPERTY_DELETED);
    }

    #[test]
    fn test_raw_event_keeps_flag_and_body() {
        let mut body = [0u8; 28];
        body[0] = 0xAB;
        let event = Event::Raw {
            code: 33 | SEND_EVENT_FLAG,
            detail: 8,
            body,
        };
        let bytes = event.encode(7, ByteOrder::LSBFirst);
        assert_eq!(bytes[0], 33 | SEND_EVENT_FLAG);
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[2..4], &[7, 0]);
        assert_eq!(bytes[4], 0xAB);
    }
}
