//! x11serve - a headless X11 display server
//!
//! Clients connect over TCP and speak the X11 core protocol. Windows, pixmaps
//! and graphics contexts live in server memory and draw into in-memory
//! surfaces; nothing is shown on a real display.

pub mod backend;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod windows;

pub use protocol::{Atom, ByteOrder, X11Error, X11Result};
pub use server::{Server, ServerConfig};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
