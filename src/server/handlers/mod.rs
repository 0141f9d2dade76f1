//! Core request handlers
//!
//! Requests are grouped by the resource they act on; each group is one
//! `RequestHandler` registered for its opcodes when the server starts.

mod atoms;
mod colors;
mod drawing;
mod fonts;
mod gc;
mod hosts;
mod misc;
mod selection;
mod window;

use super::dispatcher::Dispatcher;
use std::sync::Arc;

pub fn register_core(dispatcher: &mut Dispatcher) {
    dispatcher.register(Arc::new(window::WindowRequests));
    dispatcher.register(Arc::new(atoms::AtomRequests));
    dispatcher.register(Arc::new(selection::SelectionRequests));
    dispatcher.register(Arc::new(fonts::FontRequests));
    dispatcher.register(Arc::new(gc::GcRequests));
    dispatcher.register(Arc::new(drawing::DrawingRequests));
    dispatcher.register(Arc::new(colors::ColormapRequests));
    dispatcher.register(Arc::new(hosts::HostRequests));
    dispatcher.register(Arc::new(misc::MiscRequests));
}
