//! Window hierarchy
//!
//! This module contains the window tree: per-window state, event interest,
//! attribute parsing, and the structural operations (create, map, stack,
//! configure, reparent, destroy) that generate structure events.

pub mod attributes;
pub mod listener;
pub mod manager;
pub mod window;

pub use attributes::{cw, BackgroundSetting, BorderSetting, WindowAttributes, WindowChanges};
pub use listener::{ClientWindowCallback, EventSink, TopLevelLogger, WindowObserver};
pub use manager::{NewWindow, PropertyReply, WindowManager, WindowTree, ANY_PROPERTY_TYPE};
pub use window::{
    Paint, Property, XWindow, FLAG_MAPPED, FLAG_VISIBLE, PROP_MODE_APPEND, PROP_MODE_PREPEND,
    PROP_MODE_REPLACE,
};
