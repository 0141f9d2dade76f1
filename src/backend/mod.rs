/// Backend collaborators
///
/// This module contains the drawing surface and font metrics traits consumed
/// by the protocol core, and the in-memory implementation the server ships with.

mod r#trait;
pub use r#trait::*;

pub mod memory;
pub use memory::{FixedFontMetrics, MemorySurface, MemorySurfaceFactory};
