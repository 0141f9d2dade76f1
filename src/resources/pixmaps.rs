//! Off-screen pixmaps

use super::table::ResourceTable;
use crate::backend::{Surface, SurfaceFactory};
use crate::protocol::{X11Error, X11Result};

/// Depths a pixmap may be created with
pub const PIXMAP_DEPTHS: [u8; 3] = [1, 24, 32];

pub struct Pixmap {
    pub id: u32,
    pub depth: u8,
    pub width: u16,
    pub height: u16,
    pub surface: Box<dyn Surface>,
}

impl Pixmap {
    pub fn new(
        id: u32,
        depth: u8,
        width: u16,
        height: u16,
        factory: &dyn SurfaceFactory,
    ) -> X11Result<Self> {
        if !PIXMAP_DEPTHS.contains(&depth) {
            return Err(X11Error::bad_value(depth as u32));
        }
        if width == 0 || height == 0 {
            return Err(X11Error::bad_value(0));
        }
        let surface = factory.create_surface(width as u32, height as u32, depth)?;
        Ok(Pixmap {
            id,
            depth,
            width,
            height,
            surface,
        })
    }
}

pub type PixmapTable = ResourceTable<Pixmap>;

pub fn new_pixmap_table() -> PixmapTable {
    ResourceTable::new(X11Error::bad_pixmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemorySurfaceFactory;
    use crate::protocol::ErrorCode;

    #[test]
    fn test_depth_and_size_checks() {
        let f = MemorySurfaceFactory;
        assert!(Pixmap::new(1, 32, 4, 4, &f).is_ok());
        assert!(Pixmap::new(1, 1, 4, 4, &f).is_ok());

        let err = Pixmap::new(1, 8, 4, 4, &f).err().unwrap();
        assert_eq!(err.code, ErrorCode::Value);
        assert_eq!(err.bad_value, 8);

        let err = Pixmap::new(1, 32, 0, 4, &f).err().unwrap();
        assert_eq!(err.bad_value, 0);

        let err = Pixmap::new(1, 32, 65535, 65535, &f).err().unwrap();
        assert_eq!(err.code, ErrorCode::Alloc);
    }

    #[test]
    fn test_free_is_idempotent() {
        let table = new_pixmap_table();
        let f = MemorySurfaceFactory;
        table.insert(9, Pixmap::new(9, 32, 2, 2, &f).unwrap()).unwrap();
        assert!(table.remove(9).is_some());
        assert!(table.remove(9).is_none());
        assert_eq!(table.with(9, |p| p.depth).unwrap_err().code, ErrorCode::Pixmap);
    }
}
