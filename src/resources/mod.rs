//! Resource managers and per-client resource tracking
//!
//! Each manager guards its own map and reports unknown ids with the matching
//! X11 error. The tracker remembers which client created what, so a
//! disconnecting client's resources can be freed.

pub mod atoms;
pub mod colormaps;
pub mod fonts;
pub mod gc;
pub mod hosts;
pub mod pixmaps;
pub mod selections;
pub mod table;

pub use atoms::AtomTable;
pub use colormaps::{lookup_color, Colormap, ColormapTable, Rgb16};
pub use fonts::{FontTable, XFont};
pub use gc::{ArcMode, FillRule, GcFunction, GcTable, GraphicsContext};
pub use hosts::{Host, HostList};
pub use pixmaps::{Pixmap, PixmapTable};
pub use selections::{FocusState, OwnerChange, SelectionTable};
pub use table::ResourceTable;

use std::collections::{HashMap, HashSet};

/// Kinds of resources a client can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Window,
    Pixmap,
    GContext,
    Font,
    Colormap,
}

/// What to free when a client goes away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupRequest {
    DestroyWindow(u32),
    FreePixmap(u32),
    FreeGC(u32),
    CloseFont(u32),
    FreeColormap(u32),
}

/// Which connection created each window, pixmap, GC, font and colormap
#[derive(Debug, Default)]
pub struct ResourceTracker {
    owned: HashMap<u32, HashMap<ResourceKind, HashSet<u32>>>,
    next_client_id: u32,
}

impl ResourceTracker {
    /// Client ids start at 1.
    pub fn new() -> Self {
        ResourceTracker {
            owned: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Hand out the next client id with nothing owned yet.
    pub fn register_client(&mut self) -> u32 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.owned.insert(client_id, HashMap::new());
        client_id
    }

    pub fn track(&mut self, client_id: u32, kind: ResourceKind, id: u32) {
        if let Some(owned) = self.owned.get_mut(&client_id) {
            owned.entry(kind).or_default().insert(id);
        }
    }

    /// Freed resources are forgotten whichever client freed them.
    pub fn untrack(&mut self, kind: ResourceKind, id: u32) {
        for owned in self.owned.values_mut() {
            if let Some(ids) = owned.get_mut(&kind) {
                ids.remove(&id);
            }
        }
    }

    pub fn owner_of(&self, kind: ResourceKind, id: u32) -> Option<u32> {
        self.owned.iter().find_map(|(client, owned)| {
            owned
                .get(&kind)
                .filter(|ids| ids.contains(&id))
                .map(|_| *client)
        })
    }

    /// Forget a disconnected client and list what must be freed for it.
    /// Windows come first so a window is gone before the pixmaps and GCs
    /// that were used to draw into it.
    pub fn unregister_client(&mut self, client_id: u32) -> Vec<CleanupRequest> {
        let Some(mut owned) = self.owned.remove(&client_id) else {
            return Vec::new();
        };

        let mut take = |kind: ResourceKind| -> Vec<u32> {
            let mut ids: Vec<u32> = owned.remove(&kind).unwrap_or_default().into_iter().collect();
            ids.sort_unstable();
            ids
        };

        let mut cleanup = Vec::new();
        cleanup.extend(take(ResourceKind::Window).into_iter().map(CleanupRequest::DestroyWindow));
        cleanup.extend(take(ResourceKind::Pixmap).into_iter().map(CleanupRequest::FreePixmap));
        cleanup.extend(take(ResourceKind::GContext).into_iter().map(CleanupRequest::FreeGC));
        cleanup.extend(take(ResourceKind::Font).into_iter().map(CleanupRequest::CloseFont));
        cleanup.extend(take(ResourceKind::Colormap).into_iter().map(CleanupRequest::FreeColormap));
        cleanup
    }

    pub fn client_count(&self) -> usize {
        self.owned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_registration() {
        let mut tracker = ResourceTracker::new();
        let client1 = tracker.register_client();
        let client2 = tracker.register_client();

        assert_eq!(client1, 1);
        assert_eq!(client2, 2);
        assert_eq!(tracker.client_count(), 2);
    }

    #[test]
    fn test_cleanup_order() {
        let mut tracker = ResourceTracker::new();
        let client = tracker.register_client();
        tracker.track(client, ResourceKind::GContext, 7);
        tracker.track(client, ResourceKind::Window, 5);
        tracker.track(client, ResourceKind::Pixmap, 6);

        let cleanup = tracker.unregister_client(client);
        assert_eq!(
            cleanup,
            vec![
                CleanupRequest::DestroyWindow(5),
                CleanupRequest::FreePixmap(6),
                CleanupRequest::FreeGC(7),
            ]
        );
        assert!(tracker.unregister_client(client).is_empty());
    }

    #[test]
    fn test_untrack_and_owner() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.register_client();
        let b = tracker.register_client();
        tracker.track(a, ResourceKind::Window, 100);
        assert_eq!(tracker.owner_of(ResourceKind::Window, 100), Some(a));

        // Same numeric id in another namespace is a different resource
        tracker.track(b, ResourceKind::Pixmap, 100);
        assert_eq!(tracker.owner_of(ResourceKind::Pixmap, 100), Some(b));

        tracker.untrack(ResourceKind::Window, 100);
        assert_eq!(tracker.owner_of(ResourceKind::Window, 100), None);
        assert_eq!(tracker.owner_of(ResourceKind::Pixmap, 100), Some(b));
    }
}
