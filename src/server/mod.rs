//! Core X11 server implementation
//!
//! `Server` owns every resource manager, the window tree and the request
//! dispatch table. Connections share one `Server` behind an `Arc`; each
//! manager guards its own state, so there is no server-wide lock.
//!
//! Lock order, outermost first: window tree, graphics contexts, pixmaps,
//! colormaps, fonts, and a connection's writer last. Handlers that need two
//! of these take a copy of the inner one (a GC, a pixmap's pixels) before
//! locking the outer one.

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod extensions;
mod handlers;
pub mod listener;

pub use client::{ClientConnection, ConnectionState};
pub use config::{parse_screen_size, ServerConfig, X_TCP_PORT};
pub use dispatcher::{Dispatcher, RequestContext, RequestHandler};
pub use listener::start_tcp_listener;

use crate::backend::{
    FixedFontMetrics, FontMetrics, MemorySurfaceFactory, PixelBuffer, Surface, SurfaceFactory,
};
use crate::protocol::{Rect, ServerInfo, X11Error, X11Result, DEFAULT_COLORMAP_ID};
use crate::resources::colormaps::new_colormap_table;
use crate::resources::fonts::new_font_table;
use crate::resources::gc::new_gc_table;
use crate::resources::pixmaps::new_pixmap_table;
use crate::resources::{
    AtomTable, CleanupRequest, ColormapTable, FocusState, FontTable, GcTable, Host, HostList,
    PixmapTable, ResourceKind, ResourceTracker, SelectionTable,
};
use crate::windows::WindowManager;
use extensions::{BigRequests, ExtensionQueries, ExtensionTable, ScreenSaver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The main X11 server
pub struct Server {
    config: ServerConfig,
    info: ServerInfo,

    pub atoms: AtomTable,
    pub windows: WindowManager,
    pub gcs: GcTable,
    pub pixmaps: PixmapTable,
    pub colormaps: ColormapTable,
    pub fonts: FontTable,
    pub hosts: HostList,
    pub selections: SelectionTable,
    pub focus: FocusState,
    pub extensions: ExtensionTable,

    /// Creates the backing surface of every window and pixmap
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub font_metrics: Arc<dyn FontMetrics>,

    tracker: Mutex<ResourceTracker>,
    dispatcher: Dispatcher,
}

impl Server {
    /// A server drawing into memory with the built-in fixed fonts.
    pub fn new(config: ServerConfig) -> X11Result<Self> {
        Self::with_backend(
            config,
            Arc::new(MemorySurfaceFactory),
            Arc::new(FixedFontMetrics),
        )
    }

    pub fn with_backend(
        config: ServerConfig,
        surfaces: Arc<dyn SurfaceFactory>,
        font_metrics: Arc<dyn FontMetrics>,
    ) -> X11Result<Self> {
        let info = ServerInfo::new(config.screen_width, config.screen_height);
        let windows = WindowManager::new(
            config.screen_width,
            config.screen_height,
            Arc::clone(&surfaces),
        )?;

        let hosts = HostList::new(!config.hosts.is_empty());
        for &ip in &config.hosts {
            hosts.add(Host::from_ip(ip));
        }

        let mut extensions = ExtensionTable::new();
        let big_requests = extensions.register(extensions::BIG_REQUESTS);
        let screen_saver = extensions.register(extensions::MIT_SCREEN_SAVER);

        let mut dispatcher = Dispatcher::new();
        handlers::register_core(&mut dispatcher);
        dispatcher.register(Arc::new(ExtensionQueries));
        dispatcher.register(Arc::new(BigRequests::new(big_requests)));
        dispatcher.register(Arc::new(ScreenSaver::new(screen_saver)));

        log::debug!(
            "Server ready: {}x{}, {} request handlers",
            config.screen_width,
            config.screen_height,
            dispatcher.registered().len()
        );

        Ok(Server {
            config,
            info,
            atoms: AtomTable::new(),
            windows,
            gcs: new_gc_table(),
            pixmaps: new_pixmap_table(),
            colormaps: new_colormap_table(),
            fonts: new_font_table(),
            hosts,
            selections: SelectionTable::new(),
            focus: FocusState::new(),
            extensions,
            surfaces,
            font_metrics,
            tracker: Mutex::new(ResourceTracker::new()),
            dispatcher,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Server time in milliseconds
    pub fn timestamp(&self) -> u32 {
        self.windows.timestamp()
    }

    fn tracker(&self) -> MutexGuard<'_, ResourceTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_client(&self) -> u32 {
        self.tracker().register_client()
    }

    pub fn client_count(&self) -> usize {
        self.tracker().client_count()
    }

    /// Record that `client_id` created a resource.
    pub fn track(&self, client_id: u32, kind: ResourceKind, id: u32) {
        self.tracker().track(client_id, kind, id);
    }

    pub fn untrack(&self, kind: ResourceKind, id: u32) {
        self.tracker().untrack(kind, id);
    }

    /// Destroy a window and its subtree, then forget everything that
    /// referred to the destroyed windows.
    pub fn destroy_window(&self, id: u32) -> X11Result<()> {
        let gone = self.windows.with_tree(|tree| tree.destroy(id))?;
        self.forget_windows(&gone);
        Ok(())
    }

    pub fn destroy_subwindows(&self, id: u32) -> X11Result<()> {
        let gone = self.windows.with_tree(|tree| tree.destroy_subwindows(id))?;
        self.forget_windows(&gone);
        Ok(())
    }

    fn forget_windows(&self, gone: &[u32]) {
        let mut tracker = self.tracker();
        for &window in gone {
            tracker.untrack(ResourceKind::Window, window);
            self.selections.drop_window(window);
            self.focus.window_gone(window);
        }
    }

    /// Free everything a disconnected client left behind.
    pub fn client_gone(&self, client_id: u32) {
        let cleanup = self.tracker().unregister_client(client_id);
        let count = cleanup.len();
        for request in cleanup {
            match request {
                // A window may already be gone along with an ancestor
                CleanupRequest::DestroyWindow(id) => {
                    if let Err(e) = self.destroy_window(id) {
                        log::debug!("Cleanup of window 0x{:08x}: {}", id, e);
                    }
                }
                CleanupRequest::FreePixmap(id) => {
                    self.pixmaps.remove(id);
                }
                CleanupRequest::FreeGC(id) => {
                    self.gcs.remove(id);
                }
                CleanupRequest::CloseFont(id) => {
                    self.fonts.remove(id);
                }
                CleanupRequest::FreeColormap(id) => {
                    if id != DEFAULT_COLORMAP_ID {
                        self.colormaps.remove(id);
                    }
                }
            }
        }
        self.windows.with_tree(|tree| tree.remove_client(client_id));
        self.selections.drop_client(client_id);
        log::debug!("Client {}: {} resources freed", client_id, count);
    }

    pub fn drawable_exists(&self, id: u32) -> bool {
        self.windows.with_tree(|tree| tree.contains(id)) || self.pixmaps.contains(id)
    }

    /// Run `f` on the surface of a window or pixmap.
    pub fn with_drawable<R>(&self, id: u32, f: impl FnOnce(&mut dyn Surface) -> R) -> X11Result<R> {
        if self.windows.with_tree(|tree| tree.contains(id)) {
            return self
                .windows
                .with_tree(|tree| tree.surface_mut(id).map(f))
                .map_err(|e| match e.code {
                    crate::protocol::ErrorCode::Window => X11Error::bad_drawable(id),
                    _ => e,
                });
        }
        self.pixmaps
            .with_mut(id, |p| f(p.surface.as_mut()))
            .map_err(|_| X11Error::bad_drawable(id))
    }

    /// Current contents of a pixmap, used to tile window backgrounds.
    pub fn pixmap_pixels(&self, id: u32) -> X11Result<PixelBuffer> {
        self.pixmaps.with(id, |p| {
            p.surface
                .read_pixels(Rect::new(0, 0, p.width as i32, p.height as i32))
        })
    }
}
