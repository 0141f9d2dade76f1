//! End-to-end test driving the server with the x11rb client library

use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::COPY_DEPTH_FROM_PARENT;

use x11serve::server::listener::{bind_listener, serve};
use x11serve::server::X_TCP_PORT;
use x11serve::{Server, ServerConfig};

type TestResult = Result<(), Box<dyn Error>>;

/// Start a server on an ephemeral port and connect to it as display
/// `port - 6000`.
fn connect() -> Result<(RustConnection, usize), Box<dyn Error>> {
    let listener = bind_listener(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .map_err(|e| e.to_string())?;
    let port = listener.local_addr()?.port();
    let server = Arc::new(Server::new(ServerConfig::default()).unwrap());
    thread::spawn(move || serve(listener, server));

    let display = port
        .checked_sub(X_TCP_PORT)
        .ok_or("ephemeral port below the X port range")?;
    let (conn, screen) = RustConnection::connect(Some(&format!("127.0.0.1:{}", display)))?;
    Ok((conn, screen))
}

#[test]
fn test_setup_is_parsed() -> TestResult {
    let (conn, screen_num) = connect()?;
    let setup = conn.setup();
    assert_eq!(setup.protocol_major_version, 11);
    assert_eq!(setup.resource_id_base, 0x01f0_0000);
    assert_eq!(setup.min_keycode, 8);

    let screen = &setup.roots[screen_num];
    assert_eq!(screen.root, 3);
    assert_eq!(screen.default_colormap, 4);
    assert_eq!(screen.width_in_pixels, 1024);
    assert_eq!(screen.root_depth, 32);
    Ok(())
}

#[test]
fn test_window_lifecycle() -> TestResult {
    let (conn, screen_num) = connect()?;
    let screen = &conn.setup().roots[screen_num];
    let root = screen.root;

    let win = conn.generate_id()?;
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        win,
        root,
        40,
        30,
        200,
        120,
        2,
        WindowClass::INPUT_OUTPUT,
        0,
        &CreateWindowAux::new()
            .background_pixel(screen.white_pixel)
            .event_mask(EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY),
    )?;
    conn.map_window(win)?;
    conn.flush()?;

    let geometry = conn.get_geometry(win)?.reply()?;
    assert_eq!((geometry.x, geometry.y), (40, 30));
    assert_eq!((geometry.width, geometry.height), (200, 120));
    assert_eq!(geometry.border_width, 2);
    assert_eq!(geometry.root, root);

    let tree = conn.query_tree(root)?.reply()?;
    assert_eq!(tree.children, vec![win]);
    assert_eq!(tree.parent, 0);

    let attributes = conn.get_window_attributes(win)?.reply()?;
    assert_eq!(attributes.map_state, MapState::VIEWABLE);

    conn.configure_window(win, &ConfigureWindowAux::new().width(300))?;
    let geometry = conn.get_geometry(win)?.reply()?;
    assert_eq!(geometry.width, 300);

    conn.destroy_window(win)?;
    let tree = conn.query_tree(root)?.reply()?;
    assert!(tree.children.is_empty());
    Ok(())
}

#[test]
fn test_atoms_and_properties() -> TestResult {
    let (conn, screen_num) = connect()?;
    let root = conn.setup().roots[screen_num].root;

    let wm_name = conn.intern_atom(false, b"WM_NAME")?.reply()?.atom;
    assert_eq!(wm_name, u32::from(AtomEnum::WM_NAME));
    let utf8 = conn.intern_atom(false, b"UTF8_STRING")?.reply()?.atom;
    let name = conn.get_atom_name(utf8)?.reply()?;
    assert_eq!(name.name, b"UTF8_STRING");
    let missing = conn.intern_atom(true, b"NOT_INTERNED_ANYWHERE")?.reply()?.atom;
    assert_eq!(missing, 0);

    let win = conn.generate_id()?;
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        win,
        root,
        0,
        0,
        10,
        10,
        0,
        WindowClass::INPUT_OUTPUT,
        0,
        &CreateWindowAux::new(),
    )?;
    conn.change_property8(PropMode::REPLACE, win, wm_name, utf8, b"x11serve")?;
    conn.change_property8(PropMode::APPEND, win, wm_name, utf8, b" test")?;

    let prop = conn.get_property(false, win, wm_name, AtomEnum::ANY, 0, 64)?.reply()?;
    assert_eq!(prop.type_, utf8);
    assert_eq!(prop.format, 8);
    assert_eq!(prop.value, b"x11serve test");

    let listed = conn.list_properties(win)?.reply()?;
    assert_eq!(listed.atoms, vec![wm_name]);
    Ok(())
}

#[test]
fn test_errors_and_colors() -> TestResult {
    let (conn, screen_num) = connect()?;
    let colormap = conn.setup().roots[screen_num].default_colormap;

    let err = conn.get_geometry(0x0bad_0000)?.reply();
    assert!(err.is_err());

    let color = conn.alloc_color(colormap, 0xffff, 0x8080, 0)?.reply()?;
    assert_eq!(color.pixel, 0xffff_8000);

    let named = conn.lookup_color(colormap, b"blue")?.reply()?;
    assert_eq!((named.exact_red, named.exact_blue), (0, 0xffff));

    let focus = conn.get_input_focus()?.reply()?;
    assert_eq!(focus.focus, 1);
    Ok(())
}
