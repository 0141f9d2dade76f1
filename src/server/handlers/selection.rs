//! Selection ownership and input focus requests

use crate::protocol::{Atom, Event, HandlerResult, Packet, RequestOpcode, X11Error, X11Result};
use crate::resources::selections::FOCUS_POINTER_ROOT;
use crate::resources::OwnerChange;
use crate::server::dispatcher::{RequestContext, RequestHandler};
use crate::server::Server;

/// CurrentTime in requests that carry a timestamp
const CURRENT_TIME: u32 = 0;

pub struct SelectionRequests;

impl RequestHandler for SelectionRequests {
    fn opcodes(&self) -> &[u8] {
        &[22, 23, 24, 42, 43]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::SetSelectionOwner) => handle_set_selection_owner(ctx, packet),
            Some(RequestOpcode::GetSelectionOwner) => handle_get_selection_owner(ctx, packet),
            Some(RequestOpcode::ConvertSelection) => handle_convert_selection(ctx, packet),
            Some(RequestOpcode::SetInputFocus) => handle_set_input_focus(ctx, packet),
            Some(RequestOpcode::GetInputFocus) => {
                let focus = ctx.server.focus.get();
                ctx.reply.set_detail(focus.revert_to);
                ctx.reply.write_card32(focus.window);
                ctx.reply.write_padding(20);
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn resolve_time(server: &Server, time: u32) -> u32 {
    if time == CURRENT_TIME {
        server.timestamp()
    } else {
        time
    }
}

fn check_window(server: &Server, window: u32) -> X11Result<()> {
    server.windows.with_tree(|t| t.get(window).map(|_| ()))
}

fn handle_set_selection_owner(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let server = ctx.server;
    let owner = packet.read_card32()?;
    let selection = server.atoms.validate(Atom(packet.read_card32()?))?;
    let time = resolve_time(server, packet.read_card32()?);
    if owner != 0 {
        check_window(server, owner)?;
    }

    match server.selections.set_owner(selection, owner, time, ctx.sink()) {
        OwnerChange::Rejected => {
            log::debug!("SetSelectionOwner {}: stale time {}", selection.get(), time);
        }
        OwnerChange::Unchanged => {}
        OwnerChange::Changed(previous) => {
            if let Some(previous) = previous.filter(|p| p.window != owner) {
                previous.client.send_event(&Event::SelectionClear {
                    time,
                    owner: previous.window,
                    selection,
                });
            }
        }
    }
    Ok(())
}

fn handle_get_selection_owner(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let selection = ctx.server.atoms.validate(Atom(packet.read_card32()?))?;
    let owner = ctx.server.selections.owner(selection).map_or(0, |o| o.window);
    ctx.reply.write_card32(owner);
    ctx.reply.write_padding(20);
    Ok(())
}

/// The owner is asked to convert with a SelectionRequest; without an owner
/// the requestor is told right away that nothing was stored.
fn handle_convert_selection(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let server = ctx.server;
    let requestor = packet.read_card32()?;
    let selection = server.atoms.validate(Atom(packet.read_card32()?))?;
    let target = server.atoms.validate(Atom(packet.read_card32()?))?;
    let property = Atom(packet.read_card32()?);
    if property != Atom::NONE {
        server.atoms.validate(property)?;
    }
    let time = resolve_time(server, packet.read_card32()?);
    check_window(server, requestor)?;

    match server.selections.owner(selection) {
        Some(owner) => owner.client.send_event(&Event::SelectionRequest {
            time,
            owner: owner.window,
            requestor,
            selection,
            target,
            property,
        }),
        None => ctx.sink().send_event(&Event::SelectionNotify {
            time,
            requestor,
            selection,
            target,
            property: Atom::NONE,
        }),
    }
    Ok(())
}

/// RevertTo values: None, PointerRoot, Parent
const MAX_REVERT_TO: u8 = 2;

fn handle_set_input_focus(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let revert_to = packet.minor_opcode();
    let focus = packet.read_card32()?;
    let _time = packet.read_card32()?;
    if revert_to > MAX_REVERT_TO {
        return Err(X11Error::bad_value(revert_to as u32).into());
    }
    if focus != 0 && focus != FOCUS_POINTER_ROOT {
        check_window(ctx.server, focus)?;
    }
    ctx.server.focus.set(focus, revert_to);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, ROOT_WINDOW_ID};
    use crate::server::handlers::harness::{card32_at, error_code, Body, Session};

    const W: u32 = 0x01f0_0001;

    #[test]
    fn test_ownership_moves_with_clear() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 5, 5);
        s.create_window(W + 1, ROOT_WINDOW_ID, 0, 0, 5, 5);
        let (other, other_out) = s.peer(2);

        let set = |owner: u32, time: u32| {
            Body::new().card32(owner).card32(Atom::PRIMARY.get()).card32(time)
        };
        assert!(s.request(22, 0, set(W, 100)).is_empty());
        let reply = s.request(23, 0, Body::new().card32(Atom::PRIMARY.get()));
        assert_eq!(card32_at(&reply, 8), W);

        // Older timestamp is ignored
        s.send_as(&other, 22, 0, set(W + 1, 50));
        assert!(other_out.take().is_empty());
        let reply = s.request(23, 0, Body::new().card32(Atom::PRIMARY.get()));
        assert_eq!(card32_at(&reply, 8), W);

        s.send_as(&other, 22, 0, set(W + 1, 200));
        let clear = s.out.take();
        assert_eq!(clear.len(), 32);
        assert_eq!(clear[0], 29);
        assert_eq!(card32_at(&clear, 4), 200);
        assert_eq!(card32_at(&clear, 8), W);
    }

    #[test]
    fn test_convert_without_owner_notifies_requestor() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 5, 5);
        let body = Body::new()
            .card32(W)
            .card32(Atom::PRIMARY.get())
            .card32(Atom::STRING.get())
            .card32(Atom::WM_NAME.get())
            .card32(0);
        let out = s.request(24, 0, body);
        assert_eq!(out[0], 31);
        assert_eq!(card32_at(&out, 8), W);
        assert_eq!(card32_at(&out, 20), 0);
    }

    #[test]
    fn test_convert_forwards_to_owner() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 5, 5);
        s.request(22, 0, Body::new().card32(W).card32(Atom::PRIMARY.get()).card32(0));
        let (other, other_out) = s.peer(2);
        let body = Body::new()
            .card32(ROOT_WINDOW_ID)
            .card32(Atom::PRIMARY.get())
            .card32(Atom::STRING.get())
            .card32(Atom::WM_NAME.get())
            .card32(5);
        s.send_as(&other, 24, 0, body);
        assert!(other_out.take().is_empty());
        let request = s.out.take();
        assert_eq!(request[0], 30);
        assert_eq!(card32_at(&request, 8), W);
        assert_eq!(card32_at(&request, 12), ROOT_WINDOW_ID);
    }

    #[test]
    fn test_input_focus() {
        let s = Session::new();
        s.create_window(W, ROOT_WINDOW_ID, 0, 0, 5, 5);
        assert!(s.request(42, 2, Body::new().card32(W).card32(0)).is_empty());
        let reply = s.request(43, 0, Body::new());
        assert_eq!(reply[1], 2);
        assert_eq!(card32_at(&reply, 8), W);

        let out = s.request(42, 0, Body::new().card32(0x999).card32(0));
        assert_eq!(error_code(&out), Some(ErrorCode::Window as u8));
        let out = s.request(42, 3, Body::new().card32(W).card32(0));
        assert_eq!(error_code(&out), Some(ErrorCode::Value as u8));

        // Destroying the focus window reverts to PointerRoot
        s.request(4, 0, Body::new().card32(W));
        let reply = s.request(43, 0, Body::new());
        assert_eq!(card32_at(&reply, 8), FOCUS_POINTER_ROOT);
    }
}
