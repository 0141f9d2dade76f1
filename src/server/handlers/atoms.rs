//! Atom requests

use crate::protocol::{string_to_latin1, Atom, HandlerResult, Packet, RequestOpcode, X11Error};
use crate::server::dispatcher::{RequestContext, RequestHandler};

pub struct AtomRequests;

impl RequestHandler for AtomRequests {
    fn opcodes(&self) -> &[u8] {
        &[
            RequestOpcode::InternAtom as u8,
            RequestOpcode::GetAtomName as u8,
        ]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::InternAtom) => handle_intern_atom(ctx, packet),
            Some(RequestOpcode::GetAtomName) => handle_get_atom_name(ctx, packet),
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

/// With only-if-exists set, an unknown name answers None instead of being
/// interned.
fn handle_intern_atom(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let only_if_exists = packet.minor_opcode() != 0;
    let len = packet.read_card16()? as usize;
    packet.read_padding(2)?;
    let name = packet.read_padded_string(len)?;

    let atoms = &ctx.server.atoms;
    let atom = if only_if_exists {
        atoms.lookup(&name).unwrap_or(Atom::NONE)
    } else {
        atoms.intern(&name)
    };
    log::debug!("InternAtom {:?} -> {}", name, atom.get());

    ctx.reply.write_card32(atom.get());
    ctx.reply.write_padding(20);
    Ok(())
}

fn handle_get_atom_name(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let atom = Atom(packet.read_card32()?);
    let name = string_to_latin1(&ctx.server.atoms.name(atom)?);

    ctx.reply.write_card16(name.len() as u16);
    ctx.reply.write_padding(22);
    ctx.reply.write_padded_bytes(&name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;
    use crate::server::handlers::harness::{card16_at, card32_at, error_code, Body, Session};

    fn intern(s: &Session, name: &str, only_if_exists: bool) -> u32 {
        let body = Body::new()
            .card16(name.len() as u16)
            .card16(0)
            .padded(name.as_bytes());
        card32_at(&s.request(16, only_if_exists as u8, body), 8)
    }

    #[test]
    fn test_intern_is_stable() {
        let s = Session::new();
        assert_eq!(intern(&s, "_NET_WM_NAME", true), 0);
        let atom = intern(&s, "_NET_WM_NAME", false);
        assert!(atom >= Atom::FIRST_USER_ATOM);
        assert_eq!(intern(&s, "_NET_WM_NAME", false), atom);
        assert_eq!(intern(&s, "_NET_WM_NAME", true), atom);
        assert_eq!(intern(&s, "WM_NAME", true), Atom::WM_NAME.get());
    }

    #[test]
    fn test_get_atom_name() {
        let s = Session::new();
        let reply = s.request(17, 0, Body::new().card32(Atom::STRING.get()));
        assert_eq!(card16_at(&reply, 8), 6);
        assert_eq!(&reply[32..38], b"STRING");

        for bad in [0, 0x1234] {
            let reply = s.request(17, 0, Body::new().card32(bad));
            assert_eq!(error_code(&reply), Some(ErrorCode::Atom as u8));
            assert_eq!(card32_at(&reply, 4), bad);
        }
    }

    #[test]
    fn test_atom_name_length_counts_latin1_bytes() {
        let s = Session::new();
        let body = Body::new().card16(1).card16(0).padded(&[0xe9]);
        let atom = card32_at(&s.request(16, 0, body), 8);
        assert_eq!(s.server.atoms.name(Atom(atom)).unwrap(), "\u{e9}");

        let reply = s.request(17, 0, Body::new().card32(atom));
        assert_eq!(card16_at(&reply, 8), 1);
        assert_eq!(reply[32], 233);
        assert_eq!(reply.len(), 36);
    }
}
