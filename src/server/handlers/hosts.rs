//! Host access control requests

use crate::protocol::{HandlerResult, Packet, RequestOpcode, X11Error};
use crate::resources::hosts::{
    FAMILY_CHAOS, FAMILY_DECNET, FAMILY_INTERNET, FAMILY_INTERNET6, FAMILY_SERVER_INTERPRETED,
};
use crate::resources::Host;
use crate::server::dispatcher::{RequestContext, RequestHandler};

/// ChangeHosts mode
const HOST_INSERT: u8 = 0;
const HOST_DELETE: u8 = 1;

pub struct HostRequests;

impl RequestHandler for HostRequests {
    fn opcodes(&self) -> &[u8] {
        &[109, 110, 111]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        match RequestOpcode::from_u8(packet.major_opcode()) {
            Some(RequestOpcode::ChangeHosts) => handle_change_hosts(ctx, packet),
            Some(RequestOpcode::ListHosts) => {
                let hosts = ctx.server.hosts.list();
                ctx.reply.set_detail(ctx.server.hosts.access_control_enabled() as u8);
                ctx.reply.write_card16(hosts.len() as u16);
                ctx.reply.write_padding(22);
                for host in &hosts {
                    ctx.reply.write_byte(host.family);
                    ctx.reply.write_padding(1);
                    ctx.reply.write_card16(host.address.len() as u16);
                    ctx.reply.write_padded_bytes(&host.address);
                }
                Ok(())
            }
            Some(RequestOpcode::SetAccessControl) => {
                let mode = packet.minor_opcode();
                if mode > 1 {
                    return Err(X11Error::bad_value(mode as u32).into());
                }
                ctx.server.hosts.set_access_control(mode == 1);
                log::info!(
                    "Access control {} by client {}",
                    if mode == 1 { "enabled" } else { "disabled" },
                    ctx.client_id()
                );
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn handle_change_hosts(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let mode = packet.minor_opcode();
    let family = packet.read_byte()?;
    packet.read_padding(1)?;
    let len = packet.read_card16()? as usize;
    let address = packet.read_padded_bytes(len)?;

    let valid = match family {
        FAMILY_INTERNET => len == 4,
        FAMILY_INTERNET6 => len == 16,
        FAMILY_DECNET | FAMILY_CHAOS | FAMILY_SERVER_INTERPRETED => true,
        _ => false,
    };
    if !valid {
        return Err(X11Error::bad_value(family as u32).into());
    }

    let host = Host::new(family, address);
    match mode {
        HOST_INSERT => ctx.server.hosts.add(host),
        HOST_DELETE => {
            if ctx.server.hosts.remove(&host) {
                log::info!("Host removed from access list: {:?}", host);
            }
        }
        _ => return Err(X11Error::bad_value(mode as u32).into()),
    }
    Ok(())
}
