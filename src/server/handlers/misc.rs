//! Requests answered from fixed server state
//!
//! There is no real input device behind the server. Keyboard, pointer and
//! screen saver queries report a plain US layout and default controls, and
//! cursors and grabs are accepted without being tracked.

use crate::protocol::{HandlerResult, Packet, RequestOpcode, X11Error};
use crate::server::dispatcher::{RequestContext, RequestHandler};

const KEYSYMS_PER_KEYCODE: u8 = 2;
const KEYCODES_PER_MODIFIER: u8 = 2;

/// Keycodes of Shift, Lock, Control and Mod1..Mod5, two per modifier
const MODIFIER_MAP: [u8; 16] = [50, 62, 66, 0, 37, 105, 64, 108, 77, 0, 0, 0, 133, 134, 0, 0];

/// Unshifted and shifted keysyms of the keys that have any
fn keysyms(keycode: u8) -> [u32; 2] {
    const DIGITS: &[u8; 10] = b"1234567890";
    const SHIFTED_DIGITS: &[u8; 10] = b"!@#$%^&*()";
    const ROWS: [(u8, &[u8]); 3] = [(24, b"qwertyuiop"), (38, b"asdfghjkl"), (52, b"zxcvbnm")];

    if (10..20).contains(&keycode) {
        let i = (keycode - 10) as usize;
        return [DIGITS[i] as u32, SHIFTED_DIGITS[i] as u32];
    }
    for (first, letters) in ROWS {
        let Some(offset) = keycode.checked_sub(first) else {
            continue;
        };
        if let Some(&c) = letters.get(offset as usize) {
            return [c as u32, c.to_ascii_uppercase() as u32];
        }
    }
    let sym = match keycode {
        9 => 0xff1b,
        22 => 0xff08,
        23 => 0xff09,
        36 => 0xff0d,
        37 => 0xffe3,
        50 => 0xffe1,
        62 => 0xffe2,
        64 => 0xffe9,
        65 => 0x0020,
        66 => 0xffe5,
        77 => 0xff7f,
        105 => 0xffe4,
        108 => 0xffea,
        111 => 0xff52,
        113 => 0xff51,
        114 => 0xff53,
        116 => 0xff54,
        119 => 0xffff,
        133 => 0xffeb,
        134 => 0xffec,
        _ => 0,
    };
    [sym, 0]
}

pub struct MiscRequests;

impl RequestHandler for MiscRequests {
    fn opcodes(&self) -> &[u8] {
        &[6, 36, 37, 44, 93, 94, 95, 101, 103, 104, 106, 107, 108, 119, 127]
    }

    fn handle(&self, ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
        let Some(opcode) = RequestOpcode::from_u8(packet.major_opcode()) else {
            return Err(X11Error::bad_request().into());
        };
        match opcode {
            RequestOpcode::ChangeSaveSet => {
                let mode = packet.minor_opcode();
                let window = packet.read_card32()?;
                if mode > 1 {
                    return Err(X11Error::bad_value(mode as u32).into());
                }
                ctx.server.windows.with_tree(|tree| tree.get(window).map(|_| ()))?;
                Ok(())
            }
            RequestOpcode::GrabServer | RequestOpcode::UngrabServer => {
                log::debug!("Client {}: {}", ctx.client_id(), opcode.as_str());
                Ok(())
            }
            RequestOpcode::QueryKeymap => {
                ctx.reply.write_padding(32);
                Ok(())
            }
            RequestOpcode::CreateCursor | RequestOpcode::CreateGlyphCursor => {
                let cid = packet.read_card32()?;
                packet.read_rest()?;
                log::debug!("Cursor 0x{:08x} accepted", cid);
                Ok(())
            }
            RequestOpcode::FreeCursor => {
                packet.read_card32()?;
                Ok(())
            }
            RequestOpcode::GetKeyboardMapping => handle_get_keyboard_mapping(ctx, packet),
            RequestOpcode::GetKeyboardControl => {
                ctx.reply.set_detail(1);
                ctx.reply.write_card32(0);
                ctx.reply.write_byte(0);
                ctx.reply.write_byte(50);
                ctx.reply.write_card16(400);
                ctx.reply.write_card16(100);
                ctx.reply.write_padding(2);
                ctx.reply.write_padding(32);
                Ok(())
            }
            RequestOpcode::Bell => {
                let percent = packet.minor_opcode() as i8;
                if !(-100..=100).contains(&percent) {
                    return Err(X11Error::bad_value(percent as u32).into());
                }
                Ok(())
            }
            RequestOpcode::GetPointerControl => {
                ctx.reply.write_card16(2);
                ctx.reply.write_card16(1);
                ctx.reply.write_card16(4);
                ctx.reply.write_padding(18);
                Ok(())
            }
            RequestOpcode::SetScreenSaver => {
                let timeout = packet.read_int16()?;
                let interval = packet.read_int16()?;
                let prefer_blanking = packet.read_byte()?;
                let allow_exposures = packet.read_byte()?;
                packet.read_padding(2)?;
                if timeout < -1 {
                    return Err(X11Error::bad_value(timeout as u32).into());
                }
                if interval < -1 {
                    return Err(X11Error::bad_value(interval as u32).into());
                }
                if prefer_blanking > 2 || allow_exposures > 2 {
                    return Err(X11Error::bad_value(prefer_blanking.max(allow_exposures) as u32).into());
                }
                Ok(())
            }
            RequestOpcode::GetScreenSaver => {
                ctx.reply.write_padding(24);
                Ok(())
            }
            RequestOpcode::GetModifierMapping => {
                ctx.reply.set_detail(KEYCODES_PER_MODIFIER);
                ctx.reply.write_padding(24);
                ctx.reply.write_bytes(&MODIFIER_MAP);
                Ok(())
            }
            RequestOpcode::NoOperation => {
                packet.read_rest()?;
                Ok(())
            }
            _ => Err(X11Error::bad_request().into()),
        }
    }
}

fn handle_get_keyboard_mapping(ctx: &mut RequestContext<'_>, packet: &mut Packet) -> HandlerResult {
    let first = packet.read_byte()?;
    let count = packet.read_byte()?;
    packet.read_padding(2)?;

    let info = ctx.server.info();
    let last = first as u32 + count as u32;
    if first < info.min_keycode {
        return Err(X11Error::bad_value(first as u32).into());
    }
    if last > info.max_keycode as u32 + 1 {
        return Err(X11Error::bad_value(count as u32).into());
    }

    ctx.reply.set_detail(KEYSYMS_PER_KEYCODE);
    ctx.reply.write_padding(24);
    for keycode in first as u32..last {
        for sym in keysyms(keycode as u8) {
            ctx.reply.write_card32(sym);
        }
    }
    Ok(())
}
