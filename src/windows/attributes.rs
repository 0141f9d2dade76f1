//! Window attribute and configure value lists

use super::window::Paint;
use crate::backend::PixelBuffer;
use crate::protocol::{Gravity, Packet, X11Error, X11Result};

/// CreateWindow / ChangeWindowAttributes value-mask bits
pub mod cw {
    pub const BACK_PIXMAP: u32 = 1 << 0;
    pub const BACK_PIXEL: u32 = 1 << 1;
    pub const BORDER_PIXMAP: u32 = 1 << 2;
    pub const BORDER_PIXEL: u32 = 1 << 3;
    pub const BIT_GRAVITY: u32 = 1 << 4;
    pub const WIN_GRAVITY: u32 = 1 << 5;
    pub const BACKING_STORE: u32 = 1 << 6;
    pub const BACKING_PLANES: u32 = 1 << 7;
    pub const BACKING_PIXEL: u32 = 1 << 8;
    pub const OVERRIDE_REDIRECT: u32 = 1 << 9;
    pub const SAVE_UNDER: u32 = 1 << 10;
    pub const EVENT_MASK: u32 = 1 << 11;
    pub const DONT_PROPAGATE: u32 = 1 << 12;
    pub const COLORMAP: u32 = 1 << 13;
    pub const CURSOR: u32 = 1 << 14;
    pub const ALL: u32 = (1 << 15) - 1;
}

/// ConfigureWindow value-mask bits
pub mod config {
    pub const X: u16 = 1 << 0;
    pub const Y: u16 = 1 << 1;
    pub const WIDTH: u16 = 1 << 2;
    pub const HEIGHT: u16 = 1 << 3;
    pub const BORDER_WIDTH: u16 = 1 << 4;
    pub const SIBLING: u16 = 1 << 5;
    pub const STACK_MODE: u16 = 1 << 6;
    pub const ALL: u16 = (1 << 7) - 1;
}

const BACKGROUND_NONE: u32 = 0;
const BACKGROUND_PARENT_RELATIVE: u32 = 1;
const BORDER_COPY_FROM_PARENT: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSetting {
    None,
    ParentRelative,
    Paint(Paint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorderSetting {
    CopyFromParent,
    Paint(Paint),
}

/// Parsed attribute list; `None` leaves the attribute alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowAttributes {
    pub background: Option<BackgroundSetting>,
    pub border: Option<BorderSetting>,
    pub bit_gravity: Option<u8>,
    pub win_gravity: Option<u8>,
    pub backing_store: Option<u8>,
    pub backing_planes: Option<u32>,
    pub backing_pixel: Option<u32>,
    pub override_redirect: Option<bool>,
    pub save_under: Option<bool>,
    pub event_mask: Option<u32>,
    pub do_not_propagate: Option<u32>,
    pub colormap: Option<u32>,
    pub cursor: Option<u32>,
}

impl WindowAttributes {
    /// Read one CARD32 per mask bit, lowest bit first. `pixmap` resolves a
    /// background or border pixmap id to its current pixels.
    pub fn read(
        mask: u32,
        packet: &mut Packet,
        mut pixmap: impl FnMut(u32) -> X11Result<PixelBuffer>,
    ) -> X11Result<Self> {
        if mask & !cw::ALL != 0 {
            return Err(X11Error::bad_value(mask));
        }
        let mut attrs = WindowAttributes::default();
        for bit in 0..15 {
            let flag = 1u32 << bit;
            if mask & flag == 0 {
                continue;
            }
            let v = packet.read_card32()?;
            match flag {
                cw::BACK_PIXMAP => {
                    attrs.background = Some(match v {
                        BACKGROUND_NONE => BackgroundSetting::None,
                        BACKGROUND_PARENT_RELATIVE => BackgroundSetting::ParentRelative,
                        id => BackgroundSetting::Paint(Paint::Tile(pixmap(id)?)),
                    })
                }
                // A pixel overrides a pixmap given in the same list
                cw::BACK_PIXEL => attrs.background = Some(BackgroundSetting::Paint(Paint::Pixel(v))),
                cw::BORDER_PIXMAP => {
                    attrs.border = Some(match v {
                        BORDER_COPY_FROM_PARENT => BorderSetting::CopyFromParent,
                        id => BorderSetting::Paint(Paint::Tile(pixmap(id)?)),
                    })
                }
                cw::BORDER_PIXEL => attrs.border = Some(BorderSetting::Paint(Paint::Pixel(v))),
                cw::BIT_GRAVITY => attrs.bit_gravity = Some(gravity(v)?),
                cw::WIN_GRAVITY => attrs.win_gravity = Some(gravity(v)?),
                cw::BACKING_STORE => {
                    if v > 2 {
                        return Err(X11Error::bad_value(v));
                    }
                    attrs.backing_store = Some(v as u8)
                }
                cw::BACKING_PLANES => attrs.backing_planes = Some(v),
                cw::BACKING_PIXEL => attrs.backing_pixel = Some(v),
                cw::OVERRIDE_REDIRECT => attrs.override_redirect = Some(boolean(v)?),
                cw::SAVE_UNDER => attrs.save_under = Some(boolean(v)?),
                cw::EVENT_MASK => attrs.event_mask = Some(v),
                cw::DONT_PROPAGATE => attrs.do_not_propagate = Some(v),
                cw::COLORMAP => attrs.colormap = Some(v),
                cw::CURSOR => attrs.cursor = Some(v),
                _ => {}
            }
        }
        Ok(attrs)
    }
}

fn gravity(v: u32) -> X11Result<u8> {
    if v > 255 {
        return Err(X11Error::bad_value(v));
    }
    Gravity::from_u8(v as u8)
        .map(|g| g as u8)
        .ok_or_else(|| X11Error::bad_value(v))
}

fn boolean(v: u32) -> X11Result<bool> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(X11Error::bad_value(v)),
    }
}

/// Parsed ConfigureWindow list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub border_width: Option<u16>,
    pub sibling: Option<u32>,
    pub stack_mode: Option<u32>,
}

impl WindowChanges {
    pub fn read(mask: u16, packet: &mut Packet) -> X11Result<Self> {
        if mask & !config::ALL != 0 {
            return Err(X11Error::bad_value(mask as u32));
        }
        let mut changes = WindowChanges::default();
        for bit in 0..7 {
            let flag = 1u16 << bit;
            if mask & flag == 0 {
                continue;
            }
            let v = packet.read_card32()?;
            match flag {
                config::X => changes.x = Some(v as u16 as i16 as i32),
                config::Y => changes.y = Some(v as u16 as i16 as i32),
                config::WIDTH | config::HEIGHT => {
                    let size = v as u16;
                    if size == 0 {
                        return Err(X11Error::bad_value(v));
                    }
                    if flag == config::WIDTH {
                        changes.width = Some(size as i32);
                    } else {
                        changes.height = Some(size as i32);
                    }
                }
                config::BORDER_WIDTH => changes.border_width = Some(v as u16),
                config::SIBLING => changes.sibling = Some(v),
                config::STACK_MODE => changes.stack_mode = Some(v),
                _ => {}
            }
        }
        // A sibling means nothing without a stack mode
        if changes.sibling.is_some() && changes.stack_mode.is_none() {
            return Err(X11Error::bad_match());
        }
        Ok(changes)
    }
}
