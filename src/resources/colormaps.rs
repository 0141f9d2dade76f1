//! Colormaps
//!
//! The only visual is TrueColor, so a colormap holds no cells: a pixel is the
//! colour itself and allocation always succeeds.

use super::table::ResourceTable;
use crate::protocol::{X11Error, DEFAULT_COLORMAP_ID, ROOT_VISUAL_ID};

#[derive(Debug, Clone)]
pub struct Colormap {
    pub id: u32,
    pub visual: u32,
}

/// 16-bit-per-channel colour as carried by the color requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb16 {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl Rgb16 {
    /// Spread 8-bit channels over 16 bits (`0xab` → `0xabab`).
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        let dupe = |c: u8| (c as u16) << 8 | c as u16;
        Rgb16 {
            red: dupe(r),
            green: dupe(g),
            blue: dupe(b),
        }
    }

    pub fn from_pixel(pixel: u32) -> Self {
        Rgb16::from_rgb8((pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8)
    }

    pub fn to_pixel(self) -> u32 {
        0xff00_0000
            | ((self.red >> 8) as u32) << 16
            | ((self.green >> 8) as u32) << 8
            | (self.blue >> 8) as u32
    }

    /// What the hardware actually shows for this colour.
    pub fn visual(self) -> Rgb16 {
        Rgb16::from_pixel(self.to_pixel())
    }
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("magenta", 0xff00ff),
    ("gray", 0xbebebe),
    ("grey", 0xbebebe),
    ("darkgray", 0xa9a9a9),
    ("darkgrey", 0xa9a9a9),
    ("lightgray", 0xd3d3d3),
    ("lightgrey", 0xd3d3d3),
    ("dimgray", 0x696969),
    ("slategray", 0x708090),
    ("orange", 0xffa500),
    ("purple", 0xa020f0),
    ("brown", 0xa52a2a),
    ("pink", 0xffc0cb),
    ("navy", 0x000080),
    ("navyblue", 0x000080),
    ("maroon", 0xb03060),
    ("gold", 0xffd700),
    ("beige", 0xf5f5dc),
    ("wheat", 0xf5deb3),
    ("tan", 0xd2b48c),
    ("khaki", 0xf0e68c),
    ("salmon", 0xfa8072),
    ("coral", 0xff7f50),
    ("tomato", 0xff6347),
    ("orchid", 0xda70d6),
    ("violet", 0xee82ee),
    ("turquoise", 0x40e0d0),
    ("skyblue", 0x87ceeb),
    ("steelblue", 0x4682b4),
    ("royalblue", 0x4169e1),
    ("darkblue", 0x00008b),
    ("darkgreen", 0x006400),
    ("darkred", 0x8b0000),
    ("forestgreen", 0x228b22),
    ("seagreen", 0x2e8b57),
    ("limegreen", 0x32cd32),
    ("ivory", 0xfffff0),
    ("linen", 0xfaf0e6),
    ("snow", 0xfffafa),
    ("gainsboro", 0xdcdcdc),
    ("whitesmoke", 0xf5f5f5),
];

/// Look up an X colour name. Case and spaces are ignored; `#rgb`, `#rrggbb`
/// and `#rrrrggggbbbb` forms are accepted too.
pub fn lookup_color(name: &str) -> Option<Rgb16> {
    let key: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if let Some(hex) = key.strip_prefix('#') {
        return parse_hex_color(hex);
    }

    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == key)
        .map(|&(_, rgb)| Rgb16::from_pixel(rgb))
}

fn parse_hex_color(hex: &str) -> Option<Rgb16> {
    if hex.is_empty() || hex.len() % 3 != 0 || hex.len() > 12 {
        return None;
    }
    let digits = hex.len() / 3;
    let channel = |i: usize| -> Option<u16> {
        let v = u16::from_str_radix(&hex[i * digits..(i + 1) * digits], 16).ok()?;
        // Scale the short forms up to 16 bits by repeating the digits
        let bits = digits * 4;
        let mut out: u32 = 0;
        let mut filled = 0;
        while filled < 16 {
            out = (out << bits) | v as u32;
            filled += bits;
        }
        Some((out >> (filled - 16)) as u16)
    };
    Some(Rgb16 {
        red: channel(0)?,
        green: channel(1)?,
        blue: channel(2)?,
    })
}

pub type ColormapTable = ResourceTable<Colormap>;

/// A colormap table holding the screen's default colormap.
pub fn new_colormap_table() -> ColormapTable {
    let table = ResourceTable::new(X11Error::bad_colormap);
    // Cannot clash in an empty table
    let _ = table.insert(
        DEFAULT_COLORMAP_ID,
        Colormap {
            id: DEFAULT_COLORMAP_ID,
            visual: ROOT_VISUAL_ID,
        },
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_colormap_exists() {
        let maps = new_colormap_table();
        assert!(maps.contains(DEFAULT_COLORMAP_ID));
        assert_eq!(maps.get(5).unwrap_err().bad_value, 5);
    }

    #[test]
    fn test_pixel_conversion() {
        let c = Rgb16 {
            red: 0xffff,
            green: 0x8000,
            blue: 0x00ff,
        };
        assert_eq!(c.to_pixel(), 0xffff_8000);
        assert_eq!(
            c.visual(),
            Rgb16 {
                red: 0xffff,
                green: 0x8080,
                blue: 0
            }
        );
    }

    #[test]
    fn test_named_colors() {
        assert_eq!(lookup_color("Red").unwrap().to_pixel(), 0xffff_0000);
        assert_eq!(lookup_color("Light Gray"), lookup_color("lightgrey"));
        assert_eq!(lookup_color("#f00").unwrap().red, 0xffff);
        assert_eq!(lookup_color("#00ff00").unwrap().green, 0xffff);
        assert_eq!(lookup_color("#123412341234").unwrap().blue, 0x1234);
        assert!(lookup_color("no such colour").is_none());
        assert!(lookup_color("#12").is_none());
    }
}
