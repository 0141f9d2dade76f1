//! Core X11 protocol types
//!
//! These types represent the fundamental data types used in the X11 protocol.
//! Resource ids travel as plain `u32`; atoms get a newtype because they are
//! compared against the predefined set all over the server.

use std::fmt;

/// Byte order negotiated by the first handshake byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LSBFirst = 0,
    MSBFirst = 1,
}

impl ByteOrder {
    /// `'B'` selects MSB first, `'l'` LSB first, anything else is not X11.
    pub fn from_order_byte(byte: u8) -> Option<Self> {
        match byte {
            0x42 => Some(ByteOrder::MSBFirst),
            0x6C => Some(ByteOrder::LSBFirst),
            _ => None,
        }
    }

    pub fn order_byte(self) -> u8 {
        match self {
            ByteOrder::MSBFirst => 0x42,
            ByteOrder::LSBFirst => 0x6C,
        }
    }
}

/// Atom ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    pub const NONE: Atom = Atom(0);
    pub const PRIMARY: Atom = Atom(1);
    pub const SECONDARY: Atom = Atom(2);
    pub const ATOM: Atom = Atom(4);
    pub const CARDINAL: Atom = Atom(6);
    pub const FONT: Atom = Atom(18);
    pub const INTEGER: Atom = Atom(19);
    pub const STRING: Atom = Atom(31);
    pub const WINDOW: Atom = Atom(33);
    pub const WM_NAME: Atom = Atom(39);
    pub const FONT_NAME: Atom = Atom(63);
    pub const FAMILY_NAME: Atom = Atom(64);
    pub const FULL_NAME: Atom = Atom(65);
    pub const WM_CLASS: Atom = Atom(67);
    pub const WM_TRANSIENT_FOR: Atom = Atom(68);

    /// First id handed out by `InternAtom` for a new name
    pub const FIRST_USER_ATOM: u32 = 69;

    pub fn new(id: u32) -> Self {
        Atom(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom#{}", self.0)
    }
}

/// Names of the predefined atoms, index + 1 is the atom id.
pub const PREDEFINED_ATOMS: [&str; 68] = [
    "PRIMARY",
    "SECONDARY",
    "ARC",
    "ATOM",
    "BITMAP",
    "CARDINAL",
    "COLORMAP",
    "CURSOR",
    "CUT_BUFFER0",
    "CUT_BUFFER1",
    "CUT_BUFFER2",
    "CUT_BUFFER3",
    "CUT_BUFFER4",
    "CUT_BUFFER5",
    "CUT_BUFFER6",
    "CUT_BUFFER7",
    "DRAWABLE",
    "FONT",
    "INTEGER",
    "PIXMAP",
    "POINT",
    "RECTANGLE",
    "RESOURCE_MANAGER",
    "RGB_COLOR_MAP",
    "RGB_BEST_MAP",
    "RGB_BLUE_MAP",
    "RGB_DEFAULT_MAP",
    "RGB_GRAY_MAP",
    "RGB_GREEN_MAP",
    "RGB_RED_MAP",
    "STRING",
    "VISUALID",
    "WINDOW",
    "WM_COMMAND",
    "WM_HINTS",
    "WM_CLIENT_MACHINE",
    "WM_ICON_NAME",
    "WM_ICON_SIZE",
    "WM_NAME",
    "WM_NORMAL_HINTS",
    "WM_SIZE_HINTS",
    "WM_ZOOM_HINTS",
    "MIN_SPACE",
    "NORM_SPACE",
    "MAX_SPACE",
    "END_SPACE",
    "SUPERSCRIPT_X",
    "SUPERSCRIPT_Y",
    "SUBSCRIPT_X",
    "SUBSCRIPT_Y",
    "UNDERLINE_POSITION",
    "UNDERLINE_THICKNESS",
    "STRIKEOUT_ASCENT",
    "STRIKEOUT_DESCENT",
    "ITALIC_ANGLE",
    "X_HEIGHT",
    "QUAD_WIDTH",
    "WEIGHT",
    "POINT_SIZE",
    "RESOLUTION",
    "COPYRIGHT",
    "NOTICE",
    "FONT_NAME",
    "FAMILY_NAME",
    "FULL_NAME",
    "CAP_HEIGHT",
    "WM_CLASS",
    "WM_TRANSIENT_FOR",
];

/// Point (x, y coordinate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Integer rectangle, right/bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Shrink on all four sides.
    pub fn inset(&self, amount: i32) -> Rect {
        Rect::new(
            self.x + amount,
            self.y + amount,
            self.width - 2 * amount,
            self.height - 2 * amount,
        )
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
}

/// Segment (for drawing line segments)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Arc (for drawing arcs and ellipses)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arc {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub angle1: i32, // Start angle in 1/64 degrees
    pub angle2: i32, // Arc angle in 1/64 degrees
}

/// Window class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    CopyFromParent = 0,
    InputOutput = 1,
    InputOnly = 2,
}

impl WindowClass {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(WindowClass::CopyFromParent),
            1 => Some(WindowClass::InputOutput),
            2 => Some(WindowClass::InputOnly),
            _ => None,
        }
    }
}

/// Map state as reported by GetWindowAttributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Unmapped = 0,
    Unviewable = 1,
    Viewable = 2,
}

/// Stack mode for ConfigureWindow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    Above = 0,
    Below = 1,
    TopIf = 2,
    BottomIf = 3,
    Opposite = 4,
}

impl StackMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(StackMode::Above),
            1 => Some(StackMode::Below),
            2 => Some(StackMode::TopIf),
            3 => Some(StackMode::BottomIf),
            4 => Some(StackMode::Opposite),
            _ => None,
        }
    }
}

/// Window gravity, also used for bit gravity where 0 means Forget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    Unmap = 0,
    NorthWest = 1,
    North = 2,
    NorthEast = 3,
    West = 4,
    Center = 5,
    East = 6,
    SouthWest = 7,
    South = 8,
    SouthEast = 9,
    Static = 10,
}

impl Gravity {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Gravity::Unmap),
            1 => Some(Gravity::NorthWest),
            2 => Some(Gravity::North),
            3 => Some(Gravity::NorthEast),
            4 => Some(Gravity::West),
            5 => Some(Gravity::Center),
            6 => Some(Gravity::East),
            7 => Some(Gravity::SouthWest),
            8 => Some(Gravity::South),
            9 => Some(Gravity::SouthEast),
            10 => Some(Gravity::Static),
            _ => None,
        }
    }

    /// Offset of the old content inside the resized area, or `None` for
    /// gravities that do not copy content.
    pub fn offset(self, old_w: i32, old_h: i32, new_w: i32, new_h: i32) -> Option<(i32, i32)> {
        let dx = new_w - old_w;
        let dy = new_h - old_h;
        match self {
            Gravity::Unmap | Gravity::Static => None,
            Gravity::NorthWest => Some((0, 0)),
            Gravity::North => Some((dx / 2, 0)),
            Gravity::NorthEast => Some((dx, 0)),
            Gravity::West => Some((0, dy / 2)),
            Gravity::Center => Some((dx / 2, dy / 2)),
            Gravity::East => Some((dx, dy / 2)),
            Gravity::SouthWest => Some((0, dy)),
            Gravity::South => Some((dx / 2, dy)),
            Gravity::SouthEast => Some((dx, dy)),
        }
    }
}

/// Event masks
pub mod event_mask {
    pub const NO_EVENT: u32 = 0;
    pub const KEY_PRESS: u32 = 1 << 0;
    pub const KEY_RELEASE: u32 = 1 << 1;
    pub const BUTTON_PRESS: u32 = 1 << 2;
    pub const BUTTON_RELEASE: u32 = 1 << 3;
    pub const ENTER_WINDOW: u32 = 1 << 4;
    pub const LEAVE_WINDOW: u32 = 1 << 5;
    pub const POINTER_MOTION: u32 = 1 << 6;
    pub const POINTER_MOTION_HINT: u32 = 1 << 7;
    pub const BUTTON1_MOTION: u32 = 1 << 8;
    pub const BUTTON2_MOTION: u32 = 1 << 9;
    pub const BUTTON3_MOTION: u32 = 1 << 10;
    pub const BUTTON4_MOTION: u32 = 1 << 11;
    pub const BUTTON5_MOTION: u32 = 1 << 12;
    pub const BUTTON_MOTION: u32 = 1 << 13;
    pub const KEYMAP_STATE: u32 = 1 << 14;
    pub const EXPOSURE: u32 = 1 << 15;
    pub const VISIBILITY_CHANGE: u32 = 1 << 16;
    pub const STRUCTURE_NOTIFY: u32 = 1 << 17;
    pub const RESIZE_REDIRECT: u32 = 1 << 18;
    pub const SUBSTRUCTURE_NOTIFY: u32 = 1 << 19;
    pub const SUBSTRUCTURE_REDIRECT: u32 = 1 << 20;
    pub const FOCUS_CHANGE: u32 = 1 << 21;
    pub const PROPERTY_CHANGE: u32 = 1 << 22;
    pub const COLORMAP_CHANGE: u32 = 1 << 23;
    pub const OWNER_GRAB_BUTTON: u32 = 1 << 24;
    pub const ALL: u32 = (1 << 25) - 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_byte() {
        assert_eq!(ByteOrder::from_order_byte(b'B'), Some(ByteOrder::MSBFirst));
        assert_eq!(ByteOrder::from_order_byte(b'l'), Some(ByteOrder::LSBFirst));
        assert_eq!(ByteOrder::from_order_byte(b'x'), None);
    }

    #[test]
    fn test_predefined_atoms_line_up() {
        assert_eq!(PREDEFINED_ATOMS[Atom::WM_NAME.get() as usize - 1], "WM_NAME");
        assert_eq!(PREDEFINED_ATOMS[Atom::STRING.get() as usize - 1], "STRING");
        assert_eq!(PREDEFINED_ATOMS.len() as u32 + 1, Atom::FIRST_USER_ATOM);
    }

    #[test]
    fn test_gravity_offsets() {
        assert_eq!(Gravity::NorthWest.offset(10, 10, 20, 30), Some((0, 0)));
        assert_eq!(Gravity::Center.offset(10, 10, 20, 30), Some((5, 10)));
        assert_eq!(Gravity::SouthEast.offset(10, 10, 4, 6), Some((-6, -4)));
        assert_eq!(Gravity::Unmap.offset(10, 10, 20, 20), None);
    }

    #[test]
    fn test_rect_inset_and_intersect() {
        let r = Rect::new(0, 0, 10, 8).inset(2);
        assert_eq!(r, Rect::new(2, 2, 6, 4));
        let i = Rect::new(0, 0, 5, 5).intersect(&Rect::new(3, 3, 5, 5));
        assert_eq!(i, Rect::new(3, 3, 2, 2));
    }
}
