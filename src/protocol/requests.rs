//! X11 request opcodes
//!
//! Handlers register against these when the server starts; the names are used
//! for request tracing.

macro_rules! request_opcodes {
    ($($name:ident = $value:expr,)*) => {
        /// Core request opcodes served by this server
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum RequestOpcode {
            $($name = $value,)*
        }

        impl RequestOpcode {
            pub fn from_u8(opcode: u8) -> Option<Self> {
                match opcode {
                    $($value => Some(RequestOpcode::$name),)*
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(RequestOpcode::$name => stringify!($name),)*
                }
            }
        }
    };
}

request_opcodes! {
    CreateWindow = 1,
    ChangeWindowAttributes = 2,
    GetWindowAttributes = 3,
    DestroyWindow = 4,
    DestroySubwindows = 5,
    ChangeSaveSet = 6,
    ReparentWindow = 7,
    MapWindow = 8,
    MapSubwindows = 9,
    UnmapWindow = 10,
    UnmapSubwindows = 11,
    ConfigureWindow = 12,
    GetGeometry = 14,
    QueryTree = 15,
    InternAtom = 16,
    GetAtomName = 17,
    ChangeProperty = 18,
    DeleteProperty = 19,
    GetProperty = 20,
    ListProperties = 21,
    SetSelectionOwner = 22,
    GetSelectionOwner = 23,
    ConvertSelection = 24,
    SendEvent = 25,
    GrabServer = 36,
    UngrabServer = 37,
    QueryPointer = 38,
    TranslateCoordinates = 40,
    SetInputFocus = 42,
    GetInputFocus = 43,
    QueryKeymap = 44,
    OpenFont = 45,
    CloseFont = 46,
    QueryFont = 47,
    QueryTextExtents = 48,
    ListFonts = 49,
    ListFontsWithInfo = 50,
    GetFontPath = 52,
    CreatePixmap = 53,
    FreePixmap = 54,
    CreateGC = 55,
    ChangeGC = 56,
    CopyGC = 57,
    SetDashes = 58,
    SetClipRectangles = 59,
    FreeGC = 60,
    ClearArea = 61,
    CopyArea = 62,
    CopyPlane = 63,
    PolyPoint = 64,
    PolyLine = 65,
    PolySegment = 66,
    PolyRectangle = 67,
    PolyArc = 68,
    FillPoly = 69,
    PolyFillRectangle = 70,
    PolyFillArc = 71,
    PutImage = 72,
    GetImage = 73,
    PolyText8 = 74,
    PolyText16 = 75,
    ImageText8 = 76,
    ImageText16 = 77,
    CreateColormap = 78,
    FreeColormap = 79,
    AllocColor = 84,
    AllocNamedColor = 85,
    FreeColors = 88,
    QueryColors = 91,
    LookupColor = 92,
    CreateCursor = 93,
    CreateGlyphCursor = 94,
    FreeCursor = 95,
    QueryBestSize = 97,
    QueryExtension = 98,
    ListExtensions = 99,
    GetKeyboardMapping = 101,
    GetKeyboardControl = 103,
    Bell = 104,
    GetPointerControl = 106,
    SetScreenSaver = 107,
    GetScreenSaver = 108,
    ChangeHosts = 109,
    ListHosts = 110,
    SetAccessControl = 111,
    GetModifierMapping = 119,
    NoOperation = 127,
}

/// Name used in request traces; extension opcodes have no core name.
pub fn request_name(opcode: u8) -> &'static str {
    RequestOpcode::from_u8(opcode)
        .map(|op| op.as_str())
        .unwrap_or("Unknown")
}
