//! Named colors and the active text/background pair.
//!
//! The shell validates and stores color *names*; turning them into escape
//! sequences is the front-end's job.

use conch_types::error::{ConchError, Result};

/// A named terminal color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// The terminal's own default for the slot (text or background).
    Default,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

/// Name table, in listing order.
const NAMES: &[(&str, Color)] = &[
    ("default", Color::Default),
    ("black", Color::Black),
    ("red", Color::Red),
    ("green", Color::Green),
    ("yellow", Color::Yellow),
    ("blue", Color::Blue),
    ("magenta", Color::Magenta),
    ("cyan", Color::Cyan),
    ("white", Color::White),
    ("bright-black", Color::BrightBlack),
    ("bright-red", Color::BrightRed),
    ("bright-green", Color::BrightGreen),
    ("bright-yellow", Color::BrightYellow),
    ("bright-blue", Color::BrightBlue),
    ("bright-magenta", Color::BrightMagenta),
    ("bright-cyan", Color::BrightCyan),
    ("bright-white", Color::BrightWhite),
];

impl Color {
    /// Parse a color name. Case-insensitive.
    pub fn parse(name: &str) -> Result<Color> {
        let lower = name.to_ascii_lowercase();
        NAMES
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, c)| *c)
            .ok_or_else(|| {
                ConchError::Color(format!(
                    "unknown color: {name}  (try 'color list' for valid names)"
                ))
            })
    }

    /// The canonical name of this color.
    pub fn name(&self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, c)| c == self)
            .map(|(n, _)| *n)
            .unwrap_or("default")
    }

    /// All valid color names, in listing order.
    pub fn all_names() -> impl Iterator<Item = &'static str> {
        NAMES.iter().map(|(n, _)| *n)
    }
}

/// The active text/background color pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Color,
    pub background: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            text: Color::Default,
            background: Color::Default,
        }
    }
}
