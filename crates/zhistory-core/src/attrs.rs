//! Presentation attributes: colours, fonts, text styles, and the code-unit
//! type the history buffer stores.
//!
//! The history records rendered output as a stream of 32-bit wide code units.
//! Presentation changes travel in-band as escape-prefixed records (see
//! [`crate::metadata`]); the types here are the decoded forms of those
//! records.

use bitflags::bitflags;

use crate::error::HistoryError;

/// A wide code unit as stored in the history buffer.
///
/// Ordinary text units are Unicode scalar values; the value `0` is reserved
/// as the in-band metadata escape and never appears as text.
pub type ZUcs = u32;

/// The newline code unit. Paragraphs are maximal runs terminated by it.
pub const ZUCS_NEWLINE: ZUcs = b'\n' as ZUcs;

/// Colour in the story-file palette model.
///
/// The wire codes mirror the interpreter's colour numbering: `-2` means
/// "undefined"/inherit, `-1` means the terminal default, `0..=15` index the
/// palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colour {
    /// No colour has been established; inherit from the surroundings.
    Undefined,
    /// The renderer's default colour.
    #[default]
    Default,
    /// Palette index (0-15).
    Palette(u8),
}

impl Colour {
    /// The smallest legal wire code (`Undefined`).
    pub const MIN_CODE: i16 = -2;
    /// The largest legal wire code (palette index 15).
    pub const MAX_CODE: i16 = 15;

    /// The wire code for this colour.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Undefined => -2,
            Self::Default => -1,
            Self::Palette(index) => index as i16,
        }
    }

    /// Decode a wire code, rejecting values outside `-2..=15`.
    pub fn from_code(code: i16) -> Result<Self, HistoryError> {
        match code {
            -2 => Ok(Self::Undefined),
            -1 => Ok(Self::Default),
            0..=15 => Ok(Self::Palette(code as u8)),
            _ => Err(HistoryError::InvalidParameter { value: code }),
        }
    }

    /// Whether this colour carries a definite value.
    #[must_use]
    pub const fn is_defined(self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

/// Font selector.
///
/// Stories select fonts by small integer; the constants below name the
/// assigned values. Unassigned values pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Font(pub i16);

impl Font {
    /// Re-select the previously used font.
    pub const PREVIOUS: Self = Self(0);
    /// The normal proportional font.
    pub const NORMAL: Self = Self(1);
    /// The picture font.
    pub const PICTURE: Self = Self(2);
    /// The character-graphics font.
    pub const CHARACTER_GRAPHICS: Self = Self(3);
    /// The fixed-pitch Courier font.
    pub const COURIER: Self = Self(4);

    /// The wire code for this font.
    #[must_use]
    pub const fn code(self) -> i16 {
        self.0
    }
}

impl Default for Font {
    fn default() -> Self {
        Self::NORMAL
    }
}

bitflags! {
    /// Text style bits. Empty means roman (plain) text.
    ///
    /// The mask occupies the low four bits, so every style combination has a
    /// wire code in `0..=15`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StyleFlags: u8 {
        const REVERSE     = 1 << 0;
        const BOLD        = 1 << 1;
        const ITALIC      = 1 << 2;
        const FIXED_PITCH = 1 << 3;
    }
}

impl StyleFlags {
    /// The wire code for this style combination.
    #[must_use]
    pub const fn code(self) -> i16 {
        self.bits() as i16
    }

    /// Decode a wire code, ignoring bits outside the style mask.
    #[must_use]
    pub const fn from_code(code: i16) -> Self {
        Self::from_bits_truncate(code as u8)
    }
}

/// The presentation state in effect at a point in the output stream.
///
/// The store keeps one of these for the oldest stored unit (the back state)
/// and one for the next unit to be written (the front state); cursors carry
/// one for the paragraph they currently point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextState {
    pub font: Font,
    pub style: StyleFlags,
    pub foreground: Colour,
    pub background: Colour,
}

impl TextState {
    /// Construct a state from its four components.
    #[must_use]
    pub fn new(font: Font, style: StyleFlags, foreground: Colour, background: Colour) -> Self {
        Self {
            font,
            style,
            foreground,
            background,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_codes_round_trip() {
        for code in Colour::MIN_CODE..=Colour::MAX_CODE {
            let colour = Colour::from_code(code).unwrap();
            assert_eq!(colour.code(), code);
        }
    }

    #[test]
    fn colour_rejects_out_of_range_codes() {
        assert_eq!(
            Colour::from_code(16),
            Err(HistoryError::InvalidParameter { value: 16 })
        );
        assert_eq!(
            Colour::from_code(-3),
            Err(HistoryError::InvalidParameter { value: -3 })
        );
    }

    #[test]
    fn colour_defined_states() {
        assert!(!Colour::Undefined.is_defined());
        assert!(Colour::Default.is_defined());
        assert!(Colour::Palette(7).is_defined());
    }

    #[test]
    fn style_codes_cover_the_mask() {
        assert_eq!(StyleFlags::empty().code(), 0);
        assert_eq!(StyleFlags::all().code(), 15);
        let style = StyleFlags::BOLD | StyleFlags::ITALIC;
        assert_eq!(StyleFlags::from_code(style.code()), style);
    }

    #[test]
    fn style_from_code_truncates_unknown_bits() {
        assert_eq!(StyleFlags::from_code(0x1F), StyleFlags::all());
    }

    #[test]
    fn default_state_is_roman_normal_default_colours() {
        let state = TextState::default();
        assert_eq!(state.font, Font::NORMAL);
        assert_eq!(state.style, StyleFlags::empty());
        assert_eq!(state.foreground, Colour::Default);
        assert_eq!(state.background, Colour::Default);
    }
}
