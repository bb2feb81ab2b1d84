//! In-band metadata codec.
//!
//! Presentation changes are embedded directly in the character stream as
//! escape-prefixed records. A record is `{ESC, kind, p1}` or
//! `{ESC, kind, p1, p2}` where `ESC` is the code unit `0`. Since `0` never
//! occurs as ordinary text, no escaping of text is required.
//!
//! Every parameter is stored offset by [`METADATA_PARAM_OFFSET`] so that a
//! colour parameter can never collide with the newline unit; paragraph
//! scans may then look for newlines without decoding records first.

use crate::attrs::{Colour, Font, StyleFlags, ZUcs};
use crate::error::HistoryError;

/// The escape code unit that introduces a metadata record.
pub const METADATA_ESCAPE: ZUcs = 0;

/// Record kind: font change, one parameter.
pub const METADATA_KIND_FONT: ZUcs = 1;
/// Record kind: style change, one parameter.
pub const METADATA_KIND_STYLE: ZUcs = 2;
/// Record kind: colour change, two parameters (foreground, background).
pub const METADATA_KIND_COLOUR: ZUcs = 3;
/// Record kind: paragraph attributes, two parameters stored verbatim.
pub const METADATA_KIND_PARAGRAPH_ATTRIBUTE: ZUcs = 4;

/// Offset applied to every stored parameter.
pub const METADATA_PARAM_OFFSET: i32 = 13;

/// The widest record, in code units. The buffer is never smaller than this,
/// which lets the back-drain overshoot a record that straddles its range.
pub const MAX_METADATA_LEN: usize = 4;

/// Encode a parameter for in-band storage.
#[inline]
#[must_use]
pub(crate) fn encode_param(value: i16) -> ZUcs {
    (i32::from(value) + METADATA_PARAM_OFFSET) as ZUcs
}

/// Decode a stored parameter.
#[inline]
#[must_use]
pub(crate) fn decode_param(unit: ZUcs) -> i16 {
    (unit as i32).wrapping_sub(METADATA_PARAM_OFFSET) as i16
}

/// The number of code units a record of the given kind occupies, or `None`
/// for an unknown kind.
#[inline]
#[must_use]
pub(crate) fn record_len(kind: ZUcs) -> Option<usize> {
    match kind {
        METADATA_KIND_FONT | METADATA_KIND_STYLE => Some(3),
        METADATA_KIND_COLOUR | METADATA_KIND_PARAGRAPH_ATTRIBUTE => Some(4),
        _ => None,
    }
}

/// A decoded metadata record.
///
/// This is the typed form of the in-band records; [`crate::OutputHistory::store_metadata`]
/// serialises it into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metadata {
    /// Select a font for subsequent output.
    Font(Font),
    /// Select a style combination for subsequent output.
    Style(StyleFlags),
    /// Select foreground and background colours for subsequent output.
    Colour {
        foreground: Colour,
        background: Colour,
    },
    /// Attach a pair of attributes to the enclosing paragraph. The values
    /// are opaque to the history; they ride along and come back out when the
    /// paragraph is rewound over or falls off the back.
    ParagraphAttributes { attr1: i16, attr2: i16 },
}

impl Metadata {
    /// Serialise this record into `out`, returning the number of code units
    /// written (3 or 4).
    ///
    /// Colour parameters are range-checked; everything else is infallible.
    pub(crate) fn encode(&self, out: &mut [ZUcs; MAX_METADATA_LEN]) -> Result<usize, HistoryError> {
        out[0] = METADATA_ESCAPE;
        match *self {
            Self::Font(font) => {
                out[1] = METADATA_KIND_FONT;
                out[2] = encode_param(font.code());
                Ok(3)
            }
            Self::Style(style) => {
                out[1] = METADATA_KIND_STYLE;
                out[2] = encode_param(style.code());
                Ok(3)
            }
            Self::Colour {
                foreground,
                background,
            } => {
                check_colour_code(foreground.code())?;
                check_colour_code(background.code())?;
                out[1] = METADATA_KIND_COLOUR;
                out[2] = encode_param(foreground.code());
                out[3] = encode_param(background.code());
                Ok(4)
            }
            Self::ParagraphAttributes { attr1, attr2 } => {
                out[1] = METADATA_KIND_PARAGRAPH_ATTRIBUTE;
                out[2] = encode_param(attr1);
                out[3] = encode_param(attr2);
                Ok(4)
            }
        }
    }
}

/// Range check for colour wire codes. `-2` is the lowest legal value
/// (undefined), `15` the highest palette index.
fn check_colour_code(code: i16) -> Result<(), HistoryError> {
    if (Colour::MIN_CODE..=Colour::MAX_CODE).contains(&code) {
        Ok(())
    } else {
        Err(HistoryError::InvalidParameter { value: code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_offset_round_trips() {
        for value in [-300i16, -2, -1, 0, 1, 13, 15, 127, 300] {
            assert_eq!(decode_param(encode_param(value)), value);
        }
    }

    #[test]
    fn colour_params_cannot_collide_with_newline_or_escape() {
        for code in Colour::MIN_CODE..=Colour::MAX_CODE {
            let unit = encode_param(code);
            assert_ne!(unit, METADATA_ESCAPE);
            assert_ne!(unit, crate::attrs::ZUCS_NEWLINE);
        }
    }

    #[test]
    fn font_and_style_records_are_three_units() {
        let mut buf = [0; MAX_METADATA_LEN];
        assert_eq!(Metadata::Font(Font::COURIER).encode(&mut buf).unwrap(), 3);
        assert_eq!(buf[0], METADATA_ESCAPE);
        assert_eq!(buf[1], METADATA_KIND_FONT);
        assert_eq!(decode_param(buf[2]), Font::COURIER.code());

        assert_eq!(
            Metadata::Style(StyleFlags::BOLD).encode(&mut buf).unwrap(),
            3
        );
        assert_eq!(buf[1], METADATA_KIND_STYLE);
        assert_eq!(decode_param(buf[2]), StyleFlags::BOLD.code());
    }

    #[test]
    fn colour_and_paragraph_records_are_four_units() {
        let mut buf = [0; MAX_METADATA_LEN];
        let len = Metadata::Colour {
            foreground: Colour::Palette(4),
            background: Colour::Palette(2),
        }
        .encode(&mut buf)
        .unwrap();
        assert_eq!(len, 4);
        assert_eq!(decode_param(buf[2]), 4);
        assert_eq!(decode_param(buf[3]), 2);

        let len = Metadata::ParagraphAttributes {
            attr1: -7,
            attr2: 300,
        }
        .encode(&mut buf)
        .unwrap();
        assert_eq!(len, 4);
        assert_eq!(decode_param(buf[2]), -7);
        assert_eq!(decode_param(buf[3]), 300);
    }

    #[test]
    fn record_len_by_kind() {
        assert_eq!(record_len(METADATA_KIND_FONT), Some(3));
        assert_eq!(record_len(METADATA_KIND_STYLE), Some(3));
        assert_eq!(record_len(METADATA_KIND_COLOUR), Some(4));
        assert_eq!(record_len(METADATA_KIND_PARAGRAPH_ATTRIBUTE), Some(4));
        assert_eq!(record_len(9), None);
    }
}
