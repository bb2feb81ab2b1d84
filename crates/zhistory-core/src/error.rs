//! Error types for the output-history store and its cursors.

use std::fmt;

use crate::attrs::ZUcs;

/// Errors reported by history operations.
///
/// The first four variants indicate a broken invariant (a corrupt in-band
/// record, an out-of-range parameter, or a cursor used after the store moved
/// underneath it). These are fatal: the embedder is expected to abort the
/// session rather than continue with a corrupt history. `CannotRewind` and
/// `NoParagraphAttributes` are ordinary recoverable conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// A metadata parameter was outside its legal range (colours must lie
    /// in `-2..=15`).
    InvalidParameter { value: i16 },
    /// An escape code in the buffer was followed by an unknown record kind.
    InvalidMetadata { kind: ZUcs },
    /// The store's wrap counter or front index changed after this cursor was
    /// created; the cursor's snapshot no longer describes the buffer.
    CursorInvalidated,
    /// The buffer contents contradict the record framing rules (for example
    /// a truncated record at the live-region boundary).
    InconsistentBuffer,
    /// A rewind walked past the oldest stored code unit.
    CannotRewind,
    /// No paragraph-attribute record has been seen by this cursor yet.
    NoParagraphAttributes,
}

impl HistoryError {
    /// Whether this error is a broken-invariant (programming) error.
    ///
    /// Fatal errors must not be retried; the history contents can no longer
    /// be trusted.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CannotRewind | Self::NoParagraphAttributes)
    }
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter { value } => {
                write!(f, "metadata parameter {value} outside valid range")
            }
            Self::InvalidMetadata { kind } => {
                write!(f, "inconsistent history metadata (kind {kind})")
            }
            Self::CursorInvalidated => {
                write!(f, "history cursor no longer valid after store mutation")
            }
            Self::InconsistentBuffer => write!(f, "history buffer framing is inconsistent"),
            Self::CannotRewind => write!(f, "cannot rewind past the oldest stored character"),
            Self::NoParagraphAttributes => {
                write!(f, "no paragraph-attribute record seen by this cursor")
            }
        }
    }
}

impl std::error::Error for HistoryError {}
