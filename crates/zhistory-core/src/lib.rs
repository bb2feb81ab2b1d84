#![forbid(unsafe_code)]

//! Host-agnostic output-history engine for interactive-fiction interpreters.
//!
//! `zhistory-core` stores the rendered output of a story window in a
//! bounded, wrap-around buffer of wide code units, with presentation
//! changes (font, style, colour, paragraph attributes) embedded in-band as
//! escape-prefixed records. On top of the store sits a paragraph-granular
//! cursor that walks the buffer backwards and replays forward spans into a
//! pluggable rendering target: the machinery behind scrollback, screen
//! refresh, and resize redraws.
//!
//! # Primary responsibilities
//!
//! - **Store**: ring buffer with incremental growth up to a configured
//!   maximum; oldest output is overwritten once full.
//! - **Metadata codec**: escape-prefixed 3/4-unit records carrying
//!   presentation changes inside the character stream.
//! - **State blocks**: periodic forced font/style/colour anchors so that
//!   backward state reconstruction is bounded.
//! - **Back-drain**: folds overwritten metadata into the back state and
//!   reports dropped paragraph attributes to a per-store callback.
//! - **Cursor**: paragraph rewind, replay, paragraph-start state
//!   evaluation, and a remember/restore snapshot slot; invalidated by
//!   writes unless explicitly opted out.
//!
//! # Design principles
//!
//! - **No I/O**: pure data + logic; the embedder supplies the rendering
//!   target and owns the window mapping.
//! - **Single-threaded**: a store and its cursors form one ownership
//!   island; every operation runs to completion synchronously.
//! - **Corruption is fatal**: a malformed in-band record is never silently
//!   tolerated, while memory pressure degrades by silently dropping the
//!   oldest output.

pub mod attrs;
pub mod cursor;
pub mod error;
pub mod metadata;
pub mod store;

pub use attrs::{Colour, Font, StyleFlags, TextState, ZUcs, ZUCS_NEWLINE};
pub use cursor::{
    CursorFlags, HistoryCursor, ReplayTarget, Rewind, REPEAT_PARAGRAPH_BUF_SIZE,
};
pub use error::HistoryError;
pub use metadata::{
    Metadata, MAX_METADATA_LEN, METADATA_ESCAPE, METADATA_KIND_COLOUR, METADATA_KIND_FONT,
    METADATA_KIND_PARAGRAPH_ATTRIBUTE, METADATA_KIND_STYLE, METADATA_PARAM_OFFSET,
};
pub use store::{
    HistoryConfig, OutputHistory, ParagraphRemovalFn, METADATA_STATE_BLOCK_SIZE,
};
