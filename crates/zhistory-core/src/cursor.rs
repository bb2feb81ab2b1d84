//! Read-side cursor over an [`OutputHistory`]: walks the buffer backwards a
//! paragraph at a time and replays forward spans into a [`ReplayTarget`].
//!
//! A cursor snapshots the store's wrap counter and front offset at creation.
//! Any write that changes either invalidates the cursor: its next operation
//! fails with [`HistoryError::CursorInvalidated`]. A cursor created with
//! [`CursorFlags::NO_VALIDATION`] skips the check and may be used while
//! writes are interleaved, at the caller's risk.
//!
//! The cursor convention: `current_paragraph_index` points at the first
//! code unit of a paragraph (which may be a metadata record preceding its
//! first visible character), or at the paragraph's terminating newline if
//! the paragraph is empty.

use bitflags::bitflags;
use tracing::trace;

use crate::attrs::{Colour, Font, StyleFlags, TextState, ZUcs, ZUCS_NEWLINE};
use crate::error::HistoryError;
use crate::metadata::{
    decode_param, encode_param, METADATA_ESCAPE, METADATA_KIND_COLOUR, METADATA_KIND_FONT,
    METADATA_KIND_PARAGRAPH_ATTRIBUTE, METADATA_KIND_STYLE,
};
use crate::store::{OutputHistory, METADATA_STATE_BLOCK_SIZE};

/// Size of the staging buffer used by [`HistoryCursor::repeat_paragraphs`].
/// Output is flushed to the target whenever the staging fills up.
pub const REPEAT_PARAGRAPH_BUF_SIZE: usize = 1280;

bitflags! {
    /// Cursor construction flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CursorFlags: u8 {
        /// Position the cursor at the oldest stored unit instead of the
        /// newest.
        const FROM_BUFFER_BACK = 1 << 0;
        /// Skip validity checking. Required for cursors deliberately used
        /// while the store is being written to.
        const NO_VALIDATION = 1 << 1;
    }
}

/// Rendering sink for replayed history.
///
/// The callbacks must not call back into the store or cursor.
pub trait ReplayTarget {
    /// Emit a span of text code units. May be called with an empty span.
    fn emit_text(&mut self, text: &[ZUcs]);
    /// Select a font.
    fn set_font(&mut self, font: Font);
    /// Select a style combination.
    fn set_text_style(&mut self, style: StyleFlags);
    /// Select colours. `reserved` is passed through for targets that route
    /// colour changes per window; the cursor always passes `-1`.
    fn set_colour(&mut self, foreground: Colour, background: Colour, reserved: i16);
}

/// Outcome of [`HistoryCursor::rewind_paragraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewind {
    /// A paragraph was rewound over. `char_count` is the number of visible
    /// (non-metadata, non-terminator) code units it contains; `attributes`
    /// carries the decoded parameters of a paragraph-attribute record if
    /// the paragraph has one.
    Paragraph {
        char_count: usize,
        attributes: Option<(i16, i16)>,
    },
    /// The end of the live region was reached; nothing left to rewind.
    BufferBack,
}

/// The mutable walk state of a cursor. Kept separate so remember/restore
/// can snapshot it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CursorPos {
    /// Offset of the current paragraph's first code unit.
    current: usize,
    /// Backward wrap-boundary crossings available to this walker.
    nof_wraparounds: u32,
    /// The last rewind hit the oldest stored unit; nothing left to rewind.
    found_end_of_buffer: bool,
    /// At least one rewind has completed; later rewinds must first step
    /// over the previous paragraph's terminator.
    first_iteration_done: bool,
    /// The current offset already sits on the terminator to step over.
    dont_skip_newline: bool,
    /// Whether the most recently rewound paragraph ended with a newline.
    /// Only the final paragraph of the buffer can lack one.
    newline_terminated: bool,
    /// The state below has been evaluated for the current offset.
    metadata_evaluated: bool,
    /// Presentation state at the current paragraph's start.
    state: TextState,
    /// Single-slot evaluation cache: (state block, exact offset, state).
    block_cache: Option<(usize, usize, TextState)>,
    /// Offset of the parameter bytes of the most recently seen
    /// paragraph-attribute record, for in-place mutation.
    last_paragraph_attribute_index: Option<usize>,
}

/// A paragraph-granular reader over an [`OutputHistory`].
///
/// The cursor owns its replay target; the store is passed to each
/// operation. `T` is typically a screen adapter; tests use a recorder.
#[derive(Debug)]
pub struct HistoryCursor<T: ReplayTarget> {
    target: T,
    validity_wraps: u32,
    validity_front: usize,
    validation_disabled: bool,
    pos: CursorPos,
    saved: Option<CursorPos>,
}

impl<T: ReplayTarget> HistoryCursor<T> {
    /// Create a cursor over `history`.
    ///
    /// Returns `None` if the history has no backing store yet, or if the
    /// buffer holds nothing to position on.
    pub fn new(history: &OutputHistory, target: T, flags: CursorFlags) -> Option<Self> {
        if history.allocated_size() == 0 {
            return None;
        }
        let mut pos = CursorPos {
            current: 0,
            nof_wraparounds: 0,
            found_end_of_buffer: false,
            first_iteration_done: false,
            dont_skip_newline: false,
            newline_terminated: false,
            metadata_evaluated: false,
            state: TextState::default(),
            block_cache: None,
            last_paragraph_attribute_index: None,
        };
        if flags.contains(CursorFlags::FROM_BUFFER_BACK) {
            pos.current = history.back_offset();
            pos.state = history.back_state();
            pos.found_end_of_buffer = true;
            pos.first_iteration_done = true;
            pos.nof_wraparounds = history.wrap_count().saturating_sub(1);
        } else {
            // The front offset is the next write position; the newest
            // stored unit sits one before it.
            let mut local_wraps = 0u32;
            pos.current = history.decrement(history.front_offset(), &mut local_wraps)?;
            pos.nof_wraparounds = local_wraps;
            pos.state = history.front_state();
        }
        Some(Self {
            target,
            validity_wraps: history.wrap_count(),
            validity_front: history.front_offset(),
            validation_disabled: flags.contains(CursorFlags::NO_VALIDATION),
            pos,
            saved: None,
        })
    }

    /// The replay target.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// The replay target, mutably.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Consume the cursor and return its target.
    pub fn into_target(self) -> T {
        self.target
    }

    /// Whether the most recently rewound paragraph was terminated by a
    /// newline. Only the newest paragraph in the buffer can lack one, which
    /// matters when a redraw must decide whether to re-emit a line break.
    #[must_use]
    pub fn rewound_paragraph_was_newline_terminated(&self) -> bool {
        self.pos.newline_terminated
    }

    /// Presentation state at the current paragraph's start, as of the last
    /// evaluation.
    #[must_use]
    pub fn state(&self) -> TextState {
        self.pos.state
    }

    fn validate(&self, history: &OutputHistory) -> Result<(), HistoryError> {
        if history.wrap_count() == self.validity_wraps
            && history.front_offset() == self.validity_front
        {
            Ok(())
        } else {
            Err(HistoryError::CursorInvalidated)
        }
    }

    /// Whether the cursor stands at the store's front (nothing newer to
    /// replay).
    pub fn is_at_front(&self, history: &OutputHistory) -> Result<bool, HistoryError> {
        if !self.validation_disabled {
            self.validate(history)?;
        }
        Ok(self.pos.current == history.front_offset())
    }

    // ── Rewind ──────────────────────────────────────────────────────

    /// Move the cursor back over one paragraph.
    ///
    /// On success the cursor points at the first code unit of the rewound
    /// paragraph (metadata records included) and the paragraph-start state
    /// has been evaluated. `Ok(Rewind::BufferBack)` means the oldest stored
    /// unit had already been reached and nothing was rewound.
    pub fn rewind_paragraph(&mut self, history: &OutputHistory) -> Result<Rewind, HistoryError> {
        if !self.validation_disabled {
            self.validate(history)?;
        }
        if history.allocated_size() == 0 {
            return Err(HistoryError::InconsistentBuffer);
        }
        if self.pos.found_end_of_buffer {
            return Ok(Rewind::BufferBack);
        }
        trace!(current = self.pos.current, "rewinding one paragraph");

        let mut index = self.pos.current;
        let mut local_wraps = self.pos.nof_wraparounds;

        // A cursor that replayed forward all the way to the front behaves
        // like a freshly created one: step onto the newest stored unit.
        if !self.pos.first_iteration_done && index == history.front_offset() {
            index = history
                .decrement(index, &mut local_wraps)
                .ok_or(HistoryError::CannotRewind)?;
            self.pos.current = index;
            self.pos.nof_wraparounds = local_wraps;
        }

        if self.pos.first_iteration_done {
            // Step over the terminator of the previously rewound paragraph.
            self.pos.newline_terminated = true;
            if !self.pos.dont_skip_newline {
                index = history
                    .decrement(index, &mut local_wraps)
                    .ok_or(HistoryError::InconsistentBuffer)?;
            } else {
                self.pos.dont_skip_newline = false;
            }
            if history.unit_at(index) != ZUCS_NEWLINE {
                return Err(HistoryError::InconsistentBuffer);
            }
            let newline_index = index;
            let newline_wraps = local_wraps;
            match history.decrement(index, &mut local_wraps) {
                None => {
                    // The newline is the oldest stored unit: one final
                    // empty paragraph, then the region end.
                    self.pos.found_end_of_buffer = true;
                    self.pos.current = newline_index;
                    self.pos.nof_wraparounds = newline_wraps;
                    self.pos.metadata_evaluated = false;
                    return Ok(Rewind::Paragraph {
                        char_count: 0,
                        attributes: None,
                    });
                }
                Some(next) if history.unit_at(next) == ZUCS_NEWLINE => {
                    // An empty paragraph; leave the cursor on its
                    // terminator.
                    self.pos.current = newline_index;
                    self.pos.nof_wraparounds = newline_wraps;
                    self.pos.metadata_evaluated = false;
                    return Ok(Rewind::Paragraph {
                        char_count: 0,
                        attributes: None,
                    });
                }
                Some(next) => index = next,
            }
        } else {
            self.pos.first_iteration_done = true;
            if history.unit_at(index) == ZUCS_NEWLINE {
                // The newest paragraph is terminated; its content lies
                // before this newline.
                self.pos.newline_terminated = true;
                match history.decrement(index, &mut local_wraps) {
                    None => {
                        self.pos.found_end_of_buffer = true;
                        self.pos.metadata_evaluated = false;
                        return Ok(Rewind::Paragraph {
                            char_count: 0,
                            attributes: None,
                        });
                    }
                    Some(next) if history.unit_at(next) == ZUCS_NEWLINE => {
                        self.pos.metadata_evaluated = false;
                        return Ok(Rewind::Paragraph {
                            char_count: 0,
                            attributes: None,
                        });
                    }
                    Some(next) => index = next,
                }
            } else {
                self.pos.newline_terminated = false;
            }
        }
        self.pos.first_iteration_done = true;

        // `index` is at the last content unit of the paragraph to rewind
        // over. Walk back to the preceding newline or the region end,
        // counting visible units and refunding metadata records.
        let mut char_count: i64 = 0;
        let mut attributes: Option<(i16, i16)> = None;
        let mut last: Option<(usize, u32)> = None;
        let mut behind2: Option<usize> = None;
        let mut behind3: Option<usize> = None;
        loop {
            behind3 = behind2;
            behind2 = last.map(|(offset, _)| offset);
            last = Some((index, local_wraps));
            match history.decrement(index, &mut local_wraps) {
                None => {
                    // The paragraph is bounded by the oldest stored unit:
                    // deliver it and mark the region end for later calls.
                    self.pos.found_end_of_buffer = true;
                    self.pos.current = index;
                    self.pos.nof_wraparounds = local_wraps;
                    self.pos.metadata_evaluated = false;
                    self.evaluate_state_at_paragraph(history)?;
                    return Ok(Rewind::Paragraph {
                        char_count: (char_count + 1).max(0) as usize,
                        attributes,
                    });
                }
                Some(next) => index = next,
            }
            char_count += 1;
            if history.unit_at(index) == METADATA_ESCAPE {
                let (kind_index, _) = last.ok_or(HistoryError::InconsistentBuffer)?;
                let kind = history.unit_at(kind_index);
                if kind == METADATA_KIND_COLOUR {
                    char_count -= 4;
                } else if kind == METADATA_KIND_PARAGRAPH_ATTRIBUTE {
                    let attr1_index = behind2.ok_or(HistoryError::InconsistentBuffer)?;
                    let attr2_index = behind3.ok_or(HistoryError::InconsistentBuffer)?;
                    attributes = Some((
                        decode_param(history.unit_at(attr1_index)),
                        decode_param(history.unit_at(attr2_index)),
                    ));
                    self.pos.last_paragraph_attribute_index = Some(attr1_index);
                    char_count -= 4;
                } else {
                    char_count -= 3;
                }
            }
            if history.unit_at(index) == ZUCS_NEWLINE {
                break;
            }
        }

        let (paragraph_start, paragraph_wraps) = last.ok_or(HistoryError::InconsistentBuffer)?;
        self.pos.current = paragraph_start;
        self.pos.nof_wraparounds = paragraph_wraps;
        self.pos.metadata_evaluated = false;
        self.evaluate_state_at_paragraph(history)?;
        Ok(Rewind::Paragraph {
            char_count: char_count.max(0) as usize,
            attributes,
        })
    }

    // ── Paragraph-start state evaluation ────────────────────────────

    /// Reconstruct the presentation state in effect at the current
    /// paragraph's first visible character.
    ///
    /// Metadata records sitting at the paragraph start are applied first;
    /// attributes still unresolved are found by walking backward. The
    /// periodic state blocks guarantee the walk terminates within one
    /// block. Attributes that remain unknown when the walk runs off the
    /// live region fall back to the store's back state, except that an
    /// unknown background whose back-state value is also undefined takes
    /// the front-state background as a last resort.
    fn evaluate_state_at_paragraph(&mut self, history: &OutputHistory) -> Result<(), HistoryError> {
        if !self.validation_disabled {
            self.validate(history)?;
        }
        if self.pos.metadata_evaluated {
            return Ok(());
        }
        let block_index = self.pos.current - (self.pos.current % METADATA_STATE_BLOCK_SIZE);
        if let Some((cached_block, cached_offset, cached_state)) = self.pos.block_cache {
            if cached_block == block_index
                && cached_offset == self.pos.current
                && cached_state.foreground.is_defined()
                && cached_state.background.is_defined()
            {
                self.pos.state = cached_state;
                self.pos.metadata_evaluated = true;
                return Ok(());
            }
        }
        trace!(current = self.pos.current, "evaluating paragraph-start state");

        let mut font: Option<Font> = None;
        let mut style: Option<StyleFlags> = None;
        let mut foreground = Colour::Undefined;
        let mut background = Colour::Undefined;

        // Records at the paragraph start take effect before its first
        // visible character.
        let mut forward = self.pos.current;
        while forward != history.front_offset() && history.unit_at(forward) == METADATA_ESCAPE {
            let kind_index = history.advance_walk(forward);
            let kind = history.unit_at(kind_index);
            let param1_index = history.advance_walk(kind_index);
            let param1 = decode_param(history.unit_at(param1_index));
            match kind {
                METADATA_KIND_FONT => {
                    font = Some(Font(param1));
                    forward = history.advance_walk(param1_index);
                }
                METADATA_KIND_STYLE => {
                    style = Some(StyleFlags::from_code(param1));
                    forward = history.advance_walk(param1_index);
                }
                METADATA_KIND_COLOUR => {
                    let param2_index = history.advance_walk(param1_index);
                    foreground = Colour::from_code(param1)?;
                    background = Colour::from_code(decode_param(history.unit_at(param2_index)))?;
                    forward = history.advance_walk(param2_index);
                }
                METADATA_KIND_PARAGRAPH_ATTRIBUTE => {
                    let param2_index = history.advance_walk(param1_index);
                    forward = history.advance_walk(param2_index);
                }
                other => return Err(HistoryError::InvalidMetadata { kind: other }),
            }
        }

        // Walk backward for whatever is still unknown. An undefined colour
        // in a record does not resolve the attribute; the walk continues,
        // matching the write-side treatment of undefined as "no value".
        if font.is_none() || style.is_none() || !foreground.is_defined() || !background.is_defined()
        {
            let mut index = self.pos.current;
            let mut local_wraps = self.pos.nof_wraparounds;
            let mut behind1: Option<usize> = None;
            let mut behind2: Option<usize> = None;
            let mut behind3: Option<usize> = None;
            while font.is_none()
                || style.is_none()
                || !foreground.is_defined()
                || !background.is_defined()
            {
                behind3 = behind2;
                behind2 = behind1;
                behind1 = Some(index);
                match history.decrement(index, &mut local_wraps) {
                    None => {
                        let back = history.back_state();
                        if font.is_none() {
                            font = Some(back.font);
                        }
                        if style.is_none() {
                            style = Some(back.style);
                        }
                        if !foreground.is_defined() {
                            foreground = back.foreground;
                        }
                        if !background.is_defined() {
                            background = if back.background.is_defined() {
                                back.background
                            } else {
                                history.front_state().background
                            };
                        }
                        break;
                    }
                    Some(next) => index = next,
                }
                if history.unit_at(index) == METADATA_ESCAPE {
                    let kind_index = behind1.ok_or(HistoryError::InconsistentBuffer)?;
                    let kind = history.unit_at(kind_index);
                    if kind == METADATA_KIND_FONT && font.is_none() {
                        let param_index = behind2.ok_or(HistoryError::InconsistentBuffer)?;
                        font = Some(Font(decode_param(history.unit_at(param_index))));
                    } else if kind == METADATA_KIND_STYLE && style.is_none() {
                        let param_index = behind2.ok_or(HistoryError::InconsistentBuffer)?;
                        style = Some(StyleFlags::from_code(decode_param(
                            history.unit_at(param_index),
                        )));
                    } else if kind == METADATA_KIND_COLOUR
                        && (!foreground.is_defined() || !background.is_defined())
                    {
                        let fg_index = behind2.ok_or(HistoryError::InconsistentBuffer)?;
                        let bg_index = behind3.ok_or(HistoryError::InconsistentBuffer)?;
                        foreground = Colour::from_code(decode_param(history.unit_at(fg_index)))?;
                        background = Colour::from_code(decode_param(history.unit_at(bg_index)))?;
                    }
                }
            }
        }

        let state = TextState {
            font: font.unwrap_or_default(),
            style: style.unwrap_or_default(),
            foreground,
            background,
        };
        self.pos.state = state;
        self.pos.block_cache = Some((block_index, self.pos.current, state));
        self.pos.metadata_evaluated = true;
        Ok(())
    }

    // ── Replay ──────────────────────────────────────────────────────

    /// Replay up to `count` paragraphs forward from the current position
    /// into the target.
    ///
    /// The target is first synchronised to the cursor's state; text is then
    /// streamed in staging-buffer-sized spans, never including terminating
    /// newlines of the final requested paragraph or raw metadata units.
    /// With `include_metadata`, font/style/colour records are forwarded as
    /// target calls; the cursor's running state tracks them either way.
    /// With `advance`, the cursor moves past the replayed paragraphs.
    ///
    /// Returns the number of requested paragraphs that were not delivered
    /// (0 when all were), or -1 if the cursor already stood at the front.
    /// A cursor at the back of a completely full buffer shares its offset
    /// with the front; it replays the whole region instead of bailing.
    pub fn repeat_paragraphs(
        &mut self,
        history: &OutputHistory,
        count: i32,
        include_metadata: bool,
        advance: bool,
    ) -> Result<i32, HistoryError> {
        if !self.validation_disabled {
            self.validate(history)?;
        }
        if include_metadata {
            self.evaluate_state_at_paragraph(history)?;
        }
        trace!(current = self.pos.current, count, "repeating paragraphs");

        let mut remaining = count;
        let mut index = self.pos.current;

        // In a completely full wrapped ring the oldest unit sits at the
        // front offset. A cursor standing there with the end-of-buffer
        // flag set is at the back, not the front: the walk must go once
        // around before the shared offset means "done".
        let at_back_of_full = self.pos.found_end_of_buffer
            && index == history.front_offset()
            && history.is_full();

        // Synchronise the target before any text.
        self.target.set_font(self.pos.state.font);
        self.target.set_text_style(self.pos.state.style);
        self.target
            .set_colour(self.pos.state.foreground, self.pos.state.background, -1);

        if advance {
            self.pos.found_end_of_buffer = false;
        }

        let mut staging = [0 as ZUcs; REPEAT_PARAGRAPH_BUF_SIZE];
        let mut staged = 0usize;

        if index == history.front_offset() && !at_back_of_full {
            remaining = -1;
        } else {
            let mut skip_store = false;
            let mut moved = false;
            while remaining > 0 {
                let unit = history.unit_at(index);
                if unit == ZUCS_NEWLINE {
                    remaining -= 1;
                }
                let at_front =
                    index == history.front_offset() && (moved || !at_back_of_full);
                if staged == REPEAT_PARAGRAPH_BUF_SIZE - 1
                    || remaining < 1
                    || unit == METADATA_ESCAPE
                    || at_front
                {
                    self.target.emit_text(&staging[..staged]);
                    if at_front {
                        break;
                    }
                    if remaining < 1 {
                        break;
                    }
                    staged = 0;
                    if unit == METADATA_ESCAPE {
                        index = history.advance(index);
                        let kind = history.unit_at(index);
                        index = history.advance(index);
                        let param1 = decode_param(history.unit_at(index));
                        match kind {
                            METADATA_KIND_FONT => {
                                let font = Font(param1);
                                self.pos.state.font = font;
                                if include_metadata {
                                    self.target.set_font(font);
                                }
                            }
                            METADATA_KIND_STYLE => {
                                let style = StyleFlags::from_code(param1);
                                self.pos.state.style = style;
                                if include_metadata {
                                    self.target.set_text_style(style);
                                }
                            }
                            METADATA_KIND_COLOUR => {
                                index = history.advance(index);
                                let param2 = decode_param(history.unit_at(index));
                                let foreground = Colour::from_code(param1)?;
                                let background = Colour::from_code(param2)?;
                                self.pos.state.foreground = foreground;
                                self.pos.state.background = background;
                                if include_metadata {
                                    self.target.set_colour(foreground, background, -1);
                                }
                            }
                            METADATA_KIND_PARAGRAPH_ATTRIBUTE => {
                                self.pos.last_paragraph_attribute_index = Some(index);
                                index = history.advance(index);
                            }
                            other => return Err(HistoryError::InvalidMetadata { kind: other }),
                        }
                        skip_store = true;
                    }
                }
                if skip_store {
                    skip_store = false;
                } else {
                    staging[staged] = history.unit_at(index);
                    staged += 1;
                }
                index = history.advance_walk(index);
                moved = true;
            }
        }

        if advance {
            if index == history.front_offset() {
                self.pos.current = index;
                self.pos.first_iteration_done = false;
                self.pos.newline_terminated = history.unit_at(index) == ZUCS_NEWLINE;
            } else {
                self.pos.current = history.advance_walk(index);
            }
        }
        Ok(remaining)
    }

    // ── Paragraph-attribute mutation ────────────────────────────────

    /// Overwrite, in place, the parameters of the paragraph-attribute
    /// record most recently seen by this cursor.
    ///
    /// Used to retroactively set a paragraph's attributes once they become
    /// known (after the paragraph itself has already been stored).
    pub fn alter_last_paragraph_attributes(
        &mut self,
        history: &mut OutputHistory,
        attr1: i16,
        attr2: i16,
    ) -> Result<(), HistoryError> {
        self.validate(history)?;
        let index = self
            .pos
            .last_paragraph_attribute_index
            .ok_or(HistoryError::NoParagraphAttributes)?;
        trace!(index, attr1, attr2, "altering paragraph attributes");
        history.write_unit_at(index, encode_param(attr1));
        let second = history.advance(index);
        history.write_unit_at(second, encode_param(attr2));
        Ok(())
    }

    // ── Remember / restore ──────────────────────────────────────────

    /// Snapshot the cursor's walk state into its single saved slot.
    pub fn remember(&mut self, history: &OutputHistory) -> Result<(), HistoryError> {
        if !self.validation_disabled {
            self.validate(history)?;
        }
        self.saved = Some(self.pos);
        Ok(())
    }

    /// Restore the walk state saved by [`Self::remember`]. Does nothing if
    /// nothing was saved.
    pub fn restore(&mut self, history: &OutputHistory) -> Result<(), HistoryError> {
        if !self.validation_disabled {
            self.validate(history)?;
        }
        if let Some(saved) = self.saved {
            self.pos = saved;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::store::HistoryConfig;

    #[derive(Debug, Default)]
    struct Recorder {
        text: String,
        fonts: Vec<Font>,
        styles: Vec<StyleFlags>,
        colours: Vec<(Colour, Colour)>,
    }

    impl ReplayTarget for Recorder {
        fn emit_text(&mut self, text: &[ZUcs]) {
            self.text
                .extend(text.iter().filter_map(|&unit| char::from_u32(unit)));
        }
        fn set_font(&mut self, font: Font) {
            self.fonts.push(font);
        }
        fn set_text_style(&mut self, style: StyleFlags) {
            self.styles.push(style);
        }
        fn set_colour(&mut self, foreground: Colour, background: Colour, _reserved: i16) {
            self.colours.push((foreground, background));
        }
    }

    fn history(maximum_size: usize, increment_size: usize) -> OutputHistory {
        OutputHistory::new(HistoryConfig {
            maximum_size,
            increment_size,
            initial_state: TextState::default(),
        })
    }

    fn rewound(result: Rewind) -> (usize, Option<(i16, i16)>) {
        match result {
            Rewind::Paragraph {
                char_count,
                attributes,
            } => (char_count, attributes),
            Rewind::BufferBack => panic!("expected a paragraph, got BufferBack"),
        }
    }

    #[test]
    fn cursor_over_empty_store_is_refused() {
        let store = history(64, 16);
        assert!(HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).is_none());
    }

    #[test]
    fn rewind_walks_paragraphs_newest_first() {
        let mut store = history(64, 16);
        store.store_text("One\nTwo\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();

        let (count, attrs) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 3);
        assert_eq!(attrs, None);
        assert!(cursor.rewound_paragraph_was_newline_terminated());

        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 3);

        assert_eq!(cursor.rewind_paragraph(&store).unwrap(), Rewind::BufferBack);
    }

    #[test]
    fn unterminated_final_paragraph_is_flagged() {
        let mut store = history(64, 16);
        store.store_text("One\nprompt>").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();
        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 7);
        assert!(!cursor.rewound_paragraph_was_newline_terminated());
    }

    #[test]
    fn repeat_after_rewind_replays_the_paragraph() {
        let mut store = history(64, 16);
        store.store_text("Hello\nWorld\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();
        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 5);

        let undelivered = cursor.repeat_paragraphs(&store, 1, true, true).unwrap();
        assert_eq!(undelivered, 0);
        assert_eq!(cursor.target().text, "World");
        assert!(cursor.is_at_front(&store).unwrap());
    }

    #[test]
    fn repeat_forwards_metadata_to_the_target() {
        let mut store = history(64, 16);
        store.store_text("A\n").unwrap();
        store
            .store_metadata(Metadata::Colour {
                foreground: Colour::Palette(4),
                background: Colour::Palette(2),
            })
            .unwrap();
        store.store_text("B\n").unwrap();

        let mut cursor = HistoryCursor::new(
            &store,
            Recorder::default(),
            CursorFlags::FROM_BUFFER_BACK,
        )
        .unwrap();
        let undelivered = cursor.repeat_paragraphs(&store, 2, true, true).unwrap();
        assert_eq!(undelivered, 0);
        assert_eq!(cursor.target().text, "A\nB");
        // Initial sync plus the in-band record.
        assert_eq!(
            cursor.target().colours.last().copied().unwrap(),
            (Colour::Palette(4), Colour::Palette(2))
        );
        assert_eq!(cursor.state().foreground, Colour::Palette(4));
    }

    #[test]
    fn writes_invalidate_live_cursors() {
        let mut store = history(64, 16);
        store.store_text("Hello\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();
        store.store_text("x").unwrap();
        assert_eq!(
            cursor.rewind_paragraph(&store),
            Err(HistoryError::CursorInvalidated)
        );
        assert_eq!(
            cursor.is_at_front(&store),
            Err(HistoryError::CursorInvalidated)
        );
    }

    #[test]
    fn no_validation_cursor_survives_writes() {
        let mut store = history(64, 16);
        store.store_text("Hello\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::NO_VALIDATION).unwrap();
        store.store_text("x").unwrap();
        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 5);
    }

    #[test]
    fn remember_restore_round_trips_the_walk_state() {
        let mut store = history(64, 16);
        store.store_text("One\nTwo\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();

        let (first, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(first, 3);
        cursor.remember(&store).unwrap();

        let (second, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(second, 3);

        cursor.restore(&store).unwrap();
        let (again, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(again, second);
    }

    #[test]
    fn alter_without_a_seen_attribute_record_fails() {
        let mut store = history(64, 16);
        store.store_text("Hello\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();
        assert_eq!(
            cursor.alter_last_paragraph_attributes(&mut store, 1, 2),
            Err(HistoryError::NoParagraphAttributes)
        );
    }

    #[test]
    fn full_wrapped_buffer_replays_from_the_back() {
        let mut store = history(16, 16);
        store.store_text("AAAAA\n").unwrap();
        store.store_text("BBBBB\n").unwrap();
        store.store_text("CCCCC\n").unwrap();
        // Filled through incremental wrapping: the back shares its offset
        // with the front.
        assert_eq!(store.space_available(), 0);
        assert_eq!(store.space_used(), 16);

        let mut cursor = HistoryCursor::new(
            &store,
            Recorder::default(),
            CursorFlags::FROM_BUFFER_BACK,
        )
        .unwrap();
        let undelivered = cursor.repeat_paragraphs(&store, 3, false, false).unwrap();
        assert_eq!(undelivered, 0);
        assert_eq!(cursor.target().text, "AAA\nBBBBB\nCCCCC");
    }

    #[test]
    fn empty_paragraphs_rewind_with_zero_count() {
        let mut store = history(64, 16);
        store.store_text("One\n\n\n").unwrap();
        let mut cursor =
            HistoryCursor::new(&store, Recorder::default(), CursorFlags::empty()).unwrap();
        // Two empty paragraphs, then "One".
        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 0);
        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 0);
        let (count, _) = rewound(cursor.rewind_paragraph(&store).unwrap());
        assert_eq!(count, 3);
        assert_eq!(cursor.rewind_paragraph(&store).unwrap(), Rewind::BufferBack);
    }
}
