//! The output-history store: a bounded, wrap-around buffer of wide code
//! units with in-band presentation metadata.
//!
//! The buffer grows in fixed increments up to a configured maximum; once
//! full, the newest output overwrites the oldest. `front` is the offset the
//! next unit will be written to, `back` the offset of the oldest stored
//! unit. While `wraps == 0` the live region is linear (`back..front`); after
//! the first wrap it is `back..size` followed by `0..front`, and
//! `front == back` means the buffer is completely full.
//!
//! Two presentation states bracket the live region: `back_state` summarises
//! every metadata record that has been overwritten (so a backward scan that
//! runs off the region end knows what was in effect there), and
//! `front_state` is the state the next written unit will be displayed under.
//!
//! Overwriting is mediated by the back-drain: before old units are
//! destroyed they are scanned, metadata records are folded into
//! `back_state`, and paragraph-attribute records trigger the registered
//! paragraph-removal callback once the paragraph they belong to is gone.

use std::fmt;

use tracing::trace;

use crate::attrs::{Colour, Font, StyleFlags, TextState, ZUcs, ZUCS_NEWLINE};
use crate::error::HistoryError;
use crate::metadata::{
    decode_param, record_len, Metadata, MAX_METADATA_LEN, METADATA_ESCAPE, METADATA_KIND_COLOUR,
    METADATA_KIND_FONT, METADATA_KIND_PARAGRAPH_ATTRIBUTE, METADATA_KIND_STYLE,
};

/// Size of a metadata state block, in code units.
///
/// Whenever the front crosses into a new block, the store stamps explicit
/// font, style, and colour records so that any backward state
/// reconstruction finds an anchor for each attribute within one block.
pub const METADATA_STATE_BLOCK_SIZE: usize = 256;

/// The buffer is never allocated smaller than the largest metadata record,
/// which lets the back-drain overshoot a record straddling its range.
const MIN_BUFFER_SIZE: usize = MAX_METADATA_LEN;

/// Per-store paragraph-removal callback. Receives the two decoded
/// parameters of a paragraph-attribute record whose paragraph fell off the
/// back of the buffer.
pub type ParagraphRemovalFn = dyn FnMut(i16, i16);

/// Construction parameters for [`OutputHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Largest size the backing buffer may grow to, in code units.
    pub maximum_size: usize,
    /// Growth step, in code units.
    pub increment_size: usize,
    /// Presentation state in effect before anything is stored. Seeds both
    /// the back state and the front state.
    pub initial_state: TextState,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            maximum_size: 65536,
            increment_size: 4096,
            initial_state: TextState::default(),
        }
    }
}

/// A per-window output history.
///
/// Created empty (no backing allocation); the buffer is allocated and grown
/// on demand by the write paths. One history serves one window; the
/// embedder owns the window-number mapping.
pub struct OutputHistory {
    buffer: Vec<ZUcs>,
    /// Current buffer size in code units. The backing vector holds one
    /// extra guard cell that always contains `0`.
    size: usize,
    maximum_size: usize,
    increment_size: usize,
    /// Offset the next code unit will be written to.
    front: usize,
    /// Offset of the oldest stored code unit.
    back: usize,
    /// Number of times the front has passed the buffer end.
    wraps: u32,
    back_state: TextState,
    front_state: TextState,
    /// Block-aligned offset last stamped with a forced state block.
    last_metadata_block_index: usize,
    /// Earliest newline at or after `back`, if known. Gates the
    /// paragraph-removal callback: attribute records between `back` and this
    /// newline belong to an already-truncated paragraph and were reported
    /// when it was truncated.
    next_newline_after_back: Option<usize>,
    paragraph_removal: Option<Box<ParagraphRemovalFn>>,
}

impl fmt::Debug for OutputHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHistory")
            .field("size", &self.size)
            .field("maximum_size", &self.maximum_size)
            .field("increment_size", &self.increment_size)
            .field("front", &self.front)
            .field("back", &self.back)
            .field("wraps", &self.wraps)
            .field("back_state", &self.back_state)
            .field("front_state", &self.front_state)
            .finish_non_exhaustive()
    }
}

impl OutputHistory {
    /// Create an empty history. No backing store is allocated until the
    /// first write.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            buffer: Vec::new(),
            size: 0,
            maximum_size: config.maximum_size.max(MIN_BUFFER_SIZE),
            increment_size: config.increment_size.max(1),
            front: 0,
            back: 0,
            wraps: 0,
            back_state: config.initial_state,
            front_state: config.initial_state,
            last_metadata_block_index: 0,
            next_newline_after_back: None,
            paragraph_removal: None,
        }
    }

    /// Create an empty history with a paragraph-removal callback installed.
    #[must_use]
    pub fn with_paragraph_removal<F>(config: HistoryConfig, callback: F) -> Self
    where
        F: FnMut(i16, i16) + 'static,
    {
        let mut history = Self::new(config);
        history.paragraph_removal = Some(Box::new(callback));
        history
    }

    /// Install or replace the paragraph-removal callback.
    ///
    /// The callback must not call back into this history.
    pub fn set_paragraph_removal<F>(&mut self, callback: F)
    where
        F: FnMut(i16, i16) + 'static,
    {
        self.paragraph_removal = Some(Box::new(callback));
    }

    // ── Space accounting ────────────────────────────────────────────

    /// Current size of the backing buffer in code units.
    #[inline]
    #[must_use]
    pub fn allocated_size(&self) -> usize {
        self.size
    }

    /// Largest size the buffer may grow to.
    #[inline]
    #[must_use]
    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    /// Number of live code units currently stored.
    #[must_use]
    pub fn space_used(&self) -> usize {
        if self.size == 0 {
            0
        } else if self.wraps == 0 {
            self.front - self.back
        } else {
            self.size - (self.back - self.front)
        }
    }

    /// Number of code units that can be written before old data is
    /// overwritten (given the current allocation).
    #[must_use]
    pub fn space_available(&self) -> usize {
        if self.size == 0 {
            0
        } else if self.wraps == 0 {
            self.size - self.front
        } else {
            self.back - self.front
        }
    }

    /// Whether no live code units are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.space_used() == 0
    }

    /// Whether every buffer cell holds live data.
    ///
    /// A buffer filled through incremental wrapping keeps `front == back`
    /// with a nonzero wrap count; the wrap count is what separates that
    /// state from an empty buffer, and replay walks consult it to walk
    /// once around from the shared offset instead of bailing.
    pub(crate) fn is_full(&self) -> bool {
        self.size > 0 && self.space_used() == self.size
    }

    /// Presentation state in effect at the oldest stored code unit.
    #[inline]
    #[must_use]
    pub fn back_state(&self) -> TextState {
        self.back_state
    }

    /// Presentation state the next written code unit will be displayed
    /// under.
    #[inline]
    #[must_use]
    pub fn front_state(&self) -> TextState {
        self.front_state
    }

    /// Iterate over the live code units from oldest to newest.
    pub fn iter_live(&self) -> impl Iterator<Item = ZUcs> + '_ {
        let (older, newer) = if self.size == 0 {
            (0..0, 0..0)
        } else if self.wraps == 0 {
            (self.back..self.front, 0..0)
        } else {
            (self.back..self.size, 0..self.front)
        };
        older.chain(newer).map(move |offset| self.buffer[offset])
    }

    // ── Offset arithmetic ───────────────────────────────────────────

    #[inline]
    pub(crate) fn front_offset(&self) -> usize {
        self.front
    }

    #[inline]
    pub(crate) fn back_offset(&self) -> usize {
        self.back
    }

    #[inline]
    pub(crate) fn wrap_count(&self) -> u32 {
        self.wraps
    }

    /// The code unit at `offset`. The guard cell (offset == size) reads as
    /// `0`.
    #[inline]
    pub(crate) fn unit_at(&self, offset: usize) -> ZUcs {
        self.buffer[offset]
    }

    #[inline]
    pub(crate) fn write_unit_at(&mut self, offset: usize, unit: ZUcs) {
        self.buffer[offset] = unit;
    }

    /// Advance an offset by one, wrapping past the buffer end.
    #[inline]
    pub(crate) fn advance(&self, offset: usize) -> usize {
        if offset + 1 >= self.size {
            0
        } else {
            offset + 1
        }
    }

    /// Advance an offset by one for a forward walk that must stop at the
    /// front. Unlike [`Self::advance`] this can yield `front` even when the
    /// front sits one past the buffer end (exactly-full linear buffer).
    #[inline]
    pub(crate) fn advance_walk(&self, offset: usize) -> usize {
        let next = offset + 1;
        if next == self.front {
            next
        } else if next >= self.size {
            0
        } else {
            next
        }
    }

    /// Decrement an offset by one, wrapping from the buffer start to the
    /// end and counting the crossing in `local_wraps`.
    ///
    /// Fails (returns `None`) at the start of a non-wrapped buffer, or when
    /// a walker that has already crossed the wrap boundary reaches the
    /// back of a completely full buffer.
    pub(crate) fn decrement(&self, offset: usize, local_wraps: &mut u32) -> Option<usize> {
        if offset == self.back && offset == self.front && *local_wraps > 0 {
            return None;
        }
        if offset == 0 {
            if self.wraps == 0 {
                None
            } else {
                *local_wraps = local_wraps.wrapping_sub(1);
                Some(self.size - 1)
            }
        } else {
            Some(offset - 1)
        }
    }

    // ── Growth ──────────────────────────────────────────────────────

    /// Try to grow the buffer to `desired_size` code units (clamped to the
    /// maximum), plus the guard cell. On allocation failure the size is
    /// left unchanged; no data is lost either way.
    fn try_grow(&mut self, desired_size: usize) {
        let new_size = desired_size.min(self.maximum_size);
        if new_size <= self.size {
            return;
        }
        let needed = (new_size + 1).saturating_sub(self.buffer.len());
        if self.buffer.try_reserve_exact(needed).is_err() {
            trace!(new_size, "history buffer growth failed");
            return;
        }
        let old_size = self.size;
        self.buffer.resize(new_size + 1, 0);
        if self.wraps > 0 && old_size > 0 {
            // The oldest segment sat at the old buffer end; move it to the
            // new end so the ring stays contiguous, and rebase the offsets
            // that pointed into it.
            let delta = new_size - old_size;
            self.buffer.copy_within(self.back..old_size, self.back + delta);
            if let Some(newline) = self.next_newline_after_back {
                if newline >= self.back {
                    self.next_newline_after_back = Some(newline + delta);
                }
            }
            self.back += delta;
        }
        self.size = new_size;
        self.buffer[new_size] = 0;
        trace!(old_size, new_size, "history buffer grown");
    }

    // ── Back-drain ──────────────────────────────────────────────────

    /// Process `count` code units at the back that are about to be
    /// overwritten: fold metadata into `back_state`, report dropped
    /// paragraph attributes, and keep the cached next-newline position
    /// consistent.
    ///
    /// May consume a few units more than `count` when a metadata record
    /// straddles the end of the range; the minimum buffer size guarantees
    /// the overshoot stays inside the buffer.
    fn process_buffer_back(&mut self, count: usize) -> Result<(), HistoryError> {
        if self.size == 0 || count == 0 {
            return Ok(());
        }
        trace!(count, back = self.back, "draining buffer back");
        let size = self.size;
        let next = |offset: usize| if offset + 1 >= size { 0 } else { offset + 1 };

        let mut index = self.back;
        let mut remaining = count as i64;
        while remaining > 0 {
            if self.next_newline_after_back == Some(index) {
                self.next_newline_after_back = None;
            }
            if self.buffer[index] == METADATA_ESCAPE {
                index = next(index);
                remaining -= 1;
                let kind = self.buffer[index];
                match kind {
                    METADATA_ESCAPE => {}
                    METADATA_KIND_FONT => {
                        index = next(index);
                        remaining -= 1;
                        self.back_state.font = Font(decode_param(self.buffer[index]));
                    }
                    METADATA_KIND_STYLE => {
                        index = next(index);
                        remaining -= 1;
                        self.back_state.style =
                            StyleFlags::from_code(decode_param(self.buffer[index]));
                    }
                    METADATA_KIND_COLOUR => {
                        index = next(index);
                        remaining -= 1;
                        self.back_state.foreground =
                            Colour::from_code(decode_param(self.buffer[index]))?;
                        index = next(index);
                        remaining -= 1;
                        self.back_state.background =
                            Colour::from_code(decode_param(self.buffer[index]))?;
                    }
                    METADATA_KIND_PARAGRAPH_ATTRIBUTE => {
                        index = next(index);
                        remaining -= 1;
                        let attr1 = decode_param(self.buffer[index]);
                        index = next(index);
                        remaining -= 1;
                        if self.next_newline_after_back.is_none() {
                            let attr2 = decode_param(self.buffer[index]);
                            if let Some(callback) = self.paragraph_removal.as_mut() {
                                callback(attr1, attr2);
                            }
                        }
                    }
                    other => return Err(HistoryError::InvalidMetadata { kind: other }),
                }
            }
            index = next(index);
            remaining -= 1;
        }

        // If the drain passed the cached newline (or none was cached),
        // locate the next newline at or after the new back. Attribute
        // records crossed on the way belong to the truncated paragraph and
        // are reported now.
        if self.paragraph_removal.is_some() && self.next_newline_after_back.is_none() {
            while self.buffer[index] != ZUCS_NEWLINE {
                if index == self.front {
                    break;
                }
                index = next(index);
                if self.buffer[index] == METADATA_ESCAPE {
                    index = next(index);
                    let kind = self.buffer[index];
                    index = next(index);
                    let param1 = self.buffer[index];
                    if kind == METADATA_KIND_PARAGRAPH_ATTRIBUTE || kind == METADATA_KIND_COLOUR {
                        index = next(index);
                        if kind == METADATA_KIND_PARAGRAPH_ATTRIBUTE {
                            let attr1 = decode_param(param1);
                            let attr2 = decode_param(self.buffer[index]);
                            if let Some(callback) = self.paragraph_removal.as_mut() {
                                callback(attr1, attr2);
                            }
                        }
                    }
                }
            }
            self.next_newline_after_back = Some(index);
        }
        Ok(())
    }

    // ── State blocks ────────────────────────────────────────────────

    /// Stamp a forced font+style+colour state block if the front has
    /// crossed into a new block since the last stamp.
    ///
    /// The records reflect the back state: a backward scan that starts
    /// anywhere and runs toward the back must reconstruct the state that
    /// held there, so that is the state anchored.
    fn write_state_block_if_needed(&mut self) -> Result<(), HistoryError> {
        let buffer_index = self.front;
        let block_index = buffer_index - (buffer_index % METADATA_STATE_BLOCK_SIZE);
        if block_index != self.last_metadata_block_index {
            trace!(block_index, "stamping metadata state block");
            let state = self.back_state;
            self.store_metadata(Metadata::Font(state.font))?;
            self.store_metadata(Metadata::Style(state.style))?;
            self.store_metadata(Metadata::Colour {
                foreground: state.foreground,
                background: state.background,
            })?;
        }
        self.last_metadata_block_index = block_index;
        Ok(())
    }

    // ── Writer API ──────────────────────────────────────────────────

    /// Store a string of text. Convenience over [`Self::store_units`].
    pub fn store_text(&mut self, text: &str) -> Result<(), HistoryError> {
        if text.is_empty() {
            return Ok(());
        }
        let units: Vec<ZUcs> = text.chars().map(ZUcs::from).collect();
        self.store_units(&units)
    }

    /// Store text code units. The escape value `0` must not appear in
    /// `data`; it is reserved for in-band metadata.
    pub fn store_units(&mut self, data: &[ZUcs]) -> Result<(), HistoryError> {
        self.store_chars(data, true)
    }

    /// Store a metadata record.
    ///
    /// Font, style, and colour records also update the front state so that
    /// subsequent text is known to display under the recorded attributes.
    /// Colour parameters outside `-2..=15` are rejected as fatal.
    pub fn store_metadata(&mut self, metadata: Metadata) -> Result<(), HistoryError> {
        let mut record = [0 as ZUcs; MAX_METADATA_LEN];
        let len = metadata.encode(&mut record)?;
        match metadata {
            Metadata::Font(font) => self.front_state.font = font,
            Metadata::Style(style) => self.front_state.style = style,
            Metadata::Colour {
                foreground,
                background,
            } => {
                self.front_state.foreground = foreground;
                self.front_state.background = background;
            }
            Metadata::ParagraphAttributes { .. } => {}
        }
        // State-block evaluation stays off here: stamping a state block
        // writes metadata itself, and must not re-trigger.
        self.store_chars(&record[..len], false)
    }

    /// The sole ingestion path for buffer data.
    fn store_chars(&mut self, data: &[ZUcs], evaluate_state_block: bool) -> Result<(), HistoryError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut data = data;
        let mut len = data.len();
        trace!(len, "storing code units");

        if len >= self.maximum_size {
            // The input is at least as large as the whole buffer: everything
            // currently stored will be overwritten. Drain the entire live
            // region, then lay down the tail of the input linearly.
            let used = self.space_used();
            self.process_buffer_back(used)?;
            if self.size < self.maximum_size {
                self.try_grow(self.maximum_size);
            }
            if self.size == 0 {
                return Ok(());
            }
            let size = self.size;
            self.buffer[..size].copy_from_slice(&data[len - size..]);
            // Exactly full, linear layout: the oldest unit at the buffer
            // start, the write position one past the end. A back-seeded
            // cursor keeps the whole region ahead of it, distinct from a
            // cursor standing at the front.
            self.front = size;
            self.back = 0;
            self.wraps = 0;
            self.next_newline_after_back = None;
            return Ok(());
        }

        if self.space_available() < len {
            let missing = len - self.space_available();
            let increments = missing / self.increment_size + 1;
            let desired = (self.size + increments * self.increment_size).min(self.maximum_size);
            if desired > self.size {
                self.try_grow(desired);
            }
        }
        if self.size < len {
            // Not enough space even after growing: silently drop the head
            // of the input, exactly as the oldest stored data would have
            // been dropped had it fit.
            data = &data[len - self.size..];
            len = self.size;
        }

        if self.wraps == 0 {
            let room = self.size - self.front;
            let to_write = room.min(len);
            if to_write > 0 {
                self.buffer[self.front..self.front + to_write]
                    .copy_from_slice(&data[..to_write]);
                self.front += to_write;
            }
            data = &data[to_write..];
            if to_write == len {
                if evaluate_state_block {
                    self.write_state_block_if_needed()?;
                }
                return Ok(());
            }
            len -= to_write;
            self.wraps = self.wraps.wrapping_add(1);
            if self.wraps == 0 {
                self.wraps = 1;
            }
            self.front = 0;
        }

        while len > 0 {
            let to_write = if self.front + len > self.size {
                self.size - self.front
            } else {
                len
            };
            self.process_buffer_back(to_write)?;
            self.buffer[self.front..self.front + to_write].copy_from_slice(&data[..to_write]);
            self.front += to_write;
            if self.front == self.size {
                self.front = 0;
            }
            len -= to_write;
            data = &data[to_write..];
            self.back = self.front;
        }

        if evaluate_state_block {
            self.write_state_block_if_needed()?;
        }
        Ok(())
    }

    /// Remove the last `count` text characters, walking the front backward.
    ///
    /// Metadata record bodies do not count as removed characters: crossing
    /// a record adjusts the walk budget by the record's full width (3 or
    /// 4). Used to expunge preloaded input from the history.
    pub fn remove_chars(&mut self, count: usize) -> Result<(), HistoryError> {
        let mut offset = self.front;
        let mut local_wraps = self.wraps;
        let mut last_unit: ZUcs = 0;
        let mut remaining = count as i64;
        trace!(count, front = self.front, "removing characters");

        while remaining > 0 {
            offset = self
                .decrement(offset, &mut local_wraps)
                .ok_or(HistoryError::CannotRewind)?;
            let unit = self.buffer[offset];
            if unit == METADATA_ESCAPE && last_unit != 0 {
                // Walked over a whole record: adjust the budget by its
                // full width so the body does not count as removed text.
                remaining += record_len(last_unit).unwrap_or(3) as i64;
            } else {
                last_unit = unit;
                remaining -= 1;
            }
        }

        self.front = offset;
        self.wraps = local_wraps;
        Ok(())
    }
}
