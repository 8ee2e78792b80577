//! Transport counters and the tic cycle
//!
//! `tic()` runs once per played buffer. It accumulates buffer time in
//! `delay_counter` and, each time a 16th-note boundary is crossed,
//! advances the note offset (honouring the loop region), the absolute
//! offset, the tact counter and the timing-table cursor in one step.

use sc_core::{ConfigError, ConfigResult, DEFAULT_LOOP_LEFT, DEFAULT_LOOP_RIGHT};

use crate::TimingTable;

/// Notification published to transport observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// A 16th-note boundary was crossed
    OffsetChanged {
        previous: u32,
        note_offset: u32,
        note_offset_absolute: u64,
        /// Timing-table cursor after the crossing
        tic_counter: usize,
    },
    /// Playback stopped and counters were reset
    Stopped,
}

/// Playback position and loop region
#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    note_offset: u32,
    note_offset_absolute: u64,
    start_note_offset: u32,

    loop_left: u32,
    loop_right: u32,
    do_loop: bool,
    loop_offset: u32,

    tic_counter: usize,
    delay_counter: f64,
    tact_counter: f64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            note_offset: 0,
            note_offset_absolute: 0,
            start_note_offset: 0,
            loop_left: DEFAULT_LOOP_LEFT,
            loop_right: DEFAULT_LOOP_RIGHT,
            do_loop: false,
            loop_offset: 0,
            tic_counter: 0,
            delay_counter: 0.0,
            tact_counter: 0.0,
        }
    }
}

impl TransportState {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TIC CYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Account for one played buffer.
    ///
    /// Crosses a boundary when `delay_counter + 1 >= delay[tic_counter]`,
    /// carrying the remainder forward. Delays shorter than one buffer can
    /// cross several boundaries in a single call; every crossing is
    /// reported through `on_event`. Returns the number of crossings.
    pub fn tic(&mut self, table: &TimingTable, mut on_event: impl FnMut(TransportEvent)) -> usize {
        let mut counter = self.delay_counter + 1.0;
        let mut crossings = 0;

        loop {
            let delay = table.get_delay(self.tic_counter);
            if delay <= 0.0 || counter < delay {
                break;
            }

            counter -= delay;
            crossings += 1;
            on_event(self.cross_boundary(table.period()));
        }

        self.delay_counter = counter.max(0.0);
        crossings
    }

    fn cross_boundary(&mut self, period: usize) -> TransportEvent {
        let previous = self.note_offset;

        if self.do_loop && self.note_offset.wrapping_add(1) == self.loop_right {
            self.note_offset = self.loop_left;
        } else {
            self.note_offset = self.note_offset.wrapping_add(1);
        }

        self.note_offset_absolute += 1;
        self.tact_counter += 1.0;
        self.tic_counter = (self.tic_counter + 1) % period;

        TransportEvent::OffsetChanged {
            previous,
            note_offset: self.note_offset,
            note_offset_absolute: self.note_offset_absolute,
            tic_counter: self.tic_counter,
        }
    }

    /// Back to the initial state: `note_offset = start_note_offset`, counters zeroed.
    /// The loop region is kept.
    pub fn reset(&mut self) {
        self.note_offset = self.start_note_offset;
        self.note_offset_absolute = 0;
        self.tic_counter = 0;
        self.delay_counter = 0.0;
        self.tact_counter = 0.0;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTERS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn set_note_offset(&mut self, note_offset: u32) {
        self.note_offset = note_offset;
    }

    pub fn set_note_offset_absolute(&mut self, note_offset_absolute: u64) {
        self.note_offset_absolute = note_offset_absolute;
    }

    pub fn set_start_note_offset(&mut self, start_note_offset: u32) {
        self.start_note_offset = start_note_offset;
    }

    /// Set the loop region. Enabling the loop snapshots the current
    /// note offset into `loop_offset`.
    pub fn set_loop(&mut self, left: u32, right: u32, do_loop: bool) -> ConfigResult<()> {
        if do_loop && left >= right {
            return Err(ConfigError::InvalidLoop { left, right });
        }

        self.loop_left = left;
        self.loop_right = right;

        if do_loop && !self.do_loop {
            self.loop_offset = self.note_offset;
        }
        self.do_loop = do_loop;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GETTERS
    // ═══════════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn note_offset(&self) -> u32 {
        self.note_offset
    }

    #[inline]
    pub fn note_offset_absolute(&self) -> u64 {
        self.note_offset_absolute
    }

    #[inline]
    pub fn start_note_offset(&self) -> u32 {
        self.start_note_offset
    }

    /// `(left, right, enabled)`
    pub fn loop_region(&self) -> (u32, u32, bool) {
        (self.loop_left, self.loop_right, self.do_loop)
    }

    /// Note offset at the moment looping was enabled
    #[inline]
    pub fn loop_offset(&self) -> u32 {
        self.loop_offset
    }

    #[inline]
    pub fn tic_counter(&self) -> usize {
        self.tic_counter
    }

    #[inline]
    pub fn delay_counter(&self) -> f64 {
        self.delay_counter
    }

    #[inline]
    pub fn tact_counter(&self) -> f64 {
        self.tact_counter
    }
}
