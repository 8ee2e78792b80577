//! Delay / attack tables
//!
//! Reconciles a musical tempo with a fixed hardware buffer size. One slot
//! per 16th-note tic over a full period: `delay[i]` is the (fractional)
//! number of buffers until the next tic, `attack[i]` is the frame inside
//! the buffer where tic `i` lands.

use sc_core::{ConfigError, ConfigResult, DEFAULT_PERIOD, validate_bpm, validate_delay_factor};

/// Buffers per 16th note: `60 × ((samplerate / buffer_size) / bpm) × 1/16 × 1/delay_factor`
pub fn absolute_delay(samplerate: u32, buffer_size: u32, bpm: f64, delay_factor: f64) -> f64 {
    60.0 * ((samplerate as f64 / buffer_size as f64) / bpm) * (1.0 / 16.0) * (1.0 / delay_factor)
}

/// Per-slot delay and attack lookup
#[derive(Debug, Clone)]
pub struct TimingTable {
    delay: Vec<f64>,
    attack: Vec<u32>,
    absolute_delay: f64,
    buffer_size: u32,
    recomputed: u64,
}

impl TimingTable {
    /// Empty table of `period` slots; call [`recompute`](Self::recompute) before use
    pub fn new(period: usize) -> Self {
        let period = period.max(1);

        Self {
            delay: vec![0.0; period],
            attack: vec![0; period],
            absolute_delay: 0.0,
            buffer_size: 0,
            recomputed: 0,
        }
    }

    /// Table computed for the given parameters
    pub fn with_params(samplerate: u32, buffer_size: u32, bpm: f64, delay_factor: f64) -> ConfigResult<Self> {
        let mut table = Self::new(DEFAULT_PERIOD);
        table.recompute(samplerate, buffer_size, bpm, delay_factor)?;
        Ok(table)
    }

    /// Refill every slot. Leaves the table untouched on invalid input.
    pub fn recompute(&mut self, samplerate: u32, buffer_size: u32, bpm: f64, delay_factor: f64) -> ConfigResult<()> {
        if samplerate == 0 {
            return Err(ConfigError::ZeroSamplerate);
        }
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        validate_bpm(bpm)?;
        validate_delay_factor(delay_factor)?;

        let delay = absolute_delay(samplerate, buffer_size, bpm, delay_factor);

        self.absolute_delay = delay;
        self.buffer_size = buffer_size;
        self.delay.fill(delay);
        self.derive_attack();
        self.recomputed += 1;

        Ok(())
    }

    /// Replace one slot's delay (swing, tempo ramps) and re-derive attack
    pub fn override_delay(&mut self, slot: usize, delay: f64) -> ConfigResult<()> {
        if !delay.is_finite() || delay <= 0.0 {
            return Err(ConfigError::InvalidDelay(delay));
        }

        let len = self.delay.len();
        self.delay[slot % len] = delay;
        self.derive_attack();

        Ok(())
    }

    /// Same delay in every slot
    pub fn set_constant_delay(&mut self, delay: f64) -> ConfigResult<()> {
        if !delay.is_finite() || delay <= 0.0 {
            return Err(ConfigError::InvalidDelay(delay));
        }

        self.delay.fill(delay);
        self.derive_attack();

        Ok(())
    }

    // attack[i] is the frame phase of the exact cumulative position, so
    // truncation never accumulates across slots.
    fn derive_attack(&mut self) {
        let buffer_size = self.buffer_size as f64;
        let mut position = 0.0;

        for (attack, delay) in self.attack.iter_mut().zip(&self.delay) {
            *attack = if self.buffer_size == 0 {
                0
            } else {
                ((position * buffer_size).floor() as u64 % self.buffer_size as u64) as u32
            };
            position += delay;
        }
    }

    #[inline]
    pub fn get_delay(&self, tic_counter: usize) -> f64 {
        self.delay[tic_counter % self.delay.len()]
    }

    #[inline]
    pub fn get_attack(&self, tic_counter: usize) -> u32 {
        self.attack[tic_counter % self.attack.len()]
    }

    /// Number of slots (the period length)
    #[inline]
    pub fn period(&self) -> usize {
        self.delay.len()
    }

    #[inline]
    pub fn absolute_delay(&self) -> f64 {
        self.absolute_delay
    }

    pub fn delays(&self) -> &[f64] {
        &self.delay
    }

    pub fn attacks(&self) -> &[u32] {
        &self.attack
    }

    /// How many times the table has been fully recomputed
    pub fn recompute_count(&self) -> u64 {
        self.recomputed
    }
}

impl Default for TimingTable {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}
