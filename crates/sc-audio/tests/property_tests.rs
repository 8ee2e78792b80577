//! Randomized invariant sweeps
//!
//! Seeded ChaCha8 inputs over:
//! - Delay/attack tables for arbitrary tempo and presets
//! - Transport crossing count and delay-counter bounds
//! - Buffer pool rotation and reallocation

use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use sc_audio::{RingBufferPool, TimingTable, TransportEvent, TransportState, absolute_delay};
use sc_core::DEFAULT_PERIOD;

const SEED: u64 = 0x5C_A0D1;
const ITERATIONS: usize = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// TIMING TABLE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_tables_follow_tempo() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    for _ in 0..ITERATIONS {
        let samplerate = rng.random_range(8000..192_000u32);
        let buffer_size = rng.random_range(16..4096u32);
        let bpm = rng.random_range(20.0..300.0);
        let delay_factor = rng.random_range(0.1..2.0);

        let table = TimingTable::with_params(samplerate, buffer_size, bpm, delay_factor).unwrap();
        let expected = absolute_delay(samplerate, buffer_size, bpm, delay_factor);

        assert_eq!(table.period(), DEFAULT_PERIOD);
        assert_eq!(table.absolute_delay(), expected);
        assert!(table.delays().iter().all(|&d| d == expected));
        assert!(table.attacks().iter().all(|&a| a < buffer_size));
        assert_eq!(table.get_attack(0), 0);

        let measure: f64 = table.delays()[..16].iter().sum();
        assert_relative_eq!(measure, 16.0 * expected, max_relative = 1e-12);

        // One period of delays spans 1024 sixteenths
        let span: f64 = table.delays().iter().sum();
        assert_relative_eq!(span, expected * DEFAULT_PERIOD as f64, max_relative = 1e-9);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_crossings_match_elapsed_buffers() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 1);

    for _ in 0..ITERATIONS {
        let delay = rng.random_range(0.3..20.0);
        let calls = rng.random_range(1..3000usize);

        let mut table = TimingTable::default();
        table.set_constant_delay(delay).unwrap();

        let mut transport = TransportState::new();
        let mut events = 0usize;
        let mut crossings = 0usize;

        for _ in 0..calls {
            crossings += transport.tic(&table, |event| {
                assert!(matches!(event, TransportEvent::OffsetChanged { .. }));
                events += 1;
            });
            assert!(transport.delay_counter() >= 0.0);
            assert!(transport.delay_counter() < delay + 1e-9);
        }

        let eps = 1e-6 * calls as f64;
        assert_eq!(events, crossings);
        assert_eq!(transport.note_offset_absolute(), crossings as u64);
        assert_eq!(transport.tic_counter(), crossings % DEFAULT_PERIOD);
        assert!(crossings as f64 * delay <= calls as f64 + eps);
        assert!((crossings + 1) as f64 * delay > calls as f64 - eps);
    }
}

#[test]
fn test_loop_keeps_offset_in_region() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 2);

    for _ in 0..ITERATIONS {
        let left = rng.random_range(0..32u32);
        let right = rng.random_range(left + 1..left + 64);

        let mut table = TimingTable::default();
        table.set_constant_delay(rng.random_range(0.5..4.0)).unwrap();

        let mut transport = TransportState::new();
        transport.set_note_offset(left);
        transport.set_loop(left, right, true).unwrap();

        for _ in 0..500 {
            transport.tic(&table, |_| {});
            assert!((left..right).contains(&transport.note_offset()));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUFFER POOL
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_pool_rotation_and_realloc() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 3);

    for _ in 0..ITERATIONS / 4 {
        let count = rng.random_range(2..9usize);
        let channels = rng.random_range(1..9u32);
        let pool = RingBufferPool::new(count, channels, 4, 64);

        let switches = rng.random_range(0..50usize);
        for _ in 0..switches {
            pool.switch_current();
        }
        assert_eq!(pool.current_index(), switches % count);
        assert_eq!(pool.next().index(), (switches + 1) % count);
        assert_eq!(pool.prev().index(), (switches + count - 1) % count);

        let channels = rng.random_range(1..9u32);
        let bytes = rng.random_range(1..8192usize);
        pool.realloc(channels, bytes);

        for index in 0..count {
            let handle = pool.handle(index).unwrap();
            assert_eq!(pool.buffer_len(handle), Some(bytes));
            assert!(pool.try_lock_sub_block(handle, channels - 1, 3).is_some());
            assert!(pool.try_lock_sub_block(handle, channels, 0).is_none());
        }
    }
}
