//! Playback time helpers

/// Uptime shown while nothing plays
pub const UPTIME_ZERO: &str = "0000:00.000";

/// Seconds covered by one tic at the given tempo
#[inline]
pub fn tic_seconds(bpm: f64, delay_factor: f64) -> f64 {
    60.0 / (bpm * 16.0 * delay_factor)
}

/// Format elapsed playback as `"MMMM:SS.mmm"` from an absolute note offset
pub fn uptime_from_offset(note_offset_absolute: u64, bpm: f64, delay_factor: f64) -> String {
    let seconds = note_offset_absolute as f64 * tic_seconds(bpm, delay_factor);

    if !seconds.is_finite() || seconds < 0.0 {
        return UPTIME_ZERO.to_string();
    }

    let total_ms = (seconds * 1000.0).round() as u64;
    let minutes = total_ms / 60_000;
    let secs = (total_ms / 1000) % 60;
    let ms = total_ms % 1000;

    format!("{minutes:04}:{secs:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_zero() {
        assert_eq!(uptime_from_offset(0, 120.0, 1.0), UPTIME_ZERO);
    }

    #[test]
    fn test_uptime_minutes() {
        // 120 bpm: 32 tics per second
        assert_eq!(uptime_from_offset(32, 120.0, 1.0), "0000:01.000");
        assert_eq!(uptime_from_offset(32 * 61 + 16, 120.0, 1.0), "0001:01.500");
    }

    #[test]
    fn test_uptime_invalid_tempo() {
        assert_eq!(uptime_from_offset(10, 0.0, 1.0), UPTIME_ZERO);
    }
}
