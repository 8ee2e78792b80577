//! Test tone written into app buffers

use std::f64::consts::TAU;

use sc_core::SoundcardFormat;

/// Continuous sine, phase carried across buffers
pub struct SineTone {
    phase: f64,
    step: f64,
    amplitude: f64,
}

impl SineTone {
    pub fn new(frequency: f64, samplerate: u32, amplitude: f64) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / samplerate.max(1) as f64,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    /// Fill an interleaved app buffer, same sample on every channel
    pub fn render(&mut self, bytes: &mut [u8], channels: usize, format: SoundcardFormat) {
        let frame_bytes = channels.max(1) * format.word_size();

        for frame in bytes.chunks_exact_mut(frame_bytes) {
            let sample = self.phase.sin() * self.amplitude;

            for slot in frame.chunks_exact_mut(format.word_size()) {
                encode(sample, format, slot);
            }

            self.phase = (self.phase + self.step) % TAU;
        }
    }
}

fn encode(sample: f64, format: SoundcardFormat, slot: &mut [u8]) {
    match format {
        SoundcardFormat::S8 => slot.copy_from_slice(&((sample * i8::MAX as f64) as i8).to_ne_bytes()),
        SoundcardFormat::S16 => slot.copy_from_slice(&((sample * i16::MAX as f64) as i16).to_ne_bytes()),
        SoundcardFormat::S24 => slot.copy_from_slice(&((sample * 8_388_607.0) as i32).to_ne_bytes()),
        SoundcardFormat::S32 => slot.copy_from_slice(&((sample * i32::MAX as f64) as i32).to_ne_bytes()),
        SoundcardFormat::S64 => slot.copy_from_slice(&((sample * i64::MAX as f64) as i64).to_ne_bytes()),
        SoundcardFormat::Float => slot.copy_from_slice(&(sample as f32).to_ne_bytes()),
        SoundcardFormat::Double => slot.copy_from_slice(&sample.to_ne_bytes()),
        SoundcardFormat::Complex => {
            let (re, im) = slot.split_at_mut(8);
            re.copy_from_slice(&sample.to_ne_bytes());
            im.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s16_channels_match() {
        let mut tone = SineTone::new(1000.0, 48000, 0.5);
        let mut bytes = vec![0u8; 2 * 64 * 2];
        tone.render(&mut bytes, 2, SoundcardFormat::S16);

        for frame in bytes.chunks_exact(4) {
            assert_eq!(frame[..2], frame[2..]);
        }

        let peak = bytes
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]).unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 10_000 && peak <= 16_384);
    }

    #[test]
    fn test_phase_continues_across_buffers() {
        let mut split = SineTone::new(440.0, 44100, 1.0);
        let mut whole = SineTone::new(440.0, 44100, 1.0);

        let mut a = vec![0u8; 32 * 4];
        let mut b = vec![0u8; 32 * 4];
        let mut both = vec![0u8; 64 * 4];

        split.render(&mut a, 1, SoundcardFormat::Float);
        split.render(&mut b, 1, SoundcardFormat::Float);
        whole.render(&mut both, 1, SoundcardFormat::Float);

        assert_eq!(&both[..a.len()], &a[..]);
        assert_eq!(&both[a.len()..], &b[..]);
    }
}
