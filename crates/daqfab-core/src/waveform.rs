//! Playback waveform synthesis.
//!
//! Pure functions producing interleaved 16-bit sample buffers from a
//! [`WaveformSpec`]. No I/O, no state: identical specs produce identical
//! buffers (modulo floating-point rounding in the sine path).
//!
//! The converter bus moves samples in interleaved lane pairs, so every
//! generator operates on pairs `(2i, 2i+1)` and buffers are always an even
//! number of samples long.

use bytes::Bytes;
use tracing::debug;

use crate::error::{DaqError, Result};

/// Internal sample clock of the playback path, in Hz.
pub const SAMPLE_CLOCK_HZ: f64 = 245e6;

/// Waveform shapes the synthesizer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformKind {
    /// Continuous-wave tone (see [`snapped_frequency`]).
    Sine,
    /// Linear ramp restarting every `period` samples.
    Saw,
    /// Constant mid-scale (`0x8000`).
    Dc,
    /// One high pair every `period` samples.
    Pulse,
    /// 25% duty square wave repeating every `period` samples.
    Square,
}

/// One waveform request. Constructed per request, consumed once.
#[derive(Debug, Clone, Copy)]
pub struct WaveformSpec {
    /// Shape to generate.
    pub kind: WaveformKind,
    /// Buffer length in samples; must be even and nonzero.
    pub sample_count: u32,
    /// Signal period in samples (ignored by `Sine` and `Dc`).
    pub period: u32,
    /// Peak-to-peak amplitude in counts; must be nonzero.
    pub amplitude: u32,
    /// Requested tone frequency in Hz. Treated as a hint: the sine
    /// generator snaps it to the nearest frequency whose period divides
    /// the buffer evenly.
    pub frequency_hz: f64,
}

impl WaveformSpec {
    fn validate(&self) -> Result<()> {
        if self.sample_count == 0 || self.sample_count % 2 != 0 {
            return Err(DaqError::invalid_waveform(format!(
                "sample count must be even and nonzero, got {}",
                self.sample_count
            )));
        }
        if self.amplitude == 0 {
            return Err(DaqError::invalid_waveform("amplitude must be nonzero"));
        }
        match self.kind {
            WaveformKind::Saw | WaveformKind::Pulse if self.period == 0 => Err(
                DaqError::invalid_waveform("period must be nonzero for saw/pulse"),
            ),
            WaveformKind::Square if self.period < 4 => Err(DaqError::invalid_waveform(format!(
                "square wave needs a period of at least 4 samples, got {}",
                self.period
            ))),
            _ => Ok(()),
        }
    }
}

/// Interleaved 16-bit sample buffer.
///
/// Exclusively owned by whichever stage currently holds it — synthesizer,
/// sequencer, then archiver or verifier — and never aliased across stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<i16>,
}

impl SampleBuffer {
    /// Wrap an existing sample vector.
    #[must_use]
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Decode a little-endian byte stream as read from the DMA channel.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the byte count is not sample aligned.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(DaqError::protocol(format!(
                "burst of {} bytes is not 16-bit aligned",
                bytes.len()
            )));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { samples })
    }

    /// Serialize for the DMA channel (little-endian).
    #[must_use]
    pub fn to_le_bytes(&self) -> Bytes {
        let mut raw = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            raw.extend_from_slice(&s.to_le_bytes());
        }
        Bytes::from(raw)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// View the samples.
    #[must_use]
    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }
}

impl From<Vec<i16>> for SampleBuffer {
    fn from(samples: Vec<i16>) -> Self {
        Self::from_samples(samples)
    }
}

/// Tone frequency the sine generator will actually emit for a hint.
///
/// Supported frequencies are those with an integer cycle count across the
/// buffer, so the waveform wraps without a phase discontinuity when the
/// playback memory loops. The hint is snapped to the nearest such
/// frequency, clamped to `[1, sample_count / 2]` cycles (Nyquist).
#[must_use]
pub fn snapped_frequency(sample_count: u32, hint_hz: f64) -> f64 {
    SAMPLE_CLOCK_HZ * f64::from(snapped_cycles(sample_count, hint_hz)) / f64::from(sample_count)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn snapped_cycles(sample_count: u32, hint_hz: f64) -> u32 {
    let ideal = hint_hz * f64::from(sample_count) / SAMPLE_CLOCK_HZ;
    let cycles = ideal.round().max(1.0) as u32;
    cycles.min(sample_count / 2)
}

/// Generate a sample buffer from a waveform specification.
///
/// Total for validated input; the buffer is fully overwritten (no partial
/// writes), always `spec.sample_count` samples long.
///
/// # Errors
///
/// Returns [`DaqError::InvalidWaveform`] if `sample_count` is odd or zero,
/// `amplitude` is zero, or `period` is unusable for the requested shape.
#[allow(clippy::cast_possible_truncation)]
pub fn synthesize(spec: &WaveformSpec) -> Result<SampleBuffer> {
    spec.validate()?;

    let n = spec.sample_count as usize;
    let pairs = n / 2;
    let peak = i64::from(spec.amplitude / 2) - 1;
    let mut samples = vec![0i16; n];

    match spec.kind {
        WaveformKind::Sine => {
            let cycles = snapped_cycles(spec.sample_count, spec.frequency_hz);
            let freq = SAMPLE_CLOCK_HZ * f64::from(cycles) / f64::from(spec.sample_count);
            debug!(
                "sine: {} samples, hint {:.3e} Hz -> {cycles} cycles ({:.3e} Hz)",
                spec.sample_count, spec.frequency_hz, freq
            );
            let step = 2.0 * std::f64::consts::PI * freq / SAMPLE_CLOCK_HZ;
            #[allow(clippy::cast_precision_loss)]
            for (t, sample) in samples.iter_mut().enumerate() {
                *sample = ((t as f64 * step).sin() * peak as f64) as i16;
            }
        }
        WaveformKind::Saw => {
            let period = u64::from(spec.period);
            let span = u64::from(spec.amplitude - 1);
            for i in 0..pairs {
                let phase = 2 * i as u64 % period;
                let value = (phase * span / period * 2) & 0xFFFF;
                let bits = value as u16 as i16;
                samples[2 * i] = bits;
                samples[2 * i + 1] = bits;
            }
        }
        WaveformKind::Dc => {
            let mid = 0x8000u16 as i16;
            samples.fill(mid);
        }
        WaveformKind::Pulse => {
            let high = peak as i16;
            for i in 0..pairs {
                let value = if 2 * i as u64 % u64::from(spec.period) == 0 {
                    high
                } else {
                    0
                };
                samples[2 * i] = value;
                samples[2 * i + 1] = value;
            }
        }
        WaveformKind::Square => {
            // Active window is the first quarter of each period.
            let quarter = u64::from(spec.period / 4);
            let high = peak as i16;
            for i in 0..pairs {
                let value = if 2 * i as u64 % u64::from(spec.period) < quarter {
                    high
                } else {
                    0
                };
                samples[2 * i] = value;
                samples[2 * i + 1] = value;
            }
        }
    }

    Ok(SampleBuffer::from_samples(samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: WaveformKind, n: u32, period: u32, amplitude: u32) -> WaveformSpec {
        WaveformSpec {
            kind,
            sample_count: n,
            period,
            amplitude,
            frequency_hz: 100e6,
        }
    }

    #[test]
    fn dc_is_all_mid_scale() {
        for n in [2u32, 8, 1024] {
            let buffer = synthesize(&spec(WaveformKind::Dc, n, 0, 4)).unwrap();
            assert_eq!(buffer.len(), n as usize);
            assert!(buffer.as_slice().iter().all(|&s| s == 0x8000u16 as i16));
        }
    }

    #[test]
    fn pulse_pattern_small_buffer() {
        let buffer = synthesize(&spec(WaveformKind::Pulse, 8, 4, 4)).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 1, 0, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn lanes_are_symmetric() {
        for kind in [
            WaveformKind::Sine,
            WaveformKind::Saw,
            WaveformKind::Dc,
            WaveformKind::Pulse,
            WaveformKind::Square,
        ] {
            let buffer = synthesize(&spec(kind, 64, 16, 1000)).unwrap();
            let s = buffer.as_slice();
            // Sine advances per lane; every other kind derives the pair
            // from the even-lane index.
            if kind != WaveformKind::Sine {
                for i in 0..32 {
                    assert_eq!(s[2 * i], s[2 * i + 1], "{kind:?} pair {i}");
                }
            }
        }
    }

    #[test]
    fn square_quarter_duty() {
        let buffer = synthesize(&spec(WaveformKind::Square, 32, 16, 1000)).unwrap();
        let high = buffer.as_slice().iter().filter(|&&s| s != 0).count();
        assert_eq!(high, 8); // 25% of 32
    }

    #[test]
    fn saw_restarts_every_period() {
        let buffer = synthesize(&spec(WaveformKind::Saw, 32, 8, 256)).unwrap();
        let s = buffer.as_slice();
        assert_eq!(s[0], s[8]);
        assert_eq!(s[2], s[10]);
        assert_eq!(s[0], 0);
    }

    #[test]
    fn sine_snaps_to_integer_cycles() {
        let snapped = snapped_frequency(16_384, 100e6);
        let cycles = snapped * 16_384.0 / SAMPLE_CLOCK_HZ;
        assert!((cycles - cycles.round()).abs() < 1e-9);
        // Close to the hint, not equal to it.
        assert!((snapped - 100e6).abs() < SAMPLE_CLOCK_HZ / 16_384.0);
    }

    #[test]
    fn sine_is_deterministic() {
        let a = synthesize(&spec(WaveformKind::Sine, 256, 0, 4096)).unwrap();
        let b = synthesize(&spec(WaveformKind::Sine, 256, 0, 4096)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_odd_zero_and_flat() {
        assert!(synthesize(&spec(WaveformKind::Dc, 7, 0, 4)).is_err());
        assert!(synthesize(&spec(WaveformKind::Dc, 0, 0, 4)).is_err());
        assert!(synthesize(&spec(WaveformKind::Dc, 8, 0, 0)).is_err());
        assert!(synthesize(&spec(WaveformKind::Saw, 8, 0, 4)).is_err());
        assert!(synthesize(&spec(WaveformKind::Square, 8, 2, 4)).is_err());
    }

    #[test]
    fn byte_codec_round_trip() {
        let buffer = synthesize(&spec(WaveformKind::Saw, 64, 16, 512)).unwrap();
        let bytes = buffer.to_le_bytes();
        assert_eq!(bytes.len(), 128);
        let back = SampleBuffer::from_le_bytes(&bytes).unwrap();
        assert_eq!(back, buffer);
    }

    #[test]
    fn unaligned_bytes_rejected() {
        assert!(SampleBuffer::from_le_bytes(&[0u8, 1, 2]).is_err());
    }
}
