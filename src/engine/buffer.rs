//! Audio Buffer Management
//!
//! Provides the core audio buffer type shared by the decoder, both rendering
//! paths and the WAV encoder. Buffers are planar 32-bit float, tagged with
//! their sample rate, and treated as immutable once decoded.

use crate::error::{AuroraError, Result};

/// Calculate the peak absolute level of a sample slice (linear)
pub fn calculate_peak(samples: &[f32]) -> f32 {
    samples.iter().map(|&s| s.abs()).fold(0.0_f32, f32::max)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Core audio buffer type
///
/// Stores audio as non-interleaved 32-bit floating point samples. Each
/// channel is a separate `Vec<f32>` and all channels have the same length.
///
/// # Example
/// ```
/// use aurora::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(2, 44100, 44100);
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.num_samples(), 44100);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given shape
    pub fn new(num_channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Create a buffer from planar channel data
    ///
    /// Fails if there are no channels, the sample rate is zero, or the
    /// channels have different lengths.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(AuroraError::InvalidGraph {
                reason: "audio buffer needs at least one channel".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(AuroraError::InvalidGraph {
                reason: "sample rate must be positive".to_string(),
            });
        }
        let len = samples[0].len();
        if let Some(bad) = samples.iter().position(|ch| ch.len() != len) {
            return Err(AuroraError::Decode {
                reason: format!(
                    "channel {} has {} samples, expected {}",
                    bad,
                    samples[bad].len(),
                    len
                ),
                source: None,
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(interleaved: &[f32], num_channels: usize, sample_rate: u32) -> Result<Self> {
        if num_channels == 0 {
            return Err(AuroraError::InvalidGraph {
                reason: "audio buffer needs at least one channel".to_string(),
            });
        }
        if interleaved.len() % num_channels != 0 {
            return Err(AuroraError::Decode {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Generate a sine wave in every channel
    pub fn sine_wave(
        frequency: f32,
        duration_secs: f32,
        sample_rate: u32,
        num_channels: usize,
    ) -> Self {
        let num_samples = (duration_secs * sample_rate as f32).round() as usize;
        let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;
        let channel: Vec<f32> = (0..num_samples)
            .map(|i| (angular_freq * i as f64).sin() as f32)
            .collect();
        Self {
            samples: vec![channel; num_channels],
            sample_rate,
        }
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.num_channels();
        let num_samples = self.num_samples();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Duration in seconds at the buffer's native rate
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate as f64
    }

    /// Immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|ch| calculate_peak(ch))
            .fold(0.0_f32, f32::max)
    }

    /// Check that two buffers match within a tolerance
    pub fn is_approx_equal(&self, other: &AudioBuffer, tolerance: f32) -> bool {
        self.sample_rate == other.sample_rate
            && self.num_channels() == other.num_channels()
            && self.num_samples() == other.num_samples()
            && self
                .samples
                .iter()
                .zip(other.samples.iter())
                .all(|(a, b)| a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance))
    }
}

// ============================================================================
// Tests
// ============================================================================
