//! Feedback Delay
//!
//! Delay line whose output is fed back into its own input through a fixed
//! gain, producing repeating echoes:
//!
//! `y[n] = x[n - D] + feedback * y[n - D]`
//!
//! A delay inside a feedback cycle can never be shorter than one render
//! quantum, so `D` is at least [`RENDER_QUANTUM`] frames even when the
//! requested delay time is zero.

use crate::dsp::RENDER_QUANTUM;

/// Fixed feedback gain of the echo loop. Must stay below 1.0 for the
/// echoes to decay.
pub const FEEDBACK_GAIN: f32 = 0.3;

/// Delay line with a feedback loop around it
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    /// Delay time in seconds as requested
    delay_time: f32,
    /// Feedback amount (0-0.95)
    feedback: f32,
    /// Effective delay in frames
    delay_samples: usize,
    /// One circular buffer per channel, each `delay_samples` long
    buffers: Vec<Vec<f32>>,
    /// Current read/write position in the circular buffers
    write_pos: usize,
}

impl FeedbackDelay {
    /// Create a delay for the given time and feedback
    ///
    /// # Arguments
    /// * `delay_time` - Delay in seconds (negative values act as zero)
    /// * `feedback` - Loop gain, clamped to 0-0.95
    /// * `sample_rate` - Graph sample rate in Hz
    /// * `channels` - Number of channels to carry
    pub fn new(delay_time: f32, feedback: f32, sample_rate: u32, channels: usize) -> Self {
        let requested = (delay_time.max(0.0) as f64 * sample_rate as f64).round() as usize;
        let delay_samples = requested.max(RENDER_QUANTUM);
        Self {
            delay_time,
            feedback: feedback.clamp(0.0, 0.95),
            delay_samples,
            buffers: vec![vec![0.0; delay_samples]; channels],
            write_pos: 0,
        }
    }

    pub fn delay_time(&self) -> f32 {
        self.delay_time
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Effective delay in frames
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// Process every channel of `block` in place
    pub fn process(&mut self, block: &mut [Vec<f32>]) {
        let num_samples = block.first().map(|ch| ch.len()).unwrap_or(0);
        let size = self.delay_samples;
        let feedback = self.feedback;

        for i in 0..num_samples {
            let pos = (self.write_pos + i) % size;
            for (channel, buffer) in block.iter_mut().zip(self.buffers.iter_mut()) {
                // The slot about to be overwritten holds the value written D frames ago
                let delayed = buffer[pos];
                buffer[pos] = channel[i] + feedback * delayed;
                channel[i] = delayed;
            }
        }

        self.write_pos = (self.write_pos + num_samples) % size;
    }
}
