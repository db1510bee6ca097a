//! Buffer Source
//!
//! Plays a decoded recording into the graph once, at a playback rate. The
//! read position advances by `pitch * source_rate / graph_rate` frames per
//! output frame and fractional positions are linearly interpolated, so a
//! higher pitch plays faster and shorter.

use std::sync::Arc;

use crate::engine::AudioBuffer;

/// One-shot sample player feeding the head of the graph
#[derive(Debug, Clone)]
pub struct BufferSource {
    buffer: Arc<AudioBuffer>,
    position: f64,
    step: f64,
}

impl BufferSource {
    pub fn new(buffer: Arc<AudioBuffer>, pitch: f32, graph_sample_rate: u32) -> Self {
        let step = if graph_sample_rate == 0 {
            0.0
        } else {
            pitch as f64 * buffer.sample_rate as f64 / graph_sample_rate as f64
        };
        Self {
            buffer,
            position: 0.0,
            step,
        }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    /// Source frames consumed per output frame
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Whether every source frame has been played
    pub fn is_finished(&self) -> bool {
        self.step <= 0.0 || self.position >= self.buffer.num_samples() as f64
    }

    /// Fill `block` with the next frames, zero-padding past the end
    ///
    /// Output channel `c` reads source channel `c % source_channels`.
    /// Returns false once the source has run out.
    pub fn fill(&mut self, block: &mut [Vec<f32>]) -> bool {
        let frames = block.first().map(|ch| ch.len()).unwrap_or(0);
        let len = self.buffer.num_samples();
        let source_channels = self.buffer.num_channels();

        if source_channels == 0 {
            for channel in block.iter_mut() {
                channel.fill(0.0);
            }
            return false;
        }

        for i in 0..frames {
            let pos = self.position + i as f64 * self.step;
            let index = pos.floor() as usize;
            let frac = (pos - index as f64) as f32;

            for (c, channel) in block.iter_mut().enumerate() {
                let src = self.buffer.channel(c % source_channels);
                channel[i] = if index >= len {
                    0.0
                } else {
                    let a = src[index];
                    let b = if index + 1 < len { src[index + 1] } else { 0.0 };
                    a + (b - a) * frac
                };
            }
        }

        self.position += frames as f64 * self.step;
        !self.is_finished()
    }
}
