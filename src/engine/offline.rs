//! Offline Rendering
//!
//! Drives one effects graph into memory as fast as possible, for export.
//! The graph runs at the recording's own sample rate and channel count and is
//! rendered to completion before anything is returned; a failed render never
//! yields a partial buffer.

use std::sync::Arc;
use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::dsp::impulse::impulse_rng;
use crate::dsp::{Destination, EffectsGraph};
use crate::engine::AudioBuffer;
use crate::error::{AuroraError, Result};
use crate::params::ParameterSet;

/// How long a processed render runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Exactly the recording's duration, whatever the pitch. Pitch above 1
    /// leaves trailing tail/silence, pitch below 1 truncates.
    SourceDuration,
    /// The recording's duration divided by pitch, so the whole source plays
    #[default]
    PitchAdjusted,
}

const PITCH_SCALE: u128 = 1_000_000;

/// Number of frames a render (or live playback) of `source` produces at
/// `graph_rate`
pub fn output_frames(source: &AudioBuffer, pitch: f32, graph_rate: u32, policy: LengthPolicy) -> usize {
    let frames = source.num_samples() as u64;
    let source_rate = source.sample_rate.max(1) as u64;
    let graph_rate = graph_rate as u64;

    // ceil(frames * graph_rate / source_rate) without float error
    let at_graph_rate = ((frames * graph_rate + source_rate - 1) / source_rate) as usize;

    match policy {
        LengthPolicy::SourceDuration => at_graph_rate,
        LengthPolicy::PitchAdjusted => {
            // Pitch in millionths, so f32 noise (0.9 is stored as 0.89999998)
            // cannot push the length up a frame
            let pitch_micros = (pitch as f64 * PITCH_SCALE as f64).round();
            if !pitch_micros.is_finite() || pitch_micros < 1.0 || pitch_micros as u128 == PITCH_SCALE {
                return at_graph_rate;
            }
            let numerator = frames as u128 * graph_rate as u128 * PITCH_SCALE;
            let denominator = source_rate as u128 * pitch_micros as u128;
            ((numerator + denominator - 1) / denominator) as usize
        }
    }
}

/// Renders recordings through the effects graph without a device
#[derive(Debug, Clone, Default)]
pub struct OfflineRenderer {
    impulse_seed: Option<u64>,
    length_policy: LengthPolicy,
}

impl OfflineRenderer {
    pub fn new(length_policy: LengthPolicy) -> Self {
        Self {
            impulse_seed: None,
            length_policy,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            impulse_seed: config.impulse_seed,
            length_policy: config.length_policy,
        }
    }

    /// Reseed the reverb impulse on every render, for reproducible output
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.impulse_seed = seed;
        self
    }

    pub fn length_policy(&self) -> LengthPolicy {
        self.length_policy
    }

    pub fn impulse_seed(&self) -> Option<u64> {
        self.impulse_seed
    }

    /// Frames a render of `source` with `params` will produce
    pub fn output_frames(&self, source: &AudioBuffer, params: &ParameterSet) -> usize {
        output_frames(
            source,
            params.clamped().pitch,
            source.sample_rate,
            self.length_policy,
        )
    }

    /// Render `source` through a freshly built graph
    ///
    /// # Errors
    /// * `EmptyAudio` - If the recording has no samples
    /// * `InvalidGraph` - If the recording's sample rate is unusable
    /// * `Render` - If the output contains non-finite samples
    pub fn render(&self, source: &AudioBuffer, params: &ParameterSet) -> Result<AudioBuffer> {
        self.render_shared(Arc::new(source.clone()), params)
    }

    /// Same as [`render`](Self::render) without copying the recording
    pub fn render_shared(
        &self,
        source: Arc<AudioBuffer>,
        params: &ParameterSet,
    ) -> Result<AudioBuffer> {
        if source.is_empty() {
            return Err(AuroraError::EmptyAudio);
        }

        let started = Instant::now();
        let sample_rate = source.sample_rate;
        let channels = source.num_channels();
        let frames = self.output_frames(&source, params);

        let mut rng = impulse_rng(self.impulse_seed);
        let mut graph = EffectsGraph::build(
            params,
            sample_rate,
            channels,
            Destination::OfflineCapture,
            &mut rng,
        )?;
        graph.start(source);

        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
        while output[0].len() < frames {
            let block = graph.render_quantum();
            let take = block[0].len().min(frames - output[0].len());
            for (out, ch) in output.iter_mut().zip(block) {
                out.extend_from_slice(&ch[..take]);
            }
        }

        let rendered = AudioBuffer::from_channels(output, sample_rate)?;
        if !rendered.is_finite() {
            return Err(AuroraError::render(
                "offline",
                "output contains non-finite samples",
            ));
        }

        info!(
            "Rendered {} frames x {} ch at {} Hz in {:.1} ms",
            frames,
            channels,
            sample_rate,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(rendered)
    }

    /// Render on the blocking thread pool
    #[cfg(feature = "async")]
    pub async fn render_async(
        &self,
        source: Arc<AudioBuffer>,
        params: ParameterSet,
    ) -> Result<AudioBuffer> {
        let renderer = self.clone();
        tokio::task::spawn_blocking(move || renderer.render_shared(source, &params))
            .await
            .map_err(|e| AuroraError::render("offline", format!("render task failed: {}", e)))?
    }
}
