//! Live Playback
//!
//! Runs effects graphs against an output device. The device asks for frames
//! in arbitrary chunk sizes; the active voice renders whole quanta and hands
//! them out through a small buffer, so live output matches an offline render
//! of the same inputs sample for sample.
//!
//! At most one voice plays at a time. Starting a new playback discards the
//! old one, which completes its handle with [`PlaybackOutcome::Stopped`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dsp::impulse::impulse_rng;
use crate::dsp::{Analyser, BufferSource, Destination, EffectsGraph, RENDER_QUANTUM};
use crate::engine::device::{FrameSource, OutputDevice, SharedSource};
use crate::engine::offline::{output_frames, LengthPolicy};
use crate::engine::AudioBuffer;
use crate::error::{AuroraError, Result};
use crate::params::ParameterStore;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every frame was delivered to the device
    Completed,
    /// Stopped or replaced before the end
    Stopped,
}

/// Shared flag telling a voice to go silent
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    fn new() -> Self {
        Self::default()
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome slot; the first outcome written wins
#[derive(Debug, Default)]
struct Completion {
    outcome: Mutex<Option<PlaybackOutcome>>,
    ready: Condvar,
}

impl Completion {
    fn finish(&self, outcome: PlaybackOutcome) -> bool {
        let mut slot = match self.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.ready.notify_all();
        true
    }

    fn get(&self) -> Option<PlaybackOutcome> {
        match self.outcome.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Caller's view of one playback
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: Uuid,
    token: CancellationToken,
    completion: Arc<Completion>,
}

impl PlaybackHandle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            completion: Arc::new(Completion::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop this playback; later calls do nothing
    pub fn stop(&self) {
        self.token.cancel();
        if self.completion.finish(PlaybackOutcome::Stopped) {
            debug!("Playback {} stopped", self.id);
        }
    }

    /// Outcome if the playback has ended
    pub fn try_outcome(&self) -> Option<PlaybackOutcome> {
        self.completion.get()
    }

    pub fn is_finished(&self) -> bool {
        self.try_outcome().is_some()
    }

    /// Block until the playback ends
    pub fn wait(&self) -> PlaybackOutcome {
        let mut slot = match self.completion.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(outcome) = *slot {
                return outcome;
            }
            slot = match self.completion.ready.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Block until the playback ends or `timeout` passes
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PlaybackOutcome> {
        let slot = match self.completion.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = self
            .completion
            .ready
            .wait_timeout_while(slot, timeout, |outcome| outcome.is_none());
        match result {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

// ============================================================================
// Voices
// ============================================================================

enum VoiceKind {
    /// Through the effects graph
    Processed(Box<EffectsGraph>),
    /// Straight from the recording (monitor path)
    Raw(BufferSource),
}

/// One playing recording, rendered a quantum at a time
struct LiveVoice {
    kind: VoiceKind,
    handle: PlaybackHandle,
    block: Vec<Vec<f32>>,
    /// Frames of `block` already handed out
    cursor: usize,
    /// Frames still to deliver
    remaining: usize,
}

impl LiveVoice {
    fn new(kind: VoiceKind, channels: usize, frames: usize, handle: PlaybackHandle) -> Self {
        Self {
            kind,
            handle,
            block: vec![vec![0.0; RENDER_QUANTUM]; channels],
            cursor: RENDER_QUANTUM,
            remaining: frames,
        }
    }

    fn render_next(&mut self, analyser: &Analyser) {
        match &mut self.kind {
            VoiceKind::Processed(graph) => {
                let quantum = graph.render_quantum();
                for (dst, src) in self.block.iter_mut().zip(quantum) {
                    dst.copy_from_slice(src);
                }
            }
            VoiceKind::Raw(source) => {
                source.fill(&mut self.block);
            }
        }
        self.cursor = 0;

        if self.remaining >= RENDER_QUANTUM {
            analyser.write(&self.block);
        } else {
            let tail: Vec<Vec<f32>> = self
                .block
                .iter()
                .map(|ch| ch[..self.remaining].to_vec())
                .collect();
            analyser.write(&tail);
        }
    }

    /// Write up to `frames` interleaved frames into `out`; returns frames written
    fn fill(&mut self, out: &mut [f32], channels: usize, analyser: &Analyser) -> usize {
        let frames = out.len() / channels;
        let block_channels = self.block.len();
        let mut written = 0;

        while written < frames && self.remaining > 0 {
            if self.cursor == RENDER_QUANTUM {
                self.render_next(analyser);
            }
            let take = (frames - written)
                .min(RENDER_QUANTUM - self.cursor)
                .min(self.remaining);

            for f in 0..take {
                let frame = &mut out[(written + f) * channels..(written + f + 1) * channels];
                for (c, sample) in frame.iter_mut().enumerate() {
                    *sample = self.block[c % block_channels][self.cursor + f];
                }
            }

            written += take;
            self.cursor += take;
            self.remaining -= take;
        }

        if self.remaining == 0 && self.handle.completion.finish(PlaybackOutcome::Completed) {
            info!("Playback {} completed", self.handle.id);
        }
        written
    }
}

/// What the device pulls from: the active voice plus the analyser tap
struct OutputBus {
    voice: Option<LiveVoice>,
    analyser: Analyser,
}

impl FrameSource for OutputBus {
    fn fill_interleaved(&mut self, out: &mut [f32], channels: usize) -> usize {
        out.fill(0.0);
        if channels == 0 {
            return 0;
        }

        let written = match self.voice.as_mut() {
            Some(voice) if !voice.handle.token.is_cancelled() => {
                voice.fill(out, channels, &self.analyser)
            }
            _ => 0,
        };

        let ended = self
            .voice
            .as_ref()
            .map_or(false, |v| v.remaining == 0 || v.handle.token.is_cancelled());
        if ended {
            if let Some(voice) = self.voice.take() {
                voice.handle.completion.finish(PlaybackOutcome::Stopped);
            }
        }
        written
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Plays recordings, processed or raw, on one output device
pub struct LivePlaybackEngine {
    device: Box<dyn OutputDevice>,
    bus: Arc<Mutex<OutputBus>>,
    analyser: Analyser,
    impulse_seed: Option<u64>,
    length_policy: LengthPolicy,
    current: Option<PlaybackHandle>,
}

impl std::fmt::Debug for LivePlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePlaybackEngine")
            .field("sample_rate", &self.device.sample_rate())
            .field("channels", &self.device.channels())
            .field("active", &self.is_active())
            .finish()
    }
}

impl LivePlaybackEngine {
    pub fn new(device: Box<dyn OutputDevice>, config: &EngineConfig) -> Self {
        let analyser = Analyser::new(config.analyser_fft_size);
        Self {
            device,
            bus: Arc::new(Mutex::new(OutputBus {
                voice: None,
                analyser: analyser.clone(),
            })),
            analyser,
            impulse_seed: config.impulse_seed,
            length_policy: config.length_policy,
            current: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.device.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.device.channels()
    }

    /// Tap on everything this engine outputs
    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    /// Whether a playback is still running
    pub fn is_active(&self) -> bool {
        self.current.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Play `source` through a graph built from the store's current values
    ///
    /// Any active playback is stopped first.
    pub fn play(&mut self, source: Arc<AudioBuffer>, store: &ParameterStore) -> Result<PlaybackHandle> {
        if source.is_empty() {
            return Err(AuroraError::EmptyAudio);
        }

        let params = store.snapshot().clamped();
        let sample_rate = self.device.sample_rate();
        let channels = self.device.channels();

        let mut rng = impulse_rng(self.impulse_seed);
        let mut graph = EffectsGraph::build(
            &params,
            sample_rate,
            channels,
            Destination::LiveOutput,
            &mut rng,
        )?;
        let frames = output_frames(&source, params.pitch, sample_rate, self.length_policy);
        graph.start(source);

        let handle = self.start_voice(VoiceKind::Processed(Box::new(graph)), frames)?;
        info!(
            "Processed playback {} started: {} frames at {} Hz",
            handle.id(),
            frames,
            sample_rate
        );
        Ok(handle)
    }

    /// Play `source` unprocessed through the monitor path
    pub fn play_raw(&mut self, source: Arc<AudioBuffer>) -> Result<PlaybackHandle> {
        if source.is_empty() {
            return Err(AuroraError::EmptyAudio);
        }

        let sample_rate = self.device.sample_rate();
        let frames = output_frames(&source, 1.0, sample_rate, LengthPolicy::SourceDuration);
        let voice = BufferSource::new(source, 1.0, sample_rate);

        let handle = self.start_voice(VoiceKind::Raw(voice), frames)?;
        info!("Raw playback {} started: {} frames", handle.id(), frames);
        Ok(handle)
    }

    fn start_voice(&mut self, kind: VoiceKind, frames: usize) -> Result<PlaybackHandle> {
        self.discard_current();

        let handle = PlaybackHandle::new();
        let voice = LiveVoice::new(kind, self.device.channels(), frames, handle.clone());
        self.with_bus(|bus| bus.voice = Some(voice));

        if !self.device.is_attached() {
            let shared: SharedSource = self.bus.clone();
            if let Err(e) = self.device.attach(shared) {
                handle.stop();
                self.with_bus(|bus| bus.voice = None);
                return Err(e);
            }
        }

        self.current = Some(handle.clone());
        Ok(handle)
    }

    fn discard_current(&mut self) {
        if let Some(previous) = self.current.take() {
            if !previous.is_finished() {
                warn!("Discarding active playback {}", previous.id());
            }
            previous.stop();
        }
        self.with_bus(|bus| bus.voice = None);
    }

    fn with_bus<F: FnOnce(&mut OutputBus)>(&self, f: F) {
        match self.bus.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Release the device stream if the current playback has ended
    ///
    /// A device callback cannot close its own stream, so a playback that
    /// runs to the end leaves the stream pulling silence until this, `wait`,
    /// `stop` or drop. Returns whether the device was released.
    pub fn release_if_finished(&mut self) -> bool {
        let finished = self.current.as_ref().map_or(true, |h| h.is_finished());
        if !finished || !self.device.is_attached() {
            return false;
        }
        self.with_bus(|bus| bus.voice = None);
        self.device.detach();
        info!("Output released");
        true
    }

    /// Block until the current playback ends, then release the device
    ///
    /// Returns `None` when nothing was playing.
    pub fn wait(&mut self) -> Option<PlaybackOutcome> {
        let outcome = self.current.as_ref().map(|h| h.wait());
        self.release_if_finished();
        outcome
    }

    /// Stop playback and release the device stream; safe to call repeatedly
    pub fn stop(&mut self) {
        let was_attached = self.device.is_attached();
        self.discard_current();
        self.device.detach();
        if was_attached {
            info!("Playback stopped");
        }
    }
}

impl Drop for LivePlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
