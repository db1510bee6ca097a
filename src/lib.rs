//! Aurora - Recording Studio Audio Core
//!
//! Aurora takes a captured recording through a fixed effects chain and back
//! out again:
//! 1. Live playback - the chain runs against an output device while the
//!    knobs move, with a waveform tap for display
//! 2. Offline export - the same chain renders at full speed into a buffer
//!    that is encoded as a 16-bit PCM WAV file
//!
//! # Architecture
//!
//! Parameters live in a [`params::ParameterStore`] that graph builds snapshot.
//! Each playback or export builds a fresh [`dsp::EffectsGraph`]:
//! lowpass, highpass, feedback delay, convolution reverb on a wet send, and a
//! master gain. Live and offline graphs share one interpreter, so what you
//! hear is what you export.

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod params;

pub use config::EngineConfig;
pub use engine::{AudioBuffer, Studio};
pub use error::{AuroraError, Result};
pub use params::{ParamId, ParameterSet, ParameterStore, Preset};
