//! DSP Building Blocks
//!
//! Signal-processing stages and the graph that wires them. Every graph is
//! processed in fixed blocks of [`RENDER_QUANTUM`] frames, whether it feeds a
//! device or an offline buffer.

pub mod analyser;
pub mod biquad;
pub mod convolver;
pub mod delay;
pub mod graph;
pub mod impulse;
pub mod source;

/// Frames processed per graph step
pub const RENDER_QUANTUM: usize = 128;

pub use analyser::{Analyser, DEFAULT_FFT_SIZE};
pub use biquad::{Biquad, BiquadCoeffs, FilterKind, DEFAULT_Q_DB};
pub use convolver::Convolver;
pub use delay::{FeedbackDelay, FEEDBACK_GAIN};
pub use graph::{Destination, EffectsGraph, GraphSpec, StageDescriptor};
pub use impulse::{REVERB_IMPULSE_DECAY, REVERB_IMPULSE_SECS};
pub use source::BufferSource;
