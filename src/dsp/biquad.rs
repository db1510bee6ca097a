//! Biquad Filter (lowpass / highpass)
//!
//! Second-order IIR filters used for the lowpass and highpass stages.
//! Coefficients follow the Audio EQ Cookbook with the resonance expressed in
//! dB, matching the browser audio graph the recordings were tuned against.
//! Reference: https://www.w3.org/TR/audio-eq-cookbook/

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default resonance in dB
pub const DEFAULT_Q_DB: f64 = 1.0;

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Remove above the cutoff
    Lowpass,
    /// Remove below the cutoff
    Highpass,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Lowpass => "lowpass",
            FilterKind::Highpass => "highpass",
        }
    }
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    const PASS: BiquadCoeffs = BiquadCoeffs {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    const SILENCE: BiquadCoeffs = BiquadCoeffs {
        b0: 0.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Calculate coefficients for a cutoff in Hz
    ///
    /// Cutoffs at or beyond Nyquist turn the lowpass into a pass-through and
    /// the highpass into silence; non-positive cutoffs do the opposite.
    pub fn calculate(kind: FilterKind, sample_rate: f64, cutoff: f64, q_db: f64) -> Self {
        let normalized = cutoff / (sample_rate / 2.0);

        if normalized >= 1.0 {
            return match kind {
                FilterKind::Lowpass => Self::PASS,
                FilterKind::Highpass => Self::SILENCE,
            };
        }
        if normalized <= 0.0 {
            return match kind {
                FilterKind::Lowpass => Self::SILENCE,
                FilterKind::Highpass => Self::PASS,
            };
        }

        let w0 = PI * normalized;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * 10.0_f64.powf(q_db / 20.0));

        let (b0, b1, b2) = match kind {
            FilterKind::Lowpass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterKind::Highpass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `frequency` Hz
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample (Direct Form I)
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Multi-channel biquad filter stage
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    cutoff: f32,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl Biquad {
    pub fn new(kind: FilterKind, cutoff: f32, sample_rate: u32, channels: usize) -> Self {
        Self {
            kind,
            cutoff,
            coeffs: BiquadCoeffs::calculate(kind, sample_rate as f64, cutoff as f64, DEFAULT_Q_DB),
            states: vec![BiquadState::default(); channels],
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Filter every channel of `block` in place
    pub fn process(&mut self, block: &mut [Vec<f32>]) {
        let coeffs = self.coeffs;
        for (channel, state) in block.iter_mut().zip(self.states.iter_mut()) {
            for sample in channel.iter_mut() {
                *sample = state.process(*sample as f64, &coeffs) as f32;
            }
        }
    }
}
