//! Convolution Reverb
//!
//! Uniformly partitioned overlap-save convolution. The impulse response is
//! cut into partitions of one processing block each, every partition is
//! transformed once up front, and each incoming block is convolved in the
//! frequency domain against all partitions through a frequency-domain delay
//! line. Cost per block is one forward FFT, one inverse FFT and one complex
//! multiply-accumulate per partition, with no added latency.
//!
//! The impulse is power-normalized the same way the browser convolver
//! normalizes its buffers, so a long noise kernel does not blow up the level.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::engine::AudioBuffer;

/// Target level calibration (-58 dB)
const GAIN_CALIBRATION: f32 = 0.00125;

/// Sample rate the calibration was measured at
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;

/// Floor for the measured impulse power
const MIN_POWER: f32 = 0.000125;

/// Normalization factor applied to an impulse response
pub fn normalization_scale(impulse: &AudioBuffer) -> f32 {
    let count = impulse.num_channels() * impulse.num_samples();
    let sum_squares: f64 = impulse
        .samples
        .iter()
        .flat_map(|ch| ch.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let mut power = (sum_squares / count as f64).sqrt() as f32;
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }

    let mut scale = GAIN_CALIBRATION / power;
    if impulse.sample_rate > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / impulse.sample_rate as f32;
    }
    scale
}

/// Per-channel convolution state
struct Lane {
    /// Impulse channel this lane convolves with
    impulse_channel: usize,
    /// Previous block followed by the current block
    history: Vec<f32>,
    /// Spectra of the most recent input blocks, newest at `head`
    spectra: Vec<Vec<Complex<f32>>>,
    head: usize,
    accum: Vec<Complex<f32>>,
}

/// Partitioned FFT convolver
pub struct Convolver {
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// `[impulse channel][partition]` spectra, scaled for normalization and
    /// the inverse transform
    partitions: Vec<Vec<Vec<Complex<f32>>>>,
    lanes: Vec<Lane>,
    scratch: Vec<Complex<f32>>,
    impulse_len: usize,
    scale: f32,
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("block_size", &self.block_size)
            .field("partitions", &self.partition_count())
            .field("channels", &self.lanes.len())
            .field("impulse_len", &self.impulse_len)
            .field("scale", &self.scale)
            .finish()
    }
}

impl Convolver {
    /// Prepare a convolver for `channels` lanes processing `block_size`
    /// frames at a time
    ///
    /// Lane `c` convolves with impulse channel `c % impulse_channels`.
    pub fn new(impulse: &AudioBuffer, channels: usize, block_size: usize, normalize: bool) -> Self {
        let fft_size = block_size * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        let impulse_len = impulse.num_samples();
        let partition_count = impulse_len.div_ceil(block_size).max(1);
        let scale = if normalize {
            normalization_scale(impulse)
        } else {
            1.0
        };
        // rustfft does not normalize the inverse transform
        let gain = scale / fft_size as f32;

        let zero = Complex::new(0.0, 0.0);
        let partitions: Vec<Vec<Vec<Complex<f32>>>> = impulse
            .samples
            .iter()
            .map(|channel| {
                (0..partition_count)
                    .map(|k| {
                        let mut spectrum = vec![zero; fft_size];
                        let start = (k * block_size).min(channel.len());
                        let end = ((k + 1) * block_size).min(channel.len());
                        for (dst, &h) in spectrum.iter_mut().zip(&channel[start..end]) {
                            *dst = Complex::new(h * gain, 0.0);
                        }
                        fft.process(&mut spectrum);
                        spectrum
                    })
                    .collect()
            })
            .collect();

        let impulse_channels = partitions.len().max(1);
        let lanes = (0..channels)
            .map(|c| Lane {
                impulse_channel: c % impulse_channels,
                history: vec![0.0; fft_size],
                spectra: vec![vec![zero; fft_size]; partition_count],
                head: 0,
                accum: vec![zero; fft_size],
            })
            .collect();

        Self {
            block_size,
            fft,
            ifft,
            partitions,
            lanes,
            scratch: vec![zero; fft_size],
            impulse_len,
            scale,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn partition_count(&self) -> usize {
        self.lanes.first().map(|l| l.spectra.len()).unwrap_or(0)
    }

    pub fn impulse_len(&self) -> usize {
        self.impulse_len
    }

    /// Normalization factor applied to the impulse
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Convolve one block per channel from `input` into `output`
    ///
    /// Every channel slice must be exactly `block_size` frames long.
    pub fn process(&mut self, input: &[Vec<f32>], output: &mut [Vec<f32>]) {
        let b = self.block_size;
        let zero = Complex::new(0.0, 0.0);

        for ((lane, inp), out) in self.lanes.iter_mut().zip(input).zip(output.iter_mut()) {
            debug_assert_eq!(inp.len(), b);

            lane.history.copy_within(b.., 0);
            lane.history[b..].copy_from_slice(inp);

            for (dst, &x) in self.scratch.iter_mut().zip(&lane.history) {
                *dst = Complex::new(x, 0.0);
            }
            self.fft.process(&mut self.scratch);

            let count = lane.spectra.len();
            if self.partitions.is_empty() {
                out.fill(0.0);
                continue;
            }
            lane.head = (lane.head + count - 1) % count;
            lane.spectra[lane.head].copy_from_slice(&self.scratch);

            lane.accum.fill(zero);
            let kernel = &self.partitions[lane.impulse_channel];
            for (k, h) in kernel.iter().enumerate() {
                let x = &lane.spectra[(lane.head + k) % count];
                for ((acc, x), h) in lane.accum.iter_mut().zip(x).zip(h) {
                    *acc += x * h;
                }
            }

            self.ifft.process(&mut lane.accum);
            for (o, y) in out.iter_mut().zip(&lane.accum[b..]) {
                *o = y.re;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn direct_convolution(x: &[f32], h: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; x.len()];
        for (n, out) in y.iter_mut().enumerate() {
            for (k, &hk) in h.iter().enumerate().take(n + 1) {
                *out += hk * x[n - k];
            }
        }
        y
    }

    fn run(conv: &mut Convolver, x: &[f32]) -> Vec<f32> {
        let b = conv.block_size();
        let mut y = Vec::new();
        for chunk in x.chunks(b) {
            let mut block = chunk.to_vec();
            block.resize(b, 0.0);
            let mut out = vec![vec![0.0; b]];
            conv.process(&[block], &mut out);
            y.extend_from_slice(&out[0]);
        }
        y.truncate(x.len());
        y
    }

    #[test]
    fn test_matches_direct_convolution() {
        let h: Vec<f32> = (0..300).map(|i| ((i * 7 % 13) as f32 - 6.0) / 10.0).collect();
        let x: Vec<f32> = (0..1000).map(|i| ((i * 5 % 11) as f32 - 5.0) / 8.0).collect();
        let impulse = AudioBuffer::from_channels(vec![h.clone()], 8000).unwrap();

        let mut conv = Convolver::new(&impulse, 1, 64, false);
        assert_eq!(conv.partition_count(), 5);

        let fast = run(&mut conv, &x);
        let slow = direct_convolution(&x, &h);
        for (a, b) in fast.iter().zip(&slow) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_unit_impulse_is_identity() {
        let impulse = AudioBuffer::from_channels(vec![vec![1.0]], 8000).unwrap();
        let mut conv = Convolver::new(&impulse, 1, 128, false);
        let x: Vec<f32> = (0..512).map(|i| (i as f32 * 0.1).sin()).collect();
        let y = run(&mut conv, &x);
        for (a, b) in x.iter().zip(&y) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_lanes_map_to_impulse_channels() {
        let impulse =
            AudioBuffer::from_channels(vec![vec![1.0, 0.0], vec![0.0, 0.5]], 8000).unwrap();
        let mut conv = Convolver::new(&impulse, 2, 4, false);
        let input = vec![vec![1.0, 0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0, 0.0]];
        let mut output = vec![vec![0.0; 4]; 2];
        conv.process(&input, &mut output);

        assert_abs_diff_eq!(output[0][0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(output[0][1], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(output[1][0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(output[1][1], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_normalization_scale() {
        // Constant impulse of power 0.5 at the calibration rate
        let impulse = AudioBuffer::from_channels(vec![vec![0.5; 100]], 44100).unwrap();
        assert_abs_diff_eq!(normalization_scale(&impulse), 0.00125 / 0.5, epsilon = 1e-7);

        // Half the rate doubles the scale
        let impulse = AudioBuffer::from_channels(vec![vec![0.5; 100]], 22050).unwrap();
        assert_abs_diff_eq!(normalization_scale(&impulse), 0.005, epsilon = 1e-7);

        // Silent impulse uses the power floor
        let silent = AudioBuffer::from_channels(vec![vec![0.0; 100]], 44100).unwrap();
        assert_abs_diff_eq!(normalization_scale(&silent), 10.0, epsilon = 1e-4);
    }
}
