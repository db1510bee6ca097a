//! Waveform Analyser
//!
//! Keeps the most recent `fft_size` frames of the graph output (downmixed to
//! mono) for visualization. The analyser is a pure tap: it never alters the
//! signal passing through the graph.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{AuroraError, Result};

/// Default analysis window in frames
pub const DEFAULT_FFT_SIZE: usize = 2048;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Check an analysis window size
pub fn validate_fft_size(fft_size: usize) -> Result<()> {
    if !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) || !fft_size.is_power_of_two() {
        return Err(AuroraError::Config {
            reason: format!(
                "analyser window {} must be a power of two in {}..={}",
                fft_size, MIN_FFT_SIZE, MAX_FFT_SIZE
            ),
        });
    }
    Ok(())
}

/// Shared handle to a sliding window of output samples
///
/// Cloning yields another handle to the same window, so the render side can
/// write while a UI thread reads.
#[derive(Debug, Clone)]
pub struct Analyser {
    fft_size: usize,
    window: Arc<Mutex<VecDeque<f32>>>,
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

impl Analyser {
    /// Create an analyser; the window starts out silent
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(1);
        Self {
            fft_size,
            window: Arc::new(Mutex::new(std::iter::repeat(0.0).take(fft_size).collect())),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Push one block of output, downmixing channels by averaging
    pub fn write(&self, block: &[Vec<f32>]) {
        let frames = block.first().map(|ch| ch.len()).unwrap_or(0);
        if frames == 0 {
            return;
        }
        let scale = 1.0 / block.len() as f32;

        let mut window = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for i in 0..frames {
            let mono: f32 = block.iter().map(|ch| ch[i]).sum::<f32>() * scale;
            if window.len() == self.fft_size {
                window.pop_front();
            }
            window.push_back(mono);
        }
    }

    /// Most recent `fft_size` samples, oldest first
    pub fn float_time_domain_data(&self) -> Vec<f32> {
        let window = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        window.iter().copied().collect()
    }

    /// Same window quantized to bytes, with 128 as zero
    pub fn byte_time_domain_data(&self) -> Vec<u8> {
        self.float_time_domain_data()
            .into_iter()
            .map(|s| (128.0 * (1.0 + s)).floor().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Reset the window to silence
    pub fn clear(&self) {
        let mut window = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        window.clear();
        window.extend(std::iter::repeat(0.0).take(self.fft_size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_silent() {
        let analyser = Analyser::default();
        let data = analyser.float_time_domain_data();
        assert_eq!(data.len(), DEFAULT_FFT_SIZE);
        assert!(data.iter().all(|&s| s == 0.0));
        assert!(analyser.byte_time_domain_data().iter().all(|&b| b == 128));
    }

    #[test]
    fn test_keeps_latest_window() {
        let analyser = Analyser::new(4);
        analyser.write(&[vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]]);
        assert_eq!(analyser.float_time_domain_data(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_downmixes_channels() {
        let analyser = Analyser::new(2);
        analyser.write(&[vec![1.0, 0.0], vec![0.0, -1.0]]);
        assert_eq!(analyser.float_time_domain_data(), vec![0.5, -0.5]);
    }

    #[test]
    fn test_byte_quantization() {
        let analyser = Analyser::new(4);
        analyser.write(&[vec![-1.0, 0.0, 0.5, 2.0]]);
        assert_eq!(analyser.byte_time_domain_data(), vec![0, 128, 192, 255]);
    }

    #[test]
    fn test_clones_share_window() {
        let analyser = Analyser::new(2);
        let reader = analyser.clone();
        analyser.write(&[vec![0.25, 0.75]]);
        assert_eq!(reader.float_time_domain_data(), vec![0.25, 0.75]);
        reader.clear();
        assert_eq!(analyser.float_time_domain_data(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_validate_fft_size() {
        assert!(validate_fft_size(2048).is_ok());
        assert!(validate_fft_size(32).is_ok());
        assert!(validate_fft_size(1000).is_err());
        assert!(validate_fft_size(16).is_err());
        assert!(validate_fft_size(65536).is_err());
    }
}
