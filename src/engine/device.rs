//! Output Devices
//!
//! A device pulls interleaved frames from a shared [`FrameSource`] whenever
//! it needs them, in whatever chunk size it likes. [`CaptureDevice`] is pulled
//! by the caller (headless use and tests); `CpalDevice` is pulled by the
//! system audio callback when the `cpal` feature is enabled.

use std::sync::{Arc, Mutex};

use crate::engine::AudioBuffer;
use crate::error::Result;

/// Something a device can pull interleaved frames from
pub trait FrameSource: Send {
    /// Fill `out` with interleaved frames of `channels` channels
    ///
    /// Returns how many leading frames carry playback; everything after them
    /// is silence.
    fn fill_interleaved(&mut self, out: &mut [f32], channels: usize) -> usize;
}

/// Frame source shared between the engine and a device callback
pub type SharedSource = Arc<Mutex<dyn FrameSource>>;

/// Pull `out` from a shared source, producing silence if the lock is poisoned
pub(crate) fn pull_shared(source: &SharedSource, out: &mut [f32], channels: usize) -> usize {
    match source.lock() {
        Ok(mut guard) => guard.fill_interleaved(out, channels),
        Err(_) => {
            out.fill(0.0);
            0
        }
    }
}

/// A real-time (or simulated) audio output
pub trait OutputDevice {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Start pulling from `source`
    fn attach(&mut self, source: SharedSource) -> Result<()>;

    /// Stop pulling and release the stream; safe to call repeatedly
    fn detach(&mut self);

    fn is_attached(&self) -> bool;
}

// ============================================================================
// Capture device
// ============================================================================

/// In-memory device that renders only when pulled
///
/// Cloning yields another handle to the same device, so a test can keep a
/// handle while the engine owns the boxed device.
#[derive(Clone)]
pub struct CaptureDevice {
    sample_rate: u32,
    channels: usize,
    source: Arc<Mutex<Option<SharedSource>>>,
}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl CaptureDevice {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            source: Arc::new(Mutex::new(None)),
        }
    }

    fn current(&self) -> Option<SharedSource> {
        match self.source.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Pull `frames` interleaved frames, like one device callback
    ///
    /// Returns the frames and how many of them carry playback.
    pub fn pull(&self, frames: usize) -> (Vec<f32>, usize) {
        let mut out = vec![0.0; frames * self.channels];
        let live = match self.current() {
            Some(source) => pull_shared(&source, &mut out, self.channels),
            None => 0,
        };
        (out, live)
    }

    /// Pull in `chunk`-frame callbacks until playback stops, returning the
    /// captured playback
    pub fn run_until_complete(&self, chunk: usize) -> Result<AudioBuffer> {
        let chunk = chunk.max(1);
        let mut captured = Vec::new();
        loop {
            let (out, live) = self.pull(chunk);
            captured.extend_from_slice(&out[..live * self.channels]);
            if live < chunk {
                break;
            }
        }
        AudioBuffer::from_interleaved(&captured, self.channels, self.sample_rate)
    }
}

impl OutputDevice for CaptureDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn attach(&mut self, source: SharedSource) -> Result<()> {
        let mut slot = match self.source.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(source);
        Ok(())
    }

    fn detach(&mut self) {
        let mut slot = match self.source.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }

    fn is_attached(&self) -> bool {
        self.current().is_some()
    }
}

// ============================================================================
// System output (cpal)
// ============================================================================

#[cfg(feature = "cpal")]
pub use self::system::CpalDevice;

#[cfg(feature = "cpal")]
mod system {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use log::{error, info};

    use super::{pull_shared, OutputDevice, SharedSource};
    use crate::error::{AuroraError, Result};

    fn device_error(reason: impl std::fmt::Display) -> AuroraError {
        AuroraError::Device {
            reason: reason.to_string(),
        }
    }

    /// Default system output device
    pub struct CpalDevice {
        device: cpal::Device,
        config: cpal::SupportedStreamConfig,
        stream: Option<cpal::Stream>,
    }

    impl CpalDevice {
        /// Open the default output device of the default host
        pub fn open_default() -> Result<Self> {
            let host = cpal::default_host();
            info!("Audio host: {:?}", host.id());

            let device = host
                .default_output_device()
                .ok_or_else(|| device_error("no audio output device found"))?;
            if let Ok(name) = device.name() {
                info!("Audio device: {}", name);
            }

            let config = device.default_output_config().map_err(device_error)?;
            info!("Audio config: {:?}", config);

            Ok(Self {
                device,
                config,
                stream: None,
            })
        }

        fn build_stream<T>(&self, source: SharedSource) -> Result<cpal::Stream>
        where
            T: cpal::SizedSample + cpal::FromSample<f32>,
        {
            let channels = self.config.channels() as usize;
            let mut scratch: Vec<f32> = Vec::new();

            self.device
                .build_output_stream(
                    &self.config.config(),
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        pull_shared(&source, &mut scratch, channels);
                        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                            *dst = T::from_sample(src);
                        }
                    },
                    |err| error!("Audio stream error: {}", err),
                    None,
                )
                .map_err(device_error)
        }
    }

    impl OutputDevice for CpalDevice {
        fn sample_rate(&self) -> u32 {
            self.config.sample_rate().0
        }

        fn channels(&self) -> usize {
            self.config.channels() as usize
        }

        fn attach(&mut self, source: SharedSource) -> Result<()> {
            let stream = match self.config.sample_format() {
                cpal::SampleFormat::F32 => self.build_stream::<f32>(source)?,
                cpal::SampleFormat::I16 => self.build_stream::<i16>(source)?,
                cpal::SampleFormat::U16 => self.build_stream::<u16>(source)?,
                other => {
                    return Err(AuroraError::UnsupportedFormat {
                        format: format!("device sample format {:?}", other),
                    })
                }
            };
            stream.play().map_err(device_error)?;
            info!("Audio stream started at {} Hz", self.sample_rate());
            self.stream = Some(stream);
            Ok(())
        }

        fn detach(&mut self) {
            if self.stream.take().is_some() {
                info!("Audio stream released");
            }
        }

        fn is_attached(&self) -> bool {
            self.stream.is_some()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        remaining: usize,
    }

    impl FrameSource for Counter {
        fn fill_interleaved(&mut self, out: &mut [f32], channels: usize) -> usize {
            out.fill(0.0);
            let frames = (out.len() / channels).min(self.remaining);
            for s in &mut out[..frames * channels] {
                *s = 1.0;
            }
            self.remaining -= frames;
            frames
        }
    }

    #[test]
    fn test_unattached_device_is_silent() {
        let device = CaptureDevice::new(8000, 2);
        let (out, live) = device.pull(16);
        assert_eq!(out.len(), 32);
        assert_eq!(live, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_run_until_complete_collects_live_frames() {
        let mut device = CaptureDevice::new(8000, 2);
        let source: SharedSource = Arc::new(Mutex::new(Counter { remaining: 250 }));
        device.attach(source).unwrap();

        let captured = device.run_until_complete(97).unwrap();
        assert_eq!(captured.num_samples(), 250);
        assert_eq!(captured.num_channels(), 2);
        assert_eq!(captured.sample_rate, 8000);
        assert!(captured.channel(1).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_clones_share_attachment() {
        let mut device = CaptureDevice::new(8000, 1);
        let probe = device.clone();
        device
            .attach(Arc::new(Mutex::new(Counter { remaining: 4 })))
            .unwrap();
        assert!(probe.is_attached());

        device.detach();
        device.detach();
        assert!(!probe.is_attached());
    }
}
