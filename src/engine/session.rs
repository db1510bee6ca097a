//! Studio Session
//!
//! Ties one captured recording to the parameter store, the decoder, both
//! engines and the WAV encoder. This is the surface a UI talks to: load a
//! take, twist knobs, audition it processed or raw, and export either
//! version as a WAV download.

use std::sync::Arc;

use log::info;

use crate::config::EngineConfig;
use crate::dsp::Analyser;
use crate::engine::device::OutputDevice;
use crate::engine::io::{Decoder, EncodedAudio, WavBlob, WavDecoder};
use crate::engine::live::{LivePlaybackEngine, PlaybackHandle, PlaybackOutcome};
use crate::engine::offline::OfflineRenderer;
use crate::engine::AudioBuffer;
use crate::error::{AuroraError, Result};
use crate::params::{ParameterSet, ParameterStore, Preset};

/// One recording session
pub struct Studio {
    config: EngineConfig,
    params: ParameterStore,
    decoder: Box<dyn Decoder>,
    offline: OfflineRenderer,
    live: Option<LivePlaybackEngine>,
    recording: Option<Arc<AudioBuffer>>,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("parameters", &*self.params.snapshot())
            .field("has_recording", &self.recording.is_some())
            .field("live", &self.live)
            .finish()
    }
}

impl Studio {
    /// Headless session: rendering and export only
    pub fn new(config: EngineConfig) -> Self {
        Self {
            params: ParameterStore::with_values(config.initial_parameters),
            decoder: Box::new(WavDecoder),
            offline: OfflineRenderer::from_config(&config),
            live: None,
            recording: None,
            config,
        }
    }

    /// Session that can also play through `device`
    pub fn with_device(config: EngineConfig, device: Box<dyn OutputDevice>) -> Self {
        let live = LivePlaybackEngine::new(device, &config);
        let mut studio = Self::new(config);
        studio.live = Some(live);
        studio
    }

    /// Swap the decoder used by [`load_recording`](Self::load_recording)
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Decode a captured blob and make it the current recording
    pub fn load_recording(&mut self, blob: &EncodedAudio) -> Result<Arc<AudioBuffer>> {
        let buffer = self.decoder.decode(blob)?;
        self.set_recording(buffer)
    }

    /// Make an already decoded buffer the current recording
    pub fn set_recording(&mut self, buffer: AudioBuffer) -> Result<Arc<AudioBuffer>> {
        if buffer.is_empty() {
            return Err(AuroraError::EmptyAudio);
        }
        info!(
            "Loaded recording: {:.2}s, {} ch at {} Hz",
            buffer.duration_secs(),
            buffer.num_channels(),
            buffer.sample_rate
        );
        let buffer = Arc::new(buffer);
        self.recording = Some(buffer.clone());
        Ok(buffer)
    }

    pub fn recording(&self) -> Option<&Arc<AudioBuffer>> {
        self.recording.as_ref()
    }

    fn require_recording(&self) -> Result<Arc<AudioBuffer>> {
        self.recording.clone().ok_or(AuroraError::MissingSource)
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn parameters(&self) -> ParameterSet {
        *self.params.snapshot()
    }

    pub fn get_parameter(&self, name: &str) -> Result<f32> {
        self.params.get_parameter(name)
    }

    pub fn set_parameter(&self, name: &str, value: f32) -> Result<f32> {
        self.params.set_parameter(name, value)
    }

    pub fn apply_preset_parameters<'a, I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        self.params.apply_preset_parameters(values)
    }

    pub fn apply_preset(&self, preset: Preset) {
        self.params.apply_preset(preset);
    }

    // ------------------------------------------------------------------
    // Rendering and export
    // ------------------------------------------------------------------

    /// Render the recording with the current parameters
    pub fn render_processed(&self) -> Result<AudioBuffer> {
        let recording = self.require_recording()?;
        let params = self.parameters();
        self.offline.render_shared(recording, &params)
    }

    /// The recording as-is, encoded as WAV
    pub fn export_raw_wav(&self) -> Result<WavBlob> {
        let recording = self.require_recording()?;
        let blob = WavBlob::encode(&recording, &self.config.raw_file_prefix)?;
        info!("Exported {} ({} bytes)", blob.file_name, blob.len());
        Ok(blob)
    }

    /// The processed recording, encoded as WAV
    pub fn export_processed_wav(&self) -> Result<WavBlob> {
        let rendered = self.render_processed()?;
        let blob = WavBlob::encode(&rendered, &self.config.processed_file_prefix)?;
        info!("Exported {} ({} bytes)", blob.file_name, blob.len());
        Ok(blob)
    }

    // ------------------------------------------------------------------
    // Live playback
    // ------------------------------------------------------------------

    /// Audition the recording through the effects graph
    pub fn play_processed(&mut self) -> Result<PlaybackHandle> {
        let recording = self.require_recording()?;
        require_live(&mut self.live)?.play(recording, &self.params)
    }

    /// Audition the recording unprocessed
    pub fn play_raw(&mut self) -> Result<PlaybackHandle> {
        let recording = self.require_recording()?;
        require_live(&mut self.live)?.play_raw(recording)
    }

    /// Block until the current playback ends, then release the device
    pub fn wait_playback(&mut self) -> Option<PlaybackOutcome> {
        self.live.as_mut().and_then(|l| l.wait())
    }

    /// Stop any playback; does nothing without a device
    pub fn stop(&mut self) {
        if let Some(live) = self.live.as_mut() {
            live.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.live.as_ref().map_or(false, |l| l.is_active())
    }

    /// Waveform tap on the live output
    pub fn analyser(&self) -> Option<&Analyser> {
        self.live.as_ref().map(|l| l.analyser())
    }
}

fn require_live(live: &mut Option<LivePlaybackEngine>) -> Result<&mut LivePlaybackEngine> {
    live.as_mut().ok_or_else(|| AuroraError::Device {
        reason: "session has no output device".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::CaptureDevice;
    use crate::engine::io::{encode_wav, WAV_MIME_TYPE};

    fn seeded() -> EngineConfig {
        EngineConfig {
            impulse_seed: Some(21),
            ..EngineConfig::default()
        }
    }

    fn take() -> AudioBuffer {
        AudioBuffer::sine_wave(330.0, 0.25, 8000, 1)
    }

    #[test]
    fn test_exports_without_recording_fail() {
        let studio = Studio::new(EngineConfig::default());
        assert!(matches!(studio.export_raw_wav(), Err(AuroraError::MissingSource)));
        assert!(matches!(
            studio.export_processed_wav(),
            Err(AuroraError::MissingSource)
        ));
    }

    #[test]
    fn test_load_recording_from_blob() {
        let mut studio = Studio::new(EngineConfig::default());
        let blob = EncodedAudio::new(encode_wav(&take()).unwrap(), WAV_MIME_TYPE);
        let recording = studio.load_recording(&blob).unwrap();
        assert_eq!(recording.num_samples(), 2000);
        assert!(studio.recording().is_some());
    }

    #[test]
    fn test_load_empty_recording_fails() {
        let mut studio = Studio::new(EngineConfig::default());
        let blob = EncodedAudio::new(encode_wav(&AudioBuffer::new(1, 0, 8000)).unwrap(), "");
        assert!(matches!(
            studio.load_recording(&blob),
            Err(AuroraError::EmptyAudio)
        ));
        assert!(studio.recording().is_none());
    }

    #[test]
    fn test_export_names_and_contents() {
        let mut studio = Studio::new(seeded());
        studio.set_recording(take()).unwrap();

        let raw = studio.export_raw_wav().unwrap();
        assert!(raw.file_name.starts_with("Aurora_"));
        assert!(!raw.file_name.starts_with("Aurora_fx_"));
        assert_eq!(raw.bytes, encode_wav(&take()).unwrap());

        let processed = studio.export_processed_wav().unwrap();
        assert!(processed.file_name.starts_with("Aurora_fx_"));
        assert_eq!(processed.mime_type(), "audio/wav");
        assert_eq!(processed.len(), 44 + 2000 * 2);
    }

    #[test]
    fn test_processed_export_follows_parameters() {
        let mut studio = Studio::new(seeded());
        studio.set_recording(take()).unwrap();

        let before = studio.export_processed_wav().unwrap();
        studio.set_parameter("gain", 10.0).unwrap();
        let after = studio.export_processed_wav().unwrap();
        assert_ne!(before.bytes, after.bytes);
    }

    #[test]
    fn test_play_requires_device() {
        let mut studio = Studio::new(EngineConfig::default());
        studio.set_recording(take()).unwrap();
        assert!(matches!(
            studio.play_processed(),
            Err(AuroraError::Device { .. })
        ));
        assert!(matches!(studio.play_raw(), Err(AuroraError::Device { .. })));
        assert_eq!(studio.wait_playback(), None);
        assert!(studio.analyser().is_none());
        studio.stop();
    }

    #[test]
    fn test_play_processed_and_raw() {
        let device = CaptureDevice::new(8000, 1);
        let mut studio = Studio::with_device(seeded(), Box::new(device.clone()));
        assert!(matches!(studio.play_raw(), Err(AuroraError::MissingSource)));
        studio.set_recording(take()).unwrap();

        let processed = studio.play_processed().unwrap();
        assert!(studio.is_playing());
        let raw = studio.play_raw().unwrap();
        assert_eq!(processed.try_outcome(), Some(PlaybackOutcome::Stopped));

        let captured = device.run_until_complete(256).unwrap();
        assert_eq!(captured.channel(0), take().channel(0));
        assert_eq!(raw.wait(), PlaybackOutcome::Completed);

        studio.stop();
        assert!(!studio.is_playing());
    }

    #[test]
    fn test_presets_through_session() {
        let studio = Studio::new(EngineConfig::default());
        studio.apply_preset(Preset::Phone);
        assert_eq!(studio.get_parameter("lowpass").unwrap(), 3500.0);
        assert_eq!(studio.get_parameter("highpassCutoff").unwrap(), 400.0);

        studio
            .apply_preset_parameters([("reverbMix", 0.5), ("pitch", 1.2)])
            .unwrap();
        assert_eq!(studio.parameters().reverb_mix, 0.5);
        assert!(studio.apply_preset_parameters([("bogus", 1.0)]).is_err());
    }

    #[test]
    fn test_wait_playback_releases_device() {
        let device = CaptureDevice::new(8000, 1);
        let mut studio = Studio::with_device(seeded(), Box::new(device.clone()));
        studio.set_recording(take()).unwrap();

        studio.play_processed().unwrap();
        device.run_until_complete(100).unwrap();
        assert_eq!(studio.wait_playback(), Some(PlaybackOutcome::Completed));
        assert!(!device.is_attached());
        assert!(!studio.is_playing());
    }
}
