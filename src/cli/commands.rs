//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use log::info;
use serde_json::json;

use crate::cli::ParamArgs;
use crate::config::EngineConfig;
use crate::dsp::impulse::{self, impulse_rng};
use crate::engine::{write_wav_file, AudioBuffer, EncodedAudio, Studio, WavBlob};
use crate::params::{ParamId, Preset};

/// Load the config file if one was given, defaults otherwise
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Fold command-line overrides into the config
fn configure(mut config: EngineConfig, params: &ParamArgs) -> EngineConfig {
    if params.seed.is_some() {
        config.impulse_seed = params.seed;
    }
    if let Some(policy) = params.length_policy {
        config.length_policy = policy.into();
    }
    config
}

/// Open a studio session holding `input`, with overrides applied
fn open_session(studio: &mut Studio, input: &Path, params: &ParamArgs) -> anyhow::Result<()> {
    let blob = EncodedAudio::from_file(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    studio
        .load_recording(&blob)
        .with_context(|| format!("failed to decode {}", input.display()))?;

    if let Some(name) = &params.preset {
        let preset: Preset = name.parse()?;
        studio.apply_preset(preset);
        info!("Applied preset: {}", preset.label());
    }
    for (name, value) in &params.set {
        let stored = studio.set_parameter(name, *value)?;
        if stored != *value {
            info!("{} clamped to {}", name, stored);
        }
    }
    Ok(())
}

/// Write a blob to `output`, or under its own name in the current directory
fn save_blob(blob: &WavBlob, output: Option<&Path>) -> anyhow::Result<PathBuf> {
    let path = match output {
        Some(path) => {
            std::fs::write(path, &blob.bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            path.to_path_buf()
        }
        None => blob
            .write_to(Path::new("."))
            .with_context(|| format!("failed to write {}", blob.file_name))?,
    };

    println!("Wrote: {}", path.display());
    println!("Size: {} bytes ({})", blob.len(), blob.mime_type());
    println!("SHA-256: {}", blob.sha256_hex());
    Ok(path)
}

/// Render a recording through the effects chain and export it.
pub fn render(
    config: EngineConfig,
    input: &Path,
    output: Option<&Path>,
    params: &ParamArgs,
) -> anyhow::Result<()> {
    info!("Rendering: {}", input.display());

    let mut studio = Studio::new(configure(config, params));
    open_session(&mut studio, input, params)?;

    let values = studio.parameters();
    println!("=== Aurora Render ===");
    for id in ParamId::ALL {
        println!("{:<16} {}", id.label(), values.get(id));
    }
    println!();

    let blob = studio.export_processed_wav().context("render failed")?;
    save_blob(&blob, output)?;
    Ok(())
}

/// Re-encode a recording without processing.
pub fn export_raw(config: EngineConfig, input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    info!("Exporting raw: {}", input.display());

    let mut studio = Studio::new(config);
    open_session(&mut studio, input, &ParamArgs::default())?;

    let blob = studio.export_raw_wav().context("export failed")?;
    save_blob(&blob, output)?;
    Ok(())
}

/// List parameters with their ranges.
pub fn list_params(json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<_> = ParamId::ALL
            .iter()
            .map(|id| {
                let (min, max) = id.range();
                json!({
                    "name": id.name(),
                    "label": id.label(),
                    "min": min,
                    "max": max,
                    "step": id.step(),
                    "default": id.default_value(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:<12} {:<16} {:>10} {:>10} {:>8} {:>10}", "NAME", "LABEL", "MIN", "MAX", "STEP", "DEFAULT");
    for id in ParamId::ALL {
        let (min, max) = id.range();
        println!(
            "{:<12} {:<16} {:>10} {:>10} {:>8} {:>10}",
            id.name(),
            id.label(),
            min,
            max,
            id.step(),
            id.default_value()
        );
    }
    Ok(())
}

/// List presets and the values they set.
pub fn list_presets(json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<_> = Preset::ALL
            .iter()
            .map(|preset| {
                let values: serde_json::Map<String, serde_json::Value> = preset
                    .values()
                    .iter()
                    .map(|(id, value)| (id.name().to_string(), json!(value)))
                    .collect();
                json!({
                    "name": preset.name(),
                    "label": preset.label(),
                    "values": values,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for preset in Preset::ALL {
        let values: Vec<String> = preset
            .values()
            .iter()
            .map(|(id, value)| format!("{}={}", id.name(), value))
            .collect();
        println!("{:<8} {:<8} {}", preset.name(), preset.label(), values.join(" "));
    }
    Ok(())
}

/// Write a reverb impulse response to disk.
pub fn write_impulse(
    output: &Path,
    sample_rate: u32,
    channels: usize,
    seconds: f32,
    decay: f32,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    if !(1..=impulse::MAX_IMPULSE_CHANNELS).contains(&channels) {
        bail!(
            "impulse channel count must be 1..={}, got {}",
            impulse::MAX_IMPULSE_CHANNELS,
            channels
        );
    }

    let mut rng = impulse_rng(seed);
    let ir: AudioBuffer = impulse::generate(seconds, decay, sample_rate, channels, &mut rng)?;
    write_wav_file(&ir, output).with_context(|| format!("failed to write {}", output.display()))?;

    println!("Wrote: {}", output.display());
    println!(
        "{} frames x {} ch at {} Hz (decay {})",
        ir.num_samples(),
        ir.num_channels(),
        sample_rate,
        decay
    );
    Ok(())
}

/// Play a recording on the default output device.
#[cfg(feature = "cpal")]
pub fn play(config: EngineConfig, input: &Path, raw: bool, params: &ParamArgs) -> anyhow::Result<()> {
    use crate::engine::CpalDevice;

    let device = CpalDevice::open_default().context("no usable output device")?;
    let mut studio = Studio::with_device(configure(config, params), Box::new(device));
    open_session(&mut studio, input, params)?;

    let handle = if raw {
        studio.play_raw()?
    } else {
        studio.play_processed()?
    };
    println!("Playing {} ({})", input.display(), if raw { "raw" } else { "processed" });

    let outcome = studio.wait_playback();
    info!("Playback {} ended: {:?}", handle.id(), outcome);
    Ok(())
}

/// Play a recording on the default output device.
#[cfg(not(feature = "cpal"))]
pub fn play(_config: EngineConfig, _input: &Path, _raw: bool, _params: &ParamArgs) -> anyhow::Result<()> {
    bail!("live playback needs the `cpal` feature (cargo build --features cpal)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::read_wav_file;
    use tempfile::tempdir;

    #[test]
    fn test_render_writes_processed_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("take.wav");
        let output = dir.path().join("out.wav");
        write_wav_file(&AudioBuffer::sine_wave(440.0, 0.2, 8000, 1), &input).unwrap();

        let params = ParamArgs {
            preset: Some("phone".to_string()),
            set: vec![("pitch".to_string(), 2.0)],
            seed: Some(1),
            length_policy: None,
        };
        render(EngineConfig::default(), &input, Some(&output), &params).unwrap();

        let rendered = read_wav_file(&output).unwrap();
        assert_eq!(rendered.num_samples(), 800);
        assert_eq!(rendered.sample_rate, 8000);
    }

    #[test]
    fn test_render_rejects_unknown_parameter() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("take.wav");
        write_wav_file(&AudioBuffer::sine_wave(440.0, 0.1, 8000, 1), &input).unwrap();

        let params = ParamArgs {
            set: vec![("wobble".to_string(), 1.0)],
            ..ParamArgs::default()
        };
        let result = render(
            EngineConfig::default(),
            &input,
            Some(&dir.path().join("out.wav")),
            &params,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_export_raw_copies_audio() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("take.wav");
        let output = dir.path().join("raw.wav");
        let original = AudioBuffer::sine_wave(440.0, 0.1, 8000, 2);
        write_wav_file(&original, &input).unwrap();

        export_raw(EngineConfig::default(), &input, Some(&output)).unwrap();
        let exported = read_wav_file(&output).unwrap();
        assert!(exported.is_approx_equal(&original, 1e-4));
    }

    #[test]
    fn test_write_impulse() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("ir.wav");
        write_impulse(&output, 8000, 2, 0.5, 2.0, Some(4)).unwrap();

        let ir = read_wav_file(&output).unwrap();
        assert_eq!(ir.num_samples(), 4000);
        assert_eq!(ir.num_channels(), 2);
        assert!(write_impulse(&output, 8000, 3, 0.5, 2.0, None).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(load_config(Some(Path::new("/nonexistent/aurora.json"))).is_err());
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }
}
