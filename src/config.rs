//! Engine configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below.
//!
//! ```json
//! {
//!   "impulse_seed": 42,
//!   "length_policy": "pitch_adjusted",
//!   "analyser_fft_size": 2048,
//!   "initial_parameters": { "gain": 80, "reverbMix": 0.3 },
//!   "raw_file_prefix": "Aurora_",
//!   "processed_file_prefix": "Aurora_fx_"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::analyser::{validate_fft_size, DEFAULT_FFT_SIZE};
use crate::engine::offline::LengthPolicy;
use crate::error::{AuroraError, Result};
use crate::params::ParameterSet;

pub const DEFAULT_RAW_PREFIX: &str = "Aurora_";
pub const DEFAULT_PROCESSED_PREFIX: &str = "Aurora_fx_";

/// Settings shared by the live and offline engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the reverb impulse noise; `None` draws fresh noise per graph
    pub impulse_seed: Option<u64>,
    pub length_policy: LengthPolicy,
    pub analyser_fft_size: usize,
    /// Parameter values at startup
    pub initial_parameters: ParameterSet,
    pub raw_file_prefix: String,
    pub processed_file_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            impulse_seed: None,
            length_policy: LengthPolicy::default(),
            analyser_fft_size: DEFAULT_FFT_SIZE,
            initial_parameters: ParameterSet::default(),
            raw_file_prefix: DEFAULT_RAW_PREFIX.to_string(),
            processed_file_prefix: DEFAULT_PROCESSED_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: EngineConfig = serde_json::from_str(&content)?;
        config.initial_parameters = config.initial_parameters.clamped();
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.analyser_fft_size)?;

        for (field, prefix) in [
            ("raw_file_prefix", &self.raw_file_prefix),
            ("processed_file_prefix", &self.processed_file_prefix),
        ] {
            if prefix.contains(|c: char| c == '/' || c == '\\') {
                return Err(AuroraError::Config {
                    reason: format!("{} must not contain path separators", field),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.impulse_seed, None);
        assert_eq!(config.length_policy, LengthPolicy::PitchAdjusted);
        assert_eq!(config.analyser_fft_size, 2048);
        assert_eq!(config.raw_file_prefix, "Aurora_");
        assert_eq!(config.processed_file_prefix, "Aurora_fx_");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aurora.json");
        fs::write(
            &path,
            r#"{
                "impulse_seed": 7,
                "length_policy": "source_duration",
                "initial_parameters": { "volume": 80, "reverbMix": 3.0, "lowpass": 5000 }
            }"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.impulse_seed, Some(7));
        assert_eq!(config.length_policy, LengthPolicy::SourceDuration);
        assert_eq!(config.analyser_fft_size, 2048);
        assert_eq!(config.initial_parameters.reverb_mix, 1.0);
        assert_eq!(config.initial_parameters.lowpass_cutoff, 5000.0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aurora.json");
        let config = EngineConfig {
            impulse_seed: Some(99),
            analyser_fft_size: 1024,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = EngineConfig {
            analyser_fft_size: 1000,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuroraError::Config { .. })));

        let config = EngineConfig {
            raw_file_prefix: "../escape_".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aurora.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(AuroraError::Serialization(_))
        ));
    }
}
