//! Parameter Store
//!
//! Holds the current value of every effect parameter. The store is the only
//! state shared between the UI-driven mutation path and the rendering paths,
//! so it publishes immutable [`ParameterSet`] snapshots through an
//! [`ArcSwap`]: writers swap in a new set, graph builds read one snapshot and
//! never observe a half-applied update.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AuroraError, Result};

// ============================================================================
// Parameter identifiers
// ============================================================================

/// Identifier of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamId {
    /// Master output level, 0-100 UI scale
    Gain,
    /// Playback rate multiplier
    Pitch,
    /// Lowpass cutoff in Hz
    Lowpass,
    /// Highpass cutoff in Hz
    Highpass,
    /// Delay time in seconds
    DelayTime,
    /// Wet/dry balance of the reverb
    ReverbMix,
}

impl ParamId {
    /// All parameters in UI order
    pub const ALL: [ParamId; 6] = [
        ParamId::Gain,
        ParamId::Pitch,
        ParamId::Lowpass,
        ParamId::Highpass,
        ParamId::DelayTime,
        ParamId::ReverbMix,
    ];

    /// Canonical name used at the UI boundary
    pub fn name(&self) -> &'static str {
        match self {
            ParamId::Gain => "gain",
            ParamId::Pitch => "pitch",
            ParamId::Lowpass => "lowpass",
            ParamId::Highpass => "highpass",
            ParamId::DelayTime => "delayTime",
            ParamId::ReverbMix => "reverbMix",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ParamId::Gain => "Volume",
            ParamId::Pitch => "Pitch",
            ParamId::Lowpass => "Lowpass Filter",
            ParamId::Highpass => "Highpass Filter",
            ParamId::DelayTime => "Delay",
            ParamId::ReverbMix => "Reverb",
        }
    }

    /// Declared (min, max) range
    pub fn range(&self) -> (f32, f32) {
        match self {
            ParamId::Gain => (0.0, 100.0),
            ParamId::Pitch => (0.5, 2.0),
            ParamId::Lowpass => (200.0, 20000.0),
            ParamId::Highpass => (10.0, 5000.0),
            ParamId::DelayTime => (0.0, 0.5),
            ParamId::ReverbMix => (0.0, 1.0),
        }
    }

    /// UI step size
    pub fn step(&self) -> f32 {
        match self {
            ParamId::Gain | ParamId::Lowpass | ParamId::Highpass => 1.0,
            ParamId::Pitch | ParamId::DelayTime => 0.01,
            ParamId::ReverbMix => 0.1,
        }
    }

    /// Startup value
    pub fn default_value(&self) -> f32 {
        match self {
            ParamId::Gain => 50.0,
            ParamId::Pitch => 1.0,
            ParamId::Lowpass => 20000.0,
            ParamId::Highpass => 10.0,
            ParamId::DelayTime => 0.0,
            ParamId::ReverbMix => 0.0,
        }
    }

    /// Clamp a value into this parameter's range
    ///
    /// Non-finite input falls back to the default value.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default_value();
        }
        let (min, max) = self.range();
        value.clamp(min, max)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamId {
    type Err = AuroraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gain" | "volume" => Ok(ParamId::Gain),
            "pitch" => Ok(ParamId::Pitch),
            "lowpass" | "lowpassCutoff" | "lowpass_cutoff" => Ok(ParamId::Lowpass),
            "highpass" | "highpassCutoff" | "highpass_cutoff" => Ok(ParamId::Highpass),
            "delayTime" | "delay_time" | "delay" => Ok(ParamId::DelayTime),
            "reverbMix" | "reverb_mix" | "reverb" => Ok(ParamId::ReverbMix),
            _ => Err(AuroraError::UnknownParameter {
                name: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Parameter Set
// ============================================================================

/// One complete, clamped set of parameter values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSet {
    #[serde(alias = "volume")]
    pub gain: f32,
    pub pitch: f32,
    #[serde(alias = "lowpass")]
    pub lowpass_cutoff: f32,
    #[serde(alias = "highpass")]
    pub highpass_cutoff: f32,
    pub delay_time: f32,
    pub reverb_mix: f32,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            gain: ParamId::Gain.default_value(),
            pitch: ParamId::Pitch.default_value(),
            lowpass_cutoff: ParamId::Lowpass.default_value(),
            highpass_cutoff: ParamId::Highpass.default_value(),
            delay_time: ParamId::DelayTime.default_value(),
            reverb_mix: ParamId::ReverbMix.default_value(),
        }
    }
}

impl ParameterSet {
    /// Read one value
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::Gain => self.gain,
            ParamId::Pitch => self.pitch,
            ParamId::Lowpass => self.lowpass_cutoff,
            ParamId::Highpass => self.highpass_cutoff,
            ParamId::DelayTime => self.delay_time,
            ParamId::ReverbMix => self.reverb_mix,
        }
    }

    /// Write one value, clamped; returns the stored value
    pub fn set(&mut self, id: ParamId, value: f32) -> f32 {
        let clamped = id.clamp(value);
        let slot = match id {
            ParamId::Gain => &mut self.gain,
            ParamId::Pitch => &mut self.pitch,
            ParamId::Lowpass => &mut self.lowpass_cutoff,
            ParamId::Highpass => &mut self.highpass_cutoff,
            ParamId::DelayTime => &mut self.delay_time,
            ParamId::ReverbMix => &mut self.reverb_mix,
        };
        *slot = clamped;
        clamped
    }

    /// Copy with every value clamped into range
    pub fn clamped(mut self) -> Self {
        for id in ParamId::ALL {
            self.set(id, self.get(id));
        }
        self
    }

    /// Master gain as a linear multiplier (0.0-1.0)
    pub fn master_gain(&self) -> f32 {
        self.gain / 100.0
    }

    /// Gain of the unprocessed branch
    pub fn dry_gain(&self) -> f32 {
        1.0 - self.reverb_mix
    }

    /// Gain of the reverb branch
    pub fn wet_gain(&self) -> f32 {
        self.reverb_mix
    }
}

// ============================================================================
// Presets
// ============================================================================

/// Built-in effect presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Clean,
    Phone,
    Hall,
    LoFi,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Clean, Preset::Phone, Preset::Hall, Preset::LoFi];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Clean => "clean",
            Preset::Phone => "phone",
            Preset::Hall => "hall",
            Preset::LoFi => "lofi",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Preset::Clean => "Clean",
            Preset::Phone => "Phone",
            Preset::Hall => "Hall",
            Preset::LoFi => "Lo-Fi",
        }
    }

    /// Values the preset assigns. Presets never touch gain.
    pub fn values(&self) -> [(ParamId, f32); 5] {
        let (lowpass, highpass, delay, reverb, pitch) = match self {
            Preset::Clean => (20000.0, 20.0, 0.0, 0.0, 1.0),
            Preset::Phone => (3500.0, 400.0, 0.0, 0.0, 1.0),
            Preset::Hall => (18000.0, 80.0, 0.25, 0.7, 1.0),
            Preset::LoFi => (5000.0, 150.0, 0.12, 0.4, 0.9),
        };
        [
            (ParamId::Lowpass, lowpass),
            (ParamId::Highpass, highpass),
            (ParamId::DelayTime, delay),
            (ParamId::ReverbMix, reverb),
            (ParamId::Pitch, pitch),
        ]
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = AuroraError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s) || p.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| AuroraError::UnknownPreset {
                name: s.to_string(),
            })
    }
}

// ============================================================================
// Parameter Store
// ============================================================================

/// Shared, snapshot-on-read store of the current parameters
#[derive(Debug)]
pub struct ParameterStore {
    current: ArcSwap<ParameterSet>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    /// Store initialized to defaults
    pub fn new() -> Self {
        Self::with_values(ParameterSet::default())
    }

    /// Store initialized to the given values (clamped)
    pub fn with_values(values: ParameterSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(values.clamped()),
        }
    }

    /// Immutable snapshot of the current values
    pub fn snapshot(&self) -> Arc<ParameterSet> {
        self.current.load_full()
    }

    /// Read a value by identifier
    pub fn get(&self, id: ParamId) -> f32 {
        self.current.load().get(id)
    }

    /// Write a value by identifier; returns the stored (clamped) value
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        let mut stored = 0.0;
        self.current.rcu(|current| {
            let mut next = **current;
            stored = next.set(id, value);
            next
        });
        debug!("parameter {} = {}", id, stored);
        stored
    }

    /// Read a value by name
    pub fn get_parameter(&self, name: &str) -> Result<f32> {
        Ok(self.get(name.parse()?))
    }

    /// Write a value by name; out-of-range values are clamped, never rejected
    pub fn set_parameter(&self, name: &str, value: f32) -> Result<f32> {
        Ok(self.set(name.parse()?, value))
    }

    /// Bulk-set named parameters, leaving unspecified ones untouched
    ///
    /// `gain` entries are ignored. An unknown name rejects the whole mapping
    /// before anything is written.
    pub fn apply_preset_parameters<'a, I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let parsed = values
            .into_iter()
            .map(|(name, value)| Ok((name.parse::<ParamId>()?, value)))
            .collect::<Result<Vec<_>>>()?;

        self.current.rcu(|current| {
            let mut next = **current;
            for &(id, value) in &parsed {
                if id != ParamId::Gain {
                    next.set(id, value);
                }
            }
            next
        });
        Ok(())
    }

    /// Apply a built-in preset
    pub fn apply_preset(&self, preset: Preset) {
        let values = preset.values();
        self.current.rcu(|current| {
            let mut next = **current;
            for &(id, value) in &values {
                next.set(id, value);
            }
            next
        });
        debug!("applied preset {}", preset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_within_range() {
        let set = ParameterSet::default();
        for id in ParamId::ALL {
            let (min, max) = id.range();
            let v = set.get(id);
            assert!(v >= min && v <= max, "{} default {} out of range", id, v);
        }
    }

    #[test]
    fn test_set_parameter_clamps() {
        let store = ParameterStore::new();
        assert_eq!(store.set_parameter("reverbMix", 5.0).unwrap(), 1.0);
        assert_eq!(store.get_parameter("reverbMix").unwrap(), 1.0);

        assert_eq!(store.set_parameter("lowpass", -10.0).unwrap(), 200.0);
        assert_eq!(store.get(ParamId::Lowpass), 200.0);

        assert_eq!(store.set_parameter("highpassCutoff", 1e9).unwrap(), 5000.0);
    }

    #[test]
    fn test_nan_write_falls_back_to_default() {
        let store = ParameterStore::new();
        assert_eq!(store.set(ParamId::Pitch, f32::NAN), 1.0);
        assert_eq!(store.set(ParamId::Gain, f32::INFINITY), 100.0);
    }

    #[test]
    fn test_unknown_parameter() {
        let store = ParameterStore::new();
        let err = store.set_parameter("flanger", 0.5).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PARAMETER");
        assert!(store.get_parameter("flanger").is_err());
    }

    #[test]
    fn test_aliases() {
        assert_eq!("lowpassCutoff".parse::<ParamId>().unwrap(), ParamId::Lowpass);
        assert_eq!("volume".parse::<ParamId>().unwrap(), ParamId::Gain);
        assert_eq!("delay_time".parse::<ParamId>().unwrap(), ParamId::DelayTime);
    }

    #[test]
    fn test_apply_preset_parameters_skips_gain() {
        let store = ParameterStore::new();
        store.set(ParamId::Gain, 80.0);
        store
            .apply_preset_parameters([("gain", 10.0), ("lowpass", 3500.0), ("reverbMix", 0.4)])
            .unwrap();

        assert_eq!(store.get(ParamId::Gain), 80.0);
        assert_eq!(store.get(ParamId::Lowpass), 3500.0);
        assert_eq!(store.get(ParamId::ReverbMix), 0.4);
        // Untouched
        assert_eq!(store.get(ParamId::Highpass), 10.0);
    }

    #[test]
    fn test_apply_preset_parameters_is_atomic() {
        let store = ParameterStore::new();
        let result = store.apply_preset_parameters([("lowpass", 3500.0), ("wobble", 1.0)]);
        assert!(result.is_err());
        assert_eq!(store.get(ParamId::Lowpass), 20000.0);
    }

    #[test]
    fn test_apply_preset() {
        let store = ParameterStore::new();
        store.apply_preset(Preset::LoFi);
        let snap = store.snapshot();
        assert_eq!(snap.lowpass_cutoff, 5000.0);
        assert_eq!(snap.highpass_cutoff, 150.0);
        assert_eq!(snap.pitch, 0.9);
        assert_eq!(snap.gain, 50.0);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = ParameterStore::new();
        let before = store.snapshot();
        store.set(ParamId::ReverbMix, 0.7);
        assert_eq!(before.reverb_mix, 0.0);
        assert_eq!(store.snapshot().reverb_mix, 0.7);
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("hall".parse::<Preset>().unwrap(), Preset::Hall);
        assert_eq!("Lo-Fi".parse::<Preset>().unwrap(), Preset::LoFi);
        assert!("cathedral".parse::<Preset>().is_err());
    }

    #[test]
    fn test_gain_mapping() {
        let mut set = ParameterSet::default();
        set.set(ParamId::Gain, 75.0);
        set.set(ParamId::ReverbMix, 0.25);
        assert_eq!(set.master_gain(), 0.75);
        assert_eq!(set.dry_gain(), 0.75);
        assert_eq!(set.wet_gain(), 0.25);
    }

    #[test]
    fn test_parameter_set_json() {
        let json = r#"{"lowpass": 1000, "reverbMix": 3.0}"#;
        let set: ParameterSet = serde_json::from_str(json).unwrap();
        let set = set.clamped();
        assert_eq!(set.lowpass_cutoff, 1000.0);
        assert_eq!(set.reverb_mix, 1.0);
        assert_eq!(set.pitch, 1.0);
    }
}
