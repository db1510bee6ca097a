//! CLI Module
//!
//! Command-line interface for rendering, exporting and auditioning
//! recordings through the Aurora effects chain.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::engine::LengthPolicy;

/// Aurora Audio Studio - effects rendering and WAV export
#[derive(Parser, Debug)]
#[command(name = "aurora")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Parameter overrides shared by the processing commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Apply a preset before any --set overrides
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Set a parameter, e.g. --set reverbMix=0.4 (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, f32)>,

    /// Seed for the reverb impulse noise
    #[arg(long)]
    pub seed: Option<u64>,

    /// How long processed output runs when pitch is not 1
    #[arg(long, value_enum)]
    pub length_policy: Option<LengthArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthArg {
    /// Exactly the recording's duration
    SourceDuration,
    /// Recording duration divided by pitch
    PitchAdjusted,
}

impl From<LengthArg> for LengthPolicy {
    fn from(arg: LengthArg) -> Self {
        match arg {
            LengthArg::SourceDuration => LengthPolicy::SourceDuration,
            LengthArg::PitchAdjusted => LengthPolicy::PitchAdjusted,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a recording through the effects chain and export it as WAV
    #[command(name = "render")]
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Output file (default: timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Re-encode a recording unprocessed as 16-bit WAV
    #[command(name = "export-raw")]
    ExportRaw {
        /// Input WAV file
        input: PathBuf,

        /// Output file (default: timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the effect parameters
    #[command(name = "params")]
    Params {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the built-in presets
    #[command(name = "presets")]
    Presets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a reverb impulse response as WAV
    #[command(name = "impulse")]
    Impulse {
        /// Output file
        #[arg(short, long, default_value = "impulse.wav")]
        output: PathBuf,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,

        /// Channel count (1 or 2)
        #[arg(long, default_value_t = 2)]
        channels: usize,

        /// Length in seconds
        #[arg(long, default_value_t = crate::dsp::REVERB_IMPULSE_SECS)]
        seconds: f32,

        /// Envelope decay exponent
        #[arg(long, default_value_t = crate::dsp::REVERB_IMPULSE_DECAY)]
        decay: f32,

        /// Seed for the noise
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Play a recording on the default output device
    #[command(name = "play")]
    Play {
        /// Input WAV file
        input: PathBuf,

        /// Skip the effects chain
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        params: ParamArgs,
    },
}

/// Parse `name=value`
fn parse_assignment(s: &str) -> std::result::Result<(String, f32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
    Ok((name.trim().to_string(), value))
}
