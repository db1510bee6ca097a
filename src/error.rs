//! Error handling for Aurora
//!
//! Every error carries an error code and recovery suggestions so callers can
//! surface a user-facing message without inspecting variants themselves.

use thiserror::Error;

/// Result type alias for Aurora operations
pub type Result<T> = std::result::Result<T, AuroraError>;

/// Main error type for Aurora operations
#[derive(Error, Debug)]
pub enum AuroraError {
    // Source Errors
    #[error("Could not decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("No recording available")]
    MissingSource,

    // Graph / Rendering Errors
    #[error("Invalid graph configuration: {reason}")]
    InvalidGraph { reason: String },

    #[error("Audio output unavailable: {reason}")]
    Device { reason: String },

    #[error("Render failed at stage '{stage}': {reason}")]
    Render { stage: String, reason: String },

    // Parameter / Configuration Errors
    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Unknown preset: {name}")]
    UnknownPreset { name: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuroraError {
    /// Build a decode error from any underlying codec error
    pub fn decode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AuroraError::Decode {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build a render failure for the named stage
    pub fn render(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        AuroraError::Render {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AuroraError::Decode { .. } => "DECODE_ERROR",
            AuroraError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            AuroraError::EmptyAudio => "EMPTY_AUDIO",
            AuroraError::MissingSource => "MISSING_SOURCE",
            AuroraError::InvalidGraph { .. } => "INVALID_GRAPH",
            AuroraError::Device { .. } => "DEVICE_ERROR",
            AuroraError::Render { .. } => "RENDER_FAILURE",
            AuroraError::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            AuroraError::UnknownPreset { .. } => "UNKNOWN_PRESET",
            AuroraError::Config { .. } => "CONFIG_ERROR",
            AuroraError::Io(_) => "IO_ERROR",
            AuroraError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable by retrying with new input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuroraError::Decode { .. }
                | AuroraError::UnsupportedFormat { .. }
                | AuroraError::EmptyAudio
                | AuroraError::MissingSource
                | AuroraError::Device { .. }
                | AuroraError::Render { .. }
                | AuroraError::UnknownParameter { .. }
                | AuroraError::UnknownPreset { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AuroraError::Decode { .. } => vec![
                "Record the take again",
                "Check that the file is a valid WAV file",
            ],
            AuroraError::UnsupportedFormat { .. } => vec![
                "Convert the audio to a PCM or float WAV file",
                "Split very long recordings into shorter takes",
            ],
            AuroraError::EmptyAudio | AuroraError::MissingSource => {
                vec!["Record something first, then try again"]
            }
            AuroraError::Device { .. } => vec![
                "Check that an audio output device is connected",
                "Close other applications holding the device exclusively",
                "Export to a file instead of playing live",
            ],
            AuroraError::Render { .. } => vec![
                "The effect settings may be too extreme",
                "Try the 'clean' preset and export again",
            ],
            AuroraError::UnknownParameter { .. } => vec![
                "Valid parameters: gain, pitch, lowpass, highpass, delayTime, reverbMix",
            ],
            AuroraError::UnknownPreset { .. } => {
                vec!["Valid presets: clean, phone, hall, lofi"]
            }
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            AuroraError::Decode { reason, .. } => {
                format!("The recording could not be read ({}). Please record again.", reason)
            }
            AuroraError::MissingSource | AuroraError::EmptyAudio => {
                "There is no recording yet. Record something first.".to_string()
            }
            AuroraError::Device { reason } => {
                format!("Live playback is unavailable: {}. Exporting still works.", reason)
            }
            AuroraError::Render { stage, .. } => {
                format!("Error while exporting the file (the '{}' stage failed).", stage)
            }
            _ => self.to_string(),
        }
    }
}
