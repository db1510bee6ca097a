//! Audio file I/O for Aurora
//!
//! Encodes rendered buffers as canonical 16-bit PCM WAV (44-byte header,
//! interleaved little-endian samples) and decodes captured recordings back
//! into planar float buffers. Encoding is deterministic: the same buffer always
//! yields the same bytes.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use hound::{SampleFormat, WavReader};
use sha2::{Digest, Sha256};

use crate::engine::buffer::AudioBuffer;
use crate::error::{AuroraError, Result};

/// MIME type of every exported file
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Size of the RIFF/fmt/data header on every exported file
pub const WAV_HEADER_LEN: usize = 44;

const WAVE_FORMAT_PCM: u16 = 1;

/// Bit depth of exported audio
pub const EXPORT_BIT_DEPTH: u16 = 16;

const WAV_MIME_ALIASES: [&str; 4] = ["audio/wav", "audio/x-wav", "audio/wave", "audio/vnd.wave"];

/// Convert a float sample to 16-bit PCM: clamp, scale by 32767, round
#[inline]
pub fn float_to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Encode a buffer as 16-bit PCM WAV bytes
///
/// Any channel count is written with the plain PCM format tag, so the header
/// is always [`WAV_HEADER_LEN`] bytes and block align is `channels * 2`.
///
/// # Errors
/// * `EmptyAudio` - If the buffer has no channels
/// * `UnsupportedFormat` - If the channel count or data size overflows the
///   RIFF header fields
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let channels = buffer.num_channels();
    if channels == 0 {
        return Err(AuroraError::EmptyAudio);
    }

    let bytes_per_sample = (EXPORT_BIT_DEPTH / 8) as usize;
    let block_align = channels * bytes_per_sample;
    let data_len = buffer.num_samples() * block_align;

    let channel_field = u16::try_from(channels).map_err(|_| AuroraError::UnsupportedFormat {
        format: format!("{}-channel audio", channels),
    })?;
    let block_align_field = u16::try_from(block_align).map_err(|_| AuroraError::UnsupportedFormat {
        format: format!("{}-channel audio", channels),
    })?;
    let data_len_field = u32::try_from(data_len)
        .ok()
        .filter(|len| len.checked_add((WAV_HEADER_LEN - 8) as u32).is_some())
        .ok_or_else(|| AuroraError::UnsupportedFormat {
            format: format!("{} bytes of PCM data (RIFF limit is 4 GiB)", data_len),
        })?;
    let byte_rate = buffer.sample_rate as u64 * block_align as u64;
    let byte_rate_field = u32::try_from(byte_rate).map_err(|_| AuroraError::UnsupportedFormat {
        format: format!("byte rate {} at {} Hz", byte_rate, buffer.sample_rate),
    })?;

    let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + data_len);

    // RIFF chunk
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(data_len_field + (WAV_HEADER_LEN - 8) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    // fmt chunk
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    bytes.extend_from_slice(&channel_field.to_le_bytes());
    bytes.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate_field.to_le_bytes());
    bytes.extend_from_slice(&block_align_field.to_le_bytes());
    bytes.extend_from_slice(&EXPORT_BIT_DEPTH.to_le_bytes());

    // data chunk
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len_field.to_le_bytes());
    for sample in buffer.to_interleaved() {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }

    debug_assert_eq!(bytes.len(), WAV_HEADER_LEN + data_len);
    Ok(bytes)
}

/// Encode a buffer and write it to `path`
pub fn write_wav_file(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let bytes = encode_wav(buffer)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read and decode a WAV file
pub fn read_wav_file(path: &Path) -> Result<AudioBuffer> {
    let blob = EncodedAudio::from_file(path)?;
    WavDecoder.decode(&blob)
}

// ============================================================================
// Decoding
// ============================================================================

/// Encoded audio as handed over by a capture device or file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedAudio {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Load a file, guessing the MIME type from its extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("wav") | Some("wave") => WAV_MIME_TYPE,
            _ => "application/octet-stream",
        };
        Ok(Self::new(bytes, mime_type))
    }
}

/// Turns encoded audio into a sample buffer
pub trait Decoder: Send + Sync {
    fn decode(&self, blob: &EncodedAudio) -> Result<AudioBuffer>;
}

/// WAV decoder for 8/16/24/32-bit integer and 32-bit float PCM
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    fn accepts(mime_type: &str) -> bool {
        let base = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        base.is_empty()
            || base == "application/octet-stream"
            || WAV_MIME_ALIASES.contains(&base.as_str())
    }
}

impl Decoder for WavDecoder {
    fn decode(&self, blob: &EncodedAudio) -> Result<AudioBuffer> {
        if !Self::accepts(&blob.mime_type) {
            return Err(AuroraError::UnsupportedFormat {
                format: blob.mime_type.clone(),
            });
        }

        let reader = WavReader::new(Cursor::new(blob.bytes.as_slice()))
            .map_err(|e| AuroraError::decode("not a readable WAV stream", e))?;

        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(AuroraError::Decode {
                reason: "WAV declares zero channels".to_string(),
                source: None,
            });
        }

        let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        AudioBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| AuroraError::decode("failed to read float samples", e)),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(AuroraError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };
            if bits_per_sample == 8 {
                // hound maps unsigned 8-bit storage onto i8
                reader
                    .samples::<i8>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|e| AuroraError::decode("failed to read 8-bit samples", e))
            } else if bits_per_sample == 16 {
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|e| AuroraError::decode("failed to read 16-bit samples", e))
            } else {
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v as f64 / scale as f64) as f32))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|e| {
                        AuroraError::decode(format!("failed to read {}-bit samples", bits_per_sample), e)
                    })
            }
        }
    }
}

// ============================================================================
// Export blobs
// ============================================================================

/// File name `<prefix>YYYY-MM-DD_HH-MM-SS.wav`
pub fn timestamped_file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}{}.wav", prefix, at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Encoded WAV ready to hand to a download or upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavBlob {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl WavBlob {
    /// Encode `buffer` under a timestamped name
    pub fn encode(buffer: &AudioBuffer, prefix: &str) -> Result<Self> {
        Ok(Self {
            bytes: encode_wav(buffer)?,
            file_name: timestamped_file_name(prefix, Local::now()),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the bytes, for upload integrity checks
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }

    /// Write into `dir` under the blob's file name
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================
