//! Audio Engine Module
//!
//! Everything around the effects graph:
//! - Audio buffer management
//! - WAV encoding and decoding
//! - Offline rendering for export
//! - Live playback on output devices
//! - The studio session tying them together

pub mod buffer;
pub mod device;
pub mod io;
pub mod live;
pub mod offline;
pub mod session;

pub use buffer::AudioBuffer;
#[cfg(feature = "cpal")]
pub use device::CpalDevice;
pub use device::{CaptureDevice, FrameSource, OutputDevice, SharedSource};
pub use io::{
    encode_wav, read_wav_file, write_wav_file, Decoder, EncodedAudio, WavBlob, WavDecoder,
    WAV_HEADER_LEN, WAV_MIME_TYPE,
};
pub use live::{LivePlaybackEngine, PlaybackHandle, PlaybackOutcome};
pub use offline::{output_frames, LengthPolicy, OfflineRenderer};
pub use session::Studio;
