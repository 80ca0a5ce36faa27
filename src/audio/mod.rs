//! Audio subsystem: speech decoding, one shared speaker, press-and-hold
//! microphone recording.
//!
//! # Playback
//!
//! ```text
//! base64 PCM16 → decode_speech → AudioBuffer → PlaybackEngine::play
//!                                              → OutputContext (cpal thread)
//! ```
//!
//! # Recording
//!
//! ```text
//! RecordingController::begin → Microphone::open → AudioChunk …
//! RecordingController::end   → stereo_to_mono → resample → Utterance → WAV
//! ```

pub mod capture;
pub mod codec;
pub mod output;
pub mod playback;
pub mod recorder;
pub mod resample;
pub mod wav;

pub use capture::{AudioChunk, CpalMicrophone, Microphone, MicrophoneError, MicrophoneStream};
pub use codec::{
    decode_base64, decode_pcm16, decode_speech, encode_base64, encode_pcm16, quantize, AudioBuffer,
    CodecError,
};
pub use output::{CpalOutput, OutputContext, OutputDevice};
pub use playback::{PlaybackEngine, PlaybackError, PlaybackTicket};
pub use recorder::{RecordError, RecordingController};
pub use resample::{mono_to_interleaved, resample, stereo_to_mono};
pub use wav::{Utterance, WAV_MIME};
