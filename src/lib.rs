//! # pcm-stream
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Buffered PCM conversion streams.
//!
//! An [`AudioStream`] sits between code that produces audio in one format and
//! code (or a device thread) that consumes it in another. Producers push bytes
//! in the source format; consumers pull bytes in the destination format. In
//! between, the stream reorders channels, resamples (with an optional
//! playback-speed ratio), converts the channel count, applies gain and
//! re-encodes the samples.
//!
//! ## Quick Start
//!
//! ```rust
//! use pcm_stream::{AudioSpec, AudioStream, FormatPreset, SampleFormat};
//!
//! // 8kHz mono telephony audio in, 16kHz mono for a speech-to-text service out
//! let src = AudioSpec::new(SampleFormat::S16LE, 1, 8000);
//! let stream = AudioStream::new(Some(src), Some(FormatPreset::Transcription.spec()))?;
//!
//! stream.push(&vec![0u8; 1600])?;   // 100ms
//! stream.flush()?;                  // no more input; release the resampler tail
//!
//! let pulled = stream.pull(usize::MAX)?;
//! assert_eq!(pulled.bytes.len(), 3200);
//! # Ok::<(), pcm_stream::StreamError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Ring Buffer**: pushed data is queued unconverted, tagged with the spec
//!   and input channel map it was pushed with
//! - **Pipeline**: on pull, the queue is drained in spans of one layout and
//!   run through the conversion chain
//! - **Resampler**: windowed sinc, stateful across calls, so splitting the
//!   input differently never changes the output
//!
//! Every stream operation takes a re-entrant lock. Get/put callbacks run
//! under that lock and may push or pull on the same stream.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod chunk;
mod config;
mod device;
mod error;
mod event;
pub mod format;
mod pipeline;
pub mod source;
mod stream;

pub use config::{FormatPreset, ResampleQuality, ResamplerConfig, StreamConfig};
pub use device::{AudioDevice, DeviceId, DeviceKind};
pub use error::{clear_error, last_error, StreamError};
pub use event::{callback_with_context, data_complete, stream_callback, DataComplete, StreamCallback};
pub use format::{mix_audio, AudioSpec, ChannelMap, SampleFormat};
pub use source::MockSource;
pub use stream::{
    bind_streams, convert_samples, unbind_streams, AudioStream, Pulled, StreamLock, StreamStats,
};

/// Largest value reported by [`AudioStream::queued`] and [`AudioStream::available`].
pub const QUEUED_BYTES_LIMIT: usize = pipeline::QUEUED_BYTES_LIMIT;
