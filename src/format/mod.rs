//! Audio format handling.
//!
//! This module provides the building blocks the stream pipeline is made of:
//! - Sample formats and specs
//! - Sample encoding conversion and channel up/down-mixing
//! - Channel maps (reorder/mute)
//! - Sample rate conversion (windowed sinc)
//! - Mixing buffers with volume

mod channel_map;
mod convert;
mod mix;
mod resample;
mod sample;
mod spec;

pub use channel_map::ChannelMap;
pub use convert::{convert_block, convert_channels, decode_samples, encode_samples};
pub use mix::mix_audio;
pub use resample::Resampler;
pub use sample::SampleFormat;
pub use spec::AudioSpec;
