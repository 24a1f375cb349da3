//! Audio specification: sample format, channel count and frequency.

use std::fmt;

use crate::format::SampleFormat;
use crate::StreamError;

/// Describes the layout of interleaved PCM data.
///
/// # Example
///
/// ```
/// use pcm_stream::{AudioSpec, SampleFormat};
///
/// let spec = AudioSpec::new(SampleFormat::S16LE, 2, 48000);
/// assert_eq!(spec.frame_size(), 4);
/// assert!(spec.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioSpec {
    /// Encoding of each sample.
    pub format: SampleFormat,
    /// Number of interleaved channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample frames per second, in Hz.
    pub frequency: u32,
}

impl AudioSpec {
    /// Creates a new spec. Use [`validate`](Self::validate) before relying on it.
    pub const fn new(format: SampleFormat, channels: u16, frequency: u32) -> Self {
        Self {
            format,
            channels,
            frequency,
        }
    }

    /// Checks that channel count and frequency are non-zero.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channels == 0 {
            return Err(StreamError::format(format!(
                "channel count must be positive ({self})"
            )));
        }
        if self.frequency == 0 {
            return Err(StreamError::format(format!(
                "frequency must be positive ({self})"
            )));
        }
        Ok(())
    }

    /// Size in bytes of one frame (one sample per channel).
    #[inline]
    pub const fn frame_size(&self) -> usize {
        self.format.byte_size() * self.channels as usize
    }

    /// Number of channels as `usize`.
    #[inline]
    pub const fn channel_count(&self) -> usize {
        self.channels as usize
    }

    /// Checks that `len` bytes hold a whole number of frames.
    pub fn check_frame_aligned(&self, len: usize) -> Result<(), StreamError> {
        let frame = self.frame_size();
        if frame == 0 || len % frame != 0 {
            return Err(StreamError::format(format!(
                "length {len} is not a multiple of frame size {frame} ({self})"
            )));
        }
        Ok(())
    }

    /// Returns `true` if data in `other` can share a resampler with data in `self`.
    ///
    /// Only the channel count and frequency matter once samples are decoded.
    #[inline]
    pub(crate) fn same_layout(&self, other: &Self) -> bool {
        self.channels == other.channels && self.frequency == other.frequency
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}ch {}Hz",
            self.format, self.channels, self.frequency
        )
    }
}
