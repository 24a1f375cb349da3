//! Configuration types for audio streams.

use crate::format::{AudioSpec, SampleFormat};

/// Preset audio specs for common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreset {
    /// 16kHz mono S16, the usual input format of speech-to-text services.
    #[default]
    Transcription,

    /// 44.1kHz stereo S16.
    Cd,

    /// 48kHz stereo F32, the typical mixing format of desktop audio servers.
    Studio,
}

impl FormatPreset {
    /// Returns the spec for this preset.
    #[must_use]
    pub fn spec(&self) -> AudioSpec {
        match self {
            Self::Transcription => AudioSpec::new(SampleFormat::S16, 1, 16000),
            Self::Cd => AudioSpec::new(SampleFormat::S16, 2, 44100),
            Self::Studio => AudioSpec::new(SampleFormat::F32, 2, 48000),
        }
    }

    /// Returns the sample rate for this preset.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.spec().frequency
    }

    /// Returns the channel count for this preset.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.spec().channels
    }
}

impl From<FormatPreset> for AudioSpec {
    fn from(preset: FormatPreset) -> Self {
        preset.spec()
    }
}

/// Quality presets for the sinc resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleQuality {
    /// Short filter: cheapest, wider transition band.
    Fast,
    /// Default trade-off.
    #[default]
    Balanced,
    /// Long filter with a steep transition band.
    High,
}

/// Parameters of the windowed-sinc interpolation filter.
///
/// Use [`ResamplerConfig::default()`] or [`ResamplerConfig::from_quality()`]
/// unless you need to tune the filter.
///
/// # Example
///
/// ```
/// use pcm_stream::{ResampleQuality, ResamplerConfig};
///
/// let config = ResamplerConfig {
///     half_taps: 24,
///     ..ResamplerConfig::from_quality(ResampleQuality::High)
/// };
/// assert_eq!(config.half_taps, 24);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResamplerConfig {
    /// Zero crossings of the sinc kernel on each side of the interpolation point.
    ///
    /// When downsampling the kernel is stretched by the rate ratio, so the
    /// number of input frames involved grows accordingly.
    /// Default: 16
    pub half_taps: usize,

    /// Cutoff as a fraction of the lower of the two Nyquist frequencies.
    ///
    /// Default: 0.945
    pub rolloff: f64,

    /// Upper bound on the kernel half-width in input frames.
    ///
    /// Caps the cost of extreme downsampling ratios. Also sets how much input
    /// history is kept.
    ///
    /// The full kernel needs `half_taps / cutoff` frames, which grows with the
    /// downsampling step. Past `max_half_width` the kernel is truncated and
    /// no longer band-limits, so content above the output Nyquist frequency
    /// aliases. With the defaults this starts at a step of about 15, e.g.
    /// 48kHz to 8kHz with a frequency ratio above 2.5. Raise it if such
    /// ratios matter more than the per-frame cost, which grows linearly.
    /// Default: 256
    pub max_half_width: usize,
}

impl ResamplerConfig {
    /// Returns the filter parameters for a quality preset.
    #[must_use]
    pub fn from_quality(quality: ResampleQuality) -> Self {
        match quality {
            ResampleQuality::Fast => Self {
                half_taps: 8,
                rolloff: 0.9,
                max_half_width: 128,
            },
            ResampleQuality::Balanced => Self {
                half_taps: 16,
                rolloff: 0.945,
                max_half_width: 256,
            },
            ResampleQuality::High => Self {
                half_taps: 32,
                rolloff: 0.96,
                max_half_width: 512,
            },
        }
    }
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self::from_quality(ResampleQuality::Balanced)
    }
}

/// Configuration for stream behavior.
///
/// Use [`StreamConfig::default()`] for sensible defaults, or customize as needed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StreamConfig {
    /// Resampling filter used when source and destination rates differ or a
    /// frequency ratio other than 1.0 is set.
    pub resampler: ResamplerConfig,
}

impl StreamConfig {
    /// Builds a config with the given resampler quality.
    #[must_use]
    pub fn with_quality(quality: ResampleQuality) -> Self {
        Self {
            resampler: ResamplerConfig::from_quality(quality),
        }
    }
}
