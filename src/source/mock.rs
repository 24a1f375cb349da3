//! Mock audio source for testing without hardware.

use std::f64::consts::PI;
use std::time::Duration;

use crate::config::FormatPreset;
use crate::format::{encode_samples, AudioSpec};
use crate::{AudioStream, StreamError};

/// A mock audio source that generates synthetic PCM for testing.
///
/// Samples are encoded in whatever [`AudioSpec`] the source was created with,
/// so the same generator can feed streams of any source format. Successive
/// sine calls continue the waveform without a phase jump.
///
/// # Example
///
/// ```
/// use pcm_stream::source::MockSource;
/// use pcm_stream::{AudioSpec, SampleFormat};
///
/// let mut mock = MockSource::new(AudioSpec::new(SampleFormat::S16LE, 1, 16000));
///
/// // Generate 100ms of silence
/// mock.generate_silence(100);
///
/// // Generate 100ms of a 440Hz sine wave
/// mock.generate_sine(440.0, 100);
///
/// // Get the generated bytes
/// let bytes = mock.take_bytes();
/// assert_eq!(bytes.len(), 2 * 3200);
/// ```
pub struct MockSource {
    spec: AudioSpec,
    bytes: Vec<u8>,
    /// Frames generated so far, used as the time base of the waveforms.
    clock: u64,
    noise_seed: u32,
}

impl MockSource {
    /// Creates a new mock source with the given format.
    pub fn new(spec: AudioSpec) -> Self {
        Self {
            spec,
            bytes: Vec::new(),
            clock: 0,
            noise_seed: 12345,
        }
    }

    /// Creates a mock source configured for transcription (16kHz mono S16).
    pub fn transcription() -> Self {
        Self::new(FormatPreset::Transcription.spec())
    }

    /// Returns the spec of the generated data.
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Generates silence for the given duration in milliseconds.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let frames = self.frames_for_duration(duration_ms);
        let silence = self.spec.format.silence_sample();
        for _ in 0..frames * self.spec.channel_count() {
            self.bytes.extend_from_slice(&silence);
        }
        self.clock += frames as u64;
    }

    /// Generates a sine wave at the given frequency for the given duration.
    ///
    /// The same value goes to every channel. Peak amplitude is 0.8 of full scale.
    pub fn generate_sine(&mut self, frequency: f64, duration_ms: u64) {
        let frames = self.frames_for_duration(duration_ms);
        let rate = f64::from(self.spec.frequency);
        let start = self.clock;
        self.extend_frames(frames, |i| {
            let t = (start + i) as f64 / rate;
            0.8 * (2.0 * PI * frequency * t).sin()
        });
    }

    /// Generates deterministic white noise for the given duration.
    pub fn generate_noise(&mut self, duration_ms: u64, amplitude: f64) {
        let frames = self.frames_for_duration(duration_ms);
        let channels = self.spec.channel_count();
        let mut samples = Vec::with_capacity(frames * channels);

        // Simple LCG for deterministic "random" noise
        for _ in 0..frames * channels {
            self.noise_seed = self
                .noise_seed
                .wrapping_mul(1_103_515_245)
                .wrapping_add(12345);
            let random = f64::from((self.noise_seed >> 16) as u16) / 32768.0 - 1.0;
            samples.push(random * amplitude);
        }
        encode_samples(self.spec.format, &samples, &mut self.bytes);
        self.clock += frames as u64;
    }

    /// Adds raw bytes directly. They must be in the source's format.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.clock += (bytes.len() / self.spec.frame_size()) as u64;
    }

    /// Takes all accumulated bytes, clearing the internal buffer.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Returns a reference to the accumulated bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the duration of accumulated audio.
    pub fn duration(&self) -> Duration {
        let frames = self.bytes.len() / self.spec.frame_size();
        Duration::from_secs_f64(frames as f64 / f64::from(self.spec.frequency))
    }

    /// Pushes the accumulated bytes into `stream` in pieces of at most
    /// `chunk_frames` frames. Returns the number of bytes pushed.
    ///
    /// This is useful for testing the stream with mock data.
    pub fn push_into(&mut self, stream: &AudioStream, chunk_frames: usize) -> Result<usize, StreamError> {
        let bytes = self.take_bytes();
        let chunk = chunk_frames.max(1) * self.spec.frame_size();
        for piece in bytes.chunks(chunk) {
            stream.push(piece)?;
        }
        Ok(bytes.len())
    }

    fn extend_frames(&mut self, frames: usize, mut value: impl FnMut(u64) -> f64) {
        let channels = self.spec.channel_count();
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames as u64 {
            let v = value(i);
            samples.extend(std::iter::repeat(v).take(channels));
        }
        encode_samples(self.spec.format, &samples, &mut self.bytes);
        self.clock += frames as u64;
    }

    fn frames_for_duration(&self, duration_ms: u64) -> usize {
        (u64::from(self.spec.frequency) * duration_ms / 1000) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{decode_samples, SampleFormat};

    #[test]
    fn test_mock_source_silence() {
        let mut mock = MockSource::new(AudioSpec::new(SampleFormat::U8, 1, 16000));
        mock.generate_silence(100);

        let bytes = mock.take_bytes();
        assert_eq!(bytes.len(), 1600); // 16000 * 0.1 = 1600
        assert!(bytes.iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_mock_source_sine() {
        let mut mock = MockSource::transcription();
        mock.generate_sine(440.0, 100);

        let mut samples = Vec::new();
        decode_samples(SampleFormat::S16, mock.bytes(), &mut samples);
        assert_eq!(samples.len(), 1600);

        // Sine wave should have positive and negative values
        assert!(samples.iter().any(|&s| s > 0.5));
        assert!(samples.iter().any(|&s| s < -0.5));
        assert!(samples.iter().all(|&s| s.abs() <= 0.81));
    }

    #[test]
    fn test_sine_is_phase_continuous() {
        let spec = AudioSpec::new(SampleFormat::F32LE, 1, 8000);
        let mut split = MockSource::new(spec);
        split.generate_sine(1000.0, 50);
        split.generate_sine(1000.0, 50);

        let mut whole = MockSource::new(spec);
        whole.generate_sine(1000.0, 100);
        assert_eq!(split.bytes(), whole.bytes());
    }

    #[test]
    fn test_mock_source_stereo() {
        let mut mock = MockSource::new(FormatPreset::Studio.spec());
        mock.generate_silence(100);

        // 48000 * 0.1 frames * 2 channels * 4 bytes
        assert_eq!(mock.bytes().len(), 38400);
    }

    #[test]
    fn test_mock_source_noise_is_deterministic() {
        let mut a = MockSource::transcription();
        let mut b = MockSource::transcription();
        a.generate_noise(20, 0.5);
        b.generate_noise(20, 0.5);
        assert_eq!(a.bytes(), b.bytes());
        assert!(a.bytes().iter().any(|&x| x != 0));
    }

    #[test]
    fn test_mock_source_duration() {
        let mut mock = MockSource::transcription();
        mock.generate_silence(500);

        assert_eq!(mock.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_push_into_stream() {
        let spec = MockSource::transcription().spec();
        let stream = AudioStream::new(Some(spec), Some(spec)).unwrap();

        let mut mock = MockSource::transcription();
        mock.add_bytes(&[1, 0, 2, 0, 3, 0, 4, 0, 5, 0]);
        assert_eq!(mock.push_into(&stream, 2).unwrap(), 10);
        assert!(mock.bytes().is_empty());

        let pulled = stream.pull(usize::MAX).unwrap();
        assert_eq!(pulled.bytes, vec![1, 0, 2, 0, 3, 0, 4, 0, 5, 0]);
    }
}
