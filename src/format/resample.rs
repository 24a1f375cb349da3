//! Sample rate conversion.
//!
//! A windowed-sinc interpolator that keeps its input history between calls.
//! The read position is tracked as an absolute frame index plus a fraction and
//! is advanced with the same arithmetic no matter how the input was split into
//! blocks, so feeding a signal in pieces yields the same output as feeding it
//! in one go.
//!
//! The step (input frames consumed per output frame) is passed to every
//! [`Resampler::read`] call, which lets callers change the playback speed
//! between reads.

use std::f64::consts::PI;

use crate::config::ResamplerConfig;

/// Stateful multi-channel sinc resampler working on interleaved `f64` frames.
///
/// # Example
///
/// ```
/// use pcm_stream::format::Resampler;
/// use pcm_stream::ResamplerConfig;
///
/// let mut resampler = Resampler::new(1, ResamplerConfig::default());
/// let input: Vec<f64> = (0..800).map(|i| (i as f64 * 0.05).sin()).collect();
///
/// let mut output = resampler.resample_block(8000, 16000, 1.0, &input);
/// output.extend(resampler.finish(8000, 16000, 1.0));
/// assert_eq!(output.len(), 1600);
/// ```
#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    config: ResamplerConfig,
    /// Interleaved input frames, the first one at absolute index `history_start`.
    history: Vec<f64>,
    history_start: i64,
    /// Integer part of the read position, as an absolute input frame index.
    position: i64,
    /// Fractional part of the read position, in `[0, 1)`.
    fraction: f64,
    /// Frames past the end of the input read as silence instead of stalling.
    draining: bool,
}

impl Resampler {
    /// Creates a resampler for `channels` interleaved channels.
    pub fn new(channels: usize, config: ResamplerConfig) -> Self {
        Self {
            channels: channels.max(1),
            config,
            history: Vec::new(),
            history_start: 0,
            position: 0,
            fraction: 0.0,
            draining: false,
        }
    }

    /// Input frames consumed per output frame.
    ///
    /// `ratio` speeds playback up (> 1.0) or slows it down (< 1.0) on top of
    /// the rate conversion.
    pub fn step_for(src_rate: u32, dst_rate: u32, ratio: f64) -> f64 {
        f64::from(src_rate) * ratio / f64::from(dst_rate.max(1))
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Filter parameters in use.
    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    fn input_end(&self) -> i64 {
        self.history_start + (self.history.len() / self.channels) as i64
    }

    fn is_passthrough(&self, step: f64) -> bool {
        step == 1.0 && self.fraction == 0.0
    }

    fn cutoff(&self, step: f64) -> f64 {
        (self.config.rolloff * (1.0 / step).min(1.0)).clamp(1e-6, 1.0)
    }

    /// Kernel half-width in input frames for the given step.
    ///
    /// Clamped to [`ResamplerConfig::max_half_width`], which truncates the
    /// kernel at very large downsampling steps.
    pub fn half_width(&self, step: f64) -> usize {
        let max = self.config.max_half_width.max(1);
        let width = (self.config.half_taps as f64 / self.cutoff(step)).ceil();
        if width.is_finite() {
            (width as usize).clamp(1, max)
        } else {
            max
        }
    }

    /// Appends interleaved input frames.
    ///
    /// Writing to a fully drained resampler starts a fresh signal. Writing while
    /// a drain is still in progress cancels the drain.
    pub fn write(&mut self, frames: &[f64]) {
        debug_assert_eq!(frames.len() % self.channels, 0);
        if self.draining {
            if self.is_drained() {
                self.reset();
            } else {
                self.draining = false;
            }
        }
        self.history.extend_from_slice(frames);
    }

    /// Marks the end of the input.
    ///
    /// From now on frames past the end read as silence, so every remaining
    /// output frame can be produced.
    pub fn flush(&mut self) {
        self.draining = true;
    }

    /// Returns `true` if flushed and every output frame has been read.
    pub fn is_drained(&self) -> bool {
        self.draining && self.position >= self.input_end()
    }

    /// Returns `true` if flushed and still producing output.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Drops all history and rewinds to a fresh state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.history_start = 0;
        self.position = 0;
        self.fraction = 0.0;
        self.draining = false;
    }

    /// Input frames at or after the read position.
    pub fn buffered_frames(&self) -> usize {
        (self.input_end() - self.position).max(0) as usize
    }

    /// Output frames that `read` could produce right now at `step`.
    pub fn ready_frames(&self, step: f64) -> usize {
        if !(step.is_finite() && step > 0.0) {
            return 0;
        }
        let end = self.input_end();
        let limit = if self.is_passthrough(step) || self.draining {
            end
        } else {
            end - self.half_width(step) as i64
        };
        let span = limit as f64 - (self.position as f64 + self.fraction);
        if span <= 0.0 {
            0
        } else {
            (span / step).ceil() as usize
        }
    }

    /// Additional input frames needed before `outputs` frames can be read at `step`.
    pub fn frames_needed(&self, step: f64, outputs: usize) -> usize {
        if outputs == 0 || !(step.is_finite() && step > 0.0) {
            return 0;
        }
        let lookahead = if self.is_passthrough(step) {
            0
        } else {
            self.half_width(step) as i64
        };
        let last = self.position as f64 + self.fraction + (outputs - 1) as f64 * step;
        let needed_end = (last.floor() as i64)
            .saturating_add(lookahead)
            .saturating_add(1);
        needed_end.saturating_sub(self.input_end()).max(0) as usize
    }

    #[inline]
    fn sample(&self, frame: i64, channel: usize) -> f64 {
        if frame < self.history_start || frame >= self.input_end() {
            return 0.0;
        }
        self.history[(frame - self.history_start) as usize * self.channels + channel]
    }

    fn advance(&mut self, step: f64) {
        self.fraction += step;
        let whole = self.fraction.floor();
        self.position += whole as i64;
        self.fraction -= whole;
    }

    /// Produces up to `max_frames` output frames at `step`, appending them to `out`.
    ///
    /// Returns the number of frames produced. Stops early when more input
    /// is needed, or when a flushed resampler runs out.
    pub fn read(&mut self, step: f64, max_frames: usize, out: &mut Vec<f64>) -> usize {
        if !(step.is_finite() && step > 0.0) {
            return 0;
        }

        let end = self.input_end();
        let cutoff = self.cutoff(step);
        let half = self.half_width(step) as i64;
        let mut weights = Vec::with_capacity(2 * half as usize);
        let mut produced = 0;

        while produced < max_frames {
            if self.is_passthrough(step) {
                if self.position >= end {
                    break;
                }
                for ch in 0..self.channels {
                    out.push(self.sample(self.position, ch));
                }
            } else {
                let starved = if self.draining {
                    self.position >= end
                } else {
                    self.position + half >= end
                };
                if starved {
                    break;
                }

                let first = self.position - half + 1;
                weights.clear();
                let mut total = 0.0;
                for k in first..=self.position + half {
                    let x = (k - self.position) as f64 - self.fraction;
                    let w = kernel(x, cutoff, half as f64);
                    weights.push(w);
                    total += w;
                }
                let norm = if total.abs() > 1e-12 { 1.0 / total } else { 0.0 };

                for ch in 0..self.channels {
                    let acc: f64 = weights
                        .iter()
                        .zip(first..)
                        .map(|(w, k)| w * self.sample(k, ch))
                        .sum();
                    out.push(acc * norm);
                }
            }

            produced += 1;
            self.advance(step);
        }

        self.trim();
        produced
    }

    /// Discards history that no kernel position can reach anymore.
    fn trim(&mut self) {
        let keep_from = self.position - self.config.max_half_width as i64;
        if keep_from <= self.history_start {
            return;
        }
        let available = self.history.len() / self.channels;
        let drop = ((keep_from - self.history_start) as usize).min(available);
        self.history.drain(..drop * self.channels);
        self.history_start += drop as i64;
    }

    /// Writes a block and returns every output frame that is ready.
    ///
    /// Output lags the input by the filter's lookahead; call
    /// [`finish`](Self::finish) after the last block to collect the tail.
    pub fn resample_block(
        &mut self,
        src_rate: u32,
        dst_rate: u32,
        ratio: f64,
        frames: &[f64],
    ) -> Vec<f64> {
        self.write(frames);
        let mut out = Vec::new();
        self.read(Self::step_for(src_rate, dst_rate, ratio), usize::MAX, &mut out);
        out
    }

    /// Flushes, returns the remaining output and resets for a new signal.
    pub fn finish(&mut self, src_rate: u32, dst_rate: u32, ratio: f64) -> Vec<f64> {
        self.flush();
        let mut out = Vec::new();
        self.read(Self::step_for(src_rate, dst_rate, ratio), usize::MAX, &mut out);
        self.reset();
        out
    }
}

/// Blackman-windowed sinc, zero outside `(-half, half)`.
fn kernel(x: f64, cutoff: f64, half: f64) -> f64 {
    if x.abs() >= half {
        return 0.0;
    }
    let arg = PI * cutoff * x;
    let sinc = if arg.abs() < 1e-12 { 1.0 } else { arg.sin() / arg };
    let u = x / half;
    let window = 0.42 + 0.5 * (PI * u).cos() + 0.08 * (2.0 * PI * u).cos();
    cutoff * sinc * window
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, freq: f64, rate: f64, channels: usize) -> Vec<f64> {
        (0..frames)
            .flat_map(|i| {
                let v = 0.8 * (2.0 * PI * freq * i as f64 / rate).sin();
                std::iter::repeat(v).take(channels)
            })
            .collect()
    }

    fn rms_diff(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
        (sum / a.len().max(1) as f64).sqrt()
    }

    /// Deterministic pseudo-random sizes in `1..=max`.
    fn sizes(seed: u32, max: usize) -> impl FnMut() -> usize {
        let mut state = seed;
        move || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            1 + (state >> 16) as usize % max
        }
    }

    #[test]
    fn test_unity_step_is_exact_passthrough() {
        let input = sine(500, 440.0, 48000.0, 2);
        let mut r = Resampler::new(2, ResamplerConfig::default());
        let mut out = r.resample_block(48000, 48000, 1.0, &input);
        out.extend(r.finish(48000, 48000, 1.0));
        assert_eq!(out, input);
    }

    #[test]
    fn test_upsample_length() {
        let input = sine(4000, 1000.0, 8000.0, 1);
        let mut r = Resampler::new(1, ResamplerConfig::default());
        let mut out = r.resample_block(8000, 16000, 1.0, &input);
        out.extend(r.finish(8000, 16000, 1.0));
        assert_eq!(out.len(), 8000);
    }

    #[test]
    fn test_downsample_length() {
        let input = sine(4800, 440.0, 48000.0, 1);
        let mut r = Resampler::new(1, ResamplerConfig::default());
        let mut out = r.resample_block(48000, 16000, 1.0, &input);
        out.extend(r.finish(48000, 16000, 1.0));
        assert_eq!(out.len(), 1600);
    }

    #[test]
    fn test_dc_is_preserved() {
        let input = vec![0.5; 2000];
        let mut r = Resampler::new(1, ResamplerConfig::default());
        let out = r.resample_block(44100, 48000, 1.0, &input);
        // Away from the zero-padded start the normalized kernel keeps DC exact.
        for &v in &out[100..out.len() - 100] {
            assert!((v - 0.5).abs() < 1e-9, "{v}");
        }
    }

    #[test]
    fn test_output_waits_for_lookahead() {
        let mut r = Resampler::new(1, ResamplerConfig::default());
        let step = Resampler::step_for(8000, 16000, 1.0);
        let half = r.half_width(step);
        r.write(&vec![0.1; half]);
        let mut out = Vec::new();
        assert_eq!(r.read(step, 10, &mut out), 0);
        assert!(r.frames_needed(step, 1) > 0);

        r.write(&[0.1]);
        assert_eq!(r.read(step, 1, &mut out), 1);
    }

    #[test]
    fn test_chunking_equivalence() {
        for (channels, src, dst) in [(1, 8000, 16000), (2, 44100, 48000), (1, 48000, 22050)] {
            let input = sine(3000, 440.0, f64::from(src), channels);

            let mut whole = Resampler::new(channels, ResamplerConfig::default());
            let mut expected = whole.resample_block(src, dst, 1.0, &input);
            expected.extend(whole.finish(src, dst, 1.0));

            let step = Resampler::step_for(src, dst, 1.0);
            let mut split = Resampler::new(channels, ResamplerConfig::default());
            let mut next_write = sizes(7 + channels as u32, 300);
            let mut next_read = sizes(99, 200);
            let mut actual = Vec::new();
            let mut offset = 0;
            while offset < input.len() {
                let frames = next_write().min((input.len() - offset) / channels);
                split.write(&input[offset..offset + frames * channels]);
                offset += frames * channels;
                split.read(step, next_read(), &mut actual);
            }
            split.flush();
            while split.read(step, next_read(), &mut actual) > 0 {}

            assert!(rms_diff(&expected, &actual) < 1e-12, "{channels}ch {src}->{dst}");
        }
    }

    #[test]
    fn test_step_change_between_reads() {
        let input = sine(2000, 220.0, 16000.0, 1);
        let mut r = Resampler::new(1, ResamplerConfig::default());
        r.write(&input);
        let mut out = Vec::new();
        r.read(1.0, 500, &mut out);
        r.read(2.0, 200, &mut out);
        r.read(0.5, 200, &mut out);
        assert_eq!(out.len(), 900);
        assert!(out.iter().all(|v| v.is_finite() && v.abs() < 1.2));
    }

    #[test]
    fn test_history_is_trimmed() {
        let config = ResamplerConfig::default();
        let mut r = Resampler::new(1, config);
        let mut out = Vec::new();
        for _ in 0..100 {
            r.write(&[0.0; 1000]);
            r.read(1.5, usize::MAX, &mut out);
        }
        assert!(r.history.len() <= 1000 + 2 * config.max_half_width);
    }

    #[test]
    fn test_extreme_step_with_tiny_history() {
        let config = ResamplerConfig {
            half_taps: 2,
            rolloff: 0.9,
            max_half_width: 4,
        };
        let mut r = Resampler::new(1, config);
        let mut out = r.resample_block(100, 1, 1.0, &[0.25; 1000]);
        out.extend(r.finish(100, 1, 1.0));
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_write_after_drain_starts_fresh() {
        let mut r = Resampler::new(1, ResamplerConfig::default());
        let first = r.resample_block(8000, 16000, 1.0, &[0.3; 100]);
        let tail = r.finish(8000, 16000, 1.0);
        assert_eq!(first.len() + tail.len(), 200);

        r.flush();
        assert!(r.is_drained());
        r.write(&[0.3; 100]);
        assert!(!r.is_draining());
        assert_eq!(r.buffered_frames(), 100);
    }

    #[test]
    fn test_half_width_is_capped_at_large_steps() {
        let config = ResamplerConfig::default();
        let resampler = Resampler::new(1, config);
        assert_eq!(resampler.half_width(1.0), 17);
        assert_eq!(resampler.half_width(600.0), config.max_half_width);

        let full = (config.half_taps as f64 * 600.0 / config.rolloff).ceil() as usize;
        let wide = Resampler::new(
            1,
            ResamplerConfig {
                max_half_width: 16384,
                ..config
            },
        );
        assert_eq!(wide.half_width(600.0), full);
    }
}
