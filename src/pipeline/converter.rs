//! Conversion pipeline between the pushed and the pulled format.
//!
//! Queued data is drained in spans of one layout (channel count and
//! frequency). Each span feeds a resampler; the resampler's output then runs
//! through the rest of the chain:
//!
//! ```text
//! input map → decode → resample → channel count → gain → encode → output map
//! ```
//!
//! When the layout of the queued data changes, the resampler of the old span
//! is drained before the new span starts, so no audio is lost at the seam.

use crate::chunk::Completion;
use crate::config::ResamplerConfig;
use crate::event::DataComplete;
use crate::format::{
    convert_channels, decode_samples, encode_samples, AudioSpec, ChannelMap, Resampler,
};
use crate::pipeline::ring_buffer::{RingBuffer, QUEUED_BYTES_LIMIT};

/// Output parameters of a single pull.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PullRequest<'a> {
    pub dst: AudioSpec,
    pub ratio: f64,
    pub gain: f32,
    pub output_map: Option<&'a ChannelMap>,
    pub max_frames: usize,
}

/// Converted bytes and the source bytes they were made from.
#[derive(Debug, Default)]
pub(crate) struct PullOutput {
    pub bytes: Vec<u8>,
    pub consumed: usize,
}

/// The span currently being resampled.
#[derive(Debug)]
struct ActiveSpan {
    spec: AudioSpec,
    resampler: Resampler,
}

impl ActiveSpan {
    fn step(&self, dst: &AudioSpec, ratio: f64) -> f64 {
        Resampler::step_for(self.spec.frequency, dst.frequency, ratio)
    }
}

/// Queue plus conversion state of one stream.
#[derive(Debug)]
pub(crate) struct Pipeline {
    queue: RingBuffer,
    active: Option<ActiveSpan>,
    config: ResamplerConfig,
    decoded: Vec<f64>,
    resampled: Vec<f64>,
}

impl Pipeline {
    pub(crate) fn new(config: ResamplerConfig) -> Self {
        Self {
            queue: RingBuffer::new(),
            active: None,
            config,
            decoded: Vec::new(),
            resampled: Vec::new(),
        }
    }

    /// Queues source bytes tagged with their spec and input map.
    pub(crate) fn push(&mut self, bytes: &[u8], spec: AudioSpec, map: Option<ChannelMap>) {
        self.queue.enqueue(bytes, spec, map);
    }

    /// Queues a caller-owned buffer without copying it.
    pub(crate) fn push_owned(
        &mut self,
        bytes: Vec<u8>,
        spec: AudioSpec,
        map: Option<ChannelMap>,
        on_complete: Option<DataComplete>,
    ) {
        self.queue.enqueue_owned(bytes, spec, map, on_complete);
    }

    /// Completions of owned buffers that are no longer needed.
    ///
    /// The caller runs them once it no longer borrows the pipeline.
    pub(crate) fn take_completed(&mut self) -> Vec<Completion> {
        self.queue.take_completed()
    }

    /// Queued source bytes, saturating.
    pub(crate) fn queued(&self) -> usize {
        self.queue.bytes_queued()
    }

    /// Spec of the oldest queued byte.
    pub(crate) fn queued_spec(&self) -> Option<AudioSpec> {
        self.queue.peek_format().map(|(spec, _)| *spec)
    }

    /// Marks the end of the queued data.
    ///
    /// Once the pipeline reaches that point the resampler drains, so every
    /// frame pushed so far can be pulled.
    pub(crate) fn flush(&mut self) {
        if self.queue.mark_flush() {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            if active.resampler.buffered_frames() > 0 {
                tracing::debug!(
                    frames = active.resampler.buffered_frames(),
                    "draining partially filled resampler"
                );
            }
            active.resampler.flush();
        }
    }

    /// Drops queued data and resampler history.
    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.active = None;
    }

    /// Estimated output frames that can be pulled without more input.
    pub(crate) fn available_frames(&self, dst: &AudioSpec, ratio: f64) -> usize {
        let mut frames = self
            .active
            .as_ref()
            .map_or(0.0, |a| a.resampler.ready_frames(a.step(dst, ratio)) as f64);
        for chunk in self.queue.chunks() {
            let step = Resampler::step_for(chunk.spec().frequency, dst.frequency, ratio);
            frames += chunk.remaining_frames() as f64 / step;
        }
        frames.floor().min(QUEUED_BYTES_LIMIT as f64) as usize
    }

    /// Estimated output bytes that can be pulled without more input, saturating.
    pub(crate) fn available_bytes(&self, dst: &AudioSpec, ratio: f64) -> usize {
        self.available_frames(dst, ratio)
            .saturating_mul(dst.frame_size())
            .min(QUEUED_BYTES_LIMIT)
    }

    /// Estimates the source bytes needed to produce `out_frames` output frames.
    ///
    /// Returns `(additional, total)`: what must still be pushed on top of the
    /// queue, and what the whole request corresponds to.
    pub(crate) fn source_bytes_needed(
        &self,
        src: &AudioSpec,
        dst: &AudioSpec,
        ratio: f64,
        out_frames: usize,
    ) -> (usize, usize) {
        let step = Resampler::step_for(src.frequency, dst.frequency, ratio);
        let to_source = |frames: usize| {
            ((frames as f64 * step).ceil() as usize).saturating_mul(src.frame_size())
        };

        let total = to_source(out_frames).min(QUEUED_BYTES_LIMIT);
        let ready = self.available_frames(dst, ratio);
        if ready >= out_frames {
            return (0, total);
        }
        let mut additional = to_source(out_frames - ready);
        if step != 1.0 && self.active.is_none() {
            let lookahead = Resampler::new(1, self.config).half_width(step);
            additional = additional.saturating_add(lookahead * src.frame_size());
        }
        (additional.min(QUEUED_BYTES_LIMIT), total)
    }

    /// Converts up to `request.max_frames` output frames.
    pub(crate) fn pull(&mut self, request: &PullRequest<'_>) -> PullOutput {
        let mut output = PullOutput::default();
        let mut produced = 0;

        while produced < request.max_frames {
            if let Some(active) = self.active.as_mut() {
                let step = active.step(&request.dst, request.ratio);
                self.resampled.clear();
                let n = active.resampler.read(
                    step,
                    request.max_frames - produced,
                    &mut self.resampled,
                );
                if n > 0 {
                    emit(
                        &self.resampled,
                        active.spec.channel_count(),
                        request,
                        &mut output.bytes,
                    );
                    produced += n;
                    continue;
                }
                if active.resampler.is_drained() {
                    tracing::trace!(spec = %active.spec, "span drained");
                    self.active = None;
                    continue;
                }
            }

            let Some(spec) = self.queued_spec() else {
                break;
            };
            match self.active.as_mut() {
                Some(active) if !active.spec.same_layout(&spec) => {
                    tracing::debug!(from = %active.spec, to = %spec, "layout change, draining span");
                    active.resampler.flush();
                    continue;
                }
                Some(_) => {}
                None => {
                    self.active = Some(ActiveSpan {
                        spec,
                        resampler: Resampler::new(spec.channel_count(), self.config),
                    });
                }
            }
            let Some(active) = self.active.as_mut() else {
                break;
            };

            let step = active.step(&request.dst, request.ratio);
            let wanted = active
                .resampler
                .frames_needed(step, request.max_frames - produced)
                .max(1);
            let Some(read) = self.queue.dequeue(wanted.saturating_mul(spec.frame_size())) else {
                break;
            };
            output.consumed += read.bytes.len();

            let bytes = match &read.map {
                Some(map) if !map.is_identity() => map.remap_bytes(
                    &read.bytes,
                    read.spec.format.byte_size(),
                    &read.spec.format.silence_sample(),
                ),
                _ => read.bytes,
            };
            self.decoded.clear();
            decode_samples(read.spec.format, &bytes, &mut self.decoded);
            active.resampler.write(&self.decoded);
            if read.flush {
                active.resampler.flush();
            }
        }

        tracing::trace!(
            frames = produced,
            bytes = output.bytes.len(),
            consumed = output.consumed,
            "pulled"
        );
        output
    }
}

/// Runs resampled frames through the output half of the chain.
fn emit(samples: &[f64], channels: usize, request: &PullRequest<'_>, out: &mut Vec<u8>) {
    let mut mixed = convert_channels(samples, channels, request.dst.channel_count());
    if request.gain != 1.0 {
        let gain = f64::from(request.gain);
        for s in &mut mixed {
            *s *= gain;
        }
    }

    let format = request.dst.format;
    match request.output_map {
        Some(map) if !map.is_identity() => {
            let mut encoded = Vec::with_capacity(mixed.len() * format.byte_size());
            encode_samples(format, &mixed, &mut encoded);
            out.extend(map.remap_bytes(&encoded, format.byte_size(), &format.silence_sample()));
        }
        _ => encode_samples(format, &mixed, out),
    }
}
