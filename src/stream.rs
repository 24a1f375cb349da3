//! The audio stream facade.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::config::StreamConfig;
use crate::device::{AudioDevice, DeviceId, DeviceKind};
use crate::chunk::Completion;
use crate::error::record;
use crate::event::{DataComplete, StreamCallback};
use crate::format::{AudioSpec, ChannelMap};
use crate::pipeline::{Pipeline, PullRequest, QUEUED_BYTES_LIMIT};
use crate::StreamError;

/// Accepted range of the frequency ratio.
const RATIO_RANGE: std::ops::RangeInclusive<f32> = 0.01..=100.0;

/// Data returned by [`AudioStream::pull`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pulled {
    /// Converted bytes in the destination format. Always whole frames.
    pub bytes: Vec<u8>,
    /// Source bytes removed from the queue to produce them.
    pub consumed: usize,
}

impl Pulled {
    /// Returns the number of converted bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing was converted.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Running totals of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Source bytes accepted by `push`.
    pub bytes_pushed: u64,
    /// Destination bytes returned by `pull`.
    pub bytes_pulled: u64,
    /// Source bytes consumed by `pull`.
    pub bytes_consumed: u64,
    /// Source bytes dropped by `clear`.
    pub bytes_cleared: u64,
}

/// A non-owning reference to the device a stream is bound to.
#[derive(Debug)]
struct Binding {
    id: DeviceId,
    kind: DeviceKind,
    device: Weak<AudioDevice>,
}

impl Binding {
    fn is_live(&self) -> bool {
        self.device.strong_count() > 0
    }
}

struct StreamState {
    src: Option<AudioSpec>,
    dst: Option<AudioSpec>,
    ratio: f32,
    gain: f32,
    input_map: Option<ChannelMap>,
    output_map: Option<ChannelMap>,
    pipeline: Pipeline,
    get_callback: Option<StreamCallback>,
    put_callback: Option<StreamCallback>,
    in_get_callback: bool,
    in_put_callback: bool,
    binding: Option<Binding>,
    stats: StreamStats,
}

/// Which of the two stream callbacks is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackKind {
    Get,
    Put,
}

impl StreamState {
    fn running(&mut self, kind: CallbackKind) -> &mut bool {
        match kind {
            CallbackKind::Get => &mut self.in_get_callback,
            CallbackKind::Put => &mut self.in_put_callback,
        }
    }

    /// Attaches the stream to `device`, taking its spec on the device side.
    fn attach(&mut self, device: &Arc<AudioDevice>) {
        let spec = device.spec();
        match device.kind() {
            DeviceKind::Playback => {
                self.set_dst(spec);
                if self.src.is_none() {
                    self.src = Some(spec);
                }
            }
            DeviceKind::Recording => {
                self.set_src(spec);
                if self.dst.is_none() {
                    self.dst = Some(spec);
                }
            }
        }
        self.binding = Some(Binding {
            id: device.id(),
            kind: device.kind(),
            device: Arc::downgrade(device),
        });
        tracing::debug!(device = %device.id(), name = device.name(), %spec, "stream bound");
    }

    /// The current binding, dropping it first if its device is gone.
    fn live_binding(&mut self) -> Option<&Binding> {
        if self.binding.as_ref().is_some_and(|b| !b.is_live()) {
            if let Some(stale) = self.binding.take() {
                tracing::debug!(device = %stale.id, "bound device dropped, unbinding");
            }
        }
        self.binding.as_ref()
    }

    fn set_src(&mut self, spec: AudioSpec) {
        if matches!(self.src, Some(old) if old.channels != spec.channels)
            && self.input_map.take().is_some()
        {
            tracing::warn!(channels = spec.channels, "source channel count changed, input channel map reset");
        }
        self.src = Some(spec);
    }

    fn set_dst(&mut self, spec: AudioSpec) {
        if matches!(self.dst, Some(old) if old.channels != spec.channels)
            && self.output_map.take().is_some()
        {
            tracing::warn!(channels = spec.channels, "destination channel count changed, output channel map reset");
        }
        self.dst = Some(spec);
    }
}

/// Resets a re-entry flag when a callback returns or unwinds.
struct CallbackScope<'a>(&'a RefCell<StreamState>, CallbackKind);

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        *self.0.borrow_mut().running(self.1) = false;
    }
}

/// Hands finished owned buffers back to their owners.
fn complete(done: Vec<Completion>) {
    for completion in done {
        completion.run();
    }
}

/// Holds a stream's lock across several calls.
///
/// Returned by [`AudioStream::lock`]. Operations on the same stream from the
/// thread holding the guard still work; other threads wait until it is dropped.
#[must_use = "the stream is unlocked as soon as the guard is dropped"]
pub struct StreamLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<StreamState>>,
}

/// A conversion queue between a source and a destination audio format.
///
/// Push PCM bytes in the source format, pull them in the destination format.
/// The stream queues pushed data unconverted, tagged with the source spec and
/// input channel map active at push time, and converts it on pull: channel
/// reordering, resampling (including a playback-speed ratio), channel count
/// conversion, gain and sample encoding.
///
/// Every operation takes the stream's re-entrant lock, so an `AudioStream`
/// can be shared between threads with `Arc`. Get/put callbacks run while the
/// lock is held and may call back into the stream.
///
/// # Example
///
/// ```
/// use pcm_stream::{AudioSpec, AudioStream, SampleFormat};
///
/// let src = AudioSpec::new(SampleFormat::S16LE, 2, 44100);
/// let dst = AudioSpec::new(SampleFormat::F32LE, 2, 44100);
/// let stream = AudioStream::new(Some(src), Some(dst)).unwrap();
///
/// stream.push(&[0u8; 400]).unwrap();
/// let pulled = stream.pull(800).unwrap();
/// assert_eq!(pulled.bytes.len(), 800);
/// assert_eq!(pulled.consumed, 400);
/// ```
pub struct AudioStream {
    inner: ReentrantMutex<RefCell<StreamState>>,
}

impl AudioStream {
    /// Creates a stream with the default configuration.
    ///
    /// Either side may be left unset and configured later with
    /// [`set_format`](Self::set_format).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if a given spec has zero channels or frequency.
    pub fn new(src: Option<AudioSpec>, dst: Option<AudioSpec>) -> Result<Self, StreamError> {
        Self::with_config(src, dst, StreamConfig::default())
    }

    /// Creates a stream with a custom configuration.
    pub fn with_config(
        src: Option<AudioSpec>,
        dst: Option<AudioSpec>,
        config: StreamConfig,
    ) -> Result<Self, StreamError> {
        record(validate_specs(src.as_ref(), dst.as_ref()))?;

        let state = StreamState {
            src,
            dst,
            ratio: 1.0,
            gain: 1.0,
            input_map: None,
            output_map: None,
            pipeline: Pipeline::new(config.resampler),
            get_callback: None,
            put_callback: None,
            in_get_callback: false,
            in_put_callback: false,
            binding: None,
            stats: StreamStats::default(),
        };
        tracing::debug!(
            src = ?src.map(|s| s.to_string()),
            dst = ?dst.map(|s| s.to_string()),
            "stream created"
        );
        Ok(Self {
            inner: ReentrantMutex::new(RefCell::new(state)),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StreamState) -> T) -> T {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Runs `callback` unless a callback of the same kind is already running
    /// on this stream.
    ///
    /// The caller must hold the lock and no borrow of the state.
    fn fire(
        &self,
        cell: &RefCell<StreamState>,
        kind: CallbackKind,
        callback: &StreamCallback,
        additional: usize,
        total: usize,
    ) {
        {
            let mut state = cell.borrow_mut();
            let running = state.running(kind);
            if *running {
                return;
            }
            *running = true;
        }
        let _scope = CallbackScope(cell, kind);
        callback(self, additional, total);
    }

    /// Locks the stream until the returned guard is dropped.
    ///
    /// Use this to make a sequence of calls (e.g. `queued()` then `pull()`)
    /// atomic with respect to other threads.
    pub fn lock(&self) -> StreamLock<'_> {
        StreamLock {
            _guard: self.inner.lock(),
        }
    }

    /// Changes the source and/or destination format.
    ///
    /// `None` leaves a side unchanged. While bound to a device, the side facing
    /// the device (destination for playback, source for recording) keeps the
    /// device's format and a change to it is silently ignored. Changing a
    /// side's channel count resets that side's channel map.
    ///
    /// Data already queued keeps the format it was pushed with.
    pub fn set_format(
        &self,
        src: Option<AudioSpec>,
        dst: Option<AudioSpec>,
    ) -> Result<(), StreamError> {
        record(validate_specs(src.as_ref(), dst.as_ref()))?;
        self.with_state(|state| {
            let locked = state.live_binding().map(|b| (b.kind, b.id));
            let (src, dst) = match locked {
                Some((DeviceKind::Playback, id)) => {
                    if dst.is_some_and(|d| Some(d) != state.dst) {
                        tracing::debug!(device = %id, "ignoring destination change on bound stream");
                    }
                    (src, None)
                }
                Some((DeviceKind::Recording, id)) => {
                    if src.is_some_and(|s| Some(s) != state.src) {
                        tracing::debug!(device = %id, "ignoring source change on bound stream");
                    }
                    (None, dst)
                }
                None => (src, dst),
            };
            if let Some(src) = src {
                state.set_src(src);
            }
            if let Some(dst) = dst {
                state.set_dst(dst);
            }
            tracing::debug!(
                src = ?state.src.map(|s| s.to_string()),
                dst = ?state.dst.map(|s| s.to_string()),
                "stream format set"
            );
        });
        Ok(())
    }

    /// Returns the current `(source, destination)` specs.
    pub fn format(&self) -> (Option<AudioSpec>, Option<AudioSpec>) {
        self.with_state(|state| (state.src, state.dst))
    }

    /// Queues bytes in the source format.
    ///
    /// The bytes are tagged with the current source spec and input channel
    /// map. If a put callback is set it runs before this returns, with the
    /// number of bytes just added.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the source format is unset or `data`
    /// is not a whole number of source frames.
    pub fn push(&self, data: &[u8]) -> Result<(), StreamError> {
        record(self.push_locked(data))
    }

    fn push_locked(&self, data: &[u8]) -> Result<(), StreamError> {
        let guard = self.inner.lock();
        let callback = {
            let mut state = guard.borrow_mut();
            let spec = state
                .src
                .ok_or_else(|| StreamError::format("source format is not set"))?;
            spec.check_frame_aligned(data.len())?;
            if data.is_empty() {
                return Ok(());
            }
            let map = state.input_map.clone();
            state.pipeline.push(data, spec, map);
            state.stats.bytes_pushed += data.len() as u64;
            tracing::trace!(bytes = data.len(), queued = state.pipeline.queued(), "pushed");
            state.put_callback.clone()
        };
        if let Some(callback) = callback {
            self.fire(&guard, CallbackKind::Put, &callback, data.len(), data.len());
        }
        Ok(())
    }

    /// Queues a buffer in the source format without copying it.
    ///
    /// The stream keeps `data` until every byte has been pulled, the stream is
    /// cleared, or it is dropped. Then `on_complete` receives the buffer back.
    /// If the push fails, the buffer goes straight back to `on_complete`
    /// before the error is returned. The put callback runs as for
    /// [`push`](Self::push).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the source format is unset or `data`
    /// is not a whole number of source frames.
    pub fn push_owned(
        &self,
        data: Vec<u8>,
        on_complete: Option<DataComplete>,
    ) -> Result<(), StreamError> {
        record(self.push_owned_locked(data, on_complete))
    }

    fn push_owned_locked(
        &self,
        data: Vec<u8>,
        on_complete: Option<DataComplete>,
    ) -> Result<(), StreamError> {
        let guard = self.inner.lock();
        let len = data.len();
        let checked = guard
            .borrow()
            .src
            .ok_or_else(|| StreamError::format("source format is not set"))
            .and_then(|spec| spec.check_frame_aligned(len).map(|()| spec));
        let spec = match checked {
            Ok(spec) => spec,
            Err(e) => {
                complete(on_complete.map(|f| Completion::new(f, data)).into_iter().collect());
                return Err(e);
            }
        };

        let (callback, done) = {
            let mut state = guard.borrow_mut();
            let map = state.input_map.clone();
            state.pipeline.push_owned(data, spec, map, on_complete);
            state.stats.bytes_pushed += len as u64;
            tracing::trace!(bytes = len, queued = state.pipeline.queued(), "pushed owned buffer");
            let callback = state.put_callback.clone().filter(|_| len > 0);
            (callback, state.pipeline.take_completed())
        };
        complete(done);
        if let Some(callback) = callback {
            self.fire(&guard, CallbackKind::Put, &callback, len, len);
        }
        Ok(())
    }

    /// Queues one buffer per channel, interleaving them.
    ///
    /// Each buffer holds `frames` samples in the source sample format. A
    /// `None` or missing buffer becomes silence and buffers beyond the source
    /// channel count are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the source format is unset, a buffer
    /// is shorter than `frames` samples, or the interleaved data would exceed
    /// `i32::MAX` bytes.
    pub fn put_planar(&self, channels: &[Option<&[u8]>], frames: usize) -> Result<(), StreamError> {
        // Held across the push so the source spec cannot change in between.
        let guard = self.inner.lock();
        let spec = guard.borrow().src;
        let interleaved = record(interleave(spec, channels, frames))?;
        self.push(&interleaved)
    }

    /// Converts and returns up to `max_bytes` of destination data.
    ///
    /// If a get callback is set it runs first, with an estimate of the source
    /// bytes still missing for this request. A request smaller than one
    /// destination frame still runs it, with `(0, 0)`. Returns whatever is
    /// available, rounded down to whole destination frames, and never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the destination format is unset.
    pub fn pull(&self, max_bytes: usize) -> Result<Pulled, StreamError> {
        record(self.pull_locked(max_bytes))
    }

    fn pull_locked(&self, max_bytes: usize) -> Result<Pulled, StreamError> {
        let guard = self.inner.lock();

        let pending = {
            let state = guard.borrow();
            let dst = state.dst.ok_or_else(missing_dst)?;
            let frames = max_bytes / dst.frame_size();
            state
                .get_callback
                .clone()
                .map(|callback| {
                    let (additional, total) = state
                        .src
                        .or_else(|| state.pipeline.queued_spec())
                        .map_or((0, 0), |src| {
                            state.pipeline.source_bytes_needed(
                                &src,
                                &dst,
                                f64::from(state.ratio),
                                frames,
                            )
                        });
                    (callback, additional, total)
                })
        };
        if let Some((callback, additional, total)) = pending {
            self.fire(&guard, CallbackKind::Get, &callback, additional, total);
        }

        let (pulled, done) = {
            let mut state = guard.borrow_mut();
            let state = &mut *state;
            // The callback may have changed the format.
            let dst = state.dst.ok_or_else(missing_dst)?;
            let max_frames = max_bytes / dst.frame_size();
            if max_frames == 0 {
                return Ok(Pulled::default());
            }

            let output = state.pipeline.pull(&PullRequest {
                dst,
                ratio: f64::from(state.ratio),
                gain: state.gain,
                output_map: state.output_map.as_ref(),
                max_frames,
            });
            state.stats.bytes_pulled += output.bytes.len() as u64;
            state.stats.bytes_consumed += output.consumed as u64;
            let pulled = Pulled {
                bytes: output.bytes,
                consumed: output.consumed,
            };
            (pulled, state.pipeline.take_completed())
        };
        complete(done);
        Ok(pulled)
    }

    /// Pulls into a caller-owned buffer and returns the bytes written.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let pulled = self.pull(buf.len())?;
        buf[..pulled.bytes.len()].copy_from_slice(&pulled.bytes);
        Ok(pulled.bytes.len())
    }

    /// Marks the end of the queued data.
    ///
    /// Audio held back by the resampler's lookahead becomes retrievable once
    /// the pull reaches this point, padded with silence.
    pub fn flush(&self) -> Result<(), StreamError> {
        self.with_state(|state| {
            state.pipeline.flush();
            tracing::debug!(queued = state.pipeline.queued(), "stream flushed");
        });
        Ok(())
    }

    /// Drops all queued data and resampler history.
    ///
    /// Buffers queued with [`push_owned`](Self::push_owned) are handed back
    /// to their completion callbacks.
    pub fn clear(&self) -> Result<(), StreamError> {
        let guard = self.inner.lock();
        let done = {
            let mut state = guard.borrow_mut();
            let dropped = state.pipeline.queued();
            state.pipeline.clear();
            state.stats.bytes_cleared += dropped as u64;
            tracing::debug!(dropped, "stream cleared");
            state.pipeline.take_completed()
        };
        complete(done);
        Ok(())
    }

    /// Source bytes queued and not yet consumed.
    ///
    /// Saturates at `i32::MAX` instead of overflowing.
    pub fn queued(&self) -> usize {
        self.with_state(|state| state.pipeline.queued())
    }

    /// Estimate of the destination bytes that can be pulled right now.
    ///
    /// Zero if the destination format is unset. Saturates at `i32::MAX`.
    pub fn available(&self) -> usize {
        self.with_state(|state| {
            state.dst.map_or(0, |dst| {
                state
                    .pipeline
                    .available_bytes(&dst, f64::from(state.ratio))
            })
        })
    }

    /// Sets the playback speed multiplier.
    ///
    /// Values above 1.0 play faster (and higher), below 1.0 slower.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Range`] unless `ratio` is within `0.01..=100`.
    pub fn set_frequency_ratio(&self, ratio: f32) -> Result<(), StreamError> {
        if !RATIO_RANGE.contains(&ratio) {
            return record(Err(StreamError::range(
                "frequency ratio",
                ratio,
                "0.01..=100",
            )));
        }
        self.with_state(|state| state.ratio = ratio);
        Ok(())
    }

    /// Returns the playback speed multiplier.
    pub fn frequency_ratio(&self) -> f32 {
        self.with_state(|state| state.ratio)
    }

    /// Sets the linear gain applied on pull. 1.0 leaves samples untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Range`] if `gain` is negative or not finite.
    pub fn set_gain(&self, gain: f32) -> Result<(), StreamError> {
        if !gain.is_finite() || gain < 0.0 {
            return record(Err(StreamError::range(
                "gain",
                gain,
                "a finite number >= 0",
            )));
        }
        self.with_state(|state| state.gain = gain);
        Ok(())
    }

    /// Returns the linear gain.
    pub fn gain(&self) -> f32 {
        self.with_state(|state| state.gain)
    }

    /// Sets the channel map applied to data pushed from now on.
    ///
    /// `None` turns remapping off. Data already queued keeps the map it was
    /// pushed with.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the source format is unset and
    /// [`StreamError::ChannelCountMismatch`] if the map length differs from the
    /// source channel count.
    pub fn set_input_channel_map(&self, map: Option<&[i32]>) -> Result<(), StreamError> {
        record(self.with_state(|state| {
            state.input_map = build_map(map, state.src.as_ref(), "source")?;
            Ok(())
        }))
    }

    /// Sets the channel map applied to pulled data.
    ///
    /// `None` turns remapping off.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the destination format is unset and
    /// [`StreamError::ChannelCountMismatch`] if the map length differs from the
    /// destination channel count.
    pub fn set_output_channel_map(&self, map: Option<&[i32]>) -> Result<(), StreamError> {
        record(self.with_state(|state| {
            state.output_map = build_map(map, state.dst.as_ref(), "destination")?;
            Ok(())
        }))
    }

    /// Returns the current input channel map, if any.
    pub fn input_channel_map(&self) -> Option<Vec<i32>> {
        self.with_state(|state| state.input_map.as_ref().map(|m| m.as_slice().to_vec()))
    }

    /// Returns the current output channel map, if any.
    pub fn output_channel_map(&self) -> Option<Vec<i32>> {
        self.with_state(|state| state.output_map.as_ref().map(|m| m.as_slice().to_vec()))
    }

    /// Sets or removes the callback run at the start of every pull.
    ///
    /// Waits for a callback that is running on another thread to finish.
    pub fn set_get_callback(&self, callback: Option<StreamCallback>) {
        self.with_state(|state| state.get_callback = callback);
    }

    /// Sets or removes the callback run after every push.
    ///
    /// Waits for a callback that is running on another thread to finish.
    pub fn set_put_callback(&self, callback: Option<StreamCallback>) {
        self.with_state(|state| state.put_callback = callback);
    }

    /// Binds the stream to a device.
    ///
    /// The side facing the device takes the device's spec; an unset other side
    /// takes it too. The stream keeps only a weak reference to the device.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Bind`] if the stream is already bound.
    pub fn bind(&self, device: &Arc<AudioDevice>) -> Result<(), StreamError> {
        bind_streams(device, &[self])
    }

    /// Unbinds the stream from its device. Does nothing when unbound.
    pub fn unbind(&self) {
        self.with_state(|state| {
            if let Some(binding) = state.binding.take() {
                tracing::debug!(device = %binding.id, "stream unbound");
            }
        });
    }

    /// Returns the id of the bound device, if it is still alive.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.with_state(|state| state.live_binding().map(|b| b.id))
    }

    fn with_device<T>(&self, f: impl FnOnce(&AudioDevice) -> T) -> Result<T, StreamError> {
        let device = self.with_state(|state| {
            state
                .live_binding()
                .and_then(|b| b.device.upgrade())
                .ok_or(StreamError::NotBound)
        });
        record(device).map(|device| f(device.as_ref()))
    }

    /// Pauses the bound device.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotBound`] if the stream has no live device.
    pub fn pause_device(&self) -> Result<(), StreamError> {
        self.with_device(AudioDevice::pause)
    }

    /// Resumes the bound device.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotBound`] if the stream has no live device.
    pub fn resume_device(&self) -> Result<(), StreamError> {
        self.with_device(AudioDevice::resume)
    }

    /// Returns whether the bound device is paused.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotBound`] if the stream has no live device.
    pub fn device_paused(&self) -> Result<bool, StreamError> {
        self.with_device(AudioDevice::is_paused)
    }

    /// Returns the running totals.
    pub fn stats(&self) -> StreamStats {
        self.with_state(|state| state.stats)
    }

    /// Unbinds the stream and releases all queued data.
    ///
    /// Owned buffers still queued are handed back to their completion
    /// callbacks, as they would be when the stream is dropped.
    pub fn close(self) {
        self.unbind();
        let (stats, done) = self.with_state(|state| {
            state.pipeline.clear();
            (state.stats, state.pipeline.take_completed())
        });
        complete(done);
        tracing::debug!(?stats, "stream closed");
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        let pipeline = &mut self.inner.get_mut().get_mut().pipeline;
        pipeline.clear();
        complete(pipeline.take_completed());
    }
}

/// Binds several streams to one device at once.
///
/// Either every stream is bound or none is: if any of them is already bound,
/// or the same stream is listed twice, nothing changes. Each stream takes the
/// device's spec on its device side, as with [`AudioStream::bind`].
///
/// # Errors
///
/// Returns [`StreamError::Bind`] if a stream is already bound and
/// [`StreamError::Format`] if a stream is listed more than once.
pub fn bind_streams(device: &Arc<AudioDevice>, streams: &[&AudioStream]) -> Result<(), StreamError> {
    record(bind_all(device, streams))
}

fn bind_all(device: &Arc<AudioDevice>, streams: &[&AudioStream]) -> Result<(), StreamError> {
    // Locked in address order so two batches over the same streams cannot deadlock.
    let mut ordered = streams.to_vec();
    ordered.sort_by_key(|stream| *stream as *const AudioStream as usize);
    if ordered.windows(2).any(|pair| std::ptr::eq(pair[0], pair[1])) {
        return Err(StreamError::format("a stream is listed more than once"));
    }
    let guards: Vec<_> = ordered.iter().map(|stream| stream.inner.lock()).collect();

    for guard in &guards {
        let bound = guard.borrow_mut().live_binding().map(|b| b.id);
        if let Some(id) = bound {
            return Err(StreamError::Bind { device_id: id.get() });
        }
    }
    for guard in &guards {
        guard.borrow_mut().attach(device);
    }
    Ok(())
}

/// Unbinds every listed stream. Streams that are not bound are skipped.
pub fn unbind_streams(streams: &[&AudioStream]) {
    for stream in streams {
        stream.unbind();
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(guard) = self.inner.try_lock() else {
            return f.write_str("AudioStream { <locked> }");
        };
        let Ok(state) = guard.try_borrow() else {
            return f.write_str("AudioStream { <in use> }");
        };
        f.debug_struct("AudioStream")
            .field("src", &state.src)
            .field("dst", &state.dst)
            .field("ratio", &state.ratio)
            .field("gain", &state.gain)
            .field("queued", &state.pipeline.queued())
            .field("device", &state.binding.as_ref().map(|b| b.id))
            .finish_non_exhaustive()
    }
}

fn missing_dst() -> StreamError {
    StreamError::format("destination format is not set")
}

fn validate_specs(src: Option<&AudioSpec>, dst: Option<&AudioSpec>) -> Result<(), StreamError> {
    if let Some(src) = src {
        src.validate()?;
    }
    if let Some(dst) = dst {
        dst.validate()?;
    }
    Ok(())
}

fn build_map(
    entries: Option<&[i32]>,
    spec: Option<&AudioSpec>,
    side: &str,
) -> Result<Option<ChannelMap>, StreamError> {
    let Some(entries) = entries else {
        return Ok(None);
    };
    let spec = spec.ok_or_else(|| StreamError::format(format!("{side} format is not set")))?;
    ChannelMap::new(entries, spec.channel_count()).map(Some)
}

fn interleave(
    spec: Option<AudioSpec>,
    channels: &[Option<&[u8]>],
    frames: usize,
) -> Result<Vec<u8>, StreamError> {
    let spec = spec.ok_or_else(|| StreamError::format("source format is not set"))?;
    let width = spec.format.byte_size();
    let too_large = || {
        StreamError::format(format!(
            "{frames} planar frames exceed the {QUEUED_BYTES_LIMIT} byte push limit"
        ))
    };
    let plane_len = frames.checked_mul(width).ok_or_else(too_large)?;
    let total_len = plane_len
        .checked_mul(spec.channel_count())
        .filter(|&len| len <= QUEUED_BYTES_LIMIT)
        .ok_or_else(too_large)?;

    let planes: Vec<Option<&[u8]>> = (0..spec.channel_count())
        .map(|ch| channels.get(ch).copied().flatten())
        .collect();
    if let Some(short) = planes.iter().flatten().find(|p| p.len() < plane_len) {
        return Err(StreamError::format(format!(
            "planar buffer holds {} bytes, {frames} frames need {plane_len}",
            short.len()
        )));
    }

    let silence = spec.format.silence_sample();
    let mut out = Vec::with_capacity(total_len);
    for frame in 0..frames {
        let at = frame * width;
        for plane in &planes {
            match plane {
                Some(data) => out.extend_from_slice(&data[at..at + width]),
                None => out.extend_from_slice(&silence),
            }
        }
    }
    Ok(out)
}

/// Converts a whole buffer from one spec to another in one call.
///
/// Runs the data through a temporary stream: push, flush, pull everything.
///
/// # Example
///
/// ```
/// use pcm_stream::{convert_samples, AudioSpec, SampleFormat};
///
/// let src = AudioSpec::new(SampleFormat::U8, 1, 8000);
/// let dst = AudioSpec::new(SampleFormat::S16LE, 2, 8000);
/// let out = convert_samples(&src, &[0x80, 0xC0], &dst).unwrap();
/// assert_eq!(out, vec![0, 0, 0, 0, 0x00, 0x40, 0x00, 0x40]);
/// ```
pub fn convert_samples(
    src_spec: &AudioSpec,
    data: &[u8],
    dst_spec: &AudioSpec,
) -> Result<Vec<u8>, StreamError> {
    let stream = AudioStream::new(Some(*src_spec), Some(*dst_spec))?;
    stream.push(data)?;
    stream.flush()?;

    let mut out = Vec::new();
    loop {
        let pulled = stream.pull(usize::MAX)?;
        if pulled.is_empty() {
            break;
        }
        out.extend(pulled.bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{clear_error, data_complete, last_error, SampleFormat};

    /// Collects the buffers handed back by completion callbacks.
    fn returned_buffers() -> (Arc<Mutex<Vec<Vec<u8>>>>, impl Fn() -> Option<DataComplete>) {
        let returned = Arc::new(Mutex::new(Vec::new()));
        let sink = returned.clone();
        let make = move || {
            let sink = sink.clone();
            Some(data_complete(move |buffer| sink.lock().unwrap().push(buffer)))
        };
        (returned, make)
    }

    fn s16le(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn mono16k() -> AudioSpec {
        AudioSpec::new(SampleFormat::S16LE, 1, 16000)
    }

    fn stereo48k() -> AudioSpec {
        AudioSpec::new(SampleFormat::F32LE, 2, 48000)
    }

    #[test]
    fn test_push_requires_source_format() {
        let stream = AudioStream::new(None, Some(mono16k())).unwrap();
        assert!(matches!(stream.push(&[0, 0]), Err(StreamError::Format { .. })));
    }

    #[test]
    fn test_push_rejects_partial_frames() {
        clear_error();
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        assert!(stream.push(&[0, 0, 0]).is_err());
        assert_eq!(stream.queued(), 0);
        assert!(last_error().is_some_and(|e| e.contains("frame size")));
    }

    #[test]
    fn test_pull_requires_destination_format() {
        let stream = AudioStream::new(Some(mono16k()), None).unwrap();
        assert!(matches!(stream.pull(64), Err(StreamError::Format { .. })));
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let bad = AudioSpec::new(SampleFormat::S16LE, 1, 0);
        assert!(AudioStream::new(Some(bad), None).is_err());

        let stream = AudioStream::new(None, None).unwrap();
        assert!(stream.set_format(None, Some(bad)).is_err());
        assert_eq!(stream.format(), (None, None));
    }

    #[test]
    fn test_pull_rounds_down_to_frames() {
        let stream = AudioStream::new(Some(mono16k()), Some(stereo48k())).unwrap();
        assert_eq!(stream.pull(7).unwrap(), Pulled::default());
    }

    #[test]
    fn test_read_fills_buffer() {
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        stream.push(&s16le(&[1, 2, 3])).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], s16le(&[1, 2, 3]).as_slice());
    }

    #[test]
    fn test_ratio_range() {
        let stream = AudioStream::new(None, None).unwrap();
        assert!(stream.set_frequency_ratio(0.01).is_ok());
        assert!(stream.set_frequency_ratio(100.0).is_ok());
        assert!(matches!(
            stream.set_frequency_ratio(0.001),
            Err(StreamError::Range { .. })
        ));
        assert!(stream.set_frequency_ratio(f32::NAN).is_err());
        assert!((stream.frequency_ratio() - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_gain_range() {
        let stream = AudioStream::new(None, None).unwrap();
        assert!((stream.gain() - 1.0).abs() < f32::EPSILON);
        assert!(stream.set_gain(0.0).is_ok());
        assert!(stream.set_gain(-0.5).is_err());
        assert!(stream.set_gain(f32::NAN).is_err());
        assert!(stream.set_gain(f32::INFINITY).is_err());
        assert_eq!(stream.gain(), 0.0);
    }

    #[test]
    fn test_channel_map_validation() {
        let stream = AudioStream::new(None, Some(stereo48k())).unwrap();
        assert!(matches!(
            stream.set_input_channel_map(Some(&[0])),
            Err(StreamError::Format { .. })
        ));
        assert!(matches!(
            stream.set_output_channel_map(Some(&[0, 1, 1])),
            Err(StreamError::ChannelCountMismatch { expected: 2, actual: 3 })
        ));
        stream.set_output_channel_map(Some(&[1, 0])).unwrap();
        assert_eq!(stream.output_channel_map(), Some(vec![1, 0]));
        stream.set_output_channel_map(None).unwrap();
        assert_eq!(stream.output_channel_map(), None);
    }

    #[test]
    fn test_channel_count_change_resets_map() {
        let stream = AudioStream::new(Some(stereo48k()), Some(stereo48k())).unwrap();
        stream.set_input_channel_map(Some(&[1, 0])).unwrap();
        stream.set_output_channel_map(Some(&[1, 1])).unwrap();

        // Same channel count keeps the map
        stream
            .set_format(Some(AudioSpec::new(SampleFormat::S16LE, 2, 44100)), None)
            .unwrap();
        assert_eq!(stream.input_channel_map(), Some(vec![1, 0]));

        stream
            .set_format(Some(mono16k()), Some(AudioSpec::new(SampleFormat::F32LE, 1, 48000)))
            .unwrap();
        assert_eq!(stream.input_channel_map(), None);
        assert_eq!(stream.output_channel_map(), None);
    }

    #[test]
    fn test_put_planar_interleaves() {
        let spec = AudioSpec::new(SampleFormat::S16LE, 3, 16000);
        let stream = AudioStream::new(Some(spec), Some(spec)).unwrap();
        let left = s16le(&[1, 2]);
        let right = s16le(&[3, 4]);
        stream
            .put_planar(&[Some(left.as_slice()), None, Some(right.as_slice())], 2)
            .unwrap();

        let pulled = stream.pull(usize::MAX).unwrap();
        assert_eq!(pulled.bytes, s16le(&[1, 0, 3, 2, 0, 4]));
    }

    #[test]
    fn test_put_planar_missing_and_extra_planes() {
        let spec = AudioSpec::new(SampleFormat::U8, 2, 8000);
        let stream = AudioStream::new(Some(spec), Some(spec)).unwrap();
        let a = [10u8, 11];
        let extra = [99u8, 99];
        stream.put_planar(&[Some(&a[..])], 2).unwrap();
        stream
            .put_planar(&[Some(&a[..]), Some(&a[..]), Some(&extra[..])], 1)
            .unwrap();

        let pulled = stream.pull(usize::MAX).unwrap();
        assert_eq!(pulled.bytes, vec![10, 0x80, 11, 0x80, 10, 10]);
    }

    #[test]
    fn test_put_planar_short_buffer() {
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        let short = [0u8; 2];
        assert!(stream.put_planar(&[Some(&short[..])], 2).is_err());
    }

    #[test]
    fn test_bind_twice_fails() {
        let device = AudioDevice::playback("out", stereo48k()).unwrap();
        let other = AudioDevice::playback("other", stereo48k()).unwrap();
        let stream = AudioStream::new(None, None).unwrap();
        stream.bind(&device).unwrap();
        assert_eq!(stream.device_id(), Some(device.id()));
        assert_eq!(stream.format(), (Some(stereo48k()), Some(stereo48k())));

        let err = stream.bind(&other).unwrap_err();
        assert_eq!(err, StreamError::Bind { device_id: device.id().get() });

        stream.unbind();
        stream.unbind();
        stream.bind(&other).unwrap();
    }

    #[test]
    fn test_recording_bind_locks_source() {
        let device = AudioDevice::recording("mic", mono16k()).unwrap();
        let stream = AudioStream::new(Some(stereo48k()), Some(stereo48k())).unwrap();
        stream.bind(&device).unwrap();
        assert_eq!(stream.format(), (Some(mono16k()), Some(stereo48k())));

        let cd = AudioSpec::new(SampleFormat::S16LE, 2, 44100);
        stream.set_format(Some(cd), Some(cd)).unwrap();
        assert_eq!(stream.format(), (Some(mono16k()), Some(cd)));
    }

    #[test]
    fn test_device_ops_require_binding() {
        let stream = AudioStream::new(None, None).unwrap();
        assert_eq!(stream.pause_device(), Err(StreamError::NotBound));

        let device = AudioDevice::playback("out", stereo48k()).unwrap();
        stream.bind(&device).unwrap();
        stream.pause_device().unwrap();
        assert!(device.is_paused());
        assert_eq!(stream.device_paused(), Ok(true));
        stream.resume_device().unwrap();
        assert_eq!(stream.device_paused(), Ok(false));

        drop(device);
        assert_eq!(stream.resume_device(), Err(StreamError::NotBound));
        assert_eq!(stream.device_id(), None);
    }

    #[test]
    fn test_clear_and_stats() {
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        stream.push(&[0u8; 100]).unwrap();
        stream.pull(40).unwrap();
        stream.clear().unwrap();
        assert_eq!(stream.queued(), 0);
        assert_eq!(
            stream.stats(),
            StreamStats {
                bytes_pushed: 100,
                bytes_pulled: 40,
                bytes_consumed: 40,
                bytes_cleared: 60,
            }
        );
    }

    #[test]
    fn test_lock_is_reentrant() {
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        let _lock = stream.lock();
        stream.push(&[0u8; 4]).unwrap();
        assert_eq!(stream.queued(), 4);
    }

    #[test]
    fn test_convert_samples_resamples() {
        let src = AudioSpec::new(SampleFormat::S16LE, 1, 8000);
        let dst = AudioSpec::new(SampleFormat::F32LE, 2, 16000);
        let out = convert_samples(&src, &[0u8; 200], &dst).unwrap();
        assert_eq!(out.len(), 200 * 8);
    }

    #[test]
    fn test_debug_output() {
        let stream = AudioStream::new(Some(mono16k()), None).unwrap();
        let debug = format!("{stream:?}");
        assert!(debug.contains("AudioStream"));
        assert!(debug.contains("queued"));
    }

    #[test]
    fn test_stream_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AudioStream>();
    }

    #[test]
    fn test_put_planar_rejects_oversized_request() {
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        assert!(matches!(
            stream.put_planar(&[None], usize::MAX),
            Err(StreamError::Format { .. })
        ));
        assert!(matches!(
            stream.put_planar(&[None], usize::MAX / 4),
            Err(StreamError::Format { .. })
        ));
        assert_eq!(stream.queued(), 0);
    }

    #[test]
    fn test_push_owned_returns_buffer_after_pull() {
        let (returned, complete) = returned_buffers();
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        stream.push_owned(s16le(&[1, 2, 3]), complete()).unwrap();
        stream.push(&s16le(&[4])).unwrap();
        assert_eq!(stream.queued(), 8);

        assert_eq!(stream.pull(4).unwrap().bytes, s16le(&[1, 2]));
        assert!(returned.lock().unwrap().is_empty());

        assert_eq!(stream.pull(usize::MAX).unwrap().bytes, s16le(&[3, 4]));
        assert_eq!(*returned.lock().unwrap(), vec![s16le(&[1, 2, 3])]);
    }

    #[test]
    fn test_push_owned_returned_on_clear_close_and_drop() {
        let (returned, complete) = returned_buffers();

        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        stream.push_owned(vec![0; 4], complete()).unwrap();
        stream.clear().unwrap();
        assert_eq!(returned.lock().unwrap().len(), 1);

        stream.push_owned(vec![0; 6], complete()).unwrap();
        stream.close();
        assert_eq!(returned.lock().unwrap().len(), 2);

        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        stream.push_owned(vec![0; 8], complete()).unwrap();
        drop(stream);

        let lens: Vec<usize> = returned.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(lens, vec![4, 6, 8]);
    }

    #[test]
    fn test_push_owned_failure_returns_buffer() {
        let (returned, complete) = returned_buffers();
        let stream = AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap();
        assert!(stream.push_owned(vec![1, 2, 3], complete()).is_err());
        assert_eq!(*returned.lock().unwrap(), vec![vec![1, 2, 3]]);
        assert_eq!(stream.queued(), 0);

        // Empty buffers are never queued
        stream.push_owned(Vec::new(), complete()).unwrap();
        assert_eq!(returned.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_completion_may_use_stream() {
        let stream = Arc::new(AudioStream::new(Some(mono16k()), Some(mono16k())).unwrap());
        let weak = Arc::downgrade(&stream);
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let done = data_complete(move |_| {
            if let Some(stream) = weak.upgrade() {
                *seen_clone.lock().unwrap() = Some(stream.queued());
            }
        });

        stream.push_owned(vec![0; 4], Some(done)).unwrap();
        stream.push(&[0; 2]).unwrap();
        stream.pull(4).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(2));
    }

    #[test]
    fn test_bind_streams_is_all_or_nothing() {
        let device = AudioDevice::playback("out", stereo48k()).unwrap();
        let other = AudioDevice::playback("other", mono16k()).unwrap();
        let a = AudioStream::new(None, None).unwrap();
        let b = AudioStream::new(None, None).unwrap();
        let c = AudioStream::new(None, None).unwrap();
        b.bind(&other).unwrap();

        let err = bind_streams(&device, &[&a, &b, &c]).unwrap_err();
        assert_eq!(err, StreamError::Bind { device_id: other.id().get() });
        assert_eq!(a.device_id(), None);
        assert_eq!(c.device_id(), None);
        assert_eq!(a.format(), (None, None));

        unbind_streams(&[&a, &b, &c]);
        bind_streams(&device, &[&a, &b, &c]).unwrap();
        for stream in [&a, &b, &c] {
            assert_eq!(stream.device_id(), Some(device.id()));
            assert_eq!(stream.format().1, Some(stereo48k()));
        }
        // An unset source takes the device spec, a set one is kept
        assert_eq!(a.format().0, Some(stereo48k()));
        assert_eq!(b.format().0, Some(mono16k()));

        unbind_streams(&[&a, &c]);
        assert_eq!(a.device_id(), None);
        assert_eq!(b.device_id(), Some(device.id()));
        assert_eq!(c.device_id(), None);
    }

    #[test]
    fn test_bind_streams_rejects_duplicates() {
        let device = AudioDevice::recording("mic", mono16k()).unwrap();
        let stream = AudioStream::new(None, None).unwrap();
        assert!(matches!(
            bind_streams(&device, &[&stream, &stream]),
            Err(StreamError::Format { .. })
        ));
        assert_eq!(stream.device_id(), None);

        bind_streams(&device, &[]).unwrap();
    }
}
