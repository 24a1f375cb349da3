//! Queued audio data with the format it was pushed in.

use std::fmt;

use crate::event::DataComplete;
use crate::format::{AudioSpec, ChannelMap};

/// A run of pushed bytes that share one source spec and input channel map.
///
/// The spec and map are captured at push time, so changing the stream's
/// source format or input map later never reinterprets audio that is
/// already queued.
pub(crate) struct PendingChunk {
    bytes: Vec<u8>,
    /// Bytes already handed out from the front of `bytes`.
    offset: usize,
    spec: AudioSpec,
    map: Option<ChannelMap>,
    /// The stream was flushed right after the last byte of this chunk.
    flush: bool,
    /// Set for buffers handed over by `push_owned`. Such chunks never grow.
    owned: bool,
    on_complete: Option<DataComplete>,
}

/// A finished owned buffer together with its completion callback.
pub(crate) struct Completion {
    callback: DataComplete,
    bytes: Vec<u8>,
}

impl Completion {
    pub(crate) fn new(callback: DataComplete, bytes: Vec<u8>) -> Self {
        Self { callback, bytes }
    }

    /// Hands the buffer back to its owner.
    pub(crate) fn run(self) {
        (self.callback)(self.bytes);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("bytes", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl PendingChunk {
    /// Creates a chunk from freshly pushed bytes.
    pub(crate) fn new(bytes: Vec<u8>, spec: AudioSpec, map: Option<ChannelMap>) -> Self {
        Self {
            bytes,
            offset: 0,
            spec,
            map,
            flush: false,
            owned: false,
            on_complete: None,
        }
    }

    /// Creates a chunk that keeps `bytes` as handed over and returns them to
    /// `on_complete` once consumed or discarded.
    pub(crate) fn owned(
        bytes: Vec<u8>,
        spec: AudioSpec,
        map: Option<ChannelMap>,
        on_complete: Option<DataComplete>,
    ) -> Self {
        Self {
            owned: true,
            on_complete,
            ..Self::new(bytes, spec, map)
        }
    }

    /// Spec the bytes were pushed with.
    pub(crate) fn spec(&self) -> &AudioSpec {
        &self.spec
    }

    /// Input channel map that was active at push time.
    pub(crate) fn map(&self) -> Option<&ChannelMap> {
        self.map.as_ref()
    }

    /// Unconsumed bytes.
    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Unconsumed whole frames.
    pub(crate) fn remaining_frames(&self) -> usize {
        self.remaining() / self.spec.frame_size().max(1)
    }

    /// Returns `true` once every byte has been taken.
    pub(crate) fn is_consumed(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns `true` if the stream was flushed right after this chunk.
    pub(crate) fn is_flush_point(&self) -> bool {
        self.flush
    }

    pub(crate) fn mark_flush(&mut self) {
        self.flush = true;
    }

    /// Returns `true` if bytes pushed with `spec` and `map` can be appended here.
    pub(crate) fn accepts(&self, spec: &AudioSpec, map: Option<&ChannelMap>) -> bool {
        !self.flush && !self.owned && self.spec == *spec && self.map.as_ref() == map
    }

    /// Releases the chunk, returning its completion if it has one.
    pub(crate) fn into_completion(self) -> Option<Completion> {
        let bytes = self.bytes;
        self.on_complete
            .map(|callback| Completion::new(callback, bytes))
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) {
        if self.offset > 0 && self.offset >= self.bytes.len() / 2 {
            self.bytes.drain(..self.offset);
            self.offset = 0;
        }
        self.bytes.extend_from_slice(bytes);
    }

    /// Takes up to `max` bytes from the front.
    ///
    /// The buffer itself is left intact so an owned chunk can be returned whole.
    pub(crate) fn take(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.remaining());
        let out = self.bytes[self.offset..self.offset + n].to_vec();
        self.offset += n;
        out
    }
}

impl fmt::Debug for PendingChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChunk")
            .field("remaining", &self.remaining())
            .field("spec", &self.spec)
            .field("map", &self.map)
            .field("flush", &self.flush)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}
