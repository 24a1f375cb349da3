//! Byte queue of format-tagged chunks.

use std::collections::VecDeque;

use crate::chunk::{Completion, PendingChunk};
use crate::event::DataComplete;
use crate::format::{AudioSpec, ChannelMap};

/// Largest byte count reported by [`RingBuffer::bytes_queued`].
pub(crate) const QUEUED_BYTES_LIMIT: usize = i32::MAX as usize;

/// Bytes taken from the front of the queue, with the tag they were pushed with.
#[derive(Debug)]
pub(crate) struct Dequeued {
    pub bytes: Vec<u8>,
    pub spec: AudioSpec,
    pub map: Option<ChannelMap>,
    /// The read ended exactly at a flush point.
    pub flush: bool,
}

/// An unbounded FIFO of pushed audio.
///
/// Data is stored unconverted, in chunks that carry the spec and input map
/// active when it was pushed. Reads never cross from one chunk into the next,
/// so every read returns bytes of a single format.
///
/// Owned buffers whose data is no longer needed are parked in a completion
/// list until the owner of the queue runs them with [`take_completed`].
///
/// [`take_completed`]: RingBuffer::take_completed
#[derive(Debug)]
pub(crate) struct RingBuffer {
    chunks: VecDeque<PendingChunk>,
    queued: usize,
    limit: usize,
    completed: Vec<Completion>,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::with_limit(QUEUED_BYTES_LIMIT)
    }
}

impl RingBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer that reports at most `limit` queued bytes.
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            queued: 0,
            limit,
            completed: Vec::new(),
        }
    }

    /// Appends bytes tagged with `spec` and `map`.
    ///
    /// Joins the newest chunk when it has the same tag and no flush point.
    pub(crate) fn enqueue(&mut self, bytes: &[u8], spec: AudioSpec, map: Option<ChannelMap>) {
        if bytes.is_empty() {
            return;
        }
        self.queued = self.queued.saturating_add(bytes.len());
        match self.chunks.back_mut() {
            Some(last) if last.accepts(&spec, map.as_ref()) => last.append(bytes),
            _ => self
                .chunks
                .push_back(PendingChunk::new(bytes.to_vec(), spec, map)),
        }
    }

    /// Appends a buffer as its own chunk without copying it.
    ///
    /// An empty buffer completes at once.
    pub(crate) fn enqueue_owned(
        &mut self,
        bytes: Vec<u8>,
        spec: AudioSpec,
        map: Option<ChannelMap>,
        on_complete: Option<DataComplete>,
    ) {
        let chunk = PendingChunk::owned(bytes, spec, map, on_complete);
        if chunk.is_consumed() {
            self.completed.extend(chunk.into_completion());
            return;
        }
        self.queued = self.queued.saturating_add(chunk.remaining());
        self.chunks.push_back(chunk);
    }

    /// Spec and input map of the oldest unconsumed byte.
    pub(crate) fn peek_format(&self) -> Option<(&AudioSpec, Option<&ChannelMap>)> {
        self.chunks.front().map(|c| (c.spec(), c.map()))
    }

    /// Unconsumed bytes, capped at the reporting limit.
    pub(crate) fn bytes_queued(&self) -> usize {
        self.queued.min(self.limit)
    }

    /// Unconsumed bytes, uncapped.
    #[cfg(test)]
    pub(crate) fn total_queued(&self) -> usize {
        self.queued
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Removes up to `max_bytes` from the front chunk.
    ///
    /// Returns `None` when the queue is empty or `max_bytes` is zero.
    pub(crate) fn dequeue(&mut self, max_bytes: usize) -> Option<Dequeued> {
        if max_bytes == 0 {
            return None;
        }
        let front = self.chunks.front_mut()?;
        let bytes = front.take(max_bytes);
        let spec = *front.spec();
        let map = front.map().cloned();

        let mut flush = false;
        if front.is_consumed() {
            flush = front.is_flush_point();
            if let Some(done) = self.chunks.pop_front() {
                self.completed.extend(done.into_completion());
            }
        }
        self.queued -= bytes.len();

        Some(Dequeued {
            bytes,
            spec,
            map,
            flush,
        })
    }

    /// Marks the current end of the queue as a flush point.
    ///
    /// Returns `false` if the queue is empty and there is nothing to mark.
    pub(crate) fn mark_flush(&mut self) -> bool {
        match self.chunks.back_mut() {
            Some(last) => {
                last.mark_flush();
                true
            }
            None => false,
        }
    }

    /// Drops every queued chunk. Owned buffers move to the completion list.
    pub(crate) fn clear(&mut self) {
        let done = self.chunks.drain(..).filter_map(PendingChunk::into_completion);
        self.completed.extend(done);
        self.queued = 0;
    }

    /// Takes the completions of buffers the queue no longer needs.
    pub(crate) fn take_completed(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completed)
    }

    /// Iterates over queued chunks from oldest to newest.
    pub(crate) fn chunks(&self) -> impl Iterator<Item = &PendingChunk> {
        self.chunks.iter()
    }
}
