//! Stream callbacks.
//!
//! A stream can notify user code when data is about to be pulled (the *get*
//! callback) or has just been pushed (the *put* callback). Callbacks run
//! synchronously on the thread that triggered them, while that thread holds
//! the stream lock, so they can push or pull on the same stream without
//! deadlocking. Keep them short: a device thread waiting on a pull is
//! delayed by whatever the callback does.

use std::sync::Arc;

use crate::AudioStream;

/// Callback invoked with `(stream, additional, total)`.
///
/// Both amounts are in bytes of the stream's *source* format.
///
/// - Get callback: `additional` is an estimate of how many bytes must still be
///   pushed to satisfy the pull in progress (may be zero), `total` what the
///   whole request corresponds to.
/// - Put callback: both are the number of bytes just pushed.
///
/// A get callback does not re-fire while another get callback of the same
/// stream is running further up the stack, and the same holds for put
/// callbacks. A push made from a get callback still runs the put callback.
///
/// # Example
///
/// ```
/// use pcm_stream::{AudioStream, AudioSpec, SampleFormat, stream_callback};
///
/// let spec = AudioSpec::new(SampleFormat::S16LE, 1, 16000);
/// let stream = AudioStream::new(Some(spec), Some(spec)).unwrap();
///
/// stream.set_get_callback(Some(stream_callback(|stream, additional, _total| {
///     let _ = stream.push(&vec![0u8; additional]);
/// })));
///
/// let pulled = stream.pull(320).unwrap();
/// assert_eq!(pulled.bytes.len(), 320);
/// ```
pub type StreamCallback = Arc<dyn Fn(&AudioStream, usize, usize) + Send + Sync>;

/// Creates a [`StreamCallback`] from a closure.
///
/// This is a convenience function for creating callbacks without manually
/// wrapping in `Arc`.
pub fn stream_callback<F>(f: F) -> StreamCallback
where
    F: Fn(&AudioStream, usize, usize) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Creates a [`StreamCallback`] from a plain function and a context value.
///
/// The context is moved into the callback and handed to `f` by reference on
/// every call. Useful when the callback logic is a named function rather than
/// a closure.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use pcm_stream::{callback_with_context, AudioStream};
///
/// fn count_bytes(total: &Arc<AtomicUsize>, _: &AudioStream, added: usize, _: usize) {
///     total.fetch_add(added, Ordering::Relaxed);
/// }
///
/// let total = Arc::new(AtomicUsize::new(0));
/// let callback = callback_with_context(total.clone(), count_bytes);
/// ```
pub fn callback_with_context<C, F>(context: C, f: F) -> StreamCallback
where
    C: Send + Sync + 'static,
    F: Fn(&C, &AudioStream, usize, usize) + Send + Sync + 'static,
{
    Arc::new(move |stream, additional, total| f(&context, stream, additional, total))
}

/// Callback run once a buffer queued with
/// [`AudioStream::push_owned`](crate::AudioStream::push_owned) is no longer
/// needed.
///
/// It receives the buffer back, whether the data was pulled in full, cleared,
/// or dropped with the stream. It runs while the stream lock is held.
pub type DataComplete = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Creates a [`DataComplete`] from a closure.
pub fn data_complete<F>(f: F) -> DataComplete
where
    F: FnOnce(Vec<u8>) + Send + 'static,
{
    Box::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioSpec, SampleFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stream() -> AudioStream {
        let spec = AudioSpec::new(SampleFormat::S16LE, 1, 16000);
        AudioStream::new(Some(spec), Some(spec)).unwrap()
    }

    #[test]
    fn test_stream_callback_helper() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let callback = stream_callback(move |_, additional, total| {
            assert_eq!(additional, 4);
            assert_eq!(total, 8);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        callback(&stream(), 4, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_with_context_passes_context() {
        fn record(seen: &Arc<AtomicUsize>, _: &AudioStream, additional: usize, _: usize) {
            seen.store(additional, Ordering::SeqCst);
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let callback = callback_with_context(seen.clone(), record);
        callback(&stream(), 42, 42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_data_complete_returns_buffer() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let done = data_complete(move |buffer| {
            seen_clone.store(buffer.len(), Ordering::SeqCst);
        });
        done(vec![0u8; 12]);
        assert_eq!(seen.load(Ordering::SeqCst), 12);
    }
}
