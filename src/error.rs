//! Error types for pcm-stream.
//!
//! Every fallible operation returns a [`StreamError`] synchronously. The message
//! of the most recent failure on the calling thread is also kept around and can
//! be fetched with [`last_error()`], for callers bridging to an API that reports
//! errors out of band.

use std::cell::RefCell;

/// Errors reported by streams, converters and channel maps.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// A spec is missing or invalid, or a buffer length is not frame-aligned.
    #[error("format error: {reason}")]
    Format {
        /// What was wrong with the format or the data.
        reason: String,
    },

    /// A numeric parameter is outside its accepted domain.
    #[error("{what} out of range: {value} (expected {expected})")]
    Range {
        /// Name of the parameter.
        what: &'static str,
        /// The rejected value, formatted.
        value: String,
        /// Human-readable description of the accepted domain.
        expected: &'static str,
    },

    /// A channel map does not match the channel count of its spec.
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelCountMismatch {
        /// Channel count of the spec the map applies to.
        expected: usize,
        /// Length of the supplied map.
        actual: usize,
    },

    /// The stream is already bound to a device.
    #[error("stream already bound to device {device_id}; unbind it first")]
    Bind {
        /// Device the stream is currently bound to.
        device_id: u32,
    },

    /// A device operation was requested on a stream without a live device.
    #[error("stream is not bound to an audio device")]
    NotBound,
}

impl StreamError {
    /// Creates a format error with the given reason.
    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
        }
    }

    /// Creates a range error for `what`.
    pub fn range(what: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::Range {
            what,
            value: value.to_string(),
            expected,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Returns the message of the last error reported on this thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Forgets the last error reported on this thread.
pub fn clear_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
}

/// Records the error (if any) as this thread's last error and passes the result through.
pub(crate) fn record<T>(result: Result<T, StreamError>) -> Result<T, StreamError> {
    if let Err(ref err) = result {
        tracing::trace!(%err, "stream operation failed");
        LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.to_string()));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = StreamError::format("length 3 is not a multiple of frame size 2");
        assert_eq!(
            err.to_string(),
            "format error: length 3 is not a multiple of frame size 2"
        );
    }

    #[test]
    fn test_range_error_display() {
        let err = StreamError::range("frequency ratio", 200.0, "0.01..=100");
        assert_eq!(
            err.to_string(),
            "frequency ratio out of range: 200 (expected 0.01..=100)"
        );
    }

    #[test]
    fn test_channel_count_mismatch_display() {
        let err = StreamError::ChannelCountMismatch {
            expected: 2,
            actual: 3,
        };
        assert_eq!(err.to_string(), "channel count mismatch: expected 2, got 3");
    }

    #[test]
    fn test_record_sets_last_error() {
        clear_error();
        let result: Result<(), _> = record(Err(StreamError::NotBound));
        assert!(result.is_err());
        assert_eq!(
            last_error().as_deref(),
            Some("stream is not bound to an audio device")
        );

        clear_error();
        assert!(last_error().is_none());
    }

    #[test]
    fn test_record_ok_keeps_previous_error() {
        clear_error();
        let _ = record::<()>(Err(StreamError::NotBound));
        let ok = record(Ok(5));
        assert_eq!(ok, Ok(5));
        assert!(last_error().is_some());
    }
}
