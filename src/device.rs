//! Logical audio device descriptors.
//!
//! An [`AudioDevice`] is the handle streams bind to. It carries the device's
//! id, direction, name and hardware spec plus a paused flag. It performs no
//! I/O: whoever drives the hardware reads the descriptor and calls
//! [`AudioStream::pull`](crate::AudioStream::pull) (playback) or
//! [`AudioStream::push`](crate::AudioStream::push) (recording) at its own
//! cadence.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::format::AudioSpec;
use crate::StreamError;

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique device identifier. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(NonZeroU32);

impl DeviceId {
    fn next() -> Self {
        let raw = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        // Wrapped around to zero after 2^32 devices; skip it.
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    /// Returns the raw id.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Consumes audio; bound streams are pulled from.
    Playback,
    /// Produces audio; bound streams are pushed into.
    Recording,
}

/// A logical audio device.
///
/// Create one with [`AudioDevice::playback`] or [`AudioDevice::recording`]
/// and share it with `Arc`. Streams keep only a weak reference, so dropping
/// the last `Arc` leaves bound streams with a dangling binding that reports
/// [`StreamError::NotBound`] for device operations.
///
/// # Example
///
/// ```
/// use pcm_stream::{AudioDevice, DeviceKind, FormatPreset};
///
/// let device = AudioDevice::playback("speakers", FormatPreset::Studio.spec()).unwrap();
/// assert_eq!(device.kind(), DeviceKind::Playback);
/// assert!(!device.is_paused());
/// ```
#[derive(Debug)]
pub struct AudioDevice {
    id: DeviceId,
    kind: DeviceKind,
    name: Arc<str>,
    spec: AudioSpec,
    paused: AtomicBool,
}

impl AudioDevice {
    /// Creates a device descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Format`] if the spec has zero channels or frequency.
    pub fn new(
        kind: DeviceKind,
        name: impl Into<Arc<str>>,
        spec: AudioSpec,
    ) -> Result<Arc<Self>, StreamError> {
        spec.validate()?;
        let device = Self {
            id: DeviceId::next(),
            kind,
            name: name.into(),
            spec,
            paused: AtomicBool::new(false),
        };
        tracing::debug!(id = %device.id, ?kind, name = %device.name, %spec, "device created");
        Ok(Arc::new(device))
    }

    /// Creates a playback device descriptor.
    pub fn playback(name: impl Into<Arc<str>>, spec: AudioSpec) -> Result<Arc<Self>, StreamError> {
        Self::new(DeviceKind::Playback, name, spec)
    }

    /// Creates a recording device descriptor.
    pub fn recording(
        name: impl Into<Arc<str>>,
        spec: AudioSpec,
    ) -> Result<Arc<Self>, StreamError> {
        Self::new(DeviceKind::Recording, name, spec)
    }

    /// Returns the device id.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Returns the direction.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hardware spec.
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Returns `true` for playback devices.
    pub fn is_playback(&self) -> bool {
        self.kind == DeviceKind::Playback
    }

    /// Stops the device from driving its bound streams.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            tracing::debug!(id = %self.id, "device paused");
        }
    }

    /// Lets the device drive its bound streams again.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            tracing::debug!(id = %self.id, "device resumed");
        }
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}
