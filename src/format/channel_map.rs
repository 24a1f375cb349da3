//! Channel reordering and muting.

use std::sync::Arc;

use crate::StreamError;

/// A per-channel reorder/mute table.
///
/// Entry `i` names the source channel that feeds channel `i`, or `-1` to mute
/// it. `[1, 0]` swaps a stereo pair and `[1, 1]` copies the right channel
/// to both sides. A map never changes the channel count or the sample width.
///
/// The table is reference-counted so queued chunks can keep the map that was
/// active when they were pushed without copying it.
///
/// # Example
///
/// ```
/// use pcm_stream::ChannelMap;
///
/// let swap = ChannelMap::new(&[1, 0], 2).unwrap();
/// let out = swap.remap_bytes(&[1, 2, 3, 4], 1, &[0]);
/// assert_eq!(out, vec![2, 1, 4, 3]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap(Arc<[i32]>);

impl ChannelMap {
    /// Builds a map for a spec with `channels` channels.
    ///
    /// Fails with [`StreamError::ChannelCountMismatch`] if the map length differs
    /// from `channels`, and with [`StreamError::Range`] if an entry is neither
    /// `-1` nor a valid channel index.
    pub fn new(entries: &[i32], channels: usize) -> Result<Self, StreamError> {
        if entries.len() != channels {
            return Err(StreamError::ChannelCountMismatch {
                expected: channels,
                actual: entries.len(),
            });
        }
        if let Some(&bad) = entries
            .iter()
            .find(|&&e| e < -1 || e >= channels as i32)
        {
            return Err(StreamError::range(
                "channel map entry",
                bad,
                "-1 or a channel index below the channel count",
            ));
        }
        Ok(Self(entries.into()))
    }

    /// Number of channels the map covers.
    pub fn channels(&self) -> usize {
        self.0.len()
    }

    /// The raw table.
    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    /// Returns `true` if the map leaves every channel in place.
    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &e)| e == i as i32)
    }

    /// Applies the map to interleaved raw samples.
    ///
    /// `sample_size` is the width of one sample in bytes and `silence` the byte
    /// pattern of one silent sample. Trailing bytes that do not form a whole frame
    /// are dropped.
    pub fn remap_bytes(&self, data: &[u8], sample_size: usize, silence: &[u8]) -> Vec<u8> {
        let channels = self.channels();
        let frame = sample_size * channels;
        if frame == 0 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(data.len() - data.len() % frame);
        for src in data.chunks_exact(frame) {
            for &entry in self.0.iter() {
                match usize::try_from(entry) {
                    Ok(ch) => {
                        let start = ch * sample_size;
                        out.extend_from_slice(&src[start..start + sample_size]);
                    }
                    Err(_) => out.extend_from_slice(silence),
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_must_match_channels() {
        let err = ChannelMap::new(&[0, 1, 2], 2).unwrap_err();
        assert_eq!(
            err,
            StreamError::ChannelCountMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_entries_must_be_in_range() {
        assert!(matches!(
            ChannelMap::new(&[0, 2], 2),
            Err(StreamError::Range { .. })
        ));
        assert!(matches!(
            ChannelMap::new(&[-2, 0], 2),
            Err(StreamError::Range { .. })
        ));
        assert!(ChannelMap::new(&[-1, -1], 2).is_ok());
    }

    #[test]
    fn test_identity() {
        assert!(ChannelMap::new(&[0, 1, 2], 3).unwrap().is_identity());
        assert!(!ChannelMap::new(&[0, 0, 2], 3).unwrap().is_identity());
    }

    #[test]
    fn test_duplicate_channel() {
        let map = ChannelMap::new(&[1, 1], 2).unwrap();
        // S16LE stereo frame: L = 0x0101, R = 0x0202
        let out = map.remap_bytes(&[1, 1, 2, 2], 2, &[0, 0]);
        assert_eq!(out, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_mute_writes_silence_value() {
        let map = ChannelMap::new(&[0, -1], 2).unwrap();
        // U8 stereo, two frames
        let out = map.remap_bytes(&[10, 20, 30, 40], 1, &[0x80]);
        assert_eq!(out, vec![10, 0x80, 30, 0x80]);
    }

    #[test]
    fn test_partial_frame_is_dropped() {
        let map = ChannelMap::new(&[1, 0], 2).unwrap();
        let out = map.remap_bytes(&[1, 2, 3], 1, &[0]);
        assert_eq!(out, vec![2, 1]);
    }
}
