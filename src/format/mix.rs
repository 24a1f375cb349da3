//! Mixing one PCM buffer into another.

use crate::format::{decode_samples, encode_samples, SampleFormat};
use crate::StreamError;

/// Adds `src`, scaled by `volume`, into the first `src.len()` bytes of `dst`.
///
/// Both buffers hold samples in `format`. The sum is clipped to the format's
/// range; float results are clipped to `[-1.0, 1.0]`. A volume of `0.0` leaves
/// `dst` untouched.
///
/// # Example
///
/// ```
/// use pcm_stream::format::mix_audio;
/// use pcm_stream::SampleFormat;
///
/// let mut dst = 1000i16.to_le_bytes().to_vec();
/// let src = 500i16.to_le_bytes();
/// mix_audio(&mut dst, &src, SampleFormat::S16LE, 1.0).unwrap();
/// assert_eq!(dst, 1500i16.to_le_bytes());
/// ```
pub fn mix_audio(
    dst: &mut [u8],
    src: &[u8],
    format: SampleFormat,
    volume: f32,
) -> Result<(), StreamError> {
    if volume.is_nan() || volume < 0.0 {
        return Err(StreamError::range("mix volume", volume, "a non-negative number"));
    }
    if src.len() % format.byte_size() != 0 {
        return Err(StreamError::format(format!(
            "length {} is not a multiple of sample size {} ({format})",
            src.len(),
            format.byte_size()
        )));
    }
    if dst.len() < src.len() {
        return Err(StreamError::format(format!(
            "destination holds {} bytes, source {}",
            dst.len(),
            src.len()
        )));
    }
    if volume == 0.0 || src.is_empty() {
        return Ok(());
    }

    let target = &mut dst[..src.len()];
    let mut mixed = Vec::new();
    decode_samples(format, target, &mut mixed);
    let mut incoming = Vec::new();
    decode_samples(format, src, &mut incoming);

    let volume = f64::from(volume);
    for (acc, s) in mixed.iter_mut().zip(&incoming) {
        *acc += s * volume;
        if format.is_float() {
            *acc = acc.clamp(-1.0, 1.0);
        }
    }

    let mut encoded = Vec::with_capacity(src.len());
    encode_samples(format, &mixed, &mut encoded);
    target.copy_from_slice(&encoded);
    Ok(())
}
