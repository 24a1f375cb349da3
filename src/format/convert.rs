//! Sample encoding and channel-count conversion.
//!
//! Samples are normalized to `f64` in `[-1.0, 1.0)` for integer formats
//! (unsigned data is re-centered on zero first). Float samples pass through
//! unscaled. Re-quantizing to an integer format clamps; re-quantizing to a float
//! format does not.

use crate::format::SampleFormat;
use crate::StreamError;

const SCALE_8: f64 = 128.0;
const SCALE_16: f64 = 32768.0;
const SCALE_32: f64 = 2_147_483_648.0;

/// Decodes `bytes` in `format` and appends the normalized samples to `out`.
///
/// Trailing bytes that do not form a whole sample are ignored; callers check
/// frame alignment beforehand.
pub fn decode_samples(format: SampleFormat, bytes: &[u8], out: &mut Vec<f64>) {
    let width = format.byte_size();
    out.reserve(bytes.len() / width);

    match width {
        1 => {
            if format.is_signed() {
                out.extend(bytes.iter().map(|&b| f64::from(b as i8) / SCALE_8));
            } else {
                out.extend(bytes.iter().map(|&b| (f64::from(b) - SCALE_8) / SCALE_8));
            }
        }
        2 => {
            for raw in bytes.chunks_exact(2) {
                let raw = [raw[0], raw[1]];
                let v = if format.is_big_endian() {
                    u16::from_be_bytes(raw)
                } else {
                    u16::from_le_bytes(raw)
                };
                let sample = if format.is_signed() {
                    f64::from(v as i16) / SCALE_16
                } else {
                    (f64::from(v) - SCALE_16) / SCALE_16
                };
                out.push(sample);
            }
        }
        _ => {
            for raw in bytes.chunks_exact(4) {
                let raw = [raw[0], raw[1], raw[2], raw[3]];
                let v = if format.is_big_endian() {
                    u32::from_be_bytes(raw)
                } else {
                    u32::from_le_bytes(raw)
                };
                let sample = if format.is_float() {
                    f64::from(f32::from_bits(v))
                } else if format.is_signed() {
                    f64::from(v as i32) / SCALE_32
                } else {
                    (f64::from(v) - SCALE_32) / SCALE_32
                };
                out.push(sample);
            }
        }
    }
}

/// Quantizes a normalized sample to a signed integer of the given scale.
#[inline]
fn quantize(sample: f64, scale: f64) -> i64 {
    // NaN clamps to NaN and then casts to 0.
    (sample * scale).round().clamp(-scale, scale - 1.0) as i64
}

/// Encodes normalized samples into `format`, appending the bytes to `out`.
pub fn encode_samples(format: SampleFormat, samples: &[f64], out: &mut Vec<u8>) {
    out.reserve(samples.len() * format.byte_size());
    let unsigned = format.is_unsigned();
    let big_endian = format.is_big_endian();

    match format.byte_size() {
        1 => {
            for &s in samples {
                let q = quantize(s, SCALE_8);
                let byte = if unsigned { (q + 128) as u8 } else { q as i8 as u8 };
                out.push(byte);
            }
        }
        2 => {
            for &s in samples {
                let q = quantize(s, SCALE_16);
                let v = if unsigned { (q + 32768) as u16 } else { q as i16 as u16 };
                if big_endian {
                    out.extend_from_slice(&v.to_be_bytes());
                } else {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        _ => {
            for &s in samples {
                let v = if format.is_float() {
                    (s as f32).to_bits()
                } else {
                    let q = quantize(s, SCALE_32);
                    if unsigned {
                        (q + 2_147_483_648) as u32
                    } else {
                        q as i32 as u32
                    }
                };
                if big_endian {
                    out.extend_from_slice(&v.to_be_bytes());
                } else {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
    }
}

/// Converts a block of interleaved samples from one encoding to another.
///
/// The channel count and sample rate are left untouched. `src` must hold a
/// whole number of frames of `channels` samples each.
///
/// # Example
///
/// ```
/// use pcm_stream::format::convert_block;
/// use pcm_stream::SampleFormat;
///
/// let src = [0x00u8, 0x40]; // 16384 as S16LE
/// let out = convert_block(SampleFormat::S16LE, &src, SampleFormat::S16BE, 1).unwrap();
/// assert_eq!(out, vec![0x40, 0x00]);
/// ```
pub fn convert_block(
    src_format: SampleFormat,
    src: &[u8],
    dst_format: SampleFormat,
    channels: usize,
) -> Result<Vec<u8>, StreamError> {
    let frame = src_format.byte_size() * channels;
    if frame == 0 || src.len() % frame != 0 {
        return Err(StreamError::format(format!(
            "length {} is not a multiple of frame size {frame} ({src_format}, {channels}ch)",
            src.len()
        )));
    }

    if src_format == dst_format {
        return Ok(src.to_vec());
    }

    let same_except_order = src_format.bit_size() == dst_format.bit_size()
        && src_format.is_float() == dst_format.is_float()
        && src_format.is_signed() == dst_format.is_signed();
    if same_except_order {
        let width = src_format.byte_size();
        let mut out = Vec::with_capacity(src.len());
        for sample in src.chunks_exact(width) {
            out.extend(sample.iter().rev());
        }
        return Ok(out);
    }

    let mut samples = Vec::new();
    decode_samples(src_format, src, &mut samples);
    let mut out = Vec::with_capacity(samples.len() * dst_format.byte_size());
    encode_samples(dst_format, &samples, &mut out);
    Ok(out)
}

/// Converts interleaved samples between channel counts.
///
/// - Same count: copied.
/// - Down to mono: channels are averaged.
/// - Up from mono: the sample is duplicated to every channel.
/// - Down to fewer channels: channel `i` is folded into `i % dst` and averaged.
/// - Up to more channels: existing channels are copied, the rest stay silent.
pub fn convert_channels(samples: &[f64], src_channels: usize, dst_channels: usize) -> Vec<f64> {
    if src_channels == dst_channels || src_channels == 0 || dst_channels == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / src_channels;
    let mut out = Vec::with_capacity(frames * dst_channels);

    if dst_channels == 1 {
        let n = src_channels as f64;
        out.extend(
            samples
                .chunks_exact(src_channels)
                .map(|frame| frame.iter().sum::<f64>() / n),
        );
    } else if src_channels == 1 {
        for &s in samples {
            out.extend(std::iter::repeat(s).take(dst_channels));
        }
    } else if dst_channels < src_channels {
        let mut counts = vec![0.0f64; dst_channels];
        for i in 0..src_channels {
            counts[i % dst_channels] += 1.0;
        }
        for frame in samples.chunks_exact(src_channels) {
            let start = out.len();
            out.resize(start + dst_channels, 0.0);
            for (i, &s) in frame.iter().enumerate() {
                out[start + i % dst_channels] += s;
            }
            for (slot, count) in out[start..].iter_mut().zip(&counts) {
                *slot /= count;
            }
        }
    } else {
        for frame in samples.chunks_exact(src_channels) {
            out.extend_from_slice(frame);
            out.extend(std::iter::repeat(0.0).take(dst_channels - src_channels));
        }
    }

    out
}
