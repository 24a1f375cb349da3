//! Sample encodings and their size/sign/endianness arithmetic.

use std::fmt;

use crate::StreamError;

const MASK_BIT_SIZE: u16 = 0x00FF;
const MASK_FLOAT: u16 = 1 << 8;
const MASK_BIG_ENDIAN: u16 = 1 << 12;
const MASK_SIGNED: u16 = 1 << 15;

/// Encoding of a single PCM sample.
///
/// A format is a bit width (8, 16 or 32), an integer/float flag, a signedness
/// flag and a byte order. Float formats are always signed 32-bit.
///
/// # Example
///
/// ```
/// use pcm_stream::SampleFormat;
///
/// let fmt = SampleFormat::S16LE;
/// assert_eq!(fmt.byte_size(), 2);
/// assert!(fmt.is_signed());
/// assert!(fmt.is_little_endian());
/// assert_eq!(SampleFormat::U8.silence_byte(), 0x80);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    bits: u8,
    float: bool,
    signed: bool,
    big_endian: bool,
}

impl SampleFormat {
    /// Unsigned 8-bit samples.
    pub const U8: Self = Self::new(8, false, false, false);
    /// Signed 8-bit samples.
    pub const S8: Self = Self::new(8, false, true, false);
    /// Signed 16-bit little-endian samples.
    pub const S16LE: Self = Self::new(16, false, true, false);
    /// Signed 16-bit big-endian samples.
    pub const S16BE: Self = Self::new(16, false, true, true);
    /// Signed 32-bit little-endian samples.
    pub const S32LE: Self = Self::new(32, false, true, false);
    /// Signed 32-bit big-endian samples.
    pub const S32BE: Self = Self::new(32, false, true, true);
    /// 32-bit little-endian float samples.
    pub const F32LE: Self = Self::new(32, true, true, false);
    /// 32-bit big-endian float samples.
    pub const F32BE: Self = Self::new(32, true, true, true);

    /// Signed 16-bit samples in native byte order.
    #[cfg(target_endian = "little")]
    pub const S16: Self = Self::S16LE;
    /// Signed 32-bit samples in native byte order.
    #[cfg(target_endian = "little")]
    pub const S32: Self = Self::S32LE;
    /// 32-bit float samples in native byte order.
    #[cfg(target_endian = "little")]
    pub const F32: Self = Self::F32LE;

    /// Signed 16-bit samples in native byte order.
    #[cfg(target_endian = "big")]
    pub const S16: Self = Self::S16BE;
    /// Signed 32-bit samples in native byte order.
    #[cfg(target_endian = "big")]
    pub const S32: Self = Self::S32BE;
    /// 32-bit float samples in native byte order.
    #[cfg(target_endian = "big")]
    pub const F32: Self = Self::F32BE;

    /// Builds a sample format.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not 8, 16 or 32, or if a float format is requested
    /// that is not signed 32-bit. A malformed format is a programming error.
    pub const fn new(bits: u8, float: bool, signed: bool, big_endian: bool) -> Self {
        assert!(
            bits == 8 || bits == 16 || bits == 32,
            "sample bit size must be 8, 16 or 32"
        );
        assert!(
            !float || (signed && bits == 32),
            "float samples must be signed 32-bit"
        );
        Self {
            bits,
            float,
            signed,
            big_endian,
        }
    }

    /// Decodes the packed 16-bit representation used by native audio APIs.
    ///
    /// The low byte holds the bit size; bit 8 flags float, bit 12 big-endian
    /// and bit 15 signed.
    pub fn from_raw(raw: u16) -> Result<Self, StreamError> {
        let bits = (raw & MASK_BIT_SIZE) as u8;
        let float = raw & MASK_FLOAT != 0;
        let signed = raw & MASK_SIGNED != 0;
        let big_endian = raw & MASK_BIG_ENDIAN != 0;
        let known = MASK_BIT_SIZE | MASK_FLOAT | MASK_BIG_ENDIAN | MASK_SIGNED;

        if raw & !known != 0 || !matches!(bits, 8 | 16 | 32) || (float && (!signed || bits != 32))
        {
            return Err(StreamError::format(format!(
                "unrecognized sample format 0x{raw:04X}"
            )));
        }
        Ok(Self {
            bits,
            float,
            signed,
            big_endian,
        })
    }

    /// Encodes this format in the packed 16-bit representation.
    pub const fn to_raw(self) -> u16 {
        let mut raw = self.bits as u16;
        if self.float {
            raw |= MASK_FLOAT;
        }
        if self.big_endian {
            raw |= MASK_BIG_ENDIAN;
        }
        if self.signed {
            raw |= MASK_SIGNED;
        }
        raw
    }

    /// Bits per sample.
    #[inline]
    pub const fn bit_size(self) -> u32 {
        self.bits as u32
    }

    /// Bytes per sample.
    #[inline]
    pub const fn byte_size(self) -> usize {
        self.bits as usize / 8
    }

    /// Returns `true` for floating-point samples.
    #[inline]
    pub const fn is_float(self) -> bool {
        self.float
    }

    /// Returns `true` for integer samples.
    #[inline]
    pub const fn is_int(self) -> bool {
        !self.float
    }

    /// Returns `true` for signed samples (all float formats are signed).
    #[inline]
    pub const fn is_signed(self) -> bool {
        self.signed
    }

    /// Returns `true` for unsigned samples.
    #[inline]
    pub const fn is_unsigned(self) -> bool {
        !self.signed
    }

    /// Returns `true` if multi-byte samples are stored most significant byte first.
    #[inline]
    pub const fn is_big_endian(self) -> bool {
        self.big_endian
    }

    /// Returns `true` if multi-byte samples are stored least significant byte first.
    #[inline]
    pub const fn is_little_endian(self) -> bool {
        !self.big_endian
    }

    /// Byte value that fills a buffer with silence in this format.
    ///
    /// This is `0x80` for 8-bit unsigned audio and `0x00` otherwise. Wider
    /// unsigned formats cannot be silenced with a single repeated byte; use
    /// [`silence_sample`](Self::silence_sample) for those.
    pub const fn silence_byte(self) -> u8 {
        if !self.signed && self.bits == 8 {
            0x80
        } else {
            0x00
        }
    }

    /// Byte pattern of one silent sample.
    pub fn silence_sample(self) -> Vec<u8> {
        let mut sample = vec![0u8; self.byte_size()];
        if !self.signed {
            // Mid-point: only the most significant bit is set.
            let msb = if self.big_endian { 0 } else { sample.len() - 1 };
            sample[msb] = 0x80;
        }
        sample
    }

    /// Short human-readable name, e.g. `S16LE` or `F32BE`.
    pub fn name(self) -> String {
        let kind = if self.float {
            'F'
        } else if self.signed {
            'S'
        } else {
            'U'
        };
        if self.bits == 8 {
            format!("{kind}8")
        } else {
            let order = if self.big_endian { "BE" } else { "LE" };
            format!("{kind}{}{order}", self.bits)
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<u16> for SampleFormat {
    type Error = StreamError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<SampleFormat> for u16 {
    fn from(format: SampleFormat) -> Self {
        format.to_raw()
    }
}
