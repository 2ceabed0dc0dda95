//! Big-endian ("network order") primitives shared by the value codec and the
//! protocol messages.
//!
//! Strings and raw byte blocks are written as an `int32` length followed by
//! the bytes. Booleans are one byte; any non-zero byte reads as `true`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::utils::error::{DecodeError, EncodeError};

macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e);
        }
    };
}

pub(crate) use ensure;

pub(crate) trait Decode: Sized {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError>;
}

pub(crate) trait Encode {
    fn encoded_size(&self) -> usize;

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError>;
}

macro_rules! fixed_width {
    ($ty:ty, $width:expr, $get:ident, $put:ident) => {
        impl Decode for $ty {
            fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
                ensure!(src.remaining() >= $width, DecodeError::Truncated);
                Ok(src.$get())
            }
        }

        impl Encode for $ty {
            fn encoded_size(&self) -> usize {
                $width
            }

            fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
                dst.$put(*self);
                Ok(())
            }
        }
    };
}

fixed_width!(u8, 1, get_u8, put_u8);
fixed_width!(u16, 2, get_u16, put_u16);
fixed_width!(i16, 2, get_i16, put_i16);
fixed_width!(i32, 4, get_i32, put_i32);
fixed_width!(i64, 8, get_i64, put_i64);
fixed_width!(f32, 4, get_f32, put_f32);

// Doubles travel as the int64 bit pattern, which is the same big-endian
// layout as the IEEE 754 bits.
fixed_width!(f64, 8, get_f64, put_f64);

impl Decode for bool {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(u8::decode(src)? != 0)
    }
}

impl Encode for bool {
    fn encoded_size(&self) -> usize {
        1
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u8(u8::from(*self));
        Ok(())
    }
}

/// Reads an `int32` length, rejecting negative values and lengths that run
/// past the end of `src`.
pub(crate) fn decode_length(src: &mut Bytes) -> Result<usize, DecodeError> {
    let len = i32::decode(src)?;
    ensure!(len >= 0, DecodeError::InvalidLength(len));
    Ok(len as usize)
}

pub(crate) fn encode_length(len: usize, dst: &mut BytesMut) -> Result<(), EncodeError> {
    let len = i32::try_from(len).map_err(|_| EncodeError::TooLarge(len))?;
    dst.put_i32(len);
    Ok(())
}

impl Decode for Bytes {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let len = decode_length(src)?;
        ensure!(src.remaining() >= len, DecodeError::Truncated);
        Ok(src.split_to(len))
    }
}

impl Encode for Bytes {
    fn encoded_size(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        encode_length(self.len(), dst)?;
        dst.put_slice(self);
        Ok(())
    }
}

impl Decode for String {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let raw = Bytes::decode(src)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl Encode for str {
    fn encoded_size(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        encode_length(self.len(), dst)?;
        dst.put_slice(self.as_bytes());
        Ok(())
    }
}

impl Encode for String {
    fn encoded_size(&self) -> usize {
        self.as_str().encoded_size()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        self.as_str().encode(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut buf = BytesMut::new();
        0x0102_0304i32.encode(&mut buf).unwrap();
        0x0506i16.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn double_matches_int64_bit_pattern() {
        let mut via_double = BytesMut::new();
        140.65f64.encode(&mut via_double).unwrap();

        let mut via_bits = BytesMut::new();
        (140.65f64.to_bits() as i64).encode(&mut via_bits).unwrap();

        assert_eq!(via_double, via_bits);
    }

    #[test]
    fn string_is_length_prefixed_utf8() {
        let mut buf = BytesMut::new();
        "é".encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 2, 0xc3, 0xa9]);

        let mut src = buf.freeze();
        assert_eq!(String::decode(&mut src).unwrap(), "é");
        assert!(src.is_empty());
    }

    #[test]
    fn any_non_zero_byte_is_true() {
        let mut src = Bytes::from_static(&[0, 1, 7]);
        assert!(!bool::decode(&mut src).unwrap());
        assert!(bool::decode(&mut src).unwrap());
        assert!(bool::decode(&mut src).unwrap());
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut src = Bytes::from_static(&[0xff, 0xff, 0xff, 0xfe]);
        assert!(matches!(
            String::decode(&mut src),
            Err(DecodeError::InvalidLength(-2))
        ));
    }

    #[test]
    fn short_input_is_truncated() {
        let mut src = Bytes::from_static(&[0, 0, 0, 5, b'a']);
        assert!(matches!(String::decode(&mut src), Err(DecodeError::Truncated)));

        let mut src = Bytes::from_static(&[0, 1]);
        assert!(matches!(i32::decode(&mut src), Err(DecodeError::Truncated)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut src = Bytes::from_static(&[0, 0, 0, 1, 0xff]);
        assert!(matches!(String::decode(&mut src), Err(DecodeError::InvalidUtf8)));
    }
}
