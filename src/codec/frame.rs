use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::utils::error::{DecodeError, EncodeError};

const HEADER_LEN: usize = 4;
/// Upper bound on the space reserved ahead of a body; larger bodies grow the
/// buffer as their bytes arrive.
const MAX_RESERVE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Header,
    Body(usize),
}

/// Length-delimited frames: a big-endian `int32` byte count followed by
/// exactly that many payload bytes.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    state: DecodeState,
    max_size: usize,
}

impl FrameCodec {
    /// Create a `FrameCodec` with no frame size limit.
    pub fn new() -> Self {
        FrameCodec::with_max_size(0)
    }

    /// Create a `FrameCodec` that rejects frames above `max_size` bytes.
    /// Zero disables the limit.
    pub fn with_max_size(max_size: usize) -> Self {
        FrameCodec {
            state: DecodeState::Header,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn check_size(&self, size: usize) -> Result<(), DecodeError> {
        if self.max_size != 0 && size > self.max_size {
            return Err(DecodeError::FrameTooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let len = src.get_i32();
                    if len < 0 {
                        return Err(DecodeError::InvalidLength(len));
                    }
                    let len = len as usize;
                    self.check_size(len)?;
                    src.reserve(len.min(MAX_RESERVE));
                    self.state = DecodeState::Body(len);
                }
                DecodeState::Body(len) => {
                    if src.len() < len {
                        return Ok(None);
                    }
                    self.state = DecodeState::Header;
                    return Ok(Some(src.split_to(len).freeze()));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && matches!(self.state, DecodeState::Header) => Ok(None),
            // the peer went away part way through a length or a body
            None => Err(DecodeError::EndOfStream),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = EncodeError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = i32::try_from(item.len()).map_err(|_| EncodeError::TooLarge(item.len()))?;
        dst.reserve(HEADER_LEN + item.len());
        dst.put_i32(len);
        dst.put(item);
        Ok(())
    }
}
