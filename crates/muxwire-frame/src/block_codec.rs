use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{check_frame_length, DEFAULT_MAX_FRAME, LENGTH_PREFIX_SIZE};
use crate::error::{FrameError, Result};

/// Splits a byte stream into whole blocks for `FramedRead`/`FramedWrite`.
///
/// Decoded items are complete blocks including the length prefix, ready for
/// the accessors in [`crate::codec`].
#[derive(Debug, Clone)]
pub struct BlockCodec {
    max_frame_size: usize,
}

impl BlockCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl Decoder for BlockCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let frame_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        check_frame_length(frame_len, self.max_frame_size)?;

        let total = LENGTH_PREFIX_SIZE + frame_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(total).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(block) = self.decode(src)? {
            return Ok(Some(block));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let expected = if src.len() < LENGTH_PREFIX_SIZE {
            LENGTH_PREFIX_SIZE
        } else {
            LENGTH_PREFIX_SIZE + u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize
        };
        let actual = src.len();
        src.clear();
        Err(FrameError::Truncated { expected, actual })
    }
}

impl Encoder<Bytes> for BlockCodec {
    type Error = FrameError;

    fn encode(&mut self, block: Bytes, dst: &mut BytesMut) -> Result<()> {
        let frame_len = block.len().saturating_sub(LENGTH_PREFIX_SIZE);
        if frame_len > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: frame_len,
                max: self.max_frame_size,
            });
        }
        dst.extend_from_slice(&block);
        Ok(())
    }
}
