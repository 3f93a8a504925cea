//! Length-prefixed framing for lobby messages.
//!
//! Every frame is a 4-byte big-endian body length followed by the body, a
//! UTF-8 JSON document. The prefix makes partial reads resumable: the decoder
//! returns `Ok(None)` until a whole frame is buffered.

use std::io;
use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the frame length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Errors raised while turning bytes back into messages.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream or slice ended in the middle of a frame
    #[error("Truncated frame: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    /// The length prefix announces more than the configured limit
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// Bytes left over after a complete frame
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// The body is not a valid message
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Frame codec decoding `D` and encoding any serializable message.
///
/// The frame limit is off by default; the server turns it on as part of its
/// admission policy.
pub struct FrameCodec<D> {
    max_frame_len: Option<usize>,
    _decodes: PhantomData<fn() -> D>,
}

impl<D> FrameCodec<D> {
    pub fn new() -> Self {
        Self {
            max_frame_len: None,
            _decodes: PhantomData,
        }
    }

    /// Reject frames whose body is longer than `max` bytes.
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            max_frame_len: Some(max),
            _decodes: PhantomData,
        }
    }

    pub fn max_frame_len(&self) -> Option<usize> {
        self.max_frame_len
    }
}

impl<D> Default for FrameCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for FrameCodec<D> {
    fn clone(&self) -> Self {
        Self {
            max_frame_len: self.max_frame_len,
            _decodes: PhantomData,
        }
    }
}

impl<D> std::fmt::Debug for FrameCodec<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("max_frame_len", &self.max_frame_len)
            .finish()
    }
}

/// Body length announced by a buffered prefix, if the prefix is complete.
fn announced_len(src: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_BYTES] = src.get(..LENGTH_PREFIX_BYTES)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

impl<D: DeserializeOwned> Decoder for FrameCodec<D> {
    type Item = D;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, DecodeError> {
        let Some(len) = announced_len(src) else {
            return Ok(None);
        };
        if let Some(max) = self.max_frame_len {
            if len > max {
                return Err(DecodeError::FrameTooLarge { len, max });
            }
        }

        let total = LENGTH_PREFIX_BYTES + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        let body = src.split_to(len);
        Ok(Some(serde_json::from_slice(&body)?))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<D>, DecodeError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => {
                let expected = announced_len(buf)
                    .map(|len| LENGTH_PREFIX_BYTES + len)
                    .unwrap_or(LENGTH_PREFIX_BYTES);
                Err(DecodeError::Truncated {
                    expected,
                    available: buf.len(),
                })
            }
        }
    }
}

impl<D, E: Serialize> Encoder<E> for FrameCodec<D> {
    type Error = io::Error;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> io::Result<()> {
        let body = serde_json::to_vec(&item)?;
        let len = u32::try_from(body.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "frame body does not fit a 32-bit length prefix",
            )
        })?;
        dst.reserve(LENGTH_PREFIX_BYTES + body.len());
        dst.put_u32(len);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Encode one message as a complete frame.
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    FrameCodec::<()>::new().encode(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode exactly one complete frame from `bytes`.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut buf = BytesMut::from(bytes);
    match FrameCodec::<T>::new().decode_eof(&mut buf)? {
        Some(message) if buf.is_empty() => Ok(message),
        Some(_) => Err(DecodeError::TrailingBytes(buf.len())),
        None => Err(DecodeError::Truncated {
            expected: LENGTH_PREFIX_BYTES,
            available: 0,
        }),
    }
}
