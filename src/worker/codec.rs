//! Framing for the persistent worker channel.
//!
//! Requests go out as one JSON record per line. Responses come back as raw
//! bytes ending in a configured delimiter; the delimiter is stripped. A
//! response that outgrows the limit before its delimiter arrives is an error,
//! which bounds memory per exchange.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::http::Environment;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("response exceeded {limit} bytes without a delimiter")]
    TooLarge { limit: usize },
    #[error("failed to serialize environment: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Encodes an [`Environment`] as a newline-terminated JSON record.
#[derive(Debug, Default)]
pub struct EnvironmentEncoder;

impl Encoder<Environment> for EnvironmentEncoder {
    type Error = CodecError;

    fn encode(&mut self, env: Environment, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire = env.to_wire()?;
        tracing::trace!(record_bytes = wire.len(), "Encoding environment");
        dst.reserve(wire.len());
        dst.put_slice(&wire);
        Ok(())
    }
}

/// Splits worker output on a delimiter, bounded by `max_length`.
#[derive(Debug)]
pub struct ResponseDecoder {
    delimiter: Vec<u8>,
    max_length: usize,
    /// Bytes already searched without finding a delimiter.
    searched: usize,
}

impl ResponseDecoder {
    /// An empty delimiter falls back to `\n`.
    pub fn new(delimiter: impl Into<Vec<u8>>, max_length: usize) -> Self {
        let mut delimiter = delimiter.into();
        if delimiter.is_empty() {
            delimiter.push(b'\n');
        }
        Self {
            delimiter,
            max_length,
            searched: 0,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self
            .searched
            .saturating_sub(self.delimiter.len() - 1)
            .min(src.len());
        let found = src[start..]
            .windows(self.delimiter.len())
            .position(|w| w == self.delimiter.as_slice())
            .map(|pos| start + pos);

        match found {
            Some(end) if end > self.max_length => Err(CodecError::TooLarge {
                limit: self.max_length,
            }),
            Some(end) => {
                self.searched = 0;
                let frame = src.split_to(end);
                src.advance(self.delimiter.len());
                Ok(Some(frame))
            }
            None if src.len() > self.max_length => Err(CodecError::TooLarge {
                limit: self.max_length,
            }),
            None => {
                self.searched = src.len();
                Ok(None)
            }
        }
    }

    /// At end of stream, an unterminated tail is still a response.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                self.searched = 0;
                Ok(Some(src.split_to(src.len())))
            }
        }
    }
}
