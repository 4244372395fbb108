//! Framed multipart codec for bus sockets.
//!
//! Uses LengthDelimitedCodec for the outer frame; inside a frame, each part
//! is a 4-byte big-endian length followed by that many bytes. Envelope
//! parsing happens above this layer so one malformed payload never poisons
//! the stream - the decoder only fails on transport-level corruption
//! (truncated parts), which is a real fault.

use std::io;

use tokio_util::bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::envelope::Envelope;

/// Codec producing the raw parts of one bus frame.
pub struct MultipartCodec {
    inner: LengthDelimitedCodec,
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .new_codec(),
        }
    }
}

impl Decoder for MultipartCodec {
    type Item = Vec<Bytes>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(mut frame) = self.inner.decode(src)? else {
            return Ok(None);
        };

        let mut parts = Vec::new();
        while !frame.is_empty() {
            if frame.len() < 4 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated part length",
                ));
            }
            let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
            let _ = frame.split_to(4);
            if frame.len() < len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated part body",
                ));
            }
            parts.push(frame.split_to(len).freeze());
        }

        tracing::trace!(parts = parts.len(), "Decoded frame");
        Ok(Some(parts))
    }
}

impl Encoder<Envelope> for MultipartCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let parts = item
            .to_parts()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let body_len: usize = parts.iter().map(|p| 4 + p.len()).sum();
        let mut body = BytesMut::with_capacity(body_len);
        for part in &parts {
            body.put_u32(part.len() as u32);
            body.put_slice(part);
        }

        tracing::trace!(parts = parts.len(), frame_bytes = body_len, "Encoding frame");
        self.inner.encode(body.freeze(), dst)
    }
}
