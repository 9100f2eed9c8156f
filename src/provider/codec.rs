//! UTF-8 chunk decoder for backend output streams.
//!
//! Each read from the backend becomes one chunk: all complete UTF-8
//! characters currently buffered. A multi-byte character split across
//! reads stays buffered until its remaining bytes arrive. Invalid
//! sequences are replaced with U+FFFD rather than failing the stream.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Default)]
pub struct Utf8ChunkCodec;

impl Utf8ChunkCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for Utf8ChunkCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let take = match std::str::from_utf8(&src[..]) {
            Ok(_) => src.len(),
            // Invalid sequence: consume through it and let the lossy
            // conversion below substitute a replacement character.
            Err(e) if e.error_len().is_some() => {
                e.valid_up_to() + e.error_len().unwrap_or_default()
            }
            // Incomplete trailing character: wait for more bytes.
            Err(e) => e.valid_up_to(),
        };

        if take == 0 {
            return Ok(None);
        }

        let bytes = src.split_to(take);
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(chunk) => Ok(Some(chunk)),
            None if src.is_empty() => Ok(None),
            // Truncated character at end of stream.
            None => {
                let bytes = src.split_to(src.len());
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
        }
    }
}
