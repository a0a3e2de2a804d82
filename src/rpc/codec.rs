//! Frames a byte stream into length-delimited `serde_json` messages.
//!
//! Decoding and encoding are parameterized separately (`In`/`Out`) so one
//! connection's `Framed` can read one message type and write another — the
//! extension RPC connection decodes `Request`s and encodes `OutFrame`s on
//! the same socket.

use bytes::{Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

pub struct JsonCodec<In, Out = In> {
    inner: LengthDelimitedCodec,
    _marker: std::marker::PhantomData<(In, Out)>,
}

impl<In, Out> Default for JsonCodec<In, Out> {
    fn default() -> JsonCodec<In, Out> {
        JsonCodec {
            inner: LengthDelimitedCodec::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<In: DeserializeOwned, Out> Decoder for JsonCodec<In, Out> {
    type Item = In;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<In>, std::io::Error> {
        let Some(frame) = self.inner.decode(src)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&frame)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }
}

impl<In, Out: Serialize> Encoder<Out> for JsonCodec<In, Out> {
    type Error = std::io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), std::io::Error> {
        let bytes = serde_json::to_vec(&item).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.inner.encode(Bytes::from(bytes), dst)
    }
}
