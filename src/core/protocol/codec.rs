// src/core/protocol/codec.rs

//! `WireCodec`: a length-prefixed, JSON-encoded frame codec for
//! [`WireMessage`]. Each frame on the wire is a 4-byte big-endian length
//! followed by that many bytes of `serde_json`-encoded payload.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::WireMessage;
use crate::core::errors::WardenError;

/// Frames larger than this are treated as malformed rather than buffered
/// forever; a cluster list reply is the largest legitimate frame and stays
/// far under this.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_PREFIX_BYTES: usize = 4;

#[derive(Debug, Default)]
pub struct WireCodec {
    /// Length of the frame currently being assembled, once known.
    next_len: Option<usize>,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for WireCodec {
    type Item = WireMessage;
    type Error = WardenError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.next_len {
            Some(len) => len,
            None => {
                if src.len() < LEN_PREFIX_BYTES {
                    src.reserve(LEN_PREFIX_BYTES - src.len());
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > MAX_FRAME_LEN {
                    return Err(WardenError::MalformedFrame(format!(
                        "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
                    )));
                }
                self.next_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let payload = src.split_to(len);
        self.next_len = None;

        let msg = serde_json::from_slice(&payload)?;
        Ok(Some(msg))
    }
}

impl Encoder<WireMessage> for WireCodec {
    type Error = WardenError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(WardenError::Internal(format!(
                "refusing to encode a {} byte frame",
                payload.len()
            )));
        }
        dst.reserve(LEN_PREFIX_BYTES + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::message::Hello;

    #[test]
    fn round_trips_a_hello_frame() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(WireMessage::Hello(Hello::Agent), &mut buf)
            .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, WireMessage::Hello(Hello::Agent));
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_on_a_partial_frame() {
        let mut codec = WireCodec::new();
        let mut full = BytesMut::new();
        codec
            .encode(WireMessage::ListEnd, &mut full)
            .unwrap();

        let mut partial = full.split_to(full.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn rejects_an_oversized_frame_length() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        assert!(codec.decode(&mut buf).is_err());
    }
}
