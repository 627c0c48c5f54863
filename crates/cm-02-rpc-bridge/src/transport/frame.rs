//! # Wire Frames
//!
//! Every message on a connection is one length-delimited JSON frame tagged
//! with the stream it belongs to. A stream is opened by the client with
//! `Open`, carries zero or more `Item`s from the server and ends with
//! exactly one `End` or `Failure`. The client may send `Cancel` to stop the
//! server handler early.

use crate::errors::RpcError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::CapabilityError;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Upper bound on a single encoded frame.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub stream_id: u64,
    pub body: FrameBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FrameBody {
    Open { method: String, payload: Value },
    Item(Value),
    End,
    Failure(CapabilityError),
    Cancel,
}

impl Frame {
    pub fn new(stream_id: u64, body: FrameBody) -> Self {
        Self { stream_id, body }
    }
}

/// How a stream finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the stream normally.
    Done,
    Failed(RpcError),
}

/// What a client stream yields.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Item(Value),
    /// Always the last event of a stream.
    End(StreamEnd),
}

/// `Frame` <-> length-delimited JSON.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, RpcError> {
        match self.inner.decode(src)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = RpcError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), RpcError> {
        let bytes = serde_json::to_vec(&frame)?;
        self.inner.encode(Bytes::from(bytes), dst)?;
        Ok(())
    }
}
