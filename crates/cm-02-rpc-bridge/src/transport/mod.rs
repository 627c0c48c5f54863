//! # Transport
//!
//! Length-delimited JSON frames multiplexed by stream id over any
//! `AsyncRead + AsyncWrite` byte stream (TCP socket or in-process pipe).
//!
//! - `frame` - frame types and codec
//! - `client` - `RpcClient`, `ClientStream`
//! - `server` - `serve_connection`, `RpcService`

pub mod client;
pub mod frame;
pub mod server;


pub use client::{ClientStream, RpcClient, STREAM_BUFFER};
pub use frame::{Frame, FrameBody, FrameCodec, StreamEnd, StreamEvent, MAX_FRAME_LENGTH};
pub use server::{serve_connection, InboundCall, Responder, RpcService};
