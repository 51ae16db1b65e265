//! zre-msg - Wire codec for the ZRE peer-to-peer realtime exchange
//!
//! Encodes and decodes the seven ZRE message kinds and moves them over a
//! frame-oriented transport, handling the routing frame of router-style
//! endpoints.

pub mod config;
pub mod protocol;
pub mod transport;

pub use protocol::{
    CodecError, CodecResult, FrameLayout, Hello, Join, Leave, Message, MessageId, Ping, PingOk,
    Shout, Whisper,
};
pub use transport::{
    recv, recv_nowait, send, send_with, EndpointRole, MemoryTransport, RecvMode, Transport,
    TransportError, TransportResult,
};
