//! Transport module - Moves messages over a frame-oriented socket
//!
//! The socket itself is an external collaborator modelled by [`Transport`].
//! This module adds the routing semantics of addressed (router-style)
//! endpoints on top of it:
//! - On send, the message's routing id goes out as a leading frame
//! - On receive, the leading frame is taken as the sender's routing id

mod memory;

pub use memory::*;

use bytes::Bytes;
use std::io;
use thiserror::Error;

use crate::protocol::{CodecError, FrameLayout, Message, MessageId};

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("No routing id")]
    MissingRoutingId,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No message available")]
    WouldBlock,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Whether each message on an endpoint carries a peer address frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// Router-style endpoint talking to many peers
    Addressed,
    /// Endpoint bound to a single peer
    Unaddressed,
}

/// How a receive waits for input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvMode {
    Blocking,
    NonBlocking,
}

/// A socket that sends and receives ordered groups of frames
///
/// Implementations are not expected to be shared between threads without
/// external locking; every call takes `&mut self`.
pub trait Transport {
    /// Routing behaviour of this endpoint
    fn role(&self) -> io::Result<EndpointRole>;

    /// Queue one frame; `more` marks that further frames of the same message follow
    fn send_frame(&mut self, frame: Bytes, more: bool) -> io::Result<()>;

    /// Read every frame of the next message
    ///
    /// In [`RecvMode::NonBlocking`] an empty queue is reported as
    /// [`io::ErrorKind::WouldBlock`].
    fn recv_frames(&mut self, mode: RecvMode) -> io::Result<Vec<Bytes>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn role(&self) -> io::Result<EndpointRole> {
        (**self).role()
    }

    fn send_frame(&mut self, frame: Bytes, more: bool) -> io::Result<()> {
        (**self).send_frame(frame, more)
    }

    fn recv_frames(&mut self, mode: RecvMode) -> io::Result<Vec<Bytes>> {
        (**self).recv_frames(mode)
    }
}

/// Send a message with every field in one frame
pub fn send<T: Transport + ?Sized>(msg: &Message, transport: &mut T) -> TransportResult<()> {
    send_with(msg, transport, FrameLayout::Inline)
}

/// Send a message using the given frame layout
pub fn send_with<T: Transport + ?Sized>(
    msg: &Message,
    transport: &mut T,
    layout: FrameLayout,
) -> TransportResult<()> {
    let frames = msg.marshal_frames(layout)?;
    send_marshaled(transport, msg.id(), msg.routing_id(), frames)
}

pub(crate) fn send_marshaled<T: Transport + ?Sized>(
    transport: &mut T,
    id: MessageId,
    routing_id: &[u8],
    frames: Vec<Bytes>,
) -> TransportResult<()> {
    let role = transport.role()?;

    // If we're sending to a router, the routing id goes first
    if role == EndpointRole::Addressed {
        if routing_id.is_empty() {
            return Err(TransportError::MissingRoutingId);
        }
        transport.send_frame(Bytes::copy_from_slice(routing_id), true)?;
    }

    let count = frames.len();
    for (i, frame) in frames.into_iter().enumerate() {
        transport.send_frame(frame, i + 1 < count)?;
    }

    tracing::debug!(kind = %id, frames = count, ?role, "Sent message");
    Ok(())
}

/// Receive the next message, waiting until one arrives
pub fn recv<T: Transport + ?Sized>(transport: &mut T) -> TransportResult<Message> {
    recv_with(transport, RecvMode::Blocking)
}

/// Receive the next message without waiting
///
/// Returns [`TransportError::WouldBlock`] when nothing is queued.
pub fn recv_nowait<T: Transport + ?Sized>(transport: &mut T) -> TransportResult<Message> {
    recv_with(transport, RecvMode::NonBlocking)
}

fn recv_with<T: Transport + ?Sized>(transport: &mut T, mode: RecvMode) -> TransportResult<Message> {
    let mut frames = match transport.recv_frames(mode) {
        Ok(frames) => frames,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(TransportError::WouldBlock),
        Err(e) => return Err(e.into()),
    };

    let role = transport.role()?;

    // A message from a router starts with the sender's routing id
    let routing_id = match role {
        EndpointRole::Addressed => {
            if frames.len() < 2 {
                tracing::debug!(frames = frames.len(), "Addressed message without routing id");
                return Err(TransportError::MissingRoutingId);
            }
            Some(frames.remove(0))
        }
        EndpointRole::Unaddressed => None,
    };

    let mut msg = Message::unmarshal(&frames)?;

    if let Some(routing_id) = routing_id {
        msg.set_routing_id(routing_id.to_vec());
    }

    tracing::debug!(
        kind = msg.name(),
        sequence = msg.sequence(),
        frames = frames.len(),
        "Received message"
    );
    Ok(msg)
}

impl Message {
    /// Send through a transport, prefixing the routing id when addressed
    pub fn send<T: Transport + ?Sized>(&self, transport: &mut T) -> TransportResult<()> {
        send(self, transport)
    }

    /// Receive the next message from a transport, waiting until one arrives
    pub fn recv<T: Transport + ?Sized>(transport: &mut T) -> TransportResult<Self> {
        recv(transport)
    }

    /// Receive the next message from a transport without waiting
    pub fn recv_nowait<T: Transport + ?Sized>(transport: &mut T) -> TransportResult<Self> {
        recv_nowait(transport)
    }
}
