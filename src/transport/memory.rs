//! In-process transport
//!
//! Endpoints exchange whole messages over unbounded channels, mimicking the
//! frame semantics of a message-oriented socket. Blocking receives park the
//! calling thread and must not be used from inside an async runtime.

use bytes::Bytes;
use std::io;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::{EndpointRole, RecvMode, Transport};

/// What happens to a completed outbound message before delivery
#[derive(Debug, Clone)]
enum Route {
    /// Delivered as sent
    Direct,
    /// Dealer side: the router sees our identity in front of every message
    Prepend(Bytes),
    /// Router side: the leading frame must name the connected peer
    Strip(Bytes),
}

/// In-memory endpoint implementing [`Transport`]
#[derive(Debug)]
pub struct MemoryTransport {
    role: EndpointRole,
    route: Route,
    tx: UnboundedSender<Vec<Bytes>>,
    rx: UnboundedReceiver<Vec<Bytes>>,
    /// Frames sent with `more` set, waiting for the final frame
    pending: Vec<Bytes>,
}

impl MemoryTransport {
    fn new(
        role: EndpointRole,
        route: Route,
        tx: UnboundedSender<Vec<Bytes>>,
        rx: UnboundedReceiver<Vec<Bytes>>,
    ) -> Self {
        Self {
            role,
            route,
            tx,
            rx,
            pending: Vec::new(),
        }
    }

    /// Two unaddressed endpoints connected to each other
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self::new(EndpointRole::Unaddressed, Route::Direct, b_tx, a_rx),
            Self::new(EndpointRole::Unaddressed, Route::Direct, a_tx, b_rx),
        )
    }

    /// A router endpoint and a dealer peer known to it by `identity`
    ///
    /// Returns `(router, dealer)`.
    pub fn router_pair(identity: impl Into<Bytes>) -> (Self, Self) {
        let identity = identity.into();
        let (router_tx, router_rx) = mpsc::unbounded_channel();
        let (dealer_tx, dealer_rx) = mpsc::unbounded_channel();
        let router = Self::new(
            EndpointRole::Addressed,
            Route::Strip(identity.clone()),
            dealer_tx,
            router_rx,
        );
        let dealer = Self::new(
            EndpointRole::Unaddressed,
            Route::Prepend(identity),
            router_tx,
            dealer_rx,
        );
        (router, dealer)
    }

    /// An endpoint that receives everything it sends, frames unchanged
    pub fn loopback(role: EndpointRole) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::new(role, Route::Direct, tx, rx)
    }

    /// Generate a fresh peer identity
    pub fn identity_for_peer() -> Bytes {
        Bytes::copy_from_slice(Uuid::new_v4().as_bytes())
    }

    fn route(&self, mut message: Vec<Bytes>) -> io::Result<Vec<Bytes>> {
        match &self.route {
            Route::Direct => Ok(message),
            Route::Prepend(identity) => {
                message.insert(0, identity.clone());
                Ok(message)
            }
            Route::Strip(identity) => {
                if message.first() != Some(identity) {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        "no peer with that routing id",
                    ));
                }
                message.remove(0);
                Ok(message)
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn role(&self) -> io::Result<EndpointRole> {
        Ok(self.role)
    }

    fn send_frame(&mut self, frame: Bytes, more: bool) -> io::Result<()> {
        self.pending.push(frame);
        if more {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.pending);
        let message = self.route(pending)?;
        tracing::trace!(frames = message.len(), "Memory transport delivering message");
        self.tx
            .send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionAborted, "peer closed"))
    }

    fn recv_frames(&mut self, mode: RecvMode) -> io::Result<Vec<Bytes>> {
        match mode {
            RecvMode::Blocking => self
                .rx
                .blocking_recv()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionAborted, "peer closed")),
            RecvMode::NonBlocking => self.rx.try_recv().map_err(|e| match e {
                TryRecvError::Empty => io::Error::from(io::ErrorKind::WouldBlock),
                TryRecvError::Disconnected => {
                    io::Error::new(io::ErrorKind::ConnectionAborted, "peer closed")
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Join, Message, Whisper};
    use crate::transport::{recv, recv_nowait, TransportError};

    #[test]
    fn test_pair_exchanges_frames() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send_frame(Bytes::from_static(b"one"), true).unwrap();
        a.send_frame(Bytes::from_static(b"two"), false).unwrap();

        let frames = b.recv_frames(RecvMode::NonBlocking).unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    }

    #[test]
    fn test_partial_message_not_delivered() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send_frame(Bytes::from_static(b"one"), true).unwrap();
        let err = b.recv_frames(RecvMode::NonBlocking).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_pending_frames_reset_between_messages() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send_frame(Bytes::from_static(b"one"), true).unwrap();
        a.send_frame(Bytes::from_static(b"two"), false).unwrap();
        a.send_frame(Bytes::from_static(b"three"), false).unwrap();

        let first = b.recv_frames(RecvMode::NonBlocking).unwrap();
        assert_eq!(first, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        let second = b.recv_frames(RecvMode::NonBlocking).unwrap();
        assert_eq!(second, vec![Bytes::from_static(b"three")]);
    }

    #[test]
    fn test_router_sees_dealer_identity() {
        let identity = MemoryTransport::identity_for_peer();
        assert_eq!(identity.len(), 16);
        let (mut router, mut dealer) = MemoryTransport::router_pair(identity.clone());

        let mut join = Join::new();
        join.group = "chat".to_string();
        join.status = 1;
        join.send(&mut dealer).unwrap();

        let msg = recv_nowait(&mut router).unwrap();
        assert_eq!(msg.routing_id(), &identity[..]);
        match &msg {
            Message::Join(j) => assert_eq!(j.group, "chat"),
            other => panic!("unexpected message: {other:?}"),
        }

        // Reply to the same peer using the attached routing id
        let mut reply = Whisper::new();
        reply.content = b"hi".to_vec();
        reply.set_routing_id(msg.routing_id().to_vec());
        reply.send(&mut router).unwrap();

        let msg = recv(&mut dealer).unwrap();
        assert!(msg.routing_id().is_empty());
        assert_eq!(msg.content(), Some(&b"hi"[..]));
    }

    #[test]
    fn test_router_rejects_unknown_identity() {
        let (mut router, _dealer) = MemoryTransport::router_pair(Bytes::from_static(b"known"));
        let mut whisper = Whisper::new();
        whisper.set_routing_id(b"stranger".to_vec());
        match whisper.send(&mut router) {
            Err(TransportError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::AddrNotAvailable),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_closed_peer() {
        let (mut a, b) = MemoryTransport::pair();
        drop(b);
        let err = a.send_frame(Bytes::from_static(b"x"), false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        let err = a.recv_frames(RecvMode::NonBlocking).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn test_blocking_recv_across_threads() {
        let (mut a, mut b) = MemoryTransport::pair();
        let handle = std::thread::spawn(move || recv(&mut b).map(|m| m.sequence()));

        let mut join = Join::new();
        join.set_sequence(7);
        join.send(&mut a).unwrap();

        assert_eq!(handle.join().unwrap().unwrap(), 7);
    }
}
