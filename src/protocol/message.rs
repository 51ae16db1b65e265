//! Protocol message definitions
//!
//! Defines the seven ZRE message kinds exchanged between peers.

use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::codec::{self, CodecResult, FrameLayout};
use super::{MessageId, PROTOCOL_VERSION};
use crate::transport::{self, Transport, TransportResult};

fn as_hex<T: AsRef<[u8]>, S: Serializer>(data: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data.as_ref()))
}

/// Attributes shared by every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Peer address on router-style transports; never on the wire
    #[serde(serialize_with = "as_hex")]
    pub(crate) routing_id: Vec<u8>,
    pub(crate) version: u8,
    pub(crate) sequence: u16,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            routing_id: Vec::new(),
            version: PROTOCOL_VERSION,
            sequence: 0,
        }
    }
}

/// Greet a peer so it can connect back to us
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hello {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
    /// Sender connect endpoint
    pub endpoint: String,
    /// List of groups sender is in
    pub groups: Vec<String>,
    /// Sender groups status value
    pub status: u8,
    /// Sender public name
    pub name: String,
    /// Sender header properties
    pub headers: BTreeMap<String, String>,
}

/// Send a multi-part message to a peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Whisper {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
    #[serde(serialize_with = "as_hex")]
    pub content: Vec<u8>,
}

/// Send a multi-part message to a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Shout {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
    pub group: String,
    #[serde(serialize_with = "as_hex")]
    pub content: Vec<u8>,
}

/// Join a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Join {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
    pub group: String,
    /// Sender groups status value
    pub status: u8,
}

/// Leave a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leave {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
    pub group: String,
    /// Sender groups status value
    pub status: u8,
}

/// Ping a peer that has gone silent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ping {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
}

/// Reply to a peer's ping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PingOk {
    #[serde(flatten)]
    pub(crate) envelope: Envelope,
}

/// Accessors and codec entry points shared by every message kind
macro_rules! impl_message {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl $ty {
                pub fn new() -> Self {
                    Self::default()
                }

                /// Routing id, set whenever talking to a router-style transport
                pub fn routing_id(&self) -> &[u8] {
                    &self.envelope.routing_id
                }

                pub fn set_routing_id(&mut self, routing_id: impl Into<Vec<u8>>) {
                    self.envelope.routing_id = routing_id.into();
                }

                pub fn version(&self) -> u8 {
                    self.envelope.version
                }

                pub fn set_version(&mut self, version: u8) {
                    self.envelope.version = version;
                }

                pub fn sequence(&self) -> u16 {
                    self.envelope.sequence
                }

                pub fn set_sequence(&mut self, sequence: u16) {
                    self.envelope.sequence = sequence;
                }

                /// Serialize into a single frame
                pub fn marshal(&self) -> CodecResult<Bytes> {
                    let mut frames = codec::marshal_frames(self, FrameLayout::Inline)?;
                    Ok(frames.swap_remove(0))
                }

                /// Serialize into frames using the given layout
                pub fn marshal_frames(&self, layout: FrameLayout) -> CodecResult<Vec<Bytes>> {
                    codec::marshal_frames(self, layout)
                }

                /// Decode frames that must hold this message kind
                pub fn unmarshal(frames: &[Bytes]) -> CodecResult<Self> {
                    codec::unmarshal(frames)
                }

                /// Send through a transport, prefixing the routing id when addressed
                pub fn send<T: Transport + ?Sized>(&self, transport: &mut T) -> TransportResult<()> {
                    let frames = self.marshal_frames(FrameLayout::Inline)?;
                    transport::send_marshaled(transport, MessageId::$variant, self.routing_id(), frames)
                }
            }

            impl From<$ty> for Message {
                fn from(msg: $ty) -> Self {
                    Message::$variant(msg)
                }
            }
        )*

        impl Message {
            /// The message id written on the wire
            pub fn id(&self) -> MessageId {
                match self {
                    $(Message::$variant(_) => MessageId::$variant,)*
                }
            }

            fn envelope(&self) -> &Envelope {
                match self {
                    $(Message::$variant(m) => &m.envelope,)*
                }
            }

            fn envelope_mut(&mut self) -> &mut Envelope {
                match self {
                    $(Message::$variant(m) => &mut m.envelope,)*
                }
            }
        }
    };
}

/// All protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Hello(Hello),
    Whisper(Whisper),
    Shout(Shout),
    Join(Join),
    Leave(Leave),
    Ping(Ping),
    PingOk(PingOk),
}

impl_message! {
    Hello => Hello,
    Whisper => Whisper,
    Shout => Shout,
    Join => Join,
    Leave => Leave,
    Ping => Ping,
    PingOk => PingOk,
}

impl Message {
    /// Protocol name of the message kind
    pub fn name(&self) -> &'static str {
        self.id().name()
    }

    pub fn routing_id(&self) -> &[u8] {
        &self.envelope().routing_id
    }

    pub fn set_routing_id(&mut self, routing_id: impl Into<Vec<u8>>) {
        self.envelope_mut().routing_id = routing_id.into();
    }

    pub fn version(&self) -> u8 {
        self.envelope().version
    }

    pub fn set_version(&mut self, version: u8) {
        self.envelope_mut().version = version;
    }

    pub fn sequence(&self) -> u16 {
        self.envelope().sequence
    }

    pub fn set_sequence(&mut self, sequence: u16) {
        self.envelope_mut().sequence = sequence;
    }

    /// Content of a WHISPER or SHOUT
    pub fn content(&self) -> Option<&[u8]> {
        match self {
            Message::Whisper(m) => Some(&m.content),
            Message::Shout(m) => Some(&m.content),
            _ => None,
        }
    }
}

fn write_envelope(f: &mut fmt::Formatter<'_>, id: MessageId, envelope: &Envelope) -> fmt::Result {
    writeln!(f, "ZRE_MSG_{}:", id.name())?;
    writeln!(f, "    version = {}", envelope.version)?;
    write!(f, "    sequence = {}", envelope.sequence)
}

impl fmt::Display for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::Hello, &self.envelope)?;
        writeln!(f)?;
        writeln!(f, "    endpoint = {}", self.endpoint)?;
        writeln!(f, "    groups = [{}]", self.groups.join(", "))?;
        writeln!(f, "    status = {}", self.status)?;
        writeln!(f, "    name = {}", self.name)?;
        write!(f, "    headers = {{")?;
        for (i, (key, value)) in self.headers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Whisper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::Whisper, &self.envelope)?;
        writeln!(f)?;
        write!(f, "    content = [{} bytes]", self.content.len())
    }
}

impl fmt::Display for Shout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::Shout, &self.envelope)?;
        writeln!(f)?;
        writeln!(f, "    group = {}", self.group)?;
        write!(f, "    content = [{} bytes]", self.content.len())
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::Join, &self.envelope)?;
        writeln!(f)?;
        writeln!(f, "    group = {}", self.group)?;
        write!(f, "    status = {}", self.status)
    }
}

impl fmt::Display for Leave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::Leave, &self.envelope)?;
        writeln!(f)?;
        writeln!(f, "    group = {}", self.group)?;
        write!(f, "    status = {}", self.status)
    }
}

impl fmt::Display for Ping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::Ping, &self.envelope)
    }
}

impl fmt::Display for PingOk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_envelope(f, MessageId::PingOk, &self.envelope)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Hello(m) => fmt::Display::fmt(m, f),
            Message::Whisper(m) => fmt::Display::fmt(m, f),
            Message::Shout(m) => fmt::Display::fmt(m, f),
            Message::Join(m) => fmt::Display::fmt(m, f),
            Message::Leave(m) => fmt::Display::fmt(m, f),
            Message::Ping(m) => fmt::Display::fmt(m, f),
            Message::PingOk(m) => fmt::Display::fmt(m, f),
        }
    }
}
