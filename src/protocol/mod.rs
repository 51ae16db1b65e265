//! Protocol module - Defines the ZRE wire format
//!
//! Every frame starts with the same fixed header (big-endian):
//! - 2 bytes signature (`0xAAA0`)
//! - 1 byte message id
//! - 1 byte protocol version (always 2)
//! - 2 bytes sequence number
//! - Variable length message fields

mod codec;
mod fields;
mod message;

pub use codec::*;
pub use fields::{
    put_bytes, put_hash, put_long_string, put_string, put_strings, FieldReader, MAX_SHORT_STRING,
};
pub use message::*;

use std::fmt;

/// Signature carried by every frame of this protocol family
pub const SIGNATURE: u16 = 0xAAA0;

/// The only protocol version this codec speaks
pub const PROTOCOL_VERSION: u8 = 2;

/// Signature(2) + id(1) + version(1) + sequence(2)
pub const HEADER_SIZE: usize = 6;

/// Message identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    Hello = 1,
    Whisper = 2,
    Shout = 3,
    Join = 4,
    Leave = 5,
    Ping = 6,
    PingOk = 7,
}

impl MessageId {
    /// All identifiers, in wire order
    pub const ALL: [MessageId; 7] = [
        MessageId::Hello,
        MessageId::Whisper,
        MessageId::Shout,
        MessageId::Join,
        MessageId::Leave,
        MessageId::Ping,
        MessageId::PingOk,
    ];

    /// Protocol name of the message kind
    pub fn name(self) -> &'static str {
        match self {
            MessageId::Hello => "HELLO",
            MessageId::Whisper => "WHISPER",
            MessageId::Shout => "SHOUT",
            MessageId::Join => "JOIN",
            MessageId::Leave => "LEAVE",
            MessageId::Ping => "PING",
            MessageId::PingOk => "PING_OK",
        }
    }
}

impl From<MessageId> for u8 {
    fn from(id: MessageId) -> Self {
        id as u8
    }
}

impl TryFrom<u8> for MessageId {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageId::Hello),
            2 => Ok(MessageId::Whisper),
            3 => Ok(MessageId::Shout),
            4 => Ok(MessageId::Join),
            5 => Ok(MessageId::Leave),
            6 => Ok(MessageId::Ping),
            7 => Ok(MessageId::PingOk),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_table() {
        for (i, id) in MessageId::ALL.iter().enumerate() {
            assert_eq!(u8::from(*id), i as u8 + 1);
            assert_eq!(MessageId::try_from(i as u8 + 1).unwrap(), *id);
        }
    }

    #[test]
    fn test_unknown_message_id() {
        assert!(matches!(
            MessageId::try_from(0),
            Err(CodecError::UnknownMessageType(0))
        ));
        assert!(matches!(
            MessageId::try_from(99),
            Err(CodecError::UnknownMessageType(99))
        ));
    }
}
