//! Protocol codec for encoding/decoding messages
//!
//! Each message kind owns its field layout through [`Fields`]; the shared
//! header handling and the id dispatch live here.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fields::{
    bytes_size, hash_size, put_bytes, put_hash, put_string, put_strings, string_size,
    strings_size, FieldReader,
};
use super::{
    Envelope, Hello, Join, Leave, Message, MessageId, Ping, PingOk, Shout, Whisper, HEADER_SIZE,
    PROTOCOL_VERSION, SIGNATURE,
};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Can't unmarshal an empty message")]
    EmptyInput,

    #[error("Invalid signature {actual:#06X} (expected {expected:#06X})")]
    BadSignature { expected: u16, actual: u16 },

    #[error("Malformed {expected} message: got message id {actual}")]
    WrongType { expected: MessageId, actual: u8 },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Truncated input reading {field}: need {needed} bytes, {available} available")]
    TruncatedInput {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Field {field} too long: {len} (max: {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Field {field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("Duplicate key '{key}' in {field}")]
    DuplicateKey { field: &'static str, key: String },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// How content-carrying messages are split into frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLayout {
    /// Every field, content included, in a single frame
    #[default]
    Inline,
    /// Content travels raw in its own trailing frame
    SeparateContent,
}

/// Per-message field layout, written after the common header
pub(crate) trait Fields: Default {
    const ID: MessageId;

    fn envelope(&self) -> &Envelope;

    fn envelope_mut(&mut self) -> &mut Envelope;

    /// Encoded size of the fields that go into the first frame
    fn fields_size(&self, _layout: FrameLayout) -> usize {
        0
    }

    /// Write the fields; returns the content frame when it is split off
    fn put_fields(&self, _buf: &mut BytesMut, _layout: FrameLayout) -> CodecResult<Option<Bytes>> {
        Ok(None)
    }

    /// Read the fields; `rest` holds the frames after the first one
    fn get_fields(&mut self, _reader: &mut FieldReader<'_>, _rest: &[Bytes]) -> CodecResult<()> {
        Ok(())
    }
}

/// Serialize a message into its frames
pub(crate) fn marshal_frames<M: Fields>(msg: &M, layout: FrameLayout) -> CodecResult<Vec<Bytes>> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + msg.fields_size(layout));
    buf.put_u16(SIGNATURE);
    buf.put_u8(M::ID.into());
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u16(msg.envelope().sequence);

    let content = msg.put_fields(&mut buf, layout)?;

    let mut frames = Vec::with_capacity(2);
    frames.push(buf.freeze());
    frames.extend(content);
    Ok(frames)
}

/// Deserialize a message of a known kind
pub(crate) fn unmarshal<M: Fields>(frames: &[Bytes]) -> CodecResult<M> {
    let (first, rest) = frames.split_first().ok_or(CodecError::EmptyInput)?;
    let mut reader = FieldReader::new(first);

    check_signature(&mut reader)?;

    let id = reader.get_u8("id")?;
    if id != u8::from(M::ID) {
        return Err(CodecError::WrongType {
            expected: M::ID,
            actual: id,
        });
    }

    let version = reader.get_u8("version")?;
    if version != PROTOCOL_VERSION {
        tracing::debug!(version, "Rejecting frame with unsupported version");
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mut msg = M::default();
    msg.envelope_mut().version = version;
    msg.envelope_mut().sequence = reader.get_u16("sequence")?;
    msg.get_fields(&mut reader, rest)?;

    if !reader.is_empty() {
        let id = M::ID;
        tracing::trace!(%id, trailing = reader.remaining(), "Ignoring trailing bytes");
    }

    Ok(msg)
}

fn check_signature(reader: &mut FieldReader<'_>) -> CodecResult<()> {
    let signature = reader.get_u16("signature")?;
    if signature != SIGNATURE {
        tracing::debug!(signature, "Rejecting frame with foreign signature");
        return Err(CodecError::BadSignature {
            expected: SIGNATURE,
            actual: signature,
        });
    }
    Ok(())
}

impl Message {
    /// Decode frames into whichever message kind the first frame names
    pub fn unmarshal(frames: &[Bytes]) -> CodecResult<Self> {
        let first = frames.first().ok_or(CodecError::EmptyInput)?;
        let mut reader = FieldReader::new(first);

        check_signature(&mut reader)?;

        let id = MessageId::try_from(reader.get_u8("id")?).map_err(|e| {
            tracing::debug!(error = %e, "Rejecting frame");
            e
        })?;

        let msg = match id {
            MessageId::Hello => Message::Hello(unmarshal(frames)?),
            MessageId::Whisper => Message::Whisper(unmarshal(frames)?),
            MessageId::Shout => Message::Shout(unmarshal(frames)?),
            MessageId::Join => Message::Join(unmarshal(frames)?),
            MessageId::Leave => Message::Leave(unmarshal(frames)?),
            MessageId::Ping => Message::Ping(unmarshal(frames)?),
            MessageId::PingOk => Message::PingOk(unmarshal(frames)?),
        };
        Ok(msg)
    }

    /// Serialize into a single frame
    pub fn marshal(&self) -> CodecResult<Bytes> {
        match self {
            Message::Hello(m) => m.marshal(),
            Message::Whisper(m) => m.marshal(),
            Message::Shout(m) => m.marshal(),
            Message::Join(m) => m.marshal(),
            Message::Leave(m) => m.marshal(),
            Message::Ping(m) => m.marshal(),
            Message::PingOk(m) => m.marshal(),
        }
    }

    /// Serialize into frames using the given layout
    pub fn marshal_frames(&self, layout: FrameLayout) -> CodecResult<Vec<Bytes>> {
        match self {
            Message::Hello(m) => m.marshal_frames(layout),
            Message::Whisper(m) => m.marshal_frames(layout),
            Message::Shout(m) => m.marshal_frames(layout),
            Message::Join(m) => m.marshal_frames(layout),
            Message::Leave(m) => m.marshal_frames(layout),
            Message::Ping(m) => m.marshal_frames(layout),
            Message::PingOk(m) => m.marshal_frames(layout),
        }
    }
}

/// Content is either the next frame (split layout) or an inline blob
fn get_content(reader: &mut FieldReader<'_>, rest: &[Bytes]) -> CodecResult<Vec<u8>> {
    match rest.first() {
        Some(frame) if reader.is_empty() => Ok(frame.to_vec()),
        _ => reader.get_bytes("content"),
    }
}

fn put_content(buf: &mut BytesMut, content: &[u8], layout: FrameLayout) -> Option<Bytes> {
    match layout {
        FrameLayout::Inline => {
            put_bytes(buf, content);
            None
        }
        FrameLayout::SeparateContent => Some(Bytes::copy_from_slice(content)),
    }
}

fn content_size(content: &[u8], layout: FrameLayout) -> usize {
    match layout {
        FrameLayout::Inline => bytes_size(content),
        FrameLayout::SeparateContent => 0,
    }
}

impl Fields for Hello {
    const ID: MessageId = MessageId::Hello;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn fields_size(&self, _layout: FrameLayout) -> usize {
        string_size(&self.endpoint)
            + strings_size(&self.groups)
            + 1
            + string_size(&self.name)
            + hash_size(&self.headers)
    }

    fn put_fields(&self, buf: &mut BytesMut, _layout: FrameLayout) -> CodecResult<Option<Bytes>> {
        put_string(buf, "endpoint", &self.endpoint)?;
        put_strings(buf, "groups", &self.groups)?;
        buf.put_u8(self.status);
        put_string(buf, "name", &self.name)?;
        put_hash(buf, "headers", &self.headers)?;
        Ok(None)
    }

    fn get_fields(&mut self, reader: &mut FieldReader<'_>, _rest: &[Bytes]) -> CodecResult<()> {
        self.endpoint = reader.get_string("endpoint")?;
        self.groups = reader.get_strings("groups")?;
        self.status = reader.get_u8("status")?;
        self.name = reader.get_string("name")?;
        self.headers = reader.get_hash("headers")?;
        Ok(())
    }
}

impl Fields for Whisper {
    const ID: MessageId = MessageId::Whisper;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn fields_size(&self, layout: FrameLayout) -> usize {
        content_size(&self.content, layout)
    }

    fn put_fields(&self, buf: &mut BytesMut, layout: FrameLayout) -> CodecResult<Option<Bytes>> {
        Ok(put_content(buf, &self.content, layout))
    }

    fn get_fields(&mut self, reader: &mut FieldReader<'_>, rest: &[Bytes]) -> CodecResult<()> {
        self.content = get_content(reader, rest)?;
        Ok(())
    }
}

impl Fields for Shout {
    const ID: MessageId = MessageId::Shout;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn fields_size(&self, layout: FrameLayout) -> usize {
        string_size(&self.group) + content_size(&self.content, layout)
    }

    fn put_fields(&self, buf: &mut BytesMut, layout: FrameLayout) -> CodecResult<Option<Bytes>> {
        put_string(buf, "group", &self.group)?;
        Ok(put_content(buf, &self.content, layout))
    }

    fn get_fields(&mut self, reader: &mut FieldReader<'_>, rest: &[Bytes]) -> CodecResult<()> {
        self.group = reader.get_string("group")?;
        self.content = get_content(reader, rest)?;
        Ok(())
    }
}

impl Fields for Join {
    const ID: MessageId = MessageId::Join;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn fields_size(&self, _layout: FrameLayout) -> usize {
        string_size(&self.group) + 1
    }

    fn put_fields(&self, buf: &mut BytesMut, _layout: FrameLayout) -> CodecResult<Option<Bytes>> {
        put_string(buf, "group", &self.group)?;
        buf.put_u8(self.status);
        Ok(None)
    }

    fn get_fields(&mut self, reader: &mut FieldReader<'_>, _rest: &[Bytes]) -> CodecResult<()> {
        self.group = reader.get_string("group")?;
        self.status = reader.get_u8("status")?;
        Ok(())
    }
}

impl Fields for Leave {
    const ID: MessageId = MessageId::Leave;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn fields_size(&self, _layout: FrameLayout) -> usize {
        string_size(&self.group) + 1
    }

    fn put_fields(&self, buf: &mut BytesMut, _layout: FrameLayout) -> CodecResult<Option<Bytes>> {
        put_string(buf, "group", &self.group)?;
        buf.put_u8(self.status);
        Ok(None)
    }

    fn get_fields(&mut self, reader: &mut FieldReader<'_>, _rest: &[Bytes]) -> CodecResult<()> {
        self.group = reader.get_string("group")?;
        self.status = reader.get_u8("status")?;
        Ok(())
    }
}

impl Fields for Ping {
    const ID: MessageId = MessageId::Ping;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

impl Fields for PingOk {
    const ID: MessageId = MessageId::PingOk;

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leave(group: &str, status: u8, sequence: u16) -> Leave {
        let mut msg = Leave::new();
        msg.group = group.to_string();
        msg.status = status;
        msg.set_sequence(sequence);
        msg
    }

    #[test]
    fn test_leave_wire_layout() {
        let frame = leave("chat", 3, 42).marshal().unwrap();
        assert_eq!(
            &frame[..],
            &[0xAA, 0xA0, 5, 2, 0, 42, 4, b'c', b'h', b'a', b't', 3]
        );
    }

    #[test]
    fn test_leave_roundtrip() {
        let original = leave("chat", 3, 42);
        let frame = original.marshal().unwrap();
        let decoded = Leave::unmarshal(&[frame]).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.version(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_wrong_type() {
        let frame = leave("chat", 3, 42).marshal().unwrap();
        let err = Join::unmarshal(&[frame]).unwrap_err();
        assert_eq!(
            err,
            CodecError::WrongType {
                expected: MessageId::Join,
                actual: 5
            }
        );
    }

    #[test]
    fn test_version_written_regardless_of_field() {
        let mut msg = Ping::new();
        msg.set_version(9);
        let frame = msg.marshal().unwrap();
        assert_eq!(frame[3], PROTOCOL_VERSION);
    }

    #[test]
    fn test_marshal_rejects_oversized_group() {
        let msg = leave(&"g".repeat(300), 0, 0);
        assert!(matches!(
            msg.marshal(),
            Err(CodecError::FieldTooLong { field: "group", len: 300, .. })
        ));
    }

    #[test]
    fn test_whisper_split_layout() {
        let mut msg = Whisper::new();
        msg.content = b"hello".to_vec();
        let frames = msg.marshal_frames(FrameLayout::SeparateContent).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), HEADER_SIZE);
        assert_eq!(&frames[1][..], b"hello");

        let inline = msg.marshal_frames(FrameLayout::Inline).unwrap();
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].len(), HEADER_SIZE + 8 + 5);

        assert_eq!(Whisper::unmarshal(&frames).unwrap(), msg);
        assert_eq!(Whisper::unmarshal(&inline).unwrap(), msg);
    }

    #[test]
    fn test_whisper_missing_content() {
        let frames = Whisper::new()
            .marshal_frames(FrameLayout::SeparateContent)
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            Whisper::unmarshal(&frames[..1]),
            Err(CodecError::TruncatedInput { field: "content", .. })
        ));
    }

    #[test]
    fn test_layout_ignored_without_content() {
        let frames = leave("chat", 1, 1)
            .marshal_frames(FrameLayout::SeparateContent)
            .unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_dispatch_short_frame() {
        let err = Message::unmarshal(&[Bytes::from_static(&[0xAA, 0xA0])]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedInput { field: "id", .. }));
    }

    #[test]
    fn test_dispatch_each_kind() {
        let messages: Vec<Message> = vec![
            Hello::new().into(),
            Whisper::new().into(),
            Shout::new().into(),
            Join::new().into(),
            leave("x", 0, 0).into(),
            Ping::new().into(),
            PingOk::new().into(),
        ];
        for msg in messages {
            let frame = msg.marshal().unwrap();
            let decoded = Message::unmarshal(&[frame]).unwrap();
            assert_eq!(decoded.id(), msg.id());
            assert_eq!(decoded, msg);
        }
    }
}
