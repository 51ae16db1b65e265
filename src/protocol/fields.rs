//! Primitive field encoding
//!
//! Length-prefixed strings, blobs, string lists and string maps. All integers
//! are big-endian and fixed width. Every read checks the remaining length before
//! touching the buffer, so a short frame is reported instead of truncated.

use bytes::{Buf, BufMut};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::{CodecError, CodecResult};

/// Longest value a 1-byte length prefix can describe
pub const MAX_SHORT_STRING: usize = u8::MAX as usize;

/// Longest value a 4-byte length prefix can describe
const MAX_LONG_STRING: usize = u32::MAX as usize;

/// Encode a string with a 1-byte length prefix
pub fn put_string<B: BufMut>(buf: &mut B, field: &'static str, s: &str) -> CodecResult<()> {
    if s.len() > MAX_SHORT_STRING {
        return Err(CodecError::FieldTooLong {
            field,
            len: s.len(),
            max: MAX_SHORT_STRING,
        });
    }
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Encode a string with a 4-byte length prefix
pub fn put_long_string<B: BufMut>(buf: &mut B, field: &'static str, s: &str) -> CodecResult<()> {
    let len = u32::try_from(s.len()).map_err(|_| CodecError::FieldTooLong {
        field,
        len: s.len(),
        max: MAX_LONG_STRING,
    })?;
    buf.put_u32(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Encode a byte blob with an 8-byte length prefix
pub fn put_bytes<B: BufMut>(buf: &mut B, data: &[u8]) {
    buf.put_u64(data.len() as u64);
    buf.put_slice(data);
}

/// Encode a list of short strings behind a 4-byte count
pub fn put_strings<B: BufMut>(buf: &mut B, field: &'static str, list: &[String]) -> CodecResult<()> {
    put_count(buf, field, list.len())?;
    for s in list {
        put_string(buf, field, s)?;
    }
    Ok(())
}

/// Encode a string map behind a 4-byte count, each entry a short key and value
pub fn put_hash<B: BufMut>(
    buf: &mut B,
    field: &'static str,
    map: &BTreeMap<String, String>,
) -> CodecResult<()> {
    put_count(buf, field, map.len())?;
    for (key, value) in map {
        put_string(buf, field, key)?;
        put_string(buf, field, value)?;
    }
    Ok(())
}

fn put_count<B: BufMut>(buf: &mut B, field: &'static str, count: usize) -> CodecResult<()> {
    let count = u32::try_from(count).map_err(|_| CodecError::FieldTooLong {
        field,
        len: count,
        max: MAX_LONG_STRING,
    })?;
    buf.put_u32(count);
    Ok(())
}

/// Encoded size of a short string
pub(crate) fn string_size(s: &str) -> usize {
    1 + s.len()
}

/// Encoded size of a blob
pub(crate) fn bytes_size(data: &[u8]) -> usize {
    8 + data.len()
}

/// Encoded size of a string list
pub(crate) fn strings_size(list: &[String]) -> usize {
    4 + list.iter().map(|s| string_size(s)).sum::<usize>()
}

/// Encoded size of a string map
pub(crate) fn hash_size(map: &BTreeMap<String, String>) -> usize {
    4 + map
        .iter()
        .map(|(k, v)| string_size(k) + string_size(v))
        .sum::<usize>()
}

/// Bounds-checked cursor over a single frame
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> CodecResult<()> {
        let available = self.buf.remaining();
        if available < needed {
            tracing::trace!(field, needed, available, "Frame too short");
            return Err(CodecError::TruncatedInput {
                field,
                needed,
                available,
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self, field: &'static str) -> CodecResult<u8> {
        self.ensure(field, 1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u16(&mut self, field: &'static str) -> CodecResult<u16> {
        self.ensure(field, 2)?;
        Ok(self.buf.get_u16())
    }

    pub fn get_u32(&mut self, field: &'static str) -> CodecResult<u32> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_u32())
    }

    pub fn get_u64(&mut self, field: &'static str) -> CodecResult<u64> {
        self.ensure(field, 8)?;
        Ok(self.buf.get_u64())
    }

    /// Borrow the next `len` raw bytes
    pub fn take(&mut self, field: &'static str, len: usize) -> CodecResult<&'a [u8]> {
        self.ensure(field, len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Decode a string with a 1-byte length prefix
    pub fn get_string(&mut self, field: &'static str) -> CodecResult<String> {
        let len = self.get_u8(field)? as usize;
        self.get_utf8(field, len)
    }

    /// Decode a string with a 4-byte length prefix
    pub fn get_long_string(&mut self, field: &'static str) -> CodecResult<String> {
        let len = self.get_u32(field)? as usize;
        self.get_utf8(field, len)
    }

    /// Decode a byte blob with an 8-byte length prefix
    pub fn get_bytes(&mut self, field: &'static str) -> CodecResult<Vec<u8>> {
        let len = self.get_u64(field)?;
        // A length that does not fit in usize can never be satisfied
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        Ok(self.take(field, len)?.to_vec())
    }

    /// Decode a list of short strings behind a 4-byte count
    pub fn get_strings(&mut self, field: &'static str) -> CodecResult<Vec<String>> {
        let count = self.get_u32(field)? as usize;
        // Each element needs at least its length byte
        self.ensure(field, count)?;
        let mut list = Vec::with_capacity(count);
        for _ in 0..count {
            list.push(self.get_string(field)?);
        }
        Ok(list)
    }

    /// Decode a string map behind a 4-byte count
    pub fn get_hash(&mut self, field: &'static str) -> CodecResult<BTreeMap<String, String>> {
        let count = self.get_u32(field)? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.get_string(field)?;
            let value = self.get_string(field)?;
            match map.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(slot) => {
                    return Err(CodecError::DuplicateKey {
                        field,
                        key: slot.key().clone(),
                    });
                }
            }
        }
        Ok(map)
    }

    fn get_utf8(&mut self, field: &'static str, len: usize) -> CodecResult<String> {
        let raw = self.take(field, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
    }
}
