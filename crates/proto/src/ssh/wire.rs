//! SSH wire-format primitives (RFC 4251 Section 5).
//!
//! Every SSH message is assembled from a handful of primitive encodings:
//!
//! - `byte`, `boolean` - single octets
//! - `uint32` - big-endian 32-bit integer
//! - `string` - uint32 length prefix followed by raw bytes
//! - `mpint` - multiple-precision integer in two's complement with a
//!   minimal leading-zero rule (a positive value whose high bit is set
//!   gains one zero octet; zero itself encodes as the empty string)
//!
//! [`WireBuffer`] is an append-only writer with a monotonic read cursor,
//! used wherever a message is built or torn down field by field. The
//! free-standing `read_*`/`write_*` helpers operate on plain slices and
//! `BytesMut` and are shared by all message parsers in this crate.
//!
//! # Example
//!
//! ```rust
//! use moorage_proto::ssh::wire::WireBuffer;
//!
//! let mut buf = WireBuffer::new();
//! buf.put_u8(20);
//! buf.put_string("ssh-userauth");
//!
//! assert_eq!(buf.read_u8().unwrap(), 20);
//! assert_eq!(buf.read_string().unwrap(), "ssh-userauth");
//! ```

use bytes::{BufMut, BytesMut};
use moorage_platform::{MoorageError, MoorageResult};

/// Append-only write buffer with a random-access read cursor.
///
/// Write and read indices are monotonic; [`WireBuffer::reinit`] clears both.
#[derive(Debug, Default, Clone)]
pub struct WireBuffer {
    data: BytesMut,
    read_pos: usize,
}

impl WireBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            read_pos: 0,
        }
    }

    /// Creates a buffer over existing bytes, with the read cursor at the start.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: BytesMut::from(data),
            read_pos: 0,
        }
    }

    /// Clears both the write index and the read cursor.
    pub fn reinit(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    /// Returns the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, returning the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Appends a boolean as one octet (0 or 1).
    pub fn put_bool(&mut self, value: bool) {
        self.data.put_u8(u8::from(value));
    }

    /// Appends a big-endian uint32.
    pub fn put_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    /// Appends raw bytes with no length prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }

    /// Appends an SSH string (uint32 length prefix + bytes).
    pub fn put_string(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Appends a length-prefixed byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.put_u32(bytes.len() as u32);
        self.data.put_slice(bytes);
    }

    /// Appends an mpint from a big-endian magnitude.
    ///
    /// Leading zero octets are stripped; if the remaining high bit is set a
    /// single zero octet is prepended so the value reads as positive. Zero
    /// encodes as a zero-length string.
    pub fn put_mpint(&mut self, magnitude: &[u8]) {
        self.data.put_slice(&encode_mpint(magnitude));
    }

    /// Reads one byte, failing if the buffer is exhausted.
    pub fn read_u8(&mut self) -> MoorageResult<u8> {
        if self.remaining() < 1 {
            return Err(underflow("u8", 1, self.remaining()));
        }
        let value = self.data[self.read_pos];
        self.read_pos += 1;
        Ok(value)
    }

    /// Reads a boolean octet.
    pub fn read_bool(&mut self) -> MoorageResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a big-endian uint32.
    pub fn read_u32(&mut self) -> MoorageResult<u32> {
        if self.remaining() < 4 {
            return Err(underflow("u32", 4, self.remaining()));
        }
        let start = self.read_pos;
        let value = u32::from_be_bytes([
            self.data[start],
            self.data[start + 1],
            self.data[start + 2],
            self.data[start + 3],
        ]);
        self.read_pos += 4;
        Ok(value)
    }

    /// Reads `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> MoorageResult<Vec<u8>> {
        if self.remaining() < len {
            return Err(underflow("raw bytes", len, self.remaining()));
        }
        let start = self.read_pos;
        self.read_pos += len;
        Ok(self.data[start..start + len].to_vec())
    }

    /// Reads a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> MoorageResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_raw(len)
    }

    /// Reads an SSH string as UTF-8.
    pub fn read_string(&mut self) -> MoorageResult<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|_| MoorageError::Protocol("String contains invalid UTF-8".to_string()))
    }

    /// Reads an mpint, returning its content octets (sign octet included if
    /// the sender emitted one).
    pub fn read_mpint(&mut self) -> MoorageResult<Vec<u8>> {
        self.read_bytes()
    }
}

fn underflow(what: &str, wanted: usize, remaining: usize) -> MoorageError {
    MoorageError::Protocol(format!(
        "Cannot read {}: wanted {} bytes, {} remaining",
        what, wanted, remaining
    ))
}

/// Encodes a big-endian magnitude as a full mpint (length prefix included).
pub fn encode_mpint(magnitude: &[u8]) -> Vec<u8> {
    let trimmed: &[u8] = match magnitude.iter().position(|&b| b != 0) {
        Some(first) => &magnitude[first..],
        None => &[],
    };

    if trimmed.is_empty() {
        return vec![0, 0, 0, 0];
    }

    let needs_padding = trimmed[0] & 0x80 != 0;
    let length = trimmed.len() + usize::from(needs_padding);

    let mut out = Vec::with_capacity(4 + length);
    out.extend_from_slice(&(length as u32).to_be_bytes());
    if needs_padding {
        out.push(0);
    }
    out.extend_from_slice(trimmed);
    out
}

/// Writes an SSH string into a `BytesMut`.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_bytes(buf, s.as_bytes());
}

/// Writes a length-prefixed byte string into a `BytesMut`.
pub fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Writes an mpint into a `BytesMut`.
pub fn write_mpint(buf: &mut BytesMut, magnitude: &[u8]) {
    buf.put_slice(&encode_mpint(magnitude));
}

/// Reads a big-endian uint32 at `offset`, advancing it.
pub fn read_u32(data: &[u8], offset: &mut usize) -> MoorageResult<u32> {
    if *offset + 4 > data.len() {
        return Err(MoorageError::Protocol(format!(
            "Cannot read u32 at offset {}",
            offset
        )));
    }
    let value = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]);
    *offset += 4;
    Ok(value)
}

/// Reads a boolean octet at `offset`, advancing it.
pub fn read_bool(data: &[u8], offset: &mut usize) -> MoorageResult<bool> {
    if *offset >= data.len() {
        return Err(MoorageError::Protocol(format!(
            "Cannot read boolean at offset {}",
            offset
        )));
    }
    let value = data[*offset] != 0;
    *offset += 1;
    Ok(value)
}

/// Reads a length-prefixed byte string at `offset`, advancing it.
pub fn read_bytes(data: &[u8], offset: &mut usize) -> MoorageResult<Vec<u8>> {
    let length = read_u32(data, offset)? as usize;
    if *offset + length > data.len() {
        return Err(MoorageError::Protocol(format!(
            "String data truncated: expected {} bytes at offset {}",
            length, offset
        )));
    }
    let bytes = data[*offset..*offset + length].to_vec();
    *offset += length;
    Ok(bytes)
}

/// Reads an SSH string as UTF-8 at `offset`, advancing it.
pub fn read_string(data: &[u8], offset: &mut usize) -> MoorageResult<String> {
    let bytes = read_bytes(data, offset)?;
    String::from_utf8(bytes)
        .map_err(|_| MoorageError::Protocol("String contains invalid UTF-8".to_string()))
}
