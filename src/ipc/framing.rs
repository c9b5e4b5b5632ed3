//! Newline-terminated request framing and buffered response reassembly.
//!
//! Requests go out as a single JSON line. Responses come back as bare JSON
//! values with no length prefix, so the reader accumulates bytes into a
//! fixed-size [`ReceiveBuffer`] and repeatedly tries to parse one complete
//! value off the front of it. Bytes after that value stay in the buffer and
//! are served to the next read, which covers daemons that coalesce several
//! replies into one write or split one reply across several.
//!
//! # Wire Format
//!
//! ```text
//! client -> {"command":"workspace","stdin":"","args":["workspace","next"]}\n
//! daemon <- {"exitCode":0,"stdout":"","stderr":""}
//! ```

use std::io::{self, Read, Write};

use serde_json::{Deserializer, Value};
use thiserror::Error;

/// Capacity of the receive buffer. A single response must fit in it.
pub const READ_BUFFER_SIZE: usize = 8192;

/// Errors from the response reassembly loop.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The buffer filled up without containing a complete JSON value.
    #[error("read buffer overflow: no complete response within {0} bytes")]
    Overflow(usize),

    /// The peer closed the connection before a complete value arrived.
    #[error("connection closed by daemon")]
    Closed,

    /// The underlying read failed.
    #[error("failed to receive data from socket: {0}")]
    Io(#[source] io::Error),
}

/// Fixed-capacity byte buffer holding received but unconsumed bytes.
///
/// The filled region is always `bytes[..len]` with `len <= capacity`.
/// [`commit`](Self::commit) and [`consume`](Self::consume) panic rather than
/// move `len` outside that range.
pub struct ReceiveBuffer {
    bytes: Box<[u8]>,
    len: usize,
}

impl std::fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveBuffer {
    /// Create an empty buffer of [`READ_BUFFER_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(READ_BUFFER_SIZE)
    }

    /// Create an empty buffer with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// The filled region.
    pub fn filled(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The unfilled tail, for reading into.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.len..]
    }

    /// Mark `n` bytes of the spare region as filled.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the spare capacity.
    pub fn commit(&mut self, n: usize) {
        assert!(
            n <= self.capacity() - self.len,
            "commit of {n} bytes exceeds spare capacity {}",
            self.capacity() - self.len
        );
        self.len += n;
    }

    /// Copy `data` onto the end of the filled region.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not fit.
    pub fn append(&mut self, data: &[u8]) {
        let end = self.len + data.len();
        assert!(
            end <= self.capacity(),
            "append of {} bytes exceeds spare capacity {}",
            data.len(),
            self.capacity() - self.len
        );
        self.bytes[self.len..end].copy_from_slice(data);
        self.len = end;
    }

    /// Drop the first `n` filled bytes, shifting the remainder to the front.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the filled length.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.len, "consume of {n} bytes exceeds length {}", self.len);
        self.bytes.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Perform one read into the spare region and commit what arrived.
    ///
    /// Reads interrupted by a signal are re-issued. Returns the byte count,
    /// which is `0` when the peer has closed the stream.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        loop {
            match reader.read(self.spare_mut()) {
                Ok(n) => {
                    self.commit(n);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parse exactly one JSON value off the front of `bytes`.
///
/// Returns the value and the number of leading bytes it occupied (including
/// any whitespace before it). Trailing bytes are left alone. Returns `None`
/// when no complete value is present yet.
pub fn parse_leading_value(bytes: &[u8]) -> Option<(Value, usize)> {
    let mut stream = Deserializer::from_slice(bytes).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some((value, stream.byte_offset())),
        Some(Err(e)) => {
            if !e.is_eof() {
                tracing::trace!(error = %e, "buffered bytes are not valid JSON yet");
            }
            None
        }
        None => None,
    }
}

/// Read one complete JSON value, pulling from `reader` only when needed.
///
/// # Protocol
///
/// 1. If the buffer holds a complete value, consume it without reading
/// 2. If the buffer is full, discard it and report overflow
/// 3. Otherwise perform one blocking read and go back to 1
///
/// # Errors
///
/// - [`FrameError::Overflow`] - buffer full with no parseable value (buffer is cleared)
/// - [`FrameError::Closed`] - read returned zero bytes
/// - [`FrameError::Io`] - read failed
///
/// # Example
///
/// ```ignore
/// let value = read_message(&mut stream, &mut buffer)?;
/// ```
pub fn read_message<R: Read>(reader: &mut R, buffer: &mut ReceiveBuffer) -> Result<Value, FrameError> {
    loop {
        if !buffer.is_empty() {
            if let Some((value, consumed)) = parse_leading_value(buffer.filled()) {
                buffer.consume(consumed);
                tracing::debug!(consumed, retained = buffer.len(), "parsed response");
                return Ok(value);
            }
        }

        if buffer.is_full() {
            let capacity = buffer.capacity();
            buffer.clear();
            return Err(FrameError::Overflow(capacity));
        }

        match buffer.fill_from(reader) {
            Ok(0) => return Err(FrameError::Closed),
            Ok(n) => tracing::trace!(bytes = n, buffered = buffer.len(), "read from socket"),
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
}

/// Write one request line in a single `write_all`, then flush.
///
/// # Errors
///
/// Returns the I/O error if the write or flush fails.
pub fn write_message<W: Write>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Reader that hands out one scripted chunk per `read` call.
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
        reads: usize,
    }

    impl ChunkedReader {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                reads: 0,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    /// Reader that fails every call.
    struct FailingReader(io::ErrorKind);

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "scripted failure"))
        }
    }

    /// Reader that is interrupted once, then serves its payload.
    struct InterruptedOnce {
        payload: &'static [u8],
        reads: usize,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            if self.reads == 1 {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            let n = self.payload.len().min(buf.len());
            buf[..n].copy_from_slice(&self.payload[..n]);
            self.payload = &self.payload[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_buffer_append_and_consume() {
        let mut buffer = ReceiveBuffer::with_capacity(8);
        buffer.append(b"abcdef");
        buffer.consume(4);

        assert_eq!(buffer.filled(), b"ef");
        assert_eq!(buffer.len(), 2);

        buffer.append(b"ghijkl");
        assert!(buffer.is_full());
        assert_eq!(buffer.filled(), b"efghijkl");
    }

    #[test]
    #[should_panic(expected = "exceeds spare capacity")]
    fn test_buffer_append_past_capacity_panics() {
        let mut buffer = ReceiveBuffer::with_capacity(4);
        buffer.append(b"12345");
    }

    #[test]
    #[should_panic(expected = "exceeds length")]
    fn test_buffer_consume_past_length_panics() {
        let mut buffer = ReceiveBuffer::with_capacity(4);
        buffer.append(b"12");
        buffer.consume(3);
    }

    #[test]
    fn test_parse_leading_value_reports_consumed_bytes() {
        let bytes = br#"{"exitCode":0}{"exitCode":1}"#;
        let (value, consumed) = parse_leading_value(bytes).unwrap();

        assert_eq!(value, json!({"exitCode": 0}));
        assert_eq!(consumed, 14);
    }

    #[test]
    fn test_parse_leading_value_incomplete() {
        assert!(parse_leading_value(br#"{"exitCode":"#).is_none());
        assert!(parse_leading_value(b"\n  ").is_none());
    }

    #[test]
    fn test_read_message_reassembles_split_response() {
        let mut reader = ChunkedReader::new(&[b"{\"exitCode\"", b":0,\"stdout\":", b"\"1\\n2\"}"]);
        let mut buffer = ReceiveBuffer::new();

        let value = read_message(&mut reader, &mut buffer).unwrap();

        assert_eq!(value, json!({"exitCode": 0, "stdout": "1\n2"}));
        assert_eq!(reader.reads, 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_message_retains_second_message() {
        let mut reader = ChunkedReader::new(&[b"{\"exitCode\":0}\n{\"exitCode\":7}\n"]);
        let mut buffer = ReceiveBuffer::new();

        let first = read_message(&mut reader, &mut buffer).unwrap();
        assert_eq!(first, json!({"exitCode": 0}));
        assert_eq!(reader.reads, 1);

        let second = read_message(&mut reader, &mut buffer).unwrap();
        assert_eq!(second, json!({"exitCode": 7}));
        assert_eq!(reader.reads, 1, "second value must come from the buffer");
        assert_eq!(buffer.filled(), b"\n");
    }

    #[test]
    fn test_read_message_overflow_clears_buffer() {
        let mut reader = ChunkedReader::new(&[b"{\"stdout\":\"aaaaaaaaaaaaaaaa"]);
        let mut buffer = ReceiveBuffer::with_capacity(16);

        let err = read_message(&mut reader, &mut buffer).unwrap_err();

        assert!(matches!(err, FrameError::Overflow(16)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_message_closed_connection() {
        let mut reader = ChunkedReader::new(&[b"{\"exitCode\":"]);
        let mut buffer = ReceiveBuffer::new();

        let err = read_message(&mut reader, &mut buffer).unwrap_err();

        assert!(matches!(err, FrameError::Closed));
        assert_eq!(buffer.filled(), b"{\"exitCode\":");
    }

    #[test]
    fn test_read_message_io_error() {
        let mut reader = FailingReader(io::ErrorKind::ConnectionReset);
        let mut buffer = ReceiveBuffer::new();

        let err = read_message(&mut reader, &mut buffer).unwrap_err();

        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert!(err.to_string().contains("failed to receive data"));
    }

    #[test]
    fn test_read_message_reissues_interrupted_read() {
        let mut reader = InterruptedOnce {
            payload: br#"{"exitCode":0}"#,
            reads: 0,
        };
        let mut buffer = ReceiveBuffer::new();

        let value = read_message(&mut reader, &mut buffer).unwrap();

        assert_eq!(value, json!({"exitCode": 0}));
        assert_eq!(reader.reads, 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_message_sends_line() {
        let mut sink = Vec::new();
        write_message(&mut sink, b"{\"command\":\"x\"}\n").unwrap();

        assert_eq!(sink, b"{\"command\":\"x\"}\n");
    }
}
