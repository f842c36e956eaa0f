//! Fixed-capacity transmission buffers.
//!
//! Both the outbound payload and the captured server response live in a
//! [`FixedBuffer`] allocated once at startup and reused for every reading.
//! All writes go through a [`BoundedWriter`], which tracks the remaining
//! capacity itself and keeps the byte after the written content set to NUL,
//! so the content is at most `capacity - 1` bytes long.

use std::borrow::Cow;
use std::io;

/// Default capacity of the outbound payload buffer.
pub const PAYLOAD_BUFFER_SIZE: usize = 1024;
/// Default capacity of the inbound response buffer.
pub const RESPONSE_BUFFER_SIZE: usize = 4096;

/// What a [`BoundedWriter`] does with bytes that do not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Fail the write and leave the buffer untouched.
    Reject,
    /// Keep what fits and silently drop the rest.
    Truncate,
}

/// A heap buffer whose capacity never changes after construction.
#[derive(Debug, Clone)]
pub struct FixedBuffer {
    bytes: Box<[u8]>,
    len: usize,
}

impl FixedBuffer {
    /// Allocate a zeroed buffer. A capacity of 0 is raised to 1 so the
    /// terminator always has a slot.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity.max(1)].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Written content, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// True when the byte right after the content is NUL.
    pub fn is_terminated(&self) -> bool {
        self.bytes[self.len] == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.bytes[0] = 0;
    }

    /// Clear the buffer and start writing from the beginning.
    pub fn writer(&mut self, overflow: Overflow) -> BoundedWriter<'_> {
        self.clear();
        BoundedWriter {
            buf: self,
            overflow,
            truncated: false,
        }
    }
}

/// Append-only writer over a [`FixedBuffer`].
///
/// Remaining capacity is computed with saturating arithmetic and can never
/// wrap, so no write can land past the terminator slot.
#[derive(Debug)]
pub struct BoundedWriter<'a> {
    buf: &'a mut FixedBuffer,
    overflow: Overflow,
    truncated: bool,
}

impl BoundedWriter<'_> {
    /// Maximum content length (one byte is reserved for the terminator).
    pub fn limit(&self) -> usize {
        self.buf.capacity().saturating_sub(1)
    }

    pub fn remaining(&self) -> usize {
        self.limit().saturating_sub(self.buf.len)
    }

    pub fn len(&self) -> usize {
        self.buf.len
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len == 0
    }

    /// True once any byte has been dropped in [`Overflow::Truncate`] mode.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Append as much of `data` as the policy allows and return the number
    /// of bytes stored.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let room = self.remaining();
        let take = match self.overflow {
            Overflow::Reject if data.len() > room => return 0,
            Overflow::Reject => data.len(),
            Overflow::Truncate => data.len().min(room),
        };
        if take < data.len() {
            self.truncated = true;
        }
        let start = self.buf.len;
        self.buf.bytes[start..start + take].copy_from_slice(&data[..take]);
        self.buf.len = start + take;
        self.buf.bytes[self.buf.len] = 0;
        take
    }
}

impl io::Write for BoundedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        match self.overflow {
            Overflow::Reject => {
                if self.append(data) == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "bounded buffer is full",
                    ));
                }
                Ok(data.len())
            }
            Overflow::Truncate => {
                self.append(data);
                Ok(data.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The outbound and inbound buffers owned by the forwarding loop.
#[derive(Debug, Clone)]
pub struct TransmissionBuffers {
    pub payload: FixedBuffer,
    pub response: FixedBuffer,
}

impl TransmissionBuffers {
    pub fn new(payload_capacity: usize, response_capacity: usize) -> Self {
        Self {
            payload: FixedBuffer::with_capacity(payload_capacity),
            response: FixedBuffer::with_capacity(response_capacity),
        }
    }
}

impl Default for TransmissionBuffers {
    fn default() -> Self {
        Self::new(PAYLOAD_BUFFER_SIZE, RESPONSE_BUFFER_SIZE)
    }
}
