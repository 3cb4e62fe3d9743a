//! Bounded-allocation helper for reading length-prefixed sequences.
//!
//! A malformed or adversarial length prefix (e.g. `i32::MAX`) must not make
//! the client eagerly allocate gigabytes before discovering the socket ran
//! dry. `VecBuilder` grows in small steps validated against what the reader
//! actually produced instead of trusting the advertised length up front.

use std::io::Read;

use super::traits::ReadError;

const MAX_CHUNK: usize = 4096;

/// Grows towards a target capacity without ever allocating more than it has
/// confirmed the underlying reader can supply.
#[derive(Debug)]
pub struct VecBuilder<T> {
    inner: Vec<T>,
    remaining: usize,
}

impl<T> VecBuilder<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity.min(MAX_CHUNK)),
            remaining: capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        self.inner.push(value);
    }
}

impl VecBuilder<u8> {
    /// Reads exactly `remaining` bytes, growing the buffer in bounded chunks
    /// so a bogus length prefix fails fast instead of exhausting memory.
    pub fn read_exact<R>(mut self, reader: &mut R) -> Result<Self, ReadError>
    where
        R: Read,
    {
        let mut chunk = vec![0u8; 0];
        while self.remaining > 0 {
            let take = self.remaining.min(MAX_CHUNK);
            chunk.resize(take, 0);
            reader.read_exact(&mut chunk[..take])?;
            self.inner.extend_from_slice(&chunk[..take]);
            self.remaining -= take;
        }

        Ok(self)
    }
}

impl<T> From<VecBuilder<T>> for Vec<T> {
    fn from(builder: VecBuilder<T>) -> Self {
        builder.inner
    }
}
