//! Helper to grow vectors whose final size is announced by untrusted input.
//!
//! A length prefix read from the wire can claim gigabytes. Instead of
//! pre-allocating what the peer claims, memory is reserved in bounded blocks as
//! data actually arrives.
use std::io::Read;

/// Upper bound for a single reservation, in bytes.
const DEFAULT_BLOCK_SIZE: usize = 1024 * 10;

#[derive(Debug)]
pub struct VecBuilder<T> {
    remaining: usize,
    block_len: usize,
    data: Vec<T>,
}

impl<T> VecBuilder<T> {
    pub fn new(expected_len: usize) -> Self {
        let block_len = (DEFAULT_BLOCK_SIZE / std::mem::size_of::<T>().max(1)).max(1);

        Self {
            remaining: expected_len,
            block_len,
            data: Vec::with_capacity(expected_len.min(block_len)),
        }
    }

    pub fn push(&mut self, elem: T) {
        if self.data.len() == self.data.capacity() {
            self.data.reserve(self.remaining.min(self.block_len).max(1));
        }

        self.data.push(elem);
        self.remaining = self.remaining.saturating_sub(1);
    }
}

impl VecBuilder<u8> {
    /// Fill the builder with exactly the announced number of bytes.
    pub fn read_exact<R>(mut self, reader: &mut R) -> Result<Self, std::io::Error>
    where
        R: Read,
    {
        while self.remaining > 0 {
            let chunk = self.remaining.min(self.block_len);
            let start = self.data.len();

            self.data.resize(start + chunk, 0);
            reader.read_exact(&mut self.data[start..])?;

            self.remaining -= chunk;
        }

        Ok(self)
    }
}

impl<T> From<VecBuilder<T>> for Vec<T> {
    fn from(builder: VecBuilder<T>) -> Self {
        builder.data
    }
}
