use crate::error::{Error, Result};
use crate::hashes::Hash256;

/// Positioned reader over a byte slice. All multi-byte integers are
/// little endian on the wire except where a `_be` accessor says otherwise.
pub struct ByteBufferParser<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> ByteBufferParser<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        ByteBufferParser { buffer, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    pub fn skip_bytes(&mut self, count: usize) -> Result<()> {
        self.eof_check(count)?;
        self.pos += count;
        Ok(())
    }

    pub fn read(&mut self, size: usize) -> Result<&'a [u8]> {
        self.eof_check(size)?;
        let range = self.pos..self.pos + size;
        self.pos += size;
        Ok(&self.buffer[range])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read(2)?.try_into().unwrap()))
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read(2)?.try_into().unwrap()))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read(4)?.try_into().unwrap()))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read(4)?.try_into().unwrap()))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read(8)?.try_into().unwrap()))
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read(8)?.try_into().unwrap()))
    }

    pub fn read_hash(&mut self) -> Result<Hash256> {
        Hash256::from_slice(self.read(32)?)
    }

    /// Variable length integer
    /// (https://en.bitcoin.it/wiki/Protocol_documentation#Variable_length_integer).
    /// Any of the four length forms is accepted.
    pub fn read_var_int(&mut self) -> Result<u64> {
        match self.read_u8()? {
            n if n < 0xfd => Ok(n as u64),
            0xfd => Ok(self.read_u16_le()? as u64),
            0xfe => Ok(self.read_u32_le()? as u64),
            _ => self.read_u64_le(),
        }
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_var_int()?;
        Ok(self.read(length as usize)?.to_vec())
    }

    pub fn read_var_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_var_bytes()?).into_owned())
    }

    fn eof_check(&self, want_bytes: usize) -> Result<()> {
        if self.remaining() < want_bytes {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }
}

/// Serialized size of `value` as a variable length integer.
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub struct ByteBufferComposer {
    buffer: Vec<u8>,
}

impl ByteBufferComposer {
    pub fn new() -> Self {
        ByteBufferComposer { buffer: vec![] }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteBufferComposer { buffer: Vec::with_capacity(capacity) }
    }

    pub fn result(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn push(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Always emits the shortest of the four variable length integer forms.
    pub fn append_var_int(&mut self, value: u64) {
        match value {
            0..=0xfc => self.buffer.push(value as u8),
            0xfd..=0xffff => {
                self.buffer.push(0xfd);
                self.append(&(value as u16).to_le_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buffer.push(0xfe);
                self.append(&(value as u32).to_le_bytes());
            }
            _ => {
                self.buffer.push(0xff);
                self.append(&value.to_le_bytes());
            }
        }
    }

    pub fn append_var_bytes(&mut self, bytes: &[u8]) {
        self.append_var_int(bytes.len() as u64);
        self.append(bytes);
    }

    pub fn append_var_string(&mut self, s: &str) {
        self.append_var_bytes(s.as_bytes());
    }
}

impl Default for ByteBufferComposer {
    fn default() -> Self {
        ByteBufferComposer::new()
    }
}

const IO_BUFFER_CHUNK: usize = 16 * 1024;

/// Reassembly buffer between the socket and the message framer. Grows as
/// needed; a block message can span many socket reads.
pub struct IOBuffer {
    buffer: Vec<u8>,
    /// length of valid content (starts at index 0)
    mark: usize,
}

impl IOBuffer {
    pub fn content(&self) -> &[u8] {
        &self.buffer[..self.mark]
    }

    /// Spare room after the valid content, for the next socket read.
    pub fn expose_writable_part(&mut self) -> &mut [u8] {
        if self.buffer.len() < self.mark + IO_BUFFER_CHUNK {
            self.buffer.resize(self.mark + IO_BUFFER_CHUNK, 0);
        }
        &mut self.buffer[self.mark..]
    }

    /// Increase the buffer mark by `size`.
    /// Makes the buffer aware of bytes written into the slice returned by
    /// [Self::expose_writable_part].
    pub fn register_added_content(&mut self, size: usize) {
        assert!(self.mark + size <= self.buffer.len());
        self.mark += size;
    }

    /// Removes `size` bytes from the beginning of the buffer.
    pub fn shift_left(&mut self, size: usize) {
        assert!(size <= self.mark);
        self.buffer.copy_within(size..self.mark, 0);
        self.mark -= size;
    }
}

impl Default for IOBuffer {
    fn default() -> Self {
        IOBuffer { buffer: vec![0; IO_BUFFER_CHUNK], mark: 0 }
    }
}
