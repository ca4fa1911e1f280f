//! Big-endian field encoding for the head block
//!
//! [`ByteWriter`] has a fixed capacity computed up front. Writing past it is
//! an encoding bug, not bad input, and fails with `CiphError::Encoding`.

use ciph_core::{CiphError, CiphResult};

#[derive(Debug)]
pub struct ByteWriter {
    buf: Vec<u8>,
    capacity: usize,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Everything written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> CiphResult<()> {
        if bytes.len() > self.remaining() {
            return Err(CiphError::Encoding(format!(
                "write of {} bytes at {} overflows capacity {}",
                bytes.len(),
                self.position(),
                self.capacity
            )));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> CiphResult<()> {
        self.write_bytes(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> CiphResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> CiphResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> CiphResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> CiphResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Returns the buffer, which must be filled to exactly its capacity.
    pub fn finish(self) -> CiphResult<Vec<u8>> {
        if self.buf.len() != self.capacity {
            return Err(CiphError::Encoding(format!(
                "wrote {} of {} bytes",
                self.buf.len(),
                self.capacity
            )));
        }
        Ok(self.buf)
    }
}

/// Bounds-checked cursor over a byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Everything read so far.
    pub fn consumed(&self) -> &'a [u8] {
        &self.data[..self.pos]
    }

    pub fn read_bytes(&mut self, len: usize) -> CiphResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CiphError::Encoding(format!(
                "read of {len} bytes at {} past end ({})",
                self.pos,
                self.data.len()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> CiphResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> CiphResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> CiphResult<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> CiphResult<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> CiphResult<u64> {
        self.read_array().map(u64::from_be_bytes)
    }

    pub fn read_f64(&mut self) -> CiphResult<f64> {
        self.read_array().map(f64::from_be_bytes)
    }
}
