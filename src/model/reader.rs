//! Little-endian cursor over the serialized model buffer.
//!
//! Table references in the wire format are signed 32-bit deltas relative to
//! the file position of the stored delta itself. Every read is bounds
//! checked and failures surface as `InvalidModel`.

use crate::status::{Result, Status};

pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn at(bytes: &'a [u8], pos: usize) -> Result<Self> {
        if pos > bytes.len() {
            return Err(Status::invalid_model(format!(
                "table offset {pos} past end of {}-byte buffer",
                bytes.len()
            )));
        }
        Ok(Self { bytes, pos })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            Status::invalid_model("model buffer offset overflow".to_string())
        })?;
        if end > self.bytes.len() {
            return Err(Status::invalid_model(format!(
                "truncated model buffer: need {end} bytes, have {}",
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a signed delta and resolve it against the delta's own position.
    pub fn read_offset(&mut self) -> Result<usize> {
        let slot = self.pos;
        let delta = self.read_i32()? as i64;
        let target = slot as i64 + delta;
        if target < 0 || target as usize > self.bytes.len() {
            return Err(Status::invalid_model(format!(
                "table delta at {slot} points outside the buffer"
            )));
        }
        Ok(target as usize)
    }

    /// Read an element count, rejecting counts that cannot possibly fit in
    /// the remaining buffer so a corrupt file cannot drive huge allocations.
    pub fn read_count(&mut self) -> Result<usize> {
        let count = self.read_u32()? as usize;
        if count > self.bytes.len() {
            return Err(Status::invalid_model(format!(
                "implausible element count {count} in {}-byte buffer",
                self.bytes.len()
            )));
        }
        Ok(count)
    }
}
