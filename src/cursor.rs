use crate::error::{ApkError, ApkResult};

/// Bounds-checked little-endian reader over a byte buffer.
///
/// The cursor only ever moves forward through sequential reads and skips;
/// absolute [`seek`](ByteCursor::seek) is reserved for inter-chunk jumps by
/// the chunk-level decoders.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Fails unless at least `count` bytes are left to read.
    pub fn require(&self, count: usize) -> ApkResult<()> {
        if self.remaining() < count {
            return Err(ApkError::Truncated(format!(
                "Could not read {count} bytes from stream"
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> ApkResult<u8> {
        self.require(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> ApkResult<u16> {
        self.require(2)?;
        let value = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    pub fn read_i16(&mut self) -> ApkResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> ApkResult<u32> {
        self.require(4)?;
        let value = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> ApkResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads `count` raw bytes, advancing the cursor.
    pub fn read_bytes(&mut self, count: usize) -> ApkResult<&'a [u8]> {
        if self.remaining() < count {
            return Err(ApkError::Truncated(
                "Failed to read all data from stream".to_string(),
            ));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Moves the cursor to an absolute offset inside the buffer.
    pub fn seek(&mut self, offset: usize) -> ApkResult<()> {
        if offset > self.data.len() {
            return Err(ApkError::Malformed(
                "Attempted to seek past end of document".to_string(),
            ));
        }
        self.pos = offset;
        Ok(())
    }

    /// Skips forward by a signed byte count. Negative counts are rejected.
    pub fn skip(&mut self, count: i64) -> ApkResult<()> {
        if count < 0 {
            return Err(ApkError::Malformed("Cannot seek backward".to_string()));
        }
        let target = (self.pos as i64)
            .checked_add(count)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                ApkError::Malformed("Attempted to seek past end of document".to_string())
            })?;
        self.seek(target)
    }

    /// Skips forward to an absolute offset. Backward targets are rejected.
    pub fn skip_to(&mut self, offset: usize) -> ApkResult<()> {
        if offset < self.pos {
            return Err(ApkError::Malformed("Cannot seek backward".to_string()));
        }
        self.seek(offset)
    }

    /// Advances to the next multiple of `boundary`; no-op when already
    /// aligned. Returns whether the position changed.
    pub fn align_to(&mut self, boundary: usize) -> ApkResult<bool> {
        if boundary <= 1 {
            return Ok(false);
        }
        let rem = self.pos % boundary;
        if rem == 0 {
            return Ok(false);
        }
        self.skip((boundary - rem) as i64)?;
        Ok(true)
    }

    /// Reads a fixed-size UTF-16LE string field, trimming at the first NUL.
    pub fn read_fixed_utf16_string(&mut self, unit_count: usize) -> ApkResult<String> {
        self.require(unit_count * 2)?;
        let mut units = Vec::with_capacity(unit_count);
        for _ in 0..unit_count {
            let unit = self.read_u16()?;
            units.push(unit);
        }
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Ok(String::from_utf16_lossy(&units[..end]))
    }
}
