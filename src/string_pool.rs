use crate::cursor::ByteCursor;
use crate::error::{ApkError, ApkResult};
use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug)]
    struct StringPoolFlags: u32 {
        const SORTED = 0x0001;
        const UTF8 = 0x0100;
    }
}

/// An indexed array of strings decoded from a `RES_STRING_POOL_TYPE` chunk.
///
/// The pool is referenced by integer index from attribute and entry records
/// elsewhere in the resource table; indices never change after construction.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    /// Decodes a string pool. The cursor must be positioned right after the
    /// 8-byte chunk header; `chunk_start` is the absolute offset of that
    /// header (string offsets are relative to the chunk's own start).
    pub fn parse(cur: &mut ByteCursor<'_>, chunk_start: usize) -> ApkResult<Self> {
        cur.require(20)?;
        let string_count = cur.read_i32()?;
        let _style_count = cur.read_i32()?;
        let flags = StringPoolFlags::from_bits_retain(cur.read_u32()?);
        let strings_start = cur.read_i32()?;
        let _styles_start = cur.read_i32()?;

        let is_utf8 = flags.contains(StringPoolFlags::UTF8);

        let string_count = usize::try_from(string_count).map_err(|_| {
            ApkError::Malformed("Invalid string count in string pool".to_string())
        })?;
        let strings_start = usize::try_from(strings_start).map_err(|_| {
            ApkError::Malformed("Invalid string data offset in string pool".to_string())
        })?;

        let mut offsets = Vec::new();
        for _ in 0..string_count {
            offsets.push(cur.read_i32()?);
        }

        let mut strings = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let offset = usize::try_from(offset).map_err(|_| {
                ApkError::Malformed("Invalid string offset in string pool".to_string())
            })?;
            cur.skip_to(chunk_start + strings_start + offset)?;
            let text = if is_utf8 {
                read_utf8_string(cur)?
            } else {
                read_utf16_string(cur)?
            };
            strings.push(text);
        }

        Ok(StringPool { strings })
    }

    /// Looks up a string by the (signed) index stored in the wire format.
    pub fn get(&self, index: i32) -> ApkResult<&str> {
        if index < 0 {
            return Err(ApkError::Malformed(
                "Invalid string index: Must not be negative".to_string(),
            ));
        }
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                ApkError::Malformed(format!("Invalid string index: {index} is out of range"))
            })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

fn read_utf16_string(cur: &mut ByteCursor<'_>) -> ApkResult<String> {
    if cur.remaining() < 2 {
        return Err(ApkError::Truncated(
            "Failed to read ushort from stream".to_string(),
        ));
    }
    let length = cur.read_u16()?;
    // A set high bit would signal a two-word length; reject it as overlong.
    if length & 0x8000 != 0 {
        return Err(ApkError::Malformed(
            "Length of Utf16 string is supposed to be >32768.".to_string(),
        ));
    }
    if length == 0 {
        return Ok(String::new());
    }
    let bytes = cur.read_bytes(length as usize * 2)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

fn read_utf8_string(cur: &mut ByteCursor<'_>) -> ApkResult<String> {
    let _char_count = read_utf8_length(cur)?;
    let byte_count = read_utf8_length(cur)?;
    if byte_count == 0 {
        return Ok(String::new());
    }
    let bytes = cur.read_bytes(byte_count)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf8_length(cur: &mut ByteCursor<'_>) -> ApkResult<usize> {
    let first = cur.read_u8()? as usize;
    if first & 0x80 != 0 {
        let second = cur.read_u8()? as usize;
        Ok(((first & 0x7F) << 8) | second)
    } else {
        Ok(first)
    }
}
