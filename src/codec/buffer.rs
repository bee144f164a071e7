//! Big-endian byte buffers with varint lengths and flagged strings

use crate::error::{CodecError, CodecResult};

/// Single byte used for a null string
const NULL_STRING: u8 = 0x80;

#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Unsigned LEB128
    pub fn write_var_u32(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed opaque blob
    pub fn write_blob(&mut self, bytes: &[u8]) {
        self.write_var_u32(bytes.len() as u32);
        self.write_bytes(bytes);
    }

    pub fn write_string(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.buf.push(NULL_STRING);
            return;
        };
        let count = value.chars().count() as u32 + 1;
        // First byte: bit 7 marks the length form, bit 6 continues, six value bits.
        let mut first = 0x80 | (count & 0x3F) as u8;
        let rest = count >> 6;
        if rest > 0 {
            first |= 0x40;
        }
        self.buf.push(first);
        if rest > 0 {
            self.write_var_u32(rest);
        }
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_string(Some(value));
    }
}

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

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_be_bytes(raw))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_var_u32(&mut self) -> CodecResult<u32> {
        let start = self.pos;
        let mut result: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            result |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(CodecError::InvalidField {
            field: "varint",
            value: start as i64,
        })
    }

    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.take(len)
    }

    pub fn read_blob(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_var_u32()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self) -> CodecResult<Option<String>> {
        let start = self.pos;
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return self.read_ascii(start).map(Some);
        }

        let mut count = u32::from(first & 0x3F);
        if first & 0x40 != 0 {
            count |= self.read_var_u32()? << 6;
        }
        match count {
            0 => Ok(None),
            1 => Ok(Some(String::new())),
            n => self.read_utf8_chars(start, (n - 1) as usize).map(Some),
        }
    }

    /// Non-null string; a null on the wire reads as empty.
    pub fn read_str(&mut self) -> CodecResult<String> {
        Ok(self.read_string()?.unwrap_or_default())
    }

    fn read_ascii(&mut self, start: usize) -> CodecResult<String> {
        // The first byte is already consumed; step back and scan to the terminator.
        self.pos = start;
        let mut out = String::new();
        loop {
            let byte = self.read_u8()?;
            out.push((byte & 0x7F) as char);
            if byte & 0x80 != 0 {
                return Ok(out);
            }
        }
    }

    fn read_utf8_chars(&mut self, start: usize, chars: usize) -> CodecResult<String> {
        let begin = self.pos;
        for _ in 0..chars {
            let lead = self.read_u8()?;
            let width = match lead {
                0x00..=0x7F => 1,
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => return Err(CodecError::InvalidString(start)),
            };
            self.take(width - 1)?;
        }
        std::str::from_utf8(&self.data[begin..self.pos])
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidString(start))
    }
}
