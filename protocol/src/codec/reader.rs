//! Bounds-checked little-endian cursor over an encoded payload.
//!
//! Every read checks the remaining length first. A length field that points
//! past the end of the buffer is reported as `CorruptData`, never a panic.

use crate::error::{LedgerError, Result};

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(LedgerError::corrupt(format!(
                "{what}: need {len} bytes at offset {}, only {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_u32(&mut self, what: &str) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn read_i64(&mut self, what: &str) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(i64::from_le_bytes(raw))
    }

    pub fn read_array32(&mut self, what: &str) -> Result<[u8; 32]> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.take(32, what)?);
        Ok(out)
    }

    /// `len(4) ++ bytes`.
    pub fn read_prefixed(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.read_u32(what)? as usize;
        self.take(len, what)
    }

    /// `count(4) ++ count * 32 bytes`. The count is checked against the
    /// remaining buffer before anything is allocated.
    pub fn read_hash_list(&mut self, what: &str) -> Result<Vec<[u8; 32]>> {
        let count = self.read_u32(what)? as usize;
        let needed = count
            .checked_mul(32)
            .ok_or_else(|| LedgerError::corrupt(format!("{what}: count {count} overflows")))?;
        let raw = self.take(needed, what)?;
        Ok(raw
            .chunks_exact(32)
            .map(|chunk| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }

    /// Fail unless every byte was consumed.
    pub fn finish(&self, what: &str) -> Result<()> {
        if self.remaining() != 0 {
            return Err(LedgerError::corrupt(format!(
                "{what}: {} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reads_little_endian() {
        let buf = [0x01, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u32("a").unwrap(), 1);
        assert_eq!(r.read_i64("b").unwrap(), -1);
        assert!(r.finish("buf").is_ok());
    }

    #[test]
    fn prefix_past_end_is_corrupt() {
        let mut buf = 100u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 10]);
        let err = ByteReader::new(&buf).read_prefixed("key").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn huge_hash_count_is_corrupt() {
        let buf = u32::MAX.to_le_bytes();
        let err = ByteReader::new(&buf).read_hash_list("cards").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let buf = [1u8, 2];
        let mut r = ByteReader::new(&buf);
        r.read_u8("x").unwrap();
        assert!(r.finish("payload").is_err());
    }
}
