//! Little-endian binary archive
//!
//! Fixed-width values are written little-endian. Strings and byte blobs are
//! prefixed with a `u32` length.

use crate::error::ArchiveError;

/// Growable output archive
#[derive(Debug, Default, Clone)]
pub struct ArchiveWriter {
    bytes: Vec<u8>,
}

macro_rules! writer_methods {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: $ty) {
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    writer_methods!(
        write_u8: u8, write_u16: u16, write_u32: u32, write_u64: u64,
        write_i8: i8, write_i16: i16, write_i32: i32, write_i64: i64,
        write_f32: f32, write_f64: f64,
    );

    /// Write a collection length or other count
    pub fn write_len(&mut self, len: usize) -> Result<(), ArchiveError> {
        let len = u32::try_from(len).map_err(|_| ArchiveError::LengthOverflow(len))?;
        self.write_u32(len);
        Ok(())
    }

    /// Write raw bytes without a length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Write a length-prefixed byte blob
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.write_len(bytes.len())?;
        self.write_raw(bytes);
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_str(&mut self, text: &str) -> Result<(), ArchiveError> {
        self.write_bytes(text.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Cursor over an input archive
#[derive(Debug, Clone)]
pub struct ArchiveReader<'b> {
    bytes: &'b [u8],
    pos: usize,
}

macro_rules! reader_methods {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty, ArchiveError> {
                let raw = self.read_raw(std::mem::size_of::<$ty>())?;
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(raw);
                Ok(<$ty>::from_le_bytes(buf))
            }
        )*
    };
}

impl<'b> ArchiveReader<'b> {
    pub fn new(bytes: &'b [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    reader_methods!(
        read_u8: u8, read_u16: u16, read_u32: u32, read_u64: u64,
        read_i8: i8, read_i16: i16, read_i32: i32, read_i64: i64,
        read_f32: f32, read_f64: f64,
    );

    pub fn read_len(&mut self) -> Result<usize, ArchiveError> {
        Ok(self.read_u32()? as usize)
    }

    /// Read `len` raw bytes
    pub fn read_raw(&mut self, len: usize) -> Result<&'b [u8], ArchiveError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ArchiveError::UnexpectedEof {
                needed: len,
                remaining,
            });
        }
        let raw = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(raw)
    }

    /// Read a length-prefixed byte blob
    pub fn read_bytes(&mut self) -> Result<&'b [u8], ArchiveError> {
        let len = self.read_len()?;
        self.read_raw(len)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_str(&mut self) -> Result<&'b str, ArchiveError> {
        let raw = self.read_bytes()?;
        std::str::from_utf8(raw).map_err(|_| ArchiveError::InvalidUtf8)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ArchiveError> {
        self.read_raw(len).map(|_| ())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }
}
