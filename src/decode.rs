//! Companion decoder: MessagePack bytes back into dynamic [`Value`]s.

use std::io::{self, Read};

use crate::marker::*;
use crate::value::Value;
use crate::{Error, Result};

/// Reads consecutive MessagePack values from a byte source.
pub struct Decoder<R: Read> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads the next value. Returns `Ok(None)` when the source ends cleanly
    /// before a new value starts.
    pub fn next_value(&mut self) -> Result<Option<Value>> {
        match self.read_marker()? {
            Some(marker) => self.read_value(marker).map(Some),
            None => Ok(None),
        }
    }

    fn read_marker(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        })
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads `len` payload bytes without trusting `len` for the allocation.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let read = (&mut self.reader).take(len as u64).read_to_end(&mut data)?;
        if read != len {
            return Err(Error::UnexpectedEof);
        }
        Ok(data)
    }

    fn read_str(&mut self, len: usize) -> Result<Value> {
        let data = self.read_bytes(len)?;
        String::from_utf8(data)
            .map(Value::Str)
            .map_err(|_| Error::InvalidUtf8)
    }

    fn read_array(&mut self, len: usize) -> Result<Value> {
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.read_item()?);
        }
        Ok(Value::Array(items))
    }

    fn read_map(&mut self, len: usize) -> Result<Value> {
        let mut entries = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = self.read_item()?;
            let value = self.read_item()?;
            entries.push((key, value));
        }
        Ok(Value::Map(entries))
    }

    fn read_ext(&mut self, len: usize) -> Result<Value> {
        let code = self.read_u8()?;
        Ok(Value::Ext(code, self.read_bytes(len)?))
    }

    /// A value nested in a container: the source must not end here.
    fn read_item(&mut self) -> Result<Value> {
        let marker = self.read_u8()?;
        self.read_value(marker)
    }

    fn read_value(&mut self, marker: u8) -> Result<Value> {
        Ok(match marker {
            0x00..=POS_FIXINT_MAX => Value::UInteger(marker as u64),
            0x80..=0x8f => return self.read_map((marker & 0x0f) as usize),
            0x90..=0x9f => return self.read_array((marker & 0x0f) as usize),
            0xa0..=0xbf => return self.read_str((marker & 0x1f) as usize),
            0xe0..=0xff => Value::Integer(marker as i8 as i64),

            NIL => Value::Nil,
            FALSE => Value::Bool(false),
            TRUE => Value::Bool(true),
            NEVER_USED => return Err(Error::InvalidMarker(marker)),

            BIN8 => {
                let len = self.read_u8()? as usize;
                Value::Bin(self.read_bytes(len)?)
            }
            BIN16 => {
                let len = self.read_u16()? as usize;
                Value::Bin(self.read_bytes(len)?)
            }
            BIN32 => {
                let len = self.read_u32()? as usize;
                Value::Bin(self.read_bytes(len)?)
            }

            EXT8 => {
                let len = self.read_u8()? as usize;
                return self.read_ext(len);
            }
            EXT16 => {
                let len = self.read_u16()? as usize;
                return self.read_ext(len);
            }
            EXT32 => {
                let len = self.read_u32()? as usize;
                return self.read_ext(len);
            }

            FLOAT32 => Value::F32(f32::from_bits(self.read_u32()?)),
            FLOAT64 => Value::F64(f64::from_bits(self.read_u64()?)),

            UINT8 => Value::UInteger(self.read_u8()? as u64),
            UINT16 => Value::UInteger(self.read_u16()? as u64),
            UINT32 => Value::UInteger(self.read_u32()? as u64),
            UINT64 => Value::UInteger(self.read_u64()?),

            INT8 => Value::Integer(self.read_u8()? as i8 as i64),
            INT16 => Value::Integer(self.read_u16()? as i16 as i64),
            INT32 => Value::Integer(self.read_u32()? as i32 as i64),
            INT64 => Value::Integer(self.read_u64()? as i64),

            FIXEXT1 => return self.read_ext(1),
            FIXEXT2 => return self.read_ext(2),
            FIXEXT4 => return self.read_ext(4),
            FIXEXT8 => return self.read_ext(8),
            FIXEXT16 => return self.read_ext(16),

            STR8 => {
                let len = self.read_u8()? as usize;
                return self.read_str(len);
            }
            STR16 => {
                let len = self.read_u16()? as usize;
                return self.read_str(len);
            }
            STR32 => {
                let len = self.read_u32()? as usize;
                return self.read_str(len);
            }

            ARRAY16 => {
                let len = self.read_u16()? as usize;
                return self.read_array(len);
            }
            ARRAY32 => {
                let len = self.read_u32()? as usize;
                return self.read_array(len);
            }
            MAP16 => {
                let len = self.read_u16()? as usize;
                return self.read_map(len);
            }
            MAP32 => {
                let len = self.read_u32()? as usize;
                return self.read_map(len);
            }
        })
    }
}
