//! portcullis/src/nbt.rs
//! Gzip-compressed NBT documents.
//!
//! The wire form is a gzip stream holding one root compound:
//! `tag-byte(Compound) + string(name) + {tag-byte + string(key) + value}* +
//! End`. Strings inside NBT use a 2-byte big-endian length prefix, which is
//! deliberately not the VarInt-prefixed string used elsewhere on the wire.

use crate::error::{ProtocolError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// The full NBT tag space. Only the scalar tags, strings, and compounds are
/// representable as values; the array and list tags decode to a clear
/// unsupported-tag failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NbtTag {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl NbtTag {
    pub fn from_u8(byte: u8) -> Option<NbtTag> {
        match byte {
            0 => Some(NbtTag::End),
            1 => Some(NbtTag::Byte),
            2 => Some(NbtTag::Short),
            3 => Some(NbtTag::Int),
            4 => Some(NbtTag::Long),
            5 => Some(NbtTag::Float),
            6 => Some(NbtTag::Double),
            7 => Some(NbtTag::ByteArray),
            8 => Some(NbtTag::String),
            9 => Some(NbtTag::List),
            10 => Some(NbtTag::Compound),
            11 => Some(NbtTag::IntArray),
            12 => Some(NbtTag::LongArray),
            _ => None,
        }
    }
}

/// One NBT value. Compound is the only recursively nestable variant; depth is
/// bounded only by the input data.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Compound(NbtCompound),
}

impl NbtValue {
    pub fn tag(&self) -> NbtTag {
        match self {
            NbtValue::Byte(_) => NbtTag::Byte,
            NbtValue::Short(_) => NbtTag::Short,
            NbtValue::Int(_) => NbtTag::Int,
            NbtValue::Long(_) => NbtTag::Long,
            NbtValue::Float(_) => NbtTag::Float,
            NbtValue::Double(_) => NbtTag::Double,
            NbtValue::String(_) => NbtTag::String,
            NbtValue::Compound(_) => NbtTag::Compound,
        }
    }
}

/// A named mapping from string keys to NBT values. Keys are kept ordered so
/// the encoded form is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NbtCompound {
    pub name: String,
    pub entries: BTreeMap<String, NbtValue>,
}

impl NbtCompound {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: NbtValue) {
        self.entries.insert(key.into(), value);
    }

    /// Encodes the document as a gzip stream with this compound at the root.
    pub fn to_gzip_bytes(&self) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[NbtTag::Compound as u8])?;
        write_compound_body(&mut encoder, self)?;
        Ok(encoder.finish()?)
    }

    /// Decodes a gzip stream whose root must be a compound tag.
    pub fn from_gzip_bytes(data: &[u8]) -> Result<NbtCompound> {
        let mut decoder = GzDecoder::new(data);
        let root = read_tag(&mut decoder)?;
        if root != NbtTag::Compound {
            return Err(ProtocolError::NbtFormat(format!(
                "expected root compound tag, got {root:?}"
            )));
        }
        read_compound_body(&mut decoder)
    }
}

fn write_nbt_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(ProtocolError::NbtFormat(format!(
            "string of {} bytes exceeds the 2-byte length prefix",
            bytes.len()
        )));
    }
    writer.write_all(&(bytes.len() as u16).to_be_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

fn write_compound_body<W: Write>(writer: &mut W, compound: &NbtCompound) -> Result<()> {
    write_nbt_string(writer, &compound.name)?;
    for (key, value) in &compound.entries {
        writer.write_all(&[value.tag() as u8])?;
        write_nbt_string(writer, key)?;
        write_value(writer, value)?;
    }
    writer.write_all(&[NbtTag::End as u8])?;
    Ok(())
}

fn write_value<W: Write>(writer: &mut W, value: &NbtValue) -> Result<()> {
    match value {
        NbtValue::Byte(v) => writer.write_all(&v.to_be_bytes())?,
        NbtValue::Short(v) => writer.write_all(&v.to_be_bytes())?,
        NbtValue::Int(v) => writer.write_all(&v.to_be_bytes())?,
        NbtValue::Long(v) => writer.write_all(&v.to_be_bytes())?,
        NbtValue::Float(v) => writer.write_all(&v.to_be_bytes())?,
        NbtValue::Double(v) => writer.write_all(&v.to_be_bytes())?,
        NbtValue::String(v) => write_nbt_string(writer, v)?,
        NbtValue::Compound(v) => write_compound_body(writer, v)?,
    }
    Ok(())
}

fn read_bytes<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|e| ProtocolError::NbtFormat(format!("truncated document: {e}")))?;
    Ok(buf)
}

fn read_tag<R: Read>(reader: &mut R) -> Result<NbtTag> {
    let byte = read_bytes::<R, 1>(reader)?[0];
    NbtTag::from_u8(byte).ok_or_else(|| ProtocolError::NbtFormat(format!("unknown tag {byte}")))
}

fn read_nbt_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = u16::from_be_bytes(read_bytes(reader)?) as usize;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| ProtocolError::NbtFormat(format!("truncated string: {e}")))?;
    Ok(String::from_utf8(buf)?)
}

fn read_compound_body<R: Read>(reader: &mut R) -> Result<NbtCompound> {
    let mut compound = NbtCompound::new(read_nbt_string(reader)?);
    loop {
        let tag = read_tag(reader)?;
        if tag == NbtTag::End {
            return Ok(compound);
        }
        let key = read_nbt_string(reader)?;
        let value = read_value(reader, tag)?;
        compound.entries.insert(key, value);
    }
}

fn read_value<R: Read>(reader: &mut R, tag: NbtTag) -> Result<NbtValue> {
    match tag {
        NbtTag::Byte => Ok(NbtValue::Byte(i8::from_be_bytes(read_bytes(reader)?))),
        NbtTag::Short => Ok(NbtValue::Short(i16::from_be_bytes(read_bytes(reader)?))),
        NbtTag::Int => Ok(NbtValue::Int(i32::from_be_bytes(read_bytes(reader)?))),
        NbtTag::Long => Ok(NbtValue::Long(i64::from_be_bytes(read_bytes(reader)?))),
        NbtTag::Float => Ok(NbtValue::Float(f32::from_be_bytes(read_bytes(reader)?))),
        NbtTag::Double => Ok(NbtValue::Double(f64::from_be_bytes(read_bytes(reader)?))),
        NbtTag::String => Ok(NbtValue::String(read_nbt_string(reader)?)),
        NbtTag::Compound => Ok(NbtValue::Compound(read_compound_body(reader)?)),
        NbtTag::End => Err(ProtocolError::NbtFormat(
            "unexpected End tag in value position".to_string(),
        )),
        NbtTag::ByteArray | NbtTag::List | NbtTag::IntArray | NbtTag::LongArray => Err(
            ProtocolError::NbtFormat(format!("unsupported tag {tag:?}")),
        ),
    }
}
