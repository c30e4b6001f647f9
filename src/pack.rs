//! Fixed-width binary packing for index entries and data-segment scalars.
//!
//! Every record the store writes to shared memory — the index header, each
//! 16-byte index entry, each 4-byte data slot — has a fixed layout: an
//! ordered list of named fields, each with a scalar type code. This module
//! turns that declaration into a byte offset table once, then encodes and
//! decodes values against it with no further allocation.
//!
//! Byte order is host-native throughout. A producer and consumer of the same
//! segments must run on the same-endian host; this module does not attempt
//! to bridge the two.

use std::collections::HashMap;

/// A single scalar type code, using the `struct`-module-style codes
/// familiar from Python's `struct.pack`/`struct.unpack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Signed 8-bit integer (`c`)
    I8,
    /// Unsigned 8-bit integer (`C`)
    U8,
    /// Signed 16-bit integer (`s`)
    I16,
    /// Unsigned 16-bit integer (`S`)
    U16,
    /// Signed 32-bit integer (`l`)
    I32,
    /// Unsigned 32-bit integer (`L`)
    U32,
}

impl TypeCode {
    /// The byte-width of this type.
    pub fn len(self) -> usize {
        match self {
            TypeCode::I8 | TypeCode::U8 => 1,
            TypeCode::I16 | TypeCode::U16 => 2,
            TypeCode::I32 | TypeCode::U32 => 4,
        }
    }

    /// The single-character wire code stored in an index entry's `type` byte.
    pub fn code_char(self) -> u8 {
        match self {
            TypeCode::I8 => b'c',
            TypeCode::U8 => b'C',
            TypeCode::I16 => b's',
            TypeCode::U16 => b'S',
            TypeCode::I32 => b'l',
            TypeCode::U32 => b'L',
        }
    }

    /// Reverse of [`TypeCode::code_char`]; `None` for an unrecognized byte.
    pub fn from_code_char(c: u8) -> Option<Self> {
        match c {
            b'c' => Some(TypeCode::I8),
            b'C' => Some(TypeCode::U8),
            b's' => Some(TypeCode::I16),
            b'S' => Some(TypeCode::U16),
            b'l' => Some(TypeCode::I32),
            b'L' => Some(TypeCode::U32),
            _ => None,
        }
    }
}

/// An ordered (field name, type) declaration and its derived byte offsets.
#[derive(Debug, Clone)]
pub struct Format {
    fields: Vec<(String, TypeCode, usize)>,
    record_length: usize,
}

impl Format {
    /// Build a format from an ordered list of `(field_name, type)` pairs.
    pub fn new(fields: &[(&str, TypeCode)]) -> Self {
        let mut offset = 0;
        let mut laid_out = Vec::with_capacity(fields.len());
        for &(name, ty) in fields {
            laid_out.push((name.to_string(), ty, offset));
            offset += ty.len();
        }
        Self {
            fields: laid_out,
            record_length: offset,
        }
    }

    /// Total encoded width of one record.
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Byte offset and type of a named field, if present.
    pub fn field(&self, name: &str) -> Option<(usize, TypeCode)> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, ty, off)| (*off, *ty))
    }

    /// Encode a single unsigned field value into `buf` at the field's offset.
    ///
    /// `buf` must be at least [`Format::record_length`] bytes.
    pub fn encode_u64(&self, buf: &mut [u8], name: &str, value: u64) {
        let (offset, ty) = self
            .field(name)
            .unwrap_or_else(|| panic!("unknown field '{name}' in format"));
        let end = offset + ty.len();
        match ty {
            TypeCode::U8 | TypeCode::I8 => buf[offset] = value as u8,
            TypeCode::U16 | TypeCode::I16 => {
                buf[offset..end].copy_from_slice(&(value as u16).to_ne_bytes())
            }
            TypeCode::U32 | TypeCode::I32 => {
                buf[offset..end].copy_from_slice(&(value as u32).to_ne_bytes())
            }
        }
    }

    /// Decode a single unsigned field value out of `buf`.
    pub fn decode_u64(&self, buf: &[u8], name: &str) -> u64 {
        let (offset, ty) = self
            .field(name)
            .unwrap_or_else(|| panic!("unknown field '{name}' in format"));
        let end = offset + ty.len();
        match ty {
            TypeCode::U8 | TypeCode::I8 => buf[offset] as u64,
            TypeCode::U16 | TypeCode::I16 => {
                u16::from_ne_bytes(buf[offset..end].try_into().unwrap()) as u64
            }
            TypeCode::U32 | TypeCode::I32 => {
                u32::from_ne_bytes(buf[offset..end].try_into().unwrap()) as u64
            }
        }
    }

    /// Encode a signed field value (used for `instance`, which is `i32`).
    pub fn encode_i64(&self, buf: &mut [u8], name: &str, value: i64) {
        let (offset, ty) = self
            .field(name)
            .unwrap_or_else(|| panic!("unknown field '{name}' in format"));
        let end = offset + ty.len();
        match ty {
            TypeCode::I8 | TypeCode::U8 => buf[offset] = value as u8,
            TypeCode::I16 | TypeCode::U16 => {
                buf[offset..end].copy_from_slice(&(value as i16).to_ne_bytes())
            }
            TypeCode::I32 | TypeCode::U32 => {
                buf[offset..end].copy_from_slice(&(value as i32).to_ne_bytes())
            }
        }
    }

    /// Decode a signed field value.
    pub fn decode_i64(&self, buf: &[u8], name: &str) -> i64 {
        let (offset, ty) = self
            .field(name)
            .unwrap_or_else(|| panic!("unknown field '{name}' in format"));
        let end = offset + ty.len();
        match ty {
            TypeCode::I8 | TypeCode::U8 => buf[offset] as i8 as i64,
            TypeCode::I16 | TypeCode::U16 => {
                i16::from_ne_bytes(buf[offset..end].try_into().unwrap()) as i64
            }
            TypeCode::I32 | TypeCode::U32 => {
                i32::from_ne_bytes(buf[offset..end].try_into().unwrap()) as i64
            }
        }
    }
}

/// A cache of [`Format`]s keyed by a caller-supplied id, owned by whichever
/// component builds formats repeatedly (the index manager). Deliberately not
/// a process-global: each store instance gets its own cache.
#[derive(Debug, Default)]
pub struct FormatCache {
    formats: HashMap<&'static str, Format>,
}

impl FormatCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the format for `id`, building it from `fields` on first use.
    pub fn get_or_build(&mut self, id: &'static str, fields: &[(&str, TypeCode)]) -> &Format {
        self.formats
            .entry(id)
            .or_insert_with(|| Format::new(fields))
    }
}

/// Format id and field layout for a 16-byte index entry.
pub const INDEX_ENTRY_FIELDS: &[(&str, TypeCode)] = &[
    ("flags", TypeCode::U8),
    ("type", TypeCode::U8),
    ("length", TypeCode::U16),
    ("offset", TypeCode::U32),
    ("cluster", TypeCode::U16),
    ("item", TypeCode::U16),
    ("instance", TypeCode::I32),
];

/// Byte width of one index entry.
pub const INDEX_ENTRY_LEN: usize = 16;

/// Byte width of the index segment header.
pub const INDEX_HEADER_LEN: usize = 12;
