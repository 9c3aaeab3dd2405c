//! The tuple wire format and the operations that interpret it: sizing,
//! single-field extraction, projection, and predicate evaluation.
//!
//! ```text
//! [ null-indicator : ceil(N/8) bytes ] [ field0 ] [ field1 ] ... [ fieldN-1 ]
//! ```
//!
//! `N` is the number of attributes in the caller's descriptor. Bit
//! `7 - (i % 8)` of byte `i / 8` of the null indicator marks attribute `i` as
//! null (MSB-first); a null field consumes zero bytes of payload. A non-null
//! `Int32`/`Float32` field is 4 bytes; a non-null `VarChar` field is a
//! little-endian `i32` length followed by that many bytes, no terminator.

use std::cmp::Ordering;

use crate::attribute::{AttrType, Attribute, CompOp};
use crate::error::{Error, Result};

fn null_indicator_size(num_fields: usize) -> usize {
    (num_fields + 7) / 8
}

fn is_null(null_indicator: &[u8], i: usize) -> bool {
    let byte = i / 8;
    let bit = 7 - (i % 8);
    byte < null_indicator.len() && null_indicator[byte] & (1 << bit) != 0
}

fn set_null(null_indicator: &mut [u8], i: usize) {
    let byte = i / 8;
    let bit = 7 - (i % 8);
    null_indicator[byte] |= 1 << bit;
}

/// The number of bytes `data` occupies when interpreted under `descriptor`:
/// the null indicator plus every non-null field.
pub fn encoded_size(descriptor: &[Attribute], data: &[u8]) -> Result<usize> {
    let nulls_len = null_indicator_size(descriptor.len());
    if data.len() < nulls_len {
        return Err(Error::CorruptTuple { size: data.len() });
    }
    let null_indicator = &data[..nulls_len];
    let mut offset = nulls_len;

    for (i, attr) in descriptor.iter().enumerate() {
        if is_null(null_indicator, i) {
            continue;
        }
        match attr.attr_type {
            AttrType::Int32 | AttrType::Float32 => {
                if offset + 4 > data.len() {
                    return Err(Error::CorruptTuple { size: data.len() });
                }
                offset += 4;
            }
            AttrType::VarChar => {
                if offset + 4 > data.len() {
                    return Err(Error::CorruptTuple { size: data.len() });
                }
                let len = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
                if len < 0 || offset + 4 + len as usize > data.len() {
                    return Err(Error::CorruptTuple { size: data.len() });
                }
                offset += 4 + len as usize;
            }
        }
    }
    Ok(offset)
}

/// Extract attribute `i` of `data` (sized `size` under `descriptor`) into
/// `out` as `[1-byte null-indicator][field bytes]`: `0x80` when null, `0x00`
/// otherwise, followed by the raw field bytes when non-null.
pub fn extract_one(
    descriptor: &[Attribute],
    data: &[u8],
    size: usize,
    i: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let nulls_len = null_indicator_size(descriptor.len());
    let null_indicator = &data[..nulls_len.min(data.len())];
    let mut offset = nulls_len;

    for (j, attr) in descriptor.iter().enumerate() {
        let field_is_null = is_null(null_indicator, j);
        let field_len = if field_is_null {
            0
        } else {
            match attr.attr_type {
                AttrType::Int32 | AttrType::Float32 => {
                    if offset + 4 > size {
                        return Err(Error::CorruptTuple { size });
                    }
                    4
                }
                AttrType::VarChar => {
                    if offset + 4 > size {
                        return Err(Error::CorruptTuple { size });
                    }
                    let len =
                        i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
                    if len < 0 || offset + 4 + len as usize > size {
                        return Err(Error::CorruptTuple { size });
                    }
                    4 + len as usize
                }
            }
        };

        if j == i {
            if field_is_null {
                out.push(0x80);
            } else {
                out.push(0x00);
                out.extend_from_slice(&data[offset..offset + field_len]);
            }
            return Ok(());
        }
        offset += field_len;
    }
    Err(Error::CorruptTuple { size })
}

/// Build a new tuple (in wire format) whose descriptor is `projection` (the
/// caller's attribute names, in the caller's order). A requested name that
/// isn't in `descriptor`, or whose extraction fails, becomes a null field in
/// the output.
pub fn project(
    descriptor: &[Attribute],
    data: &[u8],
    size: usize,
    projection: &[String],
) -> Vec<u8> {
    let out_nulls_len = null_indicator_size(projection.len());
    let mut null_indicator = vec![0u8; out_nulls_len];
    let mut fields = Vec::new();

    for (i, name) in projection.iter().enumerate() {
        let src_index = descriptor.iter().position(|a| &a.name == name);
        let field = src_index.and_then(|idx| {
            let mut scratch = Vec::new();
            extract_one(descriptor, data, size, idx, &mut scratch).ok()?;
            Some(scratch)
        });

        match field {
            Some(scratch) if scratch[0] == 0x00 => {
                fields.extend_from_slice(&scratch[1..]);
            }
            _ => {
                set_null(&mut null_indicator, i);
            }
        }
    }

    let mut out = null_indicator;
    out.extend_from_slice(&fields);
    out
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes(bytes[0..4].try_into().unwrap())
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes(bytes[0..4].try_into().unwrap())
}

fn compare(field: &[u8], value: &[u8], attr_type: AttrType) -> Ordering {
    match attr_type {
        AttrType::Int32 => read_i32(field).cmp(&read_i32(value)),
        AttrType::Float32 => read_f32(field)
            .partial_cmp(&read_f32(value))
            .unwrap_or(Ordering::Equal),
        AttrType::VarChar => {
            let field_len = read_i32(field) as usize;
            let value_len = read_i32(value) as usize;
            field[4..4 + field_len].cmp(&value[4..4 + value_len])
        }
    }
}

/// Evaluate `condAttr op value` against `data`. `op = NoOp` (or an empty
/// `cond_attr`) always passes. A null left-hand side passes only `Ne`. The
/// comparison against a null right-hand side is not expressible here: `value`
/// is always the caller's flattened, non-null comparand bytes.
pub fn matches(
    descriptor: &[Attribute],
    data: &[u8],
    size: usize,
    cond_attr: &str,
    op: CompOp,
    value: &[u8],
) -> bool {
    if op == CompOp::NoOp || cond_attr.is_empty() {
        return true;
    }
    let idx = match descriptor.iter().position(|a| a.name == cond_attr) {
        Some(idx) => idx,
        None => return false,
    };

    let mut scratch = Vec::new();
    if extract_one(descriptor, data, size, idx, &mut scratch).is_err() {
        return false;
    }
    if scratch[0] == 0x80 {
        return op == CompOp::Ne;
    }
    let field = &scratch[1..];
    let ordering = compare(field, value, descriptor[idx].attr_type);
    match op {
        CompOp::Eq => ordering == Ordering::Equal,
        CompOp::Ne => ordering != Ordering::Equal,
        CompOp::Lt => ordering == Ordering::Less,
        CompOp::Le => ordering != Ordering::Greater,
        CompOp::Gt => ordering == Ordering::Greater,
        CompOp::Ge => ordering != Ordering::Less,
        CompOp::NoOp => true,
    }
}

/// Render a tuple the way the original command-line front end did:
/// `"Name: value, Name2: NULL, ..."`.
pub fn print_record(descriptor: &[Attribute], data: &[u8]) -> Result<String> {
    let nulls_len = null_indicator_size(descriptor.len());
    let null_indicator = &data[..nulls_len];
    let mut offset = nulls_len;
    let mut parts = Vec::with_capacity(descriptor.len());

    for (i, attr) in descriptor.iter().enumerate() {
        if is_null(null_indicator, i) {
            parts.push(format!("{}: NULL", attr.name));
            continue;
        }
        match attr.attr_type {
            AttrType::Int32 => {
                let value = read_i32(&data[offset..offset + 4]);
                parts.push(format!("{}: {}", attr.name, value));
                offset += 4;
            }
            AttrType::Float32 => {
                let value = read_f32(&data[offset..offset + 4]);
                parts.push(format!("{}: {}", attr.name, value));
                offset += 4;
            }
            AttrType::VarChar => {
                let len = read_i32(&data[offset..offset + 4]) as usize;
                let s = std::str::from_utf8(&data[offset + 4..offset + 4 + len])
                    .map_err(|_| Error::CorruptTuple { size: data.len() })?;
                parts.push(format!("{}: {}", attr.name, s));
                offset += 4 + len;
            }
        }
    }
    Ok(parts.join(", "))
}
