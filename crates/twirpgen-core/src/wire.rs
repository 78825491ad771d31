//! Low-level protobuf wire format helpers.
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};
use bytes::BufMut;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// Append `value` as a varint.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Append the tag for `field_number` with the given wire type.
pub fn encode_tag(field_number: u32, wire_type: WireType, buf: &mut impl BufMut) {
    encode_varint(((field_number as u64) << 3) | wire_type as u64, buf);
}

/// Split a decoded tag into field number and wire type.
pub fn split_tag(tag: u64) -> Result<(u32, WireType)> {
    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let field_number = (tag >> 3) as u32;
    if field_number == 0 || field_number > MAX_FIELD_NUMBER {
        return Err(Error::InvalidFieldNumber {
            number: field_number,
            max: MAX_FIELD_NUMBER,
        });
    }
    Ok((field_number, wire_type))
}

/// ZigZag-encode a signed 32-bit value (sint32).
pub fn zigzag32(n: i32) -> u64 {
    ((n << 1) ^ (n >> 31)) as u32 as u64
}

/// ZigZag-encode a signed 64-bit value (sint64).
pub fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag32`].
pub fn unzigzag32(n: u64) -> i32 {
    let n = n as u32;
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Inverse of [`zigzag64`].
pub fn unzigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Consume a single protobuf field from the data.
///
/// Returns the field number and total bytes consumed (including tag and value).
/// This is the skip operation for field numbers a message does not declare.
pub fn consume_field(data: &[u8]) -> Result<(u32, usize)> {
    if data.is_empty() {
        return Err(Error::invalid_wire_format(0, "empty data"));
    }

    let (tag, tag_len) = decode_varint(data)
        .map_err(|_| Error::invalid_wire_format(0, "failed to decode field tag"))?;
    let (field_number, wire_type) = split_tag(tag)?;

    let value_len = match wire_type {
        WireType::Varint => {
            let remaining = &data[tag_len..];
            let (_, varint_len) = decode_varint(remaining).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode varint value")
            })?;
            varint_len
        }
        WireType::I64 => {
            if data.len() < tag_len + 8 {
                return Err(Error::invalid_wire_format(tag_len, "not enough bytes for I64"));
            }
            8
        }
        WireType::Len => {
            let remaining = &data[tag_len..];
            let (length, length_varint_len) = decode_varint(remaining).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode length prefix")
            })?;

            let total_value_len = length_varint_len + length as usize;
            if data.len() < tag_len + total_value_len {
                return Err(Error::invalid_wire_format(
                    tag_len,
                    format!(
                        "not enough bytes for LEN field (need {}, have {})",
                        length,
                        data.len() - tag_len - length_varint_len
                    ),
                ));
            }
            total_value_len
        }
        // Group markers carry no payload; the enclosed fields are skipped one
        // by one as unknown fields.
        WireType::StartGroup | WireType::EndGroup => 0,
        WireType::I32 => {
            if data.len() < tag_len + 4 {
                return Err(Error::invalid_wire_format(tag_len, "not enough bytes for I32"));
            }
            4
        }
    };

    Ok((field_number, tag_len + value_len))
}
