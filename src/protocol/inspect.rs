//! Schema-less wire dump for captured frames.
//!
//! Walks protobuf fields without knowing the message type and prints one
//! line per field. Length-delimited fields are shown as a nested message if
//! they parse as one, else as text if they are valid UTF-8, else as hex.
//! Used by `kslive inspect` to look at payloads the client does not model.

use std::fmt::Write as _;

use bytes::Buf;
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use prost::encoding::{decode_key, decode_varint, WireType};

use super::{tag_name, FrameError};

/// Nesting depth past which length-delimited fields are printed as bytes.
const MAX_DEPTH: usize = 8;

/// One decoded field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Varint (ints, bools, enums).
    Varint(u64),
    /// 64-bit fixed.
    Fixed64(u64),
    /// 32-bit fixed.
    Fixed32(u32),
    /// Length-delimited field that parsed as a message.
    Message(Vec<Field>),
    /// Length-delimited UTF-8 text.
    Text(String),
    /// Length-delimited opaque bytes.
    Bytes(Vec<u8>),
}

/// A field number with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Protobuf field number.
    pub number: u32,
    /// Decoded value.
    pub value: FieldValue,
}

/// Parse `bytes` as a sequence of protobuf fields.
pub fn parse_fields(bytes: &[u8]) -> Result<Vec<Field>, FrameError> {
    parse_at_depth(bytes, 0)
}

fn parse_at_depth(mut buf: &[u8], depth: usize) -> Result<Vec<Field>, FrameError> {
    let malformed = |e: prost::DecodeError| FrameError::Malformed(e.to_string());
    let mut fields = Vec::new();
    while buf.has_remaining() {
        let (number, wire_type) = decode_key(&mut buf).map_err(malformed)?;
        let value = match wire_type {
            WireType::Varint => FieldValue::Varint(decode_varint(&mut buf).map_err(malformed)?),
            WireType::SixtyFourBit => {
                if buf.remaining() < 8 {
                    return Err(FrameError::Malformed(format!("field {number}: truncated fixed64")));
                }
                FieldValue::Fixed64(buf.get_u64_le())
            }
            WireType::ThirtyTwoBit => {
                if buf.remaining() < 4 {
                    return Err(FrameError::Malformed(format!("field {number}: truncated fixed32")));
                }
                FieldValue::Fixed32(buf.get_u32_le())
            }
            WireType::LengthDelimited => {
                let len = decode_varint(&mut buf).map_err(malformed)?;
                let len = usize::try_from(len)
                    .ok()
                    .filter(|len| *len <= buf.remaining())
                    .ok_or_else(|| {
                        FrameError::Malformed(format!("field {number}: length {len} exceeds input"))
                    })?;
                let (chunk, rest) = buf.split_at(len);
                buf = rest;
                classify_chunk(chunk, depth)
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(FrameError::Malformed(format!(
                    "field {number}: groups are not supported"
                )));
            }
        };
        fields.push(Field { number, value });
    }
    Ok(fields)
}

fn classify_chunk(chunk: &[u8], depth: usize) -> FieldValue {
    if !chunk.is_empty() && depth < MAX_DEPTH {
        if let Ok(nested) = parse_at_depth(chunk, depth + 1) {
            // Short ASCII strings often happen to parse as messages; prefer
            // text when every byte is printable.
            if !is_printable(chunk) {
                return FieldValue::Message(nested);
            }
        }
    }
    match std::str::from_utf8(chunk) {
        Ok(text) => FieldValue::Text(text.to_string()),
        Err(_) => FieldValue::Bytes(chunk.to_vec()),
    }
}

fn is_printable(chunk: &[u8]) -> bool {
    std::str::from_utf8(chunk).is_ok_and(|s| s.chars().all(|c| !c.is_control() || c == '\n'))
}

/// Parse a hex dump, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, FrameError> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    HEXLOWER_PERMISSIVE
        .decode(cleaned.as_bytes())
        .map_err(|e| FrameError::Malformed(format!("invalid hex: {e}")))
}

/// Render a full frame: the envelope header, then the payload fields.
pub fn dump(bytes: &[u8]) -> Result<String, FrameError> {
    let envelope = super::decode_envelope(bytes)?;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "type {} ({}) compression {:?} payload {} bytes",
        envelope.payload_type,
        tag_name(envelope.payload_type),
        envelope.compression,
        envelope.payload.len()
    );
    let payload = envelope.plain_payload()?;
    match parse_fields(&payload) {
        Ok(fields) => render(&fields, 1, &mut out),
        Err(_) => {
            let _ = writeln!(out, "  <opaque> {}", HEXLOWER.encode(&payload));
        }
    }
    Ok(out)
}

fn render(fields: &[Field], indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    for field in fields {
        match &field.value {
            FieldValue::Varint(v) => {
                let _ = writeln!(out, "{pad}{}: {v}", field.number);
            }
            FieldValue::Fixed64(v) => {
                let _ = writeln!(out, "{pad}{}: {v} (fixed64)", field.number);
            }
            FieldValue::Fixed32(v) => {
                let _ = writeln!(out, "{pad}{}: {v} (fixed32)", field.number);
            }
            FieldValue::Text(s) => {
                let _ = writeln!(out, "{pad}{}: {s:?}", field.number);
            }
            FieldValue::Bytes(b) => {
                let _ = writeln!(out, "{pad}{}: 0x{}", field.number, HEXLOWER.encode(b));
            }
            FieldValue::Message(nested) => {
                let _ = writeln!(out, "{pad}{} {{", field.number);
                render(nested, indent + 1, out);
                let _ = writeln!(out, "{pad}}}");
            }
        }
    }
}
