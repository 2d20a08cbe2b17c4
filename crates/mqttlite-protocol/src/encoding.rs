//! Primitive wire encoders/decoders shared by every control packet:
//! MQTT variable byte integers, length-prefixed UTF-8 strings, and
//! length-prefixed binary data.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, Bytes};

/// Largest value representable by a 4-byte variable byte integer.
pub const VARIABLE_INT_MAX: u32 = 268_435_455;

/// Encodes `value` as a variable byte integer (1-4 bytes, 7 bits per byte,
/// MSB is the continuation bit).
pub fn encode_variable_int<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > VARIABLE_INT_MAX {
        return Err(MqttError::MalformedPacket(format!(
            "Variable byte integer {value} exceeds maximum {VARIABLE_INT_MAX}"
        )));
    }

    let mut remaining = value;
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if remaining == 0 {
            return Ok(());
        }
    }
}

/// Decodes a variable byte integer, advancing the buffer past exactly the
/// bytes consumed. A fourth byte with the continuation bit set is malformed.
pub fn decode_variable_int<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value = 0u32;
    let mut shift = 0u32;

    for _ in 0..4 {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Truncated variable byte integer".to_string(),
            ));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }

    Err(MqttError::MalformedPacket(
        "Variable byte integer exceeds 4 bytes".to_string(),
    ))
}

/// Number of bytes `encode_variable_int` emits for `value`.
#[must_use]
pub fn variable_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encodes a UTF-8 string with a big-endian u16 length prefix.
pub fn encode_string<B: BufMut>(buf: &mut B, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > usize::from(u16::MAX) {
        return Err(MqttError::StringTooLong(bytes.len()));
    }
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
    Ok(())
}

/// Decodes a u16-length-prefixed UTF-8 string.
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let data = decode_binary(buf)?;
    String::from_utf8(data.to_vec())
        .map_err(|e| MqttError::MalformedPacket(format!("Invalid UTF-8 string: {e}")))
}

#[must_use]
pub fn string_len(s: &str) -> usize {
    2 + s.len()
}

/// Encodes binary data with a big-endian u16 length prefix.
pub fn encode_binary<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    if data.len() > usize::from(u16::MAX) {
        return Err(MqttError::StringTooLong(data.len()));
    }
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    Ok(())
}

/// Decodes u16-length-prefixed binary data. The declared length may not
/// exceed the bytes remaining in the buffer.
pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Bytes> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Truncated length prefix".to_string(),
        ));
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Declared length {len} exceeds {} available bytes",
            buf.remaining()
        )));
    }
    Ok(buf.copy_to_bytes(len))
}

#[must_use]
pub fn binary_len(data: &[u8]) -> usize {
    2 + data.len()
}
