//! Packed value codec shared by the Formula wire format and the hash preimages.
//!
//! Numbers are big-endian and right-aligned in their fixed width, addresses and signatures
//! are raw bytes, `bytes` carries a 32-byte length prefix, and `hexString` is unframed.
//! Nothing in a packed run delimits values: the caller supplies the type list.

use core::str::FromStr;

use alloy_primitives::{Address, FixedBytes, U256};
use formula_types::{Value, ValueType, ADDRESS_LENGTH, SIGNATURE_LENGTH, WORD_LENGTH};

use crate::errors::CodecError;

/// Append the encoding of `value` as `ty` to `buf`.
pub fn encode_into(buf: &mut Vec<u8>, ty: ValueType, value: &Value) -> Result<(), CodecError> {
    if !value.fits(ty) {
        return Err(CodecError::InvalidValue(ty));
    }
    match value {
        Value::Endpoint(v) | Value::Uint16(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Uint32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Uint256(v) => buf.extend_from_slice(&v.to_be_bytes::<32>()),
        Value::Address(a) => buf.extend_from_slice(a.as_slice()),
        Value::Signature(s) => buf.extend_from_slice(s.as_slice()),
        Value::Bytes(b) => {
            buf.extend_from_slice(&U256::from(b.len()).to_be_bytes::<32>());
            buf.extend_from_slice(b);
        }
        Value::HexString(b) => buf.extend_from_slice(b),
    }
    Ok(())
}

pub fn encode_value(ty: ValueType, value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(ty.fixed_width().unwrap_or(WORD_LENGTH));
    encode_into(&mut buf, ty, value)?;
    Ok(buf)
}

/// Encode `values` positionally against `types`, without delimiters.
pub fn encode_packed(types: &[ValueType], values: &[Value]) -> Result<Vec<u8>, CodecError> {
    if types.len() != values.len() {
        return Err(CodecError::ArityMismatch { types: types.len(), values: values.len() });
    }
    let mut buf = Vec::new();
    for (ty, value) in types.iter().zip(values) {
        encode_into(&mut buf, *ty, value)?;
    }
    Ok(buf)
}

/// Decode one value of type `ty` starting at `*i`, advancing the cursor.
pub fn decode_value(ty: ValueType, bytes: &[u8], i: &mut usize) -> Result<Value, CodecError> {
    let value = match ty {
        ValueType::Endpoint | ValueType::SignedEndpoint => Value::Endpoint(read_u16(bytes, i, ty)?),
        ValueType::Uint16 => Value::Uint16(read_u16(bytes, i, ty)?),
        ValueType::Uint32 => {
            let raw = read_slice(bytes, i, 4, ty)?;
            Value::Uint32(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        ValueType::Uint256 => Value::Uint256(read_u256(bytes, i, ty)?),
        ValueType::Address => {
            Value::Address(Address::from_slice(read_slice(bytes, i, ADDRESS_LENGTH, ty)?))
        }
        ValueType::Signature => {
            Value::Signature(FixedBytes::from_slice(read_slice(bytes, i, SIGNATURE_LENGTH, ty)?))
        }
        ValueType::Bytes => {
            let len = read_u256(bytes, i, ty)?;
            let len = narrow(len, u32::MAX.into()).ok_or(CodecError::InvalidValue(ty))?;
            Value::Bytes(read_slice(bytes, i, len as usize, ty)?.to_vec())
        }
        ValueType::HexString => {
            let rest = bytes.get(*i..).unwrap_or_default().to_vec();
            *i = bytes.len();
            Value::HexString(rest)
        }
    };
    Ok(value)
}

/// Decode a packed run. Returns the number of bytes consumed and the values.
pub fn decode_packed(types: &[ValueType], bytes: &[u8]) -> Result<(usize, Vec<Value>), CodecError> {
    let mut i = 0usize;
    let mut values = Vec::with_capacity(types.len());
    for ty in types {
        if i >= bytes.len() {
            return Err(CodecError::InvalidValue(*ty));
        }
        values.push(decode_value(*ty, bytes, &mut i)?);
    }
    Ok((i, values))
}

/// Hex-level `encode`: lower-case, unprefixed.
pub fn encode_hex(ty: ValueType, value: &Value) -> Result<String, CodecError> {
    Ok(hex::encode(encode_value(ty, value)?))
}

/// Hex-level `decode`: returns `(consumed hex chars, value, remaining hex)`.
pub fn decode_hex(ty: ValueType, input: &str) -> Result<(usize, Value, String), CodecError> {
    let bytes = hex_to_bytes(input)?;
    let mut i = 0usize;
    if bytes.is_empty() && ty != ValueType::HexString {
        return Err(CodecError::InvalidValue(ty));
    }
    let value = decode_value(ty, &bytes, &mut i)?;
    Ok((i * 2, value, hex::encode(&bytes[i..])))
}

/// Parse a loosely formatted literal (decimal or `0x` hex numbers, `0x` addresses and blobs)
/// into its canonical typed value. Distinct spellings of one number yield equal values.
pub fn parse_value(ty: ValueType, literal: &str) -> Result<Value, CodecError> {
    let literal = literal.trim();
    let invalid = || CodecError::InvalidValue(ty);
    let value = match ty {
        ValueType::Endpoint | ValueType::SignedEndpoint => {
            Value::Endpoint(narrow(parse_number(literal, ty)?, u16::MAX.into()).ok_or_else(invalid)? as u16)
        }
        ValueType::Uint16 => {
            Value::Uint16(narrow(parse_number(literal, ty)?, u16::MAX.into()).ok_or_else(invalid)? as u16)
        }
        ValueType::Uint32 => {
            Value::Uint32(narrow(parse_number(literal, ty)?, u32::MAX.into()).ok_or_else(invalid)? as u32)
        }
        ValueType::Uint256 => Value::Uint256(parse_number(literal, ty)?),
        ValueType::Address => {
            let raw = hex_to_bytes(literal).map_err(|_| invalid())?;
            if raw.len() != ADDRESS_LENGTH {
                return Err(invalid());
            }
            Value::Address(Address::from_slice(&raw))
        }
        ValueType::Signature => {
            let raw = hex_to_bytes(literal).map_err(|_| invalid())?;
            if raw.len() != SIGNATURE_LENGTH {
                return Err(invalid());
            }
            Value::Signature(FixedBytes::from_slice(&raw))
        }
        ValueType::Bytes => Value::Bytes(hex_to_bytes(literal).map_err(|_| invalid())?),
        ValueType::HexString => Value::HexString(hex_to_bytes(literal).map_err(|_| invalid())?),
    };
    Ok(value)
}

/// Strip an optional `0x` prefix and decode.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    let stripped = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")).unwrap_or(input);
    hex::decode(stripped).map_err(|_| CodecError::InvalidFormat)
}

/// `0x`-prefixed lower-case hex, the outer-boundary representation.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_number(literal: &str, ty: ValueType) -> Result<U256, CodecError> {
    if literal.is_empty() {
        return Err(CodecError::InvalidValue(ty));
    }
    U256::from_str(literal).map_err(|_| CodecError::InvalidValue(ty))
}

fn narrow(value: U256, max: u64) -> Option<u64> {
    (value <= U256::from(max)).then(|| value.as_limbs()[0])
}

pub(crate) fn read_slice<'a>(
    bytes: &'a [u8],
    i: &mut usize,
    len: usize,
    ty: ValueType,
) -> Result<&'a [u8], CodecError> {
    let end = i.checked_add(len).ok_or(CodecError::InvalidValue(ty))?;
    if bytes.len() < end {
        return Err(CodecError::InvalidValue(ty));
    }
    let out = &bytes[*i..end];
    *i = end;
    Ok(out)
}

pub(crate) fn read_u16(bytes: &[u8], i: &mut usize, ty: ValueType) -> Result<u16, CodecError> {
    let raw = read_slice(bytes, i, 2, ty)?;
    Ok(u16::from_be_bytes([raw[0], raw[1]]))
}

fn read_u256(bytes: &[u8], i: &mut usize, ty: ValueType) -> Result<U256, CodecError> {
    Ok(U256::from_be_slice(read_slice(bytes, i, WORD_LENGTH, ty)?))
}
