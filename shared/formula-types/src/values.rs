use core::{fmt, str::FromStr};

use alloy_primitives::{Address, FixedBytes, U256};
use serde::{Deserialize, Serialize};

/// Position of an endpoint inside `Formula::endpoints`.
pub type EndpointIndex = u16;

/// Raw `r‖s‖v` ECDSA signature as carried on the wire.
pub type RawSignature = FixedBytes<65>;

/// All-zero signature, the "unsigned" sentinel.
pub const EMPTY_SIGNATURE: RawSignature = FixedBytes::ZERO;

pub const SIGNATURE_LENGTH: usize = 65;
pub const ADDRESS_LENGTH: usize = 20;
pub const WORD_LENGTH: usize = 32;

/// Primitive operand/field types understood by the packed codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    Endpoint,
    SignedEndpoint,
    Uint16,
    Uint32,
    Uint256,
    Address,
    Signature,
    Bytes,
    /// Unframed passthrough, only used while composing hash preimages.
    HexString,
}

impl ValueType {
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Endpoint => "endpoint",
            ValueType::SignedEndpoint => "signedEndpoint",
            ValueType::Uint16 => "uint16",
            ValueType::Uint32 => "uint32",
            ValueType::Uint256 => "uint256",
            ValueType::Address => "address",
            ValueType::Signature => "signature",
            ValueType::Bytes => "bytes",
            ValueType::HexString => "hexString",
        }
    }

    /// Encoded width in bytes; `None` for length-prefixed or unframed types.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::Endpoint | ValueType::SignedEndpoint | ValueType::Uint16 => Some(2),
            ValueType::Uint32 => Some(4),
            ValueType::Uint256 => Some(WORD_LENGTH),
            ValueType::Address => Some(ADDRESS_LENGTH),
            ValueType::Signature => Some(SIGNATURE_LENGTH),
            ValueType::Bytes | ValueType::HexString => None,
        }
    }

    pub const fn is_endpoint(self) -> bool {
        matches!(self, ValueType::Endpoint | ValueType::SignedEndpoint)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a type tag is not part of the codec vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown value type `{0}`")]
pub struct UnknownValueType(pub String);

impl FromStr for ValueType {
    type Err = UnknownValueType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "endpoint" => ValueType::Endpoint,
            "signedEndpoint" => ValueType::SignedEndpoint,
            "uint16" => ValueType::Uint16,
            "uint32" => ValueType::Uint32,
            "uint256" => ValueType::Uint256,
            "address" => ValueType::Address,
            "signature" => ValueType::Signature,
            "bytes" => ValueType::Bytes,
            "hexString" => ValueType::HexString,
            other => return Err(UnknownValueType(other.to_string())),
        };
        Ok(ty)
    }
}

/// A decoded operand. Endpoint and signed-endpoint operands share one variant;
/// the distinction lives in the instruction schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Endpoint(EndpointIndex),
    Uint16(u16),
    Uint32(u32),
    Uint256(U256),
    Address(Address),
    Signature(RawSignature),
    Bytes(Vec<u8>),
    HexString(Vec<u8>),
}

impl Value {
    /// Whether this value may be stored in a field of type `ty`.
    pub fn fits(&self, ty: ValueType) -> bool {
        matches!(
            (self, ty),
            (Value::Endpoint(_), ValueType::Endpoint | ValueType::SignedEndpoint)
                | (Value::Uint16(_), ValueType::Uint16)
                | (Value::Uint32(_), ValueType::Uint32)
                | (Value::Uint256(_), ValueType::Uint256)
                | (Value::Address(_), ValueType::Address)
                | (Value::Signature(_), ValueType::Signature)
                | (Value::Bytes(_), ValueType::Bytes)
                | (Value::HexString(_), ValueType::HexString)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Endpoint(v) | Value::Uint16(v) => write!(f, "{v}"),
            Value::Uint32(v) => write!(f, "{v}"),
            Value::Uint256(v) => write!(f, "{v}"),
            Value::Address(v) => write!(f, "{v:#x}"),
            Value::Signature(v) => write!(f, "{v}"),
            Value::Bytes(v) | Value::HexString(v) => {
                write!(f, "0x")?;
                v.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
        }
    }
}
