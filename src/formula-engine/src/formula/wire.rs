//! Wire layout decoded by the settlement contract:
//!
//! `salt(32) ‖ endpointCount(2) ‖ signedEndpointCount(2) ‖ endpoint(20)* ‖ operationCount(2)
//!  ‖ (instructionCode(2) ‖ operandsPacked)* ‖ signature(65) × signedEndpointCount`

use alloy_primitives::B256;
use formula_types::{
    InstructionCode, Operation, RawSignature, Value, ValueType, ADDRESS_LENGTH, SIGNATURE_LENGTH,
    WORD_LENGTH,
};

use super::{encode_operation, Formula};
use crate::{
    codec::{self, bytes_to_hex, hex_to_bytes},
    errors::{CodecError, FormulaError},
};

impl Formula {
    pub fn compile(&self) -> Result<Vec<u8>, FormulaError> {
        let signed = usize::from(self.signed_endpoint_count);
        let mut buf = Vec::with_capacity(
            WORD_LENGTH + 6 + self.endpoints.len() * ADDRESS_LENGTH + signed * SIGNATURE_LENGTH,
        );
        buf.extend_from_slice(self.salt.as_slice());
        buf.extend_from_slice(&(self.endpoints.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.signed_endpoint_count.to_be_bytes());
        for endpoint in &self.endpoints {
            buf.extend_from_slice(endpoint.as_slice());
        }
        buf.extend_from_slice(&(self.operations.len() as u16).to_be_bytes());
        for operation in &self.operations {
            encode_operation(&mut buf, operation)?;
        }
        for index in 0..self.signed_endpoint_count {
            buf.extend_from_slice(self.signature(index).as_slice());
        }
        Ok(buf)
    }

    /// `0x`-prefixed compiled form.
    pub fn compile_hex(&self) -> Result<String, FormulaError> {
        Ok(bytes_to_hex(&self.compile()?))
    }

    /// Strict inverse of [`Formula::compile`].
    pub fn decompile(bytes: &[u8]) -> Result<Self, FormulaError> {
        let mut i = 0usize;

        let salt = B256::from_slice(codec::read_slice(bytes, &mut i, WORD_LENGTH, ValueType::Uint256)?);
        let endpoint_count = codec::read_u16(bytes, &mut i, ValueType::Uint16)?;
        let signed_endpoint_count = codec::read_u16(bytes, &mut i, ValueType::Uint16)?;

        let mut endpoints = Vec::with_capacity(usize::from(endpoint_count));
        for _ in 0..endpoint_count {
            match codec::decode_value(ValueType::Address, bytes, &mut i)? {
                Value::Address(a) => endpoints.push(a),
                _ => return Err(CodecError::InvalidValue(ValueType::Address).into()),
            }
        }

        let operation_count = codec::read_u16(bytes, &mut i, ValueType::Uint16)?;
        let mut operations = Vec::with_capacity(usize::from(operation_count));
        for _ in 0..operation_count {
            let raw_code = codec::read_u16(bytes, &mut i, ValueType::Uint16)?;
            let code = InstructionCode::try_from(raw_code)?;
            let (consumed, operands) = codec::decode_packed(&code.operand_types(), &bytes[i..])?;
            i += consumed;
            operations.push(Operation::from_operands(code, &operands)?);
        }

        let mut signatures: Vec<RawSignature> = Vec::with_capacity(usize::from(signed_endpoint_count));
        for _ in 0..signed_endpoint_count {
            match codec::decode_value(ValueType::Signature, bytes, &mut i)? {
                Value::Signature(s) => signatures.push(s),
                _ => return Err(CodecError::InvalidValue(ValueType::Signature).into()),
            }
        }

        if i != bytes.len() {
            return Err(CodecError::TrailingData(bytes.len() - i).into());
        }

        // An encoded endpoint count of zero is not producible by `compile`.
        if endpoints.is_empty() {
            return Err(CodecError::InvalidValue(ValueType::Address).into());
        }

        Formula::new(salt, endpoints, Some(signed_endpoint_count), operations, signatures)
    }

    pub fn decompile_hex(input: &str) -> Result<Self, FormulaError> {
        let bytes = hex_to_bytes(input)?;
        if bytes.is_empty() {
            return Err(CodecError::InvalidFormat.into());
        }
        Formula::decompile(&bytes)
    }
}
