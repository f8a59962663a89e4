//! Loose, JSON-friendly description of a Formula. Numeric operands may be spelled in decimal
//! or `0x` hex; every literal is normalized through the codec before hashing.

use alloy_primitives::{Address, B256};
use formula_types::{
    InstructionCode, InstructionError, Operation, Value, ValueType, EMPTY_SIGNATURE,
};
use serde::{Deserialize, Serialize};

use super::{Formula, FormulaBuilder};
use crate::{
    codec::{bytes_to_hex, parse_value},
    errors::{CodecError, FormulaError},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_endpoint_count: Option<u16>,
    #[serde(default)]
    pub operations: Vec<OperationData>,
    /// `null` marks an unsigned slot.
    #[serde(default)]
    pub signatures: Vec<Option<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationData {
    pub instruction: InstructionRef,
    #[serde(default)]
    pub operands: Vec<Literal>,
}

/// Instruction selected by wire code or by name (`"sendEther"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstructionRef {
    Code(u16),
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Number(u64),
    Text(String),
}

impl Literal {
    fn parse(&self, ty: ValueType) -> Result<Value, CodecError> {
        match self {
            Literal::Number(n) => parse_value(ty, &n.to_string()),
            Literal::Text(s) => parse_value(ty, s),
        }
    }
}

impl InstructionRef {
    fn resolve(&self) -> Result<InstructionCode, FormulaError> {
        match self {
            InstructionRef::Code(code) => Ok(InstructionCode::try_from(*code)?),
            InstructionRef::Name(name) => InstructionCode::from_name(name)
                .or_else(|| name.parse::<u16>().ok().and_then(|c| InstructionCode::try_from(c).ok()))
                .ok_or_else(|| CodecError::InvalidType(name.clone()).into()),
        }
    }
}

impl OperationData {
    pub fn to_operation(&self) -> Result<Operation, FormulaError> {
        let code = self.instruction.resolve()?;
        let schema = code.schema();
        if schema.len() != self.operands.len() {
            return Err(InstructionError::OperandMismatch(code).into());
        }
        let values = schema
            .iter()
            .zip(&self.operands)
            .map(|(field, literal)| literal.parse(field.ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operation::from_operands(code, &values)?)
    }
}

impl FormulaData {
    pub fn into_formula(self) -> Result<Formula, FormulaError> {
        let mut builder = FormulaBuilder::new();

        if let Some(salt) = &self.salt {
            match parse_value(ValueType::Uint256, salt)? {
                Value::Uint256(v) => builder = builder.salt(B256::from(v.to_be_bytes::<32>())),
                _ => return Err(CodecError::InvalidValue(ValueType::Uint256).into()),
            }
        }

        let endpoints = self
            .endpoints
            .iter()
            .map(|e| match parse_value(ValueType::Address, e)? {
                Value::Address(a) => Ok(a),
                _ => Err(CodecError::InvalidValue(ValueType::Address)),
            })
            .collect::<Result<Vec<Address>, _>>()?;
        builder = builder.endpoints(endpoints);

        if let Some(count) = self.signed_endpoint_count {
            builder = builder.signed_endpoint_count(count);
        }

        for operation in &self.operations {
            builder = builder.operation(operation.to_operation()?);
        }

        let signatures = self
            .signatures
            .iter()
            .map(|s| match s {
                None => Ok(EMPTY_SIGNATURE),
                Some(s) => match parse_value(ValueType::Signature, s)? {
                    Value::Signature(sig) => Ok(sig),
                    _ => Err(CodecError::InvalidValue(ValueType::Signature)),
                },
            })
            .collect::<Result<Vec<_>, _>>()?;

        builder.signatures(signatures).build()
    }
}

impl From<&Formula> for FormulaData {
    fn from(formula: &Formula) -> Self {
        FormulaData {
            salt: Some(bytes_to_hex(formula.salt().as_slice())),
            endpoints: formula.endpoints().iter().map(|a| format!("{a:#x}")).collect(),
            signed_endpoint_count: Some(formula.signed_endpoint_count()),
            operations: formula
                .operations()
                .iter()
                .map(|op| OperationData {
                    instruction: InstructionRef::Name(op.code().name().to_string()),
                    operands: op.operands().iter().map(|v| Literal::Text(v.to_string())).collect(),
                })
                .collect(),
            signatures: formula
                .signatures()
                .iter()
                .map(|s| (*s != EMPTY_SIGNATURE).then(|| bytes_to_hex(s.as_slice())))
                .collect(),
        }
    }
}
