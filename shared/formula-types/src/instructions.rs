use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::values::{EndpointIndex, Value, ValueType};

/// Instruction codes supported by the v1 settlement contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u16)]
pub enum InstructionCode {
    SendEther = 0,
    SendErc20 = 1,
    SendErc721 = 2,
    SendEtherWithdraw = 3,
    PayFee = 4,
    TimeCondition = 5,
}

/// The instruction carrying the relayer fee.
pub const FEE_INSTRUCTION: InstructionCode = InstructionCode::PayFee;

/// Raised when a wire-level instruction code or operand list does not match the instruction set.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InstructionError {
    #[error("unknown instruction code {0}")]
    UnknownInstruction(u16),
    #[error("operands do not match the `{}` schema", .0.name())]
    OperandMismatch(InstructionCode),
}

impl TryFrom<u16> for InstructionCode {
    type Error = InstructionError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            0 => InstructionCode::SendEther,
            1 => InstructionCode::SendErc20,
            2 => InstructionCode::SendErc721,
            3 => InstructionCode::SendEtherWithdraw,
            4 => InstructionCode::PayFee,
            5 => InstructionCode::TimeCondition,
            other => return Err(InstructionError::UnknownInstruction(other)),
        };
        Ok(code)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperandField {
    pub ty: ValueType,
    pub name: &'static str,
}

const fn field(ty: ValueType, name: &'static str) -> OperandField {
    OperandField { ty, name }
}

const SEND_ETHER_SCHEMA: [OperandField; 3] = [
    field(ValueType::SignedEndpoint, "fromEndpoint"),
    field(ValueType::Endpoint, "toEndpoint"),
    field(ValueType::Uint256, "etherAmount"),
];

const SEND_ERC20_SCHEMA: [OperandField; 4] = [
    field(ValueType::SignedEndpoint, "fromEndpoint"),
    field(ValueType::Endpoint, "toEndpoint"),
    field(ValueType::Uint256, "tokenAmount"),
    field(ValueType::Address, "tokenAddress"),
];

const SEND_ERC721_SCHEMA: [OperandField; 4] = [
    field(ValueType::SignedEndpoint, "fromEndpoint"),
    field(ValueType::Endpoint, "toEndpoint"),
    field(ValueType::Uint256, "tokenId"),
    field(ValueType::Address, "tokenAddress"),
];

const PAY_FEE_SCHEMA: [OperandField; 2] = [
    field(ValueType::SignedEndpoint, "fromEndpoint"),
    field(ValueType::Uint256, "feeAmount"),
];

const TIME_CONDITION_SCHEMA: [OperandField; 2] = [
    field(ValueType::Uint32, "minimumBlock"),
    field(ValueType::Uint32, "maximumBlock"),
];

impl InstructionCode {
    pub const ALL: [InstructionCode; 6] = [
        InstructionCode::SendEther,
        InstructionCode::SendErc20,
        InstructionCode::SendErc721,
        InstructionCode::SendEtherWithdraw,
        InstructionCode::PayFee,
        InstructionCode::TimeCondition,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            InstructionCode::SendEther => "sendEther",
            InstructionCode::SendErc20 => "sendErc20",
            InstructionCode::SendErc721 => "sendErc721",
            InstructionCode::SendEtherWithdraw => "sendEtherWithdraw",
            InstructionCode::PayFee => "payFee",
            InstructionCode::TimeCondition => "timeCondition",
        }
    }

    /// Ordered operand layout, exactly as packed after the instruction code.
    pub const fn schema(self) -> &'static [OperandField] {
        match self {
            InstructionCode::SendEther | InstructionCode::SendEtherWithdraw => &SEND_ETHER_SCHEMA,
            InstructionCode::SendErc20 => &SEND_ERC20_SCHEMA,
            InstructionCode::SendErc721 => &SEND_ERC721_SCHEMA,
            InstructionCode::PayFee => &PAY_FEE_SCHEMA,
            InstructionCode::TimeCondition => &TIME_CONDITION_SCHEMA,
        }
    }

    pub fn operand_types(self) -> Vec<ValueType> {
        self.schema().iter().map(|f| f.ty).collect()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.name() == name)
    }
}

/// One step of a Formula, typed per instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "instruction", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    SendEther { from: EndpointIndex, to: EndpointIndex, amount: U256 },
    SendErc20 { from: EndpointIndex, to: EndpointIndex, amount: U256, token: Address },
    SendErc721 { from: EndpointIndex, to: EndpointIndex, token_id: U256, token: Address },
    SendEtherWithdraw { from: EndpointIndex, to: EndpointIndex, amount: U256 },
    PayFee { from: EndpointIndex, amount: U256 },
    TimeCondition { min_block: u32, max_block: u32 },
}

impl Operation {
    pub const fn code(&self) -> InstructionCode {
        match self {
            Operation::SendEther { .. } => InstructionCode::SendEther,
            Operation::SendErc20 { .. } => InstructionCode::SendErc20,
            Operation::SendErc721 { .. } => InstructionCode::SendErc721,
            Operation::SendEtherWithdraw { .. } => InstructionCode::SendEtherWithdraw,
            Operation::PayFee { .. } => InstructionCode::PayFee,
            Operation::TimeCondition { .. } => InstructionCode::TimeCondition,
        }
    }

    /// Operand values in schema order.
    pub fn operands(&self) -> Vec<Value> {
        match *self {
            Operation::SendEther { from, to, amount }
            | Operation::SendEtherWithdraw { from, to, amount } => {
                vec![Value::Endpoint(from), Value::Endpoint(to), Value::Uint256(amount)]
            }
            Operation::SendErc20 { from, to, amount, token } => vec![
                Value::Endpoint(from),
                Value::Endpoint(to),
                Value::Uint256(amount),
                Value::Address(token),
            ],
            Operation::SendErc721 { from, to, token_id, token } => vec![
                Value::Endpoint(from),
                Value::Endpoint(to),
                Value::Uint256(token_id),
                Value::Address(token),
            ],
            Operation::PayFee { from, amount } => {
                vec![Value::Endpoint(from), Value::Uint256(amount)]
            }
            Operation::TimeCondition { min_block, max_block } => {
                vec![Value::Uint32(min_block), Value::Uint32(max_block)]
            }
        }
    }

    /// Rebuild a typed operation from schema-ordered operand values.
    pub fn from_operands(code: InstructionCode, operands: &[Value]) -> Result<Self, InstructionError> {
        let mismatch = || InstructionError::OperandMismatch(code);
        let schema = code.schema();
        if operands.len() != schema.len()
            || !operands.iter().zip(schema).all(|(value, f)| value.fits(f.ty))
        {
            return Err(mismatch());
        }

        let op = match (code, operands) {
            (
                InstructionCode::SendEther,
                [Value::Endpoint(from), Value::Endpoint(to), Value::Uint256(amount)],
            ) => Operation::SendEther { from: *from, to: *to, amount: *amount },
            (
                InstructionCode::SendEtherWithdraw,
                [Value::Endpoint(from), Value::Endpoint(to), Value::Uint256(amount)],
            ) => Operation::SendEtherWithdraw { from: *from, to: *to, amount: *amount },
            (
                InstructionCode::SendErc20,
                [Value::Endpoint(from), Value::Endpoint(to), Value::Uint256(amount), Value::Address(token)],
            ) => Operation::SendErc20 { from: *from, to: *to, amount: *amount, token: *token },
            (
                InstructionCode::SendErc721,
                [Value::Endpoint(from), Value::Endpoint(to), Value::Uint256(token_id), Value::Address(token)],
            ) => Operation::SendErc721 { from: *from, to: *to, token_id: *token_id, token: *token },
            (InstructionCode::PayFee, [Value::Endpoint(from), Value::Uint256(amount)]) => {
                Operation::PayFee { from: *from, amount: *amount }
            }
            (InstructionCode::TimeCondition, [Value::Uint32(min_block), Value::Uint32(max_block)]) => {
                Operation::TimeCondition { min_block: *min_block, max_block: *max_block }
            }
            _ => return Err(mismatch()),
        };
        Ok(op)
    }

    /// Endpoint indices referenced by this operation's operands, in schema order.
    pub fn endpoints(&self) -> Vec<EndpointIndex> {
        self.code()
            .schema()
            .iter()
            .zip(self.operands())
            .filter(|(field, _)| field.ty.is_endpoint())
            .filter_map(|(_, value)| match value {
                Value::Endpoint(index) => Some(index),
                _ => None,
            })
            .collect()
    }
}
