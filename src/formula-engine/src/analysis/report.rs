use alloy_primitives::{Address, U256};
use formula_types::{EndpointIndex, InstructionCode, PresignState, TransactionStats};
use serde::{Serialize, Serializer};

use crate::{assets::AssetBalances, formula::Formula};

/// Severity of a diagnostic.
///
/// `Error`: the Formula as composed cannot execute. `Warning`: it currently cannot execute
/// because of external, possibly transient, state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Error,
    Warning,
}

/// Why an operation would fail, with the parameters relevant to that reason only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(
    tag = "errorReason",
    content = "errorParameters",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ErrorReason {
    SenderEmpty {
        sender_endpoint: EndpointIndex,
    },
    TargetEmpty {
        target_endpoint: EndpointIndex,
    },
    TokenEmpty {
        token_address: Address,
    },
    SenderIsTarget {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
    },
    TargetIsContract {
        target_endpoint: EndpointIndex,
        target_address: Address,
    },
    NoContractAtTokenAddress {
        token_address: Address,
    },
    InsufficientEtherInternal {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        contract_address: Address,
        balance: U256,
        amount: U256,
    },

    NoErc20ContractAtAddress {
        token_address: Address,
    },
    InsufficientErc20Balance {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        token_address: Address,
        amount: U256,
        balance: U256,
    },
    InsufficientErc20Allowance {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        token_address: Address,
        amount: U256,
        allowance: U256,
    },

    NoErc721ContractAtAddress {
        token_address: Address,
    },
    NoErc721TokenOwner {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        token_id: U256,
        token_address: Address,
        /// `None` when `ownerOf` could not be read.
        owner: Option<Address>,
    },
    NoErc721Approval {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        token_id: U256,
        token_address: Address,
    },
    /// Neither the standard getters nor any legacy probe answered.
    Erc721ApprovalUnverifiable {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        token_id: U256,
        token_address: Address,
    },

    FeeTooLow {
        required_fee: U256,
        amount: U256,
    },
    InsufficientEtherInternalForFee {
        sender_endpoint: EndpointIndex,
        sender_address: Address,
        contract_address: Address,
        balance: U256,
        amount: U256,
    },

    MinimumBlockHigherThanMaximum {
        minimum_block: u32,
        maximum_block: u32,
    },
    MinimumBlockNotReached {
        minimum_block: u32,
        current_block_number: u64,
        current_block_timestamp: u64,
    },
    MaximumBlockAlreadyPassed {
        maximum_block: u32,
        current_block_number: u64,
        current_block_timestamp: u64,
    },
    NoTimeConditionSet {
        minimum_block: u32,
        maximum_block: u32,
    },
}

impl ErrorReason {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ErrorReason::SenderEmpty { .. }
            | ErrorReason::TargetEmpty { .. }
            | ErrorReason::TokenEmpty { .. }
            | ErrorReason::NoContractAtTokenAddress { .. }
            | ErrorReason::NoErc20ContractAtAddress { .. }
            | ErrorReason::NoErc721ContractAtAddress { .. }
            | ErrorReason::FeeTooLow { .. }
            | ErrorReason::MinimumBlockHigherThanMaximum { .. }
            | ErrorReason::MaximumBlockAlreadyPassed { .. } => ErrorType::Error,

            ErrorReason::SenderIsTarget { .. }
            | ErrorReason::TargetIsContract { .. }
            | ErrorReason::InsufficientEtherInternal { .. }
            | ErrorReason::InsufficientErc20Balance { .. }
            | ErrorReason::InsufficientErc20Allowance { .. }
            | ErrorReason::NoErc721TokenOwner { .. }
            | ErrorReason::NoErc721Approval { .. }
            | ErrorReason::Erc721ApprovalUnverifiable { .. }
            | ErrorReason::InsufficientEtherInternalForFee { .. }
            | ErrorReason::MinimumBlockNotReached { .. }
            | ErrorReason::NoTimeConditionSet { .. } => ErrorType::Warning,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerResultError {
    /// Reported as the wire code (0..5).
    #[serde(serialize_with = "serialize_wire_code")]
    pub instruction_code: InstructionCode,
    #[serde(flatten)]
    pub reason: ErrorReason,
    pub error_type: ErrorType,
}

impl AnalyzerResultError {
    pub fn new(instruction_code: InstructionCode, reason: ErrorReason) -> Self {
        let error_type = reason.error_type();
        Self { instruction_code, reason, error_type }
    }
}

fn serialize_wire_code<S: Serializer>(
    code: &InstructionCode,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(*code as u16)
}

/// Diagnostics for one operation, in check order.
pub type AnalyzerResult = Vec<AnalyzerResultError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// `false` when no chain was reachable and only static checks ran.
    pub is_complete: bool,
    pub formula: Option<Formula>,
    pub already_executed: Option<TransactionStats>,
    pub fee_missing: bool,
    pub fee_is_low: bool,
    pub is_empty: bool,
    pub operations: Vec<AnalyzerResult>,
    /// One per endpoint.
    pub presigns: Vec<PresignState>,
    pub assets_balances: AssetBalances,
    pub totals: Totals,
}

impl Analysis {
    /// Canonical empty report.
    pub fn empty() -> Self {
        Analysis {
            is_complete: true,
            formula: None,
            already_executed: None,
            fee_missing: false,
            fee_is_low: false,
            is_empty: false,
            operations: Vec::new(),
            presigns: Vec::new(),
            assets_balances: AssetBalances::default(),
            totals: Totals::default(),
        }
    }

    fn count_operation_errors(&self, error_type: ErrorType) -> usize {
        self.operations
            .iter()
            .flatten()
            .filter(|e| e.error_type == error_type)
            .count()
    }

    /// Recompute `totals` from the rest of the report.
    pub fn with_totals(mut self) -> Self {
        let forbidden = self.presigns.iter().filter(|p| **p == PresignState::Forbidden).count();
        let errors = usize::from(self.already_executed.is_some())
            + usize::from(self.fee_missing)
            + usize::from(self.fee_is_low)
            + usize::from(self.is_empty)
            + self.count_operation_errors(ErrorType::Error)
            + forbidden;
        let warnings = self.count_operation_errors(ErrorType::Warning)
            + self.assets_balances.missing.leaf_count();
        self.totals = Totals { errors, warnings };
        self
    }

    /// Every diagnostic of every operation, in operation order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &AnalyzerResultError> {
        self.operations.iter().flatten()
    }
}
