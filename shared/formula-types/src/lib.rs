//! Shared types for Crypto Formulas: codec value vocabulary, the instruction set,
//! and the chain collaborator interface consumed by the analyzer.

pub mod chain;
pub mod instructions;
pub mod values;

pub use chain::{
    selector, BlockStats, ChainError, ContractFactory, LegacyApprovalProbe, PresignState,
    TransactionStats,
};
pub use instructions::{
    InstructionCode, InstructionError, OperandField, Operation, FEE_INSTRUCTION,
};
pub use values::{
    EndpointIndex, RawSignature, UnknownValueType, Value, ValueType, ADDRESS_LENGTH,
    EMPTY_SIGNATURE, SIGNATURE_LENGTH, WORD_LENGTH,
};
