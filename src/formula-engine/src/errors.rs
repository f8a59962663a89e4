use formula_types::{EndpointIndex, InstructionCode, InstructionError, ValueType};

/// Errors raised by the packed value codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input exhausted, value out of range for its width, or unparsable literal.
    #[error("invalid `{0}` value")]
    InvalidValue(ValueType),
    #[error("invalid type `{0}`")]
    InvalidType(String),
    #[error("{types} types for {values} values")]
    ArityMismatch { types: usize, values: usize },
    /// Outer hex was malformed.
    #[error("invalid hex format")]
    InvalidFormat,
    #[error("{0} trailing bytes after the last signature")]
    TrailingData(usize),
}

/// Exact Formula invariant that construction rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFormulaReason {
    #[error("signed endpoint count {signed} exceeds endpoint count {endpoints}")]
    SignedEndpointCountOverflow { signed: usize, endpoints: usize },
    #[error("operation {operation} references endpoint {index} but only {endpoints} exist")]
    EndpointOutOfRange { operation: usize, index: EndpointIndex, endpoints: usize },
    #[error("unknown instruction code {0}")]
    UnknownInstruction(u16),
    #[error("operands do not match the `{}` schema", .0.name())]
    OperandMismatch(InstructionCode),
    #[error("{signatures} signatures supplied for {signed} signed endpoints")]
    TooManySignatures { signatures: usize, signed: usize },
    #[error("{0} endpoints do not fit the u16 count field")]
    TooManyEndpoints(usize),
    #[error("{0} operations do not fit the u16 count field")]
    TooManyOperations(usize),
}

impl From<InstructionError> for InvalidFormulaReason {
    fn from(err: InstructionError) -> Self {
        match err {
            InstructionError::UnknownInstruction(code) => InvalidFormulaReason::UnknownInstruction(code),
            InstructionError::OperandMismatch(code) => InvalidFormulaReason::OperandMismatch(code),
        }
    }
}

/// Errors during Formula construction, compilation or decompilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid formula: {0}")]
    InvalidFormula(InvalidFormulaReason),
}

impl From<InvalidFormulaReason> for FormulaError {
    fn from(reason: InvalidFormulaReason) -> Self {
        FormulaError::InvalidFormula(reason)
    }
}

impl From<InstructionError> for FormulaError {
    fn from(err: InstructionError) -> Self {
        FormulaError::InvalidFormula(err.into())
    }
}

/// Errors during endpoint signing or signer recovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("endpoint {0} is out of range")]
    EndpointOutOfRange(EndpointIndex),
    #[error("endpoint {0} is not expected to sign")]
    NotASignedEndpoint(EndpointIndex),
    #[error("endpoint {0} carries no signature")]
    MissingSignature(EndpointIndex),
    #[error("invalid private key")]
    InvalidKey,
    #[error("ecdsa: {0}")]
    Ecdsa(String),
}

impl From<k256::ecdsa::Error> for SigningError {
    fn from(err: k256::ecdsa::Error) -> Self {
        SigningError::Ecdsa(err.to_string())
    }
}
