use alloy_primitives::{Address, B256};
use formula_types::{Operation, RawSignature};

use super::Formula;
use crate::errors::FormulaError;

/// Incremental construction; validation happens once in [`FormulaBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct FormulaBuilder {
    salt: Option<B256>,
    endpoints: Vec<Address>,
    signed_endpoint_count: Option<u16>,
    operations: Vec<Operation>,
    signatures: Vec<RawSignature>,
}

impl FormulaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn salt(mut self, salt: B256) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn endpoint(mut self, endpoint: Address) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Address>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    pub fn signed_endpoint_count(mut self, count: u16) -> Self {
        self.signed_endpoint_count = Some(count);
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations.extend(operations);
        self
    }

    pub fn signatures(mut self, signatures: impl IntoIterator<Item = RawSignature>) -> Self {
        self.signatures.extend(signatures);
        self
    }

    /// A random salt is drawn when none was supplied.
    pub fn build(self) -> Result<Formula, FormulaError> {
        Formula::new(
            self.salt.unwrap_or_else(B256::random),
            self.endpoints,
            self.signed_endpoint_count,
            self.operations,
            self.signatures,
        )
    }
}
