use alloy_primitives::{Address, U256};
use formula_types::{BlockStats, ChainError, ContractFactory, EndpointIndex};
use tracing::warn;

use crate::{config::AnalyzerConfig, formula::Formula};

/// Everything an instruction check may consult during one analysis run.
pub struct AnalysisContext<'a> {
    pub formula: &'a Formula,
    pub settlement: Address,
    /// The run's cached factory.
    pub factory: &'a dyn ContractFactory,
    /// When `false` every contract-dependent check reports nothing.
    pub chain_available: bool,
    pub config: &'a AnalyzerConfig,
    /// `None` when the chain is unavailable or the read failed.
    pub fee_per_operation: Option<U256>,
    pub current_block: Option<BlockStats>,
}

impl<'a> AnalysisContext<'a> {
    /// Context for a run without chain access.
    pub fn offline(
        formula: &'a Formula,
        settlement: Address,
        factory: &'a dyn ContractFactory,
        config: &'a AnalyzerConfig,
    ) -> Self {
        Self {
            formula,
            settlement,
            factory,
            chain_available: false,
            config,
            fee_per_operation: None,
            current_block: None,
        }
    }

    /// Address at `index`. Operands are range-checked when the Formula is built.
    pub fn address(&self, index: EndpointIndex) -> Address {
        self.formula.endpoint(index).unwrap_or(Address::ZERO)
    }
}

/// Unwrap a chain read, substituting `fallback` (and logging) when it failed.
pub(crate) fn read_or<T>(result: Result<T, ChainError>, fallback: T, read: &str) -> T {
    result.unwrap_or_else(|err| {
        warn!(read, %err, "chain read failed, using fallback");
        fallback
    })
}

/// Like [`read_or`] but keeps the failure visible as `None`.
pub(crate) fn read_opt<T>(result: Result<T, ChainError>, read: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(read, %err, "chain read failed");
            None
        }
    }
}
