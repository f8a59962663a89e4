//! Execution analysis of a Formula against the settlement contract and token contracts.

mod analyzer;
mod balances;
pub(crate) mod context;
mod report;

pub use analyzer::analyze_formula;
pub use balances::{calculate_extremes, fetch_starting};
pub use context::AnalysisContext;
pub use report::{Analysis, AnalyzerResult, AnalyzerResultError, ErrorReason, ErrorType, Totals};
