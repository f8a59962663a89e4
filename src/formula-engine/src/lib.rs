//! Crypto Formulas engine: packed codec, immutable Formula with its canonical hash,
//! endpoint signing, and the off-chain execution analyzer.

pub mod analysis;
pub mod assets;
pub mod codec;
pub mod config;
pub mod errors;
pub mod factory;
pub mod formula;
pub mod instructions;
pub mod signing;

mod tests;

pub use analysis::{analyze_formula, Analysis, AnalyzerResultError, ErrorReason, ErrorType};
pub use assets::{AssetBalances, AssetDiff, AssetState, Erc721Allowance, TokenIds};
pub use config::AnalyzerConfig;
pub use errors::{CodecError, FormulaError, InvalidFormulaReason, SigningError};
pub use factory::{CachedContractFactory, MemoryContractFactory, OfflineContractFactory};
pub use formula::{Formula, FormulaBuilder, FormulaData};
