//! Implementations of the chain collaborator consumed by the analyzer.

mod cached;
mod memory;

pub use cached::CachedContractFactory;
pub use memory::MemoryContractFactory;

use formula_types::ContractFactory;

/// No chain at all; every read falls back to the trait defaults and the analyzer runs
/// static checks only.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineContractFactory;

impl ContractFactory for OfflineContractFactory {}
