use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy_primitives::{Address, B256, U256};
use formula_types::{
    BlockStats, ChainError, ContractFactory, LegacyApprovalProbe, PresignState, TransactionStats,
};

/// In-memory chain used by tests and offline tooling.
///
/// Anything not configured reads as zero, empty or `Default`. Unknown `ownerOf` lookups fail
/// the way a reverting contract would. Tokens marked legacy reject the standard approval
/// getters and answer only through [`LegacyApprovalProbe`]s.
#[derive(Debug, Default)]
pub struct MemoryContractFactory {
    available: bool,
    block: Option<BlockStats>,
    contracts: HashSet<Address>,
    erc20_contracts: HashSet<Address>,
    erc721_contracts: HashSet<Address>,
    internal_ether: HashMap<Address, U256>,
    external_ether: HashMap<Address, U256>,
    fee_per_operation: Option<U256>,
    executed: HashMap<B256, TransactionStats>,
    presigns: HashMap<(Address, B256), PresignState>,
    erc20_balances: HashMap<(Address, Address), U256>,
    erc20_allowances: HashMap<(Address, Address), U256>,
    erc721_owners: HashMap<(Address, U256), Address>,
    erc721_approved: HashMap<(Address, U256), Address>,
    erc721_operators: HashSet<(Address, Address, Address)>,
    legacy_tokens: HashSet<Address>,
    legacy_approved: HashMap<(Address, U256), Address>,
    classification_calls: AtomicUsize,
}

impl MemoryContractFactory {
    /// A reachable chain with nothing deployed.
    pub fn new() -> Self {
        Self { available: true, ..Default::default() }
    }

    /// A factory that reports no chain at all.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Number of classification probes that reached this factory.
    pub fn classification_calls(&self) -> usize {
        self.classification_calls.load(Ordering::Relaxed)
    }

    pub fn with_block(mut self, number: u64, timestamp: u64) -> Self {
        self.block = Some(BlockStats { number, timestamp });
        self
    }

    pub fn with_contract(mut self, address: Address) -> Self {
        self.contracts.insert(address);
        self
    }

    pub fn with_erc20(mut self, token: Address) -> Self {
        self.contracts.insert(token);
        self.erc20_contracts.insert(token);
        self
    }

    pub fn with_erc721(mut self, token: Address) -> Self {
        self.contracts.insert(token);
        self.erc721_contracts.insert(token);
        self
    }

    /// ERC721 contract that predates `getApproved`/`isApprovedForAll`.
    pub fn with_legacy_erc721(mut self, token: Address) -> Self {
        self.legacy_tokens.insert(token);
        self.with_erc721(token)
    }

    pub fn with_internal_ether(mut self, owner: Address, amount: U256) -> Self {
        self.internal_ether.insert(owner, amount);
        self
    }

    pub fn with_external_ether(mut self, owner: Address, amount: U256) -> Self {
        self.external_ether.insert(owner, amount);
        self
    }

    pub fn with_fee_per_operation(mut self, fee: U256) -> Self {
        self.fee_per_operation = Some(fee);
        self
    }

    pub fn with_executed(mut self, message_hash: B256, stats: TransactionStats) -> Self {
        self.executed.insert(message_hash, stats);
        self
    }

    pub fn with_presign(mut self, endpoint: Address, message_hash: B256, state: PresignState) -> Self {
        self.presigns.insert((endpoint, message_hash), state);
        self
    }

    pub fn with_erc20_balance(mut self, token: Address, owner: Address, amount: U256) -> Self {
        self.erc20_balances.insert((token, owner), amount);
        self
    }

    /// Allowance granted by `owner` to the settlement contract.
    pub fn with_erc20_allowance(mut self, token: Address, owner: Address, amount: U256) -> Self {
        self.erc20_allowances.insert((token, owner), amount);
        self
    }

    pub fn with_erc721_owner(mut self, token: Address, token_id: U256, owner: Address) -> Self {
        self.erc721_owners.insert((token, token_id), owner);
        self
    }

    pub fn with_erc721_approved(mut self, token: Address, token_id: U256, spender: Address) -> Self {
        if self.legacy_tokens.contains(&token) {
            self.legacy_approved.insert((token, token_id), spender);
        } else {
            self.erc721_approved.insert((token, token_id), spender);
        }
        self
    }

    pub fn with_erc721_operator(mut self, token: Address, owner: Address, operator: Address) -> Self {
        self.erc721_operators.insert((token, owner, operator));
        self
    }

    fn ensure_available(&self) -> Result<(), ChainError> {
        if self.available {
            Ok(())
        } else {
            Err(ChainError::Unavailable)
        }
    }

    fn classify(&self, set: &HashSet<Address>, address: Address) -> Result<bool, ChainError> {
        self.ensure_available()?;
        self.classification_calls.fetch_add(1, Ordering::Relaxed);
        Ok(set.contains(&address))
    }
}

#[async_trait::async_trait]
impl ContractFactory for MemoryContractFactory {
    async fn is_chain_available(&self) -> bool {
        self.available
    }

    async fn current_block(&self) -> Result<BlockStats, ChainError> {
        self.ensure_available()?;
        self.block.ok_or(ChainError::CallFailed("no block configured".into()))
    }

    async fn is_contract(&self, address: Address) -> Result<bool, ChainError> {
        self.classify(&self.contracts, address)
    }

    async fn is_erc20_contract(&self, address: Address) -> Result<bool, ChainError> {
        self.classify(&self.erc20_contracts, address)
    }

    async fn is_erc721_contract(&self, address: Address) -> Result<bool, ChainError> {
        self.classify(&self.erc721_contracts, address)
    }

    async fn internal_ether_balance(
        &self,
        _settlement: Address,
        owner: Address,
    ) -> Result<U256, ChainError> {
        self.ensure_available()?;
        Ok(self.internal_ether.get(&owner).copied().unwrap_or_default())
    }

    async fn fee_per_operation(&self, _settlement: Address) -> Result<U256, ChainError> {
        self.ensure_available()?;
        self.fee_per_operation
            .ok_or(ChainError::CallFailed("feePerOperation reverted".into()))
    }

    async fn is_formula_executed(
        &self,
        _settlement: Address,
        message_hash: B256,
    ) -> Result<bool, ChainError> {
        self.ensure_available()?;
        Ok(self.executed.contains_key(&message_hash))
    }

    async fn formula_execution(
        &self,
        _settlement: Address,
        message_hash: B256,
    ) -> Result<Option<TransactionStats>, ChainError> {
        self.ensure_available()?;
        Ok(self.executed.get(&message_hash).cloned())
    }

    async fn presign_state(
        &self,
        _settlement: Address,
        endpoint: Address,
        message_hash: B256,
    ) -> Result<PresignState, ChainError> {
        self.ensure_available()?;
        Ok(self.presigns.get(&(endpoint, message_hash)).copied().unwrap_or_default())
    }

    async fn external_ether_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.ensure_available()?;
        Ok(self.external_ether.get(&owner).copied().unwrap_or_default())
    }

    async fn erc20_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        self.ensure_available()?;
        Ok(self.erc20_balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        _spender: Address,
    ) -> Result<U256, ChainError> {
        self.ensure_available()?;
        Ok(self.erc20_allowances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn erc721_owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
        self.ensure_available()?;
        self.erc721_owners
            .get(&(token, token_id))
            .copied()
            .ok_or(ChainError::CallFailed("ownerOf reverted".into()))
    }

    async fn erc721_get_approved(
        &self,
        token: Address,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        self.ensure_available()?;
        if self.legacy_tokens.contains(&token) {
            return Err(ChainError::CallFailed("getApproved not supported".into()));
        }
        Ok(self.erc721_approved.get(&(token, token_id)).copied().unwrap_or_default())
    }

    async fn erc721_is_approved_for_all(
        &self,
        token: Address,
        owner: Address,
        operator: Address,
    ) -> Result<bool, ChainError> {
        self.ensure_available()?;
        if self.legacy_tokens.contains(&token) {
            return Err(ChainError::CallFailed("isApprovedForAll not supported".into()));
        }
        Ok(self.erc721_operators.contains(&(token, owner, operator)))
    }

    async fn erc721_legacy_approved(
        &self,
        token: Address,
        probe: &LegacyApprovalProbe,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        self.ensure_available()?;
        if !self.legacy_tokens.contains(&token) || *probe != LegacyApprovalProbe::crypto_kitties() {
            return Err(ChainError::CallFailed(format!("{} not supported", probe.signature)));
        }
        Ok(self.legacy_approved.get(&(token, token_id)).copied().unwrap_or_default())
    }
}
