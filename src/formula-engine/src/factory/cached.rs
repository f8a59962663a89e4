use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use formula_types::{
    BlockStats, ChainError, ContractFactory, LegacyApprovalProbe, PresignState, TransactionStats,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Classification {
    Contract,
    Erc20,
    Erc721,
}

type Lookup<'a> = Shared<BoxFuture<'a, bool>>;

/// Request-scoped decorator that memoizes contract classification.
///
/// Built by the analyzer for a single run and dropped with it. The first caller for a key
/// starts the lookup and every concurrent or later caller awaits that same lookup. A failed
/// lookup is answered (and remembered) as `false`; every other read is forwarded untouched.
pub struct CachedContractFactory<'a> {
    inner: &'a dyn ContractFactory,
    chain_available: Mutex<Option<bool>>,
    classifications: Mutex<HashMap<(Classification, Address), Lookup<'a>>>,
}

impl<'a> CachedContractFactory<'a> {
    pub fn new(inner: &'a dyn ContractFactory) -> Self {
        Self {
            inner,
            chain_available: Mutex::new(None),
            classifications: Mutex::new(HashMap::new()),
        }
    }

    async fn classify(&self, kind: Classification, address: Address) -> bool {
        let lookup = {
            let mut classifications = self.classifications.lock();
            match classifications.get(&(kind, address)) {
                Some(lookup) => {
                    trace!(?kind, %address, "classification cache hit");
                    lookup.clone()
                }
                None => {
                    let lookup = classify_uncached(self.inner, kind, address).boxed().shared();
                    classifications.insert((kind, address), lookup.clone());
                    lookup
                }
            }
        };
        lookup.await
    }
}

async fn classify_uncached(
    inner: &dyn ContractFactory,
    kind: Classification,
    address: Address,
) -> bool {
    let result = match kind {
        Classification::Contract => inner.is_contract(address).await,
        Classification::Erc20 => inner.is_erc20_contract(address).await,
        Classification::Erc721 => inner.is_erc721_contract(address).await,
    };
    result.unwrap_or_else(|err| {
        warn!(?kind, %address, %err, "classification lookup failed, assuming false");
        false
    })
}

#[async_trait::async_trait]
impl ContractFactory for CachedContractFactory<'_> {
    async fn is_chain_available(&self) -> bool {
        let cached = *self.chain_available.lock();
        if let Some(available) = cached {
            return available;
        }
        let available = self.inner.is_chain_available().await;
        *self.chain_available.lock() = Some(available);
        available
    }

    async fn current_block(&self) -> Result<BlockStats, ChainError> {
        self.inner.current_block().await
    }

    async fn is_contract(&self, address: Address) -> Result<bool, ChainError> {
        Ok(self.classify(Classification::Contract, address).await)
    }

    async fn is_erc20_contract(&self, address: Address) -> Result<bool, ChainError> {
        Ok(self.classify(Classification::Erc20, address).await)
    }

    async fn is_erc721_contract(&self, address: Address) -> Result<bool, ChainError> {
        Ok(self.classify(Classification::Erc721, address).await)
    }

    async fn internal_ether_balance(
        &self,
        settlement: Address,
        owner: Address,
    ) -> Result<U256, ChainError> {
        self.inner.internal_ether_balance(settlement, owner).await
    }

    async fn fee_per_operation(&self, settlement: Address) -> Result<U256, ChainError> {
        self.inner.fee_per_operation(settlement).await
    }

    async fn is_formula_executed(
        &self,
        settlement: Address,
        message_hash: B256,
    ) -> Result<bool, ChainError> {
        self.inner.is_formula_executed(settlement, message_hash).await
    }

    async fn formula_execution(
        &self,
        settlement: Address,
        message_hash: B256,
    ) -> Result<Option<TransactionStats>, ChainError> {
        self.inner.formula_execution(settlement, message_hash).await
    }

    async fn presign_state(
        &self,
        settlement: Address,
        endpoint: Address,
        message_hash: B256,
    ) -> Result<PresignState, ChainError> {
        self.inner.presign_state(settlement, endpoint, message_hash).await
    }

    async fn external_ether_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.inner.external_ether_balance(owner).await
    }

    async fn erc20_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        self.inner.erc20_balance_of(token, owner).await
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        self.inner.erc20_allowance(token, owner, spender).await
    }

    async fn erc721_owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
        self.inner.erc721_owner_of(token, token_id).await
    }

    async fn erc721_get_approved(
        &self,
        token: Address,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        self.inner.erc721_get_approved(token, token_id).await
    }

    async fn erc721_is_approved_for_all(
        &self,
        token: Address,
        owner: Address,
        operator: Address,
    ) -> Result<bool, ChainError> {
        self.inner.erc721_is_approved_for_all(token, owner, operator).await
    }

    async fn erc721_legacy_approved(
        &self,
        token: Address,
        probe: &LegacyApprovalProbe,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        self.inner.erc721_legacy_approved(token, probe, token_id).await
    }
}
