use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Errors during chain reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Used by off-chain mocks or partially implemented factories.
    #[error("chain read not implemented")]
    NotImplemented,
    /// No chain connection is configured.
    #[error("chain unavailable")]
    Unavailable,
    /// The underlying call failed.
    #[error("call failed: {0}")]
    CallFailed(String),
    /// Return data was malformed or could not be decoded.
    #[error("malformed return data")]
    MalformedReturn,
}

/// Block header subset used by time-condition checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    pub number: u64,
    pub timestamp: u64,
}

/// Where a Formula was executed on the current network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub number: u64,
    pub timestamp: u64,
    pub transaction_hash: B256,
}

/// Mirrors the settlement contract's `PresignStates` enum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum PresignState {
    #[default]
    Default = 0,
    Permitted = 1,
    Forbidden = 2,
}

impl TryFrom<u8> for PresignState {
    type Error = ChainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PresignState::Default),
            1 => Ok(PresignState::Permitted),
            2 => Ok(PresignState::Forbidden),
            _ => Err(ChainError::MalformedReturn),
        }
    }
}

/// Pre-standard ERC721 approval getter, `function(uint256) returns (address)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyApprovalProbe {
    pub signature: String,
}

impl LegacyApprovalProbe {
    pub fn new(signature: impl Into<String>) -> Self {
        Self { signature: signature.into() }
    }

    /// CryptoKitties-era `kittyIndexToApproved(uint256)`.
    pub fn crypto_kitties() -> Self {
        Self::new("kittyIndexToApproved(uint256)")
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(&self.signature)
    }
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let h = keccak256(signature.as_bytes());
    [h[0], h[1], h[2], h[3]]
}

/// Chain collaborator consumed by the analyzer. Implemented over JSON-RPC by the CLI and
/// in memory by tests; every read may fail and callers decide the fallback.
#[async_trait::async_trait]
pub trait ContractFactory: Send + Sync {
    async fn is_chain_available(&self) -> bool {
        false
    }

    async fn current_block(&self) -> Result<BlockStats, ChainError> {
        Err(ChainError::NotImplemented)
    }

    /// Deployed bytecode is non-empty.
    async fn is_contract(&self, _address: Address) -> Result<bool, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn is_erc20_contract(&self, _address: Address) -> Result<bool, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn is_erc721_contract(&self, _address: Address) -> Result<bool, ChainError> {
        Err(ChainError::NotImplemented)
    }

    // Settlement contract.

    /// `etherBalances(owner)` - ether held inside the settlement contract.
    async fn internal_ether_balance(
        &self,
        _settlement: Address,
        _owner: Address,
    ) -> Result<U256, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn fee_per_operation(&self, _settlement: Address) -> Result<U256, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn is_formula_executed(
        &self,
        _settlement: Address,
        _message_hash: B256,
    ) -> Result<bool, ChainError> {
        Err(ChainError::NotImplemented)
    }

    /// Block and transaction of the `Formulas_FormulaExecuted` event, if any.
    async fn formula_execution(
        &self,
        _settlement: Address,
        _message_hash: B256,
    ) -> Result<Option<TransactionStats>, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn presign_state(
        &self,
        _settlement: Address,
        _endpoint: Address,
        _message_hash: B256,
    ) -> Result<PresignState, ChainError> {
        Err(ChainError::NotImplemented)
    }

    // Plain account.

    async fn external_ether_balance(&self, _owner: Address) -> Result<U256, ChainError> {
        Err(ChainError::NotImplemented)
    }

    // ERC20.

    async fn erc20_balance_of(&self, _token: Address, _owner: Address) -> Result<U256, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn erc20_allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, ChainError> {
        Err(ChainError::NotImplemented)
    }

    // ERC721.

    async fn erc721_owner_of(&self, _token: Address, _token_id: U256) -> Result<Address, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn erc721_get_approved(
        &self,
        _token: Address,
        _token_id: U256,
    ) -> Result<Address, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn erc721_is_approved_for_all(
        &self,
        _token: Address,
        _owner: Address,
        _operator: Address,
    ) -> Result<bool, ChainError> {
        Err(ChainError::NotImplemented)
    }

    async fn erc721_legacy_approved(
        &self,
        _token: Address,
        _probe: &LegacyApprovalProbe,
        _token_id: U256,
    ) -> Result<Address, ChainError> {
        Err(ChainError::NotImplemented)
    }
}
