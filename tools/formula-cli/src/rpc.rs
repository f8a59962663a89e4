use alloy_primitives::{Address, FixedBytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{
        transaction::eip2718::TypedTransaction, BlockNumber, Filter, TransactionRequest, H160,
        H256, U256 as EthersU256,
    },
};
use formula_types::{
    selector, BlockStats, ChainError, ContractFactory, LegacyApprovalProbe, PresignState,
    TransactionStats,
};
use tracing::debug;

sol! {
    interface ISettlement {
        function etherBalances(address owner) external view returns (uint256);
        function feePerOperation() external view returns (uint256);
        function executedFormulas(bytes32 messageHash) external view returns (bool);
        function presignedFormulas(address endpoint, bytes32 messageHash) external view returns (uint8);

        event Formulas_FormulaExecuted(bytes32 indexed messageHash);
    }

    interface IErc20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    interface IErc721 {
        function ownerOf(uint256 tokenId) external view returns (address);
        function getApproved(uint256 tokenId) external view returns (address);
        function isApprovedForAll(address owner, address operator) external view returns (bool);
        function supportsInterface(bytes4 interfaceId) external view returns (bool);
    }
}

/// ERC721 and the pre-final draft interface id.
const ERC721_INTERFACE_IDS: [[u8; 4]; 2] = [[0x80, 0xac, 0x58, 0xcd], [0x9a, 0x20, 0x48, 0x3d]];

const PUSH4: u8 = 0x63;

/// `ContractFactory` over a JSON-RPC endpoint. Every read is an `eth_call` (or a plain
/// account/log query) against the latest block.
pub struct RpcContractFactory {
    provider: Provider<Http>,
}

impl RpcContractFactory {
    pub fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        Ok(Self { provider })
    }

    /// bytes-in, bytes-out `eth_call`.
    async fn call(&self, target: Address, calldata: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(h160(target)).data(calldata).into();
        let out = self.provider.call(&tx, None).await.map_err(call_failed)?;
        Ok(out.to_vec())
    }

    async fn call_sol<C>(&self, target: Address, call: C) -> Result<C::Return, ChainError>
    where
        C: SolCall + Send + Sync,
    {
        let out = self.call(target, call.abi_encode()).await?;
        C::abi_decode_returns(&out, true).map_err(|_| ChainError::MalformedReturn)
    }

    async fn code(&self, address: Address) -> Result<Vec<u8>, ChainError> {
        let code = self.provider.get_code(h160(address), None).await.map_err(call_failed)?;
        Ok(code.to_vec())
    }

    async fn supports_interface(&self, token: Address, interface_id: [u8; 4]) -> bool {
        let call = IErc721::supportsInterfaceCall { interfaceId: FixedBytes(interface_id) };
        matches!(self.call_sol(token, call).await, Ok(ret) if ret._0)
    }
}

#[async_trait::async_trait]
impl ContractFactory for RpcContractFactory {
    async fn is_chain_available(&self) -> bool {
        match self.provider.get_chainid().await {
            Ok(chain_id) => {
                debug!(%chain_id, "connected");
                true
            }
            Err(err) => {
                debug!(%err, "rpc unreachable");
                false
            }
        }
    }

    async fn current_block(&self) -> Result<BlockStats, ChainError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(call_failed)?
            .ok_or(ChainError::MalformedReturn)?;
        let number = block.number.ok_or(ChainError::MalformedReturn)?;
        Ok(BlockStats { number: number.as_u64(), timestamp: block.timestamp.as_u64() })
    }

    async fn is_contract(&self, address: Address) -> Result<bool, ChainError> {
        Ok(!self.code(address).await?.is_empty())
    }

    async fn is_erc20_contract(&self, address: Address) -> Result<bool, ChainError> {
        let code = self.code(address).await?;
        if code.is_empty() {
            return Ok(false);
        }

        // Any well-formed holder works; a random one avoids hitting special-cased accounts.
        let probe = Address::random();
        let (allowance, balance) = futures::join!(
            self.call_sol(address, IErc20::allowanceCall { owner: probe, spender: probe }),
            self.call_sol(address, IErc20::balanceOfCall { owner: probe }),
        );

        Ok(allowance.is_ok()
            && balance.is_ok()
            && contains_push4(&code, selector("transferFrom(address,address,uint256)")))
    }

    async fn is_erc721_contract(&self, address: Address) -> Result<bool, ChainError> {
        if !self.is_contract(address).await? {
            return Ok(false);
        }
        for interface_id in ERC721_INTERFACE_IDS {
            if self.supports_interface(address, interface_id).await {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn internal_ether_balance(
        &self,
        settlement: Address,
        owner: Address,
    ) -> Result<U256, ChainError> {
        let ret = self.call_sol(settlement, ISettlement::etherBalancesCall { owner }).await?;
        Ok(ret._0)
    }

    async fn fee_per_operation(&self, settlement: Address) -> Result<U256, ChainError> {
        let ret = self.call_sol(settlement, ISettlement::feePerOperationCall {}).await?;
        Ok(ret._0)
    }

    async fn is_formula_executed(
        &self,
        settlement: Address,
        message_hash: B256,
    ) -> Result<bool, ChainError> {
        let call = ISettlement::executedFormulasCall { messageHash: message_hash };
        Ok(self.call_sol(settlement, call).await?._0)
    }

    async fn formula_execution(
        &self,
        settlement: Address,
        message_hash: B256,
    ) -> Result<Option<TransactionStats>, ChainError> {
        let filter = Filter::new()
            .address(h160(settlement))
            .from_block(BlockNumber::Earliest)
            .topic0(H256(ISettlement::Formulas_FormulaExecuted::SIGNATURE_HASH.0))
            .topic1(H256(message_hash.0));
        let logs = self.provider.get_logs(&filter).await.map_err(call_failed)?;

        let Some(log) = logs.into_iter().next() else {
            return Ok(None);
        };
        let number = log.block_number.ok_or(ChainError::MalformedReturn)?;
        let transaction_hash = log.transaction_hash.ok_or(ChainError::MalformedReturn)?;
        let block = self
            .provider
            .get_block(BlockNumber::Number(number))
            .await
            .map_err(call_failed)?
            .ok_or(ChainError::MalformedReturn)?;

        Ok(Some(TransactionStats {
            number: number.as_u64(),
            timestamp: block.timestamp.as_u64(),
            transaction_hash: B256::from(transaction_hash.0),
        }))
    }

    async fn presign_state(
        &self,
        settlement: Address,
        endpoint: Address,
        message_hash: B256,
    ) -> Result<PresignState, ChainError> {
        let call = ISettlement::presignedFormulasCall { endpoint, messageHash: message_hash };
        PresignState::try_from(self.call_sol(settlement, call).await?._0)
    }

    async fn external_ether_balance(&self, owner: Address) -> Result<U256, ChainError> {
        let balance = self.provider.get_balance(h160(owner), None).await.map_err(call_failed)?;
        Ok(u256(balance))
    }

    async fn erc20_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(self.call_sol(token, IErc20::balanceOfCall { owner }).await?._0)
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        Ok(self.call_sol(token, IErc20::allowanceCall { owner, spender }).await?._0)
    }

    async fn erc721_owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
        Ok(self.call_sol(token, IErc721::ownerOfCall { tokenId: token_id }).await?._0)
    }

    async fn erc721_get_approved(
        &self,
        token: Address,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        Ok(self.call_sol(token, IErc721::getApprovedCall { tokenId: token_id }).await?._0)
    }

    async fn erc721_is_approved_for_all(
        &self,
        token: Address,
        owner: Address,
        operator: Address,
    ) -> Result<bool, ChainError> {
        let call = IErc721::isApprovedForAllCall { owner, operator };
        Ok(self.call_sol(token, call).await?._0)
    }

    async fn erc721_legacy_approved(
        &self,
        token: Address,
        probe: &LegacyApprovalProbe,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&probe.selector());
        data.extend_from_slice(&token_id.to_be_bytes::<32>());

        let out = self.call(token, data).await?;
        // address is left-padded in a 32-byte ABI word
        if out.len() < 32 {
            return Err(ChainError::MalformedReturn);
        }
        Ok(Address::from_slice(&out[12..32]))
    }
}

/// Whether `code` pushes `selector` as a 4-byte immediate anywhere.
pub(crate) fn contains_push4(code: &[u8], selector: [u8; 4]) -> bool {
    code.windows(5).any(|w| w[0] == PUSH4 && w[1..] == selector)
}

fn call_failed(err: impl std::fmt::Display) -> ChainError {
    ChainError::CallFailed(err.to_string())
}

fn h160(address: Address) -> H160 {
    H160::from_slice(address.as_slice())
}

fn u256(value: EthersU256) -> U256 {
    U256::from_limbs(value.0)
}
