#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use alloy_primitives::{Address, FixedBytes, B256, U256};
    use formula_types::{
        BlockStats, ChainError, ContractFactory, LegacyApprovalProbe, Operation, PresignState,
        TransactionStats,
    };
    use k256::ecdsa::SigningKey;

    use crate::analysis::{analyze_formula, calculate_extremes, Analysis, ErrorReason, ErrorType, Totals};
    use crate::assets::{Erc721Allowance, TokenIds};
    use crate::config::AnalyzerConfig;
    use crate::errors::{CodecError, FormulaError, InvalidFormulaReason};
    use crate::factory::{MemoryContractFactory, OfflineContractFactory};
    use crate::formula::{Formula, FormulaBuilder, FormulaData};
    use crate::signing::{address_of, recover_endpoint_signer, sign_endpoint, validate_signatures};

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn settlement() -> Address {
        addr(0xee)
    }

    fn key(n: u8) -> SigningKey {
        SigningKey::from_slice(&[n; 32]).unwrap()
    }

    fn amount(n: u64) -> U256 {
        U256::from(n)
    }

    fn send_ether(from: u16, to: u16, value: u64) -> Operation {
        Operation::SendEther { from, to, amount: amount(value) }
    }

    fn build(endpoints: Vec<Address>, operations: Vec<Operation>) -> Formula {
        FormulaBuilder::new()
            .salt(B256::repeat_byte(7))
            .endpoints(endpoints)
            .operations(operations)
            .build()
            .unwrap()
    }

    fn reasons(analysis: &Analysis, operation: usize) -> Vec<ErrorReason> {
        analysis.operations[operation].iter().map(|e| e.reason.clone()).collect()
    }

    /// Hands control back to the runtime before every read, like a network-backed factory.
    struct YieldingFactory<'a>(&'a MemoryContractFactory);

    #[async_trait::async_trait]
    impl ContractFactory for YieldingFactory<'_> {
        async fn is_chain_available(&self) -> bool {
            tokio::task::yield_now().await;
            self.0.is_chain_available().await
        }

        async fn current_block(&self) -> Result<BlockStats, ChainError> {
            tokio::task::yield_now().await;
            self.0.current_block().await
        }

        async fn is_contract(&self, address: Address) -> Result<bool, ChainError> {
            tokio::task::yield_now().await;
            self.0.is_contract(address).await
        }

        async fn is_erc20_contract(&self, address: Address) -> Result<bool, ChainError> {
            tokio::task::yield_now().await;
            self.0.is_erc20_contract(address).await
        }

        async fn is_erc721_contract(&self, address: Address) -> Result<bool, ChainError> {
            tokio::task::yield_now().await;
            self.0.is_erc721_contract(address).await
        }

        async fn internal_ether_balance(
            &self,
            settlement: Address,
            owner: Address,
        ) -> Result<U256, ChainError> {
            tokio::task::yield_now().await;
            self.0.internal_ether_balance(settlement, owner).await
        }

        async fn fee_per_operation(&self, settlement: Address) -> Result<U256, ChainError> {
            tokio::task::yield_now().await;
            self.0.fee_per_operation(settlement).await
        }

        async fn is_formula_executed(
            &self,
            settlement: Address,
            message_hash: B256,
        ) -> Result<bool, ChainError> {
            tokio::task::yield_now().await;
            self.0.is_formula_executed(settlement, message_hash).await
        }

        async fn formula_execution(
            &self,
            settlement: Address,
            message_hash: B256,
        ) -> Result<Option<TransactionStats>, ChainError> {
            tokio::task::yield_now().await;
            self.0.formula_execution(settlement, message_hash).await
        }

        async fn presign_state(
            &self,
            settlement: Address,
            endpoint: Address,
            message_hash: B256,
        ) -> Result<PresignState, ChainError> {
            tokio::task::yield_now().await;
            self.0.presign_state(settlement, endpoint, message_hash).await
        }

        async fn external_ether_balance(&self, owner: Address) -> Result<U256, ChainError> {
            tokio::task::yield_now().await;
            self.0.external_ether_balance(owner).await
        }

        async fn erc20_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
            tokio::task::yield_now().await;
            self.0.erc20_balance_of(token, owner).await
        }

        async fn erc20_allowance(
            &self,
            token: Address,
            owner: Address,
            spender: Address,
        ) -> Result<U256, ChainError> {
            tokio::task::yield_now().await;
            self.0.erc20_allowance(token, owner, spender).await
        }

        async fn erc721_owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
            tokio::task::yield_now().await;
            self.0.erc721_owner_of(token, token_id).await
        }

        async fn erc721_get_approved(
            &self,
            token: Address,
            token_id: U256,
        ) -> Result<Address, ChainError> {
            tokio::task::yield_now().await;
            self.0.erc721_get_approved(token, token_id).await
        }

        async fn erc721_is_approved_for_all(
            &self,
            token: Address,
            owner: Address,
            operator: Address,
        ) -> Result<bool, ChainError> {
            tokio::task::yield_now().await;
            self.0.erc721_is_approved_for_all(token, owner, operator).await
        }

        async fn erc721_legacy_approved(
            &self,
            token: Address,
            probe: &LegacyApprovalProbe,
            token_id: U256,
        ) -> Result<Address, ChainError> {
            tokio::task::yield_now().await;
            self.0.erc721_legacy_approved(token, probe, token_id).await
        }
    }

    // Wire format and hashing.

    #[test]
    fn test_compile_decompile_round_trip() {
        let token = addr(0x20);
        let formula = FormulaBuilder::new()
            .endpoints([addr(1), addr(2)])
            .operations([
                send_ether(0, 1, 100),
                Operation::SendErc20 { from: 1, to: 0, amount: amount(5), token },
                Operation::TimeCondition { min_block: 10, max_block: 20 },
                Operation::PayFee { from: 0, amount: amount(1) },
            ])
            .build()
            .unwrap();
        let signed = formula.with_signature(0, sign_endpoint(&formula, &key(1), 0).unwrap()).unwrap();

        let bytes = signed.compile().unwrap();
        assert_eq!(Formula::decompile(&bytes).unwrap(), signed);
        assert_eq!(Formula::decompile_hex(&signed.compile_hex().unwrap()).unwrap(), signed);

        // Second slot is padded on the wire and trimmed again in memory.
        assert_eq!(signed.signatures().len(), 1);
        assert!(signed.is_signed(0));
        assert!(!signed.is_signed(1));
    }

    #[test]
    fn test_decompile_rejects_trailing_data() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 1)]);
        let mut bytes = formula.compile().unwrap();
        bytes.push(0);
        assert_eq!(
            Formula::decompile(&bytes),
            Err(FormulaError::Codec(CodecError::TrailingData(1)))
        );
        assert_eq!(
            Formula::decompile_hex("0xzz"),
            Err(FormulaError::Codec(CodecError::InvalidFormat))
        );
    }

    #[test]
    fn test_decompile_rejects_unknown_instruction() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 1)]);
        let mut bytes = formula.compile().unwrap();
        // salt, two counts, two endpoints and the operation count precede the first code
        let code_at = 32 + 2 + 2 + 2 * 20 + 2;
        assert_eq!(&bytes[code_at..code_at + 2], &[0, 0]);
        bytes[code_at + 1] = 6;
        assert_eq!(
            Formula::decompile(&bytes),
            Err(FormulaError::InvalidFormula(InvalidFormulaReason::UnknownInstruction(6)))
        );
    }

    #[test]
    fn test_construction_invariants() {
        let out_of_range = FormulaBuilder::new()
            .endpoints([addr(1)])
            .operation(send_ether(0, 3, 1))
            .build();
        assert!(matches!(
            out_of_range,
            Err(FormulaError::InvalidFormula(InvalidFormulaReason::EndpointOutOfRange { index: 3, .. }))
        ));

        let overflow = FormulaBuilder::new().endpoints([addr(1)]).signed_endpoint_count(2).build();
        assert!(matches!(
            overflow,
            Err(FormulaError::InvalidFormula(InvalidFormulaReason::SignedEndpointCountOverflow { .. }))
        ));

        let too_many_signatures = FormulaBuilder::new()
            .endpoints([addr(1)])
            .signatures([FixedBytes([1u8; 65]), FixedBytes([2u8; 65])])
            .build();
        assert_eq!(
            too_many_signatures,
            Err(FormulaError::InvalidFormula(InvalidFormulaReason::TooManySignatures {
                signatures: 2,
                signed: 1,
            }))
        );

        let empty = FormulaBuilder::new().build().unwrap();
        assert_eq!(empty.endpoints(), &[Address::ZERO]);
        assert_eq!(empty.signed_endpoint_count(), 1);
    }

    #[test]
    fn test_hash_ignores_endpoint_addresses() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 100)]);
        let retargeted = formula.with_endpoints(vec![addr(3), addr(4)]).unwrap();

        assert_eq!(formula.message_hash(), retargeted.message_hash());
        assert_ne!(formula.compile().unwrap(), retargeted.compile().unwrap());

        let fresh = formula.clone_new().unwrap();
        assert_ne!(fresh.message_hash(), formula.message_hash());
        assert_eq!(fresh.operations(), formula.operations());
    }

    #[test]
    fn test_json_input_normalizes_literals() {
        let decimal: FormulaData = serde_json::from_str(
            r#"{
                "salt": "0x01",
                "endpoints": ["0x0101010101010101010101010101010101010101", "0x0202020202020202020202020202020202020202"],
                "operations": [{"instruction": "sendEther", "operands": ["0", 1, "100"]}]
            }"#,
        )
        .unwrap();
        let hex: FormulaData = serde_json::from_str(
            r#"{
                "salt": "1",
                "endpoints": ["0x0101010101010101010101010101010101010101", "0x0202020202020202020202020202020202020202"],
                "operations": [{"instruction": 0, "operands": ["0x0", "0x01", "0x64"]}]
            }"#,
        )
        .unwrap();

        let a = decimal.into_formula().unwrap();
        let b = hex.into_formula().unwrap();
        assert_eq!(a.message_hash(), b.message_hash());
        assert_eq!(a.operations(), &[send_ether(0, 1, 100)]);

        let overflow: FormulaData = serde_json::from_str(
            r#"{"operations": [{"instruction": "timeCondition", "operands": ["4294967296", "0"]}]}"#,
        )
        .unwrap();
        assert!(matches!(overflow.into_formula(), Err(FormulaError::Codec(CodecError::InvalidValue(_)))));
    }

    #[test]
    fn test_json_input_rejects_unknown_instruction_name() {
        let data: FormulaData = serde_json::from_str(
            r#"{
                "endpoints": ["0x0101010101010101010101010101010101010101"],
                "operations": [{"instruction": "sendBitcoin", "operands": ["0", "0", "1"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(
            data.into_formula(),
            Err(FormulaError::Codec(CodecError::InvalidType("sendBitcoin".to_string())))
        );
    }

    // Signatures.

    #[test]
    fn test_sign_and_recover() {
        let signer = key(1);
        let formula = build(vec![address_of(&signer), addr(2)], vec![send_ether(0, 1, 100)]);
        let signature = sign_endpoint(&formula, &signer, 0).unwrap();
        assert!(signature[64] == 27 || signature[64] == 28);

        let signed = formula.with_signature(0, signature).unwrap();
        assert_eq!(recover_endpoint_signer(&signed, 0).unwrap(), address_of(&signer));
    }

    #[test]
    fn test_signature_positional_binding() {
        let (k0, k1) = (key(1), key(2));
        let (a0, a1) = (address_of(&k0), address_of(&k1));
        let operation = Operation::SendEther { from: 0, to: 0, amount: amount(100) };

        let formula = build(vec![a0, a1], vec![operation]);
        let s0 = sign_endpoint(&formula, &k0, 0).unwrap();
        let s1 = sign_endpoint(&formula, &k1, 1).unwrap();
        let signed = formula.with_signatures(vec![s0, s1]).unwrap();
        assert!(validate_signatures(&signed, &[]).is_valid);

        let swapped = signed.with_endpoints(vec![a1, a0]).unwrap().with_signatures(vec![s1, s0]).unwrap();
        assert!(!validate_signatures(&swapped, &[]).is_valid);
    }

    #[test]
    fn test_presign_replaces_signature() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 100)]);
        assert!(!validate_signatures(&formula, &[]).is_valid);

        let validation =
            validate_signatures(&formula, &[PresignState::Permitted, PresignState::Permitted]);
        assert!(validation.is_valid);
        assert_eq!(validation.endpoints.len(), 2);
    }

    // Extremes replay.

    #[test]
    fn test_extremes_single_send() {
        let extremes = calculate_extremes(&[send_ether(0, 1, 100)]).cleaned();
        assert_eq!(extremes.ether_internal, BTreeMap::from([(0, amount(100))]));
    }

    #[test]
    fn test_extremes_chained_sends() {
        let extremes = calculate_extremes(&[send_ether(0, 1, 100), send_ether(1, 2, 100)]).cleaned();
        assert_eq!(extremes.ether_internal, BTreeMap::from([(0, amount(100))]));
    }

    #[test]
    fn test_extremes_self_send() {
        let extremes = calculate_extremes(&[send_ether(0, 0, 100)]).cleaned();
        assert_eq!(extremes.ether_internal, BTreeMap::from([(0, amount(100))]));
    }

    #[test]
    fn test_extremes_accumulate_debits() {
        let extremes = calculate_extremes(&[send_ether(0, 1, 100), send_ether(0, 2, 50)]).cleaned();
        assert_eq!(extremes.ether_internal, BTreeMap::from([(0, amount(150))]));
    }

    #[test]
    fn test_extremes_withdraw_and_fee() {
        let extremes = calculate_extremes(&[
            Operation::SendEtherWithdraw { from: 0, to: 0, amount: amount(30) },
            Operation::PayFee { from: 0, amount: amount(2) },
        ])
        .cleaned();
        assert_eq!(extremes.ether_internal, BTreeMap::from([(0, amount(32))]));
        assert!(extremes.ether_external.is_empty());
    }

    #[test]
    fn test_extremes_nft_ping_pong() {
        let token = addr(0x72);
        let id = amount(9);
        let nft = |from, to| Operation::SendErc721 { from, to, token_id: id, token };

        let extremes = calculate_extremes(&[nft(0, 1), nft(1, 0), nft(0, 1)]).cleaned();

        assert_eq!(
            extremes.erc721_allowance,
            BTreeMap::from([
                (0, BTreeMap::from([(token, Erc721Allowance::Finite(vec![id, id]))])),
                (1, BTreeMap::from([(token, Erc721Allowance::Finite(vec![id]))])),
            ])
        );
        assert_eq!(
            extremes.erc721_balance,
            BTreeMap::from([(0, BTreeMap::from([(token, TokenIds(vec![id]))]))])
        );
    }

    // Analyzer.

    #[tokio::test]
    async fn test_missing_internal_balance() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 4600)]);
        let factory = MemoryContractFactory::new().with_internal_ether(addr(1), amount(4500));

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert!(analysis.is_complete);
        assert_eq!(analysis.assets_balances.starting.ether_internal, BTreeMap::from([(0, amount(4500))]));
        assert_eq!(analysis.assets_balances.needed_extremes.ether_internal, BTreeMap::from([(0, amount(4600))]));
        assert_eq!(analysis.assets_balances.missing.ether_internal, BTreeMap::from([(0, amount(100))]));
        assert_eq!(
            reasons(&analysis, 0),
            vec![ErrorReason::InsufficientEtherInternal {
                sender_endpoint: 0,
                sender_address: addr(1),
                contract_address: settlement(),
                balance: amount(4500),
                amount: amount(4600),
            }]
        );
        assert!(analysis.fee_missing);
        assert_eq!(analysis.presigns, vec![PresignState::Default; 2]);
        assert_eq!(analysis.totals, Totals { errors: 1, warnings: 2 });
    }

    #[tokio::test]
    async fn test_fee_too_low() {
        let formula = build(
            vec![addr(1), addr(2)],
            vec![send_ether(0, 1, 10), Operation::PayFee { from: 0, amount: amount(5) }],
        );
        let factory = MemoryContractFactory::new()
            .with_internal_ether(addr(1), amount(1000))
            .with_fee_per_operation(amount(10));

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert!(!analysis.fee_missing);
        assert!(analysis.fee_is_low);
        assert_eq!(
            reasons(&analysis, 1),
            vec![ErrorReason::FeeTooLow { required_fee: amount(20), amount: amount(5) }]
        );
        assert_eq!(analysis.operations[1][0].error_type, ErrorType::Error);
        assert_eq!(analysis.totals, Totals { errors: 2, warnings: 0 });
    }

    #[tokio::test]
    async fn test_already_executed_short_circuit() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 100)]);
        let stats = TransactionStats { number: 42, timestamp: 1_700_000_000, transaction_hash: B256::repeat_byte(1) };
        let factory = MemoryContractFactory::new().with_executed(formula.message_hash(), stats.clone());
        let config = AnalyzerConfig::default().stop_on_already_executed(true);

        let analysis = analyze_formula(&formula, settlement(), &factory, &config).await;

        let mut expected = Analysis::empty();
        expected.already_executed = Some(stats.clone());
        expected.totals = Totals { errors: 1, warnings: 0 };
        assert_eq!(analysis, expected);

        let full = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;
        assert_eq!(full.already_executed, Some(stats));
        assert!(full.formula.is_some());
    }

    #[tokio::test]
    async fn test_empty_formula() {
        let formula = build(vec![addr(1)], vec![]);
        let factory = MemoryContractFactory::new();

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert!(analysis.is_empty);
        assert!(!analysis.fee_missing);
        assert_eq!(analysis.presigns.len(), formula.endpoints().len());
        assert_eq!(analysis.totals, Totals { errors: 1, warnings: 0 });
    }

    #[tokio::test]
    async fn test_static_only_without_chain() {
        let formula = build(vec![addr(1), Address::ZERO], vec![send_ether(0, 1, 100)]);

        let analysis =
            analyze_formula(&formula, settlement(), &OfflineContractFactory, &AnalyzerConfig::default()).await;

        assert!(!analysis.is_complete);
        assert!(analysis.presigns.is_empty());
        assert_eq!(reasons(&analysis, 0), vec![ErrorReason::TargetEmpty { target_endpoint: 1 }]);
        assert_eq!(
            analysis.assets_balances.needed_extremes.ether_internal,
            BTreeMap::from([(0, amount(100))])
        );
        assert!(analysis.assets_balances.missing.is_empty());
        assert_eq!(analysis.totals, Totals { errors: 2, warnings: 0 });

        let offline = analyze_formula(
            &formula,
            settlement(),
            &MemoryContractFactory::offline(),
            &AnalyzerConfig::default(),
        )
        .await;
        assert_eq!(offline, analysis);
    }

    #[tokio::test]
    async fn test_forbidden_presign_counts_as_error() {
        let formula = build(vec![addr(1), addr(2)], vec![
            send_ether(0, 1, 1),
            Operation::PayFee { from: 0, amount: amount(1) },
        ]);
        let factory = MemoryContractFactory::new()
            .with_internal_ether(addr(1), amount(10))
            .with_presign(addr(2), formula.message_hash(), PresignState::Forbidden);

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert_eq!(analysis.presigns, vec![PresignState::Default, PresignState::Forbidden]);
        assert_eq!(analysis.totals, Totals { errors: 1, warnings: 0 });
    }

    #[tokio::test]
    async fn test_sender_and_target_checks() {
        let formula = build(vec![addr(1), addr(1), addr(3)], vec![
            send_ether(0, 1, 1),
            Operation::SendEtherWithdraw { from: 0, to: 1, amount: amount(1) },
            send_ether(0, 2, 1),
        ]);
        let factory = MemoryContractFactory::new()
            .with_internal_ether(addr(1), amount(10))
            .with_contract(addr(3));

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert_eq!(
            reasons(&analysis, 0),
            vec![ErrorReason::SenderIsTarget { sender_endpoint: 0, sender_address: addr(1) }]
        );
        assert!(reasons(&analysis, 1).is_empty());
        assert_eq!(
            reasons(&analysis, 2),
            vec![ErrorReason::TargetIsContract { target_endpoint: 2, target_address: addr(3) }]
        );
    }

    #[tokio::test]
    async fn test_erc20_checks_chain() {
        let token = addr(0x20);
        let send = |value| Operation::SendErc20 { from: 0, to: 1, amount: amount(value), token };
        let formula = build(vec![addr(1), addr(2)], vec![send(50), send(500)]);
        let factory = MemoryContractFactory::new()
            .with_erc20(token)
            .with_erc20_balance(token, addr(1), amount(100))
            .with_erc20_allowance(token, addr(1), amount(10));

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert!(matches!(
            reasons(&analysis, 0).as_slice(),
            [ErrorReason::InsufficientErc20Allowance { allowance, .. }] if *allowance == amount(10)
        ));
        // Allowance is not reported while the balance is short.
        assert!(matches!(
            reasons(&analysis, 1).as_slice(),
            [ErrorReason::InsufficientErc20Balance { balance, .. }] if *balance == amount(100)
        ));
        assert_eq!(
            analysis.assets_balances.missing.erc20_balance,
            BTreeMap::from([(0, BTreeMap::from([(token, amount(450))]))])
        );
    }

    #[tokio::test]
    async fn test_token_not_a_contract() {
        let token = addr(0x20);
        let formula = build(vec![addr(1), addr(2)], vec![
            Operation::SendErc20 { from: 0, to: 1, amount: amount(1), token },
            Operation::SendErc721 { from: 0, to: 1, token_id: amount(1), token: addr(0x21) },
        ]);
        let factory = MemoryContractFactory::new().with_contract(token).with_erc20(addr(0x21));

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert_eq!(reasons(&analysis, 0), vec![ErrorReason::NoErc20ContractAtAddress { token_address: token }]);
        assert_eq!(
            reasons(&analysis, 1),
            vec![ErrorReason::NoErc721ContractAtAddress { token_address: addr(0x21) }]
        );
    }

    #[tokio::test]
    async fn test_classification_is_cached_per_run() {
        let token = addr(0x20);
        let send = Operation::SendErc20 { from: 0, to: 1, amount: amount(5), token };
        let formula = build(vec![addr(1), addr(2)], vec![send.clone(), send]);
        let factory = MemoryContractFactory::new()
            .with_erc20(token)
            .with_erc20_balance(token, addr(1), amount(100))
            .with_erc20_allowance(token, addr(1), amount(100));

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert!(analysis.diagnostics().next().is_none());
        // isContract(token), isErc20Contract(token), isContract(target).
        assert_eq!(factory.classification_calls(), 3);

        analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;
        assert_eq!(factory.classification_calls(), 6);
    }

    #[tokio::test]
    async fn test_classification_shared_across_concurrent_operations() {
        let token = addr(0x20);
        let send = Operation::SendErc20 { from: 0, to: 1, amount: amount(5), token };
        let formula = build(vec![addr(1), addr(2)], vec![send.clone(), send]);
        let memory = MemoryContractFactory::new()
            .with_erc20(token)
            .with_erc20_balance(token, addr(1), amount(100))
            .with_erc20_allowance(token, addr(1), amount(100));
        let factory = YieldingFactory(&memory);

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert!(analysis.diagnostics().next().is_none());
        // Both operations are prepared at once; the second awaits the first one's lookups.
        assert_eq!(memory.classification_calls(), 3);
    }

    #[tokio::test]
    async fn test_erc721_ownership_and_approval() {
        let token = addr(0x72);
        let id = amount(9);
        let formula = build(vec![addr(1), addr(2)], vec![Operation::SendErc721 { from: 0, to: 1, token_id: id, token }]);

        let not_owner = MemoryContractFactory::new().with_erc721(token).with_erc721_owner(token, id, addr(2));
        let analysis = analyze_formula(&formula, settlement(), &not_owner, &AnalyzerConfig::default()).await;
        assert!(matches!(
            reasons(&analysis, 0).as_slice(),
            [ErrorReason::NoErc721TokenOwner { owner: Some(owner), .. }] if *owner == addr(2)
        ));

        let not_approved = MemoryContractFactory::new().with_erc721(token).with_erc721_owner(token, id, addr(1));
        let analysis = analyze_formula(&formula, settlement(), &not_approved, &AnalyzerConfig::default()).await;
        assert!(matches!(reasons(&analysis, 0).as_slice(), [ErrorReason::NoErc721Approval { .. }]));
        assert_eq!(
            analysis.assets_balances.missing.erc721_allowance,
            BTreeMap::from([(0, BTreeMap::from([(token, Erc721Allowance::Finite(vec![id]))]))])
        );

        let operator = MemoryContractFactory::new()
            .with_erc721(token)
            .with_erc721_owner(token, id, addr(1))
            .with_erc721_operator(token, addr(1), settlement());
        let analysis = analyze_formula(&formula, settlement(), &operator, &AnalyzerConfig::default()).await;
        assert!(reasons(&analysis, 0).is_empty());
        assert_eq!(
            analysis.assets_balances.starting.erc721_allowance,
            BTreeMap::from([(0, BTreeMap::from([(token, Erc721Allowance::Unlimited)]))])
        );
        assert!(analysis.assets_balances.missing.is_empty());
    }

    #[tokio::test]
    async fn test_erc721_legacy_approval_probe() {
        let token = addr(0x72);
        let id = amount(9);
        let formula = build(vec![addr(1), addr(2)], vec![Operation::SendErc721 { from: 0, to: 1, token_id: id, token }]);
        let factory = MemoryContractFactory::new()
            .with_legacy_erc721(token)
            .with_erc721_owner(token, id, addr(1))
            .with_erc721_approved(token, id, settlement());

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;
        assert!(reasons(&analysis, 0).is_empty());
        assert!(analysis.assets_balances.missing.is_empty());

        let no_probes = AnalyzerConfig::default().legacy_erc721_probes(vec![]);
        let analysis = analyze_formula(&formula, settlement(), &factory, &no_probes).await;
        assert!(matches!(reasons(&analysis, 0).as_slice(), [ErrorReason::Erc721ApprovalUnverifiable { .. }]));

        let unknown = AnalyzerConfig::default()
            .legacy_erc721_probes(vec![LegacyApprovalProbe::new("approvedFor(uint256)")]);
        let analysis = analyze_formula(&formula, settlement(), &factory, &unknown).await;
        assert_eq!(analysis.operations[0][0].error_type, ErrorType::Warning);
    }

    #[tokio::test]
    async fn test_time_condition_checks() {
        let window = |min_block, max_block| Operation::TimeCondition { min_block, max_block };
        let formula = build(vec![addr(1)], vec![window(200, 150), window(0, 50), window(0, 0), window(90, 110)]);
        let factory = MemoryContractFactory::new().with_block(100, 1_700_000_000);

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;

        assert_eq!(
            reasons(&analysis, 0),
            vec![
                ErrorReason::MinimumBlockHigherThanMaximum { minimum_block: 200, maximum_block: 150 },
                ErrorReason::MinimumBlockNotReached {
                    minimum_block: 200,
                    current_block_number: 100,
                    current_block_timestamp: 1_700_000_000,
                },
            ]
        );
        assert!(matches!(reasons(&analysis, 1).as_slice(), [ErrorReason::MaximumBlockAlreadyPassed { .. }]));
        assert_eq!(
            reasons(&analysis, 2),
            vec![ErrorReason::NoTimeConditionSet { minimum_block: 0, maximum_block: 0 }]
        );
        assert!(reasons(&analysis, 3).is_empty());
    }

    #[tokio::test]
    async fn test_report_serialization() {
        let formula = build(vec![addr(1), addr(2)], vec![send_ether(0, 1, 10)]);
        let factory = MemoryContractFactory::new();

        let analysis = analyze_formula(&formula, settlement(), &factory, &AnalyzerConfig::default()).await;
        let json = serde_json::to_value(&analysis).unwrap();

        let diagnostic = &json["operations"][0][0];
        assert_eq!(diagnostic["errorReason"], "insufficientEtherInternal");
        assert_eq!(diagnostic["errorType"], "warning");
        assert_eq!(diagnostic["instructionCode"], 0);
        assert_eq!(diagnostic["errorParameters"]["senderEndpoint"], 0);
        assert!(json["assetsBalances"]["missing"]["etherInternal"].is_object());
        assert_eq!(json["totals"]["warnings"], 2);
    }
}
