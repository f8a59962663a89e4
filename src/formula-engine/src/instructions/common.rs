//! Checks shared by several instructions. Each returns the reason it found, if any.

use alloy_primitives::{Address, U256};
use formula_types::EndpointIndex;

use crate::analysis::{
    context::{read_or, AnalysisContext},
    ErrorReason,
};

/// The zero address marks an endpoint that was never filled in.
pub(crate) fn sender_empty(sender_endpoint: EndpointIndex, sender: Address) -> Option<ErrorReason> {
    sender.is_zero().then_some(ErrorReason::SenderEmpty { sender_endpoint })
}

pub(crate) fn target_empty(target_endpoint: EndpointIndex, target: Address) -> Option<ErrorReason> {
    target.is_zero().then_some(ErrorReason::TargetEmpty { target_endpoint })
}

pub(crate) fn token_empty(token_address: Address) -> Option<ErrorReason> {
    token_address.is_zero().then_some(ErrorReason::TokenEmpty { token_address })
}

/// Compares addresses, so two endpoints holding the same address also trigger it.
pub(crate) fn sender_is_target(
    sender_endpoint: EndpointIndex,
    sender: Address,
    target: Address,
) -> Option<ErrorReason> {
    (sender == target).then_some(ErrorReason::SenderIsTarget {
        sender_endpoint,
        sender_address: sender,
    })
}

/// Contracts credited through the internal ledger may never notice the credit.
pub(crate) async fn target_is_contract(
    ctx: &AnalysisContext<'_>,
    target_endpoint: EndpointIndex,
    target: Address,
) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }
    let is_contract = read_or(ctx.factory.is_contract(target).await, false, "isContract");
    is_contract.then_some(ErrorReason::TargetIsContract {
        target_endpoint,
        target_address: target,
    })
}

pub(crate) async fn no_contract_at_token(
    ctx: &AnalysisContext<'_>,
    token_address: Address,
) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }
    let is_contract = read_or(ctx.factory.is_contract(token_address).await, false, "isContract");
    (!is_contract).then_some(ErrorReason::NoContractAtTokenAddress { token_address })
}

/// Internal balance of `owner` when it is below `amount`.
pub(crate) async fn internal_ether_shortfall(
    ctx: &AnalysisContext<'_>,
    owner: Address,
    amount: U256,
) -> Option<U256> {
    if !ctx.chain_available {
        return None;
    }
    let balance = read_or(
        ctx.factory.internal_ether_balance(ctx.settlement, owner).await,
        U256::ZERO,
        "etherBalances",
    );
    (balance < amount).then_some(balance)
}
