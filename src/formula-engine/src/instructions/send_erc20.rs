use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use formula_types::EndpointIndex;

use super::common::{
    no_contract_at_token, sender_empty, sender_is_target, target_empty, target_is_contract, token_empty,
};
use crate::{
    analysis::{
        context::{read_or, AnalysisContext},
        ErrorReason,
    },
    assets::AssetDiff,
};

pub(super) async fn execution_errors(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    to: EndpointIndex,
    amount: U256,
    token: Address,
) -> Vec<ErrorReason> {
    let sender = ctx.address(from);
    let target = ctx.address(to);

    let sender_empty = sender_empty(from, sender);
    let target_empty = target_empty(to, target);
    let token_empty = token_empty(token);
    let mut errors: Vec<ErrorReason> =
        sender_empty.iter().chain(&target_empty).chain(&token_empty).cloned().collect();

    // Each link of the chain only runs when every earlier one passed.
    if token_empty.is_none() {
        if let Some(error) = no_contract_at_token(ctx, token).await {
            errors.push(error);
        } else if let Some(error) = no_erc20_contract(ctx, token).await {
            errors.push(error);
        } else if sender_empty.is_none() {
            errors.extend(balance_and_allowance(ctx, from, sender, amount, token).await);
        }
    }

    if sender_empty.is_none() && target_empty.is_none() {
        errors.extend(sender_is_target(from, sender, target));
    }
    if target_empty.is_none() {
        errors.extend(target_is_contract(ctx, to, target).await);
    }

    errors
}

async fn no_erc20_contract(ctx: &AnalysisContext<'_>, token_address: Address) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }
    let is_erc20 = read_or(ctx.factory.is_erc20_contract(token_address).await, false, "isErc20Contract");
    (!is_erc20).then_some(ErrorReason::NoErc20ContractAtAddress { token_address })
}

/// Balance first; the allowance is only reported once the balance suffices.
async fn balance_and_allowance(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    sender: Address,
    amount: U256,
    token: Address,
) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }

    let (balance, allowance) = futures::join!(
        ctx.factory.erc20_balance_of(token, sender),
        ctx.factory.erc20_allowance(token, sender, ctx.settlement),
    );

    let balance = read_or(balance, U256::ZERO, "balanceOf");
    if balance < amount {
        return Some(ErrorReason::InsufficientErc20Balance {
            sender_endpoint: from,
            sender_address: sender,
            token_address: token,
            amount,
            balance,
        });
    }

    let allowance = read_or(allowance, U256::ZERO, "allowance");
    (allowance < amount).then_some(ErrorReason::InsufficientErc20Allowance {
        sender_endpoint: from,
        sender_address: sender,
        token_address: token,
        amount,
        allowance,
    })
}

/// Moves the balance and consumes the sender's allowance to the settlement contract.
pub(super) fn value_transfer(
    from: EndpointIndex,
    to: EndpointIndex,
    amount: U256,
    token: Address,
) -> AssetDiff {
    let mut diff = AssetDiff::default();
    diff.positive.erc20_balance.insert(to, BTreeMap::from([(token, amount)]));
    diff.negative.erc20_balance.insert(from, BTreeMap::from([(token, amount)]));
    diff.negative.erc20_allowance.insert(from, BTreeMap::from([(token, amount)]));
    diff
}
