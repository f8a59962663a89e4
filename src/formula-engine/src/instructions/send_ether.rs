use alloy_primitives::U256;
use formula_types::EndpointIndex;

use super::common::{internal_ether_shortfall, sender_empty, sender_is_target, target_empty, target_is_contract};
use crate::{
    analysis::{context::AnalysisContext, ErrorReason},
    assets::AssetDiff,
};

/// Checks for `sendEther` and `sendEtherWithdraw`; only a withdrawal may pay the sender itself.
pub(super) async fn execution_errors(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    to: EndpointIndex,
    amount: U256,
    sender_can_be_target: bool,
) -> Vec<ErrorReason> {
    let sender = ctx.address(from);
    let target = ctx.address(to);

    let sender_empty = sender_empty(from, sender);
    let target_empty = target_empty(to, target);
    let mut errors: Vec<ErrorReason> = sender_empty.iter().chain(&target_empty).cloned().collect();

    if sender_empty.is_none() {
        if let Some(balance) = internal_ether_shortfall(ctx, sender, amount).await {
            errors.push(ErrorReason::InsufficientEtherInternal {
                sender_endpoint: from,
                sender_address: sender,
                contract_address: ctx.settlement,
                balance,
                amount,
            });
        }
    }

    if !sender_can_be_target && sender_empty.is_none() && target_empty.is_none() {
        errors.extend(sender_is_target(from, sender, target));
    }

    if target_empty.is_none() {
        errors.extend(target_is_contract(ctx, to, target).await);
    }

    errors
}

/// Internal ledger to internal ledger.
pub(super) fn send_transfer(from: EndpointIndex, to: EndpointIndex, amount: U256) -> AssetDiff {
    let mut diff = AssetDiff::default();
    diff.positive.ether_internal.insert(to, amount);
    diff.negative.ether_internal.insert(from, amount);
    diff
}

/// Internal ledger of `from` out to the plain balance of `to`.
pub(super) fn withdraw_transfer(from: EndpointIndex, to: EndpointIndex, amount: U256) -> AssetDiff {
    let mut diff = AssetDiff::default();
    diff.positive.ether_external.insert(to, amount);
    diff.negative.ether_internal.insert(from, amount);
    diff
}
