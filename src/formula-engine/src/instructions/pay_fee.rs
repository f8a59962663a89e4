use alloy_primitives::U256;
use formula_types::EndpointIndex;

use super::common::{internal_ether_shortfall, sender_empty};
use crate::{
    analysis::{context::AnalysisContext, ErrorReason},
    assets::AssetDiff,
};

pub(super) async fn execution_errors(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    amount: U256,
) -> Vec<ErrorReason> {
    let sender = ctx.address(from);
    let sender_empty = sender_empty(from, sender);

    let mut errors: Vec<ErrorReason> = sender_empty.iter().cloned().collect();
    errors.extend(fee_too_low(ctx, amount));

    if sender_empty.is_none() {
        if let Some(balance) = internal_ether_shortfall(ctx, sender, amount).await {
            errors.push(ErrorReason::InsufficientEtherInternalForFee {
                sender_endpoint: from,
                sender_address: sender,
                contract_address: ctx.settlement,
                balance,
                amount,
            });
        }
    }

    errors
}

/// Fee every operation of the Formula costs, given the settlement's per-operation rate.
pub(crate) fn required_fee(fee_per_operation: U256, operation_count: usize) -> U256 {
    fee_per_operation.saturating_mul(U256::from(operation_count))
}

fn fee_too_low(ctx: &AnalysisContext<'_>, amount: U256) -> Option<ErrorReason> {
    let fee_per_operation = ctx.fee_per_operation?;
    let required_fee = required_fee(fee_per_operation, ctx.formula.operations().len());
    (amount < required_fee).then_some(ErrorReason::FeeTooLow { required_fee, amount })
}

/// The fee leaves the internal ledger without a matching credit.
pub(super) fn value_transfer(from: EndpointIndex, amount: U256) -> AssetDiff {
    let mut diff = AssetDiff::default();
    diff.negative.ether_internal.insert(from, amount);
    diff
}
