use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use formula_types::EndpointIndex;
use tracing::{debug, warn};

use super::common::{
    no_contract_at_token, sender_empty, sender_is_target, target_empty, target_is_contract, token_empty,
};
use crate::{
    analysis::{
        context::{read_opt, read_or, AnalysisContext},
        ErrorReason,
    },
    assets::{AssetDiff, Erc721Allowance, TokenIds},
};

pub(super) async fn execution_errors(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    to: EndpointIndex,
    token_id: U256,
    token: Address,
) -> Vec<ErrorReason> {
    let sender = ctx.address(from);
    let target = ctx.address(to);

    let sender_empty = sender_empty(from, sender);
    let target_empty = target_empty(to, target);
    let token_empty = token_empty(token);
    let mut errors: Vec<ErrorReason> =
        sender_empty.iter().chain(&target_empty).chain(&token_empty).cloned().collect();

    if token_empty.is_none() {
        if let Some(error) = no_contract_at_token(ctx, token).await {
            errors.push(error);
        } else if let Some(error) = no_erc721_contract(ctx, token).await {
            errors.push(error);
        } else if sender_empty.is_none() {
            if let Some(error) = ownership(ctx, from, sender, token_id, token).await {
                errors.push(error);
            } else {
                errors.extend(approval(ctx, from, sender, token_id, token).await);
            }
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

async fn no_erc721_contract(ctx: &AnalysisContext<'_>, token_address: Address) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }
    let is_erc721 =
        read_or(ctx.factory.is_erc721_contract(token_address).await, false, "isErc721Contract");
    (!is_erc721).then_some(ErrorReason::NoErc721ContractAtAddress { token_address })
}

async fn ownership(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    sender: Address,
    token_id: U256,
    token: Address,
) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }
    let owner = read_opt(ctx.factory.erc721_owner_of(token, token_id).await, "ownerOf");
    (owner != Some(sender)).then_some(ErrorReason::NoErc721TokenOwner {
        sender_endpoint: from,
        sender_address: sender,
        token_id,
        token_address: token,
        owner,
    })
}

async fn approval(
    ctx: &AnalysisContext<'_>,
    from: EndpointIndex,
    sender: Address,
    token_id: U256,
    token: Address,
) -> Option<ErrorReason> {
    if !ctx.chain_available {
        return None;
    }

    let (approved, for_all) = futures::join!(
        approved_spender(ctx, token, token_id),
        ctx.factory.erc721_is_approved_for_all(token, sender, ctx.settlement),
    );
    let for_all = read_opt(for_all, "isApprovedForAll");
    if approved == Some(ctx.settlement) || for_all == Some(true) {
        return None;
    }

    if approved.is_none() {
        Some(ErrorReason::Erc721ApprovalUnverifiable {
            sender_endpoint: from,
            sender_address: sender,
            token_id,
            token_address: token,
        })
    } else {
        Some(ErrorReason::NoErc721Approval {
            sender_endpoint: from,
            sender_address: sender,
            token_id,
            token_address: token,
        })
    }
}

/// Spender approved for `token_id`: `getApproved`, then each configured legacy getter in
/// order. `None` when nothing answered.
pub(crate) async fn approved_spender(
    ctx: &AnalysisContext<'_>,
    token: Address,
    token_id: U256,
) -> Option<Address> {
    match ctx.factory.erc721_get_approved(token, token_id).await {
        Ok(spender) => return Some(spender),
        Err(err) => debug!(%token, %err, "getApproved failed, trying legacy getters"),
    }

    for probe in &ctx.config.legacy_erc721_probes {
        match ctx.factory.erc721_legacy_approved(token, probe, token_id).await {
            Ok(spender) => return Some(spender),
            Err(err) => debug!(%token, probe = %probe.signature, %err, "legacy approval getter failed"),
        }
    }

    warn!(%token, %token_id, "approval could not be read");
    None
}

/// Moves one token id and consumes one approval use of the sender.
pub(super) fn value_transfer(
    from: EndpointIndex,
    to: EndpointIndex,
    token_id: U256,
    token: Address,
) -> AssetDiff {
    let mut diff = AssetDiff::default();
    diff.positive.erc721_balance.insert(to, BTreeMap::from([(token, TokenIds::one(token_id))]));
    diff.negative.erc721_balance.insert(from, BTreeMap::from([(token, TokenIds::one(token_id))]));
    diff.negative
        .erc721_allowance
        .insert(from, BTreeMap::from([(token, Erc721Allowance::one(token_id))]));
    diff
}
