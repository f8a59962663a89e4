use std::{collections::BTreeMap, future::Future};

use alloy_primitives::{Address, U256};
use formula_types::{EndpointIndex, Operation};
use futures::future::join_all;
use tracing::warn;

use super::context::{read_opt, read_or, AnalysisContext};
use crate::{
    assets::{max_states, AssetDiff, AssetState, Erc721Allowance, TokenIds, TokenMap},
    instructions::{approved_spender, value_transfer},
};

/// Replay `operations` in order and return the peak amount each endpoint must hold.
///
/// After every step the running diff is normalized, and the peak is taken over both the
/// running debit and the debit this step alone would cause before its own credit lands.
/// The latter keeps a self-transfer, or a sender repaid later, from masking the need.
pub fn calculate_extremes(operations: &[Operation]) -> AssetState {
    let mut current = AssetDiff::default();
    let mut extremes = AssetState::default();

    for operation in operations {
        let change = value_transfer(operation);

        let local = current.add(&change.negative_only()).normalize();
        current = current.add(&change).normalize();

        extremes = max_states([&extremes, &current.negative, &local.negative]);
    }

    extremes
}

/// Current holdings for exactly the entries present in `needed`.
pub async fn fetch_starting(ctx: &AnalysisContext<'_>, needed: &AssetState) -> AssetState {
    let (
        ether_internal,
        ether_external,
        erc20_balance,
        erc20_allowance,
        erc721_balance,
        erc721_allowance,
    ) = futures::join!(
        per_endpoint(&needed.ether_internal, |index, _| async move {
            read_or(
                ctx.factory.internal_ether_balance(ctx.settlement, ctx.address(index)).await,
                U256::ZERO,
                "etherBalances",
            )
        }),
        per_endpoint(&needed.ether_external, |index, _| async move {
            read_or(
                ctx.factory.external_ether_balance(ctx.address(index)).await,
                U256::ZERO,
                "getBalance",
            )
        }),
        per_token(&needed.erc20_balance, |index, token, _| async move {
            read_or(
                ctx.factory.erc20_balance_of(token, ctx.address(index)).await,
                U256::ZERO,
                "balanceOf",
            )
        }),
        per_token(&needed.erc20_allowance, |index, token, _| async move {
            read_or(
                ctx.factory.erc20_allowance(token, ctx.address(index), ctx.settlement).await,
                U256::ZERO,
                "allowance",
            )
        }),
        per_token(&needed.erc721_balance, |index, token, ids| async move {
            owned_tokens(ctx, ctx.address(index), token, ids).await
        }),
        per_token(&needed.erc721_allowance, |index, token, wanted| async move {
            granted_approvals(ctx, ctx.address(index), token, wanted).await
        }),
    );

    AssetState {
        ether_internal,
        ether_external,
        erc20_balance,
        erc20_allowance,
        erc721_balance,
        erc721_allowance,
    }
}

async fn per_endpoint<'n, N, T, F, Fut>(
    needed: &'n BTreeMap<EndpointIndex, N>,
    read: F,
) -> BTreeMap<EndpointIndex, T>
where
    F: Fn(EndpointIndex, &'n N) -> Fut,
    Fut: Future<Output = T>,
{
    let reads = needed.iter().map(|(index, amount)| {
        let read = read(*index, amount);
        async move { (*index, read.await) }
    });
    join_all(reads).await.into_iter().collect()
}

async fn per_token<'n, N, T, F, Fut>(
    needed: &'n BTreeMap<EndpointIndex, TokenMap<N>>,
    read: F,
) -> BTreeMap<EndpointIndex, TokenMap<T>>
where
    F: Fn(EndpointIndex, Address, &'n N) -> Fut,
    Fut: Future<Output = T>,
{
    let reads = needed.iter().flat_map(|(index, tokens)| {
        tokens.iter().map(move |(token, amount)| (*index, *token, amount))
    });
    let reads = reads.map(|(index, token, amount)| {
        let read = read(index, token, amount);
        async move { (index, token, read.await) }
    });

    let mut out: BTreeMap<EndpointIndex, TokenMap<T>> = BTreeMap::new();
    for (index, token, value) in join_all(reads).await {
        out.entry(index).or_default().insert(token, value);
    }
    out
}

/// The subset of `ids` currently owned by `owner`. Unreadable owners count as not owned.
async fn owned_tokens(
    ctx: &AnalysisContext<'_>,
    owner: Address,
    token: Address,
    ids: &TokenIds,
) -> TokenIds {
    let owners = join_all(ids.0.iter().map(|id| async move {
        let current = read_opt(ctx.factory.erc721_owner_of(token, *id).await, "ownerOf");
        (current == Some(owner)).then_some(*id)
    }))
    .await;
    TokenIds(owners.into_iter().flatten().collect())
}

/// Approvals `owner` has granted the settlement contract, limited to what `wanted` asks for.
async fn granted_approvals(
    ctx: &AnalysisContext<'_>,
    owner: Address,
    token: Address,
    wanted: &Erc721Allowance,
) -> Erc721Allowance {
    let for_all = ctx.factory.erc721_is_approved_for_all(token, owner, ctx.settlement).await;
    match for_all {
        Ok(true) => return Erc721Allowance::Unlimited,
        Ok(false) => {}
        Err(err) => warn!(%token, %err, "isApprovedForAll failed, checking per token"),
    }

    let ids = match wanted {
        Erc721Allowance::Unlimited => return Erc721Allowance::default(),
        Erc721Allowance::Finite(ids) => ids,
    };
    let approved = join_all(ids.iter().map(|id| async move {
        (approved_spender(ctx, token, *id).await == Some(ctx.settlement)).then_some(*id)
    }))
    .await;
    Erc721Allowance::Finite(approved.into_iter().flatten().collect())
}
