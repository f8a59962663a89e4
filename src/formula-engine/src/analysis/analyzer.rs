use alloy_primitives::Address;
use formula_types::{ContractFactory, InstructionCode, Operation, PresignState, TransactionStats};
use futures::future::join_all;
use tracing::{debug, warn};

use super::{
    balances::{calculate_extremes, fetch_starting},
    context::{read_opt, read_or, AnalysisContext},
    Analysis, AnalyzerResult,
};
use crate::{
    assets::AssetBalances,
    config::AnalyzerConfig,
    factory::CachedContractFactory,
    formula::Formula,
    instructions::{execution_errors, required_fee},
};

/// Report everything that would likely stop `formula` from executing on `settlement`.
///
/// Never fails: unreachable chain state degrades to a static-only report
/// (`is_complete == false`) and individual failed reads fall back per check.
pub async fn analyze_formula(
    formula: &Formula,
    settlement: Address,
    factory: &dyn ContractFactory,
    config: &AnalyzerConfig,
) -> Analysis {
    let factory = CachedContractFactory::new(factory);

    if !factory.is_chain_available().await {
        debug!(hash = %formula.message_hash(), "chain unavailable, static analysis only");
        return analyze_static_only(formula, settlement, &factory, config).await;
    }

    debug!(hash = %formula.message_hash(), %settlement, "full analysis");
    analyze_all(formula, settlement, &factory, config).await
}

async fn analyze_static_only(
    formula: &Formula,
    settlement: Address,
    factory: &CachedContractFactory<'_>,
    config: &AnalyzerConfig,
) -> Analysis {
    let ctx = AnalysisContext::offline(formula, settlement, factory, config);
    let is_empty = formula.is_empty();

    let needed_extremes = calculate_extremes(formula.operations()).cleaned();
    debug!(entries = needed_extremes.leaf_count(), "extremes computed");

    Analysis {
        is_complete: false,
        formula: Some(formula.clone()),
        already_executed: None,
        fee_missing: !is_empty && formula.fee_index().is_none(),
        fee_is_low: false,
        is_empty,
        operations: prepare_operations(&ctx).await,
        presigns: Vec::new(),
        assets_balances: AssetBalances {
            needed_extremes,
            ..Default::default()
        },
        totals: Default::default(),
    }
    .with_totals()
}

async fn analyze_all(
    formula: &Formula,
    settlement: Address,
    factory: &CachedContractFactory<'_>,
    config: &AnalyzerConfig,
) -> Analysis {
    let hash = formula.message_hash();

    let executed = read_or(
        factory.is_formula_executed(settlement, hash).await,
        false,
        "executedFormulas",
    );
    let already_executed = if executed {
        Some(execution_record(formula, settlement, factory).await)
    } else {
        None
    };
    if already_executed.is_some() && config.stop_on_already_executed {
        debug!(%hash, "already executed, stopping early");
        return Analysis { already_executed, ..Analysis::empty() }.with_totals();
    }

    let has_time_condition =
        formula.operations().iter().any(|op| op.code() == InstructionCode::TimeCondition);
    let (fee_per_operation, current_block) = futures::join!(
        factory.fee_per_operation(settlement),
        async {
            if has_time_condition {
                read_opt(factory.current_block().await, "currentBlock")
            } else {
                None
            }
        },
    );
    let fee_per_operation = read_opt(fee_per_operation, "feePerOperation");

    let ctx = AnalysisContext {
        formula,
        settlement,
        factory,
        chain_available: true,
        config,
        fee_per_operation,
        current_block,
    };

    let is_empty = formula.is_empty();
    let fee_amount = formula.fee_index().and_then(|index| match formula.operations()[index] {
        Operation::PayFee { amount, .. } => Some(amount),
        _ => None,
    });
    let fee_is_low = match (fee_amount, fee_per_operation) {
        (Some(amount), Some(per_operation)) if !is_empty => {
            amount < required_fee(per_operation, formula.operations().len())
        }
        _ => false,
    };

    let needed_extremes = calculate_extremes(formula.operations()).cleaned();
    let (operations, presigns, starting) = futures::join!(
        prepare_operations(&ctx),
        prepare_presigns(&ctx),
        fetch_starting(&ctx, &needed_extremes),
    );
    let assets_balances = AssetBalances::new(starting, needed_extremes);
    debug!(missing = assets_balances.missing.leaf_count(), "balances fetched");

    Analysis {
        is_complete: true,
        formula: Some(formula.clone()),
        already_executed,
        fee_missing: !is_empty && formula.fee_index().is_none(),
        fee_is_low,
        is_empty,
        operations,
        presigns,
        assets_balances,
        totals: Default::default(),
    }
    .with_totals()
}

/// Execution event for an executed Formula; a placeholder record when the event is unreadable.
async fn execution_record(
    formula: &Formula,
    settlement: Address,
    factory: &CachedContractFactory<'_>,
) -> TransactionStats {
    match factory.formula_execution(settlement, formula.message_hash()).await {
        Ok(Some(stats)) => stats,
        Ok(None) => {
            warn!(hash = %formula.message_hash(), "executed but no execution event found");
            TransactionStats::default()
        }
        Err(err) => {
            warn!(hash = %formula.message_hash(), %err, "execution event unreadable");
            TransactionStats::default()
        }
    }
}

async fn prepare_operations(ctx: &AnalysisContext<'_>) -> Vec<AnalyzerResult> {
    join_all(ctx.formula.operations().iter().map(|op| execution_errors(op, ctx))).await
}

async fn prepare_presigns(ctx: &AnalysisContext<'_>) -> Vec<PresignState> {
    let hash = ctx.formula.message_hash();
    join_all(ctx.formula.endpoints().iter().map(|endpoint| async move {
        read_or(
            ctx.factory.presign_state(ctx.settlement, *endpoint, hash).await,
            PresignState::Default,
            "presignedFormulas",
        )
    }))
    .await
}
