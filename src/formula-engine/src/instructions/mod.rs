//! Per-instruction behavior: execution checks against chain state and the asset change an
//! operation causes. Dispatch is a match over the closed [`Operation`] set.

mod common;
mod pay_fee;
mod send_erc20;
mod send_erc721;
mod send_ether;
mod time_condition;

pub(crate) use pay_fee::required_fee;
pub(crate) use send_erc721::approved_spender;

use formula_types::Operation;

use crate::{
    analysis::{context::AnalysisContext, AnalyzerResult, AnalyzerResultError},
    assets::AssetDiff,
};

/// Diagnostics for one operation, in check order.
pub async fn execution_errors(operation: &Operation, ctx: &AnalysisContext<'_>) -> AnalyzerResult {
    let reasons = match *operation {
        Operation::SendEther { from, to, amount } => {
            send_ether::execution_errors(ctx, from, to, amount, false).await
        }
        Operation::SendErc20 { from, to, amount, token } => {
            send_erc20::execution_errors(ctx, from, to, amount, token).await
        }
        Operation::SendErc721 { from, to, token_id, token } => {
            send_erc721::execution_errors(ctx, from, to, token_id, token).await
        }
        Operation::SendEtherWithdraw { from, to, amount } => {
            send_ether::execution_errors(ctx, from, to, amount, true).await
        }
        Operation::PayFee { from, amount } => pay_fee::execution_errors(ctx, from, amount).await,
        Operation::TimeCondition { min_block, max_block } => {
            time_condition::execution_errors(ctx, min_block, max_block)
        }
    };

    let code = operation.code();
    reasons.into_iter().map(|reason| AnalyzerResultError::new(code, reason)).collect()
}

/// Asset change caused by `operation` alone.
pub fn value_transfer(operation: &Operation) -> AssetDiff {
    match *operation {
        Operation::SendEther { from, to, amount } => send_ether::send_transfer(from, to, amount),
        Operation::SendErc20 { from, to, amount, token } => {
            send_erc20::value_transfer(from, to, amount, token)
        }
        Operation::SendErc721 { from, to, token_id, token } => {
            send_erc721::value_transfer(from, to, token_id, token)
        }
        Operation::SendEtherWithdraw { from, to, amount } => {
            send_ether::withdraw_transfer(from, to, amount)
        }
        Operation::PayFee { from, amount } => pay_fee::value_transfer(from, amount),
        Operation::TimeCondition { .. } => AssetDiff::default(),
    }
}
