use crate::analysis::{context::AnalysisContext, ErrorReason};

/// Block-window checks. A bound of `0` is unset; checks against the current block are
/// skipped when no block could be read.
pub(super) fn execution_errors(
    ctx: &AnalysisContext<'_>,
    minimum_block: u32,
    maximum_block: u32,
) -> Vec<ErrorReason> {
    let mut errors = Vec::new();

    if minimum_block != 0 && maximum_block != 0 && maximum_block < minimum_block {
        errors.push(ErrorReason::MinimumBlockHigherThanMaximum { minimum_block, maximum_block });
    }

    if let Some(block) = ctx.current_block {
        if minimum_block != 0 && u64::from(minimum_block) > block.number {
            errors.push(ErrorReason::MinimumBlockNotReached {
                minimum_block,
                current_block_number: block.number,
                current_block_timestamp: block.timestamp,
            });
        }
        if maximum_block != 0 && u64::from(maximum_block) < block.number {
            errors.push(ErrorReason::MaximumBlockAlreadyPassed {
                maximum_block,
                current_block_number: block.number,
                current_block_timestamp: block.timestamp,
            });
        }
    }

    if minimum_block == 0 && maximum_block == 0 {
        errors.push(ErrorReason::NoTimeConditionSet { minimum_block, maximum_block });
    }

    errors
}
