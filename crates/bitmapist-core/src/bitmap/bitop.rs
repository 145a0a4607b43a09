//! Derived bitmaps.
//!
//! A combine always re-issues the store operation; it never reads existing
//! data to skip work. The result key expires after the finished or the
//! unfinished expiry depending on whether every operand's period is closed.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::error::{BitmapistError, BitmapistResult, ErrorCode};
use crate::tracker::Tracker;
use crate::traits::StoreCommand;
use crate::types::{key, BitOperator};

/// Combine `operands` with `op`, evaluating expiry against the current time.
pub async fn combine(
    tracker: &Tracker,
    op: BitOperator,
    operands: &[Bitmap],
) -> BitmapistResult<Bitmap> {
    combine_at(tracker, op, operands, tracker.now()).await
}

/// Combine `operands` with `op`, evaluating expiry against `now`.
///
/// The combine and its expiry join the open transaction if there is one.
pub async fn combine_at(
    tracker: &Tracker,
    op: BitOperator,
    operands: &[Bitmap],
    now: DateTime<Utc>,
) -> BitmapistResult<Bitmap> {
    check_operands(op, operands)?;

    let sources: Vec<String> = operands.iter().map(|b| b.key().to_string()).collect();
    let dest = key::bitop_key(tracker.key_prefix(), op, &sources);
    let finished = operands.iter().all(|b| b.is_finished(now));
    let ttl = if finished {
        tracker.config().finished_ops_expire
    } else {
        tracker.config().unfinished_ops_expire
    };

    debug!(key = %dest, op = %op, ttl, finished, "Combining bitmaps");
    tracker
        .dispatch(vec![
            StoreCommand::BitOp {
                op,
                dest: dest.clone(),
                sources,
            },
            StoreCommand::Expire {
                key: dest.clone(),
                seconds: ttl,
            },
        ])
        .await?;

    Ok(Bitmap::derived(dest, op, operands.to_vec()))
}

fn check_operands(op: BitOperator, operands: &[Bitmap]) -> BitmapistResult<()> {
    if operands.is_empty() {
        return Err(BitmapistError::validation_with_suggestion(
            ErrorCode::ValEmptyOperands,
            format!("{} needs at least one operand", op),
            "Pass one or more bitmaps to combine",
        ));
    }
    if op.is_unary() && operands.len() != 1 {
        return Err(BitmapistError::validation_with_suggestion(
            ErrorCode::ValOperandCount,
            format!("NOT takes exactly one operand, got {}", operands.len()),
            "Combine the operands first, then negate the result",
        ));
    }
    Ok(())
}
