//! Time allocation: rescale segment durations to the requested lecture length

use super::{PlanState, Segment};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Durations are rounded to this many minutes
pub const MINUTE_INCREMENT: i64 = 5;

/// Shortest segment the allocator will produce
pub const MIN_SEGMENT_MINUTES: i64 = 5;

/// Longest segment duration accepted from a plan
pub const MAX_SEGMENT_MINUTES: i64 = i32::MAX as i64;

/// Precondition failures of the allocation stage. All are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("no segments to allocate")]
    NoSegments,

    #[error("segment durations sum to {total} minutes; cannot rescale a non-positive total")]
    ZeroDuration { total: i64 },

    #[error("{segments} segments need at least {required} minutes but the lecture is {available} minutes")]
    TooManySegments {
        segments: usize,
        required: i64,
        available: i64,
    },

    #[error("malformed plan: {message}")]
    MalformedPlan { message: String },
}

/// Rescale `segments` so their durations sum to `duration_hours * 60`.
///
/// A list that already sums to the target is returned unchanged. Otherwise
/// every duration is scaled, rounded to the nearest [`MINUTE_INCREMENT`] and
/// clamped to [`MIN_SEGMENT_MINUTES`]; the rounding residual then goes to the
/// last segment. If that would take the last segment under the minimum, the
/// shortfall is borrowed from earlier segments, latest first.
pub fn allocate(segments: &[Segment], duration_hours: u32) -> Result<Vec<Segment>, AllocationError> {
    if segments.is_empty() {
        return Err(AllocationError::NoSegments);
    }

    let target_total = i64::from(duration_hours) * 60;
    let current_total = segments
        .iter()
        .try_fold(0i64, |total, s| total.checked_add(s.duration_mins))
        .ok_or_else(|| malformed("segment durations overflow"))?;

    if current_total <= 0 {
        return Err(AllocationError::ZeroDuration {
            total: current_total,
        });
    }

    let mut balanced = segments.to_vec();
    if current_total == target_total {
        debug!(target_total, "segments already balanced");
        return Ok(balanced);
    }

    let required = segments.len() as i64 * MIN_SEGMENT_MINUTES;
    if required > target_total {
        return Err(AllocationError::TooManySegments {
            segments: segments.len(),
            required,
            available: target_total,
        });
    }

    let scale = target_total as f64 / current_total as f64;
    for segment in balanced.iter_mut() {
        let scaled = segment.duration_mins as f64 * scale / MINUTE_INCREMENT as f64;
        segment.duration_mins = (scaled.round() as i64 * MINUTE_INCREMENT).max(MIN_SEGMENT_MINUTES);
    }

    let new_total: i64 = balanced.iter().map(|s| s.duration_mins).sum();
    let residual = target_total - new_total;
    reconcile_residual(&mut balanced, residual);

    debug!(
        current_total,
        target_total,
        scale,
        residual,
        "rescaled segment durations"
    );
    Ok(balanced)
}

fn reconcile_residual(segments: &mut [Segment], residual: i64) {
    let Some((last, earlier)) = segments.split_last_mut() else {
        return;
    };

    last.duration_mins += residual;
    if last.duration_mins >= MIN_SEGMENT_MINUTES {
        return;
    }

    let mut shortfall = MIN_SEGMENT_MINUTES - last.duration_mins;
    last.duration_mins = MIN_SEGMENT_MINUTES;
    for segment in earlier.iter_mut().rev() {
        if shortfall == 0 {
            break;
        }
        let spare = segment.duration_mins - MIN_SEGMENT_MINUTES;
        let taken = spare.min(shortfall).max(0);
        segment.duration_mins -= taken;
        shortfall -= taken;
    }
}

/// Read the planner's `segments` array out of a raw plan.
///
/// Each entry must carry a string `topic` and a non-negative whole-number
/// `duration_mins` no larger than [`MAX_SEGMENT_MINUTES`]; integral floats and
/// numeric strings are accepted since models emit both.
pub fn segments_from_plan(plan: &Map<String, Value>) -> Result<Vec<Segment>, AllocationError> {
    let entries = match plan.get("segments") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(malformed("`segments` is not an array")),
        None => return Err(AllocationError::NoSegments),
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let topic = entry
                .get("topic")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| malformed(format!("segments[{}] has no topic", index)))?;
            let duration_mins = entry
                .get("duration_mins")
                .and_then(whole_minutes)
                .ok_or_else(|| {
                    malformed(format!(
                        "segments[{}].duration_mins is not a whole number in 0..={}",
                        index, MAX_SEGMENT_MINUTES
                    ))
                })?;
            Ok(Segment::new(topic, duration_mins))
        })
        .collect()
}

fn whole_minutes(value: &Value) -> Option<i64> {
    let minutes = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f <= MAX_SEGMENT_MINUTES as f64)
                    .map(|f| f as i64)
            }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (0..=MAX_SEGMENT_MINUTES).contains(&minutes).then_some(minutes)
}

fn malformed<S: Into<String>>(message: S) -> AllocationError {
    AllocationError::MalformedPlan {
        message: message.into(),
    }
}

/// Allocation stage: balance the planner's segments and write them back.
///
/// On success the raw plan's `segments` and `total_minutes` reflect the
/// balanced allocation and `state.segments` holds the same list.
pub fn run(state: &mut PlanState) -> Result<(), AllocationError> {
    let plan = state
        .raw_plan()
        .ok_or_else(|| malformed("no lecture plan to allocate"))?;
    let segments = segments_from_plan(plan)?;
    let balanced = allocate(&segments, state.duration_hours)?;
    let target_total = state.target_minutes();

    let encoded: Vec<Value> = balanced
        .iter()
        .map(|s| serde_json::json!({ "topic": s.topic, "duration_mins": s.duration_mins }))
        .collect();
    if let Some(plan) = state.raw_plan_mut() {
        plan.insert("segments".to_string(), Value::Array(encoded));
        plan.insert("total_minutes".to_string(), Value::from(target_total));
    }

    info!(
        run_id = %state.run_id,
        segments = balanced.len(),
        target_total,
        "allocated lecture time"
    );
    state.segments = balanced;
    Ok(())
}
