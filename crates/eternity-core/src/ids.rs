use crate::model::InstanceId;
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

/// Ids reserved for benchmark instances.
pub const BENCHMARK_INSTANCE_IDS: Range<InstanceId> = 3_000_000_000..3_000_001_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no available instance ids in {start}..{end}")]
pub struct ExhaustedRangeError {
    pub start: InstanceId,
    pub end: InstanceId,
}

/// Smallest id in `range` that is not in `used`.
pub fn next_free_id(
    used: impl IntoIterator<Item = InstanceId>,
    range: Range<InstanceId>,
) -> Result<InstanceId, ExhaustedRangeError> {
    let used: HashSet<InstanceId> = used.into_iter().collect();
    range
        .clone()
        .find(|id| !used.contains(id))
        .ok_or(ExhaustedRangeError {
            start: range.start,
            end: range.end,
        })
}

pub fn is_benchmark_id(id: InstanceId) -> bool {
    BENCHMARK_INSTANCE_IDS.contains(&id)
}
