//! State timestamps and branch-qualified versions

use crate::common::BranchId;
use serde::{Deserialize, Serialize};

/// Logical timestamp of a replica's data state. Monotone per branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StateTimestamp(pub u64);

impl StateTimestamp {
    pub const ZERO: StateTimestamp = StateTimestamp(0);
    pub const MAX: StateTimestamp = StateTimestamp(u64::MAX);
}

/// A point in the branch tree: a branch plus a timestamp on it. `branch =
/// None` is the pre-creation root lineage shared by every branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub branch: Option<BranchId>,
    pub timestamp: StateTimestamp,
}

impl Version {
    pub fn new(branch: BranchId, timestamp: StateTimestamp) -> Self {
        Self {
            branch: Some(branch),
            timestamp,
        }
    }

    /// The state of a replica that has never received a write.
    pub fn zero() -> Self {
        Self {
            branch: None,
            timestamp: StateTimestamp::ZERO,
        }
    }
}
