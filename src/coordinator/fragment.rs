//! Ack fragmentation
//!
//! A contract ack is not necessarily homogeneous: its version field is a
//! region map, and after a failover a replica may straddle several branches.
//! The contract calculator assumes single-timestamp, single-branch inputs,
//! so acks are broken into homogeneous fragments first.

use crate::branch::{version_find_branch_common, BranchHistoryCombiner, BranchHistoryReader};
use crate::common::BranchId;
use crate::coordinator::contract::{AckFragment, ContractAck};
use crate::region::{Region, RegionMap};

/// Split `ack` into homogeneous fragments over `region`. Fragments carry the
/// ack's state and branch; versioned acks additionally carry the timestamp
/// of the version projected onto the canonical branch for each sub-region.
pub fn break_ack_into_fragments(
    region: &Region,
    ack: &ContractAck,
    current_branches: &RegionMap<Option<BranchId>>,
    raft_branch_history: &dyn BranchHistoryReader,
) -> RegionMap<AckFragment> {
    let base = AckFragment {
        state: ack.state,
        version: None,
        branch: ack.branch,
    };
    let Some(ack_version) = &ack.version else {
        return RegionMap::new(region.clone(), base);
    };
    let combined = BranchHistoryCombiner::new(raft_branch_history, &ack.branch_history);
    // Fragment over canonical branches, then over the ack's own version
    // structure, then project each version onto the canonical branch.
    current_branches.map_multi(region, |branch_region, canonical_branch| {
        ack_version.map_multi(branch_region, |version_region, version| {
            let on_canonical_branch = version_find_branch_common(
                &combined,
                *version,
                *canonical_branch,
                version_region,
            );
            on_canonical_branch.map(version_region, |common_version| AckFragment {
                version: Some(common_version.timestamp),
                ..base.clone()
            })
        })
    })
}
