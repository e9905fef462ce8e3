//! Visibility oracle

use crate::common::ServerId;
use crate::coordinator::watch::WatchableMap;
use std::collections::BTreeSet;

/// True if `target` definitely cannot be seen by a strict majority of
/// `judges`. A judge counts as seeing the target if the connections map says
/// so, or if the coordinator cannot see the judge at all; assuming the best
/// of unreachable judges avoids spurious failovers while the coordinator
/// itself is partitioned.
pub fn invisible_to_majority_of_set(
    target: &ServerId,
    judges: &BTreeSet<ServerId>,
    connections: &WatchableMap<(ServerId, ServerId), ()>,
) -> bool {
    let mut count = 0;
    for judge in judges {
        if connections.get_key(&(*judge, *target)).is_some()
            || connections.get_key(&(*judge, *judge)).is_none()
        {
            count += 1;
        }
    }
    !(count > judges.len() / 2)
}
