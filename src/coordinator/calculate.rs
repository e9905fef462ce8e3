//! Contract calculation
//!
//! `calculate_contract` derives a new contract for one homogeneous region
//! from the old contract, the shard config, the ack fragments, and the
//! connectivity observations. `calculate_all_contracts` drives it across the
//! whole key space and emits a diff for the consensus log.
//!
//! Both functions are pure and strictly synchronous: they run on the
//! consensus leader's apply thread between log entries, where any suspension
//! would let inputs mutate mid-computation.

use crate::branch::StateTimestamp;
use crate::common::{ContractId, ServerId, ShardConfig};
use crate::coordinator::contract::{AckFragment, AckState, Contract, ContractAck, PrimaryContract};
use crate::coordinator::fragment::break_ack_into_fragments;
use crate::coordinator::state::{ContractChange, TableState};
use crate::coordinator::visibility::invisible_to_majority_of_set;
use crate::coordinator::watch::WatchableMap;
use crate::region::{
    cpu_shard_index, cpu_shard_subspace, Region, RegionMap, CPU_SHARD_COUNT, HASH_SPACE_SIZE,
};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the new contract for a region across which the old contract, the
/// shard config, and every ack are homogeneous.
///
/// `acks` holds fragments only from replicas that acked this exact
/// contract; acks for predecessor contracts over the same region never
/// appear. Log lines go out under `log_prefix` unless it is empty; they are
/// observational only and never affect the result.
pub fn calculate_contract(
    old_c: &Contract,
    config: &ShardConfig,
    acks: &BTreeMap<ServerId, AckFragment>,
    connections: &WatchableMap<(ServerId, ServerId), ()>,
    log_prefix: &str,
) -> Contract {
    let mut new_c = old_c.clone();

    // Servers newly added to the config join the replica set.
    new_c.replicas.extend(config.all_replicas.iter().copied());

    // If the voter set disagrees with the config and no change is already
    // in flight, start one. Setting `temp_voters` makes the primary require
    // acks from majorities of both sets, so wait until a majority of the
    // target set is already streaming or the change would stall writes
    // immediately.
    let config_voting_replicas = config.voting_replicas();
    if old_c.temp_voters.is_none() && old_c.voters != config_voting_replicas {
        let mut num_streaming = 0;
        for server in &config_voting_replicas {
            if let Some(frag) = acks.get(server) {
                let is_old_primary = old_c
                    .primary
                    .as_ref()
                    .is_some_and(|primary| primary.server == *server);
                if frag.state == AckState::SecondaryStreaming || is_old_primary {
                    num_streaming += 1;
                }
            }
        }
        if num_streaming > config_voting_replicas.len() / 2 {
            new_c.temp_voters = Some(config_voting_replicas.clone());
            if !log_prefix.is_empty() {
                tracing::info!("{}: Beginning replica set change.", log_prefix);
            }
        }
    }

    // Commit an in-flight voter change once the primary reports
    // `PrimaryReady`: that report guarantees every previously-acked write
    // has been backfilled to a majority of `temp_voters` and new writes
    // already require joint majorities.
    if old_c.temp_voters.is_some() {
        let primary_ready = old_c.primary.as_ref().is_some_and(|primary| {
            acks.get(&primary.server).map(|frag| frag.state) == Some(AckState::PrimaryReady)
        });
        if primary_ready {
            if let Some(temp_voters) = new_c.temp_voters.take() {
                new_c.voters = temp_voters;
            }
            if !log_prefix.is_empty() {
                tracing::info!("{}: Committed replica set change.", log_prefix);
            }
        }
    }

    // Members of the active voter sets that a majority of each set can
    // reach. A server the coordinator cannot see is assumed to reach
    // everything, so losing contact with the coordinator alone does not
    // trigger failovers.
    let mut visible_voters: BTreeSet<ServerId> = BTreeSet::new();
    for server in &new_c.replicas {
        if !new_c.is_voter(server) {
            continue;
        }
        if invisible_to_majority_of_set(server, &new_c.voters, connections) {
            continue;
        }
        if let Some(temp_voters) = &new_c.temp_voters {
            if invisible_to_majority_of_set(server, temp_voters, connections) {
                continue;
            }
        }
        visible_voters.insert(*server);
    }

    // Drop replicas that left the config and are not in any voter set. A
    // departing primary is killed further down.
    let mut should_kill_primary = false;
    for server in &old_c.replicas {
        if !config.all_replicas.contains(server) && !new_c.is_voter(server) {
            new_c.replicas.remove(server);
            if old_c
                .primary
                .as_ref()
                .is_some_and(|primary| primary.server == *server)
            {
                should_kill_primary = true;
                if !log_prefix.is_empty() {
                    tracing::info!(
                        "{}: Stopping server {} as primary because it is no longer a voter.",
                        log_prefix,
                        server
                    );
                }
            }
        }
    }

    // With no primary in place, elect one. Only voters reporting
    // `SecondaryNeedPrimary` are candidates; a candidate is eligible if it
    // carries every acked write (it is at least as up-to-date as more than
    // half of the voters, itself included) and its peers can see it.
    if old_c.primary.is_none() {
        // The server ID is the secondary sort key so equal-timestamp runs
        // elect the same server across invocations.
        let mut sorted_candidates: Vec<(StateTimestamp, ServerId)> = Vec::new();
        for server in &new_c.voters {
            if let Some(frag) = acks.get(server) {
                if frag.state == AckState::SecondaryNeedPrimary {
                    if let Some(timestamp) = frag.version {
                        sorted_candidates.push((timestamp, *server));
                    }
                }
            }
        }
        sorted_candidates.sort();

        let mut eligible_candidates: Vec<ServerId> = Vec::new();
        for (index, (timestamp, server)) in sorted_candidates.iter().enumerate() {
            if !visible_voters.contains(server) {
                continue;
            }
            // Count how many candidates this one is at least as up-to-date
            // as: itself, everything earlier in the list, and any
            // equal-timestamp run right after it.
            let mut up_to_date_count = index + 1;
            while up_to_date_count < sorted_candidates.len()
                && sorted_candidates[up_to_date_count].0 == *timestamp
            {
                up_to_date_count += 1;
            }
            if up_to_date_count > new_c.voters.len() / 2 {
                eligible_candidates.push(*server);
            }
        }

        let designated_eligible = config
            .primary_replica
            .filter(|designated| eligible_candidates.contains(designated));
        if let Some(designated) = designated_eligible {
            new_c.primary = Some(PrimaryContract::new(designated));
        } else if let Some(&most_up_to_date) = eligible_candidates.last() {
            // The designated primary is not eligible. If the only thing it
            // is missing is an ack and its peers can see it, hold the
            // election open; the caller's failover timer bounds the wait.
            let wait_for_designated = config.primary_replica.is_some_and(|designated| {
                visible_voters.contains(&designated) && !acks.contains_key(&designated)
            });
            if !wait_for_designated {
                new_c.primary = Some(PrimaryContract::new(most_up_to_date));
            }
        }

        if let Some(primary) = &new_c.primary {
            if !log_prefix.is_empty() {
                tracing::info!(
                    "{}: Selected server {} as primary.",
                    log_prefix,
                    primary.server
                );
            }
        }
    }

    // An existing primary may need to be retired: it became unreachable, it
    // left the replica set, or the config designates someone else. Removal
    // always passes through a primary-less contract; a majority of replicas
    // must promise to stop taking writes from the old primary before a new
    // one may be elected, so the two steps never merge.
    if let Some(old_primary) = &old_c.primary {
        if !should_kill_primary && !visible_voters.contains(&old_primary.server) {
            // Auto-failover. Only availability rides on this condition
            // being accurate, never safety.
            should_kill_primary = true;
            if !log_prefix.is_empty() {
                tracing::info!(
                    "{}: Stopping server {} as primary because a majority of voters cannot reach it.",
                    log_prefix,
                    old_primary.server
                );
            }
        }

        if should_kill_primary {
            new_c.primary = None;
        } else if config.primary_replica != Some(old_primary.server) {
            let hand_over_started = config.primary_replica.is_some()
                && old_primary.hand_over == config.primary_replica;
            if !hand_over_started {
                let designated_ready = config.primary_replica.is_some_and(|designated| {
                    acks.get(&designated).map(|frag| frag.state)
                        == Some(AckState::SecondaryStreaming)
                        && visible_voters.contains(&designated)
                });
                if designated_ready {
                    if let Some(primary) = &mut new_c.primary {
                        primary.hand_over = config.primary_replica;
                    }
                    if !log_prefix.is_empty() {
                        tracing::info!(
                            "{}: Handing over primary from {} to {} to match the table config.",
                            log_prefix,
                            old_primary.server,
                            config
                                .primary_replica
                                .map(|designated| designated.to_string())
                                .unwrap_or_default()
                        );
                    }
                } else if old_primary.hand_over.is_some() {
                    // Mid-hand-over to a target the config no longer
                    // designates, and the new target is not ready yet.
                    if let Some(primary) = &mut new_c.primary {
                        primary.hand_over = None;
                    }
                }
            } else if acks.get(&old_primary.server).map(|frag| frag.state)
                == Some(AckState::PrimaryReady)
            {
                // Hand-over complete. Stop the old primary; the new one is
                // elected only after a majority acknowledges the vacancy.
                new_c.primary = None;
                if !log_prefix.is_empty() {
                    tracing::info!(
                        "{}: Stopping server {} as primary because the hand-over is complete.",
                        log_prefix,
                        old_primary.server
                    );
                }
            } else if config
                .primary_replica
                .is_some_and(|designated| !visible_voters.contains(&designated))
            {
                // The target dropped out mid-hand-over; abort it.
                if let Some(primary) = &mut new_c.primary {
                    primary.hand_over = None;
                }
            }
        } else if old_primary.hand_over.is_some() {
            // The config switched back to the current primary mid-hand-over.
            if let Some(primary) = &mut new_c.primary {
                primary.hand_over = None;
            }
        }
    }

    new_c
}

/// Recompute contracts for the whole key space and emit the diff.
///
/// Breaks the space into sub-regions over which every input is homogeneous,
/// runs [`calculate_contract`] on each, coalesces value-equal neighbors,
/// re-slices so no contract spans a CPU-shard or user-shard boundary, and
/// diffs against the old contract set so unchanged contracts keep their IDs.
pub fn calculate_all_contracts(
    old_state: &TableState,
    acks: &WatchableMap<(ServerId, ContractId), ContractAck>,
    connections: &WatchableMap<(ServerId, ServerId), ()>,
    log_prefix: &str,
) -> ContractChange {
    let mut change = ContractChange::default();
    let mut new_contract_fragments: Vec<(Region, Contract)> = Vec::new();

    for (contract_id, (contract_region, old_contract)) in &old_state.contracts {
        for shard_index in 0..old_state.config.shard_count() {
            let shard_region = old_state
                .config
                .shard_region(shard_index)
                .expect("shard index within the config");
            let region = contract_region.intersection(&shard_region);
            if region.is_empty() {
                continue;
            }

            // Merge every ack for this contract into one map of per-server
            // fragments, fragmenting the region as acks disagree.
            let mut frags_by_server: RegionMap<BTreeMap<ServerId, AckFragment>> =
                RegionMap::new(region.clone(), BTreeMap::new());
            acks.read_all(|(server, ack_contract_id), ack| {
                if ack_contract_id != contract_id {
                    return;
                }
                let frags = break_ack_into_fragments(
                    &region,
                    ack,
                    &old_state.current_branches,
                    &old_state.branch_history,
                );
                frags.visit(&region, |frag_region, frag| {
                    frags_by_server.visit_mut(frag_region, |_, server_frags| {
                        let previous = server_frags.insert(*server, frag.clone());
                        assert!(
                            previous.is_none(),
                            "server {} contributed two ack fragments to one sub-region",
                            server
                        );
                    });
                });
            });

            // Subshards advance whenever a sub-region completes the full
            // hash range; visits go key-band-first, so the counter labels
            // each key band consistently.
            let mut subshard_index = 0usize;
            frags_by_server.visit(&region, |sub_region, server_frags| {
                let log_subprefix = if log_prefix.is_empty() {
                    String::new()
                } else {
                    format!(
                        "{}: shard {}.{}.{}",
                        log_prefix,
                        shard_index,
                        subshard_index,
                        cpu_shard_index(sub_region)
                    )
                };
                if sub_region.hash_end == HASH_SPACE_SIZE {
                    subshard_index += 1;
                }

                let new_contract = calculate_contract(
                    old_contract,
                    &old_state.config.shards[shard_index],
                    server_frags,
                    connections,
                    &log_subprefix,
                );

                // A primary that survived the recomputation may be asking
                // for a new branch.
                let retained_primary = match (&old_contract.primary, &new_contract.primary) {
                    (Some(old_primary), Some(new_primary))
                        if old_primary.server == new_primary.server =>
                    {
                        Some(old_primary.server)
                    }
                    _ => None,
                };
                if let Some(primary_server) = retained_primary {
                    if let Some(frag) = server_frags.get(&primary_server) {
                        if frag.state == AckState::PrimaryNeedBranch {
                            if let Some(branch) = frag.branch {
                                let previous = change
                                    .register_current_branches
                                    .insert(sub_region.clone(), branch);
                                assert!(
                                    previous.is_none(),
                                    "branch registered twice for one sub-region"
                                );
                            }
                        }
                    }
                }

                new_contract_fragments.push((sub_region.clone(), new_contract));
            });
        }
    }

    // Coalesce adjacent regions whose contracts came out identical.
    let coalesced = RegionMap::from_unordered_fragments(new_contract_fragments);

    // Re-slice so no contract spans a CPU-shard or user-shard boundary.
    let mut new_contract_map: BTreeMap<Region, Contract> = BTreeMap::new();
    for cpu in 0..CPU_SHARD_COUNT {
        let slice = cpu_shard_subspace(cpu);
        for shard_index in 0..old_state.config.shard_count() {
            let mut query = slice.clone();
            query.keys = old_state
                .config
                .shard_range(shard_index)
                .expect("shard index within the config");
            if query.is_empty() {
                continue;
            }
            coalesced.visit(&query, |sub_region, contract| {
                assert!(
                    sub_region.hash_beg == query.hash_beg && sub_region.hash_end == query.hash_end,
                    "contract region not aligned to its CPU shard"
                );
                new_contract_map.insert(sub_region.clone(), contract.clone());
            });
        }
    }

    // Diff against the old contracts. An exact-region hit with an equal
    // value keeps its ID; everything else is removed and replaced.
    for (contract_id, (contract_region, old_contract)) in &old_state.contracts {
        let unchanged = new_contract_map
            .get(contract_region)
            .is_some_and(|new_contract| new_contract == old_contract);
        if unchanged {
            new_contract_map.remove(contract_region);
        } else {
            change.remove_contracts.insert(*contract_id);
        }
    }
    for (region, contract) in new_contract_map {
        change
            .add_contracts
            .insert(ContractId::generate(), (region, contract));
    }

    change
}
