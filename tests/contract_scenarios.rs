//! Contract calculator scenarios: election, voter changes, hand-over

use quorumkv::branch::StateTimestamp;
use quorumkv::coordinator::{
    calculate_contract, AckFragment, AckState, Contract, PrimaryContract, WatchableMap,
};
use quorumkv::{ServerId, ShardConfig};
use std::collections::{BTreeMap, BTreeSet};

fn servers(n: usize) -> Vec<ServerId> {
    let mut list: Vec<ServerId> = (0..n).map(|_| ServerId::generate()).collect();
    list.sort();
    list
}

fn shard_config(all: &[ServerId], primary: Option<ServerId>) -> ShardConfig {
    ShardConfig {
        all_replicas: all.iter().copied().collect(),
        nonvoting_replicas: BTreeSet::new(),
        primary_replica: primary,
    }
}

fn contract(replicas: &[ServerId], voters: &[ServerId], primary: Option<ServerId>) -> Contract {
    Contract {
        replicas: replicas.iter().copied().collect(),
        voters: voters.iter().copied().collect(),
        temp_voters: None,
        primary: primary.map(PrimaryContract::new),
        branch: None,
    }
}

fn full_mesh(servers: &[ServerId]) -> WatchableMap<(ServerId, ServerId), ()> {
    let connections = WatchableMap::new();
    for a in servers {
        for b in servers {
            connections.set_key((*a, *b), ());
        }
    }
    connections
}

fn need_primary(timestamp: u64) -> AckFragment {
    AckFragment {
        state: AckState::SecondaryNeedPrimary,
        version: Some(StateTimestamp(timestamp)),
        branch: None,
    }
}

fn plain(state: AckState) -> AckFragment {
    AckFragment {
        state,
        version: None,
        branch: None,
    }
}

/// Spec-level invariants that must hold for every emitted contract.
fn check_invariants(new_c: &Contract) {
    assert!(
        new_c.voters.is_subset(&new_c.replicas),
        "voters must be replicas"
    );
    if let Some(temp_voters) = &new_c.temp_voters {
        assert!(
            temp_voters.is_subset(&new_c.replicas),
            "temp voters must be replicas"
        );
    }
    if let Some(primary) = &new_c.primary {
        assert!(
            new_c.replicas.contains(&primary.server),
            "the primary must be a replica"
        );
    }
}

// === Scenario A: bootstrap ===

#[test]
fn bootstrap_elects_designated_primary() {
    let s = servers(3);
    let old_c = contract(&s, &s, None);
    let config = shard_config(&s, Some(s[1]));
    let mut acks = BTreeMap::new();
    for server in &s {
        acks.insert(*server, need_primary(10));
    }
    let new_c = calculate_contract(&old_c, &config, &acks, &full_mesh(&s), "");
    check_invariants(&new_c);
    assert_eq!(new_c.primary, Some(PrimaryContract::new(s[1])));
}

// === Scenario B: defer for the designated primary ===

#[test]
fn election_defers_while_designated_primary_is_silent() {
    let s = servers(3);
    let old_c = contract(&s, &s, None);
    let config = shard_config(&s, Some(s[1]));
    let mut acks = BTreeMap::new();
    acks.insert(s[0], need_primary(10));
    acks.insert(s[2], need_primary(10));
    let new_c = calculate_contract(&old_c, &config, &acks, &full_mesh(&s), "");
    check_invariants(&new_c);
    assert_eq!(
        new_c.primary, None,
        "a visible designated primary that has not acked yet holds the election open"
    );
}

// === Scenario C: elect an alternative ===

#[test]
fn election_routes_around_invisible_designated_primary() {
    let s = servers(3);
    let old_c = contract(&s, &s, None);
    let config = shard_config(&s, Some(s[1]));
    // Everyone sees themselves; s0 and s2 see each other but not s1.
    let connections = WatchableMap::new();
    for server in &s {
        connections.set_key((*server, *server), ());
    }
    connections.set_key((s[0], s[2]), ());
    connections.set_key((s[2], s[0]), ());

    let mut acks = BTreeMap::new();
    acks.insert(s[0], need_primary(10));
    acks.insert(s[2], need_primary(10));
    let new_c = calculate_contract(&old_c, &config, &acks, &connections, "");
    check_invariants(&new_c);
    // Equal timestamps: the higher server ID wins the tie.
    assert_eq!(new_c.primary, Some(PrimaryContract::new(s[2])));
}

// === Scenario D: voter change commit gating ===

#[test]
fn voter_change_commits_only_on_primary_ready() {
    let s = servers(4);
    let mut old_c = contract(&s, &s[..3], Some(s[0]));
    old_c.temp_voters = Some(s[1..].iter().copied().collect());
    let config = {
        let mut config = shard_config(&s, Some(s[0]));
        config.nonvoting_replicas.insert(s[0]);
        config
    };
    let connections = full_mesh(&s);

    let mut acks = BTreeMap::new();
    acks.insert(s[0], plain(AckState::PrimaryReady));
    let new_c = calculate_contract(&old_c, &config, &acks, &connections, "");
    check_invariants(&new_c);
    assert_eq!(new_c.voters, s[1..].iter().copied().collect::<BTreeSet<_>>());
    assert_eq!(new_c.temp_voters, None);
    // The committed voter set no longer contains the demoted primary, so
    // the same invocation retires it; a successor is elected later.
    assert_eq!(new_c.primary, None);

    // `PrimaryNeedBranch` is not enough to commit.
    acks.insert(s[0], plain(AckState::PrimaryNeedBranch));
    let new_c = calculate_contract(&old_c, &config, &acks, &connections, "");
    check_invariants(&new_c);
    assert_eq!(new_c.voters, old_c.voters);
    assert_eq!(new_c.temp_voters, old_c.temp_voters);
}

// === Scenario E: hand-over ===

#[test]
fn hand_over_runs_through_a_primary_less_contract() {
    let s = servers(3);
    let old_c = contract(&s, &s, Some(s[0]));
    let config = shard_config(&s, Some(s[1]));
    let connections = full_mesh(&s);

    // The designated primary is streaming and visible: begin the hand-over.
    let mut acks = BTreeMap::new();
    acks.insert(s[1], plain(AckState::SecondaryStreaming));
    let step_one = calculate_contract(&old_c, &config, &acks, &connections, "");
    check_invariants(&step_one);
    let primary = step_one.primary.clone().expect("primary retained");
    assert_eq!(primary.server, s[0]);
    assert_eq!(primary.hand_over, Some(s[1]));

    // The old primary reports the hand-over protocol complete: the next
    // contract has no primary at all. Election happens on a later
    // invocation, once the vacancy is acknowledged.
    acks.insert(s[0], plain(AckState::PrimaryReady));
    let step_two = calculate_contract(&step_one, &config, &acks, &connections, "");
    check_invariants(&step_two);
    assert_eq!(step_two.primary, None);
}

#[test]
fn hand_over_aborts_when_target_disappears() {
    let s = servers(3);
    let mut old_c = contract(&s, &s, Some(s[0]));
    old_c.primary = Some(PrimaryContract {
        server: s[0],
        hand_over: Some(s[1]),
        warm_shutdown: false,
    });
    let config = shard_config(&s, Some(s[1]));
    // s1 loses contact with everyone else.
    let connections = WatchableMap::new();
    for server in &s {
        connections.set_key((*server, *server), ());
    }
    connections.set_key((s[0], s[2]), ());
    connections.set_key((s[2], s[0]), ());

    let new_c = calculate_contract(&old_c, &config, &BTreeMap::new(), &connections, "");
    check_invariants(&new_c);
    let primary = new_c.primary.expect("old primary stays in place");
    assert_eq!(primary.server, s[0]);
    assert_eq!(primary.hand_over, None);
}

#[test]
fn stale_hand_over_is_cleared_when_config_reverts() {
    let s = servers(3);
    let mut old_c = contract(&s, &s, Some(s[0]));
    old_c.primary = Some(PrimaryContract {
        server: s[0],
        hand_over: Some(s[1]),
        warm_shutdown: false,
    });
    // The user switched the designated primary back to s0.
    let config = shard_config(&s, Some(s[0]));
    let new_c = calculate_contract(&old_c, &config, &BTreeMap::new(), &full_mesh(&s), "");
    check_invariants(&new_c);
    assert_eq!(new_c.primary, Some(PrimaryContract::new(s[0])));
}
