//! Contracts and the acks replicas send about them
//!
//! A contract is the coordinator's authoritative declaration, per region, of
//! which server is primary, which servers' acks count toward durability, and
//! which replicas are in transitional states. Replicas respond with acks;
//! the coordinator never talks to the data plane any other way.

use crate::branch::{BranchHistory, StateTimestamp, Version};
use crate::common::{BranchId, ServerId};
use crate::region::RegionMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The primary role within a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryContract {
    pub server: ServerId,

    /// When set, the primary must transfer its role to this server and then
    /// report `PrimaryReady` to signal the transfer is complete.
    #[serde(default)]
    pub hand_over: Option<ServerId>,

    /// When set, the primary should stop accepting writes but keep serving
    /// reads until the contract retires it.
    #[serde(default)]
    pub warm_shutdown: bool,
}

impl PrimaryContract {
    pub fn new(server: ServerId) -> Self {
        Self {
            server,
            hand_over: None,
            warm_shutdown: false,
        }
    }
}

/// Per-region declaration of membership and primary role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Every server currently participating, voters plus transitional
    /// members.
    pub replicas: BTreeSet<ServerId>,

    /// Servers whose acks count toward write durability.
    pub voters: BTreeSet<ServerId>,

    /// Second voter set, present only while a voter change is in flight.
    /// Writes require majorities of both sets while this is set.
    #[serde(default)]
    pub temp_voters: Option<BTreeSet<ServerId>>,

    /// Absent means "no primary; elect one".
    #[serde(default)]
    pub primary: Option<PrimaryContract>,

    /// The branch the contract was emitted against. The canonical
    /// assignment lives in the coordinator's current-branches map.
    #[serde(default)]
    pub branch: Option<BranchId>,
}

impl Contract {
    /// True if `server` belongs to `voters` or to `temp_voters`.
    pub fn is_voter(&self, server: &ServerId) -> bool {
        self.voters.contains(server)
            || self
                .temp_voters
                .as_ref()
                .is_some_and(|temp| temp.contains(server))
    }
}

/// What a replica reports about its handling of one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckState {
    /// Server is primary and asks for a new branch to be registered.
    PrimaryNeedBranch,
    /// Server is primary and serving writes under the contract's rules.
    PrimaryReady,
    /// Server is a voter with no primary visible; carries its version.
    SecondaryNeedPrimary,
    /// Server is a voter catching up from the primary.
    SecondaryBackfilling,
    /// Server is a voter streaming from the primary.
    SecondaryStreaming,
    /// Server holds the contract but has nothing to report.
    Nothing,
}

/// A replica's report about a specific contract. Heterogeneous: the version
/// is a region map, and the branch history contributions may describe
/// branches the coordinator has not persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractAck {
    pub state: AckState,

    /// Data state per sub-region; only meaningful for secondary states.
    #[serde(default)]
    pub version: Option<RegionMap<Version>>,

    /// For `PrimaryNeedBranch`: the branch the primary wants registered.
    #[serde(default)]
    pub branch: Option<BranchId>,

    /// Birth certificates for branches the ack's versions refer to.
    #[serde(default)]
    pub branch_history: BranchHistory,
}

impl ContractAck {
    pub fn new(state: AckState) -> Self {
        Self {
            state,
            version: None,
            branch: None,
            branch_history: BranchHistory::new(),
        }
    }
}

/// A homogeneous projection of an ack over one sub-region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFragment {
    pub state: AckState,
    pub version: Option<StateTimestamp>,
    pub branch: Option<BranchId>,
}
