//! The coordinator's replicated-state snapshot and the diffs it emits

use crate::branch::BranchHistory;
use crate::common::{BranchId, ContractId, TableConfig};
use crate::coordinator::contract::Contract;
use crate::region::{cpu_shard_subspace, Region, RegionMap, CPU_SHARD_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Read-only snapshot of the table's control-plane state, as held by the
/// consensus log. The calculator treats it as immutable for the duration of
/// one computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableState {
    pub contracts: BTreeMap<ContractId, (Region, Contract)>,
    pub config: TableConfig,

    /// Canonical branch per sub-region; `None` until a primary registers
    /// one.
    pub current_branches: RegionMap<Option<BranchId>>,

    pub branch_history: BranchHistory,
}

impl TableState {
    /// Initial state for a fresh table: one primary-less contract per
    /// (CPU shard x user shard), no branches yet.
    pub fn bootstrap(config: TableConfig) -> crate::common::Result<Self> {
        config.validate()?;
        let mut contracts = BTreeMap::new();
        for cpu in 0..CPU_SHARD_COUNT {
            let slice = cpu_shard_subspace(cpu);
            for shard_index in 0..config.shard_count() {
                let shard = &config.shards[shard_index];
                let mut region = slice.clone();
                region.keys = config.shard_range(shard_index)?;
                let contract = Contract {
                    replicas: shard.all_replicas.clone(),
                    voters: shard.voting_replicas(),
                    temp_voters: None,
                    primary: None,
                    branch: None,
                };
                contracts.insert(ContractId::generate(), (region, contract));
            }
        }
        Ok(Self {
            contracts,
            config,
            current_branches: RegionMap::new(Region::universe(), None),
            branch_history: BranchHistory::new(),
        })
    }
}

/// The diff emitted by one coordinator invocation, destined for the
/// consensus log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractChange {
    /// Contract IDs no longer in effect.
    pub remove_contracts: BTreeSet<ContractId>,

    /// Freshly minted contracts.
    pub add_contracts: BTreeMap<ContractId, (Region, Contract)>,

    /// Branches primaries asked to have recorded.
    pub register_current_branches: BTreeMap<Region, BranchId>,
}

impl ContractChange {
    pub fn is_empty(&self) -> bool {
        self.remove_contracts.is_empty()
            && self.add_contracts.is_empty()
            && self.register_current_branches.is_empty()
    }
}
