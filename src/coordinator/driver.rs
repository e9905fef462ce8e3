//! Coordinator driver
//!
//! Owns the control-plane snapshot and the observation maps, and turns
//! "something changed" into a contract diff. Runs on the consensus leader;
//! followers only replicate the diffs it emits.

use crate::branch::BranchHistory;
use crate::common::{ContractId, ServerId, TableConfig};
use crate::coordinator::calculate::calculate_all_contracts;
use crate::coordinator::contract::ContractAck;
use crate::coordinator::state::{ContractChange, TableState};
use crate::coordinator::watch::WatchableMap;
use std::sync::Arc;

pub struct Coordinator {
    state: TableState,
    acks: Arc<WatchableMap<(ServerId, ContractId), ContractAck>>,
    connections: Arc<WatchableMap<(ServerId, ServerId), ()>>,
    log_prefix: String,
}

impl Coordinator {
    /// Build a coordinator over a fresh table. `log_prefix` labels every
    /// log line; leave it empty to run silently.
    pub fn new(config: TableConfig, log_prefix: impl Into<String>) -> crate::common::Result<Self> {
        Ok(Self {
            state: TableState::bootstrap(config)?,
            acks: Arc::new(WatchableMap::new()),
            connections: Arc::new(WatchableMap::new()),
            log_prefix: log_prefix.into(),
        })
    }

    /// Resume from an existing snapshot.
    pub fn from_state(state: TableState, log_prefix: impl Into<String>) -> Self {
        Self {
            state,
            acks: Arc::new(WatchableMap::new()),
            connections: Arc::new(WatchableMap::new()),
            log_prefix: log_prefix.into(),
        }
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    /// The ack map the observation layer writes into.
    pub fn acks(&self) -> Arc<WatchableMap<(ServerId, ContractId), ContractAck>> {
        self.acks.clone()
    }

    /// The connectivity map the observation layer writes into.
    pub fn connections(&self) -> Arc<WatchableMap<(ServerId, ServerId), ()>> {
        self.connections.clone()
    }

    /// Replace the table configuration; takes effect on the next pump.
    pub fn set_config(&mut self, config: TableConfig) -> crate::common::Result<()> {
        config.validate()?;
        self.state.config = config;
        Ok(())
    }

    /// Recompute every contract against the current observations.
    pub fn pump(&self) -> ContractChange {
        calculate_all_contracts(&self.state, &self.acks, &self.connections, &self.log_prefix)
    }

    /// Apply a committed diff to the snapshot.
    pub fn apply(&mut self, change: &ContractChange) {
        for contract_id in &change.remove_contracts {
            self.state.contracts.remove(contract_id);
        }
        for (contract_id, entry) in &change.add_contracts {
            self.state.contracts.insert(*contract_id, entry.clone());
        }
        for (region, branch) in &change.register_current_branches {
            self.state.current_branches.update(region, Some(*branch));
        }
    }

    /// Record branch birth certificates the acks supplied, so versions on
    /// those branches stay resolvable after the acks are gone.
    pub fn absorb_branch_history(&mut self, history: &BranchHistory) {
        self.state.branch_history.absorb(history);
    }
}
