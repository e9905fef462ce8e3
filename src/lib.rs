//! # quorumkv
//!
//! The control-plane contract coordinator of a sharded, replicated
//! key-value store:
//! - Per-region contracts declaring primary, voters, and transitional members
//! - Deterministic primary election with branch-aware data comparison
//! - Two-phase voter-set changes that never lose an acked write
//! - Warm primary hand-over steered by the user's table configuration
//! - Contract diffs with stable IDs for the consensus log
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            Consensus leader                  │
//! │  TableState snapshot (contracts, config,     │
//! │  branches)  ──►  calculate_all_contracts     │
//! │                        │                     │
//! │                  ContractChange diff         │
//! └───────────┬────────────┴─────────────────────┘
//!             │ replicated log
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌──▼───────────┐
//! │ Replica 1  │   │ Replica 2  │   │ Replica 3    │
//! │ (primary)  │   │ (voter)    │   │ (joining)    │
//! │  acks ▲    │   │  acks ▲    │   │  acks ▲      │
//! └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! Replicas report contract acks and the observation layer reports the
//! server-to-server connectivity matrix; whenever either changes, or the
//! user edits the table configuration, the coordinator recomputes every
//! contract and emits a diff. The calculation is pure and synchronous, so
//! a given snapshot always produces the same diff.

pub mod branch;
pub mod common;
pub mod coordinator;
pub mod region;

// Re-export commonly used types
pub use common::{BranchId, ContractId, Error, Result, ServerId, ShardConfig, TableConfig};
pub use coordinator::{
    calculate_all_contracts, calculate_contract, AckState, Contract, ContractAck, ContractChange,
    Coordinator, PrimaryContract, TableState, WatchableMap,
};
pub use region::{KeyRange, Region, RegionMap};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
