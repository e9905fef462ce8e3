//! The contract coordinator
//!
//! The coordinator is responsible for:
//! - Computing per-region contracts from cluster observations
//! - Electing primaries and steering hand-overs
//! - Growing and shrinking voter sets without losing acked writes
//! - Emitting contract diffs for the consensus log

pub mod calculate;
pub mod contract;
pub mod driver;
pub mod fragment;
pub mod state;
pub mod visibility;
pub mod watch;

pub use calculate::{calculate_all_contracts, calculate_contract};
pub use contract::{AckFragment, AckState, Contract, ContractAck, PrimaryContract};
pub use driver::Coordinator;
pub use fragment::break_ack_into_fragments;
pub use state::{ContractChange, TableState};
pub use visibility::invisible_to_majority_of_set;
pub use watch::WatchableMap;
