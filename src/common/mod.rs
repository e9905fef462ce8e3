//! Common types shared across quorumkv

pub mod config;
pub mod error;
pub mod ids;
pub mod logging;

pub use config::{ShardConfig, TableConfig};
pub use error::{Error, Result};
pub use ids::{BranchId, ContractId, ServerId};
pub use logging::init_logging;
