//! Branch lineage tracking
//!
//! Every primary incarnation serves writes on its own branch. The branch
//! history is a tree of birth certificates; projecting a replica's version
//! onto the path from the root to the canonical branch tells the coordinator
//! how up-to-date that replica really is after a failover.

pub mod history;
pub mod version;

pub use history::{
    version_find_branch_common, BranchBirthCertificate, BranchHistory, BranchHistoryCombiner,
    BranchHistoryReader,
};
pub use version::{StateTimestamp, Version};
