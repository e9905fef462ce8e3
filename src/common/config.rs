//! Table configuration: the user's declared sharding and replica layout
//!
//! The coordinator never edits this; it converges the contract set toward
//! whatever the configuration declares.

use crate::common::{Error, Result, ServerId};
use crate::region::{KeyRange, Region};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-user-shard replica layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Every server that should hold a copy of this shard.
    pub all_replicas: BTreeSet<ServerId>,

    /// Replicas that hold data but whose acks never count toward write
    /// durability.
    #[serde(default)]
    pub nonvoting_replicas: BTreeSet<ServerId>,

    /// The server the user wants as primary. `None` lets the coordinator
    /// pick freely.
    #[serde(default)]
    pub primary_replica: Option<ServerId>,
}

impl ShardConfig {
    /// The voter set this shard should converge to.
    pub fn voting_replicas(&self) -> BTreeSet<ServerId> {
        self.all_replicas
            .difference(&self.nonvoting_replicas)
            .copied()
            .collect()
    }
}

/// The whole table: one shard config per key range, plus the split points
/// dividing the key space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub shards: Vec<ShardConfig>,

    /// Sorted keys splitting the key space into `shards.len()` ranges.
    /// Empty means a single shard covering everything.
    #[serde(default)]
    pub split_points: Vec<String>,
}

impl TableConfig {
    /// A single-shard table.
    pub fn single_shard(shard: ShardConfig) -> Self {
        Self {
            shards: vec![shard],
            split_points: Vec::new(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Key range of user shard `index`.
    pub fn shard_range(&self, index: usize) -> Result<KeyRange> {
        if index >= self.shards.len() {
            return Err(Error::ShardNotFound(index));
        }
        let left = if index == 0 {
            String::new()
        } else {
            self.split_points[index - 1].clone()
        };
        let right = self.split_points.get(index).cloned();
        Ok(KeyRange::new(left, right))
    }

    /// Region of user shard `index`: its key range across the full hash
    /// axis.
    pub fn shard_region(&self, index: usize) -> Result<Region> {
        Ok(Region::from_keys(self.shard_range(index)?))
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TableConfig = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.shards.is_empty() {
            return Err(Error::InvalidConfig("at least one shard is required".into()));
        }
        if self.split_points.len() + 1 != self.shards.len() {
            return Err(Error::InvalidConfig(format!(
                "{} split points do not form {} shards",
                self.split_points.len(),
                self.shards.len()
            )));
        }
        for pair in self.split_points.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::InvalidConfig(format!(
                    "split points out of order: {:?} >= {:?}",
                    pair[0], pair[1]
                )));
            }
        }
        if let Some(first) = self.split_points.first() {
            if first.is_empty() {
                return Err(Error::InvalidConfig(
                    "the first split point may not be the empty key".into(),
                ));
            }
        }
        for (index, shard) in self.shards.iter().enumerate() {
            if shard.all_replicas.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "shard {} has no replicas",
                    index
                )));
            }
            if !shard.nonvoting_replicas.is_subset(&shard.all_replicas) {
                return Err(Error::InvalidConfig(format!(
                    "shard {} has non-voting replicas outside all_replicas",
                    index
                )));
            }
            if shard.voting_replicas().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "shard {} has no voting replicas",
                    index
                )));
            }
            if let Some(primary) = &shard.primary_replica {
                if !shard.all_replicas.contains(primary) {
                    return Err(Error::InvalidConfig(format!(
                        "shard {} designates a primary that is not a replica",
                        index
                    )));
                }
            }
        }
        Ok(())
    }
}
