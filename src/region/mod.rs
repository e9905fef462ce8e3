//! Region geometry: rectangles in (hash, key-range) space
//!
//! The coordinator reasons about rectangular regions of a two-dimensional
//! space: the hash axis (where every key lands at a deterministic point) and
//! the key axis (lexicographic key ranges). Contracts, branch assignments,
//! and ack versions are all expressed over such regions.

pub mod map;
pub mod space;

pub use map::RegionMap;
pub use space::{
    cpu_shard_index, cpu_shard_subspace, hash_point, KeyRange, Region, CPU_SHARD_COUNT,
    HASH_SPACE_SIZE,
};
