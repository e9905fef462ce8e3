//! Key ranges, hash slices, and the regions they form

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Size of the hash axis. Every key maps to a point in
/// `[0, HASH_SPACE_SIZE)` via [`hash_point`].
pub const HASH_SPACE_SIZE: u64 = 1 << 63;

/// Number of equal hash slices the key space is divided into for parallel
/// dispatch. No contract may span a slice boundary.
pub const CPU_SHARD_COUNT: usize = 8;

const CPU_SHARD_WIDTH: u64 = HASH_SPACE_SIZE / CPU_SHARD_COUNT as u64;

/// Position of a key on the hash axis.
pub fn hash_point(key: &str) -> u64 {
    let hash = blake3::hash(key.as_bytes());
    let raw = u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap());
    raw % HASH_SPACE_SIZE
}

/// Hash slice for CPU shard `index`, covering the full key range.
pub fn cpu_shard_subspace(index: usize) -> Region {
    assert!(index < CPU_SHARD_COUNT);
    Region {
        hash_beg: index as u64 * CPU_SHARD_WIDTH,
        hash_end: (index as u64 + 1) * CPU_SHARD_WIDTH,
        keys: KeyRange::universe(),
    }
}

/// CPU shard a region starts in. Only meaningful for regions that do not
/// span a slice boundary; used for log labels.
pub fn cpu_shard_index(region: &Region) -> usize {
    (region.hash_beg / CPU_SHARD_WIDTH) as usize
}

/// A half-open lexicographic key interval `[left, right)`. A `None` right
/// bound extends to the end of the key space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub left: String,
    pub right: Option<String>,
}

impl KeyRange {
    pub fn new(left: impl Into<String>, right: Option<String>) -> Self {
        Self {
            left: left.into(),
            right,
        }
    }

    /// The whole key space.
    pub fn universe() -> Self {
        Self {
            left: String::new(),
            right: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.right {
            Some(right) => *right <= self.left,
            None => false,
        }
    }

    pub fn intersection(&self, other: &KeyRange) -> KeyRange {
        let left = if self.left >= other.left {
            self.left.clone()
        } else {
            other.left.clone()
        };
        let right = match (&self.right, &other.right) {
            (Some(a), Some(b)) => Some(if a <= b { a.clone() } else { b.clone() }),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        KeyRange { left, right }
    }

    pub fn contains_range(&self, other: &KeyRange) -> bool {
        self.left <= other.left
            && match (&self.right, &other.right) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(a), Some(b)) => b <= a,
            }
    }

    /// True if `self` ends exactly where `other` begins.
    pub fn precedes(&self, other: &KeyRange) -> bool {
        self.right.as_deref() == Some(other.left.as_str())
    }
}

impl PartialOrd for KeyRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyRange {
    fn cmp(&self, other: &Self) -> Ordering {
        // Unbounded right sorts after every bounded right.
        self.left.cmp(&other.left).then_with(|| {
            match (&self.right, &other.right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            }
        })
    }
}

/// A rectangle in (hash, key-range) space: the half-open hash interval
/// `[hash_beg, hash_end)` crossed with a key range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub hash_beg: u64,
    pub hash_end: u64,
    pub keys: KeyRange,
}

impl Region {
    pub fn new(hash_beg: u64, hash_end: u64, keys: KeyRange) -> Self {
        Self {
            hash_beg,
            hash_end,
            keys,
        }
    }

    /// The whole (hash, key) space.
    pub fn universe() -> Self {
        Self {
            hash_beg: 0,
            hash_end: HASH_SPACE_SIZE,
            keys: KeyRange::universe(),
        }
    }

    /// A region covering `keys` across the full hash axis.
    pub fn from_keys(keys: KeyRange) -> Self {
        Self {
            hash_beg: 0,
            hash_end: HASH_SPACE_SIZE,
            keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hash_beg >= self.hash_end || self.keys.is_empty()
    }

    pub fn intersection(&self, other: &Region) -> Region {
        Region {
            hash_beg: self.hash_beg.max(other.hash_beg),
            hash_end: self.hash_end.min(other.hash_end),
            keys: self.keys.intersection(&other.keys),
        }
    }

    pub fn contains_region(&self, other: &Region) -> bool {
        self.hash_beg <= other.hash_beg
            && other.hash_end <= self.hash_end
            && self.keys.contains_range(&other.keys)
    }

    /// True if the two regions share no points.
    pub fn is_disjoint(&self, other: &Region) -> bool {
        self.intersection(other).is_empty()
    }
}

impl PartialOrd for Region {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Region {
    fn cmp(&self, other: &Self) -> Ordering {
        // (hash-begin, key-begin) first, remaining fields for totality.
        self.hash_beg
            .cmp(&other.hash_beg)
            .then_with(|| self.keys.left.cmp(&other.keys.left))
            .then_with(|| self.hash_end.cmp(&other.hash_end))
            .then_with(|| self.keys.cmp(&other.keys))
    }
}
