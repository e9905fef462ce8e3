//! Branch history storage and the common-ancestor projection

use crate::branch::version::{StateTimestamp, Version};
use crate::common::BranchId;
use crate::region::{Region, RegionMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a branch came from: the region it was created for, the versions it
/// grew out of, and the timestamp it started at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchBirthCertificate {
    pub region: Region,
    pub origin: RegionMap<Version>,
    pub initial_timestamp: StateTimestamp,
}

/// Read access to birth certificates. Implemented by the persisted history
/// and by layered views over it.
pub trait BranchHistoryReader {
    fn get_branch(&self, branch: &BranchId) -> Option<&BranchBirthCertificate>;

    fn is_branch_known(&self, branch: &BranchId) -> bool {
        self.get_branch(branch).is_some()
    }
}

/// The tree of all branches the coordinator has recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchHistory {
    pub branches: BTreeMap<BranchId, BranchBirthCertificate>,
}

impl BranchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_branch(&mut self, branch: BranchId, certificate: BranchBirthCertificate) {
        self.branches.insert(branch, certificate);
    }

    /// Copy every certificate from `other` that this history is missing.
    pub fn absorb(&mut self, other: &BranchHistory) {
        for (branch, certificate) in &other.branches {
            self.branches
                .entry(*branch)
                .or_insert_with(|| certificate.clone());
        }
    }
}

impl BranchHistoryReader for BranchHistory {
    fn get_branch(&self, branch: &BranchId) -> Option<&BranchBirthCertificate> {
        self.branches.get(branch)
    }
}

/// A layered view: certificates resolve against `base` first, then
/// `overlay`. Neither side is copied; acks contribute their own history
/// fragments on top of the persisted one.
pub struct BranchHistoryCombiner<'a> {
    base: &'a dyn BranchHistoryReader,
    overlay: &'a dyn BranchHistoryReader,
}

impl<'a> BranchHistoryCombiner<'a> {
    pub fn new(base: &'a dyn BranchHistoryReader, overlay: &'a dyn BranchHistoryReader) -> Self {
        Self { base, overlay }
    }
}

impl BranchHistoryReader for BranchHistoryCombiner<'_> {
    fn get_branch(&self, branch: &BranchId) -> Option<&BranchBirthCertificate> {
        self.base
            .get_branch(branch)
            .or_else(|| self.overlay.get_branch(branch))
    }
}

/// The root-to-tip path of `branch`, per sub-region, as a map from each
/// ancestor branch to the highest timestamp on it that is still on the path.
/// `upper` caps the tip itself.
fn branch_ancestry(
    reader: &dyn BranchHistoryReader,
    branch: Option<BranchId>,
    upper: StateTimestamp,
    region: &Region,
) -> RegionMap<BTreeMap<Option<BranchId>, StateTimestamp>> {
    let tip = match branch {
        None => {
            return RegionMap::new(region.clone(), BTreeMap::from([(None, upper)]));
        }
        Some(tip) => tip,
    };
    match reader.get_branch(&tip) {
        // A branch with no recorded certificate grows straight out of the
        // root lineage.
        None => RegionMap::new(
            region.clone(),
            BTreeMap::from([(Some(tip), upper), (None, StateTimestamp::ZERO)]),
        ),
        Some(certificate) => certificate.origin.map_multi(region, |sub_region, origin| {
            branch_ancestry(reader, origin.branch, origin.timestamp, sub_region).map(
                sub_region,
                |ancestors| {
                    let mut ancestors = ancestors.clone();
                    ancestors.insert(Some(tip), upper);
                    ancestors
                },
            )
        }),
    }
}

/// Project `version` onto a fixed ancestry path: walk down the version's own
/// lineage until it meets a branch on the path, clamping to the timestamp at
/// which the path left that branch.
fn project_onto_path(
    reader: &dyn BranchHistoryReader,
    version: Version,
    ancestors: &BTreeMap<Option<BranchId>, StateTimestamp>,
    region: &Region,
) -> RegionMap<Version> {
    if let Some(&departure) = ancestors.get(&version.branch) {
        return RegionMap::new(
            region.clone(),
            Version {
                branch: version.branch,
                timestamp: version.timestamp.min(departure),
            },
        );
    }
    // Not on the path yet; step down to this branch's origin. The ancestry
    // map always contains the root, so the walk terminates.
    let branch = version
        .branch
        .expect("root lineage is always on the ancestry path");
    match reader.get_branch(&branch) {
        None => RegionMap::new(region.clone(), Version::zero()),
        Some(certificate) => certificate.origin.map_multi(region, |sub_region, origin| {
            project_onto_path(reader, *origin, ancestors, sub_region)
        }),
    }
}

/// Project `version` onto the path from the root of the branch history to
/// the tip of `branch`, per sub-region of `region`. The result is the most
/// recent point on that path which the version's lineage has passed through.
pub fn version_find_branch_common(
    reader: &dyn BranchHistoryReader,
    version: Version,
    branch: Option<BranchId>,
    region: &Region,
) -> RegionMap<Version> {
    branch_ancestry(reader, branch, StateTimestamp::MAX, region).map_multi(
        region,
        |sub_region, ancestors| project_onto_path(reader, version, ancestors, sub_region),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::KeyRange;

    fn whole() -> Region {
        Region::universe()
    }

    fn ts(n: u64) -> StateTimestamp {
        StateTimestamp(n)
    }

    fn single_version(map: &RegionMap<Version>) -> Version {
        assert_eq!(map.len(), 1);
        map.iter().next().unwrap().1
    }

    fn certificate(origin: Version, initial: StateTimestamp) -> BranchBirthCertificate {
        BranchBirthCertificate {
            region: whole(),
            origin: RegionMap::new(whole(), origin),
            initial_timestamp: initial,
        }
    }

    #[test]
    fn test_version_on_target_branch_is_unchanged() {
        let history = BranchHistory::new();
        let branch = BranchId::generate();
        let version = Version::new(branch, ts(10));
        let common = version_find_branch_common(&history, version, Some(branch), &whole());
        assert_eq!(single_version(&common), version);
    }

    #[test]
    fn test_descendant_branch_projects_to_fork_point() {
        // root -> a (until 5) -> b. A version on `a` at 9 projects onto the
        // path to `b` as (a, 5): writes past the fork point are not shared.
        let a = BranchId::generate();
        let b = BranchId::generate();
        let mut history = BranchHistory::new();
        history.add_branch(a, certificate(Version::zero(), ts(1)));
        history.add_branch(b, certificate(Version::new(a, ts(5)), ts(6)));

        let common =
            version_find_branch_common(&history, Version::new(a, ts(9)), Some(b), &whole());
        assert_eq!(single_version(&common), Version::new(a, ts(5)));
    }

    #[test]
    fn test_version_below_fork_point_is_kept() {
        let a = BranchId::generate();
        let b = BranchId::generate();
        let mut history = BranchHistory::new();
        history.add_branch(a, certificate(Version::zero(), ts(1)));
        history.add_branch(b, certificate(Version::new(a, ts(5)), ts(6)));

        let common =
            version_find_branch_common(&history, Version::new(a, ts(3)), Some(b), &whole());
        assert_eq!(single_version(&common), Version::new(a, ts(3)));
    }

    #[test]
    fn test_sibling_branch_meets_at_shared_ancestor() {
        // a forks into b (at 5) and c (at 7); a version on c projects onto
        // the path to b as (a, 5).
        let a = BranchId::generate();
        let b = BranchId::generate();
        let c = BranchId::generate();
        let mut history = BranchHistory::new();
        history.add_branch(a, certificate(Version::zero(), ts(1)));
        history.add_branch(b, certificate(Version::new(a, ts(5)), ts(6)));
        history.add_branch(c, certificate(Version::new(a, ts(7)), ts(8)));

        let common =
            version_find_branch_common(&history, Version::new(c, ts(20)), Some(b), &whole());
        assert_eq!(single_version(&common), Version::new(a, ts(5)));
    }

    #[test]
    fn test_no_canonical_branch_projects_to_root() {
        let a = BranchId::generate();
        let mut history = BranchHistory::new();
        history.add_branch(a, certificate(Version::zero(), ts(1)));

        let common = version_find_branch_common(&history, Version::new(a, ts(4)), None, &whole());
        assert_eq!(single_version(&common), Version::zero());
    }

    #[test]
    fn test_origin_split_by_region_splits_projection() {
        // Branch b grew out of different versions of a on two key bands.
        let a = BranchId::generate();
        let b = BranchId::generate();
        let low = Region::from_keys(KeyRange::new("", Some("m".to_string())));
        let high = Region::from_keys(KeyRange::new("m", None));
        let mut origin = RegionMap::new(low.clone(), Version::new(a, ts(4)));
        origin.update(&high, Version::new(a, ts(8)));

        let mut history = BranchHistory::new();
        history.add_branch(a, certificate(Version::zero(), ts(1)));
        history.add_branch(
            b,
            BranchBirthCertificate {
                region: whole(),
                origin,
                initial_timestamp: ts(9),
            },
        );

        let common =
            version_find_branch_common(&history, Version::new(a, ts(6)), Some(b), &whole());
        let mut results = Vec::new();
        common.visit(&whole(), |region, version| {
            results.push((region.keys.left.clone(), *version));
        });
        assert_eq!(
            results,
            vec![
                ("".to_string(), Version::new(a, ts(4))),
                ("m".to_string(), Version::new(a, ts(6))),
            ]
        );
    }

    #[test]
    fn test_combiner_layers_without_copying() {
        let a = BranchId::generate();
        let b = BranchId::generate();
        let mut persisted = BranchHistory::new();
        persisted.add_branch(a, certificate(Version::zero(), ts(1)));
        let mut from_ack = BranchHistory::new();
        from_ack.add_branch(b, certificate(Version::new(a, ts(5)), ts(6)));

        let combined = BranchHistoryCombiner::new(&persisted, &from_ack);
        assert!(combined.is_branch_known(&a));
        assert!(combined.is_branch_known(&b));
        assert!(!combined.is_branch_known(&BranchId::generate()));
    }

    #[test]
    fn test_absorb_keeps_existing_certificates() {
        let a = BranchId::generate();
        let mut ours = BranchHistory::new();
        ours.add_branch(a, certificate(Version::zero(), ts(1)));
        let mut theirs = BranchHistory::new();
        theirs.add_branch(a, certificate(Version::zero(), ts(99)));

        ours.absorb(&theirs);
        assert_eq!(ours.branches[&a].initial_timestamp, ts(1));
    }
}
