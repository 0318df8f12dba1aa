//! # Quake Logic Tree: Source Specific Trees
//!
//! Table of Contents:
//! 1. SourceLogicTree - Linear chain of the branchsets of one source
//! 2. check_unique_uncertainties - One uncertainty type per source
//!
//! When every non-root branchset of a source model logic tree applies to
//! a single source, the tree factorizes into independent per-source trees
//! and the number of paths is the product of their path counts.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use indexmap::IndexMap;

use crate::branch::{BranchArena, BranchSet, Child};
use crate::error::{LogicTreeError, Result};
use crate::realization::{Realization, SmRealization};

// ─────────────────────────────────────────────
// 1. SourceLogicTree
// ─────────────────────────────────────────────

/// The branchsets acting on one source, chained one after the other and
/// enumerated in full
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLogicTree {
    /// Source id, `None` for the root source model branchset
    pub source_id: Option<String>,
    /// Private copies of the branchsets
    pub arena: BranchArena,
    /// branchSetID -> raw attributes
    pub bsetdict: IndexMap<String, BTreeMap<String, String>>,
    /// Product of the branch counts
    pub num_paths: u128,
}

impl SourceLogicTree {
    /// Copy `bsets` and attach every branch of each one to the next
    pub fn new(
        source_id: Option<String>,
        bsets: &[&BranchSet],
        bsetdict: IndexMap<String, BTreeMap<String, String>>,
    ) -> Self {
        let mut arena = BranchArena::default();
        let mut num_paths: u128 = 1;
        for (ordinal, bset) in bsets.iter().enumerate() {
            let mut copy = (*bset).clone();
            copy.ordinal = ordinal;
            copy.applied = None;
            for br in &mut copy.branches {
                br.child = (ordinal + 1 < bsets.len()).then_some(Child::Set(ordinal + 1));
            }
            num_paths = num_paths.saturating_mul(copy.len() as u128);
            arena.push(copy);
        }
        Self {
            source_id,
            arena,
            bsetdict,
            num_paths,
        }
    }

    /// The branchsets in chain order
    pub fn branchsets(&self) -> &[BranchSet] {
        &self.arena.bsets
    }

    /// Number of paths
    pub fn get_num_paths(&self) -> u128 {
        self.num_paths
    }

    /// Every path, the value holding the branch values along it
    pub fn realizations(&self) -> Vec<SmRealization> {
        self.arena
            .enumerate_paths(0)
            .into_iter()
            .enumerate()
            .map(|(ordinal, (weight, path))| {
                let value = path
                    .iter()
                    .filter_map(|s| self.arena.branch(*s))
                    .map(|b| b.value.to_string())
                    .collect();
                Realization::new(value, weight, ordinal, self.arena.path_ids(&path))
            })
            .collect()
    }
}

impl fmt::Display for SourceLogicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bsets: Vec<String> = self.arena.bsets.iter().map(ToString::to_string).collect();
        write!(
            f,
            "<SSLT:{} [{}]>",
            self.source_id.as_deref().unwrap_or("None"),
            bsets.join(", ")
        )
    }
}

// ─────────────────────────────────────────────
// 2. check_unique_uncertainties
// ─────────────────────────────────────────────

/// Fail with [`LogicTreeError::DuplicatedId`] when a per-source tree has
/// two branchsets of the same uncertainty type
pub fn check_unique_uncertainties<'a>(sslts: impl IntoIterator<Item = &'a SourceLogicTree>) -> Result<()> {
    for sslt in sslts {
        let utypes: Vec<&str> = sslt
            .arena
            .bsets
            .iter()
            .map(|b| b.uncertainty_type.as_str())
            .collect();
        let unique: HashSet<&str> = utypes.iter().copied().collect();
        if unique.len() < utypes.len() {
            return Err(LogicTreeError::duplicated(format!("{utypes:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{Branch, Filters};
    use crate::uncertainty::{Uncertainty, UncertaintyType};

    fn bset(id: &str, utype: UncertaintyType, values: &[f64]) -> BranchSet {
        let mut bs = BranchSet::new(id, utype, Filters::default(), 3);
        let w = 1.0 / values.len() as f64;
        for (i, v) in values.iter().enumerate() {
            bs.add_branch(Branch::new(format!("{id}_{i}"), Uncertainty::Float(*v), w, id));
        }
        bs
    }

    #[test]
    fn test_chain_counts_paths() {
        let a = bset("bs1", UncertaintyType::MaxMagGrAbsolute, &[7.0, 7.5, 8.0]);
        let b = bset("bs2", UncertaintyType::BGrRelative, &[-0.1, 0.1]);
        let sslt = SourceLogicTree::new(Some("src1".into()), &[&a, &b], IndexMap::new());
        assert_eq!(sslt.num_paths, 6);
        assert_eq!(sslt.branchsets()[1].ordinal, 1);
        let rlzs = sslt.realizations();
        assert_eq!(rlzs.len(), 6);
        assert_eq!(rlzs[5].pid(), "bs1_2~bs2_1");
        assert_eq!(rlzs[5].value, vec!["8".to_string(), "0.1".to_string()]);
        let total: f64 = rlzs.iter().map(|r| r.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
        // the originals are left untouched
        assert!(a.branches.iter().all(Branch::is_leaf));
        assert_eq!(sslt.to_string(), "<SSLT:src1 [<bs1_0 bs1_1 bs1_2>, <bs2_0 bs2_1>]>");
    }

    #[test]
    fn test_duplicated_uncertainty() {
        let a = bset("bs1", UncertaintyType::MaxMagGrAbsolute, &[7.0]);
        let b = bset("bs2", UncertaintyType::MaxMagGrAbsolute, &[7.5]);
        let good = SourceLogicTree::new(Some("src1".into()), &[&a], IndexMap::new());
        let bad = SourceLogicTree::new(Some("src2".into()), &[&a, &b], IndexMap::new());
        assert!(check_unique_uncertainties([&good]).is_ok());
        let err = check_unique_uncertainties([&good, &bad]).unwrap_err();
        assert!(matches!(err, LogicTreeError::DuplicatedId(_)));
        assert!(err.to_string().contains("maxMagGRAbsolute"));
    }
}
