//! # Quake Logic Tree: Realizations
//!
//! Table of Contents:
//! 1. Realization - Generic weighted path through one logic tree
//! 2. Weight - Per-IMT weight vector, generic weight last
//! 3. LtRealization - Combined source-model + gsim realization
//! 4. Effective realizations - Grouping draws sharing the same path

use std::fmt;
use std::ops::{Div, Index, Mul};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::gsim::{Gsim, ImtWeight};

// ─────────────────────────────────────────────
// 1. Realization
// ─────────────────────────────────────────────

/// A path through a logic tree with its value and weight. `samples` counts
/// how many draws the realization stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realization<V, W = f64> {
    /// What the path selects
    pub value: V,
    /// Weight of the path
    pub weight: W,
    /// Dense index among its siblings
    pub ordinal: usize,
    /// Branch ids along the path
    pub lt_path: Vec<String>,
    /// Number of draws merged into this realization
    pub samples: usize,
}

impl<V, W> Realization<V, W> {
    /// Create a realization standing for a single draw
    pub fn new(value: V, weight: W, ordinal: usize, lt_path: Vec<String>) -> Self {
        Self {
            value,
            weight,
            ordinal,
            lt_path,
            samples: 1,
        }
    }

    /// Path identifier, the branch ids joined by `~`
    pub fn pid(&self) -> String {
        self.lt_path.join("~")
    }
}

/// Source-model realization: the value holds the branch values along the
/// path, the source model files first.
pub type SmRealization = Realization<Vec<String>, f64>;

/// GSIM realization: one GSIM per tectonic region type.
pub type GsimRealization = Realization<Vec<Gsim>, ImtWeight>;

impl SmRealization {
    /// Compact name built from the source model files
    pub fn name(&self) -> String {
        let names: Vec<&str> = self
            .value
            .first()
            .map(|v| v.split_whitespace().collect())
            .unwrap_or_default();
        match names.len() {
            0 => String::new(),
            1 | 2 => names.join(" "),
            n => format!("{} ... {}", names[0], names[n - 1]),
        }
    }
}

impl<V: fmt::Debug, W: fmt::Debug> fmt::Display for Realization<V, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Realization #{} {:?}, path={}, weight={:?}",
            self.ordinal,
            self.value,
            self.pid(),
            self.weight
        )?;
        if self.samples > 1 {
            write!(f, ", samples={}", self.samples)?;
        }
        f.write_str(">")
    }
}

// ─────────────────────────────────────────────
// 2. Weight
// ─────────────────────────────────────────────

/// Realization weight: one entry per IMT with a specific weight followed by
/// the generic weight. Without IMT-specific weights it has length 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight(pub Vec<f64>);

impl Weight {
    /// A weight with `ncols` equal entries
    pub fn filled(value: f64, ncols: usize) -> Self {
        Self(vec![value; ncols.max(1)])
    }

    /// The generic weight (last entry)
    pub fn total(&self) -> f64 {
        self.0.last().copied().unwrap_or(0.0)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entry-wise sum of two weights of the same shape
    pub fn add(&self, other: &Weight) -> Weight {
        Weight(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect())
    }

    /// Overwrite every entry
    pub fn fill(&mut self, value: f64) {
        self.0.iter_mut().for_each(|w| *w = value);
    }
}

impl Index<usize> for Weight {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl Mul<f64> for &Weight {
    type Output = Weight;

    fn mul(self, rhs: f64) -> Weight {
        Weight(self.0.iter().map(|w| w * rhs).collect())
    }
}

impl Div<f64> for &Weight {
    type Output = Weight;

    fn div(self, rhs: f64) -> Weight {
        Weight(self.0.iter().map(|w| w / rhs).collect())
    }
}

// ─────────────────────────────────────────────
// 3. LtRealization
// ─────────────────────────────────────────────

/// An effective realization of the full logic tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LtRealization {
    /// Dense index, used as array index downstream
    pub ordinal: usize,
    /// Branch ids chosen in the source model logic tree
    pub sm_lt_path: Arc<[String]>,
    /// GSIM realization, shared among the realizations that drew it
    pub gsim_rlz: Arc<GsimRealization>,
    /// Weight, normalized over all realizations
    pub weight: Weight,
}

impl LtRealization {
    /// Identifier of the combined path, `<sm path>~<gsim path>`
    pub fn pid(&self) -> String {
        format!("{}~{}", self.sm_lt_path.join("~"), self.gsim_rlz.pid())
    }

    /// The GSIM branch ids
    pub fn gsim_lt_path(&self) -> &[String] {
        &self.gsim_rlz.lt_path
    }
}

impl fmt::Display for LtRealization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gsims: Vec<String> = self.gsim_rlz.value.iter().map(Gsim::to_string).collect();
        write!(
            f,
            "<{}|{}|{}, w={:?}>",
            self.ordinal,
            self.sm_lt_path.join("_"),
            gsims.join(","),
            self.weight.0
        )
    }
}

// ─────────────────────────────────────────────
// 4. Effective realizations
// ─────────────────────────────────────────────

/// Group realizations with the same path, in order of first appearance.
/// Each group is represented by its first member carrying the summed
/// weight, the group size as `samples` and a fresh dense ordinal.
pub fn get_effective_rlzs<V: Clone>(rlzs: &[Realization<V, f64>]) -> Vec<Realization<V, f64>> {
    let mut groups: IndexMap<String, Vec<&Realization<V, f64>>> = IndexMap::new();
    for rlz in rlzs {
        groups.entry(rlz.pid()).or_default().push(rlz);
    }
    groups
        .into_values()
        .enumerate()
        .map(|(ordinal, group)| {
            let first = group[0];
            Realization {
                value: first.value.clone(),
                weight: group.iter().map(|r| r.weight).sum(),
                ordinal,
                lt_path: first.lt_path.clone(),
                samples: group.len(),
            }
        })
        .collect()
}

/// Pair source-model paths with GSIM realizations and collapse equal
/// combined paths; each effective realization weighs `count / total`.
pub fn get_eff_rlzs(
    sm_paths: &[Arc<[String]>],
    gsim_rlzs: &[Arc<GsimRealization>],
    ncols: usize,
) -> Vec<LtRealization> {
    let total = sm_paths.len().min(gsim_rlzs.len());
    let mut groups: IndexMap<String, (usize, usize)> = IndexMap::new();
    for (i, (sm, gs)) in sm_paths.iter().zip(gsim_rlzs).enumerate() {
        let pid = format!("{}~{}", sm.join("~"), gs.pid());
        groups.entry(pid).or_insert((i, 0)).1 += 1;
    }
    groups
        .into_values()
        .enumerate()
        .map(|(ordinal, (first, count))| LtRealization {
            ordinal,
            sm_lt_path: sm_paths[first].clone(),
            gsim_rlz: gsim_rlzs[first].clone(),
            weight: Weight::filled(count as f64 / total as f64, ncols),
        })
        .collect()
}

/// Collapse realizations sharing the same combined pid, summing their
/// weights and renumbering the survivors.
pub fn group_realizations(rlzs: Vec<LtRealization>) -> Vec<LtRealization> {
    let mut groups: IndexMap<String, LtRealization> = IndexMap::new();
    for rlz in rlzs {
        let pid = rlz.pid();
        match groups.get_mut(&pid) {
            Some(first) => first.weight = first.weight.add(&rlz.weight),
            None => {
                groups.insert(pid, rlz);
            }
        }
    }
    groups
        .into_values()
        .enumerate()
        .map(|(ordinal, mut rlz)| {
            rlz.ordinal = ordinal;
            rlz
        })
        .collect()
}
