//! # Quake Logic Tree: Branches and Branchsets
//!
//! Table of Contents:
//! 1. Constants - PRECISION and the BASE183 alphabet
//! 2. Branch / DummyStep / Child - Tree nodes
//! 3. BranchSet - One uncertainty axis
//! 4. BranchArena - Branchsets and dummy steps owned by a tree
//! 5. Path walking - enumeration, sampling, counting, values

use std::fmt;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::config::SamplingMethod;
use crate::error::{LogicTreeError, Result};
use crate::node::Node;
use crate::packing::TrtSmr;
use crate::sampling::{pick, Weighted};
use crate::uncertainty::{Uncertainty, UncertaintyType};

// ─────────────────────────────────────────────
// 1. Constants
// ─────────────────────────────────────────────

/// Tolerance on the sum of sibling weights
pub const PRECISION: f64 = 1e-12;

/// Path element standing for a dummy step
pub const DUMMY: &str = ".";

lazy_static! {
    /// 183 single-char branch keys: ASCII alphanumerics followed by
    /// Latin letters from U+00C0, skipping the `×` and `÷` signs
    pub static ref BASE183: Vec<char> = ('0'..='9')
        .chain('A'..='Z')
        .chain('a'..='z')
        .chain(('\u{C0}'..='\u{24F}').filter(|c| *c != '\u{D7}' && *c != '\u{F7}'))
        .take(183)
        .collect();
}

/// Short key of branch `brno` in branchset `bsno`: one BASE183 char plus
/// the branchset number. `None` past the end of the alphabet.
pub fn keyno(bsno: usize, brno: usize) -> Option<String> {
    BASE183.get(brno).map(|c| format!("{c}{bsno}"))
}

/// Compact form of a path: the first char of each branch key, `.` for
/// dummy steps, or `A` when the tree has a single branch.
pub fn shorten(path: &[String], shortener: &IndexMap<String, String>) -> String {
    if shortener.len() == 1 {
        return "A".to_string();
    }
    path.iter()
        .map(|key| {
            if key.starts_with(DUMMY) {
                '.'
            } else {
                shortener
                    .get(key)
                    .and_then(|k| k.chars().next())
                    .unwrap_or('?')
            }
        })
        .collect()
}

/// The branchset nodes of a tree level: the node itself, or the single
/// branchset of a legacy `logicTreeBranchingLevel`
pub fn branchset_nodes<'a>(filename: &str, level: &'a Node) -> Result<&'a [Node]> {
    match level.tag.as_str() {
        "logicTreeBranchingLevel" => {
            if level.len() > 1 {
                return Err(LogicTreeError::logic(
                    level,
                    filename,
                    format!(
                        "Branching level {} has multiple branchsets",
                        level.get("branchingLevelID").unwrap_or("?")
                    ),
                ));
            }
            Ok(&level.nodes)
        }
        "logicTreeBranchSet" => Ok(std::slice::from_ref(level)),
        other => Err(LogicTreeError::value(format!(
            "Expected BranchingLevel/BranchSet, got {other}"
        ))),
    }
}

// ─────────────────────────────────────────────
// 2. Branch / DummyStep / Child
// ─────────────────────────────────────────────

/// What follows a branch in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Child {
    /// A real branchset, by arena index
    Set(usize),
    /// A dummy step, by arena index
    Dummy(usize),
}

/// One weighted alternative of a branchset
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Identifier, unique in the whole file
    pub branch_id: String,
    /// Payload
    pub value: Uncertainty,
    /// Weight
    pub weight: f64,
    /// branchSetID of the owning branchset
    pub bs_id: String,
    /// Next step, if any
    pub child: Option<Child>,
}

impl Branch {
    /// A leaf branch
    pub fn new(branch_id: impl Into<String>, value: Uncertainty, weight: f64, bs_id: impl Into<String>) -> Self {
        Self {
            branch_id: branch_id.into(),
            value,
            weight,
            bs_id: bs_id.into(),
            child: None,
        }
    }

    /// True when nothing is attached yet
    pub fn is_leaf(&self) -> bool {
        self.child.is_none()
    }
}

impl Weighted for Branch {
    fn sampling_weight(&self) -> f64 {
        self.weight
    }
}

/// A path segment carrying no uncertainty, inserted under the branches a
/// selective branchset does not apply to. Weight 1, path element `.`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DummyStep {
    /// Next step, if any
    pub child: Option<Child>,
}

// ─────────────────────────────────────────────
// 3. BranchSet
// ─────────────────────────────────────────────

/// The optional filters of a branchset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// `applyToTectonicRegionType`
    pub apply_to_trt: Option<String>,
    /// `applyToSources`, possibly emptied by a source-id reduction
    pub apply_to_sources: Option<Vec<String>>,
    /// `applyToBranches`
    pub apply_to_branches: Option<Vec<String>>,
}

impl Filters {
    /// The single `applyToSources` id, if there is exactly one
    pub fn single_source(&self) -> Option<&str> {
        match self.apply_to_sources.as_deref() {
            Some([src]) => Some(src.as_str()),
            _ => None,
        }
    }
}

/// Lightweight view of a source used to route it to realizations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source id, possibly suffixed (`id;smr`, `id@part`, `id!fname`)
    pub source_id: String,
    /// Tectonic region type
    pub tectonic_region_type: String,
    /// Packed identifiers of the realizations impacted by the source
    pub trt_smr: Vec<TrtSmr>,
}

impl SourceRef {
    /// A source not yet routed
    pub fn new(source_id: impl Into<String>, trt: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            tectonic_region_type: trt.into(),
            trt_smr: Vec::new(),
        }
    }

    /// Source id without the `;`, `@` and `:` suffixes
    pub fn corename(&self) -> &str {
        self.source_id
            .split([';', '@', ':'])
            .next()
            .unwrap_or(&self.source_id)
    }
}

/// A set of sibling branches describing one uncertainty axis
#[derive(Debug, Clone, PartialEq)]
pub struct BranchSet {
    /// branchSetID
    pub id: String,
    /// Kind of uncertainty
    pub uncertainty_type: UncertaintyType,
    /// Filters
    pub filters: Filters,
    /// Branches in document order
    pub branches: Vec<Branch>,
    /// Column of the sampling matrix
    pub ordinal: usize,
    /// `applyToBranches` text when the branchset applies selectively
    pub applied: Option<String>,
    /// Sample only the first branch, with weight 1
    pub collapsed: bool,
}

impl BranchSet {
    /// An empty branchset
    pub fn new(id: impl Into<String>, uncertainty_type: UncertaintyType, filters: Filters, ordinal: usize) -> Self {
        Self {
            id: id.into(),
            uncertainty_type,
            filters,
            branches: Vec::new(),
            ordinal,
            applied: None,
            collapsed: false,
        }
    }

    /// Append a branch; weights are checked by [`BranchSet::check_weights`]
    pub fn add_branch(&mut self, branch: Branch) {
        self.branches.push(branch);
    }

    /// Number of branches
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// True without branches
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branch by id
    pub fn get(&self, branch_id: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.branch_id == branch_id)
    }

    /// Position of a branch
    pub fn position(&self, branch_id: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.branch_id == branch_id)
    }

    /// Sum of the sibling weights
    pub fn weight_sum(&self) -> f64 {
        self.branches.iter().map(|b| b.weight).sum()
    }

    /// Fails when the weights do not sum to 1 within [`PRECISION`]
    pub fn check_weights(&self) -> Result<()> {
        let total = self.weight_sum();
        if (total - 1.0).abs() > PRECISION {
            return Err(LogicTreeError::value(format!(
                "branchset weights sum up to {total}, not 1"
            )));
        }
        Ok(())
    }

    /// Whether the uncertainty applies to `source`
    pub fn filter_source(&self, source: &SourceRef) -> bool {
        if let Some(trt) = &self.filters.apply_to_trt {
            if trt != &source.tectonic_region_type {
                return false;
            }
        }
        if let Some(srcs) = &self.filters.apply_to_sources {
            let id = source.corename();
            if !srcs.iter().any(|s| s == id || s == &source.source_id) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for BranchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.branches.iter().map(|b| b.branch_id.as_str()).collect();
        write!(f, "<{}>", ids.join(" "))
    }
}

// ─────────────────────────────────────────────
// 4. BranchArena
// ─────────────────────────────────────────────

/// A position in the tree: a real branch or a dummy step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Branch `1` of branchset `0`
    Branch(usize, usize),
    /// Dummy step by index
    Dummy(usize),
}

/// Owner of the branchsets and dummy steps of a tree; index 0 is the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchArena {
    /// Branchsets in registration order
    pub bsets: Vec<BranchSet>,
    /// Dummy steps
    pub dummies: Vec<DummyStep>,
}

impl BranchArena {
    /// Register a branchset and return its index
    pub fn push(&mut self, bset: BranchSet) -> usize {
        self.bsets.push(bset);
        self.bsets.len() - 1
    }

    /// Register a new dummy step and return its index
    pub fn add_dummy(&mut self) -> usize {
        self.dummies.push(DummyStep::default());
        self.dummies.len() - 1
    }

    /// The root branchset
    pub fn root(&self) -> Option<&BranchSet> {
        self.bsets.first()
    }

    /// The branch at a step, `None` for dummies
    pub fn branch(&self, step: Step) -> Option<&Branch> {
        match step {
            Step::Branch(s, b) => self.bsets.get(s)?.branches.get(b),
            Step::Dummy(_) => None,
        }
    }

    /// Branch id at a step, `.` for dummies
    pub fn step_id(&self, step: Step) -> &str {
        self.branch(step).map_or(DUMMY, |b| b.branch_id.as_str())
    }

    /// What follows a step
    pub fn child_of(&self, step: Step) -> Option<Child> {
        match step {
            Step::Branch(s, b) => self.bsets[s].branches[b].child,
            Step::Dummy(d) => self.dummies[d].child,
        }
    }

    /// Attach `child` under a step
    pub fn set_child(&mut self, step: Step, child: Child) {
        match step {
            Step::Branch(s, b) => self.bsets[s].branches[b].child = Some(child),
            Step::Dummy(d) => self.dummies[d].child = Some(child),
        }
    }

    /// All branches of a branchset as steps
    pub fn steps(&self, bset: usize) -> Vec<Step> {
        (0..self.bsets[bset].len()).map(|b| Step::Branch(bset, b)).collect()
    }

    /// Attach branchset `bset` under the open ends `prev`. With
    /// `apply_to`, only the listed branches receive it and every other
    /// open end gets a dummy step. Returns the new open ends.
    pub fn attach(&mut self, prev: &[Step], bset: usize, apply_to: Option<&[String]>) -> Vec<Step> {
        let mut open = self.steps(bset);
        match apply_to {
            Some(ids) if !ids.is_empty() => {
                for &step in prev {
                    let listed = ids.iter().any(|id| id == self.step_id(step)) && matches!(step, Step::Branch(..));
                    if listed {
                        self.set_child(step, Child::Set(bset));
                    } else {
                        let dummy = self.add_dummy();
                        self.set_child(step, Child::Dummy(dummy));
                        open.push(Step::Dummy(dummy));
                    }
                }
            }
            _ => {
                for &step in prev {
                    self.set_child(step, Child::Set(bset));
                }
            }
        }
        open
    }

    // ─────────────────────────────────────────────
    // 5. Path walking
    // ─────────────────────────────────────────────

    fn branch_choices(&self, bset: usize) -> Vec<(usize, f64)> {
        let bs = &self.bsets[bset];
        if bs.collapsed {
            vec![(0, 1.0)]
        } else {
            bs.branches.iter().enumerate().map(|(i, b)| (i, b.weight)).collect()
        }
    }

    fn walk(&self, child: Option<Child>, weight: f64, prefix: &mut Vec<Step>, out: &mut Vec<(f64, Vec<Step>)>) {
        match child {
            None => out.push((weight, prefix.clone())),
            Some(Child::Dummy(d)) => {
                prefix.push(Step::Dummy(d));
                self.walk(self.dummies[d].child, weight, prefix, out);
                prefix.pop();
            }
            Some(Child::Set(s)) => {
                for (b, w) in self.branch_choices(s) {
                    prefix.push(Step::Branch(s, b));
                    self.walk(self.bsets[s].branches[b].child, weight * w, prefix, out);
                    prefix.pop();
                }
            }
        }
    }

    /// Every path starting from branchset `start` with its weight, the
    /// product of the branch weights (dummy steps weigh 1)
    pub fn enumerate_paths(&self, start: usize) -> Vec<(f64, Vec<Step>)> {
        let mut out = Vec::new();
        if start < self.bsets.len() {
            self.walk(Some(Child::Set(start)), 1.0, &mut Vec::new(), &mut out);
        }
        out
    }

    /// Walk from branchset `start`, choosing at every branchset the branch
    /// picked by `probs[ordinal]`; collapsed branchsets give branch 0
    pub fn sample(&self, start: usize, probs: &[f64], method: SamplingMethod) -> Vec<Step> {
        let mut path = Vec::new();
        let mut next = Some(Child::Set(start));
        while let Some(child) = next {
            next = match child {
                Child::Dummy(d) => {
                    path.push(Step::Dummy(d));
                    self.dummies[d].child
                }
                Child::Set(s) => {
                    let bs = &self.bsets[s];
                    let b = if bs.collapsed {
                        0
                    } else {
                        let p = probs.get(bs.ordinal).copied().unwrap_or(0.0);
                        pick(&bs.branches, p, method)
                    };
                    path.push(Step::Branch(s, b));
                    bs.branches[b].child
                }
            };
        }
        path
    }

    /// Weight of a path: product of the branch weights, collapsed
    /// branchsets and dummy steps counting 1
    pub fn path_weight(&self, path: &[Step]) -> f64 {
        path.iter()
            .map(|&step| match step {
                Step::Branch(s, _) if self.bsets[s].collapsed => 1.0,
                step => self.branch(step).map_or(1.0, |b| b.weight),
            })
            .product()
    }

    /// Branch ids of a path
    pub fn path_ids(&self, path: &[Step]) -> Vec<String> {
        path.iter().map(|&s| self.step_id(s).to_string()).collect()
    }

    /// Number of leaf paths below branchset `start`, memoized per
    /// branchset and saturating at `u128::MAX`
    pub fn count_paths(&self, start: usize) -> u128 {
        let mut memo: Vec<Option<u128>> = vec![None; self.bsets.len()];
        self.count_child(Some(Child::Set(start)), &mut memo)
    }

    fn count_child(&self, child: Option<Child>, memo: &mut Vec<Option<u128>>) -> u128 {
        match child {
            None => 1,
            Some(Child::Dummy(d)) => self.count_child(self.dummies[d].child, memo),
            Some(Child::Set(s)) => {
                if let Some(n) = memo[s] {
                    return n;
                }
                let n = self
                    .branch_choices(s)
                    .into_iter()
                    .fold(0u128, |acc, (b, _)| {
                        let below = self.count_child(self.bsets[s].branches[b].child, memo);
                        acc.saturating_add(below)
                    });
                memo[s] = Some(n);
                n
            }
        }
    }

    /// Follow `lt_path` from branchset `start` and return the visited
    /// `(branchset index, value)` pairs; dummy steps are skipped
    pub fn get_bset_values<'a>(&'a self, start: usize, lt_path: &[String]) -> Vec<(usize, &'a Uncertainty)> {
        let mut pairs = Vec::new();
        let mut next = Some(Child::Set(start));
        for brid in lt_path {
            next = match next {
                Some(Child::Dummy(d)) => self.dummies[d].child,
                Some(Child::Set(s)) => match self.bsets[s].get(brid) {
                    Some(branch) => {
                        pairs.push((s, &branch.value));
                        branch.child
                    }
                    None => break,
                },
                None => break,
            };
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm(name: &str) -> Uncertainty {
        Uncertainty::SourceModel(vec![name.to_string()])
    }

    /// b1 (0.6) -> [c1, c2]; b2 (0.4) -> dummy
    fn selective() -> BranchArena {
        let mut arena = BranchArena::default();
        let mut root = BranchSet::new("bs0", UncertaintyType::SourceModel, Filters::default(), 0);
        root.add_branch(Branch::new("b1", sm("a.xml"), 0.6, "bs0"));
        root.add_branch(Branch::new("b2", sm("b.xml"), 0.4, "bs0"));
        let root = arena.push(root);
        let mut child = BranchSet::new("bs1", UncertaintyType::BGrRelative, Filters::default(), 1);
        child.add_branch(Branch::new("c1", Uncertainty::Float(0.1), 0.5, "bs1"));
        child.add_branch(Branch::new("c2", Uncertainty::Float(-0.1), 0.5, "bs1"));
        let child = arena.push(child);
        let prev = arena.steps(root);
        let open = arena.attach(&prev, child, Some(&["b1".to_string()]));
        assert_eq!(open.len(), 3);
        arena
    }

    #[test]
    fn test_base183() {
        assert_eq!(BASE183.len(), 183);
        assert_eq!(BASE183[0], '0');
        assert_eq!(BASE183[62], '\u{C0}');
        assert!(!BASE183.contains(&'\u{D7}'));
        assert_eq!(keyno(2, 11).unwrap(), "B2");
        assert!(keyno(0, 183).is_none());
    }

    #[test]
    fn test_shorten() {
        let mut shortener = IndexMap::new();
        shortener.insert("b1".to_string(), "00".to_string());
        assert_eq!(shorten(&["b1".to_string()], &shortener), "A");
        shortener.insert("c2".to_string(), "11".to_string());
        let path = vec!["b1".to_string(), "c2".to_string(), ".".to_string()];
        assert_eq!(shorten(&path, &shortener), "01.");
    }

    #[test]
    fn test_enumerate_selective() {
        let arena = selective();
        let paths = arena.enumerate_paths(0);
        let ids: Vec<String> = paths.iter().map(|(_, p)| arena.path_ids(p).join("~")).collect();
        assert_eq!(ids, vec!["b1~c1", "b1~c2", "b2~."]);
        let weights: Vec<f64> = paths.iter().map(|(w, _)| *w).collect();
        assert_eq!(weights, vec![0.3, 0.3, 0.4]);
        assert_eq!(arena.count_paths(0), 3);
    }

    #[test]
    fn test_double_attach_detected_by_is_leaf() {
        let arena = selective();
        assert!(!arena.bsets[0].branches[0].is_leaf());
        assert!(arena.bsets[1].branches[0].is_leaf());
    }

    #[test]
    fn test_sample_walk() {
        let arena = selective();
        let path = arena.sample(0, &[0.1, 0.9], SamplingMethod::EarlyWeights);
        assert_eq!(arena.path_ids(&path), vec!["b1", "c2"]);
        let path = arena.sample(0, &[0.9, 0.1], SamplingMethod::EarlyWeights);
        assert_eq!(arena.path_ids(&path), vec!["b2", "."]);
        assert_eq!(arena.path_weight(&path), 0.4);
    }

    #[test]
    fn test_collapsed() {
        let mut arena = selective();
        arena.bsets[1].collapsed = true;
        assert_eq!(arena.count_paths(0), 2);
        let paths = arena.enumerate_paths(0);
        assert_eq!(paths[0].0, 0.6);
    }

    #[test]
    fn test_bset_values() {
        let arena = selective();
        let path = vec!["b1".to_string(), "c2".to_string()];
        let values = arena.get_bset_values(0, &path);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], (1, &Uncertainty::Float(-0.1)));
        let path = vec!["b2".to_string(), ".".to_string()];
        assert_eq!(arena.get_bset_values(0, &path).len(), 1);
    }

    #[test]
    fn test_check_weights() {
        let arena = selective();
        assert!(arena.bsets[0].check_weights().is_ok());
        let mut bset = arena.bsets[1].clone();
        bset.branches[1].weight = 0.4;
        let err = bset.check_weights().unwrap_err();
        assert_eq!(err.to_string(), "branchset weights sum up to 0.9, not 1");
    }

    #[test]
    fn test_filter_source() {
        let mut bset = BranchSet::new("bs1", UncertaintyType::MaxMagGrAbsolute, Filters::default(), 1);
        bset.filters.apply_to_sources = Some(vec!["src1".to_string()]);
        assert!(bset.filter_source(&SourceRef::new("src1;0", "Active Shallow Crust")));
        assert!(!bset.filter_source(&SourceRef::new("src2", "Active Shallow Crust")));
        bset.filters.apply_to_trt = Some("Stable Continental Crust".to_string());
        assert!(!bset.filter_source(&SourceRef::new("src1", "Active Shallow Crust")));
    }

    #[test]
    fn test_branchset_nodes() {
        let level = Node::new("logicTreeBranchingLevel")
            .with_node(Node::new("logicTreeBranchSet"))
            .with_node(Node::new("logicTreeBranchSet"));
        assert!(branchset_nodes("lt.xml", &level).is_err());
        let bset = Node::new("logicTreeBranchSet");
        assert_eq!(branchset_nodes("lt.xml", &bset).unwrap().len(), 1);
    }
}
