//! # Quake Logic Tree: Source Model Logic Tree
//!
//! Table of Contents:
//! 1. SourceRecord / Info - Data collected while reading the tree
//! 2. Helpers - collect_info, reduce_fnames, collect_paths
//! 3. SourceModelLogicTree - Parsing and validation
//! 4. Path counting and decomposition
//! 5. Iteration - full enumeration and sampling
//! 6. Records - tabular round trip, trivial and fake trees

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::branch::{
    branchset_nodes, keyno, Branch, BranchArena, BranchSet, Child, Filters, Step, BASE183, PRECISION,
};
use crate::config::{LogicTreeConfig, SamplingMethod};
use crate::error::{LogicTreeError, NodeContext, Result};
use crate::node::Node;
use crate::nrml::{get_trt_by_src, parse_xml, read_logic_tree, validate_source_id, FileLoader, FsLoader};
use crate::realization::{Realization, SmRealization};
use crate::sampling::random;
use crate::serialize::{BranchRecord, BranchTable, SmltAttrs};
use crate::source_specific::{check_unique_uncertainties, SourceLogicTree};
use crate::uncertainty::{parse_uncertainty, Uncertainty, UncertaintyType};

const FILTERS: [&str; 3] = ["applyToTectonicRegionType", "applyToSources", "applyToBranches"];

/// Name of the placeholder source model used by [`SourceModelLogicTree::fake`]
pub const FAKE_FILE: &str = "_fake.xml";

// ─────────────────────────────────────────────
// 1. SourceRecord / Info
// ─────────────────────────────────────────────

/// One source seen in a source model file referenced by a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Source model branch id
    pub branch: String,
    /// Tectonic region type of the source
    pub trt: String,
    /// Source model file, relative to the logic tree
    pub fname: String,
    /// Source id
    pub source: String,
}

/// Files and filters referenced by a source model logic tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    /// Source model paths, sorted
    pub smpaths: Vec<PathBuf>,
    /// Companion `.hdf5` files that exist, sorted
    pub h5paths: Vec<PathBuf>,
    /// applyToBranches text -> applyToSources ids
    pub applytosources: IndexMap<String, Vec<String>>,
}

// ─────────────────────────────────────────────
// 2. Helpers
// ─────────────────────────────────────────────

fn check_unique_fnames<'a>(fnames: &[&'a str]) -> Result<()> {
    let mut sorted = fnames.to_vec();
    sorted.sort_unstable();
    let mut dupl: Vec<&str> = sorted.windows(2).filter(|w| w[0] == w[1]).map(|w| w[0]).collect();
    dupl.dedup();
    if dupl.is_empty() {
        Ok(())
    } else {
        Err(LogicTreeError::value(format!("Found duplicates {dupl:?}")))
    }
}

/// Collect the source model paths of a logic tree without validating it.
/// With a `branch_id` only that source model branch is considered.
pub fn collect_info(loader: &dyn FileLoader, smlt: &Path, branch_id: &str) -> Result<Info> {
    let filename = smlt.to_string_lossy();
    let tree = read_logic_tree(loader, smlt).map_err(|_| {
        LogicTreeError::invalid_file(format!("{filename} is not a valid source_model_logic_tree_file"))
    })?;
    let basepath = smlt.parent().unwrap_or_else(|| Path::new(""));
    let mut smpaths = BTreeSet::new();
    let mut h5paths = BTreeSet::new();
    let mut applytosources: IndexMap<String, Vec<String>> = IndexMap::new();
    for level in &tree.nodes {
        for bset in branchset_nodes(&filename, level)? {
            if let Some(srcs) = bset.get("applyToSources") {
                applytosources
                    .entry(bset.get("applyToBranches").unwrap_or_default().to_string())
                    .or_default()
                    .extend(srcs.split_whitespace().map(str::to_string));
            }
            let utype = bset.get("uncertaintyType").unwrap_or_default();
            if utype != "sourceModel" && utype != "extendModel" {
                continue;
            }
            for br in bset.children("logicTreeBranch") {
                if !branch_id.is_empty() && br.get("branchID") != Some(branch_id) {
                    continue;
                }
                let um = br.require("uncertaintyModel").node_context(&filename, br)?;
                let fnames: Vec<&str> = um.text_trim().split_whitespace().collect();
                check_unique_fnames(&fnames).node_context(&filename, br)?;
                for fname in fnames {
                    let path = basepath.join(fname);
                    let hdf5 = path.with_extension("hdf5");
                    if loader.exists(&hdf5) {
                        h5paths.insert(hdf5);
                    }
                    smpaths.insert(path);
                }
            }
        }
    }
    Ok(Info {
        smpaths: smpaths.into_iter().collect(),
        h5paths: h5paths.into_iter().collect(),
        applytosources,
    })
}

fn sample_count<N: TryInto<u32> + Copy + fmt::Display>(n: N) -> Result<u32> {
    n.try_into()
        .map_err(|_| LogicTreeError::value(format!("number_of_logic_tree_samples {n} does not fit in 32 bits")))
}

/// For an ambiguous source id `id!fname` keep only the files whose name
/// contains `fname`; otherwise return every file
pub fn reduce_fnames(fnames: &[String], source_id: &str) -> Vec<String> {
    let parts: Vec<&str> = source_id.split('!').collect();
    match parts.as_slice() {
        [_, fname] => fnames.iter().filter(|f| f.contains(fname)).cloned().collect(),
        _ => fnames.to_vec(),
    }
}

/// Cluster string of shortened paths of the same length: for each
/// position the sorted set of chars in brackets, `~` left bare.
///
/// `["0~A0", "0~A1"]` gives `"[0]~[A][01]"`.
pub fn collect_paths(paths: &[String]) -> Result<String> {
    let columns: Vec<Vec<char>> = paths.iter().map(|p| p.chars().collect()).collect();
    let n = columns.first().map_or(0, Vec::len);
    if let Some(bad) = columns.iter().find(|c| c.len() != n) {
        return Err(LogicTreeError::value(format!(
            "paths of different lengths: {} != {n}",
            bad.len()
        )));
    }
    let mut out = String::new();
    for c in 0..n {
        let chars: BTreeSet<char> = columns.iter().map(|p| p[c]).collect();
        let bare = chars.len() == 1 && chars.contains(&'~');
        if !bare {
            out.push('[');
        }
        out.extend(chars);
        if !bare {
            out.push(']');
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────
// 3. SourceModelLogicTree
// ─────────────────────────────────────────────

/// Logic tree of source model uncertainties.
///
/// The root branchset is always a `sourceModel` one; the following
/// branchsets modify the sources, possibly only under some branches
/// (`applyToBranches`) or for some sources (`applyToSources`).
pub struct SourceModelLogicTree {
    /// Logic tree file
    pub filename: String,
    /// Directory the source model paths are relative to
    pub basepath: PathBuf,
    /// Sampling seed
    pub seed: u64,
    /// Number of samples, 0 for full enumeration
    pub num_samples: usize,
    /// Sampling method
    pub sampling_method: SamplingMethod,
    /// Skip reading the source model files
    pub test_mode: bool,
    /// Keep only this source model branch (empty: all)
    pub branch_id: String,
    /// Reduce the tree to this source (empty: all)
    pub source_id: String,
    /// Branchsets and dummy steps; index 0 is the root
    pub arena: BranchArena,
    /// branch id -> position, unique in the whole file
    pub branches: IndexMap<String, Step>,
    /// branchSetID -> raw attributes without the id
    pub bsetdict: IndexMap<String, BTreeMap<String, String>>,
    /// branch id -> short key
    pub shortener: IndexMap<String, String>,
    /// Sources found in the referenced files
    pub source_data: Vec<SourceRecord>,
    /// Tectonic region types of the sources
    pub tectonic_region_types: BTreeSet<String>,
    /// Files referenced by the tree
    pub info: Info,
    /// Number of paths, saturating
    pub num_paths: u128,
    /// Every non-root branchset applies to exactly one source
    pub is_source_specific: bool,
    loader: Arc<dyn FileLoader>,
}

impl fmt::Debug for SourceModelLogicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceModelLogicTree")
            .field("filename", &self.filename)
            .field("seed", &self.seed)
            .field("num_samples", &self.num_samples)
            .field("sampling_method", &self.sampling_method)
            .field("bsetdict", &self.bsetdict)
            .field("num_paths", &self.num_paths)
            .field("is_source_specific", &self.is_source_specific)
            .finish_non_exhaustive()
    }
}

impl Clone for SourceModelLogicTree {
    fn clone(&self) -> Self {
        Self {
            filename: self.filename.clone(),
            basepath: self.basepath.clone(),
            seed: self.seed,
            num_samples: self.num_samples,
            sampling_method: self.sampling_method,
            test_mode: self.test_mode,
            branch_id: self.branch_id.clone(),
            source_id: self.source_id.clone(),
            arena: self.arena.clone(),
            branches: self.branches.clone(),
            bsetdict: self.bsetdict.clone(),
            shortener: self.shortener.clone(),
            source_data: self.source_data.clone(),
            tectonic_region_types: self.tectonic_region_types.clone(),
            info: self.info.clone(),
            num_paths: self.num_paths,
            is_source_specific: self.is_source_specific,
            loader: Arc::clone(&self.loader),
        }
    }
}

impl SourceModelLogicTree {
    fn empty(loader: Arc<dyn FileLoader>, filename: &str, config: &LogicTreeConfig) -> Self {
        Self {
            filename: filename.to_string(),
            basepath: Path::new(filename).parent().map(Path::to_path_buf).unwrap_or_default(),
            seed: config.seed,
            num_samples: config.number_of_logic_tree_samples as usize,
            sampling_method: config.sampling_method,
            test_mode: config.test_mode,
            branch_id: config.branch_id.clone(),
            source_id: config.source_id.clone(),
            arena: BranchArena::default(),
            branches: IndexMap::new(),
            bsetdict: IndexMap::new(),
            shortener: IndexMap::new(),
            source_data: Vec::new(),
            tectonic_region_types: BTreeSet::new(),
            info: Info::default(),
            num_paths: 0,
            is_source_specific: false,
            loader,
        }
    }

    /// Read and validate a source model logic tree file; the source
    /// model files are read through the same loader
    pub fn from_file(loader: Arc<dyn FileLoader>, path: impl AsRef<Path>, config: &LogicTreeConfig) -> Result<Self> {
        let path = path.as_ref();
        let filename = path.to_string_lossy().into_owned();
        let root = parse_xml(&loader.read_to_string(path)?)?;
        let mut smlt = Self::empty(loader, &filename, config);
        let tree = if root.tag == "logicTree" {
            &root
        } else {
            root.child("logicTree")
                .ok_or_else(|| LogicTreeError::logic(&root, &filename, "missing logicTree node"))?
        };
        smlt.parse_tree(tree)?;
        smlt.set_num_paths()?;
        Ok(smlt)
    }

    /// The loader used to read the tree and its source models
    pub fn loader(&self) -> &Arc<dyn FileLoader> {
        &self.loader
    }

    /// Replace the loader, e.g. after [`SourceModelLogicTree::from_records`]
    pub fn with_loader(mut self, loader: Arc<dyn FileLoader>) -> Self {
        self.loader = loader;
        self
    }

    fn config(&self) -> Result<LogicTreeConfig> {
        Ok(LogicTreeConfig {
            seed: self.seed,
            number_of_logic_tree_samples: sample_count(self.num_samples)?,
            sampling_method: self.sampling_method,
            test_mode: self.test_mode,
            branch_id: self.branch_id.clone(),
            source_id: self.source_id.clone(),
            ..LogicTreeConfig::default()
        })
    }

    /// A new tree restricted to a single source, re-read from the file.
    /// `source_id` may carry `@part` and `!fname` suffixes.
    pub fn reduce(&self, source_id: &str, num_samples: Option<usize>) -> Result<Self> {
        let mut config = self.config()?;
        config.source_id = source_id.to_string();
        if let Some(n) = num_samples {
            config.number_of_logic_tree_samples = sample_count(n)?;
        }
        Self::from_file(Arc::clone(&self.loader), &self.filename, &config)
    }

    /// The root branchset
    pub fn root_branchset(&self) -> Option<&BranchSet> {
        self.arena.root()
    }

    /// Branchsets in the order they were registered
    pub fn branchsets(&self) -> &[BranchSet] {
        &self.arena.bsets
    }

    /// Branch by id
    pub fn branch(&self, branch_id: &str) -> Option<&Branch> {
        self.branches.get(branch_id).and_then(|s| self.arena.branch(*s))
    }

    fn parse_tree(&mut self, tree: &Node) -> Result<()> {
        let t0 = Instant::now();
        self.info = collect_info(self.loader.as_ref(), Path::new(&self.filename), &self.branch_id)?;
        let mut previous: Vec<Step> = Vec::new();
        for (bsno, level) in tree.nodes.iter().enumerate() {
            let [bsnode] = branchset_nodes(&self.filename, level)? else {
                return Err(LogicTreeError::logic(level, &self.filename, "expected a single branchset"));
            };
            self.parse_branchset(bsnode, bsno, &mut previous)?;
        }
        let files: HashSet<&str> = self.source_data.iter().map(|r| r.fname.as_str()).collect();
        debug!(
            files = files.len(),
            seconds = t0.elapsed().as_secs_f64(),
            "Validated source model logic tree"
        );
        Ok(())
    }

    fn parse_branchset(&mut self, node: &Node, bsno: usize, previous: &mut Vec<Step>) -> Result<()> {
        let filename = self.filename.clone();
        let utype: UncertaintyType = node
            .attr("uncertaintyType")?
            .parse()
            .map_err(|e: LogicTreeError| LogicTreeError::logic(node, &filename, e.to_string()))?;
        let raw: IndexMap<&str, &str> = FILTERS
            .iter()
            .filter_map(|key| node.get(key).map(|value| (*key, value)))
            .collect();
        self.validate_filters(node, utype, &raw)?;
        let filters = self.parse_filters(&raw);
        if matches!(&filters.apply_to_sources, Some(srcs) if srcs.is_empty()) {
            debug!(bsid = node.get("branchSetID"), source_id = %self.source_id, "Ignoring branchset");
            return Ok(());
        }

        let bsid = node.attr("branchSetID")?.to_string();
        let mut bset = BranchSet::new(&bsid, utype, filters, self.bsetdict.len());
        if self.bsetdict.contains_key(&bsid) {
            return Err(LogicTreeError::duplicated(format!("{bsid} in {filename}")));
        }
        let attrs = node
            .attrib
            .iter()
            .filter(|(key, _)| key.as_str() != "branchSetID")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.bsetdict.insert(bsid.clone(), attrs);
        self.validate_branchset(node, bsno, &bset)?;
        self.parse_branches(node, &mut bset)?;
        if bset.is_empty() {
            self.bsetdict.shift_remove(&bsid);
            return Ok(());
        }

        let idx = self.arena.push(bset);
        for no in 0..self.arena.bsets[idx].len() {
            let id = self.arena.bsets[idx].branches[no].branch_id.clone();
            self.branches.insert(id, Step::Branch(idx, no));
        }
        let app2brs: Option<Vec<String>> = node
            .get("applyToBranches")
            .map(|text| text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|ids| !ids.is_empty());
        let listed = |arena: &BranchArena, step: Step, ids: &[String]| {
            matches!(step, Step::Branch(..)) && ids.iter().any(|id| id == arena.step_id(step))
        };
        let mut dummies = Vec::new();
        match app2brs {
            Some(ids) if previous.iter().any(|s| !listed(&self.arena, *s, &ids)) => {
                self.arena.bsets[idx].applied = Some(ids.join(" "));
                self.apply_branchset(node, &ids, idx)?;
                for &step in previous.iter() {
                    if !listed(&self.arena, step, &ids) {
                        let dummy = self.arena.add_dummy();
                        self.arena.set_child(step, Child::Dummy(dummy));
                        dummies.push(Step::Dummy(dummy));
                    }
                }
            }
            _ => {
                for &step in previous.iter() {
                    self.arena.set_child(step, Child::Set(idx));
                }
            }
        }
        *previous = self.arena.steps(idx);
        previous.extend(dummies);
        Ok(())
    }

    fn parse_branches(&mut self, node: &Node, bset: &mut BranchSet) -> Result<()> {
        let filename = self.filename.clone();
        let bs_id = bset.id.clone();
        let utype = bset.uncertainty_type;
        let bsno = self.arena.bsets.len();
        let branch_nodes: Vec<&Node> = node.children("logicTreeBranch").collect();
        if self.branch_id.is_empty() && branch_nodes.len() > BASE183.len() {
            return Err(LogicTreeError::invalid_file(format!(
                "{filename}: the branchset {bs_id} has too many branches ({} > {})",
                branch_nodes.len(),
                BASE183.len()
            )));
        }
        let mut weight_sum = 0.0;
        let mut values: Vec<&str> = Vec::new();
        let mut zeros: Vec<f64> = Vec::new();
        let mut zero_id: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        for (brno, bnode) in branch_nodes.into_iter().enumerate() {
            let weight_node = bnode.require("uncertaintyWeight").node_context(&filename, bnode)?;
            let weight: f64 = weight_node.text_trim().parse().map_err(|_| {
                LogicTreeError::logic(weight_node, &filename, "uncertaintyWeight must be a float")
            })?;
            let um = bnode.require("uncertaintyModel").node_context(&filename, bnode)?;
            if !um.text_trim().is_empty() {
                values.push(um.text_trim());
            }
            let mut value = parse_uncertainty(utype, um, &filename)?;
            let branch_id = bnode.attr("branchID")?.to_string();
            if utype.is_source_model() {
                let mut vals = Vec::new();
                if !self.test_mode {
                    for fname in um.text_trim().split_whitespace() {
                        if fname.ends_with(".xml") || fname.ends_with(".nrml") {
                            let found = self
                                .collect_source_model_data(&branch_id, fname)
                                .map_err(|e| LogicTreeError::logic(um, &filename, e.to_string()))?;
                            if found > 0 {
                                vals.push(fname.to_string());
                            }
                        }
                    }
                }
                if !self.branch_id.is_empty() && !branch_id.contains(&self.branch_id) {
                    value = Uncertainty::SourceModel(Vec::new());
                } else if !self.source_id.is_empty() {
                    let srcid = self.source_id.split('@').next().unwrap_or_default();
                    value = Uncertainty::SourceModel(reduce_fnames(&vals, srcid));
                }
            }
            if self.branches.contains_key(&branch_id) || !seen.insert(branch_id.clone()) {
                return Err(LogicTreeError::logic(
                    bnode,
                    &filename,
                    format!("branchID '{branch_id}' is not unique"),
                ));
            }
            if value.is_empty() {
                zero_id = Some(branch_id.clone());
                zeros.push(weight);
            } else {
                bset.add_branch(Branch::new(&branch_id, value, weight, &bs_id));
            }
            let key = keyno(bsno, brno).unwrap_or_else(|| branch_id.clone());
            self.shortener.insert(branch_id, key);
            weight_sum += weight;
        }
        if let Some(zero_id) = zero_id {
            let weight = zeros.iter().sum();
            bset.add_branch(Branch::new(zero_id, Uncertainty::SourceModel(Vec::new()), weight, &bs_id));
        }
        if (weight_sum - 1.0).abs() > PRECISION {
            return Err(LogicTreeError::logic(
                node,
                &filename,
                format!("branchset weights sum up to {weight_sum}, not 1"),
            ));
        }
        let distinct: HashSet<&str> = values.iter().copied().collect();
        if distinct.len() < values.len() {
            return Err(LogicTreeError::logic(
                node,
                &filename,
                format!("there are duplicate values in uncertaintyModel: {}", values.join(" ")),
            ));
        }
        Ok(())
    }

    fn parse_filters(&self, raw: &IndexMap<&str, &str>) -> Filters {
        let split = |text: &str| text.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        let apply_to_sources = raw.get("applyToSources").copied().map(|text| {
            let srcs = split(text);
            if self.source_id.is_empty() {
                srcs
            } else {
                srcs.into_iter().filter(|s| *s == self.source_id).collect()
            }
        });
        Filters {
            apply_to_trt: raw.get("applyToTectonicRegionType").map(|s| s.to_string()),
            apply_to_sources,
            apply_to_branches: raw.get("applyToBranches").copied().map(split),
        }
    }

    fn validate_filters(&self, node: &Node, utype: UncertaintyType, raw: &IndexMap<&str, &str>) -> Result<()> {
        let err = |msg: String| Err(LogicTreeError::logic(node, &self.filename, msg));
        let f: Vec<(&str, &str)> = raw
            .iter()
            .filter(|(key, _)| **key != "applyToBranches")
            .map(|(k, v)| (*k, *v))
            .collect();
        if utype == UncertaintyType::SourceModel && !f.is_empty() {
            return err("filters are not allowed on source model uncertainty".into());
        }
        if f.len() > 1 {
            return err("only one filter is allowed per branchset".into());
        }
        if let Some(trt) = raw.get("applyToTectonicRegionType") {
            if !self.test_mode && !self.tectonic_region_types.contains(*trt) {
                return err(format!(
                    "source models don't define sources of tectonic region type '{trt}'"
                ));
            }
        }
        if utype.is_absolute() && self.source_data.len() > 1 {
            let single_source = matches!(
                f.as_slice(),
                [("applyToSources", srcs)] if srcs.split_whitespace().count() == 1
            );
            if !single_source {
                return err(format!(
                    "uncertainty of type '{utype}' must define 'applyToSources' with only one source id"
                ));
            }
        }
        if utype.is_fault_dip() && !raw.contains_key("applyToSources") {
            return err(format!("uncertainty of type '{utype}' must define 'applyToSources'"));
        }
        if let Some(srcs) = raw.get("applyToSources") {
            if self.test_mode {
                return Ok(());
            }
            for source_id in srcs.split_whitespace() {
                if !self.source_id.is_empty() && source_id != self.source_id {
                    continue;
                }
                let branch_ids: BTreeSet<&str> = self
                    .source_data
                    .iter()
                    .filter(|r| r.source == source_id)
                    .map(|r| r.branch.as_str())
                    .collect();
                if branch_ids.is_empty() {
                    return err(format!("source with id '{source_id}' is not defined in source models"));
                }
                if branch_ids.len() > 1 && !raw.contains_key("applyToBranches") {
                    return err(format!(
                        "{source_id} belongs to multiple branches {branch_ids:?}: applyToBranches \
                         must be specified together with applyToSources"
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_branchset(&self, node: &Node, bsno: usize, bset: &BranchSet) -> Result<()> {
        let msg = match (bsno, bset.uncertainty_type) {
            (0, UncertaintyType::SourceModel) => return Ok(()),
            (0, _) => "first branchset must define an uncertainty of type \"sourceModel\"",
            (_, UncertaintyType::SourceModel) => {
                "uncertainty of type \"sourceModel\" can be defined on first branchset only"
            }
            (_, UncertaintyType::GmpeModel) => {
                "uncertainty of type \"gmpeModel\" is not allowed in source model logic tree"
            }
            _ => return Ok(()),
        };
        Err(LogicTreeError::logic(node, &self.filename, msg))
    }

    fn apply_branchset(&mut self, node: &Node, ids: &[String], idx: usize) -> Result<()> {
        for branch_id in ids {
            let step = *self.branches.get(branch_id).ok_or_else(|| {
                LogicTreeError::logic(node, &self.filename, format!("branch '{branch_id}' is not yet defined"))
            })?;
            if self.arena.child_of(step).is_some() {
                return Err(LogicTreeError::logic(
                    node,
                    &self.filename,
                    format!("branch '{branch_id}' already has child branchset"),
                ));
            }
            self.arena.set_child(step, Child::Set(idx));
        }
        Ok(())
    }

    /// Scan a source model file and register its sources under
    /// `branch_id`; returns the number of sources found
    fn collect_source_model_data(&mut self, branch_id: &str, fname: &str) -> Result<usize> {
        let path = self.basepath.join(fname);
        let xml = self.loader.read_to_string(&path)?;
        let prefix = self
            .source_id
            .split('!')
            .next()
            .and_then(|s| s.split('@').next())
            .unwrap_or_default();
        let trt_by_src = get_trt_by_src(&xml, prefix)?;
        for (src_id, trt) in &trt_by_src {
            validate_source_id(src_id).map_err(|_| {
                LogicTreeError::invalid_file(format!("{}: contain invalid ID {src_id}", path.display()))
            })?;
            self.source_data.push(SourceRecord {
                branch: branch_id.to_string(),
                trt: trt.clone(),
                fname: fname.to_string(),
                source: src_id.clone(),
            });
            self.tectonic_region_types.insert(trt.clone());
        }
        Ok(trt_by_src.len())
    }

    // ─────────────────────────────────────────────
    // 4. Path counting and decomposition
    // ─────────────────────────────────────────────

    /// Count the paths, through the per-source decomposition when every
    /// non-root branchset applies to a single source
    pub fn set_num_paths(&mut self) -> Result<()> {
        let dicts: Vec<&BTreeMap<String, String>> = self.bsetdict.values().skip(1).collect();
        let single_source = !dicts.is_empty()
            && dicts.iter().all(|d| {
                d.get("applyToSources")
                    .is_some_and(|ats| ats.split_whitespace().count() == 1)
            });
        self.is_source_specific = single_source && self.arena.bsets.iter().all(|b| b.applied.is_none());
        if self.is_source_specific {
            let sslts = self.decompose()?;
            self.num_paths = sslts
                .values()
                .fold(1u128, |acc, sslt| acc.saturating_mul(sslt.num_paths));
            check_unique_uncertainties(sslts.values())?;
        } else if self.arena.bsets.is_empty() {
            self.num_paths = 0;
        } else {
            self.num_paths = self.arena.count_paths(0);
        }
        Ok(())
    }

    /// Number of samples, or of paths under full enumeration
    pub fn get_num_paths(&self) -> u128 {
        if self.num_samples > 0 {
            self.num_samples as u128
        } else {
            self.num_paths
        }
    }

    /// Split a source-specific tree into independent per-source trees;
    /// the root gets the `None` key when it has more than one branch
    pub fn decompose(&self) -> Result<IndexMap<Option<String>, SourceLogicTree>> {
        if !self.is_source_specific {
            return Err(LogicTreeError::value(format!(
                "{} is not a source specific logic tree",
                self.filename
            )));
        }
        let mut groups: IndexMap<String, Vec<&BranchSet>> = IndexMap::new();
        for bset in self.arena.bsets.iter().skip(1) {
            if let Some(src) = bset.filters.single_source() {
                groups.entry(src.to_string()).or_default().push(bset);
            }
        }
        let subdict = |bsets: &[&BranchSet]| -> IndexMap<String, BTreeMap<String, String>> {
            bsets
                .iter()
                .filter_map(|b| self.bsetdict.get(&b.id).map(|d| (b.id.clone(), d.clone())))
                .collect()
        };
        let mut out = IndexMap::new();
        if let Some(root) = self.arena.root() {
            if root.len() > 1 {
                out.insert(None, SourceLogicTree::new(None, &[root], subdict(&[root])));
            }
        }
        for (src_id, bsets) in groups {
            let dict = subdict(&bsets);
            out.insert(Some(src_id.clone()), SourceLogicTree::new(Some(src_id), &bsets, dict));
        }
        Ok(out)
    }

    /// `{source_id: branches}` for the sources defined under more than one
    /// source model branch
    pub fn get_duplicated_sources(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_source: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for rec in &self.source_data {
            by_source.entry(rec.source.clone()).or_default().push(rec.branch.clone());
        }
        by_source.retain(|_, branches| branches.len() > 1);
        by_source
    }

    /// `(branchset, value)` pairs along a path, the root excluded
    pub fn bset_values(&self, lt_path: &[String]) -> Vec<(&BranchSet, &Uncertainty)> {
        self.arena
            .get_bset_values(0, lt_path)
            .into_iter()
            .skip(1)
            .map(|(idx, value)| (&self.arena.bsets[idx], value))
            .collect()
    }

    /// The tree as a `logicTree` node, branchsets renamed `bsNN`
    pub fn to_node(&self) -> Node {
        let bsnodes = self.arena.bsets.iter().map(|bset| {
            Node::new("logicTreeBranchSet")
                .with_attr("branchSetID", format!("bs{:02}", bset.ordinal))
                .with_attr("uncertaintyType", bset.uncertainty_type.as_str())
                .with_nodes(bset.branches.iter().map(|br| {
                    Node::new("logicTreeBranch")
                        .with_attr("branchID", br.branch_id.clone())
                        .with_node(br.value.to_node())
                        .with_node(Node::new("uncertaintyWeight").with_text(br.weight.to_string()))
                }))
        });
        Node::new("logicTree").with_attr("logicTreeID", "lt").with_nodes(bsnodes)
    }

    // ─────────────────────────────────────────────
    // 5. Iteration
    // ─────────────────────────────────────────────

    fn sm_realization(&self, path: &[Step], weight: f64, ordinal: usize) -> SmRealization {
        let value = path
            .iter()
            .filter_map(|s| self.arena.branch(*s))
            .map(|b| b.value.to_string())
            .collect();
        Realization::new(value, weight, ordinal, self.arena.path_ids(path))
    }

    /// The realizations of the tree: every path under full enumeration,
    /// otherwise `num_samples` draws with the tree seed
    pub fn realizations(&self) -> Vec<SmRealization> {
        if self.arena.bsets.is_empty() {
            return Vec::new();
        }
        if self.num_samples == 0 {
            return self
                .arena
                .enumerate_paths(0)
                .iter()
                .enumerate()
                .map(|(i, (weight, path))| self.sm_realization(path, *weight, i))
                .collect();
        }
        let ncols = self
            .arena
            .bsets
            .iter()
            .map(|b| b.ordinal + 1)
            .max()
            .unwrap_or(0)
            .max(self.bsetdict.len());
        let probs = random(self.num_samples, ncols, self.seed, self.sampling_method);
        probs
            .rows()
            .enumerate()
            .map(|(i, row)| {
                let path = self.arena.sample(0, row, self.sampling_method);
                let weight = if self.sampling_method.is_early() {
                    1.0 / self.num_samples as f64
                } else {
                    self.arena.path_weight(&path)
                };
                self.sm_realization(&path, weight, i)
            })
            .collect()
    }

    // ─────────────────────────────────────────────
    // 6. Records
    // ─────────────────────────────────────────────

    /// Tabular form: one row per real branch, dummy steps excluded
    pub fn to_records(&self) -> Result<BranchTable> {
        let mut rows = Vec::with_capacity(self.branches.len());
        for bset in &self.arena.bsets {
            for br in &bset.branches {
                rows.push(BranchRecord {
                    branchset: bset.id.clone(),
                    branch: br.branch_id.clone(),
                    utype: bset.uncertainty_type.as_str().to_string(),
                    uvalue: br.value.to_json()?,
                    weight: br.weight,
                });
            }
        }
        let attrs = SmltAttrs {
            bsetdict: serde_json::to_string(&self.bsetdict)?,
            seed: self.seed,
            num_samples: self.num_samples as u64,
            sampling_method: self.sampling_method.as_str().to_string(),
            filename: self.filename.clone(),
            num_paths: self.num_paths.to_string(),
            is_source_specific: self.is_source_specific,
            source_id: self.source_id.clone(),
            branch_id: self.branch_id.clone(),
        };
        Ok(BranchTable { rows, attrs })
    }

    /// Rebuild a tree from [`SourceModelLogicTree::to_records`]. The
    /// branchsets are attached again following their `applyToBranches`.
    /// `source_data` is not part of the table and starts empty.
    pub fn from_records(table: &BranchTable) -> Result<Self> {
        let attrs = &table.attrs;
        let config = LogicTreeConfig {
            seed: attrs.seed,
            number_of_logic_tree_samples: sample_count(attrs.num_samples)?,
            sampling_method: attrs.sampling_method.parse()?,
            branch_id: attrs.branch_id.clone(),
            source_id: attrs.source_id.clone(),
            ..LogicTreeConfig::default()
        };
        let mut smlt = Self::empty(Arc::new(FsLoader), &attrs.filename, &config);
        smlt.bsetdict = serde_json::from_str(&attrs.bsetdict)?;
        smlt.num_paths = attrs
            .num_paths
            .parse()
            .map_err(|_| LogicTreeError::storage(format!("invalid num_paths {}", attrs.num_paths)))?;
        smlt.is_source_specific = attrs.is_source_specific;

        let mut grouped: IndexMap<&str, Vec<&BranchRecord>> = IndexMap::new();
        for row in &table.rows {
            grouped.entry(row.branchset.as_str()).or_default().push(row);
        }
        for (ordinal, (bsid, rows)) in grouped.into_iter().enumerate() {
            let dic = smlt
                .bsetdict
                .get(bsid)
                .ok_or_else(|| LogicTreeError::storage(format!("{bsid} is missing in bsetdict")))?;
            let split = |key: &str| {
                dic.get(key)
                    .map(|t| t.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                    .filter(|v| !v.is_empty())
            };
            let filters = Filters {
                apply_to_trt: dic.get("applyToTectonicRegionType").cloned(),
                apply_to_sources: split("applyToSources"),
                apply_to_branches: split("applyToBranches"),
            };
            let utype: UncertaintyType = rows[0].utype.parse()?;
            let mut bset = BranchSet::new(bsid, utype, filters, ordinal);
            for (no, row) in rows.iter().enumerate() {
                let value = Uncertainty::from_json(utype, &row.uvalue)?;
                bset.add_branch(Branch::new(&row.branch, value, row.weight, bsid));
                smlt.branches.insert(row.branch.clone(), Step::Branch(ordinal, no));
                let key = keyno(ordinal, no).unwrap_or_else(|| row.branch.clone());
                smlt.shortener.insert(row.branch.clone(), key);
            }
            smlt.arena.push(bset);
        }

        let mut previous = if smlt.arena.bsets.is_empty() {
            Vec::new()
        } else {
            smlt.arena.steps(0)
        };
        for idx in 1..smlt.arena.bsets.len() {
            let apply_to = smlt.arena.bsets[idx].filters.apply_to_branches.clone();
            let before = smlt.arena.dummies.len();
            previous = smlt.arena.attach(&previous, idx, apply_to.as_deref());
            if smlt.arena.dummies.len() > before {
                smlt.arena.bsets[idx].applied = apply_to.map(|ids| ids.join(" "));
            }
        }
        Ok(smlt)
    }

    /// Single-branch tree over one source model file. The file is scanned
    /// for sources unless it is the fake placeholder.
    pub fn trivial(
        loader: Arc<dyn FileLoader>,
        source_model_file: &str,
        sampling_method: SamplingMethod,
        source_id: &str,
    ) -> Result<Self> {
        let mut bsetdict: IndexMap<String, BTreeMap<String, String>> = IndexMap::new();
        bsetdict.insert(
            "bs0".to_string(),
            BTreeMap::from([("uncertaintyType".to_string(), "sourceModel".to_string())]),
        );
        let table = BranchTable {
            rows: vec![BranchRecord {
                branchset: "bs0".to_string(),
                branch: "br0".to_string(),
                utype: UncertaintyType::SourceModel.as_str().to_string(),
                uvalue: Uncertainty::SourceModel(vec![source_model_file.to_string()]).to_json()?,
                weight: 1.0,
            }],
            attrs: SmltAttrs {
                bsetdict: serde_json::to_string(&bsetdict)?,
                seed: 0,
                num_samples: 0,
                sampling_method: sampling_method.as_str().to_string(),
                filename: source_model_file.to_string(),
                num_paths: "1".to_string(),
                is_source_specific: false,
                source_id: source_id.to_string(),
                branch_id: String::new(),
            },
        };
        let mut smlt = Self::from_records(&table)?.with_loader(loader);
        if source_model_file == FAKE_FILE {
            smlt.tectonic_region_types.insert("*".to_string());
        } else {
            let fname = Path::new(source_model_file)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| source_model_file.to_string());
            smlt.collect_source_model_data("br0", &fname)?;
        }
        smlt.info = Info {
            smpaths: vec![PathBuf::from(source_model_file)],
            ..Info::default()
        };
        Ok(smlt)
    }

    /// Placeholder tree used by scenario calculations
    pub fn fake() -> Result<Self> {
        Self::trivial(Arc::new(FsLoader), FAKE_FILE, SamplingMethod::EarlyWeights, "")
    }

    /// Restore `source_data` (and the tectonic region types) after
    /// [`SourceModelLogicTree::from_records`]
    pub fn set_source_data(&mut self, source_data: Vec<SourceRecord>) {
        self.tectonic_region_types = source_data.iter().map(|r| r.trt.clone()).collect();
        if self.filename == FAKE_FILE {
            self.tectonic_region_types.insert("*".to_string());
        }
        self.source_data = source_data;
    }

    /// Warn about sources defined under more than one branch, which need
    /// `applyToBranches` when targeted by a filter
    pub fn warn_duplicated_sources(&self) {
        let dupl = self.get_duplicated_sources();
        if !dupl.is_empty() {
            warn!(sources = dupl.len(), "Found sources defined in multiple source model branches");
        }
    }
}

impl fmt::Display for SourceModelLogicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arena.root() {
            Some(root) => write!(f, "<SourceModelLogicTree{root}>"),
            None => f.write_str("<SourceModelLogicTree<>>"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nrml::MemoryLoader;

    pub(crate) const SM1: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.5">
  <sourceModel name="sm1">
    <sourceGroup tectonicRegion="Active Shallow Crust">
      <pointSource id="src1" name="a"/>
      <areaSource id="src2" name="b"/>
    </sourceGroup>
  </sourceModel>
</nrml>
"#;

    pub(crate) const SM2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.5">
  <sourceModel name="sm2">
    <sourceGroup tectonicRegion="Active Shallow Crust">
      <pointSource id="src1" name="a"/>
    </sourceGroup>
    <sourceGroup tectonicRegion="Stable Continental Crust">
      <simpleFaultSource id="src3" name="c"/>
    </sourceGroup>
  </sourceModel>
</nrml>
"#;

    fn branch(id: &str, value: &str, weight: &str) -> String {
        format!(
            r#"<logicTreeBranch branchID="{id}"><uncertaintyModel>{value}</uncertaintyModel><uncertaintyWeight>{weight}</uncertaintyWeight></logicTreeBranch>"#
        )
    }

    fn bset(attrs: &str, branches: &[String]) -> String {
        format!("<logicTreeBranchSet {attrs}>{}</logicTreeBranchSet>", branches.concat())
    }

    fn tree(bsets: &[String]) -> String {
        format!(
            "<nrml xmlns=\"http://openquake.org/xmlns/nrml/0.5\">\n<logicTree logicTreeID=\"lt1\">\n{}\n</logicTree></nrml>",
            bsets.join("\n")
        )
    }

    fn root_bset() -> String {
        bset(
            r#"branchSetID="bs0" uncertaintyType="sourceModel""#,
            &[branch("b1", "sm1.xml", "0.6"), branch("b2", "sm2.xml", "0.4")],
        )
    }

    fn load(xml: &str) -> Result<SourceModelLogicTree> {
        let loader = MemoryLoader::new()
            .with_file("lt/smlt.xml", xml)
            .with_file("lt/sm1.xml", SM1)
            .with_file("lt/sm2.xml", SM2)
            .shared();
        SourceModelLogicTree::from_file(loader, "lt/smlt.xml", &LogicTreeConfig::default())
    }

    #[test]
    fn test_parse_two_levels() {
        let xml = tree(&[
            root_bset(),
            bset(
                r#"branchSetID="bs1" uncertaintyType="maxMagGRRelative" applyToTectonicRegionType="Active Shallow Crust""#,
                &[branch("c1", "+0.1", "0.5"), branch("c2", "-0.1", "0.5")],
            ),
        ]);
        let smlt = load(&xml).unwrap();
        assert_eq!(smlt.num_paths, 4);
        assert!(!smlt.is_source_specific);
        assert_eq!(smlt.bsetdict.len(), 2);
        assert_eq!(smlt.source_data.len(), 4);
        assert_eq!(smlt.shortener["c2"], "11");
        assert_eq!(smlt.info.smpaths.len(), 2);
        let rlzs = smlt.realizations();
        assert_eq!(rlzs.len(), 4);
        assert_eq!(rlzs[0].pid(), "b1~c1");
        assert!((rlzs[0].weight - 0.3).abs() < 1e-12);
        assert_eq!(rlzs[3].value, vec!["sm2.xml".to_string(), "-0.1".to_string()]);
        let total: f64 = rlzs.iter().map(|r| r.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_apply_to_branches_adds_dummies() {
        let xml = tree(&[
            root_bset(),
            bset(
                r#"branchSetID="bs1" uncertaintyType="bGRRelative" applyToBranches="b1" applyToSources="src2""#,
                &[branch("c1", "0.1", "0.5"), branch("c2", "-0.1", "0.5")],
            ),
        ]);
        let smlt = load(&xml).unwrap();
        assert_eq!(smlt.num_paths, 3);
        assert_eq!(smlt.arena.dummies.len(), 1);
        assert_eq!(smlt.arena.bsets[1].applied.as_deref(), Some("b1"));
        let paths: Vec<String> = smlt.realizations().iter().map(|r| r.pid()).collect();
        assert_eq!(paths, vec!["b1~c1", "b1~c2", "b2~."]);
        let values = smlt.bset_values(&["b1".to_string(), "c2".to_string()]);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0.id, "bs1");
        assert_eq!(values[0].1, &Uncertainty::Float(-0.1));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let xml = tree(&[bset(
            r#"branchSetID="bs0" uncertaintyType="sourceModel""#,
            &[branch("b1", "sm1.xml", "0.5"), branch("b2", "sm2.xml", "0.4")],
        )]);
        let err = load(&xml).unwrap_err();
        assert!(err.to_string().contains("branchset weights sum up to 0.9, not 1"), "{err}");
    }

    #[test]
    fn test_branch_ids_are_global() {
        let xml = tree(&[
            root_bset(),
            bset(
                r#"branchSetID="bs1" uncertaintyType="bGRRelative""#,
                &[branch("b1", "0.1", "1.0")],
            ),
        ]);
        let err = load(&xml).unwrap_err();
        assert!(err.to_string().contains("branchID 'b1' is not unique"));
    }

    #[test]
    fn test_first_branchset_must_be_source_model() {
        let xml = tree(&[bset(
            r#"branchSetID="bs0" uncertaintyType="bGRRelative""#,
            &[branch("b1", "0.1", "1.0")],
        )]);
        let err = load(&xml).unwrap_err();
        assert!(err.to_string().contains("first branchset must define an uncertainty"));
    }

    #[test]
    fn test_duplicated_branchset_id() {
        let xml = tree(&[
            root_bset(),
            bset(r#"branchSetID="bs0" uncertaintyType="bGRRelative""#, &[branch("c1", "0.1", "1.0")]),
        ]);
        let err = load(&xml).unwrap_err();
        assert!(matches!(err, LogicTreeError::DuplicatedId(_)));
    }

    #[test]
    fn test_filter_errors() {
        let cases = [
            (
                r#"branchSetID="bs1" uncertaintyType="bGRRelative" applyToSources="nope""#,
                "source with id 'nope' is not defined in source models",
            ),
            (
                r#"branchSetID="bs1" uncertaintyType="bGRRelative" applyToTectonicRegionType="Volcanic""#,
                "don't define sources of tectonic region type 'Volcanic'",
            ),
            (
                r#"branchSetID="bs1" uncertaintyType="bGRRelative" applyToSources="src1""#,
                "src1 belongs to multiple branches",
            ),
            (
                r#"branchSetID="bs1" uncertaintyType="maxMagGRAbsolute""#,
                "must define 'applyToSources' with only one source id",
            ),
            (
                r#"branchSetID="bs1" uncertaintyType="bGRRelative" applyToSources="src2" applyToTectonicRegionType="Active Shallow Crust""#,
                "only one filter is allowed per branchset",
            ),
        ];
        for (attrs, msg) in cases {
            let xml = tree(&[root_bset(), bset(attrs, &[branch("c1", "7.0", "1.0")])]);
            let err = load(&xml).unwrap_err();
            assert!(err.to_string().contains(msg), "{err} does not contain {msg}");
        }
    }

    #[test]
    fn test_duplicate_values() {
        let xml = tree(&[
            root_bset(),
            bset(
                r#"branchSetID="bs1" uncertaintyType="bGRRelative""#,
                &[branch("c1", "0.1", "0.5"), branch("c2", "0.1", "0.5")],
            ),
        ]);
        let err = load(&xml).unwrap_err();
        assert!(err.to_string().contains("there are duplicate values in uncertaintyModel: 0.1 0.1"));
    }

    #[test]
    fn test_reduce_to_source() {
        let xml = tree(&[
            root_bset(),
            bset(
                r#"branchSetID="bs1" uncertaintyType="maxMagGRAbsolute" applyToSources="src3""#,
                &[branch("c1", "7.0", "0.5"), branch("c2", "7.5", "0.5")],
            ),
        ]);
        let smlt = load(&xml).unwrap();
        assert!(smlt.is_source_specific);
        assert_eq!(smlt.num_paths, 4);
        let reduced = smlt.reduce("src2", None).unwrap();
        // the src3 branchset is ignored and b2 has no src2, so it is emptied
        assert_eq!(reduced.bsetdict.len(), 1);
        let root = reduced.root_branchset().unwrap();
        assert_eq!(root.len(), 2);
        assert!(root.branches[1].value.is_empty());
        assert_eq!(reduced.num_paths, 2);
    }

    #[test]
    fn test_duplicated_sources() {
        let smlt = load(&tree(&[root_bset()])).unwrap();
        let dupl = smlt.get_duplicated_sources();
        assert_eq!(dupl.len(), 1);
        assert_eq!(dupl["src1"], vec!["b1".to_string(), "b2".to_string()]);
    }

    #[test]
    fn test_sampling_early_weights() {
        let xml = tree(&[root_bset()]);
        let loader = MemoryLoader::new()
            .with_file("lt/smlt.xml", xml)
            .with_file("lt/sm1.xml", SM1)
            .with_file("lt/sm2.xml", SM2)
            .shared();
        let config = LogicTreeConfig::default().with_samples(10, SamplingMethod::EarlyWeights);
        let smlt = SourceModelLogicTree::from_file(loader, "lt/smlt.xml", &config).unwrap();
        let rlzs = smlt.realizations();
        assert_eq!(rlzs.len(), 10);
        assert!(rlzs.iter().all(|r| (r.weight - 0.1).abs() < 1e-12));
        assert!(rlzs.iter().all(|r| r.pid() == "b1" || r.pid() == "b2"));
        assert_eq!(smlt.get_num_paths(), 10);
    }

    #[test]
    fn test_to_node_and_trivial() {
        let smlt = load(&tree(&[root_bset()])).unwrap();
        let node = smlt.to_node();
        assert_eq!(node.nodes[0].get("branchSetID"), Some("bs00"));
        assert_eq!(node.nodes[0].nodes[1].nodes[0].text_trim(), "sm2.xml");
        let fake = SourceModelLogicTree::fake().unwrap();
        assert_eq!(fake.num_paths, 1);
        assert!(fake.tectonic_region_types.contains("*"));
        assert_eq!(fake.realizations()[0].pid(), "br0");
    }

    #[test]
    fn test_reduce_rejects_oversized_sample_count() {
        let xml = tree(&[root_bset()]);
        let smlt = load(&xml).unwrap();
        let err = smlt.reduce("src1", Some(u32::MAX as usize + 1)).unwrap_err();
        assert!(matches!(err, LogicTreeError::Value(_)), "{err}");
        assert!(err.to_string().contains("does not fit in 32 bits"));
        assert_eq!(smlt.reduce("src1", Some(5)).unwrap().num_samples, 5);
        let mut table = smlt.to_records().unwrap();
        table.attrs.num_samples = u64::MAX;
        assert!(SourceModelLogicTree::from_records(&table).is_err());
    }

    #[test]
    fn test_collect_paths() {
        let paths = vec!["0~A0".to_string(), "0~A1".to_string()];
        assert_eq!(collect_paths(&paths).unwrap(), "[0]~[A][01]");
        assert!(collect_paths(&["0~A".to_string(), "0~A1".to_string()]).is_err());
    }

    #[test]
    fn test_reduce_fnames() {
        let fnames = vec!["a/sm1.xml".to_string(), "a/sm2.xml".to_string()];
        assert_eq!(reduce_fnames(&fnames, "src1!sm2"), vec!["a/sm2.xml".to_string()]);
        assert_eq!(reduce_fnames(&fnames, "src1").len(), 2);
    }
}
