//! # Quake Logic Tree: GSIM Logic Tree
//!
//! Table of Contents:
//! 1. Gsim - Ground motion model reference (name or TOML table)
//! 2. ImtWeight - Generic weight plus per-IMT weights
//! 3. GsimBranch - One branch of the tree
//! 4. GsimLogicTree - Parsing and validation
//! 5. Realizations - Full enumeration and sampling
//! 6. Reduction and collapsing
//! 7. Records - Tabular form

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::branch::{branchset_nodes, PRECISION};
use crate::config::SamplingMethod;
use crate::error::{LogicTreeError, NodeContext, Result};
use crate::node::Node;
use crate::nrml::{read_logic_tree, FileLoader};
use crate::realization::{GsimRealization, Realization, Weight};
use crate::sampling::{pick, random, Weighted};

lazy_static! {
    static ref GSIM_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

// ─────────────────────────────────────────────
// 1. Gsim
// ─────────────────────────────────────────────

/// A ground motion model reference.
///
/// Written either as a bare class name (`BooreAtkinson2008`, optionally
/// followed by `()`) or as a TOML table carrying keyword arguments:
///
/// ```text
/// [AbrahamsonEtAl2014]
/// region = "JPN"
/// ```
///
/// Two GSIMs are equal when their canonical TOML text is equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gsim {
    name: String,
    kwargs: toml::Table,
    repr: String,
}

impl Gsim {
    /// Build a GSIM from its class name and keyword arguments
    pub fn with_kwargs(name: impl Into<String>, kwargs: toml::Table) -> Result<Self> {
        let name = name.into();
        if !GSIM_NAME.is_match(&name) {
            return Err(LogicTreeError::value(format!("Unknown GSIM: {name}")));
        }
        let repr = if kwargs.is_empty() {
            format!("[{name}]")
        } else {
            let mut outer = toml::Table::new();
            outer.insert(name.clone(), toml::Value::Table(kwargs.clone()));
            toml::to_string(&outer)
                .map_err(|e| LogicTreeError::value(format!("cannot serialize {name}: {e}")))?
                .trim()
                .to_string()
        };
        Ok(Self { name, kwargs, repr })
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keyword arguments
    pub fn kwargs(&self) -> &toml::Table {
        &self.kwargs
    }

    /// Canonical TOML text
    pub fn repr(&self) -> &str {
        &self.repr
    }
}

impl FromStr for Gsim {
    type Err = LogicTreeError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.starts_with('[') {
            let table: toml::Table = toml::from_str(text)
                .map_err(|e| LogicTreeError::value(format!("Invalid GSIM {text}: {e}")))?;
            let mut entries = table.into_iter();
            match (entries.next(), entries.next()) {
                (Some((name, toml::Value::Table(kwargs))), None) => Self::with_kwargs(name, kwargs),
                _ => Err(LogicTreeError::value(format!(
                    "Invalid GSIM {text}: expected a single table"
                ))),
            }
        } else {
            let name = text.strip_suffix("()").unwrap_or(text);
            Self::with_kwargs(name, toml::Table::new())
        }
    }
}

impl TryFrom<String> for Gsim {
    type Error = LogicTreeError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Gsim> for String {
    fn from(gsim: Gsim) -> String {
        gsim.repr
    }
}

impl fmt::Display for Gsim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl PartialEq for Gsim {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for Gsim {}

impl Hash for Gsim {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

impl PartialOrd for Gsim {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Gsim {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.repr.cmp(&other.repr)
    }
}

// ─────────────────────────────────────────────
// 2. ImtWeight
// ─────────────────────────────────────────────

/// Key of the generic weight
pub const GENERIC: &str = "weight";

/// A composite weight: the generic `weight` plus optional weights for
/// specific intensity measure types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImtWeight {
    dic: BTreeMap<String, f64>,
}

impl ImtWeight {
    /// A weight without IMT-specific entries
    pub fn scalar(weight: f64) -> Self {
        Self {
            dic: BTreeMap::from([(GENERIC.to_string(), weight)]),
        }
    }

    /// Build from `(name, value)` pairs; a missing generic weight is 0
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, f64)>) -> Self {
        let mut dic: BTreeMap<String, f64> = pairs.into_iter().collect();
        dic.entry(GENERIC.to_string()).or_insert(0.0);
        Self { dic }
    }

    /// Read the `uncertaintyWeight` children of a branch node
    pub fn from_branch(branch: &Node, filename: &str) -> Result<Self> {
        let nodes: Vec<&Node> = branch.children("uncertaintyWeight").collect();
        let first = nodes.first().copied().ok_or_else(|| {
            LogicTreeError::logic(branch, filename, "missing uncertaintyWeight node")
        })?;
        if first.get("imt").is_some() {
            return Err::<Self, _>(LogicTreeError::invalid_gsim_lt(
                "The first uncertaintyWeight has an imt attribute",
            ))
            .node_context(filename, first);
        }
        let mut dic = BTreeMap::new();
        dic.insert(GENERIC.to_string(), parse_weight(first).node_context(filename, first)?);
        for node in &nodes[1..] {
            let imt = node.attr("imt").node_context(filename, node)?;
            let weight = parse_weight(node).node_context(filename, node)?;
            if dic.insert(imt.to_string(), weight).is_some() {
                return Err::<Self, _>(LogicTreeError::invalid_gsim_lt(
                    "There are duplicated IMTs in the weights",
                ))
                .node_context(filename, node);
            }
        }
        Ok(Self { dic })
    }

    /// The weight for `imt`, falling back to the generic weight
    pub fn get(&self, imt: &str) -> f64 {
        self.dic
            .get(imt)
            .or_else(|| self.dic.get(GENERIC))
            .copied()
            .unwrap_or(0.0)
    }

    /// The generic weight
    pub fn generic(&self) -> f64 {
        self.get(GENERIC)
    }

    /// Names of the weights, `weight` included, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.dic.keys().map(String::as_str)
    }

    /// True when there are IMT-specific entries
    pub fn is_composite(&self) -> bool {
        self.dic.len() > 1
    }

    /// All non-zero entries equal 1 within [`PRECISION`]
    pub fn is_one(&self) -> bool {
        self.dic
            .values()
            .filter(|v| **v != 0.0)
            .all(|v| (v - 1.0).abs() < PRECISION)
    }

    /// Product over the union of the names
    pub fn mul(&self, other: &ImtWeight) -> ImtWeight {
        let names: Vec<&String> = self.dic.keys().chain(other.dic.keys()).collect();
        let dic = names
            .into_iter()
            .map(|k| (k.clone(), self.get(k) * other.get(k)))
            .collect();
        ImtWeight { dic }
    }

    /// Sum over the names of `self`
    pub fn add(&self, other: &ImtWeight) -> ImtWeight {
        let dic = self
            .dic
            .iter()
            .map(|(k, v)| (k.clone(), v + other.get(k)))
            .collect();
        ImtWeight { dic }
    }

    /// Multiply every entry by a scalar
    pub fn scale(&self, factor: f64) -> ImtWeight {
        let dic = self.dic.iter().map(|(k, v)| (k.clone(), v * factor)).collect();
        ImtWeight { dic }
    }

    /// The weight vector `[w(imt) for imt in imts] + [generic]`
    pub fn to_weight(&self, imts: &[String]) -> Weight {
        let mut ws: Vec<f64> = imts.iter().map(|imt| self.get(imt)).collect();
        ws.push(self.generic());
        Weight(ws)
    }
}

fn parse_weight(node: &Node) -> Result<f64> {
    let text = node.text_trim();
    text.parse::<f64>()
        .map_err(|_| LogicTreeError::value(format!("could not convert '{text}' to float")))
}

// ─────────────────────────────────────────────
// 3. GsimBranch
// ─────────────────────────────────────────────

/// A branch of the GSIM logic tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsimBranch {
    /// Tectonic region type of the branchset
    pub trt: String,
    /// Branch id
    pub id: String,
    /// The model
    pub gsim: Gsim,
    /// Weight, possibly per IMT
    pub weight: ImtWeight,
    /// False for branches of tectonic region types without sources
    pub effective: bool,
}

impl Weighted for GsimBranch {
    fn sampling_weight(&self) -> f64 {
        self.weight.generic()
    }
}

// ─────────────────────────────────────────────
// 4. GsimLogicTree
// ─────────────────────────────────────────────

/// Ground-motion logic tree: one `gmpeModel` branchset per tectonic
/// region type.
#[derive(Debug, Clone, PartialEq)]
pub struct GsimLogicTree {
    /// File the tree was read from
    pub filename: String,
    /// tectonic region type -> gsims, in branchset order
    pub values: IndexMap<String, Vec<Gsim>>,
    /// Branches sorted by `(trt, id)`
    pub branches: Vec<GsimBranch>,
    /// tectonic region type -> branchSetID
    pub bsetdict: IndexMap<String, String>,
    /// branch id -> one-char key
    pub shortener: IndexMap<String, String>,
}

/// Short key of the `no`-th effective gsim branch
pub(crate) fn gsim_keyno(branch_id: &str, no: usize) -> String {
    crate::branch::BASE183
        .get(no)
        .map_or_else(|| branch_id.to_string(), char::to_string)
}

impl GsimLogicTree {
    /// Read and validate a GSIM logic tree file.
    ///
    /// `trts` are the tectonic region types of the source models; `["*"]`
    /// keeps every branchset.
    pub fn from_file(loader: &dyn FileLoader, path: &Path, trts: &[String]) -> Result<Self> {
        let node = read_logic_tree(loader, path)?;
        Self::from_node(&path.to_string_lossy(), &node, trts)
    }

    /// Build the tree from an already parsed `logicTree` node
    pub fn from_node(filename: &str, lt_node: &Node, trts: &[String]) -> Result<Self> {
        let mut trts: Vec<String> = trts.to_vec();
        trts.sort();
        let distinct: HashSet<&String> = trts.iter().collect();
        if distinct.len() < trts.len() {
            return Err(LogicTreeError::value(format!(
                "The given tectonic region types are not distinct: {}",
                trts.join(",")
            )));
        }
        let mut tree = Self {
            filename: filename.to_string(),
            values: IndexMap::new(),
            branches: Vec::new(),
            bsetdict: IndexMap::new(),
            shortener: IndexMap::new(),
        };
        tree.build_trts_branches(lt_node, &trts)?;
        let any = trts.len() == 1 && trts[0] == "*";
        if !any {
            let mut values = IndexMap::new();
            for trt in &trts {
                match tree.values.get(trt) {
                    Some(gsims) if !gsims.is_empty() => {
                        values.insert(trt.clone(), gsims.clone());
                    }
                    _ => {
                        return Err(LogicTreeError::invalid_gsim_lt(format!(
                            "{filename} is missing the TRT '{trt}'"
                        )))
                    }
                }
            }
            tree.values = values;
        }
        if !trts.is_empty() && tree.branches.is_empty() {
            return Err(LogicTreeError::invalid_gsim_lt(format!(
                "{trts:?} is missing in {filename}"
            )));
        }
        debug!(filename, trts = tree.values.len(), branches = tree.branches.len(), "Parsed gsim logic tree");
        Ok(tree)
    }

    /// Trivial tree with a single branch `b1` applied to every region
    pub fn from_gsim(gsim: &Gsim) -> Result<Self> {
        let branch = Node::new("logicTreeBranch")
            .with_attr("branchID", "b1")
            .with_node(Node::new("uncertaintyModel").with_text(gsim.to_string()))
            .with_node(Node::new("uncertaintyWeight").with_text("1.0"));
        let lt = Node::new("logicTree").with_attr("logicTreeID", "lt1").with_node(
            Node::new("logicTreeBranchSet")
                .with_attr("applyToTectonicRegionType", "*")
                .with_attr("branchSetID", "bs1")
                .with_attr("uncertaintyType", "gmpeModel")
                .with_node(branch),
        );
        Self::from_node(&format!("fake/{}", gsim.name()), &lt, &["*".to_string()])
    }

    fn build_trts_branches(&mut self, lt_node: &Node, trts: &[String]) -> Result<()> {
        let filename = self.filename.clone();
        let any = trts.len() == 1 && trts[0] == "*";
        let mut seen_trts: Vec<String> = Vec::new();
        let mut bsids: HashSet<String> = HashSet::new();
        let mut no = 0;
        for level in &lt_node.nodes {
            for bset in branchset_nodes(&filename, level)? {
                if bset.get("uncertaintyType") != Some("gmpeModel") {
                    return Err(LogicTreeError::invalid_gsim_lt(format!(
                        "{filename}: only uncertainties of type \"gmpeModel\" are allowed in gmpe logic tree"
                    )));
                }
                let bsid = bset.attr("branchSetID")?.to_string();
                if !bsids.insert(bsid.clone()) {
                    return Err(LogicTreeError::invalid_gsim_lt(format!(
                        "{filename}: Duplicated branchSetID {bsid}"
                    )));
                }
                let trt = bset.get("applyToTectonicRegionType").unwrap_or("*").to_string();
                self.bsetdict.insert(trt.clone(), bsid.clone());
                seen_trts.push(trt.clone());
                let effective = any || trts.contains(&trt);
                let mut total: Option<ImtWeight> = None;
                let mut branch_ids: HashSet<String> = HashSet::new();
                let mut duplicated_ids = false;
                for branch in &bset.nodes {
                    let weight = ImtWeight::from_branch(branch, &filename)?;
                    total = Some(match total {
                        Some(tot) => tot.add(&weight),
                        None => weight.clone(),
                    });
                    let branch_id = branch.attr("branchID")?.to_string();
                    duplicated_ids |= !branch_ids.insert(branch_id.clone());
                    let model = branch.require("uncertaintyModel")?;
                    let gsim: Gsim = model
                        .text_trim()
                        .parse()
                        .map_err(|e| LogicTreeError::value(format!("{e} in file {filename}")))?;
                    let gsims = self.values.entry(trt.clone()).or_default();
                    if gsims.contains(&gsim) {
                        return Err(LogicTreeError::invalid_gsim_lt(format!(
                            "{filename}: duplicated gsim {gsim}"
                        )));
                    }
                    gsims.push(gsim.clone());
                    if effective {
                        self.shortener.insert(branch_id.clone(), gsim_keyno(&branch_id, no));
                        no += 1;
                        self.branches.push(GsimBranch {
                            trt: trt.clone(),
                            id: branch_id,
                            gsim,
                            weight,
                            effective,
                        });
                    }
                }
                if let Some(tot) = total {
                    if !tot.is_one() {
                        return Err(LogicTreeError::invalid_gsim_lt(format!(
                            "{filename}: the weights of branchset {bsid} sum up to {:?}, not 1",
                            tot.dic
                        )));
                    }
                }
                if duplicated_ids {
                    return Err(LogicTreeError::invalid_gsim_lt(format!(
                        "There where duplicated branchIDs in {filename}"
                    )));
                }
            }
        }
        let distinct: HashSet<&String> = seen_trts.iter().collect();
        if distinct.len() < seen_trts.len() {
            return Err(LogicTreeError::invalid_gsim_lt(format!(
                "{filename}: Found duplicated applyToTectonicRegionType={seen_trts:?}"
            )));
        }
        self.branches
            .sort_by(|a, b| (&a.trt, &a.id).cmp(&(&b.trt, &b.id)));
        Ok(())
    }

    /// The tectonic region types, in the order of `values`
    pub fn trts(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// IMTs with a specific weight, sorted
    pub fn imts(&self) -> Vec<String> {
        let mut imts: Vec<String> = self
            .branches
            .iter()
            .flat_map(|b| b.weight.names())
            .filter(|name| *name != GENERIC)
            .map(str::to_string)
            .collect();
        imts.sort();
        imts.dedup();
        imts
    }

    /// Sorted gsims of a tectonic region type; `*` stands for the only one
    pub fn get_gsims(&self, trt: &str) -> Result<Vec<Gsim>> {
        let trt = if trt == "*" {
            match self.values.len() {
                1 => self.values.keys().next().map(String::as_str).unwrap_or("*"),
                n => {
                    return Err(LogicTreeError::value(format!(
                        "cannot use '*' with {n} tectonic region types"
                    )))
                }
            }
        } else {
            trt
        };
        let mut gsims = self
            .values
            .get(trt)
            .cloned()
            .ok_or_else(|| LogicTreeError::value(format!("unknown tectonic region type '{trt}'")))?;
        gsims.sort();
        Ok(gsims)
    }

    /// Number of effective branches per tectonic region type
    pub fn get_num_branches(&self) -> IndexMap<String, usize> {
        let mut num: IndexMap<String, usize> = IndexMap::new();
        for branch in &self.branches {
            *num.entry(branch.trt.clone()).or_default() += usize::from(branch.effective);
        }
        num
    }

    /// Effective number of paths: product of the non-zero branch counts
    pub fn get_num_paths(&self) -> usize {
        let num = self.get_num_branches();
        if num.values().sum::<usize>() == 0 {
            return 0;
        }
        num.values()
            .filter(|n| **n > 0)
            .fold(1usize, |acc, n| acc.saturating_mul(*n))
    }

    /// Pick one column of a weight matrix: the IMT-specific one if any,
    /// otherwise the generic (last) one
    pub fn wget(&self, weights: &[Weight], imt: &str) -> Vec<f64> {
        let imts = self.imts();
        match imts.iter().position(|i| i == imt) {
            Some(idx) => weights.iter().map(|w| w[idx]).collect(),
            None => weights.iter().map(Weight::total).collect(),
        }
    }

    fn groups(&self) -> Vec<Vec<&GsimBranch>> {
        self.values
            .keys()
            .map(|trt| self.branches.iter().filter(|b| &b.trt == trt).collect())
            .collect()
    }

    // ─────────────────────────────────────────────
    // 5. Realizations
    // ─────────────────────────────────────────────

    fn realization(branches: &[&GsimBranch], ordinal: usize) -> GsimRealization {
        let mut weight = ImtWeight::scalar(1.0);
        let mut value = Vec::with_capacity(branches.len());
        let mut lt_path = Vec::with_capacity(branches.len());
        for branch in branches {
            weight = weight.mul(&branch.weight);
            value.push(branch.gsim.clone());
            lt_path.push(if branch.effective {
                branch.id.clone()
            } else {
                "@".to_string()
            });
        }
        Realization::new(value, weight, ordinal, lt_path)
    }

    /// Every realization: the cartesian product of the branches of each
    /// tectonic region type, `@` marking non-effective branches
    pub fn realizations(&self) -> Vec<GsimRealization> {
        let groups = self.groups();
        if groups.iter().any(Vec::is_empty) {
            return Vec::new();
        }
        let total: usize = groups.iter().map(Vec::len).product();
        let mut out = Vec::with_capacity(total);
        let mut idx = vec![0usize; groups.len()];
        for ordinal in 0..total {
            let chosen: Vec<&GsimBranch> = groups.iter().zip(&idx).map(|(g, &i)| g[i]).collect();
            out.push(Self::realization(&chosen, ordinal));
            // odometer, last group fastest
            for pos in (0..idx.len()).rev() {
                idx[pos] += 1;
                if idx[pos] < groups[pos].len() {
                    break;
                }
                idx[pos] = 0;
            }
        }
        out
    }

    /// Draw `n` realizations, one random column per tectonic region type
    pub fn sample(&self, n: usize, seed: u64, method: SamplingMethod) -> Vec<GsimRealization> {
        let groups = self.groups();
        let probs = random(n, groups.len(), seed, method);
        probs
            .rows()
            .enumerate()
            .map(|(i, row)| {
                let chosen: Vec<&GsimBranch> = groups
                    .iter()
                    .zip(row)
                    .map(|(group, &p)| group[pick(group, p, method)])
                    .collect();
                Self::realization(&chosen, i)
            })
            .collect()
    }

    /// tectonic region type -> gsim -> ordinals of the realizations using it
    pub fn get_rlzs_by_gsim_trt(&self) -> IndexMap<String, IndexMap<Gsim, Vec<usize>>> {
        let rlzs = self.realizations();
        self.values
            .iter()
            .enumerate()
            .map(|(i, (trt, gsims))| {
                let by_gsim = gsims
                    .iter()
                    .map(|gsim| {
                        let ordinals = rlzs
                            .iter()
                            .filter(|r| &r.value[i] == gsim)
                            .map(|r| r.ordinal)
                            .collect();
                        (gsim.clone(), ordinals)
                    })
                    .collect();
                (trt.clone(), by_gsim)
            })
            .collect()
    }

    // ─────────────────────────────────────────────
    // 6. Reduction and collapsing
    // ─────────────────────────────────────────────

    /// Mark as effective only the branches of the given regions
    pub fn reduce(&self, trts: &[String]) -> Self {
        let mut new = self.clone();
        if !(trts.len() == 1 && trts[0] == "*") {
            for branch in &mut new.branches {
                branch.effective = trts.contains(&branch.trt);
            }
        }
        new
    }

    /// Replace the branches of the listed branchsets with a single
    /// `AvgGMPE` averaging them with their generic weights
    pub fn collapse(&self, branchset_ids: &[String]) -> Result<Self> {
        let mut new = self.clone();
        new.branches.clear();
        let mut start = 0;
        while start < self.branches.len() {
            let trt = &self.branches[start].trt;
            let end = self.branches[start..]
                .iter()
                .position(|b| &b.trt != trt)
                .map_or(self.branches.len(), |p| start + p);
            let group = &self.branches[start..end];
            let bs_id = self.bsetdict.get(trt).cloned().unwrap_or_default();
            if group.len() > 1 && branchset_ids.contains(&bs_id) {
                let mut kwargs = toml::Table::new();
                let mut weight: Option<ImtWeight> = None;
                for br in group {
                    let mut kw = br.gsim.kwargs().clone();
                    kw.insert(GENERIC.to_string(), toml::Value::Float(br.weight.generic()));
                    let mut inner = toml::Table::new();
                    inner.insert(br.gsim.name().to_string(), toml::Value::Table(kw));
                    kwargs.insert(br.id.clone(), toml::Value::Table(inner));
                    weight = Some(match weight {
                        Some(w) => w.add(&br.weight),
                        None => br.weight.clone(),
                    });
                }
                let gsim = Gsim::with_kwargs("AvgGMPE", kwargs)?;
                new.values.insert(trt.clone(), vec![gsim.clone()]);
                new.branches.push(GsimBranch {
                    trt: trt.clone(),
                    id: bs_id,
                    gsim,
                    weight: weight.unwrap_or_else(|| ImtWeight::scalar(1.0)),
                    effective: true,
                });
            } else {
                new.branches.extend(group.iter().cloned());
            }
            start = end;
        }
        Ok(new)
    }

    // ─────────────────────────────────────────────
    // 7. Records
    // ─────────────────────────────────────────────

    /// Tabular form; only effective branches are stored
    pub fn to_records(&self) -> GsimTable {
        let mut names: Vec<String> = self
            .branches
            .iter()
            .flat_map(|b| b.weight.names())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        let rows = self
            .branches
            .iter()
            .filter(|b| b.effective)
            .map(|b| GsimRecord {
                trt: b.trt.clone(),
                branch: b.id.clone(),
                uncertainty: b.gsim.to_string(),
                weights: names.iter().map(|n| b.weight.get(n)).collect(),
            })
            .collect();
        GsimTable {
            weight_names: names,
            rows,
            bsetdict: self.bsetdict.clone(),
            filename: self.filename.clone(),
        }
    }

    /// Inverse of [`GsimLogicTree::to_records`]
    pub fn from_records(table: &GsimTable) -> Result<Self> {
        let mut tree = Self {
            filename: table.filename.clone(),
            values: IndexMap::new(),
            branches: Vec::with_capacity(table.rows.len()),
            bsetdict: table.bsetdict.clone(),
            shortener: IndexMap::new(),
        };
        for (no, row) in table.rows.iter().enumerate() {
            if row.weights.len() != table.weight_names.len() {
                return Err(LogicTreeError::storage(format!(
                    "gsim record {} has {} weights, expected {}",
                    row.branch,
                    row.weights.len(),
                    table.weight_names.len()
                )));
            }
            let gsim: Gsim = row.uncertainty.parse()?;
            tree.values.entry(row.trt.clone()).or_default().push(gsim.clone());
            let weight = ImtWeight::from_pairs(
                table.weight_names.iter().cloned().zip(row.weights.iter().copied()),
            );
            tree.shortener.insert(row.branch.clone(), gsim_keyno(&row.branch, no));
            tree.branches.push(GsimBranch {
                trt: row.trt.clone(),
                id: row.branch.clone(),
                gsim,
                weight,
                effective: true,
            });
        }
        Ok(tree)
    }
}

impl fmt::Display for GsimLogicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<GsimLogicTree")?;
        for b in self.branches.iter().filter(|b| b.effective) {
            writeln!(f, "{},{},{},w={}", b.trt, b.id, b.gsim, b.weight.generic())?;
        }
        f.write_str(">")
    }
}

/// One row of the GSIM branch table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsimRecord {
    /// Tectonic region type
    pub trt: String,
    /// Branch id
    pub branch: String,
    /// Canonical GSIM text
    pub uncertainty: String,
    /// One value per entry of [`GsimTable::weight_names`]
    pub weights: Vec<f64>,
}

/// Tabular form of a [`GsimLogicTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsimTable {
    /// Sorted weight column names, `weight` included
    pub weight_names: Vec<String>,
    /// Effective branches
    pub rows: Vec<GsimRecord>,
    /// tectonic region type -> branchSetID
    pub bsetdict: IndexMap<String, String>,
    /// Source file
    pub filename: String,
}
