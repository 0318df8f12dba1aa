//! # Quake Logic Tree: Full Logic Tree
//!
//! Table of Contents:
//! 1. RealizationIndex - trt_smr -> gsim -> realization ordinals
//! 2. FullLogicTree - Build step combining the two trees
//! 3. Realizations - Enumeration, sampling and renormalization
//! 4. Lookups - Per source group queries
//! 5. Source routing - trt_smr tuples of sources
//!
//! A built tree is immutable and can be shared between threads; the
//! fan-out lookups over source groups run on rayon.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::branch::{shorten, SourceRef, PRECISION};
use crate::config::{LogicTreeConfig, Oversampling, SamplingMethod};
use crate::error::{LogicTreeError, Result};
use crate::gsim::{Gsim, GsimLogicTree};
use crate::nrml::FileLoader;
use crate::packing::{TrtRlz, TrtSmr, TWO24};
use crate::realization::{
    get_effective_rlzs, group_realizations, GsimRealization, LtRealization, Realization, SmRealization, Weight,
};
use crate::source_model::{SourceModelLogicTree, FAKE_FILE};

// ─────────────────────────────────────────────
// 1. RealizationIndex
// ─────────────────────────────────────────────

/// For every `(trti, smr)` pair the realizations using each gsim of the
/// tectonic region type, gsims sorted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealizationIndex {
    by_trt_smr: IndexMap<TrtSmr, BTreeMap<Gsim, Vec<u32>>>,
}

impl RealizationIndex {
    /// Index `rlzs` by source model realization and tectonic region type.
    /// Realizations are matched to `sm_rlzs` through their source model path.
    pub fn build(sm_rlzs: &[SmRealization], rlzs: &[LtRealization], num_trts: usize) -> Result<Self> {
        let smr_by_path: HashMap<String, usize> = sm_rlzs
            .iter()
            .enumerate()
            .map(|(i, sm)| (sm.pid(), i))
            .collect();
        let mut by_smr: Vec<Vec<&LtRealization>> = vec![Vec::new(); sm_rlzs.len()];
        for rlz in rlzs {
            let pid = rlz.sm_lt_path.join("~");
            let smr = *smr_by_path.get(&pid).ok_or_else(|| {
                LogicTreeError::value(format!("realization #{} has an unknown source model path {pid}", rlz.ordinal))
            })?;
            by_smr[smr].push(rlz);
        }
        let mut by_trt_smr = IndexMap::new();
        for (smr, group) in by_smr.iter().enumerate() {
            for trti in 0..num_trts {
                let mut by_gsim: BTreeMap<Gsim, Vec<u32>> = BTreeMap::new();
                for rlz in group {
                    if let Some(gsim) = rlz.gsim_rlz.value.get(trti) {
                        by_gsim.entry(gsim.clone()).or_default().push(rlz.ordinal as u32);
                    }
                }
                by_trt_smr.insert(TrtSmr::pack(trti, smr)?, by_gsim);
            }
        }
        Ok(Self { by_trt_smr })
    }

    /// gsim -> realizations for one trt_smr
    pub fn get(&self, trt_smr: TrtSmr) -> Option<&BTreeMap<Gsim, Vec<u32>>> {
        self.by_trt_smr.get(&trt_smr)
    }

    /// Number of indexed trt_smr values
    pub fn len(&self) -> usize {
        self.by_trt_smr.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.by_trt_smr.is_empty()
    }
}

// ─────────────────────────────────────────────
// 2. FullLogicTree
// ─────────────────────────────────────────────

/// One row of [`FullLogicTree::rlzs`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlzRow {
    /// Realization ordinal
    pub ordinal: usize,
    /// Shortened `sm path~gsim path`
    pub branch_path: String,
    /// Generic weight
    pub weight: f64,
}

/// The composition of a source model logic tree and a GSIM logic tree,
/// with its realizations computed once at build time
#[derive(Debug, Clone)]
pub struct FullLogicTree {
    /// Source model logic tree
    pub source_model_lt: SourceModelLogicTree,
    /// GSIM logic tree
    pub gsim_lt: GsimLogicTree,
    /// Oversampling policy
    pub oversampling: Oversampling,
    /// Source model realizations: effective ones when sampling
    pub sm_rlzs: Vec<SmRealization>,
    /// tectonic region type -> index
    pub trti: IndexMap<String, usize>,
    /// Tectonic region types in index order
    pub trts: Vec<String>,
    rlzs: Vec<LtRealization>,
    weights: Vec<Weight>,
    index: RealizationIndex,
    sd: HashMap<String, Vec<usize>>,
}

fn check_two24(what: &str, n: u128) -> Result<()> {
    if n > TWO24 as u128 {
        return Err(LogicTreeError::scale(format!(
            "too many {what}: {n} > {TWO24}"
        )));
    }
    Ok(())
}

impl FullLogicTree {
    /// Compute the source model realizations, the realizations and their
    /// index. Fails when the counts do not fit in [`TWO24`], before
    /// enumerating anything.
    pub fn build(
        source_model_lt: SourceModelLogicTree,
        gsim_lt: GsimLogicTree,
        oversampling: Oversampling,
    ) -> Result<Self> {
        let num_samples = source_model_lt.num_samples;
        let sm_rlzs = if num_samples > 0 {
            check_two24("realizations", num_samples as u128)?;
            get_effective_rlzs(&source_model_lt.realizations())
        } else {
            let samples = gsim_lt.get_num_paths();
            check_two24("source model realizations", source_model_lt.num_paths)?;
            check_two24("realizations", source_model_lt.num_paths.saturating_mul(samples as u128))?;
            source_model_lt
                .realizations()
                .into_iter()
                .map(|mut rlz| {
                    rlz.samples = samples;
                    rlz
                })
                .collect()
        };
        Self::assemble(source_model_lt, gsim_lt, sm_rlzs, oversampling)
    }

    /// Read both trees as named by `config` and build. Without a GSIM logic
    /// tree file the single `gsim` of the configuration is used.
    pub fn from_config(loader: Arc<dyn FileLoader>, config: &LogicTreeConfig) -> Result<Self> {
        let smlt_file = config
            .source_model_logic_tree_file
            .as_ref()
            .ok_or_else(|| LogicTreeError::config("missing source_model_logic_tree_file"))?;
        let smlt = SourceModelLogicTree::from_file(Arc::clone(&loader), smlt_file, config)?;
        let mut trts: Vec<String> = smlt.tectonic_region_types.iter().cloned().collect();
        if trts.is_empty() {
            // test mode: no source model was read
            trts.push("*".to_string());
        }
        let gsim_lt = match (&config.gsim_logic_tree_file, &config.gsim) {
            (Some(path), _) => GsimLogicTree::from_file(loader.as_ref(), path, &trts)?,
            (None, Some(gsim)) => GsimLogicTree::from_gsim(&gsim.parse()?)?,
            (None, None) => {
                return Err(LogicTreeError::config(
                    "either gsim_logic_tree_file or gsim must be given",
                ))
            }
        };
        Self::build(smlt, gsim_lt, config.oversampling)
    }

    /// Placeholder used by scenario calculations: the fake source model
    /// tree, one `scenario` source model realization and the given GSIM
    /// tree (a `[FromFile]` one by default)
    pub fn fake(gsim_lt: Option<GsimLogicTree>) -> Result<Self> {
        let gsim_lt = match gsim_lt {
            Some(lt) => lt,
            None => GsimLogicTree::from_gsim(&"[FromFile]".parse()?)?,
        };
        let fake_sm = Realization::new(vec!["scenario".to_string()], 1.0, 0, vec!["b1".to_string()]);
        let smlt = SourceModelLogicTree::fake()?;
        Self::assemble(smlt, gsim_lt, vec![fake_sm], Oversampling::Tolerate)
    }

    pub(crate) fn assemble(
        source_model_lt: SourceModelLogicTree,
        gsim_lt: GsimLogicTree,
        sm_rlzs: Vec<SmRealization>,
        oversampling: Oversampling,
    ) -> Result<Self> {
        check_two24("source model realizations", sm_rlzs.len() as u128)?;
        let trts = gsim_lt.trts();
        check_two24("tectonic region types", trts.len() as u128)?;
        let trti = trts.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        let mut sd: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, rec) in source_model_lt.source_data.iter().enumerate() {
            sd.entry(rec.source.clone()).or_default().push(i);
        }
        let mut full = Self {
            source_model_lt,
            gsim_lt,
            oversampling,
            sm_rlzs,
            trti,
            trts,
            rlzs: Vec::new(),
            weights: Vec::new(),
            index: RealizationIndex::default(),
            sd,
        };
        info!("Building {} realizations", full.get_num_paths());
        full.rlzs = full.compute_realizations();
        full.weights = full.rlzs.iter().map(|r| r.weight.clone()).collect();
        full.index = RealizationIndex::build(&full.sm_rlzs, &full.rlzs, full.trts.len())?;
        Ok(full)
    }

    /// Sampling seed of the source model logic tree
    pub fn seed(&self) -> u64 {
        self.source_model_lt.seed
    }

    /// Number of samples, 0 for full enumeration
    pub fn num_samples(&self) -> usize {
        self.source_model_lt.num_samples
    }

    /// Sampling method
    pub fn sampling_method(&self) -> SamplingMethod {
        self.source_model_lt.sampling_method
    }

    // ─────────────────────────────────────────────
    // 3. Realizations
    // ─────────────────────────────────────────────

    fn compute_realizations(&self) -> Vec<LtRealization> {
        let imts = self.gsim_lt.imts();
        let num_samples = self.num_samples();
        let mut rlzs: Vec<LtRealization> = if num_samples > 0 {
            let sm_draws: Vec<(Arc<[String]>, f64)> = self
                .sm_rlzs
                .iter()
                .flat_map(|sm| {
                    let path: Arc<[String]> = Arc::from(sm.lt_path.clone());
                    let per_draw = sm.weight / sm.samples.max(1) as f64;
                    std::iter::repeat((path, per_draw)).take(sm.samples)
                })
                .collect();
            let gsim_rlzs = self
                .gsim_lt
                .sample(num_samples, self.seed() + 1, self.sampling_method());
            let mut rlzs: Vec<LtRealization> = sm_draws
                .into_iter()
                .zip(gsim_rlzs)
                .enumerate()
                .map(|(ordinal, ((sm_lt_path, sm_weight), gsim_rlz))| LtRealization {
                    ordinal,
                    sm_lt_path,
                    weight: &gsim_rlz.weight.to_weight(&imts) * sm_weight,
                    gsim_rlz: Arc::new(gsim_rlz),
                })
                .collect();
            if self.sampling_method().is_early() {
                for rlz in &mut rlzs {
                    rlz.weight.fill(1.0 / num_samples as f64);
                }
            }
            if self.oversampling == Oversampling::ReduceRlzs {
                let before = rlzs.len();
                rlzs = group_realizations(rlzs);
                if rlzs.len() < before {
                    warn!(before, after = rlzs.len(), "Reduced oversampled realizations");
                }
            }
            rlzs
        } else {
            let gsim_rlzs: Vec<Arc<GsimRealization>> =
                self.gsim_lt.realizations().into_iter().map(Arc::new).collect();
            let mut rlzs = Vec::with_capacity(self.sm_rlzs.len() * gsim_rlzs.len());
            for sm in &self.sm_rlzs {
                let path: Arc<[String]> = Arc::from(sm.lt_path.clone());
                for gsim_rlz in &gsim_rlzs {
                    rlzs.push(LtRealization {
                        ordinal: rlzs.len(),
                        sm_lt_path: Arc::clone(&path),
                        gsim_rlz: Arc::clone(gsim_rlz),
                        weight: &gsim_rlz.weight.to_weight(&imts) * sm.weight,
                    });
                }
            }
            rlzs
        };
        let total: f64 = rlzs.iter().map(|r| r.weight.total()).sum();
        if total != 1.0 && total > 0.0 {
            if (total - 1.0).abs() > PRECISION {
                warn!(total, "Realization weights do not sum up to 1, rescaling");
            } else {
                debug!(total, "Rescaling realization weights");
            }
            for rlz in &mut rlzs {
                rlz.weight = &rlz.weight / total;
            }
        }
        rlzs
    }

    /// The realizations, computed at build time
    pub fn get_realizations(&self) -> &[LtRealization] {
        &self.rlzs
    }

    /// Weight matrix, one row per realization: IMT weights then generic
    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }

    /// The `(trti, smr)` index
    pub fn index(&self) -> &RealizationIndex {
        &self.index
    }

    /// Number of samples, or number of realizations under full enumeration
    pub fn get_num_paths(&self) -> usize {
        match self.num_samples() {
            0 => self.sm_rlzs.len() * self.gsim_lt.get_num_paths(),
            n => n,
        }
    }

    /// Number of realizations of a full enumeration
    pub fn get_num_potential_paths(&self) -> u128 {
        (self.gsim_lt.get_num_paths() as u128).saturating_mul(self.source_model_lt.num_paths)
    }

    /// One column of the weights: the generic one when sampling
    pub fn wget(&self, imt: &str) -> Vec<f64> {
        if self.num_samples() > 0 {
            self.weights.iter().map(Weight::total).collect()
        } else {
            self.gsim_lt.wget(&self.weights, imt)
        }
    }

    /// `(ordinal, shortened path, generic weight)` for every realization
    pub fn rlzs(&self) -> Vec<RlzRow> {
        self.rlzs
            .iter()
            .map(|r| RlzRow {
                ordinal: r.ordinal,
                branch_path: format!(
                    "{}~{}",
                    shorten(&r.sm_lt_path, &self.source_model_lt.shortener),
                    shorten(r.gsim_lt_path(), &self.gsim_lt.shortener)
                ),
                weight: r.weight.total(),
            })
            .collect()
    }

    /// tectonic region type -> gsim of a realization
    pub fn gsim_by_trt(&self, rlz: &LtRealization) -> IndexMap<String, Gsim> {
        self.trts
            .iter()
            .cloned()
            .zip(rlz.gsim_rlz.value.iter().cloned())
            .collect()
    }

    // ─────────────────────────────────────────────
    // 4. Lookups
    // ─────────────────────────────────────────────

    /// gsim -> realizations for one trt_smr
    pub fn get_rlzs_by_gsim(&self, trt_smr: TrtSmr) -> Result<&BTreeMap<Gsim, Vec<u32>>> {
        self.index
            .get(trt_smr)
            .ok_or_else(|| LogicTreeError::value(format!("unknown trt_smr {trt_smr}")))
    }

    /// gsim -> realizations for several trt_smr values, concatenated
    pub fn get_rlzs_by_gsim_many(&self, trt_smrs: &[TrtSmr]) -> Result<BTreeMap<Gsim, Vec<u32>>> {
        let mut out: BTreeMap<Gsim, Vec<u32>> = BTreeMap::new();
        for &trt_smr in trt_smrs {
            for (gsim, rlzs) in self.get_rlzs_by_gsim(trt_smr)? {
                out.entry(gsim.clone()).or_default().extend_from_slice(rlzs);
            }
        }
        Ok(out)
    }

    fn group_trti(trt_smrs: &[TrtSmr]) -> Result<usize> {
        trt_smrs
            .first()
            .map(|t| t.trti())
            .ok_or_else(|| LogicTreeError::value("empty trt_smr tuple"))
    }

    /// One array of packed `(trti, rlz)` per gsim of every source group
    pub fn get_trt_rlzs(&self, all_trt_smrs: &[Vec<TrtSmr>]) -> Result<Vec<Vec<TrtRlz>>> {
        let per_group: Vec<Vec<Vec<TrtRlz>>> = all_trt_smrs
            .par_iter()
            .map(|trt_smrs| -> Result<Vec<Vec<TrtRlz>>> {
                let trti = Self::group_trti(trt_smrs)?;
                self.get_rlzs_by_gsim_many(trt_smrs)?
                    .values()
                    .map(|rlzs| {
                        rlzs.iter()
                            .map(|&r| TrtRlz::pack(trti, r as usize))
                            .collect::<Result<Vec<TrtRlz>>>()
                    })
                    .collect()
            })
            .collect::<Result<_>>()?;
        Ok(per_group.into_iter().flatten().collect())
    }

    /// Summed realization weights per gsim of every source group
    pub fn g_weights(&self, all_trt_smrs: &[Vec<TrtSmr>]) -> Result<Vec<Weight>> {
        let ncols = self.weights.first().map_or(1, Weight::len);
        let per_group: Vec<Vec<Weight>> = all_trt_smrs
            .par_iter()
            .map(|trt_smrs| -> Result<Vec<Weight>> {
                let by_gsim = self.get_rlzs_by_gsim_many(trt_smrs)?;
                Ok(by_gsim
                    .values()
                    .map(|rlzs| {
                        rlzs.iter().fold(Weight::filled(0.0, ncols), |acc, &r| {
                            acc.add(&self.weights[r as usize])
                        })
                    })
                    .collect())
            })
            .collect::<Result<_>>()?;
        Ok(per_group.into_iter().flatten().collect())
    }

    /// Total number of gsims over the source groups
    pub fn gfull(&self, all_trt_smrs: &[Vec<TrtSmr>]) -> Result<usize> {
        all_trt_smrs.iter().try_fold(0, |acc, trt_smrs| {
            let trti = Self::group_trti(trt_smrs)?;
            let trt = self.trt_by(TrtSmr::pack(trti, 0)?)?;
            Ok(acc + self.gsim_lt.values.get(trt).map_or(0, Vec::len))
        })
    }

    /// Consecutive ranges of gsim indices, one per source group
    pub fn get_gids(&self, all_trt_smrs: &[Vec<TrtSmr>]) -> Result<Vec<Range<usize>>> {
        let mut start = 0;
        let mut gids = Vec::with_capacity(all_trt_smrs.len());
        for trt_smrs in all_trt_smrs {
            let n = self.get_rlzs_by_gsim_many(trt_smrs)?.len();
            gids.push(start..start + n);
            start += n;
        }
        Ok(gids)
    }

    /// Tectonic region type of a trt_smr
    pub fn trt_by(&self, trt_smr: TrtSmr) -> Result<&str> {
        if self.trts.len() == 1 {
            return Ok(&self.trts[0]);
        }
        self.trts
            .get(trt_smr.trti())
            .map(String::as_str)
            .ok_or_else(|| LogicTreeError::value(format!("no tectonic region type for trt_smr {trt_smr}")))
    }

    // ─────────────────────────────────────────────
    // 5. Source routing
    // ─────────────────────────────────────────────

    fn is_fake(&self) -> bool {
        self.source_model_lt.filename == FAKE_FILE && self.source_model_lt.source_data.is_empty()
    }

    fn smrs_with_branches(&self, trti: usize, brids: &HashSet<&str>) -> Result<Vec<TrtSmr>> {
        self.sm_rlzs
            .iter()
            .filter(|sm| sm.lt_path.iter().any(|b| brids.contains(b.as_str())))
            .map(|sm| TrtSmr::pack(trti, sm.ordinal))
            .collect()
    }

    fn trti_of(&self, trt: &str) -> Result<usize> {
        if trt == "*" || (self.trti.len() == 1 && self.trti.contains_key("*")) {
            return Ok(0);
        }
        self.trti
            .get(trt)
            .copied()
            .ok_or_else(|| LogicTreeError::value(format!("unknown tectonic region type '{trt}'")))
    }

    fn records_of(&self, src_id: &str) -> Result<&[usize]> {
        self.sd
            .get(src_id)
            .map(Vec::as_slice)
            .ok_or_else(|| LogicTreeError::value(format!("source {src_id} is not in the source model data")))
    }

    /// The trt_smr values of a source, or of every source model
    /// realization and tectonic region type when `src_id` is `None`
    pub fn get_trt_smrs(&self, src_id: Option<&str>) -> Result<Vec<TrtSmr>> {
        if self.is_fake() {
            return Ok(vec![TrtSmr(0)]);
        }
        let Some(src_id) = src_id else {
            let mut out = Vec::with_capacity(self.sm_rlzs.len() * self.trti.len());
            for sm in &self.sm_rlzs {
                for &trti in self.trti.values() {
                    out.push(TrtSmr::pack(trti, sm.ordinal)?);
                }
            }
            return Ok(out);
        };
        let records = self.records_of(src_id)?;
        let data = &self.source_model_lt.source_data;
        let first = records
            .first()
            .and_then(|&i| data.get(i))
            .ok_or_else(|| LogicTreeError::value(format!("source {src_id} has no source model data")))?;
        let trti = self.trti_of(&first.trt)?;
        let brids: HashSet<&str> = records.iter().map(|&i| data[i].branch.as_str()).collect();
        self.smrs_with_branches(trti, &brids)
    }

    /// Set on every source the trt_smr values of the realizations it
    /// impacts. With `source_id` only sources with that base id are kept.
    /// The source model realization comes from `smr`, from a `;smr` suffix
    /// of the id, or from the branches the source belongs to.
    pub fn set_trt_smr(
        &self,
        srcs: Vec<SourceRef>,
        source_id: Option<&str>,
        smr: Option<usize>,
    ) -> Result<Vec<SourceRef>> {
        if self.trti.is_empty() {
            return Ok(srcs);
        }
        let data = &self.source_model_lt.source_data;
        let mut out = Vec::with_capacity(srcs.len());
        for mut src in srcs {
            let corename = src.corename().to_string();
            if source_id.is_some_and(|id| id != corename) {
                continue;
            }
            let trti = self.trti_of(&src.tectonic_region_type)?;
            let smr = match smr {
                Some(smr) => Some(smr),
                None => suffix_smr(&src.source_id)?,
            };
            src.trt_smr = match smr {
                Some(smr) => vec![TrtSmr::pack(trti, smr)?],
                None => {
                    let base = corename.split('@').next().unwrap_or_default();
                    let (base, fname) = match base.rsplit_once('!') {
                        Some((base, fname)) => (base, Some(fname)),
                        None => (base, None),
                    };
                    let brids: HashSet<&str> = self
                        .records_of(base)?
                        .iter()
                        .map(|&i| &data[i])
                        .filter(|rec| fname.map_or(true, |f| rec.fname.contains(f)))
                        .map(|rec| rec.branch.as_str())
                        .collect();
                    self.smrs_with_branches(trti, &brids)?
                }
            };
            out.push(src);
        }
        Ok(out)
    }

    /// Route the sources of every group, dropping the groups left empty
    /// by the source id reduction of the source model logic tree
    pub fn reduce_groups(&self, groups: Vec<Vec<SourceRef>>) -> Result<Vec<Vec<SourceRef>>> {
        let source_id = Some(self.source_model_lt.source_id.as_str()).filter(|s| !s.is_empty());
        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let routed = self.set_trt_smr(group, source_id, None)?;
            if !routed.is_empty() {
                out.push(routed);
            }
        }
        Ok(out)
    }
}

/// `src1;3.0` gives 3
fn suffix_smr(source_id: &str) -> Result<Option<usize>> {
    let Some((_, suffix)) = source_id.split_once(';') else {
        return Ok(None);
    };
    let smr = suffix.split('.').next().unwrap_or_default();
    smr.parse()
        .map(Some)
        .map_err(|_| LogicTreeError::value(format!("invalid realization suffix in {source_id}")))
}

impl fmt::Display for FullLogicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<FullLogicTree")?;
        let mut seen = HashSet::new();
        for sm in &self.sm_rlzs {
            if seen.insert(sm.pid()) {
                writeln!(f, "{}, {}, weight={}", sm.pid(), sm.value.join(" "), sm.weight)?;
            }
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn gsim_lt(branches: &[(&str, &str, &str)]) -> GsimLogicTree {
        let bset = Node::new("logicTreeBranchSet")
            .with_attr("branchSetID", "bs1")
            .with_attr("uncertaintyType", "gmpeModel")
            .with_attr("applyToTectonicRegionType", "Active Shallow Crust")
            .with_nodes(branches.iter().map(|(id, gsim, w)| {
                Node::new("logicTreeBranch")
                    .with_attr("branchID", *id)
                    .with_node(Node::new("uncertaintyModel").with_text(*gsim))
                    .with_node(Node::new("uncertaintyWeight").with_text(*w))
            }));
        let lt = Node::new("logicTree").with_node(bset);
        GsimLogicTree::from_node("gmpe.xml", &lt, &["Active Shallow Crust".to_string()]).unwrap()
    }

    fn fake_full() -> FullLogicTree {
        let gl = gsim_lt(&[("g1", "SadighEtAl1997", "0.9"), ("g2", "ToroEtAl2002", "0.1")]);
        FullLogicTree::fake(Some(gl)).unwrap()
    }

    #[test]
    fn test_fake_enumeration() {
        let full = fake_full();
        assert_eq!(full.get_num_paths(), 2);
        let rlzs = full.get_realizations();
        assert_eq!(rlzs.len(), 2);
        assert_eq!(rlzs[0].weight.0, vec![0.9]);
        assert_eq!(rlzs[1].pid(), "b1~g2");
        assert_eq!(full.get_trt_smrs(None).unwrap(), vec![TrtSmr(0)]);
        let by_gsim = full.get_rlzs_by_gsim(TrtSmr(0)).unwrap();
        let sadigh: Gsim = "SadighEtAl1997".parse().unwrap();
        assert_eq!(by_gsim[&sadigh], vec![0]);
        assert!(full.get_rlzs_by_gsim(TrtSmr(1)).is_err());
    }

    #[test]
    fn test_group_lookups() {
        let full = fake_full();
        let groups = vec![vec![TrtSmr(0)], vec![TrtSmr(0)]];
        assert_eq!(full.gfull(&groups).unwrap(), 4);
        assert_eq!(full.get_gids(&groups).unwrap(), vec![0..2, 2..4]);
        let trt_rlzs = full.get_trt_rlzs(&groups).unwrap();
        assert_eq!(trt_rlzs.len(), 4);
        assert_eq!(trt_rlzs[1][0].rlz(), 1);
        let ws = full.g_weights(&groups).unwrap();
        assert!((ws[0].total() - 0.9).abs() < 1e-12);
        assert_eq!(full.trt_by(TrtSmr(0)).unwrap(), "Active Shallow Crust");
    }

    #[test]
    fn test_rlzs_table() {
        let full = fake_full();
        let rows = full.rlzs();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].branch_path, "A~0");
        assert_eq!(rows[1].branch_path, "A~1");
        assert!((rows[1].weight - 0.1).abs() < 1e-12);
        let by_trt = full.gsim_by_trt(&full.get_realizations()[1]);
        assert_eq!(by_trt["Active Shallow Crust"].to_string(), "[ToroEtAl2002]");
    }

    #[test]
    fn test_suffix_smr() {
        assert_eq!(suffix_smr("src1;3.0").unwrap(), Some(3));
        assert_eq!(suffix_smr("src1").unwrap(), None);
        assert!(suffix_smr("src1;x").is_err());
    }

    #[test]
    fn test_two24_guard() {
        assert!(check_two24("realizations", TWO24 as u128).is_ok());
        let err = check_two24("realizations", TWO24 as u128 + 1).unwrap_err();
        assert!(matches!(err, LogicTreeError::Scale(_)));
        assert!(check_two24("tectonic region types", TWO24 as u128 + 1).is_err());
        assert!(TrtSmr::pack(TWO24 as usize, 0).is_err());
    }
}
