//! # Quake Logic Tree: Serialization
//!
//! Table of Contents:
//! 1. Records - Tabular forms of the trees
//! 2. Dataset - One stored table
//! 3. DataStore - Keyed datasets and the binary container
//! 4. FullLogicTree persistence
//!
//! Container format: MAGIC (4 bytes) + VERSION (u32 LE) + HASH (32 bytes,
//! blake3 of the compressed payload) + ZSTD(bincode(datasets)).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Oversampling;
use crate::error::{LogicTreeError, Result};
use crate::full::FullLogicTree;
use crate::gsim::{GsimLogicTree, GsimTable};
use crate::nrml::FileLoader;
use crate::packing::TrtSmr;
use crate::realization::{Realization, SmRealization};
use crate::source_model::{SourceModelLogicTree, SourceRecord};

// ─────────────────────────────────────────────
// 1. Records
// ─────────────────────────────────────────────

/// One branch of a source model logic tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// branchSetID
    pub branchset: String,
    /// branchID
    pub branch: String,
    /// Uncertainty type name
    pub utype: String,
    /// Canonical JSON of the payload
    pub uvalue: String,
    /// Weight
    pub weight: f64,
}

/// Attributes stored next to the branch rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmltAttrs {
    /// JSON of `branchSetID -> attributes`
    pub bsetdict: String,
    /// Sampling seed
    pub seed: u64,
    /// Number of samples
    pub num_samples: u64,
    /// Sampling method name
    pub sampling_method: String,
    /// Logic tree file
    pub filename: String,
    /// Path count, in decimal (it may not fit in 64 bits)
    pub num_paths: String,
    /// Source specific flag
    pub is_source_specific: bool,
    /// Source id reduction
    pub source_id: String,
    /// Branch id reduction
    pub branch_id: String,
}

/// Tabular form of a [`SourceModelLogicTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTable {
    /// Real branches in branchset order
    pub rows: Vec<BranchRecord>,
    /// Tree attributes
    pub attrs: SmltAttrs,
}

/// A source model realization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmRecord {
    /// Branch values joined by spaces
    pub name: String,
    /// Weight
    pub weight: f64,
    /// Branch ids joined by `~`
    pub path: String,
    /// Number of draws
    pub samples: u64,
}

impl SmRecord {
    /// Record of a source model realization
    pub fn from_rlz(rlz: &SmRealization) -> Self {
        Self {
            name: rlz.value.join(" "),
            weight: rlz.weight,
            path: rlz.pid(),
            samples: rlz.samples as u64,
        }
    }

    /// Realization with the given ordinal; the value is the stored name
    pub fn to_rlz(&self, ordinal: usize) -> SmRealization {
        let mut rlz = Realization::new(
            vec![self.name.clone()],
            self.weight,
            ordinal,
            self.path.split('~').map(str::to_string).collect(),
        );
        rlz.samples = self.samples as usize;
        rlz
    }
}

/// Attributes of a stored [`FullLogicTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullLtAttrs {
    /// Sampling seed
    pub seed: u64,
    /// Number of samples
    pub num_samples: u64,
    /// Tectonic region types in index order
    pub trts: Vec<String>,
    /// Oversampling policy name
    pub oversampling: String,
}

// ─────────────────────────────────────────────
// 2. Dataset
// ─────────────────────────────────────────────

/// A stored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dataset {
    /// Source model logic tree branches
    SourceModelLt(BranchTable),
    /// GSIM logic tree branches
    GsimLt(GsimTable),
    /// Sources per source model branch
    SourceData(Vec<SourceRecord>),
    /// Source model realizations
    SmData(Vec<SmRecord>),
    /// Full logic tree attributes
    FullLt(FullLtAttrs),
    /// Realization weights, one row per realization
    Weights(Vec<Vec<f64>>),
    /// Packed trt_smr tuples, one per source group
    TrtSmrs(Vec<Vec<u64>>),
}

impl Dataset {
    fn kind(&self) -> &'static str {
        match self {
            Self::SourceModelLt(_) => "source_model_lt",
            Self::GsimLt(_) => "gsim_lt",
            Self::SourceData(_) => "source_data",
            Self::SmData(_) => "sm_data",
            Self::FullLt(_) => "full_lt",
            Self::Weights(_) => "weights",
            Self::TrtSmrs(_) => "trt_smrs",
        }
    }
}

macro_rules! getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("The `", stringify!($variant), "` dataset stored under `key`")]
        pub fn $name(&self, key: &str) -> Result<&$ty> {
            match self.get(key)? {
                Dataset::$variant(value) => Ok(value),
                other => Err(LogicTreeError::storage(format!(
                    "{key}: expected {}, got {}",
                    stringify!($variant),
                    other.kind()
                ))),
            }
        }
    };
}

// ─────────────────────────────────────────────
// 3. DataStore
// ─────────────────────────────────────────────

/// Current container version
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes of the container
pub const MAGIC: &[u8; 4] = b"QLTS";

const HEADER_LEN: usize = 4 + 4 + 32;

/// Datasets addressed by slash-separated keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStore {
    datasets: BTreeMap<String, Dataset>,
}

impl DataStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a dataset, replacing any previous one
    pub fn put(&mut self, key: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(key.into(), dataset);
    }

    /// The dataset under `key`
    pub fn get(&self, key: &str) -> Result<&Dataset> {
        self.datasets
            .get(key)
            .ok_or_else(|| LogicTreeError::storage(format!("missing dataset {key}")))
    }

    /// True if `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.datasets.contains_key(key)
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.datasets.keys().map(String::as_str)
    }

    getter!(branch_table, SourceModelLt, BranchTable);
    getter!(gsim_table, GsimLt, GsimTable);
    getter!(source_data, SourceData, Vec<SourceRecord>);
    getter!(sm_data, SmData, Vec<SmRecord>);
    getter!(full_lt_attrs, FullLt, FullLtAttrs);
    getter!(weights, Weights, Vec<Vec<f64>>);
    getter!(trt_smrs, TrtSmrs, Vec<Vec<u64>>);

    /// Store the trt_smr tuples of the source groups under `trt_smrs`
    pub fn put_trt_smrs(&mut self, all_trt_smrs: &[Vec<TrtSmr>]) {
        let rows = all_trt_smrs
            .iter()
            .map(|group| group.iter().map(|t| t.0).collect())
            .collect();
        self.put("trt_smrs", Dataset::TrtSmrs(rows));
    }

    /// The stored trt_smr tuples
    pub fn get_trt_smrs(&self) -> Result<Vec<Vec<TrtSmr>>> {
        Ok(self
            .trt_smrs("trt_smrs")?
            .iter()
            .map(|group| group.iter().copied().map(TrtSmr).collect())
            .collect())
    }

    /// Encode as MAGIC + VERSION + HASH + ZSTD(bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let raw = bincode::serialize(&self.datasets)
            .map_err(|e| LogicTreeError::storage(format!("serialization failed: {e}")))?;
        let compressed = zstd::encode_all(raw.as_slice(), 3)
            .map_err(|e| LogicTreeError::storage(format!("compression failed: {e}")))?;
        let hash = blake3::hash(&compressed);
        let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(hash.as_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    /// Decode bytes produced by [`DataStore::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(LogicTreeError::storage("file too small to be a datastore"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(LogicTreeError::storage("invalid magic bytes"));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(LogicTreeError::storage(format!(
                "version mismatch: expected {FORMAT_VERSION}, found {version}"
            )));
        }
        let compressed = &bytes[HEADER_LEN..];
        if blake3::hash(compressed).as_bytes()[..] != bytes[8..HEADER_LEN] {
            return Err(LogicTreeError::storage("hash mismatch, the file may be corrupted"));
        }
        let raw = zstd::decode_all(compressed)
            .map_err(|e| LogicTreeError::storage(format!("decompression failed: {e}")))?;
        let datasets = bincode::deserialize(&raw)
            .map_err(|e| LogicTreeError::storage(format!("deserialization failed: {e}")))?;
        Ok(Self { datasets })
    }

    /// Write the container to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved datastore");
        Ok(())
    }

    /// Read a container file
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

// ─────────────────────────────────────────────
// 4. FullLogicTree persistence
// ─────────────────────────────────────────────

impl FullLogicTree {
    /// Store the trees, the source data, the source model realizations,
    /// the attributes and the weights under `full_lt/...` and `weights`
    pub fn to_datastore(&self, store: &mut DataStore) -> Result<()> {
        store.put("full_lt/source_model_lt", Dataset::SourceModelLt(self.source_model_lt.to_records()?));
        store.put("full_lt/gsim_lt", Dataset::GsimLt(self.gsim_lt.to_records()));
        store.put(
            "full_lt/source_data",
            Dataset::SourceData(self.source_model_lt.source_data.clone()),
        );
        store.put(
            "full_lt/sm_data",
            Dataset::SmData(self.sm_rlzs.iter().map(SmRecord::from_rlz).collect()),
        );
        store.put(
            "full_lt",
            Dataset::FullLt(FullLtAttrs {
                seed: self.seed(),
                num_samples: self.num_samples() as u64,
                trts: self.trts.clone(),
                oversampling: self.oversampling.as_str().to_string(),
            }),
        );
        store.put(
            "weights",
            Dataset::Weights(self.weights().iter().map(|w| w.0.clone()).collect()),
        );
        Ok(())
    }

    /// Rebuild a tree written by [`FullLogicTree::to_datastore`]; `loader`
    /// is kept for later reductions of the source model logic tree
    pub fn from_datastore(store: &DataStore, loader: Arc<dyn FileLoader>) -> Result<Self> {
        let attrs = store.full_lt_attrs("full_lt")?;
        let mut smlt = SourceModelLogicTree::from_records(store.branch_table("full_lt/source_model_lt")?)?
            .with_loader(loader);
        if store.contains("full_lt/source_data") {
            smlt.set_source_data(store.source_data("full_lt/source_data")?.clone());
        }
        let gsim_lt = GsimLogicTree::from_records(store.gsim_table("full_lt/gsim_lt")?)?;
        let sm_rlzs = store
            .sm_data("full_lt/sm_data")?
            .iter()
            .enumerate()
            .map(|(ordinal, rec)| rec.to_rlz(ordinal))
            .collect();
        let oversampling: Oversampling = attrs.oversampling.parse()?;
        FullLogicTree::assemble(smlt, gsim_lt, sm_rlzs, oversampling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DataStore {
        let mut ds = DataStore::new();
        ds.put("weights", Dataset::Weights(vec![vec![0.25, 0.75]]));
        ds.put_trt_smrs(&[vec![TrtSmr(0), TrtSmr(1 << 24)]]);
        ds
    }

    #[test]
    fn test_bytes_round_trip() {
        let ds = store();
        let bytes = ds.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"QLTS");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), FORMAT_VERSION);
        let back = DataStore::from_bytes(&bytes).unwrap();
        assert_eq!(back, ds);
        assert_eq!(back.get_trt_smrs().unwrap()[0][1].trti(), 1);
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["trt_smrs", "weights"]);
    }

    #[test]
    fn test_corruption_is_detected() {
        let mut bytes = store().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = DataStore::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("hash mismatch"));
        assert!(DataStore::from_bytes(b"QLTS").is_err());
        let mut wrong = store().to_bytes().unwrap();
        wrong[0] = b'X';
        assert!(DataStore::from_bytes(&wrong).unwrap_err().to_string().contains("magic"));
    }

    #[test]
    fn test_wrong_kind() {
        let ds = store();
        let err = ds.sm_data("weights").unwrap_err();
        assert!(err.to_string().contains("expected SmData, got weights"));
        assert!(ds.get("nope").is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calc.qlts");
        let ds = store();
        ds.save(&path).unwrap();
        assert_eq!(DataStore::load(&path).unwrap(), ds);
    }

    #[test]
    fn test_sm_record() {
        let mut rlz: SmRealization = Realization::new(
            vec!["a.xml".to_string(), "0.1".to_string()],
            0.5,
            3,
            vec!["b1".to_string(), "c1".to_string()],
        );
        rlz.samples = 4;
        let rec = SmRecord::from_rlz(&rlz);
        assert_eq!(rec.path, "b1~c1");
        let back = rec.to_rlz(0);
        assert_eq!(back.lt_path, rlz.lt_path);
        assert_eq!(back.samples, 4);
        assert_eq!(back.value, vec!["a.xml 0.1".to_string()]);
    }
}
