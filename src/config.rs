//! # Quake Logic Tree: Configuration
//!
//! Table of Contents:
//! 1. SamplingMethod - How realizations are drawn
//! 2. Oversampling - What to do with duplicated draws
//! 3. LogicTreeConfig - Job parameters read from TOML
//! 4. init_logging - tracing subscriber setup

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{LogicTreeError, Result};

// ─────────────────────────────────────────────
// 1. SamplingMethod
// ─────────────────────────────────────────────

/// Sampling method used when `number_of_logic_tree_samples > 0`.
///
/// Early methods draw branches proportionally to their weights and give
/// every draw the weight `1/N`; late methods draw branches uniformly and
/// keep the product of the branch weights. The latin variants stratify the
/// random numbers (Latin Hypercube).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    /// Weighted draws, uniform posterior weights
    #[default]
    EarlyWeights,
    /// Uniform draws, branch-product weights
    LateWeights,
    /// Weighted stratified draws
    EarlyLatin,
    /// Uniform stratified draws
    LateLatin,
}

impl SamplingMethod {
    /// All methods, in declaration order
    pub const ALL: [SamplingMethod; 4] = [
        SamplingMethod::EarlyWeights,
        SamplingMethod::LateWeights,
        SamplingMethod::EarlyLatin,
        SamplingMethod::LateLatin,
    ];

    /// True for `early_weights` and `early_latin`
    pub fn is_early(self) -> bool {
        matches!(self, Self::EarlyWeights | Self::EarlyLatin)
    }

    /// True for `early_latin` and `late_latin`
    pub fn is_latin(self) -> bool {
        matches!(self, Self::EarlyLatin | Self::LateLatin)
    }

    /// The snake-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarlyWeights => "early_weights",
            Self::LateWeights => "late_weights",
            Self::EarlyLatin => "early_latin",
            Self::LateLatin => "late_latin",
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingMethod {
    type Err = LogicTreeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| LogicTreeError::config(format!("unknown sampling_method '{s}'")))
    }
}

// ─────────────────────────────────────────────
// 2. Oversampling
// ─────────────────────────────────────────────

/// Policy for realizations sharing the same source-model and gsim path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Oversampling {
    /// Keep every draw as its own realization
    #[default]
    Tolerate,
    /// Collapse duplicated paths into one realization
    ReduceRlzs,
}

impl Oversampling {
    /// The kebab-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tolerate => "tolerate",
            Self::ReduceRlzs => "reduce-rlzs",
        }
    }
}

impl fmt::Display for Oversampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Oversampling {
    type Err = LogicTreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tolerate" => Ok(Self::Tolerate),
            "reduce-rlzs" => Ok(Self::ReduceRlzs),
            other => Err(LogicTreeError::config(format!("unknown oversampling '{other}'"))),
        }
    }
}

// ─────────────────────────────────────────────
// 3. LogicTreeConfig
// ─────────────────────────────────────────────

fn default_seed() -> u64 {
    42
}

/// Logic-tree related job parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicTreeConfig {
    /// Random seed for the sampling
    pub seed: u64,
    /// Number of samples; 0 means full enumeration
    pub number_of_logic_tree_samples: u32,
    /// Sampling method
    pub sampling_method: SamplingMethod,
    /// Oversampling policy
    pub oversampling: Oversampling,
    /// Do not read the referenced source model files
    pub test_mode: bool,
    /// Keep only the source model branch with this id (empty: all)
    pub branch_id: String,
    /// Restrict the tree to this source id (empty: all)
    pub source_id: String,
    /// Source model logic tree file
    pub source_model_logic_tree_file: Option<PathBuf>,
    /// GSIM logic tree file
    pub gsim_logic_tree_file: Option<PathBuf>,
    /// Single GSIM used when there is no GSIM logic tree file
    pub gsim: Option<String>,
}

impl Default for LogicTreeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            number_of_logic_tree_samples: 0,
            sampling_method: SamplingMethod::default(),
            oversampling: Oversampling::default(),
            test_mode: false,
            branch_id: String::new(),
            source_id: String::new(),
            source_model_logic_tree_file: None,
            gsim_logic_tree_file: None,
            gsim: None,
        }
    }
}

impl LogicTreeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file; relative logic-tree paths are resolved against the
    /// directory of the file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for file in [
            &mut config.source_model_logic_tree_file,
            &mut config.gsim_logic_tree_file,
        ]
        .into_iter()
        .flatten()
        {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        Ok(config)
    }

    /// Builder-style seed override
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder-style sampling override
    pub fn with_samples(mut self, num_samples: u32, method: SamplingMethod) -> Self {
        self.number_of_logic_tree_samples = num_samples;
        self.sampling_method = method;
        self
    }

    /// Builder-style test mode
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

// ─────────────────────────────────────────────
// 4. init_logging
// ─────────────────────────────────────────────

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default
/// `info`). Calling it twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_method_names() {
        for method in SamplingMethod::ALL {
            assert_eq!(method.as_str().parse::<SamplingMethod>().unwrap(), method);
        }
        assert!("random".parse::<SamplingMethod>().is_err());
        assert!(SamplingMethod::EarlyLatin.is_early());
        assert!(SamplingMethod::LateLatin.is_latin());
        assert!(!SamplingMethod::LateWeights.is_early());
    }

    #[test]
    fn test_config_from_toml() {
        let config = LogicTreeConfig::from_toml_str(
            r#"
            seed = 23
            number_of_logic_tree_samples = 10
            sampling_method = "late_latin"
            oversampling = "reduce-rlzs"
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, 23);
        assert_eq!(config.number_of_logic_tree_samples, 10);
        assert_eq!(config.sampling_method, SamplingMethod::LateLatin);
        assert_eq!(config.oversampling, Oversampling::ReduceRlzs);
        assert!(!config.test_mode);
    }

    #[test]
    fn test_config_defaults() {
        let config = LogicTreeConfig::from_toml_str("").unwrap();
        assert_eq!(config, LogicTreeConfig::default());
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_config_from_file_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        std::fs::write(
            &path,
            "source_model_logic_tree_file = \"ssmLT.xml\"\ngsim_logic_tree_file = \"/abs/gmmLT.xml\"\n",
        )
        .unwrap();
        let config = LogicTreeConfig::from_file(&path).unwrap();
        assert_eq!(
            config.source_model_logic_tree_file.unwrap(),
            dir.path().join("ssmLT.xml")
        );
        assert_eq!(config.gsim_logic_tree_file.unwrap(), PathBuf::from("/abs/gmmLT.xml"));
    }

    #[test]
    fn test_bad_oversampling() {
        let err = LogicTreeConfig::from_toml_str("oversampling = \"drop\"").unwrap_err();
        assert!(matches!(err, LogicTreeError::Config(_)));
    }
}
