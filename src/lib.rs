//! # Quake Logic Tree
//!
//! Logic-tree realization engine for probabilistic seismic hazard analysis.
//! It reads the source model and ground motion logic trees of a calculation,
//! enumerates or samples their branches and produces a deduplicated,
//! weighted set of realizations with packed `trt_smr` identifiers.
//!
//! ## Features
//!
//! - **Source model logic tree**: parsing, validation, `applyToBranches`
//!   with dummy steps, source and branch reductions
//! - **GSIM logic tree**: per tectonic region type models with IMT weights
//! - **Sampling**: early/late weights, uniform or Latin hypercube
//! - **Source specific trees**: per-source decomposition and path counting
//! - **Full logic tree**: realizations, weights and the trt_smr index
//! - **Persistence**: tabular records and a compressed binary container
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use quake_logictree::prelude::*;
//!
//! fn main() -> quake_logictree::Result<()> {
//!     let config = LogicTreeConfig::from_file(Path::new("job.toml"))?;
//!     let full = FullLogicTree::from_config(Arc::new(FsLoader), &config)?;
//!     for rlz in full.get_realizations() {
//!         println!("{} {:?}", rlz.pid(), rlz.weight.0);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod branch;
pub mod config;
pub mod error;
pub mod full;
pub mod gsim;
pub mod node;
pub mod nrml;
pub mod packing;
pub mod realization;
pub mod sampling;
pub mod serialize;
pub mod source_model;
pub mod source_specific;
pub mod uncertainty;

// Re-exports for ergonomic API
pub use branch::{Branch, BranchSet, SourceRef};
pub use config::{init_logging, LogicTreeConfig, Oversampling, SamplingMethod};
pub use error::{LogicTreeError, Result};
pub use full::{FullLogicTree, RealizationIndex};
pub use gsim::{Gsim, GsimLogicTree, ImtWeight};
pub use nrml::{FileLoader, FsLoader, MemoryLoader};
pub use packing::{TrtRlz, TrtSmr, TWO24};
pub use realization::{LtRealization, Realization, SmRealization, Weight};
pub use serialize::{DataStore, Dataset};
pub use source_model::SourceModelLogicTree;
pub use source_specific::SourceLogicTree;
pub use uncertainty::{Uncertainty, UncertaintyType};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LogicTreeConfig, Oversampling, SamplingMethod};
    pub use crate::error::Result;
    pub use crate::full::FullLogicTree;
    pub use crate::gsim::GsimLogicTree;
    pub use crate::nrml::{FileLoader, FsLoader, MemoryLoader};
    pub use crate::packing::TrtSmr;
    pub use crate::source_model::SourceModelLogicTree;
}
