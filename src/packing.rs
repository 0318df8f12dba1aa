//! # Quake Logic Tree: Packed Identifiers
//!
//! Table of Contents:
//! 1. TWO24 - Width of the index field
//! 2. TrtSmr - (tectonic region index, source model realization) pair
//! 3. TrtRlz - (tectonic region index, realization) pair
//!
//! Both pack as `trti * 2^24 + idx` into a `u64`, so the pair can be sorted
//! and stored as a single integer column.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LogicTreeError, Result};

// ─────────────────────────────────────────────
// 1. TWO24
// ─────────────────────────────────────────────

/// Exclusive upper bound of the packed index
pub const TWO24: u64 = 1 << 24;

fn check(what: &str, idx: u64) -> Result<()> {
    if idx >= TWO24 {
        return Err(LogicTreeError::scale(format!(
            "{what} {idx} does not fit in 24 bits (limit {TWO24})"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────
// 2. TrtSmr
// ─────────────────────────────────────────────

/// Packed `trti * TWO24 + smr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrtSmr(pub u64);

impl TrtSmr {
    /// Pack, failing when `trti` or `smr` is not below `TWO24`
    pub fn pack(trti: usize, smr: usize) -> Result<Self> {
        check("tectonic region type", trti as u64)?;
        check("source model realization", smr as u64)?;
        Ok(Self(trti as u64 * TWO24 + smr as u64))
    }

    /// Index of the tectonic region type
    pub fn trti(self) -> usize {
        (self.0 / TWO24) as usize
    }

    /// Source model realization
    pub fn smr(self) -> usize {
        (self.0 % TWO24) as usize
    }
}

impl fmt::Display for TrtSmr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────
// 3. TrtRlz
// ─────────────────────────────────────────────

/// Packed `trti * TWO24 + rlz`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrtRlz(pub u64);

impl TrtRlz {
    /// Pack, failing when `trti` or `rlz` is not below `TWO24`
    pub fn pack(trti: usize, rlz: usize) -> Result<Self> {
        check("tectonic region type", trti as u64)?;
        check("realization", rlz as u64)?;
        Ok(Self(trti as u64 * TWO24 + rlz as u64))
    }

    /// Index of the tectonic region type
    pub fn trti(self) -> usize {
        (self.0 / TWO24) as usize
    }

    /// Realization ordinal
    pub fn rlz(self) -> usize {
        (self.0 % TWO24) as usize
    }
}

impl fmt::Display for TrtRlz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
