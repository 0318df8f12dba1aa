//! # Quake Logic Tree: Sampling
//!
//! Table of Contents:
//! 1. Probabilities - (samples x columns) matrix of random numbers in 0..1
//! 2. random - Uniform or Latin Hypercube random numbers from a seed
//! 3. Weighted / sample - Pick objects with early or late weighting
//! 4. random_sample - Sample paths through a list of flat branchsets

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::config::SamplingMethod;

// ─────────────────────────────────────────────
// 1. Probabilities
// ─────────────────────────────────────────────

/// Row-major matrix of random numbers, one row per sample and one column
/// per branchset (or per tectonic region type).
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Probabilities {
    /// Number of samples
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn num_cols(&self) -> usize {
        self.cols
    }

    /// Random numbers of one sample
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Random numbers of one column
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.data[i * self.cols + j]).collect()
    }

    /// Iterate over the samples
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }
}

// ─────────────────────────────────────────────
// 2. random
// ─────────────────────────────────────────────

/// Generate `num_samples x num_cols` numbers in `[0, 1)` from `seed`.
///
/// For the latin methods every column is stratified: the i-th value
/// becomes `(rank + x) / num_samples` where `rank` is taken from the
/// argsort of the column, so each of the `num_samples` strata of `[0, 1)`
/// receives exactly one value.
pub fn random(num_samples: usize, num_cols: usize, seed: u64, method: SamplingMethod) -> Probabilities {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data: Vec<f64> = (0..num_samples * num_cols).map(|_| rng.gen::<f64>()).collect();
    if method.is_latin() && num_samples > 0 {
        let s = num_samples as f64;
        for j in 0..num_cols {
            let col: Vec<f64> = (0..num_samples).map(|i| data[i * num_cols + j]).collect();
            let mut order: Vec<usize> = (0..num_samples).collect();
            order.sort_by(|&a, &b| col[a].total_cmp(&col[b]));
            for (i, x) in col.iter().enumerate() {
                data[i * num_cols + j] = (order[i] as f64 + x) / s;
            }
        }
    }
    Probabilities {
        rows: num_samples,
        cols: num_cols,
        data,
    }
}

// ─────────────────────────────────────────────
// 3. Weighted / sample
// ─────────────────────────────────────────────

/// Anything with a scalar sampling weight.
pub trait Weighted {
    /// The weight used to build the cumulative distribution
    fn sampling_weight(&self) -> f64;
}

impl<T: Weighted + ?Sized> Weighted for &T {
    fn sampling_weight(&self) -> f64 {
        (**self).sampling_weight()
    }
}

impl Weighted for f64 {
    fn sampling_weight(&self) -> f64 {
        *self
    }
}

impl<T> Weighted for (T, f64) {
    fn sampling_weight(&self) -> f64 {
        self.1
    }
}

/// Index chosen by the random number `p` among `weights`.
///
/// Early methods search `p` in the cumulative weights, late methods in
/// `n - 1` equally spaced bin edges. The result is clamped to the last
/// index.
pub fn pick<T: Weighted>(objects: &[T], p: f64, method: SamplingMethod) -> usize {
    let n = objects.len();
    if n == 0 {
        return 0;
    }
    let idx = if method.is_early() {
        let mut acc = 0.0;
        let mut idx = n;
        for (i, obj) in objects.iter().enumerate() {
            acc += obj.sampling_weight();
            if acc >= p {
                idx = i;
                break;
            }
        }
        idx
    } else {
        (1..n).take_while(|&k| (k as f64) / (n as f64) < p).count()
    };
    idx.min(n - 1)
}

/// Take one object per random number.
pub fn sample<'a, T: Weighted>(objects: &'a [T], probabilities: &[f64], method: SamplingMethod) -> Vec<&'a T> {
    probabilities
        .iter()
        .map(|&p| &objects[pick(objects, p, method)])
        .collect()
}

// ─────────────────────────────────────────────
// 4. random_sample
// ─────────────────────────────────────────────

/// Sample `num_samples` paths through independent branchsets given as
/// `(id, weight)` pairs; each path is the concatenation of the chosen ids.
pub fn random_sample(
    branchsets: &[Vec<(String, f64)>],
    num_samples: usize,
    seed: u64,
    method: SamplingMethod,
) -> Vec<String> {
    let probs = random(num_samples, branchsets.len(), seed, method);
    probs
        .rows()
        .map(|row| {
            branchsets
                .iter()
                .zip(row)
                .map(|(bset, &p)| bset[pick(bset, p, method)].0.as_str())
                .collect::<String>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_random_is_reproducible() {
        let a = random(5, 3, 42, SamplingMethod::EarlyWeights);
        let b = random(5, 3, 42, SamplingMethod::EarlyWeights);
        let c = random(5, 3, 43, SamplingMethod::EarlyWeights);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.num_rows(), 5);
        assert_eq!(a.num_cols(), 3);
        assert!(a.rows().flatten().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn test_latin_one_value_per_stratum() {
        let n = 20;
        let probs = random(n, 2, 7, SamplingMethod::LateLatin);
        for j in 0..2 {
            let mut strata: Vec<usize> = probs.column(j).iter().map(|x| (x * n as f64) as usize).collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_pick_early_uses_cdf() {
        let weights = [0.2, 0.3, 0.5];
        assert_eq!(pick(&weights, 0.1, SamplingMethod::EarlyWeights), 0);
        assert_eq!(pick(&weights, 0.2, SamplingMethod::EarlyWeights), 0);
        assert_eq!(pick(&weights, 0.25, SamplingMethod::EarlyWeights), 1);
        assert_eq!(pick(&weights, 0.99, SamplingMethod::EarlyWeights), 2);
    }

    #[test]
    fn test_pick_late_is_uniform() {
        let weights = [0.9, 0.05, 0.05];
        assert_eq!(pick(&weights, 0.2, SamplingMethod::LateWeights), 0);
        assert_eq!(pick(&weights, 0.5, SamplingMethod::LateWeights), 1);
        assert_eq!(pick(&weights, 0.9, SamplingMethod::LateWeights), 2);
    }

    #[test]
    fn test_pick_clamps() {
        let weights = [0.5, 0.4999999];
        assert_eq!(pick(&weights, 0.9999999999, SamplingMethod::EarlyWeights), 1);
    }

    #[test]
    fn test_random_sample_early_follows_weights() {
        let bsets = vec![
            vec![("X".to_string(), 0.4), ("Y".to_string(), 0.6)],
            vec![("A".to_string(), 0.2), ("B".to_string(), 0.3), ("C".to_string(), 0.5)],
        ];
        let paths = random_sample(&bsets, 1000, 42, SamplingMethod::EarlyLatin);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for path in &paths {
            *counts.entry(path.as_str()).or_default() += 1;
        }
        assert_eq!(paths.len(), 1000);
        let y: usize = counts.iter().filter(|(k, _)| k.starts_with('Y')).map(|(_, v)| v).sum();
        // latin stratification makes the marginal exact
        assert_eq!(y, 600);
        let c: usize = counts.iter().filter(|(k, _)| k.ends_with('C')).map(|(_, v)| v).sum();
        assert_eq!(c, 500);
    }
}
