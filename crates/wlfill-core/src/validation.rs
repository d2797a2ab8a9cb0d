//! Cross-validation splits for hyperparameter search.
//!
//! Fold counts degrade with the size of the training scope instead of
//! failing: small scopes get fewer folds, and scopes too small for two folds
//! produce no splits at all.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// One week of 15-minute samples.
pub const DEFAULT_FORWARD_CHAINING_MIN_ROWS: usize = 672;

/// Cross-validation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvScheme {
    /// Contiguous k-fold, optionally shuffled
    KFold { shuffle: bool },
    /// Expanding-window time-ordered split
    ForwardChaining,
    /// Forward-chaining once the scope has at least `forward_chaining_min_rows`
    /// rows, unshuffled k-fold below that
    Auto { forward_chaining_min_rows: usize },
}

impl Default for CvScheme {
    fn default() -> Self {
        CvScheme::KFold { shuffle: false }
    }
}

impl CvScheme {
    /// Concrete scheme used for a scope of `n_samples` rows.
    pub fn resolve(self, n_samples: usize) -> CvScheme {
        match self {
            CvScheme::Auto {
                forward_chaining_min_rows,
            } => {
                if n_samples >= forward_chaining_min_rows {
                    CvScheme::ForwardChaining
                } else {
                    CvScheme::KFold { shuffle: false }
                }
            }
            other => other,
        }
    }

    /// Number of folds actually used for `n_samples` rows.
    ///
    /// K-fold keeps at least two rows per fold; forward-chaining needs one
    /// more block than folds. Values below 2 mean no cross-validation.
    pub fn effective_folds(self, n_samples: usize, requested: usize) -> usize {
        match self.resolve(n_samples) {
            CvScheme::ForwardChaining => requested.min(n_samples.saturating_sub(1)),
            _ => requested.min(n_samples / 2),
        }
    }
}

/// A single train/test split over scope-relative row positions.
#[derive(Debug, Clone, PartialEq)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    scheme: CvScheme,
    n_splits: usize,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(scheme: CvScheme, n_splits: usize) -> Self {
        Self {
            scheme,
            n_splits,
            random_state: 42,
        }
    }

    /// Seed used when k-fold shuffles.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate splits for `n_samples` rows in chronological order.
    ///
    /// Returns an empty list when the scope cannot support two folds.
    pub fn split(&self, n_samples: usize) -> Vec<CvSplit> {
        let folds = self.scheme.effective_folds(n_samples, self.n_splits);
        if folds < 2 {
            return Vec::new();
        }

        match self.scheme.resolve(n_samples) {
            CvScheme::ForwardChaining => forward_chaining_split(n_samples, folds),
            CvScheme::KFold { shuffle } => self.k_fold_split(n_samples, folds, shuffle),
            CvScheme::Auto { .. } => unreachable!("Auto resolves to a concrete scheme"),
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<CvSplit> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CvSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        splits
    }
}

/// Expanding window: fold `i` tests on a block of `n/(k+1)` rows and trains
/// on everything before it. The last block ends at the last row.
fn forward_chaining_split(n_samples: usize, n_splits: usize) -> Vec<CvSplit> {
    let test_size = n_samples / (n_splits + 1);

    (0..n_splits)
        .map(|fold_idx| {
            let test_start = n_samples - (n_splits - fold_idx) * test_size;
            CvSplit {
                train_indices: (0..test_start).collect(),
                test_indices: (test_start..test_start + test_size).collect(),
                fold_idx,
            }
        })
        .collect()
}
