//! Randomised hyperparameter search over regression forests.
//!
//! [`train_regressor`] samples candidate [`ForestParams`] from a
//! [`SearchSpace`], scores each by cross-validation and refits the best one
//! on the whole training scope.

use crate::error::{FillError, Result};
use crate::forest::{ForestParams, MaxFeatures, RandomForest};
use crate::metrics::{mae, r2};
use crate::validation::{CrossValidator, CvScheme, DEFAULT_FORWARD_CHAINING_MIN_ROWS};
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Cross-validation score to maximise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scoring {
    /// Coefficient of determination
    #[default]
    R2,
    /// Negated mean absolute error
    NegMeanAbsoluteError,
}

impl Scoring {
    fn score(self, actual: &[f64], predicted: &[f64]) -> Result<f64> {
        match self {
            Scoring::R2 => r2(actual, predicted),
            Scoring::NegMeanAbsoluteError => mae(actual, predicted).map(|e| -e),
        }
    }
}

/// Grid of candidate values per hyperparameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    pub bootstrap: Vec<bool>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200],
            max_depth: vec![None, Some(10), Some(20), Some(30)],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
            max_features: vec![MaxFeatures::All],
            bootstrap: vec![true],
        }
    }
}

impl SearchSpace {
    /// Wider grid that also toggles feature sampling and bootstrapping.
    pub fn extended() -> Self {
        Self {
            n_estimators: vec![100, 200, 500],
            max_depth: vec![None, Some(10), Some(20)],
            min_samples_split: vec![2, 5],
            min_samples_leaf: vec![1, 2],
            max_features: vec![MaxFeatures::All, MaxFeatures::Sqrt],
            bootstrap: vec![true, false],
        }
    }

    /// Number of grid points.
    pub fn size(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.min_samples_leaf.len()
            * self.max_features.len()
            * self.bootstrap.len()
    }

    /// Every grid point in row-major order.
    pub fn candidates(&self) -> Vec<ForestParams> {
        let mut out = Vec::with_capacity(self.size());
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        for &max_features in &self.max_features {
                            for &bootstrap in &self.bootstrap {
                                out.push(ForestParams {
                                    n_estimators,
                                    max_depth,
                                    min_samples_split,
                                    min_samples_leaf,
                                    max_features,
                                    bootstrap,
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// `n_iter` distinct grid points, sampled without replacement.
    pub fn sample(&self, n_iter: usize, seed: u64) -> Vec<ForestParams> {
        let mut all = self.candidates();
        if n_iter >= all.len() {
            return all;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (chosen, _) = all.partial_shuffle(&mut rng, n_iter);
        chosen.to_vec()
    }
}

/// Trainer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub space: SearchSpace,
    /// Candidates drawn from the space
    pub n_iter: usize,
    /// Requested fold count before degradation
    pub folds: usize,
    pub cv: CvScheme,
    pub scoring: Scoring,
    /// Seeds candidate sampling, fold shuffling and forest fitting
    pub random_state: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            space: SearchSpace::default(),
            n_iter: 10,
            folds: 3,
            cv: CvScheme::default(),
            scoring: Scoring::R2,
            random_state: 42,
        }
    }
}

impl SearchConfig {
    /// Extended search: wider grid, 20 candidates, forward-chaining folds
    /// on week-sized scopes and MAE scoring.
    pub fn extended() -> Self {
        Self {
            space: SearchSpace::extended(),
            n_iter: 20,
            folds: 5,
            cv: CvScheme::Auto {
                forward_chaining_min_rows: DEFAULT_FORWARD_CHAINING_MIN_ROWS,
            },
            scoring: Scoring::NegMeanAbsoluteError,
            random_state: 42,
        }
    }

    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_cv(mut self, cv: CvScheme) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_iter == 0 {
            return Err(FillError::invalid_parameter(
                "n_iter",
                self.n_iter,
                "must be at least 1",
            ));
        }
        if self.space.size() == 0 {
            return Err(FillError::invalid_parameter(
                "search_space",
                0,
                "every hyperparameter needs at least one candidate",
            ));
        }
        if self.space.n_estimators.contains(&0) {
            return Err(FillError::invalid_parameter(
                "n_estimators",
                0,
                "must be at least 1",
            ));
        }
        if let Some(f) = self.space.max_features.iter().find_map(|m| match m {
            MaxFeatures::Fraction(f) if !(*f > 0.0 && *f <= 1.0) => Some(*f),
            _ => None,
        }) {
            return Err(FillError::invalid_parameter(
                "max_features",
                f,
                "fraction must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Best forest found by the search, refitted on the full scope.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    forest: RandomForest,
    cv_score: f64,
    n_train: usize,
}

impl TrainedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.forest.predict(x)
    }

    pub fn params(&self) -> &ForestParams {
        self.forest.params()
    }

    /// Mean CV score of the winning candidate; NaN when the scope was too
    /// small to cross-validate.
    pub fn cv_score(&self) -> f64 {
        self.cv_score
    }

    pub fn n_train(&self) -> usize {
        self.n_train
    }
}

/// Search hyperparameters on `(x, y)` and return the refitted winner.
///
/// Rows are expected in chronological order. Fails with `InsufficientData`
/// when `x` has no rows.
pub fn train_regressor(x: &Array2<f64>, y: &Array1<f64>, config: &SearchConfig) -> Result<TrainedModel> {
    config.validate()?;

    let n = x.nrows();
    if n == 0 {
        return Err(FillError::insufficient("training scope", 1, 0));
    }
    if n != y.len() {
        return Err(FillError::InvalidInput(format!(
            "Feature matrix has {} rows but target has {}",
            n,
            y.len()
        )));
    }

    let candidates = config.space.sample(config.n_iter, config.random_state);
    let splits = CrossValidator::new(config.cv, config.folds)
        .with_random_state(config.random_state)
        .split(n);

    let (best, cv_score) = if splits.is_empty() {
        debug!(
            "Scope of {} rows too small to cross-validate, fitting first candidate",
            n
        );
        (candidates[0].clone(), f64::NAN)
    } else {
        debug!(
            "Evaluating {} candidates on {} rows with {} folds ({:?})",
            candidates.len(),
            n,
            splits.len(),
            config.cv.resolve(n)
        );

        let scores: Vec<f64> = candidates
            .par_iter()
            .map(|params| {
                let mut total = 0.0;
                for split in &splits {
                    let x_train = x.select(Axis(0), &split.train_indices);
                    let y_train = y.select(Axis(0), &split.train_indices);
                    let x_test = x.select(Axis(0), &split.test_indices);
                    let y_test = y.select(Axis(0), &split.test_indices);

                    let forest = RandomForest::fit(&x_train, &y_train, params, config.random_state)?;
                    let predicted = forest.predict(&x_test)?;
                    total += config.scoring.score(&y_test.to_vec(), &predicted.to_vec())?;
                }
                let mean = total / splits.len() as f64;
                debug!("  {} -> {:.4}", params, mean);
                Ok(mean)
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut best_idx = 0;
        for (i, &score) in scores.iter().enumerate() {
            if score > scores[best_idx] || (scores[best_idx].is_nan() && !score.is_nan()) {
                best_idx = i;
            }
        }
        (candidates[best_idx].clone(), scores[best_idx])
    };

    info!("Best parameters ({} rows, cv {:.4}): {}", n, cv_score, best);

    let forest = RandomForest::fit(x, y, &best, config.random_state)?;
    Ok(TrainedModel {
        forest,
        cv_score,
        n_train: n,
    })
}
