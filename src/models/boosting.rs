//! Gradient-boosted regression trees (squared-error loss).
//!
//! Starts from the target mean and adds one shrunken tree per stage, each
//! fit to the current residuals. With `subsample < 1` every stage sees a
//! seeded draw of rows, so fits are reproducible for a fixed `seed`.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{RegressionTree, TreeConfig};
use super::{check_predict_input, check_training_data, Forecaster};
use crate::error::{ForecastError, ForecastResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Number of boosting stages
    pub n_estimators: usize,
    /// Shrinkage applied to each stage's tree
    pub learning_rate: f64,
    /// Maximum depth of each stage's tree
    pub max_depth: usize,
    /// Minimum rows in a leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) per stage.
    pub subsample: f64,
    /// Seed for row subsampling
    pub seed: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.05,
            max_depth: 5,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl GradientBoostingConfig {
    /// Reject a non-positive learning rate or a subsample outside (0, 1].
    pub fn validate(&self) -> ForecastResult<()> {
        if !(self.learning_rate > 0.0) {
            return Err(ForecastError::config("learning_rate must be positive"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ForecastError::config("subsample must be in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    config: GradientBoostingConfig,
    /// Mean of the training targets
    init: f64,
    stages: Vec<RegressionTree>,
    n_features: usize,
    fitted: bool,
}

impl GradientBoosting {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            init: 0.0,
            stages: Vec::new(),
            n_features: 0,
            fitted: false,
        }
    }

    /// Trees added so far; zero before `fit`.
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

impl Forecaster for GradientBoosting {
    fn name(&self) -> &str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()> {
        check_training_data(self.name(), x, y)?;
        self.config.validate()?;

        let n = x.nrows();
        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: None,
        };
        let n_sub = ((n as f64 * self.config.subsample).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        self.init = y.iter().sum::<f64>() / n as f64;
        let mut current = vec![self.init; n];
        let mut stages = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            // Negative gradient of squared error.
            let residual: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let rows: Vec<usize> = if n_sub < n {
                let mut picked = sample(&mut rng, n, n_sub).into_vec();
                picked.sort_unstable();
                picked
            } else {
                (0..n).collect()
            };

            let tree = RegressionTree::fit(x, &residual, &rows, &tree_config, &mut rng);
            for (i, value) in current.iter_mut().enumerate() {
                *value += self.config.learning_rate * tree.predict_row(x, i);
            }
            stages.push(tree);
        }

        if current.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::fit(self.name(), "non-finite training predictions"));
        }

        debug!("Gradient boosting fit: {} stages on {} rows", stages.len(), n);
        self.stages = stages;
        self.n_features = x.ncols();
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::state("gradient_boosting used before fit"));
        }
        check_predict_input(self.name(), x, self.n_features)?;

        Ok((0..x.nrows())
            .map(|i| {
                self.init
                    + self.config.learning_rate
                        * self.stages.iter().map(|t| t.predict_row(x, i)).sum::<f64>()
            })
            .collect())
    }
}
