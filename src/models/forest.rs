//! Bagged regression trees.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{RegressionTree, TreeConfig};
use super::{check_predict_input, check_training_data, Forecaster};
use crate::error::{ForecastError, ForecastResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: usize,
    /// Minimum rows in a leaf
    pub min_samples_leaf: usize,
    /// Features considered per split; all when `None`.
    pub max_features: Option<usize>,
    /// Sample rows with replacement for each tree.
    pub bootstrap: bool,
    /// Tree `t` is seeded with `seed + t`.
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_leaf: 5,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl RandomForestConfig {
    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    config: RandomForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Forecaster for RandomForest {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()> {
        check_training_data(self.name(), x, y)?;
        if self.config.n_estimators == 0 {
            return Err(ForecastError::config("random forest needs at least one tree"));
        }

        let n = x.nrows();
        let tree_config = self.config.tree_config();
        let seed = self.config.seed;
        let bootstrap = self.config.bootstrap;

        self.trees = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let rows: Vec<usize> = if bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, &rows, &tree_config, &mut rng)
            })
            .collect();
        self.n_features = x.ncols();

        debug!(
            "Random forest fit: {} trees on {} rows",
            self.trees.len(),
            n
        );
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(ForecastError::state("random_forest used before fit"));
        }
        check_predict_input(self.name(), x, self.n_features)?;

        let k = self.trees.len() as f64;
        Ok((0..x.nrows())
            .map(|i| self.trees.iter().map(|t| t.predict_row(x, i)).sum::<f64>() / k)
            .collect())
    }
}
