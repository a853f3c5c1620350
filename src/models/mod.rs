//! Base forecasters, the meta combiner, and the model pool.
//!
//! All learners implement [`Forecaster`]. The stacker never holds trained
//! models across phases; it asks each [`ModelFactory`] for a fresh instance
//! whenever it needs to fit.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod meta;
pub(crate) mod tree;

use std::collections::BTreeSet;
use std::sync::Arc;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

pub use boosting::{GradientBoosting, GradientBoostingConfig};
pub use forest::{RandomForest, RandomForestConfig};
pub use linear::{ElasticNet, ElasticNetConfig};
pub use meta::{NonNegativeLinear, NonNegativeLinearConfig};
pub use tree::TreeConfig;

use crate::error::{ForecastError, ForecastResult};

/// Regression model with a fit / predict capability.
///
/// Implementors must be `Send + Sync`; fits run on rayon workers.
pub trait Forecaster: Send + Sync {
    /// Identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Train on rows of `x` against `y`.
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()>;

    /// One prediction per row of `x`. Fails with a state error before `fit`.
    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>>;
}

/// Produces untrained forecasters.
pub trait ModelFactory: Send + Sync {
    fn build(&self) -> Box<dyn Forecaster>;
}

impl<F> ModelFactory for F
where
    F: Fn() -> Box<dyn Forecaster> + Send + Sync,
{
    fn build(&self) -> Box<dyn Forecaster> {
        self()
    }
}

/// Configurable base model, tagged by `kind` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    ElasticNet(ElasticNetConfig),
    RandomForest(RandomForestConfig),
    GradientBoosting(GradientBoostingConfig),
}

impl ModelSpec {
    /// Default pool id for this kind.
    pub fn id(&self) -> &'static str {
        match self {
            Self::ElasticNet(_) => "elastic_net",
            Self::RandomForest(_) => "random_forest",
            Self::GradientBoosting(_) => "gradient_boosting",
        }
    }

    pub fn default_pool() -> Vec<ModelSpec> {
        vec![
            Self::ElasticNet(ElasticNetConfig::default()),
            Self::RandomForest(RandomForestConfig::default()),
            Self::GradientBoosting(GradientBoostingConfig::default()),
        ]
    }
}

impl ModelFactory for ModelSpec {
    fn build(&self) -> Box<dyn Forecaster> {
        match self {
            Self::ElasticNet(c) => Box::new(ElasticNet::new(c.clone())),
            Self::RandomForest(c) => Box::new(RandomForest::new(c.clone())),
            Self::GradientBoosting(c) => Box::new(GradientBoosting::new(c.clone())),
        }
    }
}

/// Meta-learner choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetaSpec {
    NonNegativeLinear(NonNegativeLinearConfig),
}

impl Default for MetaSpec {
    fn default() -> Self {
        Self::NonNegativeLinear(NonNegativeLinearConfig::default())
    }
}

impl MetaSpec {
    pub fn build(&self) -> NonNegativeLinear {
        match self {
            Self::NonNegativeLinear(c) => NonNegativeLinear::new(c.clone()),
        }
    }
}

/// Ordered, fixed set of (id, factory) pairs.
///
/// The column order of every OOF and forecast matrix follows this order.
#[derive(Clone, Default)]
pub struct ModelPool {
    entries: Vec<(String, Arc<dyn ModelFactory>)>,
}

impl std::fmt::Debug for ModelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelPool").field("ids", &self.ids()).finish()
    }
}

impl ModelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool built from specs; repeated kinds get `_2`, `_3` suffixes.
    pub fn from_specs(specs: &[ModelSpec]) -> Self {
        specs.iter().fold(Self::new(), |pool, spec| {
            pool.with_model(spec.id(), Arc::new(spec.clone()))
        })
    }

    /// Append a model. A duplicate id is made unique with a numeric suffix.
    pub fn with_model(mut self, id: impl Into<String>, factory: Arc<dyn ModelFactory>) -> Self {
        let id = id.into();
        let taken: BTreeSet<&str> = self.entries.iter().map(|(i, _)| i.as_str()).collect();
        let unique = if taken.contains(id.as_str()) {
            (2..)
                .map(|k| format!("{}_{}", id, k))
                .find(|candidate| !taken.contains(candidate.as_str()))
                .unwrap_or_else(|| id.clone())
        } else {
            id
        };
        self.entries.push((unique, factory));
        self
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh, untrained instance of every model, in pool order.
    pub fn build_all(&self) -> Vec<(String, Box<dyn Forecaster>)> {
        self.entries
            .iter()
            .map(|(id, factory)| (id.clone(), factory.build()))
            .collect()
    }
}

/// Shared training-input checks: shape agreement, non-empty, all finite.
pub(crate) fn check_training_data(model: &str, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()> {
    if x.nrows() == 0 {
        return Err(ForecastError::fit(model, "empty training set"));
    }
    if x.nrows() != y.len() {
        return Err(ForecastError::fit(
            model,
            format!("{} feature rows but {} targets", x.nrows(), y.len()),
        ));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(ForecastError::fit(model, "non-finite training input"));
    }
    Ok(())
}

pub(crate) fn check_predict_input(
    model: &str,
    x: &DMatrix<f64>,
    n_features: usize,
) -> ForecastResult<()> {
    if x.ncols() != n_features {
        return Err(ForecastError::fit(
            model,
            format!("trained on {} features, got {}", n_features, x.ncols()),
        ));
    }
    Ok(())
}
