//! Error taxonomy for the forecasting core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Invalid window bounds, unknown ticker, bad peer count, missing price field.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Not enough history for a rolling window or regression sample.
    #[error("Data quality error: {0}")]
    DataQuality(String),

    /// Stacker phase-ordering violation.
    #[error("State error: {0}")]
    State(String),

    /// Numerical failure in a base or meta learner.
    #[error("Model fit error in {model}: {reason}")]
    ModelFit { model: String, reason: String },

    /// Cooperative cancellation requested through a progress hook.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl ForecastError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::DataQuality(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn fit(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelFit {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

pub type ForecastResult<T> = Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForecastError::config("k must be positive");
        assert_eq!(err.to_string(), "Configuration error: k must be positive");

        let err = ForecastError::fit("random_forest", "empty training set");
        assert_eq!(
            err.to_string(),
            "Model fit error in random_forest: empty training set"
        );
    }
}
