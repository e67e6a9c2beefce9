use chrono::NaiveDate;
use thiserror::Error;

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing required match record field
    #[error("Data error: {0}")]
    Data(String),

    /// A record is dated before the last match already processed for a player
    #[error("Ordering violation for {player}: {date} precedes last processed {last_processed}")]
    OrderingViolation {
        player: String,
        date: NaiveDate,
        last_processed: NaiveDate,
    },

    /// Invalid caller-supplied parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Market derivation over a population with no trials
    #[error("Simulation population is empty")]
    EmptyPopulation,

    /// Unreadable configuration file or override
    #[error("Config error: {0}")]
    Config(String),

    /// Simulation cancelled before all trials completed
    #[error("Simulation cancelled")]
    Cancelled,

    /// CSV ingestion failure
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] polars::prelude::PolarsError),
}

impl EngineError {
    /// Whether the error should abort an ingest pass rather than skip a record
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Data(_))
    }
}

/// Validation functions
pub fn validate_probability(prob: f64) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(EngineError::InvalidParameter(format!(
            "Probability must be between 0 and 1, got {}",
            prob
        )));
    }
    Ok(())
}

pub fn validate_odds(odds: f64) -> Result<(), EngineError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(EngineError::InvalidParameter(format!(
            "Decimal odds must be greater than 1.0, got {}",
            odds
        )));
    }
    Ok(())
}

pub fn validate_trials(trials: usize) -> Result<(), EngineError> {
    if trials == 0 {
        return Err(EngineError::InvalidParameter(
            "At least one simulation trial is required".to_string(),
        ));
    }
    Ok(())
}
