//! Engine configuration
//!
//! Every section has defaults, so a JSON file only needs the keys it changes:
//!
//! ```json
//! { "simulation": { "trials": 10000, "seed": 7 }, "rating": { "k_factor": 24 } }
//! ```
//!
//! Environment overrides are applied after the file: `TENNIS_TRIALS`,
//! `TENNIS_SEED`, `TENNIS_K_FACTOR`, `TENNIS_VALUE_THRESHOLD`.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backtesting::BacktestConfig;
use crate::core::elo::RatingConfig;
use crate::core::kelly::KellyConfig;
use crate::data::features::{FallbackPolicy, FeatureConfig};
use crate::error::EngineError;
use crate::markets::MarketConfig;
use crate::predictor::BaselineConfig;
use crate::simulation::SimulationConfig;

pub const ENV_TRIALS: &str = "TENNIS_TRIALS";
pub const ENV_SEED: &str = "TENNIS_SEED";
pub const ENV_K_FACTOR: &str = "TENNIS_K_FACTOR";
pub const ENV_VALUE_THRESHOLD: &str = "TENNIS_VALUE_THRESHOLD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rating: RatingConfig,
    pub features: FeatureConfig,
    pub fallback: FallbackPolicy,
    pub baseline: BaselineConfig,
    pub simulation: SimulationConfig,
    pub market: MarketConfig,
    pub kelly: KellyConfig,
    pub backtest: BacktestConfig,
}

impl EngineConfig {
    /// Load from an optional JSON file, apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&content).map_err(|e| {
            EngineError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(trials) = parse_override::<usize, _>(&lookup, ENV_TRIALS)? {
            self.simulation.trials = trials;
        }
        if let Some(seed) = parse_override::<u64, _>(&lookup, ENV_SEED)? {
            self.simulation.seed = Some(seed);
        }
        if let Some(k) = parse_override::<f64, _>(&lookup, ENV_K_FACTOR)? {
            self.rating.k_factor = k;
        }
        if let Some(threshold) = parse_override::<f64, _>(&lookup, ENV_VALUE_THRESHOLD)? {
            self.market.value_threshold = threshold;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.rating.k_factor > 0.0) {
            return Err(EngineError::InvalidParameter(format!(
                "K-factor must be positive, got {}",
                self.rating.k_factor
            )));
        }
        self.features.validate()?;
        self.simulation.validate()?;
        self.market.validate()?;
        self.kelly.validate()?;
        self.backtest.validate()?;
        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| EngineError::Config(format!("{}={:?}: {}", key, raw, e)))?;
    debug!("Override {} = {}", key, raw.trim());
    Ok(Some(value))
}
