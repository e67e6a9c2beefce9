//! Kelly Criterion Stake Sizing
//!
//! The Kelly criterion formula:
//!     f* = (p*odds - 1) / (odds - 1)
//!
//! Where:
//!     f* = fraction of bankroll to stake
//!     p = model probability of the selection winning
//!     odds = decimal odds quoted for the selection

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Stake recommendation for one selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeSizing {
    pub probability: f64,
    pub odds: f64,
    pub expected_value: f64,
    pub kelly_fraction: f64,       // Full Kelly
    pub recommended_fraction: f64, // After the Kelly multiplier and cap
    pub stake: f64,
}

/// Full Kelly fraction for a single selection
///
/// Negative when the expected value is below one.
///
/// # Examples
/// ```
/// use tennis::core::kelly::kelly_fraction;
/// let f = kelly_fraction(0.55, 2.0); // EV = 1.10
/// assert!((f - 0.10).abs() < 1e-9);
/// ```
pub fn kelly_fraction(probability: f64, odds: f64) -> f64 {
    if odds <= 1.0 {
        return 0.0;
    }
    (probability * odds - 1.0) / (odds - 1.0)
}

/// Fractional Kelly staking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Fraction of full Kelly to stake (0.25 = quarter Kelly)
    pub multiplier: f64,
    /// Maximum single stake as a fraction of bankroll
    pub max_stake_pct: f64,
    /// Stakes are rounded down to a multiple of this unit
    pub stake_unit: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.25,
            max_stake_pct: 0.05,
            stake_unit: 1.0,
        }
    }
}

impl KellyConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.multiplier) || !(0.0..=1.0).contains(&self.max_stake_pct) {
            return Err(EngineError::InvalidParameter(format!(
                "Kelly multiplier and stake cap must be within [0, 1], got {} and {}",
                self.multiplier, self.max_stake_pct
            )));
        }
        if !(self.stake_unit >= 0.0) {
            return Err(EngineError::InvalidParameter(format!(
                "Stake unit cannot be negative, got {}",
                self.stake_unit
            )));
        }
        Ok(())
    }
}

/// Kelly stake calculator over a running bankroll
#[derive(Debug, Clone)]
pub struct KellyCalculator {
    pub bankroll: f64,
    pub config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(bankroll: f64, config: KellyConfig) -> Self {
        Self { bankroll, config }
    }

    /// Quarter Kelly, 5% cap, whole units
    pub fn with_defaults(bankroll: f64) -> Self {
        Self::new(bankroll, KellyConfig::default())
    }

    pub fn size(&self, probability: f64, odds: f64) -> StakeSizing {
        let kelly = kelly_fraction(probability, odds);
        let recommended = (kelly * self.config.multiplier)
            .clamp(0.0, self.config.max_stake_pct.max(0.0));

        let raw = self.bankroll.max(0.0) * recommended;
        let stake = if self.config.stake_unit > 0.0 {
            (raw / self.config.stake_unit).floor() * self.config.stake_unit
        } else {
            raw
        };

        StakeSizing {
            probability,
            odds,
            expected_value: probability * odds,
            kelly_fraction: kelly,
            recommended_fraction: recommended,
            stake,
        }
    }

    /// Apply the profit (or loss) of a settled stake
    pub fn settle(&mut self, profit: f64) {
        self.bankroll += profit;
    }
}

impl Default for KellyCalculator {
    fn default() -> Self {
        Self::with_defaults(1_000.0)
    }
}
