//! Synthetic Odds Generation
//!
//! Margined ("bookmaker") odds from fair probabilities, used when historical
//! quotes are unavailable.

use crate::error::EngineError;
use crate::models::MatchOdds;

/// Lowest price a book would offer
const MIN_ODDS: f64 = 1.01;

/// Synthetic odds generator
#[derive(Debug, Clone)]
pub struct SyntheticOddsGenerator {
    /// Overround added on top of a fair book. 0.05 is typical for match winner
    margin: f64,
}

impl SyntheticOddsGenerator {
    pub fn new(margin: f64) -> Result<Self, EngineError> {
        if !(0.0..1.0).contains(&margin) {
            return Err(EngineError::InvalidParameter(format!(
                "Margin must be within [0, 1), got {}",
                margin
            )));
        }
        Ok(Self { margin })
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Margined odds for each outcome of a market
    ///
    /// Probabilities are normalised first, then scaled so the implied
    /// probabilities sum to `1 + margin`. Outcomes with zero probability get
    /// no price.
    pub fn price(&self, probabilities: &[f64]) -> Vec<Option<f64>> {
        let total: f64 = probabilities.iter().filter(|p| **p > 0.0).sum();
        probabilities
            .iter()
            .map(|&p| {
                if p <= 0.0 || total <= 0.0 {
                    return None;
                }
                let implied = p / total * (1.0 + self.margin);
                let odds = (1.0 / implied).max(MIN_ODDS);
                Some((odds * 100.0).round() / 100.0)
            })
            .collect()
    }

    /// Margined match-winner odds from side A's win probability
    pub fn match_odds(&self, probability_a: f64) -> Option<MatchOdds> {
        match self.price(&[probability_a, 1.0 - probability_a]).as_slice() {
            [Some(a), Some(b)] => Some(MatchOdds { a: *a, b: *b }),
            _ => None,
        }
    }
}

impl Default for SyntheticOddsGenerator {
    fn default() -> Self {
        Self { margin: 0.05 }
    }
}
