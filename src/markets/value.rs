//! Edge assessment against quoted prices
//!
//! edge = model_probability - 1 / quoted_odds
//!
//! A selection is value when the edge exceeds the configured threshold.

use serde::{Deserialize, Serialize};

use super::deriver::MarketBook;
use crate::core::kelly::{KellyCalculator, StakeSizing};
use crate::error::{validate_odds, validate_probability, EngineError};
use crate::models::{MatchOdds, Side};

/// Model view of one quoted selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueAssessment {
    pub selection: String,
    pub probability: f64,
    pub odds: f64,
    pub implied_probability: f64,
    pub edge: f64,
    pub expected_value: f64,
    pub is_value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizing: Option<StakeSizing>,
}

/// Compare a model probability with quoted decimal odds
pub fn assess_edge(
    selection: impl Into<String>,
    probability: f64,
    odds: f64,
    threshold: f64,
) -> Result<ValueAssessment, EngineError> {
    validate_probability(probability)?;
    validate_odds(odds)?;

    let implied_probability = 1.0 / odds;
    let edge = probability - implied_probability;
    Ok(ValueAssessment {
        selection: selection.into(),
        probability,
        odds,
        implied_probability,
        edge,
        expected_value: probability * odds,
        is_value: edge > threshold,
        sizing: None,
    })
}

/// Assess both winner selections, sizing stakes for value selections
pub fn assess_winner(
    book: &MarketBook,
    quotes: &MatchOdds,
    threshold: f64,
    kelly: Option<&KellyCalculator>,
) -> Result<Vec<ValueAssessment>, EngineError> {
    [Side::A, Side::B]
        .into_iter()
        .map(|side| {
            let mut assessment = assess_edge(
                format!("winner {:?}", side),
                book.winner.probability(side),
                quotes.for_side(side),
                threshold,
            )?;
            if assessment.is_value {
                assessment.sizing = kelly.map(|k| k.size(assessment.probability, assessment.odds));
            }
            Ok(assessment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::deriver::{FairOdds, WinnerMarket};
    use std::collections::BTreeMap;

    fn book(probability_a: f64) -> MarketBook {
        MarketBook {
            trials: 1_000,
            winner: WinnerMarket {
                probability_a,
                probability_b: 1.0 - probability_a,
                odds_a: FairOdds::from_probability(probability_a),
                odds_b: FairOdds::from_probability(1.0 - probability_a),
            },
            mean_total_games: 22.0,
            std_total_games: 4.0,
            total_games_distribution: BTreeMap::new(),
            over_under: Vec::new(),
            handicap: Vec::new(),
            set_scores: BTreeMap::new(),
        }
    }

    #[test]
    fn test_edge_above_threshold() {
        let a = assess_edge("A", 0.60, 2.0, 0.03).unwrap();
        assert!((a.edge - 0.10).abs() < 1e-12);
        assert!((a.expected_value - 1.2).abs() < 1e-12);
        assert!(a.is_value);
    }

    #[test]
    fn test_edge_below_threshold() {
        let a = assess_edge("A", 0.52, 2.0, 0.03).unwrap();
        assert!(!a.is_value);
    }

    #[test]
    fn test_invalid_quote_rejected() {
        assert!(assess_edge("A", 0.5, 1.0, 0.03).is_err());
        assert!(assess_edge("A", 1.2, 2.0, 0.03).is_err());
    }

    #[test]
    fn test_winner_assessment_sizes_value_only() {
        let kelly = KellyCalculator::with_defaults(1_000.0);
        let quotes = MatchOdds { a: 2.10, b: 1.80 };
        let assessments = assess_winner(&book(0.60), &quotes, 0.03, Some(&kelly)).unwrap();
        assert_eq!(assessments.len(), 2);
        assert!(assessments[0].is_value);
        assert!(assessments[0].sizing.as_ref().unwrap().stake > 0.0);
        assert!(!assessments[1].is_value);
        assert!(assessments[1].sizing.is_none());
    }
}
