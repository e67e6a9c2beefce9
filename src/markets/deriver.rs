//! Market Derivation
//!
//! Turns a simulation population into fair prices:
//! - Winner: share of trials won by each side
//! - Over/Under L: P(total games > L)
//! - Handicap H on side X: P(game differential of X + H > 0)
//! - Set score: share of trials ending with each sets score

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::EngineError;
use crate::models::Side;
use crate::simulation::SimulationPopulation;

/// Market generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Explicit total-games lines; generated around the mean when absent
    pub total_lines: Option<Vec<f64>>,
    /// Explicit handicap lines; generated when absent
    pub handicap_lines: Option<Vec<f64>>,
    /// Generated total lines span mean ± this many games
    pub total_line_span: f64,
    /// Generated handicap lines span ± this many games
    pub max_handicap: f64,
    /// Generated lines are kept only when priced inside this band
    pub min_probability: f64,
    pub max_probability: f64,
    /// Minimum edge over the implied probability to report value
    pub value_threshold: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            total_lines: None,
            handicap_lines: None,
            total_line_span: 7.5,
            max_handicap: 6.5,
            min_probability: 0.15,
            max_probability: 0.85,
            value_threshold: 0.03,
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.min_probability)
            || !(0.0..=1.0).contains(&self.max_probability)
            || self.min_probability > self.max_probability
        {
            return Err(EngineError::InvalidParameter(format!(
                "Invalid probability band [{}, {}]",
                self.min_probability, self.max_probability
            )));
        }
        if !(self.total_line_span >= 0.0) || !(self.max_handicap >= 0.0) {
            return Err(EngineError::InvalidParameter(
                "Line spans must be non-negative".to_string(),
            ));
        }
        if !self.value_threshold.is_finite() {
            return Err(EngineError::InvalidParameter(
                "Value threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    fn in_band(&self, probability: f64) -> bool {
        probability >= self.min_probability && probability <= self.max_probability
    }
}

/// Fair decimal odds, or `Undefined` when the outcome never occurred
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FairOdds {
    Decimal(f64),
    Undefined,
}

impl FairOdds {
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.0 {
            FairOdds::Decimal(1.0 / probability)
        } else {
            FairOdds::Undefined
        }
    }

    pub fn decimal(&self) -> Option<f64> {
        match self {
            FairOdds::Decimal(odds) => Some(*odds),
            FairOdds::Undefined => None,
        }
    }
}

impl fmt::Display for FairOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FairOdds::Decimal(odds) => write!(f, "{:.2}", odds),
            FairOdds::Undefined => f.write_str("n/a"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerMarket {
    pub probability_a: f64,
    pub probability_b: f64,
    pub odds_a: FairOdds,
    pub odds_b: FairOdds,
}

impl WinnerMarket {
    pub fn probability(&self, side: Side) -> f64 {
        match side {
            Side::A => self.probability_a,
            Side::B => self.probability_b,
        }
    }

    pub fn odds(&self, side: Side) -> FairOdds {
        match side {
            Side::A => self.odds_a,
            Side::B => self.odds_b,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverUnderLine {
    pub line: f64,
    pub over: f64,
    pub under: f64,
    pub over_odds: FairOdds,
    pub under_odds: FairOdds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandicapLine {
    pub side: Side,
    pub line: f64,
    pub probability: f64,
    pub odds: FairOdds,
}

/// Every market derived from one population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBook {
    pub trials: usize,
    pub winner: WinnerMarket,
    pub mean_total_games: f64,
    pub std_total_games: f64,
    /// Total games → share of trials
    pub total_games_distribution: BTreeMap<u32, f64>,
    pub over_under: Vec<OverUnderLine>,
    pub handicap: Vec<HandicapLine>,
    /// Sets score (side A first) → share of trials
    pub set_scores: BTreeMap<String, f64>,
}

/// P(total games > line)
pub fn over_probability(population: &SimulationPopulation, line: f64) -> f64 {
    share(population, |t| t.total_games() as f64 > line)
}

/// P(total games < line)
pub fn under_probability(population: &SimulationPopulation, line: f64) -> f64 {
    share(population, |t| (t.total_games() as f64) < line)
}

/// P(game differential of `side` + `line` > 0)
pub fn handicap_probability(population: &SimulationPopulation, side: Side, line: f64) -> f64 {
    share(population, |t| t.game_differential(side) as f64 + line > 0.0)
}

fn share<F>(population: &SimulationPopulation, predicate: F) -> f64
where
    F: Fn(&crate::simulation::SimulationTrial) -> bool,
{
    if population.is_empty() {
        return 0.0;
    }
    population.trials().iter().filter(|t| predicate(t)).count() as f64 / population.len() as f64
}

/// Half-game lines from `center - span` to `center + span`
fn half_game_lines(center: f64, span: f64) -> Vec<f64> {
    let start = (center - span).floor() + 0.5;
    let end = center + span;
    let mut lines = Vec::new();
    let mut line = start;
    while line <= end {
        lines.push(line);
        line += 1.0;
    }
    lines
}

/// Derive all markets from a population
pub fn derive_markets(
    population: &SimulationPopulation,
    config: &MarketConfig,
) -> Result<MarketBook, EngineError> {
    if population.is_empty() {
        return Err(EngineError::EmptyPopulation);
    }
    let n = population.len() as f64;

    let probability_a = population.wins(Side::A) as f64 / n;
    let probability_b = population.wins(Side::B) as f64 / n;
    let winner = WinnerMarket {
        probability_a,
        probability_b,
        odds_a: FairOdds::from_probability(probability_a),
        odds_b: FairOdds::from_probability(probability_b),
    };

    let mean_total_games = population.mean_total_games().ok_or(EngineError::EmptyPopulation)?;
    let std_total_games = population.std_total_games().ok_or(EngineError::EmptyPopulation)?;

    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    let mut set_counts: BTreeMap<String, usize> = BTreeMap::new();
    for trial in population.trials() {
        *counts.entry(trial.total_games()).or_insert(0) += 1;
        *set_counts.entry(trial.set_score()).or_insert(0) += 1;
    }
    let total_games_distribution: BTreeMap<u32, f64> = counts
        .into_iter()
        .map(|(g, c)| (g, c as f64 / n))
        .collect();
    let set_scores: BTreeMap<String, f64> = set_counts
        .into_iter()
        .map(|(s, c)| (s, c as f64 / n))
        .collect();

    let (total_lines, filter_totals) = match &config.total_lines {
        Some(lines) => (lines.clone(), false),
        None => {
            let mut lines = half_game_lines(mean_total_games, config.total_line_span);
            lines.retain(|l| *l > 0.0);
            (lines, true)
        }
    };
    let over_under: Vec<OverUnderLine> = total_lines
        .into_iter()
        .map(|line| {
            let over = over_probability(population, line);
            let under = under_probability(population, line);
            OverUnderLine {
                line,
                over,
                under,
                over_odds: FairOdds::from_probability(over),
                under_odds: FairOdds::from_probability(under),
            }
        })
        .filter(|l| !filter_totals || config.in_band(l.over))
        .collect();

    let (handicap_lines, filter_handicaps) = match &config.handicap_lines {
        Some(lines) => (lines.clone(), false),
        None => (half_game_lines(0.0, config.max_handicap), true),
    };
    let mut handicap = Vec::new();
    for side in [Side::A, Side::B] {
        for &line in &handicap_lines {
            let probability = handicap_probability(population, side, line);
            if filter_handicaps && !config.in_band(probability) {
                continue;
            }
            handicap.push(HandicapLine {
                side,
                line,
                probability,
                odds: FairOdds::from_probability(probability),
            });
        }
    }

    debug!(
        "Derived markets from {} trials: P(A)={:.3}, mean games {:.1}, {} totals, {} handicaps",
        population.len(),
        probability_a,
        mean_total_games,
        over_under.len(),
        handicap.len()
    );

    Ok(MarketBook {
        trials: population.len(),
        winner,
        mean_total_games,
        std_total_games,
        total_games_distribution,
        over_under,
        handicap,
        set_scores,
    })
}
