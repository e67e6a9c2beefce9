//! Simulation population and summary statistics

use serde::{Deserialize, Serialize};

use super::scoring::SimulationTrial;
use crate::models::{BestOf, Side};
use crate::predictor::ServeProbabilities;

/// Serve probability moved into the simulable range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityAdjustment {
    pub side: Side,
    pub requested: f64,
    pub applied: f64,
}

/// All trials of one simulation query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPopulation {
    trials: Vec<SimulationTrial>,
    pub best_of: BestOf,
    /// Probabilities actually used, after clamping
    pub probabilities: ServeProbabilities,
    pub adjustments: Vec<ProbabilityAdjustment>,
    pub seed: u64,
}

/// Presentation-level summary of a population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub trials: usize,
    pub win_probability_a: f64,
    pub win_probability_b: f64,
    pub mean_total_games: f64,
    pub std_total_games: f64,
    pub tiebreak_rate: f64,
    pub clamped: bool,
}

impl SimulationPopulation {
    pub fn new(
        trials: Vec<SimulationTrial>,
        best_of: BestOf,
        probabilities: ServeProbabilities,
        adjustments: Vec<ProbabilityAdjustment>,
        seed: u64,
    ) -> Self {
        Self {
            trials,
            best_of,
            probabilities,
            adjustments,
            seed,
        }
    }

    pub fn trials(&self) -> &[SimulationTrial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn wins(&self, side: Side) -> usize {
        self.trials.iter().filter(|t| t.winner == side).count()
    }

    /// Share of trials won by `side`, `None` for an empty population
    pub fn win_probability(&self, side: Side) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.wins(side) as f64 / self.len() as f64)
        }
    }

    pub fn mean_total_games(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: u64 = self.trials.iter().map(|t| t.total_games() as u64).sum();
        Some(sum as f64 / self.len() as f64)
    }

    /// Population standard deviation of total games
    pub fn std_total_games(&self) -> Option<f64> {
        let mean = self.mean_total_games()?;
        let variance = self
            .trials
            .iter()
            .map(|t| (t.total_games() as f64 - mean).powi(2))
            .sum::<f64>()
            / self.len() as f64;
        Some(variance.sqrt())
    }

    pub fn summary(&self) -> Option<PopulationSummary> {
        Some(PopulationSummary {
            trials: self.len(),
            win_probability_a: self.win_probability(Side::A)?,
            win_probability_b: self.win_probability(Side::B)?,
            mean_total_games: self.mean_total_games()?,
            std_total_games: self.std_total_games()?,
            tiebreak_rate: self.trials.iter().filter(|t| t.tiebreaks > 0).count() as f64
                / self.len() as f64,
            clamped: !self.adjustments.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser::SetScore;

    fn trial(winner: Side, sets: &[(u32, u32)]) -> SimulationTrial {
        let sets: Vec<SetScore> = sets
            .iter()
            .map(|&(first, second)| SetScore { first, second })
            .collect();
        SimulationTrial {
            winner,
            games_a: sets.iter().map(|s| s.first).sum(),
            games_b: sets.iter().map(|s| s.second).sum(),
            tiebreaks: sets.iter().filter(|s| s.games() == 13).count() as u8,
            sets,
        }
    }

    fn population(trials: Vec<SimulationTrial>) -> SimulationPopulation {
        SimulationPopulation::new(
            trials,
            BestOf::Three,
            ServeProbabilities::new(0.6, 0.6),
            Vec::new(),
            0,
        )
    }

    #[test]
    fn test_summary_statistics() {
        let pop = population(vec![
            trial(Side::A, &[(6, 4), (6, 4)]),          // 20 games
            trial(Side::B, &[(6, 4), (4, 6), (6, 7)]), // 33 games
            trial(Side::A, &[(7, 6), (6, 3)]),          // 22 games
            trial(Side::A, &[(6, 1), (6, 2)]),          // 15 games
        ]);
        let summary = pop.summary().unwrap();
        assert_eq!(summary.trials, 4);
        assert!((summary.win_probability_a - 0.75).abs() < 1e-12);
        assert!((summary.mean_total_games - 22.5).abs() < 1e-12);
        assert!((summary.tiebreak_rate - 0.5).abs() < 1e-12);
        assert!(!summary.clamped);

        let expected_var = (2.5f64.powi(2) + 10.5f64.powi(2) + 0.5f64.powi(2) + 7.5f64.powi(2)) / 4.0;
        assert!((summary.std_total_games - expected_var.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_population() {
        let pop = population(Vec::new());
        assert!(pop.is_empty());
        assert_eq!(pop.win_probability(Side::A), None);
        assert!(pop.summary().is_none());
    }
}
