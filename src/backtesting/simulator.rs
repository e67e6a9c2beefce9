//! Walk-forward Backtest
//!
//! Replays the pre-match view of every match from a start date, prices it
//! with the serve model and the simulator, and bets on winner value when
//! quotes are available.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::metrics::{calculate_metrics, BacktestMetrics};
use crate::core::kelly::{KellyCalculator, KellyConfig};
use crate::data::features::FallbackPolicy;
use crate::data::history::MatchSnapshot;
use crate::error::{validate_trials, EngineError};
use crate::markets::{assess_edge, derive_markets, MarketConfig, SyntheticOddsGenerator};
use crate::models::{MatchOdds, Side, Surface};
use crate::predictor::ServeProbabilityModel;
use crate::simulation::{MatchSimulator, SimulationConfig};

/// Model forecast for one evaluated match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub player_a: String,
    pub player_b: String,
    pub probability_a: f64,
    pub a_won: bool,
    pub expected_games: f64,
    pub actual_games: Option<u32>,
}

/// Individual bet record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub date: NaiveDate,
    pub surface: Surface,
    pub selection: String,
    pub probability: f64,
    pub odds: f64,
    pub edge: f64,
    pub stake: f64,
    pub won: bool,
    pub profit: f64,
}

/// Backtest result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    pub predictions: Vec<PredictionRecord>,
    pub bets: Vec<BetRecord>,
    pub matches_evaluated: usize,
    pub matches_skipped: usize,
    pub total_stake: f64,
    pub total_payout: f64,
    pub metrics: Option<BacktestMetrics>,
}

impl BacktestResult {
    pub fn total_profit(&self) -> f64 {
        self.total_payout - self.total_stake
    }

    pub fn roi(&self) -> f64 {
        if self.total_stake == 0.0 {
            0.0
        } else {
            self.total_profit() / self.total_stake
        }
    }

    pub fn finalize(&mut self) {
        self.metrics = Some(calculate_metrics(
            &self.predictions,
            &self.bets,
            self.total_stake,
        ));
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// First match date evaluated; earlier matches only warm up the state
    pub start_date: Option<NaiveDate>,
    /// Both players need this many prior matches to be evaluated
    pub min_prior_matches: u32,
    /// Trials per match, usually well below the interactive default
    pub trials: usize,
    /// Base seed; match `i` is simulated from `seed + i`
    pub seed: u64,
    pub flat_stake: f64,
    pub use_kelly: bool,
    pub kelly: KellyConfig,
    pub bankroll: f64,
    /// Price matches without quotes with margined model odds
    pub use_synthetic_odds: bool,
    pub synthetic_margin: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            min_prior_matches: 5,
            trials: 500,
            seed: 42,
            flat_stake: 10.0,
            use_kelly: false,
            kelly: KellyConfig::default(),
            bankroll: 1_000.0,
            use_synthetic_odds: false,
            synthetic_margin: 0.05,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_trials(self.trials)?;
        if !(self.flat_stake >= 0.0) {
            return Err(EngineError::InvalidParameter(format!(
                "Flat stake cannot be negative, got {}",
                self.flat_stake
            )));
        }
        if !(self.bankroll > 0.0) {
            return Err(EngineError::InvalidParameter(format!(
                "Bankroll must be positive, got {}",
                self.bankroll
            )));
        }
        if !(0.0..1.0).contains(&self.synthetic_margin) {
            return Err(EngineError::InvalidParameter(format!(
                "Synthetic margin must be within [0, 1), got {}",
                self.synthetic_margin
            )));
        }
        self.kelly.validate()
    }
}

/// Backtest simulator
pub struct BacktestSimulator<M> {
    pub config: BacktestConfig,
    model: M,
    simulator: MatchSimulator,
    markets: MarketConfig,
    policy: FallbackPolicy,
    kelly: Option<KellyCalculator>,
    synthetic_odds: Option<SyntheticOddsGenerator>,
}

impl<M: ServeProbabilityModel> BacktestSimulator<M> {
    /// Create a new backtest simulator
    ///
    /// `simulation` supplies the scoring rules; its trial count and seed are
    /// replaced by the backtest's own.
    pub fn new(
        config: BacktestConfig,
        model: M,
        simulation: &SimulationConfig,
        markets: MarketConfig,
        policy: FallbackPolicy,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let simulator = MatchSimulator::new(SimulationConfig {
            trials: config.trials,
            seed: None,
            ..simulation.clone()
        })?;

        let kelly = config
            .use_kelly
            .then(|| KellyCalculator::new(config.bankroll, config.kelly.clone()));

        let synthetic_odds = if config.use_synthetic_odds {
            info!(
                "Synthetic odds enabled ({:.0}% margin)",
                config.synthetic_margin * 100.0
            );
            Some(SyntheticOddsGenerator::new(config.synthetic_margin)?)
        } else {
            None
        };

        Ok(Self {
            config,
            model,
            simulator,
            markets,
            policy,
            kelly,
            synthetic_odds,
        })
    }

    /// Run the backtest over replayed snapshots
    pub fn run(&mut self, snapshots: &[MatchSnapshot]) -> Result<BacktestResult, EngineError> {
        self.run_with_progress(snapshots, |_| {})
    }

    /// Run the backtest, reporting each processed snapshot to `progress`
    pub fn run_with_progress<F>(
        &mut self,
        snapshots: &[MatchSnapshot],
        mut progress: F,
    ) -> Result<BacktestResult, EngineError>
    where
        F: FnMut(usize),
    {
        let mut result = BacktestResult::default();

        for (done, snapshot) in snapshots.iter().enumerate() {
            progress(done + 1);
            let record = &snapshot.record;

            if let Some(start) = self.config.start_date {
                if record.date < start {
                    continue;
                }
            }
            let experienced = snapshot.features_a.matches_played >= self.config.min_prior_matches
                && snapshot.features_b.matches_played >= self.config.min_prior_matches;
            if !experienced {
                result.matches_skipped += 1;
                continue;
            }

            let matchup = snapshot.matchup(&self.policy);
            let probabilities = self.model.serve_probabilities(&matchup);
            let seed = self.config.seed.wrapping_add(snapshot.index as u64);
            let population =
                self.simulator
                    .simulate_seeded(probabilities, record.best_of, seed, None)?;
            let book = derive_markets(&population, &self.markets)?;

            result.matches_evaluated += 1;
            result.predictions.push(PredictionRecord {
                date: record.date,
                player_a: record.player_a.to_string(),
                player_b: record.player_b.to_string(),
                probability_a: book.winner.probability_a,
                a_won: record.won(Side::A),
                expected_games: book.mean_total_games,
                actual_games: record.total_games,
            });

            let quotes = match (record.odds, &self.synthetic_odds) {
                (Some(odds), _) => odds,
                (None, Some(synth)) => match synth.match_odds(book.winner.probability_a) {
                    Some(odds) => odds,
                    None => continue,
                },
                (None, None) => continue,
            };

            self.place_bets(snapshot, &quotes, book.winner.probability_a, &mut result)?;
        }

        info!(
            "Backtest evaluated {} matches ({} skipped), {} bets",
            result.matches_evaluated,
            result.matches_skipped,
            result.bets.len()
        );
        result.finalize();
        Ok(result)
    }

    fn place_bets(
        &mut self,
        snapshot: &MatchSnapshot,
        quotes: &MatchOdds,
        probability_a: f64,
        result: &mut BacktestResult,
    ) -> Result<(), EngineError> {
        let record = &snapshot.record;
        for side in [Side::A, Side::B] {
            let probability = match side {
                Side::A => probability_a,
                Side::B => 1.0 - probability_a,
            };
            let selection = record.player(side).to_string();
            let assessment = assess_edge(
                selection.clone(),
                probability,
                quotes.for_side(side),
                self.markets.value_threshold,
            )?;
            if !assessment.is_value {
                continue;
            }

            let stake = self.calculate_stake(probability, assessment.odds);
            if stake <= 0.0 {
                continue;
            }
            let won = record.won(side);
            let payout = if won { stake * assessment.odds } else { 0.0 };
            let profit = payout - stake;
            if let Some(kelly) = self.kelly.as_mut() {
                kelly.settle(profit);
            }

            debug!(
                "{} bet on {} @ {:.2} (edge {:.3}): {}",
                record.date,
                selection,
                assessment.odds,
                assessment.edge,
                if won { "won" } else { "lost" }
            );

            result.bets.push(BetRecord {
                date: record.date,
                surface: record.surface,
                selection,
                probability,
                odds: assessment.odds,
                edge: assessment.edge,
                stake,
                won,
                profit,
            });
            result.total_stake += stake;
            result.total_payout += payout;
        }
        Ok(())
    }

    /// Calculate stake amount
    fn calculate_stake(&self, probability: f64, odds: f64) -> f64 {
        match &self.kelly {
            Some(kelly) => kelly.size(probability, odds).stake,
            None => self.config.flat_stake,
        }
    }

    pub fn bankroll(&self) -> Option<f64> {
        self.kelly.as_ref().map(|k| k.bankroll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::history::HistoryReplay;
    use crate::models::{BestOf, MatchRecord, PlayerId, ServeCounters};
    use crate::predictor::{FixedServeModel, ServeProbabilities};

    fn records(with_odds: bool) -> Vec<MatchRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..30)
            .map(|i| MatchRecord {
                date: start + chrono::Duration::days(i),
                surface: Surface::Hard,
                best_of: BestOf::Three,
                player_a: PlayerId::from("Strong"),
                player_b: PlayerId::from("Weak"),
                winner: if i % 5 == 4 { Side::B } else { Side::A },
                serve_a: ServeCounters::default(),
                serve_b: ServeCounters::default(),
                total_games: Some(20),
                score: None,
                odds: with_odds.then_some(MatchOdds { a: 1.9, b: 1.9 }),
            })
            .collect()
    }

    fn backtest(config: BacktestConfig) -> BacktestSimulator<FixedServeModel> {
        BacktestSimulator::new(
            config,
            FixedServeModel(ServeProbabilities::new(0.68, 0.58)),
            &SimulationConfig::default(),
            MarketConfig::default(),
            FallbackPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_walk_forward_with_quotes() {
        let snapshots = HistoryReplay::default()
            .replay_records(&records(true))
            .unwrap();
        let mut sim = backtest(BacktestConfig {
            trials: 200,
            ..Default::default()
        });
        let result = sim.run(&snapshots).unwrap();

        // First five matches are warm-up for both players
        assert_eq!(result.matches_skipped, 5);
        assert_eq!(result.matches_evaluated, 25);
        assert_eq!(result.predictions.len(), 25);
        assert!(result.predictions.iter().all(|p| p.probability_a > 0.5));

        // Model strongly favours A against an even quote: bet on A every time
        assert_eq!(result.bets.len(), 25);
        assert!(result.bets.iter().all(|b| b.selection == "Strong"));
        assert!((result.total_stake - 250.0).abs() < 1e-9);

        let metrics = result.metrics.as_ref().unwrap();
        assert_eq!(metrics.winning_bets, 20);
        assert!((metrics.accuracy - 0.8).abs() < 1e-12);
        assert!(result.roi() > 0.0);
    }

    #[test]
    fn test_no_quotes_no_bets() {
        let snapshots = HistoryReplay::default()
            .replay_records(&records(false))
            .unwrap();
        let mut sim = backtest(BacktestConfig {
            trials: 100,
            ..Default::default()
        });
        let result = sim.run(&snapshots).unwrap();
        assert_eq!(result.predictions.len(), 25);
        assert!(result.bets.is_empty());
        assert_eq!(result.roi(), 0.0);
    }

    #[test]
    fn test_synthetic_quotes_carry_no_edge() {
        let snapshots = HistoryReplay::default()
            .replay_records(&records(false))
            .unwrap();
        let mut sim = backtest(BacktestConfig {
            trials: 100,
            use_synthetic_odds: true,
            ..Default::default()
        });
        let result = sim.run(&snapshots).unwrap();
        // Margined prices built from the model's own probability never show value
        assert!(result.bets.is_empty());
    }

    #[test]
    fn test_start_date_and_kelly() {
        let snapshots = HistoryReplay::default()
            .replay_records(&records(true))
            .unwrap();
        let mut sim = backtest(BacktestConfig {
            trials: 100,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 21),
            use_kelly: true,
            ..Default::default()
        });
        let result = sim.run(&snapshots).unwrap();
        assert_eq!(result.matches_evaluated, 10);
        assert!(!result.bets.is_empty());

        // Every stake is capped at 5% of the bankroll held when it was placed
        let mut bankroll = 1_000.0;
        for bet in &result.bets {
            assert!(bet.stake > 0.0);
            assert!(bet.stake <= 0.05 * bankroll + 1e-9);
            bankroll += bet.profit;
        }
        let expected = 1_000.0 + result.total_profit();
        assert!((bankroll - expected).abs() < 1e-6);
        assert!((sim.bankroll().unwrap() - bankroll).abs() < 1e-6);
        assert!((sim.bankroll().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BacktestSimulator::new(
            BacktestConfig {
                flat_stake: -1.0,
                ..Default::default()
            },
            FixedServeModel(ServeProbabilities::new(0.6, 0.6)),
            &SimulationConfig::default(),
            MarketConfig::default(),
            FallbackPolicy::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_deterministic() {
        let snapshots = HistoryReplay::default()
            .replay_records(&records(true))
            .unwrap();
        let config = BacktestConfig {
            trials: 100,
            ..Default::default()
        };
        let first = backtest(config.clone()).run(&snapshots).unwrap();
        let second = backtest(config).run(&snapshots).unwrap();
        let probs = |r: &BacktestResult| r.predictions.iter().map(|p| p.probability_a).collect::<Vec<_>>();
        assert_eq!(probs(&first), probs(&second));
    }
}
