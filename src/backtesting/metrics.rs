//! Backtest Metrics
//!
//! Forecast quality (accuracy, log loss, Brier score, total-games error) and
//! betting results (ROI, hit rate, drawdown).

use super::simulator::{BetRecord, PredictionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Probabilities are kept this far from 0 and 1 inside the log loss
const LOG_LOSS_EPSILON: f64 = 1e-6;

/// Backtest evaluation metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // Forecast quality
    pub predictions: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub brier_score: f64,
    pub games_mae: Option<f64>,

    // Betting
    pub total_bets: usize,
    pub winning_bets: usize,
    pub hit_rate: f64,
    pub roi: f64,
    pub avg_edge: f64,
    pub avg_odds: f64,

    // Risk
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    // Win/Loss
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
}

/// Calculate metrics from prediction and bet records
pub fn calculate_metrics(
    predictions: &[PredictionRecord],
    bets: &[BetRecord],
    total_stake: f64,
) -> BacktestMetrics {
    let mut metrics = BacktestMetrics::default();

    if !predictions.is_empty() {
        let n = predictions.len() as f64;
        let correct = predictions
            .iter()
            .filter(|p| (p.probability_a >= 0.5) == p.a_won)
            .count();
        metrics.predictions = predictions.len();
        metrics.accuracy = correct as f64 / n;
        metrics.log_loss = predictions
            .iter()
            .map(|p| {
                let q = p.probability_a.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
                if p.a_won {
                    -q.ln()
                } else {
                    -(1.0 - q).ln()
                }
            })
            .sum::<f64>()
            / n;
        metrics.brier_score = predictions
            .iter()
            .map(|p| {
                let outcome = if p.a_won { 1.0 } else { 0.0 };
                (p.probability_a - outcome).powi(2)
            })
            .sum::<f64>()
            / n;

        let errors: Vec<f64> = predictions
            .iter()
            .filter_map(|p| p.actual_games.map(|g| (p.expected_games - g as f64).abs()))
            .collect();
        if !errors.is_empty() {
            metrics.games_mae = Some(errors.iter().sum::<f64>() / errors.len() as f64);
        }
    }

    if bets.is_empty() {
        return metrics;
    }

    let total_bets = bets.len();
    let winning_bets = bets.iter().filter(|b| b.won).count();
    metrics.total_bets = total_bets;
    metrics.winning_bets = winning_bets;
    metrics.hit_rate = winning_bets as f64 / total_bets as f64;
    metrics.avg_edge = bets.iter().map(|b| b.edge).sum::<f64>() / total_bets as f64;
    metrics.avg_odds = bets.iter().map(|b| b.odds).sum::<f64>() / total_bets as f64;

    let profits: Vec<f64> = bets.iter().map(|b| b.profit).collect();
    metrics.gross_profit = profits.iter().filter(|&&p| p > 0.0).sum();
    metrics.gross_loss = profits.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    metrics.net_profit = profits.iter().sum();

    metrics.profit_factor = if metrics.gross_loss > 0.0 {
        metrics.gross_profit / metrics.gross_loss
    } else if metrics.gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    // Drawdown over the cumulative profit curve
    let mut cumulative = 0.0;
    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0f64;
    for p in &profits {
        cumulative += p;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.max(peak - cumulative);
    }
    metrics.max_drawdown = max_drawdown;

    if total_stake > 0.0 {
        metrics.max_drawdown_pct = max_drawdown / total_stake;
        metrics.roi = metrics.net_profit / total_stake;
    }

    metrics
}

/// Analysis results by dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionAnalysis {
    pub key: String,
    pub bets: usize,
    pub wins: usize,
    pub hit_rate: f64,
    pub stake: f64,
    pub profit: f64,
    pub roi: f64,
}

fn analyze_by<F>(bets: &[BetRecord], key: F) -> Vec<DimensionAnalysis>
where
    F: Fn(&BetRecord) -> String,
{
    let mut grouped: HashMap<String, Vec<&BetRecord>> = HashMap::new();
    for bet in bets {
        grouped.entry(key(bet)).or_default().push(bet);
    }

    let mut results: Vec<DimensionAnalysis> = grouped
        .into_iter()
        .map(|(key, group)| {
            let total = group.len();
            let wins = group.iter().filter(|b| b.won).count();
            let stake: f64 = group.iter().map(|b| b.stake).sum();
            let profit: f64 = group.iter().map(|b| b.profit).sum();

            DimensionAnalysis {
                key,
                bets: total,
                wins,
                hit_rate: wins as f64 / total as f64,
                stake,
                profit,
                roi: if stake > 0.0 { profit / stake } else { 0.0 },
            }
        })
        .collect();

    results.sort_by(|a, b| a.key.cmp(&b.key));
    results
}

/// Analyze bet results by surface
pub fn analyze_by_surface(bets: &[BetRecord]) -> Vec<DimensionAnalysis> {
    analyze_by(bets, |b| b.surface.to_string())
}

/// Analyze bet results by odds range
pub fn analyze_by_odds_range(bets: &[BetRecord]) -> Vec<DimensionAnalysis> {
    analyze_by(bets, |b| {
        if b.odds < 1.5 {
            "favourite (<1.5)".to_string()
        } else if b.odds < 3.0 {
            "mid (1.5-3)".to_string()
        } else {
            "outsider (>3)".to_string()
        }
    })
}
