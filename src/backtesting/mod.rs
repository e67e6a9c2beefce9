//! Walk-forward evaluation of the pricing pipeline against recorded results

pub mod metrics;
pub mod simulator;

pub use metrics::{
    analyze_by_odds_range, analyze_by_surface, calculate_metrics, BacktestMetrics, DimensionAnalysis,
};
pub use simulator::{
    BacktestConfig, BacktestResult, BacktestSimulator, BetRecord, PredictionRecord,
};
