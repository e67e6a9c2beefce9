//! Tennis - match outcome engine
//!
//! This library provides:
//! - An Elo rating ledger updated strictly in chronological order
//! - Causal rolling player features (serve, return, form, rest)
//! - Point-by-point Monte Carlo match simulation
//! - Winner, total-games and handicap markets with fair odds
//! - Value assessment, Kelly staking and walk-forward backtesting
//!
//! # Example
//!
//! ```no_run
//! use tennis::markets::{derive_markets, MarketConfig};
//! use tennis::models::BestOf;
//! use tennis::predictor::ServeProbabilities;
//! use tennis::simulation::{MatchSimulator, SimulationConfig};
//!
//! let simulator = MatchSimulator::new(SimulationConfig {
//!     seed: Some(42),
//!     ..Default::default()
//! })?;
//! let population = simulator.simulate(ServeProbabilities::new(0.70, 0.60), BestOf::Three)?;
//! let book = derive_markets(&population, &MarketConfig::default())?;
//! println!("P(A) = {:.3}, odds {}", book.winner.probability_a, book.winner.odds_a);
//! # Ok::<(), tennis::EngineError>(())
//! ```

pub mod backtesting;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod markets;
pub mod models;
pub mod predictor;
pub mod simulation;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::{KellyCalculator, RatingConfig, RatingLedger};
pub use data::{FeatureAggregator, FeatureConfig, HistoryReplay, MatchSnapshot};
pub use error::EngineError;
pub use markets::{derive_markets, MarketBook, MarketConfig};
pub use models::{BestOf, MatchRecord, PlayerId, RawMatchRow, Side, Surface};
pub use predictor::{BaselineServeModel, Matchup, ServeProbabilities, ServeProbabilityModel};
pub use simulation::{MatchSimulator, SimulationConfig, SimulationPopulation};
