//! Betting-style markets derived from simulation populations

pub mod deriver;
pub mod synthetic;
pub mod value;

pub use deriver::{
    derive_markets, handicap_probability, over_probability, under_probability, FairOdds,
    HandicapLine, MarketBook, MarketConfig, OverUnderLine, WinnerMarket,
};
pub use synthetic::SyntheticOddsGenerator;
pub use value::{assess_edge, assess_winner, ValueAssessment};
