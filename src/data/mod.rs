//! Match history ingestion, replay and feature engineering

#[cfg(feature = "csv")]
pub mod csv_loader;
pub mod features;
pub mod history;
pub mod parser;

// Re-export commonly used types
#[cfg(feature = "csv")]
pub use csv_loader::{load_match_rows, rows_from_dataframe};
pub use features::{
    FallbackPolicy, FeatureAggregator, FeatureConfig, FeatureSnapshot, MatchSignals,
    PlayerFeatureState, PlayerProfile, Signal, Smoothing,
};
pub use history::{HeadToHead, HistoryReplay, MatchSnapshot, ReplaySummary};
pub use parser::{ScoreParser, SetScore};
