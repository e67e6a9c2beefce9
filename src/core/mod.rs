//! Rating and staking primitives

pub mod elo;
pub mod kelly;

pub use elo::{
    expected_score, margin_multiplier, MatchContext, MatchRatings, PlayerRatingState, RatingConfig,
    RatingLedger, RatingUpdate, BASE_RATING,
};
pub use kelly::{kelly_fraction, KellyCalculator, KellyConfig, StakeSizing};
