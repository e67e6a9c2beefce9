//! Elo Rating Ledger
//!
//! Sequential player strength ratings, updated match by match in date order.
//!
//! The expected score of a player against an opponent is:
//!     E = 1 / (1 + 10^((R_opp - R_player) / 400))
//!
//! and the rating moves by:
//!     delta = K * (S - E)
//!
//! Where:
//!     K = update factor (larger = faster reaction to results)
//!     S = actual score (1 for a win, 0 for a loss)
//!
//! Every update returns the ratings as they stood *before* the match, so a
//! consumer building features for match N never sees match N's result.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::models::{MatchRecord, PlayerId, Side};

/// Starting rating for unseen players
pub const BASE_RATING: f64 = 1500.0;

/// Logistic scale of the rating curve
const RATING_SCALE: f64 = 400.0;

/// Constants of the margin-of-victory multiplier
const MOV_BASE: f64 = 2.2;
const MOV_GAP_WEIGHT: f64 = 0.001;

/// Rating update parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub k_factor: f64,
    pub base_rating: f64,
    /// Rating bonus granted to the home side when a match context names one
    pub home_advantage: f64,
    /// Scale deltas by the margin of victory when a context carries one
    pub margin_of_victory: bool,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k_factor: 32.0,
            base_rating: BASE_RATING,
            home_advantage: 100.0,
            margin_of_victory: false,
        }
    }
}

/// Per-player rating state, owned by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRatingState {
    pub rating: f64,
    pub last_update: Option<NaiveDate>,
    pub matches: u32,
}

impl PlayerRatingState {
    fn new(rating: f64) -> Self {
        Self {
            rating,
            last_update: None,
            matches: 0,
        }
    }
}

/// Optional adjustments for the home/margin variant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchContext {
    /// Side playing at home, if any
    pub home: Option<Side>,
    /// Absolute score margin of the match (points, games...)
    pub margin: Option<f64>,
}

/// Result of one ledger update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub pre_player: f64,
    pub pre_opponent: f64,
    pub post_player: f64,
    pub post_opponent: f64,
    /// Expected score of the player, home bonus included
    pub expected: f64,
}

impl RatingUpdate {
    pub fn player_delta(&self) -> f64 {
        self.post_player - self.pre_player
    }

    pub fn opponent_delta(&self) -> f64 {
        self.post_opponent - self.pre_opponent
    }
}

/// Pre-match ratings of both sides of a record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchRatings {
    pub a: f64,
    pub b: f64,
}

impl MatchRatings {
    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    /// Rating gap from the point of view of `side`
    pub fn gap(&self, side: Side) -> f64 {
        self.for_side(side) - self.for_side(side.other())
    }
}

/// Logistic expected score of `rating` against `opponent_rating`
pub fn expected_score(rating: f64, opponent_rating: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent_rating - rating) / RATING_SCALE))
}

/// Margin-of-victory multiplier
///
/// Grows with `ln(margin + 1)` and shrinks when the winner was already the
/// stronger side, so blow-outs move ratings more than narrow wins while a
/// favourite's blow-out moves them less than an underdog's.
///
/// # Arguments
/// * `margin` - Absolute winning margin
/// * `winner_gap` - Pre-match rating gap from the winner's point of view
pub fn margin_multiplier(margin: f64, winner_gap: f64) -> f64 {
    let denominator = (winner_gap * MOV_GAP_WEIGHT + MOV_BASE).max(f64::EPSILON);
    (margin.max(0.0) + 1.0).ln() * (MOV_BASE / denominator)
}

/// Single-writer rating ledger
///
/// Both players of a match are updated by one call, after both have been
/// checked, so a failed update never leaves half a match applied.
#[derive(Debug, Clone, Default)]
pub struct RatingLedger {
    config: RatingConfig,
    players: HashMap<PlayerId, PlayerRatingState>,
    updates: u64,
}

impl RatingLedger {
    pub fn new(config: RatingConfig) -> Self {
        Self {
            config,
            players: HashMap::new(),
            updates: 0,
        }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Current rating, base rating for unseen players
    pub fn rating(&self, player: &PlayerId) -> f64 {
        self.players
            .get(player)
            .map(|s| s.rating)
            .unwrap_or(self.config.base_rating)
    }

    pub fn state(&self, player: &PlayerId) -> Option<&PlayerRatingState> {
        self.players.get(player)
    }

    /// Update both players after a match
    ///
    /// # Returns
    /// `(pre_match_player_rating, pre_match_opponent_rating)`
    pub fn update_rating(
        &mut self,
        player: &PlayerId,
        opponent: &PlayerId,
        player_won: bool,
        match_date: NaiveDate,
    ) -> Result<(f64, f64), EngineError> {
        let update = self.update_with_context(
            player,
            opponent,
            player_won,
            match_date,
            MatchContext::default(),
        )?;
        Ok((update.pre_player, update.pre_opponent))
    }

    /// Update both players, applying the home/margin variant when `context`
    /// carries the corresponding information
    pub fn update_with_context(
        &mut self,
        player: &PlayerId,
        opponent: &PlayerId,
        player_won: bool,
        match_date: NaiveDate,
        context: MatchContext,
    ) -> Result<RatingUpdate, EngineError> {
        if player == opponent {
            return Err(EngineError::Data(format!(
                "Player {} cannot be rated against themselves",
                player
            )));
        }
        self.check_order(player, match_date)?;
        self.check_order(opponent, match_date)?;

        let pre_player = self.rating(player);
        let pre_opponent = self.rating(opponent);

        // Home bonus shifts the expectation, not the stored rating
        let bonus = match context.home {
            Some(Side::A) => self.config.home_advantage,
            Some(Side::B) => -self.config.home_advantage,
            None => 0.0,
        };
        let expected = expected_score(pre_player + bonus, pre_opponent);
        let actual = if player_won { 1.0 } else { 0.0 };

        let mut delta = self.config.k_factor * (actual - expected);
        if self.config.margin_of_victory {
            if let Some(margin) = context.margin {
                let gap = pre_player + bonus - pre_opponent;
                let winner_gap = if player_won { gap } else { -gap };
                delta *= margin_multiplier(margin, winner_gap);
            }
        }

        let post_player = pre_player + delta;
        let post_opponent = pre_opponent - delta;

        self.commit(player, post_player, match_date);
        self.commit(opponent, post_opponent, match_date);
        self.updates += 1;

        Ok(RatingUpdate {
            pre_player,
            pre_opponent,
            post_player,
            post_opponent,
            expected,
        })
    }

    /// Apply a validated match record and return the pre-match ratings
    pub fn apply(&mut self, record: &MatchRecord) -> Result<MatchRatings, EngineError> {
        let (a, b) = self.update_rating(
            &record.player_a,
            &record.player_b,
            record.won(Side::A),
            record.date,
        )?;
        Ok(MatchRatings { a, b })
    }

    /// Ratings for an upcoming fixture, without touching the ledger
    pub fn preview(&self, player_a: &PlayerId, player_b: &PlayerId) -> MatchRatings {
        MatchRatings {
            a: self.rating(player_a),
            b: self.rating(player_b),
        }
    }

    /// Highest-rated players, best first
    pub fn leaderboard(&self, limit: usize) -> Vec<(&PlayerId, &PlayerRatingState)> {
        let mut ranked: Vec<_> = self.players.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.rating
                .partial_cmp(&a.1.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(limit);
        ranked
    }

    /// Number of rated players
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of matches applied
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn check_order(&self, player: &PlayerId, date: NaiveDate) -> Result<(), EngineError> {
        if let Some(last) = self.players.get(player).and_then(|s| s.last_update) {
            if date < last {
                return Err(EngineError::OrderingViolation {
                    player: player.to_string(),
                    date,
                    last_processed: last,
                });
            }
        }
        Ok(())
    }

    fn commit(&mut self, player: &PlayerId, rating: f64, date: NaiveDate) {
        let base = self.config.base_rating;
        let state = self
            .players
            .entry(player.clone())
            .or_insert_with(|| PlayerRatingState::new(base));
        state.rating = rating;
        state.last_update = Some(date);
        state.matches += 1;
    }
}
