//! Serve-point probability models
//!
//! The simulator only needs one number per player: the probability of winning
//! a point on serve. Anything that can turn a [`Matchup`] into that pair can
//! drive it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::elo::MatchRatings;
use crate::data::features::PlayerProfile;
use crate::models::{BestOf, PlayerId, Side, Surface};

/// Lower bound of plausible serve-point probabilities
pub const MIN_SERVE_PROBABILITY: f64 = 0.45;
/// Upper bound of plausible serve-point probabilities
pub const MAX_SERVE_PROBABILITY: f64 = 0.85;

/// Inputs available to a probability model for one fixture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matchup {
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub surface: Surface,
    pub best_of: BestOf,
    pub rating_a: f64,
    pub rating_b: f64,
    pub profile_a: PlayerProfile,
    pub profile_b: PlayerProfile,
}

impl Matchup {
    pub fn ratings(&self) -> MatchRatings {
        MatchRatings {
            a: self.rating_a,
            b: self.rating_b,
        }
    }

    pub fn profile(&self, side: Side) -> &PlayerProfile {
        match side {
            Side::A => &self.profile_a,
            Side::B => &self.profile_b,
        }
    }
}

/// Serve-point win probabilities of both sides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServeProbabilities {
    pub a: f64,
    pub b: f64,
}

impl ServeProbabilities {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

/// Anything producing serve probabilities for a fixture
pub trait ServeProbabilityModel {
    fn serve_probabilities(&self, matchup: &Matchup) -> ServeProbabilities;
}

/// Parameters of the baseline model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Tour-average share of return points won
    pub tour_return_avg: f64,
    /// Serve probability shift per rating point of advantage
    pub elo_scale: f64,
    pub hard_adjustment: f64,
    pub clay_adjustment: f64,
    pub grass_adjustment: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            tour_return_avg: 0.38,
            elo_scale: 0.0001,
            hard_adjustment: 0.0,
            clay_adjustment: -0.02,
            grass_adjustment: 0.02,
        }
    }
}

/// Heuristic serve model over rolling profiles and ratings
///
/// `p = serve_won - (opp_return_won - tour_return_avg) + surface + elo_scale * gap`,
/// clamped to a plausible band so simulations never degenerate.
#[derive(Debug, Clone, Default)]
pub struct BaselineServeModel {
    config: BaselineConfig,
}

impl BaselineServeModel {
    pub fn new(config: BaselineConfig) -> Self {
        Self { config }
    }

    fn surface_adjustment(&self, surface: Surface) -> f64 {
        match surface {
            Surface::Hard => self.config.hard_adjustment,
            Surface::Clay => self.config.clay_adjustment,
            Surface::Grass => self.config.grass_adjustment,
        }
    }

    fn side_probability(&self, matchup: &Matchup, side: Side) -> f64 {
        let server = matchup.profile(side);
        let receiver = matchup.profile(side.other());
        let gap = matchup.ratings().gap(side);

        let raw = server.serve_points_won
            - (receiver.return_points_won - self.config.tour_return_avg)
            + self.surface_adjustment(matchup.surface)
            + self.config.elo_scale * gap;

        if raw.is_nan() {
            return 1.0 - self.config.tour_return_avg;
        }
        raw.clamp(MIN_SERVE_PROBABILITY, MAX_SERVE_PROBABILITY)
    }
}

impl ServeProbabilityModel for BaselineServeModel {
    fn serve_probabilities(&self, matchup: &Matchup) -> ServeProbabilities {
        let probs = ServeProbabilities {
            a: self.side_probability(matchup, Side::A),
            b: self.side_probability(matchup, Side::B),
        };
        debug!(
            "Serve probabilities {} {:.3} / {} {:.3}",
            matchup.player_a, probs.a, matchup.player_b, probs.b
        );
        probs
    }
}

/// Caller-supplied probabilities, independent of the matchup
#[derive(Debug, Clone, Copy)]
pub struct FixedServeModel(pub ServeProbabilities);

impl ServeProbabilityModel for FixedServeModel {
    fn serve_probabilities(&self, _matchup: &Matchup) -> ServeProbabilities {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::{FallbackPolicy, FeatureSnapshot};
    use chrono::NaiveDate;

    fn profile(name: &str, serve_won: f64, return_won: f64) -> PlayerProfile {
        let snapshot = FeatureSnapshot {
            player: PlayerId::from(name),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            surface: Surface::Hard,
            matches_played: 20,
            ace_rate: None,
            double_fault_rate: None,
            first_serve_in: None,
            first_serve_won: None,
            second_serve_won: None,
            serve_points_won: Some(serve_won),
            break_points_saved: None,
            return_points_won: Some(return_won),
            form: None,
            form_last_5: None,
            avg_total_games: None,
            surface_form: None,
            surface_matches: 0,
            surface_fallback: true,
            rest_days: 7,
            rest_defaulted: false,
        };
        snapshot.resolve(&FallbackPolicy::default())
    }

    fn matchup(surface: Surface, rating_a: f64, rating_b: f64) -> Matchup {
        Matchup {
            player_a: PlayerId::from("A"),
            player_b: PlayerId::from("B"),
            surface,
            best_of: BestOf::Three,
            rating_a,
            rating_b,
            profile_a: profile("A", 0.68, 0.40),
            profile_b: profile("B", 0.62, 0.36),
        }
    }

    #[test]
    fn test_baseline_formula() {
        let model = BaselineServeModel::default();
        let probs = model.serve_probabilities(&matchup(Surface::Hard, 1500.0, 1500.0));
        // A: 0.68 - (0.36 - 0.38) = 0.70; B: 0.62 - (0.40 - 0.38) = 0.60
        assert!((probs.a - 0.70).abs() < 1e-9);
        assert!((probs.b - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_surface_and_rating_adjustments() {
        let model = BaselineServeModel::default();
        let hard = model.serve_probabilities(&matchup(Surface::Hard, 1500.0, 1500.0));
        let grass = model.serve_probabilities(&matchup(Surface::Grass, 1500.0, 1500.0));
        assert!(grass.a > hard.a);

        let favoured = model.serve_probabilities(&matchup(Surface::Hard, 1700.0, 1500.0));
        assert!(favoured.a > hard.a);
        assert!(favoured.b < hard.b);
    }

    #[test]
    fn test_clamped_to_band() {
        let model = BaselineServeModel::default();
        let mut m = matchup(Surface::Grass, 2600.0, 1200.0);
        m.profile_a.serve_points_won = 0.95;
        m.profile_b.serve_points_won = 0.30;
        let probs = model.serve_probabilities(&m);
        assert_eq!(probs.a, MAX_SERVE_PROBABILITY);
        assert_eq!(probs.b, MIN_SERVE_PROBABILITY);
    }

    #[test]
    fn test_fixed_model() {
        let model = FixedServeModel(ServeProbabilities::new(0.7, 0.6));
        let probs = model.serve_probabilities(&matchup(Surface::Clay, 1500.0, 1500.0));
        assert_eq!(probs.for_side(Side::A), 0.7);
        assert_eq!(probs.for_side(Side::B), 0.6);
    }
}
