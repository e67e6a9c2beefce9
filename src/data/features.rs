//! Causal Feature Aggregation
//!
//! Rolling serve, return and form statistics per player, computed only from
//! matches strictly before the one being described.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::error::EngineError;
use crate::models::{MatchRecord, PlayerId, ServeCounters, Side, Surface};

/// Per-match signals tracked for every player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    AceRate,
    DoubleFaultRate,
    FirstServeIn,
    FirstServeWon,
    SecondServeWon,
    ServePointsWon,
    BreakPointsSaved,
    ReturnPointsWon,
    Form,
    TotalGames,
}

impl Signal {
    pub const ALL: [Signal; 10] = [
        Signal::AceRate,
        Signal::DoubleFaultRate,
        Signal::FirstServeIn,
        Signal::FirstServeWon,
        Signal::SecondServeWon,
        Signal::ServePointsWon,
        Signal::BreakPointsSaved,
        Signal::ReturnPointsWon,
        Signal::Form,
        Signal::TotalGames,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Ratio guarded against missing counters and zero denominators
///
/// A zero denominator yields `None` so the observation is left out of the
/// window instead of being averaged in as a zero.
fn ratio(numerator: Option<u32>, denominator: Option<u32>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0 => Some(n as f64 / d as f64),
        _ => None,
    }
}

/// Raw signals of one player in one match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSignals {
    pub won: bool,
    pub serve: ServeCounters,
    pub opponent_serve: ServeCounters,
    pub total_games: Option<u32>,
}

impl MatchSignals {
    pub fn from_record(record: &MatchRecord, side: Side) -> Self {
        Self {
            won: record.won(side),
            serve: record.serve(side).clone(),
            opponent_serve: record.serve(side.other()).clone(),
            total_games: record.total_games,
        }
    }

    /// Observed value of `signal`, `None` when it cannot be computed
    pub fn value(&self, signal: Signal) -> Option<f64> {
        let s = &self.serve;
        match signal {
            Signal::AceRate => ratio(s.aces, s.serve_points),
            Signal::DoubleFaultRate => ratio(s.double_faults, s.serve_points),
            Signal::FirstServeIn => ratio(s.first_in, s.serve_points),
            Signal::FirstServeWon => ratio(s.first_won, s.first_in),
            Signal::SecondServeWon => {
                let second_serves = s.serve_points?.checked_sub(s.first_in?);
                ratio(s.second_won, second_serves)
            }
            Signal::ServePointsWon => ratio(s.points_won(), s.serve_points),
            Signal::BreakPointsSaved => ratio(s.bp_saved, s.bp_faced),
            Signal::ReturnPointsWon => {
                let o = &self.opponent_serve;
                let returned = o.serve_points?.checked_sub(o.points_won()?);
                ratio(returned, o.serve_points)
            }
            Signal::Form => Some(if self.won { 1.0 } else { 0.0 }),
            Signal::TotalGames => self.total_games.map(f64::from),
        }
    }
}

/// Smoothing applied to each signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Smoothing {
    /// Simple mean of the last `n` observations
    Window(usize),
    /// Exponentially weighted mean, `alpha = 2 / (span + 1)`
    Ewma { span: f64 },
}

/// Feature aggregation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub smoothing: Smoothing,
    pub short_form_window: usize,
    pub surface_window: usize,
    pub surface_min_samples: usize,
    pub surface_damping: f64,
    pub max_rest_days: i64,
    pub default_rest_days: i64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::Window(10),
            short_form_window: 5,
            surface_window: 20,
            surface_min_samples: 3,
            surface_damping: 0.9,
            max_rest_days: 30,
            default_rest_days: 7,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.smoothing {
            Smoothing::Window(0) => {
                return Err(EngineError::InvalidParameter(
                    "Smoothing window must hold at least one observation".to_string(),
                ))
            }
            Smoothing::Ewma { span } if !(span >= 1.0) => {
                return Err(EngineError::InvalidParameter(format!(
                    "EWMA span must be >= 1, got {}",
                    span
                )))
            }
            _ => {}
        }
        if self.short_form_window == 0 || self.surface_window == 0 {
            return Err(EngineError::InvalidParameter(
                "Form windows must hold at least one observation".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.surface_damping) {
            return Err(EngineError::InvalidParameter(format!(
                "Surface damping must be within [0, 1], got {}",
                self.surface_damping
            )));
        }
        if self.max_rest_days < 0 {
            return Err(EngineError::InvalidParameter(
                "Maximum rest days cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mean of the last `capacity` observations
#[derive(Debug, Clone, PartialEq)]
pub struct RollingMean {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingMean {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Bias-adjusted exponentially weighted mean
///
/// Weights are `(1 - alpha)^i` for the i-th most recent observation,
/// normalised by their sum, so early values are not pulled towards zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Ewma {
    decay: f64,
    weighted_sum: f64,
    weight_total: f64,
}

impl Ewma {
    pub fn with_span(span: f64) -> Self {
        let alpha = 2.0 / (span.max(1.0) + 1.0);
        Self {
            decay: 1.0 - alpha,
            weighted_sum: 0.0,
            weight_total: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.weighted_sum = self.weighted_sum * self.decay + value;
        self.weight_total = self.weight_total * self.decay + 1.0;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.weight_total > 0.0 {
            Some(self.weighted_sum / self.weight_total)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Estimator {
    Window(RollingMean),
    Ewma(Ewma),
}

impl Estimator {
    fn new(smoothing: Smoothing) -> Self {
        match smoothing {
            Smoothing::Window(n) => Estimator::Window(RollingMean::new(n)),
            Smoothing::Ewma { span } => Estimator::Ewma(Ewma::with_span(span)),
        }
    }

    fn push(&mut self, value: f64) {
        match self {
            Estimator::Window(w) => w.push(value),
            Estimator::Ewma(e) => e.push(value),
        }
    }

    fn mean(&self) -> Option<f64> {
        match self {
            Estimator::Window(w) => w.mean(),
            Estimator::Ewma(e) => e.mean(),
        }
    }
}

/// Player profile as of a given match, from strictly earlier matches
///
/// `None` means the sample is insufficient; see [`FallbackPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub player: PlayerId,
    pub date: NaiveDate,
    pub surface: Surface,
    pub matches_played: u32,
    pub ace_rate: Option<f64>,
    pub double_fault_rate: Option<f64>,
    pub first_serve_in: Option<f64>,
    pub first_serve_won: Option<f64>,
    pub second_serve_won: Option<f64>,
    pub serve_points_won: Option<f64>,
    pub break_points_saved: Option<f64>,
    pub return_points_won: Option<f64>,
    pub form: Option<f64>,
    pub form_last_5: Option<f64>,
    pub avg_total_games: Option<f64>,
    pub surface_form: Option<f64>,
    pub surface_matches: usize,
    /// Surface form was derived from damped overall form
    pub surface_fallback: bool,
    pub rest_days: i64,
    /// No previous match: `rest_days` holds the neutral default
    pub rest_defaulted: bool,
}

/// Mutable per-player aggregation state
#[derive(Debug, Clone)]
pub struct PlayerFeatureState {
    estimators: Vec<Estimator>,
    short_form: RollingMean,
    surface_results: HashMap<Surface, RollingMean>,
    last_match: Option<NaiveDate>,
    matches: u32,
}

impl PlayerFeatureState {
    fn new(config: &FeatureConfig) -> Self {
        Self {
            estimators: Signal::ALL
                .iter()
                .map(|_| Estimator::new(config.smoothing))
                .collect(),
            short_form: RollingMean::new(config.short_form_window),
            surface_results: HashMap::new(),
            last_match: None,
            matches: 0,
        }
    }

    pub fn last_match(&self) -> Option<NaiveDate> {
        self.last_match
    }

    pub fn matches(&self) -> u32 {
        self.matches
    }

    fn mean(&self, signal: Signal) -> Option<f64> {
        self.estimators[signal.index()].mean()
    }

    fn snapshot(
        &self,
        config: &FeatureConfig,
        player: &PlayerId,
        date: NaiveDate,
        surface: Surface,
    ) -> FeatureSnapshot {
        let form = self.mean(Signal::Form);

        let surface_window = self.surface_results.get(&surface);
        let surface_matches = surface_window.map(RollingMean::len).unwrap_or(0);
        let (surface_form, surface_fallback) = if surface_matches >= config.surface_min_samples {
            (surface_window.and_then(RollingMean::mean), false)
        } else {
            (form.map(|f| f * config.surface_damping), true)
        };

        let (rest_days, rest_defaulted) = match self.last_match {
            Some(last) => ((date - last).num_days().clamp(0, config.max_rest_days), false),
            None => (config.default_rest_days, true),
        };

        FeatureSnapshot {
            player: player.clone(),
            date,
            surface,
            matches_played: self.matches,
            ace_rate: self.mean(Signal::AceRate),
            double_fault_rate: self.mean(Signal::DoubleFaultRate),
            first_serve_in: self.mean(Signal::FirstServeIn),
            first_serve_won: self.mean(Signal::FirstServeWon),
            second_serve_won: self.mean(Signal::SecondServeWon),
            serve_points_won: self.mean(Signal::ServePointsWon),
            break_points_saved: self.mean(Signal::BreakPointsSaved),
            return_points_won: self.mean(Signal::ReturnPointsWon),
            form,
            form_last_5: self.short_form.mean(),
            avg_total_games: self.mean(Signal::TotalGames),
            surface_form,
            surface_matches,
            surface_fallback,
            rest_days,
            rest_defaulted,
        }
    }

    fn push(&mut self, config: &FeatureConfig, date: NaiveDate, surface: Surface, signals: &MatchSignals) {
        for signal in Signal::ALL {
            if let Some(value) = signals.value(signal) {
                self.estimators[signal.index()].push(value);
            }
        }
        let result = if signals.won { 1.0 } else { 0.0 };
        self.short_form.push(result);
        self.surface_results
            .entry(surface)
            .or_insert_with(|| RollingMean::new(config.surface_window))
            .push(result);
        self.last_match = Some(date);
        self.matches += 1;
    }
}

/// Read-then-append feature aggregator
#[derive(Debug, Clone, Default)]
pub struct FeatureAggregator {
    config: FeatureConfig,
    players: HashMap<PlayerId, PlayerFeatureState>,
}

impl FeatureAggregator {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            players: HashMap::new(),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn state(&self, player: &PlayerId) -> Option<&PlayerFeatureState> {
        self.players.get(player)
    }

    /// Snapshot of `player` before this match, then fold the match in
    pub fn observe(
        &mut self,
        player: &PlayerId,
        match_date: NaiveDate,
        surface: Surface,
        signals: &MatchSignals,
    ) -> Result<FeatureSnapshot, EngineError> {
        self.check_order(player, match_date)?;
        let config = &self.config;
        let state = self
            .players
            .entry(player.clone())
            .or_insert_with(|| PlayerFeatureState::new(config));
        let snapshot = state.snapshot(config, player, match_date, surface);
        state.push(config, match_date, surface, signals);
        Ok(snapshot)
    }

    /// Observe both sides of a record; ordering is checked for both players
    /// before either is touched
    pub fn apply(
        &mut self,
        record: &MatchRecord,
    ) -> Result<(FeatureSnapshot, FeatureSnapshot), EngineError> {
        self.check_order(&record.player_a, record.date)?;
        self.check_order(&record.player_b, record.date)?;
        let a = self.observe(
            &record.player_a,
            record.date,
            record.surface,
            &MatchSignals::from_record(record, Side::A),
        )?;
        let b = self.observe(
            &record.player_b,
            record.date,
            record.surface,
            &MatchSignals::from_record(record, Side::B),
        )?;
        Ok((a, b))
    }

    /// Snapshot for an upcoming match, without appending anything
    pub fn peek(&self, player: &PlayerId, date: NaiveDate, surface: Surface) -> FeatureSnapshot {
        match self.players.get(player) {
            Some(state) => state.snapshot(&self.config, player, date, surface),
            None => PlayerFeatureState::new(&self.config).snapshot(&self.config, player, date, surface),
        }
    }

    /// Number of tracked players
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn check_order(&self, player: &PlayerId, date: NaiveDate) -> Result<(), EngineError> {
        if let Some(last) = self.players.get(player).and_then(|s| s.last_match) {
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
}

/// Defaults used to fill statistics with insufficient samples
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub ace_rate: f64,
    pub double_fault_rate: f64,
    pub first_serve_in: f64,
    pub first_serve_won: f64,
    pub second_serve_won: f64,
    pub serve_points_won: f64,
    pub break_points_saved: f64,
    pub return_points_won: f64,
    pub form: f64,
    pub avg_total_games: f64,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            ace_rate: 0.05,
            double_fault_rate: 0.035,
            first_serve_in: 0.60,
            first_serve_won: 0.70,
            second_serve_won: 0.50,
            serve_points_won: 0.62,
            break_points_saved: 0.55,
            return_points_won: 0.38,
            form: 0.5,
            avg_total_games: 23.0,
        }
    }
}

/// Fully resolved player profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerProfile {
    pub player: PlayerId,
    pub matches_played: u32,
    pub ace_rate: f64,
    pub double_fault_rate: f64,
    pub first_serve_in: f64,
    pub first_serve_won: f64,
    pub second_serve_won: f64,
    pub serve_points_won: f64,
    pub break_points_saved: f64,
    pub return_points_won: f64,
    pub form: f64,
    pub form_last_5: f64,
    pub avg_total_games: f64,
    pub surface_form: f64,
    pub rest_days: i64,
    /// Names of the fields filled from the policy
    pub imputed: Vec<&'static str>,
}

impl PlayerProfile {
    pub fn is_complete(&self) -> bool {
        self.imputed.is_empty()
    }
}

impl FeatureSnapshot {
    /// Resolve missing statistics with `policy`, recording which were filled
    pub fn resolve(&self, policy: &FallbackPolicy) -> PlayerProfile {
        let mut imputed = Vec::new();
        let mut pick = |value: Option<f64>, default: f64, name: &'static str| match value {
            Some(v) => v,
            None => {
                imputed.push(name);
                default
            }
        };

        let ace_rate = pick(self.ace_rate, policy.ace_rate, "ace_rate");
        let double_fault_rate = pick(self.double_fault_rate, policy.double_fault_rate, "double_fault_rate");
        let first_serve_in = pick(self.first_serve_in, policy.first_serve_in, "first_serve_in");
        let first_serve_won = pick(self.first_serve_won, policy.first_serve_won, "first_serve_won");
        let second_serve_won = pick(self.second_serve_won, policy.second_serve_won, "second_serve_won");
        let serve_points_won = pick(self.serve_points_won, policy.serve_points_won, "serve_points_won");
        let break_points_saved = pick(self.break_points_saved, policy.break_points_saved, "break_points_saved");
        let return_points_won = pick(self.return_points_won, policy.return_points_won, "return_points_won");
        let form = pick(self.form, policy.form, "form");
        let form_last_5 = pick(self.form_last_5, policy.form, "form_last_5");
        let avg_total_games = pick(self.avg_total_games, policy.avg_total_games, "avg_total_games");
        let surface_form = pick(self.surface_form, policy.form, "surface_form");

        PlayerProfile {
            player: self.player.clone(),
            matches_played: self.matches_played,
            ace_rate,
            double_fault_rate,
            first_serve_in,
            first_serve_won,
            second_serve_won,
            serve_points_won,
            break_points_saved,
            return_points_won,
            form,
            form_last_5,
            avg_total_games,
            surface_form,
            rest_days: self.rest_days,
            imputed,
        }
    }
}
