//! Match History Replay
//!
//! Single ordered pass over the match history feeding the rating ledger and
//! the feature aggregator, producing the pre-match view of every match.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::core::elo::{MatchRatings, RatingConfig, RatingLedger};
use crate::data::features::{FallbackPolicy, FeatureAggregator, FeatureConfig, FeatureSnapshot};
use crate::data::parser::ScoreParser;
use crate::error::EngineError;
use crate::models::{BestOf, MatchRecord, PlayerId, RawMatchRow, Side, Surface};
use crate::predictor::Matchup;

/// Head-to-head record between two players, from the first player's view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeadToHead {
    pub wins: u32,
    pub losses: u32,
}

impl HeadToHead {
    pub fn played(&self) -> u32 {
        self.wins + self.losses
    }
}

/// Everything known about a match before it was played
#[derive(Debug, Clone, Serialize)]
pub struct MatchSnapshot {
    pub index: usize,
    pub record: MatchRecord,
    pub ratings: MatchRatings,
    pub features_a: FeatureSnapshot,
    pub features_b: FeatureSnapshot,
    pub head_to_head: HeadToHead,
}

impl MatchSnapshot {
    pub fn features(&self, side: Side) -> &FeatureSnapshot {
        match side {
            Side::A => &self.features_a,
            Side::B => &self.features_b,
        }
    }

    /// Probability model input for this match
    pub fn matchup(&self, policy: &FallbackPolicy) -> Matchup {
        Matchup {
            player_a: self.record.player_a.clone(),
            player_b: self.record.player_b.clone(),
            surface: self.record.surface,
            best_of: self.record.best_of,
            rating_a: self.ratings.a,
            rating_b: self.ratings.b,
            profile_a: self.features_a.resolve(policy),
            profile_b: self.features_b.resolve(policy),
        }
    }
}

/// Replay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub processed: usize,
    pub rejected: usize,
}

/// Owner of all per-player state for one processing run
#[derive(Debug, Clone, Default)]
pub struct HistoryReplay {
    ledger: RatingLedger,
    aggregator: FeatureAggregator,
    head_to_head: HashMap<(PlayerId, PlayerId), u32>,
    summary: ReplaySummary,
}

impl HistoryReplay {
    pub fn new(rating: RatingConfig, features: FeatureConfig) -> Self {
        Self {
            ledger: RatingLedger::new(rating),
            aggregator: FeatureAggregator::new(features),
            head_to_head: HashMap::new(),
            summary: ReplaySummary::default(),
        }
    }

    pub fn ledger(&self) -> &RatingLedger {
        &self.ledger
    }

    pub fn aggregator(&self) -> &FeatureAggregator {
        &self.aggregator
    }

    pub fn summary(&self) -> ReplaySummary {
        self.summary
    }

    /// Head-to-head of `player` against `opponent` so far
    pub fn head_to_head(&self, player: &PlayerId, opponent: &PlayerId) -> HeadToHead {
        let wins_of = |w: &PlayerId, l: &PlayerId| {
            self.head_to_head
                .get(&(w.clone(), l.clone()))
                .copied()
                .unwrap_or(0)
        };
        HeadToHead {
            wins: wins_of(player, opponent),
            losses: wins_of(opponent, player),
        }
    }

    /// Process one validated record
    ///
    /// An `OrderingViolation` leaves every piece of state untouched.
    pub fn process(&mut self, record: &MatchRecord) -> Result<MatchSnapshot, EngineError> {
        let head_to_head = self.head_to_head(&record.player_a, &record.player_b);
        let ratings = self.ledger.apply(record)?;
        let (features_a, features_b) = self.aggregator.apply(record)?;

        let winner = record.player(record.winner).clone();
        let loser = record.player(record.winner.other()).clone();
        *self.head_to_head.entry((winner, loser)).or_insert(0) += 1;

        let index = self.summary.processed;
        self.summary.processed += 1;

        Ok(MatchSnapshot {
            index,
            record: record.clone(),
            ratings,
            features_a,
            features_b,
            head_to_head,
        })
    }

    /// Replay validated records in order
    ///
    /// Records the ledger refuses are logged and skipped; the first fatal
    /// error aborts the pass.
    pub fn replay_records<'a, I>(&mut self, records: I) -> Result<Vec<MatchSnapshot>, EngineError>
    where
        I: IntoIterator<Item = &'a MatchRecord>,
    {
        let mut snapshots = Vec::new();
        for (record_no, record) in records.into_iter().enumerate() {
            if let Some(snapshot) = self.process_or_skip(record, record_no + 1)? {
                snapshots.push(snapshot);
            }
        }
        info!(
            "Replayed {} matches ({} rejected), {} players rated",
            self.summary.processed,
            self.summary.rejected,
            self.ledger.len()
        );
        Ok(snapshots)
    }

    /// Validate and replay raw rows
    ///
    /// Malformed rows are logged and skipped; ordering violations abort.
    pub fn replay_rows<I>(&mut self, rows: I) -> Result<Vec<MatchSnapshot>, EngineError>
    where
        I: IntoIterator<Item = RawMatchRow>,
    {
        let parser = ScoreParser::new();
        let mut snapshots = Vec::new();

        for (row_no, row) in rows.into_iter().enumerate() {
            let record = match row.validate(&parser) {
                Ok(record) => record,
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping row {}: {}", row_no + 1, e);
                    self.summary.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(snapshot) = self.process_or_skip(&record, row_no + 1)? {
                snapshots.push(snapshot);
            }
        }

        info!(
            "Replayed {} matches ({} rejected), {} players rated",
            self.summary.processed,
            self.summary.rejected,
            self.ledger.len()
        );
        Ok(snapshots)
    }

    /// `process`, turning a non-fatal rejection into a counted skip
    fn process_or_skip(
        &mut self,
        record: &MatchRecord,
        position: usize,
    ) -> Result<Option<MatchSnapshot>, EngineError> {
        match self.process(record) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if !e.is_fatal() => {
                warn!("Skipping record {}: {}", position, e);
                self.summary.rejected += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Probability model input for an upcoming match, without mutating state
    pub fn matchup(
        &self,
        player_a: &PlayerId,
        player_b: &PlayerId,
        date: NaiveDate,
        surface: Surface,
        best_of: BestOf,
        policy: &FallbackPolicy,
    ) -> Matchup {
        let ratings = self.ledger.preview(player_a, player_b);
        let profile_a = self.aggregator.peek(player_a, date, surface).resolve(policy);
        let profile_b = self.aggregator.peek(player_b, date, surface).resolve(policy);
        debug!(
            "Matchup {} ({:.0}) vs {} ({:.0}) on {}",
            player_a, ratings.a, player_b, ratings.b, surface
        );

        Matchup {
            player_a: player_a.clone(),
            player_b: player_b.clone(),
            surface,
            best_of,
            rating_a: ratings.a,
            rating_b: ratings.b,
            profile_a,
            profile_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServeCounters;

    fn counters(seed: u32) -> ServeCounters {
        ServeCounters {
            aces: Some(seed % 9),
            double_faults: Some(seed % 4),
            serve_points: Some(70 + seed % 20),
            first_in: Some(40 + seed % 10),
            first_won: Some(30 + seed % 8),
            second_won: Some(10 + seed % 6),
            serve_games: Some(10),
            bp_saved: Some(seed % 5),
            bp_faced: Some(seed % 7),
        }
    }

    fn history() -> Vec<MatchRecord> {
        let players = ["A", "B", "C", "D"];
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..24u32)
            .map(|i| {
                let a = players[(i % 4) as usize];
                let b = players[((i + 1 + i / 4) % 4) as usize];
                let b = if a == b { players[((i + 2) % 4) as usize] } else { b };
                MatchRecord {
                    date: start + chrono::Duration::days(i as i64 * 3),
                    surface: Surface::ALL[(i % 3) as usize],
                    best_of: BestOf::Three,
                    player_a: PlayerId::from(a),
                    player_b: PlayerId::from(b),
                    winner: if i % 3 == 0 { Side::B } else { Side::A },
                    serve_a: counters(i),
                    serve_b: counters(i * 7 + 3),
                    total_games: Some(18 + i % 10),
                    score: None,
                    odds: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_prefix_replay_is_identical() {
        let records = history();
        let mut full = HistoryReplay::default();
        let full_snaps = full.replay_records(&records).unwrap();

        let k = 15;
        let mut truncated = HistoryReplay::default();
        let prefix_snaps = truncated.replay_records(&records[..k]).unwrap();

        for (p, f) in prefix_snaps.iter().zip(&full_snaps) {
            assert_eq!(p.ratings, f.ratings);
            assert_eq!(p.features_a, f.features_a);
            assert_eq!(p.features_b, f.features_b);
            assert_eq!(p.head_to_head, f.head_to_head);
        }
    }

    #[test]
    fn test_mutating_later_matches_does_not_leak() {
        let records = history();
        let mut mutated = records.clone();
        for r in mutated.iter_mut().skip(10) {
            r.winner = r.winner.other();
            r.serve_a = ServeCounters::default();
        }

        let base = HistoryReplay::default().replay_records(&records).unwrap();
        let changed = HistoryReplay::default().replay_records(&mutated).unwrap();

        for i in 0..=10 {
            assert_eq!(base[i].ratings, changed[i].ratings);
            assert_eq!(base[i].features_a, changed[i].features_a);
        }
        assert_ne!(base[12].ratings, changed[12].ratings);
    }

    #[test]
    fn test_replay_is_reproducible() {
        let records = history();
        let first = HistoryReplay::default().replay_records(&records).unwrap();
        let second = HistoryReplay::default().replay_records(&records).unwrap();
        for (x, y) in first.iter().zip(&second) {
            assert_eq!(x.ratings, y.ratings);
            assert_eq!(x.features_a, y.features_a);
        }
    }

    #[test]
    fn test_rejected_rows_are_skipped() {
        let good = RawMatchRow {
            date: Some("2024-02-01".to_string()),
            surface: Some("Clay".to_string()),
            player_a: Some("A".to_string()),
            player_b: Some("B".to_string()),
            winner: Some("A".to_string()),
            score: Some("6-3 6-4".to_string()),
            ..Default::default()
        };
        let no_winner = RawMatchRow {
            winner: None,
            ..good.clone()
        };

        let mut replay = HistoryReplay::default();
        let snaps = replay.replay_rows(vec![good.clone(), no_winner, good]).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(replay.summary(), ReplaySummary { processed: 2, rejected: 1 });
        assert_eq!(snaps[1].head_to_head, HeadToHead { wins: 1, losses: 0 });
    }

    #[test]
    fn test_refused_record_is_skipped() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        let record = |date, a: &str, b: &str| MatchRecord {
            date,
            surface: Surface::Hard,
            best_of: BestOf::Three,
            player_a: PlayerId::from(a),
            player_b: PlayerId::from(b),
            winner: Side::A,
            serve_a: ServeCounters::default(),
            serve_b: ServeCounters::default(),
            total_games: None,
            score: None,
            odds: None,
        };
        let records = vec![
            record(day(1), "A", "B"),
            record(day(2), "C", "C"),
            record(day(3), "A", "B"),
        ];

        let mut replay = HistoryReplay::default();
        let snaps = replay.replay_records(&records).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(replay.summary(), ReplaySummary { processed: 2, rejected: 1 });
        assert_eq!(snaps[1].record.date, day(3));
        assert_eq!(snaps[1].index, 1);
        assert_eq!(snaps[1].head_to_head, HeadToHead { wins: 1, losses: 0 });
        assert!(replay.ledger().state(&PlayerId::from("C")).is_none());
    }

    #[test]
    fn test_out_of_order_rows_abort() {
        let row = |date: &str| RawMatchRow {
            date: Some(date.to_string()),
            surface: Some("Hard".to_string()),
            player_a: Some("A".to_string()),
            player_b: Some("B".to_string()),
            winner: Some("B".to_string()),
            ..Default::default()
        };
        let mut replay = HistoryReplay::default();
        let err = replay
            .replay_rows(vec![row("2024-03-10"), row("2024-03-01")])
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderingViolation { .. }));
        assert_eq!(replay.ledger().updates(), 1);
    }

    #[test]
    fn test_matchup_does_not_mutate() {
        let records = history();
        let mut replay = HistoryReplay::default();
        replay.replay_records(&records).unwrap();
        let before = replay.ledger().rating(&PlayerId::from("A"));

        let matchup = replay.matchup(
            &PlayerId::from("A"),
            &PlayerId::from("Newcomer"),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            Surface::Grass,
            BestOf::Five,
            &FallbackPolicy::default(),
        );
        assert_eq!(matchup.rating_a, before);
        assert_eq!(matchup.rating_b, replay.ledger().config().base_rating);
        assert!(!matchup.profile_b.is_complete());
        assert_eq!(replay.ledger().rating(&PlayerId::from("A")), before);
    }
}
