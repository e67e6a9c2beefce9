use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::data::parser::ScoreParser;
use crate::error::EngineError;

/// Player identifier as it appears in the source data (e.g. "Sinner J.")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Court surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Surface {
    Hard,
    Clay,
    Grass,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Hard, Surface::Clay, Surface::Grass];
}

impl FromStr for Surface {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" | "h" => Ok(Surface::Hard),
            "clay" | "c" => Ok(Surface::Clay),
            "grass" | "g" => Ok(Surface::Grass),
            // Indoor carpet plays closest to hard courts
            "carpet" => Ok(Surface::Hard),
            other => Err(EngineError::Data(format!("Unknown surface: {:?}", other))),
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Surface::Hard => "Hard",
            Surface::Clay => "Clay",
            Surface::Grass => "Grass",
        };
        f.write_str(name)
    }
}

/// Match format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BestOf {
    Three,
    Five,
}

impl BestOf {
    /// Sets needed to win the match
    pub fn sets_to_win(self) -> u8 {
        match self {
            BestOf::Three => 2,
            BestOf::Five => 3,
        }
    }

    pub fn max_sets(self) -> u8 {
        self.sets_to_win() * 2 - 1
    }
}

impl TryFrom<u32> for BestOf {
    type Error = EngineError;

    fn try_from(sets: u32) -> Result<Self, Self::Error> {
        match sets {
            3 => Ok(BestOf::Three),
            5 => Ok(BestOf::Five),
            other => Err(EngineError::Data(format!(
                "Best-of must be 3 or 5, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for BestOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "best of {}", self.max_sets())
    }
}

/// One of the two participants in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Raw per-player serve counters; every counter may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServeCounters {
    pub aces: Option<u32>,
    pub double_faults: Option<u32>,
    pub serve_points: Option<u32>,
    pub first_in: Option<u32>,
    pub first_won: Option<u32>,
    pub second_won: Option<u32>,
    pub serve_games: Option<u32>,
    pub bp_saved: Option<u32>,
    pub bp_faced: Option<u32>,
}

impl ServeCounters {
    /// Total serve points won, when both first and second serve counts exist
    pub fn points_won(&self) -> Option<u32> {
        Some(self.first_won? + self.second_won?)
    }
}

/// Closing decimal odds for both sides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
    pub a: f64,
    pub b: f64,
}

impl MatchOdds {
    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

/// Validated, immutable match fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub surface: Surface,
    pub best_of: BestOf,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub winner: Side,
    pub serve_a: ServeCounters,
    pub serve_b: ServeCounters,
    pub total_games: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odds: Option<MatchOdds>,
}

impl MatchRecord {
    pub fn player(&self, side: Side) -> &PlayerId {
        match side {
            Side::A => &self.player_a,
            Side::B => &self.player_b,
        }
    }

    pub fn serve(&self, side: Side) -> &ServeCounters {
        match side {
            Side::A => &self.serve_a,
            Side::B => &self.serve_b,
        }
    }

    pub fn won(&self, side: Side) -> bool {
        self.winner == side
    }
}

/// Unvalidated ingestion row
#[derive(Debug, Clone, Default)]
pub struct RawMatchRow {
    pub date: Option<String>,
    pub surface: Option<String>,
    pub best_of: Option<u32>,
    pub player_a: Option<String>,
    pub player_b: Option<String>,
    pub winner: Option<String>,
    pub serve_a: ServeCounters,
    pub serve_b: ServeCounters,
    pub score: Option<String>,
    pub odds_a: Option<f64>,
    pub odds_b: Option<f64>,
}

impl RawMatchRow {
    /// Validate the row into a `MatchRecord`
    ///
    /// Fails with `EngineError::Data` on any missing or malformed required
    /// field. A missing best-of defaults to three sets.
    pub fn validate(self, scores: &ScoreParser) -> Result<MatchRecord, EngineError> {
        let date = parse_date(required(self.date.as_deref(), "date")?)?;
        let surface: Surface = required(self.surface.as_deref(), "surface")?.parse()?;
        let best_of = BestOf::try_from(self.best_of.unwrap_or(3))?;

        let player_a = required(self.player_a.as_deref(), "player_a")?.to_string();
        let player_b = required(self.player_b.as_deref(), "player_b")?.to_string();
        if player_a == player_b {
            return Err(EngineError::Data(format!(
                "Player {} cannot play against themselves",
                player_a
            )));
        }

        let winner_name = required(self.winner.as_deref(), "winner")?;
        let winner = if winner_name == player_a {
            Side::A
        } else if winner_name == player_b {
            Side::B
        } else {
            return Err(EngineError::Data(format!(
                "Winner {:?} is neither {} nor {}",
                winner_name, player_a, player_b
            )));
        };

        let total_games = self.score.as_deref().and_then(|s| scores.total_games(s));

        let odds = match (self.odds_a, self.odds_b) {
            (Some(a), Some(b)) if a > 1.0 && b > 1.0 && a.is_finite() && b.is_finite() => {
                Some(MatchOdds { a, b })
            }
            _ => None,
        };

        Ok(MatchRecord {
            date,
            surface,
            best_of,
            player_a: PlayerId::new(player_a),
            player_b: PlayerId::new(player_b),
            winner,
            serve_a: self.serve_a,
            serve_b: self.serve_b,
            total_games,
            score: self.score,
            odds,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, EngineError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EngineError::Data(format!("Missing required field: {}", field))),
    }
}

/// Parse `YYYY-MM-DD`, `YYYYMMDD` or a timestamp starting with a date
pub fn parse_date(value: &str) -> Result<NaiveDate, EngineError> {
    let value = value.trim();
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .map_err(|_| EngineError::Data(format!("Unparseable date: {:?}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row() -> RawMatchRow {
        RawMatchRow {
            date: Some("2024-01-15".to_string()),
            surface: Some("Hard".to_string()),
            best_of: Some(5),
            player_a: Some("Sinner J.".to_string()),
            player_b: Some("Medvedev D.".to_string()),
            winner: Some("Sinner J.".to_string()),
            score: Some("3-6 3-6 6-4 6-4 6-3".to_string()),
            odds_a: Some(1.45),
            odds_b: Some(2.80),
            ..Default::default()
        }
    }

    #[test]
    fn test_surface_parse() {
        assert_eq!("clay".parse::<Surface>().unwrap(), Surface::Clay);
        assert_eq!(" Grass ".parse::<Surface>().unwrap(), Surface::Grass);
        assert_eq!("Carpet".parse::<Surface>().unwrap(), Surface::Hard);
        assert!("sand".parse::<Surface>().is_err());
    }

    #[test]
    fn test_best_of() {
        assert_eq!(BestOf::try_from(3).unwrap().sets_to_win(), 2);
        assert_eq!(BestOf::try_from(5).unwrap().sets_to_win(), 3);
        assert_eq!(BestOf::Five.max_sets(), 5);
        assert!(BestOf::try_from(4).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15").unwrap(), expected);
        assert_eq!(parse_date("20240115").unwrap(), expected);
        assert_eq!(parse_date("2024-01-15 00:00:00").unwrap(), expected);
        assert!(parse_date("15/01/2024").is_err());
    }

    #[test]
    fn test_validate_row() {
        let record = raw_row().validate(&ScoreParser::new()).unwrap();
        assert_eq!(record.winner, Side::A);
        assert_eq!(record.best_of, BestOf::Five);
        assert_eq!(record.total_games, Some(47));
        assert_eq!(record.odds, Some(MatchOdds { a: 1.45, b: 2.80 }));
        assert_eq!(record.player(Side::B).as_str(), "Medvedev D.");
    }

    #[test]
    fn test_validate_rejects_missing_winner() {
        let row = RawMatchRow {
            winner: None,
            ..raw_row()
        };
        let err = row.validate(&ScoreParser::new()).unwrap_err();
        assert!(matches!(err, EngineError::Data(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_winner() {
        let row = RawMatchRow {
            winner: Some("Alcaraz C.".to_string()),
            ..raw_row()
        };
        assert!(row.validate(&ScoreParser::new()).is_err());
    }

    #[test]
    fn test_validate_defaults_best_of_three() {
        let row = RawMatchRow {
            best_of: None,
            ..raw_row()
        };
        let record = row.validate(&ScoreParser::new()).unwrap();
        assert_eq!(record.best_of, BestOf::Three);
    }

    #[test]
    fn test_validate_drops_invalid_odds() {
        let row = RawMatchRow {
            odds_b: Some(0.0),
            ..raw_row()
        };
        let record = row.validate(&ScoreParser::new()).unwrap();
        assert!(record.odds.is_none());
    }

    #[test]
    fn test_retirement_has_no_total() {
        let row = RawMatchRow {
            score: Some("6-4 2-1 RET".to_string()),
            ..raw_row()
        };
        let record = row.validate(&ScoreParser::new()).unwrap();
        assert_eq!(record.total_games, None);
    }

    #[test]
    fn test_points_won() {
        let counters = ServeCounters {
            first_won: Some(30),
            second_won: Some(12),
            ..Default::default()
        };
        assert_eq!(counters.points_won(), Some(42));
        assert_eq!(ServeCounters::default().points_won(), None);
    }
}
