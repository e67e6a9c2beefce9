//! Match score parser
//!
//! Turns a recorded score such as `"7-6(4) 3-6 6-2"` into per-set game
//! counts and a total-games figure.
//!
//! # Example
//!
//! ```
//! use tennis::data::parser::ScoreParser;
//!
//! let parser = ScoreParser::new();
//! assert_eq!(parser.total_games("6-4 7-6(5)"), Some(23));
//! assert_eq!(parser.total_games("6-4 2-1 RET"), None);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Games won by each side in one set, in the order they appear in the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetScore {
    pub first: u32,
    pub second: u32,
}

impl SetScore {
    pub fn games(&self) -> u32 {
        self.first + self.second
    }
}

/// Parser for textual match scores
pub struct ScoreParser {
    set_pattern: Regex,
    tiebreak_pattern: Regex,
}

impl Default for ScoreParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreParser {
    pub fn new() -> Self {
        Self {
            set_pattern: Regex::new(r"(\d+)-(\d+)").expect("static set pattern"),
            tiebreak_pattern: Regex::new(r"\([^)]*\)").expect("static tiebreak pattern"),
        }
    }

    /// Whether the score marks an incomplete match (retirement, walkover, default)
    pub fn is_incomplete(&self, score: &str) -> bool {
        let upper = score.to_ascii_uppercase();
        upper.contains("RET") || upper.contains("W/O") || upper.contains("DEF") || upper.contains("ABN")
    }

    /// Parse set scores, ignoring tiebreak point counts in parentheses
    ///
    /// Returns `None` for incomplete matches or scores with no sets.
    pub fn parse_sets(&self, score: &str) -> Option<Vec<SetScore>> {
        if self.is_incomplete(score) {
            return None;
        }

        let stripped = self.tiebreak_pattern.replace_all(score, " ");
        let sets: Vec<SetScore> = self
            .set_pattern
            .captures_iter(&stripped)
            .filter_map(|caps| {
                let first = caps[1].parse::<u32>().ok()?;
                let second = caps[2].parse::<u32>().ok()?;
                Some(SetScore { first, second })
            })
            .collect();

        if sets.is_empty() {
            None
        } else {
            Some(sets)
        }
    }

    /// Total games played, `None` when the score is incomplete or unparseable
    pub fn total_games(&self, score: &str) -> Option<u32> {
        self.parse_sets(score)
            .map(|sets| sets.iter().map(SetScore::games).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_sets() {
        let parser = ScoreParser::new();
        assert_eq!(parser.total_games("6-4 6-3"), Some(19));
    }

    #[test]
    fn test_tiebreak_points_ignored() {
        let parser = ScoreParser::new();
        let sets = parser.parse_sets("7-6(7-5) 6-7(3) 6-4").unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0], SetScore { first: 7, second: 6 });
        assert_eq!(sets[1], SetScore { first: 6, second: 7 });
        assert_eq!(parser.total_games("7-6(7-5) 6-7(3) 6-4"), Some(36));
    }

    #[test]
    fn test_incomplete_matches() {
        let parser = ScoreParser::new();
        assert_eq!(parser.total_games("6-4 3-1 RET"), None);
        assert_eq!(parser.total_games("W/O"), None);
        assert_eq!(parser.total_games("6-2 Def."), None);
        assert!(parser.is_incomplete("w/o"));
    }

    #[test]
    fn test_unparseable() {
        let parser = ScoreParser::new();
        assert_eq!(parser.total_games(""), None);
        assert_eq!(parser.total_games("unknown"), None);
    }
}
