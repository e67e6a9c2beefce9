//! Point → game → set → match scoring
//!
//! Game: first to 4 points with a 2-point lead, no cap (deuce/advantage).
//! Set: serve alternates every game; won at 6 with the opponent on 4 or
//! fewer, or 7-5. At 6-6 a tiebreak decides the set 7-6.
//! Tiebreak serve order: the player due to serve takes point 1, then serve
//! changes after every two points (A BB AA BB ...). The tiebreak receiver
//! serves first in the following set.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::parser::SetScore;
use crate::models::{BestOf, Side};
use crate::predictor::ServeProbabilities;

/// Points needed to win a standard game
const GAME_POINTS: u32 = 4;
/// Games needed to win a set
const SET_GAMES: u32 = 6;
/// Points needed to win a standard tiebreak
pub const TIEBREAK_POINTS: u32 = 7;

/// Source of point outcomes
pub trait PointSource {
    /// Whether `server` wins the next point
    fn server_wins(&mut self, server: Side) -> bool;
}

/// Bernoulli point draws from a random stream
pub struct RandomPoints<'a, R: Rng + ?Sized> {
    rng: &'a mut R,
    probabilities: ServeProbabilities,
}

impl<'a, R: Rng + ?Sized> RandomPoints<'a, R> {
    /// `probabilities` must already lie strictly inside (0, 1)
    pub fn new(rng: &'a mut R, probabilities: ServeProbabilities) -> Self {
        Self { rng, probabilities }
    }
}

impl<R: Rng + ?Sized> PointSource for RandomPoints<'_, R> {
    fn server_wins(&mut self, server: Side) -> bool {
        self.rng.gen::<f64>() < self.probabilities.for_side(server)
    }
}

fn index(side: Side) -> usize {
    match side {
        Side::A => 0,
        Side::B => 1,
    }
}

/// Side that reached `target` with a two-point lead, if any
fn decided(score: [u32; 2], target: u32) -> Option<Side> {
    let [a, b] = score;
    if a >= target && a >= b + 2 {
        Some(Side::A)
    } else if b >= target && b >= a + 2 {
        Some(Side::B)
    } else {
        None
    }
}

/// Play one service game and return its winner
pub fn play_game<P: PointSource + ?Sized>(points: &mut P, server: Side) -> Side {
    let mut score = [0u32; 2];
    loop {
        let winner = if points.server_wins(server) {
            server
        } else {
            server.other()
        };
        score[index(winner)] += 1;
        if let Some(side) = decided(score, GAME_POINTS) {
            return side;
        }
    }
}

/// Server of the `point`-th tiebreak point (0-based)
pub fn tiebreak_server(first_server: Side, point: u32) -> Side {
    if ((point + 1) / 2) % 2 == 0 {
        first_server
    } else {
        first_server.other()
    }
}

/// Play a tiebreak to `target` points (lead of two) and return the winner
/// with the final point score
pub fn play_tiebreak<P: PointSource + ?Sized>(
    points: &mut P,
    first_server: Side,
    target: u32,
) -> (Side, [u32; 2]) {
    let mut score = [0u32; 2];
    let mut played = 0;
    loop {
        let server = tiebreak_server(first_server, played);
        played += 1;
        let winner = if points.server_wins(server) {
            server
        } else {
            server.other()
        };
        score[index(winner)] += 1;
        if let Some(side) = decided(score, target) {
            return (side, score);
        }
    }
}

/// Outcome of one set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    pub score: SetScore,
    pub winner: Side,
    pub tiebreak: bool,
    /// Who serves the first game of the next set
    pub next_server: Side,
}

/// Play a full set
pub fn play_set<P: PointSource + ?Sized>(
    points: &mut P,
    first_server: Side,
    tiebreak_target: u32,
) -> SetOutcome {
    let mut games = [0u32; 2];
    let mut server = first_server;
    loop {
        if games == [SET_GAMES, SET_GAMES] {
            let (winner, _) = play_tiebreak(points, server, tiebreak_target);
            games[index(winner)] += 1;
            return SetOutcome {
                score: SetScore {
                    first: games[0],
                    second: games[1],
                },
                winner,
                tiebreak: true,
                next_server: server.other(),
            };
        }

        let winner = play_game(points, server);
        games[index(winner)] += 1;
        server = server.other();

        if let Some(winner) = decided(games, SET_GAMES) {
            return SetOutcome {
                score: SetScore {
                    first: games[0],
                    second: games[1],
                },
                winner,
                tiebreak: false,
                next_server: server,
            };
        }
    }
}

/// One simulated match; set scores read side A first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationTrial {
    pub winner: Side,
    pub games_a: u32,
    pub games_b: u32,
    pub sets: Vec<SetScore>,
    pub tiebreaks: u8,
}

impl SimulationTrial {
    pub fn total_games(&self) -> u32 {
        self.games_a + self.games_b
    }

    /// Games won minus games lost from `side`'s point of view
    pub fn game_differential(&self, side: Side) -> i32 {
        let diff = self.games_a as i32 - self.games_b as i32;
        match side {
            Side::A => diff,
            Side::B => -diff,
        }
    }

    pub fn sets_won(&self, side: Side) -> u8 {
        self.sets
            .iter()
            .filter(|s| match side {
                Side::A => s.first > s.second,
                Side::B => s.second > s.first,
            })
            .count() as u8
    }

    /// Sets score such as `"2-1"`, side A first
    pub fn set_score(&self) -> String {
        format!("{}-{}", self.sets_won(Side::A), self.sets_won(Side::B))
    }

    /// Full score line such as `"6-4 3-6 7-6"`, side A first
    pub fn score_line(&self) -> String {
        self.sets
            .iter()
            .map(|s| format!("{}-{}", s.first, s.second))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Play a full match
///
/// `final_set_tiebreak` is the point target of the tiebreak in a deciding
/// set (7 standard, 10 for the extended format).
pub fn simulate_match<P: PointSource + ?Sized>(
    points: &mut P,
    best_of: BestOf,
    first_server: Side,
    final_set_tiebreak: u32,
) -> SimulationTrial {
    let needed = best_of.sets_to_win();
    let mut sets_won = [0u8; 2];
    let mut sets = Vec::with_capacity(best_of.max_sets() as usize);
    let mut games = [0u32; 2];
    let mut tiebreaks = 0u8;
    let mut server = first_server;

    loop {
        let deciding = sets_won == [needed - 1, needed - 1];
        let target = if deciding {
            final_set_tiebreak
        } else {
            TIEBREAK_POINTS
        };

        let set = play_set(points, server, target);
        games[0] += set.score.first;
        games[1] += set.score.second;
        sets_won[index(set.winner)] += 1;
        tiebreaks += u8::from(set.tiebreak);
        sets.push(set.score);
        server = set.next_server;

        if sets_won[index(set.winner)] == needed {
            return SimulationTrial {
                winner: set.winner,
                games_a: games[0],
                games_b: games[1],
                sets,
                tiebreaks,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Server wins every point
    struct ServerAlwaysWins;

    impl PointSource for ServerAlwaysWins {
        fn server_wins(&mut self, _server: Side) -> bool {
            true
        }
    }

    /// One player wins every point regardless of serve
    struct Dominant(Side);

    impl PointSource for Dominant {
        fn server_wins(&mut self, server: Side) -> bool {
            server == self.0
        }
    }

    /// Holds serve for a fixed number of points, then `Dominant`
    struct HoldThen {
        holds_left: u32,
        then: Dominant,
    }

    impl PointSource for HoldThen {
        fn server_wins(&mut self, server: Side) -> bool {
            if self.holds_left > 0 {
                self.holds_left -= 1;
                true
            } else {
                self.then.server_wins(server)
            }
        }
    }

    /// Counts points delegated to the inner source
    struct Counting<P> {
        inner: P,
        points: u64,
    }

    impl<P: PointSource> PointSource for Counting<P> {
        fn server_wins(&mut self, server: Side) -> bool {
            self.points += 1;
            self.inner.server_wins(server)
        }
    }

    #[test]
    fn test_game_to_love() {
        let mut points = Counting {
            inner: ServerAlwaysWins,
            points: 0,
        };
        assert_eq!(play_game(&mut points, Side::B), Side::B);
        assert_eq!(points.points, 4);
    }

    #[test]
    fn test_set_to_love() {
        let set = play_set(&mut Dominant(Side::A), Side::B, TIEBREAK_POINTS);
        assert_eq!(set.score, SetScore { first: 6, second: 0 });
        assert_eq!(set.winner, Side::A);
        assert!(!set.tiebreak);
    }

    #[test]
    fn test_match_in_minimum_sets() {
        let three = simulate_match(&mut Dominant(Side::B), BestOf::Three, Side::A, 7);
        assert_eq!(three.winner, Side::B);
        assert_eq!(three.sets.len(), 2);
        assert_eq!(three.total_games(), 12);
        assert_eq!(three.set_score(), "0-2");
        assert_eq!(three.score_line(), "0-6 0-6");

        let five = simulate_match(&mut Dominant(Side::A), BestOf::Five, Side::A, 7);
        assert_eq!(five.sets.len(), 3);
        assert_eq!(five.game_differential(Side::A), 18);
        assert_eq!(five.game_differential(Side::B), -18);
    }

    #[test]
    fn test_forced_tiebreak_ends_seven_six() {
        // 12 held games of 4 points each reach 6-6
        let mut points = HoldThen {
            holds_left: 48,
            then: Dominant(Side::B),
        };
        let set = play_set(&mut points, Side::A, TIEBREAK_POINTS);
        assert!(set.tiebreak);
        assert_eq!(set.score, SetScore { first: 6, second: 7 });
        assert_eq!(set.winner, Side::B);
        // A served the first tiebreak point, so B opens the next set
        assert_eq!(set.next_server, Side::B);
    }

    #[test]
    fn test_tiebreak_serve_pattern() {
        let order: Vec<Side> = (0..7).map(|i| tiebreak_server(Side::A, i)).collect();
        assert_eq!(
            order,
            vec![Side::A, Side::B, Side::B, Side::A, Side::A, Side::B, Side::B]
        );
    }

    #[test]
    fn test_tiebreak_scores_are_valid() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let probs = ServeProbabilities::new(0.5, 0.5);
        for _ in 0..2_000 {
            let mut points = RandomPoints::new(&mut rng, probs);
            let (winner, score) = play_tiebreak(&mut points, Side::A, TIEBREAK_POINTS);
            let (w, l) = match winner {
                Side::A => (score[0], score[1]),
                Side::B => (score[1], score[0]),
            };
            assert!(w >= 7);
            assert!(w >= l + 2);
            assert!(w == 7 || w == l + 2);
        }
    }

    #[test]
    fn test_set_scores_are_valid() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let probs = ServeProbabilities::new(0.8, 0.8);
        let mut tiebreaks = 0;
        for _ in 0..2_000 {
            let mut points = RandomPoints::new(&mut rng, probs);
            let set = play_set(&mut points, Side::A, TIEBREAK_POINTS);
            let (w, l) = match set.winner {
                Side::A => (set.score.first, set.score.second),
                Side::B => (set.score.second, set.score.first),
            };
            match w {
                6 => assert!(l <= 4),
                7 => assert!(l == 5 || (l == 6 && set.tiebreak)),
                other => panic!("invalid set score {}-{}", other, l),
            }
            tiebreaks += u32::from(set.tiebreak);
        }
        assert!(tiebreaks > 0);
    }

    #[test]
    fn test_extended_final_set_tiebreak() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let probs = ServeProbabilities::new(0.85, 0.85);
        for _ in 0..200 {
            let mut points = RandomPoints::new(&mut rng, probs);
            let trial = simulate_match(&mut points, BestOf::Three, Side::A, 10);
            assert!(trial.sets.len() == 2 || trial.sets.len() == 3);
            assert_eq!(trial.sets_won(trial.winner), 2);
            for set in &trial.sets {
                assert!(set.first.max(set.second) <= 7);
            }
        }
    }

    #[test]
    fn test_games_terminate_at_clamp_bounds() {
        for p in [0.45, 0.85] {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            let probs = ServeProbabilities::new(p, p);
            let mut points = Counting {
                inner: RandomPoints::new(&mut rng, probs),
                points: 0,
            };
            let mut server = Side::A;
            for _ in 0..10_000 {
                play_game(&mut points, server);
                server = server.other();
            }
            assert!(points.points >= 40_000);
        }
    }
}
