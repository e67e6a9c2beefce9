//! Replay, model, simulation and pricing wired together through the public API

use chrono::NaiveDate;
use tennis::data::{FallbackPolicy, HistoryReplay};
use tennis::markets::{derive_markets, FairOdds, MarketConfig};
use tennis::models::{BestOf, MatchOdds, MatchRecord, PlayerId, ServeCounters, Side, Surface};
use tennis::predictor::{BaselineServeModel, ServeProbabilities, ServeProbabilityModel};
use tennis::simulation::{MatchSimulator, SimulationConfig};

fn simulator(trials: usize, seed: u64) -> MatchSimulator {
    MatchSimulator::new(SimulationConfig {
        trials,
        seed: Some(seed),
        ..Default::default()
    })
    .unwrap()
}

fn counters(serve_points: u32, won: u32) -> ServeCounters {
    let first_in = serve_points * 6 / 10;
    let first_won = won * 7 / 10;
    ServeCounters {
        aces: Some(serve_points / 12),
        double_faults: Some(serve_points / 25),
        serve_points: Some(serve_points),
        first_in: Some(first_in),
        first_won: Some(first_won),
        second_won: Some(won - first_won),
        serve_games: Some(serve_points / 6),
        bp_saved: Some(3),
        bp_faced: Some(5),
    }
}

/// A round robin where "Server" holds far more often than everyone else
fn history() -> Vec<MatchRecord> {
    let start = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
    let players = ["Server", "Grinder", "Lefty", "Veteran"];
    let mut records = Vec::new();
    let mut day = 0;
    for round in 0..6 {
        for i in 0..players.len() {
            for j in (i + 1)..players.len() {
                let strong = players[i] == "Server" || (players[j] != "Server" && (round + i) % 2 == 0);
                let (sa, sb) = if players[i] == "Server" {
                    (counters(80, 58), counters(80, 42))
                } else {
                    (counters(80, 50), counters(80, 49))
                };
                records.push(MatchRecord {
                    date: start + chrono::Duration::days(day),
                    surface: if round % 3 == 0 { Surface::Clay } else { Surface::Hard },
                    best_of: BestOf::Three,
                    player_a: PlayerId::from(players[i]),
                    player_b: PlayerId::from(players[j]),
                    winner: if strong { Side::A } else { Side::B },
                    serve_a: sa,
                    serve_b: sb,
                    total_games: Some(21),
                    score: Some("6-4 7-5".to_string()),
                    odds: Some(MatchOdds { a: 1.6, b: 2.4 }),
                });
                day += 1;
            }
        }
    }
    records
}

#[test]
fn test_favoured_server_prices_shorter() {
    let population = simulator(5_000, 2024)
        .simulate(ServeProbabilities::new(0.70, 0.60), BestOf::Three)
        .unwrap();
    let book = derive_markets(&population, &MarketConfig::default()).unwrap();

    assert_eq!(book.trials, 5_000);
    // Favoured beyond three standard errors of the estimate
    let p = book.winner.probability_a;
    let stderr = (p * (1.0 - p) / book.trials as f64).sqrt();
    assert!(p - 3.0 * stderr > 0.5, "p = {}", p);
    assert!((book.winner.probability_a + book.winner.probability_b - 1.0).abs() < 1e-12);
    match (book.winner.odds_a, book.winner.odds_b) {
        (FairOdds::Decimal(a), FairOdds::Decimal(b)) => assert!(a < b),
        other => panic!("unexpected odds {:?}", other),
    }

    // Best of three lasts at least 12 games and at most 39
    assert!(book.mean_total_games >= 12.0 && book.mean_total_games <= 39.0);
    assert!(!book.over_under.is_empty());
    for pair in book.over_under.windows(2) {
        assert!(pair[1].over <= pair[0].over);
    }
}

#[test]
fn test_even_match_converges() {
    let population = simulator(5_000, 11)
        .simulate(ServeProbabilities::new(0.5, 0.5), BestOf::Three)
        .unwrap();
    let p = population.win_probability(Side::A).unwrap();
    assert!((p - 0.5).abs() < 0.03, "p = {}", p);
}

#[test]
fn test_extreme_probabilities_terminate() {
    for p in [0.45, 0.85] {
        let population = simulator(10_000, 5)
            .simulate(ServeProbabilities::new(p, p), BestOf::Five)
            .unwrap();
        assert_eq!(population.len(), 10_000);
    }
}

#[test]
fn test_history_to_markets() {
    let records = history();
    let mut replay = HistoryReplay::default();
    let snapshots = replay.replay_records(&records).unwrap();
    assert_eq!(snapshots.len(), records.len());

    let server = PlayerId::from("Server");
    let grinder = PlayerId::from("Grinder");

    // "Server" won every match, so leads the ledger
    let leaders = replay.ledger().leaderboard(1);
    assert_eq!(leaders[0].0, &server);

    let policy = FallbackPolicy::default();
    let date = records.last().unwrap().date.succ_opt().unwrap();
    let matchup = replay.matchup(&server, &grinder, date, Surface::Hard, BestOf::Three, &policy);
    assert!(matchup.rating_a > matchup.rating_b);
    assert!(matchup.profile_a.is_complete());

    let probabilities = BaselineServeModel::default().serve_probabilities(&matchup);
    assert!(probabilities.a > probabilities.b);

    let population = simulator(2_000, 99)
        .simulate(probabilities, BestOf::Three)
        .unwrap();
    let book = derive_markets(&population, &MarketConfig::default()).unwrap();
    assert!(book.winner.probability_a > book.winner.probability_b);
}

#[test]
fn test_prefix_replay_is_causal() {
    let records = history();
    let full = HistoryReplay::default().replay_records(&records).unwrap();

    let cut = records.len() / 2;
    let prefix = HistoryReplay::default()
        .replay_records(&records[..cut])
        .unwrap();

    for (a, b) in full.iter().zip(&prefix) {
        assert_eq!(a.ratings, b.ratings);
        assert_eq!(a.features_a, b.features_a);
        assert_eq!(a.features_b, b.features_b);
    }
}

#[test]
fn test_fixed_seed_reproduces_markets() {
    let probabilities = ServeProbabilities::new(0.66, 0.61);
    let first = simulator(1_500, 77)
        .simulate(probabilities, BestOf::Five)
        .unwrap();
    let second = simulator(1_500, 77)
        .simulate(probabilities, BestOf::Five)
        .unwrap();
    assert_eq!(first, second);
}
