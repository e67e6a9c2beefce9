//! Tennis CLI - match simulation, ratings and market pricing

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tennis::backtesting::metrics::{analyze_by_odds_range, analyze_by_surface};
use tennis::backtesting::{BacktestResult, BacktestSimulator};
use tennis::core::KellyCalculator;
use tennis::data::{load_match_rows, FeatureSnapshot, HistoryReplay, MatchSnapshot};
use tennis::markets::{assess_winner, derive_markets, MarketBook, ValueAssessment};
use tennis::models::{parse_date, BestOf, MatchOdds, PlayerId, Surface};
use tennis::predictor::{BaselineServeModel, ServeProbabilities, ServeProbabilityModel};
use tennis::simulation::{MatchSimulator, PopulationSummary};
use tennis::EngineConfig;

#[derive(Parser)]
#[command(name = "tennis")]
#[command(author, version, about = "Tennis match outcome engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "TENNIS_LOG", default_value = "warn")]
    log_level: Level,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a match from two serve-point probabilities
    Simulate {
        /// Probability that player A wins a point on serve
        #[arg(long)]
        pa: f64,

        /// Probability that player B wins a point on serve
        #[arg(long)]
        pb: f64,

        /// Match format (3 or 5)
        #[arg(long, default_value = "3")]
        best_of: u32,

        /// Number of trials (overrides config)
        #[arg(long)]
        trials: Option<usize>,

        /// Master seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Replay a match history and show the rating leaderboard
    Ratings {
        /// Match history CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Number of players to show
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Show a player's causal feature snapshot
    Profile {
        /// Match history CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Player name as it appears in the data
        #[arg(short, long)]
        player: String,

        /// As-of date (YYYY-MM-DD); defaults to the day after the last match
        #[arg(long)]
        date: Option<String>,

        #[arg(long, default_value = "hard")]
        surface: Surface,
    },

    /// Price an upcoming match from history
    Predict {
        /// Match history CSV
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        player_a: String,

        #[arg(long)]
        player_b: String,

        #[arg(long, default_value = "hard")]
        surface: Surface,

        /// Match format (3 or 5)
        #[arg(long, default_value = "3")]
        best_of: u32,

        /// Match date (YYYY-MM-DD); defaults to the day after the last match
        #[arg(long)]
        date: Option<String>,

        /// Quoted decimal odds for player A
        #[arg(long, requires = "odds_b")]
        odds_a: Option<f64>,

        /// Quoted decimal odds for player B
        #[arg(long, requires = "odds_a")]
        odds_b: Option<f64>,

        /// Bankroll for Kelly sizing
        #[arg(long, default_value = "1000")]
        bankroll: f64,
    },

    /// Walk-forward evaluation over a match history
    Backtest {
        /// Match history CSV
        #[arg(short, long)]
        data: PathBuf,

        /// First evaluated date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Trials per match (overrides config)
        #[arg(long)]
        trials: Option<usize>,

        /// Flat stake per bet
        #[arg(long)]
        stake: Option<f64>,

        /// Size stakes with fractional Kelly instead of flat stakes
        #[arg(long)]
        kelly: bool,

        /// Use margined model odds when quotes are missing
        #[arg(long)]
        synthetic_odds: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    let config = EngineConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration{}",
            cli.config
                .as_ref()
                .map(|p| format!(" from {:?}", p))
                .unwrap_or_default()
        )
    })?;

    match cli.command {
        Commands::Simulate {
            pa,
            pb,
            best_of,
            trials,
            seed,
        } => run_simulate(config, pa, pb, best_of, trials, seed, cli.json),
        Commands::Ratings { data, top } => run_ratings(&config, &data, top, cli.json),
        Commands::Profile {
            data,
            player,
            date,
            surface,
        } => run_profile(&config, &data, &player, date.as_deref(), surface, cli.json),
        Commands::Predict {
            data,
            player_a,
            player_b,
            surface,
            best_of,
            date,
            odds_a,
            odds_b,
            bankroll,
        } => {
            let quotes = match (odds_a, odds_b) {
                (Some(a), Some(b)) => Some(MatchOdds { a, b }),
                _ => None,
            };
            let fixture = Fixture {
                player_a: PlayerId::new(player_a),
                player_b: PlayerId::new(player_b),
                surface,
                best_of: parse_best_of(best_of)?,
                date: date.as_deref().map(parse_date).transpose()?,
            };
            run_predict(&config, &data, &fixture, quotes, bankroll, cli.json)
        }
        Commands::Backtest {
            data,
            start,
            trials,
            stake,
            kelly,
            synthetic_odds,
        } => {
            let mut config = config;
            let backtest = &mut config.backtest;
            backtest.start_date = start.as_deref().map(parse_date).transpose()?;
            if let Some(trials) = trials {
                backtest.trials = trials;
            }
            if let Some(stake) = stake {
                backtest.flat_stake = stake;
            }
            backtest.use_kelly |= kelly;
            backtest.use_synthetic_odds |= synthetic_odds;
            run_backtest(&config, &data, cli.json)
        }
    }
}

struct Fixture {
    player_a: PlayerId,
    player_b: PlayerId,
    surface: Surface,
    best_of: BestOf,
    date: Option<NaiveDate>,
}

fn parse_best_of(value: u32) -> Result<BestOf> {
    BestOf::try_from(value).with_context(|| format!("Unsupported match format: best of {}", value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid progress template")?,
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Load and replay a match history CSV
fn load_history(config: &EngineConfig, path: &Path) -> Result<(HistoryReplay, Vec<MatchSnapshot>)> {
    let pb = spinner("Loading match history...")?;

    let rows =
        load_match_rows(path).with_context(|| format!("Failed to load matches from {:?}", path))?;
    let mut replay = HistoryReplay::new(config.rating.clone(), config.features.clone());
    let snapshots = replay
        .replay_rows(rows)
        .with_context(|| format!("Failed to replay {:?}", path))?;

    pb.finish_and_clear();
    let summary = replay.summary();
    if summary.rejected > 0 {
        eprintln!(
            "{} {} rows rejected, {} replayed",
            "!".yellow(),
            summary.rejected,
            summary.processed
        );
    }
    Ok((replay, snapshots))
}

fn as_of_date(date: Option<NaiveDate>, snapshots: &[MatchSnapshot]) -> NaiveDate {
    date.or_else(|| snapshots.last().and_then(|s| s.record.date.succ_opt()))
        .unwrap_or_else(|| chrono::Local::now().date_naive())
}

fn run_simulate(
    mut config: EngineConfig,
    pa: f64,
    pb: f64,
    best_of: u32,
    trials: Option<usize>,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    if let Some(trials) = trials {
        config.simulation.trials = trials;
    }
    if seed.is_some() {
        config.simulation.seed = seed;
    }
    let best_of = parse_best_of(best_of)?;

    let simulator = MatchSimulator::new(config.simulation.clone())?;
    let population = simulator
        .simulate(ServeProbabilities::new(pa, pb), best_of)
        .context("Simulation failed")?;
    let book = derive_markets(&population, &config.market)?;

    if json {
        #[derive(Serialize)]
        struct Output<'a> {
            summary: Option<PopulationSummary>,
            markets: &'a MarketBook,
        }
        return print_json(&Output {
            summary: population.summary(),
            markets: &book,
        });
    }

    println!(
        "{} p(A serve) = {:.3}, p(B serve) = {:.3}, {}, {} trials (seed {})",
        "Simulating".green(),
        population.probabilities.a,
        population.probabilities.b,
        best_of,
        population.len(),
        population.seed
    );
    for adj in &population.adjustments {
        println!(
            "{} {:?} probability {} clamped to {}",
            "!".yellow(),
            adj.side,
            adj.requested,
            adj.applied
        );
    }
    println!();
    print_book(&book, "A", "B");
    Ok(())
}

fn run_ratings(config: &EngineConfig, data: &Path, top: usize, json: bool) -> Result<()> {
    let (replay, _) = load_history(config, data)?;
    let ledger = replay.ledger();
    let leaders = ledger.leaderboard(top);

    if json {
        #[derive(Serialize)]
        struct Row<'a> {
            rank: usize,
            player: &'a PlayerId,
            rating: f64,
            matches: u32,
            last_match: Option<NaiveDate>,
        }
        let rows: Vec<Row> = leaders
            .iter()
            .enumerate()
            .map(|(i, (player, state))| Row {
                rank: i + 1,
                player,
                rating: state.rating,
                matches: state.matches,
                last_match: state.last_update,
            })
            .collect();
        return print_json(&rows);
    }

    println!(
        "{} ({} players, {} updates)",
        "Rating leaderboard".yellow().bold(),
        ledger.len(),
        ledger.updates()
    );
    println!(
        "{:>4} {:<28} {:>8} {:>8} {:>12}",
        "Rank", "Player", "Rating", "Matches", "Last match"
    );
    println!("{}", "-".repeat(64));
    for (i, (player, state)) in leaders.iter().enumerate() {
        println!(
            "{:>4} {:<28} {:>8.1} {:>8} {:>12}",
            i + 1,
            truncate_name(player.as_str(), 28),
            state.rating,
            state.matches,
            state
                .last_update
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

fn run_profile(
    config: &EngineConfig,
    data: &Path,
    player: &str,
    date: Option<&str>,
    surface: Surface,
    json: bool,
) -> Result<()> {
    let (replay, snapshots) = load_history(config, data)?;
    let player = PlayerId::from(player);
    let date = as_of_date(date.map(parse_date).transpose()?, &snapshots);

    let snapshot = replay.aggregator().peek(&player, date, surface);
    let rating = replay.ledger().rating(&player);

    if json {
        #[derive(Serialize)]
        struct Output<'a> {
            rating: f64,
            features: &'a FeatureSnapshot,
        }
        return print_json(&Output {
            rating,
            features: &snapshot,
        });
    }

    if snapshot.matches_played == 0 {
        println!("{} no matches found for {}", "!".yellow(), player);
    }
    println!(
        "{} {} as of {} on {}",
        "Profile".green(),
        player.to_string().bold(),
        date,
        surface
    );
    println!("{}", "-".repeat(44));
    println!("{:<26} {:>16.1}", "Rating", rating);
    println!("{:<26} {:>16}", "Matches", snapshot.matches_played);
    let rows = [
        ("Ace rate", snapshot.ace_rate),
        ("Double fault rate", snapshot.double_fault_rate),
        ("1st serve in", snapshot.first_serve_in),
        ("1st serve points won", snapshot.first_serve_won),
        ("2nd serve points won", snapshot.second_serve_won),
        ("Serve points won", snapshot.serve_points_won),
        ("Break points saved", snapshot.break_points_saved),
        ("Return points won", snapshot.return_points_won),
        ("Form", snapshot.form),
        ("Form (last 5)", snapshot.form_last_5),
        ("Surface form", snapshot.surface_form),
    ];
    for (label, value) in rows {
        println!("{:<26} {:>16}", label, format_rate(value));
    }
    println!(
        "{:<26} {:>16}",
        "Avg total games",
        snapshot
            .avg_total_games
            .map(|g| format!("{:.1}", g))
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "{:<26} {:>16}",
        "Surface matches",
        format!(
            "{}{}",
            snapshot.surface_matches,
            if snapshot.surface_fallback { " (damped)" } else { "" }
        )
    );
    println!(
        "{:<26} {:>16}",
        "Rest days",
        format!(
            "{}{}",
            snapshot.rest_days,
            if snapshot.rest_defaulted { " (default)" } else { "" }
        )
    );
    Ok(())
}

fn run_predict(
    config: &EngineConfig,
    data: &Path,
    fixture: &Fixture,
    quotes: Option<MatchOdds>,
    bankroll: f64,
    json: bool,
) -> Result<()> {
    let (replay, snapshots) = load_history(config, data)?;
    let date = as_of_date(fixture.date, &snapshots);

    let matchup = replay.matchup(
        &fixture.player_a,
        &fixture.player_b,
        date,
        fixture.surface,
        fixture.best_of,
        &config.fallback,
    );
    let model = BaselineServeModel::new(config.baseline.clone());
    let probabilities = model.serve_probabilities(&matchup);

    let simulator = MatchSimulator::new(config.simulation.clone())?;
    let population = simulator
        .simulate(probabilities, fixture.best_of)
        .context("Simulation failed")?;
    let book = derive_markets(&population, &config.market)?;

    let kelly = KellyCalculator::new(bankroll, config.kelly.clone());
    let assessments = quotes
        .map(|q| assess_winner(&book, &q, config.market.value_threshold, Some(&kelly)))
        .transpose()?;

    if json {
        #[derive(Serialize)]
        struct Output<'a> {
            date: NaiveDate,
            rating_a: f64,
            rating_b: f64,
            probabilities: ServeProbabilities,
            imputed_a: &'a [&'static str],
            imputed_b: &'a [&'static str],
            markets: &'a MarketBook,
            value: Option<&'a Vec<ValueAssessment>>,
        }
        return print_json(&Output {
            date,
            rating_a: matchup.rating_a,
            rating_b: matchup.rating_b,
            probabilities,
            imputed_a: &matchup.profile_a.imputed,
            imputed_b: &matchup.profile_b.imputed,
            markets: &book,
            value: assessments.as_ref(),
        });
    }

    println!(
        "{}: {} vs {} / {} / {} / {}",
        "Predicting".green(),
        fixture.player_a.to_string().bold(),
        fixture.player_b.to_string().bold(),
        fixture.surface,
        fixture.best_of,
        date
    );
    println!();
    println!(
        "{:<24} {:>10} {:>10} {:>12} {:>10}",
        "Player", "Rating", "Matches", "Serve pts", "P(serve)"
    );
    println!("{}", "-".repeat(70));
    for (player, rating, profile, p) in [
        (&fixture.player_a, matchup.rating_a, &matchup.profile_a, probabilities.a),
        (&fixture.player_b, matchup.rating_b, &matchup.profile_b, probabilities.b),
    ] {
        println!(
            "{:<24} {:>10.1} {:>10} {:>11.1}% {:>9.1}%",
            truncate_name(player.as_str(), 24),
            rating,
            profile.matches_played,
            profile.serve_points_won * 100.0,
            p * 100.0
        );
        if !profile.is_complete() {
            println!(
                "  {}",
                format!("defaults used: {}", profile.imputed.join(", ")).dimmed()
            );
        }
    }
    println!();

    print_book(&book, fixture.player_a.as_str(), fixture.player_b.as_str());

    if let Some(assessments) = assessments {
        println!("\n{}", "Value (match winner):".yellow().bold());
        println!(
            "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10}",
            "Selection", "Model", "Odds", "Edge", "EV", "Stake"
        );
        println!("{}", "-".repeat(72));
        for (assessment, player) in assessments
            .iter()
            .zip([&fixture.player_a, &fixture.player_b])
        {
            let edge = format!("{:+.1}%", assessment.edge * 100.0);
            let stake = assessment
                .sizing
                .as_ref()
                .filter(|s| s.stake > 0.0)
                .map(|s| format!("{:.2}", s.stake))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<24} {:>7.1}% {:>8.2} {:>8} {:>8.3} {:>10}",
                truncate_name(player.as_str(), 24),
                assessment.probability * 100.0,
                assessment.odds,
                if assessment.is_value {
                    edge.green()
                } else {
                    edge.normal()
                },
                assessment.expected_value,
                stake
            );
        }
    }
    Ok(())
}

fn run_backtest(config: &EngineConfig, data: &Path, json: bool) -> Result<()> {
    let (_, snapshots) = load_history(config, data)?;
    if snapshots.is_empty() {
        bail!("No matches to evaluate in {:?}", data);
    }

    let backtest = &config.backtest;
    if !json {
        println!("{}", "Running backtest...".green());
        match backtest.start_date {
            Some(start) => println!("Start date: {}", start),
            None => println!("Using all data"),
        }
        println!("Trials per match: {}", backtest.trials);
        if backtest.use_kelly {
            println!(
                "Staking: {:.0}% Kelly from {:.2}",
                backtest.kelly.multiplier * 100.0,
                backtest.bankroll
            );
        } else {
            println!("Staking: flat {:.2}", backtest.flat_stake);
        }
        if backtest.use_synthetic_odds {
            println!("Synthetic odds: enabled");
        }
        println!();
    }

    let mut simulator = BacktestSimulator::new(
        backtest.clone(),
        BaselineServeModel::new(config.baseline.clone()),
        &config.simulation,
        config.market.clone(),
        config.fallback.clone(),
    )?;

    let pb = ProgressBar::new(snapshots.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    let result = simulator
        .run_with_progress(&snapshots, |done| pb.set_position(done as u64))
        .context("Backtest failed")?;
    pb.finish_and_clear();

    if json {
        return print_json(&result);
    }

    print_backtest_summary(&result, simulator.bankroll());
    Ok(())
}

fn print_book(book: &MarketBook, name_a: &str, name_b: &str) {
    println!("{}", "Match winner:".yellow().bold());
    println!("{:<24} {:>10} {:>10}", "Player", "Prob", "Fair odds");
    println!("{}", "-".repeat(46));
    for (name, p, odds) in [
        (name_a, book.winner.probability_a, book.winner.odds_a),
        (name_b, book.winner.probability_b, book.winner.odds_b),
    ] {
        println!(
            "{:<24} {:>9.1}% {:>10}",
            truncate_name(name, 24),
            p * 100.0,
            odds.to_string()
        );
    }

    println!(
        "\n{} mean {:.2}, std {:.2}",
        "Total games:".yellow().bold(),
        book.mean_total_games,
        book.std_total_games
    );
    println!(
        "{:>6} {:>9} {:>9} {:>10} {:>10}",
        "Line", "Over", "Under", "Over odds", "Under odds"
    );
    println!("{}", "-".repeat(48));
    for line in &book.over_under {
        println!(
            "{:>6.1} {:>8.1}% {:>8.1}% {:>10} {:>10}",
            line.line,
            line.over * 100.0,
            line.under * 100.0,
            line.over_odds.to_string(),
            line.under_odds.to_string()
        );
    }

    println!("\n{}", "Game handicap:".yellow().bold());
    println!("{:<24} {:>6} {:>9} {:>10}", "Player", "Line", "Prob", "Fair odds");
    println!("{}", "-".repeat(52));
    for line in &book.handicap {
        let name = match line.side {
            tennis::Side::A => name_a,
            tennis::Side::B => name_b,
        };
        println!(
            "{:<24} {:>+6.1} {:>8.1}% {:>10}",
            truncate_name(name, 24),
            line.line,
            line.probability * 100.0,
            line.odds.to_string()
        );
    }

    println!("\n{}", "Set scores:".yellow().bold());
    for (score, p) in &book.set_scores {
        println!("  {:<6} {:>6.1}%", score, p * 100.0);
    }
}

fn print_backtest_summary(result: &BacktestResult, bankroll: Option<f64>) {
    println!("{}", "=== Backtest Summary ===".cyan().bold());
    println!(
        "Matches evaluated: {} (skipped {})",
        result.matches_evaluated, result.matches_skipped
    );

    let Some(metrics) = result.metrics.as_ref() else {
        return;
    };

    println!("\n{}", "Forecasts:".yellow().bold());
    println!("  Accuracy:    {:.1}%", metrics.accuracy * 100.0);
    println!("  Log loss:    {:.4}", metrics.log_loss);
    println!("  Brier score: {:.4}", metrics.brier_score);
    if let Some(mae) = metrics.games_mae {
        println!("  Games MAE:   {:.2}", mae);
    }

    println!("\n{}", "Betting:".yellow().bold());
    println!("  Bets:          {}", metrics.total_bets);
    println!(
        "  Wins:          {} ({:.1}%)",
        metrics.winning_bets,
        metrics.hit_rate * 100.0
    );
    println!("  Total stake:   {:.2}", result.total_stake);
    println!("  Total payout:  {:.2}", result.total_payout);
    let profit = format!("{:+.2}", result.total_profit());
    println!(
        "  Profit:        {}",
        if result.total_profit() >= 0.0 {
            profit.green()
        } else {
            profit.red()
        }
    );
    println!("  ROI:           {:+.2}%", metrics.roi * 100.0);
    println!("  Profit factor: {:.2}", metrics.profit_factor);
    println!(
        "  Max drawdown:  {:.2} ({:.1}%)",
        metrics.max_drawdown,
        metrics.max_drawdown_pct * 100.0
    );
    if let Some(bankroll) = bankroll {
        println!("  Final bankroll: {:.2}", bankroll);
    }

    if result.bets.is_empty() {
        return;
    }
    for (title, analysis) in [
        ("Analysis by Surface:", analyze_by_surface(&result.bets)),
        ("Analysis by Odds Range:", analyze_by_odds_range(&result.bets)),
    ] {
        println!("\n{}", title.yellow().bold());
        println!(
            "{:>18} {:>8} {:>8} {:>10} {:>12} {:>10}",
            "Key", "Bets", "Wins", "Hit Rate", "Profit", "ROI"
        );
        println!("{}", "-".repeat(71));
        for a in &analysis {
            println!(
                "{:>18} {:>8} {:>8} {:>9.1}% {:>12.2} {:>9.1}%",
                a.key,
                a.bets,
                a.wins,
                a.hit_rate * 100.0,
                a.profit,
                a.roi * 100.0
            );
        }
    }
}

fn format_rate(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}%", v * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let truncated: String = name.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}
