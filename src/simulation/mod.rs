//! Point-by-point Monte Carlo match simulation

pub mod engine;
pub mod population;
pub mod scoring;

pub use engine::{
    clamp_probabilities, CancellationToken, MatchSimulator, SimulationConfig,
    EXTENDED_TIEBREAK_POINTS, PROBABILITY_CEILING, PROBABILITY_FLOOR,
};
pub use population::{PopulationSummary, ProbabilityAdjustment, SimulationPopulation};
pub use scoring::{
    play_game, play_set, play_tiebreak, simulate_match, tiebreak_server, PointSource, RandomPoints,
    SetOutcome, SimulationTrial, TIEBREAK_POINTS,
};
