//! Monte Carlo trial loop
//!
//! Trial `i` draws from ChaCha stream `i` of the query seed, so a population
//! depends only on `(probabilities, format, trials, seed)` and never on how
//! rayon schedules the work.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::population::{ProbabilityAdjustment, SimulationPopulation};
use super::scoring::{simulate_match, RandomPoints, TIEBREAK_POINTS};
use crate::error::{validate_trials, EngineError};
use crate::models::{BestOf, Side};
use crate::predictor::ServeProbabilities;

/// Lowest serve probability fed to the point draws
pub const PROBABILITY_FLOOR: f64 = 0.001;
/// Highest serve probability fed to the point draws
pub const PROBABILITY_CEILING: f64 = 0.999;

/// Extended deciding-set tiebreak target
pub const EXTENDED_TIEBREAK_POINTS: u32 = 10;

/// Simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub trials: usize,
    /// Fixed master seed; drawn from the thread RNG when absent
    pub seed: Option<u64>,
    /// Tiebreak target in a deciding set (7 or 10)
    pub final_set_tiebreak: u32,
    /// Optional cap on rayon threads
    pub threads: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: 2_000,
            seed: None,
            final_set_tiebreak: TIEBREAK_POINTS,
            threads: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_trials(self.trials)?;
        if self.final_set_tiebreak != TIEBREAK_POINTS
            && self.final_set_tiebreak != EXTENDED_TIEBREAK_POINTS
        {
            return Err(EngineError::InvalidParameter(format!(
                "Final-set tiebreak must be played to {} or {} points, got {}",
                TIEBREAK_POINTS, EXTENDED_TIEBREAK_POINTS, self.final_set_tiebreak
            )));
        }
        if self.threads == Some(0) {
            return Err(EngineError::InvalidParameter(
                "Thread count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared flag stopping an in-flight simulation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Clamp both probabilities into the simulable range
///
/// NaN cannot be clamped meaningfully and is rejected.
pub fn clamp_probabilities(
    probabilities: ServeProbabilities,
) -> Result<(ServeProbabilities, Vec<ProbabilityAdjustment>), EngineError> {
    let mut adjustments = Vec::new();
    let mut clamp = |side: Side, p: f64| -> Result<f64, EngineError> {
        if p.is_nan() {
            return Err(EngineError::InvalidParameter(format!(
                "Serve probability for side {:?} is NaN",
                side
            )));
        }
        let applied = p.clamp(PROBABILITY_FLOOR, PROBABILITY_CEILING);
        if applied != p {
            warn!(
                "Clamped serve probability for side {:?}: {} -> {}",
                side, p, applied
            );
            adjustments.push(ProbabilityAdjustment {
                side,
                requested: p,
                applied,
            });
        }
        Ok(applied)
    };

    let a = clamp(Side::A, probabilities.a)?;
    let b = clamp(Side::B, probabilities.b)?;
    Ok((ServeProbabilities { a, b }, adjustments))
}

/// Parallel point-by-point match simulator
#[derive(Debug, Clone)]
pub struct MatchSimulator {
    config: SimulationConfig,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl MatchSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = match config.threads {
            Some(n) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| {
                        EngineError::InvalidParameter(format!("Cannot build thread pool: {}", e))
                    })?,
            )),
            None => None,
        };
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulate with the configured seed, or a fresh one
    pub fn simulate(
        &self,
        probabilities: ServeProbabilities,
        best_of: BestOf,
    ) -> Result<SimulationPopulation, EngineError> {
        let seed = self
            .config
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen());
        self.simulate_seeded(probabilities, best_of, seed, None)
    }

    /// Simulate with a master seed drawn from an injected random source
    pub fn simulate_with_rng<R: Rng + ?Sized>(
        &self,
        probabilities: ServeProbabilities,
        best_of: BestOf,
        rng: &mut R,
    ) -> Result<SimulationPopulation, EngineError> {
        let seed = rng.gen::<u64>();
        self.simulate_seeded(probabilities, best_of, seed, None)
    }

    /// Simulate `config.trials` matches from `seed`
    ///
    /// When `cancel` fires, the remaining trials are skipped and the call
    /// returns `Cancelled`; a partial population is never returned.
    pub fn simulate_seeded(
        &self,
        probabilities: ServeProbabilities,
        best_of: BestOf,
        seed: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<SimulationPopulation, EngineError> {
        let (probabilities, adjustments) = clamp_probabilities(probabilities)?;
        let trials = self.config.trials;
        let final_set_tiebreak = self.config.final_set_tiebreak;

        let run = || -> Option<Vec<_>> {
            (0..trials)
                .into_par_iter()
                .map(|i| {
                    if cancel.is_some_and(CancellationToken::is_cancelled) {
                        return None;
                    }
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    rng.set_stream(i as u64);
                    let first_server = if rng.gen::<bool>() { Side::A } else { Side::B };
                    let mut points = RandomPoints::new(&mut rng, probabilities);
                    Some(simulate_match(
                        &mut points,
                        best_of,
                        first_server,
                        final_set_tiebreak,
                    ))
                })
                .collect()
        };

        let results = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };
        let results = results.ok_or(EngineError::Cancelled)?;

        debug!(
            "Simulated {} trials ({}, seed {}) at {:.3}/{:.3}",
            results.len(),
            best_of,
            seed,
            probabilities.a,
            probabilities.b
        );

        Ok(SimulationPopulation::new(
            results,
            best_of,
            probabilities,
            adjustments,
            seed,
        ))
    }
}
