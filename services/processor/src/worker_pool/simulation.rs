//! Outcome simulation for transaction processing
//!
//! Maps a uniform draw in [0, 1) to a terminal outcome. Random sources are
//! injected per worker so runs can be made reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::constants::{HARD_FAILURE_THRESHOLD, SOFT_FAILURE_THRESHOLD};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::TransactionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Failed without surfacing an error
    Failed,
    /// Failed with a hard processing error
    FailedWithError,
}

impl Outcome {
    pub fn status(self) -> TransactionStatus {
        match self {
            Outcome::Completed => TransactionStatus::Completed,
            Outcome::Failed | Outcome::FailedWithError => TransactionStatus::Failed,
        }
    }

    pub fn is_hard_error(self) -> bool {
        matches!(self, Outcome::FailedWithError)
    }
}

/// Decide the outcome for a single draw.
///
/// | draw         | outcome                 |
/// |--------------|-------------------------|
/// | [0, 0.20)    | failed, hard error      |
/// | [0.20, 0.60) | failed                  |
/// | [0.60, 1.0)  | completed               |
///
/// Draws outside [0, 1) follow the same thresholds; NaN is a hard failure.
pub fn decide(draw: f64) -> Outcome {
    if draw.is_nan() || draw < HARD_FAILURE_THRESHOLD {
        Outcome::FailedWithError
    } else if draw < SOFT_FAILURE_THRESHOLD {
        Outcome::Failed
    } else {
        Outcome::Completed
    }
}

/// Worker-local source of uniform draws in [0, 1)
pub trait RandomSource: Send {
    fn next_draw(&mut self) -> f64;
}

impl RandomSource for StdRng {
    fn next_draw(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Replays a fixed list of draws, wrapping around at the end
#[derive(Debug, Clone)]
pub struct SequenceSource {
    draws: Vec<f64>,
    next: usize,
}

impl SequenceSource {
    /// Returns `None` for an empty list
    pub fn new(draws: Vec<f64>) -> Option<Self> {
        if draws.is_empty() {
            return None;
        }
        Some(Self { draws, next: 0 })
    }
}

impl RandomSource for SequenceSource {
    fn next_draw(&mut self) -> f64 {
        let draw = self.draws[self.next];
        self.next = (self.next + 1) % self.draws.len();
        draw
    }
}

/// Builds the random source for the worker with the given index
pub type RngFactory = Arc<dyn Fn(usize) -> Box<dyn RandomSource> + Send + Sync>;

/// Seeds each worker from the system clock plus its index
pub fn clock_seeded_factory() -> RngFactory {
    Arc::new(|worker_id| -> Box<dyn RandomSource> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Box::new(StdRng::seed_from_u64(nanos.wrapping_add(worker_id as u64)))
    })
}

/// Reproducible sources: worker `i` is seeded with `seed + i`
pub fn seeded_factory(seed: u64) -> RngFactory {
    Arc::new(move |worker_id| -> Box<dyn RandomSource> {
        Box::new(StdRng::seed_from_u64(seed.wrapping_add(worker_id as u64)))
    })
}

/// Every worker replays the same draw sequence
pub fn sequence_factory(draws: Vec<f64>) -> Option<RngFactory> {
    let template = SequenceSource::new(draws)?;
    Some(Arc::new(move |_| -> Box<dyn RandomSource> { Box::new(template.clone()) }))
}
