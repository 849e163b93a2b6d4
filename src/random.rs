//! Injectable randomness
//!
//! Every decision point draws one uniform value in `[0, 1)` from a
//! [`Randomness`] source, so a scripted source can force exact branches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform draws in `[0, 1)`
pub trait Randomness: Send {
    fn draw(&mut self) -> f64;
}

/// Adapter over any `rand` generator
pub struct RngRandomness<R> {
    rng: R,
}

impl RngRandomness<StdRng> {
    /// Non-reproducible generator seeded from the OS
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> RngRandomness<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> Randomness for RngRandomness<R> {
    fn draw(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
///
/// An empty script always yields `0.0`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandomness {
    draws: Vec<f64>,
    cursor: usize,
}

impl ScriptedRandomness {
    pub fn new(draws: impl Into<Vec<f64>>) -> Self {
        Self {
            draws: draws.into(),
            cursor: 0,
        }
    }

    /// Number of draws consumed so far
    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl Randomness for ScriptedRandomness {
    fn draw(&mut self) -> f64 {
        if self.draws.is_empty() {
            return 0.0;
        }
        let value = self.draws[self.cursor % self.draws.len()];
        self.cursor += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_draws_cycle() {
        let mut rng = ScriptedRandomness::new(vec![0.1, 0.9]);
        assert_eq!(rng.draw(), 0.1);
        assert_eq!(rng.draw(), 0.9);
        assert_eq!(rng.draw(), 0.1);
        assert_eq!(rng.consumed(), 3);
    }

    #[test]
    fn seeded_draws_stay_in_unit_interval() {
        let mut rng = RngRandomness::seeded(7);
        for _ in 0..1_000 {
            let v = rng.draw();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
