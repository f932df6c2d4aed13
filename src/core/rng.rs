//! Seeded randomness shared across the simulation.
//!
//! Every stochastic decision (channel sampling, first-movement choice,
//! tie-breaks) draws from one seeded generator so a run is reproducible
//! from its seed alone.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Handle to the simulation RNG. Cheap to clone, safe to share.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
    seed: u64,
}

impl SharedRng {
    pub fn from_seed(seed: u64) -> Self {
        log::info!("[Rng] seeded with {}", seed);
        SharedRng {
            inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform sample in [0, 1).
    pub fn sample_unit(&self) -> f64 {
        self.inner.lock().gen::<f64>()
    }

    /// Uniform sample in [lo, hi).
    pub fn sample_range(&self, lo: f64, hi: f64) -> f64 {
        self.inner.lock().gen_range(lo..hi)
    }

    /// Uniform index into a slice of length `len`. Panics on empty input.
    pub fn pick_index(&self, len: usize) -> usize {
        self.inner.lock().gen_range(0..len)
    }
}
