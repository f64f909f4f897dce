//! Random selection of canned fallback content.
//!
//! The random source is injected so tests (and operators, via `FALLBACK_SEED`)
//! can make the choice reproducible.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FallbackPicker {
    rng: Arc<Mutex<StdRng>>,
}

impl FallbackPicker {
    /// Picker seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic picker.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Seeded when a seed is configured, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Uniformly choose one item. `None` only for an empty slice.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        // A poisoned lock still holds a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        items.choose(&mut *rng)
    }
}

impl Default for FallbackPicker {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl std::fmt::Debug for FallbackPicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPicker").finish_non_exhaustive()
    }
}
