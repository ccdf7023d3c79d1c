//! Injectable random source.
//!
//! Role assignment, slot assignment, dealing and oracle sampling all draw
//! from one `GameRng` so a seeded instance makes a whole game reproducible.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct GameRng {
    inner: Mutex<ChaCha8Rng>,
}

impl GameRng {
    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *self.inner.lock());
    }

    /// Uniform index in `0..len`; `None` when `len == 0`.
    pub fn index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.inner.lock().random_range(0..len))
    }

    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.index(items.len()).map(|i| &items[i])
    }

    pub fn range_inclusive(&self, low: i32, high: i32) -> i32 {
        if low >= high {
            return low;
        }
        self.inner.lock().random_range(low..=high)
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
