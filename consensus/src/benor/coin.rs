// Local coin for the all-unknown branch of the vote rule

use super::types::Value;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of the random value re-proposed when every vote was "?"
pub trait Coin: Send {
    /// Draw 0 or 1
    fn flip(&mut self) -> Value;
}

fn bit(heads: bool) -> Value {
    if heads {
        Value::One
    } else {
        Value::Zero
    }
}

/// Fair coin backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCoin;

impl Coin for RandomCoin {
    fn flip(&mut self) -> Value {
        bit(rand::thread_rng().gen_bool(0.5))
    }
}

/// Fair coin with a reproducible sequence
#[derive(Debug, Clone)]
pub struct SeededCoin {
    rng: ChaCha8Rng,
}

impl SeededCoin {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Coin for SeededCoin {
    fn flip(&mut self) -> Value {
        bit(self.rng.gen_bool(0.5))
    }
}

/// Coin that always lands on the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedCoin(pub Value);

impl Coin for FixedCoin {
    fn flip(&mut self) -> Value {
        self.0
    }
}
