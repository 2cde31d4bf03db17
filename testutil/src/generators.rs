/// Test data generators

use proptest::prelude::*;
use rand::Rng;

/// Generate a random binary input (0 or 1)
pub fn random_bit() -> u8 {
    rand::thread_rng().gen_range(0..=1)
}

/// Generate `len` random binary inputs
pub fn random_bits(len: usize) -> Vec<u8> {
    (0..len).map(|_| random_bit()).collect()
}

/// Generate a random seed for deterministic runs
pub fn random_seed() -> u64 {
    rand::thread_rng().gen()
}

/// Largest fault count tolerated by `n` processes (3f < n)
pub fn max_faults(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Strategy over valid (n, f) fleet parameters with 3f < n
pub fn fleet_params(max_n: usize) -> impl Strategy<Value = (usize, usize)> {
    (1..=max_n).prop_flat_map(|n| (Just(n), 0..=max_faults(n)))
}

/// Strategy over binary input vectors of exactly `len` entries
pub fn binary_inputs(len: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0u8..=1, len)
}
