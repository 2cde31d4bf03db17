/// Shared fixtures for consensus tests

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Initial estimates for the canonical N=4, F=1 run: process 0 is the
/// faulty one, the three correct processes all hold 1
pub const SPLIT_ESTIMATES: [u8; 4] = [0, 1, 1, 1];

/// Small fleets (n, f) used by simulation sweeps
pub const SMALL_FLEETS: &[(usize, usize)] = &[(1, 0), (3, 0), (4, 1), (5, 1), (7, 2), (10, 3)];

static TRACING: Once = Once::new();

/// Install a `RUST_LOG` driven subscriber once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Indices `0..faulty` are the faulty processes in fixture fleets
pub fn faulty_mask(n: usize, faulty: usize) -> Vec<bool> {
    (0..n).map(|i| i < faulty).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::max_faults;

    #[test]
    fn test_small_fleets_are_valid() {
        for &(n, f) in SMALL_FLEETS {
            assert!(f <= max_faults(n), "({}, {}) violates 3f < n", n, f);
        }
    }

    #[test]
    fn test_faulty_mask() {
        assert_eq!(faulty_mask(4, 1), vec![true, false, false, false]);
        assert_eq!(faulty_mask(3, 0), vec![false; 3]);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
