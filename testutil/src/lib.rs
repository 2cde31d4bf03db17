/// Testing utilities for the Ben-Or consensus workspace
///
/// Provides:
/// - Random input generators and proptest strategies
/// - Fixtures for canonical scenarios
/// - Tracing setup for tests

pub mod generators;
pub mod fixtures;

pub use generators::*;
pub use fixtures::*;
