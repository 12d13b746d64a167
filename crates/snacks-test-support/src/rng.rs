//! Deterministic `DeterministicRng` for tests.

use snacks_core::rng::DeterministicRng;

/// An RNG that always returns `min`, so the first configured base pointer is
/// always selected.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }
}
