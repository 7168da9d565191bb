//! Test RNG: deterministic `DeterministicRng` implementations for tests.

use stormcraft_core::rng::DeterministicRng;

/// A no-op RNG that always returns `min` for `next_u32_range` and `0.0` for
/// `next_f64`. Suitable for tests that do not depend on specific random values.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}

/// An RNG that returns values from predetermined sequences. Panics if the
/// integer sequence is exhausted. The float sequence returns `0.0` once it
/// runs out, so tests that only care about integer draws can ignore it.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
    floats: Vec<f64>,
    float_index: usize,
}

impl SequenceRng {
    /// Create a new `SequenceRng` with the given integer values.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self {
            values,
            index: 0,
            floats: Vec::new(),
            float_index: 0,
        }
    }

    /// Create a `SequenceRng` that only serves the given float draws.
    #[must_use]
    pub fn floats(floats: Vec<f64>) -> Self {
        Self::new(Vec::new()).with_floats(floats)
    }

    /// Add a float sequence for `next_f64`.
    #[must_use]
    pub fn with_floats(mut self, floats: Vec<f64>) -> Self {
        self.floats = floats;
        self.float_index = 0;
        self
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
        let val = self.values[self.index];
        self.index += 1;
        val
    }

    fn next_f64(&mut self) -> f64 {
        let val = self.floats.get(self.float_index).copied().unwrap_or(0.0);
        self.float_index += 1;
        val
    }
}
