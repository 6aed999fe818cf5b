//! Seeded train / hold-out partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldOutSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl HoldOutSplit {
    /// Shuffle `0..n` with `seed` and hold out `ceil(n * test_fraction)` rows.
    ///
    /// At least one row always stays in training; batches smaller than two
    /// rows have no hold-out at all.
    pub fn new(n: usize, test_fraction: f64, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..n).collect();
        if n < 2 || test_fraction <= 0.0 {
            return Self {
                train: indices,
                test: Vec::new(),
            };
        }

        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
        let train = indices.split_off(n_test);
        Self {
            train,
            test: indices,
        }
    }
}
