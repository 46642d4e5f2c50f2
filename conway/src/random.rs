// random.rs - Source of random cell indices for seeding a board

use rand::Rng;

/// Picks uniformly distributed indices in `0..len`.
///
/// Every [`rand::Rng`] is a source, so tests can hand the engine a seeded
/// `StdRng` and get a reproducible board.
pub trait RandomSource {
    fn next_index(&mut self, len: usize) -> usize;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn next_index(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}
