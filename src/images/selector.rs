use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ImageCandidate;

/// Seeded generator for reproducible picks, OS-seeded otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Pick one candidate uniformly at random, or `None` when there are none.
pub fn select<'a, R: Rng + ?Sized>(
    candidates: &'a [ImageCandidate],
    rng: &mut R,
) -> Option<&'a ImageCandidate> {
    if candidates.is_empty() {
        tracing::warn!("No images available, using fallback");
        return None;
    }
    let index = rng.random_range(0..candidates.len());
    tracing::debug!("Selected image {}/{}", index + 1, candidates.len());
    candidates.get(index)
}
