use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

pub const DEFAULT_JITTER_SECONDS: i64 = 1800;

/// Source of the random offsets applied to anchor points.
pub trait Jitter {
    fn offset(&mut self) -> i64;
}

/// Uniform offset in `[-bound, bound]`.
pub struct RandomJitter<R> {
    rng: R,
    bound: i64,
}

impl<R: Rng> RandomJitter<R> {
    pub fn new(rng: R, bound: i64) -> Self {
        Self {
            rng,
            bound: bound.saturating_abs(),
        }
    }

    pub fn bound(&self) -> i64 {
        self.bound
    }
}

impl<R: Rng> Jitter for RandomJitter<R> {
    fn offset(&mut self) -> i64 {
        if self.bound == 0 {
            return 0;
        }
        self.rng.random_range(-self.bound..=self.bound)
    }
}

/// Always the same offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub i64);

impl Jitter for FixedJitter {
    fn offset(&mut self) -> i64 {
        self.0
    }
}

/// RNG for one folder, derived from the run seed and the folder's path
/// relative to the run root.
///
/// Same-named folders under different parents get different sequences, and
/// a tree moved elsewhere replays the same ones under the same seed.
pub fn folder_rng(seed: u64, root: &Path, folder: &Path) -> StdRng {
    let relative = folder.strip_prefix(root).unwrap_or(folder);
    let key = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(key.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// Uniform pick, independent per call. `None` only for an empty list.
pub fn pick_location<'a, R: Rng>(locations: &'a [String], rng: &mut R) -> Option<&'a str> {
    if locations.is_empty() {
        return None;
    }
    let index = rng.random_range(0..locations.len());
    Some(locations[index].as_str())
}
