//! Random number generators.
//!
//! Wrappers around `rand_mt`'s MT19937-64 and `rand_distr`'s standard normal
//! sampler, plus a correlated standard normal pair generator and a
//! deterministic seed splitter for independent parallel streams.

use norta_core::Real;
use rand::Rng;
use rand_distr::StandardNormal;
use rand_mt::Mt19937GenRand64;

/// Derive the seed of stream `stream` from a base seed.
///
/// SplitMix64 finaliser over `seed ⊕ golden-ratio·(stream + 1)`; distinct
/// streams of the same base seed get well-separated MT initial states.
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A standard normal pseudo-random generator backed by the Mersenne Twister
/// MT19937-64 algorithm.
pub struct GaussianRng {
    rng: Mt19937GenRand64,
}

impl GaussianRng {
    /// Create a new generator with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mt19937GenRand64::new(seed),
        }
    }

    /// Generate the next standard-normal deviate.
    pub fn next_real(&mut self) -> Real {
        self.rng.sample(StandardNormal)
    }
}

/// Generator of standard bivariate normal pairs with correlation `ρ`.
///
/// `Z₂ = ρ Z₁ + √(1 − ρ²) W` with `Z₁`, `W` independent standard normals.
pub struct BivariateNormalRng {
    inner: GaussianRng,
    rho: Real,
    complement: Real,
}

impl BivariateNormalRng {
    /// Create a generator with the given seed and correlation, clamped to
    /// `[-1, 1]`.
    pub fn new(seed: u64, rho: Real) -> Self {
        let rho = rho.clamp(-1.0, 1.0);
        Self {
            inner: GaussianRng::new(seed),
            rho,
            complement: ((1.0 - rho) * (1.0 + rho)).sqrt(),
        }
    }

    /// The correlation of the generated pairs.
    pub fn rho(&self) -> Real {
        self.rho
    }

    /// Draw the independent pair `(Z₁, W)` that the next correlated pair is
    /// built from.  Useful for evaluating several correlations on common
    /// random numbers.
    pub fn next_independent(&mut self) -> (Real, Real) {
        (self.inner.next_real(), self.inner.next_real())
    }

    /// Draw the next correlated pair `(Z₁, Z₂)`.
    pub fn next_pair(&mut self) -> (Real, Real) {
        let (z1, w) = self.next_independent();
        (z1, self.rho * z1 + self.complement * w)
    }
}
