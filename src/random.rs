//! The `random` namespace: per-thread, deterministically seedable
//! generators.
//!
//! Every engine owns one [`ThreadLocalRandom`]; each thread using that
//! engine sees an independent generator stream, so concurrent workers can
//! seed and draw without interfering with each other. Reseeding replaces the
//! calling thread's generator, and the same seed always reproduces the same
//! subsequent draw sequence.

use crate::tensor::{DTensor, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rand_distr::StandardNormal;
use std::cell::RefCell;
use thread_local::ThreadLocal;

pub trait RandomOps: Send + Sync {
    /// Replaces the calling thread's generator with a freshly seeded one.
    fn seed(&self, seed: u64);

    /// Samples uniformly from `[0, 1)`.
    fn uniform(&self, shape: &[usize]) -> DTensor;

    /// Samples integers uniformly from `[low, high)`.
    ///
    /// # Panics
    ///
    /// Panics if `low >= high`.
    fn integers(&self, low: i64, high: i64, shape: &[usize]) -> Tensor<i64>;

    /// Samples from the standard normal distribution.
    fn normal(&self, shape: &[usize]) -> DTensor;
}

/// ChaCha-based generator state shared by the in-tree engines.
pub struct ThreadLocalRandom {
    default_seed: u64,
    generators: ThreadLocal<RefCell<ChaCha12Rng>>,
}

impl ThreadLocalRandom {
    pub fn new(default_seed: u64) -> Self {
        Self {
            default_seed,
            generators: ThreadLocal::new(),
        }
    }

    fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha12Rng) -> R) -> R {
        let cell = self
            .generators
            .get_or(|| RefCell::new(ChaCha12Rng::seed_from_u64(self.default_seed)));
        f(&mut cell.borrow_mut())
    }
}

impl Default for ThreadLocalRandom {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RandomOps for ThreadLocalRandom {
    fn seed(&self, seed: u64) {
        self.with_rng(|rng| *rng = ChaCha12Rng::seed_from_u64(seed));
    }

    fn uniform(&self, shape: &[usize]) -> DTensor {
        let len = shape.iter().product();
        self.with_rng(|rng| {
            let data = (0..len).map(|_| rng.gen::<f64>()).collect();
            Tensor::from_data(shape, data)
        })
    }

    fn integers(&self, low: i64, high: i64, shape: &[usize]) -> Tensor<i64> {
        assert!(low < high, "integers requires low < high");
        let len = shape.iter().product();
        self.with_rng(|rng| {
            let data = (0..len).map(|_| rng.gen_range(low..high)).collect();
            Tensor::from_data(shape, data)
        })
    }

    fn normal(&self, shape: &[usize]) -> DTensor {
        let len = shape.iter().product();
        self.with_rng(|rng| {
            let data = (0..len).map(|_| rng.sample(StandardNormal)).collect();
            Tensor::from_data(shape, data)
        })
    }
}
