//! The sequential reference engine.
//!
//! Every canonical operation runs as the explicit-loop host implementation
//! the `Engine` trait defaults provide; this engine is the semantic
//! reference the other engines are tested against.

use crate::engine::Engine;
use crate::linalg::{HostLinalg, LinalgOps};
use crate::random::{RandomOps, ThreadLocalRandom};

pub struct CpuEngine {
    linalg: HostLinalg,
    random: ThreadLocalRandom,
}

impl CpuEngine {
    pub fn new() -> Self {
        Self {
            linalg: HostLinalg { engine: "cpu" },
            random: ThreadLocalRandom::default(),
        }
    }
}

impl Default for CpuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for CpuEngine {
    fn name(&self) -> &str {
        "cpu"
    }

    fn linalg(&self) -> &dyn LinalgOps {
        &self.linalg
    }

    fn random(&self) -> &dyn RandomOps {
        &self.random
    }
}
