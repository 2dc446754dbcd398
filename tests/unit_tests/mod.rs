use bifrost::engine::{CpuEngine, Engine, NalgebraEngine, ParallelEngine};

mod engines;
mod geometry;
mod shape_function;
mod sparse;

/// One instance of every in-tree engine, for cross-engine agreement tests.
fn all_engines() -> Vec<Box<dyn Engine>> {
    vec![
        Box::new(CpuEngine::new()),
        Box::new(ParallelEngine::new()),
        Box::new(NalgebraEngine::new()),
    ]
}
