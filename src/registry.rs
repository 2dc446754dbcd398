//! Engine registration and thread-local selection.
//!
//! Engines are registered once, process-wide, under their unique names; the
//! *active* engine is selected per thread, so concurrent workers can run on
//! different engines without interfering. [`ScopedEngine`] provides scoped
//! selection with guaranteed restoration of the previous choice, including
//! during unwinding.

use crate::engine::{CpuEngine, Engine, NalgebraEngine, ParallelEngine};
use crate::error::{Error, Result};
use log::debug;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

/// The engine every thread starts on.
pub const DEFAULT_ENGINE: &str = "cpu";

static REGISTRY: OnceLock<RwLock<FxHashMap<String, Arc<dyn Engine>>>> = OnceLock::new();

thread_local! {
    static ACTIVE: RefCell<Option<Arc<dyn Engine>>> = const { RefCell::new(None) };
}

fn registry() -> &'static RwLock<FxHashMap<String, Arc<dyn Engine>>> {
    REGISTRY.get_or_init(|| {
        let mut engines: FxHashMap<String, Arc<dyn Engine>> = FxHashMap::default();
        for engine in [
            Arc::new(CpuEngine::new()) as Arc<dyn Engine>,
            Arc::new(ParallelEngine::new()),
            Arc::new(NalgebraEngine::new()),
        ] {
            debug!("registering built-in engine `{}`", engine.name());
            engines.insert(engine.name().to_string(), engine);
        }
        RwLock::new(engines)
    })
}

/// Registers an engine under its name, replacing any previous registration.
pub fn register_engine(engine: Arc<dyn Engine>) {
    let name = engine.name().to_string();
    debug!("registering engine `{name}`");
    registry().write().insert(name, engine);
}

/// Looks up a registered engine by name.
pub fn get_engine(name: &str) -> Result<Arc<dyn Engine>> {
    registry()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::UnknownEngine(name.to_string()))
}

/// The names of all registered engines, sorted.
pub fn registered_engines() -> Vec<String> {
    let mut names: Vec<String> = registry().read().keys().cloned().collect();
    names.sort();
    names
}

/// Switches the calling thread's active engine.
pub fn select_engine(name: &str) -> Result<()> {
    let engine = get_engine(name)?;
    debug!("selecting engine `{name}` for the current thread");
    ACTIVE.with(|active| *active.borrow_mut() = Some(engine));
    Ok(())
}

/// The calling thread's active engine, defaulting to [`DEFAULT_ENGINE`].
pub fn active_engine() -> Arc<dyn Engine> {
    ACTIVE.with(|active| {
        let mut slot = active.borrow_mut();
        slot.get_or_insert_with(|| {
            get_engine(DEFAULT_ENGINE).expect("the default engine is always registered")
        })
        .clone()
    })
}

/// Selects an engine for the lifetime of the guard; the previous selection
/// is restored on drop.
pub struct ScopedEngine {
    previous: Option<Arc<dyn Engine>>,
}

impl ScopedEngine {
    pub fn new(name: &str) -> Result<Self> {
        let engine = get_engine(name)?;
        let previous = ACTIVE.with(|active| active.borrow_mut().replace(engine));
        Ok(Self { previous })
    }
}

impl Drop for ScopedEngine {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Runs `f` with the named engine active on the current thread.
pub fn with_engine<R>(name: &str, f: impl FnOnce() -> R) -> Result<R> {
    let _guard = ScopedEngine::new(name)?;
    Ok(f())
}
