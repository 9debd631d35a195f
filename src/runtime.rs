use std::cell::{Cell, RefCell};
use std::time::Duration;

use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};

pub const DEFAULT_MAX_RECURSION: usize = 800;
pub const DEFAULT_READ_CHUNK: usize = 512;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

// grow by this much once less than RED_ZONE is left
const RED_ZONE: usize = 128 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

/// Knobs read by the evaluator and the command executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub max_recursion: usize,
    pub read_chunk: usize,
    pub poll_interval: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_recursion: DEFAULT_MAX_RECURSION,
            read_chunk: DEFAULT_READ_CHUNK,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

thread_local! {
    static SETTINGS: RefCell<RuntimeSettings> = RefCell::new(RuntimeSettings::default());
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub fn settings() -> RuntimeSettings {
    SETTINGS.with(|s| s.borrow().clone())
}

pub fn install(settings: RuntimeSettings) {
    SETTINGS.with(|s| *s.borrow_mut() = settings);
}

pub fn call_depth() -> usize {
    CALL_DEPTH.with(Cell::get)
}

/// One level of user function call. Dropping the guard leaves the level,
/// so early returns through `?` unwind the counter as well.
#[derive(Debug)]
pub struct DepthGuard(());

impl DepthGuard {
    pub fn enter() -> RtResult<Self> {
        let limit = SETTINGS.with(|s| s.borrow().max_recursion);
        CALL_DEPTH.with(|depth| {
            if depth.get() >= limit {
                return Err(RuntimeError::new(RuntimeErrorKind::RecursionDepth(limit)));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard(()))
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Runs `f` on a fresh stack segment when the current one is nearly used up,
/// so `max_recursion` is reached before the native stack is.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_GROWTH, f)
}
