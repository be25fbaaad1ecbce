//! Stop conditions polled by the runner after every completed iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decides whether the current slice should hand back its cursor.
///
/// Polled once after each item; never pushed.
pub trait ShouldStop {
    fn should_stop(&mut self) -> bool;
}

impl<F> ShouldStop for F
where
    F: FnMut() -> bool,
{
    fn should_stop(&mut self) -> bool {
        self()
    }
}

/// Never stops; the slice runs until the enumerator is exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl ShouldStop for Never {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Stops once a wall-clock budget, started at construction, is spent.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    deadline: Instant,
}

impl TimeBudget {
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl ShouldStop for TimeBudget {
    fn should_stop(&mut self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Stops after a fixed number of iterations.
#[derive(Debug, Clone, Copy)]
pub struct MaxIterations {
    max: u64,
    seen: u64,
}

impl MaxIterations {
    pub fn new(max: u64) -> Self {
        Self { max, seen: 0 }
    }
}

impl ShouldStop for MaxIterations {
    fn should_stop(&mut self) -> bool {
        self.seen += 1;
        self.seen >= self.max
    }
}

/// Shared flag flipped by a worker on shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl ShouldStop for ShutdownFlag {
    fn should_stop(&mut self) -> bool {
        self.is_triggered()
    }
}

/// Stops when any inner condition does. Every condition is polled each time.
#[derive(Default)]
pub struct AnyOf(Vec<Box<dyn ShouldStop + Send>>);

impl AnyOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl ShouldStop + Send + 'static) -> Self {
        self.0.push(Box::new(condition));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl ShouldStop for AnyOf {
    fn should_stop(&mut self) -> bool {
        self.0
            .iter_mut()
            .fold(false, |stop, condition| condition.should_stop() | stop)
    }
}
