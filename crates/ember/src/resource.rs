//! Resource accounting for a single interpreter (section 5.1).
//!
//! Every series allocation, level push, and port open consults a
//! [`ResourceTracker`] before proceeding. `NoLimitTracker` is the default for
//! long-lived embeddings; `LimitedTracker` enforces the budgets a sandboxed
//! embedding wants (allocation count, memory estimate, recursion depth,
//! wall-clock deadline).

use std::{
    fmt,
    time::{Duration, Instant},
};

pub use NO_LIMIT_TRACKER as NoLimitTracker;

use crate::error::{ExcCategory, RuntimeError};

/// Threshold in bytes above which `check_large_result` should be consulted.
///
/// Operations that may produce results larger than this threshold (100KB)
/// should call `check_large_result` before performing the operation. This
/// prevents a single step (e.g. an absurdly large `APPEND`) from allocating
/// huge amounts of memory before the ordinary allocation check can catch it.
pub const LARGE_RESULT_THRESHOLD: usize = 100_000;

/// Error returned when a resource limit is exceeded during evaluation.
///
/// This allows an embedding to enforce strict limits on allocation count,
/// execution time, recursion depth, and memory usage.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum trampoline operations exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// Maximum level-stack depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
            Self::Time { limit, elapsed } => {
                write!(f, "time limit exceeded: {elapsed:?} > {limit:?}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::Recursion { limit, depth } => {
                write!(f, "level stack depth exceeded: {depth} > {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Converts this resource error to a runtime error of the appropriate category.
    ///
    /// Recursion maps to Script (catchable, matching the language's own
    /// `stack-overflow` error); the rest map to Internal (uncatchable).
    #[must_use]
    pub fn into_runtime_error(self) -> RuntimeError {
        let category = match self {
            Self::Recursion { .. } => ExcCategory::Script,
            _ => ExcCategory::Internal,
        };
        RuntimeError::new(category, self.to_string())
    }
}

impl From<ResourceError> for RuntimeError {
    fn from(err: ResourceError) -> Self {
        err.into_runtime_error()
    }
}

/// Tracks resource usage for one interpreter and enforces configured limits.
///
/// Implementations are consulted at series allocation (`on_allocate`), level
/// push (`check_recursion_depth`), and periodically at trampoline iterations
/// (`check_time`).
pub trait ResourceTracker: fmt::Debug {
    /// Called before each series allocation.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called before growing an existing series (e.g. appending to a block).
    ///
    /// Unlike [`Self::on_allocate`], this does not represent creation of a new
    /// series, but in-place growth should still count against the allocation
    /// budget to avoid unbounded growth of one long-lived series.
    fn on_container_insert(&mut self) -> Result<(), ResourceError> {
        self.on_allocate(|| 0)
    }

    /// Called when a series is freed (GC sweep or explicit release).
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Called periodically (at trampoline iterations) to check time/operation limits.
    fn check_time(&mut self) -> Result<(), ResourceError>;

    /// Called before pushing a new level, to check level-stack depth.
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Called before operations that may produce large results (> `LARGE_RESULT_THRESHOLD`).
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError>;

    /// Returns the total number of allocations tracked, if this tracker records them.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Returns the current approximate memory usage in bytes, if tracked.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// A resource tracker for long-lived embeddings with optional soft limits.
///
/// By default this behaves like an unrestricted tracker (except the default
/// recursion limit). Embeddings can opt into limits via [`NoLimitTracker::with_limits`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NoLimitTracker {
    limits: ResourceLimits,
    #[serde(default)]
    operation_count: usize,
    #[serde(default)]
    allocation_count: usize,
    #[serde(default)]
    current_memory: usize,
    /// Intentionally excluded from serialization: a deserialized tracker
    /// resumes with no active deadline.
    #[serde(skip)]
    deadline: Option<Instant>,
    #[serde(skip)]
    deadline_limit: Option<Duration>,
}

impl NoLimitTracker {
    /// Creates a tracker with no active deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            limits: ResourceLimits {
                max_operations: None,
                max_allocations: None,
                max_duration: None,
                max_memory: None,
                max_recursion_depth: None,
            },
            operation_count: 0,
            allocation_count: 0,
            current_memory: 0,
            deadline: None,
            deadline_limit: None,
        }
    }

    /// Creates a tracker with persistent resource limits.
    #[must_use]
    pub const fn with_limits(limits: ResourceLimits) -> Self {
        Self {
            limits,
            operation_count: 0,
            allocation_count: 0,
            current_memory: 0,
            deadline: None,
            deadline_limit: None,
        }
    }

    /// Sets or clears the active execution deadline.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
        self.deadline_limit = deadline.map(|value| value.saturating_duration_since(Instant::now()));
    }

    /// Starts one bounded run step: resets the per-step operation counter and
    /// configures either an explicit deadline or one derived from `limits.max_duration`.
    pub fn begin_run(&mut self, deadline: Option<Instant>) {
        self.operation_count = 0;
        if let Some(deadline) = deadline {
            self.set_deadline(Some(deadline));
            return;
        }
        if let Some(max_duration) = self.limits.max_duration {
            self.deadline = Some(Instant::now() + max_duration);
            self.deadline_limit = Some(max_duration);
        } else {
            self.set_deadline(None);
        }
    }
}

/// Shared value form of [`NoLimitTracker`] for expression-context compatibility.
pub const NO_LIMIT_TRACKER: NoLimitTracker = NoLimitTracker::new();

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        let tracks_allocations = self.limits.max_allocations.is_some();
        let tracks_memory = self.limits.max_memory.is_some();
        if !tracks_allocations && !tracks_memory {
            return Ok(());
        }

        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        if let Some(max) = self.limits.max_memory {
            let size = get_size();
            let new_memory = self.current_memory + size;
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
            self.current_memory = new_memory;
        }

        if tracks_allocations {
            self.allocation_count += 1;
        }

        Ok(())
    }

    #[inline]
    fn on_container_insert(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        if self.limits.max_allocations.is_some() {
            self.allocation_count += 1;
        }
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        if self.limits.max_memory.is_some() {
            self.current_memory = self.current_memory.saturating_sub(get_size());
        }
    }

    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_operations {
            self.operation_count += 1;
            if self.operation_count > max {
                return Err(ResourceError::Operation {
                    limit: max,
                    count: self.operation_count,
                });
            }
        }

        if let Some(limit) = self.deadline {
            let now = Instant::now();
            if now >= limit {
                let configured_limit = self.deadline_limit.unwrap_or_default();
                return Err(ResourceError::Time {
                    limit: configured_limit,
                    elapsed: configured_limit.saturating_add(now.duration_since(limit)),
                });
            }
        }
        Ok(())
    }

    /// Enforces level-stack depth using configured limits or the default depth.
    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        let max_recursion_limit = self.limits.max_recursion_depth.unwrap_or(DEFAULT_MAX_RECURSION_DEPTH);
        if current_depth >= max_recursion_limit {
            Err(ResourceError::Recursion {
                limit: max_recursion_limit,
                depth: current_depth + 1,
            })
        } else {
            Ok(())
        }
    }

    #[inline]
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory.saturating_add(estimated_bytes);
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        self.limits.max_allocations.is_some().then_some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        self.limits.max_memory.is_some().then_some(self.current_memory)
    }
}

/// Configuration for resource limits, loadable from `InterpreterConfig` (section 1.1).
///
/// All limits are optional - set to `None` to disable a specific limit.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of trampoline iterations per run/resume step.
    pub max_operations: Option<usize>,
    /// Maximum number of series allocations allowed.
    pub max_allocations: Option<usize>,
    /// Maximum execution time.
    pub max_duration: Option<Duration>,
    /// Maximum heap memory in bytes (approximate).
    pub max_memory: Option<usize>,
    /// Maximum level-stack depth.
    pub max_recursion_depth: Option<usize>,
}

/// Recommended maximum level-stack depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

impl ResourceLimits {
    /// Creates a new `ResourceLimits` with all limits disabled except max recursion.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }
}

/// A resource tracker that always enforces configurable limits (never silently unlimited).
///
/// When serialized/deserialized, `start_time` is reset to `Instant::now()`, so
/// time limits restart from zero after a snapshot round-trip.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    #[serde(skip, default = "Instant::now")]
    start_time: Instant,
    allocation_count: usize,
    #[serde(default)]
    operation_count: usize,
    current_memory: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
            allocation_count: 0,
            operation_count: 0,
            current_memory: 0,
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.limits.max_duration
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        let size = get_size();
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory + size;
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }

        self.allocation_count += 1;
        self.current_memory += size;
        Ok(())
    }

    fn on_container_insert(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }
        self.allocation_count += 1;
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.current_memory = self.current_memory.saturating_sub(get_size());
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_operations {
            self.operation_count += 1;
            if self.operation_count > max {
                return Err(ResourceError::Operation {
                    limit: max,
                    count: self.operation_count,
                });
            }
        }

        if let Some(max) = self.limits.max_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > max {
                return Err(ResourceError::Time { limit: max, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth
            && current_depth >= max
        {
            return Err(ResourceError::Recursion {
                limit: max,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }

    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory.saturating_add(estimated_bytes);
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.current_memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_tracker_allows_everything_by_default() {
        let mut t = NoLimitTracker::new();
        assert!(t.on_allocate(|| 1_000_000).is_ok());
        assert!(t.check_time().is_ok());
        assert!(t.check_recursion_depth(999_999).is_err());
    }

    #[test]
    fn limited_tracker_enforces_allocation_budget() {
        let mut t = LimitedTracker::new(ResourceLimits::new().max_allocations(2));
        assert!(t.on_allocate(|| 0).is_ok());
        assert!(t.on_allocate(|| 0).is_ok());
        assert!(matches!(t.on_allocate(|| 0), Err(ResourceError::Allocation { .. })));
    }

    #[test]
    fn limited_tracker_enforces_recursion_budget() {
        let t = LimitedTracker::new(ResourceLimits::new().max_recursion_depth(Some(3)));
        assert!(t.check_recursion_depth(2).is_ok());
        assert!(matches!(
            t.check_recursion_depth(3),
            Err(ResourceError::Recursion { .. })
        ));
    }
}
