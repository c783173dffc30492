//! Trampoline execution tracing infrastructure (section 1.1 ambient stack).
//!
//! Provides a trait-based tracing system for the level/trampoline loop with
//! zero-cost abstraction. When using [`NoopTracer`], all trace methods compile
//! away entirely via monomorphization — identical to how [`NoLimitTracker`]
//! eliminates resource-checking overhead in production.
//!
//! # Architecture
//!
//! The [`VmTracer`] trait defines hook points at key trampoline events (level
//! push/drop, binder resolution, throw/catch, GC sweep boundaries). Concrete
//! implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`RecordingTracer`] | Full event recording for deterministic replay or post-mortem |
//!
//! # Usage
//!
//! The trampoline is parameterized as `Trampoline<'a, T: ResourceTracker, Tr: VmTracer>`.
//! Callers choose the tracer at construction time.

use crate::level::Bounce;

/// Trace event emitted during trampoline execution.
///
/// Used by [`RecordingTracer`] to capture a full execution trace for
/// deterministic replay or post-mortem analysis.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A level was pushed onto the level stack.
    LevelPush {
        /// Level-stack depth after the push.
        depth: usize,
        /// Human-readable label for the level's executor, if any.
        label: Option<String>,
    },
    /// A level was dropped (completed, aborted, or unwound by a throw).
    LevelDrop {
        /// Level-stack depth after the drop.
        depth: usize,
    },
    /// A word was resolved by the binder.
    BindResolve {
        /// The symbol's interned text, for diagnostics.
        symbol: String,
        /// Whether the binding was found directly in the owning context
        /// (cacheable) or inherited (never cached).
        direct: bool,
    },
    /// A throw began unwinding the level stack.
    Throw {
        /// The throw's catch label, if named.
        label: Option<String>,
    },
    /// A throw was caught by a level.
    Catch {
        /// The catch label that matched.
        label: Option<String>,
    },
    /// A GC sweep pass completed.
    GcSweep {
        /// Number of series freed in this sweep.
        freed: usize,
    },
}

/// Trait for trampoline execution tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
pub trait VmTracer: std::fmt::Debug {
    /// Called whenever a level is pushed onto the level stack.
    #[inline(always)]
    fn on_level_push(&mut self, _depth: usize, _label: Option<&str>) {}

    /// Called whenever a level is dropped (completed, aborted, or unwound).
    #[inline(always)]
    fn on_level_drop(&mut self, _depth: usize) {}

    /// Called whenever the binder resolves a word to a variable.
    #[inline(always)]
    fn on_bind_resolve(&mut self, _symbol: &str, _direct: bool) {}

    /// Called at the start of a throw's unwind.
    #[inline(always)]
    fn on_throw(&mut self, _label: Option<&str>) {}

    /// Called when a level catches a throw.
    #[inline(always)]
    fn on_catch(&mut self, _label: Option<&str>) {}

    /// Called when a bounce is produced by an executor (for coarse-grained tracing).
    #[inline(always)]
    fn on_bounce(&mut self, _bounce: &Bounce) {}

    /// Called after a GC sweep pass.
    #[inline(always)]
    fn on_gc_sweep(&mut self, _freed: usize) {}
}

// ============================================================================
// NoopTracer — zero-cost production default
// ============================================================================

/// A tracer that does nothing.
///
/// All trait methods use the default no-op implementations, so the compiler
/// can inline every hook to nothing — zero runtime cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

// ============================================================================
// StderrTracer — human-readable execution log
// ============================================================================

/// Tracer that prints a human-readable execution log to stderr.
///
/// Useful for interactive debugging — pipe stderr to a file while stdout
/// shows normal evaluation output.
#[derive(Debug)]
pub struct StderrTracer {
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit: None,
            count: 0,
            stopped: false,
        }
    }

    /// Creates a new stderr tracer that stops after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
            stopped: false,
        }
    }

    fn tick(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} events) ---");
            self.stopped = true;
        }
        true
    }
}

impl Default for StderrTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl VmTracer for StderrTracer {
    fn on_level_push(&mut self, depth: usize, label: Option<&str>) {
        if !self.tick() {
            return;
        }
        eprintln!("  >>> PUSH {:<20} depth={depth}", label.unwrap_or("<anonymous>"));
    }

    fn on_level_drop(&mut self, depth: usize) {
        if !self.tick() {
            return;
        }
        eprintln!("  <<< DROP              depth={depth}");
    }

    fn on_bind_resolve(&mut self, symbol: &str, direct: bool) {
        if !self.tick() {
            return;
        }
        eprintln!("  ... BIND {symbol} direct={direct}");
    }

    fn on_throw(&mut self, label: Option<&str>) {
        if !self.tick() {
            return;
        }
        eprintln!("  !!! THROW label={label:?}");
    }

    fn on_catch(&mut self, label: Option<&str>) {
        if !self.tick() {
            return;
        }
        eprintln!("  === CATCH label={label:?}");
    }

    fn on_gc_sweep(&mut self, freed: usize) {
        if !self.tick() {
            return;
        }
        eprintln!("  *** GC swept {freed} series");
    }
}

// ============================================================================
// RecordingTracer — full event recording for replay
// ============================================================================

/// Tracer that records all events for deterministic replay or post-mortem analysis.
///
/// Captures every trace event into a `Vec<TraceEvent>`. This is the most
/// expensive tracer (allocates per event), so use it only for debugging
/// specific issues or recording short evaluations.
#[derive(Debug)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a new recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            limit: None,
        }
    }

    /// Creates a new recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn at_limit(&self) -> bool {
        self.limit.is_some_and(|l| self.events.len() >= l)
    }
}

impl Default for RecordingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl VmTracer for RecordingTracer {
    fn on_level_push(&mut self, depth: usize, label: Option<&str>) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::LevelPush {
            depth,
            label: label.map(String::from),
        });
    }

    fn on_level_drop(&mut self, depth: usize) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::LevelDrop { depth });
    }

    fn on_bind_resolve(&mut self, symbol: &str, direct: bool) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::BindResolve {
            symbol: symbol.to_owned(),
            direct,
        });
    }

    fn on_throw(&mut self, label: Option<&str>) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::Throw {
            label: label.map(String::from),
        });
    }

    fn on_catch(&mut self, label: Option<&str>) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::Catch {
            label: label.map(String::from),
        });
    }

    fn on_gc_sweep(&mut self, freed: usize) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::GcSweep { freed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tracer_captures_push_and_drop() {
        let mut tracer = RecordingTracer::new();
        tracer.on_level_push(1, Some("eval"));
        tracer.on_level_drop(0);
        assert_eq!(tracer.events().len(), 2);
    }

    #[test]
    fn recording_tracer_respects_limit() {
        let mut tracer = RecordingTracer::with_limit(1);
        tracer.on_level_push(1, None);
        tracer.on_level_push(2, None);
        assert_eq!(tracer.events().len(), 1);
    }
}
