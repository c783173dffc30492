//! Actions: callable values built from a details array, a paramlist, a
//! dispatcher function, and an optional adjunct object (section 3.5).
//!
//! The dispatcher is a plain Rust function pointer, not a trait object or
//! boxed closure — section 9's design note picks a tagged [`crate::level::Bounce`]
//! return plus an explicit trampoline specifically so dispatch never needs
//! indirect call overhead or a vtable; composition primitives like
//! `ADAPT`/`CHAIN` (section 4.5) work by pointing several actions' details at
//! shared data and giving each its own small dispatcher, not by wrapping
//! closures.

use ahash::AHashMap;

use crate::cell::Cell;
use crate::context::ContextId;
use crate::level::{Bounce, Level, Resources};
use crate::series::SeriesId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ActionId(SeriesId);

impl ActionId {
    #[must_use]
    pub const fn from_raw(details_raw: u32) -> Self {
        Self(SeriesId::from_raw(details_raw))
    }

    #[must_use]
    pub const fn details(self) -> SeriesId {
        self.0
    }
}

/// Parameter passing class (section 3.5): how the evaluator gathers this
/// argument before the dispatcher runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ParamClass {
    /// Fully evaluated like any other argument.
    Normal,
    /// Evaluated, then wrapped so antiforms/voids become inspectable quasiforms.
    Meta,
    /// Takes the next element literally, no evaluation (`'arg`).
    HardQuoted,
    /// Takes the next element literally unless it's a group, which is evaluated (`:arg`).
    SoftQuoted,
    /// A refinement name (`/arg`); present/absent, optionally followed by its own args.
    Refinement,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamFlags: u8 {
        /// May be omitted even when not a refinement-gated argument.
        const SKIPPABLE = 1 << 0;
        /// Accepts the end-of-input antiform rather than erroring.
        const ENDABLE = 1 << 1;
        /// Cannot be rebound; passed as a fixed value.
        const CONST = 1 << 2;
        /// May legally resolve to a vanishing/invisible result.
        const VANISHABLE = 1 << 3;
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub symbol: crate::intern::Symbol,
    pub class: ParamClass,
    pub flags: ParamFlags,
    /// Block of type-test cells (section 4.6), or `None` for an unconstrained parameter.
    pub type_test: Option<SeriesId>,
}

pub type DispatcherFn = fn(&mut Level, &mut Resources<'_>) -> Bounce;

#[derive(Clone)]
pub struct ActionEntry {
    pub params: Vec<Param>,
    pub dispatcher: DispatcherFn,
    /// The details array's series id — dispatcher-private storage (e.g. a
    /// specialized action's frozen argument cells, a chain's step list).
    pub details: SeriesId,
    pub adjunct: Option<ContextId>,
    /// Human-readable name for tracing and error messages; actions are
    /// otherwise anonymous values.
    pub label: Option<crate::intern::Symbol>,
    /// Enfix (infix) actions defer gathering their first argument: the
    /// evaluator rolls the previous step's output into that slot instead of
    /// pulling a fresh value from the feed (section 4.4).
    pub enfix: bool,
    /// Type-test block for this action's `RETURN` value, or `None` if
    /// unconstrained (section 4.6).
    pub return_test: Option<SeriesId>,
    /// Whether a vanished (void antiform) result is acceptable even with a
    /// `return_test` present.
    pub return_vanishable: bool,
}

/// Owns every action's metadata, keyed by [`ActionId`].
///
/// Mirrors [`crate::context::ContextTable`]: the details array itself lives
/// in the [`crate::series::Heap`] so the GC can trace whatever cells a
/// dispatcher stashed there, while the paramlist and dispatcher pointer (data
/// the GC never needs to walk) live in plain Rust-side storage.
#[derive(Default)]
pub struct ActionTable {
    entries: AHashMap<ActionId, ActionEntry>,
}

impl ActionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        heap: &mut crate::series::Heap,
        params: Vec<Param>,
        dispatcher: DispatcherFn,
        details_cells: Vec<Cell>,
        adjunct: Option<ContextId>,
        label: Option<crate::intern::Symbol>,
    ) -> ActionId {
        let details = heap.alloc(crate::series::Series::new(
            crate::series::Flavor::Details,
            crate::series::Body::Cells(details_cells),
        ));
        let id = ActionId(details);
        self.entries.insert(
            id,
            ActionEntry {
                params,
                dispatcher,
                details,
                adjunct,
                label,
                enfix: false,
                return_test: None,
                return_vanishable: false,
            },
        );
        id
    }

    #[must_use]
    pub fn get(&self, id: ActionId) -> &ActionEntry {
        &self.entries[&id]
    }

    pub fn get_mut(&mut self, id: ActionId) -> &mut ActionEntry {
        self.entries.get_mut(&id).expect("unknown action id")
    }

    /// Marks an existing action enfix (section 4.4): the evaluator will defer
    /// its first argument and roll in the previous step's output instead.
    pub fn mark_enfix(&mut self, id: ActionId) {
        self.get_mut(id).enfix = true;
    }

    /// Attaches a `RETURN` type-test block (section 4.6), optionally
    /// tolerating a vanished (void antiform) result.
    pub fn set_return_test(&mut self, id: ActionId, test: SeriesId, vanishable: bool) {
        let entry = self.get_mut(id);
        entry.return_test = Some(test);
        entry.return_vanishable = vanishable;
    }

    /// Replaces an action's dispatcher and details in place, preserving its
    /// identity (`ActionId`/paramlist-visible shape) — this is `HIJACK`
    /// (section 4.5): every existing reference to the action now runs the new
    /// behavior.
    pub fn hijack(&mut self, target: ActionId, dispatcher: DispatcherFn, details_cells: Vec<Cell>, heap: &mut crate::series::Heap) {
        *heap.get_mut(target.details()).cells_mut() = details_cells;
        self.get_mut(target).dispatcher = dispatcher;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Heap;

    fn noop_dispatcher(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
        Bounce::Completed(Cell::blank())
    }

    #[test]
    fn create_and_get_round_trip() {
        let mut heap = Heap::new();
        let mut table = ActionTable::new();
        let id = table.create(&mut heap, vec![], noop_dispatcher, vec![], None, None);
        assert_eq!(table.get(id).params.len(), 0);
    }

    #[test]
    fn hijack_replaces_dispatcher_but_keeps_id() {
        let mut heap = Heap::new();
        let mut table = ActionTable::new();
        let id = table.create(&mut heap, vec![], noop_dispatcher, vec![Cell::integer(1)], None, None);
        fn other_dispatcher(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
            Bounce::Completed(Cell::integer(42))
        }
        table.hijack(id, other_dispatcher, vec![Cell::integer(2)], &mut heap);
        assert_eq!(heap.get(id.details()).cells()[0], Cell::integer(2));
    }
}
