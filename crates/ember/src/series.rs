//! Heap-allocated series storage and the GC arena (sections 3.3 and 3.8).
//!
//! A [`Series`] is a flavor-tagged, growable heap array — the spec's byte
//! strings, cell arrays, keylists, paramlists, varlists, details arrays, and
//! patch/hitch-chain nodes are all series that differ only in `flavor` and
//! `body` shape. Contexts (section 3.4) and actions (section 3.5) are pairs
//! of series identified by [`SeriesId`]; [`crate::context::ContextId`] and
//! [`crate::action::ActionId`] newtype the varlist/details series id they
//! name.
//!
//! Series live in a single [`Heap`] arena (`Vec<Slot>` plus a free list)
//! rather than behind raw pointers, per the design note in section 9: a
//! typed, arena-indexed handle lets the borrow checker enforce that nothing
//! outlives the heap that owns it, without `unsafe`.

use crate::cell::Cell;
use crate::intern::Symbol;

/// An index into a [`Heap`] arena. Stable for the lifetime of the series
/// (reused only after the slot is freed and the GC has confirmed no live
/// reference remains, at which point holding a stale id is a caller bug, not
/// a safety hazard — `Heap::get` panics on a freed slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SeriesId(u32);

impl SeriesId {
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Which concrete kind of heap array this series is (section 3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Flavor {
    ByteString,
    CellArray,
    KeyList,
    ParamList,
    VarList,
    Details,
    LetPatch,
    UsePatch,
    HitchChain,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SeriesFlags: u8 {
        /// Participates in GC (vs. manually freed); section 3.7's one-way flip.
        const MANAGED = 1 << 0;
        /// Mark-and-sweep color bit, meaningful only mid-collection.
        const GC_MARK = 1 << 1;
        /// Content may not be mutated (frozen/protected).
        const PROTECTED = 1 << 2;
        /// A context's varlist was freed out from under live references to it
        /// (section 3.7); any further dereference is an Access error, not a panic.
        const INACCESSIBLE = 1 << 3;
        /// This context is a module (section 4.1 step 3): binder misses fall
        /// through to its hitch chain, then to the library module.
        const MODULE = 1 << 4;
    }
}

/// The element storage of a series, shaped by its [`Flavor`].
#[derive(Debug, Clone)]
pub enum Body {
    Bytes(Vec<u8>),
    Cells(Vec<Cell>),
    /// Keylists store symbols, not cells (section 3.4).
    Symbols(Vec<Symbol>),
}

impl Body {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Cells(c) => c.len(),
            Self::Symbols(s) => s.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_cells(&self) -> Option<&[Cell]> {
        match self {
            Self::Cells(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_cells_mut(&mut self) -> Option<&mut Vec<Cell>> {
        match self {
            Self::Cells(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    pub flavor: Flavor,
    pub flags: SeriesFlags,
    pub body: Body,
    /// For a keylist: the series id of its ancestor keylist, if this one was
    /// derived by copy-on-write extension (section 3.4).
    pub ancestor: Option<SeriesId>,
}

impl Series {
    #[must_use]
    pub fn new(flavor: Flavor, body: Body) -> Self {
        Self {
            flavor,
            flags: SeriesFlags::MANAGED,
            body,
            ancestor: None,
        }
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        self.body.as_cells().expect("series is not a cell array")
    }

    pub fn cells_mut(&mut self) -> &mut Vec<Cell> {
        self.body.as_cells_mut().expect("series is not a cell array")
    }

    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.flags.contains(SeriesFlags::MANAGED)
    }

    #[must_use]
    pub fn is_inaccessible(&self) -> bool {
        self.flags.contains(SeriesFlags::INACCESSIBLE)
    }
}

enum Slot {
    Occupied(Series),
    Free { next: Option<u32> },
}

/// The GC arena: every series lives here, addressed by [`SeriesId`].
#[derive(Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    mark_color: bool,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            mark_color: false,
        }
    }

    pub fn alloc(&mut self, series: Series) -> SeriesId {
        if let Some(idx) = self.free_head {
            let next = match &self.slots[idx as usize] {
                Slot::Free { next } => *next,
                Slot::Occupied(_) => unreachable!("free list points at occupied slot"),
            };
            self.free_head = next;
            self.slots[idx as usize] = Slot::Occupied(series);
            SeriesId::from_raw(idx)
        } else {
            let idx = u32::try_from(self.slots.len()).expect("heap arena overflow");
            self.slots.push(Slot::Occupied(series));
            SeriesId::from_raw(idx)
        }
    }

    #[must_use]
    pub fn get(&self, id: SeriesId) -> &Series {
        match &self.slots[id.raw() as usize] {
            Slot::Occupied(s) => s,
            Slot::Free { .. } => panic!("dereferenced a freed series id {id:?}"),
        }
    }

    pub fn get_mut(&mut self, id: SeriesId) -> &mut Series {
        match &mut self.slots[id.raw() as usize] {
            Slot::Occupied(s) => s,
            Slot::Free { .. } => panic!("dereferenced a freed series id {id:?}"),
        }
    }

    /// Manually frees a series (section 3.7: only valid for non-managed series,
    /// or managed ones the caller has independently proven unreachable).
    pub fn free(&mut self, id: SeriesId) {
        let idx = id.raw() as usize;
        self.slots[idx] = Slot::Free { next: self.free_head };
        self.free_head = Some(id.raw());
    }

    #[must_use]
    pub fn is_allocated(&self, id: SeriesId) -> bool {
        matches!(self.slots.get(id.raw() as usize), Some(Slot::Occupied(_)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Occupied(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn trace_cell(&self, cell: &Cell, mark_color: bool, mut visit: impl FnMut(SeriesId) -> bool) {
        if let Some(child) = cell.value.series_id() {
            self.trace_series(child, mark_color, &mut visit);
        }
    }

    fn trace_series(&self, id: SeriesId, mark_color: bool, visit: &mut impl FnMut(SeriesId) -> bool) {
        if !visit(id) {
            return;
        }
        if let Slot::Occupied(series) = &self.slots[id.raw() as usize]
            && let Body::Cells(cells) = &series.body
        {
            for cell in cells {
                self.trace_cell(cell, mark_color, &mut *visit);
            }
        }
    }

    /// Mark-and-sweep collection: marks everything reachable from `roots`
    /// (section 3.8's explicit root set — data stack, mold stack, level
    /// stack, API handle table), then frees every managed series left
    /// unmarked. Flips `mark_color` so the next cycle's mark bit starts
    /// clean without a separate unmark pass.
    pub fn collect(&mut self, roots: &[SeriesId]) -> HeapStats {
        let color = !self.mark_color;
        let mut marked = std::collections::HashSet::new();
        for &root in roots {
            if self.is_allocated(root) {
                self.trace_series(root, color, &mut |id| marked.insert(id));
            }
        }
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied(series) = slot {
                if series.is_managed() {
                    let id = SeriesId::from_raw(u32::try_from(idx).expect("heap arena overflow"));
                    if marked.contains(&id) {
                        series.flags.insert(SeriesFlags::GC_MARK);
                    } else {
                        series.flags.remove(SeriesFlags::GC_MARK);
                    }
                }
            }
        }
        let mut freed = 0usize;
        for idx in 0..self.slots.len() {
            let should_free = matches!(&self.slots[idx],
                Slot::Occupied(series) if series.is_managed() && !series.flags.contains(SeriesFlags::GC_MARK));
            if should_free {
                self.slots[idx] = Slot::Free { next: self.free_head };
                self.free_head = Some(u32::try_from(idx).expect("heap arena overflow"));
                freed += 1;
            }
        }
        self.mark_color = color;
        HeapStats {
            live: self.len(),
            freed,
        }
    }
}

/// Snapshot of arena occupancy, typically logged after a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub live: usize,
    pub freed: usize,
}

/// The delta between two [`HeapStats`] snapshots, for leak-hunting tests
/// (section 8's push/drop-balance properties).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapDiff {
    pub live_delta: i64,
}

impl HeapDiff {
    #[must_use]
    pub fn between(before: HeapStats, after: HeapStats) -> Self {
        Self {
            live_delta: after.live as i64 - before.live as i64,
        }
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.live_delta == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_get_round_trips() {
        let mut heap = Heap::new();
        let id = heap.alloc(Series::new(Flavor::CellArray, Body::Cells(vec![Cell::integer(1)])));
        assert_eq!(heap.get(id).cells().len(), 1);
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut heap = Heap::new();
        let a = heap.alloc(Series::new(Flavor::ByteString, Body::Bytes(vec![])));
        heap.free(a);
        let b = heap.alloc(Series::new(Flavor::ByteString, Body::Bytes(vec![1])));
        assert_eq!(a, b);
    }

    #[test]
    fn collect_frees_unreachable_managed_series() {
        let mut heap = Heap::new();
        let root = heap.alloc(Series::new(Flavor::CellArray, Body::Cells(vec![])));
        let orphan = heap.alloc(Series::new(Flavor::CellArray, Body::Cells(vec![])));
        let stats = heap.collect(&[root]);
        assert_eq!(stats.freed, 1);
        assert!(heap.is_allocated(root));
        assert!(!heap.is_allocated(orphan));
    }
}
