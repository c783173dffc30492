//! Contexts: the keylist/varlist pair backing objects, modules, and frames
//! (section 3.4).
//!
//! A context is two series: a **keylist** (symbols naming each slot, shared
//! copy-on-write between a context and its extensions via an ancestor
//! backlink) and a **varlist** (one cell longer than the keylist — slot 0 is
//! the archetype, an object-heart cell referring back to this same context,
//! i.e. "self"). [`ContextId`] names the varlist; [`ContextTable`] is the
//! side table recording which keylist each varlist currently uses, since COW
//! extension can swap a varlist onto a freshly-derived keylist without
//! touching the varlist's own series id.

use ahash::AHashMap;

use crate::cell::{Cell, CellValue};
use crate::series::{Body, Flavor, Heap, Series, SeriesId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ContextId(SeriesId);

impl ContextId {
    #[must_use]
    pub const fn from_raw(varlist_raw: u32) -> Self {
        Self(SeriesId::from_raw(varlist_raw))
    }

    #[must_use]
    pub const fn varlist(self) -> SeriesId {
        self.0
    }
}

/// Tracks the current keylist for each live context's varlist.
///
/// Kept separate from the varlist series itself (rather than a field on
/// [`Series`]) because only varlists need it, and indexing by `ContextId`
/// keeps the mapping visible at the point contexts are extended.
#[derive(Debug, Default)]
pub struct ContextTable {
    keylists: AHashMap<ContextId, SeriesId>,
    /// Per-module hitch-chain series (section 4.1 step 3), allocated lazily
    /// on first attachment so a module that never gains an extra binding
    /// never pays for one.
    hitch_chains: AHashMap<ContextId, SeriesId>,
    /// The single library module consulted on a read-mode module miss
    /// (section 4.1 step 3).
    library_module: Option<ContextId>,
}

impl ContextTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh context with the given keys (symbols) and initial
    /// values. `values.len()` must equal `keys.len()`; the varlist gets one
    /// extra leading slot for the self-archetype.
    pub fn create(&mut self, heap: &mut Heap, keys: Vec<crate::intern::Symbol>, values: Vec<Cell>) -> ContextId {
        assert_eq!(keys.len(), values.len(), "context keys/values length mismatch");
        let keylist_id = heap.alloc(Series::new(Flavor::KeyList, Body::Symbols(keys)));
        let varlist_id = heap.alloc(Series::new(Flavor::VarList, Body::Cells(Vec::new())));
        let ctx = ContextId(varlist_id);
        let archetype = Cell::new(CellValue::Object(ctx));
        let mut cells = Vec::with_capacity(values.len() + 1);
        cells.push(archetype);
        cells.extend(values);
        heap.get_mut(varlist_id).body = Body::Cells(cells);
        self.keylists.insert(ctx, keylist_id);
        ctx
    }

    #[must_use]
    pub fn keylist_of(&self, ctx: ContextId) -> SeriesId {
        self.keylists[&ctx]
    }

    /// Looks up a slot index by symbol, walking the keylist's ancestor chain
    /// (copy-on-write extension, section 3.4) so a derived context still
    /// finds keys it inherited rather than copied.
    #[must_use]
    pub fn index_of(&self, heap: &Heap, ctx: ContextId, symbol: crate::intern::Symbol) -> Option<usize> {
        let mut keylist_id = self.keylist_of(ctx);
        loop {
            let keylist = heap.get(keylist_id);
            let Body::Symbols(symbols) = &keylist.body else {
                unreachable!("keylist series must hold symbols")
            };
            if let Some(pos) = symbols.iter().position(|&s| s == symbol) {
                return Some(pos + 1); // +1: slot 0 is the archetype
            }
            keylist_id = keylist.ancestor?;
        }
    }

    #[must_use]
    pub fn get(&self, heap: &Heap, ctx: ContextId, symbol: crate::intern::Symbol) -> Option<Cell> {
        let idx = self.index_of(heap, ctx, symbol)?;
        heap.get(ctx.varlist()).cells().get(idx).cloned()
    }

    pub fn set(&self, heap: &mut Heap, ctx: ContextId, symbol: crate::intern::Symbol, value: Cell) -> bool {
        let Some(idx) = self.index_of(heap, ctx, symbol) else {
            return false;
        };
        heap.get_mut(ctx.varlist()).cells_mut()[idx] = value;
        true
    }

    /// Extends `ctx` with a new key/value slot, deriving a fresh keylist that
    /// backlinks to the old one (copy-on-write: siblings who only read the
    /// prior keylist are unaffected).
    pub fn extend(&mut self, heap: &mut Heap, ctx: ContextId, key: crate::intern::Symbol, value: Cell) {
        let old_keylist_id = self.keylist_of(ctx);
        let new_keylist_id = heap.alloc(Series::new(Flavor::KeyList, Body::Symbols(vec![key])));
        heap.get_mut(new_keylist_id).ancestor = Some(old_keylist_id);
        self.keylists.insert(ctx, new_keylist_id);
        heap.get_mut(ctx.varlist()).cells_mut().push(value);
    }

    /// Marks a context's varlist inaccessible (section 3.7): any further
    /// dereference through a held reference is an Access error, not UB.
    pub fn invalidate(&self, heap: &mut Heap, ctx: ContextId) {
        heap.get_mut(ctx.varlist())
            .flags
            .insert(crate::series::SeriesFlags::INACCESSIBLE);
    }

    #[must_use]
    pub fn is_accessible(&self, heap: &Heap, ctx: ContextId) -> bool {
        !heap.get(ctx.varlist()).is_inaccessible()
    }

    /// Flags `ctx` as a module (section 4.1 step 3).
    pub fn mark_module(&self, heap: &mut Heap, ctx: ContextId) {
        heap.get_mut(ctx.varlist()).flags.insert(crate::series::SeriesFlags::MODULE);
    }

    #[must_use]
    pub fn is_module(&self, heap: &Heap, ctx: ContextId) -> bool {
        heap.get(ctx.varlist()).flags.contains(crate::series::SeriesFlags::MODULE)
    }

    pub fn set_library_module(&mut self, ctx: ContextId) {
        self.library_module = Some(ctx);
    }

    #[must_use]
    pub fn library_module(&self) -> Option<ContextId> {
        self.library_module
    }

    /// Finds the hitch-chain slot index for `symbol` in `ctx`'s chain, if one
    /// has ever been attached.
    fn hitch_index_of(&self, heap: &Heap, ctx: ContextId, symbol: crate::intern::Symbol) -> Option<usize> {
        let chain_id = *self.hitch_chains.get(&ctx)?;
        let cells = heap.get(chain_id).cells();
        let mut i = 0;
        while i < cells.len() {
            if let CellValue::Word(s, _) = &cells[i].value
                && *s == symbol
            {
                return Some(i + 1);
            }
            i += 2;
        }
        None
    }

    /// Reads a module's hitch-chain entry for `symbol`, if attached.
    #[must_use]
    pub fn hitch_get(&self, heap: &Heap, ctx: ContextId, symbol: crate::intern::Symbol) -> Option<Cell> {
        let idx = self.hitch_index_of(heap, ctx, symbol)?;
        let chain_id = self.hitch_chains[&ctx];
        heap.get(chain_id).cells().get(idx).cloned()
    }

    /// Returns the hitch chain's series id and the value slot's index for
    /// `symbol`, if attached — usable as a `Resolved::HitchSlot` address.
    #[must_use]
    pub fn hitch_slot(&self, heap: &Heap, ctx: ContextId, symbol: crate::intern::Symbol) -> Option<(SeriesId, usize)> {
        let idx = self.hitch_index_of(heap, ctx, symbol)?;
        Some((self.hitch_chains[&ctx], idx))
    }

    /// Attaches (or overwrites) a module-scope hitch-chain slot for `symbol`
    /// (section 4.1 step 3's write-mode attachment), allocating the chain
    /// series itself on first use.
    pub fn hitch_attach(&mut self, heap: &mut Heap, ctx: ContextId, symbol: crate::intern::Symbol, value: Cell) -> (SeriesId, usize) {
        if let Some((chain_id, idx)) = self.hitch_slot(heap, ctx, symbol) {
            heap.get_mut(chain_id).cells_mut()[idx] = value;
            return (chain_id, idx);
        }
        let chain_id = match self.hitch_chains.get(&ctx) {
            Some(id) => *id,
            None => {
                let id = heap.alloc(Series::new(Flavor::HitchChain, Body::Cells(Vec::new())));
                self.hitch_chains.insert(ctx, id);
                id
            }
        };
        let cells = heap.get_mut(chain_id).cells_mut();
        cells.push(Cell::word(symbol, None));
        cells.push(value);
        (chain_id, cells.len() - 1)
    }
}
