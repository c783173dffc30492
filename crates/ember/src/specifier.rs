//! Specifier chains: how a bound-but-relative word resolves to a concrete
//! variable (sections 3.6 and 4.2).
//!
//! A specifier is a singly-linked chain of small nodes threaded through
//! whatever blocks get passed around during evaluation — `LET`-introduced
//! variables prepend a [`Specifier::LetPatch`], a `USE` block prepends a
//! [`Specifier::UsePatch`], and a frame's own varlist terminates the chain
//! with [`Specifier::VarlistTail`]. [`SpecifierTable::merge`] is what lets an
//! inner block (e.g. a function body) see both its own newly-bound locals and
//! whatever specifier it was invoked with, without mutating either chain in
//! place.

use crate::cell::Cell;
use crate::context::ContextId;
use crate::intern::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecifierId(u32);

impl SpecifierId {
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum Specifier {
    /// A single `LET`-bound variable, consulted before falling through to `next`.
    LetPatch {
        symbol: Symbol,
        value: Cell,
        next: Option<SpecifierId>,
    },
    /// A `USE`-introduced scope naming a whole context to search before `next`.
    UsePatch {
        context: ContextId,
        next: Option<SpecifierId>,
    },
    /// The terminal link to a frame's own varlist (section 3.6); still carries
    /// `next` so module fallback can chain past it.
    VarlistTail {
        context: ContextId,
        next: Option<SpecifierId>,
    },
}

impl Specifier {
    #[must_use]
    fn next(&self) -> Option<SpecifierId> {
        match self {
            Self::LetPatch { next, .. } | Self::UsePatch { next, .. } | Self::VarlistTail { next, .. } => *next,
        }
    }

    fn set_next(&mut self, new_next: Option<SpecifierId>) {
        match self {
            Self::LetPatch { next, .. } | Self::UsePatch { next, .. } | Self::VarlistTail { next, .. } => {
                *next = new_next;
            }
        }
    }
}

/// Append-only arena of specifier nodes. Append-only because a node's id may
/// be embedded in many live cells' bindings (section 4.1's `Binding::Patch`);
/// rebuilding a chain for merge allocates new nodes rather than mutating
/// shared ones.
#[derive(Default)]
pub struct SpecifierTable {
    nodes: Vec<Specifier>,
}

impl SpecifierTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_let(&mut self, symbol: Symbol, value: Cell, next: Option<SpecifierId>) -> SpecifierId {
        self.alloc(Specifier::LetPatch { symbol, value, next })
    }

    pub fn push_use(&mut self, context: ContextId, next: Option<SpecifierId>) -> SpecifierId {
        self.alloc(Specifier::UsePatch { context, next })
    }

    pub fn push_varlist_tail(&mut self, context: ContextId, next: Option<SpecifierId>) -> SpecifierId {
        self.alloc(Specifier::VarlistTail { context, next })
    }

    fn alloc(&mut self, node: Specifier) -> SpecifierId {
        let id = SpecifierId::from_raw(u32::try_from(self.nodes.len()).expect("specifier arena overflow"));
        self.nodes.push(node);
        id
    }

    #[must_use]
    pub fn get(&self, id: SpecifierId) -> &Specifier {
        &self.nodes[id.raw() as usize]
    }

    /// Follows `LetPatch`/`UsePatch` nodes looking for `symbol`; on a
    /// `VarlistTail`, defers to the caller (the binder also needs to consult
    /// the word's own stored binding at that point, section 4.1).
    #[must_use]
    pub fn find_let(&self, mut id: Option<SpecifierId>, symbol: Symbol) -> Option<&Cell> {
        while let Some(node_id) = id {
            match self.get(node_id) {
                Specifier::LetPatch { symbol: s, value, next } => {
                    if *s == symbol {
                        return Some(value);
                    }
                    id = *next;
                }
                Specifier::UsePatch { next, .. } | Specifier::VarlistTail { next, .. } => id = *next,
            }
        }
        None
    }

    /// True if walking `next` pointers from `chain` reaches exactly `target`
    /// (including the case `chain == target`) before running out — i.e.
    /// `chain`'s tail already *is* `target`, so [`Self::merge`] can return
    /// `chain` unchanged instead of rebuilding it.
    fn chain_already_ends_in(&self, chain: Option<SpecifierId>, target: Option<SpecifierId>) -> bool {
        let mut cur = chain;
        loop {
            if cur == target {
                return true;
            }
            match cur {
                Some(id) => cur = self.get(id).next(),
                None => return false,
            }
        }
    }

    /// Splices `outer` onto the end of `inner`'s chain, copying only the
    /// nodes whose tail actually needs to change.
    fn rebuild_with_tail(&mut self, inner: SpecifierId, outer: Option<SpecifierId>) -> SpecifierId {
        let node = self.get(inner).clone();
        let new_next = match node.next() {
            Some(next_id) if !self.chain_already_ends_in(Some(next_id), outer) => {
                Some(self.rebuild_with_tail(next_id, outer))
            }
            Some(_) => node.next(),
            None => outer,
        };
        let mut rebuilt = node;
        rebuilt.set_next(new_next);
        self.alloc(rebuilt)
    }

    /// Merges an `outer` specifier (the context a block was already running
    /// in) with an `inner` one (fresh bindings introduced at this step),
    /// inner taking precedence (section 4.2). Returns `(chain, reused)` where
    /// `reused` is true iff `inner`'s own storage already terminated in
    /// `outer` and no copying was needed.
    pub fn merge(&mut self, outer: Option<SpecifierId>, inner: Option<SpecifierId>) -> (Option<SpecifierId>, bool) {
        let Some(inner_id) = inner else {
            return (outer, true);
        };
        if self.chain_already_ends_in(Some(inner_id), outer) {
            (Some(inner_id), true)
        } else {
            (Some(self.rebuild_with_tail(inner_id, outer)), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextTable;
    use crate::intern::Interner;
    use crate::series::Heap;

    #[test]
    fn let_patch_shadows_outer_same_symbol() {
        let mut table = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let outer = table.push_let(x, Cell::integer(1), None);
        let inner = table.push_let(x, Cell::integer(2), Some(outer));
        assert_eq!(table.find_let(Some(inner), x), Some(&Cell::integer(2)));
    }

    #[test]
    fn merge_reuses_chain_when_tail_already_matches() {
        let mut table = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut heap = Heap::new();
        let mut ctx_table = ContextTable::new();
        let ctx = ctx_table.create(&mut heap, vec![], vec![]);
        let outer = table.push_varlist_tail(ctx, None);
        let inner = table.push_let(x, Cell::integer(1), Some(outer));
        let (merged, reused) = table.merge(Some(outer), Some(inner));
        assert!(reused);
        assert_eq!(merged, Some(inner));
    }

    #[test]
    fn merge_rebuilds_when_tails_differ() {
        let mut table = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut heap = Heap::new();
        let mut ctx_table = ContextTable::new();
        let ctx_a = ctx_table.create(&mut heap, vec![], vec![]);
        let ctx_b = ctx_table.create(&mut heap, vec![], vec![]);
        let unrelated_outer = table.push_varlist_tail(ctx_a, None);
        let other_outer = table.push_varlist_tail(ctx_b, None);
        let inner = table.push_let(x, Cell::integer(1), Some(unrelated_outer));
        let (merged, reused) = table.merge(Some(other_outer), Some(inner));
        assert!(!reused);
        assert_eq!(table.find_let(merged, x), Some(&Cell::integer(1)));
    }
}
