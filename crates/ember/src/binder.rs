//! The binder: resolving a word cell to a concrete variable slot (section 4.1).
//!
//! Resolution order is fixed: walk the specifier chain threaded through the
//! block currently being evaluated (innermost `LET`/`USE` first), then fall
//! back to the word's own stored [`Binding`](crate::cell::Binding), then (if
//! that's a relative binding into an action) substitute the caller's current
//! frame, and only then give up with an unbound-word error. Only a direct hit
//! in a context the word's stored binding names outright is cache-eligible —
//! a hit found by walking the specifier chain is transient to this one
//! evaluation and must be re-resolved next time (section 4.1's cache policy).

use crate::cell::{Binding, Cell, CellValue};
use crate::context::ContextTable;
use crate::error::RuntimeError;
use crate::intern::Symbol;
use crate::series::Heap;
use crate::specifier::{SpecifierId, SpecifierTable};

/// The mode a caller resolves a word under (section 4.1 step 3): a plain
/// read, a write (which may attach a new module slot on a total miss), or a
/// read that only succeeds if some binding is already attached (used by
/// constructs that must not silently create a module variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Read,
    Write,
    ReadIfAttached,
}

/// Where a word resolved to, and whether that hit is safe to cache back onto
/// the word cell for next time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// A `LET`-bound value living directly in the specifier chain.
    LetPatch(SpecifierId),
    /// A slot in some context's varlist, at the given index.
    ContextSlot(crate::context::ContextId, usize),
    /// A module's hitch-chain entry (section 4.1 step 3) — never cacheable,
    /// since a later definition in the module or its library can shadow it.
    HitchSlot(crate::series::SeriesId, usize),
}

impl Resolved {
    #[must_use]
    pub fn cacheable(self) -> bool {
        matches!(self, Self::ContextSlot(..))
    }
}

fn symbol_of(cell: &Cell) -> Option<Symbol> {
    match &cell.value {
        CellValue::Word(s, _) => Some(*s),
        _ => None,
    }
}

fn binding_of(cell: &Cell) -> Option<&Binding> {
    match &cell.value {
        CellValue::Word(_, b) => Some(b),
        _ => None,
    }
}

/// Resolves `word` against `specifier`, falling back to its own stored
/// binding, then (section 4.1 step 3) a module's hitch chain or library
/// module, and only then gives up unbound.
///
/// `caller_frame`, when the word's stored binding names a context that is a
/// proper ancestor of it, lets a descendant context stand in for the stored
/// one (section 4.1 step 2's "derived binding": a word captured in a
/// template object resolves against the live object it was copied into,
/// not the template).
pub fn resolve(
    heap: &mut Heap,
    contexts: &mut ContextTable,
    specifiers: &SpecifierTable,
    specifier: Option<SpecifierId>,
    word: &Cell,
    caller_frame: Option<crate::context::ContextId>,
    mode: BindMode,
    tracer: &mut impl crate::tracer::VmTracer,
) -> Result<Resolved, RuntimeError> {
    let symbol = symbol_of(word).ok_or_else(|| RuntimeError::new(crate::error::ExcCategory::Internal, "resolve called on a non-word cell"))?;

    if let Some(found) = walk_specifier_chain(heap, contexts, specifiers, specifier, symbol) {
        tracer.on_bind_resolve("<word>", false);
        return Ok(found);
    }

    match binding_of(word) {
        Some(Binding::Context(ctx)) => {
            let target = derived_target(heap, contexts, *ctx, caller_frame);
            if let Some(idx) = contexts.index_of(heap, target, symbol) {
                tracer.on_bind_resolve("<stored>", true);
                return Ok(Resolved::ContextSlot(target, idx));
            }
            if contexts.is_module(heap, target)
                && let Some(found) = module_fallback(heap, contexts, target, symbol, mode, tracer)
            {
                return Ok(found);
            }
        }
        Some(Binding::Patch(id)) => {
            if let Some(found) = walk_specifier_chain(heap, contexts, specifiers, Some(*id), symbol) {
                tracer.on_bind_resolve("<stored-patch>", false);
                return Ok(found);
            }
        }
        Some(Binding::Relative(action, slot)) => {
            // A relative binding only means something once a concrete frame
            // has been substituted for it via `Binding::Context`; bare
            // relative words (no level ever built a frame for `action`) are
            // simply unbound.
            let _ = (action, slot);
        }
        Some(Binding::Unbound) | None => {}
    }

    Err(RuntimeError::unbound(&format!("word#{}", symbol.raw())))
}

/// If `caller_frame` descends from `stored` (the keylist ancestor chain
/// reaches `stored`'s keylist), resolve through the descendant instead —
/// section 4.1 step 2's derived-binding substitution.
fn derived_target(heap: &Heap, contexts: &ContextTable, stored: crate::context::ContextId, caller_frame: Option<crate::context::ContextId>) -> crate::context::ContextId {
    let Some(caller) = caller_frame else {
        return stored;
    };
    if caller == stored {
        return stored;
    }
    let stored_keylist = contexts.keylist_of(stored);
    let mut walk = Some(contexts.keylist_of(caller));
    while let Some(id) = walk {
        if id == stored_keylist {
            return caller;
        }
        walk = heap.get(id).ancestor;
    }
    stored
}

/// Section 4.1 step 3: a miss on a module context consults its hitch chain,
/// and on a total miss either attaches a fresh slot (write mode) or falls
/// through to the library module (read mode).
fn module_fallback(
    heap: &mut Heap,
    contexts: &mut ContextTable,
    module: crate::context::ContextId,
    symbol: Symbol,
    mode: BindMode,
    tracer: &mut impl crate::tracer::VmTracer,
) -> Option<Resolved> {
    if let Some((chain_id, idx)) = contexts.hitch_slot(heap, module, symbol) {
        tracer.on_bind_resolve("<hitch>", false);
        return Some(Resolved::HitchSlot(chain_id, idx));
    }
    match mode {
        BindMode::Write => {
            let (chain_id, idx) = contexts.hitch_attach(heap, module, symbol, Cell::void());
            tracer.on_bind_resolve("<hitch-attach>", false);
            Some(Resolved::HitchSlot(chain_id, idx))
        }
        BindMode::Read => {
            let library = contexts.library_module()?;
            if library == module {
                return None;
            }
            if let Some(idx) = contexts.index_of(heap, library, symbol) {
                tracer.on_bind_resolve("<library>", false);
                return Some(Resolved::ContextSlot(library, idx));
            }
            let (chain_id, idx) = contexts.hitch_slot(heap, library, symbol)?;
            tracer.on_bind_resolve("<library-hitch>", false);
            Some(Resolved::HitchSlot(chain_id, idx))
        }
        BindMode::ReadIfAttached => None,
    }
}

fn walk_specifier_chain(
    heap: &Heap,
    contexts: &ContextTable,
    specifiers: &SpecifierTable,
    mut specifier: Option<SpecifierId>,
    symbol: Symbol,
) -> Option<Resolved> {
    while let Some(id) = specifier {
        match specifiers.get(id) {
            crate::specifier::Specifier::LetPatch { symbol: s, next, .. } => {
                if *s == symbol {
                    return Some(Resolved::LetPatch(id));
                }
                specifier = *next;
            }
            crate::specifier::Specifier::UsePatch { context, next } | crate::specifier::Specifier::VarlistTail { context, next } => {
                if let Some(idx) = contexts.index_of(heap, *context, symbol) {
                    return Some(Resolved::ContextSlot(*context, idx));
                }
                specifier = *next;
            }
        }
    }
    None
}

/// Dereferences a resolved binding to its current value.
#[must_use]
pub fn get(heap: &Heap, _contexts: &ContextTable, specifiers: &SpecifierTable, resolved: Resolved) -> Cell {
    match resolved {
        Resolved::LetPatch(id) => match specifiers.get(id) {
            crate::specifier::Specifier::LetPatch { value, .. } => value.clone(),
            _ => unreachable!("Resolved::LetPatch must point at a LetPatch node"),
        },
        Resolved::ContextSlot(ctx, idx) => heap.get(ctx.varlist()).cells()[idx].clone(),
        Resolved::HitchSlot(series, idx) => heap.get(series).cells()[idx].clone(),
    }
}

/// Writes a value back through a resolved binding (section 4.1: used by
/// `SET-WORD!` assignment and `SET-PATH!`'s final write-back).
pub fn set(heap: &mut Heap, specifiers: &SpecifierTable, resolved: Resolved, value: Cell) {
    match resolved {
        Resolved::LetPatch(id) => {
            let crate::specifier::Specifier::LetPatch { .. } = specifiers.get(id) else {
                unreachable!("Resolved::LetPatch must point at a LetPatch node");
            };
            // `LetPatch` nodes are immutable once pushed (section 3.6); a
            // `LET`-bound name is rebound by pushing a fresh patch, not by
            // mutating this one, so a set through it is a no-op by design.
            let _ = value;
        }
        Resolved::ContextSlot(ctx, idx) => heap.get_mut(ctx.varlist()).cells_mut()[idx] = value,
        Resolved::HitchSlot(series, idx) => heap.get_mut(series).cells_mut()[idx] = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextTable;
    use crate::intern::Interner;
    use crate::tracer::NoopTracer;

    #[test]
    fn resolves_through_let_patch() {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let mut specifiers = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let patch = specifiers.push_let(x, Cell::integer(7), None);
        let word = Cell::word(x, None);
        let mut tracer = NoopTracer;
        let resolved = resolve(&mut heap, &mut contexts, &specifiers, Some(patch), &word, None, BindMode::Read, &mut tracer).unwrap();
        assert_eq!(get(&heap, &contexts, &specifiers, resolved), Cell::integer(7));
    }

    #[test]
    fn unbound_word_is_a_script_error() {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let specifiers = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let word = Cell::word(x, None);
        let mut tracer = NoopTracer;
        let err = resolve(&mut heap, &mut contexts, &specifiers, None, &word, None, BindMode::Read, &mut tracer).unwrap_err();
        assert_eq!(err.category, crate::error::ExcCategory::Script);
    }

    #[test]
    fn resolves_through_stored_context_binding() {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let specifiers = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let ctx = contexts.create(&mut heap, vec![x], vec![Cell::integer(9)]);
        let word = Cell::word(x, Some(Binding::Context(ctx)));
        let mut tracer = NoopTracer;
        let resolved = resolve(&mut heap, &mut contexts, &specifiers, None, &word, None, BindMode::Read, &mut tracer).unwrap();
        assert_eq!(get(&heap, &contexts, &specifiers, resolved), Cell::integer(9));
    }

    #[test]
    fn write_mode_attaches_a_module_slot_on_miss() {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let specifiers = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let module = contexts.create(&mut heap, vec![], vec![]);
        contexts.mark_module(&mut heap, module);
        let word = Cell::word(x, Some(Binding::Context(module)));
        let mut tracer = NoopTracer;
        let resolved = resolve(&mut heap, &mut contexts, &specifiers, None, &word, None, BindMode::Write, &mut tracer).unwrap();
        assert!(matches!(resolved, Resolved::HitchSlot(..)));
        assert!(!resolved.cacheable());

        // A second read now finds the attached slot instead of erroring.
        let resolved_again = resolve(&mut heap, &mut contexts, &specifiers, None, &word, None, BindMode::Read, &mut tracer).unwrap();
        assert_eq!(get(&heap, &contexts, &specifiers, resolved_again), Cell::void());
    }

    #[test]
    fn read_mode_falls_through_to_library_module() {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let specifiers = SpecifierTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let library = contexts.create(&mut heap, vec![x], vec![Cell::integer(5)]);
        contexts.set_library_module(library);
        let module = contexts.create(&mut heap, vec![], vec![]);
        contexts.mark_module(&mut heap, module);
        let word = Cell::word(x, Some(Binding::Context(module)));
        let mut tracer = NoopTracer;
        let resolved = resolve(&mut heap, &mut contexts, &specifiers, None, &word, None, BindMode::Read, &mut tracer).unwrap();
        assert_eq!(get(&heap, &contexts, &specifiers, resolved), Cell::integer(5));
    }
}
