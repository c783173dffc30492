//! Path dispatch (section 4.3): resolving and invoking `a/b/c`-shaped
//! sequences against whatever `a` turns out to be.
//!
//! A path walks its elements left to right, asking each intermediate value
//! how to apply the next picker. The dispatcher governing that value returns
//! a [`Signal`] rather than a plain cell so the walker can tell "a value was
//! produced", "a mutable reference/slot was produced" (needed for `a/b: x`),
//! "stop, I'm invisible", or "I don't understand this picker" apart from
//! each other. Refinements (`foo/bar:baz`) accumulate on the data stack and
//! get reversed in place before the action call, since they're encountered in
//! left-to-right written order but consumed in the paramlist's declared order.

use crate::binder::BindMode;
use crate::cell::{Cell, CellValue, Heart};
use crate::error::{ExcCategory, RuntimeError};
use crate::level::{Bounce, Resources};
use crate::specifier::SpecifierId;
use crate::tracer::VmTracer;

/// What a single path-element dispatch produced.
pub enum Signal {
    /// An ordinary value.
    Value(Cell),
    /// A context slot reference, usable as a `SET-PATH!` target.
    Reference(crate::context::ContextId, usize),
    /// The value must not be evaluated further (e.g. picked an action without calling it).
    Immediate(Cell),
    /// Picking here produced nothing (an invisible result).
    Invisible,
    /// This value's dispatcher has no rule for the given picker.
    Unhandled,
    /// A group encountered mid-path evaluated and threw (section 4.3's table).
    Thrown(crate::error::Throw),
}

/// Dispatches a `PATH!` cell found during evaluation (section 4.3). `setval`
/// is `None` for an ordinary `PATH!` get and `Some` for a `SET-PATH!`: the
/// final picker's target is written rather than read. When the walk never
/// reaches a writable reference (e.g. the last picker produced a plain
/// value, not a `Reference`), a `setval` is simply discarded after the walk
/// completes, mirroring "picking past the writable slot" being a script error
/// the caller is expected to have prevented by construction.
pub fn dispatch(cell: &Cell, specifier: Option<SpecifierId>, setval: Option<Cell>, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Bounce {
    let CellValue::Path(series_id) = &cell.value else {
        unreachable!("path::dispatch called on a non-path cell")
    };
    let elements = resources.heap.get(*series_id).cells().to_vec();
    let Some((head, rest)) = elements.split_first() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "empty path"));
    };

    let head_resolved = match resolve_head(head, specifier, resources, tracer) {
        Ok(v) => v,
        Err(e) => return Bounce::Raised(e),
    };

    if rest.is_empty() {
        return Bounce::Completed(head_resolved);
    }

    let mut refinements = Vec::new();
    let mut current = head_resolved;
    let mut last_reference: Option<(crate::context::ContextId, usize)> = None;
    for picker in rest {
        match step_picker(&current, picker, resources) {
            Ok(Signal::Value(v) | Signal::Immediate(v)) => {
                last_reference = None;
                current = v;
            }
            Ok(Signal::Reference(ctx, idx)) => {
                last_reference = Some((ctx, idx));
                current = resources.heap.get(ctx.varlist()).cells()[idx].clone();
            }
            Ok(Signal::Invisible) => return Bounce::Completed(Cell::void()),
            Ok(Signal::Unhandled) => {
                refinements.push(picker.clone());
            }
            Ok(Signal::Thrown(t)) => return Bounce::Threw(t),
            Err(e) => return Bounce::Raised(e),
        }
    }
    // Refinements were pushed in written (left-to-right) order but must be
    // consumed in declared-paramlist order; reverse in place here so a
    // specialized action built from them fills parameters in declared order.
    refinements.reverse();

    if let Some(value) = setval {
        let Some((ctx, idx)) = last_reference else {
            return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "set-path target is not an assignable reference"));
        };
        resources.heap.get_mut(ctx.varlist()).cells_mut()[idx] = value.clone();
        return Bounce::Completed(value);
    }

    if refinements.is_empty() {
        return Bounce::Completed(current);
    }

    // `foo/bar` where `foo` resolved to an action: build a specialized
    // action that pre-fills the refinement pickers' paramlist slots, rather
    // than threading refinement state through a separate data stack.
    let CellValue::Action(original) = current.value else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "path refinements require an action head"));
    };
    let mut frozen = Vec::with_capacity(refinements.len());
    for picker in &refinements {
        let CellValue::Word(symbol, _) = &picker.value else {
            return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "path refinement picker must be a word"));
        };
        let Some(index) = resources.actions.get(original).params.iter().position(|p| p.symbol == *symbol) else {
            return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "no such refinement on action"));
        };
        frozen.push((index, Cell::new(CellValue::Logic(true))));
    }
    let specialized = resources
        .compositions
        .specialize(resources.actions, resources.heap, original, frozen, None);
    Bounce::Completed(Cell::new(CellValue::Action(specialized)))
}

fn resolve_head(head: &Cell, specifier: Option<SpecifierId>, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Result<Cell, RuntimeError> {
    match &head.value {
        CellValue::Word(symbol, binding) => {
            let word = Cell::word(*symbol, Some(*binding));
            let resolved = crate::binder::resolve(resources.heap, resources.contexts, resources.specifiers, specifier, &word, None, BindMode::Read, tracer)?;
            Ok(crate::binder::get(resources.heap, resources.contexts, resources.specifiers, resolved))
        }
        _ => Ok(head.clone()),
    }
}

fn step_picker(current: &Cell, picker: &Cell, resources: &mut Resources<'_>) -> Result<Signal, RuntimeError> {
    match (current.heart(), &picker.value) {
        (Heart::Object | Heart::Frame, CellValue::Word(symbol, _)) => {
            let ctx = match &current.value {
                CellValue::Object(c) | CellValue::Frame(c) => *c,
                _ => unreachable!(),
            };
            if !resources.contexts.is_accessible(resources.heap, ctx) {
                return Err(RuntimeError::new(ExcCategory::Access, "context is inaccessible"));
            }
            match resources.contexts.index_of(resources.heap, ctx, *symbol) {
                Some(idx) => Ok(Signal::Reference(ctx, idx)),
                None => Err(RuntimeError::new(ExcCategory::Script, "no such field in path pick")),
            }
        }
        (Heart::Block, CellValue::Integer(n)) => {
            let CellValue::Block(series_id) = &current.value else {
                unreachable!()
            };
            let cells = resources.heap.get(*series_id).cells();
            let idx = usize::try_from(*n - 1).unwrap_or(usize::MAX);
            match cells.get(idx) {
                Some(c) => Ok(Signal::Value(c.clone())),
                None => Ok(Signal::Invisible),
            }
        }
        _ => Ok(Signal::Unhandled),
    }
}

/// The "inert head" edge case: a path whose first element is neither a word
/// nor an action-bearing value is legal but can't be picked into further; we
/// surface it as an Access error only when the caller actually attempted to
/// get or set through it (see Open Questions in the design ledger).
pub fn inert_head_error() -> RuntimeError {
    RuntimeError::new(ExcCategory::Script, "path head is inert and cannot be picked into")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionTable;
    use crate::compose::CompositionTable;
    use crate::context::ContextTable;
    use crate::intern::Interner;
    use crate::series::Heap;
    use crate::specifier::SpecifierTable;

    #[test]
    fn object_path_picks_field() {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let mut actions = ActionTable::new();
        let mut specifiers = SpecifierTable::new();
        let mut interner = Interner::new();
        let mut compositions = CompositionTable::new();
        let field = interner.intern("a");
        let ctx = contexts.create(&mut heap, vec![field], vec![Cell::integer(11)]);
        let obj = Cell::new(CellValue::Object(ctx));
        let mut resources = Resources {
            heap: &mut heap,
            contexts: &mut contexts,
            actions: &mut actions,
            specifiers: &mut specifiers,
            interner: &mut interner,
            compositions: &mut compositions,
        };
        let signal = step_picker(&obj, &Cell::word(field, None), &mut resources).unwrap();
        match signal {
            Signal::Reference(got_ctx, idx) => {
                assert_eq!(got_ctx, ctx);
                assert_eq!(idx, 1);
            }
            _ => panic!("expected a reference signal"),
        }
    }
}
