//! Property-style integration tests covering the evaluator's structural
//! invariants: binder referential stability, specifier-merge resolvability,
//! specialize-equivalence, hijack-reversibility, and GC push/drop balance.

use ember::{
    BindMode, Body, Bounce, Cell, CompositionTable, ContextTable, Feed, Flavor, Heap, HeapDiff, Interner, Level,
    LevelMode, Param, ParamClass, ParamFlags, Resolved, Resources, Series, SpecifierTable, resolve, resolve_get,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Binder referential stability
// ============================================================================

#[test]
fn resolving_the_same_context_slot_twice_yields_the_same_slot() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut tracer = ember::NoopTracer;

    let x = interner.intern("x");
    let ctx = contexts.create(&mut heap, vec![x], vec![Cell::integer(1)]);
    let word = Cell::word(x, Some(ember::Binding::Context(ctx)));

    let first = resolve(&mut heap, &contexts, &specifiers, None, &word, None, BindMode::Read, &mut tracer).unwrap();
    let second = resolve(&mut heap, &contexts, &specifiers, None, &word, None, BindMode::Read, &mut tracer).unwrap();
    assert_eq!(first, second);
    assert!(first.cacheable());
    match first {
        Resolved::ContextSlot(got_ctx, idx) => {
            assert_eq!(got_ctx, ctx);
            assert_eq!(idx, 1);
        }
        Resolved::LetPatch(_) => panic!("expected a context slot, not a let patch"),
    }
}

#[test]
fn a_let_patch_hit_is_not_cache_eligible() {
    let mut heap = Heap::new();
    let contexts = ContextTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut tracer = ember::NoopTracer;

    let x = interner.intern("x");
    let patch = specifiers.push_let(x, Cell::integer(7), None);
    let word = Cell::word(x, None);
    let resolved = resolve(&mut heap, &contexts, &specifiers, Some(patch), &word, None, BindMode::Read, &mut tracer).unwrap();
    assert!(!resolved.cacheable());
}

// ============================================================================
// Specifier-merge resolvability: whatever a merged chain resolves to is
// observable through either half of the merge.
// ============================================================================

#[test]
fn merged_specifier_resolves_both_inner_and_outer_names() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut tracer = ember::NoopTracer;

    let outer_key = interner.intern("outer");
    let inner_key = interner.intern("inner");
    let ctx = contexts.create(&mut heap, vec![outer_key], vec![Cell::integer(100)]);
    let outer_chain = specifiers.push_varlist_tail(ctx, None);
    let inner_chain = specifiers.push_let(inner_key, Cell::integer(200), None);

    let (merged, _reused) = specifiers.merge(Some(outer_chain), Some(inner_chain));

    let inner_word = Cell::word(inner_key, None);
    let resolved_inner = resolve(&mut heap, &contexts, &specifiers, merged, &inner_word, None, BindMode::Read, &mut tracer).unwrap();
    assert_eq!(resolve_get(&heap, &contexts, &specifiers, resolved_inner), Cell::integer(200));

    let outer_word = Cell::word(outer_key, None);
    let resolved_outer = resolve(&mut heap, &contexts, &specifiers, merged, &outer_word, None, BindMode::Read, &mut tracer).unwrap();
    assert_eq!(resolve_get(&heap, &contexts, &specifiers, resolved_outer), Cell::integer(100));
}

// ============================================================================
// Specialize-equivalence: calling the specialized action with only the
// unfrozen arguments must equal calling the original with all arguments,
// frozen ones substituted in their declared positions.
// ============================================================================

fn sum_two_dispatcher(level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
    let LevelMode::Dispatch { args, .. } = &level.mode else {
        unreachable!()
    };
    let Cell { value: ember::CellValue::Integer(a), .. } = &args[0] else {
        unreachable!()
    };
    let Cell { value: ember::CellValue::Integer(b), .. } = &args[1] else {
        unreachable!()
    };
    Bounce::Completed(Cell::integer(a + b))
}

#[test]
fn specializing_one_argument_matches_calling_the_original_directly() {
    let mut heap = Heap::new();
    let mut actions = ember::ActionTable::new();
    let mut contexts = ContextTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();

    let p1 = interner.intern("a");
    let p2 = interner.intern("b");
    let params = vec![
        Param { symbol: p1, class: ParamClass::Normal, flags: ParamFlags::empty(), type_test: None },
        Param { symbol: p2, class: ParamClass::Normal, flags: ParamFlags::empty(), type_test: None },
    ];
    let original = actions.create(&mut heap, params, sum_two_dispatcher, Vec::new(), None, None);
    let specialized = compositions.specialize(&mut actions, &mut heap, original, vec![(0, Cell::integer(10))], None);

    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };

    let direct = {
        let mut level = Level::new_eval(Feed::from_variadic(std::iter::empty()));
        level.mode = LevelMode::Dispatch { action: original, args: vec![Cell::integer(10), Cell::integer(5)] };
        match sum_two_dispatcher(&mut level, &mut resources) {
            Bounce::Completed(v) => v,
            other => panic!("unexpected bounce: {other:?}"),
        }
    };

    let via_specialized = {
        let mut level = Level::new_eval(Feed::from_variadic(std::iter::empty()));
        level.mode = LevelMode::Dispatch { action: specialized, args: vec![Cell::integer(5)] };
        let dispatcher = resources.actions.get(specialized).dispatcher;
        match dispatcher(&mut level, &mut resources) {
            Bounce::Completed(v) => v,
            other => panic!("unexpected bounce: {other:?}"),
        }
    };

    assert_eq!(direct, via_specialized);
}

// ============================================================================
// Hijack-reversibility
// ============================================================================

fn original_behavior(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
    Bounce::Completed(Cell::integer(1))
}
fn hijacked_behavior(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
    Bounce::Completed(Cell::integer(2))
}

#[test]
fn hijack_then_restore_is_behaviorally_the_identity() {
    let mut heap = Heap::new();
    let mut actions = ember::ActionTable::new();
    let mut compositions = CompositionTable::new();

    let target = actions.create(&mut heap, Vec::new(), original_behavior, Vec::new(), None, None);
    let before_dispatcher = actions.get(target).dispatcher;

    compositions.backup_for_hijack(&actions, target);
    actions.hijack(target, hijacked_behavior, Vec::new(), &mut heap);
    assert_ne!(actions.get(target).dispatcher as usize, before_dispatcher as usize);

    assert!(compositions.restore(&mut actions, &mut heap, target));
    assert_eq!(actions.get(target).dispatcher as usize, before_dispatcher as usize);

    // Restoring twice is a no-op failure, not a panic: the backup is consumed.
    assert!(!compositions.restore(&mut actions, &mut heap, target));
}

// ============================================================================
// Push/drop-level balance: running a program that nests one extra level
// (a GROUP!) leaves heap occupancy exactly where it started once the level
// stack has unwound and a collection runs against an empty root set.
// ============================================================================

#[test]
fn nested_group_evaluation_leaves_the_heap_balanced_after_collection() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut actions = ember::ActionTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();
    let mut tracer = ember::NoopTracer;

    let before = heap.collect(&[]);

    let inner_series = heap.alloc(Series::new(Flavor::CellArray, Body::Cells(vec![Cell::integer(9)])));
    let group_cell = Cell::new(ember::CellValue::Group(inner_series));
    let program: std::rc::Rc<[Cell]> = vec![group_cell].into();

    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    let level = Level::new_root(Feed::from_block(program, None));
    let result = ember::run(level, &mut resources, &mut tracer).unwrap();
    assert_eq!(result, Cell::integer(9));

    let after = heap.collect(&[]);
    assert!(HeapDiff::between(before, after).is_balanced());
}
