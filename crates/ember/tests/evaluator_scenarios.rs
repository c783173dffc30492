//! Integration tests for the evaluator runtime's headline scenarios: binding
//! scoping, object path access, action composition, hijack/restore, and
//! throw/catch label matching.

use ember::{
    BindMode, Binding, Bounce, Cell, CellValue, CompositionTable, ContextTable, Feed, Heap, Interner, Level, LevelMode,
    Resources, RunProgress, Runner, SpecifierTable, Throw, dispatch_path, run, run_type_test,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Scenario 1: let-binding scoping
// ============================================================================

#[test]
fn let_patch_shadows_outer_binding_without_mutating_it() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut tracer = ember::NoopTracer;

    let x = interner.intern("x");
    let outer = specifiers.push_let(x, Cell::integer(1), None);
    let inner = specifiers.push_let(x, Cell::integer(2), Some(outer));

    let word = Cell::word(x, None);
    let resolved_inner = ember::resolve(&mut heap, &mut contexts, &specifiers, Some(inner), &word, None, BindMode::Read, &mut tracer).unwrap();
    assert_eq!(ember::resolve_get(&heap, &contexts, &specifiers, resolved_inner), Cell::integer(2));

    // The outer chain, consulted on its own, is untouched by the inner shadow.
    let resolved_outer = ember::resolve(&mut heap, &mut contexts, &specifiers, Some(outer), &word, None, BindMode::Read, &mut tracer).unwrap();
    assert_eq!(ember::resolve_get(&heap, &contexts, &specifiers, resolved_outer), Cell::integer(1));
}

// ============================================================================
// Scenario 2: object path get/set/unbound
// ============================================================================

#[test]
fn object_path_gets_a_field_and_errors_on_an_unknown_one() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut actions = ember::ActionTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();
    let mut tracer = ember::NoopTracer;

    let a = interner.intern("a");
    let ctx = contexts.create(&mut heap, vec![a], vec![Cell::integer(11)]);
    let obj = Cell::new(CellValue::Object(ctx));

    let path_cells = vec![obj.clone(), Cell::word(a, None)];
    let path_series = heap.alloc(ember::Series::new(ember::Flavor::CellArray, ember::Body::Cells(path_cells)));
    let path_cell = Cell::new(CellValue::Path(path_series));

    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    match dispatch_path(&path_cell, None, None, &mut resources, &mut tracer) {
        Bounce::Completed(v) => assert_eq!(v, Cell::integer(11)),
        other => panic!("expected a completed field get, got {other:?}"),
    }

    let missing = interner.intern("missing");
    let bad_path_cells = vec![obj, Cell::word(missing, None)];
    let bad_path_series = heap.alloc(ember::Series::new(ember::Flavor::CellArray, ember::Body::Cells(bad_path_cells)));
    let bad_path_cell = Cell::new(CellValue::Path(bad_path_series));
    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    match dispatch_path(&bad_path_cell, None, None, &mut resources, &mut tracer) {
        Bounce::Raised(err) => assert_eq!(err.category, ember::ExcCategory::Script),
        other => panic!("expected an Access/Script error, got {other:?}"),
    }
}

#[test]
fn set_path_writes_through_to_the_object_field() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut actions = ember::ActionTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();
    let mut tracer = ember::NoopTracer;

    let a = interner.intern("a");
    let ctx = contexts.create(&mut heap, vec![a], vec![Cell::integer(11)]);
    let obj = Cell::new(CellValue::Object(ctx));

    let path_cells = vec![obj, Cell::word(a, None)];
    let path_series = heap.alloc(ember::Series::new(ember::Flavor::CellArray, ember::Body::Cells(path_cells)));
    let path_cell = Cell::new(CellValue::Path(path_series));

    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    match dispatch_path(&path_cell, None, Some(Cell::integer(99)), &mut resources, &mut tracer) {
        Bounce::Completed(v) => assert_eq!(v, Cell::integer(99)),
        other => panic!("expected the set-path write to complete, got {other:?}"),
    }
    assert_eq!(contexts.get(&heap, ctx, a), Some(Cell::integer(99)));
}

// ============================================================================
// Scenario 3: SPECIALIZE freezes a leading argument
// ============================================================================

#[test]
fn specialize_freezes_the_named_argument() {
    let mut heap = Heap::new();
    let mut actions = ember::ActionTable::new();
    let mut contexts = ContextTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();

    fn first_arg_dispatcher(level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
        let LevelMode::Dispatch { args, .. } = &level.mode else {
            unreachable!()
        };
        Bounce::Completed(args.first().cloned().unwrap_or_else(Cell::void))
    }

    let p1 = interner.intern("a");
    let p2 = interner.intern("b");
    let params = vec![
        ember::Param {
            symbol: p1,
            class: ember::ParamClass::Normal,
            flags: ember::ParamFlags::empty(),
            type_test: None,
        },
        ember::Param {
            symbol: p2,
            class: ember::ParamClass::Normal,
            flags: ember::ParamFlags::empty(),
            type_test: None,
        },
    ];
    let original = actions.create(&mut heap, params, first_arg_dispatcher, Vec::new(), None, None);
    let specialized = compositions.specialize(&mut actions, &mut heap, original, vec![(0, Cell::integer(99))], None);

    // Only the unfrozen parameter remains in the specialized paramlist.
    assert_eq!(actions.get(specialized).params.len(), 1);

    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    let mut level = Level::new_eval(Feed::from_variadic(std::iter::empty()));
    level.mode = LevelMode::Dispatch {
        action: specialized,
        args: vec![Cell::integer(1)],
    };
    let dispatcher = resources.actions.get(specialized).dispatcher;
    match dispatcher(&mut level, &mut resources) {
        Bounce::Completed(v) => assert_eq!(v, Cell::integer(99)),
        other => panic!("expected the frozen argument to win, got {other:?}"),
    }
}

// ============================================================================
// Scenario 4: HIJACK then RESTORE
// ============================================================================

#[test]
fn hijack_then_restore_round_trips_the_original_dispatcher() {
    let mut heap = Heap::new();
    let mut actions = ember::ActionTable::new();
    let mut compositions = CompositionTable::new();

    fn original_dispatcher(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
        Bounce::Completed(Cell::integer(1))
    }
    fn hijacked_dispatcher(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
        Bounce::Completed(Cell::integer(2))
    }

    let target = actions.create(&mut heap, Vec::new(), original_dispatcher, Vec::new(), None, None);

    compositions.backup_for_hijack(&actions, target);
    actions.hijack(target, hijacked_dispatcher, Vec::new(), &mut heap);
    assert_eq!(actions.get(target).dispatcher as usize, hijacked_dispatcher as usize);

    let restored = compositions.restore(&mut actions, &mut heap, target);
    assert!(restored);
    assert_eq!(actions.get(target).dispatcher as usize, original_dispatcher as usize);
}

// ============================================================================
// Scenario 5: throw/catch label matching
// ============================================================================

fn throwing_dispatcher(_level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
    let mut interner_local = Interner::new();
    let label_sym = interner_local.intern("stop");
    Bounce::Threw(Throw::named(Cell::word(label_sym, None), Cell::integer(42)))
}

#[test]
fn named_throw_escapes_and_matches_by_label_identity() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut actions = ember::ActionTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();
    let mut tracer = ember::NoopTracer;

    let stop = interner.intern("stop");
    let action = actions.create(&mut heap, Vec::new(), throwing_dispatcher, Vec::new(), None, None);

    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    let mut root = Level::new_root(Feed::from_variadic(std::iter::empty()));
    root.mode = LevelMode::Dispatch { action, args: Vec::new() };

    let err = run(root, &mut resources, &mut tracer).unwrap_err();
    assert!(err.matches(Some(&Cell::word(stop, None))));
    assert!(!err.matches(None));
    assert_eq!(err.value, Cell::integer(42));
}

// ============================================================================
// Scenario 6: FOR-EACH quoted-binding passthrough mutates the outer variable
// ============================================================================

#[test]
fn hard_quoted_loop_variable_mutates_the_outer_slot_in_place() {
    // `'x` in a paramlist means the loop body's variable IS the caller's `x`
    // slot, not a fresh one: each iteration's SET-WORD mutates that same
    // context slot directly, so the binding observed afterward reflects the
    // last iteration, not a shadow that disappears when the loop ends.
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut interner = Interner::new();
    let specifiers = SpecifierTable::new();
    let mut tracer = ember::NoopTracer;

    let x = interner.intern("x");
    let ctx = contexts.create(&mut heap, vec![x], vec![Cell::integer(1)]);
    let outer_word = Cell::word(x, Some(Binding::Context(ctx)));

    for value in [10, 20] {
        let resolved = ember::resolve(&mut heap, &mut contexts, &specifiers, None, &outer_word, None, BindMode::Read, &mut tracer).unwrap();
        let ember::Resolved::ContextSlot(ctx_hit, idx) = resolved else {
            panic!("expected the hard-quoted word to resolve into the caller's context slot");
        };
        assert_eq!(ctx_hit, ctx);
        heap.get_mut(ctx_hit.varlist()).cells_mut()[idx] = Cell::integer(value);
    }

    let resolved = ember::resolve(&mut heap, &mut contexts, &specifiers, None, &outer_word, None, BindMode::Read, &mut tracer).unwrap();
    assert_eq!(ember::resolve_get(&heap, &contexts, &specifiers, resolved), Cell::integer(20));
}

// ============================================================================
// Scenario 1b: enfix folds the prior result into its first argument
// ============================================================================

fn plus_dispatcher(level: &mut Level, _resources: &mut Resources<'_>) -> Bounce {
    let LevelMode::Dispatch { args, .. } = &level.mode else {
        unreachable!()
    };
    let (CellValue::Integer(a), CellValue::Integer(b)) = (&args[0].value, &args[1].value) else {
        return Bounce::Raised(ember::RuntimeError::new(ember::ExcCategory::Script, "plus requires two integers"));
    };
    Bounce::Completed(Cell::integer(a + b))
}

#[test]
fn enfix_operator_rolls_prior_output_into_its_first_argument() {
    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut actions = ember::ActionTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();
    let mut tracer = ember::NoopTracer;

    let param = |symbol| ember::Param {
        symbol,
        class: ember::ParamClass::Normal,
        flags: ember::ParamFlags::empty(),
        type_test: None,
    };
    let a = interner.intern("a");
    let b = interner.intern("b");
    let plus = actions.create(&mut heap, vec![param(a), param(b)], plus_dispatcher, Vec::new(), None, None);
    actions.mark_enfix(plus);

    let ten_sym = interner.intern("ten");
    let plus_sym = interner.intern("plus");
    let ctx = contexts.create(
        &mut heap,
        vec![ten_sym, plus_sym],
        vec![Cell::integer(10), Cell::new(CellValue::Action(plus))],
    );
    let specifier = specifiers.push_varlist_tail(ctx, None);

    let cells: std::rc::Rc<[Cell]> = vec![Cell::word(ten_sym, None), Cell::word(plus_sym, None), Cell::integer(5)].into();
    let level = Level::new_root(Feed::from_block(cells, Some(specifier)));
    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    let result = run(level, &mut resources, &mut tracer).unwrap();
    assert_eq!(result, Cell::integer(15));
}

// ============================================================================
// Embedding-level smoke test tying the trampoline to the public API
// ============================================================================

#[test]
fn runner_evaluates_and_type_tests_a_defined_value() {
    let mut runner = Runner::new();
    runner.interpreter_mut().define("answer", ember::ApiValue::integer(42));
    let sym = runner.interpreter_mut().intern("answer");
    match runner.pump(vec![Cell::word(sym, None)]) {
        RunProgress::Complete(ember::EvalOutcome::Value(v)) => assert_eq!(v.unbox_integer(), Some(42)),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let mut heap = Heap::new();
    let mut contexts = ContextTable::new();
    let mut actions = ember::ActionTable::new();
    let mut specifiers = SpecifierTable::new();
    let mut interner = Interner::new();
    let mut compositions = CompositionTable::new();
    let mut resources = Resources {
        heap: &mut heap,
        contexts: &mut contexts,
        actions: &mut actions,
        specifiers: &mut specifiers,
        interner: &mut interner,
        compositions: &mut compositions,
    };
    let sym = resources.interner.intern("integer?");
    let test = vec![Cell::word(sym, None)];
    assert!(run_type_test(&test, &Cell::integer(1), &mut resources).unwrap());
    assert!(!run_type_test(&test, &Cell::blank(), &mut resources).unwrap());
}
