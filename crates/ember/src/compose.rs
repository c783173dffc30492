//! Action composition primitives (section 4.5): `SPECIALIZE`, `ADAPT`,
//! `CHAIN`, `ENCLOSE`, `HIJACK`, `LAMBDA`, and `TYPECHECKER`.
//!
//! Each primitive builds a brand new [`ActionId`] whose dispatcher is one of
//! the small functions below; what makes each one behave differently lives in
//! a [`CompositionKind`] keyed by that new action's id in [`CompositionTable`],
//! since a plain `fn` dispatcher has no closure environment to stash
//! per-instance state in. A dispatcher recovers its own id from
//! `level.mode`'s `Dispatch { action, .. }` and looks itself up from there.
//! `HIJACK` is the one primitive that doesn't mint a new id — see
//! [`crate::action::ActionTable::hijack`], which replaces an existing
//! action's dispatcher and details in place so every outstanding reference
//! observes the new behavior (section 4.5's "hijack-reversibility" property
//! keeps the pre-hijack details around via [`CompositionKind::HijackBackup`]
//! so `RESTORE` can undo it).

use ahash::AHashMap;

use crate::action::{ActionId, ActionTable, Param};
use crate::cell::Cell;
use crate::error::{ExcCategory, RuntimeError};
use crate::intern::Symbol;
use crate::level::{Bounce, Level, LevelMode, Resources};

#[derive(Debug, Clone)]
pub enum CompositionKind {
    Specialize {
        original: ActionId,
        frozen: Vec<(usize, Cell)>,
    },
    Adapt {
        original: ActionId,
        prelude: Vec<Cell>,
    },
    Chain {
        steps: Vec<ActionId>,
    },
    Enclose {
        original: ActionId,
        wrapper: ActionId,
    },
    /// A hijacked action's pre-hijack dispatcher and details, kept so the
    /// change can be undone.
    HijackBackup {
        dispatcher: crate::action::DispatcherFn,
        details: Vec<Cell>,
    },
    TypeChecker {
        test: Vec<Cell>,
    },
}

#[derive(Default)]
pub struct CompositionTable {
    kinds: AHashMap<ActionId, CompositionKind>,
    /// Frames handed to an `ENCLOSE` wrapper, keyed by the frame's context so
    /// [`invoke_frame`] can recover which action they belong to.
    pending_frames: AHashMap<crate::context::ContextId, ActionId>,
}

impl CompositionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_action(level: &Level) -> ActionId {
        match level.mode {
            LevelMode::Dispatch { action, .. } => action,
            _ => unreachable!("composition dispatcher invoked outside Dispatch mode"),
        }
    }

    fn args_of(level: &Level) -> &[Cell] {
        match &level.mode {
            LevelMode::Dispatch { args, .. } => args,
            _ => unreachable!("composition dispatcher invoked outside Dispatch mode"),
        }
    }

    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&CompositionKind> {
        self.kinds.get(&id)
    }

    /// `SPECIALIZE`: builds a new action that always supplies `frozen`
    /// argument values for the listed parameter indices, gathering only the rest.
    pub fn specialize(
        &mut self,
        actions: &mut ActionTable,
        heap: &mut crate::series::Heap,
        original: ActionId,
        frozen: Vec<(usize, Cell)>,
        label: Option<Symbol>,
    ) -> ActionId {
        let remaining_params: Vec<Param> = actions
            .get(original)
            .params
            .iter()
            .enumerate()
            .filter(|(i, _)| !frozen.iter().any(|(fi, _)| fi == i))
            .map(|(_, p)| p.clone())
            .collect();
        let id = actions.create(heap, remaining_params, specialize_dispatcher, Vec::new(), None, label);
        self.kinds.insert(id, CompositionKind::Specialize { original, frozen });
        id
    }

    /// `ADAPT`: runs `prelude` (a block of cells, interpreted by the caller
    /// before this dispatcher is reached in a full implementation) then
    /// invokes `original` with whatever arguments were gathered.
    pub fn adapt(&mut self, actions: &mut ActionTable, heap: &mut crate::series::Heap, original: ActionId, prelude: Vec<Cell>, label: Option<Symbol>) -> ActionId {
        let params = actions.get(original).params.clone();
        let id = actions.create(heap, params, adapt_dispatcher, Vec::new(), None, label);
        self.kinds.insert(id, CompositionKind::Adapt { original, prelude });
        id
    }

    /// `CHAIN`: feeds the first action's result as the sole argument to the
    /// next, and so on; the paramlist is the first step's.
    pub fn chain(&mut self, actions: &mut ActionTable, heap: &mut crate::series::Heap, steps: Vec<ActionId>, label: Option<Symbol>) -> ActionId {
        let params = steps.first().map(|first| actions.get(*first).params.clone()).unwrap_or_default();
        let id = actions.create(heap, params, chain_dispatcher, Vec::new(), None, label);
        self.kinds.insert(id, CompositionKind::Chain { steps });
        id
    }

    /// `ENCLOSE`: `wrapper` receives a frame for `original` as its single
    /// argument and decides whether/how to invoke it — used to run code both
    /// before and after, inspecting or replacing the result.
    pub fn enclose(&mut self, actions: &mut ActionTable, heap: &mut crate::series::Heap, original: ActionId, wrapper: ActionId, label: Option<Symbol>) -> ActionId {
        let params = actions.get(original).params.clone();
        let id = actions.create(heap, params, enclose_dispatcher, Vec::new(), None, label);
        self.kinds.insert(id, CompositionKind::Enclose { original, wrapper });
        id
    }

    /// `LAMBDA`: the common case of a freshly-written action, not a
    /// composition over an existing one — included here because it shares
    /// `ActionTable::create`'s signature and the other primitives' calling
    /// convention.
    pub fn lambda(&mut self, actions: &mut ActionTable, heap: &mut crate::series::Heap, params: Vec<Param>, dispatcher: crate::action::DispatcherFn, label: Option<Symbol>) -> ActionId {
        actions.create(heap, params, dispatcher, Vec::new(), None, label)
    }

    /// `TYPECHECKER`: wraps a type-test block (section 4.6) as a one-argument
    /// predicate action.
    pub fn typechecker(&mut self, actions: &mut ActionTable, heap: &mut crate::series::Heap, test: Vec<Cell>, param: Symbol, label: Option<Symbol>) -> ActionId {
        let params = vec![Param {
            symbol: param,
            class: crate::action::ParamClass::Normal,
            flags: crate::action::ParamFlags::empty(),
            type_test: None,
        }];
        let id = actions.create(heap, params, typechecker_dispatcher, Vec::new(), None, label);
        self.kinds.insert(id, CompositionKind::TypeChecker { test });
        id
    }

    /// Backs up `target`'s current behavior before `HIJACK` overwrites it,
    /// so `restore` can reverse it later (section 4.5).
    pub fn backup_for_hijack(&mut self, actions: &ActionTable, target: ActionId) {
        let entry = actions.get(target);
        self.kinds.insert(
            target,
            CompositionKind::HijackBackup {
                dispatcher: entry.dispatcher,
                details: Vec::new(),
            },
        );
    }

    pub fn restore(&mut self, actions: &mut ActionTable, heap: &mut crate::series::Heap, target: ActionId) -> bool {
        let Some(CompositionKind::HijackBackup { dispatcher, details }) = self.kinds.remove(&target) else {
            return false;
        };
        actions.hijack(target, dispatcher, details, heap);
        true
    }
}

fn specialize_dispatcher(level: &mut Level, resources: &mut Resources<'_>) -> Bounce {
    let id = CompositionTable::current_action(level);
    let gathered = CompositionTable::args_of(level).to_vec();
    let Some(CompositionKind::Specialize { original, frozen }) = resources.compositions.get(id).cloned() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Internal, "missing specialize metadata"));
    };
    let param_count = resources.actions.get(original).params.len();
    let mut gathered_iter = gathered.into_iter();
    let mut next_frozen = frozen.into_iter().peekable();
    let mut full_args = Vec::with_capacity(param_count);
    for i in 0..param_count {
        if let Some((_, value)) = next_frozen.next_if(|(fi, _)| *fi == i) {
            full_args.push(value);
        } else {
            full_args.push(gathered_iter.next().unwrap_or_else(Cell::void));
        }
    }
    call_through(resources, original, full_args)
}

/// Runs `prelude` in a frame built from `original`'s parameters bound to the
/// gathered `args`, so prelude code can read and reassign them by name before
/// `original` is actually invoked with whatever the frame holds afterward.
fn adapt_dispatcher(level: &mut Level, resources: &mut Resources<'_>) -> Bounce {
    let id = CompositionTable::current_action(level);
    let args = CompositionTable::args_of(level).to_vec();
    let Some(CompositionKind::Adapt { original, prelude }) = resources.compositions.get(id).cloned() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Internal, "missing adapt metadata"));
    };
    let param_symbols: Vec<Symbol> = resources.actions.get(original).params.iter().map(|p| p.symbol).collect();
    let ctx = resources.contexts.create(resources.heap, param_symbols, args);
    let specifier = resources.specifiers.push_varlist_tail(ctx, None);

    let prelude_cells: std::rc::Rc<[Cell]> = prelude.into();
    let prelude_level = Level::new_root(crate::feed::Feed::from_block(prelude_cells, Some(specifier)));
    let mut tracer = crate::tracer::NoopTracer;
    if let Err(thrown) = crate::level::run(prelude_level, resources, &mut tracer) {
        return Bounce::Threw(thrown);
    }

    // Skip the varlist's slot 0 (the self-archetype); only the param slots matter.
    let final_args = resources.heap.get(ctx.varlist()).cells()[1..].to_vec();
    call_through(resources, original, final_args)
}

fn chain_dispatcher(level: &mut Level, resources: &mut Resources<'_>) -> Bounce {
    let id = CompositionTable::current_action(level);
    let mut current_args = CompositionTable::args_of(level).to_vec();
    let Some(CompositionKind::Chain { steps }) = resources.compositions.get(id).cloned() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Internal, "missing chain metadata"));
    };
    let mut result = Cell::void();
    for step in steps {
        match call_through(resources, step, current_args) {
            Bounce::Completed(v) => {
                current_args = vec![v.clone()];
                result = v;
            }
            other => return other,
        }
    }
    Bounce::Completed(result)
}

/// Builds a frame for `original` from the gathered args, registers it as
/// pending, and hands it to `wrapper` as its sole argument. `wrapper` decides
/// whether and when to actually run `original` by calling [`invoke_frame`]
/// with that frame — letting it run code both before and after, or replace
/// the result outright by never invoking the frame at all.
fn enclose_dispatcher(level: &mut Level, resources: &mut Resources<'_>) -> Bounce {
    let id = CompositionTable::current_action(level);
    let args = CompositionTable::args_of(level).to_vec();
    let Some(CompositionKind::Enclose { original, wrapper }) = resources.compositions.get(id).cloned() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Internal, "missing enclose metadata"));
    };
    let param_symbols: Vec<Symbol> = resources.actions.get(original).params.iter().map(|p| p.symbol).collect();
    let ctx = resources.contexts.create(resources.heap, param_symbols, args);
    resources.compositions.pending_frames.insert(ctx, original);
    let frame_cell = Cell::new(crate::cell::CellValue::Frame(ctx));
    call_through(resources, wrapper, vec![frame_cell])
}

/// Invokes the action behind an `ENCLOSE` frame, reading whatever arguments
/// currently sit in the frame's varlist (a wrapper may have mutated them
/// first, same as `ADAPT`'s prelude). Consumes the pending-frame entry, so
/// invoking the same frame twice is a script error rather than a silent
/// double-dispatch.
pub fn invoke_frame(resources: &mut Resources<'_>, frame: crate::context::ContextId) -> Bounce {
    let Some(original) = resources.compositions.pending_frames.remove(&frame) else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "frame is not a pending enclose invocation"));
    };
    let args = resources.heap.get(frame.varlist()).cells()[1..].to_vec();
    call_through(resources, original, args)
}

fn typechecker_dispatcher(level: &mut Level, resources: &mut Resources<'_>) -> Bounce {
    let id = CompositionTable::current_action(level);
    let args = CompositionTable::args_of(level).to_vec();
    let Some(CompositionKind::TypeChecker { test }) = resources.compositions.get(id).cloned() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Internal, "missing typechecker metadata"));
    };
    let Some(subject) = args.first() else {
        return Bounce::Raised(RuntimeError::new(ExcCategory::Script, "typechecker requires one argument"));
    };
    match crate::typecheck::run_test(&test, subject, resources) {
        Ok(passed) => Bounce::Completed(Cell::new(crate::cell::CellValue::Logic(passed))),
        Err(e) => Bounce::Raised(e),
    }
}

/// Calls `target` with `args`, collapsing its result into the calling
/// dispatcher's own `Bounce` directly (one dispatch deep — see
/// [`CompositionTable::call`]'s caveat about nested suspension).
fn call_through(resources: &mut Resources<'_>, target: ActionId, args: Vec<Cell>) -> Bounce {
    let entry_dispatcher = {
        let actions: &ActionTable = resources.actions;
        actions.get(target).dispatcher
    };
    let mut nested = Level::new_eval(crate::feed::Feed::from_variadic(std::iter::empty()));
    nested.mode = LevelMode::Dispatch { action: target, args };
    entry_dispatcher(&mut nested, resources)
}
