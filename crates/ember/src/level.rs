//! The level stack and trampoline (section 4.4).
//!
//! Ren-C-style evaluators recurse through native call stack frames one level
//! per nested evaluation; this one instead pushes a [`Level`] onto an
//! explicit `Vec` and returns control to a flat loop, so arbitrarily deep
//! expressions never risk blowing the host's C stack and a continuation can
//! be suspended and resumed from the embedding API (section 9's design
//! note). Each step an executor runs produces a [`Bounce`] telling the
//! trampoline what to do next; nothing here ever calls a dispatcher that
//! calls back into `step` directly.

use std::rc::Rc;

use crate::action::{ActionId, ActionTable, Param, ParamClass, ParamFlags};
use crate::binder::{self, BindMode};
use crate::cell::{Binding, Cell, CellValue, Heart, QuoteByte};
use crate::context::ContextTable;
use crate::error::{ExcCategory, RuntimeError, Throw};
use crate::feed::Feed;
use crate::intern::Symbol;
use crate::series::Heap;
use crate::specifier::SpecifierId;
use crate::tracer::VmTracer;
use crate::typecheck;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LevelFlags: u8 {
        /// The bottom level of the stack; the trampoline stops when this one completes.
        const ROOT = 1 << 0;
        /// This level's output must not be treated as stale even if empty.
        const FORCE_NON_STALE = 1 << 2;
    }
}

/// Coarse progress marker for a level, mostly useful for tracing and
/// assertions that push/drop stays balanced (section 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Evaluating,
    Fulfilling,
    Dispatching,
    Done,
}

/// What this level is doing, beyond plain one-step-at-a-time evaluation.
#[derive(Debug, Clone)]
pub enum LevelMode {
    /// Pull the next value from the feed and evaluate it.
    Eval,
    /// Gathering arguments for `action` before invoking its dispatcher.
    Fulfill {
        action: ActionId,
        args: Vec<Cell>,
        param_index: usize,
    },
    /// All arguments gathered; about to call the dispatcher.
    Dispatch { action: ActionId, args: Vec<Cell> },
}

pub struct Level {
    pub feed: Feed,
    pub output: Cell,
    pub flags: LevelFlags,
    pub state: State,
    pub mode: LevelMode,
    pub label: Option<Symbol>,
    /// The frame context this level is fulfilling/dispatching into, once one exists.
    pub frame: Option<crate::context::ContextId>,
}

impl Level {
    #[must_use]
    pub fn new_eval(feed: Feed) -> Self {
        Self {
            feed,
            output: Cell::void(),
            flags: LevelFlags::empty(),
            state: State::Init,
            mode: LevelMode::Eval,
            label: None,
            frame: None,
        }
    }

    #[must_use]
    pub fn new_root(feed: Feed) -> Self {
        let mut level = Self::new_eval(feed);
        level.flags.insert(LevelFlags::ROOT);
        level
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.flags.contains(LevelFlags::ROOT)
    }
}

/// What a single trampoline step produced (section 4.4).
pub enum Bounce {
    /// This level is finished; `Cell` is its output.
    Completed(Cell),
    /// Push a new level and resume the current one once it completes.
    Continuation(Box<Level>),
    /// Replace the current level with a new one (a tail call — the current
    /// level never resumes).
    Delegate(Box<Level>),
    /// Unwind the level stack looking for a matching `catch`.
    Threw(Throw),
    /// Produce an error value without unwinding (decays to a throw unless
    /// the caller opts into catching it, section 7).
    Raised(RuntimeError),
}

impl std::fmt::Debug for Bounce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(c) => write!(f, "Completed({c:?})"),
            Self::Continuation(_) => write!(f, "Continuation(..)"),
            Self::Delegate(_) => write!(f, "Delegate(..)"),
            Self::Threw(t) => write!(f, "Threw({t:?})"),
            Self::Raised(e) => write!(f, "Raised({e:?})"),
        }
    }
}

/// Shared, borrowed access to the resources every executor needs. Bundled
/// into one struct so executor functions don't each grow a five-parameter
/// signature.
pub struct Resources<'a> {
    pub heap: &'a mut Heap,
    pub contexts: &'a mut ContextTable,
    pub actions: &'a mut ActionTable,
    pub specifiers: &'a mut crate::specifier::SpecifierTable,
    pub interner: &'a mut crate::intern::Interner,
    pub compositions: &'a mut crate::compose::CompositionTable,
}

/// Runs the level stack to completion, starting from `root`. This is the
/// trampoline proper: a flat loop over `step`, with no native recursion
/// regardless of how deeply the evaluated program nests.
pub fn run(root: Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Result<Cell, Throw> {
    let mut stack = vec![root];
    tracer.on_level_push(stack.len(), None);

    loop {
        let bounce = {
            let top = stack.last_mut().expect("level stack must never be empty mid-run");
            step(top, resources, tracer)
        };
        tracer.on_bounce(&bounce);

        match bounce {
            Bounce::Completed(value) => {
                let finished = stack.pop().expect("completed a level but stack was empty");
                tracer.on_level_drop(stack.len());
                if finished.is_root() || stack.is_empty() {
                    return Ok(value);
                }
                let parent = stack.last_mut().expect("non-root level must have a parent");
                parent.output = value;
            }
            Bounce::Continuation(next) => {
                tracer.on_level_push(stack.len() + 1, next.label.map(|_| "<action>"));
                stack.push(*next);
            }
            Bounce::Delegate(next) => {
                *stack.last_mut().expect("delegate with empty stack") = *next;
            }
            Bounce::Threw(throw) => {
                tracer.on_throw(throw.label.as_ref().map(|_| "<named>"));
                return Err(throw);
            }
            Bounce::Raised(err) => {
                // Raised errors with no catching construct above decay into
                // an unnamed throw carrying the error as a value (section 7).
                return Err(Throw::new(Cell::new(CellValue::ErrorValue(Box::new(err)))));
            }
        }
    }
}

/// Executes one step of `level`, returning what happened. This is the only
/// function that inspects a level's `mode`/`state`; dispatchers invoked
/// during `Dispatch` get their own fresh `Level` and never see this one's
/// internals directly.
fn step(level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Bounce {
    match &level.mode {
        LevelMode::Eval => step_eval(level, resources, tracer),
        LevelMode::Fulfill { .. } => {
            unreachable!("LevelMode::Fulfill is never constructed; fulfillment runs synchronously through fulfill_and_dispatch")
        }
        LevelMode::Dispatch { .. } => step_dispatch(level, resources),
    }
}

/// Evaluates `level`'s whole feed to completion, one full expression
/// (including any enfix chaining) at a time (section 4.4). Argument
/// gathering and dispatch happen by direct, synchronous recursion through
/// [`eval_expr`]/[`fulfill_and_dispatch`] rather than by pushing further
/// trampoline levels: a `Feed::Array` clone can't hand an advanced read
/// position back to its parent, so nested expression evaluation recurses on
/// the native call stack instead, the same way [`crate::compose::call_through`]
/// and [`crate::typecheck`]'s action-predicate branch already do. This bounds
/// recursion depth by expression nesting, not block length.
fn step_eval(level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Bounce {
    let mut last = Cell::void();
    loop {
        if level.feed.at_end() {
            return Bounce::Completed(last);
        }
        match eval_expr(level, resources, tracer) {
            Ok(value) => last = value,
            Err(bounce) => return bounce,
        }
    }
}

/// Evaluates one full expression: a single step ([`eval_step`]), then folds
/// in any number of trailing enfix operators, each rolling the prior result
/// into its first argument (section 4.4's "infix defers its left operand").
fn eval_expr(level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Result<Cell, Bounce> {
    let mut value = eval_step(level, resources, tracer)?;
    while let Some(action) = enfix_candidate(level, resources, tracer) {
        level.feed.next();
        value = fulfill_and_dispatch(level, resources, tracer, action, Some(value))?;
    }
    Ok(value)
}

/// Pulls one cell from the feed and evaluates it: a bare literal stands for
/// itself, a word resolves and (if it names an action) gathers arguments and
/// dispatches, a group recurses, a path dispatches (section 4.3).
fn eval_step(level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Result<Cell, Bounce> {
    let specifier = level.feed.specifier();
    let Some(cell) = level.feed.next() else {
        return Ok(Cell::void());
    };

    match &cell.value {
        CellValue::Word(symbol, binding) => eval_word(*symbol, binding, specifier, level, resources, tracer),
        CellValue::Group(_) => eval_group_sync(cell, specifier, resources, tracer),
        CellValue::Path(_) => match crate::path::dispatch(&cell, specifier, None, resources, tracer) {
            Bounce::Completed(v) => Ok(v),
            other => Err(other),
        },
        _ => Ok(cell),
    }
}

/// Peeks (without consuming) whether the feed's next cell is a word bound to
/// an enfix action, the trigger for folding it into the expression just
/// evaluated rather than starting a fresh one (section 4.4).
fn enfix_candidate(level: &Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Option<ActionId> {
    let specifier = level.feed.specifier();
    let cell = level.feed.peek()?;
    let CellValue::Word(symbol, binding) = &cell.value else {
        return None;
    };
    let word = Cell::word(*symbol, Some(*binding));
    let resolved = binder::resolve(resources.heap, resources.contexts, resources.specifiers, specifier, &word, None, BindMode::Read, tracer).ok()?;
    let value = binder::get(resources.heap, resources.contexts, resources.specifiers, resolved);
    match value.value {
        CellValue::Action(action) if resources.actions.get(action).enfix => Some(action),
        _ => None,
    }
}

fn eval_word(symbol: Symbol, binding: &Binding, specifier: Option<SpecifierId>, level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Result<Cell, Bounce> {
    let word = Cell::word(symbol, Some(*binding));
    let resolved = binder::resolve(resources.heap, resources.contexts, resources.specifiers, specifier, &word, None, BindMode::Read, tracer).map_err(Bounce::Raised)?;
    let value = binder::get(resources.heap, resources.contexts, resources.specifiers, resolved);
    match &value.value {
        CellValue::Action(action) => fulfill_and_dispatch(level, resources, tracer, *action, None),
        _ => Ok(value),
    }
}

/// Gathers `action`'s arguments one parameter at a time off `level`'s feed
/// and dispatches (section 4.4 steps 2/3/5). `enfix_left`, when present, is
/// rolled in as the first non-refinement parameter's value instead of being
/// gathered from the feed (section 4.4's enfix rule).
fn fulfill_and_dispatch(level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer, action: ActionId, enfix_left: Option<Cell>) -> Result<Cell, Bounce> {
    let params = resources.actions.get(action).params.clone();
    let mut enfix_left = enfix_left;
    let mut args = Vec::with_capacity(params.len());
    for param in &params {
        // Refinement call-syntax (`foo/bar:baz`) belongs to path dispatch
        // (`path::dispatch`'s specialized-action handoff), not bare word
        // calls: a refinement gathered here is always treated as absent.
        if param.class == ParamClass::Refinement {
            args.push(Cell::null());
            continue;
        }
        let value = match enfix_left.take() {
            Some(left) => left,
            None => gather_one(level, resources, tracer, param)?,
        };
        if let Some(test_series) = param.type_test {
            let test = resources.heap.get(test_series).cells().to_vec();
            let passed = typecheck::run_test(&test, &value, resources).map_err(Bounce::Raised)?;
            if !passed {
                return Err(Bounce::Raised(RuntimeError::type_mismatch(resources.interner.spelling(param.symbol), "parameter type test")));
            }
        }
        args.push(value);
    }

    let dispatcher = resources.actions.get(action).dispatcher;
    let mut dispatch_level = Level::new_eval(Feed::from_variadic(std::iter::empty()));
    dispatch_level.mode = LevelMode::Dispatch { action, args };
    match dispatcher(&mut dispatch_level, resources) {
        Bounce::Completed(result) => check_return(action, result, resources),
        Bounce::Threw(t) => Err(Bounce::Threw(t)),
        Bounce::Raised(e) => Err(Bounce::Raised(e)),
        other @ (Bounce::Continuation(_) | Bounce::Delegate(_)) => Err(other),
    }
}

/// Gathers a single parameter's value per its [`ParamClass`] (section 3.5).
fn gather_one(level: &mut Level, resources: &mut Resources<'_>, tracer: &mut impl VmTracer, param: &Param) -> Result<Cell, Bounce> {
    match param.class {
        ParamClass::Refinement => unreachable!("refinement params are filled before gather_one runs"),
        ParamClass::HardQuoted => take_literal(level, param),
        ParamClass::SoftQuoted => {
            if matches!(level.feed.peek().map(Cell::heart), Some(Heart::Group)) {
                let cell = level.feed.next().expect("peek confirmed a cell is present");
                let specifier = level.feed.specifier();
                eval_group_sync(cell, specifier, resources, tracer)
            } else {
                take_literal(level, param)
            }
        }
        ParamClass::Normal => {
            if level.feed.at_end() {
                return end_of_input(param);
            }
            eval_expr(level, resources, tracer)
        }
        ParamClass::Meta => {
            if level.feed.at_end() {
                return end_of_input(param);
            }
            let raw = eval_expr(level, resources, tracer)?;
            Ok(typecheck::meta_unwrap(raw))
        }
    }
}

fn take_literal(level: &mut Level, param: &Param) -> Result<Cell, Bounce> {
    match level.feed.next() {
        Some(cell) => Ok(cell),
        None => end_of_input(param),
    }
}

/// The feed ran out while gathering `param`: legal only for a parameter that
/// tolerates it (section 3.5's `SKIPPABLE`/`ENDABLE` flags), in which case it
/// takes the void antiform.
fn end_of_input(param: &Param) -> Result<Cell, Bounce> {
    if param.flags.intersects(ParamFlags::ENDABLE | ParamFlags::SKIPPABLE) {
        Ok(Cell::void())
    } else {
        Err(Bounce::Raised(RuntimeError::new(ExcCategory::Script, "input ended before a required parameter was supplied")))
    }
}

/// Checks a just-dispatched action's result against its `RETURN` type test,
/// if it has one (section 4.6).
fn check_return(action: ActionId, result: Cell, resources: &mut Resources<'_>) -> Result<Cell, Bounce> {
    let entry = resources.actions.get(action);
    let Some(test_series) = entry.return_test else {
        return Ok(result);
    };
    let vanishable = entry.return_vanishable;
    if result.value == CellValue::Void && result.quote == QuoteByte::Antiform {
        return if vanishable {
            Ok(result)
        } else {
            Err(Bounce::Raised(RuntimeError::new(ExcCategory::Script, "action result vanished but its return is not vanishable")))
        };
    }
    let test = resources.heap.get(test_series).cells().to_vec();
    match typecheck::run_test(&test, &result, resources) {
        Ok(true) => Ok(result),
        Ok(false) => Err(Bounce::Raised(RuntimeError::type_mismatch("return", "RETURN type test"))),
        Err(e) => Err(Bounce::Raised(e)),
    }
}

fn step_dispatch(level: &mut Level, resources: &mut Resources<'_>) -> Bounce {
    let LevelMode::Dispatch { action, args } = &level.mode else {
        unreachable!("step_dispatch called on a non-Dispatch level")
    };
    let entry = resources.actions.get(*action);
    let dispatcher = entry.dispatcher;
    level.mode = LevelMode::Dispatch {
        action: *action,
        args: args.clone(),
    };
    dispatcher(level, resources)
}

/// Evaluates a `GROUP!`'s contents to a single value (section 4.2), recursing
/// through the trampoline proper (see [`step_eval`]'s doc comment for why
/// this recurses natively rather than suspending via `Bounce::Continuation`).
fn eval_group_sync(cell: Cell, specifier: Option<SpecifierId>, resources: &mut Resources<'_>, tracer: &mut impl VmTracer) -> Result<Cell, Bounce> {
    let CellValue::Group(series_id) = cell.value else {
        unreachable!("eval_group_sync called on a non-group cell")
    };
    let cells: Rc<[Cell]> = resources.heap.get(series_id).cells().to_vec().into();
    let inner = Level::new_eval(Feed::from_block(cells, specifier));
    run(inner, resources, tracer).map_err(Bounce::Threw)
}
