//! The embedding API (section 6.1): a safe Rust surface over the interpreter
//! that a host program builds, feeds code, and reads results from, without
//! touching the heap/binder/level internals directly.
//!
//! [`Interpreter`] owns every resource table; [`ApiValue`] is an opaque,
//! cloneable handle to a [`Cell`] safe to hand back to a host; [`EvalOutcome`]
//! replaces a raw `Result` because a completed evaluation, a thrown value,
//! and a raised-and-unhandled error are three genuinely different outcomes a
//! host needs to branch on (section 7). [`Runner`] is the convenience
//! wrapper a CLI or test harness reaches for, mirroring the call-then-pump
//! progress loop the teacher's own driver uses.

use std::rc::Rc;

use crate::action::ActionTable;
use crate::capability::{CapabilitySet, PermissionDenied};
use crate::cell::{Cell, CellValue};
use crate::compose::CompositionTable;
use crate::context::{ContextId, ContextTable};
use crate::error::{RuntimeError, Throw};
use crate::feed::Feed;
use crate::intern::{Interner, Symbol};
use crate::level::{Level, Resources};
use crate::port::{FsPortActor, PortActor, PortInfo, PortVerb};
use crate::resource::{NoLimitTracker, ResourceTracker};
use crate::series::Heap;
use crate::specifier::SpecifierTable;
use crate::tracer::{NoopTracer, VmTracer};

/// An opaque handle to a value, safe to pass back across the embedding
/// boundary. Two `ApiValue`s compare for value equality, not identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiValue(pub(crate) Cell);

impl ApiValue {
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self(Cell::integer(value))
    }

    #[must_use]
    pub fn unbox_integer(&self) -> Option<i64> {
        match &self.0.value {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.0.value, CellValue::Null)
    }

    /// Renders the value the way `MOLD`/`SPELL` would for diagnostics; this
    /// is not a full molder (no block/path recursion), just enough to report
    /// results in a CLI or test failure message.
    #[must_use]
    pub fn spell(&self, interner: &Interner) -> String {
        match &self.0.value {
            CellValue::Blank => "_".to_owned(),
            CellValue::Logic(b) => b.to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Decimal(d) => {
                let mut buf = ryu::Buffer::new();
                buf.format(*d).to_owned()
            }
            CellValue::TextString(s) | CellValue::Tag(s) => s.to_string(),
            CellValue::Word(sym, _) => interner.spelling(*sym).to_owned(),
            CellValue::Null => "null".to_owned(),
            CellValue::Void => "void".to_owned(),
            other => format!("{other:?}"),
        }
    }
}

/// The three distinguishable results of running code (section 7).
#[derive(Debug)]
pub enum EvalOutcome {
    Value(ApiValue),
    Thrown { label: Option<ApiValue>, value: ApiValue },
    Error(RuntimeError),
}

impl From<Result<Cell, Throw>> for EvalOutcome {
    fn from(result: Result<Cell, Throw>) -> Self {
        match result {
            Ok(cell) => match cell.value {
                CellValue::ErrorValue(err) => Self::Error(*err),
                _ => Self::Value(ApiValue(cell)),
            },
            Err(throw) => Self::Thrown {
                label: throw.label.map(ApiValue),
                value: ApiValue(throw.value),
            },
        }
    }
}

/// Owns the whole interpreter's resource tables. Parameterized by tracer and
/// resource tracker so an embedder pays for exactly the observability/limits
/// it asks for (section 1.1's ambient stack), defaulting to the zero-cost
/// [`NoopTracer`]/[`NoLimitTracker`] pair.
pub struct Interpreter<Tr: VmTracer = NoopTracer, Rt: ResourceTracker = NoLimitTracker> {
    heap: Heap,
    contexts: ContextTable,
    actions: ActionTable,
    specifiers: SpecifierTable,
    interner: Interner,
    compositions: CompositionTable,
    root: ContextId,
    tracer: Tr,
    resource_tracker: Rt,
    capabilities: CapabilitySet,
    ports: std::collections::HashMap<String, FsPortActor>,
}

impl Interpreter<NoopTracer, NoLimitTracker> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracer_and_limits(NoopTracer, NoLimitTracker::new())
    }
}

impl Default for Interpreter<NoopTracer, NoLimitTracker> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tr: VmTracer, Rt: ResourceTracker> Interpreter<Tr, Rt> {
    pub fn with_tracer_and_limits(tracer: Tr, resource_tracker: Rt) -> Self {
        let mut heap = Heap::new();
        let mut contexts = ContextTable::new();
        let root = contexts.create(&mut heap, Vec::new(), Vec::new());
        Self {
            heap,
            contexts,
            actions: ActionTable::new(),
            specifiers: SpecifierTable::new(),
            interner: Interner::new(),
            compositions: CompositionTable::new(),
            root,
            tracer,
            resource_tracker,
            capabilities: CapabilitySet::none(),
            ports: std::collections::HashMap::new(),
        }
    }

    /// Replaces the capability set governing which port verbs this
    /// interpreter may carry out (section 6.2/capability.rs's yield-boundary
    /// check). Defaults to [`CapabilitySet::none`] — no host interaction
    /// until an embedder opts in.
    pub fn set_capabilities(&mut self, capabilities: CapabilitySet) {
        self.capabilities = capabilities;
    }

    /// Opens a filesystem port at `path`, gated by `Capability::OpenScheme("file")`.
    pub fn open_file_port(&mut self, name: &str, path: &str) -> Result<(), PermissionDenied> {
        self.capabilities.check_open_scheme("file")?;
        self.ports.insert(name.to_owned(), FsPortActor::new(path));
        Ok(())
    }

    /// Dispatches one port verb against an already-opened port, gated by the
    /// matching `Capability::PortVerb` grant. This is the wiring [`crate::port`]
    /// defers to its caller rather than doing itself.
    pub fn call_port_verb(&mut self, name: &str, verb: PortVerb) -> Result<PortOutcome, RuntimeError> {
        self.capabilities
            .check_function_call(&verb.to_string())
            .map_err(|denied| RuntimeError::new(crate::error::ExcCategory::Access, denied.to_string()))?;
        let actor = self
            .ports
            .get_mut(name)
            .ok_or_else(|| RuntimeError::new(crate::error::ExcCategory::Access, format!("no open port named '{name}'")))?;
        match verb {
            PortVerb::Open => actor.open().map(|()| PortOutcome::None),
            PortVerb::Close => actor.close().map(|()| PortOutcome::None),
            PortVerb::Create => actor.create().map(|()| PortOutcome::None),
            PortVerb::Delete => actor.delete().map(|()| PortOutcome::None),
            PortVerb::Clear => actor.clear().map(|()| PortOutcome::None),
            PortVerb::Query => actor.query().map(PortOutcome::Info),
            PortVerb::Length => actor.length().map(PortOutcome::Length),
            PortVerb::HeadQ => Ok(PortOutcome::Bool(actor.is_head())),
            PortVerb::TailQ => Ok(PortOutcome::Bool(actor.is_tail())),
            PortVerb::Read => actor.read(None).map(PortOutcome::Bytes),
            _ => Err(RuntimeError::new(
                crate::error::ExcCategory::Internal,
                format!("port verb '{verb}' requires arguments; use the typed port API"),
            )),
        }
    }

    #[must_use]
    pub fn intern(&mut self, text: &str) -> Symbol {
        self.interner.intern(text)
    }

    #[must_use]
    pub fn root_context(&self) -> ContextId {
        self.root
    }

    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn define(&mut self, name: &str, value: ApiValue) {
        let symbol = self.interner.intern(name);
        if self.contexts.index_of(&self.heap, self.root, symbol).is_some() {
            self.contexts.set(&mut self.heap, self.root, symbol, value.0);
        } else {
            self.contexts.extend(&mut self.heap, self.root, symbol, value.0);
        }
    }

    pub fn register_action(&mut self, name: &str, params: Vec<crate::action::Param>, dispatcher: crate::action::DispatcherFn) {
        let label = self.interner.intern(name);
        let id = self.actions.create(&mut self.heap, params, dispatcher, Vec::new(), None, Some(label));
        self.define(name, ApiValue(Cell::new(CellValue::Action(id))));
    }

    fn resources(&mut self) -> Resources<'_> {
        Resources {
            heap: &mut self.heap,
            contexts: &mut self.contexts,
            actions: &mut self.actions,
            specifiers: &mut self.specifiers,
            interner: &mut self.interner,
            compositions: &mut self.compositions,
        }
    }

    /// Evaluates `cells` (already-bound to the root context) and returns the
    /// outcome.
    pub fn eval(&mut self, cells: Vec<Cell>) -> EvalOutcome {
        let root_ctx = self.root;
        let specifier = self.specifiers.push_varlist_tail(root_ctx, None);
        let rc: Rc<[Cell]> = cells.into();
        let level = Level::new_root(Feed::from_block(rc, Some(specifier)));
        let mut resources = self.resources();
        let outcome = crate::level::run(level, &mut resources, &mut self.tracer);
        outcome.into()
    }
}

/// The result of a no-argument port verb dispatched through [`Interpreter::call_port_verb`].
#[derive(Debug)]
pub enum PortOutcome {
    None,
    Bool(bool),
    Length(u64),
    Info(PortInfo),
    Bytes(Option<Vec<u8>>),
}

/// What a single step of [`Runner::pump`] reports.
#[derive(Debug)]
pub enum RunProgress {
    Complete(EvalOutcome),
}

/// A convenience driver over [`Interpreter`] for a CLI or test harness: feed
/// it source cells, call [`Runner::pump`], match on [`RunProgress`].
pub struct Runner<Tr: VmTracer = NoopTracer, Rt: ResourceTracker = NoLimitTracker> {
    interpreter: Interpreter<Tr, Rt>,
}

impl Runner<NoopTracer, NoLimitTracker> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
        }
    }
}

impl Default for Runner<NoopTracer, NoLimitTracker> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tr: VmTracer, Rt: ResourceTracker> Runner<Tr, Rt> {
    #[must_use]
    pub fn interpreter_mut(&mut self) -> &mut Interpreter<Tr, Rt> {
        &mut self.interpreter
    }

    pub fn pump(&mut self, cells: Vec<Cell>) -> RunProgress {
        RunProgress::Complete(self.interpreter.eval(cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluating_a_literal_returns_its_value() {
        let mut runner = Runner::new();
        match runner.pump(vec![Cell::integer(42)]) {
            RunProgress::Complete(EvalOutcome::Value(v)) => assert_eq!(v.unbox_integer(), Some(42)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn define_then_reference_round_trips() {
        let mut interp = Interpreter::new();
        interp.define("answer", ApiValue::integer(42));
        let sym = interp.intern("answer");
        match interp.eval(vec![Cell::word(sym, None)]) {
            EvalOutcome::Value(v) => assert_eq!(v.unbox_integer(), Some(42)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn port_verb_denied_without_capability() {
        let mut interp = Interpreter::new();
        let dir = std::env::temp_dir().join(format!("ember-embed-port-test-{}", std::process::id()));
        assert!(matches!(
            interp.open_file_port("out", dir.to_str().unwrap()),
            Err(crate::capability::PermissionDenied { .. })
        ));
    }

    #[test]
    fn port_verb_allowed_with_capability() {
        use crate::capability::{Capability, CapabilitySet};

        let mut interp = Interpreter::new();
        interp.set_capabilities(CapabilitySet::new(vec![
            Capability::OpenScheme("file".to_owned()),
            Capability::PortVerb("create".to_owned()),
            Capability::PortVerb("close".to_owned()),
        ]));
        let dir = std::env::temp_dir().join(format!("ember-embed-port-test-ok-{}", std::process::id()));
        interp.open_file_port("out", dir.to_str().unwrap()).unwrap();
        assert!(matches!(interp.call_port_verb("out", PortVerb::Create), Ok(PortOutcome::None)));
        assert!(matches!(interp.call_port_verb("out", PortVerb::Close), Ok(PortOutcome::None)));
        let _ = std::fs::remove_file(&dir);
    }
}
