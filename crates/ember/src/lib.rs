#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked at call sites")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional (series index arithmetic)")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors the host language's own integer semantics")]
#![expect(clippy::missing_panics_doc, reason = "panics are reserved for internal invariant violations")]
#![expect(clippy::module_name_repetitions, reason = "some types are clearer re-exported under their module's name")]

mod action;
mod binder;
pub mod boot;
pub mod capability;
mod cell;
pub mod config;
mod compose;
mod context;
pub mod embed;
mod error;
mod feed;
mod intern;
mod level;
mod path;
pub mod port;
pub mod resource;
mod series;
mod specifier;
pub mod tracer;
mod typecheck;

pub use crate::{
    action::{ActionEntry, ActionId, ActionTable, DispatcherFn, Param, ParamClass, ParamFlags},
    binder::{BindMode, Resolved, get as resolve_get, resolve, set as resolve_set},
    cell::{Binding, Cell, CellFlags, CellValue, Heart, QuoteByte},
    compose::{CompositionKind, CompositionTable, invoke_frame},
    config::{ConfigError, InterpreterConfig, TracerSelection},
    context::{ContextId, ContextTable},
    embed::{ApiValue, EvalOutcome, Interpreter, PortOutcome, RunProgress, Runner},
    error::{ExcCategory, RunResult, RuntimeError, Throw},
    feed::Feed,
    intern::{FixedSymbol, Interner, Symbol},
    level::{Bounce, Level, LevelFlags, LevelMode, Resources, State, run},
    path::{Signal as PathSignal, dispatch as dispatch_path},
    series::{Body, Flavor, Heap, HeapDiff, HeapStats, Series, SeriesFlags, SeriesId},
    specifier::{Specifier, SpecifierId, SpecifierTable},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    typecheck::run_test as run_type_test,
};
