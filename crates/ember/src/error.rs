//! Error taxonomy and propagation (section 7).
//!
//! Three propagation mechanisms, not to be confused with each other:
//!
//! - **Raised errors** ([`RuntimeError`] wrapped in [`Bounce::Raised`](crate::level::Bounce::Raised))
//!   are ordinary values that a step may produce; they decay into a throw unless
//!   the call site opts in to catching them (`try`-style constructs).
//! - **Throws** ([`Throw`]) unwind the level stack; they carry a label cell and a
//!   value cell, matched by `catch/name`.
//! - **Panics** are `debug_assert!`/`panic!` for invariant violations only — never
//!   used for ordinary control flow, and never caught by this crate.

use std::fmt;

use crate::cell::Cell;

/// The five error categories of section 7, each owning a disjoint range of
/// numeric ids so a host can dispatch on `(category, id)` without string
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ExcCategory {
    /// Invariant violations, out-of-memory, stack overflow.
    Internal,
    /// Scanner/loader failures.
    Syntax,
    /// Type mismatches, missing args, bad refinements, unbound words.
    Script,
    /// Overflow, divide by zero, out-of-range.
    Math,
    /// Protected/locked/frozen series, I/O and port errors.
    Access,
}

/// A surfaced runtime error: category, numeric id, message template, and
/// positional argument cells for interpolation.
///
/// `RuntimeError` never carries a raw, already-formatted `String` in place of
/// a template + args: this keeps the category/id introspectable without
/// re-parsing a rendered message.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub category: ExcCategory,
    pub id: u32,
    pub template: String,
    pub args: Vec<Cell>,
}

impl RuntimeError {
    /// Creates a `RuntimeError` with no interpolation args and id 0 (generic).
    #[must_use]
    pub fn new(category: ExcCategory, template: impl Into<String>) -> Self {
        Self {
            category,
            id: 0,
            template: template.into(),
            args: Vec::new(),
        }
    }

    /// Creates a `RuntimeError` with a specific numeric id and interpolation args.
    #[must_use]
    pub fn with_args(category: ExcCategory, id: u32, template: impl Into<String>, args: Vec<Cell>) -> Self {
        Self {
            category,
            id,
            template: template.into(),
            args,
        }
    }

    /// An unbound-word error, the single most common Script error (section 4.1).
    #[must_use]
    pub fn unbound(symbol: &str) -> Self {
        Self::new(ExcCategory::Script, format!("{symbol} is unbound"))
    }

    /// A type-check failure for a parameter (section 4.6).
    #[must_use]
    pub fn type_mismatch(param: &str, expected: &str) -> Self {
        Self::new(
            ExcCategory::Script,
            format!("{param} does not satisfy type test: {expected}"),
        )
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "** {} Error: {}", self.category, self.template)
    }
}

impl std::error::Error for RuntimeError {}

/// A throw in flight: unwinds the level stack until a `catch/name` with a
/// matching label claims it, or it escapes the outermost level.
#[derive(Debug, Clone)]
pub struct Throw {
    /// `None` means an unnamed throw, caught by a bare `catch` (no `/name`).
    pub label: Option<Cell>,
    pub value: Cell,
}

impl Throw {
    #[must_use]
    pub fn new(value: Cell) -> Self {
        Self { label: None, value }
    }

    #[must_use]
    pub fn named(label: Cell, value: Cell) -> Self {
        Self {
            label: Some(label),
            value,
        }
    }

    /// Whether a `catch/name` with the given label (or a bare `catch` if `None`)
    /// would claim this throw.
    #[must_use]
    pub fn matches(&self, catch_label: Option<&Cell>) -> bool {
        match (catch_label, &self.label) {
            (None, None) => true,
            (Some(want), Some(have)) => want.same_identity(have),
            _ => false,
        }
    }
}

pub type RunResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::intern::Interner;

    #[test]
    fn unnamed_throw_matches_bare_catch_only() {
        let t = Throw::new(Cell::integer(1));
        assert!(t.matches(None));
        assert!(!t.matches(Some(&Cell::integer(1))));
    }

    #[test]
    fn named_throw_matches_same_symbol() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let t = Throw::named(Cell::word(x, None), Cell::integer(1));
        assert!(t.matches(Some(&Cell::word(x, None))));
    }
}
