//! Type-checking protocol (section 4.6): interpreting a parameter's type-test
//! block against a candidate value.
//!
//! A test block is a small ANY-of-ALL language: a bare word or tag names a
//! single predicate (`integer?`, `<number>`); a nested `BLOCK!` is an ANY
//! group (any one alternative suffices); a nested `GROUP!` is an ALL group
//! (every alternative must hold); an action cell is called as a one-argument
//! predicate and must return a logic value. A meta-parameter (section 3.5)
//! is unwrapped to its quasiform before testing and rewrapped to its
//! antiform after, via [`meta_unwrap`]/[`meta_rewrap`] — this is what lets a
//! type test written for plain values also accept `^meta`-class arguments
//! without every test needing to know about antiforms.

use crate::cell::{Cell, CellValue, Heart};
use crate::error::{ExcCategory, RuntimeError};
use crate::level::Resources;

/// Unwraps a meta-parameter's antiform into its stable quasiform so type
/// tests can inspect it like any other value (section 4.6).
#[must_use]
pub fn meta_unwrap(cell: Cell) -> Cell {
    if cell.quote == crate::cell::QuoteByte::Antiform {
        cell.to_quasi()
    } else {
        cell
    }
}

/// Reverses [`meta_unwrap`] after a dispatcher has produced its result.
#[must_use]
pub fn meta_rewrap(cell: Cell) -> Cell {
    if cell.quote == crate::cell::QuoteByte::Quasi {
        cell.to_antiform()
    } else {
        cell
    }
}

fn predicate_name_matches(name: &str, subject: &Cell) -> bool {
    let bare = name.trim_end_matches('?').trim_start_matches('<').trim_end_matches('>');
    if bare.eq_ignore_ascii_case("any-value") {
        return true;
    }
    if name.starts_with('~') && name.ends_with('~') {
        let antiform_name = name.trim_matches('~');
        return subject.quote == crate::cell::QuoteByte::Antiform && subject.heart().to_string() == antiform_name;
    }
    subject.heart().to_string().eq_ignore_ascii_case(bare)
}

/// Evaluates a single test-block element against `subject`.
fn matches_one(cell: &Cell, subject: &Cell, resources: &mut Resources<'_>) -> Result<bool, RuntimeError> {
    match &cell.value {
        CellValue::Word(symbol, _) => Ok(predicate_name_matches(resources.interner.spelling(*symbol), subject)),
        CellValue::Tag(name) => Ok(predicate_name_matches(name, subject)),
        CellValue::Block(series_id) => {
            let inner = resources.heap.get(*series_id).cells().to_vec();
            for c in &inner {
                if matches_one(c, subject, resources)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        CellValue::Group(series_id) => {
            let inner = resources.heap.get(*series_id).cells().to_vec();
            for c in &inner {
                if !matches_one(c, subject, resources)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        CellValue::Action(action) => {
            let action = *action;
            let mut level = crate::level::Level::new_eval(crate::feed::Feed::from_variadic(std::iter::empty()));
            level.mode = crate::level::LevelMode::Dispatch {
                action,
                args: vec![subject.clone()],
            };
            let dispatcher = resources.actions.get(action).dispatcher;
            match dispatcher(&mut level, resources) {
                crate::level::Bounce::Completed(Cell {
                    value: CellValue::Logic(b), ..
                }) => Ok(b),
                crate::level::Bounce::Completed(_) => Err(RuntimeError::new(ExcCategory::Script, "action-predicate must return a logic value")),
                crate::level::Bounce::Raised(e) => Err(e),
                _ => Err(RuntimeError::new(ExcCategory::Internal, "action-predicate suspended mid-typecheck")),
            }
        }
        _ => Ok(false),
    }
}

/// Attempts one coercion step when a direct match fails (section 4.6's
/// "coercion-then-retest-once"): a decimal truncates to test as an integer,
/// a quasiform/antiform pair test as each other's stable/unstable twin.
fn coerce_once(subject: &Cell) -> Option<Cell> {
    match &subject.value {
        CellValue::Decimal(d) => Some(Cell::integer(*d as i64)),
        _ if subject.quote == crate::cell::QuoteByte::Quasi => Some(subject.clone().to_antiform()),
        _ if subject.quote == crate::cell::QuoteByte::Antiform => Some(subject.clone().to_quasi()),
        _ => None,
    }
}

/// Runs a full test block (an implicit top-level ANY) against `subject`,
/// applying meta unwrap first and one coercion retry on a failed direct match.
/// An empty test block always passes (an unconstrained parameter).
pub fn run_test(test: &[Cell], subject: &Cell, resources: &mut Resources<'_>) -> Result<bool, RuntimeError> {
    if test.is_empty() {
        return Ok(true);
    }
    let unwrapped = meta_unwrap(subject.clone());
    for alt in test {
        if matches_one(alt, &unwrapped, resources)? {
            return Ok(true);
        }
    }
    if let Some(coerced) = coerce_once(&unwrapped) {
        for alt in test {
            if matches_one(alt, &coerced, resources)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[must_use]
pub fn heart_name(heart: Heart) -> String {
    heart.to_string()
}
