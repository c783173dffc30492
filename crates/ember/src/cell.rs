//! The tagged-cell value representation (section 3.1).
//!
//! A `Cell` fuses the spec's four conceptual slots (header/extra/payload.first/
//! payload.second) into an idiomatic Rust shape: [`Heart`] is the fieldless
//! "which concrete storage kind" tag used for dispatch and type-checking;
//! [`CellValue`] is the payload, fused with its discriminant so the two can
//! never disagree; [`QuoteByte`] and [`CellFlags`] are carried alongside;
//! `extra` holds the word-binding slot.
//!
//! Only [`QuoteByte::Plain`], [`QuoteByte::Quoted`], and [`QuoteByte::Quasi`]
//! may appear on a cell stored inside a [`crate::series::Series`] array.
//! [`QuoteByte::Antiform`] cells ("isotopes") may exist only in variables,
//! level slots, or output cells — [`Cell::assert_stable`] is the checkpoint
//! series mutation paths call before accepting a cell.

use crate::action::ActionId;
use crate::context::ContextId;
use crate::error::RuntimeError;
use crate::intern::Symbol;
use crate::series::SeriesId;

/// The concrete storage kind of a cell — the `HEART_BYTE` of section 3.1.
///
/// Kept as a separate fieldless enum (rather than only `CellValue`'s
/// discriminant) because type-checking (section 4.6) and path dispatch
/// (section 4.3) both need to switch on "which kind" without touching the
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Heart {
    Blank,
    Logic,
    Integer,
    Decimal,
    TextString,
    Tag,
    Word,
    SetWord,
    GetWord,
    Block,
    Group,
    Path,
    Action,
    Object,
    Frame,
    ErrorValue,
    Null,
    Void,
}

/// The four quoting states of section 3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteByte {
    /// An ordinary value.
    Plain,
    /// `~x~` — a stable quasi-value; legal in arrays.
    Quasi,
    /// `'x` (N >= 1 levels of quoting); legal in arrays.
    Quoted(u8),
    /// An unstable antiform ("isotope"); never legal in arrays.
    Antiform,
}

impl QuoteByte {
    /// Whether a cell with this quote byte may be stored as an array element
    /// (invariant 2 of section 3.1).
    #[must_use]
    pub const fn stable(self) -> bool {
        !matches!(self, Self::Antiform)
    }
}

bitflags::bitflags! {
    /// Cell flags (section 3.1): const/protected/mark bits/"stale"/"newline-before".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u8 {
        /// Value is immutable through this cell (but may be mutable through others).
        const CONST = 1 << 0;
        /// Series this cell points to is protected from mutation.
        const PROTECTED = 1 << 1;
        /// GC mark bit (black/white alternation), not meaningful off-heap.
        const GC_MARK = 1 << 2;
        /// "Did not produce a value this step" — used for invisibles/comments
        /// (section 3.1 invariant 3). Callers must clear or detect this.
        const STALE = 1 << 3;
        /// Molding hint: a newline preceded this cell in its source block.
        const NEWLINE_BEFORE = 1 << 4;
    }
}

/// The word's stored binding (section 4.1): where a bare word resolves to,
/// absent a more specific specifier-chain hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    /// A let-patch or use-patch node in some specifier chain.
    Patch(crate::specifier::SpecifierId),
    /// Bound into a context's varlist directly (module, object, or a frame
    /// reached by "derived binding" substitution).
    Context(ContextId),
    /// Relative binding into an action's paramlist-shaped frame: the
    /// specifier supplying the concrete frame must name a frame whose phase
    /// is base-of this action (section 4.1 step 2).
    Relative(ActionId, u16),
}

/// The cell payload, fused with the discriminant that determines its `Heart`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    TextString(Box<str>),
    Tag(Box<str>),
    /// symbol + stored binding (section 4.1); `SetWord`/`GetWord` reuse this shape.
    Word(Symbol, Binding),
    Block(SeriesId),
    Group(SeriesId),
    Path(SeriesId),
    Action(ActionId),
    Object(ContextId),
    Frame(ContextId),
    ErrorValue(Box<RuntimeError>),
    Null,
    Void,
}

impl CellValue {
    #[must_use]
    pub fn heart(&self) -> Heart {
        match self {
            Self::Blank => Heart::Blank,
            Self::Logic(_) => Heart::Logic,
            Self::Integer(_) => Heart::Integer,
            Self::Decimal(_) => Heart::Decimal,
            Self::TextString(_) => Heart::TextString,
            Self::Tag(_) => Heart::Tag,
            Self::Word(..) => Heart::Word,
            Self::Block(_) => Heart::Block,
            Self::Group(_) => Heart::Group,
            Self::Path(_) => Heart::Path,
            Self::Action(_) => Heart::Action,
            Self::Object(_) => Heart::Object,
            Self::Frame(_) => Heart::Frame,
            Self::ErrorValue(_) => Heart::ErrorValue,
            Self::Null => Heart::Null,
            Self::Void => Heart::Void,
        }
    }

    /// The series id managed by this value, if its heart carries one, so
    /// [`Cell::trace`] can report it to a GC root walk without a heart-byte
    /// match at every call site.
    #[must_use]
    pub fn series_id(&self) -> Option<SeriesId> {
        match self {
            Self::Block(id) | Self::Group(id) | Self::Path(id) => Some(*id),
            _ => None,
        }
    }
}

/// A fixed-size tagged value (section 3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub quote: QuoteByte,
    pub flags: CellFlags,
}

impl Cell {
    #[must_use]
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            quote: QuoteByte::Plain,
            flags: CellFlags::empty(),
        }
    }

    #[must_use]
    pub fn heart(&self) -> Heart {
        self.value.heart()
    }

    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::new(CellValue::Integer(value))
    }

    #[must_use]
    pub fn blank() -> Self {
        Self::new(CellValue::Blank)
    }

    #[must_use]
    pub fn null() -> Self {
        let mut c = Self::new(CellValue::Null);
        c.quote = QuoteByte::Antiform;
        c
    }

    #[must_use]
    pub fn void() -> Self {
        let mut c = Self::new(CellValue::Void);
        c.quote = QuoteByte::Antiform;
        c
    }

    #[must_use]
    pub fn word(symbol: Symbol, binding: Option<Binding>) -> Self {
        Self::new(CellValue::Word(symbol, binding.unwrap_or(Binding::Unbound)))
    }

    #[must_use]
    pub fn block(series: SeriesId) -> Self {
        Self::new(CellValue::Block(series))
    }

    /// Quotes this cell one level deeper (`'x` wraps `x`).
    #[must_use]
    pub fn quote_once(mut self) -> Self {
        self.quote = match self.quote {
            QuoteByte::Plain => QuoteByte::Quoted(1),
            QuoteByte::Quoted(n) => QuoteByte::Quoted(n + 1),
            QuoteByte::Quasi | QuoteByte::Antiform => QuoteByte::Quoted(1),
        };
        self
    }

    /// Converts this cell to its quasiform (`~x~`), the stable twin of an antiform.
    #[must_use]
    pub fn to_quasi(mut self) -> Self {
        self.quote = QuoteByte::Quasi;
        self
    }

    /// Converts a quasiform to its antiform, or leaves other quote states untouched.
    #[must_use]
    pub fn to_antiform(mut self) -> Self {
        if self.quote == QuoteByte::Quasi {
            self.quote = QuoteByte::Antiform;
        }
        self
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.flags.contains(CellFlags::STALE)
    }

    pub fn mark_stale(&mut self) {
        self.flags.insert(CellFlags::STALE);
    }

    pub fn clear_stale(&mut self) {
        self.flags.remove(CellFlags::STALE);
    }

    /// Debug-mode checkpoint: antiforms must never be accepted into array storage
    /// (invariant 2, section 3.1).
    pub fn assert_stable(&self) {
        debug_assert!(
            self.quote.stable(),
            "antiform cell stored into an array: {:?}",
            self.value
        );
    }

    /// Identity comparison used by throw/catch label matching (section 7) and
    /// the binder's referential-stability property (section 8): two word
    /// cells are the "same" label iff their symbols match, regardless of
    /// binding.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (CellValue::Word(a, _), CellValue::Word(b, _)) => a == b,
            _ => self.value == other.value,
        }
    }
}
