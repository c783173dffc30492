//! Symbol interning (section 3.2).
//!
//! Two symbols compare equal iff their underlying ids are equal — ids are
//! assigned once per unique spelling and never reused, so equality is a single
//! integer comparison rather than a string compare. Some symbols are assigned
//! fixed ids at interner construction time so native dispatch code can switch
//! on them without a hash lookup.

use ahash::AHashMap;

/// Interned symbol id.
///
/// Uses `u32` to keep cells compact (this id is stored directly in a cell's
/// payload for word-heart cells) — 4 billion unique symbols is far beyond any
/// realistic program's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    /// Reconstructs a `Symbol` from a raw id. The caller is responsible for
    /// ensuring the id was produced by the same `Interner`.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Fixed symbol ids assigned at interner construction, mirroring the small set
/// of switch-dispatch names native code tests directly (e.g. the reserved
/// interrupt-throw label, refinement markers).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum FixedSymbol {
    #[strum(serialize = "")]
    Empty = 0,
    Halt = 1,
    Interrupt = 2,
    Self_ = 3,
    True = 4,
    False = 5,
    Opt = 6,
    Void = 7,
    End = 8,
}

const FIXED_SYMBOL_COUNT: u32 = 9;

/// Owns the canonical spelling of every symbol seen so far and maps spellings
/// to ids in both directions.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, Symbol>,
}

impl Interner {
    /// Creates an interner pre-populated with [`FixedSymbol`] entries at their
    /// fixed ids.
    #[must_use]
    pub fn new() -> Self {
        let mut interner = Self {
            strings: Vec::new(),
            lookup: AHashMap::new(),
        };
        for (id, spelling) in [
            (FixedSymbol::Empty, ""),
            (FixedSymbol::Halt, "halt"),
            (FixedSymbol::Interrupt, "interrupt"),
            (FixedSymbol::Self_, "self"),
            (FixedSymbol::True, "true"),
            (FixedSymbol::False, "false"),
            (FixedSymbol::Opt, "opt"),
            (FixedSymbol::Void, "void"),
            (FixedSymbol::End, "end"),
        ] {
            let sym = interner.intern(spelling);
            debug_assert_eq!(sym.raw(), id as u32);
        }
        debug_assert_eq!(interner.strings.len() as u32, FIXED_SYMBOL_COUNT);
        interner
    }

    /// Interns `text`, returning its `Symbol`. Repeated calls with the same
    /// spelling return the same id.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.lookup.get(text) {
            return sym;
        }
        let id = Symbol(u32::try_from(self.strings.len()).expect("symbol table overflow"));
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, id);
        id
    }

    /// Returns the spelling for a previously interned symbol.
    ///
    /// # Panics
    /// Panics if `symbol` was not produced by this interner (an invariant
    /// violation elsewhere, not a reachable user error).
    #[must_use]
    pub fn spelling(&self, symbol: Symbol) -> &str {
        &self.strings[symbol.0 as usize]
    }

    /// Returns the fixed symbol for the reserved interrupt-throw label.
    #[must_use]
    pub fn interrupt_symbol(&self) -> Symbol {
        Symbol(FixedSymbol::Interrupt as u32)
    }

    /// Number of unique symbols interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
