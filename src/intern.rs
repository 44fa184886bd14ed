//! Symbol interning.
//!
//! Every distinct atom name is stored once, as a shared [`Name`], and gets a
//! small integer [`Symbol`]. Identifiers are handed out in first-seen order
//! starting at 1, so `0` never names anything and callers are free to use it
//! as "not found". Matching is byte-exact and case-sensitive.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::rc::Rc;

use crate::buffer::{memory_exhausted, reserve_or_die};

/// Canonical storage for an interned name.
///
/// Two atoms with the same text hold clones of the same `Rc`, so
/// `Rc::ptr_eq` on their names is as good as comparing identifiers.
pub type Name = Rc<[u8]>;

/// Interned identifier of an atom name.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Symbol(NonZeroU32);

impl Symbol {
    /// Rebuild a symbol from its raw value. `0` is never a valid symbol.
    pub fn from_raw(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn as_u32(self) -> u32 {
        self.0.get()
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Table mapping byte strings to their canonical storage and identifier.
#[derive(Clone, Debug, Default)]
pub struct Interner {
    to_symbol: HashMap<Name, Symbol>,
    names: Vec<Name>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, returning its canonical storage and identifier.
    pub fn intern(&mut self, text: &[u8]) -> (Name, Symbol) {
        if let Some((name, &symbol)) = self.to_symbol.get_key_value(text) {
            return (Rc::clone(name), symbol);
        }

        let Some(symbol) = u32::try_from(self.names.len() + 1)
            .ok()
            .and_then(Symbol::from_raw)
        else {
            memory_exhausted("symbol identifiers", text.len());
        };

        reserve_or_die(&mut self.names, 1, "symbol table");
        if self.to_symbol.try_reserve(1).is_err() {
            memory_exhausted("symbol table", text.len());
        }

        let name: Name = Rc::from(text);
        self.names.push(Rc::clone(&name));
        self.to_symbol.insert(Rc::clone(&name), symbol);
        log::trace!("interned {:?} as {symbol}", String::from_utf8_lossy(text));
        (name, symbol)
    }

    /// Identifier of `text` if it has been interned, without inserting it.
    pub fn lookup(&self, text: &[u8]) -> Option<Symbol> {
        self.to_symbol.get(text).copied()
    }

    /// Canonical storage for a symbol issued by this table.
    pub fn resolve(&self, symbol: Symbol) -> Option<&Name> {
        self.names.get(symbol.index())
    }

    /// Number of distinct names interned.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A fixed set of keywords interned up front.
///
/// Lets a caller turn an atom's identifier back into a position in its own
/// keyword list, e.g. to dispatch on action names in a configuration file.
/// A name listed more than once maps to its last position.
#[derive(Clone, Debug)]
pub struct Keywords {
    symbols: Vec<Symbol>,
    positions: HashMap<Symbol, usize>,
}

impl Keywords {
    /// Intern every name in `names` through `intern`.
    pub fn new<'a, I, F>(names: I, mut intern: F) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&[u8]) -> Symbol,
    {
        let symbols: Vec<Symbol> = names.into_iter().map(|n| intern(n.as_bytes())).collect();
        let mut positions = HashMap::with_capacity(symbols.len());
        for (i, &symbol) in symbols.iter().enumerate() {
            positions.insert(symbol, i);
        }
        Self { symbols, positions }
    }

    /// Position of the keyword with identifier `symbol`.
    pub fn index_of(&self, symbol: Symbol) -> Option<usize> {
        self.positions.get(&symbol).copied()
    }

    pub fn symbol(&self, index: usize) -> Option<Symbol> {
        self.symbols.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
