//! The parsed tree: an arena of tagged cells addressed by [`CellRef`] handles.
//!
//! A cell is the empty list, a pair, or an atom. The empty list is a
//! dedicated handle, [`CellRef::EMPTY`], that is never stored in the arena;
//! asking for its first or rest element gives the empty list again. Proper
//! lists are chains of pairs ending in the empty list. Trees are built only
//! by the reader and are acyclic by construction.
//!
//! Atoms carry their interned name and identifier, the line they were read
//! on, and an optional [`Payload`] slot a caller can attach after parsing.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::buffer::reserve_or_die;
use crate::intern::{Name, Symbol};

/// Handle to a cell inside a [`Tree`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CellRef(u32);

impl CellRef {
    /// The empty list.
    pub const EMPTY: CellRef = CellRef(0);

    pub fn is_empty_list(self) -> bool {
        self == Self::EMPTY
    }

    fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

/// Caller data attached to an atom.
pub enum Payload {
    /// Owned by the atom: dropped when the atom is dropped or the slot is
    /// reassigned.
    Owned(Box<dyn Any>),
    /// Owned by the caller: the atom only holds a handle, so the value's
    /// lifetime is independent of the tree's.
    Shared(Rc<dyn Any>),
}

impl Payload {
    pub fn is_owned(&self) -> bool {
        matches!(self, Payload::Owned(_))
    }

    pub fn as_any(&self) -> &dyn Any {
        match self {
            Payload::Owned(value) => value.as_ref(),
            Payload::Shared(value) => value.as_ref(),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Owned(_) => write!(f, "Owned(..)"),
            Payload::Shared(_) => write!(f, "Shared(..)"),
        }
    }
}

/// A leaf of the tree.
#[derive(Debug)]
pub struct Atom {
    name: Name,
    symbol: Symbol,
    line: usize,
    payload: Option<Payload>,
}

impl Atom {
    pub(crate) fn new(name: Name, symbol: Symbol, line: usize) -> Self {
        Atom {
            name,
            symbol,
            line,
            payload: None,
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// The atom's bytes.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The shared canonical storage of the name.
    pub fn interned_name(&self) -> &Name {
        &self.name
    }

    /// The name as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Line the atom was read from.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Borrow the payload as a concrete type.
    pub fn payload_ref<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.as_any().downcast_ref()
    }

    /// Whether the atom owns (and will drop) its payload.
    pub fn owns_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(Payload::is_owned)
    }

    /// Replace the payload, dropping the previous one first.
    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = None;
        self.payload = Some(payload);
    }

    /// Attach a value the atom owns.
    pub fn set_owned<T: Any>(&mut self, value: T) {
        self.set_payload(Payload::Owned(Box::new(value)));
    }

    /// Attach a value the caller keeps ownership of.
    pub fn set_shared(&mut self, value: Rc<dyn Any>) {
        self.set_payload(Payload::Shared(value));
    }

    /// Detach the payload and hand it back to the caller.
    pub fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }
}

/// A cell as stored in the arena.
#[derive(Debug)]
pub enum Cell {
    Empty,
    Pair { first: CellRef, rest: CellRef },
    Atom(Atom),
}

const EMPTY_CELL: &Cell = &Cell::Empty;

/// Arena holding every cell of one parsed tree, plus its root.
#[derive(Debug)]
pub struct Tree {
    cells: Vec<Cell>,
    root: CellRef,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// An arena whose root is the empty list.
    pub fn new() -> Self {
        Tree {
            cells: Vec::new(),
            root: CellRef::EMPTY,
        }
    }

    pub fn root(&self) -> CellRef {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: CellRef) {
        self.root = root;
    }

    /// Number of pairs and atoms allocated.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn alloc(&mut self, cell: Cell) -> CellRef {
        reserve_or_die(&mut self.cells, 1, "cell arena");
        self.cells.push(cell);
        match u32::try_from(self.cells.len()) {
            Ok(handle) => CellRef(handle),
            Err(_) => crate::buffer::memory_exhausted("cell handles", size_of::<Cell>()),
        }
    }

    /// Allocate an atom cell.
    pub fn atom_cell(&mut self, atom: Atom) -> CellRef {
        self.alloc(Cell::Atom(atom))
    }

    /// Allocate a pair.
    pub fn cons(&mut self, first: CellRef, rest: CellRef) -> CellRef {
        self.alloc(Cell::Pair { first, rest })
    }

    /// Point the rest slot of an existing pair elsewhere.
    pub(crate) fn set_rest(&mut self, pair: CellRef, new_rest: CellRef) {
        if let Some(Cell::Pair { rest, .. }) = pair.slot().and_then(|i| self.cells.get_mut(i)) {
            *rest = new_rest;
        }
    }

    /// Look up a cell. Handles from another tree give the empty list.
    pub fn get(&self, cell: CellRef) -> &Cell {
        cell.slot()
            .and_then(|i| self.cells.get(i))
            .unwrap_or(EMPTY_CELL)
    }

    pub fn atom(&self, cell: CellRef) -> Option<&Atom> {
        match self.get(cell) {
            Cell::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn atom_mut(&mut self, cell: CellRef) -> Option<&mut Atom> {
        match cell.slot().and_then(|i| self.cells.get_mut(i)) {
            Some(Cell::Atom(atom)) => Some(atom),
            _ => None,
        }
    }

    pub fn is_pair(&self, cell: CellRef) -> bool {
        matches!(self.get(cell), Cell::Pair { .. })
    }

    /// First element of a pair; the empty list for the empty list.
    pub fn first(&self, cell: CellRef) -> Option<CellRef> {
        match self.get(cell) {
            Cell::Empty => Some(CellRef::EMPTY),
            Cell::Pair { first, .. } => Some(*first),
            Cell::Atom(_) => None,
        }
    }

    /// Rest of a pair; the empty list for the empty list.
    pub fn rest(&self, cell: CellRef) -> Option<CellRef> {
        match self.get(cell) {
            Cell::Empty => Some(CellRef::EMPTY),
            Cell::Pair { rest, .. } => Some(*rest),
            Cell::Atom(_) => None,
        }
    }

    /// Iterate over the elements of a list.
    ///
    /// Stops at the first cell that is not a pair, so iterating an atom
    /// yields nothing.
    pub fn iter(&self, list: CellRef) -> ListIter<'_> {
        ListIter { tree: self, next: list }
    }

    /// Length of a proper list, `None` if `cell` is an atom or the chain
    /// does not end in the empty list.
    pub fn list_len(&self, cell: CellRef) -> Option<usize> {
        let mut len = 0;
        let mut cursor = cell;
        loop {
            match self.get(cursor) {
                Cell::Empty => return Some(len),
                Cell::Pair { rest, .. } => {
                    len += 1;
                    cursor = *rest;
                }
                Cell::Atom(_) => return None,
            }
        }
    }

    /// Element `index` of a list.
    pub fn nth(&self, list: CellRef, index: usize) -> Option<CellRef> {
        self.iter(list).nth(index)
    }

    /// Render `cell` as an S-expression.
    pub fn display(&self, cell: CellRef) -> Render<'_> {
        Render { tree: self, cell }
    }

    /// Release every cell and every owned payload.
    ///
    /// Interned names are not freed; they belong to the interning table.
    pub fn free(self) {
        log::trace!("freeing tree of {} cells", self.cells.len());
        drop(self);
    }
}

/// Iterator over list elements; see [`Tree::iter`].
pub struct ListIter<'a> {
    tree: &'a Tree,
    next: CellRef,
}

impl Iterator for ListIter<'_> {
    type Item = CellRef;

    fn next(&mut self) -> Option<CellRef> {
        match self.tree.get(self.next) {
            Cell::Pair { first, rest } => {
                self.next = *rest;
                Some(*first)
            }
            _ => None,
        }
    }
}

impl std::iter::FusedIterator for ListIter<'_> {}

/// `Display` adapter returned by [`Tree::display`].
///
/// The normal form prints on one line. The alternate form (`{:#}`) puts each
/// list element on its own line, indented two spaces per level.
pub struct Render<'a> {
    tree: &'a Tree,
    cell: CellRef,
}

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write_indented(self.tree, self.cell, 0, f)
        } else {
            write_flat(self.tree, self.cell, f)
        }
    }
}

fn write_flat(tree: &Tree, cell: CellRef, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match tree.get(cell) {
        Cell::Atom(atom) => write_atom(atom.name(), f),
        Cell::Empty => write!(f, "()"),
        Cell::Pair { .. } => {
            write!(f, "(")?;
            let mut cursor = cell;
            let mut first_elem = true;
            while let Cell::Pair { first, rest } = tree.get(cursor) {
                if !first_elem {
                    write!(f, " ")?;
                }
                first_elem = false;
                write_flat(tree, *first, f)?;
                cursor = *rest;
            }
            if let Cell::Atom(atom) = tree.get(cursor) {
                write!(f, " . ")?;
                write_atom(atom.name(), f)?;
            }
            write!(f, ")")
        }
    }
}

fn write_indented(
    tree: &Tree,
    cell: CellRef,
    depth: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match tree.get(cell) {
        Cell::Pair { .. } => {
            writeln!(f, "{:indent$}(", "", indent = depth * 2)?;
            for elem in tree.iter(cell) {
                write_indented(tree, elem, depth + 1, f)?;
            }
            writeln!(f, "{:indent$})", "", indent = depth * 2)
        }
        _ => {
            write!(f, "{:indent$}", "", indent = depth * 2)?;
            write_flat(tree, cell, f)?;
            writeln!(f)
        }
    }
}

/// Whether `name` reads back as the same bare atom.
fn is_bare(name: &[u8]) -> bool {
    match name.first() {
        None | Some(b'(' | b')' | b';' | b'"') => false,
        Some(_) => name
            .iter()
            .all(|&b| b.is_ascii_graphic() && !matches!(b, b')' | b';')),
    }
}

fn write_atom(name: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if is_bare(name) {
        // Bare atoms are graphic ASCII, so this is a plain copy.
        return write!(f, "{}", String::from_utf8_lossy(name));
    }
    write!(f, "\"")?;
    for &byte in name {
        match byte {
            b'"' => write!(f, "\\\"")?,
            b'\\' => write!(f, "\\\\")?,
            0x07 => write!(f, "\\a")?,
            0x08 => write!(f, "\\b")?,
            0x0C => write!(f, "\\f")?,
            b'\n' => write!(f, "\\n")?,
            b'\r' => write!(f, "\\r")?,
            b'\t' => write!(f, "\\t")?,
            0x0B => write!(f, "\\v")?,
            b' '..=b'~' => write!(f, "{}", byte as char)?,
            other => write!(f, "\\x{other:02x}")?,
        }
    }
    write!(f, "\"")
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::intern::Interner;
    use std::cell::Cell as Counter;

    fn atom(tree: &mut Tree, interner: &mut Interner, text: &str) -> CellRef {
        let (name, symbol) = interner.intern(text.as_bytes());
        tree.atom_cell(Atom::new(name, symbol, 1))
    }

    fn list(tree: &mut Tree, items: &[CellRef]) -> CellRef {
        items
            .iter()
            .rev()
            .fold(CellRef::EMPTY, |rest, &first| tree.cons(first, rest))
    }

    #[test]
    fn test_empty_list_is_its_own_first_and_rest() {
        let tree = Tree::new();
        assert_eq!(tree.first(CellRef::EMPTY), Some(CellRef::EMPTY));
        assert_eq!(tree.rest(CellRef::EMPTY), Some(CellRef::EMPTY));
        assert_eq!(tree.list_len(CellRef::EMPTY), Some(0));
        assert_eq!(tree.cell_count(), 0);
        assert!(matches!(tree.get(CellRef::EMPTY), Cell::Empty));
        assert!(matches!(tree.get(CellRef(7)), Cell::Empty));
    }

    #[test]
    fn test_list_walking() {
        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let a = atom(&mut tree, &mut interner, "a");
        let b = atom(&mut tree, &mut interner, "b");
        let inner = list(&mut tree, &[b]);
        let outer = list(&mut tree, &[a, inner]);

        assert_eq!(tree.list_len(outer), Some(2));
        assert_eq!(tree.iter(outer).collect::<Vec<_>>(), vec![a, inner]);
        assert_eq!(tree.nth(outer, 1), Some(inner));
        assert_eq!(tree.first(a), None);
        assert_eq!(tree.list_len(a), None);
        assert_eq!(tree.iter(a).count(), 0);
    }

    #[test]
    fn test_display() {
        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let cases: Vec<(&str, &str)> = vec![
            ("plain", "plain"),
            ("with space", "\"with space\""),
            ("", "\"\""),
            ("line\nbreak", "\"line\\nbreak\""),
            ("q\"uote", "q\"uote"),
            ("\"lead", "\"\\\"lead\""),
            ("a(b", "a(b"),
            ("(a", "\"(a\""),
            ("a;b", "\"a;b\""),
            ("tab\tbell\x07", "\"tab\\tbell\\a\""),
        ];
        for (text, expected) in cases {
            let cell = atom(&mut tree, &mut interner, text);
            assert_eq!(tree.display(cell).to_string(), expected, "rendering {text:?}");
        }

        let x = atom(&mut tree, &mut interner, "x");
        let y = atom(&mut tree, &mut interner, "y");
        let inner = list(&mut tree, &[y, CellRef::EMPTY]);
        let outer = list(&mut tree, &[x, inner]);
        assert_eq!(tree.display(outer).to_string(), "(x (y ()))");
        assert_eq!(
            format!("{:#}", tree.display(outer)),
            "(\n  x\n  (\n    y\n    ()\n  )\n)\n"
        );
    }

    #[test]
    fn test_display_high_bytes() {
        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let (name, symbol) = interner.intern(b"\xffz");
        let cell = tree.atom_cell(Atom::new(name, symbol, 1));
        assert_eq!(tree.display(cell).to_string(), "\"\\xffz\"");
    }

    #[test]
    fn test_owned_payload_released_on_reassignment_and_free() {
        thread_local!(static DROPS: Counter<u32> = const { Counter::new(0) });

        struct Probe;
        impl Drop for Probe {
            fn drop(&mut self) {
                DROPS.with(|d| d.set(d.get() + 1));
            }
        }

        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let cell = atom(&mut tree, &mut interner, "font");

        let a = tree.atom_mut(cell).unwrap();
        a.set_owned(Probe);
        assert!(a.owns_payload());
        a.set_owned(Probe);
        assert_eq!(DROPS.with(Counter::get), 1);

        tree.free();
        assert_eq!(DROPS.with(Counter::get), 2);
    }

    #[test]
    fn test_shared_payload_outlives_tree() {
        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let cell = atom(&mut tree, &mut interner, "color");

        let probe: Rc<dyn Any> = Rc::new(42u32);
        let a = tree.atom_mut(cell).unwrap();
        a.set_shared(Rc::clone(&probe));
        assert!(!a.owns_payload());
        assert_eq!(a.payload_ref::<u32>(), Some(&42));
        assert_eq!(Rc::strong_count(&probe), 2);

        tree.free();
        assert_eq!(probe.downcast_ref::<u32>(), Some(&42));
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn test_take_payload() {
        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let cell = atom(&mut tree, &mut interner, "image");
        let a = tree.atom_mut(cell).unwrap();
        a.set_owned(String::from("pixels"));

        let payload = a.take_payload().unwrap();
        assert!(payload.is_owned());
        assert_eq!(
            payload.as_any().downcast_ref::<String>().map(String::as_str),
            Some("pixels")
        );
        assert!(a.payload().is_none());
    }

    #[test]
    fn test_interned_name_survives_tree() {
        let mut interner = Interner::new();
        let mut tree = Tree::new();
        let cell = atom(&mut tree, &mut interner, "kept");
        let name = Rc::clone(tree.atom(cell).unwrap().interned_name());
        tree.free();
        assert_eq!(&*name, b"kept");
        assert!(Rc::ptr_eq(&name, &interner.intern(b"kept").0));
    }
}
