//! Association-list queries.
//!
//! An association list is a list of entries, each itself a list headed by
//! an atom key:
//!
//! ```text
//! ((font "Sans" 12) (color white) (font "Mono" 10))
//! ```
//!
//! Entries that are not lists headed by an atom are skipped.

use crate::cell::{Cell, CellRef, Tree};
use crate::intern::Symbol;

impl Tree {
    /// Find the first entry of `list` keyed by `key` without allocating.
    ///
    /// Returns the entry's value (the entry minus its key) and the part of
    /// `list` after the entry.
    pub fn find_entry(&self, list: CellRef, key: Symbol) -> Option<(CellRef, CellRef)> {
        let mut cursor = list;
        while let Cell::Pair { first, rest } = self.get(cursor) {
            if let Cell::Pair {
                first: head,
                rest: value,
            } = self.get(*first)
                && self.atom(*head).is_some_and(|atom| atom.symbol() == key)
            {
                return Some((*value, *rest));
            }
            cursor = *rest;
        }
        None
    }

    /// Find the first entry of `list` keyed by `key`.
    ///
    /// On a match, allocates and returns a new pair whose first element is
    /// the entry's value and whose rest is the unexamined remainder of
    /// `list`. Calling again on that remainder finds the next entry with the
    /// same key. Returns `None` when nothing matches or `list` is not a list.
    pub fn assoc_key(&mut self, list: CellRef, key: Symbol) -> Option<CellRef> {
        let (value, remainder) = self.find_entry(list, key)?;
        Some(self.cons(value, remainder))
    }

    /// Iterate over the values of every entry of `list` keyed by `key`.
    pub fn assoc_entries(&self, list: CellRef, key: Symbol) -> AssocEntries<'_> {
        AssocEntries {
            tree: self,
            rest: list,
            key,
        }
    }
}

/// Iterator returned by [`Tree::assoc_entries`].
pub struct AssocEntries<'a> {
    tree: &'a Tree,
    rest: CellRef,
    key: Symbol,
}

impl Iterator for AssocEntries<'_> {
    type Item = CellRef;

    fn next(&mut self) -> Option<CellRef> {
        let (value, rest) = self.tree.find_entry(self.rest, self.key)?;
        self.rest = rest;
        Some(value)
    }
}

impl std::iter::FusedIterator for AssocEntries<'_> {}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::reader::Atomizer;

    fn render(tree: &Tree, cell: CellRef) -> String {
        tree.display(cell).to_string()
    }

    #[test]
    fn test_repeated_key_walk() {
        let mut atomizer = Atomizer::new();
        let mut tree = atomizer
            .read_bytes(b"(x 1) (y 2) (x 3 4) (z)", "assoc.cfg")
            .unwrap();
        let x = atomizer.lookup(b"x").unwrap();
        let list = tree.root();

        let found = tree.assoc_key(list, x).unwrap();
        let (value, remainder) = (tree.first(found).unwrap(), tree.rest(found).unwrap());
        assert_eq!(render(&tree, value), "(1)");
        assert_eq!(render(&tree, remainder), "((y 2) (x 3 4) (z))");

        let found = tree.assoc_key(remainder, x).unwrap();
        let (value, remainder) = (tree.first(found).unwrap(), tree.rest(found).unwrap());
        assert_eq!(render(&tree, value), "(3 4)");
        assert_eq!(render(&tree, remainder), "((z))");

        assert_eq!(tree.assoc_key(remainder, x), None);
    }

    #[test]
    fn test_assoc_key_allocates_fresh_pair() {
        let mut atomizer = Atomizer::new();
        let mut tree = atomizer.read_bytes(b"(k v)", "assoc.cfg").unwrap();
        let k = atomizer.lookup(b"k").unwrap();
        let before = tree.cell_count();

        let a = tree.assoc_key(tree.root(), k).unwrap();
        let b = tree.assoc_key(tree.root(), k).unwrap();
        assert_ne!(a, b);
        assert_eq!(tree.cell_count(), before + 2);
        assert_eq!(tree.first(a), tree.first(b));
    }

    #[test]
    fn test_key_with_no_value() {
        let mut atomizer = Atomizer::new();
        let mut tree = atomizer.read_bytes(b"(flag) (other 1)", "assoc.cfg").unwrap();
        let flag = atomizer.lookup(b"flag").unwrap();

        let found = tree.assoc_key(tree.root(), flag).unwrap();
        assert!(tree.first(found).unwrap().is_empty_list());
    }

    #[test]
    fn test_skips_entries_not_headed_by_atom() {
        let mut atomizer = Atomizer::new();
        let mut tree = atomizer
            .read_bytes(b"x () ((x) nested) (x found)", "assoc.cfg")
            .unwrap();
        let x = atomizer.lookup(b"x").unwrap();

        let found = tree.assoc_key(tree.root(), x).unwrap();
        assert_eq!(render(&tree, tree.first(found).unwrap()), "(found)");
        assert!(tree.rest(found).unwrap().is_empty_list());
    }

    #[test]
    fn test_no_match_or_malformed_list() {
        let mut atomizer = Atomizer::new();
        let mut tree = atomizer.read_bytes(b"(a 1) atom", "assoc.cfg").unwrap();
        let (_, missing) = atomizer.intern(b"missing");
        let a = atomizer.lookup(b"a").unwrap();

        assert_eq!(tree.assoc_key(tree.root(), missing), None);
        assert_eq!(tree.assoc_key(CellRef::EMPTY, a), None);

        let atom = tree.nth(tree.root(), 1).unwrap();
        assert_eq!(tree.assoc_key(atom, a), None);
    }

    #[test]
    fn test_assoc_entries_iterator() {
        let mut atomizer = Atomizer::new();
        let tree = atomizer
            .read_bytes(
                b"(font \"Sans\" 12)\n(color white)\n(font \"Mono\" 10)\n",
                "theme.cfg",
            )
            .unwrap();
        let font = atomizer.lookup(b"font").unwrap();
        let color = atomizer.lookup(b"color").unwrap();

        let fonts: Vec<String> = tree
            .assoc_entries(tree.root(), font)
            .map(|value| render(&tree, value))
            .collect();
        assert_eq!(fonts, vec!["(Sans 12)", "(Mono 10)"]);
        assert_eq!(tree.assoc_entries(tree.root(), color).count(), 1);

        let line = tree
            .assoc_entries(tree.root(), font)
            .nth(1)
            .and_then(|value| tree.nth(value, 0))
            .and_then(|cell| tree.atom(cell))
            .map(|atom| atom.line());
        assert_eq!(line, Some(3));
    }
}
