//! Lexer and parser turning a byte stream into a [`Tree`].
//!
//! ```text
//! expr      := atom | string | list
//! list      := '(' expr* ')'
//! toplevel  := expr*        ; implicit outer list, no closing delimiter
//! ```
//!
//! The stream is drained into memory first. Whitespace, comments and bare
//! atoms are recognised with `nom` combinators over the remaining bytes;
//! quoted strings are decoded byte by byte into the [`TokenBuffer`] so escape
//! errors can be reported at the right line. Every lexer and parser step
//! returns a `Result`, so the first error unwinds straight back to the
//! `read_*` entry point and the partial tree is dropped with it.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use nom::{
    IResult, Parser,
    bytes::complete::{take_till, take_till1, take_while},
    character::complete::char,
    sequence::preceded,
};

use crate::buffer::TokenBuffer;
use crate::cell::{Atom, CellRef, Tree};
use crate::intern::{Interner, Keywords, Name, Symbol};
use crate::{DEFAULT_INPUT_NAME, MAX_READ_DEPTH, ReadError, ReadErrorKind};

/// What to do with a `)` that closes nothing at top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrayClose {
    /// Stop reading there and return what was read so far. The `)` and
    /// everything after it are ignored.
    #[default]
    Stop,
    /// Fail with [`ReadErrorKind::StrayCloseParen`].
    Reject,
}

/// Reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConfig {
    /// Deepest list nesting accepted.
    pub max_depth: usize,
    pub stray_close: StrayClose,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            max_depth: MAX_READ_DEPTH,
            stray_close: StrayClose::default(),
        }
    }
}

/// Reading context: the interning table, the token buffer and the settings.
///
/// The table is created on first use and can be torn down with
/// [`teardown`](Self::teardown), after which it is recreated lazily and
/// identifiers start again from 1. Atoms read before a teardown keep their
/// names alive but their identifiers no longer match the new table.
///
/// Not thread-safe; one read runs to completion on the calling thread.
#[derive(Debug, Default)]
pub struct Atomizer {
    symbols: Option<Interner>,
    buffer: TokenBuffer,
    config: ReadConfig,
}

fn table(symbols: &mut Option<Interner>) -> &mut Interner {
    symbols.get_or_insert_with(|| {
        log::debug!("creating symbol table");
        Interner::new()
    })
}

impl Atomizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReadConfig) -> Self {
        Atomizer {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ReadConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ReadConfig) {
        self.config = config;
    }

    /// Intern `text` in this context's table.
    pub fn intern(&mut self, text: &[u8]) -> (Name, Symbol) {
        table(&mut self.symbols).intern(text)
    }

    /// Identifier of `text` if it has been seen, without interning it.
    pub fn lookup(&self, text: &[u8]) -> Option<Symbol> {
        self.symbols.as_ref()?.lookup(text)
    }

    pub fn resolve(&self, symbol: Symbol) -> Option<&Name> {
        self.symbols.as_ref()?.resolve(symbol)
    }

    /// Number of distinct names interned since the last teardown.
    pub fn symbol_count(&self) -> usize {
        self.symbols.as_ref().map_or(0, Interner::len)
    }

    /// Intern a fixed keyword list.
    pub fn keywords<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Keywords {
        let symbols = table(&mut self.symbols);
        Keywords::new(names, |text| symbols.intern(text).1)
    }

    /// Release every interned name held by the table and the token buffer.
    ///
    /// Safe to call at any time, including before anything was read or twice
    /// in a row.
    pub fn teardown(&mut self) {
        if let Some(symbols) = self.symbols.take() {
            log::debug!("tearing down symbol table of {} names", symbols.len());
        }
        self.buffer.release();
    }

    /// Read the file at `path`.
    pub fn read_path(&mut self, path: impl AsRef<Path>) -> Result<Tree, ReadError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|err| ReadError::new(err.into(), &name, 0))?;
        self.read_from(file, &name)
    }

    /// Read standard input to its end.
    pub fn read_stdin(&mut self) -> Result<Tree, ReadError> {
        self.read_from(io::stdin().lock(), DEFAULT_INPUT_NAME)
    }

    /// Read `source` to its end. `name` is used in diagnostics.
    pub fn read_from<R: Read>(&mut self, mut source: R, name: &str) -> Result<Tree, ReadError> {
        let mut input = Vec::new();
        if let Err(err) = source.read_to_end(&mut input) {
            let line = 1 + count_lines(&input);
            return Err(ReadError::new(err.into(), name, line));
        }
        self.read_bytes(&input, name)
    }

    /// Read an in-memory configuration. `name` is used in diagnostics.
    pub fn read_bytes(&mut self, input: &[u8], name: &str) -> Result<Tree, ReadError> {
        let Atomizer {
            symbols,
            buffer,
            config,
        } = self;
        let mut scanner = Scanner {
            rest: input,
            line: 1,
            file: name,
            config,
            symbols: table(symbols),
            buffer,
            tree: Tree::new(),
        };
        let root = scanner.read_list(false, 0, 1)?;
        scanner.check_stray_close()?;

        let mut tree = scanner.tree;
        tree.set_root(root);
        log::debug!(
            "read {name}: {} cells, {} symbols",
            tree.cell_count(),
            self.symbol_count()
        );
        Ok(tree)
    }
}

fn count_lines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

/// Whitespace as understood by C's `isspace` in the "C" locale.
fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

fn ends_bare_atom(byte: u8) -> bool {
    is_space(byte) || byte == b')' || byte == b';'
}

fn blank(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_space).parse(input)
}

/// A comment runs to the end of the line; the newline itself is left as
/// whitespace.
fn comment(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char(';'), take_till(|b: u8| b == b'\n')).parse(input)
}

fn bare_atom(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_till1(ends_bare_atom).parse(input)
}

struct Scanner<'a, 'ctx> {
    rest: &'a [u8],
    line: usize,
    file: &'a str,
    config: &'ctx ReadConfig,
    symbols: &'ctx mut Interner,
    buffer: &'ctx mut TokenBuffer,
    tree: Tree,
}

impl<'a> Scanner<'a, '_> {
    fn fail(&self, kind: ReadErrorKind, line: usize) -> ReadError {
        log::trace!("{}:{line}: {kind}", self.file);
        ReadError::new(kind, self.file, line)
    }

    fn advance_to(&mut self, rest: &'a [u8]) {
        let consumed = &self.rest[..self.rest.len() - rest.len()];
        self.line += count_lines(consumed);
        self.rest = rest;
    }

    /// Run a lexer combinator, consuming its match on success.
    fn eat<O>(&mut self, mut lexer: impl FnMut(&'a [u8]) -> IResult<&'a [u8], O>) -> Option<O> {
        let (rest, out) = lexer(self.rest).ok()?;
        self.advance_to(rest);
        Some(out)
    }

    fn peek(&self) -> Option<u8> {
        self.rest.first().copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let (&byte, rest) = self.rest.split_first()?;
        self.rest = rest;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    fn skip_blank(&mut self) {
        loop {
            self.eat(blank);
            if self.eat(comment).is_none() {
                return;
            }
        }
    }

    /// Read expressions into a list until end of input or an unconsumed `)`.
    fn read_list(
        &mut self,
        require_close: bool,
        depth: usize,
        start_line: usize,
    ) -> Result<CellRef, ReadError> {
        if depth > self.config.max_depth {
            return Err(self.fail(
                ReadErrorKind::TooDeeplyNested(self.config.max_depth),
                start_line,
            ));
        }

        let mut head = CellRef::EMPTY;
        let mut tail = CellRef::EMPTY;
        while let Some(elem) = self.read_expr(depth)? {
            let pair = self.tree.cons(elem, CellRef::EMPTY);
            if tail.is_empty_list() {
                head = pair;
            } else {
                self.tree.set_rest(tail, pair);
            }
            tail = pair;
        }

        if require_close && self.bump() != Some(b')') {
            return Err(self.fail(ReadErrorKind::MissingCloseParen, start_line));
        }
        Ok(head)
    }

    /// Read one expression; `None` at end of input or before a `)`.
    fn read_expr(&mut self, depth: usize) -> Result<Option<CellRef>, ReadError> {
        self.skip_blank();
        match self.peek() {
            None | Some(b')') => Ok(None),
            Some(b'(') => {
                let start_line = self.line;
                self.bump();
                self.read_list(true, depth + 1, start_line).map(Some)
            }
            Some(b'"') => self.read_string().map(Some),
            Some(_) => Ok(Some(self.read_bare_atom())),
        }
    }

    fn make_atom(&mut self, name: Name, symbol: Symbol, line: usize) -> CellRef {
        log::trace!(
            "{}:{line}: atom {:?}",
            self.file,
            String::from_utf8_lossy(&name)
        );
        self.tree.atom_cell(Atom::new(name, symbol, line))
    }

    fn read_bare_atom(&mut self) -> CellRef {
        let line = self.line;
        // The caller has checked the first byte, so this always matches.
        let text = self.eat(bare_atom).unwrap_or_default();
        let (name, symbol) = self.symbols.intern(text);
        self.make_atom(name, symbol, line)
    }

    fn read_string(&mut self) -> Result<CellRef, ReadError> {
        let start_line = self.line;
        self.bump();
        self.buffer.reset();

        loop {
            match self.bump() {
                None => return Err(self.fail(ReadErrorKind::UnterminatedString, start_line)),
                Some(b'"') => break,
                Some(b'\\') => {
                    let byte = self.read_escape(start_line)?;
                    self.buffer.append(byte);
                }
                Some(byte) => self.buffer.append(byte),
            }
        }

        let (name, symbol) = self.symbols.intern(self.buffer.finish());
        Ok(self.make_atom(name, symbol, start_line))
    }

    /// Decode the escape after a backslash.
    fn read_escape(&mut self, start_line: usize) -> Result<u8, ReadError> {
        let Some(byte) = self.bump() else {
            return Err(self.fail(ReadErrorKind::UnterminatedString, start_line));
        };
        let decoded = match byte {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0B,
            b'\'' | b'?' | b'\\' | b'"' => byte,
            b'0'..=b'7' => {
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(digit @ b'0'..=b'7') => {
                            self.bump();
                            value = value * 8 + u32::from(digit - b'0');
                        }
                        _ => break,
                    }
                }
                (value & 0xFF) as u8
            }
            b'x' => {
                let high = self.hex_digit(start_line)?;
                let low = self.hex_digit(start_line)?;
                (high << 4) | low
            }
            _ => return Err(self.fail(ReadErrorKind::InvalidEscape, self.line)),
        };
        Ok(decoded)
    }

    fn hex_digit(&mut self, start_line: usize) -> Result<u8, ReadError> {
        match self.peek() {
            None => Err(self.fail(ReadErrorKind::UnterminatedString, start_line)),
            Some(byte) => match (byte as char).to_digit(16) {
                Some(value) => {
                    self.bump();
                    Ok(value as u8)
                }
                None => Err(self.fail(ReadErrorKind::InvalidHexDigit, self.line)),
            },
        }
    }

    /// Handle a `)` left over after the top-level list.
    fn check_stray_close(&mut self) -> Result<(), ReadError> {
        if self.peek() != Some(b')') {
            return Ok(());
        }
        match self.config.stray_close {
            StrayClose::Stop => {
                log::warn!(
                    "{}:{}: unmatched ')' ends the configuration early",
                    self.file,
                    self.line
                );
                Ok(())
            }
            StrayClose::Reject => Err(self.fail(ReadErrorKind::StrayCloseParen, self.line)),
        }
    }
}
