//! Atomizer - S-expression configuration reader with symbol interning
//!
//! This crate reads byte-oriented S-expression configuration files into a tree of
//! cells and gives every distinct atom name one canonical storage location and one
//! stable small integer identifier. It is a reader, not an interpreter: atoms are
//! raw bytes and the caller decides what they mean.
//!
//! ```text
//! ; greeter theme
//! (background "bg.png" stretch)
//! (font "Sans-12")
//! (action exec "/usr/bin/reboot") (action exit)
//! ```
//!
//! ## Syntax
//!
//! - Whitespace separates tokens; `;` starts a comment running to end of line.
//! - `(` and `)` delimit lists. The whole file is an implicit top-level list.
//! - Bare atoms are runs of non-whitespace bytes, ending at whitespace, `)` or `;`.
//! - Quoted strings support `\a \b \f \n \r \t \v \' \? \\ \"`, octal `\NNN`
//!   (one to three digits) and hex `\xHH` (exactly two digits), and may span lines.
//!
//! ## Usage
//!
//! An [`Atomizer`] owns the interning table and the token buffer. Read a file
//! with [`Atomizer::read_path`], then walk the [`Tree`] or pull entries out of
//! association lists with [`Tree::assoc_key`]. The [`global`] module offers a
//! default per-thread instance with a "last error" slot for callers that want a
//! null-on-failure interface.
//!
//! ## Modules
//!
//! - `buffer`: token scratch buffer and allocation-failure handling
//! - `intern`: interning table, symbols and keyword tables
//! - `cell`: the cell arena, atoms and their payload slots, rendering
//! - `reader`: lexer and parser
//! - `assoc`: association-list queries
//! - `global`: default instance

use std::io;

/// Default limit on list nesting, so hostile input cannot exhaust the stack.
pub const MAX_READ_DEPTH: usize = 256;

/// Name used in diagnostics when reading from standard input.
pub const DEFAULT_INPUT_NAME: &str = "standard input";

/// Categorizes the different kinds of read failures.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ReadErrorKind {
    /// The operating system reported an error opening or reading the stream
    #[error("{message}")]
    Stream {
        kind: io::ErrorKind,
        message: String,
    },
    /// End of input inside a quoted string
    #[error("Unterminated string")]
    UnterminatedString,
    /// Backslash followed by a character that is not a known escape
    #[error("Invalid escape")]
    InvalidEscape,
    /// `\x` not followed by exactly two hex digits
    #[error("Invalid hex digit")]
    InvalidHexDigit,
    /// A list ran to end of input without its `)`
    #[error("Missing closing parenthesis")]
    MissingCloseParen,
    /// A `)` at top level, when the reader is configured to reject it
    #[error("Unexpected closing parenthesis")]
    StrayCloseParen,
    /// List nesting exceeded the configured maximum
    #[error("Lists nested deeper than {0} levels")]
    TooDeeplyNested(usize),
}

impl From<io::Error> for ReadErrorKind {
    fn from(err: io::Error) -> Self {
        let mut message = err.to_string();
        // Keep only the system's description, without the errno suffix.
        if let Some(code) = err.raw_os_error()
            && let Some(description) = message.strip_suffix(&format!(" (os error {code})"))
        {
            message = description.to_owned();
        }
        ReadErrorKind::Stream {
            kind: err.kind(),
            message,
        }
    }
}

/// A read failure, with the file and line it was detected at.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{kind} : line {line} of {file}")]
pub struct ReadError {
    pub kind: ReadErrorKind,
    /// File name, or [`DEFAULT_INPUT_NAME`] for standard input
    pub file: String,
    pub line: usize,
}

impl ReadError {
    pub fn new(kind: ReadErrorKind, file: impl Into<String>, line: usize) -> Self {
        ReadError {
            kind,
            file: file.into(),
            line,
        }
    }

    /// Whether this is an I/O failure rather than a syntax error.
    pub fn is_stream_fault(&self) -> bool {
        matches!(self.kind, ReadErrorKind::Stream { .. })
    }
}

pub mod assoc;
pub mod buffer;
pub mod cell;
pub mod global;
pub mod intern;
pub mod reader;

pub use assoc::AssocEntries;
pub use cell::{Atom, Cell, CellRef, Payload, Tree};
pub use intern::{Interner, Keywords, Name, Symbol};
pub use reader::{Atomizer, ReadConfig, StrayClose};
