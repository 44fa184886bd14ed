//! Default instance for callers that want a null-on-failure interface.
//!
//! The context and the "last error" slot are per thread: names are shared
//! through `Rc`, so a tree cannot cross threads anyway. Code that wants
//! independent interning scopes should own an [`Atomizer`] instead.
//!
//! ```no_run
//! use atomizer::global;
//!
//! match global::read_config(Some("greeter.cfg".as_ref())) {
//!     Some(tree) => global::free_tree(tree),
//!     None => eprintln!("{}", global::last_error().unwrap_or_default()),
//! }
//! global::teardown_interning();
//! ```

use std::cell::RefCell;
use std::path::Path;

use crate::ReadError;
use crate::cell::Tree;
use crate::intern::{Keywords, Name, Symbol};
use crate::reader::{Atomizer, ReadConfig};

thread_local! {
    static DEFAULT: RefCell<Atomizer> = RefCell::new(Atomizer::new());
    static LAST_ERROR: RefCell<Option<ReadError>> = const { RefCell::new(None) };
}

/// Run `f` with the default context.
pub fn with_default<R>(f: impl FnOnce(&mut Atomizer) -> R) -> R {
    DEFAULT.with(|atomizer| f(&mut atomizer.borrow_mut()))
}

/// Read `path`, or standard input when `None`.
///
/// Returns `None` on failure; the reason is then available from
/// [`last_error`].
pub fn read_config(path: Option<&Path>) -> Option<Tree> {
    let result = with_default(|atomizer| match path {
        Some(path) => atomizer.read_path(path),
        None => atomizer.read_stdin(),
    });
    record(result)
}

/// Like [`read_config`] for an in-memory buffer.
pub fn read_config_bytes(input: &[u8], name: &str) -> Option<Tree> {
    record(with_default(|atomizer| atomizer.read_bytes(input, name)))
}

fn record(result: Result<Tree, ReadError>) -> Option<Tree> {
    match result {
        Ok(tree) => Some(tree),
        Err(err) => {
            log::debug!("read failed: {err}");
            LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
            None
        }
    }
}

/// The most recent read failure, as `"<message> : line <N> of <file>"`.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(ToString::to_string))
}

/// The most recent read failure, structured.
pub fn last_read_error() -> Option<ReadError> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Release a tree read through this module.
pub fn free_tree(tree: Tree) {
    tree.free();
}

/// Release every interned name and the token buffer of the default context.
pub fn teardown_interning() {
    with_default(Atomizer::teardown);
}

pub fn intern(text: &[u8]) -> (Name, Symbol) {
    with_default(|atomizer| atomizer.intern(text))
}

pub fn lookup(text: &[u8]) -> Option<Symbol> {
    with_default(|atomizer| atomizer.lookup(text))
}

pub fn keywords<'a>(names: impl IntoIterator<Item = &'a str>) -> Keywords {
    with_default(|atomizer| atomizer.keywords(names))
}

pub fn set_config(config: ReadConfig) {
    with_default(|atomizer| atomizer.set_config(config));
}
