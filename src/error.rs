//! Error taxonomy and the process-wide error stack.
//!
//! Every failure in the library is one of six kinds ([`ErrorKind`]) carried
//! by [`Gt3Error`].  In addition to being returned as a `Result`, each error
//! is recorded on a ring-buffer [`ErrorStack`] so that callers several layers
//! up (or on the other side of a C-style status interface) can inspect what
//! went wrong without threading a sink through every call.
//!
//! The stack used by the crate-internal constructors is a process-wide
//! default instance; `ErrorStack` itself is public for callers that want an
//! explicit sink.  Two global flags control side effects at record time:
//! print-on-error (each recorded error is also written to stderr) and
//! exit-on-error (the process exits after printing).

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Gt3Error>;

/// Capacity of an [`ErrorStack`]; older entries are overwritten.
pub const ERROR_STACK_DEPTH: usize = 16;

// ── Error type ────────────────────────────────────────────────────────────────

/// An error raised by the library, tagged with its kind.
#[derive(Debug, Error)]
pub enum Gt3Error {
    /// An underlying OS call failed.
    #[error("system error: {ctx}: {source}")]
    Sys {
        ctx: String,
        #[source]
        source: io::Error,
    },

    /// A record frame is inconsistent, a magic is missing, a population
    /// count disagrees with its bitmap, or a chunk overruns the file.
    #[error("broken file: {0}")]
    Broken(String),

    /// Argument out of range, unknown header key, wrong accessor type,
    /// unknown format string.
    #[error("illegal call: {0}")]
    Call(String),

    /// The first header's magic did not match.
    #[error("not a GTOOL3 file: {0}")]
    NotGt3(String),

    /// A header slot cannot be decoded under its declared type.
    #[error("invalid data in the header: {0}")]
    Header(String),

    /// Chunk index, z-plane index, or slot index beyond its valid interval.
    #[error("index out of range: {0}")]
    Index(String),
}

/// Discriminant of a [`Gt3Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Sys,
    Broken,
    Call,
    NotGt3,
    Header,
    Index,
}

impl Gt3Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Gt3Error::Sys { .. } => ErrorKind::Sys,
            Gt3Error::Broken(_) => ErrorKind::Broken,
            Gt3Error::Call(_) => ErrorKind::Call,
            Gt3Error::NotGt3(_) => ErrorKind::NotGt3,
            Gt3Error::Header(_) => ErrorKind::Header,
            Gt3Error::Index(_) => ErrorKind::Index,
        }
    }
}

// ── Error stack ───────────────────────────────────────────────────────────────

/// One recorded error: its kind and the rendered message.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub message: String,
}

/// A bounded stack of recorded errors.
///
/// Push beyond [`ERROR_STACK_DEPTH`] drops the oldest entry; `count` keeps
/// counting regardless, so callers can detect that errors were lost.
#[derive(Debug, Default)]
pub struct ErrorStack {
    entries: VecDeque<ErrorEntry>,
    count: u64,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ErrorKind, message: String) {
        if self.entries.len() == ERROR_STACK_DEPTH {
            self.entries.pop_front();
        }
        self.entries.push_back(ErrorEntry { kind, message });
        self.count = self.count.saturating_add(1);
    }

    /// Most recent entry, without popping.
    pub fn last(&self) -> Option<&ErrorEntry> {
        self.entries.back()
    }

    /// Pop the most recent entry.
    pub fn pop_last(&mut self) -> Option<ErrorEntry> {
        let e = self.entries.pop_back();
        if e.is_some() {
            self.count -= 1;
        }
        e
    }

    /// Total number of errors recorded so far (not the retained count).
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Process-wide default sink ─────────────────────────────────────────────────

static DEFAULT_STACK: LazyLock<Mutex<ErrorStack>> =
    LazyLock::new(|| Mutex::new(ErrorStack::new()));
static PROGRAM_NAME: LazyLock<Mutex<Option<String>>> = LazyLock::new(|| Mutex::new(None));
static EXIT_ON_ERROR: AtomicBool = AtomicBool::new(false);
static PRINT_ON_ERROR: AtomicBool = AtomicBool::new(false);

fn default_stack() -> MutexGuard<'static, ErrorStack> {
    DEFAULT_STACK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Program name prefixed to printed error messages.
pub fn set_program_name(name: &str) {
    let mut guard = PROGRAM_NAME
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Some(name.to_owned());
}

/// When set, the process exits (after printing the error) on the next
/// recorded error.
pub fn set_exit_on_error(on: bool) {
    EXIT_ON_ERROR.store(on, Ordering::Relaxed);
}

/// When set, every recorded error is also printed to stderr.
pub fn set_print_on_error(on: bool) {
    PRINT_ON_ERROR.store(on, Ordering::Relaxed);
}

/// Most recent error on the default stack, without popping.
pub fn last_error() -> Option<ErrorEntry> {
    default_stack().last().cloned()
}

/// Pop the most recent error off the default stack.
pub fn clear_last_error() {
    default_stack().pop_last();
}

/// Total errors recorded on the default stack since process start.
pub fn error_count() -> u64 {
    default_stack().count()
}

fn render(message: &str) -> String {
    let guard = PROGRAM_NAME
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    match guard.as_deref() {
        Some(name) => format!("{name}: {message}"),
        None => message.to_owned(),
    }
}

/// Print the most recent error (if any) to `out`, program-name prefixed.
pub fn print_last_error(out: &mut dyn io::Write) {
    if let Some(entry) = last_error() {
        let _ = writeln!(out, "{}", render(&entry.message));
    }
}

/// Print and pop every retained error, most recent first.
pub fn print_all_errors(out: &mut dyn io::Write) {
    while last_error().is_some() {
        print_last_error(out);
        clear_last_error();
    }
}

/// Record `err` on the default stack and apply the print/exit flags.
/// All crate-internal error constructors funnel through here.
pub(crate) fn record(err: Gt3Error) -> Gt3Error {
    let message = err.to_string();
    default_stack().push(err.kind(), message.clone());

    if EXIT_ON_ERROR.load(Ordering::Relaxed) {
        eprintln!("{}", render(&message));
        std::process::exit(1);
    }
    if PRINT_ON_ERROR.load(Ordering::Relaxed) {
        eprintln!("{}", render(&message));
    }
    err
}

// ── Crate-internal constructors ───────────────────────────────────────────────

pub(crate) fn sys(ctx: impl Into<String>, source: io::Error) -> Gt3Error {
    record(Gt3Error::Sys {
        ctx: ctx.into(),
        source,
    })
}

pub(crate) fn broken(msg: impl Into<String>) -> Gt3Error {
    record(Gt3Error::Broken(msg.into()))
}

pub(crate) fn bad_call(msg: impl Into<String>) -> Gt3Error {
    record(Gt3Error::Call(msg.into()))
}

pub(crate) fn not_gt3(msg: impl Into<String>) -> Gt3Error {
    record(Gt3Error::NotGt3(msg.into()))
}

pub(crate) fn bad_header(msg: impl Into<String>) -> Gt3Error {
    record(Gt3Error::Header(msg.into()))
}

pub(crate) fn out_of_range(msg: impl Into<String>) -> Gt3Error {
    record(Gt3Error::Index(msg.into()))
}

/// Classify an I/O failure seen while reading data: a premature EOF means
/// the file is truncated (broken), anything else is a system error.
pub(crate) fn read_failure(e: io::Error, ctx: &str) -> Gt3Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        broken(format!("unexpected EOF ({ctx})"))
    } else {
        sys(ctx.to_owned(), e)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_push_pop_last() {
        let mut stack = ErrorStack::new();
        assert!(stack.last().is_none());

        stack.push(ErrorKind::Broken, "a".into());
        stack.push(ErrorKind::Index, "b".into());
        assert_eq!(stack.count(), 2);
        assert_eq!(stack.last().unwrap().message, "b");

        // last() does not pop
        assert_eq!(stack.last().unwrap().message, "b");

        let popped = stack.pop_last().unwrap();
        assert_eq!(popped.kind, ErrorKind::Index);
        assert_eq!(stack.last().unwrap().message, "a");
    }

    #[test]
    fn stack_is_bounded_but_keeps_counting() {
        let mut stack = ErrorStack::new();
        for i in 0..40 {
            stack.push(ErrorKind::Call, format!("e{i}"));
        }
        assert_eq!(stack.count(), 40);
        assert_eq!(stack.last().unwrap().message, "e39");

        let mut retained = 0;
        while stack.pop_last().is_some() {
            retained += 1;
        }
        assert_eq!(retained, ERROR_STACK_DEPTH);
    }

    #[test]
    fn kinds_map_back() {
        let e = Gt3Error::Index("z=9".into());
        assert_eq!(e.kind(), ErrorKind::Index);
        let e = Gt3Error::Header("MISS".into());
        assert_eq!(e.kind(), ErrorKind::Header);
    }
}
