//! Error channels: typed load errors for malformed containers, and
//! the in-language exception value with its call-site trace.

use std::fmt;
use std::io;

use crate::program::Image;

/// Shared error message wording.
pub mod messages {
    pub const STACK_OVERFLOW: &str = "Stack overflow";
    pub const STACK_UNDERFLOW: &str = "Stack underflow";
    pub const DIVISION_BY_ZERO: &str = "Division by zero";
    pub const LIST_NOT_OPEN: &str = "Attempt to close a list that was not open";
    pub const END_OF_STREAM: &str = "Unexpected end of bytecode";
}

/// One step of an exception's call trace: the byte offset of the
/// faulting (or calling) instruction and the index of the code object
/// it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub offset: usize,
    pub object: usize,
}

/// A program-level error. Created where the failure happened; every
/// call site it unwinds through appends its own entry, so the trace
/// reads deepest call first and is never truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub message: String,
    pub trace: Vec<TraceEntry>,
}

impl Exception {
    pub fn new(message: impl Into<String>, offset: usize, object: usize) -> Self {
        Self {
            message: message.into(),
            trace: vec![TraceEntry { offset, object }],
        }
    }

    pub fn push_trace(&mut self, offset: usize, object: usize) {
        self.trace.push(TraceEntry { offset, object });
    }

    /// Multi-line rendering for the top level, deepest call first.
    pub fn render(&self, image: &Image) -> String {
        let mut out = String::from("Runtime exception:\n");
        for entry in &self.trace {
            out.push_str(&format!(
                "  at offset {} in {}\n",
                entry.offset,
                image.object(entry.object).name.full
            ));
        }
        out.push_str(&format!("  {}", self.message));
        out
    }
}

/// Structural problems in a bytecode container. These surface to the
/// embedder as ordinary results; nothing here aborts the process.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadError {
    Truncated,
    ObjectTooLong { object: usize, length: u64 },
    BadObjectName { object: usize },
    BadVariableName { object: usize },
    ConstantTooLong { object: usize, index: usize },
    DuplicateObject(String),
    NoEntryObject,
    AmbiguousEntryObject(String, String),
    Io(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Truncated => write!(f, "container is truncated"),
            LoadError::ObjectTooLong { object, length } => {
                write!(f, "object {object} declares {length} bytes past the container end")
            }
            LoadError::BadObjectName { object } => {
                write!(f, "object {object} has a malformed name")
            }
            LoadError::BadVariableName { object } => {
                write!(f, "object {object} has a malformed variable name")
            }
            LoadError::ConstantTooLong { object, index } => {
                write!(f, "constant {index} of object {object} overruns the object")
            }
            LoadError::DuplicateObject(name) => {
                write!(f, "duplicate object name `{name}`")
            }
            LoadError::NoEntryObject => write!(f, "no object is tagged `main`"),
            LoadError::AmbiguousEntryObject(a, b) => {
                write!(f, "both `{a}` and `{b}` are tagged `main`")
            }
            LoadError::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        LoadError::Io(err.to_string())
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
