//! Error types for registry construction, compilation and execution.
//!
//! Both compile and execution errors carry the 1-based source line of the
//! statement that raised them.  Value-level operations (casts, operators,
//! native functions) report a bare [`ExecErrorKind`]; the call node that
//! invoked them attaches its line to form an [`ExecError`].

use std::fmt;

// ── Registry ──────────────────────────────────────────────────────────────────

/// Error raised while merging a [`Library`](crate::registry::Library) into a
/// [`Registry`](crate::registry::Registry).
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// A library with this name is already registered.
    DuplicateLibrary(String),
    /// A function, keyword, global term or type name is already taken.
    NameCollision {
        what: &'static str,
        name: String,
        library: String,
    },
    /// A type names a base type that no registered library provides.
    UnknownBaseType { ty: String, base: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateLibrary(name) => {
                write!(f, "library '{name}' is already registered")
            }
            RegistryError::NameCollision { what, name, library } => {
                write!(f, "{what} '{name}' from library '{library}' is already defined")
            }
            RegistryError::UnknownBaseType { ty, base } => {
                write!(f, "type '{ty}' derives from unknown type '{base}'")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

// ── Compilation ───────────────────────────────────────────────────────────────

/// What went wrong while compiling a line.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    UnknownType(String),
    UnknownFunction(String),
    UnknownTerm(String),
    UnknownLibrary(String),
    UnknownMember { ty: String, member: String },
    /// Wrong number or types of arguments for a call.
    ArgumentMismatch { name: String, args: String },
    NotConstructable(String),
    DuplicateDeclaration(String),
    /// End of input inside a `{ ... }` block.
    UnterminatedBlock,
    /// A block opener was not followed by a `{` line.
    ExpectedBlock(String),
    InvalidAssignment { declared: String, source: String },
    InvalidCast { from: String, to: String },
    InvalidTarget(String),
    InvalidStatement(String),
    InvalidReturn(String),
    ReadOnlyField { ty: String, field: String },
    NonConstant(String),
    UnsupportedOperator { op: String, ty: String },
    /// A keyword used where it is not allowed (`break` outside a loop, …).
    Misplaced(String),
    Syntax(String),
    /// A compile-time initialiser failed while snapshotting term values.
    Initialization(String),
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::UnknownType(name) => write!(f, "unknown type '{name}'"),
            CompileErrorKind::UnknownFunction(name) => write!(f, "unknown function '{name}'"),
            CompileErrorKind::UnknownTerm(name) => write!(f, "unknown term '{name}'"),
            CompileErrorKind::UnknownLibrary(name) => write!(f, "unknown library '{name}'"),
            CompileErrorKind::UnknownMember { ty, member } => {
                write!(f, "type '{ty}' has no member '{member}'")
            }
            CompileErrorKind::ArgumentMismatch { name, args } => {
                write!(f, "no signature of '{name}' accepts ({args})")
            }
            CompileErrorKind::NotConstructable(ty) => write!(f, "type '{ty}' is not constructable"),
            CompileErrorKind::DuplicateDeclaration(name) => {
                write!(f, "'{name}' is already declared")
            }
            CompileErrorKind::UnterminatedBlock => write!(f, "unterminated block, expected '}}'"),
            CompileErrorKind::ExpectedBlock(found) => {
                write!(f, "expected '{{' to open a block, found '{found}'")
            }
            CompileErrorKind::InvalidAssignment { declared, source } => {
                write!(f, "cannot assign {source} to {declared}")
            }
            CompileErrorKind::InvalidCast { from, to } => write!(f, "cannot cast {from} to {to}"),
            CompileErrorKind::InvalidTarget(target) => {
                write!(f, "'{target}' is not an assignable target")
            }
            CompileErrorKind::InvalidStatement(line) => {
                write!(f, "'{line}' is not a statement")
            }
            CompileErrorKind::InvalidReturn(msg) => write!(f, "invalid return: {msg}"),
            CompileErrorKind::ReadOnlyField { ty, field } => {
                write!(f, "'{ty}.{field}' is read-only")
            }
            CompileErrorKind::NonConstant(text) => {
                write!(f, "'{text}' is not a constant value")
            }
            CompileErrorKind::UnsupportedOperator { op, ty } => {
                write!(f, "operator '{op}' is not supported by {ty}")
            }
            CompileErrorKind::Misplaced(msg) => write!(f, "{msg}"),
            CompileErrorKind::Syntax(msg) => write!(f, "syntax error: {msg}"),
            CompileErrorKind::Initialization(msg) => write!(f, "initialisation failed: {msg}"),
        }
    }
}

/// A compilation failure.  Compilation stops at the first one.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub line: usize,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(line: usize, kind: CompileErrorKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for CompileError {}

// ── Execution ─────────────────────────────────────────────────────────────────

/// What went wrong while executing a call node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecErrorKind {
    InvalidCast { from: String, to: String },
    InvalidAssignment { declared: String, source: String },
    UnsupportedOperator { op: String, ty: String },
    /// A non-void user function finished without returning a value.
    MissingReturn(String),
    /// Raised by the script itself with `throw`.
    Thrown(String),
    IndexOutOfRange { index: i64, len: usize },
    DivisionByZero,
    NullReference(String),
    CallDepthExceeded(usize),
    /// The host named a term the script does not have.
    UnknownTerm(String),
    /// Failure reported by host code.
    Native(String),
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecErrorKind::InvalidCast { from, to } => write!(f, "cannot cast {from} to {to}"),
            ExecErrorKind::InvalidAssignment { declared, source } => {
                write!(f, "cannot assign {source} to {declared}")
            }
            ExecErrorKind::UnsupportedOperator { op, ty } => {
                write!(f, "operator '{op}' is not supported by {ty}")
            }
            ExecErrorKind::MissingReturn(name) => {
                write!(f, "function '{name}' ended without returning a value")
            }
            ExecErrorKind::Thrown(msg) => write!(f, "{msg}"),
            ExecErrorKind::IndexOutOfRange { index, len } => {
                write!(f, "index {index} is out of range for length {len}")
            }
            ExecErrorKind::DivisionByZero => write!(f, "division by zero"),
            ExecErrorKind::NullReference(what) => write!(f, "null reference: {what}"),
            ExecErrorKind::CallDepthExceeded(depth) => {
                write!(f, "call depth exceeded {depth}")
            }
            ExecErrorKind::UnknownTerm(name) => write!(f, "unknown term '{name}'"),
            ExecErrorKind::Native(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<String> for ExecErrorKind {
    fn from(msg: String) -> Self {
        ExecErrorKind::Native(msg)
    }
}

/// An execution failure.  The current `execute()` call is abandoned.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecError {
    pub line: usize,
    pub kind: ExecErrorKind,
}

impl ExecError {
    pub fn new(line: usize, kind: ExecErrorKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for ExecError {}

// ── Tests ─────────────────────────────────────────────────────────────────────
