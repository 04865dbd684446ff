// Error handling for the Tarn runtime

use crate::runtime::values::Value;
use crate::tree::SourceLocation;
use std::fmt;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Runtime errors that can occur during evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("value of type {type_name} is not callable")]
    NotCallable { type_name: String },

    #[error("arity mismatch in {function}: expected {expected}, got {actual}")]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("type error in {operation}: expected {expected}, got {actual}")]
    TypeError {
        operation: String,
        expected: String,
        actual: String,
    },

    #[error("index {index} is out of range for length {length}")]
    IndexOutOfRange { index: f64, length: usize },

    #[error("cannot access property `{property}` of a {type_name}")]
    NotAContainer { type_name: String, property: String },

    #[error("struct has no field `{field}`")]
    UnknownField { field: String },

    #[error("property `{property}` of a {type_name} is read-only")]
    ReadOnlyProperty { type_name: String, property: String },

    #[error("cannot assign a {assigned} to a variable holding a {current}")]
    TypeUnstableAssignment { current: String, assigned: String },

    #[error("variable `{0}` is used before it is initialized")]
    UninitializedVariable(String),

    #[error("global `{0}` was never linked")]
    UnlinkedGlobal(String),

    #[error("cannot await a value of type {0}")]
    AwaitNonDeferred(String),

    #[error("`{0}` escaped its enclosing construct")]
    StrayExit(&'static str),

    #[error("call depth exceeded the limit of {0}")]
    CallDepthExceeded(usize),

    #[error("deadlock: every logical thread is waiting on an unfinished deferred computation")]
    Deadlock,

    #[error("the executor has shut down")]
    ExecutorShutDown,

    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    #[error("runtime stack is inconsistent: {0}")]
    StackCorrupted(String),

    #[error("{function}: {message}")]
    Host { function: String, message: String },
}

impl RuntimeErrorKind {
    pub fn type_error(operation: &str, expected: &str, actual: &Value) -> Self {
        RuntimeErrorKind::TypeError {
            operation: operation.to_string(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }
}

/// A runtime error tagged with the location of the node that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub location: Option<SourceLocation>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            location: None,
        }
    }

    /// Tags the error with `location` unless a more precise one is already set.
    pub fn at(mut self, location: Option<&SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = location.cloned();
        }
        self
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} (at {})", self.kind, location),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Everything that can unwind an evaluation step.
///
/// `Break`, `Continue` and `Return` are ordinary control flow and are caught
/// by the nearest loop or closure invocation. They never reach user code as
/// values.
#[derive(Debug, Clone)]
pub enum Exit {
    Break(Value),
    Continue,
    Return(Value),
    Error(RuntimeError),
}

impl Exit {
    pub fn at(self, location: Option<&SourceLocation>) -> Self {
        match self {
            Exit::Error(error) => Exit::Error(error.at(location)),
            other => other,
        }
    }

    /// Converts an exit that reached a boundary it may not cross into an error.
    pub fn into_error(self) -> RuntimeError {
        match self {
            Exit::Error(error) => error,
            Exit::Break(_) => RuntimeErrorKind::StrayExit("break").into(),
            Exit::Continue => RuntimeErrorKind::StrayExit("continue").into(),
            Exit::Return(_) => RuntimeErrorKind::StrayExit("return").into(),
        }
    }
}

impl From<RuntimeError> for Exit {
    fn from(error: RuntimeError) -> Self {
        Exit::Error(error)
    }
}

impl From<RuntimeErrorKind> for Exit {
    fn from(kind: RuntimeErrorKind) -> Self {
        Exit::Error(RuntimeError::new(kind))
    }
}
