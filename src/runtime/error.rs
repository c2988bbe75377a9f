use crate::language::span::Position;
use crate::runtime::node::NodeRef;
use std::fmt;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Clone, Debug, Error)]
pub enum RuntimeError {
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },
    #[error("no matching signature for '{name}' with arguments ({args}); candidates: {candidates}")]
    Dispatch {
        name: String,
        args: String,
        candidates: String,
    },
    #[error("undefined {what} '{name}'")]
    Undefined { what: &'static str, name: String },
    #[error("cannot modify constant '{name}'")]
    ConstViolation { name: String },
    #[error("module '{module}' failed: {message}")]
    Native { module: String, message: String },
    #[error("refinement type '{name}' rejected {value}")]
    Refinement { name: String, value: String },
    #[error("refinement types must return a boolean ('{name}' returned {value})")]
    RefinementNotBoolean { name: String, value: String },
    #[error("{message}")]
    User { message: String },
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },
    #[error("cannot import '{path}': {message}")]
    Import { path: String, message: String },
    #[error("'{name}' is already declared in this scope")]
    Redeclared { name: String },
    #[error("cannot evaluate code: {message}")]
    Eval { message: String },
}

impl RuntimeError {
    pub fn mismatch(message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        RuntimeError::Unsupported {
            message: message.into(),
        }
    }

    pub fn undefined(what: &'static str, name: impl Into<String>) -> Self {
        RuntimeError::Undefined {
            what,
            name: name.into(),
        }
    }
}

/// A runtime error located in a source file.
#[derive(Clone, Debug)]
pub struct Failure {
    pub error: RuntimeError,
    pub file: String,
    pub pos: Position,
}

impl Failure {
    pub fn is_located(&self) -> bool {
        self.pos.line != 0
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error in '{}' @ ({}, {}): {}",
            self.file, self.pos.line, self.pos.column, self.error
        )
    }
}

impl std::error::Error for Failure {}

/// Non-local control flow out of `eval`.
#[derive(Debug)]
pub enum Signal {
    Return(NodeRef),
    Break,
    Continue,
    Exit(i32),
    Error(Box<Failure>),
}

impl Signal {
    pub fn error(&self) -> Option<&RuntimeError> {
        match self {
            Signal::Error(failure) => Some(&failure.error),
            _ => None,
        }
    }
}

impl From<RuntimeError> for Signal {
    fn from(error: RuntimeError) -> Self {
        Signal::Error(Box::new(Failure {
            error,
            file: String::new(),
            pos: Position::default(),
        }))
    }
}

pub type EvalResult = Result<NodeRef, Signal>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_renders_file_and_position() {
        let failure = Failure {
            error: RuntimeError::undefined("function", "foo"),
            file: "main.shape".into(),
            pos: Position::new(3, 7, 20),
        };
        assert_eq!(
            failure.to_string(),
            "Error in 'main.shape' @ (3, 7): undefined function 'foo'"
        );
    }

    #[test]
    fn runtime_errors_convert_to_unlocated_signals() {
        let signal = Signal::from(RuntimeError::mismatch("x"));
        match signal {
            Signal::Error(failure) => assert!(!failure.is_located()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
