//! Values, scopes and the tree-walking evaluator.

pub mod async_runtime;
pub mod copy;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod matcher;
pub mod modules;
pub mod node;
pub mod prelude;
pub mod printer;
pub mod snapshot;

pub use interpreter::{Interpreter, Output};
