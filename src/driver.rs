//! Source to exit code: parse, typecheck, evaluate.

use crate::{
    config::Config,
    diagnostics,
    language::{errors::SyntaxErrors, parser::parse_program, typecheck},
    runtime::{error::Failure, Interpreter, Output},
};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("{} syntax error(s) in {}", .errors.errors.len(), .path.display())]
    Syntax {
        path: PathBuf,
        text: String,
        errors: SyntaxErrors,
    },
    #[error("{} type error(s) in {}", .errors.len(), .path.display())]
    Type {
        path: PathBuf,
        text: String,
        errors: Vec<typecheck::TypeError>,
    },
    #[error(transparent)]
    Runtime(#[from] Failure),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShapeError {
    /// Prints the error to stderr: miette reports for syntax and type
    /// errors, one line for everything else.
    pub fn report(&self) {
        match self {
            ShapeError::Syntax { path, text, errors } => {
                diagnostics::emit_syntax_errors(path, text, errors)
            }
            ShapeError::Type { path, text, errors } => {
                diagnostics::emit_type_errors(path, text, errors)
            }
            ShapeError::Runtime(failure) => diagnostics::report_runtime_error(failure),
            ShapeError::Io { path, source } => diagnostics::report_io_error(path, source),
        }
    }
}

/// Runs `source` as the file named by `config.path` and returns the exit
/// code the program asked for.
pub fn run_source(source: &str, config: Config, output: Output) -> Result<i32, ShapeError> {
    let program = parse_program(source).map_err(|errors| ShapeError::Syntax {
        path: config.path.clone(),
        text: source.to_string(),
        errors,
    })?;
    if config.typecheck {
        typecheck::check_program(&program, &config).map_err(|errors| ShapeError::Type {
            path: config.path.clone(),
            text: source.to_string(),
            errors,
        })?;
    }
    tracing::debug!(file = %config.path.display(), statements = program.len(), "running");
    let mut interpreter = Interpreter::new(config).with_output(output);
    Ok(interpreter.run(&program)?)
}

pub fn run_file(config: Config) -> Result<i32, ShapeError> {
    let source = fs::read_to_string(&config.path).map_err(|source| ShapeError::Io {
        path: config.path.clone(),
        source,
    })?;
    run_source(&source, config, Output::Stdout)
}
