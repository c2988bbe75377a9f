//! `import`, `eval` and native libraries.

use super::Interpreter;
use crate::config::{Config, SOURCE_EXTENSION};
use crate::language::{parser::parse_program, typecheck};
use crate::runtime::{
    error::{EvalResult, RuntimeError, Signal},
    matcher::deref,
    node::{ImportNode, LibNode, NodeKind, NodeRef},
};
use std::fs;
use std::path::{Path, PathBuf};

impl Interpreter {
    /// `import "path" [as name]`: binds the module object to the alias, or
    /// to the file stem when there is none.
    pub(super) fn eval_import(&mut self, import: &ImportNode) -> EvalResult {
        let module = self.import_module(&import.path)?;
        let name = match &import.alias {
            Some(alias) => alias.clone(),
            None => Path::new(&import.path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .ok_or_else(|| RuntimeError::Import {
                    path: import.path.clone(),
                    message: "cannot derive a module name".to_string(),
                })?,
        };
        self.env.define(&name, module.clone());
        Ok(module)
    }

    /// Runs another script in its own interpreter and returns its globals
    /// as an object.
    pub(super) fn import_module(&mut self, path: &str) -> EvalResult {
        let resolved = self.resolve_import(path)?;
        if self.import_stack.contains(&resolved) {
            return Err(import_error(path, "circular import"));
        }
        let source = fs::read_to_string(&resolved)
            .map_err(|error| import_error(path, error.to_string()))?;
        let program = parse_program(&source)
            .map_err(|errors| import_error(path, errors.first_message()))?;
        let config = Config {
            path: resolved.clone(),
            ..self.config.clone()
        };
        if config.typecheck {
            if let Err(errors) = typecheck::check_program(&program, &config) {
                let message = errors
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "type error".to_string());
                return Err(import_error(path, message));
            }
        }
        tracing::debug!(module = %resolved.display(), "importing module");

        let mut child = Interpreter::new(config).with_output(self.output.clone());
        child.import_stack = self.import_stack.clone();
        child.import_stack.push(resolved);
        match child.run(&program) {
            Ok(0) => {}
            Ok(code) => return Err(Signal::Exit(code)),
            Err(failure) => return Err(import_error(path, failure.to_string())),
        }
        Ok(NodeRef::object(child.user_globals()))
    }

    fn resolve_import(&self, path: &str) -> Result<PathBuf, Signal> {
        let requested = PathBuf::from(path);
        let requested = if requested.extension().is_none() {
            requested.with_extension(SOURCE_EXTENSION)
        } else {
            requested
        };
        let candidates = if requested.is_absolute() {
            vec![requested]
        } else {
            std::iter::once(&self.base_dir)
                .chain(self.config.search_paths.iter())
                .map(|dir| dir.join(&requested))
                .collect()
        };
        candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .map(|found| found.canonicalize().unwrap_or_else(|_| found.clone()))
            .ok_or_else(|| import_error(path, "file not found"))
    }

    /// `eval(code)`: runs `code` in the current scope and returns the value
    /// of its last statement.
    pub(super) fn eval_source(&mut self, code: &str) -> EvalResult {
        let program = parse_program(code).map_err(|errors| {
            Signal::from(RuntimeError::Eval {
                message: errors.first_message(),
            })
        })?;
        let mut last = NodeRef::no_value();
        for statement in &program {
            last = self.eval(statement)?;
        }
        Ok(last)
    }

    /// `load_lib(name)`: the first load runs the module's setup.
    pub(super) fn load_library(&mut self, name: &str) -> EvalResult {
        if !self.modules.contains(name) {
            return Err(RuntimeError::undefined("library", name).into());
        }
        if self.modules.mark_loaded(name) {
            if let Some(mut module) = self.modules.take(name) {
                module.load(self);
                self.modules.restore(module);
            }
        }
        Ok(NodeRef::from_kind(NodeKind::Lib(LibNode {
            name: name.to_string(),
        })))
    }

    /// The module is taken out of the registry for the call so it can
    /// reenter the interpreter through `Host`.
    pub(super) fn call_native(
        &mut self,
        library: &str,
        function: &str,
        args: Vec<NodeRef>,
    ) -> EvalResult {
        let mut module = self
            .modules
            .take(library)
            .ok_or_else(|| RuntimeError::undefined("library", library))?;
        let args: Vec<NodeRef> = args.iter().map(deref).collect();
        tracing::trace!(library, function, args = args.len(), "native call");
        let result = module.call(self, function, &args);
        self.modules.restore(module);

        let message = match &result.borrow().kind {
            NodeKind::Error(message) => Some(message.clone()),
            _ => None,
        };
        match message {
            Some(message) => Err(RuntimeError::Native {
                module: library.to_string(),
                message,
            }
            .into()),
            None => Ok(result),
        }
    }
}

fn import_error(path: &str, message: impl Into<String>) -> Signal {
    RuntimeError::Import {
        path: path.to_string(),
        message: message.into(),
    }
    .into()
}
