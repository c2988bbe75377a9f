//! Call-out boundary for native modules.
//!
//! A module is addressed by name through `load_lib(name)`; the script then
//! calls `lib.function(args...)`. Failures come back as `Error` nodes and are
//! turned into runtime errors by the interpreter.

pub mod math;
pub mod sys;
pub mod threading;

use crate::runtime::{node::NodeRef, printer::printable};
use std::collections::{HashMap, HashSet};

/// The slice of the interpreter a native module may use.
pub trait Host {
    fn argv(&self) -> Vec<String>;

    /// Calls a script function, reporting failures as plain messages.
    fn call(&mut self, func: &NodeRef, args: Vec<NodeRef>) -> Result<NodeRef, String>;

    fn write(&mut self, text: &str);

    /// User-defined global bindings (prelude names excluded).
    fn globals(&self) -> Vec<(String, NodeRef)>;
}

pub trait NativeModule {
    fn name(&self) -> &str;

    /// Runs once, the first time the module is requested.
    fn load(&mut self, _host: &mut dyn Host) {}

    fn call(&mut self, host: &mut dyn Host, function: &str, args: &[NodeRef]) -> NodeRef;
}

#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Box<dyn NativeModule>>,
    loaded: HashSet<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `math`, `sys` and `threading` modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(math::MathModule));
        registry.register(Box::new(sys::SysModule));
        registry.register(Box::new(threading::ThreadingModule));
        registry
    }

    pub fn register(&mut self, module: Box<dyn NativeModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Removes a module for the duration of a call so the host can be
    /// borrowed mutably alongside it.
    pub fn take(&mut self, name: &str) -> Option<Box<dyn NativeModule>> {
        self.modules.remove(name)
    }

    pub fn restore(&mut self, module: Box<dyn NativeModule>) {
        self.register(module);
    }

    /// Returns `true` the first time it is called for `name`.
    pub fn mark_loaded(&mut self, name: &str) -> bool {
        self.loaded.insert(name.to_string())
    }
}

pub(crate) fn number_arg(args: &[NodeRef], index: usize, function: &str) -> Result<f64, NodeRef> {
    args.get(index)
        .and_then(NodeRef::as_number)
        .ok_or_else(|| {
            let got = args
                .get(index)
                .map(printable)
                .unwrap_or_else(|| "nothing".to_string());
            NodeRef::error(format!(
                "{function} expects a number as argument {}, got {got}",
                index + 1
            ))
        })
}

pub(crate) fn string_arg(args: &[NodeRef], index: usize, function: &str) -> Result<String, NodeRef> {
    args.get(index)
        .and_then(NodeRef::as_string)
        .ok_or_else(|| {
            NodeRef::error(format!(
                "{function} expects a string as argument {}",
                index + 1
            ))
        })
}

pub(crate) fn unknown_function(module: &str, function: &str) -> NodeRef {
    NodeRef::error(format!("module '{module}' has no function '{function}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_its_modules() {
        let mut registry = ModuleRegistry::with_builtins();
        assert!(registry.contains("math"));
        assert!(registry.contains("sys"));
        assert!(registry.contains("threading"));
        assert!(registry.mark_loaded("math"));
        assert!(!registry.mark_loaded("math"));

        let math = registry.take("math").expect("math");
        assert!(!registry.contains("math"));
        registry.restore(math);
        assert!(registry.contains("math"));
    }

    #[test]
    fn argument_helpers_report_errors_as_nodes() {
        let args = vec![NodeRef::string("x")];
        let err = number_arg(&args, 0, "sqrt").expect_err("not a number");
        assert!(err.is_kind(|kind| matches!(kind, crate::runtime::node::NodeKind::Error(_))));
    }
}
