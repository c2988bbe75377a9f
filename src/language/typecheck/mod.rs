//! Static pass run before evaluation. It walks the same tree the evaluator
//! walks, but over type descriptors, and reports only errors that are
//! certain to happen at runtime.

use crate::language::span::{Position, Span};
use crate::runtime::{
    matcher::to_type,
    node::{NodeKind, NodeRef},
    prelude,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Clone, Debug, Error)]
#[error("Type error in '{}' @ {pos}: {message}", .path.display())]
pub struct TypeError {
    pub path: PathBuf,
    pub pos: Position,
    pub span: Span,
    pub message: String,
    pub label: String,
    pub help: Option<String>,
}

impl TypeError {
    pub fn new(path: &Path, pos: Position, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            path: path.to_path_buf(),
            pos,
            span: Span::new(pos.offset, pos.offset + 1),
            label: message.clone(),
            message,
            help: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// One dispatch candidate of a function binding.
#[derive(Clone)]
struct Signature {
    /// Parameter type (when declared) and whether it has a default.
    params: Vec<(Option<NodeRef>, bool)>,
    /// Declared return type, or the widened inferred one.
    returns: Option<NodeRef>,
}

impl Signature {
    fn accepts_count(&self, count: usize) -> bool {
        let required = self
            .params
            .iter()
            .filter(|(_, has_default)| !has_default)
            .count();
        count >= required && count <= self.params.len()
    }
}

#[derive(Clone)]
struct Symbol {
    /// Type of the value the name holds; `Any` when it may change.
    value: NodeRef,
    /// Descriptor used when the name appears in type position.
    as_type: Option<NodeRef>,
    declared: Option<NodeRef>,
    constant: bool,
    signatures: Vec<Signature>,
}

impl Symbol {
    fn variable(declared: Option<NodeRef>) -> Self {
        Self {
            value: declared.clone().unwrap_or_else(NodeRef::any),
            as_type: None,
            declared,
            constant: false,
            signatures: Vec::new(),
        }
    }

    fn constant(value: NodeRef, declared: Option<NodeRef>) -> Self {
        Self {
            value: declared.clone().unwrap_or(value),
            as_type: None,
            declared,
            constant: true,
            signatures: Vec::new(),
        }
    }

    fn type_binding(ty: NodeRef) -> Self {
        Self {
            value: NodeRef::any(),
            as_type: Some(ty),
            declared: None,
            constant: false,
            signatures: Vec::new(),
        }
    }
}

fn none_type() -> NodeRef {
    to_type(&NodeRef::none())
}

fn prelude_scope() -> HashMap<String, Symbol> {
    let mut scope = HashMap::new();
    scope.insert("Number".into(), Symbol::type_binding(prelude::number_type()));
    scope.insert("String".into(), Symbol::type_binding(prelude::string_type()));
    scope.insert("Boolean".into(), Symbol::type_binding(prelude::boolean_type()));
    scope.insert("Object".into(), Symbol::type_binding(prelude::object_type()));
    scope.insert("List".into(), Symbol::type_binding(prelude::list_type()));
    scope.insert("Function".into(), Symbol::type_binding(prelude::function_type()));
    scope.insert("Any".into(), Symbol::type_binding(NodeRef::any()));
    let mut none = Symbol::type_binding(none_type());
    none.value = none_type();
    scope.insert("None".into(), none);
    let mut argv = Symbol::variable(None);
    argv.value = prelude::list_type();
    scope.insert("argv".into(), argv);
    scope
}

fn is_number(ty: &NodeRef) -> bool {
    ty.is_kind(|kind| matches!(kind, NodeKind::Number(_)))
}

fn is_string(ty: &NodeRef) -> bool {
    ty.is_kind(|kind| matches!(kind, NodeKind::String(_)))
}

mod checker;

pub use checker::check_program;
