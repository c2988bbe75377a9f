//! Tree-walking evaluator.
//!
//! `eval` returns `Result<NodeRef, Signal>`: control flow (`return`,
//! `break`, `continue`, `exit`) and errors travel as signals and are
//! handled by the loop, call and `try` sites that care about them.
//!
//! Calls push two scopes (closure, then parameters) on top of the caller's
//! scope stack, so a name missing from both still resolves against the
//! caller's bindings.

mod builtins;
mod calls;
mod declare;
mod imports;
mod objects;
mod ops;

use crate::config::Config;
use crate::runtime::{
    copy::copy_node,
    environment::Environment,
    error::{EvalResult, Failure, RuntimeError, Signal},
    matcher::{deref, TypeContext},
    modules::{Host, ModuleRegistry},
    node::{ForNode, IfBlockNode, NodeKind, NodeRef, TryCatchNode, WhileNode},
    prelude,
};
use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

const STACK_RED_ZONE: usize = 100 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;

/// Where `print` and `println` write.
#[derive(Clone, Debug, Default)]
pub enum Output {
    #[default]
    Stdout,
    Buffer(Rc<RefCell<String>>),
}

impl Output {
    /// An in-memory sink and a handle to read what was written.
    pub fn buffer() -> (Self, Rc<RefCell<String>>) {
        let buffer = Rc::new(RefCell::new(String::new()));
        (Output::Buffer(buffer.clone()), buffer)
    }

    pub fn write(&self, text: &str) {
        match self {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Output::Buffer(buffer) => buffer.borrow_mut().push_str(text),
        }
    }
}

pub struct Interpreter {
    env: Environment,
    config: Config,
    /// File name used in error locations.
    file: String,
    base_dir: PathBuf,
    modules: ModuleRegistry,
    output: Output,
    /// Canonical paths of the imports currently being evaluated.
    import_stack: Vec<PathBuf>,
    /// Non-zero while evaluating a type expression; unknown names there
    /// become forward declarations.
    type_depth: usize,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        let mut env = Environment::new();
        prelude::install(&mut env, &config.args);
        Self {
            env,
            file: config.file_name(),
            base_dir: config.base_dir(),
            config,
            modules: ModuleRegistry::with_builtins(),
            output: Output::Stdout,
            import_stack: Vec::new(),
            type_depth: 0,
        }
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn modules_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.modules
    }

    pub fn define_global(&mut self, name: &str, value: NodeRef) {
        self.env.define_global(name, value);
    }

    pub fn global(&self, name: &str) -> Option<NodeRef> {
        self.env.globals().get(name).cloned()
    }

    /// Runs top-level statements and returns the process exit code.
    pub fn run(&mut self, program: &[NodeRef]) -> Result<i32, Failure> {
        for statement in program {
            match self.eval(statement) {
                Ok(_) | Err(Signal::Break) | Err(Signal::Continue) => {}
                Err(Signal::Return(_)) => break,
                Err(Signal::Exit(code)) => return Ok(code),
                Err(Signal::Error(mut failure)) => {
                    if failure.file.is_empty() {
                        failure.file = self.file.clone();
                    }
                    return Err(*failure);
                }
            }
        }
        Ok(0)
    }

    pub fn eval(&mut self, node: &NodeRef) -> EvalResult {
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.eval_node(node));
        result.map_err(|signal| self.locate(signal, node))
    }

    /// Attaches the innermost known source position to an error.
    fn locate(&self, signal: Signal, node: &NodeRef) -> Signal {
        match signal {
            Signal::Error(mut failure) if !failure.is_located() => {
                let pos = node.pos();
                if pos.line != 0 {
                    failure.pos = pos;
                    failure.file = self.file.clone();
                }
                Signal::Error(failure)
            }
            other => other,
        }
    }

    fn eval_node(&mut self, node: &NodeRef) -> EvalResult {
        let (kind, pos) = {
            let inner = node.borrow();
            (inner.kind.clone(), inner.pos)
        };
        match kind {
            NodeKind::Number(_) | NodeKind::String(_) | NodeKind::Boolean(_) => {
                Ok(NodeRef::from_kind(kind).with_pos(pos))
            }
            NodeKind::Id(name) => self.eval_identifier(&name),
            NodeKind::Op(op) => self.eval_op(&op),
            NodeKind::List(list) => {
                let mut elements = Vec::with_capacity(list.elements.len());
                for element in &list.elements {
                    let value = self.eval(element)?;
                    elements.push(detach(&value));
                }
                Ok(NodeRef::list(elements))
            }
            NodeKind::Object(object) => self.eval_object(&object),
            NodeKind::Paren(inner) => self.eval(&inner),
            NodeKind::FuncCall(call) => self.eval_call(&call),
            NodeKind::Func(func) => self.eval_function(node, &func),
            NodeKind::Accessor(accessor) => self.eval_accessor(&accessor),
            NodeKind::VariableDecl(decl) => self.eval_declaration(&decl, false),
            NodeKind::ConstantDecl(decl) => self.eval_declaration(&decl, true),
            NodeKind::TypeDecl(decl) => self.eval_type_decl(&decl),
            NodeKind::EnumDecl(decl) => self.eval_enum_decl(&decl),
            NodeKind::Block(statements) => self.eval_scoped_block(&statements),
            NodeKind::ForLoop(node) => self.eval_for(&node),
            NodeKind::WhileLoop(node) => self.eval_while(&node),
            NodeKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(&expr)?,
                    None => NodeRef::no_value(),
                };
                Err(Signal::Return(value))
            }
            NodeKind::Break => Err(Signal::Break),
            NodeKind::Continue => Err(Signal::Continue),
            NodeKind::Import(import) => self.eval_import(&import),
            NodeKind::IfBlock(block) => self.eval_if(&block),
            NodeKind::IfStatement(branch) => self.eval_if(&IfBlockNode {
                branches: vec![NodeRef::from_kind(NodeKind::IfStatement(branch))],
                otherwise: None,
            }),
            NodeKind::TryCatch(node) => self.eval_try(&node),
            NodeKind::PipeList(_)
            | NodeKind::Lib(_)
            | NodeKind::Pointer(_)
            | NodeKind::None
            | NodeKind::Any
            | NodeKind::NoValue
            | NodeKind::Error(_) => Ok(node.clone()),
        }
    }

    fn eval_identifier(&mut self, name: &str) -> EvalResult {
        if let Some(value) = self.env.get(name) {
            return Ok(value);
        }
        if self.type_depth > 0 {
            return Ok(declare::forward_decl(name));
        }
        Err(RuntimeError::undefined("variable", name).into())
    }

    fn eval_block(&mut self, statements: &[NodeRef]) -> EvalResult {
        let mut last = NodeRef::no_value();
        for statement in statements {
            last = self.eval(statement)?;
        }
        Ok(last)
    }

    fn eval_scoped_block(&mut self, statements: &[NodeRef]) -> EvalResult {
        let depth = self.env.depth();
        self.env.push_scope();
        let result = self.eval_block(statements);
        self.env.truncate(depth);
        result
    }

    /// Evaluates a body in the current scope: a block's statements, or a
    /// single expression.
    fn eval_body(&mut self, body: &NodeRef) -> EvalResult {
        let statements = match &body.borrow().kind {
            NodeKind::Block(statements) => Some(statements.clone()),
            _ => None,
        };
        match statements {
            Some(statements) => self.eval_block(&statements),
            None => self.eval(body),
        }
    }

    fn eval_if(&mut self, block: &IfBlockNode) -> EvalResult {
        for branch in &block.branches {
            let branch = match &branch.borrow().kind {
                NodeKind::IfStatement(branch) => branch.clone(),
                _ => continue,
            };
            // Casts made by `is` in the condition stay inside this scope.
            let depth = self.env.depth();
            self.env.push_scope();
            let outcome = self.eval(&branch.cond).and_then(|cond| {
                if truthy(&cond) {
                    self.eval_body(&branch.body).map(Some)
                } else {
                    Ok(None)
                }
            });
            self.env.truncate(depth);
            if let Some(value) = outcome? {
                return Ok(value);
            }
        }
        match &block.otherwise {
            Some(body) => {
                let depth = self.env.depth();
                self.env.push_scope();
                let result = self.eval_body(body);
                self.env.truncate(depth);
                result
            }
            None => Ok(NodeRef::no_value()),
        }
    }

    fn eval_while(&mut self, node: &WhileNode) -> EvalResult {
        loop {
            let cond = self.eval(&node.cond)?;
            if !truthy(&cond) {
                break;
            }
            let depth = self.env.depth();
            self.env.push_scope();
            let result = self.eval_body(&node.body);
            self.env.truncate(depth);
            match result {
                Ok(_) | Err(Signal::Continue) => {}
                Err(Signal::Break) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(NodeRef::no_value())
    }

    fn eval_for(&mut self, node: &ForNode) -> EvalResult {
        let iterable = deref(&self.eval(&node.iterable)?);
        let items: Vec<NodeRef> = match &iterable.borrow().kind {
            NodeKind::List(list) => list.elements.clone(),
            NodeKind::String(text) => text
                .chars()
                .map(|ch| NodeRef::string(ch.to_string()))
                .collect(),
            NodeKind::Object(_) => {
                return Err(RuntimeError::unsupported(
                    "cannot iterate over an object; use keys(), values() or items()",
                )
                .into())
            }
            other => {
                return Err(RuntimeError::mismatch(format!(
                    "cannot iterate over {}",
                    other.name()
                ))
                .into())
            }
        };

        for (index, item) in items.into_iter().enumerate() {
            let depth = self.env.depth();
            self.env.push_scope();
            self.env.define(&node.item, item);
            if let Some(name) = &node.index {
                self.env.define(name, NodeRef::number(index as f64));
            }
            if let Some(name) = &node.list {
                self.env.define(name, iterable.clone());
            }
            let result = self.eval_body(&node.body);
            self.env.truncate(depth);
            match result {
                Ok(_) | Err(Signal::Continue) => {}
                Err(Signal::Break) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(NodeRef::no_value())
    }

    fn eval_try(&mut self, node: &TryCatchNode) -> EvalResult {
        let depth = self.env.depth();
        match self.eval(&node.body) {
            Err(Signal::Error(failure)) => {
                self.env.truncate(depth);
                tracing::debug!(error = %failure.error, "caught error");
                self.env.push_scope();
                if let Some(binding) = &node.binding {
                    self.env
                        .define(binding, NodeRef::string(failure.error.to_string()));
                }
                let result = self.eval_body(&node.handler);
                self.env.truncate(depth);
                result
            }
            other => other,
        }
    }

    /// Global bindings the script defined, prelude excluded, in a stable order.
    pub(crate) fn user_globals(&self) -> Vec<(String, NodeRef)> {
        let mut globals: Vec<(String, NodeRef)> = self
            .env
            .globals()
            .iter()
            .filter(|(name, _)| !prelude::is_prelude(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        globals.sort_by(|a, b| a.0.cmp(&b.0));
        globals
    }
}

/// `false` and `None` are falsy; everything else is truthy.
pub(crate) fn truthy(node: &NodeRef) -> bool {
    let node = deref(node);
    let inner = node.borrow();
    match inner.kind {
        NodeKind::Boolean(value) => value,
        NodeKind::None | NodeKind::NoValue => false,
        _ => true,
    }
}

/// Value stored into a container or binding: a fresh copy, except for
/// functions and types which are shared.
pub(crate) fn detach(value: &NodeRef) -> NodeRef {
    if value.is_func() || value.is_type() {
        value.clone()
    } else {
        copy_node(value)
    }
}

/// Renders a signal that escaped a native call or a worker thread.
pub(crate) fn describe_signal(signal: Signal) -> String {
    match signal {
        Signal::Error(failure) if failure.is_located() => failure.to_string(),
        Signal::Error(failure) => failure.error.to_string(),
        Signal::Exit(code) => format!("exit({code}) called inside a task"),
        Signal::Return(_) | Signal::Break | Signal::Continue => {
            "control flow escaped its function".to_string()
        }
    }
}

impl TypeContext for Interpreter {
    fn resolve_decl(&mut self, name: &str) -> Option<NodeRef> {
        self.env
            .get(name)
            .filter(|node| !node.borrow().ty.is_decl)
    }

    fn call_refinement(&mut self, predicate: &NodeRef, value: &NodeRef) -> Result<NodeRef, Signal> {
        self.invoke(predicate, predicate, vec![detach(value)], None)
    }
}

impl Host for Interpreter {
    fn argv(&self) -> Vec<String> {
        self.config.args.clone()
    }

    fn call(&mut self, func: &NodeRef, args: Vec<NodeRef>) -> Result<NodeRef, String> {
        self.call_function(func, args, None)
            .map_err(describe_signal)
    }

    fn write(&mut self, text: &str) {
        self.output.write(text);
    }

    fn globals(&self) -> Vec<(String, NodeRef)> {
        self.user_globals()
    }
}
