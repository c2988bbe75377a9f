use super::*;
use crate::config::Config;
use crate::runtime::{
    error::Signal,
    matcher::{match_types, union_of, TypeContext},
    node::{
        DeclNode, EnumDeclNode, FuncCallNode, FuncNode, IfBlockNode, ListNode, Node, ObjectNode,
        OpNode, Operator, Param, TypeBody, TypeDeclNode,
    },
    printer::printable,
};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;

/// Checks a parsed program and writes inferred return types back onto its
/// function nodes.
pub fn check_program(program: &[NodeRef], config: &Config) -> Result<(), Vec<TypeError>> {
    let mut checker = Checker {
        path: config.path.clone(),
        scopes: vec![prelude_scope(), HashMap::new()],
        errors: Vec::new(),
        returns: Vec::new(),
        try_depth: 0,
    };
    for statement in program {
        checker.infer(statement);
    }
    tracing::debug!(
        file = %config.path.display(),
        errors = checker.errors.len(),
        "typecheck finished"
    );
    if checker.errors.is_empty() {
        Ok(())
    } else {
        Err(checker.errors)
    }
}

struct Checker {
    path: PathBuf,
    scopes: Vec<HashMap<String, Symbol>>,
    errors: Vec<TypeError>,
    /// Types of the `return`s seen in each function body being inferred.
    returns: Vec<Vec<NodeRef>>,
    /// Errors inside `try` may be caught, so they are not reported.
    try_depth: usize,
}

impl Checker {
    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    fn define(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), symbol);
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 2 {
            self.scopes.pop();
        }
    }

    fn report(&mut self, error: TypeError) {
        if self.try_depth == 0 {
            self.errors.push(error);
        }
    }

    fn error_at(&self, node: &NodeRef, message: impl Into<String>) -> TypeError {
        TypeError::new(&self.path, node.pos(), message)
    }

    /// Top-level statements run in order, so the candidates known there are
    /// exactly the ones the evaluator will see.
    fn at_top_level(&self) -> bool {
        self.returns.is_empty()
    }

    /// A union value may hold any of its members at runtime, so it conforms
    /// when one member does.
    fn conforms(&mut self, ty: &NodeRef, value: &NodeRef) -> bool {
        match union_members(value) {
            Some(members) => members.iter().any(|member| self.conforms(ty, member)),
            None => match_types(self, ty, value).unwrap_or(true),
        }
    }

    fn union(&mut self, members: Vec<NodeRef>) -> NodeRef {
        union_of(self, members).unwrap_or_else(|_| NodeRef::any())
    }

    fn infer(&mut self, node: &NodeRef) -> NodeRef {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.infer_node(node))
    }

    fn infer_node(&mut self, node: &NodeRef) -> NodeRef {
        let kind = node.borrow().kind.clone();
        match kind {
            // Literals keep their value so enum and literal types can accept them.
            NodeKind::Number(_) | NodeKind::String(_) | NodeKind::Boolean(_) => {
                to_type(&NodeRef::from_kind(kind))
            }
            NodeKind::Id(name) => self
                .lookup(&name)
                .map(|symbol| symbol.value.clone())
                .unwrap_or_else(NodeRef::any),
            NodeKind::Op(op) => self.infer_op(node, &op),
            NodeKind::List(list) => {
                for element in &list.elements {
                    self.infer(element);
                }
                prelude::list_type()
            }
            NodeKind::Object(object) => self.infer_object(&object),
            NodeKind::Paren(inner) => self.infer(&inner),
            NodeKind::FuncCall(call) => self.infer_call(node, &call),
            NodeKind::Func(func) => self.infer_function(&func, node),
            NodeKind::Accessor(accessor) => {
                self.infer(&accessor.target);
                self.infer(&accessor.index);
                NodeRef::any()
            }
            NodeKind::VariableDecl(decl) => self.declare(node, &decl, false),
            NodeKind::ConstantDecl(decl) => self.declare(node, &decl, true),
            NodeKind::TypeDecl(decl) => {
                self.declare_type(&decl);
                NodeRef::any()
            }
            NodeKind::EnumDecl(decl) => {
                self.declare_enum(&decl);
                NodeRef::any()
            }
            NodeKind::Block(statements) => {
                self.push_scope();
                let result = self.infer_block(&statements);
                self.pop_scope();
                result
            }
            // Loop bodies are checked exactly once.
            NodeKind::ForLoop(node) => {
                self.infer(&node.iterable);
                self.push_scope();
                self.define(&node.item, Symbol::variable(None));
                if let Some(index) = &node.index {
                    let mut symbol = Symbol::variable(None);
                    symbol.value = prelude::number_type();
                    self.define(index, symbol);
                }
                if let Some(list) = &node.list {
                    self.define(list, Symbol::variable(None));
                }
                self.infer_body(&node.body);
                self.pop_scope();
                none_type()
            }
            NodeKind::WhileLoop(node) => {
                self.infer(&node.cond);
                self.push_scope();
                self.infer_body(&node.body);
                self.pop_scope();
                none_type()
            }
            NodeKind::Return(value) => {
                let ty = match value {
                    Some(expr) => self.infer(&expr),
                    None => none_type(),
                };
                if let Some(returns) = self.returns.last_mut() {
                    returns.push(ty.clone());
                }
                ty
            }
            NodeKind::Break | NodeKind::Continue => none_type(),
            NodeKind::Import(import) => {
                let name = import.alias.clone().or_else(|| {
                    Path::new(&import.path)
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                });
                if let Some(name) = name {
                    self.define(&name, Symbol::variable(None));
                }
                NodeRef::any()
            }
            NodeKind::IfBlock(block) => self.infer_if(&block),
            NodeKind::IfStatement(_) => self.infer_if(&IfBlockNode {
                branches: vec![node.clone()],
                otherwise: None,
            }),
            NodeKind::TryCatch(node) => {
                self.try_depth += 1;
                self.infer(&node.body);
                self.try_depth -= 1;
                self.push_scope();
                if let Some(binding) = &node.binding {
                    let mut symbol = Symbol::variable(None);
                    symbol.value = prelude::string_type();
                    self.define(binding, symbol);
                }
                self.infer_body(&node.handler);
                self.pop_scope();
                NodeRef::any()
            }
            NodeKind::PipeList(_)
            | NodeKind::Lib(_)
            | NodeKind::Pointer(_)
            | NodeKind::None
            | NodeKind::Any
            | NodeKind::NoValue
            | NodeKind::Error(_) => NodeRef::any(),
        }
    }

    fn infer_block(&mut self, statements: &[NodeRef]) -> NodeRef {
        let mut last = none_type();
        for statement in statements {
            last = self.infer(statement);
        }
        last
    }

    fn infer_body(&mut self, body: &NodeRef) -> NodeRef {
        let statements = match &body.borrow().kind {
            NodeKind::Block(statements) => Some(statements.clone()),
            _ => None,
        };
        match statements {
            Some(statements) => self.infer_block(&statements),
            None => self.infer(body),
        }
    }

    /// Union of every branch, plus `None` when no `else` exists.
    fn infer_if(&mut self, block: &IfBlockNode) -> NodeRef {
        let mut arms = Vec::with_capacity(block.branches.len() + 1);
        for branch in &block.branches {
            let branch = match &branch.borrow().kind {
                NodeKind::IfStatement(branch) => branch.clone(),
                _ => continue,
            };
            self.push_scope();
            self.infer(&branch.cond);
            arms.push(self.infer_body(&branch.body));
            self.pop_scope();
        }
        match &block.otherwise {
            Some(body) => {
                self.push_scope();
                arms.push(self.infer_body(body));
                self.pop_scope();
            }
            None => arms.push(none_type()),
        }
        self.union(arms)
    }

    fn infer_op(&mut self, node: &NodeRef, op: &OpNode) -> NodeRef {
        let left = op.left.clone();
        match op.op {
            Operator::Assign => match left {
                Some(target) => self.check_assign(node, &target, &op.right),
                None => NodeRef::any(),
            },
            Operator::And | Operator::Or | Operator::Ref => {
                if let Some(left) = &left {
                    self.infer(left);
                }
                self.infer(&op.right);
                NodeRef::any()
            }
            Operator::Not => {
                self.infer(&op.right);
                prelude::boolean_type()
            }
            Operator::Neg => {
                let operand = self.infer(&op.right);
                if is_number(&operand) {
                    prelude::number_type()
                } else {
                    NodeRef::any()
                }
            }
            Operator::Dot => {
                let target = match &left {
                    Some(left) => self.infer(left),
                    None => NodeRef::any(),
                };
                match op.right.as_id() {
                    Some(name) => member_type(&target, &name),
                    None => NodeRef::any(),
                }
            }
            Operator::Meta => {
                if let Some(left) = &left {
                    self.infer(left);
                }
                let args = match &op.right.borrow().kind {
                    NodeKind::FuncCall(call) => call.args.clone(),
                    _ => Vec::new(),
                };
                for arg in &args {
                    self.infer(arg);
                }
                NodeRef::any()
            }
            Operator::Is => {
                if let Some(left) = &left {
                    self.infer(left);
                    // A cast may retype the variable; stop trusting what we knew.
                    if let Some(name) = left.as_id() {
                        if let Some(symbol) = self.lookup_mut(&name) {
                            symbol.value = NodeRef::any();
                            symbol.declared = None;
                        }
                    }
                }
                self.resolve_type(&op.right);
                prelude::boolean_type()
            }
            Operator::Union => NodeRef::any(),
            Operator::Range => {
                if let Some(left) = &left {
                    self.infer(left);
                }
                self.infer(&op.right);
                prelude::list_type()
            }
            binary => {
                let lhs = match &left {
                    Some(left) => self.infer(left),
                    None => NodeRef::any(),
                };
                let rhs = self.infer(&op.right);
                binary_type(binary, &lhs, &rhs)
            }
        }
    }

    fn check_assign(&mut self, node: &NodeRef, target: &NodeRef, value: &NodeRef) -> NodeRef {
        let value = self.infer(value);
        let Some(name) = target.as_id() else {
            self.infer(target);
            return NodeRef::any();
        };
        let Some(symbol) = self.lookup(&name).cloned() else {
            return NodeRef::any();
        };
        if symbol.constant {
            let error = self
                .error_at(node, format!("cannot modify constant '{name}'"))
                .with_help("declare it with `var` to allow reassignment");
            self.report(error);
        } else if let Some(declared) = &symbol.declared {
            if !self.conforms(declared, &value) {
                let error = self
                    .error_at(
                        node,
                        format!(
                            "'{name}' is declared as {} but was assigned {}",
                            printable(declared),
                            printable(&value)
                        ),
                    )
                    .with_label(format!("expected {}", printable(declared)));
                self.report(error);
            }
        }
        NodeRef::any()
    }

    fn declare(&mut self, node: &NodeRef, decl: &DeclNode, constant: bool) -> NodeRef {
        let declared = decl.ty.as_ref().map(|ty| self.resolve_type(ty));
        let value = decl.value.as_ref().map(|expr| self.infer(expr));

        if let (Some(declared), Some(value)) = (&declared, &value) {
            if !self.conforms(declared, value) {
                let error = self
                    .error_at(
                        node,
                        format!(
                            "'{}' is declared as {} but was given {}",
                            decl.name,
                            printable(declared),
                            printable(value)
                        ),
                    )
                    .with_label(format!("expected {}", printable(declared)));
                self.report(error);
            }
        }

        let signature = match (&decl.value, &value) {
            (Some(expr), Some(value)) if is_function_literal(expr) => signature_of(value),
            _ => None,
        };
        let existing = self
            .scopes
            .last()
            .and_then(|scope| scope.get(&decl.name))
            .cloned();
        if let (Some(mut existing), Some(signature)) = (existing, signature.clone()) {
            if !existing.signatures.is_empty() {
                existing.signatures.push(signature);
                self.define(&decl.name, existing);
                return value.unwrap_or_else(NodeRef::any);
            }
        }

        let mut symbol = if constant {
            Symbol::constant(value.clone().unwrap_or_else(NodeRef::any), declared)
        } else {
            Symbol::variable(declared)
        };
        if constant {
            symbol.signatures.extend(signature);
        }
        self.define(&decl.name, symbol);
        value.unwrap_or_else(none_type)
    }

    fn infer_object(&mut self, object: &ObjectNode) -> NodeRef {
        for (_, value) in object.entries() {
            self.infer(value);
        }
        let Some(instance_of) = &object.instance_of else {
            return prelude::object_type();
        };
        let ty = self.resolve_type(instance_of);
        let named = ty.is_kind(|kind| matches!(kind, NodeKind::Object(_)))
            && !ty.type_name().is_empty()
            && !ty.borrow().ty.is_general_type
            && !ty.borrow().ty.is_decl;
        if named {
            ty
        } else {
            NodeRef::any()
        }
    }

    fn infer_call(&mut self, node: &NodeRef, call: &FuncCallNode) -> NodeRef {
        let callee = call.callee.borrow().kind.clone();
        if let NodeKind::Id(name) = &callee {
            if prelude::is_builtin(name) {
                if name != "del" {
                    for arg in &call.args {
                        self.infer(arg);
                    }
                }
                return builtin_type(name);
            }
        }
        match &callee {
            NodeKind::Id(_) => {}
            _ => {
                self.infer(&call.callee);
            }
        }
        let args: Vec<NodeRef> = call.args.iter().map(|arg| self.infer(arg)).collect();
        let NodeKind::Id(name) = callee else {
            return NodeRef::any();
        };
        let signatures = match self.lookup(&name) {
            Some(symbol) if symbol.constant && !symbol.signatures.is_empty() => {
                symbol.signatures.clone()
            }
            _ => return NodeRef::any(),
        };
        self.dispatch(node, &name, &signatures, &args)
    }

    /// Unlike the evaluator, every plausible candidate contributes to the
    /// result type, since argument types may be only partly known.
    fn dispatch(
        &mut self,
        node: &NodeRef,
        name: &str,
        signatures: &[Signature],
        args: &[NodeRef],
    ) -> NodeRef {
        let mut plausible = Vec::new();
        for signature in signatures {
            if self.plausible(signature, args) {
                plausible.push(signature.clone());
            }
        }
        if plausible.is_empty() {
            if self.at_top_level() {
                let rendered = args.iter().map(printable).collect::<Vec<_>>().join(", ");
                let error = self
                    .error_at(
                        node,
                        format!("no matching signature for '{name}' with arguments ({rendered})"),
                    )
                    .with_label("no candidate accepts these arguments");
                self.report(error);
            }
            return NodeRef::any();
        }
        let mut returns = Vec::with_capacity(plausible.len());
        for signature in plausible {
            match signature.returns {
                Some(ty) => returns.push(ty),
                None => return NodeRef::any(),
            }
        }
        self.union(returns)
    }

    fn plausible(&mut self, signature: &Signature, args: &[NodeRef]) -> bool {
        if !signature.accepts_count(args.len()) {
            return false;
        }
        for ((ty, _), arg) in signature.params.iter().zip(args) {
            if let Some(ty) = ty {
                if !self.conforms(ty, arg) {
                    return false;
                }
            }
        }
        true
    }

    /// Checks the body once with parameters bound to their declared types
    /// and records the widened result on the syntax node.
    fn infer_function(&mut self, func: &FuncNode, syntax: &NodeRef) -> NodeRef {
        if func.is_signature {
            self.resolve_type(syntax);
            return NodeRef::any();
        }
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let ty = param.ty.as_ref().map(|ty| self.resolve_type(ty));
            let default = param.default.as_ref().map(|value| {
                self.infer(value);
                NodeRef::any()
            });
            params.push(Param {
                name: param.name.clone(),
                ty,
                default,
            });
        }
        let declared = func.return_type.as_ref().map(|ty| self.resolve_type(ty));

        self.push_scope();
        if !func.name.is_empty() {
            self.define(&func.name, Symbol::variable(None));
        }
        for param in &params {
            self.define(&param.name, Symbol::variable(param.ty.clone()));
        }
        self.returns.push(Vec::new());
        let last = match &func.body {
            Some(body) => self.infer_body(body),
            None => none_type(),
        };
        let mut results = self.returns.pop().unwrap_or_default();
        self.pop_scope();
        results.push(last);

        let return_type = match declared {
            Some(declared) => Some(declared),
            None => {
                let inferred = self.union(results);
                let widened = self.widen(&inferred);
                if widened.is_any() {
                    None
                } else {
                    tracing::debug!(
                        function = %display_name(func),
                        returns = %printable(&widened),
                        "inferred return type"
                    );
                    if let NodeKind::Func(inner) = &mut syntax.borrow_mut().kind {
                        inner.inferred_return = Some(widened.clone());
                    }
                    Some(widened)
                }
            }
        };

        let mut descriptor = Node::new(NodeKind::Func(FuncNode {
            name: func.name.clone(),
            params,
            return_type,
            ..FuncNode::default()
        }));
        descriptor.ty.is_type = true;
        NodeRef::new(descriptor)
    }

    /// Generalises an inferred type so the evaluator can enforce it:
    /// literals become their kind, refinements become `Any`, functions,
    /// lists and anonymous objects become the general kind.
    fn widen(&mut self, ty: &NodeRef) -> NodeRef {
        let node = ty.borrow().clone();
        if node.ty.is_refinement_type || node.ty.is_decl {
            return NodeRef::any();
        }
        match &node.kind {
            NodeKind::None | NodeKind::NoValue => none_type(),
            NodeKind::Number(_) => prelude::number_type(),
            NodeKind::String(_) => prelude::string_type(),
            NodeKind::Boolean(_) => prelude::boolean_type(),
            NodeKind::Func(_) => prelude::function_type(),
            NodeKind::List(list) if list.is_union => {
                let members = list.elements.iter().map(|member| self.widen(member)).collect();
                self.union(members)
            }
            NodeKind::List(_) => prelude::list_type(),
            NodeKind::Object(_) if !node.ty.type_name.is_empty() && !node.ty.is_general_type => {
                ty.clone()
            }
            NodeKind::Object(_) => prelude::object_type(),
            NodeKind::PipeList(members) => {
                let members = members.iter().map(|member| self.widen(member)).collect();
                self.union(members)
            }
            _ => NodeRef::any(),
        }
    }

    /// The descriptor an expression denotes in type position. Anything this
    /// pass cannot evaluate statically is `Any`.
    fn resolve_type(&mut self, expr: &NodeRef) -> NodeRef {
        let kind = expr.borrow().kind.clone();
        match kind {
            NodeKind::Id(name) => self
                .lookup(&name)
                .and_then(|symbol| symbol.as_type.clone())
                .unwrap_or_else(NodeRef::any),
            NodeKind::Number(_) | NodeKind::String(_) | NodeKind::Boolean(_) => {
                to_type(&NodeRef::from_kind(kind))
            }
            NodeKind::Paren(inner) => self.resolve_type(&inner),
            NodeKind::Op(op) if op.op == Operator::Union => {
                let left = match &op.left {
                    Some(left) => self.resolve_type(left),
                    None => NodeRef::any(),
                };
                let right = self.resolve_type(&op.right);
                NodeRef::pipe_list(vec![left, right])
            }
            NodeKind::List(list) if list.elements.is_empty() => prelude::list_type(),
            NodeKind::List(list) => {
                let elements = list
                    .elements
                    .iter()
                    .map(|element| self.resolve_type(element))
                    .collect();
                type_node(NodeKind::List(ListNode {
                    elements,
                    is_union: list.is_union,
                }))
            }
            NodeKind::Object(object) if object.instance_of.is_none() => {
                let mut fields = ObjectNode::default();
                for (key, value) in object.entries() {
                    let ty = self.resolve_type(value);
                    fields.insert(key.clone(), ty);
                }
                type_node(NodeKind::Object(fields))
            }
            NodeKind::Func(func) if func.is_signature => {
                let params = func
                    .params
                    .iter()
                    .map(|param| Param {
                        name: param.name.clone(),
                        ty: param.ty.as_ref().map(|ty| self.resolve_type(ty)),
                        default: None,
                    })
                    .collect();
                let return_type = func.return_type.as_ref().map(|ty| self.resolve_type(ty));
                type_node(NodeKind::Func(FuncNode {
                    name: func.name,
                    params,
                    return_type,
                    is_signature: true,
                    ..FuncNode::default()
                }))
            }
            _ => {
                self.infer(expr);
                NodeRef::any()
            }
        }
    }

    fn declare_type(&mut self, decl: &TypeDeclNode) {
        match &decl.body {
            TypeBody::Fields(fields) => {
                // Bound before the fields so they can name the type itself.
                let mut placeholder = Node::new(NodeKind::Object(ObjectNode::default()));
                placeholder.ty.is_type = true;
                placeholder.ty.is_decl = true;
                placeholder.ty.type_name = decl.name.clone();
                let placeholder = NodeRef::new(placeholder);
                self.define(&decl.name, Symbol::type_binding(placeholder.clone()));

                let mut object = ObjectNode::default();
                for field in fields {
                    let ty = self.resolve_type(&field.ty);
                    if let Some(default) = &field.default {
                        self.infer(default);
                    }
                    object.insert(field.name.clone(), ty);
                }
                let mut node = placeholder.borrow_mut();
                node.kind = NodeKind::Object(object);
                node.ty.is_decl = false;
            }
            TypeBody::Refinement(func) => {
                let params = match &func.borrow().kind {
                    NodeKind::Func(inner) => inner.params.clone(),
                    _ => Vec::new(),
                };
                let params = params
                    .iter()
                    .map(|param| Param {
                        name: param.name.clone(),
                        ty: param.ty.as_ref().map(|ty| self.resolve_type(ty)),
                        default: None,
                    })
                    .collect();
                let mut node = Node::new(NodeKind::Func(FuncNode {
                    name: decl.name.clone(),
                    params,
                    ..FuncNode::default()
                }));
                node.ty.is_type = true;
                node.ty.is_refinement_type = true;
                node.ty.type_name = decl.name.clone();
                self.define(&decl.name, Symbol::type_binding(NodeRef::new(node)));
            }
            TypeBody::Function(_) => {
                self.define(&decl.name, Symbol::type_binding(NodeRef::any()));
            }
            TypeBody::Alias(expr) => {
                let ty = self.resolve_type(expr);
                self.define(&decl.name, Symbol::type_binding(ty));
            }
        }
    }

    fn declare_enum(&mut self, decl: &EnumDeclNode) {
        let elements = decl
            .variants
            .iter()
            .map(|variant| to_type(&NodeRef::string(variant.clone())))
            .collect();
        let union = type_node(NodeKind::List(ListNode {
            elements,
            is_union: true,
        }));
        union.borrow_mut().ty.type_name = decl.name.clone();
        let mut symbol = Symbol::type_binding(union);
        symbol.constant = true;
        self.define(&decl.name, symbol);
    }
}

impl TypeContext for Checker {
    fn resolve_decl(&mut self, name: &str) -> Option<NodeRef> {
        self.lookup(name)
            .and_then(|symbol| symbol.as_type.clone())
            .filter(|ty| !ty.borrow().ty.is_decl)
    }

    /// Predicates are never run statically; only their parameter type is checked.
    fn call_refinement(&mut self, _predicate: &NodeRef, _value: &NodeRef) -> Result<NodeRef, Signal> {
        Ok(NodeRef::boolean(true))
    }
}

fn union_members(ty: &NodeRef) -> Option<Vec<NodeRef>> {
    match &ty.borrow().kind {
        NodeKind::PipeList(members) => Some(members.clone()),
        NodeKind::List(list) if list.is_union => Some(list.elements.clone()),
        _ => None,
    }
}

fn type_node(kind: NodeKind) -> NodeRef {
    let mut node = Node::new(kind);
    node.ty.is_type = true;
    NodeRef::new(node)
}

fn display_name(func: &FuncNode) -> &str {
    if func.name.is_empty() {
        "<lambda>"
    } else {
        &func.name
    }
}

fn is_function_literal(expr: &NodeRef) -> bool {
    match &expr.borrow().kind {
        NodeKind::Func(func) => !func.is_signature,
        NodeKind::Paren(inner) => is_function_literal(inner),
        _ => false,
    }
}

fn signature_of(descriptor: &NodeRef) -> Option<Signature> {
    match &descriptor.borrow().kind {
        NodeKind::Func(func) => Some(Signature {
            params: func
                .params
                .iter()
                .map(|param| (param.ty.clone(), param.default.is_some()))
                .collect(),
            returns: func.return_type.clone(),
        }),
        _ => None,
    }
}

fn member_type(target: &NodeRef, name: &str) -> NodeRef {
    let node = target.borrow();
    match &node.kind {
        NodeKind::Object(object) if node.ty.is_type && !node.ty.is_general_type => object
            .get(name)
            .cloned()
            .unwrap_or_else(NodeRef::any),
        NodeKind::List(_) | NodeKind::String(_) if name == "length" => prelude::number_type(),
        _ => NodeRef::any(),
    }
}

fn builtin_type(name: &str) -> NodeRef {
    match name {
        "print" | "println" | "del" => none_type(),
        "string" | "type" | "evals" => prelude::string_type(),
        "number" | "refcount" => prelude::number_type(),
        _ => NodeRef::any(),
    }
}

fn binary_type(op: Operator, lhs: &NodeRef, rhs: &NodeRef) -> NodeRef {
    match op {
        Operator::Eq
        | Operator::Ne
        | Operator::Lt
        | Operator::Le
        | Operator::Gt
        | Operator::Ge => prelude::boolean_type(),
        Operator::Add if is_string(lhs) && is_string(rhs) => prelude::string_type(),
        Operator::Mul if is_string(lhs) && is_number(rhs) => prelude::string_type(),
        Operator::Add
        | Operator::Sub
        | Operator::Mul
        | Operator::Div
        | Operator::Mod
        | Operator::Pow
            if is_number(lhs) && is_number(rhs) =>
        {
            prelude::number_type()
        }
        _ => NodeRef::any(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_program;

    fn check(source: &str) -> Result<Vec<NodeRef>, Vec<TypeError>> {
        let program = parse_program(source).expect("parse");
        check_program(&program, &Config::default()).map(|_| program)
    }

    fn messages(source: &str) -> Vec<String> {
        match check(source) {
            Ok(_) => Vec::new(),
            Err(errors) => errors.into_iter().map(|err| err.message).collect(),
        }
    }

    fn inferred_return(statement: &NodeRef) -> Option<String> {
        let decl = match &statement.borrow().kind {
            NodeKind::ConstantDecl(decl) => decl.clone(),
            _ => return None,
        };
        let value = decl.value?;
        let value = value.borrow();
        match &value.kind {
            NodeKind::Func(func) => func.inferred_return.as_ref().map(printable),
            _ => None,
        }
    }

    #[test]
    fn reports_declared_type_mismatch() {
        let errors = messages("var s: String = 5");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'s' is declared as String"), "{errors:?}");
    }

    #[test]
    fn reports_constant_reassignment() {
        let errors = messages("const x = 1\nx = 2");
        assert_eq!(errors, vec!["cannot modify constant 'x'".to_string()]);
    }

    #[test]
    fn errors_inside_try_are_not_reported() {
        assert!(messages("const x = 1\ntry { x = 2 } catch (e) { println(e) }").is_empty());
    }

    #[test]
    fn reports_calls_without_a_plausible_candidate() {
        let errors = messages("fn half(n: Number) => n / 2\nhalf(\"a\")");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("no matching signature for 'half'"));
    }

    #[test]
    fn overloads_are_all_considered() {
        let source = "fn show(n: Number) => 1\nfn show(s: String) => 2\nshow(\"a\")\nshow(3)";
        assert!(messages(source).is_empty());
    }

    #[test]
    fn unknown_information_is_accepted() {
        let source = "fn id(x) => x\nvar n: Number = id(\"a\")\nvar m: Number = missing()";
        assert!(messages(source).is_empty());
    }

    #[test]
    fn refinement_parameters_check_only_the_base_type() {
        let source = "type Positive(n: Number) => n > 0\nfn f(p: Positive) => p\nf(-5)";
        assert!(messages(source).is_empty());
        let errors = messages("type Positive(n: Number) => n > 0\nfn f(p: Positive) => p\nf(\"a\")");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn writes_back_widened_return_types() {
        let program = check("fn add(a: Number, b: Number) => a + b\nfn greet() => \"hi\"")
            .expect("no errors");
        assert_eq!(inferred_return(&program[0]).as_deref(), Some("Number"));
        assert_eq!(inferred_return(&program[1]).as_deref(), Some("String"));
    }

    #[test]
    fn branches_without_else_include_none() {
        let program =
            check("fn pick(c: Boolean) { if c { return 1 } }").expect("no errors");
        let inferred = inferred_return(&program[0]).expect("inferred");
        assert!(inferred.contains("Number") && inferred.contains("None"), "{inferred}");
    }

    #[test]
    fn unknown_returns_are_not_written_back() {
        let program = check("fn id(x) => x").expect("no errors");
        assert_eq!(inferred_return(&program[0]), None);
    }

    #[test]
    fn enum_types_accept_their_variants() {
        assert!(messages("enum Color { Red, Green }\nvar c: Color = \"Red\"").is_empty());
        assert_eq!(messages("enum Color { Red, Green }\nvar c: Color = \"Blue\"").len(), 1);
    }

    #[test]
    fn union_values_conform_when_any_member_does() {
        let source = "fn f(x) => if x > 0 { 1 } else { \"neg\" }\nvar r: Number = f(1)";
        assert!(messages(source).is_empty(), "{:?}", messages(source));
        let source = "var x: Number | String = 1\nfn g(a: Number) => a\nprintln(g(x))";
        assert!(messages(source).is_empty(), "{:?}", messages(source));
    }

    #[test]
    fn union_values_with_no_matching_member_are_reported() {
        let errors = messages("fn f(x) => if x > 0 { 1 } else { \"neg\" }\nvar r: Boolean = f(1)");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'r' is declared as Boolean"), "{errors:?}");
        let errors = messages("var x: Number | String = 1\nfn g(a: Boolean) => a\ng(x)");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("no matching signature for 'g'"), "{errors:?}");
    }

    #[test]
    fn recursive_object_types_resolve() {
        let source = "type Node { value: Number, next: Node | None }\n\
                      var n: Node = Node { value: 1, next: None }";
        assert!(messages(source).is_empty());
    }
}
