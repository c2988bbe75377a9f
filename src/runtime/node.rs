//! The universal node: parsed syntax, runtime values and type descriptors
//! all share this one representation.
//!
//! Nodes are generic over the reference type `R` used for child links.
//! Live graphs use [`NodeRef`] (shared, interior-mutable cells); the
//! thread-portable [`Snapshot`](crate::runtime::snapshot::Snapshot) uses
//! plain indices so a graph can cross a thread boundary.

use crate::language::span::Position;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable handle to a [`Node`]. Identity (not value) is what
/// cycle guards and the matcher's identity short-circuit compare.
#[derive(Clone)]
pub struct NodeRef(Rc<RefCell<Node>>);

impl NodeRef {
    pub fn new(node: Node) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    pub fn from_kind(kind: NodeKind) -> Self {
        Self::new(Node::new(kind))
    }

    pub fn borrow(&self) -> Ref<'_, Node> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Node> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Replaces the whole node, returning the previous contents.
    pub fn replace(&self, node: Node) -> Node {
        self.0.replace(node)
    }

    pub fn pos(&self) -> Position {
        self.borrow().pos
    }

    pub fn kind_name(&self) -> &'static str {
        self.borrow().kind.name()
    }

    pub fn number(value: f64) -> Self {
        Self::from_kind(NodeKind::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::from_kind(NodeKind::Boolean(value))
    }

    pub fn none() -> Self {
        Self::from_kind(NodeKind::None)
    }

    pub fn any() -> Self {
        let node = Self::from_kind(NodeKind::Any);
        node.borrow_mut().ty.is_type = true;
        node
    }

    pub fn no_value() -> Self {
        Self::from_kind(NodeKind::NoValue)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Error(message.into()))
    }

    pub fn list(elements: Vec<NodeRef>) -> Self {
        Self::from_kind(NodeKind::List(ListNode {
            elements,
            is_union: false,
        }))
    }

    pub fn pipe_list(members: Vec<NodeRef>) -> Self {
        let node = Self::from_kind(NodeKind::PipeList(members));
        node.borrow_mut().ty.is_type = true;
        node
    }

    /// Builds an object from ordered `(name, value)` pairs.
    pub fn object(entries: Vec<(String, NodeRef)>) -> Self {
        let mut object = ObjectNode::default();
        for (name, value) in entries {
            object.insert(name, value);
        }
        Self::from_kind(NodeKind::Object(object))
    }

    pub fn with_pos(self, pos: Position) -> Self {
        self.borrow_mut().pos = pos;
        self
    }

    pub fn is_kind(&self, check: impl FnOnce(&NodeKind) -> bool) -> bool {
        check(&self.borrow().kind)
    }

    pub fn is_none(&self) -> bool {
        matches!(self.borrow().kind, NodeKind::None | NodeKind::NoValue)
    }

    pub fn is_any(&self) -> bool {
        matches!(self.borrow().kind, NodeKind::Any)
    }

    pub fn is_func(&self) -> bool {
        matches!(self.borrow().kind, NodeKind::Func(_))
    }

    pub fn is_type(&self) -> bool {
        self.borrow().ty.is_type
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.borrow().kind {
            NodeKind::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match &self.borrow().kind {
            NodeKind::String(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.borrow().kind {
            NodeKind::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<String> {
        match &self.borrow().kind {
            NodeKind::Id(name) => Some(name.clone()),
            _ => None,
        }
    }

    /// Declared type attached to this node, if any.
    pub fn declared_type(&self) -> Option<NodeRef> {
        self.borrow().ty.ty.clone()
    }

    pub fn type_name(&self) -> String {
        self.borrow().ty.type_name.clone()
    }

    /// Looks up an object property by name.
    pub fn property(&self, name: &str) -> Option<NodeRef> {
        match &self.borrow().kind {
            NodeKind::Object(object) => object.properties.get(name).cloned(),
            _ => None,
        }
    }

    /// Snapshot of list elements (empty for non-lists).
    pub fn elements(&self) -> Vec<NodeRef> {
        match &self.borrow().kind {
            NodeKind::List(list) => list.elements.clone(),
            NodeKind::PipeList(members) => members.clone(),
            _ => Vec::new(),
        }
    }

    /// Overwrites the value held by this node while keeping its identity,
    /// declared type and metadata, so every alias observes the change.
    pub fn overwrite_with(&self, value: &NodeRef) {
        if self.ptr_eq(value) {
            return;
        }
        let (kind, flags) = {
            let source = value.borrow();
            (source.kind.clone(), source.ty.clone())
        };
        let mut target = self.borrow_mut();
        target.kind = kind;
        target.ty.is_type = flags.is_type;
        target.ty.is_literal_type = flags.is_literal_type;
        target.ty.is_refinement_type = flags.is_refinement_type;
        target.ty.is_general_type = flags.is_general_type;
        target.ty.is_type_function = flags.is_type_function;
        target.ty.is_decl = flags.is_decl;
        target.ty.type_name = flags.type_name;
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(node) => write!(f, "NodeRef({})", crate::runtime::printer::repr(&node)),
            Err(_) => write!(f, "NodeRef(<borrowed>)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node<R = NodeRef> {
    pub kind: NodeKind<R>,
    pub ty: TypeInfo<R>,
    pub meta: Meta<R>,
    pub pos: Position,
}

impl<R> Node<R> {
    pub fn new(kind: NodeKind<R>) -> Self {
        Self {
            kind,
            ty: TypeInfo::default(),
            meta: Meta::default(),
            pos: Position::default(),
        }
    }

    pub fn at(mut self, pos: Position) -> Self {
        self.pos = pos;
        self
    }

    /// Rebuilds the node with every child reference passed through `f`.
    pub fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> Node<S> {
        Node {
            kind: self.kind.map(f),
            ty: self.ty.map(f),
            meta: self.meta.map(f),
            pos: self.pos,
        }
    }

    /// Visits every child reference, including type and hook links.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        let _ = self.map(&mut |child| f(child));
    }
}

impl<R> Default for Node<R> {
    fn default() -> Self {
        Node::new(NodeKind::NoValue)
    }
}

/// Type-related information attached to a node.
#[derive(Clone, Debug)]
pub struct TypeInfo<R = NodeRef> {
    /// Declared type of this value.
    pub ty: Option<R>,
    pub is_type: bool,
    /// Matches by value equality, not by shape.
    pub is_literal_type: bool,
    /// Matches by calling a predicate function.
    pub is_refinement_type: bool,
    /// Matches any value of the same kind (bare `Object`, `List`, `Function`).
    pub is_general_type: bool,
    /// Parametric type constructor, never multi-dispatched.
    pub is_type_function: bool,
    /// Forward declaration awaiting resolution by `type_name`.
    pub is_decl: bool,
    /// Nominal tag.
    pub type_name: String,
}

impl<R> Default for TypeInfo<R> {
    fn default() -> Self {
        Self {
            ty: None,
            is_type: false,
            is_literal_type: false,
            is_refinement_type: false,
            is_general_type: false,
            is_type_function: false,
            is_decl: false,
            type_name: String::new(),
        }
    }
}

impl<R> TypeInfo<R> {
    fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> TypeInfo<S> {
        TypeInfo {
            ty: self.ty.as_ref().map(|ty| f(ty)),
            is_type: self.is_type,
            is_literal_type: self.is_literal_type,
            is_refinement_type: self.is_refinement_type,
            is_general_type: self.is_general_type,
            is_type_function: self.is_type_function,
            is_decl: self.is_decl,
            type_name: self.type_name.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Meta<R = NodeRef> {
    pub is_const: bool,
    pub tags: Vec<String>,
    pub on_change: Option<R>,
    pub on_call: Option<R>,
    pub on_init: Option<R>,
}

impl<R> Default for Meta<R> {
    fn default() -> Self {
        Self {
            is_const: false,
            tags: Vec::new(),
            on_change: None,
            on_call: None,
            on_init: None,
        }
    }
}

impl<R> Meta<R> {
    fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> Meta<S> {
        Meta {
            is_const: self.is_const,
            tags: self.tags.clone(),
            on_change: self.on_change.as_ref().map(|hook| f(hook)),
            on_call: self.on_call.as_ref().map(|hook| f(hook)),
            on_init: self.on_init.as_ref().map(|hook| f(hook)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    OnChange,
    OnCall,
    OnInit,
}

impl HookKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "onChange" => Some(HookKind::OnChange),
            "onCall" => Some(HookKind::OnCall),
            "onInit" => Some(HookKind::OnInit),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HookKind::OnChange => "onChange",
            HookKind::OnCall => "onCall",
            HookKind::OnInit => "onInit",
        }
    }
}

impl Meta {
    pub fn hook(&self, kind: HookKind) -> Option<NodeRef> {
        match kind {
            HookKind::OnChange => self.on_change.clone(),
            HookKind::OnCall => self.on_call.clone(),
            HookKind::OnInit => self.on_init.clone(),
        }
    }

    pub fn set_hook(&mut self, kind: HookKind, hook: Option<NodeRef>) {
        match kind {
            HookKind::OnChange => self.on_change = hook,
            HookKind::OnCall => self.on_call = hook,
            HookKind::OnInit => self.on_init = hook,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Neg,
    Ref,
    Union,
    Range,
    Dot,
    Assign,
    Is,
    Meta,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Not => "!",
            Operator::Neg => "-",
            Operator::Ref => "&",
            Operator::Union => "|",
            Operator::Range => "..",
            Operator::Dot => ".",
            Operator::Assign => "=",
            Operator::Is => "is",
            Operator::Meta => "::",
        }
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind<R = NodeRef> {
    Id(String),
    Number(f64),
    String(String),
    Boolean(bool),
    Op(OpNode<R>),
    List(ListNode<R>),
    /// Union type; kept sorted and deduplicated by the matcher.
    PipeList(Vec<R>),
    Object(ObjectNode<R>),
    Paren(R),
    FuncCall(FuncCallNode<R>),
    Func(FuncNode<R>),
    Accessor(AccessorNode<R>),
    VariableDecl(DeclNode<R>),
    ConstantDecl(DeclNode<R>),
    TypeDecl(TypeDeclNode<R>),
    EnumDecl(EnumDeclNode),
    Block(Vec<R>),
    ForLoop(ForNode<R>),
    WhileLoop(WhileNode<R>),
    Return(Option<R>),
    Break,
    Continue,
    Import(ImportNode),
    IfStatement(IfNode<R>),
    IfBlock(IfBlockNode<R>),
    TryCatch(TryCatchNode<R>),
    Lib(LibNode),
    Pointer(R),
    None,
    Any,
    NoValue,
    Error(String),
}

impl<R> NodeKind<R> {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Id(_) => "Id",
            NodeKind::Number(_) => "Number",
            NodeKind::String(_) => "String",
            NodeKind::Boolean(_) => "Boolean",
            NodeKind::Op(_) => "Op",
            NodeKind::List(_) => "List",
            NodeKind::PipeList(_) => "PipeList",
            NodeKind::Object(_) => "Object",
            NodeKind::Paren(_) => "Paren",
            NodeKind::FuncCall(_) => "FuncCall",
            NodeKind::Func(_) => "Function",
            NodeKind::Accessor(_) => "Accessor",
            NodeKind::VariableDecl(_) => "VariableDecl",
            NodeKind::ConstantDecl(_) => "ConstantDecl",
            NodeKind::TypeDecl(_) => "TypeDecl",
            NodeKind::EnumDecl(_) => "EnumDecl",
            NodeKind::Block(_) => "Block",
            NodeKind::ForLoop(_) => "ForLoop",
            NodeKind::WhileLoop(_) => "WhileLoop",
            NodeKind::Return(_) => "Return",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Import(_) => "Import",
            NodeKind::IfStatement(_) => "IfStatement",
            NodeKind::IfBlock(_) => "IfBlock",
            NodeKind::TryCatch(_) => "TryCatch",
            NodeKind::Lib(_) => "Lib",
            NodeKind::Pointer(_) => "Pointer",
            NodeKind::None => "None",
            NodeKind::Any => "Any",
            NodeKind::NoValue => "NoValue",
            NodeKind::Error(_) => "Error",
        }
    }

    /// Discriminant order used when sorting union members.
    pub fn rank(&self) -> u8 {
        match self {
            NodeKind::Id(_) => 0,
            NodeKind::Number(_) => 1,
            NodeKind::String(_) => 2,
            NodeKind::Boolean(_) => 3,
            NodeKind::Op(_) => 4,
            NodeKind::List(_) => 5,
            NodeKind::PipeList(_) => 6,
            NodeKind::Object(_) => 7,
            NodeKind::Paren(_) => 8,
            NodeKind::FuncCall(_) => 9,
            NodeKind::Func(_) => 10,
            NodeKind::Accessor(_) => 11,
            NodeKind::VariableDecl(_) => 12,
            NodeKind::ConstantDecl(_) => 13,
            NodeKind::TypeDecl(_) => 14,
            NodeKind::EnumDecl(_) => 15,
            NodeKind::Block(_) => 16,
            NodeKind::ForLoop(_) => 17,
            NodeKind::WhileLoop(_) => 18,
            NodeKind::Return(_) => 19,
            NodeKind::Break => 20,
            NodeKind::Continue => 21,
            NodeKind::Import(_) => 22,
            NodeKind::IfStatement(_) => 23,
            NodeKind::IfBlock(_) => 24,
            NodeKind::TryCatch(_) => 25,
            NodeKind::Lib(_) => 26,
            NodeKind::Pointer(_) => 27,
            NodeKind::None => 28,
            NodeKind::Any => 29,
            NodeKind::NoValue => 30,
            NodeKind::Error(_) => 31,
        }
    }

    pub fn same_kind<S>(&self, other: &NodeKind<S>) -> bool {
        self.rank() == other.rank()
    }

    pub fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> NodeKind<S> {
        match self {
            NodeKind::Id(name) => NodeKind::Id(name.clone()),
            NodeKind::Number(value) => NodeKind::Number(*value),
            NodeKind::String(value) => NodeKind::String(value.clone()),
            NodeKind::Boolean(value) => NodeKind::Boolean(*value),
            NodeKind::Op(op) => NodeKind::Op(OpNode {
                op: op.op,
                left: op.left.as_ref().map(|left| f(left)),
                right: f(&op.right),
            }),
            NodeKind::List(list) => NodeKind::List(ListNode {
                elements: list.elements.iter().map(|item| f(item)).collect(),
                is_union: list.is_union,
            }),
            NodeKind::PipeList(members) => {
                NodeKind::PipeList(members.iter().map(|item| f(item)).collect())
            }
            NodeKind::Object(object) => NodeKind::Object(object.map(f)),
            NodeKind::Paren(inner) => NodeKind::Paren(f(inner)),
            NodeKind::FuncCall(call) => NodeKind::FuncCall(FuncCallNode {
                callee: f(&call.callee),
                args: call.args.iter().map(|arg| f(arg)).collect(),
            }),
            NodeKind::Func(func) => NodeKind::Func(func.map(f)),
            NodeKind::Accessor(accessor) => NodeKind::Accessor(AccessorNode {
                target: f(&accessor.target),
                index: f(&accessor.index),
            }),
            NodeKind::VariableDecl(decl) => NodeKind::VariableDecl(decl.map(f)),
            NodeKind::ConstantDecl(decl) => NodeKind::ConstantDecl(decl.map(f)),
            NodeKind::TypeDecl(decl) => NodeKind::TypeDecl(TypeDeclNode {
                name: decl.name.clone(),
                body: match &decl.body {
                    TypeBody::Fields(fields) => TypeBody::Fields(
                        fields
                            .iter()
                            .map(|field| FieldDecl {
                                name: field.name.clone(),
                                ty: f(&field.ty),
                                default: field.default.as_ref().map(|value| f(value)),
                            })
                            .collect(),
                    ),
                    TypeBody::Refinement(func) => TypeBody::Refinement(f(func)),
                    TypeBody::Function(func) => TypeBody::Function(f(func)),
                    TypeBody::Alias(expr) => TypeBody::Alias(f(expr)),
                },
            }),
            NodeKind::EnumDecl(decl) => NodeKind::EnumDecl(decl.clone()),
            NodeKind::Block(statements) => {
                NodeKind::Block(statements.iter().map(|stmt| f(stmt)).collect())
            }
            NodeKind::ForLoop(node) => NodeKind::ForLoop(ForNode {
                item: node.item.clone(),
                index: node.index.clone(),
                list: node.list.clone(),
                iterable: f(&node.iterable),
                body: f(&node.body),
            }),
            NodeKind::WhileLoop(node) => NodeKind::WhileLoop(WhileNode {
                cond: f(&node.cond),
                body: f(&node.body),
            }),
            NodeKind::Return(value) => NodeKind::Return(value.as_ref().map(|value| f(value))),
            NodeKind::Break => NodeKind::Break,
            NodeKind::Continue => NodeKind::Continue,
            NodeKind::Import(import) => NodeKind::Import(import.clone()),
            NodeKind::IfStatement(node) => NodeKind::IfStatement(IfNode {
                cond: f(&node.cond),
                body: f(&node.body),
            }),
            NodeKind::IfBlock(block) => NodeKind::IfBlock(IfBlockNode {
                branches: block.branches.iter().map(|branch| f(branch)).collect(),
                otherwise: block.otherwise.as_ref().map(|body| f(body)),
            }),
            NodeKind::TryCatch(node) => NodeKind::TryCatch(TryCatchNode {
                body: f(&node.body),
                binding: node.binding.clone(),
                handler: f(&node.handler),
            }),
            NodeKind::Lib(lib) => NodeKind::Lib(lib.clone()),
            NodeKind::Pointer(target) => NodeKind::Pointer(f(target)),
            NodeKind::None => NodeKind::None,
            NodeKind::Any => NodeKind::Any,
            NodeKind::NoValue => NodeKind::NoValue,
            NodeKind::Error(message) => NodeKind::Error(message.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpNode<R = NodeRef> {
    pub op: Operator,
    /// `None` for prefix operators.
    pub left: Option<R>,
    pub right: R,
}

#[derive(Clone, Debug)]
pub struct ListNode<R = NodeRef> {
    pub elements: Vec<R>,
    /// Explicit enum-style union: matched like a pipe list.
    pub is_union: bool,
}

#[derive(Clone, Debug)]
pub struct ObjectNode<R = NodeRef> {
    pub properties: HashMap<String, R>,
    /// Insertion order, used for keys/values/items and printing.
    pub keys: Vec<String>,
    pub defaults: HashMap<String, R>,
    pub is_enum: bool,
    /// Syntax only: the type expression of `X { ... }`.
    pub instance_of: Option<R>,
}

impl<R> Default for ObjectNode<R> {
    fn default() -> Self {
        Self {
            properties: HashMap::new(),
            keys: Vec::new(),
            defaults: HashMap::new(),
            is_enum: false,
            instance_of: None,
        }
    }
}

impl<R> ObjectNode<R> {
    pub fn insert(&mut self, name: String, value: R) {
        if !self.properties.contains_key(&name) {
            self.keys.push(name.clone());
        }
        self.properties.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<R> {
        self.keys.retain(|key| key != name);
        self.properties.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&R> {
        self.properties.get(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &R)> {
        self.keys
            .iter()
            .filter_map(move |key| self.properties.get(key).map(|value| (key, value)))
    }

    fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> ObjectNode<S> {
        let mut properties = HashMap::with_capacity(self.properties.len());
        for key in &self.keys {
            if let Some(value) = self.properties.get(key) {
                properties.insert(key.clone(), f(value));
            }
        }
        let mut defaults = HashMap::with_capacity(self.defaults.len());
        let mut default_keys: Vec<&String> = self.defaults.keys().collect();
        default_keys.sort();
        for key in default_keys {
            defaults.insert(key.clone(), f(&self.defaults[key]));
        }
        ObjectNode {
            properties,
            keys: self.keys.clone(),
            defaults,
            is_enum: self.is_enum,
            instance_of: self.instance_of.as_ref().map(|ty| f(ty)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FuncCallNode<R = NodeRef> {
    pub callee: R,
    pub args: Vec<R>,
}

#[derive(Clone, Debug)]
pub struct Param<R = NodeRef> {
    pub name: String,
    pub ty: Option<R>,
    pub default: Option<R>,
}

#[derive(Clone, Debug)]
pub struct FuncNode<R = NodeRef> {
    pub name: String,
    pub params: Vec<Param<R>>,
    /// `None` for function types (`fn(A) -> B`) and native stubs.
    pub body: Option<R>,
    pub closure: HashMap<String, R>,
    pub return_type: Option<R>,
    /// Return type observed or inferred but never enforced.
    pub inferred_return: Option<R>,
    /// Same-named overloads, in declaration order.
    pub dispatch: Vec<R>,
    /// Set on function-type descriptors.
    pub is_signature: bool,
}

impl<R> Default for FuncNode<R> {
    fn default() -> Self {
        Self {
            name: String::new(),
            params: Vec::new(),
            body: None,
            closure: HashMap::new(),
            return_type: None,
            inferred_return: None,
            dispatch: Vec::new(),
            is_signature: false,
        }
    }
}

impl<R> FuncNode<R> {
    fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> FuncNode<S> {
        let mut closure = HashMap::with_capacity(self.closure.len());
        let mut names: Vec<&String> = self.closure.keys().collect();
        names.sort();
        for name in names {
            closure.insert(name.clone(), f(&self.closure[name]));
        }
        FuncNode {
            name: self.name.clone(),
            params: self
                .params
                .iter()
                .map(|param| Param {
                    name: param.name.clone(),
                    ty: param.ty.as_ref().map(|ty| f(ty)),
                    default: param.default.as_ref().map(|value| f(value)),
                })
                .collect(),
            body: self.body.as_ref().map(|body| f(body)),
            closure,
            return_type: self.return_type.as_ref().map(|ty| f(ty)),
            inferred_return: self.inferred_return.as_ref().map(|ty| f(ty)),
            dispatch: self.dispatch.iter().map(|sibling| f(sibling)).collect(),
            is_signature: self.is_signature,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AccessorNode<R = NodeRef> {
    pub target: R,
    pub index: R,
}

#[derive(Clone, Debug)]
pub struct DeclNode<R = NodeRef> {
    pub name: String,
    pub ty: Option<R>,
    pub value: Option<R>,
}

impl<R> DeclNode<R> {
    fn map<S>(&self, f: &mut dyn FnMut(&R) -> S) -> DeclNode<S> {
        DeclNode {
            name: self.name.clone(),
            ty: self.ty.as_ref().map(|ty| f(ty)),
            value: self.value.as_ref().map(|value| f(value)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeDeclNode<R = NodeRef> {
    pub name: String,
    pub body: TypeBody<R>,
}

#[derive(Clone, Debug)]
pub enum TypeBody<R = NodeRef> {
    /// `type X { a: T = default }`
    Fields(Vec<FieldDecl<R>>),
    /// `type X(v) => predicate`, holds a `Func` syntax node.
    Refinement(R),
    /// `type X(params) = body`, holds a `Func` syntax node.
    Function(R),
    /// `type X = expr`
    Alias(R),
}

#[derive(Clone, Debug)]
pub struct FieldDecl<R = NodeRef> {
    pub name: String,
    pub ty: R,
    pub default: Option<R>,
}

#[derive(Clone, Debug)]
pub struct EnumDeclNode {
    pub name: String,
    pub variants: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ForNode<R = NodeRef> {
    pub item: String,
    pub index: Option<String>,
    pub list: Option<String>,
    pub iterable: R,
    pub body: R,
}

#[derive(Clone, Debug)]
pub struct WhileNode<R = NodeRef> {
    pub cond: R,
    pub body: R,
}

#[derive(Clone, Debug)]
pub struct ImportNode {
    pub path: String,
    pub alias: Option<String>,
}

#[derive(Clone, Debug)]
pub struct IfNode<R = NodeRef> {
    pub cond: R,
    pub body: R,
}

#[derive(Clone, Debug)]
pub struct IfBlockNode<R = NodeRef> {
    /// `IfStatement` nodes, tried in order.
    pub branches: Vec<R>,
    pub otherwise: Option<R>,
}

#[derive(Clone, Debug)]
pub struct TryCatchNode<R = NodeRef> {
    pub body: R,
    pub binding: Option<String>,
    pub handler: R,
}

#[derive(Clone, Debug)]
pub struct LibNode {
    /// Registry name of the native module.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_keeps_identity_and_hooks() {
        let target = NodeRef::number(1.0);
        let hook = NodeRef::from_kind(NodeKind::Func(FuncNode::default()));
        target.borrow_mut().meta.on_change = Some(hook.clone());
        let alias = target.clone();

        target.overwrite_with(&NodeRef::string("two"));

        assert_eq!(alias.as_string().as_deref(), Some("two"));
        assert!(alias.borrow().meta.on_change.as_ref().is_some_and(|h| h.ptr_eq(&hook)));
    }

    #[test]
    fn object_keeps_insertion_order() {
        let object = NodeRef::object(vec![
            ("b".into(), NodeRef::number(1.0)),
            ("a".into(), NodeRef::number(2.0)),
        ]);
        let node = object.borrow();
        let NodeKind::Object(inner) = &node.kind else {
            panic!("expected object");
        };
        let keys: Vec<&String> = inner.entries().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn map_rewrites_child_references() {
        let list = NodeRef::list(vec![NodeRef::number(1.0), NodeRef::number(2.0)]);
        let mut seen = 0usize;
        let indexed: Node<usize> = list.borrow().map(&mut |_| {
            seen += 1;
            seen
        });
        match indexed.kind {
            NodeKind::List(list) => assert_eq!(list.elements, vec![1, 2]),
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn ranks_follow_declaration_order() {
        let number: NodeKind = NodeKind::Number(0.0);
        let string: NodeKind = NodeKind::String(String::new());
        assert!(number.rank() < string.rank());
        assert!(number.same_kind(&NodeKind::<usize>::Number(2.0)));
    }
}
