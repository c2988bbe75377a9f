//! Structural type matching shared by the evaluator and the typechecker.
//!
//! Precedence of `match_types`: identity, declared-type substitution,
//! `Any`, forward declarations, refinement predicates, literal types,
//! unions, then kind-specific structural comparison.

use crate::runtime::{
    error::{RuntimeError, Signal},
    node::{ListNode, Node, NodeKind, NodeRef, ObjectNode},
    printer::printable,
};
use std::collections::{HashMap, HashSet};

pub type MatchResult = Result<bool, Signal>;

/// Services the matcher needs from whoever drives it.
pub trait TypeContext {
    /// Looks up a type by name for forward-declaration resolution.
    fn resolve_decl(&mut self, name: &str) -> Option<NodeRef>;

    /// Invokes a refinement predicate with `value` as its only argument.
    fn call_refinement(&mut self, predicate: &NodeRef, value: &NodeRef) -> Result<NodeRef, Signal>;
}

const INIT: &str = "_init";

/// Computes the type descriptor of a runtime value.
pub fn get_type(ctx: &mut dyn TypeContext, node: &NodeRef) -> Result<NodeRef, Signal> {
    let mut visited = HashMap::new();
    type_of(ctx, node, &mut visited)
}

fn type_of(
    ctx: &mut dyn TypeContext,
    node: &NodeRef,
    visited: &mut HashMap<usize, NodeRef>,
) -> Result<NodeRef, Signal> {
    if node.is_type() {
        return Ok(node.clone());
    }
    if let Some(seen) = visited.get(&node.id()) {
        return Ok(seen.clone());
    }
    let snapshot = node.borrow().clone();
    match &snapshot.kind {
        NodeKind::Pointer(target) => type_of(ctx, target, visited),
        NodeKind::NoValue => Ok(mark_type(Node::new(NodeKind::None), "None")),
        NodeKind::Number(_) => Ok(mark_type(scalar(&snapshot), "Number")),
        NodeKind::String(_) => Ok(mark_type(scalar(&snapshot), "String")),
        NodeKind::Boolean(_) => Ok(mark_type(scalar(&snapshot), "Boolean")),
        NodeKind::Func(func) => {
            let mut copy = Node::new(NodeKind::Func(func.clone()));
            copy.ty.type_name = snapshot.ty.type_name.clone();
            let typed = mark_type(copy, "");
            visited.insert(node.id(), typed.clone());
            let ret = func.return_type.clone().or_else(|| func.inferred_return.clone());
            if let Some(ret) = ret {
                let ret = type_of(ctx, &ret, visited)?;
                if let NodeKind::Func(inner) = &mut typed.borrow_mut().kind {
                    inner.return_type = Some(ret);
                }
            }
            Ok(typed)
        }
        NodeKind::Object(object) => {
            let mut shell = Node::new(NodeKind::Object(ObjectNode {
                is_enum: object.is_enum,
                ..ObjectNode::default()
            }));
            shell.ty.type_name = snapshot.ty.type_name.clone();
            let typed = mark_type(shell, "");
            visited.insert(node.id(), typed.clone());
            let mut fields = ObjectNode {
                is_enum: object.is_enum,
                ..ObjectNode::default()
            };
            for (key, value) in object.entries() {
                fields.insert(key.clone(), type_of(ctx, value, visited)?);
            }
            typed.borrow_mut().kind = NodeKind::Object(fields);
            Ok(typed)
        }
        NodeKind::List(list) => {
            let typed = mark_type(
                Node::new(NodeKind::List(ListNode {
                    elements: Vec::new(),
                    is_union: list.is_union,
                })),
                "",
            );
            visited.insert(node.id(), typed.clone());
            let mut members = Vec::with_capacity(list.elements.len());
            for element in &list.elements {
                members.push(type_of(ctx, element, visited)?);
            }
            let element_type = union_of(ctx, members)?;
            if let NodeKind::List(inner) = &mut typed.borrow_mut().kind {
                inner.elements = vec![element_type];
            }
            Ok(typed)
        }
        _ => Ok(mark_type(
            Node::new(snapshot.kind.clone()),
            snapshot.kind.name(),
        )),
    }
}

fn scalar(node: &Node) -> Node {
    Node::new(node.kind.clone())
}

fn mark_type(mut node: Node, name: &str) -> NodeRef {
    node.ty.is_type = true;
    if node.ty.type_name.is_empty() {
        node.ty.type_name = name.to_string();
    }
    NodeRef::new(node)
}

/// Collapses member types into one: `Any` when empty, the single type
/// when there is one, a union otherwise.
pub fn union_of(ctx: &mut dyn TypeContext, members: Vec<NodeRef>) -> Result<NodeRef, Signal> {
    let mut unique = sort_and_unique(ctx, members)?;
    Ok(match unique.len() {
        0 => NodeRef::any(),
        1 => unique.remove(0),
        _ => NodeRef::pipe_list(unique),
    })
}

/// Flattens nested unions, collapses to `[Any]` when any member is `Any`,
/// then stable-sorts by kind and drops members already matched by an
/// earlier one.
pub fn sort_and_unique(
    ctx: &mut dyn TypeContext,
    members: Vec<NodeRef>,
) -> Result<Vec<NodeRef>, Signal> {
    let mut flat = Vec::with_capacity(members.len());
    flatten_union(&members, &mut flat, &mut HashSet::new());
    if let Some(any) = flat.iter().find(|member| member.is_any()) {
        return Ok(vec![any.clone()]);
    }
    flat.sort_by_key(|member| member.borrow().kind.rank());
    let mut unique: Vec<NodeRef> = Vec::with_capacity(flat.len());
    'members: for candidate in flat {
        for kept in &unique {
            if match_types(ctx, kept, &candidate)? {
                continue 'members;
            }
        }
        unique.push(candidate);
    }
    Ok(unique)
}

fn flatten_union(members: &[NodeRef], out: &mut Vec<NodeRef>, seen: &mut HashSet<usize>) {
    for member in members {
        let nested = match &member.borrow().kind {
            NodeKind::PipeList(inner) => Some(inner.clone()),
            _ => None,
        };
        match nested {
            Some(inner) => {
                if seen.insert(member.id()) {
                    flatten_union(&inner, out, seen);
                }
            }
            None => out.push(member.clone()),
        }
    }
}

/// Converts a value used in type position into a type descriptor.
/// Scalars become literal types and enum objects become explicit unions.
pub fn to_type(node: &NodeRef) -> NodeRef {
    let mut visited = HashMap::new();
    convert(node, &mut visited)
}

fn convert(node: &NodeRef, visited: &mut HashMap<usize, NodeRef>) -> NodeRef {
    if node.is_type() {
        return node.clone();
    }
    if let Some(seen) = visited.get(&node.id()) {
        return seen.clone();
    }
    let snapshot = node.borrow().clone();
    match &snapshot.kind {
        NodeKind::Pointer(target) => convert(target, visited),
        NodeKind::Number(_) | NodeKind::String(_) | NodeKind::Boolean(_) => {
            let mut literal = Node::new(snapshot.kind.clone());
            literal.ty.is_type = true;
            literal.ty.is_literal_type = true;
            NodeRef::new(literal)
        }
        NodeKind::None | NodeKind::NoValue => mark_type(Node::new(NodeKind::None), "None"),
        NodeKind::Object(object) if object.is_enum => {
            let elements = object
                .entries()
                .map(|(_, value)| convert(value, visited))
                .collect();
            let mut union = Node::new(NodeKind::List(ListNode {
                elements,
                is_union: true,
            }));
            union.ty.type_name = snapshot.ty.type_name.clone();
            mark_type(union, "")
        }
        NodeKind::Object(object) => {
            let mut shell = Node::new(NodeKind::Object(ObjectNode::default()));
            shell.ty.type_name = snapshot.ty.type_name.clone();
            let typed = mark_type(shell, "");
            visited.insert(node.id(), typed.clone());
            let mut fields = ObjectNode::default();
            for (key, value) in object.entries() {
                fields.insert(key.clone(), convert(value, visited));
            }
            fields.defaults = object.defaults.clone();
            typed.borrow_mut().kind = NodeKind::Object(fields);
            typed
        }
        NodeKind::List(list) => {
            let typed = mark_type(
                Node::new(NodeKind::List(ListNode {
                    elements: Vec::new(),
                    is_union: list.is_union,
                })),
                "",
            );
            visited.insert(node.id(), typed.clone());
            let elements = list
                .elements
                .iter()
                .map(|element| convert(element, visited))
                .collect();
            if let NodeKind::List(inner) = &mut typed.borrow_mut().kind {
                inner.elements = elements;
            }
            typed
        }
        _ => node.clone(),
    }
}

/// Decides whether `value` conforms to the type descriptor `ty`.
pub fn match_types(ctx: &mut dyn TypeContext, ty: &NodeRef, value: &NodeRef) -> MatchResult {
    let mut visited = HashSet::new();
    match_inner(ctx, ty, value, &mut visited)
}

fn match_inner(
    ctx: &mut dyn TypeContext,
    ty: &NodeRef,
    value: &NodeRef,
    visited: &mut HashSet<(usize, usize)>,
) -> MatchResult {
    if ty.ptr_eq(value) {
        return Ok(true);
    }
    let key = (ty.id(), value.id());
    if !visited.insert(key) {
        // Recursive types: assume the pair matches while it is being proven.
        return Ok(true);
    }
    let result = match_step(ctx, ty, value, visited);
    visited.remove(&key);
    result
}

fn match_step(
    ctx: &mut dyn TypeContext,
    ty: &NodeRef,
    value: &NodeRef,
    visited: &mut HashSet<(usize, usize)>,
) -> MatchResult {
    let value = deref(value);
    let ty = deref(ty);
    if ty.ptr_eq(&value) {
        return Ok(true);
    }

    if let Some(declared) = substitutable(&ty, false) {
        return match_inner(ctx, &declared, &value, visited);
    }
    if let Some(declared) = substitutable(&value, true) {
        return match_inner(ctx, &ty, &declared, visited);
    }

    if ty.is_any() || value.is_any() {
        return Ok(true);
    }

    if ty.borrow().ty.is_decl {
        return match resolve_forward(ctx, &ty) {
            Some(resolved) => match_inner(ctx, &resolved, &value, visited),
            None => Ok(false),
        };
    }
    if value.borrow().ty.is_decl {
        return match resolve_forward(ctx, &value) {
            Some(resolved) => match_inner(ctx, &ty, &resolved, visited),
            None => Ok(false),
        };
    }

    if ty.borrow().ty.is_refinement_type {
        return match_refinement(ctx, &ty, &value, visited);
    }

    if is_literal(&ty) {
        if value.is_type() && !value.borrow().ty.is_literal_type {
            return Ok(false);
        }
        return match_values(ctx, &ty, &value);
    }

    if let Some(members) = union_members(&value) {
        for member in &members {
            if !match_inner(ctx, &ty, member, visited)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Some(members) = union_members(&ty) {
        for member in &members {
            if match_inner(ctx, member, &value, visited)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    let ty_node = ty.borrow().clone();
    let value_node = value.borrow().clone();
    if matches!(ty_node.kind, NodeKind::None) && matches!(value_node.kind, NodeKind::NoValue) {
        return Ok(true);
    }
    if !ty_node.kind.same_kind(&value_node.kind) {
        return Ok(false);
    }
    match (&ty_node.kind, &value_node.kind) {
        (NodeKind::Func(expected), NodeKind::Func(actual)) => {
            if ty_node.ty.is_general_type || value_node.ty.is_general_type {
                return Ok(true);
            }
            let expected_ret = expected.return_type.clone();
            let actual_ret = actual
                .return_type
                .clone()
                .or_else(|| actual.inferred_return.clone());
            if let (Some(expected_ret), Some(actual_ret)) = (expected_ret, actual_ret) {
                if !match_inner(ctx, &expected_ret, &actual_ret, visited)? {
                    return Ok(false);
                }
            }
            if expected.params.len() != actual.params.len() {
                return Ok(false);
            }
            for (left, right) in expected.params.iter().zip(actual.params.iter()) {
                if let (Some(left), Some(right)) = (&left.ty, &right.ty) {
                    if !match_inner(ctx, left, right, visited)? {
                        return Ok(false);
                    }
                }
            }
            Ok(true)
        }
        (NodeKind::List(expected), NodeKind::List(_)) => {
            if ty_node.ty.is_general_type || (ty_node.ty.is_type && expected.elements.is_empty()) {
                return Ok(true);
            }
            let expected_types = list_element_types(ctx, &ty)?;
            let actual_types = list_element_types(ctx, &value)?;
            'actual: for actual in &actual_types {
                for candidate in &expected_types {
                    if match_inner(ctx, candidate, actual, visited)? {
                        continue 'actual;
                    }
                }
                return Ok(false);
            }
            Ok(true)
        }
        (NodeKind::Object(expected), NodeKind::Object(actual)) => {
            if ty_node.ty.is_general_type || value_node.ty.is_general_type {
                return Ok(true);
            }
            if !ty_node.ty.type_name.is_empty() && ty_node.ty.type_name == value_node.ty.type_name {
                return Ok(true);
            }
            let expected_count = expected.keys.iter().filter(|key| *key != INIT).count();
            let actual_count = actual.keys.iter().filter(|key| *key != INIT).count();
            if expected_count != actual_count {
                return Ok(false);
            }
            for (key, field_type) in expected.entries() {
                if key == INIT {
                    continue;
                }
                let Some(field_value) = actual.get(key) else {
                    return Ok(false);
                };
                if !match_inner(ctx, field_type, field_value, visited)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(true),
    }
}

/// Follows pointers and parentheses to the underlying node.
pub fn deref(node: &NodeRef) -> NodeRef {
    let mut current = node.clone();
    for _ in 0..64 {
        let next = match &current.borrow().kind {
            NodeKind::Pointer(target) | NodeKind::Paren(target) => target.clone(),
            _ => break,
        };
        current = next;
    }
    current
}

/// The declared type to compare instead of `node`, if substitution applies.
/// Value-side substitution is skipped for declared types that only make
/// sense against the concrete value (Any, refinements, literals, unions,
/// general kinds).
fn substitutable(node: &NodeRef, value_side: bool) -> Option<NodeRef> {
    let inner = node.borrow();
    let declared = inner.ty.ty.clone()?;
    if !value_side && inner.ty.is_type {
        return None;
    }
    if declared.ptr_eq(node) {
        return None;
    }
    if value_side {
        let decl = declared.borrow();
        let skip = matches!(decl.kind, NodeKind::Any | NodeKind::PipeList(_))
            || matches!(&decl.kind, NodeKind::List(list) if list.is_union)
            || decl.ty.is_refinement_type
            || decl.ty.is_literal_type
            || decl.ty.is_general_type
            || decl.ty.is_decl;
        if skip {
            return None;
        }
    }
    Some(declared)
}

fn resolve_forward(ctx: &mut dyn TypeContext, node: &NodeRef) -> Option<NodeRef> {
    let name = node.type_name();
    let resolved = ctx.resolve_decl(&name)?;
    if resolved.ptr_eq(node) || resolved.borrow().ty.is_decl {
        return None;
    }
    // Memoize the resolution onto the placeholder.
    node.overwrite_with(&resolved);
    node.borrow_mut().ty.is_decl = false;
    Some(resolved)
}

fn match_refinement(
    ctx: &mut dyn TypeContext,
    ty: &NodeRef,
    value: &NodeRef,
    visited: &mut HashSet<(usize, usize)>,
) -> MatchResult {
    let param_type = match &ty.borrow().kind {
        NodeKind::Func(func) => func.params.first().and_then(|param| param.ty.clone()),
        _ => None,
    };
    if let Some(param_type) = param_type {
        if !match_inner(ctx, &param_type, value, visited)? {
            return Ok(false);
        }
    }
    if value.is_type() && !value.borrow().ty.is_literal_type {
        // A type cannot be fed to the predicate; the parameter check is all we know.
        return Ok(!value.borrow().ty.is_refinement_type);
    }
    let verdict = ctx.call_refinement(ty, value)?;
    let outcome = verdict.as_bool();
    match outcome {
        Some(accepted) => Ok(accepted),
        None => Err(RuntimeError::RefinementNotBoolean {
            name: ty.type_name(),
            value: printable(&verdict),
        }
        .into()),
    }
}

fn is_literal(node: &NodeRef) -> bool {
    let inner = node.borrow();
    inner.ty.is_literal_type
        || (!inner.ty.is_type
            && matches!(
                inner.kind,
                NodeKind::Number(_) | NodeKind::String(_) | NodeKind::Boolean(_)
            ))
}

fn union_members(node: &NodeRef) -> Option<Vec<NodeRef>> {
    match &node.borrow().kind {
        NodeKind::PipeList(members) => Some(members.clone()),
        NodeKind::List(list) if list.is_union => Some(list.elements.clone()),
        _ => None,
    }
}

/// Distinct element types of a list value or list type.
fn list_element_types(ctx: &mut dyn TypeContext, list: &NodeRef) -> Result<Vec<NodeRef>, Signal> {
    let elements = list.elements();
    let mut types = Vec::with_capacity(elements.len());
    for element in &elements {
        types.push(get_type(ctx, element)?);
    }
    sort_and_unique(ctx, types)
}

/// Deep value equality. `None` and `Any` act as wildcards; union members
/// are compared as types.
pub fn match_values(ctx: &mut dyn TypeContext, left: &NodeRef, right: &NodeRef) -> MatchResult {
    let mut visited = HashSet::new();
    values_inner(ctx, left, right, &mut visited)
}

fn values_inner(
    ctx: &mut dyn TypeContext,
    left: &NodeRef,
    right: &NodeRef,
    visited: &mut HashSet<(usize, usize)>,
) -> MatchResult {
    let left = deref(left);
    let right = deref(right);
    if left.ptr_eq(&right) || !visited.insert((left.id(), right.id())) {
        return Ok(true);
    }
    let left_node = left.borrow().clone();
    let right_node = right.borrow().clone();
    match (&left_node.kind, &right_node.kind) {
        (NodeKind::None | NodeKind::Any | NodeKind::NoValue, _)
        | (_, NodeKind::None | NodeKind::Any | NodeKind::NoValue) => Ok(true),
        (NodeKind::Number(a), NodeKind::Number(b)) => Ok(a == b),
        (NodeKind::String(a), NodeKind::String(b)) => Ok(a == b),
        (NodeKind::Boolean(a), NodeKind::Boolean(b)) => Ok(a == b),
        (NodeKind::List(a), NodeKind::List(b)) => {
            if a.elements.len() != b.elements.len() {
                return Ok(false);
            }
            for (x, y) in a.elements.iter().zip(b.elements.iter()) {
                if !values_inner(ctx, x, y, visited)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (NodeKind::Object(a), NodeKind::Object(b)) => {
            if a.len() != b.len() {
                return Ok(false);
            }
            for (key, x) in a.entries() {
                let Some(y) = b.get(key) else {
                    return Ok(false);
                };
                if !values_inner(ctx, x, y, visited)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (NodeKind::PipeList(a), NodeKind::PipeList(b)) => {
            if a.len() != b.len() {
                return Ok(false);
            }
            for (x, y) in a.iter().zip(b.iter()) {
                if !match_types(ctx, x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (NodeKind::Func(a), NodeKind::Func(b)) => Ok(match (&a.body, &b.body) {
            (Some(x), Some(y)) => x.ptr_eq(y),
            _ => a.name == b.name && a.params.len() == b.params.len(),
        }),
        (NodeKind::Lib(a), NodeKind::Lib(b)) => Ok(a.name == b.name),
        (NodeKind::Error(a), NodeKind::Error(b)) => Ok(a == b),
        (a, b) => Ok(a.same_kind(b) && is_unit(a)),
    }
}

fn is_unit(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Break | NodeKind::Continue)
}

/// Strict equality used by `==`: like `match_values` but `None` only
/// equals `None`.
pub fn strict_equals(ctx: &mut dyn TypeContext, left: &NodeRef, right: &NodeRef) -> MatchResult {
    let left = deref(left);
    let right = deref(right);
    let left_none = left.is_none();
    let right_none = right.is_none();
    if left_none || right_none {
        return Ok(left_none && right_none);
    }
    if left.is_type() || right.is_type() {
        return Ok(match_types(ctx, &left, &right)? && match_types(ctx, &right, &left)?);
    }
    if contains_none(&left) || contains_none(&right) {
        return strict_structural(ctx, &left, &right);
    }
    match_values(ctx, &left, &right)
}

fn contains_none(node: &NodeRef) -> bool {
    match &node.borrow().kind {
        NodeKind::List(list) => list.elements.iter().any(|item| item.is_none()),
        NodeKind::Object(object) => object.properties.values().any(|item| item.is_none()),
        _ => false,
    }
}

fn strict_structural(ctx: &mut dyn TypeContext, left: &NodeRef, right: &NodeRef) -> MatchResult {
    let pairs: Option<Vec<(NodeRef, NodeRef)>> = {
        let (l, r) = (left.borrow(), right.borrow());
        match (&l.kind, &r.kind) {
            (NodeKind::List(a), NodeKind::List(b)) if a.elements.len() == b.elements.len() => Some(
                a.elements
                    .iter()
                    .cloned()
                    .zip(b.elements.iter().cloned())
                    .collect(),
            ),
            (NodeKind::Object(a), NodeKind::Object(b)) if a.len() == b.len() => a
                .entries()
                .map(|(key, x)| b.get(key).map(|y| (x.clone(), y.clone())))
                .collect(),
            _ => None,
        }
    };
    let Some(pairs) = pairs else {
        return Ok(false);
    };
    for (x, y) in pairs {
        if !strict_equals(ctx, &x, &y)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node::{FuncNode, Param};
    use pretty_assertions::assert_eq;

    /// Refinement predicates here accept positive numbers.
    struct Fixed {
        types: HashMap<String, NodeRef>,
        calls: usize,
    }

    impl Fixed {
        fn new() -> Self {
            Self {
                types: HashMap::new(),
                calls: 0,
            }
        }
    }

    impl TypeContext for Fixed {
        fn resolve_decl(&mut self, name: &str) -> Option<NodeRef> {
            self.types.get(name).cloned()
        }

        fn call_refinement(&mut self, _: &NodeRef, value: &NodeRef) -> Result<NodeRef, Signal> {
            self.calls += 1;
            match value.as_number() {
                Some(n) => Ok(NodeRef::boolean(n > 0.0)),
                None => Ok(NodeRef::string("nope")),
            }
        }
    }

    fn number_type() -> NodeRef {
        let node = NodeRef::number(0.0);
        node.borrow_mut().ty.is_type = true;
        node.borrow_mut().ty.type_name = "Number".into();
        node
    }

    fn string_type() -> NodeRef {
        let node = NodeRef::string("");
        node.borrow_mut().ty.is_type = true;
        node.borrow_mut().ty.type_name = "String".into();
        node
    }

    fn positive() -> NodeRef {
        let func = NodeRef::from_kind(NodeKind::Func(FuncNode {
            name: "Positive".into(),
            params: vec![Param {
                name: "n".into(),
                ty: Some(number_type()),
                default: None,
            }],
            ..FuncNode::default()
        }));
        {
            let mut inner = func.borrow_mut();
            inner.ty.is_type = true;
            inner.ty.is_refinement_type = true;
            inner.ty.type_name = "Positive".into();
        }
        func
    }

    #[test]
    fn get_type_is_reflexive() {
        let mut ctx = Fixed::new();
        let values = vec![
            NodeRef::number(1.0),
            NodeRef::string("a"),
            NodeRef::list(vec![NodeRef::number(1.0), NodeRef::string("b")]),
            NodeRef::object(vec![("a".into(), NodeRef::number(1.0))]),
            NodeRef::none(),
        ];
        for value in values {
            let ty = get_type(&mut ctx, &value).expect("type");
            let copy = NodeRef::new(ty.borrow().clone());
            assert!(match_types(&mut ctx, &ty, &copy).expect("match"));
            assert!(match_types(&mut ctx, &ty, &value).expect("match"));
        }
    }

    #[test]
    fn union_is_idempotent_and_any_absorbs() {
        let mut ctx = Fixed::new();
        let members = vec![string_type(), number_type(), string_type(), number_type()];
        let once = sort_and_unique(&mut ctx, members).expect("unique");
        assert_eq!(once.len(), 2);
        let twice = sort_and_unique(&mut ctx, once.clone()).expect("unique");
        assert_eq!(twice.len(), 2);
        assert!(twice.iter().zip(once.iter()).all(|(a, b)| a.ptr_eq(b)));

        let any = sort_and_unique(&mut ctx, vec![number_type(), NodeRef::any(), string_type()])
            .expect("unique");
        assert_eq!(any.len(), 1);
        assert!(any[0].is_any());
    }

    #[test]
    fn union_accepts_any_member() {
        let mut ctx = Fixed::new();
        let union = NodeRef::pipe_list(vec![number_type(), string_type()]);
        assert!(match_types(&mut ctx, &union, &NodeRef::number(3.0)).expect("match"));
        assert!(match_types(&mut ctx, &union, &NodeRef::string("x")).expect("match"));
        assert!(!match_types(&mut ctx, &union, &NodeRef::boolean(true)).expect("match"));
    }

    #[test]
    fn value_side_union_requires_subset() {
        let mut ctx = Fixed::new();
        let wide = NodeRef::pipe_list(vec![number_type(), string_type()]);
        let narrow = NodeRef::pipe_list(vec![number_type()]);
        assert!(match_types(&mut ctx, &wide, &narrow).expect("match"));
        assert!(!match_types(&mut ctx, &narrow, &wide).expect("match"));
    }

    #[test]
    fn literal_types_compare_values() {
        let mut ctx = Fixed::new();
        let literal = to_type(&NodeRef::string("up"));
        assert!(literal.borrow().ty.is_literal_type);
        assert!(match_types(&mut ctx, &literal, &NodeRef::string("up")).expect("match"));
        assert!(!match_types(&mut ctx, &literal, &NodeRef::string("down")).expect("match"));
    }

    #[test]
    fn refinement_prechecks_parameter_type() {
        let mut ctx = Fixed::new();
        let ty = positive();
        assert!(match_types(&mut ctx, &ty, &NodeRef::number(5.0)).expect("match"));
        assert!(!match_types(&mut ctx, &ty, &NodeRef::number(-5.0)).expect("match"));
        let calls = ctx.calls;
        assert!(!match_types(&mut ctx, &ty, &NodeRef::string("a")).expect("match"));
        assert_eq!(ctx.calls, calls);
    }

    #[test]
    fn refinement_must_return_boolean() {
        let mut ctx = Fixed::new();
        let ty = positive();
        if let NodeKind::Func(func) = &mut ty.borrow_mut().kind {
            func.params[0].ty = None;
        }
        let err = match_types(&mut ctx, &ty, &NodeRef::string("a")).expect_err("must fail");
        assert!(matches!(
            err.error(),
            Some(RuntimeError::RefinementNotBoolean { .. })
        ));
    }

    #[test]
    fn objects_match_structurally_and_nominally() {
        let mut ctx = Fixed::new();
        let ty = to_type(&NodeRef::object(vec![
            ("a".into(), number_type()),
            ("b".into(), string_type()),
        ]));
        let value = NodeRef::object(vec![
            ("a".into(), NodeRef::number(1.0)),
            ("b".into(), NodeRef::string("x")),
        ]);
        assert!(match_types(&mut ctx, &ty, &value).expect("match"));
        let short = NodeRef::object(vec![("a".into(), NodeRef::number(1.0))]);
        assert!(!match_types(&mut ctx, &ty, &short).expect("match"));

        ty.borrow_mut().ty.type_name = "T".into();
        short.borrow_mut().ty.type_name = "T".into();
        assert!(match_types(&mut ctx, &ty, &short).expect("match"));
    }

    #[test]
    fn recursive_type_terminates() {
        let mut ctx = Fixed::new();
        let node_type = NodeRef::object(vec![]);
        {
            let mut inner = node_type.borrow_mut();
            inner.ty.is_type = true;
        }
        let next = NodeRef::pipe_list(vec![node_type.clone(), to_type(&NodeRef::none())]);
        if let NodeKind::Object(object) = &mut node_type.borrow_mut().kind {
            object.insert("value".into(), number_type());
            object.insert("next".into(), next);
        }
        let leaf = NodeRef::object(vec![
            ("value".into(), NodeRef::number(1.0)),
            ("next".into(), NodeRef::none()),
        ]);
        let head = NodeRef::object(vec![
            ("value".into(), NodeRef::number(2.0)),
            ("next".into(), leaf),
        ]);
        assert!(match_types(&mut ctx, &node_type, &head).expect("match"));
        let ty = get_type(&mut ctx, &head).expect("type");
        assert!(match_types(&mut ctx, &node_type, &ty).expect("match"));
    }

    #[test]
    fn forward_declarations_resolve_and_memoize() {
        let mut ctx = Fixed::new();
        let placeholder = NodeRef::any();
        {
            let mut inner = placeholder.borrow_mut();
            inner.kind = NodeKind::Object(ObjectNode::default());
            inner.ty.is_decl = true;
            inner.ty.type_name = "Later".into();
        }
        ctx.types.insert("Later".into(), number_type());
        assert!(match_types(&mut ctx, &placeholder, &NodeRef::number(1.0)).expect("match"));
        assert!(!placeholder.borrow().ty.is_decl);
        assert!(placeholder.as_number().is_some());
    }

    #[test]
    fn list_elements_match_as_subset() {
        let mut ctx = Fixed::new();
        let ty = to_type(&NodeRef::list(vec![number_type()]));
        let numbers = NodeRef::list(vec![NodeRef::number(1.0), NodeRef::number(2.0)]);
        let mixed = NodeRef::list(vec![NodeRef::number(1.0), NodeRef::string("a")]);
        assert!(match_types(&mut ctx, &ty, &numbers).expect("match"));
        assert!(!match_types(&mut ctx, &ty, &mixed).expect("match"));
        assert!(match_types(&mut ctx, &ty, &NodeRef::list(vec![])).expect("match"));
    }

    #[test]
    fn match_values_treats_none_as_wildcard_but_equality_does_not() {
        let mut ctx = Fixed::new();
        let none = NodeRef::none();
        let five = NodeRef::number(5.0);
        assert!(match_values(&mut ctx, &none, &five).expect("values"));
        assert!(!strict_equals(&mut ctx, &none, &five).expect("equals"));
        assert!(strict_equals(&mut ctx, &none, &NodeRef::none()).expect("equals"));
    }
}
