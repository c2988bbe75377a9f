//! Human readable rendering of nodes.
//!
//! `repr` is a short tag for error messages; `printable` renders values
//! and type descriptors the way `print` shows them.

use crate::runtime::node::{FuncNode, Node, NodeKind, NodeRef};
use std::collections::HashSet;

/// Short, non-recursive tag for a node.
pub fn repr<R>(node: &Node<R>) -> String {
    match &node.kind {
        NodeKind::Id(name) => format!("Id({name})"),
        NodeKind::Number(value) => format!("Number({})", format_number(*value)),
        NodeKind::String(value) => format!("String({value:?})"),
        NodeKind::Boolean(value) => format!("Boolean({value})"),
        NodeKind::List(list) => format!("List[{}]", list.elements.len()),
        NodeKind::PipeList(members) => format!("PipeList[{}]", members.len()),
        NodeKind::Object(object) if !node.ty.type_name.is_empty() => {
            format!("{}{{{}}}", node.ty.type_name, object.len())
        }
        NodeKind::Object(object) => format!("Object{{{}}}", object.len()),
        NodeKind::Func(func) if func.name.is_empty() => "Function".into(),
        NodeKind::Func(func) => format!("Function({})", func.name),
        NodeKind::Error(message) => format!("Error({message})"),
        NodeKind::Lib(lib) => format!("Lib({})", lib.name),
        other => other.name().to_string(),
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Renders a value or type descriptor. Cycles print as `...`.
pub fn printable(node: &NodeRef) -> String {
    let mut bases = HashSet::new();
    render(node, &mut bases, false)
}

/// Renders a function's parameter list and return type, e.g.
/// `add(a: Number, b: Number) -> Number`.
pub fn signature(func: &NodeRef) -> String {
    let mut bases = HashSet::new();
    let node = func.borrow();
    match &node.kind {
        NodeKind::Func(inner) => render_signature(inner, &mut bases),
        _ => repr(&node),
    }
}

fn render(node: &NodeRef, bases: &mut HashSet<usize>, nested: bool) -> String {
    if !bases.insert(node.id()) {
        return "...".into();
    }
    let text = render_inner(node, bases, nested);
    bases.remove(&node.id());
    text
}

fn render_inner(node: &NodeRef, bases: &mut HashSet<usize>, nested: bool) -> String {
    let inner = node.borrow();
    let is_type = inner.ty.is_type;
    let is_literal = inner.ty.is_literal_type;
    match &inner.kind {
        NodeKind::Number(_) if is_type && !is_literal => type_label(&inner, "Number"),
        NodeKind::String(_) if is_type && !is_literal => type_label(&inner, "String"),
        NodeKind::Boolean(_) if is_type && !is_literal => type_label(&inner, "Boolean"),
        NodeKind::Number(value) => format_number(*value),
        NodeKind::String(value) if nested || is_literal => format!("{value:?}"),
        NodeKind::String(value) => value.clone(),
        NodeKind::Boolean(value) => value.to_string(),
        NodeKind::Id(name) => name.clone(),
        NodeKind::None => "None".into(),
        NodeKind::Any => "Any".into(),
        NodeKind::NoValue => String::new(),
        NodeKind::Error(message) => format!("Error: {message}"),
        NodeKind::Lib(lib) => format!("<lib {}>", lib.name),
        NodeKind::Pointer(target) => {
            let target = target.clone();
            drop(inner);
            render(&target, bases, nested)
        }
        NodeKind::PipeList(members) => {
            let members = members.clone();
            drop(inner);
            members
                .iter()
                .map(|member| render(member, bases, true))
                .collect::<Vec<_>>()
                .join(" | ")
        }
        NodeKind::List(list) if list.is_union => {
            let elements = list.elements.clone();
            drop(inner);
            elements
                .iter()
                .map(|member| render(member, bases, true))
                .collect::<Vec<_>>()
                .join(" | ")
        }
        NodeKind::List(_) if is_type && inner.ty.is_general_type => "List".into(),
        NodeKind::List(list) => {
            let elements = list.elements.clone();
            drop(inner);
            let items: Vec<String> = elements
                .iter()
                .map(|item| render(item, bases, true))
                .collect();
            format!("[{}]", items.join(", "))
        }
        NodeKind::Object(_) if is_type && inner.ty.is_general_type => "Object".into(),
        NodeKind::Object(_) if is_type && nested && !inner.ty.type_name.is_empty() => {
            inner.ty.type_name.clone()
        }
        NodeKind::Object(object) => {
            let prefix = if !is_type && !inner.ty.type_name.is_empty() {
                format!("{} ", inner.ty.type_name)
            } else {
                String::new()
            };
            let entries: Vec<(String, NodeRef)> = object
                .entries()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            drop(inner);
            let fields: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{key}: {}", render(value, bases, true)))
                .collect();
            format!("{prefix}{{{}}}", fields.join(", "))
        }
        NodeKind::Func(_) if inner.ty.is_general_type => "Function".into(),
        NodeKind::Func(_) if inner.ty.is_refinement_type || inner.ty.is_type_function => {
            type_label(&inner, "Function")
        }
        NodeKind::Func(func) => {
            let func = func.clone();
            drop(inner);
            format!("fn {}", render_signature(&func, bases))
        }
        _ => repr(&inner),
    }
}

fn type_label(node: &Node, fallback: &str) -> String {
    if node.ty.type_name.is_empty() {
        fallback.to_string()
    } else {
        node.ty.type_name.clone()
    }
}

fn render_signature(func: &FuncNode, bases: &mut HashSet<usize>) -> String {
    let params: Vec<String> = func
        .params
        .iter()
        .map(|param| match &param.ty {
            Some(ty) => format!("{}: {}", param.name, render(ty, bases, true)),
            None => param.name.clone(),
        })
        .collect();
    let mut text = format!("{}({})", func.name, params.join(", "));
    if let Some(ret) = func.return_type.as_ref().or(func.inferred_return.as_ref()) {
        text.push_str(" -> ");
        text.push_str(&render(ret, bases, true));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node::Param;

    #[test]
    fn numbers_print_without_trailing_zero() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn nested_strings_are_quoted() {
        let list = NodeRef::list(vec![NodeRef::string("a"), NodeRef::number(1.0)]);
        assert_eq!(printable(&list), "[\"a\", 1]");
        assert_eq!(printable(&NodeRef::string("a")), "a");
    }

    #[test]
    fn cyclic_objects_terminate() {
        let object = NodeRef::object(vec![("n".into(), NodeRef::number(1.0))]);
        if let NodeKind::Object(inner) = &mut object.borrow_mut().kind {
            inner.insert("me".into(), object.clone());
        }
        assert_eq!(printable(&object), "{n: 1, me: ...}");
    }

    #[test]
    fn signature_lists_param_types() {
        let number = NodeRef::number(0.0);
        number.borrow_mut().ty.is_type = true;
        let func = NodeRef::from_kind(NodeKind::Func(FuncNode {
            name: "add".into(),
            params: vec![
                Param {
                    name: "a".into(),
                    ty: Some(number.clone()),
                    default: None,
                },
                Param {
                    name: "b".into(),
                    ty: None,
                    default: None,
                },
            ],
            return_type: Some(number),
            ..FuncNode::default()
        }));
        assert_eq!(signature(&func), "add(a: Number, b) -> Number");
    }
}
