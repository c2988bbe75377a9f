//! Structural copies and whole-graph metadata walks.

use crate::runtime::node::{NodeKind, NodeRef};
use std::collections::{HashMap, HashSet};

/// Deep-copies a value so the copy can be mutated without affecting the
/// source. Lists and objects are copied recursively (cycles preserved);
/// type descriptors and functions get a fresh top node that shares its
/// children. Hooks and constness are not carried over.
pub fn copy_node(node: &NodeRef) -> NodeRef {
    let mut visited = HashMap::new();
    copy_inner(node, &mut visited)
}

fn copy_inner(node: &NodeRef, visited: &mut HashMap<usize, NodeRef>) -> NodeRef {
    if let Some(copied) = visited.get(&node.id()) {
        return copied.clone();
    }
    let mut shell = node.borrow().clone();
    shell.meta.is_const = false;
    shell.meta.on_change = None;
    shell.meta.on_call = None;
    shell.meta.on_init = None;
    if shell.ty.is_type {
        return NodeRef::new(shell);
    }
    let copy = NodeRef::new(shell);
    visited.insert(node.id(), copy.clone());

    let children = match &copy.borrow().kind {
        NodeKind::List(list) => Some(list.elements.clone()),
        NodeKind::Object(object) => Some(
            object
                .keys
                .iter()
                .filter_map(|key| object.properties.get(key).cloned())
                .collect(),
        ),
        _ => None,
    };
    let Some(children) = children else {
        return copy;
    };
    let copied: Vec<NodeRef> = children
        .iter()
        .map(|child| copy_inner(child, visited))
        .collect();
    match &mut copy.borrow_mut().kind {
        NodeKind::List(list) => list.elements = copied,
        NodeKind::Object(object) => {
            for (key, value) in object.keys.clone().into_iter().zip(copied) {
                object.properties.insert(key, value);
            }
        }
        _ => {}
    }
    copy
}

/// Marks a value and everything it contains as constant (or not).
pub fn set_const_deep(node: &NodeRef, is_const: bool) {
    walk_values(node, &mut |item| item.borrow_mut().meta.is_const = is_const);
}

/// Appends tags to a value and propagates them to its children.
pub fn tag_deep(node: &NodeRef, tags: &[String]) {
    walk_values(node, &mut |item| {
        let mut inner = item.borrow_mut();
        for tag in tags {
            if !inner.meta.tags.contains(tag) {
                inner.meta.tags.push(tag.clone());
            }
        }
    });
}

/// Visits a value and its list elements / object properties once each.
/// Type descriptors are not descended into.
fn walk_values(node: &NodeRef, visit: &mut dyn FnMut(&NodeRef)) {
    let mut seen = HashSet::new();
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        if !seen.insert(current.id()) {
            continue;
        }
        visit(&current);
        let inner = current.borrow();
        if inner.ty.is_type {
            continue;
        }
        match &inner.kind {
            NodeKind::List(list) => stack.extend(list.elements.iter().cloned()),
            NodeKind::Object(object) => stack.extend(object.properties.values().cloned()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_do_not_alias_nested_values() {
        let inner = NodeRef::list(vec![NodeRef::number(1.0)]);
        let outer = NodeRef::object(vec![("items".into(), inner.clone())]);
        let copy = copy_node(&outer);

        let copied_items = copy.property("items").expect("items");
        assert!(!copied_items.ptr_eq(&inner));
        copied_items.elements()[0].overwrite_with(&NodeRef::number(9.0));
        assert_eq!(inner.elements()[0].as_number(), Some(1.0));
    }

    #[test]
    fn copies_preserve_cycles() {
        let object = NodeRef::object(vec![]);
        if let NodeKind::Object(inner) = &mut object.borrow_mut().kind {
            inner.insert("me".into(), object.clone());
        }
        let copy = copy_node(&object);
        let me = copy.property("me").expect("me");
        assert!(me.ptr_eq(&copy));
    }

    #[test]
    fn types_share_their_children() {
        let field = NodeRef::any();
        let ty = NodeRef::object(vec![("a".into(), field.clone())]);
        ty.borrow_mut().ty.is_type = true;
        let copy = copy_node(&ty);
        assert!(!copy.ptr_eq(&ty));
        assert!(copy.property("a").is_some_and(|a| a.ptr_eq(&field)));
    }

    #[test]
    fn const_and_tags_reach_children() {
        let list = NodeRef::list(vec![NodeRef::number(1.0)]);
        set_const_deep(&list, true);
        tag_deep(&list, &["hot".to_string()]);
        let element = list.elements()[0].clone();
        assert!(element.borrow().meta.is_const);
        assert_eq!(element.borrow().meta.tags, vec!["hot".to_string()]);
        assert!(!copy_node(&list).borrow().meta.is_const);
    }
}
