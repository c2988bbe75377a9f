//! Thread-portable copies of node graphs.
//!
//! A live graph (`Rc<RefCell<_>>` links) cannot cross threads, so it is
//! frozen into an index arena of `Node<usize>` and thawed on the other side
//! with sharing and cycles intact.

use crate::runtime::node::{Node, NodeRef};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Snapshot {
    nodes: Vec<Node<usize>>,
    roots: Vec<usize>,
}

impl Snapshot {
    /// Freezes every node reachable from `roots`.
    pub fn freeze(roots: &[NodeRef]) -> Self {
        let mut index: HashMap<usize, usize> = HashMap::new();
        let mut order: Vec<NodeRef> = Vec::new();
        let mut pending: Vec<NodeRef> = roots.to_vec();
        while let Some(node) = pending.pop() {
            if index.contains_key(&node.id()) {
                continue;
            }
            index.insert(node.id(), order.len());
            node.borrow()
                .for_each_ref(&mut |child: &NodeRef| pending.push(child.clone()));
            order.push(node);
        }
        let nodes = order
            .iter()
            .map(|node| node.borrow().map(&mut |child: &NodeRef| index[&child.id()]))
            .collect();
        let roots = roots.iter().map(|root| index[&root.id()]).collect();
        Self { nodes, roots }
    }

    /// Rebuilds the graph and returns the roots in the order they were frozen.
    pub fn thaw(&self) -> Vec<NodeRef> {
        let cells: Vec<NodeRef> = self
            .nodes
            .iter()
            .map(|_| NodeRef::new(Node::default()))
            .collect();
        for (cell, frozen) in cells.iter().zip(&self.nodes) {
            let node = frozen.map(&mut |child: &usize| cells[*child].clone());
            *cell.borrow_mut() = node;
        }
        self.roots.iter().map(|root| cells[*root].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node::NodeKind;

    fn assert_send<T: Send>() {}

    #[test]
    fn snapshots_are_send() {
        assert_send::<Snapshot>();
    }

    #[test]
    fn thaw_preserves_sharing_and_cycles() {
        let shared = NodeRef::number(7.0);
        let object = NodeRef::object(vec![
            ("a".into(), shared.clone()),
            ("b".into(), shared.clone()),
        ]);
        if let NodeKind::Object(inner) = &mut object.borrow_mut().kind {
            inner.insert("me".into(), object.clone());
        }

        let snapshot = Snapshot::freeze(&[object, NodeRef::string("x")]);
        assert_eq!(snapshot.len(), 3);
        let roots = snapshot.thaw();
        let object = &roots[0];
        let a = object.property("a").expect("a");
        let b = object.property("b").expect("b");
        assert!(a.ptr_eq(&b));
        assert_eq!(a.as_number(), Some(7.0));
        assert!(object.property("me").is_some_and(|me| me.ptr_eq(object)));
        assert_eq!(roots[1].as_string().as_deref(), Some("x"));
    }
}
