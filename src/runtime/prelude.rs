//! Built-in type names and the global bindings every interpreter starts with.

use crate::runtime::{
    environment::Environment,
    node::{FuncNode, ListNode, Node, NodeKind, NodeRef, ObjectNode},
};

/// Functions intercepted by name before normal call resolution.
pub const BUILTINS: &[&str] = &[
    "typeof", "type", "tags", "meta", "import", "print", "println", "del", "refcount", "error",
    "string", "number", "eval", "evals", "load_lib", "exit",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Names bound in the global scope of a fresh interpreter.
pub const PRELUDE_NAMES: &[&str] = &[
    "Number", "String", "Boolean", "Object", "List", "Function", "Any", "None", "argv",
];

pub fn is_prelude(name: &str) -> bool {
    PRELUDE_NAMES.contains(&name)
}

pub fn install(env: &mut Environment, args: &[String]) {
    env.define_global("Number", number_type());
    env.define_global("String", string_type());
    env.define_global("Boolean", boolean_type());
    env.define_global("Object", object_type());
    env.define_global("List", list_type());
    env.define_global("Function", function_type());
    env.define_global("Any", NodeRef::any());
    env.define_global("None", NodeRef::none());
    let argv = args.iter().map(NodeRef::string).collect();
    env.define_global("argv", NodeRef::list(argv));
}

fn named_type(kind: NodeKind, name: &str) -> NodeRef {
    let mut node = Node::new(kind);
    node.ty.is_type = true;
    node.ty.type_name = name.to_string();
    NodeRef::new(node)
}

fn general_type(kind: NodeKind, name: &str) -> NodeRef {
    let node = named_type(kind, name);
    node.borrow_mut().ty.is_general_type = true;
    node
}

pub fn number_type() -> NodeRef {
    named_type(NodeKind::Number(0.0), "Number")
}

pub fn string_type() -> NodeRef {
    named_type(NodeKind::String(String::new()), "String")
}

pub fn boolean_type() -> NodeRef {
    named_type(NodeKind::Boolean(false), "Boolean")
}

pub fn object_type() -> NodeRef {
    general_type(NodeKind::Object(ObjectNode::default()), "Object")
}

pub fn list_type() -> NodeRef {
    general_type(
        NodeKind::List(ListNode {
            elements: Vec::new(),
            is_union: false,
        }),
        "List",
    )
}

pub fn function_type() -> NodeRef {
    general_type(
        NodeKind::Func(FuncNode {
            is_signature: true,
            ..FuncNode::default()
        }),
        "Function",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_binds_every_name() {
        let mut env = Environment::new();
        install(&mut env, &["a".to_string()]);
        for name in PRELUDE_NAMES {
            assert!(env.get(name).is_some(), "{name} missing");
        }
        let argv = env.get("argv").expect("argv").elements();
        assert_eq!(argv[0].as_string().as_deref(), Some("a"));
    }

    #[test]
    fn general_types_are_flagged() {
        assert!(list_type().borrow().ty.is_general_type);
        assert!(!number_type().borrow().ty.is_general_type);
        assert_eq!(number_type().type_name(), "Number");
    }
}
