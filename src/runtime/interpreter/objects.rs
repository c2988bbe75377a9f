use super::{detach, ops::list_index, Interpreter};
use crate::runtime::{
    error::{EvalResult, RuntimeError, Signal},
    matcher::{deref, get_type, match_types},
    node::{AccessorNode, HookKind, Node, NodeKind, NodeRef, ObjectNode},
    printer::printable,
};

pub(super) const INIT: &str = "_init";

impl Interpreter {
    pub(super) fn eval_object(&mut self, object: &ObjectNode) -> EvalResult {
        if let Some(ty) = &object.instance_of {
            return self.instantiate(ty, object);
        }
        let mut fields = ObjectNode::default();
        for (key, expr) in object.entries() {
            let value = self.eval(expr)?;
            fields.insert(key.clone(), detach(&deref(&value)));
        }
        Ok(NodeRef::from_kind(NodeKind::Object(fields)))
    }

    /// `X { field: value }`: fills defaults, checks every field against the
    /// declared type, then runs `_init` and the type's `onInit` hook.
    fn instantiate(&mut self, ty_expr: &NodeRef, literal: &ObjectNode) -> EvalResult {
        let ty = deref(&self.eval(ty_expr)?);
        let (fields, defaults, type_name, general) = match &ty.borrow().kind {
            NodeKind::Object(fields) if ty.is_type() => (
                fields
                    .entries()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<Vec<_>>(),
                fields.defaults.clone(),
                ty.type_name(),
                ty.borrow().ty.is_general_type,
            ),
            _ => {
                return Err(RuntimeError::mismatch(format!(
                    "{} is not an object type",
                    printable(&ty)
                ))
                .into())
            }
        };
        if general {
            let mut plain = literal.clone();
            plain.instance_of = None;
            return self.eval_object(&plain);
        }

        let mut supplied = Vec::with_capacity(literal.len());
        for (key, expr) in literal.entries() {
            if !fields.iter().any(|(field, _)| field == key) {
                return Err(RuntimeError::mismatch(format!(
                    "unknown field '{key}' for type {type_name}"
                ))
                .into());
            }
            let value = deref(&self.eval(expr)?);
            supplied.push((key.clone(), detach(&value)));
        }

        let mut instance = ObjectNode::default();
        let mut init = None;
        for (key, field_type) in &fields {
            if key == INIT {
                init = Some(field_type.clone());
                continue;
            }
            let value = supplied
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
                .or_else(|| defaults.get(key).map(detach))
                .ok_or_else(|| {
                    RuntimeError::mismatch(format!("missing field '{key}' for type {type_name}"))
                })?;
            if !match_types(self, field_type, &value)? {
                let actual = get_type(self, &value)?;
                return Err(RuntimeError::mismatch(format!(
                    "field '{key}' of {type_name} expects {}, got {}",
                    printable(field_type),
                    printable(&actual)
                ))
                .into());
            }
            value.borrow_mut().ty.ty = Some(field_type.clone());
            instance.insert(key.clone(), value);
        }

        let mut node = Node::new(NodeKind::Object(instance));
        node.ty.type_name = type_name;
        let instance = NodeRef::new(node);

        if let Some(init) = init.filter(NodeRef::is_func) {
            self.call_function(&init, Vec::new(), Some(instance.clone()))?;
        }
        let hook = ty.borrow().meta.hook(HookKind::OnInit);
        if let Some(hook) = hook {
            self.call_hook(&hook, instance.clone())?;
        }
        Ok(instance)
    }

    pub(super) fn get_member(&mut self, target: &NodeRef, name: &str) -> EvalResult {
        let found = match &target.borrow().kind {
            NodeKind::Object(object) => object.get(name).cloned(),
            NodeKind::List(list) if name == "length" => {
                Some(NodeRef::number(list.elements.len() as f64))
            }
            NodeKind::String(text) if name == "length" => {
                Some(NodeRef::number(text.chars().count() as f64))
            }
            NodeKind::Lib(lib) => {
                return Err(RuntimeError::unsupported(format!(
                    "library functions must be called: {}.{name}(...)",
                    lib.name
                ))
                .into())
            }
            _ => None,
        };
        found.ok_or_else(|| RuntimeError::undefined("property", name).into())
    }

    pub(super) fn eval_accessor(&mut self, accessor: &AccessorNode) -> EvalResult {
        let target = deref(&self.eval(&accessor.target)?);
        let index = deref(&self.eval(&accessor.index)?);
        let result = match (&target.borrow().kind, &index.borrow().kind) {
            (NodeKind::List(list), NodeKind::Number(position)) => {
                let slot = list_index(list.elements.len(), *position)?;
                list.elements[slot].clone()
            }
            (NodeKind::String(text), NodeKind::Number(position)) => {
                let chars: Vec<char> = text.chars().collect();
                let slot = list_index(chars.len(), *position)?;
                NodeRef::string(chars[slot].to_string())
            }
            (NodeKind::Object(object), NodeKind::String(key)) => object
                .get(key)
                .cloned()
                .ok_or_else(|| RuntimeError::undefined("property", key.clone()))?,
            (target, index) => {
                return Err(RuntimeError::mismatch(format!(
                    "cannot index {} with {}",
                    target.name(),
                    index.name()
                ))
                .into())
            }
        };
        Ok(result)
    }

    /// Methods every list, string and object has unless a property of the
    /// same name shadows them. `None` when `method` is not one of them.
    pub(super) fn call_intrinsic(
        &mut self,
        receiver: &NodeRef,
        method: &str,
        args: &[NodeRef],
    ) -> Result<Option<NodeRef>, Signal> {
        let kind = receiver.borrow().kind.clone();
        let result = match (&kind, method) {
            (NodeKind::List(list), "length") | (NodeKind::List(list), "len") => {
                NodeRef::number(list.elements.len() as f64)
            }
            (NodeKind::List(_), "push") => {
                if receiver.borrow().meta.is_const {
                    return Err(RuntimeError::ConstViolation {
                        name: "list".to_string(),
                    }
                    .into());
                }
                let added: Vec<NodeRef> = args.iter().map(|arg| detach(&deref(arg))).collect();
                if let NodeKind::List(list) = &mut receiver.borrow_mut().kind {
                    list.elements.extend(added);
                }
                receiver.clone()
            }
            (NodeKind::List(_), "pop") => {
                if receiver.borrow().meta.is_const {
                    return Err(RuntimeError::ConstViolation {
                        name: "list".to_string(),
                    }
                    .into());
                }
                let popped = match &mut receiver.borrow_mut().kind {
                    NodeKind::List(list) => list.elements.pop(),
                    _ => None,
                };
                popped.unwrap_or_else(NodeRef::none)
            }
            (NodeKind::String(text), "length") | (NodeKind::String(text), "len") => {
                NodeRef::number(text.chars().count() as f64)
            }
            (NodeKind::Object(object), "keys") => {
                NodeRef::list(object.keys.iter().map(NodeRef::string).collect())
            }
            (NodeKind::Object(object), "values") => {
                NodeRef::list(object.entries().map(|(_, value)| value.clone()).collect())
            }
            (NodeKind::Object(object), "items") => NodeRef::list(
                object
                    .entries()
                    .map(|(key, value)| NodeRef::list(vec![NodeRef::string(key), value.clone()]))
                    .collect(),
            ),
            _ => return Ok(None),
        };
        Ok(Some(result))
    }
}
