use super::{detach, ops::is_reference, Interpreter};
use crate::runtime::{
    copy::{copy_node, set_const_deep},
    error::{EvalResult, RuntimeError},
    matcher::{deref, get_type, match_types, to_type},
    node::{
        DeclNode, EnumDeclNode, FieldDecl, FuncNode, Node, NodeKind, NodeRef, ObjectNode, Param,
        TypeBody, TypeDeclNode,
    },
    printer::printable,
};

/// Placeholder for a type name that is not bound yet; the matcher resolves
/// it by name on first use.
pub(super) fn forward_decl(name: &str) -> NodeRef {
    let mut node = Node::new(NodeKind::Object(ObjectNode::default()));
    node.ty.is_type = true;
    node.ty.is_decl = true;
    node.ty.type_name = name.to_string();
    NodeRef::new(node)
}

impl Interpreter {
    /// Evaluates an expression in type position.
    pub(super) fn eval_type(&mut self, expr: &NodeRef) -> EvalResult {
        self.type_depth += 1;
        let result = self.eval(expr);
        self.type_depth -= 1;
        Ok(to_type(&result?))
    }

    pub(super) fn eval_declaration(&mut self, decl: &DeclNode, constant: bool) -> EvalResult {
        let declared = match &decl.ty {
            Some(ty) => Some(self.eval_type(ty)?),
            None => None,
        };
        let by_ref = decl.value.as_ref().is_some_and(is_reference);
        let value = match &decl.value {
            Some(expr) => deref(&self.eval(expr)?),
            None => NodeRef::no_value(),
        };

        if let Some(existing) = self.env.lookup_local(&decl.name) {
            if existing.is_func() && value.is_func() && !existing.ptr_eq(&value) {
                self.add_dispatch(&decl.name, &existing, &value);
                return Ok(existing);
            }
            return Err(RuntimeError::Redeclared {
                name: decl.name.clone(),
            }
            .into());
        }

        if let Some(ty) = &declared {
            let unset = value.is_kind(|kind| matches!(kind, NodeKind::NoValue));
            if !unset && !match_types(self, ty, &value)? {
                let actual = get_type(self, &value)?;
                return Err(RuntimeError::mismatch(format!(
                    "'{}' is declared as {} but was given {}",
                    decl.name,
                    printable(ty),
                    printable(&actual)
                ))
                .into());
            }
        }

        let bound = if by_ref || value.is_func() {
            value
        } else {
            copy_node(&value)
        };
        if !by_ref {
            bound.borrow_mut().ty.ty = declared;
        }
        if constant {
            set_const_deep(&bound, true);
        }
        self.env.define(&decl.name, bound.clone());
        Ok(bound)
    }

    fn add_dispatch(&mut self, name: &str, existing: &NodeRef, candidate: &NodeRef) {
        if let NodeKind::Func(func) = &mut existing.borrow_mut().kind {
            func.dispatch.push(candidate.clone());
            tracing::debug!(
                function = name,
                candidates = func.dispatch.len() + 1,
                "registered dispatch candidate"
            );
        }
    }

    /// Turns a function literal into a closure over everything visible.
    pub(super) fn eval_function(&mut self, syntax: &NodeRef, func: &FuncNode) -> EvalResult {
        let pos = syntax.pos();
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let ty = match &param.ty {
                Some(ty) => Some(self.eval_type(ty)?),
                None => None,
            };
            let default = match &param.default {
                Some(value) if !func.is_signature => Some(detach(&deref(&self.eval(value)?))),
                _ => None,
            };
            params.push(Param {
                name: param.name.clone(),
                ty,
                default,
            });
        }
        let return_type = match &func.return_type {
            Some(ty) => Some(self.eval_type(ty)?),
            None => func.inferred_return.clone(),
        };

        if func.is_signature {
            let mut node = Node::new(NodeKind::Func(FuncNode {
                name: func.name.clone(),
                params,
                return_type,
                is_signature: true,
                ..FuncNode::default()
            }))
            .at(pos);
            node.ty.is_type = true;
            return Ok(NodeRef::new(node));
        }

        let closure = self.env.flatten();
        let recursive = !func.name.is_empty()
            && !closure
                .get(&func.name)
                .is_some_and(|existing| existing.is_func());
        let node = NodeRef::new(
            Node::new(NodeKind::Func(FuncNode {
                name: func.name.clone(),
                params,
                body: func.body.clone(),
                closure,
                return_type,
                ..FuncNode::default()
            }))
            .at(pos),
        );
        if recursive {
            if let NodeKind::Func(inner) = &mut node.borrow_mut().kind {
                inner.closure.insert(func.name.clone(), node.clone());
            }
        }
        Ok(node)
    }

    pub(super) fn eval_type_decl(&mut self, decl: &TypeDeclNode) -> EvalResult {
        if let Some(existing) = self.env.lookup_local(&decl.name) {
            if !existing.borrow().ty.is_decl {
                return Err(RuntimeError::Redeclared {
                    name: decl.name.clone(),
                }
                .into());
            }
        }
        let node = match &decl.body {
            TypeBody::Fields(fields) => return self.declare_object_type(&decl.name, fields),
            TypeBody::Refinement(func) => {
                let predicate = self.eval(func)?;
                {
                    let mut inner = predicate.borrow_mut();
                    inner.ty.is_type = true;
                    inner.ty.is_refinement_type = true;
                    inner.ty.type_name = decl.name.clone();
                }
                predicate
            }
            TypeBody::Function(func) => {
                let constructor = self.eval(func)?;
                mark_type_function(&constructor, &decl.name);
                constructor
            }
            TypeBody::Alias(expr) => {
                let value = self.eval_type(expr)?;
                if value.is_func() && !value.is_type() {
                    let constructor = copy_node(&value);
                    mark_type_function(&constructor, &decl.name);
                    constructor
                } else {
                    value
                }
            }
        };
        self.env.define(&decl.name, node.clone());
        Ok(node)
    }

    /// `type X { ... }`. The name is bound to a placeholder first so fields
    /// can refer to `X` itself; the placeholder is then filled in place.
    fn declare_object_type(&mut self, name: &str, fields: &[FieldDecl]) -> EvalResult {
        let placeholder = forward_decl(name);
        self.env.define(name, placeholder.clone());

        let mut object = ObjectNode::default();
        for field in fields {
            let ty = self.eval_type(&field.ty)?;
            if let Some(default) = &field.default {
                let value = deref(&self.eval(default)?);
                if !match_types(self, &ty, &value)? {
                    return Err(RuntimeError::mismatch(format!(
                        "default of field '{}' in {name} does not match {}",
                        field.name,
                        printable(&ty)
                    ))
                    .into());
                }
                object.defaults.insert(field.name.clone(), detach(&value));
            }
            object.insert(field.name.clone(), ty);
        }

        {
            let mut node = placeholder.borrow_mut();
            node.kind = NodeKind::Object(object);
            node.ty.is_decl = false;
        }
        Ok(placeholder)
    }

    pub(super) fn eval_enum_decl(&mut self, decl: &EnumDeclNode) -> EvalResult {
        if self.env.lookup_local(&decl.name).is_some() {
            return Err(RuntimeError::Redeclared {
                name: decl.name.clone(),
            }
            .into());
        }
        let mut variants = ObjectNode {
            is_enum: true,
            ..ObjectNode::default()
        };
        for variant in &decl.variants {
            variants.insert(variant.clone(), NodeRef::string(variant.clone()));
        }
        let mut node = Node::new(NodeKind::Object(variants));
        node.ty.type_name = decl.name.clone();
        let node = NodeRef::new(node);
        set_const_deep(&node, true);
        self.env.define(&decl.name, node.clone());
        Ok(node)
    }
}

fn mark_type_function(node: &NodeRef, name: &str) {
    let mut inner = node.borrow_mut();
    inner.ty.is_type = true;
    inner.ty.is_type_function = true;
    inner.ty.type_name = name.to_string();
}
