use super::{detach, truthy, Interpreter};
use crate::runtime::{
    copy::{copy_node, tag_deep},
    error::{EvalResult, RuntimeError, Signal},
    matcher::{deref, get_type, match_types, strict_equals, to_type, union_of},
    node::{HookKind, NodeKind, NodeRef, OpNode, Operator},
    printer::printable,
};

/// Where an assignment writes.
pub(super) enum Place {
    Variable(String),
    Property(NodeRef, String),
    Element(NodeRef, usize),
}

impl Place {
    fn label(&self) -> String {
        match self {
            Place::Variable(name) | Place::Property(_, name) => name.clone(),
            Place::Element(_, index) => format!("[{index}]"),
        }
    }

    fn container(&self) -> Option<&NodeRef> {
        match self {
            Place::Variable(_) => None,
            Place::Property(container, _) | Place::Element(container, _) => Some(container),
        }
    }
}

impl Interpreter {
    pub(super) fn eval_op(&mut self, op: &OpNode) -> EvalResult {
        let left = op.left.as_ref();
        match op.op {
            Operator::Assign => self.eval_assign(operand(left)?, &op.right),
            Operator::And => {
                let lhs = self.eval(operand(left)?)?;
                if !truthy(&lhs) {
                    return Ok(NodeRef::boolean(false));
                }
                let rhs = self.eval(&op.right)?;
                Ok(NodeRef::boolean(truthy(&rhs)))
            }
            Operator::Or => {
                let lhs = self.eval(operand(left)?)?;
                if truthy(&lhs) {
                    return Ok(NodeRef::boolean(true));
                }
                let rhs = self.eval(&op.right)?;
                Ok(NodeRef::boolean(truthy(&rhs)))
            }
            Operator::Not => {
                let value = self.eval(&op.right)?;
                Ok(NodeRef::boolean(!truthy(&value)))
            }
            Operator::Neg => {
                let value = deref(&self.eval(&op.right)?);
                match value.as_number() {
                    Some(number) => Ok(NodeRef::number(-number)),
                    None => Err(RuntimeError::mismatch(format!(
                        "cannot negate {}",
                        value.kind_name()
                    ))
                    .into()),
                }
            }
            Operator::Ref => {
                let target = self.eval(&op.right)?;
                Ok(NodeRef::from_kind(NodeKind::Pointer(deref(&target))))
            }
            Operator::Dot => {
                let target = deref(&self.eval(operand(left)?)?);
                let name = property_name(&op.right)?;
                self.get_member(&target, &name)
            }
            Operator::Meta => self.eval_meta(operand(left)?, &op.right),
            Operator::Is => self.eval_is(operand(left)?, &op.right),
            Operator::Union => {
                let lhs = self.eval_type(operand(left)?)?;
                let rhs = self.eval_type(&op.right)?;
                union_of(self, vec![lhs, rhs])
            }
            Operator::Range => {
                let start = deref(&self.eval(operand(left)?)?);
                let end = deref(&self.eval(&op.right)?);
                match (start.as_number(), end.as_number()) {
                    (Some(start), Some(end)) => {
                        let (start, end) = (start.trunc() as i64, end.trunc() as i64);
                        Ok(NodeRef::list(
                            (start..end).map(|i| NodeRef::number(i as f64)).collect(),
                        ))
                    }
                    _ => Err(RuntimeError::mismatch(format!(
                        "range bounds must be numbers, got {} and {}",
                        start.kind_name(),
                        end.kind_name()
                    ))
                    .into()),
                }
            }
            _ => {
                let lhs = self.eval(operand(left)?)?;
                let rhs = self.eval(&op.right)?;
                self.binary(op.op, &lhs, &rhs)
            }
        }
    }

    pub(super) fn binary(&mut self, op: Operator, lhs: &NodeRef, rhs: &NodeRef) -> EvalResult {
        let lhs = deref(lhs);
        let rhs = deref(rhs);
        if matches!(op, Operator::Eq | Operator::Ne) {
            let equal = strict_equals(self, &lhs, &rhs)?;
            return Ok(NodeRef::boolean(equal == (op == Operator::Eq)));
        }
        if matches!(op, Operator::Add | Operator::Sub) && (lhs.is_type() || rhs.is_type()) {
            return self.type_arithmetic(op, &lhs, &rhs);
        }

        let left_kind = lhs.borrow().kind.clone();
        let right_kind = rhs.borrow().kind.clone();
        let result = match (op, &left_kind, &right_kind) {
            (_, NodeKind::Number(a), NodeKind::Number(b)) => numeric(op, *a, *b)?,
            (Operator::Add, NodeKind::String(a), _) => NodeRef::string(format!("{a}{}", printable(&rhs))),
            (Operator::Add, _, NodeKind::String(b)) => NodeRef::string(format!("{}{b}", printable(&lhs))),
            (Operator::Mul, NodeKind::String(text), NodeKind::Number(times)) if *times >= 0.0 => {
                NodeRef::string(text.repeat(*times as usize))
            }
            (Operator::Add, NodeKind::List(a), NodeKind::List(b)) => NodeRef::list(
                a.elements
                    .iter()
                    .chain(b.elements.iter())
                    .map(detach)
                    .collect(),
            ),
            (Operator::Lt, NodeKind::String(a), NodeKind::String(b)) => NodeRef::boolean(a < b),
            (Operator::Le, NodeKind::String(a), NodeKind::String(b)) => NodeRef::boolean(a <= b),
            (Operator::Gt, NodeKind::String(a), NodeKind::String(b)) => NodeRef::boolean(a > b),
            (Operator::Ge, NodeKind::String(a), NodeKind::String(b)) => NodeRef::boolean(a >= b),
            _ => {
                return Err(RuntimeError::mismatch(format!(
                    "cannot apply '{}' to {} and {}",
                    op.symbol(),
                    left_kind.name(),
                    right_kind.name()
                ))
                .into())
            }
        };
        Ok(result)
    }

    /// `A + B` widens a union, `A - B` removes the members `B` matches.
    fn type_arithmetic(&mut self, op: Operator, lhs: &NodeRef, rhs: &NodeRef) -> EvalResult {
        let lhs = to_type(lhs);
        let rhs = to_type(rhs);
        if op == Operator::Add {
            return union_of(self, vec![lhs, rhs]);
        }
        let members = match &lhs.borrow().kind {
            NodeKind::PipeList(members) => members.clone(),
            _ => vec![lhs.clone()],
        };
        let mut kept = Vec::with_capacity(members.len());
        for member in members {
            if !match_types(self, &rhs, &member)? {
                kept.push(member);
            }
        }
        if kept.is_empty() {
            return Ok(to_type(&NodeRef::none()));
        }
        union_of(self, kept)
    }

    /// `x is T` tests the value and, for a plain variable, narrows its
    /// declared type until the enclosing scope closes.
    fn eval_is(&mut self, target: &NodeRef, ty: &NodeRef) -> EvalResult {
        let value = self.eval(target)?;
        let ty = self.eval_type(ty)?;
        let matched = match_types(self, &ty, &value)?;
        if matched && target.as_id().is_some() {
            self.env.cast(&deref(&value), ty);
        }
        Ok(NodeRef::boolean(matched))
    }

    /// `target::onChange(f)`, `target::onCall(f)`, `target::onInit(f)`,
    /// `target::tag(names...)`.
    fn eval_meta(&mut self, target: &NodeRef, call: &NodeRef) -> EvalResult {
        let (name, args) = match &call.borrow().kind {
            NodeKind::FuncCall(call) => (call.callee.as_id(), call.args.clone()),
            _ => (None, Vec::new()),
        };
        let name = name.ok_or_else(|| RuntimeError::unsupported("expected `target::name(...)`"))?;
        let target = deref(&self.eval(target)?);

        if let Some(kind) = HookKind::from_name(&name) {
            let hook = match args.first() {
                Some(expr) => {
                    let hook = deref(&self.eval(expr)?);
                    if !hook.is_func() {
                        return Err(RuntimeError::mismatch(format!(
                            "{name} expects a function, got {}",
                            printable(&hook)
                        ))
                        .into());
                    }
                    Some(hook)
                }
                None => None,
            };
            tracing::trace!(hook = kind.name(), set = hook.is_some(), "hook updated");
            target.borrow_mut().meta.set_hook(kind, hook);
            return Ok(target);
        }
        if name == "tag" {
            let mut tags = Vec::with_capacity(args.len());
            for arg in &args {
                let value = self.eval(arg)?;
                tags.push(value.as_string().unwrap_or_else(|| printable(&value)));
            }
            tag_deep(&target, &tags);
            return Ok(target);
        }
        Err(RuntimeError::undefined("hook", name).into())
    }

    pub(super) fn eval_assign(&mut self, target: &NodeRef, value: &NodeRef) -> EvalResult {
        let inner = match &target.borrow().kind {
            NodeKind::Paren(inner) => Some(inner.clone()),
            _ => None,
        };
        if let Some(inner) = inner {
            return self.eval_assign(&inner, value);
        }
        let by_ref = is_reference(value);
        let incoming = deref(&self.eval(value)?);

        let target_kind = target.borrow().kind.clone();
        let (place, slot) = match target_kind {
            NodeKind::Id(name) => {
                let slot = self.env.lookup(&name)?;
                (Place::Variable(name), Some(slot))
            }
            NodeKind::Op(op) if op.op == Operator::Dot => {
                let container = deref(&self.eval(operand(op.left.as_ref())?)?);
                let name = property_name(&op.right)?;
                let slot = container.property(&name);
                (Place::Property(container, name), slot)
            }
            NodeKind::Accessor(accessor) => {
                let container = deref(&self.eval(&accessor.target)?);
                let index = deref(&self.eval(&accessor.index)?);
                self.accessor_place(container, &index)?
            }
            other => {
                return Err(RuntimeError::unsupported(format!(
                    "cannot assign to {}",
                    other.name()
                ))
                .into())
            }
        };

        match slot {
            Some(slot) => self.assign_existing(place, &slot, incoming, by_ref),
            None => self.add_property(place, incoming, by_ref),
        }
    }

    fn accessor_place(
        &mut self,
        container: NodeRef,
        index: &NodeRef,
    ) -> Result<(Place, Option<NodeRef>), Signal> {
        let key = index.as_string();
        let position = index.as_number();
        let element = match (&container.borrow().kind, position, key) {
            (NodeKind::List(list), Some(position), _) => {
                let slot = list_index(list.elements.len(), position)?;
                Some((slot, list.elements[slot].clone()))
            }
            (NodeKind::Object(object), _, Some(key)) => {
                let slot = object.get(&key).cloned();
                return Ok((Place::Property(container.clone(), key), slot));
            }
            (kind, _, _) => {
                return Err(RuntimeError::mismatch(format!(
                    "cannot index {} with {}",
                    kind.name(),
                    index.kind_name()
                ))
                .into())
            }
        };
        match element {
            Some((slot, value)) => Ok((Place::Element(container, slot), Some(value))),
            None => Err(RuntimeError::unsupported("invalid assignment target").into()),
        }
    }

    fn assign_existing(
        &mut self,
        place: Place,
        slot: &NodeRef,
        incoming: NodeRef,
        by_ref: bool,
    ) -> EvalResult {
        let label = place.label();
        let container_const = place
            .container()
            .is_some_and(|container| container.borrow().meta.is_const);
        if slot.borrow().meta.is_const || container_const {
            return Err(RuntimeError::ConstViolation { name: label }.into());
        }
        if let Some(declared) = slot.declared_type() {
            let unset = incoming.is_kind(|kind| matches!(kind, NodeKind::NoValue));
            if !unset && !match_types(self, &declared, &incoming)? {
                let actual = get_type(self, &incoming)?;
                return Err(RuntimeError::mismatch(format!(
                    "cannot assign {} to '{label}' of type {}",
                    printable(&actual),
                    printable(&declared)
                ))
                .into());
            }
        }

        let old = copy_node(slot);
        let current = if by_ref {
            self.rebind_place(&place, incoming.clone());
            incoming
        } else {
            slot.overwrite_with(&detach(&incoming));
            slot.clone()
        };
        self.fire_change(Some(slot), place.container(), &label, old, current.clone())?;
        Ok(current)
    }

    /// New properties may only be added to objects without a nominal type.
    fn add_property(&mut self, place: Place, incoming: NodeRef, by_ref: bool) -> EvalResult {
        let Place::Property(container, name) = place else {
            return Err(RuntimeError::unsupported("invalid assignment target").into());
        };
        if !container.is_kind(|kind| matches!(kind, NodeKind::Object(_))) {
            return Err(RuntimeError::mismatch(format!(
                "cannot set property '{name}' on {}",
                container.kind_name()
            ))
            .into());
        }
        if container.borrow().meta.is_const {
            return Err(RuntimeError::ConstViolation { name }.into());
        }
        let type_name = container.type_name();
        if !type_name.is_empty() || container.is_type() {
            return Err(RuntimeError::mismatch(format!(
                "type {type_name} has no property '{name}'"
            ))
            .into());
        }
        let value = if by_ref { incoming } else { detach(&incoming) };
        if let NodeKind::Object(object) = &mut container.borrow_mut().kind {
            object.insert(name.clone(), value.clone());
        }
        self.fire_change(None, Some(&container), &name, NodeRef::none(), value.clone())?;
        Ok(value)
    }

    fn rebind_place(&mut self, place: &Place, value: NodeRef) {
        match place {
            Place::Variable(name) => {
                self.env.rebind(name, value);
            }
            Place::Property(container, name) => {
                if let NodeKind::Object(object) = &mut container.borrow_mut().kind {
                    object.insert(name.clone(), value);
                }
            }
            Place::Element(container, index) => {
                if let NodeKind::List(list) = &mut container.borrow_mut().kind {
                    if let Some(slot) = list.elements.get_mut(*index) {
                        *slot = value;
                    }
                }
            }
        }
    }

    /// Runs the slot's `onChange` hook, then the container's.
    fn fire_change(
        &mut self,
        slot: Option<&NodeRef>,
        container: Option<&NodeRef>,
        name: &str,
        old: NodeRef,
        new: NodeRef,
    ) -> Result<(), Signal> {
        let hooks = [
            slot.and_then(|slot| slot.borrow().meta.on_change.clone()),
            container.and_then(|container| container.borrow().meta.on_change.clone()),
        ];
        for hook in hooks.into_iter().flatten() {
            let payload = NodeRef::object(vec![
                ("name".to_string(), NodeRef::string(name)),
                ("old".to_string(), old.clone()),
                ("new".to_string(), new.clone()),
            ]);
            self.call_hook(&hook, payload)?;
        }
        Ok(())
    }
}

fn numeric(op: Operator, a: f64, b: f64) -> Result<NodeRef, RuntimeError> {
    Ok(match op {
        Operator::Add => NodeRef::number(a + b),
        Operator::Sub => NodeRef::number(a - b),
        Operator::Mul => NodeRef::number(a * b),
        Operator::Div if b == 0.0 => return Err(RuntimeError::unsupported("division by zero")),
        Operator::Div => NodeRef::number(a / b),
        Operator::Mod if b == 0.0 => return Err(RuntimeError::unsupported("modulo by zero")),
        Operator::Mod => NodeRef::number(a % b),
        Operator::Pow => NodeRef::number(a.powf(b)),
        Operator::Lt => NodeRef::boolean(a < b),
        Operator::Le => NodeRef::boolean(a <= b),
        Operator::Gt => NodeRef::boolean(a > b),
        Operator::Ge => NodeRef::boolean(a >= b),
        other => {
            return Err(RuntimeError::mismatch(format!(
                "cannot apply '{}' to numbers",
                other.symbol()
            )))
        }
    })
}

/// Resolves a possibly negative list index.
/// Negative positions count from the end. Fractional positions are rejected.
pub(super) fn list_index(len: usize, position: f64) -> Result<usize, RuntimeError> {
    if position.fract() != 0.0 || !position.is_finite() {
        return Err(RuntimeError::unsupported(format!(
            "index {position} is not an integer"
        )));
    }
    let index = position as i64;
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RuntimeError::unsupported(format!(
            "index {index} out of range for list of length {len}"
        )));
    }
    Ok(resolved as usize)
}

fn operand(node: Option<&NodeRef>) -> Result<&NodeRef, Signal> {
    node.ok_or_else(|| RuntimeError::unsupported("operator is missing its left operand").into())
}

fn property_name(node: &NodeRef) -> Result<String, Signal> {
    node.as_id()
        .or_else(|| node.as_string())
        .ok_or_else(|| RuntimeError::unsupported("expected a property name after `.`").into())
}

pub(super) fn is_reference(node: &NodeRef) -> bool {
    matches!(&node.borrow().kind, NodeKind::Op(op) if op.op == Operator::Ref)
}
