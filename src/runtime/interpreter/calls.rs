//! Call resolution, multiple dispatch and function invocation.

use super::{detach, Interpreter};
use crate::runtime::{
    error::{EvalResult, RuntimeError, Signal},
    matcher::{deref, get_type, match_types, to_type},
    node::{FuncCallNode, FuncNode, NodeKind, NodeRef, Operator, Param},
    prelude,
    printer::{printable, signature},
};

impl Interpreter {
    pub(super) fn eval_call(&mut self, call: &FuncCallNode) -> EvalResult {
        let callee_kind = call.callee.borrow().kind.clone();
        if let NodeKind::Id(name) = &callee_kind {
            if prelude::is_builtin(name) {
                return self.call_builtin(name, &call.args);
            }
        }

        let (func, receiver) = match callee_kind {
            NodeKind::Op(op) if op.op == Operator::Dot => {
                let Some(left) = op.left.as_ref() else {
                    return Err(RuntimeError::unsupported("method call without a receiver").into());
                };
                let receiver = deref(&self.eval(left)?);
                let method = op
                    .right
                    .as_id()
                    .ok_or_else(|| RuntimeError::unsupported("expected a method name"))?;
                let library = match &receiver.borrow().kind {
                    NodeKind::Lib(lib) => Some(lib.name.clone()),
                    _ => None,
                };
                if let Some(library) = library {
                    let args = self.eval_arguments(&call.args)?;
                    return self.call_native(&library, &method, args);
                }
                match receiver.property(&method) {
                    Some(func) => (func, Some(receiver)),
                    None => {
                        let args = self.eval_arguments(&call.args)?;
                        return match self.call_intrinsic(&receiver, &method, &args)? {
                            Some(result) => Ok(result),
                            None => Err(RuntimeError::undefined("method", method).into()),
                        };
                    }
                }
            }
            NodeKind::Id(name) => match self.env.get(&name) {
                Some(func) => (func, None),
                None => return Err(RuntimeError::undefined("function", name).into()),
            },
            _ => (self.eval(&call.callee)?, None),
        };

        let args = self.eval_arguments(&call.args)?;
        self.call_function(&func, args, receiver)
    }

    fn eval_arguments(&mut self, args: &[NodeRef]) -> Result<Vec<NodeRef>, Signal> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    /// Calls `func` with already evaluated arguments. `this` is bound to
    /// `receiver` when present.
    pub fn call_function(
        &mut self,
        func: &NodeRef,
        args: Vec<NodeRef>,
        receiver: Option<NodeRef>,
    ) -> EvalResult {
        let func = deref(func);
        let (name, dispatch, is_type_function) = match &func.borrow().kind {
            NodeKind::Func(inner) => (
                inner.name.clone(),
                inner.dispatch.clone(),
                func.borrow().ty.is_type_function,
            ),
            other => {
                return Err(RuntimeError::mismatch(format!(
                    "{} is not callable",
                    other.name()
                ))
                .into())
            }
        };
        if is_type_function {
            return self.call_type_function(&func, args);
        }

        let mut candidates = Vec::with_capacity(dispatch.len() + 1);
        candidates.push(func.clone());
        candidates.extend(dispatch);
        for candidate in &candidates {
            if let Some(bound) = self.bind_arguments(candidate, &args)? {
                if candidates.len() > 1 {
                    tracing::trace!(function = %name, signature = %signature(candidate), "dispatched");
                }
                return self.invoke(&func, candidate, bound, receiver);
            }
        }
        Err(self.dispatch_error(&name, &candidates, &args)?.into())
    }

    /// Arguments padded with trailing defaults, or `None` when `candidate`
    /// cannot accept them.
    fn bind_arguments(
        &mut self,
        candidate: &NodeRef,
        args: &[NodeRef],
    ) -> Result<Option<Vec<NodeRef>>, Signal> {
        let params = match &candidate.borrow().kind {
            NodeKind::Func(func) if func.body.is_some() && !func.is_signature => {
                func.params.clone()
            }
            _ => return Ok(None),
        };
        if args.len() > params.len() {
            return Ok(None);
        }
        let mut bound = args.to_vec();
        for param in &params[args.len()..] {
            match &param.default {
                Some(default) => bound.push(detach(default)),
                None => return Ok(None),
            }
        }
        for (param, arg) in params.iter().zip(bound.iter()) {
            if let Some(ty) = &param.ty {
                if !match_types(self, ty, arg)? {
                    return Ok(None);
                }
            }
        }
        Ok(Some(bound))
    }

    /// Runs one candidate body. `primary` is the node the call resolved to;
    /// its `onCall` hook fires after the body returns.
    pub(super) fn invoke(
        &mut self,
        primary: &NodeRef,
        candidate: &NodeRef,
        args: Vec<NodeRef>,
        receiver: Option<NodeRef>,
    ) -> EvalResult {
        let func = match &candidate.borrow().kind {
            NodeKind::Func(func) => func.clone(),
            _ => return Err(RuntimeError::mismatch("value is not callable").into()),
        };

        let depth = self.env.depth();
        let type_depth = std::mem::replace(&mut self.type_depth, 0);
        self.env.push_scope();
        for (name, value) in &func.closure {
            self.env.define(name, value.clone());
        }
        self.env.push_scope();
        for (param, arg) in func.params.iter().zip(args.iter()) {
            self.env.define(&param.name, bind_parameter(param, arg));
        }
        if let Some(receiver) = &receiver {
            self.env.define("this", receiver.clone());
        }
        let outcome = match &func.body {
            Some(body) => self.eval_body(body),
            None => Ok(NodeRef::no_value()),
        };
        self.env.truncate(depth);
        self.type_depth = type_depth;

        let result = match outcome {
            Ok(value) | Err(Signal::Return(value)) => value,
            Err(Signal::Break) | Err(Signal::Continue) => NodeRef::no_value(),
            Err(other) => return Err(other),
        };

        self.check_return(candidate, &func, &result)?;

        let hook = primary.borrow().meta.on_call.clone();
        if let Some(hook) = hook {
            let params = func
                .params
                .iter()
                .map(|param| NodeRef::string(param.name.clone()))
                .collect();
            let payload = NodeRef::object(vec![
                ("name".to_string(), NodeRef::string(func.name.clone())),
                ("params".to_string(), NodeRef::list(params)),
                ("args".to_string(), NodeRef::list(args)),
                ("return".to_string(), result.clone()),
            ]);
            self.call_hook(&hook, payload)?;
        }
        Ok(result)
    }

    /// Validates against the declared return type; without one the
    /// observed type is recorded but not enforced.
    fn check_return(
        &mut self,
        candidate: &NodeRef,
        func: &FuncNode,
        result: &NodeRef,
    ) -> Result<(), Signal> {
        match &func.return_type {
            Some(expected) => {
                if !match_types(self, expected, result)? {
                    let actual = get_type(self, result)?;
                    return Err(RuntimeError::mismatch(format!(
                        "'{}' should return {} but returned {}",
                        display_name(&func.name),
                        printable(expected),
                        printable(&actual)
                    ))
                    .into());
                }
            }
            None => {
                let observed = get_type(self, result)?;
                if let NodeKind::Func(inner) = &mut candidate.borrow_mut().kind {
                    inner.inferred_return = Some(observed);
                }
            }
        }
        Ok(())
    }

    /// Type functions take exactly their parameters, never dispatch, and
    /// return a type.
    fn call_type_function(&mut self, func: &NodeRef, args: Vec<NodeRef>) -> EvalResult {
        let inner = match &func.borrow().kind {
            NodeKind::Func(inner) => inner.clone(),
            _ => return Err(RuntimeError::mismatch("value is not callable").into()),
        };
        let name = func.type_name();
        let mut bound = args;
        for param in inner.params.iter().skip(bound.len()) {
            if let Some(default) = &param.default {
                bound.push(default.clone());
            }
        }
        if bound.len() != inner.params.len() {
            return Err(RuntimeError::mismatch(format!(
                "type function '{name}' expects {} arguments, got {}",
                inner.params.len(),
                bound.len()
            ))
            .into());
        }
        for (param, arg) in inner.params.iter().zip(bound.iter()) {
            if let Some(ty) = &param.ty {
                if !match_types(self, ty, arg)? {
                    return Err(RuntimeError::mismatch(format!(
                        "argument '{}' of type function '{name}' expects {}, got {}",
                        param.name,
                        printable(ty),
                        printable(arg)
                    ))
                    .into());
                }
            }
        }

        let depth = self.env.depth();
        let type_depth = std::mem::replace(&mut self.type_depth, 0);
        self.env.push_scope();
        for (key, value) in &inner.closure {
            self.env.define(key, value.clone());
        }
        self.env.push_scope();
        for (param, arg) in inner.params.iter().zip(bound) {
            self.env.define(&param.name, arg);
        }
        let outcome = match &inner.body {
            Some(body) => self.eval_body(body),
            None => Ok(NodeRef::no_value()),
        };
        self.env.truncate(depth);
        self.type_depth = type_depth;
        let result = match outcome {
            Ok(value) | Err(Signal::Return(value)) => value,
            Err(Signal::Break) | Err(Signal::Continue) => NodeRef::no_value(),
            Err(other) => return Err(other),
        };
        Ok(to_type(&result))
    }

    /// Hooks take the payload as their only argument, or nothing at all.
    /// An untyped parameter is typed as the payload for this call only.
    pub(super) fn call_hook(&mut self, hook: &NodeRef, payload: NodeRef) -> Result<(), Signal> {
        let first_param = match &hook.borrow().kind {
            NodeKind::Func(func) => func.params.first().cloned(),
            _ => return Err(RuntimeError::mismatch("hooks must be functions").into()),
        };
        let Some(param) = first_param else {
            self.call_function(hook, Vec::new(), None)?;
            return Ok(());
        };
        let hook = match &param.ty {
            Some(ty) => {
                if !match_types(self, ty, &payload)? {
                    let actual = get_type(self, &payload)?;
                    return Err(RuntimeError::mismatch(format!(
                        "hook parameter '{}' expects {}, got {}",
                        param.name,
                        printable(ty),
                        printable(&actual)
                    ))
                    .into());
                }
                hook.clone()
            }
            None => {
                let injected = get_type(self, &payload)?;
                with_first_param_type(hook, injected)
            }
        };
        self.call_function(&hook, vec![payload], None)?;
        Ok(())
    }

    /// Explains why no candidate accepted the arguments.
    fn dispatch_error(
        &mut self,
        name: &str,
        candidates: &[NodeRef],
        args: &[NodeRef],
    ) -> Result<RuntimeError, Signal> {
        let name = display_name(name);
        if let [only] = candidates {
            let params = match &only.borrow().kind {
                NodeKind::Func(func) => func.params.clone(),
                _ => Vec::new(),
            };
            let required = params.iter().filter(|param| param.default.is_none()).count();
            if args.len() > params.len() || args.len() < required {
                return Ok(RuntimeError::mismatch(format!(
                    "'{name}' expects {} arguments, got {}",
                    params.len(),
                    args.len()
                )));
            }
            for (param, arg) in params.iter().zip(args.iter()) {
                if let Some(error) = self.argument_error(&name, param, arg)? {
                    return Ok(error);
                }
            }
        }

        let mut types = Vec::with_capacity(args.len());
        for arg in args {
            types.push(printable(&get_type(self, arg)?));
        }
        Ok(RuntimeError::Dispatch {
            name,
            args: types.join(", "),
            candidates: candidates
                .iter()
                .map(signature)
                .collect::<Vec<_>>()
                .join(" | "),
        })
    }

    fn argument_error(
        &mut self,
        name: &str,
        param: &Param,
        arg: &NodeRef,
    ) -> Result<Option<RuntimeError>, Signal> {
        let Some(ty) = &param.ty else {
            return Ok(None);
        };
        if match_types(self, ty, arg)? {
            return Ok(None);
        }
        if ty.borrow().ty.is_refinement_type {
            let base = match &ty.borrow().kind {
                NodeKind::Func(func) => func.params.first().and_then(|p| p.ty.clone()),
                _ => None,
            };
            let base_ok = match base {
                Some(base) => match_types(self, &base, arg)?,
                None => true,
            };
            if base_ok {
                return Ok(Some(RuntimeError::Refinement {
                    name: ty.type_name(),
                    value: printable(arg),
                }));
            }
        }
        let actual = get_type(self, arg)?;
        Ok(Some(RuntimeError::mismatch(format!(
            "argument '{}' of '{name}' expects {}, got {}",
            param.name,
            printable(ty),
            printable(&actual)
        ))))
    }
}

/// Parameters receive a private copy of the argument unless it was passed
/// by reference (`&x`) or is a function.
fn bind_parameter(param: &Param, arg: &NodeRef) -> NodeRef {
    if let NodeKind::Pointer(target) = &arg.borrow().kind {
        return target.clone();
    }
    if arg.is_func() {
        return arg.clone();
    }
    let copy = detach(arg);
    if !copy.is_type() {
        copy.borrow_mut().ty.ty = param.ty.clone();
    }
    copy
}

/// A copy of `hook` whose first parameter is declared as `ty`. The stored
/// hook keeps its untyped parameter so later payloads are typed afresh.
fn with_first_param_type(hook: &NodeRef, ty: NodeRef) -> NodeRef {
    let mut node = hook.borrow().clone();
    if let NodeKind::Func(func) = &mut node.kind {
        if let Some(first) = func.params.first_mut() {
            first.ty = Some(ty);
        }
        func.dispatch.clear();
    }
    NodeRef::new(node)
}

fn display_name(name: &str) -> String {
    if name.is_empty() {
        "<lambda>".to_string()
    } else {
        name.to_string()
    }
}
