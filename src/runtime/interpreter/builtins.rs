use super::Interpreter;
use crate::runtime::{
    error::{EvalResult, RuntimeError, Signal},
    matcher::{deref, get_type},
    node::{HookKind, NodeKind, NodeRef},
    printer::printable,
};

impl Interpreter {
    /// Built-in pseudo-functions. `del`, `refcount`, `import` and `exit`
    /// look at their argument expressions; the rest take values.
    pub(super) fn call_builtin(&mut self, name: &str, args: &[NodeRef]) -> EvalResult {
        match name {
            "del" => {
                self.expect_arity(name, args.len(), 1)?;
                let target = args[0]
                    .as_id()
                    .or_else(|| args[0].as_string())
                    .ok_or_else(|| RuntimeError::mismatch("del expects a variable name"))?;
                self.env
                    .remove(&target)
                    .ok_or_else(|| RuntimeError::undefined("variable", target))?;
                Ok(NodeRef::no_value())
            }
            "refcount" => {
                self.expect_arity(name, args.len(), 1)?;
                let value = self.eval(&args[0])?;
                let value = deref(&value);
                // Neither local handle is an owner.
                Ok(NodeRef::number(value.strong_count().saturating_sub(2) as f64))
            }
            "exit" => {
                let code = match args.first() {
                    Some(expr) => {
                        let value = deref(&self.eval(expr)?);
                        value.as_number().ok_or_else(|| {
                            RuntimeError::mismatch(format!(
                                "exit expects a number, got {}",
                                printable(&value)
                            ))
                        })? as i32
                    }
                    None => 0,
                };
                Err(Signal::Exit(code))
            }
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(deref(&self.eval(arg)?));
                }
                self.call_builtin_values(name, values)
            }
        }
    }

    fn call_builtin_values(&mut self, name: &str, args: Vec<NodeRef>) -> EvalResult {
        match name {
            "print" | "println" => {
                let mut text = args.iter().map(printable).collect::<Vec<_>>().join(" ");
                if name == "println" {
                    text.push('\n');
                }
                self.output.write(&text);
                Ok(NodeRef::no_value())
            }
            "typeof" => {
                self.expect_arity(name, args.len(), 1)?;
                get_type(self, &args[0])
            }
            "type" => {
                self.expect_arity(name, args.len(), 1)?;
                let ty = get_type(self, &args[0])?;
                Ok(NodeRef::string(type_label(&ty)))
            }
            "tags" => {
                self.expect_arity(name, args.len(), 1)?;
                let tags = args[0].borrow().meta.tags.clone();
                Ok(NodeRef::list(tags.into_iter().map(NodeRef::string).collect()))
            }
            "meta" => {
                self.expect_arity(name, args.len(), 1)?;
                Ok(describe_meta(&args[0]))
            }
            "import" => {
                self.expect_arity(name, args.len(), 1)?;
                let path = string_argument(name, &args[0])?;
                self.import_module(&path)
            }
            "error" => {
                let message = args.iter().map(printable).collect::<Vec<_>>().join(" ");
                Err(RuntimeError::User { message }.into())
            }
            "string" => {
                self.expect_arity(name, args.len(), 1)?;
                Ok(NodeRef::string(printable(&args[0])))
            }
            "number" => {
                self.expect_arity(name, args.len(), 1)?;
                to_number(&args[0]).map(NodeRef::number)
            }
            "eval" => {
                self.expect_arity(name, args.len(), 1)?;
                let code = string_argument(name, &args[0])?;
                self.eval_source(&code)
            }
            "evals" => {
                self.expect_arity(name, args.len(), 1)?;
                let code = string_argument(name, &args[0])?;
                let value = self.eval_source(&code)?;
                Ok(NodeRef::string(printable(&value)))
            }
            "load_lib" => {
                self.expect_arity(name, args.len(), 1)?;
                let library = string_argument(name, &args[0])?;
                self.load_library(&library)
            }
            other => Err(RuntimeError::undefined("function", other).into()),
        }
    }

    fn expect_arity(&self, name: &str, got: usize, expected: usize) -> Result<(), Signal> {
        if got != expected {
            return Err(RuntimeError::mismatch(format!(
                "{name} expects {expected} argument{}, got {got}",
                if expected == 1 { "" } else { "s" }
            ))
            .into());
        }
        Ok(())
    }
}

fn string_argument(name: &str, value: &NodeRef) -> Result<String, Signal> {
    value.as_string().ok_or_else(|| {
        RuntimeError::mismatch(format!("{name} expects a string, got {}", printable(value))).into()
    })
}

fn to_number(value: &NodeRef) -> Result<f64, Signal> {
    let kind = value.borrow().kind.clone();
    match kind {
        NodeKind::Number(number) => Ok(number),
        NodeKind::Boolean(flag) => Ok(if flag { 1.0 } else { 0.0 }),
        NodeKind::String(text) => text.trim().parse::<f64>().map_err(|_| {
            RuntimeError::mismatch(format!("cannot convert \"{text}\" to a number")).into()
        }),
        other => Err(RuntimeError::mismatch(format!(
            "cannot convert {} to a number",
            other.name()
        ))
        .into()),
    }
}

/// Short name of a type descriptor, as returned by `type(x)`.
fn type_label(ty: &NodeRef) -> String {
    let name = ty.type_name();
    if !name.is_empty() {
        return name;
    }
    match &ty.borrow().kind {
        NodeKind::PipeList(_) => "Union".to_string(),
        NodeKind::List(list) if list.is_union => "Union".to_string(),
        other => other.name().to_string(),
    }
}

fn describe_meta(value: &NodeRef) -> NodeRef {
    let node = value.borrow();
    let hook = |kind: HookKind| node.meta.hook(kind).unwrap_or_else(NodeRef::none);
    NodeRef::object(vec![
        ("const".to_string(), NodeRef::boolean(node.meta.is_const)),
        (
            "tags".to_string(),
            NodeRef::list(node.meta.tags.iter().map(NodeRef::string).collect()),
        ),
        (
            "type".to_string(),
            node.ty.ty.clone().unwrap_or_else(NodeRef::none),
        ),
        ("onChange".to_string(), hook(HookKind::OnChange)),
        ("onCall".to_string(), hook(HookKind::OnCall)),
        ("onInit".to_string(), hook(HookKind::OnInit)),
    ])
}
