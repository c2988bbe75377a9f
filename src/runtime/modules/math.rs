use super::{number_arg, unknown_function, Host, NativeModule};
use crate::runtime::node::NodeRef;

pub struct MathModule;

impl NativeModule for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn call(&mut self, _host: &mut dyn Host, function: &str, args: &[NodeRef]) -> NodeRef {
        match evaluate(function, args) {
            Ok(value) => NodeRef::number(value),
            Err(error) => error,
        }
    }
}

fn evaluate(function: &str, args: &[NodeRef]) -> Result<f64, NodeRef> {
    let unary = |op: fn(f64) -> f64| number_arg(args, 0, function).map(op);
    match function {
        "sqrt" => {
            let value = number_arg(args, 0, function)?;
            if value < 0.0 {
                return Err(NodeRef::error(format!(
                    "sqrt of negative number {value}"
                )));
            }
            Ok(value.sqrt())
        }
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "abs" => unary(f64::abs),
        "pow" => Ok(number_arg(args, 0, function)?.powf(number_arg(args, 1, function)?)),
        "min" | "max" => {
            if args.is_empty() {
                return Err(NodeRef::error(format!("{function} expects at least one number")));
            }
            let mut best = number_arg(args, 0, function)?;
            for index in 1..args.len() {
                let value = number_arg(args, index, function)?;
                best = if function == "min" { best.min(value) } else { best.max(value) };
            }
            Ok(best)
        }
        "pi" => Ok(std::f64::consts::PI),
        other => Err(unknown_function("math", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Vec<NodeRef> {
        values.iter().copied().map(NodeRef::number).collect()
    }

    #[test]
    fn computes_basic_functions() {
        assert_eq!(evaluate("sqrt", &numbers(&[9.0])).ok(), Some(3.0));
        assert_eq!(evaluate("pow", &numbers(&[2.0, 10.0])).ok(), Some(1024.0));
        assert_eq!(evaluate("max", &numbers(&[3.0, 7.0, 5.0])).ok(), Some(7.0));
        assert_eq!(evaluate("min", &numbers(&[3.0, 7.0, 5.0])).ok(), Some(3.0));
        assert_eq!(evaluate("floor", &numbers(&[2.7])).ok(), Some(2.0));
    }

    #[test]
    fn failures_are_error_nodes() {
        assert!(evaluate("sqrt", &numbers(&[-1.0])).is_err());
        assert!(evaluate("nope", &[]).is_err());
        assert!(evaluate("abs", &[NodeRef::string("x")]).is_err());
    }
}
