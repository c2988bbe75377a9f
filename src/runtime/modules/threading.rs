//! `threading.async(func, [args])`, `threading.await(task)`,
//! `threading.is_ready(task)`.

use super::{unknown_function, Host, NativeModule};
use crate::config::Config;
use crate::runtime::{
    async_runtime::{AsyncRuntime, TaskResult},
    interpreter::Interpreter,
    node::{Node, NodeKind, NodeRef, ObjectNode},
    snapshot::Snapshot,
};

pub const TASK_TYPE: &str = "Task";

pub struct ThreadingModule;

impl NativeModule for ThreadingModule {
    fn name(&self) -> &str {
        "threading"
    }

    fn call(&mut self, host: &mut dyn Host, function: &str, args: &[NodeRef]) -> NodeRef {
        match function {
            "async" => spawn(host, args),
            "await" => match task_id(args) {
                Ok(id) => match AsyncRuntime::global().wait(id) {
                    Ok(snapshot) => snapshot
                        .thaw()
                        .into_iter()
                        .next()
                        .unwrap_or_else(NodeRef::no_value),
                    Err(message) => NodeRef::error(message),
                },
                Err(error) => error,
            },
            "is_ready" => match task_id(args) {
                Ok(id) => match AsyncRuntime::global().is_ready(id) {
                    Some(ready) => NodeRef::boolean(ready),
                    None => NodeRef::error(format!("unknown task {id}")),
                },
                Err(error) => error,
            },
            other => unknown_function("threading", other),
        }
    }
}

fn spawn(host: &mut dyn Host, args: &[NodeRef]) -> NodeRef {
    let Some(func) = args.first().filter(|func| func.is_func()) else {
        return NodeRef::error("async expects a function as its first argument");
    };
    let call_args = args.get(1).map(NodeRef::elements).unwrap_or_default();

    // Globals, the function and its arguments are frozen together so the
    // worker sees one consistent graph.
    let (names, mut roots): (Vec<String>, Vec<NodeRef>) = host.globals().into_iter().unzip();
    roots.push(func.clone());
    roots.push(NodeRef::list(call_args));
    let snapshot = Snapshot::freeze(&roots);
    let argv = host.argv();

    match AsyncRuntime::global().spawn_blocking(move || run_task(names, snapshot, argv)) {
        Ok(id) => task_handle(id),
        Err(message) => NodeRef::error(message),
    }
}

fn run_task(names: Vec<String>, snapshot: Snapshot, argv: Vec<String>) -> TaskResult {
    let mut roots = snapshot.thaw();
    let args = roots.pop().map(|list| list.elements()).unwrap_or_default();
    let func = roots
        .pop()
        .ok_or_else(|| "task snapshot is missing its function".to_string())?;

    let mut interpreter = Interpreter::new(Config::default().with_args(argv));
    for (name, node) in names.iter().zip(roots) {
        interpreter.define_global(name, node);
    }
    let result = interpreter.call(&func, args)?;
    Ok(Snapshot::freeze(&[result]))
}

fn task_handle(id: u64) -> NodeRef {
    let mut fields = ObjectNode::default();
    fields.insert("id".to_string(), NodeRef::number(id as f64));
    let mut node = Node::new(NodeKind::Object(fields));
    node.ty.type_name = TASK_TYPE.to_string();
    NodeRef::new(node)
}

fn task_id(args: &[NodeRef]) -> Result<u64, NodeRef> {
    args.first()
        .filter(|handle| handle.type_name() == TASK_TYPE)
        .and_then(|handle| handle.property("id"))
        .and_then(|id| id.as_number())
        .map(|id| id as u64)
        .ok_or_else(|| NodeRef::error("expected a task handle returned by async"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_handles_round_trip_their_id() {
        let handle = task_handle(7);
        assert_eq!(handle.type_name(), TASK_TYPE);
        assert_eq!(task_id(&[handle]).ok(), Some(7));
        assert!(task_id(&[NodeRef::number(7.0)]).is_err());
    }
}
