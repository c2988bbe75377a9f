use super::{string_arg, unknown_function, Host, NativeModule};
use crate::runtime::node::NodeRef;
use std::env;

/// Process information: script arguments, platform, environment.
pub struct SysModule;

impl NativeModule for SysModule {
    fn name(&self) -> &str {
        "sys"
    }

    fn load(&mut self, host: &mut dyn Host) {
        tracing::debug!(args = host.argv().len(), "sys module loaded");
    }

    fn call(&mut self, host: &mut dyn Host, function: &str, args: &[NodeRef]) -> NodeRef {
        match function {
            "argv" => NodeRef::list(host.argv().into_iter().map(NodeRef::string).collect()),
            "platform" => NodeRef::string(env::consts::OS),
            "env" => match string_arg(args, 0, "env") {
                Ok(name) => env::var(&name)
                    .map(NodeRef::string)
                    .unwrap_or_else(|_| NodeRef::none()),
                Err(error) => error,
            },
            other => unknown_function("sys", other),
        }
    }
}
