//! Worker threads behind the `threading` module.
//!
//! Each task runs on its own helper thread against a frozen snapshot of the
//! spawning interpreter, so nothing `Rc`-based ever crosses threads. Results
//! come back as snapshots too and are thawed by whoever awaits them.

use crate::runtime::snapshot::Snapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;

pub type TaskResult = Result<Snapshot, String>;

type TaskState = Arc<(Mutex<Option<TaskResult>>, Condvar)>;

#[derive(Clone, Default)]
pub struct AsyncRuntime {
    shared: Arc<AsyncShared>,
}

#[derive(Default)]
struct AsyncShared {
    tasks: Mutex<HashMap<u64, TaskState>>,
    next_id: AtomicU64,
}

static RUNTIME: OnceLock<AsyncRuntime> = OnceLock::new();

impl AsyncRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide runtime shared by every interpreter.
    pub fn global() -> &'static AsyncRuntime {
        RUNTIME.get_or_init(AsyncRuntime::new)
    }

    /// Runs `f` on a helper thread and returns the task id.
    pub fn spawn_blocking<F>(&self, f: F) -> Result<u64, String>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let state: TaskState = Arc::new((Mutex::new(None), Condvar::new()));
        self.shared
            .tasks
            .lock()
            .map_err(|_| "task table poisoned".to_string())?
            .insert(id, state.clone());
        thread::Builder::new()
            .name(format!("shape-task-{id}"))
            .spawn(move || {
                let result = f();
                store_result(&state, result);
            })
            .map_err(|err| format!("failed to spawn task: {err}"))?;
        tracing::debug!(task = id, "spawned task");
        Ok(id)
    }

    /// Blocks until task `id` finishes and removes it from the table.
    pub fn wait(&self, id: u64) -> TaskResult {
        let state = self
            .shared
            .tasks
            .lock()
            .map_err(|_| "task table poisoned".to_string())?
            .remove(&id)
            .ok_or_else(|| format!("unknown task {id}"))?;
        let (lock, cvar) = &*state;
        let mut slot = lock.lock().map_err(|_| "task state poisoned".to_string())?;
        loop {
            if let Some(result) = slot.take() {
                tracing::debug!(task = id, ok = result.is_ok(), "task joined");
                return result;
            }
            slot = cvar
                .wait(slot)
                .map_err(|_| "task state poisoned".to_string())?;
        }
    }

    /// `Some(finished)` for a known task, `None` otherwise.
    pub fn is_ready(&self, id: u64) -> Option<bool> {
        let tasks = self.shared.tasks.lock().ok()?;
        let state = tasks.get(&id)?;
        let finished = state.0.lock().map(|slot| slot.is_some()).unwrap_or(true);
        Some(finished)
    }
}

fn store_result(state: &TaskState, result: TaskResult) {
    let (lock, cvar) = &**state;
    if let Ok(mut slot) = lock.lock() {
        *slot = Some(result);
        cvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node::NodeRef;

    #[test]
    fn tasks_hand_back_snapshots() {
        let runtime = AsyncRuntime::new();
        let id = runtime
            .spawn_blocking(|| {
                let value = NodeRef::number(42.0);
                Ok(Snapshot::freeze(&[value]))
            })
            .expect("spawn");
        let snapshot = runtime.wait(id).expect("result");
        assert_eq!(snapshot.thaw()[0].as_number(), Some(42.0));
        assert_eq!(runtime.is_ready(id), None);
    }

    #[test]
    fn waiting_on_unknown_task_fails() {
        let runtime = AsyncRuntime::new();
        assert!(runtime.wait(99).is_err());
    }
}
