//! One-shot delayed tasks with cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a task armed by [`schedule_once`].
///
/// Dropping the handle cancels the task. A task that has already started
/// running its action is aborted at its next await point; use
/// [`CancelHandle::detach`] to let it run to completion instead.
#[derive(Debug)]
pub struct CancelHandle {
    task: Option<JoinHandle<()>>,
}

impl CancelHandle {
    /// Cancel the task if it has not completed yet.
    pub fn cancel(mut self) {
        self.abort();
    }

    /// Give up control of the task without cancelling it.
    pub fn detach(mut self) {
        self.task.take();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Run `action` once after `delay` on the runtime behind `runtime`.
///
/// Safe to call from any thread, inside a runtime or not.
pub fn schedule_once<F>(runtime: &Handle, delay: Duration, action: F) -> CancelHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    debug!(delay_secs = delay.as_secs_f64(), "Scheduling task");
    let task = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        action.await;
    });
    CancelHandle { task: Some(task) }
}
