use anyhow::Result;
use futures::future::{AbortHandle, Abortable};
use std::{future::Future, sync::atomic::AtomicBool, sync::atomic::Ordering, sync::Arc};
use tokio::task::JoinHandle;

/// Background job which can be cancelled
#[derive(Debug)]
pub struct Task {
    done: Arc<AtomicBool>,
    shutdown: AbortHandle,
    handle: JoinHandle<Result<()>>,
}

impl Task {
    /// Spawns `task` on the runtime right away.
    pub fn new<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, abort_registration) = AbortHandle::new_pair();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let future = Abortable::new(task, abort_registration);
        let handle = tokio::task::spawn(async move {
            let result = future.await;
            done2.store(true, Ordering::Relaxed);
            result?;
            Ok(())
        });

        Self {
            done,
            shutdown,
            handle,
        }
    }

    /// Checks whether the task has stopped, either by finishing or by panicking.
    pub fn has_finished(&self) -> bool {
        self.done.load(Ordering::Relaxed) || self.handle.is_finished()
    }

    /// Cancels the task and joins it.
    pub async fn cancel(self) {
        self.shutdown.abort();
        let _ = self.handle.await;
    }
}
