//! Cancellable background work handed back to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cairn_store::StoreResult;
use tracing::{debug, error};

/// Checked by background work between items.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A thread running a bulk callback over stored objects.
///
/// Dropping the task cancels it and waits for the thread to stop.
pub struct BackgroundTask {
    name: &'static str,
    cancel: CancelToken,
    handle: Option<JoinHandle<usize>>,
}

impl BackgroundTask {
    /// Run `work` on a named thread. `work` returns how many items it
    /// visited.
    pub(crate) fn spawn<F>(name: &'static str, work: F) -> StoreResult<Self>
    where
        F: FnOnce(&CancelToken) -> usize + Send + 'static,
    {
        let cancel = CancelToken::default();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("cairn-{name}"))
            .spawn(move || work(&token))?;
        Ok(Self {
            name,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the task to stop before its next item.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task. Returns the number of items visited, or `None` if
    /// the callback panicked.
    pub fn join(mut self) -> Option<usize> {
        self.wait()
    }

    fn wait(&mut self) -> Option<usize> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(visited) => {
                debug!(task = self.name, visited, "background task finished");
                Some(visited)
            }
            Err(_) => {
                error!(task = self.name, "background task panicked");
                None
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel();
        self.wait();
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn join_reports_visited_items() {
        let task = BackgroundTask::spawn("count", |_| 3).unwrap();
        assert_eq!(task.join(), Some(3));
    }

    #[test]
    fn cancel_stops_between_items() {
        let (started_tx, started_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let task = BackgroundTask::spawn("loop", move |cancel| {
            let mut visited = 0;
            started_tx.send(()).unwrap();
            go_rx.recv().unwrap();
            while !cancel.is_cancelled() {
                visited += 1;
                std::thread::yield_now();
            }
            visited
        })
        .unwrap();
        started_rx.recv().unwrap();
        task.cancel();
        go_tx.send(()).unwrap();
        assert_eq!(task.join(), Some(0));
    }

    #[test]
    fn panicking_callback_is_reported() {
        let task = BackgroundTask::spawn("boom", |_| panic!("callback failed")).unwrap();
        assert_eq!(task.join(), None);
    }
}
