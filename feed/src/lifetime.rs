use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{AbortHandle, Abortable};

/// Returned when a future outlived the [`Lifetime`] it was started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation was cancelled because its owner went away")]
pub struct Cancelled;

/// Cancellation scope tied to the component that starts async work.
///
/// Clones share the same scope. Once [`end`](Lifetime::end) is called every
/// future running inside the scope is aborted and new ones are refused, so
/// late results are never applied to state that no longer exists.
#[derive(Clone, Default)]
pub struct Lifetime {
    scope: Arc<Mutex<Scope>>,
}

#[derive(Default)]
struct Scope {
    ended: bool,
    next_id: u64,
    pending: HashMap<u64, AbortHandle>,
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Number of futures currently running in this scope.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn end(&self) {
        let pending = {
            let mut scope = self.lock();
            scope.ended = true;
            std::mem::take(&mut scope.pending)
        };

        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "aborting work of ended lifetime");
        }
        for handle in pending.values() {
            handle.abort();
        }
    }

    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        let (handle, registration) = AbortHandle::new_pair();
        let id = {
            let mut scope = self.lock();
            if scope.ended {
                return Err(Cancelled);
            }
            let id = scope.next_id;
            scope.next_id += 1;
            scope.pending.insert(id, handle);
            id
        };

        let _pending = Pending { lifetime: self, id };
        Abortable::new(fut, registration)
            .await
            .map_err(|_| Cancelled)
    }

    fn lock(&self) -> MutexGuard<'_, Scope> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Pending<'a> {
    lifetime: &'a Lifetime,
    id: u64,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.lifetime.lock().pending.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn completes_while_alive() {
        let lifetime = Lifetime::new();
        assert_eq!(lifetime.run(async { 7 }).await, Ok(7));
        assert_eq!(lifetime.pending(), 0);
    }

    #[tokio::test]
    async fn refuses_work_after_end() {
        let lifetime = Lifetime::new();
        lifetime.end();
        assert!(lifetime.is_ended());
        assert_eq!(lifetime.run(async { 7 }).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn ending_aborts_in_flight_work() {
        let lifetime = Lifetime::new();
        let (tx, rx) = oneshot::channel::<u32>();

        let owner = lifetime.clone();
        let (result, _) = tokio::join!(lifetime.run(rx), async move {
            tokio::task::yield_now().await;
            assert_eq!(owner.pending(), 1);
            owner.end();
            let _ = tx.send(1);
        });

        assert_eq!(result, Err(Cancelled));
        assert_eq!(lifetime.pending(), 0);
    }
}
