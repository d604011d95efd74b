use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use blocks::{ContentBlock, ContentBlockDraft};

use crate::lifetime::{Cancelled, Lifetime};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend answered and refused the block.
    #[error("{message}")]
    Rejected { message: String },
    #[error("could not reach the backend: {0}")]
    Transport(String),
}

/// Backend that upserts drafts and hands back the stored block.
pub trait BlockStore {
    fn upsert(
        &self,
        draft: &ContentBlockDraft,
    ) -> impl Future<Output = Result<ContentBlock, StoreError>>;
}

/// A user facing message, typically shown as a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

impl<F> Notifier for F
where
    F: Fn(Notice),
{
    fn notify(&self, notice: Notice) {
        self(notice)
    }
}

/// Saves generated blocks one at a time.
///
/// A failed save never fails the caller: the error is recorded, the user is
/// notified and the save resolves to `None`, so one bad block does not sink
/// the rest of its page. Saves are independent of each other; identical
/// drafts are deduplicated by the backend through their idempotency key.
pub struct PersistenceGateway<S, N> {
    store: S,
    notifier: N,
    saving: Arc<AtomicUsize>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl<S, N> PersistenceGateway<S, N>
where
    S: BlockStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            saving: Arc::default(),
            last_error: Arc::default(),
        }
    }

    /// True while at least one save is outstanding.
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire) > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn save(&self, draft: ContentBlockDraft) -> Option<ContentBlock> {
        let _saving = Saving::enter(&self.saving);
        let key = draft.idempotency_key();

        match self.store.upsert(&draft).await {
            Ok(block) => {
                tracing::debug!(id = %block.id, %key, "saved content block");
                Some(block)
            }
            Err(e) => {
                tracing::warn!(error = %e, %key, "failed to save content block");
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(e.to_string());
                self.notifier.notify(Notice {
                    title: "Couldn't save".to_owned(),
                    description: e.to_string(),
                });
                None
            }
        }
    }

    /// Saves inside `lifetime`; a save still running when it ends is
    /// abandoned without notifying anyone.
    pub async fn save_within(
        &self,
        lifetime: &Lifetime,
        draft: ContentBlockDraft,
    ) -> Result<Option<ContentBlock>, Cancelled> {
        lifetime.run(self.save(draft)).await
    }

    /// Saves every draft concurrently. Results line up with `drafts`
    /// although the saves may finish in any order.
    pub async fn save_all(&self, drafts: Vec<ContentBlockDraft>) -> Vec<Option<ContentBlock>> {
        futures::future::join_all(drafts.into_iter().map(|draft| self.save(draft))).await
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

struct Saving<'a>(&'a AtomicUsize);

impl<'a> Saving<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for Saving<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
