use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::lifetime::{Cancelled, Lifetime};
use crate::viewport::Transition;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// What became of one viewport signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The signal was not the sentinel entering the viewport.
    Idle,
    /// The caller reported that there is nothing more to load.
    Exhausted,
    /// A load was already outstanding.
    InFlight,
    Loaded,
    /// The loader failed. The error is logged and otherwise swallowed.
    Failed(String),
    /// The owning lifetime ended before the load settled.
    Cancelled,
}

/// Single-flight gate between viewport signals and a page loader.
///
/// Each controller owns its own `loading_more` flag; clones share it, separate
/// controllers never do. `has_more` belongs to the caller and is passed in
/// with every signal.
#[derive(Clone, Default)]
pub struct PaginationController {
    loading_more: Arc<AtomicBool>,
    listener: Option<Listener>,
}

impl PaginationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `listener` every time `loading_more` flips.
    pub fn with_listener(listener: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            loading_more: Arc::default(),
            listener: Some(Arc::new(listener)),
        }
    }

    pub fn loading_more(&self) -> bool {
        self.loading_more.load(Ordering::Acquire)
    }

    /// Starts `load_more` if `transition` is an entry, `has_more` holds and no
    /// other load is outstanding.
    ///
    /// The gate is taken when this is called, not when the returned future is
    /// first polled, so a second signal arriving in between is rejected.
    /// `loading_more` is cleared once the load settles or the future is
    /// dropped.
    pub fn on_signal<F, Fut, E>(
        &self,
        transition: Transition,
        has_more: bool,
        load_more: F,
    ) -> impl Future<Output = Outcome> + use<F, Fut, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let flight = self.begin(transition, has_more);
        async move {
            let _flight = match flight {
                Ok(flight) => flight,
                Err(outcome) => return outcome,
            };
            settle(load_more().await)
        }
    }

    /// Like [`on_signal`](Self::on_signal), with the load running inside
    /// `lifetime`. A load still outstanding when the lifetime ends resolves to
    /// [`Outcome::Cancelled`] and its result is discarded.
    pub fn on_signal_within<F, Fut, E>(
        &self,
        lifetime: &Lifetime,
        transition: Transition,
        has_more: bool,
        load_more: F,
    ) -> impl Future<Output = Outcome> + use<F, Fut, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let flight = self.begin(transition, has_more);
        let lifetime = lifetime.clone();
        async move {
            let _flight = match flight {
                Ok(flight) => flight,
                Err(outcome) => return outcome,
            };
            match lifetime.run(load_more()).await {
                Ok(result) => settle(result),
                Err(Cancelled) => {
                    tracing::debug!("page load outlived its view");
                    Outcome::Cancelled
                }
            }
        }
    }

    /// Signal to send after a load settled.
    ///
    /// The viewport only reports edges, so a sentinel that stays in view after
    /// a page is appended never enters again. As long as the last load
    /// succeeded, the sentinel is still intersecting and there is more to
    /// load, this answers [`Transition::Entered`] so the caller can continue.
    /// Anything else yields [`Transition::Unchanged`], which
    /// [`on_signal`](Self::on_signal) treats as idle.
    pub fn rearm(&self, settled: &Outcome, still_intersecting: bool, has_more: bool) -> Transition {
        if *settled == Outcome::Loaded && still_intersecting && has_more && !self.loading_more() {
            Transition::Entered
        } else {
            Transition::Unchanged
        }
    }

    fn begin(&self, transition: Transition, has_more: bool) -> Result<Flight, Outcome> {
        if transition != Transition::Entered {
            return Err(Outcome::Idle);
        }
        if !has_more {
            return Err(Outcome::Exhausted);
        }
        if self
            .loading_more
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("page load already in flight");
            return Err(Outcome::InFlight);
        }

        if let Some(listener) = &self.listener {
            listener(true);
        }
        Ok(Flight {
            loading_more: Arc::clone(&self.loading_more),
            listener: self.listener.clone(),
        })
    }
}

fn settle<E: Display>(result: Result<(), E>) -> Outcome {
    match result {
        Ok(()) => Outcome::Loaded,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load more content");
            Outcome::Failed(e.to_string())
        }
    }
}

struct Flight {
    loading_more: Arc<AtomicBool>,
    listener: Option<Listener>,
}

impl Drop for Flight {
    fn drop(&mut self) {
        self.loading_more.store(false, Ordering::Release);
        if let Some(listener) = &self.listener {
            listener(false);
        }
    }
}
