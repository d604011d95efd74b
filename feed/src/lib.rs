//! Incremental content pipeline.
//!
//! A [`viewport::ViewportTrigger`] reports when a sentinel scrolls into view,
//! a [`pagination::PaginationController`] turns those reports into at most
//! one outstanding page load, and a [`persistence::PersistenceGateway`] saves
//! each generated block. Everything asynchronous can be scoped to a
//! [`lifetime::Lifetime`] so that results arriving after teardown are
//! discarded.

pub mod lifetime;
pub mod pagination;
pub mod persistence;
pub mod viewport;

pub use lifetime::{Cancelled, Lifetime};
pub use pagination::{Outcome, PaginationController};
pub use persistence::{BlockStore, Notice, Notifier, PersistenceGateway, StoreError};
pub use viewport::{Observer, RootMargin, Transition, ViewportOptions, ViewportTrigger};
