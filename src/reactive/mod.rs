//! Reactive layer: commit-driven redelivery of live queries.
//!
//! # Modules
//!
//! - [`tracker`]: [`ChangeTracker`], the tables touched per transaction.
//! - [`dependencies`]: source tables of a query, via the authorizer.
//! - [`registry`]: [`SubscriptionRegistry`], the generational arena.
//! - [`live`]: [`LiveQuery`], [`Subscription`] and [`LiveStream`].

pub mod dependencies;
pub mod live;
pub mod registry;
pub mod tracker;

pub use live::{LiveEvent, LiveQuery, LiveStream, Subscription};
pub use registry::{SubscriptionId, SubscriptionRegistry, SubscriptionState};
pub use tracker::{ChangeSet, ChangeTracker};
