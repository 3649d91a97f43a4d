//! Subscription system for live store events.
//!
//! Subscribers receive record changes (insert, update, delete) and the
//! outcome of every snapshot write. Buffers are bounded; a subscriber that
//! falls behind is dropped rather than slowing down writers.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::tables(vec!["tasks".to_string()]),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(StoreEvent::Inserted { id, .. }) => println!("new task {id}"),
//!         Ok(StoreEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
