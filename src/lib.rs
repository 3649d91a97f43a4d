//! # Task Table Store
//!
//! A small HTTP task API backed by a JSON-file table store.
//!
//! ## Core Concepts
//!
//! - **Records**: JSON objects keyed by a caller-assigned string `id`
//! - **Tables**: Named, insertion-ordered sequences of records
//! - **Persistence**: Every mutation rewrites the whole database to one file
//! - **Subscriptions**: Live events for record changes and snapshot writes
//!
//! ## Example
//!
//! ```ignore
//! use taskdb::{Record, SearchCriteria, StoreConfig, TableStore};
//!
//! let store = TableStore::open(StoreConfig {
//!     path: "./db.json".into(),
//!     ..Default::default()
//! })?;
//!
//! store.insert("tasks", Record::new().with("id", "t1").with("title", "Buy milk"))?;
//!
//! let hits = store.select("tasks", Some(&SearchCriteria::any().field("title", "MILK")));
//! assert_eq!(hits.len(), 1);
//!
//! store.flush()?;
//! ```

pub mod config;
pub mod error;
pub mod persist;
pub mod service;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::{ConfigError, ServerConfig};
pub use error::{Result, StoreError};
pub use persist::{PersistMode, PersistStatus, Persister};
pub use service::{router, AppState, Task, TaskRequest, TASKS_TABLE};
pub use store::{StoreConfig, TableStore};
pub use subscriptions::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
