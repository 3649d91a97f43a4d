//! Subscription types for live store events.

use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug)]
pub struct SubscriptionFilter {
    /// Filter by table names (None = all tables).
    pub tables: Option<Vec<String>>,

    /// Include inserted/updated/deleted events.
    pub include_records: bool,

    /// Include persisted/persist-failed events.
    pub include_persistence: bool,
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl SubscriptionFilter {
    /// Record changes on every table.
    pub fn records() -> Self {
        Self {
            tables: None,
            include_records: true,
            include_persistence: false,
        }
    }

    /// Record changes on the named tables only.
    pub fn tables(tables: Vec<String>) -> Self {
        Self {
            tables: Some(tables),
            include_records: true,
            include_persistence: false,
        }
    }

    /// Only snapshot write outcomes.
    pub fn persistence() -> Self {
        Self {
            tables: None,
            include_records: false,
            include_persistence: true,
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            tables: None,
            include_records: true,
            include_persistence: true,
        }
    }

    pub(crate) fn matches(&self, event: &StoreEvent) -> bool {
        match event.table() {
            Some(table) => {
                self.include_records
                    && self
                        .tables
                        .as_ref()
                        .map_or(true, |tables| tables.iter().any(|t| t == table))
            }
            None => match event {
                StoreEvent::Persisted { .. } | StoreEvent::PersistFailed { .. } => {
                    self.include_persistence
                }
                _ => true,
            },
        }
    }
}

/// Events emitted to subscriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    // --- Record Events ---
    /// A record was appended to a table.
    Inserted { table: String, id: String },

    /// A record was merged with a patch.
    Updated { table: String, id: String },

    /// A record was removed.
    Deleted { table: String, id: String },

    // --- Persistence Events ---
    /// The snapshot with this generation reached the backing file.
    Persisted { generation: u64 },

    /// Writing the snapshot with this generation failed.
    PersistFailed { generation: u64, error: String },

    // --- Lifecycle Events ---
    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl StoreEvent {
    /// Table a record event refers to.
    pub fn table(&self) -> Option<&str> {
        match self {
            StoreEvent::Inserted { table, .. }
            | StoreEvent::Updated { table, .. }
            | StoreEvent::Deleted { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
