//! Collaborator contracts: durable store, lookup cache, event bus.
//!
//! Three narrow capability traits so the paths and the worker stay testable
//! against in-memory implementations ([`crate::memory`]) with no network
//! dependency. Production backends (SQL store, Redis cache, Redis streams)
//! implement the same contracts.

use crate::error::Result;
use crate::types::{UrlAnalytics, UrlMapping};
use async_trait::async_trait;
use core::time::Duration;
use snaplink::LinkId;
use std::collections::HashMap;

/// Durable persistence for mappings and aggregate counters.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Inserts a new mapping unconditionally.
    ///
    /// No existence check and no conflict retry: the allocator guarantees the
    /// id (and therefore the short code) has never been issued before.
    async fn insert_mapping(&self, mapping: UrlMapping) -> Result<()>;

    /// Fetches the mapping for an id, if one exists.
    async fn get_mapping(&self, id: LinkId) -> Result<Option<UrlMapping>>;

    /// Applies a batch of additive click-count deltas as one atomic unit.
    ///
    /// For each pair the row is inserted with the delta if absent, otherwise
    /// the delta is added to the existing count and `last_updated_ms`
    /// refreshed. The whole batch commits or none of it does.
    async fn apply_click_deltas(&self, deltas: &HashMap<LinkId, u64>) -> Result<()>;

    /// Reads the aggregate row for an id, if one exists.
    async fn get_analytics(&self, id: LinkId) -> Result<Option<UrlAnalytics>>;
}

/// Volatile key-value accelerator with per-entry expiry.
///
/// Never authoritative: the store is the source of truth, entries may vanish
/// at any time, and write failures are tolerated by every caller.
#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// One delivered entry from the event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusEntry {
    /// Bus-assigned id, used for acknowledgment.
    pub entry_id: String,
    pub fields: Vec<(String, String)>,
}

/// Append-only event log with consumer-group delivery.
///
/// Delivery is at-least-once: an entry delivered to a group stays pending
/// until acknowledged, and a consumer crash before ack leads to redelivery.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Creates the named consumer group at the start of the stream.
    ///
    /// Idempotent: an already-existing group is success, not an error.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Appends an entry and returns its bus-assigned id.
    async fn append(&self, stream: &str, fields: Vec<(String, String)>) -> Result<String>;

    /// Reads up to `max_count` entries not yet delivered to this group.
    ///
    /// Distinct consumers within one group receive disjoint entries; running
    /// two consumers under the same name is not supported.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<BusEntry>>;

    /// Acknowledges processed entries for the group.
    async fn ack(&self, stream: &str, group: &str, entry_ids: &[String]) -> Result<()>;
}
