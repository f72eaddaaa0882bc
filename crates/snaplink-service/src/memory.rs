//! In-memory collaborator implementations.
//!
//! These back the integration suite (the core invariants must be verifiable
//! with zero network dependency) and double as embedded backends. Each type
//! guards its maps with a [`parking_lot::Mutex`] and exposes failure toggles
//! so degraded-path behavior is testable.

use crate::contracts::{BusEntry, EventBus, LookupCache, MappingStore};
use crate::error::{Error, Result};
use crate::types::{UrlAnalytics, UrlMapping, unix_millis};
use async_trait::async_trait;
use core::time::Duration;
use parking_lot::Mutex;
use snaplink::LinkId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

fn injected(toggle: &str) -> String {
    format!("injected {toggle} failure")
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    mappings: HashMap<LinkId, UrlMapping>,
    analytics: HashMap<LinkId, UrlAnalytics>,
}

/// Durable-store stand-in: two maps behind one lock, so a delta batch is
/// trivially all-or-nothing.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes (inserts and delta batches) fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of stored mappings.
    pub fn mapping_count(&self) -> usize {
        self.inner.lock().mappings.len()
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn insert_mapping(&self, mapping: UrlMapping) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                context: injected("write"),
            });
        }
        self.inner.lock().mappings.insert(mapping.id, mapping);
        Ok(())
    }

    async fn get_mapping(&self, id: LinkId) -> Result<Option<UrlMapping>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                context: injected("read"),
            });
        }
        Ok(self.inner.lock().mappings.get(&id).cloned())
    }

    async fn apply_click_deltas(&self, deltas: &HashMap<LinkId, u64>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                context: injected("write"),
            });
        }
        let now_ms = unix_millis();
        let mut inner = self.inner.lock();
        for (&url_id, &count) in deltas {
            inner
                .analytics
                .entry(url_id)
                .and_modify(|row| {
                    row.click_count += count;
                    row.last_updated_ms = now_ms;
                })
                .or_insert(UrlAnalytics {
                    url_id,
                    click_count: count,
                    last_updated_ms: now_ms,
                });
        }
        Ok(())
    }

    async fn get_analytics(&self, id: LinkId) -> Result<Option<UrlAnalytics>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                context: injected("read"),
            });
        }
        Ok(self.inner.lock().analytics.get(&id).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// TTL-honoring cache stand-in.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<HashMap<String, CacheEntry>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Drops every entry, simulating a cold or flushed cache.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of live (possibly expired but unevicted) entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl LookupCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::CacheUnavailable {
                context: injected("read"),
            });
        }
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::CacheUnavailable {
                context: injected("write"),
            });
        }
        self.inner.lock().insert(
            key.to_owned(),
            CacheEntry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBus
// ---------------------------------------------------------------------------

struct StoredEntry {
    entry_id: String,
    fields: Vec<(String, String)>,
}

#[derive(Default)]
struct GroupState {
    /// Index of the next never-delivered entry.
    next_index: usize,
    /// Delivered-but-unacknowledged entries: entry id → stream index.
    pending: HashMap<String, usize>,
    /// Indexes queued for redelivery, drained before new entries.
    requeued: VecDeque<usize>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<StoredEntry>,
    groups: HashMap<String, GroupState>,
    seq: u64,
}

/// Consumer-group event log stand-in with redis-stream-like semantics:
/// entries delivered to a group stay pending until acknowledged, and
/// [`MemoryBus::redeliver_pending`] simulates the post-crash claim of an
/// unacked batch.
#[derive(Default)]
pub struct MemoryBus {
    streams: Mutex<HashMap<String, StreamState>>,
    fail_appends: AtomicBool,
    fail_acks: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_acks(&self, fail: bool) {
        self.fail_acks.store(fail, Ordering::SeqCst);
    }

    /// Total entries ever appended to a stream.
    pub fn stream_len(&self, stream: &str) -> usize {
        self.streams
            .lock()
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }

    /// Entries delivered to the group and not yet acknowledged.
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.streams
            .lock()
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Requeues every pending entry for redelivery, as a crashed consumer's
    /// unacked batch would be after a claim.
    pub fn redeliver_pending(&self, stream: &str, group: &str) {
        let mut streams = self.streams.lock();
        let Some(group) = streams.get_mut(stream).and_then(|s| s.groups.get_mut(group)) else {
            return;
        };
        let mut indexes: Vec<usize> = group.pending.drain().map(|(_, index)| index).collect();
        indexes.sort_unstable();
        group.requeued.extend(indexes);
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.lock();
        streams
            .entry(stream.to_owned())
            .or_default()
            .groups
            .entry(group.to_owned())
            .or_default();
        Ok(())
    }

    async fn append(&self, stream: &str, fields: Vec<(String, String)>) -> Result<String> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::BusUnavailable {
                context: injected("append"),
            });
        }
        let mut streams = self.streams.lock();
        let state = streams.entry(stream.to_owned()).or_default();
        state.seq += 1;
        let entry_id = format!("{}-0", state.seq);
        state.entries.push(StoredEntry {
            entry_id: entry_id.clone(),
            fields,
        });
        Ok(entry_id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        max_count: usize,
    ) -> Result<Vec<BusEntry>> {
        let mut streams = self.streams.lock();
        let Some(state) = streams.get_mut(stream) else {
            return Ok(Vec::new());
        };
        let StreamState {
            entries, groups, ..
        } = &mut *state;
        let group = groups.entry(group.to_owned()).or_default();

        let mut out = Vec::new();
        while out.len() < max_count {
            let index = match group.requeued.pop_front() {
                Some(index) => index,
                None if group.next_index < entries.len() => {
                    let index = group.next_index;
                    group.next_index += 1;
                    index
                }
                None => break,
            };
            let entry = &entries[index];
            group.pending.insert(entry.entry_id.clone(), index);
            out.push(BusEntry {
                entry_id: entry.entry_id.clone(),
                fields: entry.fields.clone(),
            });
        }
        Ok(out)
    }

    async fn ack(&self, stream: &str, group: &str, entry_ids: &[String]) -> Result<()> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(Error::BusUnavailable {
                context: injected("ack"),
            });
        }
        let mut streams = self.streams.lock();
        let Some(group) = streams.get_mut(stream).and_then(|s| s.groups.get_mut(group)) else {
            return Ok(());
        };
        for entry_id in entry_ids {
            group.pending.remove(entry_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClickEvent, FIELD_URL_ID};

    fn fields(url_id: u64) -> Vec<(String, String)> {
        ClickEvent {
            url_id: LinkId::from_raw(url_id),
            correlation_id: None,
        }
        .to_fields()
    }

    #[tokio::test]
    async fn group_reads_are_delivered_once_until_redelivery() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g").await.unwrap();
        bus.append("s", fields(1)).await.unwrap();
        bus.append("s", fields(2)).await.unwrap();

        let first = bus.read_group("s", "g", "c0", 10).await.unwrap();
        assert_eq!(first.len(), 2);

        // Undelivered reads return nothing while the batch is pending.
        assert!(bus.read_group("s", "g", "c0", 10).await.unwrap().is_empty());
        assert_eq!(bus.pending_count("s", "g"), 2);

        bus.redeliver_pending("s", "g");
        let again = bus.read_group("s", "g", "c0", 10).await.unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn ack_clears_pending() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g").await.unwrap();
        bus.append("s", fields(1)).await.unwrap();

        let batch = bus.read_group("s", "g", "c0", 10).await.unwrap();
        let ids: Vec<String> = batch.into_iter().map(|e| e.entry_id).collect();
        bus.ack("s", "g", &ids).await.unwrap();

        assert_eq!(bus.pending_count("s", "g"), 0);
        bus.redeliver_pending("s", "g");
        assert!(bus.read_group("s", "g", "c0", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ensure_group_is_idempotent() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g").await.unwrap();
        bus.append("s", fields(1)).await.unwrap();
        bus.read_group("s", "g", "c0", 10).await.unwrap();

        // Re-ensuring must not reset the group's cursor or pending set.
        bus.ensure_group("s", "g").await.unwrap();
        assert_eq!(bus.pending_count("s", "g"), 1);
        assert!(bus.read_group("s", "g", "c0", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_respects_max_count() {
        let bus = MemoryBus::new();
        for i in 0..5 {
            bus.append("s", fields(i)).await.unwrap();
        }
        let batch = bus.read_group("s", "g", "c0", 3).await.unwrap();
        assert_eq!(batch.len(), 3);
        let rest = bus.read_group("s", "g", "c0", 10).await.unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("url:a", "https://example.com", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(
            cache.get("url:a").await.unwrap().as_deref(),
            Some("https://example.com")
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("url:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delta_batches_are_additive() {
        let store = MemoryStore::new();
        let id = LinkId::from_raw(99);

        let mut deltas = HashMap::new();
        deltas.insert(id, 3u64);
        store.apply_click_deltas(&deltas).await.unwrap();
        store.apply_click_deltas(&deltas).await.unwrap();

        let row = store.get_analytics(id).await.unwrap().unwrap();
        assert_eq!(row.click_count, 6);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_unavailable() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let mut deltas = HashMap::new();
        deltas.insert(LinkId::from_raw(1), 1u64);
        assert!(matches!(
            store.apply_click_deltas(&deltas).await,
            Err(Error::StoreUnavailable { .. })
        ));

        let bus = MemoryBus::new();
        bus.set_fail_appends(true);
        assert!(matches!(
            bus.append("s", vec![(FIELD_URL_ID.into(), "1".into())]).await,
            Err(Error::BusUnavailable { .. })
        ));
    }
}
