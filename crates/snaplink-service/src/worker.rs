//! Background click aggregation.
//!
//! The worker drains the click stream in batches through a consumer group,
//! folds each batch into per-link counts in memory, applies the counts as a
//! single atomic upsert batch, and only then acknowledges the entries. A
//! crash between apply and ack redelivers the batch, so aggregation is
//! at-least-once: over-counting is possible only in that crash window, never
//! silent loss.

use crate::config::WorkerConfig;
use crate::contracts::{EventBus, MappingStore};
use crate::error::Result;
use crate::types::ClickEvent;
use core::time::Duration;
use parking_lot::Mutex;
use snaplink::LinkId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Lifecycle of the worker loop, exposed for inspection and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Ensuring the consumer group exists.
    Starting,
    /// Between cycles, about to read.
    Running,
    /// Last read returned nothing; sleeping the idle backoff.
    Idle,
    /// Processing a non-empty batch.
    Draining,
    /// Shutdown observed; finishing up.
    Stopping,
    /// Loop exited.
    Stopped,
}

/// Long-lived consumer converting click events into additive counter
/// updates. One instance per consumer name; runs until cancelled.
pub struct AggregationWorker {
    bus: Arc<dyn EventBus>,
    store: Arc<dyn MappingStore>,
    config: WorkerConfig,
    shutdown: CancellationToken,
    state: Mutex<WorkerState>,
    decode_errors: AtomicU64,
}

impl AggregationWorker {
    pub fn new(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn MappingStore>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bus,
            store,
            config,
            shutdown,
            state: Mutex::new(WorkerState::Starting),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Number of malformed entries skipped since startup.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "worker state transition");
            *state = next;
        }
    }

    /// Runs the worker until the cancellation token fires.
    ///
    /// Transient errors are logged and absorbed with a backoff; the loop
    /// never exits on its own. Cancellation is honored between batches, so
    /// an in-flight batch always finishes (or fails) cleanly.
    pub async fn run(&self) {
        self.set_state(WorkerState::Starting);
        while !self.shutdown.is_cancelled() {
            match self
                .bus
                .ensure_group(&self.config.stream, &self.config.group)
                .await
            {
                Ok(()) => break,
                Err(err) => {
                    tracing::warn!(%err, "consumer group setup failed, backing off");
                    self.sleep_or_cancel(self.config.error_backoff).await;
                }
            }
        }

        // Cancellation during setup: the worker never started, so it never
        // logs as started or stopped.
        if self.shutdown.is_cancelled() {
            self.set_state(WorkerState::Stopping);
            self.set_state(WorkerState::Stopped);
            return;
        }

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            "aggregation worker started"
        );

        while !self.shutdown.is_cancelled() {
            self.set_state(WorkerState::Running);
            match self.run_cycle().await {
                Ok(0) => {
                    self.set_state(WorkerState::Idle);
                    self.sleep_or_cancel(self.config.idle_backoff).await;
                }
                Ok(drained) => {
                    tracing::trace!(drained, "batch applied and acknowledged");
                }
                Err(err) => {
                    // Batch left unacknowledged; it redelivers after the
                    // backoff.
                    tracing::error!(%err, "aggregation cycle failed, backing off");
                    self.sleep_or_cancel(self.config.error_backoff).await;
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        tracing::info!("aggregation worker stopped");
        self.set_state(WorkerState::Stopped);
    }

    /// One read → aggregate → apply → ack cycle.
    ///
    /// Returns the number of entries drained (0 means the stream was empty).
    async fn run_cycle(&self) -> Result<usize> {
        let entries = self
            .bus
            .read_group(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer,
                self.config.batch_size,
            )
            .await?;

        if entries.is_empty() {
            return Ok(0);
        }
        self.set_state(WorkerState::Draining);

        let mut deltas: HashMap<LinkId, u64> = HashMap::new();
        let mut entry_ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            entry_ids.push(entry.entry_id.clone());
            match ClickEvent::from_fields(&entry.fields) {
                Some(event) => *deltas.entry(event.url_id).or_insert(0) += 1,
                None => {
                    // Malformed entries are skipped and still acknowledged;
                    // they would otherwise redeliver forever.
                    self.decode_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(entry_id = %entry.entry_id, "skipping malformed click entry");
                }
            }
        }

        if !deltas.is_empty() {
            self.store.apply_click_deltas(&deltas).await?;
        }

        // Acknowledge only after the aggregate effect is durable.
        self.bus
            .ack(&self.config.stream, &self.config.group, &entry_ids)
            .await?;

        Ok(entries.len())
    }

    async fn sleep_or_cancel(&self, duration: Duration) {
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            () = tokio::time::sleep(duration) => {}
        }
    }
}
