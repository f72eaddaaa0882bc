//! Orchestration layer of the snaplink URL-shortening core.
//!
//! Wires the [`snaplink`] allocator and codec to three narrow collaborator
//! contracts (durable [`MappingStore`], volatile [`LookupCache`], append-only
//! [`EventBus`]) behind two caller-facing operations and one background
//! worker:
//!
//! - [`Shortener::create`]: validate → allocate → encode → durable insert →
//!   best-effort cache pre-population.
//! - [`Shortener::resolve`]: cache-aside lookup with read-repair and a
//!   fire-and-forget click event per hit.
//! - [`AggregationWorker`]: batched, at-least-once consumption of click
//!   events into additive counters.
//!
//! The [`memory`] module provides in-memory collaborators so the whole
//! pipeline runs and is tested without any external backend.

mod config;
pub mod contracts;
mod error;
pub mod memory;
mod shortener;
mod types;
mod worker;

pub use config::{ShortenerConfig, WorkerConfig};
pub use contracts::{BusEntry, EventBus, LookupCache, MappingStore};
pub use error::{Error, Result};
pub use shortener::{Shortener, cache_key};
pub use types::{ClickEvent, CreatedLink, FIELD_CORRELATION_ID, FIELD_URL_ID, UrlAnalytics, UrlMapping};
pub use worker::{AggregationWorker, WorkerState};
