//! The caller-facing write and read paths.
//!
//! [`Shortener::create`] allocates an id, encodes it, inserts the mapping
//! durably, and pre-populates the cache. [`Shortener::resolve`] serves from
//! the cache, falls back to the store with read-repair, and records a click
//! event. Cache writes and event appends are fire-and-forget: they run on
//! detached tasks and their failures are logged, never surfaced.

use crate::config::ShortenerConfig;
use crate::contracts::{EventBus, LookupCache, MappingStore};
use crate::error::{Error, Result};
use crate::types::{ClickEvent, CreatedLink, UrlMapping, unix_millis};
use snaplink::{IdAllocator, LinkId, SystemClock, TimeSource, base62};
use std::sync::Arc;
use url::Url;

/// Cache key for a short code: the literal concatenation `"url:" + code`.
pub fn cache_key(code: &str) -> String {
    format!("url:{code}")
}

/// Stateless-per-call orchestrator over the allocator and the three
/// collaborators. Cheap to clone; safe for concurrent use.
pub struct Shortener<T: TimeSource = SystemClock> {
    allocator: Arc<IdAllocator<T>>,
    store: Arc<dyn MappingStore>,
    cache: Arc<dyn LookupCache>,
    bus: Arc<dyn EventBus>,
    config: ShortenerConfig,
}

impl<T: TimeSource> Clone for Shortener<T> {
    fn clone(&self) -> Self {
        Self {
            allocator: Arc::clone(&self.allocator),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            bus: Arc::clone(&self.bus),
            config: self.config.clone(),
        }
    }
}

impl<T: TimeSource + 'static> Shortener<T> {
    pub fn new(
        allocator: IdAllocator<T>,
        store: Arc<dyn MappingStore>,
        cache: Arc<dyn LookupCache>,
        bus: Arc<dyn EventBus>,
        config: ShortenerConfig,
    ) -> Self {
        Self {
            allocator: Arc::new(allocator),
            store,
            cache,
            bus,
            config,
        }
    }

    /// Creates a short link for an absolute http(s) URL.
    ///
    /// The durable insert is the only step whose failure fails the call;
    /// cache pre-population is best-effort.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the input is not an absolute http(s) URL.
    /// - [`Error::Id`] if the allocator refuses (clock regression).
    /// - [`Error::StoreUnavailable`] if the durable insert fails.
    #[tracing::instrument(skip_all)]
    pub async fn create(&self, original_url: &str) -> Result<CreatedLink> {
        validate_url(original_url)?;

        let id = self.allocator.next_id()?;
        let short_code = base62::encode(id.to_raw());

        self.store
            .insert_mapping(UrlMapping {
                id,
                original_url: original_url.to_owned(),
                short_code: short_code.clone(),
                created_at_ms: unix_millis(),
            })
            .await?;

        tracing::debug!(%id, %short_code, "mapping created");
        self.spawn_cache_fill(&short_code, original_url);

        let short_url = format!(
            "{}/{short_code}",
            self.config.base_url.trim_end_matches('/')
        );
        Ok(CreatedLink {
            short_code,
            short_url,
        })
    }

    /// Resolves a short token to its original URL.
    ///
    /// Once a URL is found by either path, the token is decoded (again, on
    /// the cache-hit path) and a click event is appended off the hot path.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown or unparsable token, or when the
    ///   authoritative lookup fails. Resolution reports one uniform outcome
    ///   regardless of the underlying cause; only the write path surfaces
    ///   collaborator outages.
    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, token: &str, correlation_id: Option<&str>) -> Result<String> {
        let key = cache_key(token);

        let cached = match self.cache.get(&key).await {
            Ok(hit) => hit,
            Err(err) => {
                // A broken cache degrades to the store path, never to an
                // error.
                tracing::warn!(%key, %err, "cache read failed, falling through to store");
                None
            }
        };

        if let Some(original_url) = cached {
            // The token is decoded even though the cached value already
            // answers the call: the click event needs the id, and the decode
            // stays unconditional so event timing is identical on both paths.
            match base62::decode(token) {
                Ok(raw) => self.spawn_click_event(LinkId::from_raw(raw), correlation_id),
                Err(err) => {
                    tracing::debug!(token, %err, "cache hit for undecodable token, click dropped")
                }
            }
            return Ok(original_url);
        }

        // An unparsable token is indistinguishable from an unknown one.
        let raw = base62::decode(token).map_err(|_| Error::NotFound)?;
        let id = LinkId::from_raw(raw);

        let mapping = match self.store.get_mapping(id).await {
            Ok(Some(mapping)) => mapping,
            Ok(None) => return Err(Error::NotFound),
            Err(err) => {
                // The outage is logged for operators; the caller sees the
                // same outcome as an unknown token.
                tracing::warn!(%id, %err, "authoritative lookup failed, reporting not found");
                return Err(Error::NotFound);
            }
        };

        self.spawn_cache_fill(token, &mapping.original_url);
        self.spawn_click_event(id, correlation_id);

        Ok(mapping.original_url)
    }

    /// Best-effort cache population, shared by pre-population and
    /// read-repair.
    fn spawn_cache_fill(&self, code: &str, original_url: &str) {
        let cache = Arc::clone(&self.cache);
        let key = cache_key(code);
        let value = original_url.to_owned();
        let ttl = self.config.cache_ttl;
        tokio::spawn(async move {
            if let Err(err) = cache.set(&key, &value, ttl).await {
                tracing::warn!(%key, %err, "cache write failed, entry repairs on a later miss");
            }
        });
    }

    /// Best-effort click recording; a lost append only costs analytics.
    fn spawn_click_event(&self, url_id: LinkId, correlation_id: Option<&str>) {
        let bus = Arc::clone(&self.bus);
        let stream = self.config.click_stream.clone();
        let event = ClickEvent {
            url_id,
            correlation_id: correlation_id.map(str::to_owned),
        };
        tokio::spawn(async move {
            if let Err(err) = bus.append(&stream, event.to_fields()).await {
                tracing::warn!(%stream, %url_id, %err, "click append failed, event lost");
            }
        });
    }
}

fn validate_url(input: &str) -> Result<()> {
    let parsed = Url::parse(input).map_err(|err| Error::InvalidUrl {
        reason: err.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl {
            reason: format!("unsupported scheme {:?}", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl {
            reason: "missing host".to_owned(),
        });
    }
    Ok(())
}
