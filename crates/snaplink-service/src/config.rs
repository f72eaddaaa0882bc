use core::time::Duration;

/// Tuning for the read and write paths.
#[derive(Clone, Debug)]
pub struct ShortenerConfig {
    /// Prefix for caller-facing short URLs, without a trailing slash.
    pub base_url: String,
    /// TTL applied on cache pre-population and read-repair alike.
    pub cache_ttl: Duration,
    /// Stream that click events are appended to.
    pub click_stream: String,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            click_stream: "clicks".to_owned(),
        }
    }
}

/// Tuning for the aggregation worker.
///
/// Multiple workers may share `group` for horizontal scaling, but each
/// instance must register a distinct `consumer` name; two instances claiming
/// the same consumer identity will interleave deliveries unpredictably.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Upper bound on entries drained per cycle.
    pub batch_size: usize,
    /// Sleep after an empty read.
    pub idle_backoff: Duration,
    /// Longer sleep after a failed cycle.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stream: "clicks".to_owned(),
            group: "click-aggregators".to_owned(),
            consumer: "aggregator-0".to_owned(),
            batch_size: 100,
            idle_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}
