pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the service layer.
///
/// Propagation policy: anything threatening the collision-free or
/// monotonicity invariants ([`Error::Id`]) or the durable write path
/// ([`Error::StoreUnavailable`]) is surfaced to the caller. Best-effort side
/// paths (cache writes, event appends) swallow their failures after logging;
/// their variants exist so collaborator implementations can report them.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The submitted URL is not a well-formed absolute http(s) URL.
    #[error("invalid url: {reason}")]
    InvalidUrl { reason: String },

    /// The short token is unknown, unparsable, or the authoritative lookup
    /// failed. The causes are deliberately collapsed so resolution reports
    /// one uniform outcome and token validity never leaks as a distinct
    /// signal; the outage itself is logged where it happens.
    #[error("short link not found")]
    NotFound,

    /// The durable mapping store failed a call. Surfaced on the write path
    /// only; resolve collapses store outages into [`Error::NotFound`].
    #[error("mapping store unavailable: {context}")]
    StoreUnavailable { context: String },

    /// The lookup cache failed a call. Always swallowed by the paths.
    #[error("lookup cache unavailable: {context}")]
    CacheUnavailable { context: String },

    /// The event bus failed a call.
    #[error("event bus unavailable: {context}")]
    BusUnavailable { context: String },

    /// Id allocation failed (clock regression or bad configuration).
    #[error(transparent)]
    Id(#[from] snaplink::Error),
}
