use thiserror::Error;

/// Fatal failure classes raised by the streaming core.
///
/// Recoverable conditions (deleted contributors, revisions outside the
/// requested window) never surface here; they are counted in
/// [`crate::stats::RunStats`] instead.
#[derive(Debug, Error)]
pub enum SonetError {
    #[error("malformed dump at element {index}: {reason}")]
    Malformed { index: u64, reason: String },

    #[error("handler for <{tag}> failed on page {page:?} (element {index})")]
    Handler {
        tag: String,
        page: Option<String>,
        index: u64,
    },

    #[error("wrong dump kind {found:?}, required: *-{required}")]
    WrongDumpKind { found: String, required: String },

    #[error("cannot classify dump file name: {0}")]
    UnknownDumpName(String),

    #[error("namespace {0:?} not found in the dump header")]
    MissingNamespace(String),

    #[error("desired page {0:?} is a redirect")]
    DesiredRedirect(String),

    #[error("edge cache: {0}")]
    EdgeCache(#[from] EdgeCacheError),
}

/// Protocol violations of [`crate::edgecache::EdgeCache`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EdgeCacheError {
    #[error("contribution to {destination:?} after the cache was flushed")]
    AddAfterFlush { destination: String },

    #[error("cache flushed twice")]
    AlreadyFlushed,

    #[error("graph requested before flush")]
    NotFlushed,

    #[error("mixed weight kinds for {sender:?} -> {destination:?}")]
    MixedWeights { sender: String, destination: String },

    #[error("not all the edges have been flushed: {flushed} flushed, {remaining} remaining")]
    CountMismatch { flushed: usize, remaining: usize },
}
