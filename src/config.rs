/// Progress update interval (tick every N pages)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Default number of completed pages between two flushes of a batched sink
pub const FLUSH_INTERVAL: u64 = 10_000;

/// Buffer size for the decompressed XML reader
pub const READER_BUFFER_SIZE: usize = 1024 * 1024;

/// Buffer size for CSV writers
pub const WRITER_BUFFER_SIZE: usize = 128 * 1024;

/// Revisions with at least this many words are candidates for revert detection
pub const REVERT_MIN_WORDS: usize = 1000;

/// English fallback accepted next to the localized user-talk namespace name
pub const DEFAULT_USER_TALK_NAME: &str = "User talk";

/// Dump kind substring required by processors that need the full revision history
pub const META_HISTORY_KIND: &str = "meta-history";
