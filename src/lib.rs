//! Sonet: social network extraction from MediaWiki XML dumps
//!
//! A dump is read once, as a stream of closed elements, and turned into
//! either a graph of who interacts with whom or a table of per-revision
//! records. Nothing but the current page, the current revision and the
//! pending edges is kept in memory.
//!
//! # Pipeline
//!
//! 1. **Header** -- [`siteinfo`] reads the root element and the localized
//!    namespace names, then resolves the element names of the dump
//! 2. **Dispatch** -- [`dispatch`] routes each closed element to the handler
//!    registered for its tag, dropping the rest of a skipped page
//! 3. **State machine** -- [`history`] tracks the page and revision scopes,
//!    classifies titles, samples pages and resolves contributors
//! 4. **Analysis** -- a [`processors`] hook turns completed revisions into
//!    edges ([`edgecache`]) or records ([`sink`])
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming XML element source with BZ2 decompression
//! - [`siteinfo`] -- Dump header, namespace table and tag name resolution
//! - [`dispatch`] -- Tag to handler registry and the dispatch loop
//! - [`history`] -- Page/revision state machine and sampling
//! - [`edgecache`] -- Pending edges keyed by destination, flushed once
//! - [`graph`] -- Read-only directed graph and its CSV export
//! - [`processors`] -- User-talk network, co-edit network, page sampler,
//!   revision text extractor
//! - [`diff`] -- Inserted text between two revisions
//! - [`dump`] -- Language, date and kind from a dump file name
//! - [`sink`] -- Append-only record outputs
//! - [`stats`] -- Run counters
//! - [`config`] -- Constants
//!
//! # Example Usage
//!
//! ```bash
//! # User talk network of two wikis, in parallel
//! sonet talk-graph -o out/ itwiki-20100218-stub-meta-history.xml.bz2 \
//!     vecwiki-20100307-stub-meta-history.xml.bz2
//!
//! # 1% sample of talk pages
//! sonet sample-pages -o out/ --type talk --ratio 0.01 itwiki-20100218-pages-articles.xml.bz2
//! ```

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod dump;
pub mod edgecache;
pub mod error;
pub mod graph;
pub mod history;
pub mod models;
pub mod parser;
pub mod processors;
pub mod siteinfo;
pub mod sink;
pub mod stats;
