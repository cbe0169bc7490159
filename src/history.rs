//! Page/revision state machine over the dispatch engine.
//!
//! States: `Idle → PageOpen → (RevisionOpen → RevisionClosed)* → PageClosed`.
//! A `<title>` opens a page: the page scope is replaced by a fresh value and
//! the title is classified right away, so that a disqualified page is skipped
//! before any of its revisions is read. Revision fields accumulate in the
//! revision scope, which is replaced after every `</revision>`.
//!
//! Analyses plug in through [`HistoryHooks`]; [`HistoryProcessor`] owns the
//! scopes, the run counters and the sampling RNG.

use crate::config::{FLUSH_INTERVAL, PROGRESS_INTERVAL};
use crate::dispatch::{process_dump, Handler, HandlerRegistry, PageProcessor};
use crate::error::SonetError;
use crate::models::{normalize_pagename, PageFilter, PageType};
use crate::parser::Element;
use crate::siteinfo::{Namespaces, SiteInfo, Tag};
use crate::stats::RunStats;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Inclusive revision time window; open ends accept everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeWindow {
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t <= e)
    }
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Inclusion probability of non-desired pages, in `[0, 1]`.
    pub threshold: f64,
    pub desired: Option<FxHashSet<String>>,
    /// Skip every page that is not in `desired`.
    pub desired_only: bool,
    pub window: TimeWindow,
    /// Completed pages between two [`HistoryHooks::flush`] calls.
    pub flush_interval: u64,
    pub seed: Option<u64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            desired: None,
            desired_only: false,
            window: TimeWindow::default(),
            flush_interval: FLUSH_INTERVAL,
            seed: None,
        }
    }
}

/// Reads a desired-pages list: first column of each CSV row, skipping empty
/// rows and rows starting with `#`.
pub fn load_desired(path: &str, delimiter: u8) -> Result<FxHashSet<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open desired pages list: {}", path))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(BufReader::new(file));

    let mut desired = FxHashSet::default();
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {}", path))?;
        match record.get(0) {
            Some(first) if !first.is_empty() && !first.starts_with('#') => {
                desired.insert(first.to_string());
            }
            _ => {}
        }
    }
    info!(pages = desired.len(), path, "Desired pages loaded");
    Ok(desired)
}

/// Outcome of title classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleClass {
    Keep { title: String, page_type: PageType },
    /// Subpage of a kept namespace (e.g. a talk archive); counted and skipped.
    Archive,
    Skip,
}

/// Normal/talk classification of article titles.
#[derive(Debug, Clone)]
pub struct ArticleFilter {
    pub talk_ns: String,
    pub namespaces: Namespaces,
    pub filter: PageFilter,
}

impl ArticleFilter {
    pub fn classify(&self, title: &str) -> TitleClass {
        let (title, page_type) = match title.split_once(':') {
            Some((prefix, rest)) if prefix == self.talk_ns => (rest, PageType::Talk),
            Some((prefix, _)) if self.namespaces.is_namespace(prefix) => {
                return TitleClass::Skip
            }
            _ => (title, PageType::Normal),
        };
        if !self.filter.accepts(page_type) {
            return TitleClass::Skip;
        }
        TitleClass::Keep {
            title: title.to_string(),
            page_type,
        }
    }
}

/// What a revision hook wants for the revision that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextRevision {
    #[default]
    Process,
    Skip,
}

/// Page-scoped fields, replaced on every `<title>`.
#[derive(Debug, Clone, Default)]
pub struct PageScope {
    /// Title as it appears in the dump.
    pub full_title: String,
    /// Title without the namespace prefix.
    pub title: String,
    pub page_type: PageType,
    pub desired: bool,
    pub skip: bool,
    /// Set once the page's `<title>` has been read.
    pub titled: bool,
    pub redirect: bool,
}

/// Revision-scoped fields, replaced after every `</revision>`.
#[derive(Debug, Clone, Default)]
pub struct RevisionScope {
    pub timestamp: Option<String>,
    pub time: Option<NaiveDateTime>,
    pub username: Option<String>,
    pub ip: Option<String>,
    pub sender: Option<String>,
    /// The sender is an IP address.
    pub anonymous: bool,
    pub comment: Option<String>,
    pub text: Option<String>,
    pub skip: bool,
}

/// Analysis-specific behavior plugged into [`HistoryProcessor`].
pub trait HistoryHooks {
    /// Revision-level elements this analysis needs, besides page, title and
    /// redirect which are always subscribed.
    const FIELDS: &'static [Tag];

    /// Whether a `<redirect>` discards the rest of its page.
    const SKIP_REDIRECTS: bool = true;

    fn classify_title(&mut self, title: &str) -> TitleClass;

    fn on_page_open(&mut self, _page: &PageScope) -> Result<()> {
        Ok(())
    }

    fn on_redirect(&mut self, _page: &PageScope) -> Result<()> {
        Ok(())
    }

    fn on_revision_complete(
        &mut self,
        _page: &PageScope,
        _revision: &RevisionScope,
    ) -> Result<NextRevision> {
        Ok(NextRevision::Process)
    }

    /// Page-level save; not called for skipped pages.
    fn on_page_complete(&mut self, _page: &PageScope) -> Result<()> {
        Ok(())
    }

    /// Drains batched output.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_stream_end(&mut self, _stats: &RunStats) -> Result<()> {
        self.flush()
    }
}

pub struct HistoryProcessor<H> {
    config: HistoryConfig,
    page: PageScope,
    revision: RevisionScope,
    stats: RunStats,
    pages_closed: u64,
    rng: StdRng,
    hooks: H,
}

impl<H: HistoryHooks> HistoryProcessor<H> {
    pub fn new(config: HistoryConfig, hooks: H) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            page: PageScope::default(),
            revision: RevisionScope::default(),
            stats: RunStats::new(),
            pages_closed: 0,
            rng,
            hooks,
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn page(&self) -> &PageScope {
        &self.page
    }

    pub fn revision(&self) -> &RevisionScope {
        &self.revision
    }

    pub fn into_parts(self) -> (H, RunStats) {
        (self.hooks, self.stats)
    }

    fn is_desired(&self, page: &PageScope) -> bool {
        match &self.config.desired {
            Some(desired) => desired.contains(&page.title) || desired.contains(&page.full_title),
            None => false,
        }
    }

    fn process_title(&mut self, elem: &Element) -> Result<()> {
        self.stats.inc_seen();
        self.page = PageScope::default();
        self.revision = RevisionScope::default();

        self.page.titled = true;

        let full_title = elem.text().unwrap_or_default().to_string();
        let class = self.hooks.classify_title(&full_title);
        self.page.full_title = full_title;

        match class {
            TitleClass::Keep { title, page_type } => {
                self.page.title = title;
                self.page.page_type = page_type;
            }
            TitleClass::Archive => {
                self.stats.inc_archived();
                self.page.skip = true;
                return Ok(());
            }
            TitleClass::Skip => {
                self.page.page_type = PageType::Other;
                self.page.skip = true;
                return Ok(());
            }
        }

        self.page.desired = self.is_desired(&self.page);
        if !self.page.desired {
            if self.config.desired_only {
                self.page.skip = true;
                return Ok(());
            }
            let threshold = self.config.threshold;
            if threshold < 1.0 && (threshold <= 0.0 || self.rng.gen::<f64>() > threshold) {
                self.page.skip = true;
                return Ok(());
            }
        }

        debug!(title = %self.page.full_title, page_type = %self.page.page_type, "Page open");
        self.hooks.on_page_open(&self.page)
    }

    fn process_redirect(&mut self, _: &Element) -> Result<()> {
        self.page.redirect = true;
        if H::SKIP_REDIRECTS {
            self.page.skip = true;
        }
        self.hooks.on_redirect(&self.page)
    }

    fn process_timestamp(&mut self, elem: &Element) -> Result<()> {
        if self.revision.skip {
            return Ok(());
        }
        let raw = elem.text().unwrap_or_default();
        let time = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| {
            SonetError::Malformed {
                index: self.stats.seen(),
                reason: format!("bad timestamp {:?}: {}", raw, e),
            }
        })?;
        if !self.config.window.contains(time) {
            self.revision.skip = true;
            return Ok(());
        }
        self.revision.timestamp = Some(raw.to_string());
        self.revision.time = Some(time);
        Ok(())
    }

    fn process_username(&mut self, elem: &Element) -> Result<()> {
        if !self.revision.skip {
            self.revision.username = elem.text.clone();
        }
        Ok(())
    }

    fn process_ip(&mut self, elem: &Element) -> Result<()> {
        if !self.revision.skip {
            self.revision.ip = elem.text.clone();
        }
        Ok(())
    }

    /// Resolves the sender: username first, then IP. A contributor with
    /// neither was deleted; only its revision is dropped.
    fn process_contributor(&mut self, elem: &Element) -> Result<()> {
        if self.revision.skip {
            return Ok(());
        }
        let username = self.revision.username.take().filter(|u| !u.trim().is_empty());
        let ip = self.revision.ip.take().filter(|ip| !ip.trim().is_empty());
        let (sender, anonymous) = match (username, ip) {
            _ if elem.attr("deleted").is_some() => (None, false),
            (Some(username), _) => (Some(normalize_pagename(&username)), false),
            (None, Some(ip)) => (Some(ip), true),
            (None, None) => (None, false),
        };
        if sender.is_none() {
            self.stats.inc_deleted();
            self.revision.skip = true;
        }
        self.revision.sender = sender;
        self.revision.anonymous = anonymous;
        Ok(())
    }

    fn process_comment(&mut self, elem: &Element) -> Result<()> {
        if !self.revision.skip {
            self.revision.comment = elem.text.clone();
        }
        Ok(())
    }

    fn process_text(&mut self, elem: &Element) -> Result<()> {
        if !self.revision.skip {
            self.revision.text = elem.text.clone();
        }
        Ok(())
    }

    fn untitled_page(&self, what: &str) -> anyhow::Error {
        SonetError::Malformed {
            index: self.stats.seen(),
            reason: format!("{} in a page without <title>", what),
        }
        .into()
    }

    fn process_revision(&mut self, _: &Element) -> Result<()> {
        if !self.page.titled {
            return Err(self.untitled_page("revision"));
        }
        let revision = std::mem::take(&mut self.revision);
        if revision.skip {
            self.stats.inc_skipped_revisions();
            return Ok(());
        }
        if H::FIELDS.contains(&Tag::Timestamp) && revision.time.is_none() {
            return Err(SonetError::Malformed {
                index: self.stats.seen(),
                reason: format!("revision without timestamp in {:?}", self.page.full_title),
            }
            .into());
        }
        if H::FIELDS.contains(&Tag::Contributor) && revision.sender.is_none() {
            return Err(SonetError::Malformed {
                index: self.stats.seen(),
                reason: format!("revision without contributor in {:?}", self.page.full_title),
            }
            .into());
        }

        self.stats.inc_revisions();
        let next = self.hooks.on_revision_complete(&self.page, &revision)?;
        self.revision.skip = next == NextRevision::Skip;
        Ok(())
    }

    fn process_page(&mut self, _: &Element) -> Result<()> {
        if !self.page.titled {
            return Err(self.untitled_page("page end"));
        }
        if !self.page.skip {
            self.hooks.on_page_complete(&self.page)?;
            self.stats.inc_processed();
        }
        self.page = PageScope::default();
        self.revision = RevisionScope::default();

        self.pages_closed += 1;
        if self.pages_closed % self.config.flush_interval.max(1) == 0 {
            self.hooks.flush()?;
        }
        if self.pages_closed % PROGRESS_INTERVAL == 0 {
            debug!(
                pages = self.pages_closed,
                processed = self.stats.processed(),
                "Progress"
            );
        }
        Ok(())
    }
}

impl<H: HistoryHooks> PageProcessor for HistoryProcessor<H> {
    fn register(registry: &mut HandlerRegistry<Self>) {
        registry
            .on(Tag::Page, Self::process_page)
            .on(Tag::Title, Self::process_title)
            .on(Tag::Redirect, Self::process_redirect);

        for tag in H::FIELDS {
            let handler: Handler<Self> = match tag {
                Tag::Revision => Self::process_revision,
                Tag::Timestamp => Self::process_timestamp,
                Tag::Contributor => Self::process_contributor,
                Tag::Username => Self::process_username,
                Tag::Ip => Self::process_ip,
                Tag::Comment => Self::process_comment,
                Tag::Text => Self::process_text,
                Tag::Page | Tag::Title | Tag::Redirect | Tag::Ns | Tag::Id => continue,
            };
            registry.on(*tag, handler);
        }
    }

    fn skip_page(&self) -> bool {
        self.page.skip
    }

    fn on_stream_end(&mut self) -> Result<()> {
        info!(
            seen = self.stats.seen(),
            processed = self.stats.processed(),
            archived = self.stats.archived(),
            deleted = self.stats.deleted(),
            "End of stream"
        );
        self.hooks.on_stream_end(&self.stats)
    }

    fn current_page(&self) -> Option<&str> {
        if self.page.full_title.is_empty() {
            None
        } else {
            Some(&self.page.full_title)
        }
    }
}

/// Streams the dump at `path` through `hooks`, resolving tag names against
/// the already-read `siteinfo` header.
pub fn run_history<H: HistoryHooks>(
    path: &str,
    siteinfo: &SiteInfo,
    config: HistoryConfig,
    hooks: H,
    progress: bool,
) -> Result<(H, RunStats)> {
    let mut tags = vec![Tag::Page, Tag::Title, Tag::Redirect];
    tags.extend_from_slice(H::FIELDS);
    let table = siteinfo.tag_table(&tags);

    let mut processor = HistoryProcessor::new(config, hooks);
    process_dump(path, &table, &mut processor, progress)?;
    Ok(processor.into_parts())
}
