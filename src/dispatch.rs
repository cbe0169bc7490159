//! Tag dispatch engine.
//!
//! Each processor declares the elements it wants through
//! [`PageProcessor::register`]; the [`Dispatcher`] then walks the closed
//! elements of the stream and calls the matching handler, or drops the
//! element when nobody subscribed to it or the current page is skipped.
//!
//! The page-boundary element is dispatched even while the page is skipped,
//! since its handler is what clears the skip flag for the next page.

use crate::config::PROGRESS_INTERVAL;
use crate::error::SonetError;
use crate::parser::{Element, WikiReader};
use crate::siteinfo::{Tag, TagTable};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

pub type Handler<P> = fn(&mut P, &Element) -> Result<()>;

/// Concrete tag name → handler. Immutable once the dispatcher is built.
pub struct HandlerRegistry<P> {
    table: TagTable,
    handlers: FxHashMap<String, Handler<P>>,
    page_tag: Option<String>,
}

impl<P> HandlerRegistry<P> {
    pub fn new(table: &TagTable) -> Self {
        Self {
            table: table.clone(),
            handlers: FxHashMap::default(),
            page_tag: table.get(Tag::Page).map(str::to_string),
        }
    }

    /// Binds `handler` to the concrete name of `tag`. Tags missing from the
    /// table are ignored: that event class is simply never dispatched.
    pub fn on(&mut self, tag: Tag, handler: Handler<P>) -> &mut Self {
        match self.table.get(tag) {
            Some(name) => {
                self.handlers.insert(name.to_string(), handler);
            }
            None => debug!(tag = tag.local_name(), "No tag name for handler, ignoring"),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Handler<P>> {
        self.handlers.get(name).copied()
    }

    pub fn is_page_tag(&self, name: &str) -> bool {
        self.page_tag.as_deref() == Some(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A consumer of the element stream.
pub trait PageProcessor: Sized {
    /// Subscribes the handlers of this processor.
    fn register(registry: &mut HandlerRegistry<Self>);

    /// Whether the rest of the current page has to be discarded.
    fn skip_page(&self) -> bool;

    /// Runs once the stream is exhausted.
    fn on_stream_end(&mut self) -> Result<()> {
        Ok(())
    }

    /// Title of the page being processed, for diagnostics.
    fn current_page(&self) -> Option<&str> {
        None
    }
}

pub struct Dispatcher<P> {
    registry: HandlerRegistry<P>,
    progress: bool,
}

impl<P: PageProcessor> Dispatcher<P> {
    pub fn new(table: &TagTable) -> Self {
        let mut registry = HandlerRegistry::new(table);
        P::register(&mut registry);
        debug!(handlers = registry.len(), "Handler registry built");
        Self {
            registry,
            progress: false,
        }
    }

    /// Shows a spinner ticking every `PROGRESS_INTERVAL` pages.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry<P> {
        &self.registry
    }

    /// Streams `source` through `processor`, then calls
    /// [`PageProcessor::on_stream_end`]. Returns the number of pages seen.
    ///
    /// The first error, from the source or from a handler, aborts the run.
    pub fn run<I>(&self, processor: &mut P, source: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<Element>>,
    {
        let pb = if self.progress {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        let mut index: u64 = 0;
        let mut pages: u64 = 0;

        for elem in source {
            let elem = elem.with_context(|| match processor.current_page() {
                Some(title) => format!("Failed to read element {} (page {:?})", index, title),
                None => format!("Failed to read element {}", index),
            })?;
            index += 1;

            let Some(handler) = self.registry.get(&elem.name) else {
                continue;
            };
            let is_page = self.registry.is_page_tag(&elem.name);
            if !is_page && processor.skip_page() {
                continue;
            }

            handler(processor, &elem).with_context(|| SonetError::Handler {
                tag: elem.name.clone(),
                page: processor.current_page().map(str::to_string),
                index,
            })?;

            if is_page {
                pages += 1;
                if pages % PROGRESS_INTERVAL == 0 {
                    pb.tick();
                    pb.set_message(format!("{} pages", pages));
                }
            }
        }

        pb.finish_and_clear();
        info!(pages, elements = index, "Stream exhausted");
        processor.on_stream_end()?;
        Ok(pages)
    }
}

/// Opens `path` and streams it through `processor`.
pub fn process_dump<P: PageProcessor>(
    path: &str,
    table: &TagTable,
    processor: &mut P,
    progress: bool,
) -> Result<u64> {
    let reader = WikiReader::open(path)?;
    Dispatcher::new(table)
        .with_progress(progress)
        .run(processor, reader)
        .with_context(|| format!("Failed to process dump: {}", path))
}
