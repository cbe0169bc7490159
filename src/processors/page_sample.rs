use crate::history::{ArticleFilter, HistoryHooks, PageScope, TitleClass};
use crate::models::{PageType, SampledPage};
use crate::siteinfo::Tag;
use crate::sink::Sink;
use crate::stats::RunStats;
use anyhow::Result;
use tracing::{debug, info};

/// Collects the titles of the pages retained by the sampling filters.
///
/// Titles are queued at page end and handed to the sink on every flush, so
/// at most `flush_interval` titles are held in memory.
pub struct PageSampler<S> {
    filter: ArticleFilter,
    queue: Vec<SampledPage>,
    peak_queue: usize,
    sink: S,
}

impl<S: Sink<SampledPage>> PageSampler<S> {
    pub fn new(filter: ArticleFilter, sink: S) -> Self {
        Self {
            filter,
            queue: Vec::new(),
            peak_queue: 0,
            sink,
        }
    }

    /// Largest number of titles ever waiting for a flush.
    pub fn peak_queue(&self) -> usize {
        self.peak_queue
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: Sink<SampledPage>> HistoryHooks for PageSampler<S> {
    const FIELDS: &'static [Tag] = &[];

    fn classify_title(&mut self, title: &str) -> TitleClass {
        self.filter.classify(title)
    }

    fn on_page_complete(&mut self, page: &PageScope) -> Result<()> {
        let title = match page.page_type {
            PageType::Talk => format!("Talk:{}", page.title),
            _ => page.title.clone(),
        };
        self.queue.push(SampledPage { title });
        self.peak_queue = self.peak_queue.max(self.queue.len());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        debug!(titles = self.queue.len(), "Flushing sampled pages");
        for page in self.queue.drain(..) {
            self.sink.append(page)?;
        }
        self.sink.flush()
    }

    fn on_stream_end(&mut self, stats: &RunStats) -> Result<()> {
        self.flush()?;
        info!(
            sampled = stats.processed(),
            seen = stats.seen(),
            "Page sample complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageFilter;
    use crate::siteinfo::Namespaces;
    use crate::sink::MemorySink;

    fn sampler(filter: PageFilter) -> PageSampler<MemorySink<SampledPage>> {
        PageSampler::new(
            ArticleFilter {
                talk_ns: "Discussione".to_string(),
                namespaces: Namespaces::from_pairs([(1, "Discussione"), (2, "Utente")]),
                filter,
            },
            MemorySink::default(),
        )
    }

    fn complete(s: &mut PageSampler<MemorySink<SampledPage>>, full_title: &str) {
        if let TitleClass::Keep { title, page_type } = s.classify_title(full_title) {
            let page = PageScope {
                full_title: full_title.to_string(),
                title,
                page_type,
                ..PageScope::default()
            };
            s.on_page_complete(&page).unwrap();
        }
    }

    #[test]
    fn talk_titles_get_english_prefix() {
        let mut s = sampler(PageFilter::All);
        complete(&mut s, "Roma");
        complete(&mut s, "Discussione:Roma");
        complete(&mut s, "Utente:Pippo");
        s.on_stream_end(&RunStats::new()).unwrap();

        let titles: Vec<_> = s.sink().records.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Roma", "Talk:Roma"]);
    }

    #[test]
    fn queue_is_drained_on_flush() {
        let mut s = sampler(PageFilter::Content);
        complete(&mut s, "A");
        complete(&mut s, "B");
        s.flush().unwrap();
        complete(&mut s, "C");
        s.flush().unwrap();

        assert_eq!(s.peak_queue(), 2);
        assert_eq!(s.sink().records.len(), 3);
        assert_eq!(s.sink().flushes, 2);
    }
}
