use crate::config::REVERT_MIN_WORDS;
use crate::diff::{inserted_text, word_count};
use crate::error::SonetError;
use crate::history::{
    ArticleFilter, HistoryHooks, NextRevision, PageScope, RevisionScope, TitleClass,
};
use crate::models::RevisionRecord;
use crate::siteinfo::Tag;
use crate::sink::Sink;
use anyhow::Result;
use tracing::{debug, warn};

/// Whether `current` looks like the revert of a vandalism blanking: a long
/// text more than doubling the previous one.
pub fn is_revert(current_words: usize, previous_words: usize) -> bool {
    current_words >= REVERT_MIN_WORDS && current_words > 2 * previous_words
}

/// Emits, for every revision of a desired page, the text it added to the
/// previous revision.
pub struct RevisionExtractor<S> {
    lang: String,
    filter: ArticleFilter,
    prev_text: String,
    prev_words: usize,
    queue: Vec<RevisionRecord>,
    reverts: u64,
    sink: S,
}

impl<S: Sink<RevisionRecord>> RevisionExtractor<S> {
    pub fn new(lang: &str, filter: ArticleFilter, sink: S) -> Self {
        Self {
            lang: lang.to_string(),
            filter,
            prev_text: String::new(),
            prev_words: 0,
            queue: Vec::new(),
            reverts: 0,
            sink,
        }
    }

    /// Revisions dropped by the revert heuristic.
    pub fn reverts(&self) -> u64 {
        self.reverts
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: Sink<RevisionRecord>> HistoryHooks for RevisionExtractor<S> {
    const FIELDS: &'static [Tag] = &[
        Tag::Revision,
        Tag::Timestamp,
        Tag::Contributor,
        Tag::Username,
        Tag::Ip,
        Tag::Text,
    ];

    fn classify_title(&mut self, title: &str) -> TitleClass {
        self.filter.classify(title)
    }

    fn on_page_open(&mut self, page: &PageScope) -> Result<()> {
        debug!(title = %page.full_title, "Extracting revisions");
        self.prev_text.clear();
        self.prev_words = 0;
        Ok(())
    }

    fn on_redirect(&mut self, page: &PageScope) -> Result<()> {
        if page.desired {
            return Err(SonetError::DesiredRedirect(page.full_title.clone()).into());
        }
        Ok(())
    }

    fn on_revision_complete(
        &mut self,
        page: &PageScope,
        revision: &RevisionScope,
    ) -> Result<NextRevision> {
        let text = revision.text.as_deref().unwrap_or_default();
        let words = word_count(text);

        if is_revert(words, self.prev_words) {
            warn!(
                title = %page.full_title,
                timestamp = revision.timestamp.as_deref().unwrap_or_default(),
                "Revert detected, skipping"
            );
            self.reverts += 1;
        } else {
            self.queue.push(RevisionRecord {
                timestamp: revision.timestamp.clone().unwrap_or_default(),
                lang: self.lang.clone(),
                title: page.title.clone(),
                page_type: page.page_type,
                user: revision.sender.clone().unwrap_or_default(),
                text: inserted_text(&self.prev_text, text),
            });
        }

        self.prev_text.clear();
        self.prev_text.push_str(text);
        self.prev_words = words;
        Ok(NextRevision::Process)
    }

    fn on_page_complete(&mut self, _page: &PageScope) -> Result<()> {
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        for record in self.queue.drain(..) {
            self.sink.append(record)?;
        }
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageFilter, PageType};
    use crate::siteinfo::Namespaces;
    use crate::sink::MemorySink;

    fn extractor() -> RevisionExtractor<MemorySink<RevisionRecord>> {
        RevisionExtractor::new(
            "it",
            ArticleFilter {
                talk_ns: "Discussione".to_string(),
                namespaces: Namespaces::from_pairs([(1, "Discussione")]),
                filter: PageFilter::All,
            },
            MemorySink::default(),
        )
    }

    fn page() -> PageScope {
        PageScope {
            full_title: "Discussione:Roma".to_string(),
            title: "Roma".to_string(),
            page_type: PageType::Talk,
            desired: true,
            skip: false,
            titled: true,
            redirect: false,
        }
    }

    fn revision(user: &str, text: &str) -> RevisionScope {
        RevisionScope {
            timestamp: Some("2010-01-01T00:00:00Z".to_string()),
            sender: Some(user.to_string()),
            text: Some(text.to_string()),
            ..RevisionScope::default()
        }
    }

    #[test]
    fn emits_inserted_text_per_revision() {
        let mut ex = extractor();
        let page = page();
        ex.on_page_open(&page).unwrap();
        ex.on_revision_complete(&page, &revision("A", "hello")).unwrap();
        ex.on_revision_complete(&page, &revision("B", "hello world")).unwrap();
        assert!(ex.sink().records.is_empty());
        ex.on_page_complete(&page).unwrap();

        let records = &ex.sink().records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "hello");
        assert_eq!(records[1].text, "world");
        assert_eq!(records[1].user, "B");
        assert_eq!(records[1].lang, "it");
        assert_eq!(records[1].page_type, PageType::Talk);
    }

    #[test]
    fn revert_heuristic() {
        assert!(!is_revert(999, 0));
        assert!(is_revert(1000, 0));
        assert!(is_revert(1000, 499));
        assert!(!is_revert(1000, 500));
    }

    #[test]
    fn reverts_are_skipped_but_become_previous_text() {
        let mut ex = extractor();
        let page = page();
        let long = "word ".repeat(1200);
        ex.on_page_open(&page).unwrap();
        ex.on_revision_complete(&page, &revision("A", "short")).unwrap();
        ex.on_revision_complete(&page, &revision("B", &long)).unwrap();
        ex.on_revision_complete(&page, &revision("C", &format!("{}tail", long)))
            .unwrap();
        ex.on_page_complete(&page).unwrap();

        assert_eq!(ex.reverts(), 1);
        let users: Vec<_> = ex.sink().records.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(users, vec!["A", "C"]);
        assert_eq!(ex.sink().records[1].text, "tail");
    }

    #[test]
    fn previous_text_is_per_page() {
        let mut ex = extractor();
        let page = page();
        ex.on_page_open(&page).unwrap();
        ex.on_revision_complete(&page, &revision("A", "one")).unwrap();
        ex.on_page_complete(&page).unwrap();
        ex.on_page_open(&page).unwrap();
        ex.on_revision_complete(&page, &revision("A", "one two")).unwrap();
        ex.on_page_complete(&page).unwrap();
        assert_eq!(ex.sink().records[1].text, "one two");
    }

    #[test]
    fn redirect_on_desired_page_is_fatal() {
        let mut ex = extractor();
        assert!(ex.on_redirect(&page()).is_err());
        let other = PageScope {
            desired: false,
            ..page()
        };
        assert!(ex.on_redirect(&other).is_ok());
    }
}
