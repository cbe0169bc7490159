use crate::edgecache::{EdgeCache, Weight};
use crate::graph::DiGraph;
use crate::history::{
    ArticleFilter, HistoryHooks, NextRevision, PageScope, RevisionScope, TitleClass,
};
use crate::siteinfo::Tag;
use anyhow::Result;
use tracing::info;

pub type CoEditNetwork = DiGraph<Weight<()>>;

/// Co-edit network: the first contributor of a page is its author, every
/// later revision adds one to the edge `editor → author`.
pub struct CoEditGraph {
    filter: ArticleFilter,
    author: Option<String>,
    cache: EdgeCache<()>,
}

impl CoEditGraph {
    pub fn new(filter: ArticleFilter) -> Self {
        Self {
            filter,
            author: None,
            cache: EdgeCache::new(),
        }
    }

    pub fn cache(&self) -> &EdgeCache<()> {
        &self.cache
    }

    pub fn network(mut self) -> Result<CoEditNetwork> {
        self.cache.flush()?;
        let graph = self.cache.into_graph("username", "weight")?;
        info!(
            nodes = graph.vertex_count(),
            edges = graph.edge_count(),
            "Co-edit network built"
        );
        Ok(graph)
    }
}

impl HistoryHooks for CoEditGraph {
    const FIELDS: &'static [Tag] = &[
        Tag::Revision,
        Tag::Timestamp,
        Tag::Contributor,
        Tag::Username,
        Tag::Ip,
    ];

    fn classify_title(&mut self, title: &str) -> TitleClass {
        self.filter.classify(title)
    }

    fn on_page_open(&mut self, _page: &PageScope) -> Result<()> {
        self.author = None;
        Ok(())
    }

    fn on_revision_complete(
        &mut self,
        _page: &PageScope,
        revision: &RevisionScope,
    ) -> Result<NextRevision> {
        let Some(sender) = revision.sender.as_deref() else {
            return Ok(NextRevision::Process);
        };
        match &self.author {
            None => self.author = Some(sender.to_string()),
            Some(author) => {
                self.cache.add(author, [(sender, Weight::Count(1))])?;
            }
        }
        Ok(NextRevision::Process)
    }

    fn on_page_complete(&mut self, _page: &PageScope) -> Result<()> {
        self.author = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageFilter;
    use crate::siteinfo::Namespaces;

    fn coedit() -> CoEditGraph {
        CoEditGraph::new(ArticleFilter {
            talk_ns: "Talk".to_string(),
            namespaces: Namespaces::from_pairs([(1, "Talk"), (2, "User")]),
            filter: PageFilter::All,
        })
    }

    fn by(sender: &str) -> RevisionScope {
        RevisionScope {
            sender: Some(sender.to_string()),
            ..RevisionScope::default()
        }
    }

    #[test]
    fn later_editors_point_to_author() {
        let mut g = coedit();
        let page = PageScope::default();
        g.on_page_open(&page).unwrap();
        for user in ["A", "B", "C", "B"] {
            g.on_revision_complete(&page, &by(user)).unwrap();
        }
        g.on_page_complete(&page).unwrap();

        let net = g.network().unwrap();
        assert_eq!(net.edge_between("B", "A").unwrap().weight.magnitude(), 2);
        assert_eq!(net.edge_between("C", "A").unwrap().weight.magnitude(), 1);
        assert_eq!(net.edge_count(), 2);
    }

    #[test]
    fn author_is_per_page() {
        let mut g = coedit();
        let page = PageScope::default();
        g.on_page_open(&page).unwrap();
        g.on_revision_complete(&page, &by("A")).unwrap();
        g.on_page_complete(&page).unwrap();

        g.on_page_open(&page).unwrap();
        g.on_revision_complete(&page, &by("B")).unwrap();
        g.on_page_complete(&page).unwrap();

        assert_eq!(g.cache().pending_edges(), 0);
    }

    #[test]
    fn author_editing_again_is_a_self_loop() {
        let mut g = coedit();
        let page = PageScope::default();
        g.on_page_open(&page).unwrap();
        g.on_revision_complete(&page, &by("A")).unwrap();
        g.on_revision_complete(&page, &by("A")).unwrap();
        let net = g.network().unwrap();
        assert_eq!(net.self_loops(), 1);
    }

    #[test]
    fn user_pages_are_skipped() {
        let mut g = coedit();
        assert_eq!(g.classify_title("User:A"), TitleClass::Skip);
    }
}
