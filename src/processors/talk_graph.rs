use crate::config::DEFAULT_USER_TALK_NAME;
use crate::edgecache::{EdgeCache, Weight};
use crate::error::SonetError;
use crate::graph::DiGraph;
use crate::history::{HistoryHooks, NextRevision, PageScope, RevisionScope, TitleClass};
use crate::models::{normalize_pagename, Message, PageType};
use crate::siteinfo::{Namespaces, Tag, NS_USER_TALK};
use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use tracing::info;

pub type TalkNetwork = DiGraph<Weight<Message>>;

#[derive(Debug, Clone)]
pub struct TalkGraphConfig {
    /// Title prefixes denoting user talk pages, localized first.
    pub user_talk_names: Vec<String>,
    /// Case-insensitive pattern marking welcome messages in edit comments.
    pub welcome_pattern: Option<String>,
}

impl TalkGraphConfig {
    /// Localized user-talk name from the dump header, plus the English one.
    pub fn from_namespaces(namespaces: &Namespaces) -> Result<Self, SonetError> {
        let localized = namespaces.require(NS_USER_TALK, DEFAULT_USER_TALK_NAME)?;
        let mut user_talk_names = vec![localized.to_string()];
        if localized != DEFAULT_USER_TALK_NAME {
            user_talk_names.push(DEFAULT_USER_TALK_NAME.to_string());
        }
        Ok(Self {
            user_talk_names,
            welcome_pattern: None,
        })
    }
}

/// Welcome patterns for the languages we know about.
pub fn default_welcome_pattern(lang: &str) -> Option<&'static str> {
    match lang {
        "it" | "vec" => Some("Benvenut"),
        "en" | "simple" => Some("Welcome"),
        _ => None,
    }
}

/// Edits on `User talk:X` become edges `sender → X`, each carrying the
/// ordered list of messages.
pub struct TalkGraph {
    user_talk_names: Vec<String>,
    welcome: Option<Regex>,
    cache: EdgeCache<Message>,
}

impl TalkGraph {
    pub fn new(config: TalkGraphConfig) -> Result<Self> {
        let welcome = config
            .welcome_pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid welcome pattern: {}", p))
            })
            .transpose()?;
        Ok(Self {
            user_talk_names: config.user_talk_names,
            welcome,
            cache: EdgeCache::new(),
        })
    }

    pub fn cache(&self) -> &EdgeCache<Message> {
        &self.cache
    }

    /// Flushes the cache and builds the network; edges carry their messages
    /// under the `timestamp` label.
    pub fn network(mut self) -> Result<TalkNetwork> {
        self.cache.flush()?;
        let graph = self.cache.into_graph("username", "timestamp")?;
        info!(
            nodes = graph.vertex_count(),
            edges = graph.edge_count(),
            "Talk network built"
        );
        Ok(graph)
    }
}

impl HistoryHooks for TalkGraph {
    const FIELDS: &'static [Tag] = &[
        Tag::Revision,
        Tag::Timestamp,
        Tag::Contributor,
        Tag::Username,
        Tag::Ip,
        Tag::Comment,
    ];

    fn classify_title(&mut self, title: &str) -> TitleClass {
        let Some((prefix, rest)) = title.split_once(':') else {
            return TitleClass::Skip;
        };
        if !self.user_talk_names.iter().any(|n| n == prefix) {
            return TitleClass::Skip;
        }
        if rest.contains('/') {
            return TitleClass::Archive;
        }
        TitleClass::Keep {
            title: normalize_pagename(rest),
            page_type: PageType::Talk,
        }
    }

    fn on_revision_complete(
        &mut self,
        page: &PageScope,
        revision: &RevisionScope,
    ) -> Result<NextRevision> {
        let Some(sender) = revision.sender.as_deref() else {
            return Ok(NextRevision::Process);
        };
        let welcome = match (&self.welcome, revision.comment.as_deref()) {
            (Some(re), Some(comment)) => re.is_match(comment),
            _ => false,
        };
        let message = Message {
            timestamp: revision.time,
            welcome,
        };
        self.cache
            .add(&page.title, [(sender, Weight::event(message))])?;
        Ok(NextRevision::Process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> TalkGraph {
        TalkGraph::new(TalkGraphConfig {
            user_talk_names: vec!["Discussioni utente".to_string(), "User talk".to_string()],
            welcome_pattern: Some("benvenut".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn classifies_user_talk_titles() {
        let mut g = graph();
        assert_eq!(
            g.classify_title("Discussioni utente:mario_rossi"),
            TitleClass::Keep {
                title: "Mario rossi".to_string(),
                page_type: PageType::Talk
            }
        );
        assert!(matches!(
            g.classify_title("User talk:Bob"),
            TitleClass::Keep { .. }
        ));
        assert_eq!(
            g.classify_title("Discussioni utente:Bob/Archivio 1"),
            TitleClass::Archive
        );
        assert_eq!(g.classify_title("Roma"), TitleClass::Skip);
        assert_eq!(g.classify_title("Utente:Bob"), TitleClass::Skip);
    }

    #[test]
    fn welcome_comment_is_flagged() {
        let mut g = graph();
        let page = PageScope {
            title: "Bob".to_string(),
            ..PageScope::default()
        };
        let revision = RevisionScope {
            sender: Some("Alice".to_string()),
            comment: Some("BENVENUTO!".to_string()),
            ..RevisionScope::default()
        };
        g.on_revision_complete(&page, &revision).unwrap();
        let net = g.network().unwrap();
        let edge = net.edge_between("Alice", "Bob").unwrap();
        assert!(edge.weight.events()[0].welcome);
    }

    #[test]
    fn config_from_namespaces() {
        let ns = Namespaces::from_pairs([(NS_USER_TALK, "Discussioni utente")]);
        let cfg = TalkGraphConfig::from_namespaces(&ns).unwrap();
        assert_eq!(cfg.user_talk_names, vec!["Discussioni utente", "User talk"]);

        let en = Namespaces::from_pairs([(NS_USER_TALK, "User talk")]);
        let cfg = TalkGraphConfig::from_namespaces(&en).unwrap();
        assert_eq!(cfg.user_talk_names, vec!["User talk"]);

        assert!(TalkGraphConfig::from_namespaces(&Namespaces::default()).is_err());
    }

    #[test]
    fn invalid_welcome_pattern_is_rejected() {
        let result = TalkGraph::new(TalkGraphConfig {
            user_talk_names: vec![],
            welcome_pattern: Some("(".to_string()),
        });
        assert!(result.is_err());
    }
}
