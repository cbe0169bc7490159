//! Dump header resolution: concrete tag names and localized namespaces.
//!
//! The header is read from its own, separate open of the dump, before the
//! real event stream is started, since the tag identifiers are needed to
//! build the handler registry.

use crate::error::SonetError;
use crate::parser::WikiReader;
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::io::BufRead;
use tracing::debug;

/// Logical element names the state machine can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Page,
    Title,
    Ns,
    Revision,
    Timestamp,
    Contributor,
    Username,
    Ip,
    Id,
    Text,
    Comment,
    Redirect,
}

impl Tag {
    pub const ALL: [Tag; 12] = [
        Tag::Page,
        Tag::Title,
        Tag::Ns,
        Tag::Revision,
        Tag::Timestamp,
        Tag::Contributor,
        Tag::Username,
        Tag::Ip,
        Tag::Id,
        Tag::Text,
        Tag::Comment,
        Tag::Redirect,
    ];

    pub fn local_name(&self) -> &'static str {
        match self {
            Tag::Page => "page",
            Tag::Title => "title",
            Tag::Ns => "ns",
            Tag::Revision => "revision",
            Tag::Timestamp => "timestamp",
            Tag::Contributor => "contributor",
            Tag::Username => "username",
            Tag::Ip => "ip",
            Tag::Id => "id",
            Tag::Text => "text",
            Tag::Comment => "comment",
            Tag::Redirect => "redirect",
        }
    }
}

/// Strips the namespace prefix of a qualified element name.
pub fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Logical tag → concrete qualified name used by one document.
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    names: FxHashMap<Tag, String>,
}

impl TagTable {
    /// Builds a table for `tags`, qualifying each with `prefix` (`""` or `"mw"`).
    pub fn new(prefix: &str, tags: &[Tag]) -> Self {
        let names = tags
            .iter()
            .map(|tag| {
                let name = if prefix.is_empty() {
                    tag.local_name().to_string()
                } else {
                    format!("{}:{}", prefix, tag.local_name())
                };
                (*tag, name)
            })
            .collect();
        Self { names }
    }

    /// Unprefixed table covering every [`Tag`].
    pub fn plain() -> Self {
        Self::new("", &Tag::ALL)
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.names.get(&tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Namespace keys with a fixed meaning across every MediaWiki language.
pub const NS_TALK: i32 = 1;
pub const NS_USER: i32 = 2;
pub const NS_USER_TALK: i32 = 3;

/// Localized namespace names, keyed by namespace number.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    by_key: FxHashMap<i32, String>,
}

impl Namespaces {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        Self {
            by_key: pairs.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    pub fn get(&self, key: i32) -> Option<&str> {
        self.by_key.get(&key).map(String::as_str)
    }

    /// Like [`Namespaces::get`], failing when the dump does not define `key`.
    pub fn require(&self, key: i32, label: &str) -> Result<&str, SonetError> {
        self.get(key)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SonetError::MissingNamespace(label.to_string()))
    }

    /// Whether `prefix` names a non-main namespace of this dump.
    pub fn is_namespace(&self, prefix: &str) -> bool {
        self.by_key
            .iter()
            .any(|(key, name)| *key != 0 && name == prefix)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Everything the header tells about a dump.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub root: String,
    pub namespaces: Namespaces,
}

impl SiteInfo {
    pub fn from_path(path: &str) -> Result<Self> {
        let reader = WikiReader::open(path)?;
        Self::read(reader).with_context(|| format!("Failed to read dump header of: {}", path))
    }

    /// Consumes elements up to `</siteinfo>` and drops the reader.
    pub fn read<R: BufRead>(mut reader: WikiReader<R>) -> Result<Self> {
        let mut pairs = Vec::new();

        for elem in reader.by_ref() {
            let elem = elem?;
            match local_name(&elem.name) {
                "namespace" => {
                    let key = elem
                        .attr("key")
                        .and_then(|k| k.parse::<i32>().ok())
                        .ok_or_else(|| SonetError::Malformed {
                            index: 0,
                            reason: "namespace without a numeric key".to_string(),
                        })?;
                    pairs.push((key, elem.text.unwrap_or_default()));
                }
                "siteinfo" => break,
                // No siteinfo block at all: the first page means the header is over.
                "page" => break,
                _ => {}
            }
        }

        let root = reader
            .root_name()
            .map(str::to_string)
            .ok_or_else(|| SonetError::Malformed {
                index: reader.position(),
                reason: "empty document".to_string(),
            })?;
        debug!(root = %root, namespaces = pairs.len(), "Dump header read");

        Ok(Self {
            root,
            namespaces: Namespaces::from_pairs(pairs),
        })
    }

    /// Namespace prefix of the root element (`""` when unprefixed).
    pub fn prefix(&self) -> &str {
        match self.root.rsplit_once(':') {
            Some((prefix, _)) => prefix,
            None => "",
        }
    }

    pub fn tag_table(&self, tags: &[Tag]) -> TagTable {
        TagTable::new(self.prefix(), tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.4/">
  <siteinfo>
    <sitename>Wikipedia</sitename>
    <namespaces>
      <namespace key="-1">Speciale</namespace>
      <namespace key="0" />
      <namespace key="1">Discussione</namespace>
      <namespace key="2">Utente</namespace>
      <namespace key="3">Discussioni utente</namespace>
    </namespaces>
  </siteinfo>
  <page><title>never reached"#;

    fn read(xml: &str) -> SiteInfo {
        SiteInfo::read(WikiReader::from_reader(Cursor::new(xml.as_bytes().to_vec()))).unwrap()
    }

    #[test]
    fn reads_localized_namespaces() {
        let info = read(HEADER);
        assert_eq!(info.namespaces.get(NS_TALK), Some("Discussione"));
        assert_eq!(info.namespaces.get(NS_USER), Some("Utente"));
        assert_eq!(info.namespaces.get(NS_USER_TALK), Some("Discussioni utente"));
        assert_eq!(info.namespaces.get(0), Some(""));
        assert_eq!(info.namespaces.len(), 5);
    }

    #[test]
    fn stops_after_siteinfo() {
        // The truncated page after the header would be a fatal error if read.
        let info = read(HEADER);
        assert_eq!(info.root, "mediawiki");
        assert_eq!(info.prefix(), "");
    }

    #[test]
    fn prefixed_root_qualifies_tags() {
        let info = read("<mw:mediawiki><mw:siteinfo></mw:siteinfo></mw:mediawiki>");
        let table = info.tag_table(&[Tag::Page, Tag::Title]);
        assert_eq!(table.get(Tag::Page), Some("mw:page"));
        assert_eq!(table.get(Tag::Title), Some("mw:title"));
        assert_eq!(table.get(Tag::Text), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn require_missing_namespace_fails() {
        let ns = Namespaces::from_pairs([(NS_TALK, "Talk")]);
        assert_eq!(ns.require(NS_TALK, "Talk").unwrap(), "Talk");
        assert!(matches!(
            ns.require(NS_USER_TALK, "User talk"),
            Err(SonetError::MissingNamespace(_))
        ));
    }

    #[test]
    fn is_namespace_ignores_main() {
        let ns = Namespaces::from_pairs([(0, ""), (1, "Talk"), (6, "File")]);
        assert!(ns.is_namespace("File"));
        assert!(ns.is_namespace("Talk"));
        assert!(!ns.is_namespace(""));
        assert!(!ns.is_namespace("Rust"));
    }

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name("mw:page"), "page");
        assert_eq!(local_name("page"), "page");
    }
}
