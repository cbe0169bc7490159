use crate::error::SonetError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static DUMP_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z_\-]+?)wiki-(\d{8})-(.+?)(?:\.xml)?(?:\.(?:bz2|gz|7z))?$").unwrap()
});

/// Language, date and kind encoded in a dump file name such as
/// `itwiki-20100218-stub-meta-history.xml.bz2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpName {
    pub lang: String,
    pub date: String,
    pub kind: String,
}

impl DumpName {
    pub fn parse(path: &str) -> Result<Self, SonetError> {
        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);
        let caps = DUMP_NAME_REGEX
            .captures(file_name)
            .ok_or_else(|| SonetError::UnknownDumpName(file_name.to_string()))?;
        Ok(Self {
            lang: caps[1].to_string(),
            date: caps[2].to_string(),
            kind: caps[3].to_string(),
        })
    }

    /// Rejects dumps whose kind lacks `required` (e.g. `meta-history`).
    pub fn require_kind(&self, required: &str) -> Result<(), SonetError> {
        if self.kind.contains(required) {
            Ok(())
        } else {
            Err(SonetError::WrongDumpKind {
                found: self.kind.clone(),
                required: required.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::META_HISTORY_KIND;

    #[test]
    fn parses_compressed_history_dump() {
        let name = DumpName::parse("/data/itwiki-20100218-stub-meta-history.xml.bz2").unwrap();
        assert_eq!(name.lang, "it");
        assert_eq!(name.date, "20100218");
        assert_eq!(name.kind, "stub-meta-history");
    }

    #[test]
    fn parses_plain_xml_and_underscored_lang() {
        let name = DumpName::parse("zh_yuewiki-20091113-pages-meta-current.xml").unwrap();
        assert_eq!(name.lang, "zh_yue");
        assert_eq!(name.kind, "pages-meta-current");
    }

    #[test]
    fn rejects_unknown_name() {
        assert!(matches!(
            DumpName::parse("dump.xml"),
            Err(SonetError::UnknownDumpName(_))
        ));
    }

    #[test]
    fn require_kind_matches_substring() {
        let history = DumpName::parse("vecwiki-20100307-stub-meta-history.xml.bz2").unwrap();
        assert!(history.require_kind(META_HISTORY_KIND).is_ok());

        let current = DumpName::parse("vecwiki-20100307-pages-current.xml.bz2").unwrap();
        let err = current.require_kind(META_HISTORY_KIND).unwrap_err();
        assert!(err.to_string().contains("required: *-meta-history"));
    }
}
