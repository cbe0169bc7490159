use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    #[default]
    Normal,
    Talk,
    Other,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Normal => "normal",
            PageType::Talk => "talk",
            PageType::Other => "other",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which page types a processor keeps (`--type content|talk|all`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PageFilter {
    Content,
    Talk,
    #[default]
    All,
}

impl PageFilter {
    pub fn accepts(&self, page_type: PageType) -> bool {
        match (self, page_type) {
            (_, PageType::Other) => false,
            (PageFilter::All, _) => true,
            (PageFilter::Content, PageType::Normal) => true,
            (PageFilter::Talk, PageType::Talk) => true,
            _ => false,
        }
    }
}

/// One edit on a user talk page, kept per (sender, receiver) edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub timestamp: Option<NaiveDateTime>,
    pub welcome: bool,
}

/// A finalized row emitted by the revision text extractor
#[derive(Debug, Clone, Serialize)]
pub struct RevisionRecord {
    pub timestamp: String,
    pub lang: String,
    pub title: String,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub user: String,
    pub text: String,
}

/// A page title retained by the page sampler
#[derive(Debug, Clone, Serialize)]
pub struct SampledPage {
    pub title: String,
}

/// Per-page editor demographics: edits and distinct editors split by
/// anonymous/registered and by declared gender
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageDemographics {
    pub title: String,
    pub namespace: String,
    pub redirect: u8,
    pub creation_date: Option<String>,
    pub started_by: Option<String>,
    pub nr_anon_edits: u64,
    pub nr_registered_edits: u64,
    pub nr_total_edits: u64,
    pub nr_female_edits: u64,
    pub nr_male_edits: u64,
    pub nr_anon_editors: u64,
    pub nr_registered_editors: u64,
    pub nr_total_editors: u64,
    pub nr_female_editors: u64,
    pub nr_male_editors: u64,
}

/// Canonical MediaWiki form of a page or user name: trimmed, underscores as
/// spaces, first letter uppercase.
pub fn normalize_pagename(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let trimmed = spaced.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut chars = trimmed.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
    }
    out.extend(chars);
    out
}
