use crate::history::{
    HistoryHooks, NextRevision, PageScope, RevisionScope, TitleClass, TIMESTAMP_FORMAT,
};
use crate::models::{normalize_pagename, PageDemographics, PageType};
use crate::siteinfo::{Namespaces, Tag};
use crate::sink::Sink;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

/// Namespace column value of main-namespace pages.
pub const ARTICLE_NAMESPACE: &str = "article";
/// `started_by` value of a creator missing from the gender table.
pub const MISSING_GENDER: &str = "missing";

/// Username → declared gender, read from the second and third columns of a
/// CSV file. Usernames are normalized like contributors; shorter rows are
/// ignored.
pub fn load_genders(path: &str) -> Result<FxHashMap<String, String>> {
    let file = File::open(path).with_context(|| format!("Failed to open gender data: {}", path))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut genders = FxHashMap::default();
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {}", path))?;
        if let (Some(user), Some(gender)) = (record.get(1), record.get(2)) {
            genders.insert(normalize_pagename(user), gender.to_string());
        }
    }
    info!(users = genders.len(), path, "Gender data loaded");
    Ok(genders)
}

#[derive(Default)]
struct PageTally {
    creation: Option<NaiveDateTime>,
    started_by: Option<String>,
    anon_edits: u64,
    registered_edits: u64,
    female_edits: u64,
    male_edits: u64,
    anon_editors: FxHashSet<String>,
    registered_editors: FxHashSet<String>,
    female_editors: FxHashSet<String>,
    male_editors: FxHashSet<String>,
}

/// One row per page: namespace, redirect flag, creation date, gender of the
/// creator and edit/editor counts by anonymous, registered, female and male
/// contributors. Redirects are kept and flagged.
pub struct DemographicStats<S> {
    namespaces: Namespaces,
    talk_ns: String,
    genders: FxHashMap<String, String>,
    tally: PageTally,
    queue: Vec<PageDemographics>,
    sink: S,
}

impl<S: Sink<PageDemographics>> DemographicStats<S> {
    pub fn new(
        namespaces: Namespaces,
        talk_ns: &str,
        genders: FxHashMap<String, String>,
        sink: S,
    ) -> Self {
        Self {
            namespaces,
            talk_ns: talk_ns.to_string(),
            genders,
            tally: PageTally::default(),
            queue: Vec::new(),
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: Sink<PageDemographics>> HistoryHooks for DemographicStats<S> {
    const FIELDS: &'static [Tag] = &[
        Tag::Revision,
        Tag::Timestamp,
        Tag::Contributor,
        Tag::Username,
        Tag::Ip,
    ];

    const SKIP_REDIRECTS: bool = false;

    fn classify_title(&mut self, title: &str) -> TitleClass {
        match title.split_once(':') {
            Some((prefix, rest)) if self.namespaces.is_namespace(prefix) => TitleClass::Keep {
                title: rest.to_string(),
                page_type: if prefix == self.talk_ns {
                    PageType::Talk
                } else {
                    PageType::Other
                },
            },
            _ => TitleClass::Keep {
                title: title.to_string(),
                page_type: PageType::Normal,
            },
        }
    }

    fn on_page_open(&mut self, _page: &PageScope) -> Result<()> {
        self.tally = PageTally::default();
        Ok(())
    }

    fn on_revision_complete(
        &mut self,
        _page: &PageScope,
        revision: &RevisionScope,
    ) -> Result<NextRevision> {
        let tally = &mut self.tally;
        if let Some(time) = revision.time {
            if tally.creation.map_or(true, |c| time < c) {
                tally.creation = Some(time);
            }
        }

        let Some(sender) = revision.sender.as_deref() else {
            return Ok(NextRevision::Process);
        };
        if revision.anonymous {
            tally.anon_edits += 1;
            tally.anon_editors.insert(sender.to_string());
            return Ok(NextRevision::Process);
        }

        tally.registered_edits += 1;
        tally.registered_editors.insert(sender.to_string());
        let gender = self.genders.get(sender).map(String::as_str);
        match gender {
            Some("female") => {
                tally.female_edits += 1;
                tally.female_editors.insert(sender.to_string());
            }
            Some("male") => {
                tally.male_edits += 1;
                tally.male_editors.insert(sender.to_string());
            }
            _ => {}
        }
        if tally.started_by.is_none() {
            tally.started_by = Some(gender.unwrap_or(MISSING_GENDER).to_string());
        }
        Ok(NextRevision::Process)
    }

    fn on_page_complete(&mut self, page: &PageScope) -> Result<()> {
        let tally = std::mem::take(&mut self.tally);
        let namespace = page
            .full_title
            .strip_suffix(page.title.as_str())
            .and_then(|prefix| prefix.strip_suffix(':'))
            .unwrap_or(ARTICLE_NAMESPACE)
            .to_string();
        let anon_editors = tally.anon_editors.len() as u64;
        let registered_editors = tally.registered_editors.len() as u64;
        self.queue.push(PageDemographics {
            title: page.title.clone(),
            namespace,
            redirect: u8::from(page.redirect),
            creation_date: tally
                .creation
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            started_by: tally.started_by,
            nr_anon_edits: tally.anon_edits,
            nr_registered_edits: tally.registered_edits,
            nr_total_edits: tally.anon_edits + tally.registered_edits,
            nr_female_edits: tally.female_edits,
            nr_male_edits: tally.male_edits,
            nr_anon_editors: anon_editors,
            nr_registered_editors: registered_editors,
            nr_total_editors: anon_editors + registered_editors,
            nr_female_editors: tally.female_editors.len() as u64,
            nr_male_editors: tally.male_editors.len() as u64,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        debug!(pages = self.queue.len(), "Flushing page demographics");
        for row in self.queue.drain(..) {
            self.sink.append(row)?;
        }
        self.sink.flush()
    }
}
