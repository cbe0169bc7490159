use serde::Serialize;
use std::fmt;

/// Run-wide counters of one streaming pass.
///
/// Every counter is monotonic: nothing in the state machine ever decrements
/// or resets them, whatever the per-page skip decisions are.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pages_seen: u64,
    pages_processed: u64,
    archived_pages: u64,
    deleted_contributors: u64,
    revisions_processed: u64,
    revisions_skipped: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_seen(&mut self) {
        self.pages_seen += 1;
    }

    pub fn inc_processed(&mut self) {
        self.pages_processed += 1;
    }

    pub fn inc_archived(&mut self) {
        self.archived_pages += 1;
    }

    pub fn inc_deleted(&mut self) {
        self.deleted_contributors += 1;
    }

    pub fn inc_revisions(&mut self) {
        self.revisions_processed += 1;
    }

    pub fn inc_skipped_revisions(&mut self) {
        self.revisions_skipped += 1;
    }

    pub fn seen(&self) -> u64 {
        self.pages_seen
    }

    pub fn processed(&self) -> u64 {
        self.pages_processed
    }

    pub fn archived(&self) -> u64 {
        self.archived_pages
    }

    pub fn deleted(&self) -> u64 {
        self.deleted_contributors
    }

    pub fn revisions(&self) -> u64 {
        self.revisions_processed
    }

    pub fn skipped_revisions(&self) -> u64 {
        self.revisions_skipped
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages seen:           {}", self.pages_seen)?;
        writeln!(f, "Pages processed:      {}", self.pages_processed)?;
        writeln!(f, "Archived pages:       {}", self.archived_pages)?;
        writeln!(f, "Deleted contributors: {}", self.deleted_contributors)?;
        writeln!(f, "Revisions processed:  {}", self.revisions_processed)?;
        write!(f, "Revisions skipped:    {}", self.revisions_skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = RunStats::new();
        assert_eq!(stats.seen(), 0);
        assert_eq!(stats.processed(), 0);
        assert_eq!(stats.archived(), 0);
        assert_eq!(stats.deleted(), 0);
        assert_eq!(stats.revisions(), 0);
        assert_eq!(stats.skipped_revisions(), 0);
    }

    #[test]
    fn mixed_operations() {
        let mut stats = RunStats::new();
        stats.inc_seen();
        stats.inc_seen();
        stats.inc_processed();
        stats.inc_deleted();
        stats.inc_revisions();
        stats.inc_revisions();
        stats.inc_skipped_revisions();
        stats.inc_archived();

        assert_eq!(stats.seen(), 2);
        assert_eq!(stats.processed(), 1);
        assert_eq!(stats.deleted(), 1);
        assert_eq!(stats.revisions(), 2);
        assert_eq!(stats.skipped_revisions(), 1);
        assert_eq!(stats.archived(), 1);
    }

    #[test]
    fn summary_lists_every_counter() {
        let mut stats = RunStats::new();
        stats.inc_deleted();
        let summary = stats.to_string();
        assert!(summary.contains("Deleted contributors: 1"));
        assert_eq!(summary.lines().count(), 6);
    }
}
