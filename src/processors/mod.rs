//! Analyses built on [`crate::history::HistoryProcessor`].
//!
//! - [`talk_graph`] -- who writes on whose user talk page
//! - [`coedit`] -- revision authors linked to the page creator
//! - [`demographics`] -- per-page edit and editor counts by gender
//! - [`page_sample`] -- Bernoulli sample of page titles
//! - [`revisions`] -- inserted text of every revision of desired pages

pub mod coedit;
pub mod demographics;
pub mod page_sample;
pub mod revisions;
pub mod talk_graph;
