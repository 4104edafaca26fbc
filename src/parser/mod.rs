pub mod continuation;
pub mod lines;
pub mod pdf;
pub mod rows;
pub mod title;

use chrono::NaiveDate;
use scraper::Html;

use crate::fetch::Page;
use title::{DecomposedTitle, TitleError};

/// Listing layouts published by the source site. Each has its own
/// extractor and continuation shape; the command picks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Member-proposed laws: a table, one `tr[valign=Top]` per proposal.
    PrivateLaws,
    /// Government booklets: markup too broken for a DOM walk, scanned by line.
    GovBooklets,
}

/// One row of the private laws listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateLawRecord {
    pub knesset_id: i64,
    pub law_id: i64,
    pub text_link: Option<String>,
    pub full_title: String,
    pub title: DecomposedTitle,
    pub proposal_date: NaiveDate,
    pub proposers: Vec<String>,
    pub joiners: Vec<String>,
}

/// One (title, document) pair from a booklet listing.
#[derive(Debug, Clone, PartialEq)]
pub struct BookletEntry {
    pub booklet: i64,
    pub pdf_url: String,
    pub title: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("row has {0} cells, expected at least 6")]
    MissingCells(usize),
    #[error("bad {field}: {value:?}")]
    BadNumber { field: &'static str, value: String },
    #[error("bad date {value:?}: {source}")]
    BadDate {
        value: String,
        source: chrono::ParseError,
    },
    #[error("no booklet number in {0:?}")]
    NoBooklet(String),
    #[error(transparent)]
    Title(#[from] TitleError),
}

/// Everything extracted from one listing page.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    PrivateLaws(Vec<PrivateLawRecord>),
    Booklets(Vec<BookletEntry>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::PrivateLaws(records) => records.len(),
            Batch::Booklets(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run the extractor for `format` over a fetched page.
pub fn extract(format: SourceFormat, page: &Page, base_url: &str) -> Batch {
    match format {
        SourceFormat::PrivateLaws => Batch::PrivateLaws(rows::extract(&page.html, base_url)),
        SourceFormat::GovBooklets => Batch::Booklets(lines::extract(&page.source, base_url)),
    }
}

/// Relative links on the source site are appended to a fixed base.
pub fn join_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
}

/// Text content of a markup fragment, entities decoded.
pub fn fragment_text(markup: &str) -> String {
    Html::parse_fragment(markup)
        .root_element()
        .text()
        .collect::<String>()
}
