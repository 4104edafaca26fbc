use anyhow::Result;
use indicatif::ProgressBar;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::alert::Notify;
use crate::cache::ContentCache;
use crate::config::Settings;
use crate::db::{self, GovProposalRow};
use crate::fetch::Fetch;
use crate::paginate::{Paginator, StopPolicy};
use crate::parser::pdf::{self, PdfError, ProposalDocument};
use crate::parser::title::decompose;
use crate::parser::{Batch, BookletEntry, SourceFormat};
use crate::reconcile::{self, GovRecord};

/// Turns a downloaded booklet document into its title and date.
pub type ReadDocument = fn(&[u8]) -> Result<ProposalDocument, PdfError>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub records: usize,
    pub skipped: usize,
    pub bills: usize,
}

impl RunSummary {
    pub fn print(&self) {
        println!(
            "{} pages, {} records: {} reconciled into bills, {} skipped.",
            self.pages, self.records, self.bills, self.skipped,
        );
    }
}

/// Fetch, extract, decompose and reconcile, one page at a time.
pub struct Pipeline<'a, F: Fetch> {
    conn: &'a Connection,
    fetcher: &'a F,
    notifier: &'a dyn Notify,
    settings: &'a Settings,
    cache: ContentCache,
    read_document: ReadDocument,
    progress: ProgressBar,
}

impl<'a, F: Fetch> Pipeline<'a, F> {
    pub fn new(
        conn: &'a Connection,
        fetcher: &'a F,
        notifier: &'a dyn Notify,
        settings: &'a Settings,
    ) -> Self {
        Pipeline {
            conn,
            fetcher,
            notifier,
            settings,
            cache: ContentCache::new(&settings.cache_dir),
            read_document: pdf::read_proposal,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[cfg(test)]
    fn with_reader(mut self, read_document: ReadDocument) -> Self {
        self.read_document = read_document;
        self
    }

    /// Ingest member-proposed laws from the last `days_back` days.
    pub async fn run_private(&self, days_back: i64) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut pages = Paginator::new(
            self.fetcher,
            self.notifier,
            &self.settings.private_laws_url,
            SourceFormat::PrivateLaws,
            &self.settings.private_law_text_base,
            StopPolicy::days_back(days_back),
        );

        while let Some(batch) = pages.next_page().await {
            let Batch::PrivateLaws(records) = batch else {
                continue;
            };
            for record in &records {
                summary.records += 1;
                match reconcile::reconcile_private(self.conn, record)? {
                    Some(_) => summary.bills += 1,
                    None => summary.skipped += 1,
                }
                self.tick(&summary);
            }
        }
        summary.pages = pages.pages();
        self.progress.finish_and_clear();
        Ok(summary)
    }

    /// Ingest government booklets newer than `min_booklet`.
    pub async fn run_gov(&self, min_booklet: i64) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut pages = Paginator::new(
            self.fetcher,
            self.notifier,
            &self.settings.gov_laws_url,
            SourceFormat::GovBooklets,
            &self.settings.pdf_base,
            StopPolicy::MinBooklet(min_booklet),
        );

        while let Some(batch) = pages.next_page().await {
            let Batch::Booklets(entries) = batch else {
                continue;
            };
            for entry in &entries {
                summary.records += 1;
                if self.ingest_booklet(entry, None).await? {
                    summary.bills += 1;
                } else {
                    summary.skipped += 1;
                }
                self.tick(&summary);
            }
        }
        summary.pages = pages.pages();
        self.progress.finish_and_clear();
        Ok(summary)
    }

    /// Re-ingest a single booklet document. Without a booklet number the
    /// proposal already stored for the URL supplies it and is updated in
    /// place; with one, the entry goes through the normal path.
    pub async fn refresh_gov(
        &self,
        pdf_url: &str,
        booklet: Option<i64>,
        title: Option<&str>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let existing = match booklet {
            Some(_) => None,
            None => {
                let mut found = db::gov_proposals_by_source_url(self.conn, pdf_url)?;
                if found.len() > 1 {
                    warn!("{} gov proposals for {}, refreshing the first", found.len(), pdf_url);
                }
                if found.is_empty() {
                    error!("No booklet number given and no gov proposal stored for {}", pdf_url);
                    return Ok(summary);
                }
                Some(found.swap_remove(0))
            }
        };

        let entry = BookletEntry {
            booklet: booklet
                .or(existing.as_ref().map(|gp| gp.booklet_number))
                .unwrap_or_default(),
            pdf_url: pdf_url.to_string(),
            title: title.unwrap_or_default().to_string(),
        };
        summary.records = 1;
        if self.ingest_booklet(&entry, existing.as_ref()).await? {
            summary.bills = 1;
        } else {
            summary.skipped = 1;
        }
        Ok(summary)
    }

    /// Download, read and reconcile one booklet entry. Returns whether it
    /// ended up attached to a bill.
    async fn ingest_booklet(
        &self,
        entry: &BookletEntry,
        existing: Option<&GovProposalRow>,
    ) -> Result<bool> {
        let document = match self.cache.get_or_fetch(self.conn, self.fetcher, &entry.pdf_url).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping booklet {}: {:#}", entry.booklet, e);
                return Ok(false);
            }
        };
        let parsed = match (self.read_document)(&document.bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping booklet {} ({}): {}", entry.booklet, entry.pdf_url, e);
                return Ok(false);
            }
        };

        let raw_title = match (entry.title.is_empty(), &parsed.title) {
            (false, _) => entry.title.as_str(),
            (true, Some(from_document)) => from_document.as_str(),
            (true, None) => {
                warn!("No title for booklet {} ({})", entry.booklet, entry.pdf_url);
                return Ok(false);
            }
        };
        let title = match decompose(raw_title) {
            Ok(title) => title,
            Err(e) => {
                warn!("Skipping booklet {}: {}", entry.booklet, e);
                return Ok(false);
            }
        };

        let record = GovRecord {
            booklet: entry.booklet,
            source_url: entry.pdf_url.clone(),
            title,
            date: Some(parsed.date),
        };
        let bill = reconcile::reconcile_gov(self.conn, &record, existing, Some(&document))?;
        if let Some(bill) = &bill {
            info!("Booklet {} -> bill {}", entry.booklet, bill.id);
        }
        Ok(bill.is_some())
    }

    fn tick(&self, summary: &RunSummary) {
        self.progress.inc(1);
        self.progress
            .set_message(format!("{} bills, {} skipped", summary.bills, summary.skipped));
    }
}
