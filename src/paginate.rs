use std::collections::HashSet;

use chrono::{Duration, Local, NaiveDate};
use tracing::{debug, info};

use crate::alert::Notify;
use crate::fetch::{fetch_page, Fetch};
use crate::parser::continuation::{self, Token};
use crate::parser::{self, Batch, SourceFormat};

/// When to stop following continuation anchors, besides running out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Booklets at or below this number are already ingested.
    MinBooklet(i64),
    /// Stop after a page whose last record is on or before `cutoff`.
    DaysBack { cutoff: NaiveDate },
}

impl StopPolicy {
    pub fn days_back(days: i64) -> StopPolicy {
        StopPolicy::DaysBack {
            cutoff: Local::now().date_naive() - Duration::days(days),
        }
    }
}

/// Walks a listing page by page. The first request is a plain GET; every
/// following one posts the fields of the previous page's continuation token.
pub struct Paginator<'a, F: Fetch> {
    fetcher: &'a F,
    notifier: &'a dyn Notify,
    url: String,
    format: SourceFormat,
    base_url: String,
    policy: StopPolicy,
    token: Option<Token>,
    requested: HashSet<Token>,
    done: bool,
    pages: usize,
}

impl<'a, F: Fetch> Paginator<'a, F> {
    pub fn new(
        fetcher: &'a F,
        notifier: &'a dyn Notify,
        url: &str,
        format: SourceFormat,
        base_url: &str,
        policy: StopPolicy,
    ) -> Self {
        Paginator {
            fetcher,
            notifier,
            url: url.to_string(),
            format,
            base_url: base_url.to_string(),
            policy,
            token: None,
            requested: HashSet::new(),
            done: false,
            pages: 0,
        }
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// The next page's records, or `None` once the listing is exhausted or
    /// a stop condition was hit.
    pub async fn next_page(&mut self) -> Option<Batch> {
        if self.done {
            return None;
        }
        if let Some(token) = self.token {
            self.requested.insert(token);
        }
        let params = self.token.map(|t| t.params());
        let Some(page) = fetch_page(self.fetcher, self.notifier, &self.url, params.as_deref()).await
        else {
            self.done = true;
            return None;
        };
        self.pages += 1;

        let mut batch = parser::extract(self.format, &page, &self.base_url);
        if batch.is_empty() {
            info!("No records on page {}, stopping", self.pages);
            self.done = true;
            return None;
        }

        self.token = continuation::find(self.format, &page);
        match self.token {
            None => {
                debug!("No continuation anchor on page {}", self.pages);
                self.done = true;
            }
            Some(token) if self.requested.contains(&token) => {
                info!("Page {} links back to {:?}, stopping", self.pages, token);
                self.done = true;
            }
            Some(_) => {}
        }

        match (&mut batch, self.policy) {
            (Batch::Booklets(entries), StopPolicy::MinBooklet(min)) => {
                if let Some(pos) = entries.iter().position(|e| e.booklet <= min) {
                    info!("Reached booklet {} (<= {}), stopping", entries[pos].booklet, min);
                    entries.truncate(pos);
                    self.done = true;
                }
            }
            (Batch::PrivateLaws(records), StopPolicy::DaysBack { cutoff }) => {
                if records.last().is_some_and(|r| r.proposal_date <= cutoff) {
                    info!("Reached records from {} or earlier, stopping", cutoff);
                    self.done = true;
                }
            }
            _ => {}
        }
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::testing::Recorder;
    use crate::fetch::testing::Canned;

    const URL: &str = "http://www.knesset.gov.il/laws/heb/template.asp?Type=4";
    const BASE: &str = "http://www.knesset.gov.il";

    fn booklet_page(booklet: i64, next: Option<(u64, u64)>) -> String {
        let anchor = next
            .map(|(f, s)| format!("<a href=\"javascript:SndSelf({},{});\">הבא</a>", f, s))
            .unwrap_or_default();
        format!(
            "<html><body><table>\n<tr><td><a href=\"/Laws/Data/BillGoverment/{b}/{b}.pdf\">pdf</a></td>\n\
             <td class=\"LawText1\">הצעת חוק {b}</td></tr>\n</table>\n{anchor}\n</body></html>",
            b = booklet
        )
    }

    fn fields(first: u64, start: u64) -> Vec<(String, String)> {
        Token::Booklet { first, start }.params()
    }

    fn booklets(batch: Batch) -> Vec<i64> {
        match batch {
            Batch::Booklets(entries) => entries.iter().map(|e| e.booklet).collect(),
            other => panic!("unexpected batch {:?}", other),
        }
    }

    #[tokio::test]
    async fn stops_at_min_booklet() {
        let fetcher = Canned::default()
            .page(URL, None, &booklet_page(50, Some((1, 21))))
            .page(URL, Some(&fields(1, 21)), &booklet_page(48, Some((1, 41))))
            .page(URL, Some(&fields(1, 41)), &booklet_page(45, Some((1, 61))))
            .page(URL, Some(&fields(1, 61)), &booklet_page(44, None));
        let alerts = Recorder::default();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            URL,
            SourceFormat::GovBooklets,
            BASE,
            StopPolicy::MinBooklet(46),
        );

        let mut seen = Vec::new();
        while let Some(batch) = pages.next_page().await {
            seen.extend(booklets(batch));
        }
        assert_eq!(seen, vec![50, 48]);
        assert_eq!(fetcher.call_count(), 3);
        assert!(alerts.messages().is_empty());
    }

    #[tokio::test]
    async fn page_linking_back_to_itself_is_not_refetched() {
        let fetcher = Canned::default()
            .page(URL, None, &booklet_page(50, Some((1, 21))))
            .page(URL, Some(&fields(1, 21)), &booklet_page(49, Some((1, 21))));
        let alerts = Recorder::default();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            URL,
            SourceFormat::GovBooklets,
            BASE,
            StopPolicy::MinBooklet(0),
        );

        let mut seen = Vec::new();
        while let Some(batch) = pages.next_page().await {
            seen.extend(booklets(batch));
        }
        assert_eq!(seen, vec![50, 49]);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn entries_before_watermark_on_the_same_page_are_kept() {
        let page = "<html><body>\n\
            <a href=\"/L/12/12.pdf\">x</a>\n<td class=\"LawText1\">הצעת חוק א</td>\n\
            <a href=\"/L/11/11.pdf\">x</a>\n<td class=\"LawText1\">הצעת חוק ב</td>\n\
            <a href=\"/L/10/10.pdf\">x</a>\n<td class=\"LawText1\">הצעת חוק ג</td>\n\
            <a href=\"javascript:SndSelf(1,21);\">הבא</a>\n</body></html>";
        let fetcher = Canned::default().page(URL, None, page);
        let alerts = Recorder::default();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            URL,
            SourceFormat::GovBooklets,
            BASE,
            StopPolicy::MinBooklet(11),
        );

        assert_eq!(booklets(pages.next_page().await.unwrap()), vec![12]);
        assert!(pages.next_page().await.is_none());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn last_page_without_anchor_is_still_returned() {
        let fetcher = Canned::default().page(URL, None, &booklet_page(50, None));
        let alerts = Recorder::default();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            URL,
            SourceFormat::GovBooklets,
            BASE,
            StopPolicy::MinBooklet(0),
        );
        assert_eq!(booklets(pages.next_page().await.unwrap()), vec![50]);
        assert!(pages.next_page().await.is_none());
        assert_eq!(pages.pages(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_ends_the_walk() {
        let fetcher = Canned::default().page(URL, None, &booklet_page(50, Some((1, 21))));
        let alerts = Recorder::default();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            URL,
            SourceFormat::GovBooklets,
            BASE,
            StopPolicy::MinBooklet(0),
        );
        assert!(pages.next_page().await.is_some());
        assert!(pages.next_page().await.is_none());
        assert_eq!(alerts.messages(), vec!["failed to open url"]);
    }

    #[tokio::test]
    async fn private_laws_stop_once_past_the_window() {
        let url = "http://www.knesset.gov.il/privatelaw/Plaw_display.asp?lawtp=1";
        let fixture = std::fs::read_to_string("tests/fixtures/private_laws.html").unwrap();
        let fetcher = Canned::default().page(url, None, &fixture);
        let alerts = Recorder::default();
        let cutoff = NaiveDate::from_ymd_opt(2013, 6, 1).unwrap();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            url,
            SourceFormat::PrivateLaws,
            "http://www.knesset.gov.il/privatelaw",
            StopPolicy::DaysBack { cutoff },
        );

        let batch = pages.next_page().await.unwrap();
        assert_eq!(batch.len(), 2);
        // The fixture links to a next page, but its records are already old.
        assert!(pages.next_page().await.is_none());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_page_stops_without_alert() {
        let fetcher = Canned::default().page(
            URL,
            None,
            "<html><body><p>אין תוצאות</p><a href=\"javascript:SndSelf(1,21);\">הבא</a></body></html>",
        );
        let alerts = Recorder::default();
        let mut pages = Paginator::new(
            &fetcher,
            &alerts,
            URL,
            SourceFormat::GovBooklets,
            BASE,
            StopPolicy::MinBooklet(0),
        );
        assert!(pages.next_page().await.is_none());
        assert!(alerts.messages().is_empty());
    }
}
