use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::title::clean_line;

static HEBREW_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{1,2})\s+ב?(ינואר|פברואר|מרס|מרץ|אפריל|מאי|יוני|יולי|אוגוסט|ספטמבר|אוקטובר|נובמבר|דצמבר)\s+(\d{4})",
    )
    .unwrap()
});
static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[./](\d{1,2})[./](\d{4})\b").unwrap());

const TITLE_MARKER: &str = "הצעת חוק";

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("text extraction failed: {0}")]
    Extract(String),
    #[error("no publication date in document")]
    NoDate,
}

/// What the pipeline needs out of a booklet document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDocument {
    pub title: Option<String>,
    pub date: NaiveDate,
}

/// Read title and date from raw PDF bytes.
pub fn read_proposal(bytes: &[u8]) -> Result<ProposalDocument, PdfError> {
    // The extractor panics on some malformed inputs.
    let text = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| PdfError::Extract("extractor panicked".to_string()))?
        .map_err(|e| PdfError::Extract(e.to_string()))?;
    from_text(&text)
}

/// Title and date from the document's extracted text.
pub fn from_text(text: &str) -> Result<ProposalDocument, PdfError> {
    let title = text
        .lines()
        .map(clean_line)
        .find(|line| line.contains(TITLE_MARKER));
    let date = hebrew_date(text)
        .or_else(|| numeric_date(text))
        .ok_or(PdfError::NoDate)?;
    Ok(ProposalDocument { title, date })
}

fn hebrew_date(text: &str) -> Option<NaiveDate> {
    HEBREW_DATE_RE.captures_iter(text).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

fn numeric_date(text: &str) -> Option<NaiveDate> {
    NUMERIC_DATE_RE.captures_iter(text).find_map(|caps| {
        NaiveDate::from_ymd_opt(caps[3].parse().ok()?, caps[2].parse().ok()?, caps[1].parse().ok()?)
    })
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "ינואר" => 1,
        "פברואר" => 2,
        "מרס" | "מרץ" => 3,
        "אפריל" => 4,
        "מאי" => 5,
        "יוני" => 6,
        "יולי" => 7,
        "אוגוסט" => 8,
        "ספטמבר" => 9,
        "אוקטובר" => 10,
        "נובמבר" => 11,
        "דצמבר" => 12,
        _ => return None,
    };
    Some(n)
}
