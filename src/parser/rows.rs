use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::title::{clean_line, decompose};
use super::{fragment_text, join_url, PrivateLawRecord, RecordError};

static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static FONT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("font").unwrap());
static ANY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());
static FIRST_ARG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'(.*?)','").unwrap());
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Pull every proposal row from a private laws listing. Rows that do not
/// parse are logged and skipped.
pub fn extract(html: &Html, text_base: &str) -> Vec<PrivateLawRecord> {
    let mut records = Vec::new();
    let rows = html.select(&TR).filter(|tr| {
        tr.value()
            .attr("valign")
            .is_some_and(|v| v.eq_ignore_ascii_case("top"))
    });
    for (i, row) in rows.enumerate() {
        match parse_row(row, text_base) {
            Ok(record) => records.push(record),
            Err(e) => warn!(row = i, "Skipping private law row: {}", e),
        }
    }
    debug!("Extracted {} private law rows", records.len());
    records
}

fn parse_row(row: ElementRef, text_base: &str) -> Result<PrivateLawRecord, RecordError> {
    let cells: Vec<ElementRef> = row.select(&TD).collect();
    if cells.len() < 6 {
        return Err(RecordError::MissingCells(cells.len()));
    }

    let knesset_id = parse_number(&cells[0], "knesset id")?;
    let law_id = parse_number(&cells[1], "law id")?;
    let text_link = cells[2]
        .select(&A)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| join_url(text_base, href));
    let full_title = cell_text(&cells[3]);
    let title = decompose(&full_title)?;

    let raw_date = cell_text(&cells[4]);
    let proposal_date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT)
        .map_err(|source| RecordError::BadDate { value: raw_date.clone(), source })?;

    let names = cells[5].select(&FONT).next().unwrap_or(cells[5]);
    let (proposers, joiners) = split_names(names);

    Ok(PrivateLawRecord {
        knesset_id,
        law_id,
        text_link,
        full_title,
        title,
        proposal_date,
        proposers,
        joiners,
    })
}

fn cell_text(cell: &ElementRef) -> String {
    clean_line(&cell.text().collect::<String>())
}

fn parse_number(cell: &ElementRef, field: &'static str) -> Result<i64, RecordError> {
    let value = cell_text(cell);
    value
        .parse()
        .map_err(|_| RecordError::BadNumber { field, value })
}

/// Proposers and joiners. When joiners exist the site renders the proposers
/// as a hover link (marked by `onmouseout`) whose `onmouseover` handler
/// carries the joiners as its first argument.
fn split_names(container: ElementRef) -> (Vec<String>, Vec<String>) {
    let hover = container
        .select(&ANY)
        .find(|el| el.value().attr("onmouseout").is_some());

    match hover {
        Some(el) => {
            let joiners = el
                .value()
                .attr("onmouseover")
                .and_then(|handler| FIRST_ARG_RE.captures(handler))
                .map(|caps| split_br(&caps[1]))
                .unwrap_or_default();
            (text_names(el), joiners)
        }
        None => (text_names(container), Vec::new()),
    }
}

fn text_names(el: ElementRef) -> Vec<String> {
    el.text()
        .map(clean_line)
        .filter(|name| !name.is_empty())
        .collect()
}

fn split_br(markup: &str) -> Vec<String> {
    BR_RE
        .split(markup)
        .map(|piece| clean_line(&fragment_text(piece)))
        .filter(|name| !name.is_empty())
        .collect()
}
