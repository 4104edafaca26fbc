use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::title::clean_line;
use super::{fragment_text, join_url, BookletEntry, RecordError};

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="(.*?)""#).unwrap());
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"LawText1">(.*?)</"#).unwrap());
static TITLE_CR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"LawText1">(.*?)\r"#).unwrap());
static BOOKLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+)/").unwrap());

const TITLE_MARKER: &str = "LawText1\">";

/// Scan a booklet listing line by line. The page always puts the document
/// link on one line and its title on a later one carrying the `LawText1`
/// class; nothing else about its markup can be relied on.
pub fn extract(source: &str, pdf_base: &str) -> Vec<BookletEntry> {
    let mut entries = Vec::new();
    for (title, href) in scan_pairs(source) {
        match entry(&title, &href, pdf_base) {
            Ok(e) => entries.push(e),
            Err(e) => warn!(href = %href, "Skipping booklet entry: {}", e),
        }
    }
    debug!("Extracted {} booklet entries", entries.len());
    entries
}

/// (title, href) pairs in page order.
pub fn scan_pairs(source: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current_href: Option<String> = None;

    for line in source.split('\n') {
        if line.contains(".pdf") {
            match HREF_RE.captures(line) {
                Some(caps) => current_href = Some(caps[1].to_string()),
                None => debug!("pdf mention without href: {}", line.trim()),
            }
        }
        if !line.contains(TITLE_MARKER) {
            continue;
        }
        let raw_title = TITLE_RE
            .captures(line)
            .or_else(|| TITLE_CR_RE.captures(line))
            .map(|caps| caps[1].to_string())
            .or_else(|| {
                line.split_once(TITLE_MARKER)
                    .map(|(_, rest)| rest.to_string())
            })
            .unwrap_or_default();
        let title = clean_line(&fragment_text(&raw_title));

        match &current_href {
            Some(href) => pairs.push((title, href.clone())),
            None => warn!("Title before any document link: {}", title),
        }
    }
    pairs
}

fn entry(title: &str, href: &str, pdf_base: &str) -> Result<BookletEntry, RecordError> {
    let booklet = BOOKLET_RE
        .captures(href)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .ok_or_else(|| RecordError::NoBooklet(href.to_string()))?;
    Ok(BookletEntry {
        booklet,
        pdf_url: join_url(pdf_base, href),
        title: title.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://www.knesset.gov.il";

    #[test]
    fn fixture_pairs_titles_with_preceding_links() {
        let source = std::fs::read_to_string("tests/fixtures/gov_booklets.html").unwrap();
        let entries = extract(&source, BASE);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].booklet, 760);
        assert_eq!(
            entries[0].pdf_url,
            "http://www.knesset.gov.il/Laws/Data/BillGoverment/760/760.pdf"
        );
        assert_eq!(entries[0].title, "הצעת חוק המשכבון (תיקון), התשע\"ג");
        assert_eq!(entries[2].booklet, 758);
    }

    #[test]
    fn title_ending_in_carriage_return_uses_fallback() {
        let source = "<a href=\"/x/5/5.pdf\">pdf</a>\n<td class=\"LawText1\">הצעת חוק א (תיקון)\r\n";
        let pairs = scan_pairs(source);
        assert_eq!(pairs, vec![("הצעת חוק א (תיקון)".to_string(), "/x/5/5.pdf".to_string())]);
    }

    #[test]
    fn unterminated_title_takes_rest_of_line() {
        let source = "<a href=\"/x/5/5.pdf\">\n<td class=\"LawText1\">הצעת חוק ב";
        let pairs = scan_pairs(source);
        assert_eq!(pairs[0].0, "הצעת חוק ב");
    }

    #[test]
    fn title_before_any_link_is_dropped() {
        let source = "<td class=\"LawText1\">יתום</td>\n<a href=\"/x/5/5.pdf\">\n";
        assert!(scan_pairs(source).is_empty());
    }

    #[test]
    fn link_without_booklet_segment_is_skipped() {
        let source = "<a href=\"loose.pdf\">\n<td class=\"LawText1\">הצעת חוק ג</td>\n";
        assert!(extract(source, BASE).is_empty());
    }

    #[test]
    fn page_without_pairs_is_empty() {
        assert!(extract("<html><body>nothing here</body></html>", BASE).is_empty());
    }
}
