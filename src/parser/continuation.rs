use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use super::SourceFormat;
use crate::fetch::Page;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static ONE_ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"javascript:SndSelf\((\d+)\);").unwrap());
static TWO_ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"javascript:SndSelf\((\d+),(\d+)\);").unwrap());

/// Where the next listing page starts, as the page's "next" anchor encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Row(u64),
    Booklet { first: u64, start: u64 },
}

impl Token {
    /// Form fields that request the page this token points at.
    pub fn params(&self) -> Vec<(String, String)> {
        match *self {
            Token::Row(index) => vec![("RowStart".to_string(), index.to_string())],
            Token::Booklet { first, start } => vec![
                ("First".to_string(), first.to_string()),
                ("Start".to_string(), start.to_string()),
            ],
        }
    }
}

/// The first continuation anchor on the page, if any. Anchors the DOM lost
/// to broken markup are looked for in the raw source as well.
pub fn find(format: SourceFormat, page: &Page) -> Option<Token> {
    page.html
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| parse(format, href))
        .or_else(|| parse(format, &page.source))
}

fn parse(format: SourceFormat, text: &str) -> Option<Token> {
    match format {
        SourceFormat::PrivateLaws => {
            let caps = ONE_ARG_RE.captures(text)?;
            Some(Token::Row(caps[1].parse().ok()?))
        }
        SourceFormat::GovBooklets => {
            let caps = TWO_ARG_RE.captures(text)?;
            Some(Token::Booklet {
                first: caps[1].parse().ok()?,
                start: caps[2].parse().ok()?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::parse_markup;

    fn page(html: &str) -> Page {
        parse_markup(html).unwrap()
    }

    #[test]
    fn one_argument_anchor_for_private_laws() {
        let p = page(r#"<html><body><a href="javascript:SndSelf(40);">הבא</a></body></html>"#);
        assert_eq!(find(SourceFormat::PrivateLaws, &p), Some(Token::Row(40)));
        assert_eq!(find(SourceFormat::GovBooklets, &p), None);
    }

    #[test]
    fn two_argument_anchor_for_booklets() {
        let p = page(r#"<html><body><a href="x.asp">x</a><a href="javascript:SndSelf(1,21);">הבא</a></body></html>"#);
        assert_eq!(
            find(SourceFormat::GovBooklets, &p),
            Some(Token::Booklet { first: 1, start: 21 })
        );
    }

    #[test]
    fn missing_anchor_means_last_page() {
        let p = page("<html><body><p>סוף</p></body></html>");
        assert_eq!(find(SourceFormat::PrivateLaws, &p), None);
    }

    #[test]
    fn params_match_site_form_fields() {
        assert_eq!(Token::Row(20).params(), vec![("RowStart".to_string(), "20".to_string())]);
        let fields = Token::Booklet { first: 2, start: 41 }.params();
        assert_eq!(fields[0], ("First".to_string(), "2".to_string()));
        assert_eq!(fields[1], ("Start".to_string(), "41".to_string()));
    }
}
