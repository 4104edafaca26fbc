use std::sync::LazyLock;

use regex::Regex;

/// "Proposal of", prefixed to every bill title on the source site.
pub const PROPOSAL_PREFIX: &str = "הצעת ";
/// Display title used when a bill has neither correction nor comment.
pub const NEW_LAW_TITLE: &str = "חוק חדש";

const DASHES: &[char] = &['–', '—', '־', '‐', '‑', '‒'];

static CORRECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(תיקון) ?- ?(.*)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecomposedTitle {
    pub law_name: String,
    pub comment: Option<String>,
    pub correction: Option<String>,
    pub year: Option<String>,
}

impl DecomposedTitle {
    /// Correction followed by comment; the placeholder when that is empty.
    pub fn display_title(&self) -> String {
        let mut title = String::new();
        if let Some(correction) = &self.correction {
            title.push_str(correction);
        }
        if let Some(comment) = &self.comment {
            title.push(' ');
            title.push_str(comment);
        }
        let title = title.trim();
        if title.chars().count() <= 1 {
            NEW_LAW_TITLE.to_string()
        } else {
            title.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TitleError {
    #[error("unbalanced or nested parentheses in {0:?}")]
    Unbalanced(String),
    #[error("{groups} parenthetical groups in {title:?}, at most two are supported")]
    TooManyGroups { title: String, groups: usize },
    #[error("no law name in {0:?}")]
    EmptyName(String),
}

/// Trim whitespace and drop line breaks and non-breaking spaces.
pub fn clean_line(s: &str) -> String {
    s.replace(['\n', '\r'], "")
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// Unify dash characters and space `תיקון-x` as `תיקון - x`.
pub fn normalize_correction_dashes(correction: &str) -> String {
    let unified: String = correction
        .chars()
        .map(|c| if DASHES.contains(&c) { '-' } else { c })
        .collect();
    match CORRECTION_RE.captures(&unified) {
        Some(caps) => format!("{} - {}", &caps[1], caps[2].trim()),
        None => unified,
    }
}

/// Split `הצעת <law> (<comment>) (<correction>), <year>`.
///
/// Only the trailing one or two parenthetical groups are meaningful: with
/// two, the earlier is the comment and the later the correction; with one,
/// it is the correction. Three or more groups are rejected rather than
/// guessed at.
pub fn decompose(raw: &str) -> Result<DecomposedTitle, TitleError> {
    let cleaned = clean_line(raw);
    let title = cleaned
        .strip_prefix(PROPOSAL_PREFIX)
        .unwrap_or(&cleaned)
        .trim_start();

    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut open: Option<usize> = None;
    for (i, c) in title.char_indices() {
        match c {
            '(' if open.is_none() => open = Some(i),
            ')' => match open.take() {
                Some(start) => groups.push((start, i)),
                None => return Err(TitleError::Unbalanced(cleaned.clone())),
            },
            '(' => return Err(TitleError::Unbalanced(cleaned.clone())),
            _ => {}
        }
    }
    if open.is_some() {
        return Err(TitleError::Unbalanced(cleaned.clone()));
    }
    if groups.len() > 2 {
        return Err(TitleError::TooManyGroups {
            title: cleaned.clone(),
            groups: groups.len(),
        });
    }

    // A comma after the last group introduces the year.
    let tail_start = groups.last().map(|&(_, close)| close + 1).unwrap_or(0);
    let (body_end, year) = match title[tail_start..].rfind(',') {
        Some(pos) => {
            let comma = tail_start + pos;
            let year = clean_line(&title[comma + 1..]);
            (comma, (!year.is_empty()).then_some(year))
        }
        None => (title.len(), None),
    };

    let name_end = groups.first().map(|&(start, _)| start).unwrap_or(body_end);
    let law_name = title[..name_end].trim().trim_end_matches(',').trim().to_string();
    if law_name.is_empty() {
        return Err(TitleError::EmptyName(cleaned.clone()));
    }

    let inner = |&(start, end): &(usize, usize)| -> Option<String> {
        let text = clean_line(&title[start + 1..end]);
        (!text.is_empty()).then_some(text)
    };
    let (comment, correction) = match groups.as_slice() {
        [] => (None, None),
        [only] => (None, inner(only)),
        [first, second] => (inner(first), inner(second)),
        _ => unreachable!("more than two groups rejected above"),
    };

    Ok(DecomposedTitle {
        law_name,
        comment,
        correction: correction.map(|c| normalize_correction_dashes(&c)),
        year,
    })
}
