use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Upper bound on `merged_into` hops before a chain is declared cyclic.
const MAX_MERGE_HOPS: usize = 8;

/// Broken reference data or a violated store invariant. These are fatal
/// for a run; everything else is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("no knesset term covers {0}")]
    NoKnessetForDate(NaiveDate),
    #[error("law {0} is part of a merged_into cycle")]
    MergeCycle(i64),
    #[error("law {0} does not exist")]
    UnknownLaw(i64),
    #[error("cannot merge law {0} into itself")]
    SelfMerge(i64),
}

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS knessets (
            number     INTEGER PRIMARY KEY,
            start_date TEXT NOT NULL,
            end_date   TEXT
        );

        CREATE TABLE IF NOT EXISTS laws (
            id          INTEGER PRIMARY KEY,
            title       TEXT NOT NULL,
            merged_into INTEGER REFERENCES laws(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_laws_title ON laws(title);

        CREATE TABLE IF NOT EXISTS bills (
            id         INTEGER PRIMARY KEY,
            title      TEXT NOT NULL,
            law_id     INTEGER REFERENCES laws(id),
            stage      TEXT NOT NULL,
            stage_date TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_bills_key ON bills(law_id, title, stage, stage_date);

        CREATE TABLE IF NOT EXISTS gov_proposals (
            id             INTEGER PRIMARY KEY,
            booklet_number INTEGER NOT NULL,
            knesset_id     INTEGER NOT NULL REFERENCES knessets(number),
            source_url     TEXT NOT NULL,
            title          TEXT NOT NULL,
            law_id         INTEGER NOT NULL REFERENCES laws(id),
            date           TEXT NOT NULL,
            bill_id        INTEGER UNIQUE REFERENCES bills(id),
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_gov_key
            ON gov_proposals(booklet_number, source_url, title, law_id, date);
        CREATE INDEX IF NOT EXISTS idx_gov_source ON gov_proposals(source_url);

        CREATE TABLE IF NOT EXISTS private_proposals (
            id          INTEGER PRIMARY KEY,
            knesset_id  INTEGER NOT NULL,
            proposal_id INTEGER NOT NULL,
            law_id      INTEGER NOT NULL REFERENCES laws(id),
            title       TEXT NOT NULL,
            date        TEXT NOT NULL,
            source_url  TEXT,
            bill_id     INTEGER UNIQUE REFERENCES bills(id),
            proposers   TEXT NOT NULL DEFAULT '[]',
            joiners     TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(knesset_id, proposal_id)
        );

        CREATE TABLE IF NOT EXISTS links (
            id          INTEGER PRIMARY KEY,
            url         TEXT NOT NULL,
            title       TEXT NOT NULL,
            object_type TEXT NOT NULL,
            object_id   INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_links_url ON links(url);

        CREATE TABLE IF NOT EXISTS linked_files (
            id           INTEGER PRIMARY KEY,
            url          TEXT NOT NULL,
            path         TEXT NOT NULL,
            link_id      INTEGER REFERENCES links(id),
            last_updated TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_linked_files_url ON linked_files(url);
        ",
    )?;
    Ok(())
}

// ── Knesset terms ──

#[derive(Debug, Clone, PartialEq)]
pub struct KnessetRow {
    pub number: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

pub fn upsert_knesset(conn: &Connection, term: &KnessetRow) -> Result<()> {
    conn.execute(
        "INSERT INTO knessets (number, start_date, end_date) VALUES (?1, ?2, ?3)
         ON CONFLICT(number) DO UPDATE SET start_date = excluded.start_date, end_date = excluded.end_date",
        params![term.number, term.start_date, term.end_date],
    )?;
    Ok(())
}

pub fn list_knessets(conn: &Connection) -> Result<Vec<KnessetRow>> {
    let mut stmt = conn.prepare("SELECT number, start_date, end_date FROM knessets ORDER BY number")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(KnessetRow {
                number: row.get(0)?,
                start_date: row.get(1)?,
                end_date: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// First term whose `[start_date, end_date)` span contains `date`.
pub fn knesset_by_date(conn: &Connection, date: NaiveDate) -> Result<i64> {
    let number: Option<i64> = conn
        .query_row(
            "SELECT number FROM knessets
             WHERE start_date <= ?1 AND (end_date IS NULL OR ?1 < end_date)
             ORDER BY number LIMIT 1",
            params![date],
            |r| r.get(0),
        )
        .optional()?;
    number.ok_or_else(|| IntegrityError::NoKnessetForDate(date).into())
}

// ── Laws ──

#[derive(Debug, Clone, PartialEq)]
pub struct LawRow {
    pub id: i64,
    pub title: String,
    pub merged_into: Option<i64>,
}

fn law_from_row(row: &Row) -> rusqlite::Result<LawRow> {
    Ok(LawRow {
        id: row.get(0)?,
        title: row.get(1)?,
        merged_into: row.get(2)?,
    })
}

/// All laws with exactly this title, oldest first.
pub fn laws_by_title(conn: &Connection, title: &str) -> Result<Vec<LawRow>> {
    let mut stmt =
        conn.prepare("SELECT id, title, merged_into FROM laws WHERE title = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map(params![title], law_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_law(conn: &Connection, id: i64) -> Result<Option<LawRow>> {
    let law = conn
        .query_row(
            "SELECT id, title, merged_into FROM laws WHERE id = ?1",
            params![id],
            law_from_row,
        )
        .optional()?;
    Ok(law)
}

pub fn insert_law(conn: &Connection, title: &str) -> Result<LawRow> {
    conn.execute("INSERT INTO laws (title) VALUES (?1)", params![title])?;
    Ok(LawRow {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        merged_into: None,
    })
}

/// Follow `merged_into` to the canonical law. Bounded, so a corrupted
/// chain surfaces as [`IntegrityError::MergeCycle`] instead of looping.
pub fn resolve_law(conn: &Connection, law: LawRow) -> Result<LawRow> {
    let start = law.id;
    let mut current = law;
    for _ in 0..MAX_MERGE_HOPS {
        let Some(next_id) = current.merged_into else {
            return Ok(current);
        };
        current = get_law(conn, next_id)?.ok_or(IntegrityError::UnknownLaw(next_id))?;
    }
    if current.merged_into.is_none() {
        return Ok(current);
    }
    Err(IntegrityError::MergeCycle(start).into())
}

/// Point `from` at `into`. Rejects anything that would close a cycle.
pub fn merge_law(conn: &Connection, from: i64, into: i64) -> Result<()> {
    if from == into {
        return Err(IntegrityError::SelfMerge(from).into());
    }
    get_law(conn, from)?.ok_or(IntegrityError::UnknownLaw(from))?;
    let mut cursor = get_law(conn, into)?.ok_or(IntegrityError::UnknownLaw(into))?;
    for _ in 0..MAX_MERGE_HOPS {
        if cursor.id == from {
            return Err(IntegrityError::MergeCycle(from).into());
        }
        match cursor.merged_into {
            Some(next) => {
                cursor = get_law(conn, next)?.ok_or(IntegrityError::UnknownLaw(next))?;
            }
            None => {
                conn.execute(
                    "UPDATE laws SET merged_into = ?1 WHERE id = ?2",
                    params![into, from],
                )?;
                return Ok(());
            }
        }
    }
    Err(IntegrityError::MergeCycle(into).into())
}

// ── Bills ──

/// Legislative stage, stored as the source site's stage code. Variants are
/// declared in the order a bill moves through them; a failed stage sorts
/// right after the step it failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BillStage {
    Unknown,
    Frozen,
    Proposed,
    PreApproved,
    FailedPreApproval,
    ConvertedToDiscussion,
    InCommittee,
    FirstVote,
    FailedFirstVote,
    CommitteeCorrections,
    Approved,
    FailedApproval,
}

impl BillStage {
    pub fn code(self) -> &'static str {
        match self {
            BillStage::Unknown => "?",
            BillStage::Frozen => "0",
            BillStage::Proposed => "1",
            BillStage::PreApproved => "2",
            BillStage::FailedPreApproval => "-2",
            BillStage::ConvertedToDiscussion => "-2.1",
            BillStage::InCommittee => "3",
            BillStage::FirstVote => "4",
            BillStage::FailedFirstVote => "-4",
            BillStage::CommitteeCorrections => "5",
            BillStage::Approved => "6",
            BillStage::FailedApproval => "-6",
        }
    }

    pub fn from_code(code: &str) -> BillStage {
        match code {
            "0" => BillStage::Frozen,
            "1" => BillStage::Proposed,
            "2" => BillStage::PreApproved,
            "-2" => BillStage::FailedPreApproval,
            "-2.1" => BillStage::ConvertedToDiscussion,
            "3" => BillStage::InCommittee,
            "4" => BillStage::FirstVote,
            "-4" => BillStage::FailedFirstVote,
            "5" => BillStage::CommitteeCorrections,
            "6" => BillStage::Approved,
            "-6" => BillStage::FailedApproval,
            _ => BillStage::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillRow {
    pub id: i64,
    pub title: String,
    pub law_id: Option<i64>,
    pub stage: BillStage,
    pub stage_date: Option<NaiveDate>,
}

fn bill_from_row(row: &Row) -> rusqlite::Result<BillRow> {
    let code: String = row.get(3)?;
    Ok(BillRow {
        id: row.get(0)?,
        title: row.get(1)?,
        law_id: row.get(2)?,
        stage: BillStage::from_code(&code),
        stage_date: row.get(4)?,
    })
}

/// Bills sharing the reconciliation key, ordered by id.
pub fn bills_matching(
    conn: &Connection,
    law_id: i64,
    title: &str,
    stage: BillStage,
    stage_date: NaiveDate,
) -> Result<Vec<BillRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, law_id, stage, stage_date FROM bills
         WHERE law_id = ?1 AND title = ?2 AND stage = ?3 AND stage_date = ?4
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![law_id, title, stage.code(), stage_date], bill_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_bill(conn: &Connection, id: i64) -> Result<Option<BillRow>> {
    let bill = conn
        .query_row(
            "SELECT id, title, law_id, stage, stage_date FROM bills WHERE id = ?1",
            params![id],
            bill_from_row,
        )
        .optional()?;
    Ok(bill)
}

pub fn insert_bill(
    conn: &Connection,
    law_id: i64,
    title: &str,
    stage: BillStage,
    stage_date: NaiveDate,
) -> Result<BillRow> {
    conn.execute(
        "INSERT INTO bills (title, law_id, stage, stage_date) VALUES (?1, ?2, ?3, ?4)",
        params![title, law_id, stage.code(), stage_date],
    )?;
    Ok(BillRow {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        law_id: Some(law_id),
        stage,
        stage_date: Some(stage_date),
    })
}

pub fn update_bill_title_law(conn: &Connection, bill_id: i64, title: &str, law_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE bills SET title = ?1, law_id = ?2 WHERE id = ?3",
        params![title, law_id, bill_id],
    )?;
    Ok(())
}

// ── Government proposals ──

#[derive(Debug, Clone, PartialEq)]
pub struct GovProposalRow {
    pub id: i64,
    pub booklet_number: i64,
    pub knesset_id: i64,
    pub source_url: String,
    pub title: String,
    pub law_id: i64,
    pub date: NaiveDate,
    pub bill_id: Option<i64>,
}

/// Natural identity of a government proposal.
pub struct GovProposalKey<'a> {
    pub booklet_number: i64,
    pub source_url: &'a str,
    pub title: &'a str,
    pub law_id: i64,
    pub date: NaiveDate,
}

const GOV_COLUMNS: &str =
    "id, booklet_number, knesset_id, source_url, title, law_id, date, bill_id";

fn gov_from_row(row: &Row) -> rusqlite::Result<GovProposalRow> {
    Ok(GovProposalRow {
        id: row.get(0)?,
        booklet_number: row.get(1)?,
        knesset_id: row.get(2)?,
        source_url: row.get(3)?,
        title: row.get(4)?,
        law_id: row.get(5)?,
        date: row.get(6)?,
        bill_id: row.get(7)?,
    })
}

/// Insert unless a proposal with the same key exists. The unique index
/// settles races; the row is always re-read. Returns `(row, created)`.
pub fn find_or_create_gov_proposal(
    conn: &Connection,
    key: &GovProposalKey,
    knesset_id: i64,
) -> Result<(GovProposalRow, bool)> {
    let inserted = conn.execute(
        "INSERT INTO gov_proposals (booklet_number, knesset_id, source_url, title, law_id, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(booklet_number, source_url, title, law_id, date) DO NOTHING",
        params![key.booklet_number, knesset_id, key.source_url, key.title, key.law_id, key.date],
    )?;
    let row = find_gov_proposal(conn, key)?
        .with_context(|| format!("Gov proposal for booklet {} vanished after insert", key.booklet_number))?;
    Ok((row, inserted == 1))
}

pub fn find_gov_proposal(conn: &Connection, key: &GovProposalKey) -> Result<Option<GovProposalRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {GOV_COLUMNS} FROM gov_proposals
                 WHERE booklet_number = ?1 AND source_url = ?2 AND title = ?3 AND law_id = ?4 AND date = ?5"
            ),
            params![key.booklet_number, key.source_url, key.title, key.law_id, key.date],
            gov_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn gov_proposals_by_source_url(conn: &Connection, url: &str) -> Result<Vec<GovProposalRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GOV_COLUMNS} FROM gov_proposals WHERE source_url = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map(params![url], gov_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn gov_proposal_for_bill(conn: &Connection, bill_id: i64) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM gov_proposals WHERE bill_id = ?1",
            params![bill_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn set_gov_proposal_bill(conn: &Connection, gp_id: i64, bill_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE gov_proposals SET bill_id = ?1 WHERE id = ?2",
        params![bill_id, gp_id],
    )?;
    Ok(())
}

pub fn update_gov_proposal(conn: &Connection, gp: &GovProposalRow) -> Result<()> {
    conn.execute(
        "UPDATE gov_proposals
         SET booklet_number = ?1, knesset_id = ?2, source_url = ?3, title = ?4, law_id = ?5, date = ?6
         WHERE id = ?7",
        params![gp.booklet_number, gp.knesset_id, gp.source_url, gp.title, gp.law_id, gp.date, gp.id],
    )?;
    Ok(())
}

/// Highest booklet already ingested; the watermark for incremental runs.
pub fn max_booklet(conn: &Connection) -> Result<Option<i64>> {
    let max = conn.query_row("SELECT MAX(booklet_number) FROM gov_proposals", [], |r| r.get(0))?;
    Ok(max)
}

// ── Private proposals ──

#[derive(Debug, Clone, PartialEq)]
pub struct PrivateProposalRow {
    pub id: i64,
    pub knesset_id: i64,
    pub proposal_id: i64,
    pub law_id: i64,
    pub title: String,
    pub date: NaiveDate,
    pub source_url: Option<String>,
    pub bill_id: Option<i64>,
    pub proposers: Vec<String>,
    pub joiners: Vec<String>,
}

/// Insert or refresh by `(knesset_id, proposal_id)`; an existing bill link
/// is kept.
pub fn upsert_private_proposal(conn: &Connection, p: &PrivateProposalRow) -> Result<PrivateProposalRow> {
    let proposers = serde_json::to_string(&p.proposers)?;
    let joiners = serde_json::to_string(&p.joiners)?;
    conn.execute(
        "INSERT INTO private_proposals
         (knesset_id, proposal_id, law_id, title, date, source_url, proposers, joiners)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(knesset_id, proposal_id) DO UPDATE SET
            law_id = excluded.law_id, title = excluded.title, date = excluded.date,
            source_url = COALESCE(excluded.source_url, source_url),
            proposers = excluded.proposers, joiners = excluded.joiners",
        params![p.knesset_id, p.proposal_id, p.law_id, p.title, p.date, p.source_url, proposers, joiners],
    )?;
    let row = conn.query_row(
        "SELECT id, knesset_id, proposal_id, law_id, title, date, source_url, bill_id, proposers, joiners
         FROM private_proposals WHERE knesset_id = ?1 AND proposal_id = ?2",
        params![p.knesset_id, p.proposal_id],
        |row| {
            let proposers: String = row.get(8)?;
            let joiners: String = row.get(9)?;
            Ok(PrivateProposalRow {
                id: row.get(0)?,
                knesset_id: row.get(1)?,
                proposal_id: row.get(2)?,
                law_id: row.get(3)?,
                title: row.get(4)?,
                date: row.get(5)?,
                source_url: row.get(6)?,
                bill_id: row.get(7)?,
                proposers: serde_json::from_str(&proposers).unwrap_or_default(),
                joiners: serde_json::from_str(&joiners).unwrap_or_default(),
            })
        },
    )?;
    Ok(row)
}

pub fn private_proposal_for_bill(conn: &Connection, bill_id: i64) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM private_proposals WHERE bill_id = ?1",
            params![bill_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn set_private_proposal_bill(conn: &Connection, id: i64, bill_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE private_proposals SET bill_id = ?1 WHERE id = ?2",
        params![bill_id, id],
    )?;
    Ok(())
}

// ── Links and cached files ──

pub fn insert_link(
    conn: &Connection,
    url: &str,
    title: &str,
    object_type: &str,
    object_id: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO links (url, title, object_type, object_id) VALUES (?1, ?2, ?3, ?4)",
        params![url, title, object_type, object_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn links_for_object(conn: &Connection, object_type: &str, object_id: i64) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, url FROM links WHERE object_type = ?1 AND object_id = ?2 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![object_type, object_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkedFileRow {
    pub id: i64,
    pub url: String,
    pub path: String,
    pub link_id: Option<i64>,
}

/// Cache entries for a URL, least recently updated first.
pub fn linked_files_by_url(conn: &Connection, url: &str) -> Result<Vec<LinkedFileRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, url, path, link_id FROM linked_files
         WHERE url = ?1 AND path != ''
         ORDER BY last_updated, id",
    )?;
    let rows = stmt
        .query_map(params![url], |row| {
            Ok(LinkedFileRow {
                id: row.get(0)?,
                url: row.get(1)?,
                path: row.get(2)?,
                link_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_linked_file(conn: &Connection, url: &str, path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO linked_files (url, path) VALUES (?1, ?2)",
        params![url, path],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn refresh_linked_file(conn: &Connection, id: i64, path: &str) -> Result<()> {
    conn.execute(
        "UPDATE linked_files SET path = ?1, last_updated = datetime('now') WHERE id = ?2",
        params![path, id],
    )?;
    Ok(())
}

pub fn attach_link(conn: &Connection, file_id: i64, link_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE linked_files SET link_id = ?1 WHERE id = ?2",
        params![link_id, file_id],
    )?;
    Ok(())
}

/// Whether some other URL's cache entry already owns `path`.
pub fn path_owned_by_other(conn: &Connection, path: &str, url: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM linked_files WHERE path = ?1 AND url != ?2",
        params![path, url],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

// ── Stats ──

pub struct Stats {
    pub knessets: usize,
    pub laws: usize,
    pub merged_laws: usize,
    pub bills: usize,
    pub gov_proposals: usize,
    pub private_proposals: usize,
    pub cached_files: usize,
    pub max_booklet: Option<i64>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        knessets: count("SELECT COUNT(*) FROM knessets")?,
        laws: count("SELECT COUNT(*) FROM laws")?,
        merged_laws: count("SELECT COUNT(*) FROM laws WHERE merged_into IS NOT NULL")?,
        bills: count("SELECT COUNT(*) FROM bills")?,
        gov_proposals: count("SELECT COUNT(*) FROM gov_proposals")?,
        private_proposals: count("SELECT COUNT(*) FROM private_proposals")?,
        cached_files: count("SELECT COUNT(*) FROM linked_files")?,
        max_booklet: max_booklet(conn)?,
    })
}

#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    init_schema(&conn).unwrap();
    conn
}
