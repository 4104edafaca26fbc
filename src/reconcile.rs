use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::cache::CachedDocument;
use crate::db::{self, BillRow, BillStage, GovProposalKey, GovProposalRow, LawRow, PrivateProposalRow};
use crate::parser::title::DecomposedTitle;
use crate::parser::PrivateLawRecord;

/// Records dated before the 18th Knesset convened are not ingested.
pub static CUTOFF_DATE: LazyLock<NaiveDate> =
    LazyLock::new(|| NaiveDate::from_ymd_opt(2009, 2, 24).unwrap());

pub const GOV_PROPOSAL: &str = "gov_proposal";
pub const PRIVATE_PROPOSAL: &str = "private_proposal";

/// A government booklet entry with its document already read.
#[derive(Debug, Clone)]
pub struct GovRecord {
    pub booklet: i64,
    pub source_url: String,
    pub title: DecomposedTitle,
    pub date: Option<NaiveDate>,
}

/// Fold one government proposal into the store.
///
/// `existing` selects the refresh path: that proposal is updated in place
/// instead of being looked up by its natural key. A cached document that is
/// not linked yet gets a link to the proposal. Returns the proposal's bill,
/// or `None` when the record was skipped.
pub fn reconcile_gov(
    conn: &Connection,
    record: &GovRecord,
    existing: Option<&GovProposalRow>,
    document: Option<&CachedDocument>,
) -> Result<Option<BillRow>> {
    let Some(date) = record.date.filter(|d| *d >= *CUTOFF_DATE) else {
        debug!("Skipping booklet {} dated {:?}", record.booklet, record.date);
        return Ok(None);
    };

    let tx = conn.unchecked_transaction()?;
    let title = record.title.display_title();
    let law = law_for_title(&tx, &record.title.law_name)?;
    let knesset_id = db::knesset_by_date(&tx, date)?;

    let (gp, bill) = match existing {
        Some(current) => {
            let key = GovProposalKey {
                booklet_number: record.booklet,
                source_url: &record.source_url,
                title: &title,
                law_id: law.id,
                date,
            };
            if let Some(other) = db::find_gov_proposal(&tx, &key)?.filter(|o| o.id != current.id) {
                warn!(
                    "Refreshing gov proposal {} would duplicate gov proposal {}, leaving it as is",
                    current.id, other.id
                );
                return Ok(None);
            }
            let gp = GovProposalRow {
                booklet_number: record.booklet,
                knesset_id,
                source_url: record.source_url.clone(),
                title: title.clone(),
                law_id: law.id,
                date,
                ..current.clone()
            };
            db::update_gov_proposal(&tx, &gp)?;
            info!("Refreshed gov proposal {} (booklet {})", gp.id, gp.booklet_number);

            let bill = match gp.bill_id {
                Some(bill_id) => {
                    db::update_bill_title_law(&tx, bill_id, &title, law.id)?;
                    db::get_bill(&tx, bill_id)?
                }
                None => Some(link_gov_bill(&tx, &gp, &title, law.id, date)?),
            };
            (gp, bill)
        }
        None => {
            let key = GovProposalKey {
                booklet_number: record.booklet,
                source_url: &record.source_url,
                title: &title,
                law_id: law.id,
                date,
            };
            let (gp, created) = db::find_or_create_gov_proposal(&tx, &key, knesset_id)?;
            if created {
                info!("Created gov proposal {} (booklet {})", gp.id, gp.booklet_number);
            }
            let bill = link_gov_bill(&tx, &gp, &title, law.id, date)?;
            (gp, Some(bill))
        }
    };

    if let Some(doc) = document.filter(|d| d.link_id.is_none()) {
        let link_id = db::insert_link(&tx, &record.source_url, &record.source_url, GOV_PROPOSAL, gp.id)?;
        db::attach_link(&tx, doc.file_id, link_id)?;
        debug!("Linked {} to gov proposal {}", record.source_url, gp.id);
    }

    tx.commit()?;
    Ok(bill)
}

/// Find or create the proposal's bill and point the proposal at it, unless
/// the bill already belongs to another proposal.
fn link_gov_bill(
    conn: &Connection,
    gp: &GovProposalRow,
    title: &str,
    law_id: i64,
    date: NaiveDate,
) -> Result<BillRow> {
    let bill = bill_for(conn, law_id, title, BillStage::InCommittee, date)?;
    match db::gov_proposal_for_bill(conn, bill.id)? {
        Some(other) if other != gp.id => {
            warn!(
                "Bill {} already has gov proposal {}, leaving {} unlinked",
                bill.id, other, gp.id
            );
        }
        Some(_) => {}
        None => {
            if let Some(previous) = gp.bill_id {
                warn!("Gov proposal {} moves from bill {} to {}", gp.id, previous, bill.id);
            }
            db::set_gov_proposal_bill(conn, gp.id, bill.id)?;
        }
    }
    Ok(bill)
}

/// Fold one member-proposed law into the store.
pub fn reconcile_private(conn: &Connection, record: &PrivateLawRecord) -> Result<Option<BillRow>> {
    let date = record.proposal_date;
    if date < *CUTOFF_DATE {
        debug!("Skipping private law {}/{} dated {}", record.knesset_id, record.law_id, date);
        return Ok(None);
    }

    let tx = conn.unchecked_transaction()?;
    let title = record.title.display_title();
    let law = law_for_title(&tx, &record.title.law_name)?;

    let proposal = db::upsert_private_proposal(
        &tx,
        &PrivateProposalRow {
            id: 0,
            knesset_id: record.knesset_id,
            proposal_id: record.law_id,
            law_id: law.id,
            title: title.clone(),
            date,
            source_url: record.text_link.clone(),
            bill_id: None,
            proposers: record.proposers.clone(),
            joiners: record.joiners.clone(),
        },
    )?;

    let bill = bill_for(&tx, law.id, &title, BillStage::Proposed, date)?;
    match db::private_proposal_for_bill(&tx, bill.id)? {
        Some(other) if other != proposal.id => {
            warn!(
                "Bill {} already has private proposal {}, leaving {} unlinked",
                bill.id, other, proposal.id
            );
        }
        Some(_) => {}
        None => db::set_private_proposal_bill(&tx, proposal.id, bill.id)?,
    }

    if let Some(url) = &record.text_link {
        let linked = db::links_for_object(&tx, PRIVATE_PROPOSAL, proposal.id)?
            .iter()
            .any(|(_, u)| u == url);
        if !linked {
            db::insert_link(&tx, url, &record.full_title, PRIVATE_PROPOSAL, proposal.id)?;
        }
    }

    tx.commit()?;
    Ok(Some(bill))
}

/// Exact-title law lookup. Several matches: the newest that was not merged
/// away, else the newest. The result is resolved through `merged_into`.
fn law_for_title(conn: &Connection, title: &str) -> Result<LawRow> {
    let laws = db::laws_by_title(conn, title)?;
    let picked = match laws.as_slice() {
        [] => {
            let law = db::insert_law(conn, title)?;
            info!("Created law {} {:?}", law.id, title);
            law
        }
        [only] => only.clone(),
        [.., last] => {
            warn!("{} laws titled {:?}", laws.len(), title);
            laws.iter()
                .rev()
                .find(|l| l.merged_into.is_none())
                .unwrap_or(last)
                .clone()
        }
    };
    db::resolve_law(conn, picked)
}

/// Earliest bill with this key, created when there is none.
fn bill_for(
    conn: &Connection,
    law_id: i64,
    title: &str,
    stage: BillStage,
    date: NaiveDate,
) -> Result<BillRow> {
    let mut bills = db::bills_matching(conn, law_id, title, stage, date)?;
    if bills.len() > 1 {
        let ids: Vec<i64> = bills.iter().map(|b| b.id).collect();
        warn!("Duplicate bills {:?} for law {} {:?}, using the first", ids, law_id, title);
    }
    if bills.is_empty() {
        let bill = db::insert_bill(conn, law_id, title, stage, date)?;
        info!("Created bill {} {:?}", bill.id, title);
        return Ok(bill);
    }
    Ok(bills.swap_remove(0))
}
