//! Admin batch jobs: export every request to a workbook, and patch statuses
//! and history comments back from an uploaded copy.  Import never aborts on a
//! bad row; rows that cannot be keyed are skipped.

use crate::blobstore::BlobStore;
use crate::consts::{EXPORT_SHEET_NAME, USERS_COLLECTION};
use crate::error::{AppError, HandlerError};
use crate::spreadsheet::{self, CellKind, ParsedCell};
use crate::store::{quote_segment, DocumentStore, FieldPatch};
use crate::types::{RequestStatus, UserDoc};
use crate::utils::slot_from_recording_url;
use crate::validation::parse_slot;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, warn};

pub const EXPORT_HEADER: [&str; 9] = [
    "Phone",
    "Postal code",
    "Unit",
    "Language",
    "Request date",
    "Recording",
    "Status",
    "Remarks",
    "History comment",
];
const RECORDING_COLUMN: usize = 5;
const STATUS_COLUMN: usize = 6;
const HISTORY_COLUMN: usize = 8;

#[derive(Debug, Clone)]
pub struct ExportRow {
    pub phone: String,
    pub postal_code: String,
    pub unit_number: String,
    pub language: String,
    pub slot: String,
    pub recording_url: Option<String>,
    pub status: RequestStatus,
    pub remarks: String,
    pub history: String,
}

/// Scan all user documents and join their request maps by slot, one row per
/// request, ascending by slot timestamp.
pub async fn export_rows<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
) -> Result<Vec<ExportRow>, AppError> {
    let mut rows = Vec::new();
    for (key, doc) in store.scan(USERS_COLLECTION).await? {
        let Some(user) = UserDoc::from_map(doc) else {
            warn!(key, "skipping user document with unexpected shape");
            continue;
        };
        for (slot, status) in &user.requests {
            let recording_url = match user.recordings.get(slot) {
                Some(object) => blobs.resolve(object).await?,
                None => None,
            };
            rows.push(ExportRow {
                phone: user.phone.clone(),
                postal_code: user.postal_code.clone(),
                unit_number: user.unit_number.clone(),
                language: user.language.clone(),
                slot: slot.clone(),
                recording_url,
                status: *status,
                remarks: user.remarks.get(slot).cloned().unwrap_or_default(),
                history: user.history.get(slot).cloned().unwrap_or_default(),
            });
        }
    }
    rows.sort_by_key(|row| (parse_slot(&row.slot), row.slot.clone(), row.phone.clone()));
    Ok(rows)
}

pub async fn export_workbook<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
) -> Result<String, AppError> {
    let rows = export_rows(store, blobs).await?;
    let cells: Vec<Vec<CellKind>> = rows
        .iter()
        .map(|row| {
            vec![
                CellKind::Text(row.phone.clone()),
                CellKind::Text(row.postal_code.clone()),
                CellKind::Text(row.unit_number.clone()),
                CellKind::Text(row.language.clone()),
                CellKind::Text(row.slot.clone()),
                match &row.recording_url {
                    Some(url) => CellKind::Link {
                        url: url.clone(),
                        label: url.clone(),
                    },
                    None => CellKind::Text(String::new()),
                },
                CellKind::Text(row.status.as_str().to_string()),
                CellKind::Text(row.remarks.clone()),
                CellKind::Text(row.history.clone()),
            ]
        })
        .collect();
    let statuses: Vec<&str> = RequestStatus::ALL.iter().map(|s| s.as_str()).collect();
    Ok(spreadsheet::render_workbook(
        EXPORT_SHEET_NAME,
        &EXPORT_HEADER,
        &cells,
        STATUS_COLUMN,
        &statuses,
    ))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub patched: usize,
    pub skipped: usize,
}

fn cell_text(row: &[ParsedCell], index: usize) -> &str {
    row.get(index).map(|c| c.text.as_str()).unwrap_or_default()
}

/// The recording cell carries the retrieval URL both as hyperlink and label;
/// either one keys the row.
fn row_slot(row: &[ParsedCell]) -> Option<String> {
    let cell = row.get(RECORDING_COLUMN)?;
    let url = cell.href.as_deref().unwrap_or(cell.text.as_str());
    let (_, slot) = slot_from_recording_url(url)?;
    Some(slot)
}

pub async fn import_workbook<S: DocumentStore>(
    store: &S,
    xml_text: &str,
) -> Result<ImportOutcome, HandlerError> {
    let rows = spreadsheet::parse_workbook(xml_text)?;
    let mut outcome = ImportOutcome::default();

    // Header row first, data rows after.
    for (index, row) in rows.iter().enumerate().skip(1) {
        let phone = cell_text(row, 0);
        let Some(slot) = row_slot(row) else {
            debug!(index, "skipping row without a decodable recording name");
            outcome.skipped += 1;
            continue;
        };
        let Some(status) = RequestStatus::parse(cell_text(row, STATUS_COLUMN)) else {
            debug!(index, "skipping row with a status outside the picklist");
            outcome.skipped += 1;
            continue;
        };
        if phone.is_empty() {
            debug!(index, "skipping row without a phone number");
            outcome.skipped += 1;
            continue;
        }

        let mut patches = vec![FieldPatch::Set {
            path: format!("requests.{}", quote_segment(&slot)),
            value: json!(status),
        }];
        let history = cell_text(row, HISTORY_COLUMN);
        if !history.is_empty() {
            patches.push(FieldPatch::Set {
                path: format!("history.{}", quote_segment(&slot)),
                value: json!(history),
            });
        }
        match store.update(USERS_COLLECTION, phone, patches).await {
            Ok(()) => outcome.patched += 1,
            Err(e) => {
                // One bad write never aborts the batch.
                error!(error=%e, phone, slot, "failed to patch request from import row");
                outcome.skipped += 1;
            }
        }
    }
    Ok(outcome)
}
