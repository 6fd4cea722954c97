// src/import.rs

use std::path::Path;

use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::heuristics::{self, ExtractError, ExtractionReport};
use crate::record::{RecordDraft, ShipmentRecord};
use crate::store::{RecordStore, StoreError};

/// Run the extractor on an uploaded invoice and pre-fill the form with what it found.
pub fn import_invoice(
    path: &Path,
    draft: &mut RecordDraft,
    overwrite: bool,
) -> Result<ExtractionReport, ExtractError> {
    let span = info_span!("invoice", path = %path.display());
    let _guard = span.enter();

    let report = heuristics::extract_from_path(path)?;
    let applied = draft.apply_extraction(&report.extracted, overwrite);
    if !applied.is_empty() && report.source_hash.is_some() {
        draft.source_invoice = report.source_hash.clone();
    }

    for field in &report.found {
        info!(
            field = %field,
            value = %report.extracted.value(*field).unwrap_or_default(),
            applied = applied.contains(field),
            "Invoice field"
        );
    }
    for field in &report.missing {
        warn!(field = %field, "Invoice field not found");
    }

    let (filled, total) = report.coverage();
    info!(filled, total, applied = applied.len(), "Invoice applied to form");
    Ok(report)
}

/// Other records already carrying this invoice number. `exclude` skips the record being edited.
pub async fn find_duplicates(
    store: &dyn RecordStore,
    invoice_no: &str,
    exclude: Option<Uuid>,
) -> Result<Vec<ShipmentRecord>, StoreError> {
    let duplicates: Vec<ShipmentRecord> = store
        .find_by_invoice_no(invoice_no)
        .await?
        .into_iter()
        .filter(|r| Some(r.id) != exclude)
        .collect();

    if !duplicates.is_empty() {
        warn!(
            invoice_no,
            count = duplicates.len(),
            "Invoice number already recorded"
        );
    }
    Ok(duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::Utc;
    use rust_xlsxwriter::Workbook;

    fn write_invoice(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let cells = [
            (0, 0, "Shipper"),
            (1, 0, "Sunrise Agro Exports"),
            (0, 3, "Invoice No."),
            (0, 4, "SAE/25/311"),
            (4, 0, "Buyer"),
            (5, 0, "Gulf Fresh Foods LLC"),
            (6, 0, "Jebel Ali, Dubai"),
            (4, 3, "Country of Final Destination"),
            (4, 4, "United Arab Emirates"),
        ];
        for (row, col, text) in cells {
            sheet.write_string(row, col, text).unwrap();
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_import_fills_empty_form_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.xlsx");
        write_invoice(&path);

        let mut draft = RecordDraft::default();
        draft.set("commodity", "Fresh okra").unwrap();
        draft.set("consignee", "Typed By Hand Ltd").unwrap();

        let report = import_invoice(&path, &mut draft, false).unwrap();
        assert_eq!(report.coverage().0, 4);
        assert_eq!(draft.exporter.as_deref(), Some("Sunrise Agro Exports"));
        assert_eq!(draft.consignee.as_deref(), Some("Typed By Hand Ltd"));
        assert_eq!(draft.invoice_no.as_deref(), Some("SAE/25/311"));
        assert_eq!(
            draft.final_destination.as_deref(),
            Some("United Arab Emirates")
        );
        assert!(draft.source_invoice.is_some());
        assert!(draft.validate().is_empty());
    }

    #[test]
    fn test_source_kept_when_nothing_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.xlsx");
        write_invoice(&path);

        let mut draft = RecordDraft::default();
        for assignment in [
            "exporter=Existing Exporter",
            "consignee=Existing Consignee",
            "invoice_no=EX-1",
            "final_destination=Oman",
        ] {
            draft.assign(assignment).unwrap();
        }

        let report = import_invoice(&path, &mut draft, false).unwrap();
        assert_eq!(report.coverage().0, 4);
        assert_eq!(draft.invoice_no.as_deref(), Some("EX-1"));
        assert_eq!(draft.source_invoice, None);
    }

    #[tokio::test]
    async fn test_find_duplicates_skips_edited_record() {
        let store = SqliteStore::in_memory().unwrap();
        let mut draft = RecordDraft::default();
        for assignment in [
            "exporter=Sunrise Agro Exports",
            "consignee=Gulf Fresh Foods LLC",
            "invoice_no=SAE/25/311",
            "final_destination=United Arab Emirates",
            "commodity=Fresh okra",
        ] {
            draft.assign(assignment).unwrap();
        }
        let record = draft.build(Utc::now()).unwrap();
        store.insert(&record).await.unwrap();

        let dups = find_duplicates(&store, "sae/25/311", None).await.unwrap();
        assert_eq!(dups.len(), 1);

        let dups = find_duplicates(&store, "SAE/25/311", Some(record.id)).await.unwrap();
        assert!(dups.is_empty());
    }
}
