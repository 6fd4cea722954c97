// src/heuristics/mod.rs

mod generic;
mod grid;

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, info_span};

pub use generic::parse_date;
pub use grid::{CellGrid, load_workbook};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read invoice file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported or corrupt spreadsheet: {0}")]
    Workbook(#[from] calamine::Error),
}

/// Invoice fields the extractor knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceField {
    Exporter,
    Consignee,
    InvoiceNo,
    FinalDestination,
    InvoiceDate,
    PortOfLoading,
    Vessel,
}

impl InvoiceField {
    /// Fixed reporting order.
    pub const ALL: [InvoiceField; 7] = [
        InvoiceField::Exporter,
        InvoiceField::Consignee,
        InvoiceField::InvoiceNo,
        InvoiceField::FinalDestination,
        InvoiceField::InvoiceDate,
        InvoiceField::PortOfLoading,
        InvoiceField::Vessel,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            InvoiceField::Exporter => "Exporter",
            InvoiceField::Consignee => "Consignee",
            InvoiceField::InvoiceNo => "Invoice No",
            InvoiceField::FinalDestination => "Final Destination",
            InvoiceField::InvoiceDate => "Invoice Date",
            InvoiceField::PortOfLoading => "Port of Loading",
            InvoiceField::Vessel => "Vessel",
        }
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A named party block: first line is the name, the rest is the address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub address: Option<String>,
}

/// Everything the extractor could infer from one invoice workbook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    pub exporter: Option<Party>,
    pub consignee: Option<Party>,
    pub invoice_no: Option<String>,
    pub final_destination: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub port_of_loading: Option<String>,
    pub vessel: Option<String>,
}

impl ExtractedInvoice {
    /// Display form of a field's value, if it was found.
    pub fn value(&self, field: InvoiceField) -> Option<String> {
        match field {
            InvoiceField::Exporter => self.exporter.as_ref().map(|p| p.name.clone()),
            InvoiceField::Consignee => self.consignee.as_ref().map(|p| p.name.clone()),
            InvoiceField::InvoiceNo => self.invoice_no.clone(),
            InvoiceField::FinalDestination => self.final_destination.clone(),
            InvoiceField::InvoiceDate => self.invoice_date.map(|d| d.to_string()),
            InvoiceField::PortOfLoading => self.port_of_loading.clone(),
            InvoiceField::Vessel => self.vessel.clone(),
        }
    }

    pub fn has(&self, field: InvoiceField) -> bool {
        self.value(field).is_some()
    }

    /// Keep what is already found and take the rest from `other`.
    fn fill_missing(&mut self, other: ExtractedInvoice) {
        self.exporter = self.exporter.take().or(other.exporter);
        self.consignee = self.consignee.take().or(other.consignee);
        self.invoice_no = self.invoice_no.take().or(other.invoice_no);
        self.final_destination = self.final_destination.take().or(other.final_destination);
        self.invoice_date = self.invoice_date.or(other.invoice_date);
        self.port_of_loading = self.port_of_loading.take().or(other.port_of_loading);
        self.vessel = self.vessel.take().or(other.vessel);
    }
}

/// Outcome of scanning an invoice: the values plus which fields were not found.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub extracted: ExtractedInvoice,
    pub found: Vec<InvoiceField>,
    pub missing: Vec<InvoiceField>,
    pub sheets_scanned: usize,
    /// sha256 of the uploaded file, when extraction started from bytes.
    pub source_hash: Option<String>,
}

impl ExtractionReport {
    /// How many fields were located (out of all known ones).
    pub fn coverage(&self) -> (usize, usize) {
        (self.found.len(), InvoiceField::ALL.len())
    }
}

/// Scan sheets in workbook order; for each field the first sheet that yields it wins.
pub fn extract_invoice(grids: &[CellGrid]) -> ExtractionReport {
    let mut extracted = ExtractedInvoice::default();

    for grid in grids.iter().filter(|g| !g.is_empty()) {
        let span = info_span!("sheet", name = %grid.name());
        let _guard = span.enter();

        let found = generic::extract(grid);
        debug!(
            invoice_no = ?found.invoice_no,
            destination = ?found.final_destination,
            exporter = ?found.exporter.as_ref().map(|p| &p.name),
            consignee = ?found.consignee.as_ref().map(|p| &p.name),
            "Sheet scan result"
        );
        extracted.fill_missing(found);
    }

    let (found, missing): (Vec<_>, Vec<_>) = InvoiceField::ALL
        .into_iter()
        .partition(|field| extracted.has(*field));

    ExtractionReport {
        extracted,
        found,
        missing,
        sheets_scanned: grids.len(),
        source_hash: None,
    }
}

/// Extract invoice fields from raw workbook bytes (xlsx, xlsm, xlsb, xls, ods).
pub fn extract_from_bytes(bytes: &[u8]) -> Result<ExtractionReport, ExtractError> {
    let grids = load_workbook(bytes)?;
    let mut report = extract_invoice(&grids);
    report.source_hash = Some(source_hash(bytes));

    let (filled, total) = report.coverage();
    info!(filled, total, sheets = report.sheets_scanned, "Invoice extraction coverage");
    Ok(report)
}

pub fn extract_from_path(path: impl AsRef<Path>) -> Result<ExtractionReport, ExtractError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_from_bytes(&bytes)
}

/// Fingerprint of an uploaded invoice file.
pub fn source_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes(sheets: &[(&str, Vec<(u32, u16, &str)>)]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for (name, cells) in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(*name).unwrap();
            for (row, col, text) in cells.iter() {
                sheet.write_string(*row, *col, *text).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_extract_from_real_workbook() {
        let bytes = workbook_bytes(&[(
            "Invoice",
            vec![
                (2, 1, "Exporter"),
                (3, 1, "Sunrise Agro Exports"),
                (4, 1, "12 Market Road, Pune"),
                (2, 5, "Invoice No"),
                (2, 6, "SAE-0042"),
                (8, 1, "Consignee"),
                (9, 1, "Dutch Produce BV"),
                (8, 5, "Final Destination"),
                (8, 6, "Netherlands"),
            ],
        )]);

        let report = extract_from_bytes(&bytes).unwrap();
        assert_eq!(report.sheets_scanned, 1);
        assert_eq!(report.extracted.invoice_no.as_deref(), Some("SAE-0042"));
        assert_eq!(
            report.extracted.exporter.as_ref().map(|p| p.name.as_str()),
            Some("Sunrise Agro Exports")
        );
        assert_eq!(
            report.extracted.final_destination.as_deref(),
            Some("Netherlands")
        );
        assert_eq!(
            report.missing,
            vec![
                InvoiceField::InvoiceDate,
                InvoiceField::PortOfLoading,
                InvoiceField::Vessel
            ]
        );
        assert_eq!(report.coverage(), (4, 7));
        assert_eq!(report.source_hash, Some(source_hash(&bytes)));
    }

    #[test]
    fn test_first_sheet_wins_per_field() {
        let bytes = workbook_bytes(&[
            ("Invoice", vec![(0, 0, "Invoice No"), (0, 1, "FIRST-1")]),
            (
                "Packing",
                vec![
                    (0, 0, "Invoice No"),
                    (0, 1, "SECOND-2"),
                    (1, 0, "Final Destination"),
                    (1, 1, "Japan"),
                ],
            ),
        ]);

        let report = extract_from_bytes(&bytes).unwrap();
        assert_eq!(report.sheets_scanned, 2);
        assert_eq!(report.extracted.invoice_no.as_deref(), Some("FIRST-1"));
        assert_eq!(report.extracted.final_destination.as_deref(), Some("Japan"));
    }

    #[test]
    fn test_empty_input_reports_every_field_missing() {
        let report = extract_invoice(&[]);
        assert!(report.found.is_empty());
        assert_eq!(report.missing.len(), InvoiceField::ALL.len());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = extract_from_path("/definitely/not/here.xlsx").unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
