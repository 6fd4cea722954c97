// src/export/mod.rs

mod pdf;
mod xlsx;

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::record::ShipmentRecord;

pub use pdf::to_pdf;
pub use xlsx::to_xlsx;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Spreadsheet export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("PDF export failed: {0}")]
    Pdf(String),

    #[error("Cannot tell the export format from {0}; pass --format")]
    UnknownFormat(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(ExportFormat::Xlsx),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }
}

/// Heading information printed on exported views.
#[derive(Debug, Clone)]
pub struct ExportMeta {
    pub title: String,
    pub generated_at: DateTime<Utc>,
}

/// Column headings shared by every export format.
pub const COLUMNS: [&str; 12] = [
    "ID",
    "Invoice No",
    "Invoice Date",
    "Exporter",
    "Consignee",
    "Destination",
    "Commodity",
    "Quantity",
    "Status",
    "Certificate No",
    "Application Date",
    "Issue Date",
];

pub(crate) const QUANTITY_COLUMN: usize = 7;

/// Text for each of [`COLUMNS`], in order. Missing values are empty strings.
pub fn row_values(record: &ShipmentRecord) -> [String; 12] {
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
    let quantity = match (record.quantity, record.unit.as_deref()) {
        (Some(q), Some(unit)) => format!("{q} {unit}"),
        (Some(q), None) => q.to_string(),
        (None, _) => String::new(),
    };
    [
        record.id.to_string(),
        record.invoice_no.clone(),
        date(record.invoice_date),
        record.exporter.clone(),
        record.consignee.clone(),
        record.final_destination.clone(),
        record.commodity.clone(),
        quantity,
        record.status.to_string(),
        record.pq_certificate_no.clone().unwrap_or_default(),
        date(record.application_date),
        date(record.issue_date),
    ]
}

pub fn render(
    records: &[ShipmentRecord],
    format: ExportFormat,
    meta: &ExportMeta,
) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Xlsx => Ok(to_xlsx(records, meta)?),
        ExportFormat::Pdf => to_pdf(records, meta),
    }
}

/// Render `records` and write them to `path`. The format falls back to the file extension.
pub fn write_export(
    path: &Path,
    records: &[ShipmentRecord],
    format: Option<ExportFormat>,
    meta: &ExportMeta,
) -> Result<ExportFormat, ExportError> {
    let format = format
        .or_else(|| ExportFormat::from_path(path))
        .ok_or_else(|| ExportError::UnknownFormat(path.display().to_string()))?;

    let bytes = render(records, format, meta)?;
    std::fs::write(path, &bytes).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(
        path = %path.display(),
        ?format,
        records = records.len(),
        bytes = bytes.len(),
        "Export written"
    );
    Ok(format)
}
