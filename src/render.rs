// src/render.rs
//
// Read-only text views for the terminal.

use std::fmt::Write;

use crate::heuristics::ExtractionReport;
use crate::record::ShipmentRecord;

/// Labelled multi-line view of a single record.
pub fn record_detail(record: &ShipmentRecord) -> String {
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string());
    let quantity = record.quantity.map(|q| match &record.unit {
        Some(unit) => format!("{q} {unit}"),
        None => q.to_string(),
    });

    let rows: [(&str, Option<String>); 21] = [
        ("ID", Some(record.id.to_string())),
        ("Status", Some(record.status.to_string())),
        ("Invoice No", Some(record.invoice_no.clone())),
        ("Invoice Date", date(record.invoice_date)),
        ("Exporter", Some(record.exporter.clone())),
        ("Exporter Address", record.exporter_address.clone()),
        ("Consignee", Some(record.consignee.clone())),
        ("Consignee Address", record.consignee_address.clone()),
        ("Final Destination", Some(record.final_destination.clone())),
        ("Commodity", Some(record.commodity.clone())),
        ("Quantity", quantity),
        ("Port of Loading", record.port_of_loading.clone()),
        ("Vessel", record.vessel.clone()),
        ("Container No", record.container_no.clone()),
        ("Certificate No", record.pq_certificate_no.clone()),
        ("Application Date", date(record.application_date)),
        ("Issue Date", date(record.issue_date)),
        ("Remarks", record.remarks.clone()),
        ("Source Invoice", record.source_invoice.clone()),
        ("Created", Some(record.created_at.format("%Y-%m-%d %H:%M").to_string())),
        ("Updated", Some(record.updated_at.format("%Y-%m-%d %H:%M").to_string())),
    ];

    let mut out = String::new();
    for (label, value) in rows {
        let _ = writeln!(out, "{label:<18} {}", value.as_deref().unwrap_or("-"));
    }
    out
}

/// Fixed-width list view, one line per record.
pub fn record_table(records: &[ShipmentRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8}  {:<16}  {:<10}  {:<24}  {:<24}  {:<16}  {:<9}",
        "ID", "INVOICE NO", "DATE", "EXPORTER", "CONSIGNEE", "DESTINATION", "STATUS"
    );
    for r in records {
        let _ = writeln!(
            out,
            "{:<8}  {:<16}  {:<10}  {:<24}  {:<24}  {:<16}  {:<9}",
            clip(&r.id.to_string(), 8),
            clip(&r.invoice_no, 16),
            r.invoice_date.map(|d| d.to_string()).unwrap_or_default(),
            clip(&r.exporter, 24),
            clip(&r.consignee, 24),
            clip(&r.final_destination, 16),
            r.status,
        );
    }
    let _ = writeln!(out, "{} record(s)", records.len());
    out
}

/// What the extractor found, and what it did not.
pub fn extraction_summary(report: &ExtractionReport) -> String {
    let (filled, total) = report.coverage();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Extracted {filled}/{total} fields from {} sheet(s)",
        report.sheets_scanned
    );
    for field in &report.found {
        let value = report.extracted.value(*field).unwrap_or_default();
        let _ = writeln!(out, "  {:<18} {value}", field.label());
    }
    if !report.missing.is_empty() {
        let missing: Vec<&str> = report.missing.iter().map(|f| f.label()).collect();
        let _ = writeln!(out, "Not found: {}", missing.join(", "));
    }
    out
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}
