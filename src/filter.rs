use std::cmp::Ordering;

use chrono::NaiveDate;
use tracing::debug;

use crate::record::{PqStatus, ShipmentRecord};

/// Predicates applied to the record list. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<PqStatus>,
    /// Exact destination, compared case-insensitively.
    pub destination: Option<String>,
    /// Substring of the exporter name, compared case-insensitively.
    pub exporter: Option<String>,
    /// Inclusive lower bound on the invoice date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the invoice date.
    pub to: Option<NaiveDate>,
    /// Free text; every whitespace-separated term must appear in some field.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    InvoiceDate,
    #[default]
    Created,
    Updated,
    Exporter,
    Consignee,
    Destination,
    InvoiceNo,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl RecordFilter {
    pub fn matches(&self, record: &ShipmentRecord) -> bool {
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if let Some(dest) = &self.destination {
            if record.final_destination.trim().to_lowercase() != dest.trim().to_lowercase() {
                return false;
            }
        }
        if let Some(exporter) = &self.exporter {
            if !contains_ignore_case(&record.exporter, exporter) {
                return false;
            }
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(date) = record.invoice_date else {
                return false;
            };
            if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let haystack = searchable_text(record);
            if !search
                .split_whitespace()
                .all(|term| haystack.contains(&term.to_lowercase()))
            {
                return false;
            }
        }
        true
    }
}

/// Filter, then stable-sort. Records missing the sort value go last in either order.
pub fn apply(
    records: Vec<ShipmentRecord>,
    filter: &RecordFilter,
    key: SortKey,
    order: SortOrder,
) -> Vec<ShipmentRecord> {
    let total = records.len();
    let mut kept: Vec<ShipmentRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    kept.sort_by(|a, b| compare(a, b, key, order));
    debug!(total, kept = kept.len(), ?key, ?order, "Filtered records");
    kept
}

fn compare(a: &ShipmentRecord, b: &ShipmentRecord, key: SortKey, order: SortOrder) -> Ordering {
    match key {
        SortKey::InvoiceDate => compare_optional(a.invoice_date, b.invoice_date, order),
        SortKey::Created => directed(a.created_at.cmp(&b.created_at), order),
        SortKey::Updated => directed(a.updated_at.cmp(&b.updated_at), order),
        SortKey::Exporter => compare_text(&a.exporter, &b.exporter, order),
        SortKey::Consignee => compare_text(&a.consignee, &b.consignee, order),
        SortKey::Destination => compare_text(&a.final_destination, &b.final_destination, order),
        SortKey::InvoiceNo => compare_text(&a.invoice_no, &b.invoice_no, order),
        SortKey::Status => directed(a.status.cmp(&b.status), order),
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn compare_optional<T: Ord>(a: Option<T>, b: Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(&b), order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Text columns compare case-insensitively; blank values count as missing.
fn compare_text(a: &str, b: &str, order: SortOrder) -> Ordering {
    let key = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_lowercase())
    };
    compare_optional(key(a), key(b), order)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

fn searchable_text(record: &ShipmentRecord) -> String {
    [
        Some(record.exporter.as_str()),
        record.exporter_address.as_deref(),
        Some(record.consignee.as_str()),
        record.consignee_address.as_deref(),
        Some(record.invoice_no.as_str()),
        Some(record.final_destination.as_str()),
        Some(record.commodity.as_str()),
        record.port_of_loading.as_deref(),
        record.vessel.as_deref(),
        record.container_no.as_deref(),
        record.pq_certificate_no.as_deref(),
        Some(record.status.as_str()),
        record.remarks.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("\n")
    .to_lowercase()
}
