// src/record.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::heuristics::{self, ExtractedInvoice, InvoiceField, Party};

/// Where a shipment sits in the phytosanitary certification process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PqStatus {
    #[default]
    Pending,
    Applied,
    Inspected,
    Issued,
    Rejected,
}

impl PqStatus {
    pub const ALL: [PqStatus; 5] = [
        PqStatus::Pending,
        PqStatus::Applied,
        PqStatus::Inspected,
        PqStatus::Issued,
        PqStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PqStatus::Pending => "pending",
            PqStatus::Applied => "applied",
            PqStatus::Inspected => "inspected",
            PqStatus::Issued => "issued",
            PqStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PqStatus {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        PqStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == lowered)
            .ok_or_else(|| FormError::InvalidValue {
                field: "status".to_string(),
                value: s.to_string(),
            })
    }
}

/// One PQ certification record tied to an export shipment.
///
/// Field names double as column names in both the local and the hosted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub id: Uuid,
    pub exporter: String,
    pub exporter_address: Option<String>,
    pub consignee: String,
    pub consignee_address: Option<String>,
    pub invoice_no: String,
    pub invoice_date: Option<NaiveDate>,
    pub final_destination: String,
    pub commodity: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub port_of_loading: Option<String>,
    pub vessel: Option<String>,
    pub container_no: Option<String>,
    pub pq_certificate_no: Option<String>,
    pub status: PqStatus,
    pub application_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    /// sha256 of the invoice spreadsheet that populated this record, if any.
    pub source_invoice: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("quantity must be a finite number greater than zero")]
    NonPositiveQuantity,
    #[error("issue date {issue} precedes application date {applied}")]
    IssueBeforeApplication { applied: NaiveDate, issue: NaiveDate },
    #[error("status is issued but no certificate number is set")]
    MissingCertificate,
    #[error("certificate number is set but status is {0}")]
    CertificateWithoutIssue(PqStatus),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("Unknown form field: {0} (known: {known})", known = FORM_FIELDS.join(", "))]
    UnknownField(String),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
    #[error("Expected field=value, got: {0}")]
    MalformedAssignment(String),
    #[error("Record is invalid: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Form field names accepted by [`RecordDraft::set`].
pub const FORM_FIELDS: &[&str] = &[
    "exporter",
    "exporter_address",
    "consignee",
    "consignee_address",
    "invoice_no",
    "invoice_date",
    "final_destination",
    "commodity",
    "quantity",
    "unit",
    "port_of_loading",
    "vessel",
    "container_no",
    "pq_certificate_no",
    "status",
    "application_date",
    "issue_date",
    "remarks",
];

/// Editable form state for creating or editing a [`ShipmentRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub exporter: Option<String>,
    pub exporter_address: Option<String>,
    pub consignee: Option<String>,
    pub consignee_address: Option<String>,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub final_destination: Option<String>,
    pub commodity: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub port_of_loading: Option<String>,
    pub vessel: Option<String>,
    pub container_no: Option<String>,
    pub pq_certificate_no: Option<String>,
    pub status: PqStatus,
    pub application_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub source_invoice: Option<String>,
}

impl RecordDraft {
    pub fn from_record(record: &ShipmentRecord) -> Self {
        Self {
            exporter: Some(record.exporter.clone()),
            exporter_address: record.exporter_address.clone(),
            consignee: Some(record.consignee.clone()),
            consignee_address: record.consignee_address.clone(),
            invoice_no: Some(record.invoice_no.clone()),
            invoice_date: record.invoice_date,
            final_destination: Some(record.final_destination.clone()),
            commodity: Some(record.commodity.clone()),
            quantity: record.quantity,
            unit: record.unit.clone(),
            port_of_loading: record.port_of_loading.clone(),
            vessel: record.vessel.clone(),
            container_no: record.container_no.clone(),
            pq_certificate_no: record.pq_certificate_no.clone(),
            status: record.status,
            application_date: record.application_date,
            issue_date: record.issue_date,
            remarks: record.remarks.clone(),
            source_invoice: record.source_invoice.clone(),
        }
    }

    /// Parse a `field=value` assignment and apply it.
    pub fn assign(&mut self, assignment: &str) -> Result<(), FormError> {
        let (field, value) = assignment
            .split_once('=')
            .ok_or_else(|| FormError::MalformedAssignment(assignment.to_string()))?;
        self.set(field.trim(), value)
    }

    /// Set a single form field by name. An empty value clears the field.
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        let value = value.trim();
        let text = || (!value.is_empty()).then(|| value.to_string());

        match field {
            "exporter" => self.exporter = text(),
            "exporter_address" => self.exporter_address = text(),
            "consignee" => self.consignee = text(),
            "consignee_address" => self.consignee_address = text(),
            "invoice_no" => self.invoice_no = text(),
            "invoice_date" => self.invoice_date = date_value(field, value)?,
            "final_destination" | "destination" => self.final_destination = text(),
            "commodity" => self.commodity = text(),
            "quantity" => self.quantity = quantity_value(value)?,
            "unit" => self.unit = text(),
            "port_of_loading" => self.port_of_loading = text(),
            "vessel" => self.vessel = text(),
            "container_no" => self.container_no = text(),
            "pq_certificate_no" | "certificate" => self.pq_certificate_no = text(),
            "status" => {
                self.status = if value.is_empty() {
                    PqStatus::default()
                } else {
                    value.parse()?
                }
            }
            "application_date" => self.application_date = date_value(field, value)?,
            "issue_date" => self.issue_date = date_value(field, value)?,
            "remarks" => self.remarks = text(),
            other => return Err(FormError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    /// Copy extracted invoice values into the form.
    ///
    /// Values the user already typed are kept unless `overwrite` is set.
    /// Returns the fields that were actually populated.
    pub fn apply_extraction(
        &mut self,
        extracted: &ExtractedInvoice,
        overwrite: bool,
    ) -> Vec<InvoiceField> {
        let mut applied = Vec::new();

        if let Some(party) = &extracted.exporter {
            if fill_party(
                &mut self.exporter,
                &mut self.exporter_address,
                party,
                overwrite,
            ) {
                applied.push(InvoiceField::Exporter);
            }
        }
        if let Some(party) = &extracted.consignee {
            if fill_party(
                &mut self.consignee,
                &mut self.consignee_address,
                party,
                overwrite,
            ) {
                applied.push(InvoiceField::Consignee);
            }
        }
        if fill(&mut self.invoice_no, &extracted.invoice_no, overwrite) {
            applied.push(InvoiceField::InvoiceNo);
        }
        if fill(
            &mut self.final_destination,
            &extracted.final_destination,
            overwrite,
        ) {
            applied.push(InvoiceField::FinalDestination);
        }
        if fill(&mut self.invoice_date, &extracted.invoice_date, overwrite) {
            applied.push(InvoiceField::InvoiceDate);
        }
        if fill(
            &mut self.port_of_loading,
            &extracted.port_of_loading,
            overwrite,
        ) {
            applied.push(InvoiceField::PortOfLoading);
        }
        if fill(&mut self.vessel, &extracted.vessel, overwrite) {
            applied.push(InvoiceField::Vessel);
        }

        applied
    }

    /// Collect every validation problem at once so the form can show them together.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let required = [
            ("exporter", &self.exporter),
            ("consignee", &self.consignee),
            ("invoice_no", &self.invoice_no),
            ("final_destination", &self.final_destination),
            ("commodity", &self.commodity),
        ];
        for (name, value) in required {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                errors.push(ValidationError::Required(name));
            }
        }

        if self.quantity.is_some_and(|q| !(q.is_finite() && q > 0.0)) {
            errors.push(ValidationError::NonPositiveQuantity);
        }

        if let (Some(applied), Some(issue)) = (self.application_date, self.issue_date) {
            if issue < applied {
                errors.push(ValidationError::IssueBeforeApplication { applied, issue });
            }
        }

        match (self.status, self.pq_certificate_no.is_some()) {
            (PqStatus::Issued, false) => errors.push(ValidationError::MissingCertificate),
            (PqStatus::Issued | PqStatus::Rejected, true) => {}
            (other, true) => errors.push(ValidationError::CertificateWithoutIssue(other)),
            (_, false) => {}
        }

        errors
    }

    /// Validate and turn the form into a brand new record.
    pub fn build(self, now: DateTime<Utc>) -> Result<ShipmentRecord, FormError> {
        self.into_record(Uuid::new_v4(), now, now)
    }

    /// Validate and apply the form on top of an existing record, keeping its identity.
    pub fn merge_into(
        self,
        record: &ShipmentRecord,
        now: DateTime<Utc>,
    ) -> Result<ShipmentRecord, FormError> {
        self.into_record(record.id, record.created_at, now)
    }

    fn into_record(
        self,
        id: Uuid,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ShipmentRecord, FormError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(FormError::Invalid(errors));
        }

        Ok(ShipmentRecord {
            id,
            exporter: self.exporter.unwrap_or_default(),
            exporter_address: self.exporter_address,
            consignee: self.consignee.unwrap_or_default(),
            consignee_address: self.consignee_address,
            invoice_no: self.invoice_no.unwrap_or_default(),
            invoice_date: self.invoice_date,
            final_destination: self.final_destination.unwrap_or_default(),
            commodity: self.commodity.unwrap_or_default(),
            quantity: self.quantity,
            unit: self.unit,
            port_of_loading: self.port_of_loading,
            vessel: self.vessel,
            container_no: self.container_no,
            pq_certificate_no: self.pq_certificate_no,
            status: self.status,
            application_date: self.application_date,
            issue_date: self.issue_date,
            remarks: self.remarks,
            source_invoice: self.source_invoice,
            created_at,
            updated_at: now,
        })
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>, overwrite: bool) -> bool {
    match value {
        Some(v) if overwrite || slot.is_none() => {
            *slot = Some(v.clone());
            true
        }
        _ => false,
    }
}

/// Overwrite replaces name and address together. Otherwise only empty slots are filled.
fn fill_party(
    name: &mut Option<String>,
    address: &mut Option<String>,
    party: &Party,
    overwrite: bool,
) -> bool {
    if overwrite {
        *name = Some(party.name.clone());
        *address = party.address.clone();
        return true;
    }
    if name.is_some() {
        return false;
    }
    *name = Some(party.name.clone());
    if address.is_none() {
        *address = party.address.clone();
    }
    true
}

fn date_value(field: &str, value: &str) -> Result<Option<NaiveDate>, FormError> {
    if value.is_empty() {
        return Ok(None);
    }
    heuristics::parse_date(value)
        .map(Some)
        .ok_or_else(|| FormError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn quantity_value(value: &str) -> Result<Option<f64>, FormError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .replace(',', "")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| FormError::InvalidValue {
            field: "quantity".to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_draft() -> RecordDraft {
        let mut draft = RecordDraft::default();
        for assignment in [
            "exporter=Green Valley Farms",
            "consignee=Fresh Imports GmbH",
            "invoice_no=GV-2025-014",
            "final_destination=Germany",
            "commodity=Fresh mangoes",
            "quantity=1,200",
            "unit=kg",
        ] {
            draft.assign(assignment).unwrap();
        }
        draft
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Issued".parse::<PqStatus>().unwrap(), PqStatus::Issued);
        assert_eq!(" pending ".parse::<PqStatus>().unwrap(), PqStatus::Pending);
        assert!("shipped".parse::<PqStatus>().is_err());
    }

    #[test]
    fn test_set_parses_typed_fields() {
        let draft = complete_draft();
        assert_eq!(draft.quantity, Some(1200.0));

        let mut draft = draft;
        draft.set("invoice_date", "16/02/2026").unwrap();
        assert_eq!(draft.invoice_date, NaiveDate::from_ymd_opt(2026, 2, 16));

        draft.set("invoice_date", "").unwrap();
        assert_eq!(draft.invoice_date, None);

        assert!(matches!(
            draft.set("quantity", "a lot"),
            Err(FormError::InvalidValue { .. })
        ));
        assert!(matches!(
            draft.set("colour", "red"),
            Err(FormError::UnknownField(_))
        ));
        assert!(matches!(
            draft.assign("no equals sign"),
            Err(FormError::MalformedAssignment(_))
        ));
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let errors = RecordDraft::default().validate();
        assert_eq!(
            errors,
            vec![
                ValidationError::Required("exporter"),
                ValidationError::Required("consignee"),
                ValidationError::Required("invoice_no"),
                ValidationError::Required("final_destination"),
                ValidationError::Required("commodity"),
            ]
        );
    }

    #[test]
    fn test_validate_cross_field_rules() {
        let mut draft = complete_draft();
        draft.set("quantity", "0").unwrap();
        draft.set("application_date", "2025-03-10").unwrap();
        draft.set("issue_date", "2025-03-01").unwrap();
        draft.set("status", "issued").unwrap();

        let errors = draft.validate();
        assert!(errors.contains(&ValidationError::NonPositiveQuantity));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::IssueBeforeApplication { .. })));
        assert!(errors.contains(&ValidationError::MissingCertificate));

        let mut draft = complete_draft();
        draft.set("pq_certificate_no", "PQ/0099").unwrap();
        assert_eq!(
            draft.validate(),
            vec![ValidationError::CertificateWithoutIssue(PqStatus::Pending)]
        );
        draft.set("status", "rejected").unwrap();
        assert!(draft.validate().is_empty());
    }

    #[test]
    fn test_build_and_merge_keep_identity() {
        let t0 = Utc::now();
        let record = complete_draft().build(t0).unwrap();
        assert_eq!(record.created_at, t0);
        assert_eq!(record.status, PqStatus::Pending);

        let mut draft = RecordDraft::from_record(&record);
        draft.set("status", "applied").unwrap();
        let t1 = t0 + chrono::Duration::minutes(5);
        let edited = draft.merge_into(&record, t1).unwrap();

        assert_eq!(edited.id, record.id);
        assert_eq!(edited.created_at, t0);
        assert_eq!(edited.updated_at, t1);
        assert_eq!(edited.status, PqStatus::Applied);
        assert_eq!(edited.invoice_no, "GV-2025-014");
    }

    #[test]
    fn test_build_rejects_invalid_draft() {
        let err = RecordDraft::default().build(Utc::now()).unwrap_err();
        match err {
            FormError::Invalid(errors) => assert_eq!(errors.len(), 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_display_honours_width() {
        assert_eq!(format!("{:<9}|", PqStatus::Issued), "issued   |");
    }

    #[test]
    fn test_unknown_field_lists_known_fields() {
        let err = RecordDraft::default().set("colour", "red").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Unknown form field: colour (known: exporter, "));
    }

    #[test]
    fn test_infinite_quantity_is_rejected() {
        let mut draft = complete_draft();
        draft.set("quantity", "inf").unwrap();
        assert_eq!(draft.validate(), vec![ValidationError::NonPositiveQuantity]);
    }

    #[test]
    fn test_overwrite_replaces_party_address_too() {
        let mut draft = complete_draft();
        draft.set("exporter_address", "Old Exporter Street 9").unwrap();
        let extracted = ExtractedInvoice {
            exporter: Some(Party {
                name: "New Exporter Ltd".to_string(),
                address: None,
            }),
            ..Default::default()
        };

        let applied = draft.apply_extraction(&extracted, true);
        assert_eq!(applied, vec![InvoiceField::Exporter]);
        assert_eq!(draft.exporter.as_deref(), Some("New Exporter Ltd"));
        assert_eq!(draft.exporter_address, None);
    }

    #[test]
    fn test_typed_party_address_is_kept() {
        let mut draft = RecordDraft::default();
        draft.set("consignee_address", "Typed Consignee Addr").unwrap();
        let extracted = ExtractedInvoice {
            consignee: Some(Party {
                name: "Invoice Buyer BV".to_string(),
                address: Some("Invoice Addr 1".to_string()),
            }),
            ..Default::default()
        };

        let applied = draft.apply_extraction(&extracted, false);
        assert_eq!(applied, vec![InvoiceField::Consignee]);
        assert_eq!(draft.consignee.as_deref(), Some("Invoice Buyer BV"));
        assert_eq!(
            draft.consignee_address.as_deref(),
            Some("Typed Consignee Addr")
        );
    }

    #[test]
    fn test_apply_extraction_respects_user_input() {
        let extracted = ExtractedInvoice {
            exporter: Some(Party {
                name: "Sunrise Agro Exports".to_string(),
                address: Some("12 Market Road, Pune".to_string()),
            }),
            consignee: None,
            invoice_no: Some("INV-4471".to_string()),
            final_destination: Some("Netherlands".to_string()),
            invoice_date: None,
            port_of_loading: None,
            vessel: None,
        };

        let mut draft = RecordDraft::default();
        draft.set("invoice_no", "MANUAL-1").unwrap();

        let applied = draft.apply_extraction(&extracted, false);
        assert_eq!(
            applied,
            vec![InvoiceField::Exporter, InvoiceField::FinalDestination]
        );
        assert_eq!(draft.invoice_no.as_deref(), Some("MANUAL-1"));
        assert_eq!(draft.exporter.as_deref(), Some("Sunrise Agro Exports"));
        assert_eq!(draft.exporter_address.as_deref(), Some("12 Market Road, Pune"));

        let applied = draft.apply_extraction(&extracted, true);
        assert!(applied.contains(&InvoiceField::InvoiceNo));
        assert_eq!(draft.invoice_no.as_deref(), Some("INV-4471"));
    }
}
