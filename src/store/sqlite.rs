use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::record::{PqStatus, ShipmentRecord};

const COLUMNS: &str = "id, exporter, exporter_address, consignee, consignee_address, invoice_no, \
     invoice_date, final_destination, commodity, quantity, unit, port_of_loading, vessel, \
     container_no, pq_certificate_no, status, application_date, issue_date, remarks, \
     source_invoice, created_at, updated_at";

/// Local SQLite copy of the PQ record table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pq_records (
                id TEXT PRIMARY KEY,
                exporter TEXT NOT NULL,
                exporter_address TEXT,
                consignee TEXT NOT NULL,
                consignee_address TEXT,
                invoice_no TEXT NOT NULL,
                invoice_date TEXT,
                final_destination TEXT NOT NULL,
                commodity TEXT NOT NULL,
                quantity REAL,
                unit TEXT,
                port_of_loading TEXT,
                vessel TEXT,
                container_no TEXT,
                pq_certificate_no TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                application_date TEXT,
                issue_date TEXT,
                remarks TEXT,
                source_invoice TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pq_records_invoice_no ON pq_records(invoice_no);
            CREATE INDEX IF NOT EXISTS idx_pq_records_status ON pq_records(status);
            CREATE INDEX IF NOT EXISTS idx_pq_records_destination ON pq_records(final_destination);",
        )?;

        info!("Database initialized successfully");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ShipmentRecord>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRecord::from_row)?;
        rows.map(|row| row?.into_record()).collect()
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list(&self) -> Result<Vec<ShipmentRecord>, StoreError> {
        let conn = self.conn.lock().await;
        Self::query(
            &conn,
            &format!("SELECT {COLUMNS} FROM pq_records ORDER BY created_at DESC"),
            [],
        )
    }

    async fn get(&self, id: Uuid) -> Result<Option<ShipmentRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM pq_records WHERE id = ?1"),
                params![id.to_string()],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    async fn insert(&self, record: &ShipmentRecord) -> Result<ShipmentRecord, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO pq_records ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?21, ?22)"
            ),
            params![
                record.id.to_string(),
                record.exporter,
                record.exporter_address,
                record.consignee,
                record.consignee_address,
                record.invoice_no,
                record.invoice_date.map(|d| d.to_string()),
                record.final_destination,
                record.commodity,
                record.quantity,
                record.unit,
                record.port_of_loading,
                record.vessel,
                record.container_no,
                record.pq_certificate_no,
                record.status.as_str(),
                record.application_date.map(|d| d.to_string()),
                record.issue_date.map(|d| d.to_string()),
                record.remarks,
                record.source_invoice,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        info!(id = %record.id, invoice_no = %record.invoice_no, "Record stored");
        Ok(record.clone())
    }

    async fn update(&self, record: &ShipmentRecord) -> Result<ShipmentRecord, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE pq_records SET
                exporter = ?2, exporter_address = ?3, consignee = ?4, consignee_address = ?5,
                invoice_no = ?6, invoice_date = ?7, final_destination = ?8, commodity = ?9,
                quantity = ?10, unit = ?11, port_of_loading = ?12, vessel = ?13,
                container_no = ?14, pq_certificate_no = ?15, status = ?16,
                application_date = ?17, issue_date = ?18, remarks = ?19, source_invoice = ?20,
                updated_at = ?21
             WHERE id = ?1",
            params![
                record.id.to_string(),
                record.exporter,
                record.exporter_address,
                record.consignee,
                record.consignee_address,
                record.invoice_no,
                record.invoice_date.map(|d| d.to_string()),
                record.final_destination,
                record.commodity,
                record.quantity,
                record.unit,
                record.port_of_loading,
                record.vessel,
                record.container_no,
                record.pq_certificate_no,
                record.status.as_str(),
                record.application_date.map(|d| d.to_string()),
                record.issue_date.map(|d| d.to_string()),
                record.remarks,
                record.source_invoice,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        info!(id = %record.id, "Record updated");
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM pq_records WHERE id = ?1",
            params![id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        info!(id = %id, "Record deleted");
        Ok(())
    }

    async fn find_by_invoice_no(
        &self,
        invoice_no: &str,
    ) -> Result<Vec<ShipmentRecord>, StoreError> {
        let conn = self.conn.lock().await;
        Self::query(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM pq_records
                 WHERE invoice_no = ?1 COLLATE NOCASE
                 ORDER BY created_at DESC"
            ),
            params![invoice_no],
        )
    }
}

/// Row as stored: dates, ids and status still in text form.
struct RawRecord {
    id: String,
    exporter: String,
    exporter_address: Option<String>,
    consignee: String,
    consignee_address: Option<String>,
    invoice_no: String,
    invoice_date: Option<String>,
    final_destination: String,
    commodity: String,
    quantity: Option<f64>,
    unit: Option<String>,
    port_of_loading: Option<String>,
    vessel: Option<String>,
    container_no: Option<String>,
    pq_certificate_no: Option<String>,
    status: String,
    application_date: Option<String>,
    issue_date: Option<String>,
    remarks: Option<String>,
    source_invoice: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    /// Map a row with the [`COLUMNS`] projection.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            exporter: row.get(1)?,
            exporter_address: row.get(2)?,
            consignee: row.get(3)?,
            consignee_address: row.get(4)?,
            invoice_no: row.get(5)?,
            invoice_date: row.get(6)?,
            final_destination: row.get(7)?,
            commodity: row.get(8)?,
            quantity: row.get(9)?,
            unit: row.get(10)?,
            port_of_loading: row.get(11)?,
            vessel: row.get(12)?,
            container_no: row.get(13)?,
            pq_certificate_no: row.get(14)?,
            status: row.get(15)?,
            application_date: row.get(16)?,
            issue_date: row.get(17)?,
            remarks: row.get(18)?,
            source_invoice: row.get(19)?,
            created_at: row.get(20)?,
            updated_at: row.get(21)?,
        })
    }

    fn into_record(self) -> Result<ShipmentRecord, StoreError> {
        Ok(ShipmentRecord {
            id: Uuid::parse_str(&self.id).map_err(|_| corrupt("id", &self.id))?,
            exporter: self.exporter,
            exporter_address: self.exporter_address,
            consignee: self.consignee,
            consignee_address: self.consignee_address,
            invoice_no: self.invoice_no,
            invoice_date: parse_day("invoice_date", self.invoice_date)?,
            final_destination: self.final_destination,
            commodity: self.commodity,
            quantity: self.quantity,
            unit: self.unit,
            port_of_loading: self.port_of_loading,
            vessel: self.vessel,
            container_no: self.container_no,
            pq_certificate_no: self.pq_certificate_no,
            status: self
                .status
                .parse::<PqStatus>()
                .map_err(|_| corrupt("status", &self.status))?,
            application_date: parse_day("application_date", self.application_date)?,
            issue_date: parse_day("issue_date", self.issue_date)?,
            remarks: self.remarks,
            source_invoice: self.source_invoice,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn corrupt(field: &'static str, value: &str) -> StoreError {
    StoreError::Corrupt {
        field,
        value: value.to_string(),
    }
}

fn parse_day(field: &'static str, value: Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    value
        .map(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|_| corrupt(field, &v)))
        .transpose()
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| corrupt(field, value))
}
