// src/store/mod.rs

mod remote;
mod sqlite;

pub use remote::RemoteStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::{Backend, StoreConfig};
use crate::record::ShipmentRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote table returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Stored value for {field} is corrupt: {value}")]
    Corrupt { field: &'static str, value: String },

    #[error("Store is misconfigured: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The table of PQ records, wherever it lives.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records, newest first.
    async fn list(&self) -> Result<Vec<ShipmentRecord>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ShipmentRecord>, StoreError>;

    async fn insert(&self, record: &ShipmentRecord) -> Result<ShipmentRecord, StoreError>;

    /// Replace an existing record. Fails with [`StoreError::NotFound`] for unknown ids.
    async fn update(&self, record: &ShipmentRecord) -> Result<ShipmentRecord, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn find_by_invoice_no(
        &self,
        invoice_no: &str,
    ) -> Result<Vec<ShipmentRecord>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.invoice_no.eq_ignore_ascii_case(invoice_no))
            .collect())
    }
}

/// Open the store selected in the config.
pub fn open(cfg: &StoreConfig) -> Result<Box<dyn RecordStore>, StoreError> {
    match cfg.backend {
        Backend::Sqlite => {
            info!(db_path = %cfg.db_path, "Using local SQLite store");
            Ok(Box::new(SqliteStore::new(&cfg.db_path)?))
        }
        Backend::Remote => {
            let store = RemoteStore::from_config(cfg)?;
            info!(url = %store.table_url(), "Using remote table store");
            Ok(Box::new(store))
        }
    }
}
