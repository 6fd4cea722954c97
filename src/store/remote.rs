use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{info, warn};
use urlencoding::encode;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::config::StoreConfig;
use crate::record::ShipmentRecord;

/// Thin client for a hosted PostgREST-style table.
///
/// Every call is a single HTTP request. Rows are exchanged as JSON objects
/// whose keys match the [`ShipmentRecord`] field names.
pub struct RemoteStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: String,
}

impl RemoteStore {
    pub fn new(base_url: &str, table: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Build from config; the API key is read from the configured env var.
    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let url = cfg
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Config("store.url is required for the remote backend".into()))?;
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            StoreError::Config(format!(
                "{} env var required for the remote backend",
                cfg.api_key_env
            ))
        })?;
        Ok(Self::new(url, &cfg.table, &api_key))
    }

    pub fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn filtered_url(&self, column: &str, value: &str) -> String {
        format!("{}?{}=eq.{}", self.table_url(), column, encode(value))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
    }

    /// Turn a non-2xx answer into [`StoreError::Remote`] with the body attached.
    async fn check(resp: Response) -> Result<Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Remote table request failed");
        Err(StoreError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<ShipmentRecord>, StoreError> {
        let resp = self.request(Method::GET, url).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    async fn list(&self) -> Result<Vec<ShipmentRecord>, StoreError> {
        let url = format!("{}?select=*&order=created_at.desc", self.table_url());
        let records = self.fetch(&url).await?;
        info!(count = records.len(), "Fetched records from remote table");
        Ok(records)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ShipmentRecord>, StoreError> {
        let url = self.filtered_url("id", &id.to_string());
        Ok(self.fetch(&url).await?.into_iter().next())
    }

    async fn insert(&self, record: &ShipmentRecord) -> Result<ShipmentRecord, StoreError> {
        let resp = self
            .request(Method::POST, &self.table_url())
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let rows: Vec<ShipmentRecord> = Self::check(resp).await?.json().await?;
        let stored = rows.into_iter().next().ok_or_else(|| StoreError::Remote {
            status,
            body: "insert returned no representation".to_string(),
        })?;
        info!(id = %stored.id, invoice_no = %stored.invoice_no, "Record stored remotely");
        Ok(stored)
    }

    async fn update(&self, record: &ShipmentRecord) -> Result<ShipmentRecord, StoreError> {
        let url = self.filtered_url("id", &record.id.to_string());
        let resp = self
            .request(Method::PATCH, &url)
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await?;
        let rows: Vec<ShipmentRecord> = Self::check(resp).await?.json().await?;
        let stored = rows
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound(record.id))?;
        info!(id = %stored.id, "Record updated remotely");
        Ok(stored)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let url = self.filtered_url("id", &id.to_string());
        let resp = self
            .request(Method::DELETE, &url)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<ShipmentRecord> = Self::check(resp).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id));
        }
        info!(id = %id, "Record deleted remotely");
        Ok(())
    }

    async fn find_by_invoice_no(
        &self,
        invoice_no: &str,
    ) -> Result<Vec<ShipmentRecord>, StoreError> {
        // `%`, `_` and `*` are ilike wildcards; narrow to exact matches here.
        let url = format!(
            "{}?invoice_no=ilike.{}",
            self.table_url(),
            encode(&invoice_no.replace('\\', "\\\\"))
        );
        Ok(self
            .fetch(&url)
            .await?
            .into_iter()
            .filter(|r| r.invoice_no.eq_ignore_ascii_case(invoice_no))
            .collect())
    }
}
