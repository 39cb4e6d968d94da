//! A tenant directory backed by a static CSV mapping file, read once at
//! startup into an in-memory table.
//!
//! Structurally this mirrors `tower_sessions_memory_store::MemoryStore`:
//! a `Mutex`-guarded `HashMap` behind a cheaply-`Clone`able handle, with
//! lookups served entirely from memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::{evaluate, Result, TenantDirectory, TenantError, TenantRecord, Validation};

#[derive(Debug, Deserialize)]
struct TenantRow {
    store_id: String,
    store_name: String,
    app_id: String,
    license_expire: String,
}

/// A tenant directory that loads `{storeId, storeName, appId,
/// licenseExpire}` rows from a CSV file at construction time.
///
/// The file is read once; the service reports unhealthy (via
/// `health_check`) rather than re-reading on every call, matching the
/// "no global mutable state other than connection pools" design note --
/// the directory itself is immutable after load.
#[derive(Clone, Debug)]
pub struct FileTenantDirectory {
    path: Arc<str>,
    records: Arc<Mutex<HashMap<(String, String), TenantRecord>>>,
}

impl FileTenantDirectory {
    /// Load the directory from `path`, a CSV file with header
    /// `store_id,store_name,app_id,license_expire` (RFC 3339 timestamps).
    pub async fn load(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let records = read_records(&path).await?;
        Ok(Self {
            path: Arc::from(path.as_str()),
            records: Arc::new(Mutex::new(records)),
        })
    }

    async fn reload(&self) -> Result<()> {
        let fresh = read_records(&self.path).await?;
        *self.records.lock().await = fresh;
        Ok(())
    }
}

async fn read_records(path: &str) -> Result<HashMap<(String, String), TenantRecord>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| TenantError::Io(format!("{path}: {e}")))?;

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let mut out = HashMap::new();
    for row in reader.deserialize::<TenantRow>() {
        let row = row.map_err(|e| TenantError::Parse(e.to_string()))?;
        let license_expire = OffsetDateTime::parse(
            &row.license_expire,
            &time::format_description::well_known::Rfc3339,
        )
        .map_err(|e| TenantError::Parse(format!("license_expire `{}`: {e}", row.license_expire)))?;

        out.insert(
            (row.store_id.clone(), row.app_id.clone()),
            TenantRecord {
                store_id: row.store_id,
                store_name: row.store_name,
                app_id: row.app_id,
                license_expire,
            },
        );
    }
    Ok(out)
}

#[async_trait]
impl TenantDirectory for FileTenantDirectory {
    async fn validate(&self, store_id: &str, app_id: &str) -> Result<Validation> {
        let record = self
            .records
            .lock()
            .await
            .get(&(store_id.to_string(), app_id.to_string()))
            .cloned();
        Ok(evaluate(record, OffsetDateTime::now_utc()))
    }

    async fn database_for(&self, store_id: &str, app_id: &str) -> Result<Option<String>> {
        let found = self
            .records
            .lock()
            .await
            .contains_key(&(store_id.to_string(), app_id.to_string()));
        Ok(found.then(|| app_id.to_string()))
    }

    async fn health_check(&self) -> Result<()> {
        self.reload().await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn fixture(contents: &str) -> FileTenantDirectory {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        FileTenantDirectory::load(file.path().to_str().unwrap().to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_pair_is_not_found() {
        let dir = fixture("store_id,store_name,app_id,license_expire\n").await;
        let v = dir.validate("239", "A").await.unwrap();
        assert!(!v.valid);
        assert!(v.expired);
    }

    #[tokio::test]
    async fn known_pair_routes_to_app_id_database() {
        let dir = fixture(
            "store_id,store_name,app_id,license_expire\n239,Acme,A,2099-01-01T00:00:00Z\n",
        )
        .await;
        let database = dir.database_for("239", "A").await.unwrap();
        assert_eq!(database.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn expired_license_reports_expired() {
        let dir = fixture(
            "store_id,store_name,app_id,license_expire\n239,Acme,A,2020-01-01T00:00:00Z\n",
        )
        .await;
        let v = dir.validate("239", "A").await.unwrap();
        assert!(!v.valid);
        assert!(v.expired);
    }
}
