//! Bill artifact storage and metadata.
//!
//! The bytes go to a [`BillStore`]; only the returned identifier, content type,
//! size and locator are persisted, in the `bill_files` table. Nothing here ever
//! interprets the bytes.

use crate::{
    entities::{RegistrationChannel, bill_file},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Metadata kind stamped on warranty bills.
pub const BILL_KIND: &str = "warranty_bill";

/// Content types accepted for bill uploads.
pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["application/pdf", "image/jpeg", "image/png", "image/webp"];

/// A bill file as received from the caller.
#[derive(Debug, Clone)]
pub struct BillUpload {
    /// File name supplied by the uploader
    pub original_name: String,
    /// Declared MIME type
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl BillUpload {
    /// Checks the upload is non-empty, within `max_bytes` and of an accepted type.
    ///
    /// # Errors
    /// Returns `Validation` describing the first failed check.
    pub fn validate(&self, max_bytes: usize) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(Error::validation("Bill file is empty"));
        }
        if self.bytes.len() > max_bytes {
            return Err(Error::validation(format!(
                "Bill file exceeds the {max_bytes} byte limit"
            )));
        }
        let content_type = self.content_type.to_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(Error::validation(format!(
                "Unsupported bill file type '{}'. Allowed: {}",
                self.content_type,
                ALLOWED_CONTENT_TYPES.join(", ")
            )));
        }
        Ok(())
    }

    fn extension(&self) -> &'static str {
        match self.content_type.to_lowercase().as_str() {
            "application/pdf" => "pdf",
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    fn generated_name(&self) -> String {
        format!("bill-{}.{}", Uuid::new_v4(), self.extension())
    }
}

/// What the store hands back after accepting an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBill {
    /// Name assigned by the store
    pub stored_name: String,
    /// Name supplied by the uploader
    pub original_name: String,
    /// MIME type
    pub content_type: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Where the store keeps the bytes
    pub locator: String,
}

/// Opaque blob store for bill artifacts.
#[async_trait]
pub trait BillStore: Send + Sync {
    /// Stores the upload and returns its identity.
    async fn put(&self, upload: &BillUpload) -> Result<StoredBill>;

    /// Deletes a previously stored artifact.
    async fn remove(&self, locator: &str) -> Result<()>;
}

/// Stores bills as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalBillStore {
    root: PathBuf,
}

impl LocalBillStore {
    /// Creates a store rooted at `root`. The directory is created on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn storage_error(action: &str, err: &std::io::Error) -> Error {
    Error::Storage {
        message: format!("Failed to {action} bill file: {err}"),
    }
}

#[async_trait]
impl BillStore for LocalBillStore {
    async fn put(&self, upload: &BillUpload) -> Result<StoredBill> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| storage_error("prepare directory for", &e))?;

        let stored_name = upload.generated_name();
        let path = self.root.join(&stored_name);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| storage_error("write", &e))?;
        debug!("Stored bill at {}", path.display());

        Ok(StoredBill {
            stored_name,
            original_name: upload.original_name.clone(),
            content_type: upload.content_type.to_lowercase(),
            size_bytes: upload.bytes.len() as u64,
            locator: path.to_string_lossy().into_owned(),
        })
    }

    async fn remove(&self, locator: &str) -> Result<()> {
        let path = Path::new(locator);
        if !path.starts_with(&self.root) {
            return Err(Error::Storage {
                message: format!("Locator outside the bill store: {locator}"),
            });
        }
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| storage_error("remove", &e))
    }
}

/// In-process bill store.
#[derive(Debug, Default)]
pub struct MemoryBillStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBillStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts currently held.
    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    /// Whether the store holds no artifacts.
    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }

    /// Bytes stored under `locator`, if any.
    pub async fn get(&self, locator: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(locator).cloned()
    }
}

#[async_trait]
impl BillStore for MemoryBillStore {
    async fn put(&self, upload: &BillUpload) -> Result<StoredBill> {
        let stored_name = upload.generated_name();
        let locator = format!("memory://{stored_name}");
        self.files
            .lock()
            .await
            .insert(locator.clone(), upload.bytes.clone());

        Ok(StoredBill {
            stored_name,
            original_name: upload.original_name.clone(),
            content_type: upload.content_type.to_lowercase(),
            size_bytes: upload.bytes.len() as u64,
            locator,
        })
    }

    async fn remove(&self, locator: &str) -> Result<()> {
        self.files
            .lock()
            .await
            .remove(locator)
            .map(|_| ())
            .ok_or_else(|| Error::Storage {
                message: format!("No bill stored at {locator}"),
            })
    }
}

/// Who uploaded a bill and from where.
#[derive(Debug, Clone)]
pub struct UploadContext {
    /// Customer email or admin identity
    pub uploaded_by: String,
    /// Channel of the upload
    pub channel: RegistrationChannel,
    /// Caller address
    pub client_addr: Option<String>,
    /// Caller user agent
    pub user_agent: Option<String>,
}

/// Persists the metadata of a stored bill for `unit_id`.
pub async fn record_bill<C>(
    db: &C,
    unit_id: i64,
    stored: &StoredBill,
    context: &UploadContext,
    now: DateTime<Utc>,
) -> Result<bill_file::Model>
where
    C: ConnectionTrait,
{
    let bill = bill_file::ActiveModel {
        stored_name: Set(stored.stored_name.clone()),
        original_name: Set(stored.original_name.clone()),
        content_type: Set(stored.content_type.clone()),
        size_bytes: Set(i64::try_from(stored.size_bytes)?),
        locator: Set(stored.locator.clone()),
        kind: Set(BILL_KIND.to_string()),
        uploaded_by: Set(context.uploaded_by.clone()),
        unit_id: Set(unit_id),
        channel: Set(context.channel),
        client_addr: Set(context.client_addr.clone()),
        user_agent: Set(context.user_agent.clone()),
        uploaded_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(bill_id = bill.id, unit_id, channel = %context.channel, "Recorded bill metadata");
    Ok(bill)
}

/// Removes a blob whose metadata never got committed. Failures are only logged.
pub async fn discard(store: &dyn BillStore, stored: &StoredBill) {
    match store.remove(&stored.locator).await {
        Ok(()) => debug!("Discarded orphaned bill {}", stored.stored_name),
        Err(e) => warn!("Failed to discard orphaned bill {}: {}", stored.locator, e),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::BillFile;
    use crate::test_utils::*;
    use sea_orm::EntityTrait;

    #[test]
    fn test_upload_validation() {
        let ok = test_bill();
        assert!(ok.validate(1024).is_ok());

        let empty = BillUpload {
            bytes: vec![],
            ..test_bill()
        };
        assert!(matches!(empty.validate(1024), Err(Error::Validation { .. })));

        let too_big = BillUpload {
            bytes: vec![0; 2048],
            ..test_bill()
        };
        assert!(matches!(too_big.validate(1024), Err(Error::Validation { .. })));

        let wrong_type = BillUpload {
            content_type: "text/html".into(),
            ..test_bill()
        };
        assert!(matches!(wrong_type.validate(1024), Err(Error::Validation { .. })));

        let upper = BillUpload {
            content_type: "Image/PNG".into(),
            ..test_bill()
        };
        assert!(upper.validate(1024).is_ok());
    }

    #[tokio::test]
    async fn test_memory_store_put_and_remove() -> Result<()> {
        let store = MemoryBillStore::new();
        let stored = store.put(&test_bill()).await?;

        assert!(stored.stored_name.ends_with(".pdf"));
        assert_eq!(stored.size_bytes, 9);
        assert_eq!(store.get(&stored.locator).await.unwrap(), b"%PDF-1.4\n");

        store.remove(&stored.locator).await?;
        assert!(store.is_empty().await);
        assert!(store.remove(&stored.locator).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_store_writes_under_root() -> Result<()> {
        let root = std::env::temp_dir().join(format!("disk-ledger-bills-{}", Uuid::new_v4()));
        let store = LocalBillStore::new(&root);

        let stored = store.put(&test_bill()).await?;
        let written = tokio::fs::read(&stored.locator).await?;
        assert_eq!(written, b"%PDF-1.4\n");
        assert!(Path::new(&stored.locator).starts_with(store.root()));

        store.remove(&stored.locator).await?;
        assert!(tokio::fs::metadata(&stored.locator).await.is_err());
        assert!(store.remove("/etc/passwd").await.is_err());

        tokio::fs::remove_dir_all(&root).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_record_bill_persists_metadata() -> Result<()> {
        let db = setup_test_db().await?;
        let unit = create_test_unit(&db, "SN-BILL").await?;
        let store = MemoryBillStore::new();
        let stored = store.put(&test_bill()).await?;

        let context = UploadContext {
            uploaded_by: "jane@example.com".into(),
            channel: RegistrationChannel::PublicApi,
            client_addr: Some("203.0.113.7".into()),
            user_agent: None,
        };
        let bill = record_bill(&db, unit.id, &stored, &context, fixed_now()).await?;

        let loaded = BillFile::find_by_id(bill.id).one(&db).await?.unwrap();
        assert_eq!(loaded.unit_id, unit.id);
        assert_eq!(loaded.kind, BILL_KIND);
        assert_eq!(loaded.channel, RegistrationChannel::PublicApi);
        assert_eq!(loaded.locator, stored.locator);
        assert_eq!(loaded.size_bytes, 9);
        Ok(())
    }
}
