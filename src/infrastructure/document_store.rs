use crate::infrastructure::document_mapper::PersistedDocument;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub const JSONBIN_API_BASE: &str = "https://api.jsonbin.io/v3/b/";

/// Whole-document storage. `fetch` returns `None` when no document exists yet.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self) -> Result<Option<serde_json::Value>, InfraError>;

    async fn store(&self, document: &PersistedDocument) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestJsonBinStore {
    client: Client,
    endpoint: Url,
    master_key: String,
}

impl ReqwestJsonBinStore {
    pub fn new(
        client: Client,
        api_base: &str,
        bin_id: &str,
        master_key: &str,
    ) -> Result<Self, InfraError> {
        let bin_id = ensure_non_empty(bin_id, "bin id")?;
        let master_key = ensure_non_empty(master_key, "master key")?;

        let mut endpoint = Url::parse(api_base)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid document store url: {error}")))?;
        endpoint
            .path_segments_mut()
            .map_err(|_| InfraError::InvalidConfig("document store url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&bin_id);

        Ok(Self {
            client,
            endpoint,
            master_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn ensure_non_empty(value: &str, field: &str) -> Result<String, InfraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl DocumentStore for ReqwestJsonBinStore {
    async fn fetch(&self) -> Result<Option<serde_json::Value>, InfraError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .header("X-Master-Key", &self.master_key)
            .header("X-Bin-Meta", "false")
            .send()
            .await
            .map_err(|error| InfraError::from_reqwest("network error while fetching document", error))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::from_reqwest("failed reading document response", error))?;
        if !status.is_success() {
            return Err(InfraError::http_status("document fetch failed", status, &body));
        }

        let value = serde_json::from_str(&body)
            .map_err(|error| InfraError::MalformedDocument(format!("document is not JSON: {error}")))?;
        Ok(Some(value))
    }

    async fn store(&self, document: &PersistedDocument) -> Result<(), InfraError> {
        let response = self
            .client
            .put(self.endpoint.clone())
            .header("X-Master-Key", &self.master_key)
            .json(document)
            .send()
            .await
            .map_err(|error| InfraError::from_reqwest("network error while storing document", error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InfraError::http_status("document store failed", status, &body));
        }
        Ok(())
    }
}

/// Local JSON file used when no remote store is configured.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    path: PathBuf,
}

impl FileDocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn fetch(&self) -> Result<Option<serde_json::Value>, InfraError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let value = serde_json::from_str(&raw).map_err(|error| {
            InfraError::MalformedDocument(format!("{} is not JSON: {error}", self.path.display()))
        })?;
        Ok(Some(value))
    }

    async fn store(&self, document: &PersistedDocument) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let formatted = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, format!("{formatted}\n")).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    document: Mutex<Option<serde_json::Value>>,
    writes: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn with_document(document: serde_json::Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn document(&self) -> Result<Option<serde_json::Value>, InfraError> {
        let document = self
            .document
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("document lock poisoned: {error}")))?;
        Ok(document.clone())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch(&self) -> Result<Option<serde_json::Value>, InfraError> {
        self.document()
    }

    async fn store(&self, document: &PersistedDocument) -> Result<(), InfraError> {
        let value = serde_json::to_value(document)?;
        let mut stored = self
            .document
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("document lock poisoned: {error}")))?;
        *stored = Some(value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
