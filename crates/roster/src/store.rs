use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::document::ListDocument;

/// Opaque version of the stored document. Writes must present the token of
/// the version they were derived from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub document: ListDocument,
    pub token: Option<ConcurrencyToken>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("concurrency conflict: {0}")]
    Conflict(String),
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// A missing document reads as empty with no token.
    async fn read(&self) -> Result<Snapshot, StoreError>;

    /// Writes `document` over the version named by `token`. Without a token
    /// the document is created first and must not already exist.
    async fn write(
        &self,
        document: &ListDocument,
        token: Option<&ConcurrencyToken>,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError>;
}

pub fn content_token(bytes: &[u8]) -> ConcurrencyToken {
    ConcurrencyToken::new(hex::encode(Sha256::digest(bytes)))
}

struct StoredObject {
    bytes: Vec<u8>,
    token: ConcurrencyToken,
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    object: Arc<Mutex<Option<StoredObject>>>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_document(document: &ListDocument) -> Result<Self, StoreError> {
        let store = Self::new();
        let bytes = document.to_bytes()?;
        let token = content_token(&bytes);
        *store.object.lock() = Some(StoredObject { bytes, token });
        Ok(store)
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.object.lock().as_ref().map(|object| object.bytes.clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    fn replace(
        &self,
        bytes: Vec<u8>,
        expected: &ConcurrencyToken,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError> {
        let mut object = self.object.lock();
        let current = object
            .as_ref()
            .ok_or_else(|| StoreError::Conflict("document no longer exists".to_string()))?;
        if current.token != *expected {
            return Err(StoreError::Conflict(format!(
                "document is at {} but write expected {}",
                current.token, expected
            )));
        }
        let token = content_token(&bytes);
        *object = Some(StoredObject {
            bytes,
            token: token.clone(),
        });
        self.messages.lock().push(message.to_string());
        Ok(token)
    }

    fn create(&self, message: &str) -> Result<ConcurrencyToken, StoreError> {
        let mut object = self.object.lock();
        if object.is_some() {
            return Err(StoreError::Conflict("document already exists".to_string()));
        }
        let bytes = ListDocument::default().to_bytes()?;
        let token = content_token(&bytes);
        *object = Some(StoredObject {
            bytes,
            token: token.clone(),
        });
        self.messages.lock().push(message.to_string());
        Ok(token)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read(&self) -> Result<Snapshot, StoreError> {
        let object = self.object.lock();
        let Some(object) = object.as_ref() else {
            return Ok(Snapshot::default());
        };
        Ok(Snapshot {
            document: ListDocument::from_slice(&object.bytes)?,
            token: Some(object.token.clone()),
        })
    }

    async fn write(
        &self,
        document: &ListDocument,
        token: Option<&ConcurrencyToken>,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError> {
        let bytes = document.to_bytes()?;
        let token = match token {
            Some(token) => token.clone(),
            None => self.create("Create whitelist file")?,
        };
        self.replace(bytes, &token, message)
    }
}
