//! Sled-based stores for the API key and the per-session summary cache.

use crate::summary::SummaryResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Key under which the API key is stored
const API_KEY: &str = "apiKey";

/// Prefix of session cache keys, followed by the page URL
const SUMMARY_PREFIX: &str = "summary_";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("stored value is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Durable store for the user's API key.
pub struct KeyStore {
    db: sled::Db,
}

impl KeyStore {
    /// Open or create the key store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// A store that lives only as long as this value
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store the API key, replacing any previous one
    pub fn set_api_key(&self, key: &str) -> Result<(), StorageError> {
        self.db.insert(API_KEY, key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn api_key(&self) -> Result<Option<String>, StorageError> {
        match self.db.get(API_KEY)? {
            Some(data) => Ok(Some(String::from_utf8(data.to_vec())?)),
            None => Ok(None),
        }
    }
}

/// A cached analysis with the time it was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSummary {
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub summary: SummaryResult,
}

impl CachedSummary {
    pub fn new(url: String, summary: SummaryResult) -> Self {
        Self {
            url,
            created_at: Utc::now(),
            summary,
        }
    }
}

/// Per-URL summary cache, dropped when the process exits.
pub struct SessionCache {
    db: sled::Db,
}

impl SessionCache {
    pub fn new() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Cache key for a page URL
    pub fn key_for(url: &str) -> String {
        format!("{SUMMARY_PREFIX}{url}")
    }

    pub fn get(&self, url: &str) -> Result<Option<CachedSummary>, StorageError> {
        match self.db.get(Self::key_for(url))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub fn store(&self, url: &str, summary: &SummaryResult) -> Result<(), StorageError> {
        let entry = CachedSummary::new(url.to_string(), summary.clone());
        let value = serde_json::to_vec(&entry)?;
        self.db.insert(Self::key_for(url), value)?;
        Ok(())
    }

    /// Drop the entry for a URL; returns whether one existed
    pub fn remove(&self, url: &str) -> Result<bool, StorageError> {
        Ok(self.db.remove(Self::key_for(url))?.is_some())
    }
}
