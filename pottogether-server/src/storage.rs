use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use log::info;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

pub type ArcedStore = Arc<dyn ObjectStore>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Uploaded file is empty")]
    Empty,
    #[error("{0} is not stored here")]
    UnknownObject(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Somewhere uploaded images can be put and later fetched by URL
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the bytes and returns the public URL of the object.
    /// `path_hint` is a slash separated prefix such as `record/12`.
    async fn put(&self, bytes: Vec<u8>, path_hint: &str) -> Result<String, StorageError>;

    /// Removes an object by the URL [ObjectStore::put] returned for it
    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// Stores objects in a local directory that is served under a public URL
pub struct LocalObjectStore {
    root: PathBuf,
    public_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

/// Keeps only the characters that are safe in a file name
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bytes: Vec<u8>, path_hint: &str) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }

        let prefix: Vec<_> = path_hint
            .split('/')
            .map(sanitize)
            .filter(|s| !s.is_empty())
            .collect();

        let directory = prefix
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment));
        fs::create_dir_all(&directory).await?;

        let name = Uuid::new_v4().simple().to_string();
        fs::write(directory.join(&name), &bytes).await?;

        let mut key = prefix;
        key.push(name);
        let url = format!("{}/{}", self.public_url, key.join("/"));

        info!("Stored {} bytes at {}", bytes.len(), url);
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let unknown = || StorageError::UnknownObject(url.to_string());

        let key = url
            .strip_prefix(&self.public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(unknown)?;

        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || sanitize(segment) != segment {
                return Err(unknown());
            }
            path.push(segment);
        }

        fs::remove_file(&path).await?;

        info!("Deleted {}", url);
        Ok(())
    }
}
