use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;

/// A single record collection persisted as one JSON file.
///
/// Saves go to a temp file that is renamed over the target, so a crash
/// mid-write leaves the previous version intact. A missing or unparseable
/// file loads as `T::default()`.
pub struct JsonFile<T> {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub async fn load(&self) -> T {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                tracing::warn!("Failed to read {:?}, using defaults: {}", self.path, e);
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Corrupt data in {:?}, using defaults: {}", self.path, e);
                T::default()
            }
        }
    }

    pub async fn save(&self, value: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(value).await
    }

    /// Load, apply `f`, and save as one step. Returns whatever `f` returns.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _guard = self.write_lock.lock().await;
        let mut value = self.load().await;
        let result = f(&mut value);
        self.write(&value).await?;
        Ok(result)
    }

    async fn write(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(value)?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
