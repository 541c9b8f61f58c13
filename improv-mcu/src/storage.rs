//! Persistent Storage Abstraction Traits
//!
//! Credential persistence for the provisioning engine, plus two
//! interchangeable backends. The embedding application picks one; the
//! engine only sees the trait.

use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// WiFi credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

/// Trait for persistent storage operations
///
/// MCU-specific crates implement this trait using their storage backend
/// (NVS for ESP32, EEPROM emulation for ESP8266, a file on a host, etc.)
pub trait Storage {
    /// Error type for storage operations
    type Error: std::fmt::Display;

    /// Get WiFi credentials
    fn get_wifi_credentials(&self) -> Result<Option<Credentials>, Self::Error>;

    /// Save WiFi credentials
    fn set_wifi_credentials(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    /// Clear WiFi credentials
    fn clear_wifi_credentials(&mut self) -> Result<(), Self::Error>;
}

/// Credentials kept in RAM only, lost on restart
#[derive(Debug, Default)]
pub struct MemoryStorage {
    credentials: Option<Credentials>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(ssid: &str, password: &str) -> Self {
        Self {
            credentials: Some(Credentials::new(ssid, password)),
        }
    }
}

impl Storage for MemoryStorage {
    type Error = Infallible;

    fn get_wifi_credentials(&self) -> Result<Option<Credentials>, Self::Error> {
        Ok(self.credentials.clone())
    }

    fn set_wifi_credentials(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        self.credentials = Some(Credentials::new(ssid, password));
        Ok(())
    }

    fn clear_wifi_credentials(&mut self) -> Result<(), Self::Error> {
        self.credentials = None;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid credentials file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Credentials persisted as a small JSON document
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Storage for JsonFileStorage {
    type Error = StorageError;

    fn get_wifi_credentials(&self) -> Result<Option<Credentials>, Self::Error> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        let credentials: Credentials =
            serde_json::from_slice(&content).map_err(|source| StorageError::Json {
                path: self.path.clone(),
                source,
            })?;

        if credentials.ssid.is_empty() {
            return Ok(None);
        }
        log::info!("WiFi credentials loaded from {}", self.path.display());
        Ok(Some(credentials))
    }

    fn set_wifi_credentials(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let data = serde_json::to_vec_pretty(&Credentials::new(ssid, password)).map_err(|source| {
            StorageError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, data).map_err(|e| self.io_error(e))?;
        log::info!("WiFi credentials saved to {}", self.path.display());
        Ok(())
    }

    fn clear_wifi_credentials(&mut self) -> Result<(), Self::Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("improv-mcu-{}-{}", name, std::process::id()))
            .join("wifi.json")
    }

    #[test]
    fn memory_storage_roundtrip() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get_wifi_credentials().unwrap(), None);

        storage.set_wifi_credentials("home", "secret").unwrap();
        assert_eq!(
            storage.get_wifi_credentials().unwrap(),
            Some(Credentials::new("home", "secret"))
        );

        storage.clear_wifi_credentials().unwrap();
        assert_eq!(storage.get_wifi_credentials().unwrap(), None);
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let path = scratch_path("persist");
        let _ = fs::remove_file(&path);

        let mut storage = JsonFileStorage::new(&path);
        assert!(storage.get_wifi_credentials().unwrap().is_none());
        storage.set_wifi_credentials("office", "hunter2").unwrap();

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(
            reopened.get_wifi_credentials().unwrap(),
            Some(Credentials::new("office", "hunter2"))
        );

        storage.clear_wifi_credentials().unwrap();
        storage.clear_wifi_credentials().unwrap();
        assert!(reopened.get_wifi_credentials().unwrap().is_none());
    }

    #[test]
    fn file_storage_reports_garbage() {
        let path = scratch_path("garbage");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(matches!(
            storage.get_wifi_credentials(),
            Err(StorageError::Json { .. })
        ));
        let _ = fs::remove_file(&path);
    }
}
