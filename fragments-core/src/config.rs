//! Configuration module for storage backend selection and settings
//!
//! The backend is resolved once at process start, from the environment or
//! from a storage location string, and is not switched afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{FragmentsError, Result};

/// Environment variable selecting the backend (`memory` or `local`)
pub const STORAGE_ENV: &str = "FRAGMENTS_STORAGE";
/// Environment variable holding the local backend's base directory
pub const DATA_DIR_ENV: &str = "FRAGMENTS_DATA_DIR";

/// Enumeration of supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store; contents are lost on exit
    Memory,
    /// Local filesystem storage
    Local,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Local => "local",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = FragmentsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "local" | "disk" => Ok(StorageBackend::Local),
            other => Err(FragmentsError::validation(format!(
                "Unknown storage backend: {other}"
            ))),
        }
    }
}

/// Configuration structure for storage backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The storage backend to use
    pub backend: StorageBackend,
    /// Base directory for local storage (required for the local backend)
    pub local_base_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Create a configuration for the in-process store
    pub fn memory() -> Self {
        StorageConfig {
            backend: StorageBackend::Memory,
            local_base_path: None,
        }
    }

    /// Create a configuration for filesystem storage under `base_path`
    pub fn local<P: Into<PathBuf>>(base_path: P) -> Self {
        StorageConfig {
            backend: StorageBackend::Local,
            local_base_path: Some(base_path.into()),
        }
    }

    /// Resolve the configuration from `FRAGMENTS_STORAGE` and `FRAGMENTS_DATA_DIR`.
    ///
    /// With neither set, the memory backend is used. Setting only the data
    /// directory implies the local backend.
    pub fn from_env() -> Result<Self> {
        Self::resolve(
            std::env::var(STORAGE_ENV).ok(),
            std::env::var(DATA_DIR_ENV).ok(),
        )
    }

    /// Resolve a backend name and data directory the same way [`from_env`]
    /// does, for callers that gather them elsewhere (command-line flags).
    /// Empty strings count as unset.
    ///
    /// [`from_env`]: StorageConfig::from_env
    pub fn resolve(backend: Option<String>, data_dir: Option<String>) -> Result<Self> {
        let data_dir = data_dir.filter(|d| !d.is_empty()).map(PathBuf::from);
        let backend = match backend.filter(|b| !b.is_empty()) {
            Some(name) => name.parse()?,
            None if data_dir.is_some() => StorageBackend::Local,
            None => StorageBackend::Memory,
        };

        let config = StorageConfig {
            backend,
            local_base_path: data_dir,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a storage location string
    ///
    /// Supports formats:
    /// - `memory://` for the in-process store
    /// - `file:///abs/path`, `/abs/path` or `./relative/path` for local storage
    pub fn from_uri(uri: &str) -> Result<StorageConfig> {
        if uri == "memory://" || uri == "memory" {
            return Ok(StorageConfig::memory());
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.is_empty() {
            return Err(FragmentsError::validation(
                "Invalid storage URI: missing path",
            ));
        }
        Ok(StorageConfig::local(path))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StorageBackend::Local => {
                if self
                    .local_base_path
                    .as_ref()
                    .map_or(true, |p| p.as_os_str().is_empty())
                {
                    return Err(FragmentsError::validation(format!(
                        "Local backend requires a base directory (set {DATA_DIR_ENV})"
                    )));
                }
            }
            StorageBackend::Memory => {}
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Memory);
        assert!(config.local_base_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve() {
        let config = StorageConfig::resolve(None, None).unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);

        let config = StorageConfig::resolve(None, Some("/var/fragments".into())).unwrap();
        assert_eq!(config.backend, StorageBackend::Local);
        assert_eq!(config.local_base_path, Some(PathBuf::from("/var/fragments")));

        let config =
            StorageConfig::resolve(Some("MEMORY".into()), Some("/var/fragments".into()))
                .unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);

        assert!(StorageConfig::resolve(Some("local".into()), None).is_err());
        assert!(StorageConfig::resolve(Some("s3".into()), None).is_err());
    }

    #[test]
    fn test_from_uri() {
        assert_eq!(
            StorageConfig::from_uri("memory://").unwrap(),
            StorageConfig::memory()
        );
        assert_eq!(
            StorageConfig::from_uri("file:///data/fragments").unwrap(),
            StorageConfig::local("/data/fragments")
        );
        assert_eq!(
            StorageConfig::from_uri("./fragments").unwrap(),
            StorageConfig::local("./fragments")
        );

        let result = StorageConfig::from_uri("file://");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("missing path"));
    }

    #[test]
    fn test_validate_local_config() {
        let mut config = StorageConfig::local("/tmp/fragments");
        assert!(config.validate().is_ok());

        config.local_base_path = None;
        assert!(config.validate().is_err());

        config.local_base_path = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_serde_names() {
        let json = serde_json::to_string(&StorageConfig::local("/x")).unwrap();
        assert!(json.contains("\"local\""));
        assert_eq!("disk".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
    }
}
