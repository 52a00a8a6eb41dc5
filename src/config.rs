//! Construction-time configuration for a cache engine instance.
//!
//! Plain builder struct, no file-format parsing — the crate only carries
//! the settings its own components read, mirroring the teacher's
//! `AppConfig`/`DiskCacheAppConfig` builder pattern (`with_*` consuming
//! methods plus a `new()` constructor with sane defaults).

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::serde::SerdeKind;

/// Default local-disk cache budget: 10 GiB.
pub const DEFAULT_MAX_LOCAL_DISK_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Construction-time configuration shared by the backends this crate builds.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory the local-disk backend owns.
    pub local_disk: PathBuf,

    /// Byte budget the local-disk backend's evictor enforces.
    pub max_local_disk_size: u64,

    /// `scheme://host:port` of a remote cache server, if a remote backend
    /// is wired in. `None` means local-disk only.
    pub remote_url: Option<String>,

    /// Serde flavour applied at the remote tier boundary.
    pub remote_serde: SerdeKind,
}

impl CacheConfig {
    /// Construct with the disk-only defaults: `max_local_disk_size` of
    /// [`DEFAULT_MAX_LOCAL_DISK_SIZE`], no remote tier.
    pub fn new(local_disk: impl Into<PathBuf>) -> Self {
        Self {
            local_disk: local_disk.into(),
            max_local_disk_size: DEFAULT_MAX_LOCAL_DISK_SIZE,
            remote_url: None,
            remote_serde: SerdeKind::Naive,
        }
    }

    /// Set the local-disk byte budget.
    pub fn with_max_local_disk_size(mut self, bytes: u64) -> Self {
        self.max_local_disk_size = bytes;
        self
    }

    /// Wire in a remote tier at `url` (e.g. `"lm://127.0.0.1:7600"`).
    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    /// Select the serde flavour used at the remote tier boundary.
    pub fn with_remote_serde(mut self, kind: SerdeKind) -> Self {
        self.remote_serde = kind;
        self
    }

    /// Validate the configuration is internally consistent.
    ///
    /// Construction doesn't touch the filesystem or network — callers find
    /// out about a missing/unwritable `local_disk` directory or an
    /// unreachable `remote_url` when the corresponding backend is actually
    /// started, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_local_disk_size == 0 {
            return Err(ConfigError::Invalid(
                "max_local_disk_size must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = &self.remote_url {
            if !url.contains("://") {
                return Err(ConfigError::Invalid(format!(
                    "remote_url {url:?} is missing a scheme prefix"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_disk_only_defaults() {
        let config = CacheConfig::new("/tmp/kvcache");
        assert_eq!(config.max_local_disk_size, DEFAULT_MAX_LOCAL_DISK_SIZE);
        assert!(config.remote_url.is_none());
        assert_eq!(config.remote_serde, SerdeKind::Naive);
    }

    #[test]
    fn builder_methods_compose() {
        let config = CacheConfig::new("/tmp/kvcache")
            .with_max_local_disk_size(1024)
            .with_remote_url("lm://127.0.0.1:7600")
            .with_remote_serde(SerdeKind::Kivi);

        assert_eq!(config.max_local_disk_size, 1024);
        assert_eq!(config.remote_url.as_deref(), Some("lm://127.0.0.1:7600"));
        assert_eq!(config.remote_serde, SerdeKind::Kivi);
    }

    #[test]
    fn validate_rejects_zero_size_budget() {
        let config = CacheConfig::new("/tmp/kvcache").with_max_local_disk_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_schemeless_remote_url() {
        let config = CacheConfig::new("/tmp/kvcache").with_remote_url("127.0.0.1:7600");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        let config = CacheConfig::new("/tmp/kvcache").with_remote_url("lm://host:7600");
        assert!(config.validate().is_ok());
    }
}
