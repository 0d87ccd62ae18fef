//! TOML configuration for the capture tool.
//!
//! ```toml
//! [library]
//! path = "/usr/local/lib/libfli.so"
//!
//! [polling]
//! ceiling_ms = 200
//! min_poll_ms = 10
//! timeout_ms = 120000
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquisition::WaitOptions;
use crate::traits::{CameraError, Result};

/// Where to load libfli from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Explicit library path. The platform search path is used when unset.
    pub path: Option<PathBuf>,
}

/// Readiness polling parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Longest sleep between polls.
    pub ceiling_ms: u64,
    /// Sleep used once the countdown reaches zero.
    pub min_poll_ms: u64,
    /// Give up waiting after this long.
    pub timeout_ms: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            ceiling_ms: 200,
            min_poll_ms: 10,
            timeout_ms: None,
        }
    }
}

/// Complete tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Library location.
    pub library: LibraryConfig,
    /// Polling behaviour.
    pub polling: PollingConfig,
}

impl CaptureConfig {
    /// Read and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the polling parameters can drive a wait loop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if:
    /// - `ceiling_ms` or `min_poll_ms` is zero
    /// - `min_poll_ms` exceeds `ceiling_ms`
    pub fn validate(&self) -> Result<()> {
        let polling = &self.polling;
        if polling.ceiling_ms == 0 || polling.min_poll_ms == 0 {
            return Err(CameraError::InvalidArgument(
                "polling intervals must be greater than 0".to_owned(),
            ));
        }
        if polling.min_poll_ms > polling.ceiling_ms {
            return Err(CameraError::InvalidArgument(format!(
                "min_poll_ms ({}) exceeds ceiling_ms ({})",
                polling.min_poll_ms, polling.ceiling_ms
            )));
        }
        Ok(())
    }

    /// Wait options described by the `[polling]` table.
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poll_ceiling: Duration::from_millis(self.polling.ceiling_ms),
            min_poll: Duration::from_millis(self.polling.min_poll_ms),
            timeout: self.polling.timeout_ms.map(Duration::from_millis),
            cancel: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_wait_options() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        let options = config.wait_options();
        let defaults = WaitOptions::default();
        assert_eq!(options.poll_ceiling, defaults.poll_ceiling);
        assert_eq!(options.min_poll, defaults.min_poll);
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn test_partial_file() {
        let config = CaptureConfig::from_toml_str(
            r#"
            [polling]
            timeout_ms = 1500
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.library.path, None);
        assert_eq!(config.polling.ceiling_ms, 200);
        assert_eq!(
            config.wait_options().timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[library]\npath = \"/opt/fli/libfli.so\"\n\n[polling]\nceiling_ms = 100\nmin_poll_ms = 5"
        )
        .expect("write config");

        let config = CaptureConfig::load(file.path()).expect("config should load");
        assert_eq!(
            config.library.path.as_deref(),
            Some(Path::new("/opt/fli/libfli.so"))
        );
        assert_eq!(
            config.wait_options().poll_ceiling,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = CaptureConfig::from_toml_str("[polling]\nceiling = 5\n")
            .expect_err("unknown key should fail");
        assert!(matches!(err, CameraError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_intervals() {
        let err = CaptureConfig::from_toml_str("[polling]\nceiling_ms = 5\nmin_poll_ms = 50\n")
            .expect_err("inverted intervals should fail");
        assert!(matches!(err, CameraError::InvalidArgument(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = CaptureConfig::load(dir.path().join("absent.toml")).expect_err("missing file");
        assert!(matches!(err, CameraError::Io(_)));
    }
}
