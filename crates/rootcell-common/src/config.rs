//! Configuration model for the rootcell launcher.
//!
//! The file is YAML and every key is optional. It only carries settings
//! around the pipeline; the CLI folds it into an explicit launch value
//! once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, RootcellError};

/// Root configuration for the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RootcellConfig {
    /// Root filesystem archive to launch.
    pub archive: PathBuf,
    /// Shell executed inside the container.
    pub shell: PathBuf,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// Prompt exported to the shell.
    pub prompt: String,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RootcellConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from(constants::DEFAULT_ARCHIVE),
            shell: PathBuf::from(constants::DEFAULT_SHELL),
            hostname: constants::DEFAULT_HOSTNAME.to_owned(),
            prompt: constants::DEFAULT_PROMPT.to_owned(),
            log_level: constants::DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl RootcellConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Config`] if the YAML is malformed or has
    /// unknown keys.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| RootcellError::Config {
            message: e.to_string(),
        })
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RootcellError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|e| RootcellError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Returns the configuration file to read: the explicit one if given,
    /// else `$HOME/.rootcell.yaml` when it exists.
    #[must_use]
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| constants::user_config_file().filter(|path| path.is_file()))
    }

    /// Loads the file picked by [`RootcellConfig::locate`], or defaults
    /// when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing or the file found
    /// fails to parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::locate(explicit).map_or_else(|| Ok(Self::default()), |path| Self::from_file(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RootcellConfig::from_yaml("").unwrap();
        assert_eq!(config, RootcellConfig::default());
        assert_eq!(config.archive, PathBuf::from("alpine.tar"));
        assert_eq!(config.shell, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = RootcellConfig::from_yaml("hostname: box\nlog_level: debug\n").unwrap();
        assert_eq!(config.hostname, "box");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.prompt, constants::DEFAULT_PROMPT);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = RootcellConfig::from_yaml("cgroup: true\n").unwrap_err();
        assert!(matches!(err, RootcellError::Config { .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RootcellConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn explicit_path_wins_over_home() {
        let explicit = Path::new("/etc/rootcell.yaml");
        assert_eq!(
            RootcellConfig::locate(Some(explicit)),
            Some(PathBuf::from("/etc/rootcell.yaml"))
        );
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rootcell.yaml");
        std::fs::write(&path, "archive: /srv/busybox.tar\nshell: /bin/ash\n").unwrap();
        let config = RootcellConfig::load(Some(&path)).unwrap();
        assert_eq!(config.archive, PathBuf::from("/srv/busybox.tar"));
        assert_eq!(config.shell, PathBuf::from("/bin/ash"));
    }
}
