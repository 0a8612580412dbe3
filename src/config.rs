//! Configuration file support
//!
//! Settings are read from `--config PATH` or `<config dir>/kubesift/config.toml`.
//! Command line flags take precedence over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::output::OutputFormat;

/// Default request deadline
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Kubeconfig path, otherwise `$KUBECONFIG` or `~/.kube/config`
    pub kubeconfig: Option<PathBuf>,

    /// Context name, otherwise the kubeconfig's current context
    pub context: Option<String>,

    /// Namespace for manifest objects without one
    pub namespace: Option<String>,

    /// Deadline for the whole command, 0 disables it
    pub timeout_secs: u64,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Default jq expression for `run`
    pub query: Option<String>,

    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            namespace: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_level: "warn".to_string(),
            query: None,
            output: OutputFormat::Name,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kubesift").join("config.toml"))
    }

    /// Load from an explicit path (which must exist), or from the default
    /// location if present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Deadline for cluster calls, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r#"
kubeconfig = "/etc/kube/admin.conf"
context = "prod"
namespace = "shop"
timeout_secs = 0
log_level = "debug"
query = '.metadata.labels["app"] == "nginx"'
output = "yaml"
"#,
        )
        .unwrap();

        assert_eq!(config.kubeconfig, Some(PathBuf::from("/etc/kube/admin.conf")));
        assert_eq!(config.context.as_deref(), Some("prod"));
        assert_eq!(config.namespace.as_deref(), Some("shop"));
        assert_eq!(config.timeout(), None);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.query.as_deref(), Some(r#".metadata.labels["app"] == "nginx""#));
        assert_eq!(config.output, OutputFormat::Yaml);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse("namesapce = \"typo\"").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/kubesift.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
