// Client-side defaults and configuration layering (defaults -> env -> yaml).
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

pub(crate) const DEFAULT_ERROR_QUEUE_DEPTH: usize = 1024;
pub(crate) const DEFAULT_INBOX_PREFIX: &str = "_INBOX";

/// Connection-wide settings for the dispatch engine.
///
/// Pending limits set here apply to every subscription that does not pass its
/// own limits in `SubscribeOptions`. `None` means unbounded.
///
/// ```
/// use courier_client::ClientConfig;
///
/// let config = ClientConfig::optimized_defaults();
/// assert_eq!(config.default_pending_msgs_limit, None);
/// assert_eq!(config.inbox_prefix, "_INBOX");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub default_pending_msgs_limit: Option<usize>,
    pub default_pending_bytes_limit: Option<usize>,
    /// Depth of the asynchronous error reporting queue.
    pub error_queue_depth: usize,
    pub inbox_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::optimized_defaults()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct ClientConfigOverride {
    default_pending_msgs_limit: Option<usize>,
    default_pending_bytes_limit: Option<usize>,
    error_queue_depth: Option<usize>,
    inbox_prefix: Option<String>,
}

impl ClientConfig {
    pub fn from_env_or_yaml(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::from_env();
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("COURIER_CLIENT_CONFIG").ok());
        let contents = match override_path.as_deref() {
            Some(path) => match fs::read_to_string(path) {
                Ok(contents) => Some(contents),
                Err(err) => {
                    return Err(err).with_context(|| format!("read client config: {path}"));
                }
            },
            None => None,
        };
        if let Some(contents) = contents {
            let override_cfg: ClientConfigOverride =
                serde_yaml::from_str(&contents).context("parse client config yaml")?;
            override_cfg.apply(&mut config);
        }
        Ok(config)
    }

    pub fn optimized_defaults() -> Self {
        Self {
            default_pending_msgs_limit: None,
            default_pending_bytes_limit: None,
            error_queue_depth: DEFAULT_ERROR_QUEUE_DEPTH,
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::optimized_defaults();
        if let Some(value) = read_usize_env("COURIER_SUB_PENDING_MSGS_LIMIT") {
            config.default_pending_msgs_limit = Some(value);
        }
        if let Some(value) = read_usize_env("COURIER_SUB_PENDING_BYTES_LIMIT") {
            config.default_pending_bytes_limit = Some(value);
        }
        if let Some(value) = read_usize_env("COURIER_ERROR_QUEUE_DEPTH") {
            config.error_queue_depth = value;
        }
        if let Some(value) = read_prefix_env("COURIER_INBOX_PREFIX") {
            config.inbox_prefix = value;
        }
        config
    }
}

impl ClientConfigOverride {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(value) = self.default_pending_msgs_limit
            && value > 0
        {
            config.default_pending_msgs_limit = Some(value);
        }
        if let Some(value) = self.default_pending_bytes_limit
            && value > 0
        {
            config.default_pending_bytes_limit = Some(value);
        }
        if let Some(value) = self.error_queue_depth
            && value > 0
        {
            config.error_queue_depth = value;
        }
        if let Some(value) = &self.inbox_prefix
            && is_valid_prefix(value)
        {
            config.inbox_prefix = value.clone();
        }
    }
}

// The prefix becomes the leading tokens of every inbox subject.
fn is_valid_prefix(value: &str) -> bool {
    courier_common::validate_subject(value).is_ok()
}

fn read_usize_env(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
}

fn read_prefix_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| is_valid_prefix(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    struct EnvGuard(&'static [&'static str]);

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in self.0 {
                unsafe {
                    std::env::remove_var(key);
                }
            }
        }
    }

    const KEYS: &[&str] = &[
        "COURIER_SUB_PENDING_MSGS_LIMIT",
        "COURIER_SUB_PENDING_BYTES_LIMIT",
        "COURIER_ERROR_QUEUE_DEPTH",
        "COURIER_INBOX_PREFIX",
        "COURIER_CLIENT_CONFIG",
    ];

    #[test]
    #[serial]
    fn defaults_are_unbounded() {
        let _guard = EnvGuard(KEYS);
        let config = ClientConfig::from_env();
        assert_eq!(config, ClientConfig::optimized_defaults());
        assert_eq!(config.error_queue_depth, DEFAULT_ERROR_QUEUE_DEPTH);
    }

    #[test]
    #[serial]
    fn env_overrides_defaults_and_ignores_invalid_values() {
        let _guard = EnvGuard(KEYS);
        unsafe {
            std::env::set_var("COURIER_SUB_PENDING_MSGS_LIMIT", "64");
            std::env::set_var("COURIER_SUB_PENDING_BYTES_LIMIT", "0");
            std::env::set_var("COURIER_ERROR_QUEUE_DEPTH", "not-a-number");
            std::env::set_var("COURIER_INBOX_PREFIX", "_REPLY.app");
        }
        let config = ClientConfig::from_env();
        assert_eq!(config.default_pending_msgs_limit, Some(64));
        assert_eq!(config.default_pending_bytes_limit, None);
        assert_eq!(config.error_queue_depth, DEFAULT_ERROR_QUEUE_DEPTH);
        assert_eq!(config.inbox_prefix, "_REPLY.app");
    }

    #[test]
    #[serial]
    fn yaml_overrides_env() -> Result<()> {
        let _guard = EnvGuard(KEYS);
        unsafe {
            std::env::set_var("COURIER_SUB_PENDING_MSGS_LIMIT", "64");
        }
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "default_pending_msgs_limit: 5\ndefault_pending_bytes_limit: 10\ninbox_prefix: \"bad prefix\""
        )?;
        let path = file.path().to_str().context("temp path")?;
        let config = ClientConfig::from_env_or_yaml(Some(path))?;
        assert_eq!(config.default_pending_msgs_limit, Some(5));
        assert_eq!(config.default_pending_bytes_limit, Some(10));
        assert_eq!(config.inbox_prefix, DEFAULT_INBOX_PREFIX);
        Ok(())
    }

    #[test]
    #[serial]
    fn missing_yaml_file_is_an_error() {
        let _guard = EnvGuard(KEYS);
        let err = ClientConfig::from_env_or_yaml(Some("/nonexistent/courier.yaml"))
            .expect_err("missing file");
        assert!(err.to_string().contains("read client config"));
    }

    #[test]
    #[serial]
    fn malformed_yaml_is_an_error() -> Result<()> {
        let _guard = EnvGuard(KEYS);
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "default_pending_msgs_limit: [unterminated")?;
        let path = file.path().to_str().context("temp path")?;
        let err = ClientConfig::from_env_or_yaml(Some(path)).expect_err("bad yaml");
        assert!(err.to_string().contains("parse client config yaml"));
        Ok(())
    }
}
