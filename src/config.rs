use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PagewatchError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What to watch
    pub watch: WatchConfig,

    /// Where snapshots are kept between runs
    pub storage: StorageConfig,

    /// HTTP fetch behaviour
    pub fetch: FetchConfig,

    /// Diff rendering
    pub diff: DiffConfig,

    /// Outbound mail settings
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Newline-delimited URL list
    pub urls_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON index of URL -> fingerprint and last check time
    pub state_file: PathBuf,

    /// Directory holding the last normalized text of each URL
    pub text_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    pub timeout_secs: u64,

    /// Total attempts per URL, including the first one
    pub attempts: u32,

    /// Pause between attempts
    pub retry_delay_secs: u64,

    /// Maximum number of URLs fetched at the same time
    pub max_concurrency: usize,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Maximum changed lines shown per URL
    pub max_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP relay host
    pub smtp_host: Option<String>,

    /// SMTP relay port (STARTTLS)
    pub smtp_port: u16,

    /// SMTP username
    pub smtp_user: Option<String>,

    /// SMTP password
    pub smtp_pass: Option<String>,

    /// Sender address
    pub mail_from: Option<String>,

    /// Recipient addresses, comma separated
    pub mail_to: Option<String>,

    /// Prefix of every subject line
    pub subject_prefix: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            urls_file: PathBuf::from("urls.txt"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("state.json"),
            text_dir: PathBuf::from("state_text"),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            attempts: 2,
            retry_delay_secs: 5,
            max_concurrency: 4,
            user_agent: format!(
                "Mozilla/5.0 (compatible; pagewatch/{})",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { max_lines: 20 }
    }
}

pub const DEFAULT_SMTP_PORT: u16 = 587;

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_user: None,
            smtp_pass: None,
            mail_from: None,
            mail_to: None,
            subject_prefix: "[pagewatch]".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PagewatchError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PagewatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default, then apply environment
    /// overrides and validate.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)?
                } else {
                    return Err(PagewatchError::Config(format!(
                        "config file not found: {}",
                        p.as_ref().display()
                    )));
                }
            }
            None => {
                let candidates = ["pagewatch.toml", "Pagewatch.toml", ".pagewatch.toml"];

                match candidates.iter().find(|c| Path::new(c).exists()) {
                    Some(candidate) => Self::load(candidate)?,
                    None => Self::default(),
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay mail settings from `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`,
    /// `SMTP_PASS`, `MAIL_FROM` and `MAIL_TO`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mail = &mut self.mail;

        if let Some(host) = lookup("SMTP_HOST") {
            mail.smtp_host = Some(host);
        }
        if let Some(port) = lookup("SMTP_PORT") {
            // An empty variable is common in CI secrets; treat it as unset.
            mail.smtp_port = if port.trim().is_empty() {
                DEFAULT_SMTP_PORT
            } else {
                port.trim().parse().map_err(|_| {
                    PagewatchError::Config(format!("SMTP_PORT is not a valid port: {port}"))
                })?
            };
        }
        if let Some(user) = lookup("SMTP_USER") {
            mail.smtp_user = Some(user);
        }
        if let Some(pass) = lookup("SMTP_PASS") {
            mail.smtp_pass = Some(pass);
        }
        if let Some(from) = lookup("MAIL_FROM") {
            mail.mail_from = Some(from);
        }
        if let Some(to) = lookup("MAIL_TO") {
            mail.mail_to = Some(to);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.attempts == 0 {
            return Err(PagewatchError::Config("fetch.attempts must be at least 1".into()));
        }
        if self.fetch.max_concurrency == 0 {
            return Err(PagewatchError::Config(
                "fetch.max_concurrency must be at least 1".into(),
            ));
        }
        if self.diff.max_lines == 0 {
            return Err(PagewatchError::Config("diff.max_lines must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.fetch.timeout_secs, 60);
        assert_eq!(config.fetch.attempts, 2);
        assert_eq!(config.fetch.retry_delay_secs, 5);
        assert_eq!(config.diff.max_lines, 20);
        assert_eq!(config.mail.smtp_port, 587);
        assert_eq!(config.storage.state_file, PathBuf::from("state.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetch]
            attempts = 3

            [mail]
            smtp_host = "smtp.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.attempts, 3);
        assert_eq!(config.fetch.timeout_secs, 60);
        assert_eq!(config.mail.smtp_host.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.diff.max_lines, 20);
    }

    #[test]
    fn test_env_overrides_mail_settings() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SMTP_HOST", "relay.example.com"),
                ("SMTP_PORT", "2525"),
                ("SMTP_USER", "watcher"),
                ("SMTP_PASS", "secret"),
                ("MAIL_FROM", "watch@example.com"),
                ("MAIL_TO", "ops@example.com"),
            ]))
            .unwrap();

        assert_eq!(config.mail.smtp_host.as_deref(), Some("relay.example.com"));
        assert_eq!(config.mail.smtp_port, 2525);
        assert_eq!(config.mail.smtp_user.as_deref(), Some("watcher"));
        assert_eq!(config.mail.smtp_pass.as_deref(), Some("secret"));
        assert_eq!(config.mail.mail_from.as_deref(), Some("watch@example.com"));
        assert_eq!(config.mail.mail_to.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_empty_smtp_port_falls_back_to_default() {
        let mut config = Config::default();
        config.mail.smtp_port = 25;
        config.apply_env(env(&[("SMTP_PORT", "")])).unwrap();
        assert_eq!(config.mail.smtp_port, DEFAULT_SMTP_PORT);
    }

    #[test]
    fn test_invalid_smtp_port_is_rejected() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("SMTP_PORT", "smtp")])).unwrap_err();
        assert!(matches!(err, PagewatchError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.fetch.attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagewatch.toml");

        let mut config = Config::default();
        config.diff.max_lines = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.diff.max_lines, 7);
    }
}
