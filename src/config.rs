use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Default path the out-of-band actor writes the one-time passcode to.
fn default_otp_relay_path() -> PathBuf {
    PathBuf::from("/tmp/mf-otp-code.txt")
}

fn default_headless() -> bool {
    true
}

/// Default cache TTL (5 minutes).
fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_selectors_path() -> PathBuf {
    PathBuf::from("selectors.toml")
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(SecretString::from(value))
}

/// The single identity this bridge signs in as.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    /// MoneyForward login email address.
    pub email: String,

    /// MoneyForward login password. Never logged or serialized back out.
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
}

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Directory for the persistent Chromium profile (cookies/sessions).
    /// If unset, defaults to `~/.local/share/mfbridge/browser-profile`.
    pub profile_dir: Option<PathBuf>,

    /// Run the browser without a visible window.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable. Autodetected when unset.
    pub chrome_executable: Option<PathBuf>,

    /// File the out-of-band passcode is deposited into.
    #[serde(default = "default_otp_relay_path")]
    pub otp_relay_path: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            profile_dir: None,
            headless: default_headless(),
            chrome_executable: None,
            otp_relay_path: default_otp_relay_path(),
        }
    }
}

/// Cache/snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long cached scrape results stay fresh.
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Path to the append-only snapshot file. If unset, defaults to
    /// `~/.local/share/mfbridge/snapshots.jsonl`.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
            snapshot_path: None,
        }
    }
}

/// A manually managed account (e.g. an overseas bank account) tracked on
/// MoneyForward with a converted JPY balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualAccount {
    /// Short name used on the command line.
    pub name: String,

    /// Account type, e.g. "bank" or "securities".
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Foreign currency the balance is held in.
    pub currency: String,

    /// Display name of the account on MoneyForward ME.
    pub mf_display_name: String,
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub identity: Identity,

    /// Manually managed foreign-currency accounts.
    #[serde(default)]
    pub accounts: Vec<ManualAccount>,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Path to the selector table. Relative paths resolve from the config
    /// file's directory.
    #[serde(default = "default_selectors_path")]
    pub selectors_path: PathBuf,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.selectors_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.selectors_path = parent.join(&config.selectors_path);
            }
        }

        Ok(config)
    }

    /// Resolved browser profile directory.
    pub fn profile_dir(&self) -> Result<PathBuf> {
        match &self.browser.profile_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(default_data_dir()?.join("browser-profile")),
        }
    }

    /// Resolved snapshot file path.
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        match &self.cache.snapshot_path {
            Some(path) => Ok(path.clone()),
            None => Ok(default_data_dir()?.join("snapshots.jsonl")),
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("Could not find data directory")?;
    Ok(base.join("mfbridge"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [identity]
            email = "user@example.com"
            password = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.identity.email, "user@example.com");
        assert_eq!(config.identity.password.expose_secret(), "hunter2");
        assert!(config.browser.headless);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(
            config.browser.otp_relay_path,
            PathBuf::from("/tmp/mf-otp-code.txt")
        );
    }

    #[test]
    fn browser_section_overrides() {
        let config: Config = toml::from_str(
            r#"
            [identity]
            email = "user@example.com"
            password = "hunter2"

            [browser]
            headless = false
            profile_dir = "/srv/mf/profile"
            otp_relay_path = "/srv/mf/otp.txt"
            "#,
        )
        .unwrap();

        assert!(!config.browser.headless);
        assert_eq!(config.profile_dir().unwrap(), PathBuf::from("/srv/mf/profile"));
        assert_eq!(
            config.browser.otp_relay_path,
            PathBuf::from("/srv/mf/otp.txt")
        );
    }
}
