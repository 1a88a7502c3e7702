use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;
use crate::flagger::{DEFAULT_FLAG_ACCOUNTS, DEFAULT_FLAG_PHRASES, LegalFlagger};
use crate::retry::RetryPolicy;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5:14b";
pub const DEFAULT_MAIL_HOST: &str = "127.0.0.1";
pub const DEFAULT_IMAP_PORT: u16 = 1143;
pub const DEFAULT_SMTP_PORT: u16 = 1025;
pub const DEFAULT_FETCH_WORKERS: usize = 4;
pub const DEFAULT_INFERENCE_CONCURRENCY: usize = 2;
pub const DEFAULT_BODY_CHAR_LIMIT: usize = 2000;
pub const DEFAULT_SCHEDULER_LABEL: &str = "email_ai";

/// Points at an alternative settings file.
pub const SETTINGS_ENV: &str = "EMAIL_AI_CONFIG";

const ENV_SUFFIXES: [&str; 6] = [
    "EMAIL_USER",
    "EMAIL_PASS",
    "IMAP_SERVER",
    "IMAP_PORT",
    "SMTP_SERVER",
    "SMTP_PORT",
];

/// One mailbox to process: a display name plus the prefix of its
/// environment variables (`<PREFIX>_EMAIL_USER`, ...).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccountSpec {
    pub name: String,
    pub env_prefix: String,
}

impl AccountSpec {
    pub fn new(name: impl Into<String>, env_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_prefix: env_prefix.into(),
        }
    }

    pub fn var(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }
}

pub fn default_accounts() -> Vec<AccountSpec> {
    vec![
        AccountSpec::new("CarlGaul", "CARLGAUL"),
        AccountSpec::new("Carl", "CARL"),
        AccountSpec::new("Contact", "CONTACT"),
        AccountSpec::new("Admin", "ADMIN"),
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LegalSettings {
    pub phrases: Option<Vec<String>>,
    pub accounts: Option<Vec<String>>,
}

/// Non-secret knobs read from `config.toml`. Every field is optional.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub lookback_days: Option<u32>,
    pub fetch_workers: Option<usize>,
    pub inference_concurrency: Option<usize>,
    pub body_char_limit: Option<usize>,
    pub cache_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub scheduler_label: Option<String>,
    pub legal: LegalSettings,
    pub accounts: Option<Vec<AccountSpec>>,
}

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("email_ai"))
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("email_ai")
}

/// `$EMAIL_AI_CONFIG` if set, else `<config_dir>/email_ai/config.toml`.
/// The flag says whether the path was named explicitly.
pub fn settings_path() -> Option<(PathBuf, bool)> {
    select_settings_path(std::env::var(SETTINGS_ENV).ok(), config_dir())
}

fn select_settings_path(explicit: Option<String>, default_dir: Option<PathBuf>) -> Option<(PathBuf, bool)> {
    if let Some(p) = explicit.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) {
        return Some((PathBuf::from(p), true));
    }
    default_dir.map(|d| (d.join("config.toml"), false))
}

impl Settings {
    /// Load the settings file. A missing default file means defaults; a
    /// missing file named by `$EMAIL_AI_CONFIG` is an error.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_selected(settings_path())
    }

    fn load_selected(selected: Option<(PathBuf, bool)>) -> Result<Self, ConfigError> {
        match selected {
            Some((path, explicit)) if explicit || path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn accounts(&self) -> Vec<AccountSpec> {
        self.accounts.clone().unwrap_or_else(default_accounts)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| data_dir().join("cache").join("emails.json"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| data_dir().join("logs"))
    }

    pub fn scheduler_label(&self) -> String {
        self.scheduler_label
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEDULER_LABEL.to_string())
    }

    pub fn legal_flagger(&self) -> LegalFlagger {
        let phrases = self
            .legal
            .phrases
            .clone()
            .unwrap_or_else(|| DEFAULT_FLAG_PHRASES.iter().map(|s| s.to_string()).collect());
        let accounts = self
            .legal
            .accounts
            .clone()
            .unwrap_or_else(|| DEFAULT_FLAG_ACCOUNTS.iter().map(|s| s.to_string()).collect());
        LegalFlagger::new(phrases, accounts)
    }
}

/// Every per-account variable the monitor expects to find set.
pub fn required_env_vars(accounts: &[AccountSpec]) -> Vec<String> {
    accounts
        .iter()
        .flat_map(|a| ENV_SUFFIXES.iter().map(move |s| a.var(s)))
        .collect()
}

/// Resolved mailbox credentials and endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    pub email_user: String,
    pub email_pass: String,
    pub imap_server: String,
    pub imap_port: u16,
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Where this account's copy of the digest goes.
    pub report_to: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("email_user", &self.email_user)
            .field("email_pass", &"<redacted>")
            .field("imap_server", &self.imap_server)
            .field("imap_port", &self.imap_port)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("report_to", &self.report_to)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub accounts: Vec<AccountConfig>,
    pub ollama_url: String,
    pub model: String,
    pub lookback_days: u32,
    pub fetch_workers: usize,
    pub inference_concurrency: usize,
    pub body_char_limit: usize,
    pub cache_path: Option<PathBuf>,
    pub legal: LegalFlagger,
    pub imap_retry: RetryPolicy,
    pub inference_retry: RetryPolicy,
    pub smtp_retry: RetryPolicy,
}

impl AppConfig {
    /// Build from the process environment.
    pub fn from_env(settings: &Settings) -> Result<Self, ConfigError> {
        Self::from_lookup(settings, |k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source. All missing variables are
    /// reported at once.
    pub fn from_lookup<F>(settings: &Settings, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut accounts = Vec::new();
        for spec in settings.accounts() {
            let user = get(&spec.var("EMAIL_USER"));
            let pass = get(&spec.var("EMAIL_PASS"));
            let (Some(email_user), Some(email_pass)) = (user.clone(), pass.clone()) else {
                if user.is_none() {
                    missing.push(spec.var("EMAIL_USER"));
                }
                if pass.is_none() {
                    missing.push(spec.var("EMAIL_PASS"));
                }
                continue;
            };

            let port = |suffix: &str, default: u16| -> Result<u16, ConfigError> {
                let var = spec.var(suffix);
                match get(&var) {
                    None => Ok(default),
                    Some(value) => value
                        .parse()
                        .map_err(|_| ConfigError::InvalidPort { var, value }),
                }
            };

            accounts.push(AccountConfig {
                name: spec.name.clone(),
                imap_server: get(&spec.var("IMAP_SERVER"))
                    .unwrap_or_else(|| DEFAULT_MAIL_HOST.to_string()),
                imap_port: port("IMAP_PORT", DEFAULT_IMAP_PORT)?,
                smtp_server: get(&spec.var("SMTP_SERVER"))
                    .unwrap_or_else(|| DEFAULT_MAIL_HOST.to_string()),
                smtp_port: port("SMTP_PORT", DEFAULT_SMTP_PORT)?,
                report_to: get(&spec.var("REPORT_TO")).unwrap_or_else(|| email_user.clone()),
                email_user,
                email_pass,
            });
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }

        let positive = |key: &'static str, v: Option<usize>, default: usize| match v {
            Some(0) => Err(ConfigError::Invalid {
                key,
                reason: "must be at least 1".to_string(),
            }),
            Some(n) => Ok(n),
            None => Ok(default),
        };

        let ollama_url = settings.ollama_url();
        if let Err(e) = Url::parse(&ollama_url) {
            return Err(ConfigError::Invalid {
                key: "ollama_url",
                reason: format!("{ollama_url:?} is not a URL: {e}"),
            });
        }

        Ok(Self {
            accounts,
            ollama_url,
            model: settings.model(),
            lookback_days: settings.lookback_days.unwrap_or(1),
            fetch_workers: positive("fetch_workers", settings.fetch_workers, DEFAULT_FETCH_WORKERS)?,
            inference_concurrency: positive(
                "inference_concurrency",
                settings.inference_concurrency,
                DEFAULT_INFERENCE_CONCURRENCY,
            )?,
            body_char_limit: settings.body_char_limit.unwrap_or(DEFAULT_BODY_CHAR_LIMIT),
            cache_path: Some(settings.cache_path()),
            legal: settings.legal_flagger(),
            imap_retry: RetryPolicy::IMAP,
            inference_retry: RetryPolicy::INFERENCE,
            smtp_retry: RetryPolicy::SMTP,
        })
    }
}
