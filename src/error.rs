use std::path::PathBuf;

/// Exit status used when the run aborts on a configuration problem.
pub const CONFIG_EXIT_CODE: u8 = 2;

/// Fatal configuration problems. Everything else in the crate is carried as
/// `anyhow::Error`; this type exists so `main` can pick the exit code.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),

    #[error("invalid value {value:?} for {var}: expected a port number")]
    InvalidPort { var: String, value: String },

    #[error("failed to read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed settings file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
