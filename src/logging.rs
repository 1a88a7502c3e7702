use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOG_FILE_NAME: &str = "email_ai.log";

pub fn log_file(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// Route `log` output to `<log_dir>/email_ai.log`, or stderr if the file
/// can't be opened. `RUST_LOG` overrides the default `info` filter.
/// Returns the file in use, if any.
pub fn init(log_dir: Option<&Path>) -> Option<PathBuf> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    let mut in_use = None;
    if let Some(dir) = log_dir {
        let path = log_file(dir);
        let opened = fs::create_dir_all(dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
        match opened {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
                in_use = Some(path);
            }
            Err(e) => eprintln!("email_ai: cannot open log file {}: {e}; logging to stderr", path.display()),
        }
    }

    // a second init (tests, embedding) keeps the first logger
    let _ = builder.try_init();
    in_use
}
