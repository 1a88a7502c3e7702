use anyhow::Result;
use log::{error, info};
use std::path::Path;
use std::process::ExitCode;

use crate::config::{AppConfig, Settings};
use crate::error::{CONFIG_EXIT_CODE, ConfigError};
use crate::inference::OllamaClient;
use crate::logging;
use crate::mail::imap_client::MailFetcher;
use crate::mail::smtp::ReportSender;
use crate::pipeline::{Pipeline, RunSummary};

/// Start logging to the settings' log directory. If the settings failed to
/// load, log to `default_log_dir` and record the error there.
pub fn start_logging(
    loaded: Result<Settings, ConfigError>,
    default_log_dir: &Path,
) -> Result<Settings, ConfigError> {
    match loaded {
        Ok(settings) => {
            logging::init(Some(&settings.log_dir()));
            Ok(settings)
        }
        Err(e) => {
            logging::init(Some(default_log_dir));
            error!("configuration error: {e}");
            log::logger().flush();
            Err(e)
        }
    }
}

/// One daily cycle against the configured model server. Configuration is
/// validated before the fetcher or the model server is touched.
pub fn run_cycle<F>(
    settings: &Settings,
    lookup: F,
    fetcher: &dyn MailFetcher,
    sender: &dyn ReportSender,
) -> Result<RunSummary>
where
    F: Fn(&str) -> Option<String>,
{
    let cfg = AppConfig::from_lookup(settings, lookup)?;
    info!("loaded {} account(s), model {}", cfg.accounts.len(), cfg.model);

    let generator = OllamaClient::new(&cfg.ollama_url, cfg.model.clone())?.with_retry(cfg.inference_retry);
    let summary = Pipeline::new(&cfg, fetcher, &generator, sender).run()?;
    info!(
        "{} message(s) in digest, {} account(s) undelivered",
        summary.message_count(),
        summary.undelivered.len()
    );
    Ok(summary)
}

/// Success only if at least one account's copy went out.
pub fn exit_code_for_summary(summary: &RunSummary) -> ExitCode {
    if summary.delivered.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<ConfigError>().is_some() {
        ExitCode::from(CONFIG_EXIT_CODE)
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn config_errors_map_to_their_own_code() {
        let cfg: anyhow::Error = ConfigError::MissingVars(vec!["CARL_EMAIL_PASS".into()]).into();
        assert_eq!(exit_code_for(&cfg), ExitCode::from(CONFIG_EXIT_CODE));

        let wrapped = anyhow::Error::from(ConfigError::MissingVars(vec![])).context("startup");
        assert_eq!(exit_code_for(&wrapped), ExitCode::from(CONFIG_EXIT_CODE));

        assert_eq!(exit_code_for(&anyhow!("smtp down")), ExitCode::FAILURE);
    }
}
