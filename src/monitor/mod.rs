pub mod system;

use chrono::{DateTime, Local};
use log::{info, warn};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::cache::load_cache;
use crate::config::{Settings, required_env_vars};
use crate::inference::OllamaClient;
use crate::logging::log_file;

/// Below this much free space the disk check fails.
pub const MIN_FREE_KIB: u64 = 100 * 1024;

const LOG_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub checked_at: DateTime<Local>,
    pub checks: Vec<CheckResult>,
    /// Messages in the last run's cache, if one exists. Informational.
    pub cached_messages: Option<usize>,
    /// Informational; not counted as a check.
    pub log_tail: Vec<String>,
}

impl HealthReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.checks.len()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Email AI System Monitor\n");
        let _ = writeln!(out, "Time: {}\n", self.checked_at.format("%Y-%m-%d %H:%M:%S"));
        for c in &self.checks {
            let mark = if c.passed { "OK  " } else { "FAIL" };
            let _ = writeln!(out, "[{mark}] {}: {}", c.name, c.detail);
        }
        let _ = writeln!(out, "\nOverall: {}/{} checks passed", self.passed(), self.checks.len());
        if let Some(n) = self.cached_messages {
            let _ = writeln!(out, "Last run cached {n} message(s)");
        }
        if !self.log_tail.is_empty() {
            out.push_str("\nRecent log:\n");
            for line in &self.log_tail {
                let _ = writeln!(out, "  {line}");
            }
        }
        out
    }
}

pub fn check_environment<F>(settings: &Settings, lookup: F) -> CheckResult
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<String> = required_env_vars(&settings.accounts())
        .into_iter()
        .filter(|k| lookup(k.as_str()).is_none_or(|v| v.trim().is_empty()))
        .collect();
    if missing.is_empty() {
        CheckResult::pass("Environment", "all variables are set")
    } else {
        CheckResult::fail("Environment", format!("missing: {}", missing.join(", ")))
    }
}

pub fn check_model_server(client: &OllamaClient) -> CheckResult {
    match client.check_model() {
        Ok(true) => CheckResult::pass("Model server", format!("{} is available", client.model())),
        Ok(false) => CheckResult::fail(
            "Model server",
            format!(
                "{m} not found; pull with: ollama pull {m}",
                m = client.model()
            ),
        ),
        Err(e) => CheckResult::fail("Model server", format!("not reachable ({e}); start with: ollama serve")),
    }
}

pub fn check_scheduler(listing: anyhow::Result<String>, label: &str) -> CheckResult {
    match listing {
        Ok(listing) => match system::scheduled_entries(&listing, label).first() {
            Some(entry) => CheckResult::pass("Scheduler", format!("registered: {entry}")),
            None => CheckResult::fail("Scheduler", format!("no job mentioning {label:?} is registered")),
        },
        Err(e) => CheckResult::fail("Scheduler", format!("cannot read job table: {e}")),
    }
}

pub fn check_disk_space(available_kib: anyhow::Result<u64>, path: &Path) -> CheckResult {
    match available_kib {
        Ok(kib) if kib >= MIN_FREE_KIB => CheckResult::pass(
            "Disk space",
            format!("{} MiB free at {}", kib / 1024, path.display()),
        ),
        Ok(kib) => CheckResult::fail(
            "Disk space",
            format!("only {} MiB free at {}", kib / 1024, path.display()),
        ),
        Err(e) => CheckResult::fail("Disk space", format!("cannot determine free space: {e}")),
    }
}

/// `None` when there is no cache yet or it can't be read.
pub fn cached_message_count(path: &Path) -> Option<usize> {
    match load_cache(path) {
        Ok(cache) => cache.map(|c| c.values().map(Vec::len).sum()),
        Err(e) => {
            warn!("cannot read cache {}: {e:#}", path.display());
            None
        }
    }
}

/// Read-only health checks. Needs no credentials, only the settings.
pub fn run_checks<F>(settings: &Settings, lookup: F) -> HealthReport
where
    F: Fn(&str) -> Option<String>,
{
    let mut checks = vec![check_environment(settings, &lookup)];

    checks.push(match OllamaClient::new(&settings.ollama_url(), settings.model()) {
        Ok(client) => check_model_server(&client),
        Err(e) => CheckResult::fail("Model server", format!("{e:#}")),
    });

    let label = settings.scheduler_label();
    checks.push(check_scheduler(system::scheduler_listing(), &label));

    let cache_dir: PathBuf = settings
        .cache_path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    checks.push(check_disk_space(system::available_kib(&cache_dir), &cache_dir));

    let cached_messages = cached_message_count(&settings.cache_path());
    let log_tail = system::tail_lines(&log_file(&settings.log_dir()), LOG_TAIL_LINES).unwrap_or_default();

    let report = HealthReport {
        checked_at: Local::now(),
        checks,
        cached_messages,
        log_tail,
    };
    info!("monitor: {}/{} checks passed", report.passed(), report.checks.len());
    report
}
