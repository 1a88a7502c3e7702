pub mod processor;

use anyhow::{Result, anyhow};
use chrono::{Days, Local, NaiveDate};
use log::{error, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::cache::write_cache;
use crate::config::{AccountConfig, AppConfig};
use crate::domain::email::{AccountOutcome, MessageRecord, Priority};
use crate::inference::TextGenerator;
use crate::mail::imap_client::MailFetcher;
use crate::mail::smtp::ReportSender;
use crate::report::{AccountSection, Digest, REPORT_SUBJECT};
use crate::retry::retry;

use processor::Processor;

/// Apply `f` to every item on at most `workers` scoped threads. Output order
/// matches input order; every item is handled exactly once.
pub fn run_bounded<T, R, F>(items: &[T], workers: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.max(1).min(items.len());
    if workers <= 1 {
        return Ok(items.iter().map(&f).collect());
    }

    let next = AtomicUsize::new(0);
    let (next, f) = (&next, &f);
    let mut indexed: Vec<(usize, R)> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(move |_| {
                s.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        let Some(item) = items.get(i) else { break };
                        done.push((i, f(item)));
                    }
                    done
                })
            })
            .collect();

        let mut all = Vec::with_capacity(items.len());
        for h in handles {
            all.extend(h.join().map_err(|_| anyhow!("worker thread panicked"))?);
        }
        Ok::<_, anyhow::Error>(all)
    })?;

    indexed.sort_unstable_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, r)| r).collect())
}

/// Outcome of one full cycle.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub digest: Digest,
    pub report: String,
    /// Accounts whose copy of the digest went out.
    pub delivered: Vec<String>,
    /// Accounts whose copy failed, with the reason.
    pub undelivered: Vec<(String, String)>,
}

impl RunSummary {
    pub fn message_count(&self) -> usize {
        self.digest.message_count()
    }
}

/// fetch → process → assemble → cache → send.
pub struct Pipeline<'a> {
    config: &'a AppConfig,
    fetcher: &'a dyn MailFetcher,
    generator: &'a dyn TextGenerator,
    sender: &'a dyn ReportSender,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        fetcher: &'a dyn MailFetcher,
        generator: &'a dyn TextGenerator,
        sender: &'a dyn ReportSender,
    ) -> Self {
        Self {
            config,
            fetcher,
            generator,
            sender,
        }
    }

    /// First day of the lookback window.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.config.lookback_days)))
            .unwrap_or(today)
    }

    fn fetch_account(&self, account: &AccountConfig, since: NaiveDate) -> Result<Vec<MessageRecord>> {
        let what = format!("{}: IMAP fetch", account.name);
        retry(self.config.imap_retry, &what, |_| self.fetcher.fetch_since(account, since))
    }

    /// Fetch every account on the bounded pool. Config order is preserved.
    pub fn fetch_all(&self, since: NaiveDate) -> Result<Vec<(String, Result<Vec<MessageRecord>>)>> {
        run_bounded(&self.config.accounts, self.config.fetch_workers, |account| {
            let fetched = self.fetch_account(account, since);
            if let Err(e) = &fetched {
                error!("{}: skipping account: {e:#}", account.name);
            }
            (account.name.clone(), fetched)
        })
    }

    /// Process fetched messages with capped model concurrency and regroup
    /// them per account.
    pub fn process_all(&self, fetched: Vec<(String, Result<Vec<MessageRecord>>)>) -> Result<Vec<AccountSection>> {
        let processor = Processor::new(self.generator, &self.config.legal, self.config.body_char_limit);

        let mut jobs = Vec::new();
        let mut layout = Vec::with_capacity(fetched.len());
        for (account, result) in fetched {
            match result {
                Ok(messages) => {
                    layout.push((account, Ok(messages.len())));
                    jobs.extend(messages);
                }
                Err(e) => layout.push((account, Err(format!("Error fetching emails: {e:#}")))),
            }
        }
        info!("processing {} message(s)", jobs.len());

        let mut results =
            run_bounded(&jobs, self.config.inference_concurrency, |m| processor.process_message(m.clone()))?
                .into_iter();

        Ok(layout
            .into_iter()
            .map(|(account, slot)| {
                let outcome = match slot {
                    Ok(n) => AccountOutcome::Fetched(results.by_ref().take(n).collect()),
                    Err(reason) => AccountOutcome::Failed(reason),
                };
                AccountSection { account, outcome }
            })
            .collect())
    }

    fn send_all(&self, report: &str) -> (Vec<String>, Vec<(String, String)>) {
        let mut delivered = Vec::new();
        let mut undelivered = Vec::new();
        for account in &self.config.accounts {
            let what = format!("{}: SMTP send", account.name);
            match retry(self.config.smtp_retry, &what, |_| {
                self.sender.send(account, REPORT_SUBJECT, report)
            }) {
                Ok(()) => delivered.push(account.name.clone()),
                Err(e) => {
                    error!("{}: report not sent: {e:#}", account.name);
                    undelivered.push((account.name.clone(), format!("{e:#}")));
                }
            }
        }
        (delivered, undelivered)
    }

    pub fn run(&self) -> Result<RunSummary> {
        self.run_for(Local::now().date_naive())
    }

    pub fn run_for(&self, today: NaiveDate) -> Result<RunSummary> {
        let since = self.cutoff(today);
        info!(
            "starting run for {} account(s), messages since {since}",
            self.config.accounts.len()
        );

        let fetched = self.fetch_all(since)?;
        let sections = self.process_all(fetched)?;
        let digest = Digest::new(sections, self.config.lookback_days);
        let report = digest.render();

        if let Some(path) = &self.config.cache_path {
            match write_cache(path, &digest.sections) {
                Ok(()) => info!("cache written to {}", path.display()),
                Err(e) => warn!("cache write to {} failed: {e:#}", path.display()),
            }
        }

        let (delivered, undelivered) = self.send_all(&report);
        info!(
            "run finished: {} message(s) ({} high, {} medium, {} low, {} unranked), report delivered for {}/{} account(s)",
            digest.message_count(),
            digest.count_with_priority(Priority::High),
            digest.count_with_priority(Priority::Medium),
            digest.count_with_priority(Priority::Low),
            digest.count_with_priority(Priority::Unknown),
            delivered.len(),
            self.config.accounts.len()
        );

        Ok(RunSummary {
            digest,
            report,
            delivered,
            undelivered,
        })
    }
}
