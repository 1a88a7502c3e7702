use anyhow::anyhow;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use email_ai::app::{exit_code_for, exit_code_for_summary, run_cycle};
use email_ai::config::{AccountConfig, AppConfig, Settings};
use email_ai::domain::email::{MessageRecord, Priority};
use email_ai::error::{CONFIG_EXIT_CODE, ConfigError};
use email_ai::inference::OllamaClient;
use email_ai::mail::decoders::parse_message;
use email_ai::mail::imap_client::MailFetcher;
use email_ai::mail::smtp::ReportSender;
use email_ai::pipeline::Pipeline;
use email_ai::report::REPORT_SUBJECT;
use email_ai::retry::{Failure, RetryPolicy};

struct CannedMailbox {
    raw: HashMap<String, Vec<&'static [u8]>>,
    calls: AtomicUsize,
}

impl MailFetcher for CannedMailbox {
    fn fetch_since(&self, account: &AccountConfig, _since: NaiveDate) -> Result<Vec<MessageRecord>, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .raw
            .get(&account.name)
            .map(|msgs| msgs.iter().map(|m| parse_message(&account.name, m)).collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl ReportSender for Outbox {
    fn send(&self, account: &AccountConfig, subject: &str, body: &str) -> Result<(), Failure> {
        if account.report_to.is_empty() {
            return Err(Failure::fatal(anyhow!("no recipient")));
        }
        assert_eq!(subject, REPORT_SUBJECT);
        self.sent
            .lock()
            .unwrap()
            .push((account.report_to.clone(), body.to_string()));
        Ok(())
    }
}

struct DeadRelay;

impl ReportSender for DeadRelay {
    fn send(&self, _account: &AccountConfig, _subject: &str, _body: &str) -> Result<(), Failure> {
        Err(Failure::fatal(anyhow!("relay rejected credentials")))
    }
}

fn env() -> HashMap<String, String> {
    let mut env = HashMap::new();
    for prefix in ["CARLGAUL", "CARL", "CONTACT", "ADMIN"] {
        env.insert(format!("{prefix}_EMAIL_USER"), format!("{}@example.org", prefix.to_lowercase()));
        env.insert(format!("{prefix}_EMAIL_PASS"), "bridge".to_string());
    }
    env
}

fn config_for(settings: &Settings) -> AppConfig {
    let env = env();
    let mut cfg = AppConfig::from_lookup(settings, |k| env.get(k).cloned()).unwrap();
    cfg.cache_path = None;
    cfg.imap_retry = RetryPolicy::immediate(3);
    cfg.smtp_retry = RetryPolicy::immediate(3);
    cfg
}

const COMPLAINT: &[u8] = b"From: Jane Roe <jane@example.org>\r\n\
Subject: Workplace issue\r\n\
Date: Tue, 13 Oct 2026 18:00:00 +0000\r\n\
\r\n\
I believe I faced pregnancy discrimination when my contract was ended.\r\n";

const PROMO: &[u8] = b"From: deals@shop.example\r\n\
Subject: Weekend sale\r\n\
\r\n\
Everything 20% off.\r\n";

#[test]
fn full_cycle_against_stubbed_model() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::Regex("Summarize".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"Sender reports an issue."}"#)
        .expect(2)
        .create();
    server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::Regex("Classify".into()),
            mockito::Matcher::Regex("pregnancy".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"high"}"#)
        .create();
    server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::Regex("Classify".into()),
            mockito::Matcher::Regex("20% off".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"Low"}"#)
        .create();
    server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::Regex("Draft a polite".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"Thank you for reaching out."}"#)
        .expect(1)
        .create();

    let settings = Settings {
        ollama_url: Some(server.url()),
        ..Settings::default()
    };
    let cfg = config_for(&settings);
    let model = OllamaClient::new(&cfg.ollama_url, cfg.model.clone())
        .unwrap()
        .with_retry(RetryPolicy::immediate(2));

    let mut raw = HashMap::new();
    raw.insert("Contact".to_string(), vec![COMPLAINT]);
    raw.insert("CarlGaul".to_string(), vec![PROMO]);
    let mailbox = CannedMailbox {
        raw,
        calls: AtomicUsize::new(0),
    };
    let outbox = Outbox::default();

    let summary = Pipeline::new(&cfg, &mailbox, &model, &outbox)
        .run_for(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap())
        .unwrap();

    assert_eq!(summary.message_count(), 2);
    assert_eq!(summary.digest.count_with_priority(Priority::High), 1);
    assert_eq!(summary.digest.count_with_priority(Priority::Low), 1);

    let report = &summary.report;
    assert!(report.contains("Account: CarlGaul (1 message)"));
    assert!(report.contains("Subject: Weekend sale\nPriority: Low\nSummary: Sender reports an issue.\n"));
    assert!(report.contains("Account: Contact (1 message)"));
    assert!(report.contains("LegalAI Flag: Potential pregnancy discrimination case"));
    assert!(report.contains("Suggested Draft:\nThank you for reaching out."));
    assert!(report.contains("Account: Carl (0 messages)"));
    assert!(!report.contains("across all accounts"));

    assert_eq!(mailbox.calls.load(Ordering::SeqCst), 4);
    let sent = outbox.sent.lock().unwrap();
    let recipients: Vec<_> = sent.iter().map(|(to, _)| to.as_str()).collect();
    assert_eq!(
        recipients,
        vec![
            "carlgaul@example.org",
            "carl@example.org",
            "contact@example.org",
            "admin@example.org"
        ]
    );
}

#[test]
fn model_outage_still_reports_every_message() {
    let settings = Settings {
        ollama_url: Some("http://127.0.0.1:9".to_string()),
        ..Settings::default()
    };
    let cfg = config_for(&settings);
    let model = OllamaClient::new(&cfg.ollama_url, cfg.model.clone())
        .unwrap()
        .with_retry(RetryPolicy::immediate(2));

    let mut raw = HashMap::new();
    raw.insert("Admin".to_string(), vec![PROMO, COMPLAINT]);
    let mailbox = CannedMailbox {
        raw,
        calls: AtomicUsize::new(0),
    };
    let outbox = Outbox::default();

    let summary = Pipeline::new(&cfg, &mailbox, &model, &outbox)
        .run_for(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap())
        .unwrap();

    let admin = summary
        .digest
        .sections
        .iter()
        .find(|s| s.account == "Admin")
        .unwrap()
        .results();
    assert_eq!(admin.len(), 2);
    assert!(admin.iter().all(|r| r.summary.starts_with("(summary unavailable:")));
    assert!(admin.iter().all(|r| r.priority == Priority::Unknown && r.draft.is_none()));
    // The keyword flag doesn't depend on the model.
    assert!(admin[1].flag.is_some());
    assert_eq!(outbox.sent.lock().unwrap().len(), 4);
}

#[test]
fn missing_credentials_abort_before_any_fetch() {
    let mut env = env();
    env.remove("ADMIN_EMAIL_PASS");
    let mailbox = CannedMailbox {
        raw: HashMap::new(),
        calls: AtomicUsize::new(0),
    };
    let outbox = Outbox::default();

    let err = run_cycle(&Settings::default(), |k| env.get(k).cloned(), &mailbox, &outbox).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::MissingVars(v)) if v == &["ADMIN_EMAIL_PASS"]
    ));
    assert_eq!(exit_code_for(&err), ExitCode::from(CONFIG_EXIT_CODE));
    assert_eq!(mailbox.calls.load(Ordering::SeqCst), 0);
    assert!(outbox.sent.lock().unwrap().is_empty());
}

#[test]
fn bad_model_url_aborts_with_config_code() {
    let env = env();
    let settings = Settings {
        ollama_url: Some("not a url".to_string()),
        ..Settings::default()
    };
    let mailbox = CannedMailbox {
        raw: HashMap::new(),
        calls: AtomicUsize::new(0),
    };

    let err = run_cycle(&settings, |k| env.get(k).cloned(), &mailbox, &Outbox::default()).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::from(CONFIG_EXIT_CODE));
    assert_eq!(mailbox.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn cycle_exit_code_follows_delivery() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"low"}"#)
        .create();
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        ollama_url: Some(server.url()),
        cache_path: Some(dir.path().join("emails.json")),
        ..Settings::default()
    };
    let mut raw = HashMap::new();
    raw.insert("Carl".to_string(), vec![PROMO]);
    let mailbox = CannedMailbox {
        raw,
        calls: AtomicUsize::new(0),
    };

    let env = env();
    let outbox = Outbox::default();
    let summary = run_cycle(&settings, |k| env.get(k).cloned(), &mailbox, &outbox).unwrap();
    assert_eq!(summary.message_count(), 1);
    assert_eq!(exit_code_for_summary(&summary), ExitCode::SUCCESS);
    assert!(dir.path().join("emails.json").exists());

    let summary = run_cycle(&settings, |k| env.get(k).cloned(), &mailbox, &DeadRelay).unwrap();
    assert!(summary.delivered.is_empty());
    assert_eq!(summary.undelivered.len(), 4);
    assert_eq!(exit_code_for_summary(&summary), ExitCode::FAILURE);
}
