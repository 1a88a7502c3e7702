use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::email::{AccountOutcome, Priority};
use crate::report::AccountSection;

/// Processed message as the dashboard reads it from `emails.json`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedEmail {
    pub from: String,
    pub subject: String,
    pub body: String,
    pub account_name: String,
    pub received: Option<DateTime<Utc>>,
    pub summary: String,
    pub priority: Priority,
    /// Empty when no draft was generated.
    pub draft: String,
    /// Empty when not flagged.
    pub legal_flag: String,
}

pub type CacheFile = BTreeMap<String, Vec<CachedEmail>>;

/// Save results keyed by account. Failed accounts are left out.
pub fn write_cache(path: &Path, sections: &[AccountSection]) -> Result<()> {
    let mut data = CacheFile::new();
    for s in sections {
        if matches!(s.outcome, AccountOutcome::Failed(_)) {
            continue;
        }
        let emails = s
            .results()
            .iter()
            .map(|r| CachedEmail {
                from: r.message.sender.clone(),
                subject: r.message.subject.clone(),
                body: r.message.body.clone(),
                account_name: r.message.account.clone(),
                received: r.message.received,
                summary: r.summary.clone(),
                priority: r.priority,
                draft: r.draft.clone().unwrap_or_default(),
                legal_flag: r.flag.clone().unwrap_or_default(),
            })
            .collect();
        data.insert(s.account.clone(), emails);
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let s = serde_json::to_string_pretty(&data)?;
    fs::write(path, s)?;
    Ok(())
}

/// Load a previously written cache, if present.
pub fn load_cache(path: &Path) -> Result<Option<CacheFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&s)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::email::{MessageRecord, ProcessingResult};

    #[test]
    fn writes_results_and_skips_failed_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emails.json");

        let sections = vec![
            AccountSection {
                account: "Contact".into(),
                outcome: AccountOutcome::Fetched(vec![ProcessingResult {
                    message: MessageRecord {
                        account: "Contact".into(),
                        sender: "jane@example.org".into(),
                        subject: "Hi".into(),
                        body: "Hello".into(),
                        received: None,
                    },
                    summary: "Greeting.".into(),
                    priority: Priority::Low,
                    draft: None,
                    flag: None,
                }]),
            },
            AccountSection {
                account: "Admin".into(),
                outcome: AccountOutcome::Failed("Error fetching emails: down".into()),
            },
            AccountSection {
                account: "Carl".into(),
                outcome: AccountOutcome::Fetched(vec![]),
            },
        ];

        write_cache(&path, &sections).unwrap();
        let loaded = load_cache(&path).unwrap().unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded["Carl"].is_empty());
        let email = &loaded["Contact"][0];
        assert_eq!(email.from, "jane@example.org");
        assert_eq!(email.priority, Priority::Low);
        assert_eq!(email.draft, "");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"priority\": \"low\""), "{raw}");
    }

    #[test]
    fn missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cache(&dir.path().join("nope.json")).unwrap().is_none());
    }
}
