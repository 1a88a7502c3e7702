use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One fetched message. Read-only once the fetcher hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub account: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    /// Classification failed or the model named no known label.
    Unknown,
}

impl Priority {
    /// Map a free-form model reply to a label. The first whole-word label in
    /// the reply wins, so "high - not low" reads as high.
    pub fn from_reply(reply: &str) -> Self {
        reply
            .to_lowercase()
            .split(|c: char| !c.is_alphabetic())
            .find_map(|word| match word {
                "high" => Some(Self::High),
                "medium" => Some(Self::Medium),
                "low" => Some(Self::Low),
                _ => None,
            })
            .unwrap_or(Self::Unknown)
    }

    pub fn wants_draft(self) -> bool {
        matches!(self, Self::High | Self::Medium)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
    pub message: MessageRecord,
    pub summary: String,
    pub priority: Priority,
    pub draft: Option<String>,
    pub flag: Option<String>,
}

/// What happened to one account during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Fetched(Vec<ProcessingResult>),
    /// Fetch gave up; carries the placeholder shown in the digest.
    Failed(String),
}
