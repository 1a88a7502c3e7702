use std::fmt::Write as _;

use crate::domain::email::{AccountOutcome, Priority, ProcessingResult};

pub const REPORT_SUBJECT: &str = "Daily Email AI Report";

const SEPARATOR: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSection {
    pub account: String,
    pub outcome: AccountOutcome,
}

impl AccountSection {
    pub fn results(&self) -> &[ProcessingResult] {
        match &self.outcome {
            AccountOutcome::Fetched(r) => r,
            AccountOutcome::Failed(_) => &[],
        }
    }
}

/// The daily report, one section per configured account in config order.
#[derive(Debug, Clone)]
pub struct Digest {
    pub sections: Vec<AccountSection>,
    pub lookback_days: u32,
}

impl Digest {
    pub fn new(sections: Vec<AccountSection>, lookback_days: u32) -> Self {
        Self {
            sections,
            lookback_days,
        }
    }

    pub fn message_count(&self) -> usize {
        self.sections.iter().map(|s| s.results().len()).sum()
    }

    pub fn count_with_priority(&self, priority: Priority) -> usize {
        self.sections
            .iter()
            .flat_map(|s| s.results())
            .filter(|r| r.priority == priority)
            .count()
    }

    fn window(&self) -> String {
        match self.lookback_days {
            0 | 1 => "the last 24 hours".to_string(),
            n => format!("the last {n} days"),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("{REPORT_SUBJECT}\n\n");

        for section in &self.sections {
            match &section.outcome {
                AccountOutcome::Failed(reason) => {
                    let _ = writeln!(out, "Account: {}", section.account);
                    let _ = write!(out, "{reason}\n\n{SEPARATOR}\n\n");
                }
                AccountOutcome::Fetched(results) if results.is_empty() => {
                    let _ = writeln!(out, "Account: {} (0 messages)", section.account);
                    let _ = write!(
                        out,
                        "No new emails in {}.\n\n{SEPARATOR}\n\n",
                        self.window()
                    );
                }
                AccountOutcome::Fetched(results) => {
                    let noun = if results.len() == 1 { "message" } else { "messages" };
                    let _ = writeln!(out, "Account: {} ({} {noun})", section.account, results.len());
                    for r in results {
                        render_result(&mut out, r);
                    }
                }
            }
        }

        if self.message_count() == 0 {
            out.push_str("No new emails across all accounts.\n");
        }
        out
    }
}

fn render_result(out: &mut String, r: &ProcessingResult) {
    let _ = writeln!(out, "From: {}", r.message.sender);
    let _ = writeln!(out, "Subject: {}", r.message.subject);
    let _ = writeln!(out, "Priority: {}", r.priority);
    let _ = writeln!(out, "Summary: {}", r.summary);
    if let Some(flag) = &r.flag {
        let _ = writeln!(out, "{flag}");
    }
    if let Some(draft) = &r.draft {
        let _ = writeln!(out, "Suggested Draft:\n{draft}");
    }
    let _ = write!(out, "\n{SEPARATOR}\n\n");
}
