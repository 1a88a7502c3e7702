use log::{debug, error};

use crate::domain::email::{MessageRecord, Priority, ProcessingResult};
use crate::flagger::LegalFlagger;
use crate::inference::TextGenerator;

pub const SUMMARY_TOKENS: u32 = 150;
pub const PRIORITY_TOKENS: u32 = 10;
pub const DRAFT_TOKENS: u32 = 300;

pub fn summary_prompt(body: &str) -> String {
    format!("Summarize this email concisely in 2-3 sentences: {body}")
}

pub fn priority_prompt(body: &str) -> String {
    format!(
        "Classify the priority of this email as 'high', 'medium', or 'low' based on urgency, \
         importance, and content. Respond only with the priority level. Email: {body}"
    )
}

pub fn draft_prompt(body: &str) -> String {
    format!("Draft a polite, professional response to this email, keeping it brief: {body}")
}

/// Runs the three model passes and the flagger over one message.
pub struct Processor<'a> {
    generator: &'a dyn TextGenerator,
    flagger: &'a LegalFlagger,
    body_char_limit: usize,
}

impl<'a> Processor<'a> {
    pub fn new(generator: &'a dyn TextGenerator, flagger: &'a LegalFlagger, body_char_limit: usize) -> Self {
        Self {
            generator,
            flagger,
            body_char_limit,
        }
    }

    /// Always yields a result; a failed model call degrades to a placeholder.
    pub fn process_message(&self, message: MessageRecord) -> ProcessingResult {
        let body: String = message.body.chars().take(self.body_char_limit).collect();
        let who = format!("{}: {:?}", message.account, message.subject);

        let summary = match self.generator.generate(&summary_prompt(&body), SUMMARY_TOKENS) {
            Ok(s) if !s.is_empty() => s,
            Ok(_) => "(summary unavailable: empty model reply)".to_string(),
            Err(e) => {
                error!("{who}: summary failed: {e:#}");
                format!("(summary unavailable: {e})")
            }
        };

        let priority = match self.generator.generate(&priority_prompt(&body), PRIORITY_TOKENS) {
            Ok(reply) => Priority::from_reply(&reply),
            Err(e) => {
                error!("{who}: priority classification failed: {e:#}");
                Priority::Unknown
            }
        };

        let draft = if priority.wants_draft() {
            match self.generator.generate(&draft_prompt(&body), DRAFT_TOKENS) {
                Ok(d) if !d.is_empty() => Some(d),
                Ok(_) => None,
                Err(e) => {
                    error!("{who}: draft failed: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        let text = format!("{}\n{}", message.subject, message.body);
        let flag = self.flagger.flag(&message.account, &text);
        debug!("{who}: priority {priority}, flagged: {}", flag.is_some());

        ProcessingResult {
            message,
            summary,
            priority,
            draft,
            flag,
        }
    }
}
