pub const DEFAULT_FLAG_PHRASES: [&str; 1] = ["pregnancy discrimination"];

/// The organisation's mailboxes; the personal account is not screened.
pub const DEFAULT_FLAG_ACCOUNTS: [&str; 3] = ["Carl", "Contact", "Admin"];

/// Literal, case-insensitive phrase detector for legal-review flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalFlagger {
    phrases: Vec<String>,
    accounts: Vec<String>,
}

impl LegalFlagger {
    /// An empty `accounts` list screens every account.
    pub fn new(phrases: Vec<String>, accounts: Vec<String>) -> Self {
        let phrases = phrases
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases, accounts }
    }

    pub fn applies_to(&self, account: &str) -> bool {
        self.accounts.is_empty() || self.accounts.iter().any(|a| a.eq_ignore_ascii_case(account))
    }

    /// First matching phrase, if the account is in scope.
    pub fn matched_phrase(&self, account: &str, text: &str) -> Option<&str> {
        if !self.applies_to(account) {
            return None;
        }
        let haystack = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| haystack.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn flag(&self, account: &str, text: &str) -> Option<String> {
        self.matched_phrase(account, text)
            .map(|p| format!("LegalAI Flag: Potential {p} case - Review with LegalAI system."))
    }
}

impl Default for LegalFlagger {
    fn default() -> Self {
        Self::new(
            DEFAULT_FLAG_PHRASES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_FLAG_ACCOUNTS.iter().map(|s| s.to_string()).collect(),
        )
    }
}
