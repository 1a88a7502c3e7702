use anyhow::anyhow;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use crate::config::AccountConfig;
use crate::mail::{NETWORK_TIMEOUT, TlsMode, is_loopback};
use crate::retry::Failure;

/// Delivers the digest on behalf of one account.
pub trait ReportSender: Send + Sync {
    fn send(&self, account: &AccountConfig, subject: &str, body: &str) -> Result<(), Failure>;
}

#[derive(Debug, Default)]
pub struct SmtpSender;

impl SmtpSender {
    pub fn new() -> Self {
        Self
    }

    fn transport(account: &AccountConfig) -> Result<SmtpTransport, Failure> {
        let relaxed = is_loopback(&account.smtp_server);
        let params = TlsParameters::builder(account.smtp_server.clone())
            .dangerous_accept_invalid_certs(relaxed)
            .dangerous_accept_invalid_hostnames(relaxed)
            .build()
            .map_err(|e| Failure::fatal(anyhow!("smtp tls parameters failed: {e}")))?;
        let tls = match TlsMode::for_smtp_port(account.smtp_port) {
            TlsMode::Implicit => Tls::Wrapper(params),
            TlsMode::StartTls => Tls::Required(params),
        };

        Ok(SmtpTransport::builder_dangerous(account.smtp_server.as_str())
            .port(account.smtp_port)
            .tls(tls)
            .timeout(Some(NETWORK_TIMEOUT))
            .credentials(Credentials::new(
                account.email_user.clone(),
                account.email_pass.clone(),
            ))
            .build())
    }
}

pub fn build_message(account: &AccountConfig, subject: &str, body: &str) -> Result<Message, Failure> {
    let from: Mailbox = account
        .email_user
        .parse()
        .map_err(|e| Failure::fatal(anyhow!("smtp from address {:?} is invalid: {e}", account.email_user)))?;
    let to: Mailbox = account
        .report_to
        .parse()
        .map_err(|e| Failure::fatal(anyhow!("smtp to address {:?} is invalid: {e}", account.report_to)))?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| Failure::fatal(anyhow!("smtp message build failed: {e}")))
}

impl ReportSender for SmtpSender {
    fn send(&self, account: &AccountConfig, subject: &str, body: &str) -> Result<(), Failure> {
        let message = build_message(account, subject, body)?;
        let transport = Self::transport(account)?;
        transport.send(&message).map_err(|e| {
            Failure::transient(anyhow!(
                "smtp send via {}:{} failed: {e}",
                account.smtp_server,
                account.smtp_port
            ))
        })?;
        info!("{}: report sent to {}", account.name, account.report_to);
        Ok(())
    }
}
