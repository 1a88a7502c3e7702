use anyhow::anyhow;
use chrono::NaiveDate;
use log::{debug, info, warn};
use native_tls::{TlsConnector, TlsStream};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::AccountConfig;
use crate::domain::email::MessageRecord;
use crate::mail::decoders::{decode_mime_words, decode_subject, parse_message};
use crate::mail::{NETWORK_TIMEOUT, TlsMode, is_loopback};
use crate::retry::Failure;

/// Source of messages for one account.
pub trait MailFetcher: Send + Sync {
    /// Every `INBOX` message received on or after `since`.
    fn fetch_since(
        &self,
        account: &AccountConfig,
        since: NaiveDate,
    ) -> Result<Vec<MessageRecord>, Failure>;
}

/// IMAP `SEARCH` date, e.g. `13-Oct-2026`.
pub fn imap_since_query(since: NaiveDate) -> String {
    format!("SINCE {}", since.format("%d-%b-%Y"))
}

/// Password-authenticated IMAP over TLS or STARTTLS.
#[derive(Debug, Clone)]
pub struct ImapFetcher {
    timeout: Duration,
}

impl Default for ImapFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ImapFetcher {
    pub fn new() -> Self {
        Self::with_timeout(NETWORK_TIMEOUT)
    }

    /// Bounds the connect and every socket read/write.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn tls_for(host: &str) -> Result<TlsConnector, Failure> {
        let relaxed = is_loopback(host);
        TlsConnector::builder()
            .danger_accept_invalid_certs(relaxed)
            .danger_accept_invalid_hostnames(relaxed)
            .build()
            .map_err(|e| Failure::fatal(anyhow!("imap tls builder failed: {e}")))
    }

    fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream, Failure> {
        let connect_err = |e: std::io::Error| Failure::transient(anyhow!("imap connect to {host}:{port} failed: {e}"));
        let addrs = (host, port).to_socket_addrs().map_err(connect_err)?;

        let mut last = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    let timeout_err = |e: std::io::Error| Failure::transient(anyhow!("imap socket timeout setup failed: {e}"));
                    stream.set_read_timeout(Some(self.timeout)).map_err(timeout_err)?;
                    stream.set_write_timeout(Some(self.timeout)).map_err(timeout_err)?;
                    return Ok(stream);
                }
                Err(e) => last = Some(e),
            }
        }
        Err(match last {
            Some(e) => connect_err(e),
            None => Failure::transient(anyhow!("imap connect to {host}:{port} failed: no address")),
        })
    }

    fn open_plain(&self, host: &str, port: u16) -> Result<imap::Client<TcpStream>, Failure> {
        let mut client = imap::Client::new(self.connect_tcp(host, port)?);
        client
            .read_greeting()
            .map_err(|e| Failure::transient(anyhow!("imap greeting failed: {e}")))?;
        Ok(client)
    }

    fn open_tls(
        &self,
        host: &str,
        port: u16,
        tls: &TlsConnector,
    ) -> Result<imap::Client<TlsStream<TcpStream>>, Failure> {
        let stream = tls
            .connect(host, self.connect_tcp(host, port)?)
            .map_err(|e| Failure::transient(anyhow!("imap tls handshake with {host}:{port} failed: {e}")))?;
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| Failure::transient(anyhow!("imap greeting failed: {e}")))?;
        Ok(client)
    }
}

impl MailFetcher for ImapFetcher {
    fn fetch_since(
        &self,
        account: &AccountConfig,
        since: NaiveDate,
    ) -> Result<Vec<MessageRecord>, Failure> {
        let host = account.imap_server.as_str();
        let port = account.imap_port;
        let tls = Self::tls_for(host)?;
        debug!("{}: connecting to {host}:{port}", account.name);

        match TlsMode::for_imap_port(port) {
            TlsMode::Implicit => {
                let client = self.open_tls(host, port, &tls)?;
                let mut session = login(client, account)?;
                let out = collect_since(&mut session, &account.name, since);
                let _ = session.logout();
                out
            }
            TlsMode::StartTls => {
                let client = self
                    .open_plain(host, port)?
                    .secure(host, &tls)
                    .map_err(|e| Failure::transient(anyhow!("imap starttls failed: {e}")))?;
                let mut session = login(client, account)?;
                let out = collect_since(&mut session, &account.name, since);
                let _ = session.logout();
                out
            }
        }
    }
}

fn login<T: Read + Write>(
    client: imap::Client<T>,
    account: &AccountConfig,
) -> Result<imap::Session<T>, Failure> {
    client
        .login(&account.email_user, &account.email_pass)
        .map_err(|(e, _client)| {
            Failure::transient(anyhow!("imap login failed for {}: {e}", account.email_user))
        })
}

fn collect_since<T: Read + Write>(
    session: &mut imap::Session<T>,
    account: &str,
    since: NaiveDate,
) -> Result<Vec<MessageRecord>, Failure> {
    session
        .select("INBOX")
        .map_err(|e| Failure::transient(anyhow!("imap select INBOX failed: {e}")))?;

    let mut seqs: Vec<u32> = session
        .search(imap_since_query(since))
        .map_err(|e| Failure::transient(anyhow!("imap search failed: {e}")))?
        .into_iter()
        .collect();
    seqs.sort_unstable();
    info!("{account}: {} message(s) since {since}", seqs.len());

    let mut out = Vec::with_capacity(seqs.len());
    for seq in seqs {
        // One message per FETCH; PEEK leaves the \Seen flag alone.
        let fetches = session
            .fetch(seq.to_string(), "(ENVELOPE BODY.PEEK[])")
            .map_err(|e| Failure::transient(anyhow!("imap fetch {seq} failed: {e}")))?;
        let Some(f) = fetches.iter().next() else {
            warn!("{account}: message {seq} vanished before fetch");
            continue;
        };

        let record = match f.body() {
            Some(raw) => parse_message(account, raw),
            None => {
                warn!("{account}: message {seq} has no body; using envelope only");
                let subject = f
                    .envelope()
                    .and_then(|env| env.subject)
                    .map(decode_subject)
                    .unwrap_or_else(|| "(no subject)".to_string());
                let sender = f
                    .envelope()
                    .and_then(|env| env.from.as_ref())
                    .and_then(|froms| froms.first())
                    .and_then(|addr| addr.name.or(addr.mailbox))
                    .map(decode_mime_words)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "(unknown)".to_string());
                MessageRecord {
                    account: account.to_string(),
                    sender,
                    subject,
                    body: String::new(),
                    received: None,
                }
            }
        };
        out.push(record);
    }
    Ok(out)
}
