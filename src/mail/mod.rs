pub mod decoders;
pub mod imap_client;
pub mod smtp;

use std::net::IpAddr;
use std::time::Duration;

/// Read/write timeout for IMAP and SMTP sockets.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (993 / 465).
    Implicit,
    /// Plain connect, then upgrade.
    StartTls,
}

impl TlsMode {
    pub fn for_imap_port(port: u16) -> Self {
        if port == 993 { Self::Implicit } else { Self::StartTls }
    }

    pub fn for_smtp_port(port: u16) -> Self {
        if port == 465 { Self::Implicit } else { Self::StartTls }
    }
}

/// Local bridges present self-signed certificates; only those get relaxed
/// verification.
pub fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
