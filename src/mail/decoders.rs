use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail};

use crate::domain::email::MessageRecord;

pub fn decode_subject(raw: &[u8]) -> String {
    decode_header_value("Subject", raw)
}

pub fn decode_mime_words(raw: &[u8]) -> String {
    decode_header_value("X", raw)
}

fn decode_header_value(name: &str, raw: &[u8]) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = format!("{name}: ").into_bytes();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(), // decodes RFC 2047
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Turn a raw RFC 822 message into a record. Never fails: an unparsable
/// message keeps its raw text as the body.
pub fn parse_message(account: &str, raw_rfc822: &[u8]) -> MessageRecord {
    let Ok(parsed) = mailparse::parse_mail(raw_rfc822) else {
        return MessageRecord {
            account: account.to_string(),
            sender: "(unknown)".to_string(),
            subject: "(no subject)".to_string(),
            body: String::from_utf8_lossy(raw_rfc822).into_owned(),
            received: None,
        };
    };

    let header = |name: &str| {
        parsed
            .headers
            .get_first_value(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let received = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    let body = extract_text_part(&parsed)
        .or_else(|| parsed.get_body().ok())
        .unwrap_or_default();

    MessageRecord {
        account: account.to_string(),
        sender: header("From").unwrap_or_else(|| "(unknown)".to_string()),
        subject: header("Subject").unwrap_or_else(|| "(no subject)".to_string()),
        body: body.trim().to_string(),
        received,
    }
}

fn extract_text_part(p: &ParsedMail) -> Option<String> {
    if let Some(plain) = find_part(p, "text/plain") {
        return plain.get_body().ok();
    }
    // no text/plain anywhere in the tree
    let html = find_part(p, "text/html")?.get_body().ok()?;
    Some(html_to_text(&html))
}

/// First leaf of the given type, depth-first.
fn find_part<'a, 'b>(p: &'a ParsedMail<'b>, mimetype: &str) -> Option<&'a ParsedMail<'b>> {
    if p.subparts.is_empty() {
        return p.ctype.mimetype.eq_ignore_ascii_case(mimetype).then_some(p);
    }
    p.subparts.iter().find_map(|sp| find_part(sp, mimetype))
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100).unwrap_or_else(|_| html.to_string())
}
