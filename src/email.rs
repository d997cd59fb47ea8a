use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeaderMap, addrparse, dateparse, parse_mail};
use scraper::Html;

use crate::classify::{CONFIRMATION_PHRASES, REJECTION_PHRASES};
use crate::models::EmailMessage;

const SNIPPET_CHARS: usize = 500;

pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl MailConfig {
    pub fn gmail(username: &str, app_password: &str) -> Self {
        Self {
            server: "imap.gmail.com".to_string(),
            port: 993,
            username: username.to_string(),
            password: app_password.trim().to_string(),
        }
    }

    pub fn from_password_file(username: &str, password_file: &Path) -> Result<Self> {
        let password = fs::read_to_string(password_file)
            .with_context(|| format!("Failed to read password file: {:?}", password_file))?;
        Ok(Self::gmail(username, &password))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Confirmations,
    Rejections,
    All,
}

impl ScanKind {
    /// One IMAP query per phrase. Confirmation phrases live in subject
    /// lines; rejection phrasing is usually buried in the body, so those
    /// search the whole text.
    fn queries(&self, since: &str) -> Vec<String> {
        let mut queries = Vec::new();
        if matches!(self, ScanKind::Confirmations | ScanKind::All) {
            for phrase in CONFIRMATION_PHRASES {
                queries.push(format!("SUBJECT \"{}\" SINCE {}", phrase, since));
            }
        }
        if matches!(self, ScanKind::Rejections | ScanKind::All) {
            for phrase in REJECTION_PHRASES {
                queries.push(format!("TEXT \"{}\" SINCE {}", phrase, since));
            }
        }
        queries
    }
}

#[derive(Debug, Default)]
pub struct ScanStats {
    pub emails_found: usize,
    pub errors: usize,
}

type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

pub struct MailScanner {
    config: MailConfig,
}

impl MailScanner {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Search the inbox and return every matching message. Connection and
    /// login failures abort the batch; a single message that fails to fetch
    /// or parse is logged, counted and skipped.
    pub fn fetch_messages(
        &self,
        kind: ScanKind,
        days: u32,
    ) -> Result<(Vec<EmailMessage>, ScanStats)> {
        let tls = native_tls::TlsConnector::builder().build()?;

        let addr = (self.config.server.as_str(), self.config.port);
        let tcp = std::net::TcpStream::connect(addr)
            .context("Failed to connect to IMAP server")?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;
        tcp.set_write_timeout(Some(Duration::from_secs(30)))?;
        let tls_stream = tls.connect(&self.config.server, tcp)?;

        let client = imap::Client::new(tls_stream);
        let mut session = client
            .login(&self.config.username, &self.config.password)
            .map_err(|e| anyhow!("Login failed: {}", e.0))?;

        session.select("INBOX")?;

        let since_date = Utc::now() - chrono::Duration::days(days as i64);
        let since = since_date.format("%d-%b-%Y").to_string();

        let mut stats = ScanStats::default();
        let mut messages = Vec::new();
        let mut seen_ids: HashSet<u32> = HashSet::new();

        for query in kind.queries(&since) {
            let ids = match session.search(&query) {
                Ok(ids) => ids,
                Err(e) => {
                    eprintln!("  search failed ({}): {}", query, e);
                    stats.errors += 1;
                    continue;
                }
            };

            for id in ids {
                if !seen_ids.insert(id) {
                    continue;
                }
                stats.emails_found += 1;

                match fetch_one(&mut session, id) {
                    Ok(Some(message)) => messages.push(message),
                    Ok(None) => {}
                    Err(e) => {
                        stats.errors += 1;
                        eprintln!("  Error reading message {}: {}", id, e);
                    }
                }
            }
        }

        session.logout()?;
        Ok((messages, stats))
    }
}

fn fetch_one(session: &mut ImapSession, id: u32) -> Result<Option<EmailMessage>> {
    let fetches = session.fetch(id.to_string(), "RFC822")?;
    for fetch in fetches.iter() {
        if let Some(raw) = fetch.body() {
            return parse_message(raw).map(Some);
        }
    }
    Ok(None)
}

pub fn parse_message(raw: &[u8]) -> Result<EmailMessage> {
    let parsed = parse_mail(raw)?;

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let date_header = parsed.headers.get_first_value("Date").unwrap_or_default();

    let date = dateparse(&date_header)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    let body = extract_body(&parsed)?;

    Ok(EmailMessage {
        sender: sender_address(&from),
        subject,
        snippet: make_snippet(&body, SNIPPET_CHARS),
        date,
    })
}

/// Bare address from a From header, lowercased; falls back to the raw
/// header when it cannot be parsed.
pub fn sender_address(from_header: &str) -> String {
    if let Ok(list) = addrparse(from_header) {
        for addr in list.iter() {
            match addr {
                MailAddr::Single(info) => return info.addr.to_lowercase(),
                MailAddr::Group(group) => {
                    if let Some(single) = group.addrs.first() {
                        return single.addr.to_lowercase();
                    }
                }
            }
        }
    }
    from_header.trim().to_lowercase()
}

/// Prefer the HTML part, then plain text, then whatever the first part is.
fn extract_body(parsed: &mailparse::ParsedMail) -> Result<String> {
    if parsed.subparts.is_empty() {
        return Ok(flatten_html(&parsed.get_body()?));
    }

    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/html") {
            return Ok(flatten_html(&part.get_body()?));
        }
    }

    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/plain") {
            return Ok(flatten_html(&part.get_body()?));
        }
    }

    if let Some(part) = parsed.subparts.first() {
        return Ok(flatten_html(&part.get_body()?));
    }

    Err(anyhow!("No email body found"))
}

fn flatten_html(body: &str) -> String {
    let document = Html::parse_document(body);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

fn make_snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}
