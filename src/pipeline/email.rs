//! Email unpacking: attachments first, download links otherwise.
//!
//! Flow per email:
//! 1. Parse the message (failure is fatal for this email)
//! 2. Recipient = `X-Forwarded-To`, else the first `To` address
//! 3. Any attachments → return them and stop
//! 4. Otherwise scan the first body part for download links and fetch each
//!
//! Link failures are reported and dropped one at a time; a bad link never
//! stops its siblings.

use std::sync::Arc;

use futures::future::join_all;
use mail_parser::{Address, ContentType, HeaderValue, Message, MessageParser, MimeHeaders};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::pipeline::downloads::{LinkFetcher, download_filename, rejection_reason, scan_links};
use crate::pipeline::types::{DownloadedResource, ExtractedAttachment, Unpacked, UnpackedEmail};
use crate::reporting::{ErrorSink, ReportContext};

/// Header set by the forwarding mailbox with the original recipient.
const FORWARDED_TO_HEADER: &str = "X-Forwarded-To";

/// Prefix used when a message names no recipient at all.
const UNKNOWN_RECIPIENT: &str = "unknown";

/// Report message for a rejected or failed download.
const DOWNLOAD_FAILED: &str = "Unable to download file";

/// Parses emails and extracts the files they carry.
pub struct EmailUnpacker {
    fetcher: Arc<dyn LinkFetcher>,
    sink: Arc<dyn ErrorSink>,
}

/// What to do with a parsed message, decided before any network I/O.
enum Plan {
    Attachments(Vec<ExtractedAttachment>),
    Download(Vec<String>),
}

impl EmailUnpacker {
    pub fn new(fetcher: Arc<dyn LinkFetcher>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { fetcher, sink }
    }

    /// Unpack an email stored under `key`.
    ///
    /// Destination keys for the results are `{recipient}/{key}/{filename}`.
    pub async fn unpack(&self, email_bytes: &[u8], key: &str) -> Result<UnpackedEmail, PipelineError> {
        let (recipient, subject, plan) = {
            let message = parse(email_bytes)?;

            let recipient = recipient_address(&message)
                .map(|addr| local_part(&addr).to_string())
                .unwrap_or_else(|| UNKNOWN_RECIPIENT.to_string());
            let subject = message.subject().map(str::to_string);
            info!(recipient = %recipient, key, "Receipt address");

            let plan = if message.attachment_count() > 0 {
                Plan::Attachments(extract_attachments(&message))
            } else {
                let prefix = format!("{recipient}/{key}");
                Plan::Download(self.extract_download_links(&message, &prefix))
            };
            (recipient, subject, plan)
        };

        let contents = match plan {
            Plan::Attachments(attachments) => Unpacked::Attachments(attachments),
            Plan::Download(links) => {
                let prefix = format!("{recipient}/{key}");
                Unpacked::Downloads(self.download_reports(&links, &prefix).await)
            }
        };

        Ok(UnpackedEmail {
            recipient,
            subject,
            contents,
        })
    }

    /// Scan the first body part for download links.
    ///
    /// An unreadable body is reported and treated as having no links.
    pub fn extract_download_links(&self, message: &Message<'_>, prefix: &str) -> Vec<String> {
        info!("Extracting download links");
        match first_body_text(message) {
            Ok(text) => scan_links(&text),
            Err(e) => {
                error!(subject = ?message.subject(), error = %e, "Unable to process mail body");
                self.sink.report(
                    &format!("Unable to process mail body: {e}"),
                    &ReportContext {
                        prefix: Some(prefix.to_string()),
                        ..Default::default()
                    }
                    .with_subject(message.subject()),
                );
                Vec::new()
            }
        }
    }

    /// Fetch every link, keeping the accepted downloads in link order.
    ///
    /// Links are fetched concurrently; each is judged independently.
    pub async fn download_reports(&self, links: &[String], prefix: &str) -> Vec<DownloadedResource> {
        let attempts = links.iter().map(|link| self.download(link, prefix));
        join_all(attempts).await.into_iter().flatten().collect()
    }

    async fn download(&self, link: &str, prefix: &str) -> Option<DownloadedResource> {
        info!(link, "Downloading");
        let fetched = self.fetcher.get(link).await.and_then(|resp| {
            match rejection_reason(&resp) {
                Some(reason) => Err(PipelineError::NotFound(format!("{link}: {reason}"))),
                None => Ok(resp),
            }
        });

        match fetched {
            Ok(resp) => Some(DownloadedResource {
                filename: download_filename(&resp, link),
                mime_type: resp.content_type,
                bytes: resp.body,
                link: link.to_string(),
            }),
            Err(e) => {
                error!(link, error = %e, "Unable to download file");
                let message = match e {
                    PipelineError::NotFound(_) => DOWNLOAD_FAILED.to_string(),
                    other => format!("{DOWNLOAD_FAILED}: {other}"),
                };
                self.sink.report(&message, &ReportContext::link(link, prefix));
                None
            }
        }
    }
}

/// Parse raw bytes as an email message.
pub fn parse(email_bytes: &[u8]) -> Result<Message<'_>, PipelineError> {
    MessageParser::default()
        .parse(email_bytes)
        .ok_or_else(|| PipelineError::format("email", "message could not be parsed"))
}

/// Logical recipient: the forwarding header if present, else the first `To`.
pub fn recipient_address(message: &Message<'_>) -> Option<String> {
    let forwarded = message
        .headers()
        .iter()
        .find(|h| h.name().eq_ignore_ascii_case(FORWARDED_TO_HEADER))
        .and_then(|h| header_address(h.value()));

    forwarded.or_else(|| extract_addresses(message.to()).into_iter().next())
}

/// The part of an address before `@`.
pub fn local_part(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

fn header_address(value: &HeaderValue<'_>) -> Option<String> {
    if let Some(addr) = value.as_address() {
        return extract_addresses(Some(addr)).into_iter().next();
    }
    let raw = value.as_text()?.trim();
    let bare = match (raw.find('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    (!bare.is_empty()).then(|| bare.trim().to_string())
}

/// Extract email addresses from an optional mail_parser Address field.
///
/// Returns an empty vec if the address is None.
pub fn extract_addresses(addr: Option<&Address<'_>>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

fn extract_attachments(message: &Message<'_>) -> Vec<ExtractedAttachment> {
    message
        .attachments()
        .enumerate()
        .map(|(index, part)| ExtractedAttachment {
            filename: part
                .attachment_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("attachment-{}", index + 1)),
            mime_type: part.content_type().map(mime_type),
            bytes: part.contents().to_vec(),
        })
        .collect()
}

fn mime_type(content_type: &ContentType<'_>) -> String {
    match content_type.subtype() {
        Some(subtype) => format!("{}/{}", content_type.ctype(), subtype),
        None => content_type.ctype().to_string(),
    }
}

/// Decoded text of the first body part (raw markup for HTML-only mail).
fn first_body_text(message: &Message<'_>) -> Result<String, PipelineError> {
    message
        .text_body
        .first()
        .or_else(|| message.html_body.first())
        .and_then(|id| message.part(*id))
        .and_then(|part| part.text_contents())
        .map(str::to_string)
        .or_else(|| message.body_text(0).map(|text| text.into_owned()))
        .ok_or_else(|| PipelineError::format("email body", "no readable text part"))
}
