//! Shared types for the classification-and-routing pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ── Incoming object ─────────────────────────────────────────────────

/// A single object dropped into the inbox bucket.
///
/// Built once from the storage collaborator at the start of an invocation
/// and dropped when the invocation completes.
#[derive(Debug, Clone)]
pub struct IncomingObject {
    /// URL-decoded object key.
    pub key: String,
    /// Bucket the object was read from.
    pub source_bucket: String,
    /// Raw object bytes.
    pub content: Vec<u8>,
    /// Content type recorded by the store, if any.
    pub content_type: Option<String>,
}

impl IncomingObject {
    pub fn new(source_bucket: impl Into<String>, key: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            source_bucket: source_bucket.into(),
            content,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Everything before the last `/` of the key (empty for top-level keys).
    pub fn key_prefix(&self) -> &str {
        self.key.rsplit_once('/').map_or("", |(prefix, _)| prefix)
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Which transformer applies to an object, derived from its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Archive,
    Spreadsheet,
    TabularText,
    /// Raw email. Only the attachment handler treats an object this way;
    /// `classify` never yields it from a key.
    EmailContainer,
    Unrecognized,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Spreadsheet => "spreadsheet",
            Self::TabularText => "tabular_text",
            Self::EmailContainer => "email_container",
            Self::Unrecognized => "unrecognized",
        }
    }
}

// ── Destinations ────────────────────────────────────────────────────

/// Logical destination of a write. Resolved to a bucket name via config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    /// Transformed or pass-through content ready for ingestion.
    Process,
    /// Quarantine for objects that failed transformation.
    Unprocessable,
    /// Landing bucket for normalized tabular text.
    AmrData,
    /// Staging bucket for archives awaiting expansion.
    Compressed,
    /// Staging bucket for spreadsheets awaiting conversion.
    Spreadsheet,
}

impl BucketKind {
    pub const ALL: [BucketKind; 5] = [
        Self::Process,
        Self::Unprocessable,
        Self::AmrData,
        Self::Compressed,
        Self::Spreadsheet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Unprocessable => "unprocessable",
            Self::AmrData => "amr_data",
            Self::Compressed => "compressed",
            Self::Spreadsheet => "spreadsheet",
        }
    }

    /// Configuration key holding this destination's bucket name.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Process => "PROCESS_BUCKET",
            Self::Unprocessable => "UNPROCESSABLE_BUCKET",
            Self::AmrData => "AMR_DATA_BUCKET",
            Self::Compressed => "COMPRESSED_BUCKET",
            Self::Spreadsheet => "SPREADSHEET_BUCKET",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Result of one unit of work (one attempted write).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransformOutcome {
    Success {
        key: String,
        destination: BucketKind,
        bucket: String,
        bytes: usize,
    },
    Failure {
        key: String,
        reason: String,
    },
}

impl TransformOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Success { key, .. } | Self::Failure { key, .. } => key,
        }
    }

    pub fn destination(&self) -> Option<BucketKind> {
        match self {
            Self::Success { destination, .. } => Some(*destination),
            Self::Failure { .. } => None,
        }
    }
}

/// Everything one invocation did, in order.
///
/// The status code is always 200: individual failures are recorded as
/// outcomes, never as a transport-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub status_code: u16,
    pub outcomes: Vec<TransformOutcome>,
}

impl PipelineResult {
    pub const OK: u16 = 200;

    pub fn new(outcomes: Vec<TransformOutcome>) -> Self {
        Self {
            status_code: Self::OK,
            outcomes,
        }
    }

    /// Response envelope returned to the trigger source.
    pub fn to_response(&self) -> serde_json::Value {
        serde_json::json!({
            "statusCode": self.status_code,
            "body": { "responses": self.outcomes },
        })
    }
}

// ── Email path ──────────────────────────────────────────────────────

/// A literal attachment decoded from an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAttachment {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A resource fetched from a download link found in an email body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedResource {
    pub link: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// What an email yielded. Attachments take precedence over links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unpacked {
    Attachments(Vec<ExtractedAttachment>),
    Downloads(Vec<DownloadedResource>),
}

impl Unpacked {
    pub fn len(&self) -> usize {
        match self {
            Self::Attachments(items) => items.len(),
            Self::Downloads(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into `(filename, mime_type, bytes)` triples, in order.
    pub fn into_files(self) -> Vec<(String, Option<String>, Vec<u8>)> {
        match self {
            Self::Attachments(items) => items
                .into_iter()
                .map(|a| (a.filename, a.mime_type, a.bytes))
                .collect(),
            Self::Downloads(items) => items
                .into_iter()
                .map(|d| (d.filename, d.mime_type, d.bytes))
                .collect(),
        }
    }
}

/// A parsed email ready to be written downstream.
#[derive(Debug, Clone)]
pub struct UnpackedEmail {
    /// Local part of the logical recipient.
    pub recipient: String,
    pub subject: Option<String>,
    pub contents: Unpacked,
}

// ── Handlers ────────────────────────────────────────────────────────

/// Entry points a trigger can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    /// Classify the key and route (or transform) accordingly.
    ProcessFile,
    /// Expand an archive into its members.
    UncompressFile,
    /// Convert a spreadsheet's first sheet to CSV.
    ConvertFile,
    /// Extract attachments or linked downloads from an email.
    UnpackAttachments,
}

impl Handler {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProcessFile => "process_file",
            Self::UncompressFile => "uncompress_file",
            Self::ConvertFile => "convert_file",
            Self::UnpackAttachments => "unpack_attachments",
        }
    }
}

impl FromStr for Handler {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process_file" => Ok(Self::ProcessFile),
            "uncompress_file" => Ok(Self::UncompressFile),
            "convert_file" => Ok(Self::ConvertFile),
            "unpack_attachments" => Ok(Self::UnpackAttachments),
            other => Err(PipelineError::Argument(format!("unknown handler: {other}"))),
        }
    }
}
