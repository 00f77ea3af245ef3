//! Error/incident sink.
//!
//! Reports are fire-and-forget: a sink never returns an error to the
//! pipeline, and a failing remote sink only logs.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::config::{ErrorSinkConfig, PipelineConfig};

/// Diagnostic context attached to a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl ReportContext {
    pub fn object(bucket: &str, key: &str) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            key: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn link(link: &str, prefix: &str) -> Self {
        Self {
            link: Some(link.to_string()),
            prefix: Some(prefix.to_string()),
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: Option<&str>) -> Self {
        self.subject = subject.map(str::to_string);
        self
    }
}

/// Where transformation and download failures are reported.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str, context: &ReportContext);

    /// Hand over deliveries still in flight so they can be awaited before exit.
    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// Build the sink described by config: remote when configured, log-only otherwise.
pub fn sink_from_config(config: &PipelineConfig) -> Arc<dyn ErrorSink> {
    match &config.error_sink {
        Some(remote) => Arc::new(HttpSink::new(remote.clone())),
        None => Arc::new(TracingSink),
    }
}

// ── Log-only sink ───────────────────────────────────────────────────

/// Logs each report at error level.
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, message: &str, context: &ReportContext) {
        error!(
            bucket = context.bucket.as_deref(),
            key = context.key.as_deref(),
            link = context.link.as_deref(),
            subject = context.subject.as_deref(),
            prefix = context.prefix.as_deref(),
            "{message}"
        );
    }
}

// ── Remote sink ─────────────────────────────────────────────────────

/// Posts reports as JSON items to a remote error tracker.
pub struct HttpSink {
    config: ErrorSinkConfig,
    client: reqwest::Client,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpSink {
    pub fn new(config: ErrorSinkConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// JSON item sent for one report.
    pub fn payload(&self, message: &str, context: &ReportContext) -> serde_json::Value {
        serde_json::json!({
            "access_token": self.config.access_token.expose_secret(),
            "data": {
                "environment": self.config.environment,
                "level": "error",
                "timestamp": Utc::now().timestamp(),
                "body": { "message": { "body": message } },
                "custom": context,
            },
        })
    }
}

impl ErrorSink for HttpSink {
    fn report(&self, message: &str, context: &ReportContext) {
        TracingSink.report(message, context);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; error report not sent to remote sink");
            return;
        };

        let payload = self.payload(message, context);
        let request = self.client.post(&self.config.url).json(&payload);
        let handle = runtime.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!(status = %resp.status(), "Error sink rejected report"),
                Err(e) => warn!(error = %e, "Failed to send error report"),
            }
        });
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        self.pending
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

// ── In-memory sink ──────────────────────────────────────────────────

/// A captured report.
#[derive(Debug, Clone)]
pub struct Report {
    pub message: String,
    pub context: ReportContext,
    pub reported_at: DateTime<Utc>,
}

/// Keeps every report in memory, in order.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, message: &str, context: &ReportContext) {
        if let Ok(mut guard) = self.reports.lock() {
            guard.push(Report {
                message: message.to_string(),
                context: context.clone(),
                reported_at: Utc::now(),
            });
        }
    }
}
