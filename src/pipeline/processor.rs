//! Pipeline orchestrator: routes one object through the matching transformer.
//!
//! Flow per invocation:
//! 1. Email entry point → unpack, one process write per extracted file
//! 2. Otherwise classify the key and dispatch on the classification
//! 3. Any transform failure → report, then quarantine the original object
//!
//! Every write yields one outcome. The result is always status 200; only
//! `PipelineError::Argument` escapes as an error.

use std::io::Cursor;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::archive;
use crate::pipeline::classifier::classify;
use crate::pipeline::downloads::LinkFetcher;
use crate::pipeline::email::EmailUnpacker;
use crate::pipeline::normalizer::normalize_to_vec;
use crate::pipeline::spreadsheet::{self, SpreadsheetFormat};
use crate::pipeline::types::{
    BucketKind, Classification, Handler, IncomingObject, PipelineResult, TransformOutcome,
};
use crate::reporting::{ErrorSink, ReportContext};
use crate::store::{ObjectStore, PutObject};

/// Content type given to converted spreadsheets.
const CSV_CONTENT_TYPE: &str = "text/csv";

/// Report message for an email that could not be unpacked.
const UNPACK_FAILED: &str = "Unable to unpack email";

/// Result of a guarded transform.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    Failure(String),
}

// ── Write requests ──────────────────────────────────────────────────

/// One write to a destination bucket.
///
/// A request without a body is a caller defect.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    key: String,
    body: Option<Vec<u8>>,
    content_type: Option<String>,
}

impl WriteRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: Option<impl Into<String>>) -> Self {
        self.content_type = content_type.map(Into::into);
        self
    }

    fn into_content(self) -> Result<(String, Vec<u8>, Option<String>), PipelineError> {
        match self.body {
            Some(body) => Ok((self.key, body, self.content_type)),
            None => Err(PipelineError::Argument(format!("write to {} has no body", self.key))),
        }
    }
}

// ── Orchestrator ────────────────────────────────────────────────────

/// Composition root: config, storage, error sink and email unpacker.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn ErrorSink>,
    unpacker: EmailUnpacker,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn ErrorSink>,
        fetcher: Arc<dyn LinkFetcher>,
    ) -> Self {
        let unpacker = EmailUnpacker::new(fetcher, Arc::clone(&sink));
        Self {
            config: Arc::new(config),
            store,
            sink,
            unpacker,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read `bucket/key` from storage and run `handler` on it.
    ///
    /// A failed read is recorded as a failure outcome; it does not fail the
    /// invocation.
    pub async fn handle(
        &self,
        bucket: &str,
        key: &str,
        handler: Handler,
    ) -> Result<PipelineResult, PipelineError> {
        info!(handler = handler.name(), bucket, key, "Running handler");

        let stored = match self.store.get(bucket, key).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(bucket, key, error = %e, "Unable to read object");
                self.sink
                    .report(&e.to_string(), &ReportContext::object(bucket, key));
                return Ok(PipelineResult::new(vec![TransformOutcome::Failure {
                    key: key.to_string(),
                    reason: e.to_string(),
                }]));
            }
        };

        let mut object = IncomingObject::new(bucket, key, stored.body);
        object.content_type = stored.content_type;
        self.run(object, handler).await
    }

    /// Run one object through `handler`.
    pub async fn run(
        &self,
        object: IncomingObject,
        handler: Handler,
    ) -> Result<PipelineResult, PipelineError> {
        let outcomes = match handler {
            Handler::ProcessFile => self.process_file(&object).await?,
            Handler::UncompressFile => self.uncompress(&object).await?,
            Handler::ConvertFile => self.convert(&object).await?,
            Handler::UnpackAttachments => self.unpack_attachments(&object).await?,
        };

        let failures = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            handler = handler.name(),
            key = %object.key,
            writes = outcomes.len(),
            failures,
            "Handler finished"
        );
        Ok(PipelineResult::new(outcomes))
    }

    async fn process_file(
        &self,
        object: &IncomingObject,
    ) -> Result<Vec<TransformOutcome>, PipelineError> {
        let classification = classify(&object.key);
        info!(key = %object.key, classification = classification.label(), "Classified object");

        match classification {
            Classification::TabularText => Ok(vec![self.route_tabular(object).await?]),
            Classification::Archive if self.config.has_bucket(BucketKind::Compressed) => {
                Ok(vec![self.stage(object, BucketKind::Compressed).await?])
            }
            Classification::Archive => self.uncompress(object).await,
            Classification::Spreadsheet if self.config.has_bucket(BucketKind::Spreadsheet) => {
                Ok(vec![self.stage(object, BucketKind::Spreadsheet).await?])
            }
            Classification::Spreadsheet => self.convert(object).await,
            // Emails are only unpacked through their own handler.
            Classification::EmailContainer | Classification::Unrecognized => {
                warn!(key = %object.key, "Unrecognized object, quarantining");
                Ok(vec![self.quarantine(object).await?])
            }
        }
    }

    /// Tabular text: normalized into the AMR data bucket when one is
    /// configured, otherwise passed through to process untouched.
    async fn route_tabular(
        &self,
        object: &IncomingObject,
    ) -> Result<TransformOutcome, PipelineError> {
        if !self.config.has_bucket(BucketKind::AmrData) {
            return self.stage(object, BucketKind::Process).await;
        }

        match self.attempt(object, |o| {
            normalize_to_vec(Cursor::new(&o.content)).map_err(|e| PipelineError::format("text", e))
        })? {
            Attempt::Success(cleaned) => {
                let write = WriteRequest::new(&object.key)
                    .body(cleaned)
                    .content_type(object.content_type.as_deref());
                self.add_to_bucket(BucketKind::AmrData, write).await
            }
            Attempt::Failure(_) => self.quarantine(object).await,
        }
    }

    async fn uncompress(
        &self,
        object: &IncomingObject,
    ) -> Result<Vec<TransformOutcome>, PipelineError> {
        let members = match self.attempt(object, |o| archive::expand(&o.content))? {
            Attempt::Success(members) => members,
            Attempt::Failure(_) => return Ok(vec![self.quarantine(object).await?]),
        };

        let prefix = object.key_prefix();
        let mut outcomes = Vec::with_capacity(members.len());
        for member in members {
            let key = if prefix.is_empty() {
                member.name
            } else {
                format!("{prefix}/{}", member.name)
            };
            let write = WriteRequest::new(key).body(member.bytes);
            outcomes.push(self.add_to_bucket(BucketKind::Process, write).await?);
        }
        Ok(outcomes)
    }

    async fn convert(
        &self,
        object: &IncomingObject,
    ) -> Result<Vec<TransformOutcome>, PipelineError> {
        let converted = self.attempt(object, |o| {
            let format = SpreadsheetFormat::from_key(&o.key)
                .ok_or_else(|| PipelineError::format("spreadsheet", "unsupported extension"))?;
            spreadsheet::convert(&o.content, format)
        })?;

        let outcome = match converted {
            Attempt::Success(csv) => {
                let write = WriteRequest::new(format!("{}.csv", object.key))
                    .body(csv)
                    .content_type(Some(CSV_CONTENT_TYPE));
                self.add_to_bucket(BucketKind::Process, write).await?
            }
            Attempt::Failure(_) => self.quarantine(object).await?,
        };
        Ok(vec![outcome])
    }

    async fn unpack_attachments(
        &self,
        object: &IncomingObject,
    ) -> Result<Vec<TransformOutcome>, PipelineError> {
        let email = match self.unpacker.unpack(&object.content, &object.key).await {
            Ok(email) => email,
            Err(e @ PipelineError::Argument(_)) => return Err(e),
            Err(e) => {
                error!(key = %object.key, error = %e, "{UNPACK_FAILED}");
                self.sink.report(
                    &format!("{UNPACK_FAILED}: {e}"),
                    &ReportContext::object(&object.source_bucket, &object.key),
                );
                return Ok(vec![TransformOutcome::Failure {
                    key: object.key.clone(),
                    reason: e.to_string(),
                }]);
            }
        };

        if email.contents.is_empty() {
            info!(key = %object.key, "Email carried nothing to extract");
        }

        let mut outcomes = Vec::with_capacity(email.contents.len());
        for (filename, mime_type, bytes) in email.contents.into_files() {
            let key = format!("{}/{}/{}", email.recipient, object.key, filename);
            let write = WriteRequest::new(key).body(bytes).content_type(mime_type);
            outcomes.push(self.add_to_bucket(BucketKind::Process, write).await?);
        }
        Ok(outcomes)
    }

    /// Run `transform`, reporting any failure against the object.
    ///
    /// `Argument` errors propagate; everything else becomes `Attempt::Failure`.
    pub fn attempt<T, F>(
        &self,
        object: &IncomingObject,
        transform: F,
    ) -> Result<Attempt<T>, PipelineError>
    where
        F: FnOnce(&IncomingObject) -> Result<T, PipelineError>,
    {
        match transform(object) {
            Ok(artifact) => {
                debug!(key = %object.key, "Transform succeeded");
                Ok(Attempt::Success(artifact))
            }
            Err(e @ PipelineError::Argument(_)) => Err(e),
            Err(e) => {
                error!(
                    bucket = %object.source_bucket,
                    key = %object.key,
                    error = %e,
                    "Transform failed"
                );
                self.sink.report(
                    &e.to_string(),
                    &ReportContext::object(&object.source_bucket, &object.key),
                );
                Ok(Attempt::Failure(e.to_string()))
            }
        }
    }

    /// Copy the original object, bytes and content type, under its own key.
    async fn stage(
        &self,
        object: &IncomingObject,
        kind: BucketKind,
    ) -> Result<TransformOutcome, PipelineError> {
        let write = WriteRequest::new(&object.key)
            .body(object.content.clone())
            .content_type(object.content_type.as_deref());
        self.add_to_bucket(kind, write).await
    }

    async fn quarantine(&self, object: &IncomingObject) -> Result<TransformOutcome, PipelineError> {
        self.stage(object, BucketKind::Unprocessable).await
    }

    /// Write to the bucket configured for `kind`.
    ///
    /// A missing bucket or a failed write is reported and returned as a
    /// failure outcome.
    pub async fn add_to_bucket(
        &self,
        kind: BucketKind,
        write: WriteRequest,
    ) -> Result<TransformOutcome, PipelineError> {
        let (key, body, content_type) = write.into_content()?;
        let bucket = match self.config.bucket(kind) {
            Ok(bucket) => bucket.to_string(),
            Err(e) => return Ok(self.write_failed(&key, None, e.to_string())),
        };

        info!(key = %key, bucket = %bucket, bytes = body.len(), "Adding {key} to {bucket}");
        let request = PutObject {
            bucket: bucket.clone(),
            key: key.clone(),
            body,
            content_type,
        };
        match self.store.put(request).await {
            Ok(ack) => Ok(TransformOutcome::Success {
                key: ack.key,
                destination: kind,
                bucket: ack.bucket,
                bytes: ack.bytes,
            }),
            Err(e) => Ok(self.write_failed(&key, Some(&bucket), e.to_string())),
        }
    }

    fn write_failed(&self, key: &str, bucket: Option<&str>, reason: String) -> TransformOutcome {
        error!(key, bucket, reason = %reason, "Write failed");
        let context = ReportContext {
            bucket: bucket.map(str::to_string),
            key: Some(key.to_string()),
            ..Default::default()
        };
        self.sink.report(&reason, &context);
        TransformOutcome::Failure {
            key: key.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::downloads::FetchedResponse;
    use crate::reporting::RecordingSink;
    use crate::store::MemoryStore;

    struct NoNetwork;

    #[async_trait::async_trait]
    impl LinkFetcher for NoNetwork {
        async fn get(&self, url: &str) -> Result<FetchedResponse, PipelineError> {
            Err(PipelineError::Transport(format!("no network in tests: {url}")))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_bucket(BucketKind::Process, "process-bucket")
            .with_bucket(BucketKind::Unprocessable, "unprocessable-bucket")
    }

    fn pipeline(config: PipelineConfig) -> (Pipeline, Arc<MemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let pipeline = Pipeline::new(config, store.clone(), sink.clone(), Arc::new(NoNetwork));
        (pipeline, store, sink)
    }

    #[tokio::test]
    async fn tabular_text_passes_through_without_amr_bucket() {
        let (pipeline, store, _) = pipeline(config());
        let object = IncomingObject::new("inbox", "site/readings.csv", b"a,b\r\n\r\n1,2".to_vec());

        let result = pipeline.run(object, Handler::ProcessFile).await.unwrap();

        assert_eq!(result.status_code, 200);
        let puts = store.puts().await;
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].bucket, "process-bucket");
        assert_eq!(puts[0].body, b"a,b\r\n\r\n1,2");
    }

    #[tokio::test]
    async fn tabular_text_is_normalized_into_amr_bucket() {
        let (pipeline, store, _) =
            pipeline(config().with_bucket(BucketKind::AmrData, "amr-bucket"));
        let object = IncomingObject::new("inbox", "site/readings.CNS", b"a,b\r\n\r\n1,\x002".to_vec())
            .with_content_type("text/plain");

        let result = pipeline.run(object, Handler::ProcessFile).await.unwrap();

        assert_eq!(result.outcomes[0].destination(), Some(BucketKind::AmrData));
        let puts = store.puts().await;
        assert_eq!(puts[0].bucket, "amr-bucket");
        assert_eq!(puts[0].body, b"a,b\n1,2\n");
        assert_eq!(puts[0].content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn corrupt_archive_is_quarantined_and_reported() {
        let (pipeline, store, sink) = pipeline(config());
        let object = IncomingObject::new("inbox", "site/export.zip", b"not a zip".to_vec())
            .with_content_type("application/zip");

        let result = pipeline.run(object, Handler::ProcessFile).await.unwrap();

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].destination(), Some(BucketKind::Unprocessable));
        let puts = store.puts().await;
        assert_eq!(puts[0].key, "site/export.zip");
        assert_eq!(puts[0].body, b"not a zip");
        assert_eq!(puts[0].content_type.as_deref(), Some("application/zip"));

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context.key.as_deref(), Some("site/export.zip"));
        assert_eq!(reports[0].context.bucket.as_deref(), Some("inbox"));
    }

    #[tokio::test]
    async fn staging_buckets_receive_untouched_objects() {
        let (pipeline, store, sink) = pipeline(
            config()
                .with_bucket(BucketKind::Compressed, "compressed-bucket")
                .with_bucket(BucketKind::Spreadsheet, "spreadsheet-bucket"),
        );

        pipeline
            .run(IncomingObject::new("inbox", "a/x.zip", b"zz".to_vec()), Handler::ProcessFile)
            .await
            .unwrap();
        pipeline
            .run(IncomingObject::new("inbox", "a/y.xls", b"ss".to_vec()), Handler::ProcessFile)
            .await
            .unwrap();

        let puts = store.puts().await;
        assert_eq!(puts[0].bucket, "compressed-bucket");
        assert_eq!(puts[0].body, b"zz");
        assert_eq!(puts[1].bucket, "spreadsheet-bucket");
        assert_eq!(puts[1].key, "a/y.xls");
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn convert_rejects_non_spreadsheet_keys() {
        let (pipeline, store, sink) = pipeline(config());
        let object = IncomingObject::new("inbox", "a/notes.txt", b"hello".to_vec());

        let result = pipeline.run(object, Handler::ConvertFile).await.unwrap();

        assert_eq!(result.outcomes[0].destination(), Some(BucketKind::Unprocessable));
        assert_eq!(store.puts().await[0].key, "a/notes.txt");
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn missing_bucket_is_a_failure_outcome() {
        let (pipeline, store, sink) = pipeline(PipelineConfig::default());
        let object = IncomingObject::new("inbox", "a/mystery.bin", b"?".to_vec());

        let result = pipeline.run(object, Handler::ProcessFile).await.unwrap();

        assert_eq!(result.status_code, 200);
        assert!(!result.outcomes[0].is_success());
        assert!(store.puts().await.is_empty());
        assert!(sink.reports()[0].message.contains("UNPROCESSABLE_BUCKET"));
    }

    #[tokio::test]
    async fn failed_put_is_a_failure_outcome() {
        let (pipeline, store, sink) = pipeline(config());
        store.reject_writes_to("process-bucket").await;
        let object = IncomingObject::new("inbox", "a/readings.csv", b"1".to_vec());

        let result = pipeline.run(object, Handler::ProcessFile).await.unwrap();

        assert!(matches!(
            &result.outcomes[0],
            TransformOutcome::Failure { key, .. } if key == "a/readings.csv"
        ));
        assert_eq!(sink.reports()[0].context.bucket.as_deref(), Some("process-bucket"));
    }

    #[tokio::test]
    async fn write_without_content_is_an_argument_error() {
        let (pipeline, _, _) = pipeline(config());
        let err = pipeline
            .add_to_bucket(BucketKind::Process, WriteRequest::new("a/b.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Argument(_)));
    }

    #[tokio::test]
    async fn write_without_body_fails_before_bucket_lookup() {
        let (pipeline, store, sink) = pipeline(config());
        let err = pipeline
            .add_to_bucket(BucketKind::Compressed, WriteRequest::new("a/b.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Argument(_)));
        assert!(store.puts().await.is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn email_files_in_the_generic_path_are_quarantined() {
        let (pipeline, store, sink) = pipeline(config());
        let object = IncomingObject::new("inbox", "bath/inbound/message.eml", b"From: a@b".to_vec());

        let result = pipeline.run(object, Handler::ProcessFile).await.unwrap();

        assert_eq!(result.outcomes[0].destination(), Some(BucketKind::Unprocessable));
        assert_eq!(store.puts().await[0].body, b"From: a@b");
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn argument_errors_escape_attempt() {
        let (pipeline, _, sink) = pipeline(config());
        let object = IncomingObject::new("inbox", "k", vec![]);

        let res: Result<Attempt<()>, _> =
            pipeline.attempt(&object, |_| Err(PipelineError::Argument("bad call".into())));
        assert!(matches!(res, Err(PipelineError::Argument(_))));
        assert!(sink.is_empty());

        let res: Result<Attempt<()>, _> =
            pipeline.attempt(&object, |_| Err(PipelineError::format("archive", "truncated")));
        assert!(matches!(res, Ok(Attempt::Failure(reason)) if reason.contains("truncated")));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_object_is_a_failure_outcome() {
        let (pipeline, store, sink) = pipeline(config());

        let result = pipeline
            .handle("inbox", "gone.csv", Handler::ProcessFile)
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        assert!(!result.outcomes[0].is_success());
        assert!(store.puts().await.is_empty());
        assert_eq!(sink.len(), 1);
    }
}
