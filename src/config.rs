//! Configuration types.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::types::BucketKind;

/// Default per-link download timeout.
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Environment label attached to error-sink reports.
const DEFAULT_SINK_ENVIRONMENT: &str = "data-pipeline";

/// Remote error sink settings.
#[derive(Debug, Clone)]
pub struct ErrorSinkConfig {
    pub url: String,
    pub access_token: SecretString,
    pub environment: String,
}

/// Pipeline configuration.
///
/// Built once and handed to the orchestrator; never read from ambient state
/// after construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    buckets: BTreeMap<BucketKind, String>,
    /// Remote error sink (reports go to the log only when absent).
    pub error_sink: Option<ErrorSinkConfig>,
    /// Timeout applied to each download-link GET.
    pub download_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            error_sink: None,
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Build config from an opaque key/value mapping.
    ///
    /// Unknown keys are ignored; empty values count as unset.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        let buckets = BucketKind::ALL
            .iter()
            .filter_map(|kind| vars.get(kind.env_var()).map(|name| (*kind, name.clone())))
            .collect();

        let download_timeout = match vars.get("DOWNLOAD_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "DOWNLOAD_TIMEOUT_SECS".into(),
                    message: format!("{e}"),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        };

        let error_sink = match (vars.get("ERROR_SINK_URL"), vars.get("ERROR_SINK_ACCESS_TOKEN")) {
            (Some(url), Some(token)) => Some(ErrorSinkConfig {
                url: url.clone(),
                access_token: SecretString::from(token.clone()),
                environment: vars
                    .get("ERROR_SINK_ENVIRONMENT")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_SINK_ENVIRONMENT.to_string()),
            }),
            (Some(_), None) => {
                return Err(ConfigError::InvalidValue {
                    key: "ERROR_SINK_ACCESS_TOKEN".into(),
                    message: "required when ERROR_SINK_URL is set".into(),
                });
            }
            _ => None,
        };

        Ok(Self {
            buckets,
            error_sink,
            download_timeout,
        })
    }

    /// Set the bucket for a destination kind.
    pub fn with_bucket(mut self, kind: BucketKind, name: impl Into<String>) -> Self {
        self.buckets.insert(kind, name.into());
        self
    }

    /// Whether a bucket is configured for this destination kind.
    pub fn has_bucket(&self, kind: BucketKind) -> bool {
        self.buckets.contains_key(&kind)
    }

    /// Resolve a destination kind to its bucket name.
    pub fn bucket(&self, kind: BucketKind) -> Result<&str, ConfigError> {
        self.buckets
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingBucket {
                kind: kind.to_string(),
                var: kind.env_var().to_string(),
            })
    }
}
