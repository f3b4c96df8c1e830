//! Prometheus metrics for the verifier server.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `passport_verifier_requests_total` | Counter | `endpoint` |
//! | `passport_verifier_errors_total` | Counter | `endpoint`, `code` |
//! | `passport_verifier_request_duration_seconds` | Histogram | `endpoint` |
//! | `passport_verifier_chain_read_duration_seconds` | Histogram | `outcome` |
//!
//! Error codes are the `error` field of the JSON error body, so the label set
//! is bounded by [`VerifyError::as_str`](crate::verifier::VerifyError::as_str).

use crate::chain::client::ChainReader;
use crate::chain::error::ChainError;
use crate::types::ObjectId;
use async_trait::async_trait;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Buckets for request handling and chain reads, in seconds.
pub const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Counters and histograms for every verifier endpoint.
#[derive(Clone)]
pub struct VerifierMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    errors_total: IntCounterVec,
    request_duration: HistogramVec,
    chain_read_duration: HistogramVec,
}

impl VerifierMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "passport_verifier_requests_total",
                "Requests received, by endpoint",
            ),
            &["endpoint"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new(
                "passport_verifier_errors_total",
                "Requests answered with an error body, by endpoint and code",
            ),
            &["endpoint", "code"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "passport_verifier_request_duration_seconds",
                "Time spent handling a request",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let chain_read_duration = HistogramVec::new(
            HistogramOpts::new(
                "passport_verifier_chain_read_duration_seconds",
                "Latency of object reads against the chain node",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["outcome"],
        )?;
        registry.register(Box::new(chain_read_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            errors_total,
            request_duration,
            chain_read_duration,
        })
    }

    pub fn observe_request(&self, endpoint: &str) {
        self.requests_total.with_label_values(&[endpoint]).inc();
    }

    pub fn observe_error(&self, endpoint: &str, code: &str) {
        self.errors_total.with_label_values(&[endpoint, code]).inc();
    }

    pub fn observe_duration(&self, endpoint: &str, started: Instant) {
        self.request_duration
            .with_label_values(&[endpoint])
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn observe_chain_read(&self, outcome: &str, started: Instant) {
        self.chain_read_duration
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn request_count(&self, endpoint: &str) -> u64 {
        self.requests_total.with_label_values(&[endpoint]).get()
    }

    pub fn error_count(&self, endpoint: &str, code: &str) -> u64 {
        self.errors_total.with_label_values(&[endpoint, code]).get()
    }

    pub fn chain_read_count(&self, outcome: &str) -> u64 {
        self.chain_read_duration
            .with_label_values(&[outcome])
            .get_sample_count()
    }

    /// All metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

pub type SharedMetrics = Arc<VerifierMetrics>;

/// Times every read that reaches the wrapped reader.
///
/// Placed under [`CachedChainReader`](crate::chain::CachedChainReader), so
/// cache hits are not counted as chain reads.
pub struct MeteredChainReader<R> {
    inner: R,
    metrics: SharedMetrics,
}

impl<R: ChainReader> MeteredChainReader<R> {
    pub fn new(inner: R, metrics: SharedMetrics) -> Self {
        Self { inner, metrics }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: ChainReader> ChainReader for MeteredChainReader<R> {
    async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError> {
        let started = Instant::now();
        let result = self.inner.read_object(id).await;
        let outcome = match &result {
            Ok(Some(_)) => "found",
            Ok(None) => "missing",
            Err(_) => "error",
        };
        self.metrics.observe_chain_read(outcome, started);
        result
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.inner.latest_block().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapChain(HashMap<ObjectId, Vec<u8>>);

    #[async_trait]
    impl ChainReader for MapChain {
        async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError> {
            Ok(self.0.get(id).cloned())
        }

        async fn latest_block(&self) -> Result<u64, ChainError> {
            Ok(1)
        }
    }

    #[test]
    fn test_counters() {
        let metrics = VerifierMetrics::new().unwrap();
        assert_eq!(metrics.request_count("session_token"), 0);

        metrics.observe_request("session_token");
        metrics.observe_request("session_token");
        metrics.observe_error("session_token", "no_access");
        metrics.observe_duration("session_token", Instant::now());

        assert_eq!(metrics.request_count("session_token"), 2);
        assert_eq!(metrics.error_count("session_token", "no_access"), 1);
        assert_eq!(metrics.error_count("session_token", "invalid_ptb"), 0);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("passport_verifier_requests_total{endpoint=\"session_token\"} 2"));
        assert!(text.contains("passport_verifier_request_duration_seconds_count"));
    }

    #[tokio::test]
    async fn test_metered_reader_labels_outcome() {
        let present = ObjectId::new([1; 32]);
        let chain = MapChain(HashMap::from([(present, vec![0u8; 4])]));
        let metrics = Arc::new(VerifierMetrics::new().unwrap());
        let reader = MeteredChainReader::new(chain, metrics.clone());

        assert!(reader.read_object(&present).await.unwrap().is_some());
        assert!(reader.read_object(&ObjectId::new([2; 32])).await.unwrap().is_none());
        assert_eq!(reader.latest_block().await.unwrap(), 1);

        assert_eq!(metrics.chain_read_count("found"), 1);
        assert_eq!(metrics.chain_read_count("missing"), 1);
        assert_eq!(metrics.chain_read_count("error"), 0);
    }
}
