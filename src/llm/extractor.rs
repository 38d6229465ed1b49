use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::error::{ReportError, Result};
use crate::llm::prompts::{build_extraction_request, EXTRACTION_SYSTEM_PROMPT};
use crate::llm::types::{BackendError, ExtractionBackend};
use crate::schema::SheetExtraction;
use crate::sheet::RawRow;
use crate::taxonomy::Taxonomy;

/// Injectable delay so tests can exercise backoff without real waiting.
pub type DelayFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

fn default_delay() -> DelayFn {
    Arc::new(|duration| Box::pin(tokio::time::sleep(duration)))
}

/// Issues the structured extraction call with bounded retries and
/// exponential backoff. Every attempt is a fresh, independent call.
pub struct PositionExtractor<B> {
    backend: B,
    max_attempts: u32,
    base_backoff: Duration,
    delay: DelayFn,
}

impl<B: ExtractionBackend> PositionExtractor<B> {
    pub fn new(backend: B, config: &ExtractionConfig) -> Self {
        Self {
            backend,
            max_attempts: config.max_attempts.max(1),
            base_backoff: config.base_backoff,
            delay: default_delay(),
        }
    }

    pub fn with_delay_fn(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }

    /// One extraction run over the given rows against the given taxonomy
    /// snapshot. Transient failures (throttling, timeouts, schema-invalid
    /// responses) are retried up to the configured bound; configuration
    /// rejections fail immediately without consuming the retry budget.
    pub async fn extract(&self, rows: &[RawRow], taxonomy: &Taxonomy) -> Result<SheetExtraction> {
        let user_prompt = build_extraction_request(rows, taxonomy);
        let schema = SheetExtraction::gemini_response_schema()
            .map_err(|e| ReportError::ExtractionConfig(format!("response schema: {}", e)))?;

        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let backoff = self.base_backoff * 2u32.saturating_pow(attempt - 2);
                debug!(
                    "Retrying extraction (attempt {}/{}) after {:?}",
                    attempt, self.max_attempts, backoff
                );
                (self.delay)(backoff).await;
            }

            match self
                .backend
                .generate(EXTRACTION_SYSTEM_PROMPT, &user_prompt, schema.clone())
                .await
            {
                Ok(raw) => match parse_extraction(&raw) {
                    Ok(extraction) => {
                        info!(
                            "Extraction succeeded on attempt {}: {} claims, {} excluded by model",
                            attempt,
                            extraction.positions.len(),
                            extraction.excluded.len()
                        );
                        return Ok(extraction);
                    }
                    Err(reason) => {
                        warn!("Attempt {} returned invalid output: {}", attempt, reason);
                        last_error = reason;
                    }
                },
                Err(BackendError::Fatal(reason)) => {
                    return Err(ReportError::ExtractionConfig(reason));
                }
                Err(BackendError::Transient(reason)) => {
                    warn!("Attempt {} failed: {}", attempt, reason);
                    last_error = reason;
                }
            }
        }

        Err(ReportError::ExtractionUnavailable {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

/// A response that parses as JSON but violates the output schema is a
/// retryable failure, never silently coerced.
fn parse_extraction(raw: &str) -> std::result::Result<SheetExtraction, String> {
    serde_json::from_str(clean_json_output(raw))
        .map_err(|e| format!("schema-invalid response: {}", e))
}

fn clean_json_output(raw: &str) -> &str {
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            return &raw[start..=end];
        }
    }
    raw.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn valid_payload() -> String {
        r#"{
            "positions": [
                {"code": "cash_and_equivalents", "current": 100.0, "previous": 90.0, "justification": "Cash row"}
            ],
            "excluded": [
                {"label": "Total Assets", "reason": "calculated subtotal"}
            ]
        }"#
        .to_string()
    }

    struct StubBackend {
        fail_times: u32,
        calls: Arc<AtomicU32>,
        responses: Vec<String>,
    }

    impl StubBackend {
        fn failing(fail_times: u32, calls: Arc<AtomicU32>) -> Self {
            Self {
                fail_times,
                calls,
                responses: vec![valid_payload()],
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for StubBackend {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _response_schema: serde_json::Value,
        ) -> std::result::Result<String, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(BackendError::Transient("rate limited".to_string()));
            }
            let idx = ((call - self.fail_times) as usize).min(self.responses.len() - 1);
            Ok(self.responses[idx].clone())
        }
    }

    struct FatalBackend {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ExtractionBackend for FatalBackend {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _response_schema: serde_json::Value,
        ) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Fatal("invalid API key".to_string()))
        }
    }

    fn no_delay() -> DelayFn {
        Arc::new(|_| Box::pin(async {}))
    }

    fn config(max_attempts: u32) -> ExtractionConfig {
        ExtractionConfig::new("stub-model", "stub-key").with_max_attempts(max_attempts)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = StubBackend::failing(2, calls.clone());
        let extractor = PositionExtractor::new(backend, &config(3)).with_delay_fn(no_delay());

        let extraction = extractor
            .extract(&[], &Taxonomy::standard())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(extraction.positions.len(), 1);
        assert_eq!(extraction.excluded.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_with_unavailable() {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = StubBackend::failing(3, calls.clone());
        let extractor = PositionExtractor::new(backend, &config(3)).with_delay_fn(no_delay());

        let result = extractor.extract(&[], &Taxonomy::standard()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(ReportError::ExtractionUnavailable { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_fatal_failure_skips_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = FatalBackend {
            calls: calls.clone(),
        };
        let extractor = PositionExtractor::new(backend, &config(5)).with_delay_fn(no_delay());

        let result = extractor.extract(&[], &Taxonomy::standard()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ReportError::ExtractionConfig(_))));
    }

    #[tokio::test]
    async fn test_schema_invalid_response_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = StubBackend {
            fail_times: 0,
            calls: calls.clone(),
            // Parses as JSON but misses required fields, then a wrong type,
            // then a valid payload.
            responses: vec![
                r#"{"positions": []}"#.to_string(),
                r#"{"positions": [{"code": "cash_and_equivalents", "current": "100", "previous": null, "justification": "x"}], "excluded": []}"#.to_string(),
                valid_payload(),
            ],
        };
        let extractor = PositionExtractor::new(backend, &config(5)).with_delay_fn(no_delay());

        let extraction = extractor
            .extract(&[], &Taxonomy::standard())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(extraction.positions[0].code, "cash_and_equivalents");
    }

    #[tokio::test]
    async fn test_backoff_grows_exponentially() {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = StubBackend::failing(3, calls.clone());

        let recorded: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = recorded.clone();
        let delay: DelayFn = Arc::new(move |duration| {
            sink.lock().unwrap().push(duration);
            Box::pin(async {})
        });

        let config = config(4).with_base_backoff(Duration::from_millis(100));
        let extractor = PositionExtractor::new(backend, &config).with_delay_fn(delay);
        extractor
            .extract(&[], &Taxonomy::standard())
            .await
            .unwrap();

        let delays = recorded.lock().unwrap().clone();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn test_clean_json_output_strips_fences() {
        let fenced = "```json\n{\"positions\": []}\n```";
        assert_eq!(clean_json_output(fenced), "{\"positions\": []}");
        assert_eq!(clean_json_output("  plain  "), "plain");
    }
}
