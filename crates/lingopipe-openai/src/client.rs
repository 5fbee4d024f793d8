//! OpenAI-compatible chat-completions client backed by `reqwest`.
//!
//! Features:
//! - Request-level retry with exponential backoff and `Retry-After` support
//! - Round-robin rotation across comma-separated API keys
//! - Base URL inference from well-known model name prefixes

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lingopipe_core::error::TranslateError;
use lingopipe_core::policy::{run_with_retry, Outcome, RetryConfig};
use lingopipe_core::transport::TranslateTransport;

use crate::keys::{mask_key, KeyRing};
use crate::prompt::{build_prompt, parse_content, ChatCompletionsRequest};

/// Configuration for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Endpoint base, e.g. `https://api.openai.com`. When unset it is
    /// inferred from the model name.
    pub base_url: Option<String>,
    /// A single API key or a comma-separated list rotated round-robin.
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: String::new(),
            model: String::new(),
            request_timeout: Duration::from_secs(150),
            retry: RetryConfig::default(),
        }
    }
}

/// Chat-completions transport for any OpenAI-compatible service.
#[derive(Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    keys: KeyRing,
    model: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, TranslateError> {
        let model = config.model.trim().to_string();
        if model.is_empty() {
            return Err(TranslateError::Config("model is required".into()));
        }

        let base = resolve_base_url(&model, config.base_url.as_deref())?;
        let endpoint = join_url(&base, "v1/chat/completions");

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TranslateError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            keys: KeyRing::new(&config.api_key),
            model,
            retry: config.retry,
        })
    }

    async fn attempt(
        &self,
        attempt: u32,
        body: &ChatCompletionsRequest,
        rotated: &AtomicBool,
    ) -> Outcome<String> {
        let api_key = self.keys.pick(rotated.swap(false, Ordering::SeqCst));

        let mut req = self.http.post(&self.endpoint).json(body);
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(err) => {
                let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                let error = TranslateError::Http(err.to_string());
                return if retryable {
                    Outcome::Retryable { error, delay: None }
                } else {
                    Outcome::Fatal(error)
                };
            }
        };

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let delay = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            let error = TranslateError::Api {
                status,
                body: body.trim().to_string(),
            };

            if error.is_rejection() && self.keys.len() > 1 {
                tracing::warn!(
                    attempt,
                    status,
                    rejected_key = %mask_key(api_key.unwrap_or("")),
                    keys = self.keys.len(),
                    "translation api rejected request; rotating api key"
                );
                rotated.store(true, Ordering::SeqCst);
            }

            return if rotated.load(Ordering::SeqCst) || error.is_retryable() {
                Outcome::Retryable { error, delay }
            } else {
                Outcome::Fatal(error)
            };
        }

        // Success: advance so the next request starts from the next key.
        if self.keys.len() > 1 {
            self.keys.advance();
        }

        let text = match resp.text().await {
            Ok(text) => text,
            Err(err) => {
                return Outcome::Retryable {
                    error: TranslateError::Http(err.to_string()),
                    delay: None,
                }
            }
        };
        match parse_content(&text) {
            Ok(content) => Outcome::Success(content),
            Err(error) => Outcome::Retryable { error, delay: None },
        }
    }
}

#[async_trait]
impl TranslateTransport for OpenAiClient {
    async fn translate(
        &self,
        source_lang: &str,
        target_lang: &str,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError> {
        if target_lang.trim().is_empty() {
            return Err(TranslateError::Config("target language is required".into()));
        }

        let body = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: build_prompt(source_lang, target_lang, payload),
            temperature: None,
        };

        let rotated = AtomicBool::new(false);
        run_with_retry(&self.retry, cancel, |attempt| {
            self.attempt(attempt, &body, &rotated)
        })
        .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Infer the endpoint base from well-known model prefixes when no explicit
/// base URL is configured.
fn resolve_base_url(model: &str, explicit: Option<&str>) -> Result<String, TranslateError> {
    if let Some(base) = explicit {
        let base = base.trim();
        if !base.is_empty() {
            return Ok(base.to_string());
        }
    }

    let m = model.trim().to_lowercase();
    if m.starts_with("gemini-") {
        Ok("https://generativelanguage.googleapis.com/v1beta/openai".to_string())
    } else if m.starts_with("gpt-") {
        Ok("https://api.openai.com".to_string())
    } else {
        Err(TranslateError::Config(format!(
            "cannot resolve base url for model {model:?}; set base_url explicitly"
        )))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Parse an integer-seconds `Retry-After` header. `Some(0)` means the server
/// asked for an immediate retry; `None` falls back to computed backoff.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    let secs: i64 = value.parse().ok()?;
    if secs < 0 {
        return None;
    }
    Some(Duration::from_secs(secs as u64))
}
