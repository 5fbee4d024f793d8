//! Concurrent batch dispatch with shared pacing and first-error cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::decoder::decode;
use crate::error::TranslateError;
use crate::policy::{run_with_retry, Outcome, RateLimiter, RetryConfig};
use crate::record::serialize_payload;
use crate::transport::TranslateTransport;
use crate::validator::validate_batch;

/// Configuration for a translation job's dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of workers pulling batches concurrently.
    pub concurrency: usize,
    /// Request starts per second across all workers. Non-positive disables
    /// pacing.
    pub rps: f64,
    /// Retry budget for batches whose response failed decode or validation.
    /// Independent of the transport's request-level retry.
    pub batch_retry: RetryConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            rps: 4.0,
            batch_retry: RetryConfig::batch_defaults(),
        }
    }
}

/// Runs a job's batches through a transport and assembles the result map.
pub struct Dispatcher {
    transport: Arc<dyn TranslateTransport>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn TranslateTransport>, config: DispatcherConfig) -> Self {
        Self { transport, config }
    }

    /// Translate every batch and return the merged id → translated text map.
    ///
    /// Workers claim batches in production order from a shared cursor. The
    /// first batch failure wins: it cancels the remaining work and becomes
    /// the job's error. External cancellation via `cancel` yields
    /// [`TranslateError::Canceled`] unless a causal batch error was already
    /// recorded.
    pub async fn run(
        &self,
        source_lang: &str,
        target_lang: &str,
        batches: Vec<Batch>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<u32, String>, TranslateError> {
        if batches.is_empty() {
            return Ok(HashMap::new());
        }

        // Child token: a failing worker cancels its siblings without
        // affecting the caller's token.
        let job_cancel = cancel.child_token();
        let limiter = RateLimiter::new(self.config.rps);
        let cursor = AtomicUsize::new(0);
        let remaining = AtomicI64::new(batches.len() as i64);
        let results: Mutex<HashMap<u32, String>> = Mutex::new(HashMap::new());
        let first_err: Mutex<Option<TranslateError>> = Mutex::new(None);

        let concurrency = self.config.concurrency.max(1).min(batches.len());
        tracing::info!(
            batches = batches.len(),
            workers = concurrency,
            transport = self.transport.name(),
            "dispatching translation job"
        );

        let workers = (0..concurrency).map(|_| {
            let job_cancel = job_cancel.clone();
            let batches = &batches;
            let limiter = &limiter;
            let cursor = &cursor;
            let remaining = &remaining;
            let results = &results;
            let first_err = &first_err;
            async move {
                loop {
                    let i = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(batch) = batches.get(i) else {
                        return;
                    };
                    if job_cancel.is_cancelled() {
                        return;
                    }
                    match self
                        .translate_batch(source_lang, target_lang, batch, limiter, &job_cancel)
                        .await
                    {
                        Ok(lines) => {
                            let mut map = results.lock().unwrap();
                            for line in lines {
                                map.insert(line.idx, line.text);
                            }
                            drop(map);
                            let left = remaining.fetch_sub(1, Ordering::Relaxed) - 1;
                            tracing::info!(batch = i, remaining = left, "batch translated");
                        }
                        Err(err) => {
                            // A worker canceled by a sibling's failure must
                            // not displace the causal error.
                            if !matches!(err, TranslateError::Canceled) {
                                let mut slot = first_err.lock().unwrap();
                                if slot.is_none() {
                                    tracing::error!(batch = i, error = %err, "batch failed");
                                    *slot = Some(err);
                                }
                            }
                            job_cancel.cancel();
                            return;
                        }
                    }
                }
            }
        });
        join_all(workers).await;

        if let Some(err) = first_err.lock().unwrap().take() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(TranslateError::Canceled);
        }
        Ok(results.into_inner().unwrap())
    }

    async fn translate_batch(
        &self,
        source_lang: &str,
        target_lang: &str,
        batch: &Batch,
        limiter: &RateLimiter,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::record::ParsedLine>, TranslateError> {
        // One token per batch: transport-level retries are paced by their
        // own backoff, not re-charged here.
        limiter.acquire(cancel).await?;
        let payload = serialize_payload(&batch.ids, &batch.texts)?;

        run_with_retry(&self.config.batch_retry, cancel, |attempt| {
            let payload = payload.clone();
            async move {
                let raw = match self
                    .transport
                    .translate(source_lang, target_lang, &payload, cancel)
                    .await
                {
                    Ok(raw) => raw,
                    // The transport already exhausted its own retry budget.
                    Err(err) => return Outcome::Fatal(err),
                };
                let decoded = match decode(&raw) {
                    Ok(decoded) => decoded,
                    Err(err) => return batch_outcome(err.into()),
                };
                if decoded.salvaged > 0 {
                    tracing::warn!(
                        attempt,
                        salvaged = decoded.salvaged,
                        "repaired malformed lines in batch response"
                    );
                }
                match validate_batch(&batch.ids, &decoded.lines) {
                    Ok(()) => Outcome::Success(decoded.lines),
                    Err(err) => batch_outcome(err),
                }
            }
        })
        .await
    }
}

/// Decode/validation failures are re-rolled with the batch policy; anything
/// else ends the job.
fn batch_outcome<T>(error: TranslateError) -> Outcome<T> {
    if error.is_batch_retryable() {
        Outcome::Retryable { error, delay: None }
    } else {
        Outcome::Fatal(error)
    }
}
