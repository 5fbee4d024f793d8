//! The `TranslateTransport` trait — the abstraction every provider implements.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TranslateError;

/// The central async trait every translation backend must implement.
///
/// The dispatcher hands a transport one serialized NDJSON payload at a time
/// and expects the provider's raw textual reply. Request-level concerns
/// (retry, credentials, endpoints) live inside the implementation; decoding
/// and validation of the reply live outside it.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks, and the
/// trait is object-safe: the dispatcher stores it as `Arc<dyn
/// TranslateTransport>`.
#[async_trait]
pub trait TranslateTransport: Send + Sync + 'static {
    /// Translate one batch payload and return the provider's raw reply text.
    ///
    /// `cancel` is the job's cancellation signal: implementations must stop
    /// retrying and abort backoff sleeps once it fires, returning
    /// [`TranslateError::Canceled`].
    async fn translate(
        &self,
        source_lang: &str,
        target_lang: &str,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError>;

    /// Return the transport's identifier (model or provider name).
    fn name(&self) -> &str;
}
