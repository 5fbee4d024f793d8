//! lingopipe-openai — chat-completions transport for OpenAI-compatible APIs.
//!
//! Implements [`TranslateTransport`] against the `/v1/chat/completions`
//! surface exposed by OpenAI, Google's OpenAI-compatibility layer, and
//! most self-hosted gateways. Handles prompt construction, request-level
//! retry with `Retry-After` support, and round-robin API key rotation.
//!
//! [`TranslateTransport`]: lingopipe_core::TranslateTransport

pub mod client;
pub mod keys;
pub mod prompt;

pub use client::{OpenAiClient, OpenAiConfig};
pub use keys::{mask_key, mask_keys, KeyRing};
pub use prompt::{build_prompt, ChatMessage};
