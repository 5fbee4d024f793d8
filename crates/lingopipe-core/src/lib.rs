//! lingopipe-core — batching, decoding and dispatch engine for Lingopipe.
//!
//! # Overview
//!
//! Lingopipe submits large ordered collections of short text records to an
//! LLM-backed translation service in bounded-size NDJSON batches, under
//! concurrency, rate limits and unreliable responses. The core crate defines:
//!
//! - [`Record`] / [`WireItem`] / [`ParsedLine`] — wire types
//! - [`build_batches`] — size-bounded batch construction
//! - [`decode`] — resilient tiered decoder for free-text model output
//! - [`validate_batch`] — exact id-set validation per batch
//! - [`TranslateTransport`] — the central async trait every transport implements
//! - [`Dispatcher`] — bounded-concurrency batch execution with first-error-wins
//!   cancellation
//! - [`policy`] module — retry backoff and rate limiter
//! - [`TranslateError`] — structured error type

pub mod batch;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod language;
pub mod policy;
pub mod record;
pub mod transport;
pub mod validator;

pub use batch::{build_batches, Batch};
pub use decoder::{decode, Decoded};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DecodeError, TranslateError};
pub use record::{apply_translations, ParsedLine, Record, WireItem};
pub use transport::TranslateTransport;
pub use validator::validate_batch;
