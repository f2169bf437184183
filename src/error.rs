//! Error types for the notification pipeline.
//!
//! Every variant here is recoverable: the orchestrator logs it, leaves the
//! subscription's stored state alone and moves on to the next row.

use thiserror::Error;

/// Problems with configuration or stored per-subscription data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The credential sheet has no entry for the subscription's target.
    #[error("no credential for target `{0}`")]
    MissingCredential(String),

    /// The stored dedup state could not be parsed for the active policy.
    #[error("invalid dedup state `{raw}`: {reason}")]
    InvalidState { raw: String, reason: String },

    /// Application configuration rejected during validation.
    #[error("configuration error: {0}")]
    Invalid(String),
}

/// Feed could not be fetched or understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("feed transport error: {0}")]
    Transport(String),

    #[error("feed returned HTTP {0}")]
    HttpStatus(u16),

    #[error("feed too large: {0} bytes")]
    TooLarge(usize),

    #[error("feed parse error: {0}")]
    Parse(String),
}

/// A batch was not confirmed by the destination.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("destination returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("delivery transport error: {0}")]
    Transport(String),

    #[error("could not encode payload: {0}")]
    Encode(String),
}

/// The translation collaborator failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translation transport error: {0}")]
    Transport(String),

    #[error("translation service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("unexpected translation response: {0}")]
    BadResponse(String),

    #[error("daily translation quota of {0} calls exhausted")]
    QuotaExhausted(u32),
}
