//! Unified error handling for the relay daemon.
//!
//! One enum per concern, each with a static `error_code()` used as a metric
//! label. Nothing in here is fatal: callers log, count and carry on.

use relay_proto::ProtoError;
use thiserror::Error;

// ============================================================================
// Bus Errors
// ============================================================================

/// Errors raised by a [`Bus`](crate::bus::Bus) implementation.
#[derive(Debug, Error)]
pub enum BusError {
    /// Consumers are driven by tokio tasks; there was no runtime to spawn on.
    #[error("no tokio runtime available to drive consumer for {0}")]
    NoRuntime(String),

    #[error("invalid bus topic: {0:?}")]
    InvalidTopic(String),
}

impl BusError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoRuntime(_) => "no_runtime",
            Self::InvalidTopic(_) => "invalid_topic",
        }
    }
}

// ============================================================================
// Lock Errors
// ============================================================================

/// Errors raised by a [`LockService`](crate::election::LockService).
#[derive(Debug, Error)]
pub enum LockError {
    #[error("invalid lock name: {0:?}")]
    InvalidName(String),
}

// ============================================================================
// Bridge Errors
// ============================================================================

/// Errors raised while talking to the external chat webhook.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected message with status {0}")]
    Status(u16),

    #[error("bridge is not configured for outgoing messages")]
    NotConfigured,
}

impl BridgeError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status(_) => "status",
            Self::NotConfigured => "not_configured",
        }
    }
}

/// Rejections of an inbound webhook post.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IncomingError {
    #[error("missing form field: {0}")]
    MissingField(&'static str),

    #[error("invalid webhook token")]
    BadToken,
}

impl IncomingError {
    /// HTTP status returned to the webhook caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingField(_) => 400,
            Self::BadToken => 403,
        }
    }
}

// ============================================================================
// Relay Errors (registry / router)
// ============================================================================

/// Errors surfaced by the registry and the HTTP boundary.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// A message had neither a recipient nor a channel.
    #[error("message has no recipient and no channel")]
    Unaddressed,
}

impl RelayError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Bus(e) => e.error_code(),
            Self::Proto(e) => e.error_code(),
            Self::Unaddressed => "unaddressed",
        }
    }
}
