//! Error types for fence scheduling and connection resolution.
//!
//! This module defines the central `Error` enum covering every way a logical
//! fence request can fail. Variants fall into three groups:
//!
//! - Startup: `Configuration`. Raised while building the allowlist or other
//!   process-lifetime configuration; never surfaced per request.
//! - Client-facing: `InvalidLocator`, `Forbidden`, `InvalidRequest`. Raised
//!   before any RPC is issued.
//! - Server-facing: `Transport`, `Timeout`, `WorkerFault`, `ChannelError`.
//!   Any one of these, from any part, fails the whole logical request.
//!
//! `From<Error>` for `tonic::Status` is implemented so the errors can be
//! forwarded over gRPC with matching status codes.

use core::time::Duration;
use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the fence scheduler.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Malformed process configuration, e.g. an empty allowlist entry.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// The storage locator could not be parsed into a connection.
    #[error("Invalid locator: {reason}")]
    InvalidLocator { reason: String },

    /// The storage host is not on the allowlist.
    #[error(
        "unsupported storage account: {host}. This API is configured to work \
         with a pre-defined set of storage accounts. Contact the system admin \
         to get your storage account on the allowlist"
    )]
    Forbidden { host: String },

    /// The client request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The RPC for a part failed before a worker could answer it.
    #[error("Transport error on part {part} ({code:?}): {message}")]
    Transport {
        part: usize,
        code: Code,
        message: String,
    },

    /// The RPC for a part did not complete within the per-call timeout.
    #[error("Part {part} timed out after {after:?}")]
    Timeout { part: usize, after: Duration },

    /// A worker answered with an error or with a malformed response.
    #[error("Worker fault on part {part}: {reason}")]
    WorkerFault { part: usize, reason: String },

    /// Internal channel failure between the coordinator and its dispatch
    /// tasks.
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Classifies a failed RPC for `part`.
    ///
    /// Codes produced by the channel itself (connection refused, reset,
    /// deadline) are transport errors. Anything else was reported by the
    /// worker.
    pub fn from_status(part: usize, status: &Status) -> Self {
        match status.code() {
            Code::Unavailable | Code::Unknown | Code::Cancelled | Code::DeadlineExceeded => {
                Self::Transport {
                    part,
                    code: status.code(),
                    message: status.message().to_string(),
                }
            }
            code => Self::WorkerFault {
                part,
                reason: format!("{code:?}: {}", status.message()),
            },
        }
    }

    /// Short, stable name of the variant for logs and metric labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::InvalidLocator { .. } => "invalid_locator",
            Self::Forbidden { .. } => "forbidden",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::WorkerFault { .. } => "worker_fault",
            Self::ChannelError { .. } => "channel",
        }
    }

    /// Returns `true` for errors caused by the caller's input (4xx class).
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLocator { .. } | Self::Forbidden { .. } | Self::InvalidRequest { .. }
        )
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Configuration { .. } | Error::ChannelError { .. } => Status::internal(message),
            Error::InvalidLocator { .. } | Error::InvalidRequest { .. } => {
                Status::invalid_argument(message)
            }
            Error::Forbidden { .. } => Status::permission_denied(message),
            Error::Transport { .. } => Status::unavailable(message),
            Error::Timeout { .. } => Status::deadline_exceeded(message),
            Error::WorkerFault { .. } => Status::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_codes_are_transport_errors() {
        let err = Error::from_status(2, &Status::unavailable("connection refused"));
        assert!(matches!(
            err,
            Error::Transport {
                part: 2,
                code: Code::Unavailable,
                ..
            }
        ));
    }

    #[test]
    fn worker_codes_are_faults() {
        let err = Error::from_status(1, &Status::internal("openvds: blob not found"));
        match err {
            Error::WorkerFault { part, reason } => {
                assert_eq!(part, 1);
                assert!(reason.contains("blob not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn forbidden_names_the_host() {
        let err = Error::Forbidden {
            host: "evil.blob.core.windows.net".to_string(),
        };
        assert!(err.is_client_error());
        assert!(err.to_string().contains("evil.blob.core.windows.net"));

        let status = Status::from(err);
        assert_eq!(status.code(), Code::PermissionDenied);
    }

    #[test]
    fn server_errors_are_not_client_errors() {
        let err = Error::Timeout {
            part: 0,
            after: Duration::from_secs(300),
        };
        assert!(!err.is_client_error());
        assert_eq!(Status::from(err).code(), Code::DeadlineExceeded);
    }

    #[test]
    fn kinds_are_distinct_labels() {
        let errors = [
            Error::Configuration { reason: String::new() },
            Error::InvalidLocator { reason: String::new() },
            Error::Forbidden { host: String::new() },
            Error::InvalidRequest { reason: String::new() },
            Error::Transport {
                part: 0,
                code: Code::Unavailable,
                message: String::new(),
            },
            Error::Timeout {
                part: 0,
                after: Duration::ZERO,
            },
            Error::WorkerFault {
                part: 0,
                reason: String::new(),
            },
            Error::ChannelError { context: String::new() },
        ];
        let mut kinds: Vec<_> = errors.iter().map(Error::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }
}
