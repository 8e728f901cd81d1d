//! Typed failures surfaced by registry transports. The retry layer only looks
//! at [`RegistryError::kind`], so transports are free to attach whatever
//! source chain they have.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry answered with a non-success HTTP status.
    #[error("registry {method} returned HTTP {status}: {body}")]
    Server {
        method: &'static str,
        status: u16,
        body: String,
    },

    /// The connection could not be established (refused, reset, unreachable).
    #[error("registry {method} connection failed: {source}")]
    Connect {
        method: &'static str,
        #[source]
        source: BoxError,
    },

    /// Connect or read timed out.
    #[error("registry {method} timed out")]
    Timeout { method: &'static str },

    /// The OS refused the socket operation itself (e.g. a network policy
    /// denying egress). Retrying cannot fix this.
    #[error("registry {method} socket operation not permitted: {source}")]
    SocketRejected {
        method: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("registry {method} returned an undecodable body: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("registry {method} call failed: {source}")]
    Other {
        method: &'static str,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// Non-5xx server status (4xx, unexpected 3xx).
    ServerPermanent,
    /// 5xx server status.
    ServerTransient,
    Connect,
    Timeout,
    SocketRejected,
    Decode,
    Other,
}

impl RegistryError {
    pub fn kind(&self) -> RegistryErrorKind {
        match self {
            RegistryError::Server { status, .. } if status / 100 == 5 => {
                RegistryErrorKind::ServerTransient
            }
            RegistryError::Server { .. } => RegistryErrorKind::ServerPermanent,
            RegistryError::Connect { .. } => RegistryErrorKind::Connect,
            RegistryError::Timeout { .. } => RegistryErrorKind::Timeout,
            RegistryError::SocketRejected { .. } => RegistryErrorKind::SocketRejected,
            RegistryError::Decode { .. } => RegistryErrorKind::Decode,
            RegistryError::Other { .. } => RegistryErrorKind::Other,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            RegistryError::Server { method, .. }
            | RegistryError::Connect { method, .. }
            | RegistryError::Timeout { method }
            | RegistryError::SocketRejected { method, .. }
            | RegistryError::Decode { method, .. }
            | RegistryError::Other { method, .. } => method,
        }
    }

    /// HTTP status for `Server` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classifies a raw OS-level failure observed while talking to the
    /// registry. Permission denials become `SocketRejected`, timeouts become
    /// `Timeout`, connection-establishment failures become `Connect`, and
    /// anything else (TLS or protocol faults among them) is `Other`.
    pub fn from_io(method: &'static str, err: io::Error) -> Self {
        let kind = err.kind();
        Self::from_io_kind(method, kind, Box::new(err))
    }

    pub(crate) fn from_io_kind(
        method: &'static str,
        kind: io::ErrorKind,
        source: BoxError,
    ) -> Self {
        match kind {
            io::ErrorKind::PermissionDenied => RegistryError::SocketRejected { method, source },
            io::ErrorKind::TimedOut => RegistryError::Timeout { method },
            kind if is_connection_kind(kind) => RegistryError::Connect { method, source },
            _ => RegistryError::Other { method, source },
        }
    }
}

/// Socket failures that mean the registry was unreachable or dropped the
/// connection, as opposed to rejecting what was sent.
fn is_connection_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Returns the kind of the first `io::Error` found while walking `err`'s
/// source chain.
pub(crate) fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(candidate) = current {
        if let Some(io_err) = candidate.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = candidate.source();
    }
    None
}
