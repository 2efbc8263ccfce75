//! Failure classification for retry decisions

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Closed set of delivery failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request or connect timed out
    Timeout,
    /// Connection refused, reset, or aborted
    ConnectionFailure,
    /// Certificate verification failed
    TlsPermanent,
    /// Peer spoke something other than TLS (e.g. plain HTTP on an https URL)
    ProtocolMismatch,
    /// Upstream answered with a non-2xx status
    UpstreamStatus(u16),
    /// Caller cancelled or its deadline passed
    Cancelled,
    /// Anything not recognised above
    Unknown,
}

impl FailureKind {
    /// Whether another attempt has a reasonable chance of succeeding.
    ///
    /// Unknown failures are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::ConnectionFailure => true,
            FailureKind::UpstreamStatus(status) => *status == 429 || (500..=599).contains(status),
            FailureKind::TlsPermanent
            | FailureKind::ProtocolMismatch
            | FailureKind::Cancelled
            | FailureKind::Unknown => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::ConnectionFailure => f.write_str("connection failure"),
            FailureKind::TlsPermanent => f.write_str("tls verification failure"),
            FailureKind::ProtocolMismatch => f.write_str("protocol mismatch"),
            FailureKind::UpstreamStatus(status) => write!(f, "upstream status {status}"),
            FailureKind::Cancelled => f.write_str("cancelled"),
            FailureKind::Unknown => f.write_str("unknown"),
        }
    }
}

/// Classify a transport error returned by the HTTP client
pub fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if let Some(kind) = classify_cause(err) {
        return kind;
    }

    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::ConnectionFailure
    } else {
        FailureKind::Unknown
    }
}

/// Walk an error's source chain looking for TLS or socket failures.
///
/// `io::Error::source()` skips a custom payload, so an `io::Error` carrying
/// one is descended into through `get_ref()`. The client stacks these
/// (`Other` around `InvalidData` around the TLS error).
pub fn classify_cause(err: &(dyn StdError + 'static)) -> Option<FailureKind> {
    let mut current = Some(err);
    while let Some(cause) = current {
        if let Some(tls) = cause.downcast_ref::<rustls::Error>() {
            return Some(tls_kind(tls));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if let Some(kind) = socket_kind(io_err.kind()) {
                return Some(kind);
            }
            if let Some(inner) = io_err.get_ref() {
                current = Some(inner as &(dyn StdError + 'static));
                continue;
            }
        }
        current = cause.source();
    }
    None
}

fn socket_kind(kind: io::ErrorKind) -> Option<FailureKind> {
    match kind {
        io::ErrorKind::TimedOut => Some(FailureKind::Timeout),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrNotAvailable => Some(FailureKind::ConnectionFailure),
        _ => None,
    }
}

fn tls_kind(err: &rustls::Error) -> FailureKind {
    match err {
        rustls::Error::InvalidCertificate(_)
        | rustls::Error::NoCertificatesPresented
        | rustls::Error::UnsupportedNameType => FailureKind::TlsPermanent,
        rustls::Error::InvalidMessage(_)
        | rustls::Error::InappropriateMessage { .. }
        | rustls::Error::InappropriateHandshakeMessage { .. }
        | rustls::Error::PeerSentOversizedRecord
        | rustls::Error::PeerIncompatible(_) => FailureKind::ProtocolMismatch,
        _ => FailureKind::Unknown,
    }
}
