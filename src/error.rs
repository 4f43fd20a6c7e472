//! Error types for socket setup operations.
//!
//! Byte-moving calls return plain [`std::io::Result`]; everything that
//! creates, binds, resolves, connects or tunes a socket reports through
//! [`SocketError`] so callers can tell a name-resolution failure apart from
//! a refused connection or a port already in use.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failure of a socket setup operation.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The OS refused to create a socket (descriptor exhaustion, bad family).
    #[error("cannot open socket: {0}")]
    Create(#[source] io::Error),

    /// Binding to the local address failed, usually because the port is taken.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Querying the bound local name failed.
    #[error("cannot get socket name: {0}")]
    LocalName(#[source] io::Error),

    /// A host name or address string did not resolve.
    #[error("cannot resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The blocking connect failed.
    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Marking the socket passive failed.
    #[error("listen() failed: {0}")]
    Listen(#[source] io::Error),

    /// Waiting for or accepting a pending connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// One or more TCP options could not be applied. Every option was still
    /// attempted; the names listed are the ones that failed.
    #[error("failed to set socket options: {}", .0.join(", "))]
    Options(Vec<&'static str>),

    /// The handle was BAD (never opened, or already closed).
    #[error("operation on a bad socket handle")]
    BadHandle,

    /// Any other OS-level failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SocketError {
    /// Underlying `ErrorKind`, when the failure came from the OS.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            SocketError::Create(e)
            | SocketError::LocalName(e)
            | SocketError::Listen(e)
            | SocketError::Accept(e)
            | SocketError::Io(e) => Some(e.kind()),
            SocketError::Bind { source, .. }
            | SocketError::Resolve { source, .. }
            | SocketError::Connect { source, .. } => Some(source.kind()),
            SocketError::Options(_) | SocketError::BadHandle => None,
        }
    }
}

/// Result type alias using SocketError.
pub type Result<T> = std::result::Result<T, SocketError>;
