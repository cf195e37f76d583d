//! Failures while binding an endpoint or running the accept loop.

use std::io;
use std::net::SocketAddr;

#[cfg(unix)]
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced by the socket listener.
///
/// Bind failures are fatal at startup; nothing here is raised once a
/// connection has been handed to its session.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host name could not be resolved.
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no addresses.
    #[error("{host}:{port} resolved to no addresses")]
    NoAddress {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the TCP socket failed.
    #[error("cannot bind tcp://{addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// Unix endpoints were configured on a platform without them.
    #[cfg(not(unix))]
    #[error("unix endpoint {endpoint} is not supported on this platform")]
    UnixUnsupported {
        /// Configured endpoint.
        endpoint: String,
    },
    /// Binding the Unix socket failed.
    #[cfg(unix)]
    #[error("cannot bind unix://{path}: {source}")]
    BindUnix {
        /// Socket path.
        path: Utf8PathBuf,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// Another daemon is already accepting on the socket.
    #[cfg(unix)]
    #[error("another daemon is serving on {path}")]
    SocketInUse {
        /// Socket path.
        path: Utf8PathBuf,
    },
    /// The socket path exists but is not a socket, so it is left alone.
    #[cfg(unix)]
    #[error("{path} exists and is not a socket")]
    NotASocket {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Probing or removing a leftover socket failed.
    #[cfg(unix)]
    #[error("cannot clear stale socket {path}: {source}")]
    StaleSocket {
        /// Socket path.
        path: Utf8PathBuf,
        /// Probe or removal failure.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking accepts.
    #[error("cannot make listener non-blocking: {source}")]
    NonBlocking {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be started.
    #[error("cannot start accept thread: {source}")]
    Spawn {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("accept thread panicked")]
    ThreadPanic,
}
