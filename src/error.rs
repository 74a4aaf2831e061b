use std::io;
use std::net::SocketAddr;

use thiserror::Error;


/// Error returned when a `Config` can't be turned into a sender
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Endpoint is not a `host:port` pair or the host can't be resolved
    #[error("invalid carbon endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        /// The endpoint as it was configured
        endpoint: String,
        /// Parse or resolver error
        #[source]
        source: io::Error,
    },
    /// Endpoint resolved successfully but yielded no addresses
    #[error("carbon endpoint {0:?} resolves to no addresses")]
    NoAddress(String),
    /// Every send would fail with a negative timeout, so it's rejected early
    #[error("carbon timeout must not be negative, got {0}ms")]
    NegativeTimeout(i64),
}

/// Error of a single send
///
/// There are no retries underneath: a send either delivered the whole
/// payload to the socket or failed with one of these.
#[derive(Debug, Error)]
pub enum SendError {
    /// Could not establish a connection within the timeout
    #[error("can't connect to carbon at {address}: {source}")]
    Dial {
        /// Address of the carbon backend
        address: SocketAddr,
        /// Underlying error, `TimedOut` if the timeout has fired
        #[source]
        source: io::Error,
    },
    /// Write failed or has not finished before the deadline
    ///
    /// The connection is closed and never returned to the pool.
    #[error("error writing to carbon at {address} after {written} bytes: \
             {source}")]
    Write {
        /// Address of the carbon backend
        address: SocketAddr,
        /// Bytes of the payload accepted by the socket before the failure
        written: usize,
        /// Underlying error, `TimedOut` if the deadline has passed
        #[source]
        source: io::Error,
    },
}

impl SendError {
    /// Returns true if no connection could be established
    pub fn is_dial(&self) -> bool {
        match *self {
            SendError::Dial { .. } => true,
            SendError::Write { .. } => false,
        }
    }
    /// Returns true if a connection was acquired but the write failed
    pub fn is_write(&self) -> bool {
        !self.is_dial()
    }
    /// Returns true if the failure was caused by the timeout
    pub fn is_timeout(&self) -> bool {
        match *self {
            SendError::Dial { ref source, .. } |
            SendError::Write { ref source, .. }
            => source.kind() == io::ErrorKind::TimedOut,
        }
    }
    /// Number of bytes written before the failure (zero for dial errors)
    pub fn written(&self) -> usize {
        match *self {
            SendError::Dial { .. } => 0,
            SendError::Write { written, .. } => written,
        }
    }
}
