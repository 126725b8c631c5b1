//! Lifecycle and resource errors for servers and pools.

use crate::pool::PoolState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("port {0} is already bound")]
    PortInUse(u16),

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server on port {0} is already started")]
    AlreadyStarted(u16),

    #[error("server on port {0} is still running")]
    StillRunning(u16),

    #[error("server on port {0} has been disposed")]
    Disposed(u16),

    #[error("server on port {0} was already disposed")]
    AlreadyDisposed(u16),

    #[error("a server pool needs at least one member")]
    NoMembers,

    #[error("member port derived from gateway port {gateway} overflows (member {index})")]
    PortRange { gateway: u16, index: usize },

    #[error("port {0} is allocated twice in the pool")]
    PortCollision(u16),

    #[error("cannot {operation} a pool in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PoolState,
    },

    #[error("pool start failed on port {port}: {source}")]
    PoolStart {
        port: u16,
        #[source]
        source: Box<Error>,
    },

    #[error("route '{resource}' could not be registered on ports {ports:?}")]
    RouteBroadcast { resource: String, ports: Vec<u16> },

    #[error("port buffer holds {given} entries but the pool has {needed} members")]
    BufferTooSmall { given: usize, needed: usize },

    /// An internal invariant was broken. Callers should treat this as fatal.
    #[error("unrecoverable: {0}")]
    Unrecoverable(&'static str),
}
