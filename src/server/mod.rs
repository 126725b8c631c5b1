//! Single-listener servers.
//!
//! A [`Server`] owns one port, an exact-match routing table and an accept
//! loop that runs as its own task once started. Lifecycle events are
//! published on the [`Dispatcher`] the server was created with.

pub mod context;
pub mod dispatcher;
pub mod listener;
pub mod router;

pub use context::{Context, System};
pub use dispatcher::{Dispatcher, Event};
pub use listener::Server;
pub use router::{Handler, RouteTable, handler};
