//! Hive - embeddable HTTP/1.1 server building blocks
//!
//! A line-oriented request parser, single-listener servers with exact-match
//! routing, and a server pool that fans gateway traffic out across a fixed
//! set of member listeners.

pub mod config;
pub mod error;
pub mod http;
pub mod pool;
pub mod server;

pub use error::{Error, Result};
