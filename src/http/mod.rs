//! HTTP protocol implementation.
//!
//! This module turns raw socket bytes into a [`request::Request`] and writes
//! the handler's [`response::Response`] back.
//!
//! # Architecture
//!
//! - **`connection`**: Drives one exchange on an accepted socket
//! - **`parser`**: Line-oriented request parser (request line, fields, body)
//! - **`request`**: Parsed request representation
//! - **`response`**: Response handed to handlers for mutation
//! - **`writer`**: Serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Read headers (and body, after 100 Continue if asked)
//!        └──────┬──────┘
//!               │ Request parsed          (too large → 413 → Writing)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route lookup and handler call
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │
//!               ▼
//!             Closed
//! ```
//!
//! Every exchange closes its connection; there is no keep-alive.

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
