//! Round-robin member selection.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};

/// Cyclic cursor over a fixed, non-empty list of member ports.
///
/// Clones share the cursor, so the pool and its gateway's handlers see the
/// same sequence.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    ports: Arc<[u16]>,
    cursor: Arc<Mutex<usize>>,
}

impl RoundRobin {
    pub fn new(ports: Vec<u16>) -> Result<Self> {
        if ports.is_empty() {
            return Err(Error::NoMembers);
        }
        Ok(Self {
            ports: ports.into(),
            cursor: Arc::new(Mutex::new(0)),
        })
    }

    /// Returns the port under the cursor and advances it by one.
    pub fn next_port(&self) -> u16 {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let port = self.ports[*cursor];
        *cursor = (*cursor + 1) % self.ports.len();
        port
    }

    /// Index the next call to [`next_port`](Self::next_port) will use.
    pub fn position(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
