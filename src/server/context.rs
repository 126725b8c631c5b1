use std::sync::Arc;

use crate::pool::balancer::RoundRobin;
use crate::server::dispatcher::Dispatcher;

/// Application-wide state handed to every handler.
#[derive(Debug)]
pub struct System {
    name: String,
    dispatcher: Dispatcher,
}

impl System {
    pub fn new(name: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            name: name.into(),
            dispatcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// What a handler knows about the server it runs on.
#[derive(Debug, Clone)]
pub struct Context {
    system: Arc<System>,
    port: u16,
    host: String,
    balancer: Option<RoundRobin>,
}

impl Context {
    pub fn new(system: Arc<System>, port: u16, host: impl Into<String>, balancer: Option<RoundRobin>) -> Self {
        Self {
            system,
            port,
            host: host.into(),
            balancer,
        }
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Port of the server running the handler.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Interface the server is bound to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Next member port in round-robin order. Only a pool gateway has one.
    pub fn next_port(&self) -> Option<u16> {
        self.balancer.as_ref().map(RoundRobin::next_port)
    }
}
