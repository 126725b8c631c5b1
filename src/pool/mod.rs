//! Server pools
//!
//! A pool owns one gateway [`Server`] plus a fixed set of member servers.
//! Routes are broadcast to every listener, start and shutdown are applied
//! collectively, and the gateway's handlers pick members in round-robin
//! order through [`Context::next_port`](crate::server::Context::next_port).
//!
//! ```text
//!   Created ──start──▶ Started ──shutdown──▶ ShuttingDown ──dispose──▶ Disposed
//!      │                                                                  ▲
//!      └───────────────────────────── dispose ────────────────────────────┘
//! ```

pub mod balancer;
pub mod gateway;

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{PortPolicy, ServerConfig};
use crate::error::{Error, Result};
use crate::server::{Dispatcher, Event, Handler, Server, System};
use balancer::RoundRobin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Started,
    ShuttingDown,
    Disposed,
}

/// Whether [`ServerPool::handle_event`] acted on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Handled,
    Ignored,
}

/// Settings applied when a pool is created.
#[derive(Debug, Clone, Default)]
pub struct PoolOptions {
    pub port_policy: PortPolicy,
    pub server: ServerConfig,
}

pub struct ServerPool {
    gateway: Server,
    members: Vec<Server>,
    failures: Vec<AtomicU64>,
    balancer: RoundRobin,
    state: RwLock<PoolState>,
    transition: Mutex<()>,
}

impl ServerPool {
    /// Creates a pool whose gateway listens on `gateway_port` and serves
    /// `gateway_resource` with `router`, backed by `member_count` members on
    /// sequential ports.
    pub fn create(
        dispatcher: Dispatcher,
        gateway_port: u16,
        gateway_resource: &str,
        router: Handler,
        member_count: usize,
    ) -> Result<Self> {
        Self::create_with(
            dispatcher,
            gateway_port,
            gateway_resource,
            router,
            member_count,
            &PoolOptions::default(),
        )
    }

    pub fn create_with(
        dispatcher: Dispatcher,
        gateway_port: u16,
        gateway_resource: &str,
        router: Handler,
        member_count: usize,
        options: &PoolOptions,
    ) -> Result<Self> {
        if member_count == 0 {
            return Err(Error::NoMembers);
        }

        let gateway = Server::create_with(gateway_port, dispatcher.clone(), options.server.clone())?;
        let mut seen = HashSet::from([gateway.port()]);
        let mut members = Vec::with_capacity(member_count);

        for port in derive_ports(options.port_policy, gateway.port(), member_count)? {
            let member = Server::create_with(port, dispatcher.clone(), options.server.clone())?;
            if !seen.insert(member.port()) {
                return Err(Error::PortCollision(member.port()));
            }
            members.push(member);
        }

        let balancer = RoundRobin::new(members.iter().map(Server::port).collect())?;
        gateway.attach_balancer(balancer.clone())?;
        gateway.add_route(gateway_resource, router)?;

        info!(
            gateway = gateway.port(),
            members = ?balancer.ports(),
            policy = ?options.port_policy,
            "Server pool created"
        );

        Ok(Self {
            gateway,
            failures: members.iter().map(|_| AtomicU64::new(0)).collect(),
            members,
            balancer,
            state: RwLock::new(PoolState::Created),
            transition: Mutex::new(()),
        })
    }

    /// Registers `handler` on the gateway and every member.
    ///
    /// Servers that accepted the route keep it even if another one failed.
    pub fn add_route(&self, resource: &str, handler: Handler) -> Result<()> {
        let state = self.state();
        if !matches!(state, PoolState::Created | PoolState::Started) {
            return Err(Error::InvalidState {
                operation: "add a route to",
                state,
            });
        }

        let mut failed = Vec::new();
        for server in self.servers() {
            if let Err(e) = server.add_route(resource, handler.clone()) {
                warn!(port = server.port(), resource, error = %e, "Route registration failed");
                failed.push(server.port());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::RouteBroadcast {
                resource: resource.to_string(),
                ports: failed,
            })
        }
    }

    /// Starts the gateway, then every member in order. If any of them fails,
    /// the ones already started are shut down again and the pool stays in
    /// `Created`, so start may be retried.
    pub async fn start(&self, system: Arc<System>, fallback: Handler) -> Result<()> {
        let _transition = self.transition.lock().await;
        let state = self.state();
        if state != PoolState::Created {
            return Err(Error::InvalidState {
                operation: "start",
                state,
            });
        }

        let mut started: Vec<&Server> = Vec::with_capacity(self.members.len() + 1);
        for server in self.servers() {
            if let Err(e) = server.start(system.clone(), fallback.clone()).await {
                error!(
                    port = server.port(),
                    error = %e,
                    rollback = started.len(),
                    "Pool start failed, stopping servers already started"
                );
                for running in started.iter().rev() {
                    if let Err(e) = running.shutdown().await {
                        warn!(port = running.port(), error = %e, "Rollback shutdown failed");
                    }
                }
                return Err(Error::PoolStart {
                    port: server.port(),
                    source: Box::new(e),
                });
            }
            started.push(server);
        }

        self.set_state(PoolState::Started);
        info!(gateway = self.gateway.port(), members = self.members.len(), "Server pool started");
        Ok(())
    }

    /// Shuts down the gateway and every member. A pool that never started
    /// is left as it is.
    pub async fn shutdown(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        let state = self.state();

        match state {
            PoolState::Created | PoolState::ShuttingDown => Ok(()),
            PoolState::Disposed => Err(Error::InvalidState {
                operation: "shut down",
                state,
            }),
            PoolState::Started => {
                self.set_state(PoolState::ShuttingDown);

                let mut first_error = None;
                for server in self.servers() {
                    if let Err(e) = server.shutdown().await {
                        warn!(port = server.port(), error = %e, "Shutdown failed");
                        first_error.get_or_insert(e);
                    }
                }

                info!(gateway = self.gateway.port(), "Server pool stopped");
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    /// Releases every server. No server may still be running. Members that
    /// were already disposed on their own are skipped.
    pub async fn dispose(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        match self.state() {
            PoolState::Started => return Err(Error::StillRunning(self.gateway.port())),
            PoolState::Disposed => return Err(Error::AlreadyDisposed(self.gateway.port())),
            PoolState::Created | PoolState::ShuttingDown => {}
        }

        if let Some(running) = self.servers().find(|s| s.is_running()) {
            return Err(Error::StillRunning(running.port()));
        }

        let mut first_error = None;
        for server in self.servers() {
            match server.dispose().await {
                Ok(()) | Err(Error::AlreadyDisposed(_)) => {}
                Err(e) => {
                    warn!(port = server.port(), error = %e, "Dispose failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.set_state(PoolState::Disposed);
        info!(gateway = self.gateway.port(), "Server pool disposed");
        Ok(())
    }

    /// Reacts to events from the dispatcher that concern this pool.
    pub fn handle_event(&self, event: &Event) -> EventOutcome {
        match event {
            Event::ServerFailed { port, reason } => {
                if let Some(index) = self.member_index(*port) {
                    let failures = self.failures[index].fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(port, index, failures, %reason, "Pool member reported a failure");
                    EventOutcome::Handled
                } else if *port == self.gateway.port() {
                    error!(port, %reason, "Pool gateway reported a failure");
                    EventOutcome::Handled
                } else {
                    EventOutcome::Ignored
                }
            }
            Event::ServerStopped { port } if self.state() == PoolState::Started => {
                match self.member_index(*port) {
                    Some(index) => {
                        warn!(port, index, "Pool member stopped while the pool is running");
                        EventOutcome::Handled
                    }
                    None => EventOutcome::Ignored,
                }
            }
            _ => EventOutcome::Ignored,
        }
    }

    /// Port of the member under the round-robin cursor; advances the cursor.
    pub fn next_port(&self) -> u16 {
        self.balancer.next_port()
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.port()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_ports(&self) -> Vec<u16> {
        self.balancer.ports().to_vec()
    }

    /// Copies the member ports into `dst`, which must hold at least
    /// [`member_count`](Self::member_count) entries.
    pub fn copy_ports(&self, dst: &mut [u16]) -> Result<()> {
        let ports = self.balancer.ports();
        if dst.len() < ports.len() {
            return Err(Error::BufferTooSmall {
                given: dst.len(),
                needed: ports.len(),
            });
        }
        dst[..ports.len()].copy_from_slice(ports);
        Ok(())
    }

    pub fn gateway(&self) -> &Server {
        &self.gateway
    }

    pub fn member(&self, index: usize) -> Option<&Server> {
        self.members.get(index)
    }

    /// Failures reported for member `index` through [`handle_event`](Self::handle_event).
    pub fn failures(&self, index: usize) -> u64 {
        self.failures
            .get(index)
            .map_or(0, |f| f.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> PoolState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a human-readable summary of the pool to `out`.
    pub fn print(&self, out: &mut impl io::Write) -> io::Result<()> {
        write!(out, "{}", self)
    }

    fn set_state(&self, state: PoolState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn servers(&self) -> impl Iterator<Item = &Server> {
        std::iter::once(&self.gateway).chain(self.members.iter())
    }

    fn member_index(&self, port: u16) -> Option<usize> {
        self.members.iter().position(|m| m.port() == port)
    }
}

impl fmt::Display for ServerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "server pool (state: {:?}, gateway: {}, members: {}, next: {})",
            self.state(),
            self.gateway.port(),
            self.members.len(),
            self.balancer.position()
        )?;
        writeln!(
            f,
            "  gateway   port {:<5} {:<8} requests {}",
            self.gateway.port(),
            running_label(&self.gateway),
            self.gateway.request_count()
        )?;
        for (index, member) in self.members.iter().enumerate() {
            writeln!(
                f,
                "  member {:<2} port {:<5} {:<8} requests {} failures {}",
                index,
                member.port(),
                running_label(member),
                member.request_count(),
                self.failures(index)
            )?;
        }
        Ok(())
    }
}

fn running_label(server: &Server) -> &'static str {
    if server.is_running() { "running" } else { "stopped" }
}

/// Member ports for `count` members behind `gateway` under `policy`.
/// Ephemeral members get port 0, resolved when each member is created.
pub fn derive_ports(policy: PortPolicy, gateway: u16, count: usize) -> Result<Vec<u16>> {
    match policy {
        PortPolicy::Sequential => (0..count)
            .map(|index| {
                u16::try_from(index + 1)
                    .ok()
                    .and_then(|offset| gateway.checked_add(offset))
                    .ok_or(Error::PortRange { gateway, index })
            })
            .collect(),
        PortPolicy::Ephemeral => Ok(vec![0; count]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ports_follow_gateway() {
        let ports = derive_ports(PortPolicy::Sequential, 8080, 3).unwrap();
        assert_eq!(ports, vec![8081, 8082, 8083]);
    }

    #[test]
    fn sequential_ports_overflow() {
        let result = derive_ports(PortPolicy::Sequential, u16::MAX - 1, 2);
        assert!(matches!(result, Err(Error::PortRange { index: 1, .. })));
    }

    #[test]
    fn ephemeral_ports_are_os_assigned() {
        assert_eq!(derive_ports(PortPolicy::Ephemeral, 8080, 2).unwrap(), vec![0, 0]);
    }
}
