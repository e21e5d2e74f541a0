//! Connection-side command driving
//!
//! A [`Connection`] owns one cookie, the readiness channel its event
//! loop drains, and the response stream for the commands it executes.
//! [`Connection::execute`] is the event-loop driver for one command: it
//! re-drives the command context after each completed asynchronous
//! action and maps domain errors to responses.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};

use super::command::CommandContext;
use super::notify::{Cookie, CookieHandle, CookieRegistry};
use super::types::EngineStatus;

/// Connection lifecycle states the core cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready to execute the next command
    NewCmd,
    /// Tearing down
    Closing,
}

/// One client connection as seen by the executor core.
pub struct Connection {
    cookie: Cookie,
    registry: Arc<CookieRegistry>,
    ready_rx: Receiver<CookieHandle>,
    state: ConnectionState,
    responses: Vec<EngineStatus>,
    /// Guards against a second response for the current command
    responded: bool,
}

impl Connection {
    /// Register a new connection with the cookie registry.
    pub fn open(registry: Arc<CookieRegistry>) -> Self {
        let (ready_tx, ready_rx) = unbounded();
        let cookie = registry.register(ready_tx);
        Self {
            cookie,
            registry,
            ready_rx,
            state: ConnectionState::NewCmd,
            responses: Vec::new(),
            responded: false,
        }
    }

    /// This connection's cookie
    #[inline(always)]
    pub fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    /// Current lifecycle state
    #[inline(always)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Responses written so far, in order
    pub fn responses(&self) -> &[EngineStatus] {
        &self.responses
    }

    /// Reset the per-command response guard before driving a new command.
    pub fn begin_command(&mut self) {
        self.responded = false;
    }

    /// Write one response for the current command.
    ///
    /// A context that reached its terminal state writes exactly one
    /// response; a second write is a logged no-op, never a duplicate on
    /// the wire.
    pub fn send_response(&mut self, status: EngineStatus) {
        if self.responded {
            log::error!(
                "Dropping duplicate response {} for {}",
                status,
                self.cookie.handle()
            );
            return;
        }
        self.responded = true;
        self.responses.push(status);
    }

    /// Drive one command to completion.
    ///
    /// Steps the context until it stops returning `WouldBlock`; each
    /// `WouldBlock` parks this thread on the readiness channel until a
    /// worker's notification arrives, then re-drives exactly once per
    /// completed asynchronous action. Domain errors are mapped to a
    /// response here; `Disconnect` moves the connection to `Closing`.
    pub fn execute(&mut self, ctx: &mut dyn CommandContext) -> EngineStatus {
        self.begin_command();
        loop {
            let status = ctx.step(self);
            match status {
                EngineStatus::Success => return status,
                EngineStatus::WouldBlock => {
                    self.cookie.set_ewouldblock(true);
                    match self.ready_rx.recv_timeout(Duration::from_secs(5)) {
                        Ok(_handle) => continue,
                        Err(_) => {
                            // Transport-level timeout: force a disconnect.
                            log::warn!(
                                "Timed out waiting for notification on {}",
                                self.cookie.handle()
                            );
                            self.state = ConnectionState::Closing;
                            return EngineStatus::Disconnect;
                        }
                    }
                }
                EngineStatus::Disconnect => {
                    self.state = ConnectionState::Closing;
                    return status;
                }
                err => {
                    // Domain failure: the response-writing layer maps it
                    // to a protocol status and the connection stays open.
                    self.send_response(err);
                    return err;
                }
            }
        }
    }

    /// Tear the connection down. Any task still in flight completes
    /// against its copied inputs; its notification will find a stale
    /// handle and back off.
    pub fn disconnect(&mut self) {
        self.registry.unregister(self.cookie.handle());
        self.state = ConnectionState::Closing;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Unregistering is generation-guarded, so this is a no-op when
        // disconnect() already ran.
        self.registry.unregister(self.cookie.handle());
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("cookie", &self.cookie.handle())
            .field("state", &self.state)
            .field("responses", &self.responses.len())
            .finish()
    }
}
