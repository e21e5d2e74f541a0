//! Buffer acknowledgement command context
//!
//! The simplest steppable command: drain the cookie's asynchronous
//! result, hand the acknowledged byte count to the engine (which may
//! itself start background work and would-block), and write one success
//! response when done.

use std::sync::Arc;

use super::CommandContext;
use crate::exec::connection::Connection;
use crate::exec::notify::Cookie;
use crate::exec::types::EngineStatus;

/// Engine entry point for a buffer acknowledgement. Receives the cookie
/// so it can address the eventual notification if it defers the work.
pub type AckEngineOp = Arc<dyn Fn(&Cookie, u32) -> EngineStatus + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Done,
}

/// State machine for one buffer acknowledgement command
pub struct BufferAckContext {
    state: State,
    buffer_bytes: u32,
    engine: AckEngineOp,
    /// An asynchronous engine call is outstanding; the next entry must
    /// consume its result instead of re-invoking the engine.
    pending: bool,
    completed: bool,
}

impl BufferAckContext {
    pub fn new(buffer_bytes: u32, engine: AckEngineOp) -> Self {
        Self {
            state: State::Initial,
            buffer_bytes,
            engine,
            pending: false,
            completed: false,
        }
    }

    fn initial(&mut self, conn: &mut Connection) -> EngineStatus {
        let ret = if self.pending {
            // Resumed entry: the worker stored the completion status
            // before waking us.
            self.pending = false;
            let status = conn.cookie().aiostat();
            conn.cookie().set_aiostat(EngineStatus::Success);
            conn.cookie().set_ewouldblock(false);
            status
        } else {
            (self.engine)(conn.cookie(), self.buffer_bytes)
        };

        match ret {
            EngineStatus::Success => {
                self.state = State::Done;
                EngineStatus::Success
            }
            EngineStatus::WouldBlock => {
                self.pending = true;
                EngineStatus::WouldBlock
            }
            other => other,
        }
    }

    fn done(&mut self, conn: &mut Connection) -> EngineStatus {
        self.completed = true;
        conn.send_response(EngineStatus::Success);
        EngineStatus::Success
    }
}

impl CommandContext for BufferAckContext {
    fn step(&mut self, conn: &mut Connection) -> EngineStatus {
        if self.completed {
            log::error!("step() called on completed buffer-ack context");
            return EngineStatus::InternalFailure;
        }

        let mut ret = EngineStatus::Success;
        while ret == EngineStatus::Success {
            match self.state {
                State::Initial => {
                    ret = self.initial(conn);
                }
                State::Done => return self.done(conn),
            }
        }

        if ret.is_terminal() {
            // Domain failure: finished, even though the response is
            // written by the driving layer.
            self.completed = true;
        }
        ret
    }
}
