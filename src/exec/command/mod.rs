//! Suspend/resume command execution
//!
//! Commands that may need background work are modeled as explicit state
//! machines driven by repeated [`CommandContext::step`] calls. Each
//! state's handler either completes synchronously (the machine advances
//! and the step loop continues) or starts one asynchronous action and
//! returns `WouldBlock`, parking the connection until the notification
//! channel re-drives it. Collapsing consecutive synchronous states into
//! one `step()` call keeps suspend/resume round trips to the minimum.

pub mod bucket;
pub mod buffer_ack;

use super::connection::Connection;
use super::types::EngineStatus;

/// One in-flight command's processing across possible suspensions.
///
/// The owning connection thread calls `step()` at most once at a time;
/// there is never more than one outstanding asynchronous sub-step per
/// context. Returns:
/// - `Success`: the command completed and wrote its response
/// - `WouldBlock`: asynchronous work was started; suspend the connection
/// - `Disconnect`: tear the connection down
/// - anything else: a domain failure for the response-writing layer
pub trait CommandContext {
    fn step(&mut self, conn: &mut Connection) -> EngineStatus;
}
