//! Create/remove bucket command context
//!
//! Bucket lifecycle changes run on a background worker while the
//! requesting connection suspends. The context copies everything the
//! task needs out of the request, so the task stays safe to complete
//! even if the connection disappears mid-flight.

use std::sync::Arc;

use super::CommandContext;
use crate::exec::connection::Connection;
use crate::exec::notify::CookieRegistry;
use crate::exec::pool::ExecutorPool;
use crate::exec::task::{TaskHandle, TaskKind};
use crate::exec::types::{CoreOperationError, EngineStatus};

/// Which lifecycle operation the request asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOp {
    Create,
    Remove,
}

/// Parsed bucket request payload.
///
/// Owned copies only: the background task receives a clone of this and
/// must never reach back into connection state.
#[derive(Debug, Clone)]
pub struct BucketRequest {
    pub op: BucketOp,
    pub name: String,
    pub config: String,
    pub force: bool,
}

/// The actual bucket engine operation, supplied by the bucket management
/// layer. Runs on a worker thread; must be self-contained.
pub type BucketWork = Arc<dyn Fn(&BucketRequest) -> EngineStatus + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Create,
    Remove,
    Done,
}

/// State machine for one create/remove bucket command
pub struct BucketCommandContext {
    state: State,
    request: BucketRequest,
    pool: Arc<ExecutorPool>,
    registry: Arc<CookieRegistry>,
    work: BucketWork,
    task: Option<TaskHandle>,
    completed: bool,
}

impl BucketCommandContext {
    pub fn new(
        request: BucketRequest,
        pool: Arc<ExecutorPool>,
        registry: Arc<CookieRegistry>,
        work: BucketWork,
    ) -> Self {
        Self {
            state: State::Initial,
            request,
            pool,
            registry,
            work,
            task: None,
            completed: false,
        }
    }

    /// Handle to the outstanding background task, if any
    pub fn task(&self) -> Option<&TaskHandle> {
        self.task.as_ref()
    }

    fn initial(&mut self) -> Result<EngineStatus, CoreOperationError> {
        self.state = match self.request.op {
            BucketOp::Create => State::Create,
            BucketOp::Remove => State::Remove,
        };
        Ok(EngineStatus::Success)
    }

    fn submit_work(
        &mut self,
        conn: &Connection,
        kind: TaskKind,
    ) -> Result<EngineStatus, CoreOperationError> {
        let request = self.request.clone();
        let work = self.work.clone();
        let registry = self.registry.clone();
        let cookie = conn.cookie().handle();

        let handle = self.pool.schedule(
            kind,
            Box::new(move || {
                let status = work(&request);
                // The cookie may have died while we ran; notify() checks
                // liveness and backs off.
                registry.notify(cookie, status);
                Ok(false)
            }),
        )?;

        self.task = Some(handle);
        self.state = State::Done;
        Ok(EngineStatus::WouldBlock)
    }

    fn create(&mut self, conn: &Connection) -> Result<EngineStatus, CoreOperationError> {
        let kind = TaskKind::BucketCreate {
            name: self.request.name.clone(),
        };
        self.submit_work(conn, kind)
    }

    fn remove(&mut self, conn: &Connection) -> Result<EngineStatus, CoreOperationError> {
        match parse_force_flag(&self.request.config) {
            Some(force) => self.request.force = force,
            None => {
                self.completed = true;
                return Ok(EngineStatus::InvalidArguments);
            }
        }
        let kind = TaskKind::BucketDestroy {
            name: self.request.name.clone(),
        };
        self.submit_work(conn, kind)
    }

    fn done(&mut self, conn: &mut Connection) -> Result<EngineStatus, CoreOperationError> {
        let status = conn.cookie().aiostat();
        conn.cookie().set_aiostat(EngineStatus::Success);
        self.completed = true;
        if status == EngineStatus::Success {
            conn.send_response(EngineStatus::Success);
            Ok(EngineStatus::Success)
        } else {
            // Domain failure: surfaced to the response-writing layer.
            Ok(status)
        }
    }
}

impl CommandContext for BucketCommandContext {
    fn step(&mut self, conn: &mut Connection) -> EngineStatus {
        if self.completed {
            log::error!("step() called on completed bucket command context");
            return EngineStatus::InternalFailure;
        }

        let mut drive = || -> Result<EngineStatus, CoreOperationError> {
            let mut ret = EngineStatus::Success;
            while ret == EngineStatus::Success {
                ret = match self.state {
                    State::Initial => self.initial()?,
                    State::Create => self.create(conn)?,
                    State::Remove => self.remove(conn)?,
                    State::Done => return self.done(conn),
                };
            }
            Ok(ret)
        };

        match drive() {
            Ok(status) => status,
            Err(err) => {
                // Scheduling failures stay inside the step boundary and
                // surface as a "try later" status, never as a fault
                // crossing the connection's main loop.
                log::warn!(
                    "Bucket command for [{}] could not start background work: {}",
                    self.request.name,
                    err
                );
                self.completed = true;
                err.as_engine_status()
            }
        }
    }
}

/// Parse the optional `force=<bool>` key from a remove-bucket config
/// string. Empty config means no force; anything unrecognized is a
/// client error.
fn parse_force_flag(config: &str) -> Option<bool> {
    let mut force = false;
    for item in config.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        match item.split_once('=') {
            Some(("force", "true")) => force = true,
            Some(("force", "false")) => force = false,
            _ => return None,
        }
    }
    Some(force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::config::CoreConfig;
    use std::time::Duration;

    fn fixture() -> (Arc<ExecutorPool>, Arc<CookieRegistry>) {
        let config = CoreConfig {
            writer_threads: 1,
            reader_threads: 1,
            auxio_threads: 1,
            nonio_threads: 1,
            ..CoreConfig::default()
        };
        (
            Arc::new(ExecutorPool::new(&config).unwrap()),
            Arc::new(CookieRegistry::new()),
        )
    }

    fn create_request(name: &str) -> BucketRequest {
        BucketRequest {
            op: BucketOp::Create,
            name: name.into(),
            config: String::new(),
            force: false,
        }
    }

    #[test]
    fn two_phase_create_responds_exactly_once() {
        let (pool, registry) = fixture();
        let mut conn = Connection::open(registry.clone());
        let work: BucketWork = Arc::new(|request| {
            assert_eq!(request.name, "travel-sample");
            EngineStatus::Success
        });
        let mut ctx = BucketCommandContext::new(
            create_request("travel-sample"),
            pool.clone(),
            registry,
            work,
        );

        let status = conn.execute(&mut ctx);
        assert_eq!(status, EngineStatus::Success);
        assert_eq!(conn.responses(), &[EngineStatus::Success]);

        // A completed context must not be driven again.
        assert_eq!(ctx.step(&mut conn), EngineStatus::InternalFailure);
        assert_eq!(conn.responses().len(), 1);
        pool.shutdown();
    }

    #[test]
    fn failed_background_work_maps_to_domain_error() {
        let (pool, registry) = fixture();
        let mut conn = Connection::open(registry.clone());
        let work: BucketWork = Arc::new(|_| EngineStatus::KeyNotFound);
        let mut ctx = BucketCommandContext::new(
            BucketRequest {
                op: BucketOp::Remove,
                name: "missing".into(),
                config: "force=true".into(),
                force: false,
            },
            pool.clone(),
            registry,
            work,
        );

        let status = conn.execute(&mut ctx);
        assert_eq!(status, EngineStatus::KeyNotFound);
        // The driver wrote the mapped error response, exactly once.
        assert_eq!(conn.responses(), &[EngineStatus::KeyNotFound]);
        pool.shutdown();
    }

    #[test]
    fn malformed_remove_config_is_invalid_arguments() {
        let (pool, registry) = fixture();
        let mut conn = Connection::open(registry.clone());
        let work: BucketWork = Arc::new(|_| panic!("work must not run"));
        let mut ctx = BucketCommandContext::new(
            BucketRequest {
                op: BucketOp::Remove,
                name: "b".into(),
                config: "force=sideways".into(),
                force: false,
            },
            pool.clone(),
            registry,
            work,
        );

        let status = conn.execute(&mut ctx);
        assert_eq!(status, EngineStatus::InvalidArguments);
        assert_eq!(conn.responses(), &[EngineStatus::InvalidArguments]);
        assert!(ctx.task().is_none());
        pool.shutdown();
    }

    #[test]
    fn disconnect_while_suspended_is_safe() {
        let (pool, registry) = fixture();
        let mut conn = Connection::open(registry.clone());
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let work: BucketWork = Arc::new(move |_| {
            std::thread::sleep(Duration::from_millis(30));
            let _ = done_tx.send(());
            EngineStatus::Success
        });
        let mut ctx = BucketCommandContext::new(
            create_request("doomed"),
            pool.clone(),
            registry.clone(),
            work,
        );

        // Drive manually: suspend, then tear the connection down while
        // the task is still running.
        assert_eq!(ctx.step(&mut conn), EngineStatus::WouldBlock);
        conn.disconnect();

        // The task completes against its copies; its notification finds
        // a stale handle and backs off.
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(registry.stale_notification_count(), 1);
        assert!(conn.responses().is_empty());
        pool.shutdown();
    }

    #[test]
    fn scheduling_failure_surfaces_as_try_later() {
        let (pool, registry) = fixture();
        pool.shutdown();
        let mut conn = Connection::open(registry.clone());
        let work: BucketWork = Arc::new(|_| EngineStatus::Success);
        let mut ctx =
            BucketCommandContext::new(create_request("late"), pool.clone(), registry, work);

        let status = conn.execute(&mut ctx);
        assert_eq!(status, EngineStatus::TemporaryFailure);
        assert_eq!(conn.responses(), &[EngineStatus::TemporaryFailure]);
    }

    #[test]
    fn force_flag_parsing() {
        assert_eq!(parse_force_flag(""), Some(false));
        assert_eq!(parse_force_flag("force=true"), Some(true));
        assert_eq!(parse_force_flag(" force=false ; "), Some(false));
        assert_eq!(parse_force_flag("force=maybe"), None);
        assert_eq!(parse_force_flag("unknown=1"), None);
    }
}
