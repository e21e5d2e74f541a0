//! Audit subsystem
//!
//! Producers on any thread enqueue events; one consumer thread
//! serializes them to the configured sink. The queue is strictly
//! bounded: past capacity, events are dropped and counted rather than
//! ever blocking a request thread on audit I/O.

pub mod event;
pub mod queue;
pub mod sink;

pub use event::AuditEvent;
pub use queue::BoundedEventQueue;
pub use sink::{AuditSink, FileAuditSink};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::exec::config::AuditConfig;
use crate::exec::types::CoreOperationError;

/// Owner of the bounded event queue and its consumer thread.
pub struct AuditDaemon {
    enabled: bool,
    queue: Arc<BoundedEventQueue>,
    written: Arc<AtomicU64>,
    write_failures: Arc<AtomicU64>,
    consumer: Option<JoinHandle<()>>,
}

impl AuditDaemon {
    /// Spawn the consumer thread draining into `sink`.
    ///
    /// Consumer thread creation failure is fatal to initialization; the
    /// rest of the error taxonomy here is recoverable per event.
    pub fn start(
        config: &AuditConfig,
        mut sink: Box<dyn AuditSink>,
    ) -> Result<Self, CoreOperationError> {
        let queue = Arc::new(BoundedEventQueue::new(config.max_queue_depth));
        let written = Arc::new(AtomicU64::new(0));
        let write_failures = Arc::new(AtomicU64::new(0));

        let consumer = {
            let queue = queue.clone();
            let written = written.clone();
            let write_failures = write_failures.clone();
            std::thread::Builder::new()
                .name("audit-consumer".to_string())
                .spawn(move || {
                    // The lock is released inside wait_next(); the
                    // potentially blocking sink write happens out here.
                    while let Some(event) = queue.wait_next() {
                        match sink.write_event(&event) {
                            Ok(()) => {
                                written.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                log::warn!("Error writing audit event {}: {}", event.id, err);
                                write_failures.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    log::debug!("audit-consumer exiting");
                })
                .map_err(|err| {
                    CoreOperationError::initialization_failed(format!(
                        "failed to spawn audit consumer: {}",
                        err
                    ))
                })?
        };

        Ok(Self {
            enabled: config.enabled,
            queue,
            written,
            write_failures,
            consumer: Some(consumer),
        })
    }

    /// Queue one audit event from any producer thread.
    ///
    /// A disabled daemon accepts and discards silently (success); a full
    /// queue drops and counts (failure). Never blocks the producer.
    pub fn put_event(&self, id: u32, payload: serde_json::Value) -> bool {
        if !self.enabled {
            return true;
        }
        self.queue.enqueue(AuditEvent::new(id, payload))
    }

    /// Events rejected due to a full or terminated queue
    pub fn dropped_events(&self) -> u64 {
        self.queue.dropped_events()
    }

    /// Events durably handed to the sink
    pub fn written_events(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Events the sink failed to record
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Current queue depth
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Terminate the consumer: remaining queued events are drained to
    /// the sink, then the thread exits and is joined.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            self.queue.terminate();
            if consumer.join().is_err() {
                log::warn!("audit consumer panicked during shutdown");
            }
        }
    }
}

impl Drop for AuditDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AuditDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDaemon")
            .field("enabled", &self.enabled)
            .field("queued", &self.queue.len())
            .field("dropped", &self.queue.dropped_events())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records drained events in order for inspection.
    struct MemorySink {
        events: Arc<Mutex<Vec<AuditEvent>>>,
    }

    impl AuditSink for MemorySink {
        fn write_event(&mut self, event: &AuditEvent) -> Result<(), CoreOperationError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    fn memory_daemon(max_depth: usize) -> (AuditDaemon, Arc<Mutex<Vec<AuditEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let config = AuditConfig {
            enabled: true,
            max_queue_depth: max_depth,
            log_path: None,
        };
        let daemon = AuditDaemon::start(
            &config,
            Box::new(MemorySink {
                events: events.clone(),
            }),
        )
        .unwrap();
        (daemon, events)
    }

    #[test]
    fn shutdown_drains_all_queued_events() {
        let (daemon, events) = memory_daemon(1024);
        for id in 0..50 {
            assert!(daemon.put_event(id, serde_json::json!({"seq": id})));
        }
        daemon.shutdown();
        let drained = events.lock();
        assert_eq!(drained.len(), 50);
        // Strict FIFO: durable order equals enqueue order.
        for (index, event) in drained.iter().enumerate() {
            assert_eq!(event.id, index as u32);
        }
    }

    #[test]
    fn shutdown_with_empty_queue_exits_promptly() {
        let (daemon, events) = memory_daemon(8);
        daemon.shutdown();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        let (daemon, events) = memory_daemon(100_000);
        let daemon = Arc::new(daemon);
        let producers: Vec<_> = (0..4u32)
            .map(|producer| {
                let daemon = daemon.clone();
                std::thread::spawn(move || {
                    for seq in 0..200u32 {
                        // Tag: producer in the high bits, sequence low.
                        assert!(daemon.put_event(
                            (producer << 16) | seq,
                            serde_json::json!({}),
                        ));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        match Arc::try_unwrap(daemon) {
            Ok(daemon) => daemon.shutdown(),
            Err(_) => panic!("daemon still shared"),
        }

        let drained = events.lock();
        assert_eq!(drained.len(), 800);
        // The interleaving must be consistent with each producer's own
        // sequence.
        let mut last_seq = [None::<u32>; 4];
        for event in drained.iter() {
            let producer = (event.id >> 16) as usize;
            let seq = event.id & 0xffff;
            if let Some(prev) = last_seq[producer] {
                assert!(seq > prev, "producer {} reordered", producer);
            }
            last_seq[producer] = Some(seq);
        }
    }

    #[test]
    fn disabled_daemon_discards_silently() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let config = AuditConfig {
            enabled: false,
            max_queue_depth: 8,
            log_path: None,
        };
        let daemon = AuditDaemon::start(
            &config,
            Box::new(MemorySink {
                events: events.clone(),
            }),
        )
        .unwrap();
        assert!(daemon.put_event(1, serde_json::json!({})));
        daemon.shutdown();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn sink_failure_is_counted_not_fatal() {
        struct FailingSink {
            failures_left: u32,
            events: Arc<Mutex<Vec<AuditEvent>>>,
        }
        impl AuditSink for FailingSink {
            fn write_event(&mut self, event: &AuditEvent) -> Result<(), CoreOperationError> {
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    return Err(CoreOperationError::io_failed("disk full"));
                }
                self.events.lock().push(event.clone());
                Ok(())
            }
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let config = AuditConfig {
            enabled: true,
            max_queue_depth: 16,
            log_path: None,
        };
        let daemon = AuditDaemon::start(
            &config,
            Box::new(FailingSink {
                failures_left: 1,
                events: events.clone(),
            }),
        )
        .unwrap();
        daemon.put_event(1, serde_json::json!({}));
        daemon.put_event(2, serde_json::json!({}));
        daemon.shutdown();

        assert_eq!(events.lock().len(), 1);
        assert_eq!(events.lock()[0].id, 2);
    }

    #[test]
    fn write_failure_counter_visible_after_drain() {
        let (daemon, _events) = memory_daemon(8);
        daemon.put_event(7, serde_json::json!({}));
        // Give the consumer time to drain, then check counters.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(daemon.write_failures(), 0);
        assert_eq!(daemon.written_events(), 1);
        daemon.shutdown();
    }
}
