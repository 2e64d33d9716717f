//! Delivers audit records to sinks with bounded retries.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, warn};

use crate::record::AuditRecord;
use crate::sink::AuditSink;

/// A record one sink failed to accept after exhausting its attempts.
#[derive(Debug, Clone)]
pub struct Undelivered {
    pub record: AuditRecord,
    pub sink: String,
    pub last_error: String,
    sink_index: usize,
}

/// Result of delivering one record to every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Total persist calls made across sinks.
    pub attempts: u32,
    /// Sinks that accepted the record.
    pub delivered: usize,
    /// Sinks that did not; the record is queued for them.
    pub failed: usize,
}

impl DeliveryReport {
    /// At least one sink holds the record and none is missing it.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.delivered > 0
    }
}

/// Records kept for redelivery before the oldest are dropped.
pub const DEFAULT_UNDELIVERED_CAPACITY: usize = 1024;

/// Fans records out to sinks, retrying each up to `max_attempts` times.
///
/// Sinks are idempotent on record id, so a retry after an ambiguous failure
/// never duplicates a record. Records a sink still rejects are kept in a
/// bounded undelivered queue. The queue is retried after the next complete
/// delivery, or explicitly through [`flush_undelivered`](Self::flush_undelivered).
pub struct AuditDispatcher {
    sinks: Vec<Arc<dyn AuditSink>>,
    max_attempts: u32,
    undelivered: Mutex<VecDeque<Undelivered>>,
    undelivered_capacity: usize,
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("max_attempts", &self.max_attempts)
            .field("undelivered_capacity", &self.undelivered_capacity)
            .finish_non_exhaustive()
    }
}

impl AuditDispatcher {
    /// Creates a dispatcher. At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            sinks: Vec::new(),
            max_attempts: max_attempts.max(1),
            undelivered: Mutex::new(VecDeque::new()),
            undelivered_capacity: DEFAULT_UNDELIVERED_CAPACITY,
        }
    }

    /// Bounds the undelivered queue; at least one record is always kept.
    pub fn with_undelivered_capacity(mut self, capacity: usize) -> Self {
        self.undelivered_capacity = capacity.max(1);
        self
    }

    /// Adds a sink (builder pattern).
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Delivers `record` to every sink.
    ///
    /// A complete delivery also retries whatever is still queued.
    pub fn deliver(&self, record: &AuditRecord) -> DeliveryReport {
        let mut report = DeliveryReport {
            attempts: 0,
            delivered: 0,
            failed: 0,
        };

        if self.sinks.is_empty() {
            error!(record = %record.id, "No audit sinks configured, record not persisted");
            return report;
        }

        for (index, sink) in self.sinks.iter().enumerate() {
            match self.deliver_to(sink.as_ref(), record, &mut report.attempts) {
                Ok(()) => report.delivered += 1,
                Err(last_error) => {
                    report.failed += 1;
                    self.queue(Undelivered {
                        record: record.clone(),
                        sink: sink.name().to_string(),
                        last_error,
                        sink_index: index,
                    });
                }
            }
        }

        if report.is_complete() && self.undelivered_count() > 0 {
            let remaining = self.flush_undelivered();
            debug!(remaining, "Retried undelivered audit records");
        }

        report
    }

    /// Retries every queued record once per configured attempt budget.
    ///
    /// Returns the number of records still undelivered.
    pub fn flush_undelivered(&self) -> usize {
        let pending = {
            let mut queue = self.undelivered.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *queue)
        };

        let mut attempts = 0;
        let mut still_pending = Vec::new();
        for mut item in pending {
            let Some(sink) = self.sinks.get(item.sink_index) else {
                continue;
            };
            if let Err(last_error) = self.deliver_to(sink.as_ref(), &item.record, &mut attempts) {
                item.last_error = last_error;
                still_pending.push(item);
            }
        }

        for item in still_pending {
            self.queue(item);
        }
        self.undelivered_count()
    }

    /// Records no sink-level retry has delivered yet.
    pub fn undelivered(&self) -> Vec<Undelivered> {
        self.undelivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn undelivered_count(&self) -> usize {
        self.undelivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn deliver_to(
        &self,
        sink: &dyn AuditSink,
        record: &AuditRecord,
        attempts: &mut u32,
    ) -> Result<(), String> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            *attempts += 1;
            match sink.persist(record) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        sink = sink.name(),
                        record = %record.id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Audit delivery failed"
                    );
                    last_error = err.to_string();
                }
            }
        }

        error!(
            sink = sink.name(),
            record = %record.id,
            "Audit delivery exhausted retries, record queued"
        );
        Err(last_error)
    }

    fn queue(&self, item: Undelivered) {
        let mut queue = self.undelivered.lock().unwrap_or_else(PoisonError::into_inner);
        while queue.len() >= self.undelivered_capacity {
            if let Some(dropped) = queue.pop_front() {
                error!(
                    sink = %dropped.sink,
                    record = %dropped.record.id,
                    capacity = self.undelivered_capacity,
                    "Undelivered audit queue full, dropping oldest record"
                );
            }
        }
        queue.push_back(item);
    }
}
