//! # rolegate-audit: Policy decision audit trail
//!
//! Every evaluation and every administrative write produces exactly one
//! [`AuditRecord`]. Records are immutable; the log is append-only and
//! idempotent on record id.
//!
//! ```text
//! AuditRecord { id, timestamp, callerId, entry }
//!   entry = evaluation    { roleId, query, intent, decisions[], outcome, warnings[], processingTimeMs }
//!         | policy_change { change, target, result }
//!
//! AuditDispatcher ──persist──▶ AuditSink (MemorySink, JsonLinesSink, ...)
//!        │ retries up to max_attempts
//!        └─▶ undelivered queue ──flush_undelivered()──▶ sinks
//! ```
//!
//! Reason codes for individual documents appear only here, never in the
//! caller-facing result.
//!
//! # Example
//!
//! ```
//! use rolegate_audit::{AuditQuery, AuditRecord, ChangeKind, ChangeResult, MemorySink, PolicyChangeEntry, AuditSink};
//! use rolegate_types::CallerId;
//!
//! let sink = MemorySink::new();
//! sink.persist(&AuditRecord::policy_change(
//!     CallerId::new("admin"),
//!     PolicyChangeEntry {
//!         change: ChangeKind::CreateRole,
//!         target: "qa-engineer".into(),
//!         result: ChangeResult::Applied { version: 1 },
//!     },
//! ))?;
//!
//! let changes = sink.read(|log| log.query(&AuditQuery::default().with_caller("admin")).len());
//! assert_eq!(changes, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod dispatch;
mod error;
pub mod log;
pub mod record;
pub mod sink;

pub use dispatch::{AuditDispatcher, DEFAULT_UNDELIVERED_CAPACITY, DeliveryReport, Undelivered};
pub use error::{AuditError, Result, SinkError};
pub use log::{AuditLog, AuditQuery, RoleSummary};
pub use record::{
    AuditEntry, AuditRecord, ChangeKind, ChangeResult, EntryType, EvaluationEntry, Outcome,
    PolicyChangeEntry, response_hash,
};
pub use sink::{AuditSink, JsonLinesSink, MemorySink, load_log};
