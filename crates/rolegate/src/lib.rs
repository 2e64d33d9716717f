//! # rolegate
//!
//! Role-aware retrieval filtering and conditional response templating.
//!
//! Given a caller's role, rolegate decides which retrieved knowledge-base
//! documents may be surfaced and how the answer is phrased, and records one
//! audit record per decision.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         PolicyEvaluator                          │
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────────────┐ │
//! │  │ RoleRegistry │ → │DocumentFilter │ → │ TemplateStore/render │ │
//! │  │  (snapshot)  │   │ (pure, O(n))  │   │   (sandboxed AST)    │ │
//! │  └──────────────┘   └───────────────┘   └──────────────────────┘ │
//! │                              ↓                                   │
//! │                   AuditDispatcher → AuditSink                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rolegate::{EvaluationRequest, PolicyEvaluator, PolicyFile};
//! use rolegate_audit::{AuditDispatcher, MemorySink};
//! use rolegate_types::{Document, SecurityLevel};
//!
//! let sink = Arc::new(MemorySink::new());
//! let evaluator = PolicyEvaluator::new(AuditDispatcher::new(3).with_sink(sink.clone()));
//!
//! PolicyFile::parse(r#"
//! [[roles]]
//! id = "software-engineer"
//! name = "Software Engineer"
//! maxSecurityLevel = "internal"
//! deniedTags = ["admin-only"]
//!
//! [[templates]]
//! id = "answer-default"
//! intent = "answer"
//! body = "{{document_count}} document(s) from {% for s in document_sources %}{{s}}{% endfor %}"
//! "#)?
//! .bootstrap(&evaluator)?;
//!
//! let result = evaluator.evaluate(
//!     EvaluationRequest::new("alice", "software-engineer", "how do I deploy?").with_documents(vec![
//!         Document::new("1", "confluence", SecurityLevel::Internal).with_tags(["admin-only"]),
//!         Document::new("2", "github", SecurityLevel::Internal).with_tags(["howto"]),
//!     ]),
//! );
//!
//! assert_eq!(result.filtered_documents.len(), 1);
//! assert_eq!(result.response.text(), "1 document(s) from github");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
mod error;
pub mod evaluator;
pub mod policy_file;
pub mod retriever;

pub use context::{SYSTEM_KEYS, build_context};
pub use error::{AdminError, PolicyFileError, Result};
pub use evaluator::{
    EvaluationRequest, EvaluationResult, EvaluationState, PolicyEvaluator, Response,
};
pub use policy_file::{BOOTSTRAP_ACTOR, BootstrapReport, PolicyFile};
pub use retriever::{Retriever, StaticRetriever};
