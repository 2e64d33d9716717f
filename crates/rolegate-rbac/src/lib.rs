//! # rolegate-rbac: Roles and role-aware document filtering
//!
//! Provides the access-control half of `rolegate`:
//! - **Permission vocabulary** (closed set of flags, permission sets)
//! - **Role registry** (validated writes, copy-on-write snapshots, soft-disable)
//! - **Document filter engine** (security ceiling, deny/allow tags, source allowlist)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  RoleRegistry  (RwLock<Arc<state>>)          │
//! │  ├─ create/update/disable/enable role        │
//! │  └─ create/update permission set             │
//! └─────────────────┬───────────────────────────┘
//!                   │ snapshot() / resolve_role()
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  DocumentFilter                              │
//! │  1. SECURITY_LEVEL                           │
//! │  2. DENIED_TAG                               │
//! │  3. NOT_ALLOWLISTED                          │
//! │  4. SOURCE_NOT_ALLOWED                       │
//! └─────────────────┬───────────────────────────┘
//!                   ▼
//!        FilterOutcome { decisions, included }
//! ```
//!
//! ## Example
//!
//! ```
//! use rolegate_rbac::{DocumentFilter, RoleDefinition, RoleRegistry};
//! use rolegate_types::{Document, FilterReason, RoleId, SecurityLevel};
//!
//! let registry = RoleRegistry::new();
//! registry.create_role(
//!     RoleDefinition::new("software-engineer", "Software Engineer")
//!         .with_max_level("internal")
//!         .deny_tag("admin-only"),
//! )?;
//!
//! let documents = vec![
//!     Document::new("1", "confluence", SecurityLevel::Internal).with_tags(["admin-only"]),
//!     Document::new("2", "confluence", SecurityLevel::Internal).with_tags(["howto"]),
//! ];
//!
//! let outcome = DocumentFilter::new().apply_for(
//!     &registry.snapshot(),
//!     &RoleId::new("software-engineer"),
//!     &documents,
//! )?;
//! assert_eq!(outcome.included.len(), 1);
//! assert_eq!(outcome.decisions[0].reason, FilterReason::DeniedTag);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod filter;
pub mod permissions;
pub mod registry;
pub mod roles;

// Re-export commonly used types
pub use filter::{DocumentFilter, FilterError, FilterOutcome};
pub use permissions::{Permission, PermissionSet, PermissionSetDefinition};
pub use registry::{RegistryError, RegistrySnapshot, ResolvedRole, RoleRegistry};
pub use roles::{LevelSpec, Role, RoleDefinition};
