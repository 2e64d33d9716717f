//! Role and permission-set registry.
//!
//! The registry holds its state behind `RwLock<Arc<RegistryState>>`. Writers
//! validate against the current state, build a new state with a bumped
//! version, and swap it in. Readers take a [`RegistrySnapshot`], which is a
//! cheap `Arc` clone that never changes under them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use rolegate_types::{FailureKind, PermissionSetId, RoleId};
use thiserror::Error;
use tracing::{debug, info};

use crate::permissions::{Permission, PermissionSet, PermissionSetDefinition};
use crate::roles::{Role, RoleDefinition};

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A write failed validation.
    #[error("Malformed rule ({field}): {reason}")]
    MalformedRule { field: String, reason: String },

    /// `create_role` with an id that already exists.
    #[error("Role '{0}' already exists")]
    DuplicateRole(RoleId),

    /// The role id does not exist.
    #[error("Unknown role '{0}'")]
    UnknownRole(RoleId),

    /// The role exists but is soft-disabled.
    #[error("Role '{0}' is disabled")]
    RoleDisabled(RoleId),

    /// `create_permission_set` with an id that already exists.
    #[error("Permission set '{0}' already exists")]
    DuplicatePermissionSet(PermissionSetId),

    /// The permission set id does not exist.
    #[error("Unknown permission set '{0}'")]
    UnknownPermissionSet(PermissionSetId),
}

impl RegistryError {
    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRule {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Maps the error to the coarse failure kind recorded in the audit trail.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RegistryError::UnknownRole(_) => FailureKind::UnknownRole,
            RegistryError::RoleDisabled(_) => FailureKind::RoleDisabled,
            RegistryError::MalformedRule { .. }
            | RegistryError::DuplicateRole(_)
            | RegistryError::DuplicatePermissionSet(_)
            | RegistryError::UnknownPermissionSet(_) => FailureKind::MalformedRule,
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Default, Clone)]
struct RegistryState {
    version: u64,
    roles: BTreeMap<RoleId, Arc<Role>>,
    permission_sets: BTreeMap<PermissionSetId, Arc<PermissionSet>>,
}

/// Immutable view of the registry at one version.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    state: Arc<RegistryState>,
}

impl RegistrySnapshot {
    /// Registry version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Resolves a role with its effective permissions.
    ///
    /// Fails with `UnknownRole` for a missing id and `RoleDisabled` for a
    /// soft-disabled role.
    pub fn resolve_role(&self, id: &RoleId) -> Result<ResolvedRole> {
        let role = self
            .state
            .roles
            .get(id)
            .ok_or_else(|| RegistryError::UnknownRole(id.clone()))?;

        if !role.enabled {
            return Err(RegistryError::RoleDisabled(id.clone()));
        }

        let inherited = role
            .permission_set
            .as_ref()
            .and_then(|set_id| self.state.permission_sets.get(set_id));
        let permissions = role.effective_permissions(inherited.map(Arc::as_ref));

        Ok(ResolvedRole {
            role: Arc::clone(role),
            permissions,
            registry_version: self.state.version,
        })
    }

    /// Returns a role by id, enabled or not.
    pub fn role(&self, id: &RoleId) -> Option<&Arc<Role>> {
        self.state.roles.get(id)
    }

    /// All roles ordered by id, including disabled ones.
    pub fn roles(&self) -> impl Iterator<Item = &Arc<Role>> {
        self.state.roles.values()
    }

    pub fn permission_set(&self, id: &PermissionSetId) -> Option<&Arc<PermissionSet>> {
        self.state.permission_sets.get(id)
    }

    pub fn permission_sets(&self) -> impl Iterator<Item = &Arc<PermissionSet>> {
        self.state.permission_sets.values()
    }
}

/// A role together with its effective permissions, captured from one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    role: Arc<Role>,
    permissions: BTreeSet<Permission>,
    registry_version: u64,
}

impl ResolvedRole {
    /// Builds a resolved role directly, without a registry.
    pub fn new(role: Role, inherited: Option<&PermissionSet>) -> Self {
        let permissions = role.effective_permissions(inherited);
        Self {
            role: Arc::new(role),
            permissions,
            registry_version: 0,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn id(&self) -> &RoleId {
        &self.role.id
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn registry_version(&self) -> u64 {
        self.registry_version
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Thread-safe role registry.
///
/// `RoleRegistry` is `Send + Sync`; share it through an `Arc`.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    state: RwLock<Arc<RegistryState>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a consistent snapshot of the current state.
    pub fn snapshot(&self) -> RegistrySnapshot {
        // State is swapped whole, so a poisoned lock never holds a partial write.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        RegistrySnapshot {
            state: Arc::clone(&state),
        }
    }

    /// Resolves a role against the current state.
    pub fn resolve_role(&self, id: &RoleId) -> Result<ResolvedRole> {
        self.snapshot().resolve_role(id)
    }

    /// Lists all roles, including disabled ones.
    pub fn list_roles(&self) -> Vec<Arc<Role>> {
        self.snapshot().roles().cloned().collect()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Creates a new role.
    pub fn create_role(&self, definition: RoleDefinition) -> Result<Arc<Role>> {
        self.write(|state| {
            let role = definition.validate(1, |id| state.permission_sets.contains_key(id))?;
            if state.roles.contains_key(&role.id) {
                return Err(RegistryError::DuplicateRole(role.id));
            }
            let role = Arc::new(role);
            state.roles.insert(role.id.clone(), Arc::clone(&role));
            Ok(role)
        })
    }

    /// Replaces an existing role's rules. The enabled flag is preserved.
    pub fn update_role(&self, definition: RoleDefinition) -> Result<Arc<Role>> {
        self.write(|state| {
            let mut role = definition.validate(0, |id| state.permission_sets.contains_key(id))?;
            let existing = state
                .roles
                .get(&role.id)
                .ok_or_else(|| RegistryError::UnknownRole(role.id.clone()))?;
            role.enabled = existing.enabled;
            role.version = existing.version + 1;

            let role = Arc::new(role);
            state.roles.insert(role.id.clone(), Arc::clone(&role));
            Ok(role)
        })
    }

    /// Soft-disables a role. Resolving it afterwards fails with `RoleDisabled`.
    pub fn disable_role(&self, id: &RoleId) -> Result<Arc<Role>> {
        self.set_enabled(id, false)
    }

    pub fn enable_role(&self, id: &RoleId) -> Result<Arc<Role>> {
        self.set_enabled(id, true)
    }

    fn set_enabled(&self, id: &RoleId, enabled: bool) -> Result<Arc<Role>> {
        self.write(|state| {
            let existing = state
                .roles
                .get(id)
                .ok_or_else(|| RegistryError::UnknownRole(id.clone()))?;

            let mut role = Role::clone(existing);
            role.enabled = enabled;
            role.version += 1;

            let role = Arc::new(role);
            state.roles.insert(id.clone(), Arc::clone(&role));
            Ok(role)
        })
    }

    /// Creates a new permission set.
    pub fn create_permission_set(
        &self,
        definition: PermissionSetDefinition,
    ) -> Result<Arc<PermissionSet>> {
        self.write(|state| {
            let set = definition.validate(1)?;
            if state.permission_sets.contains_key(&set.id) {
                return Err(RegistryError::DuplicatePermissionSet(set.id));
            }
            let set = Arc::new(set);
            state.permission_sets.insert(set.id.clone(), Arc::clone(&set));
            Ok(set)
        })
    }

    /// Replaces an existing permission set.
    ///
    /// Roles inheriting from it pick up the new flags on their next resolve.
    pub fn update_permission_set(
        &self,
        definition: PermissionSetDefinition,
    ) -> Result<Arc<PermissionSet>> {
        self.write(|state| {
            let mut set = definition.validate(0)?;
            let existing = state
                .permission_sets
                .get(&set.id)
                .ok_or_else(|| RegistryError::UnknownPermissionSet(set.id.clone()))?;
            set.version = existing.version + 1;

            let set = Arc::new(set);
            state.permission_sets.insert(set.id.clone(), Arc::clone(&set));
            Ok(set)
        })
    }

    /// Applies `mutate` to a copy of the state and publishes it on success.
    ///
    /// A failed mutation leaves the published state untouched.
    fn write<T>(&self, mutate: impl FnOnce(&mut RegistryState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = RegistryState::clone(&guard);
        let value = mutate(&mut next)?;
        next.version = guard.version + 1;

        debug!(version = next.version, "Registry state published");
        *guard = Arc::new(next);
        info!(version = guard.version, "Registry updated");

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_types::SecurityLevel;

    fn registry_with_engineer() -> RoleRegistry {
        let registry = RoleRegistry::new();
        registry
            .create_permission_set(
                PermissionSetDefinition::new("developer", "Developer")
                    .grant("view-logs")
                    .grant("edit-jobs"),
            )
            .unwrap();
        registry
            .create_role(
                RoleDefinition::new("software-engineer", "Software Engineer")
                    .with_max_level("internal")
                    .inherit("developer")
                    .deny_tag("admin-only"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn resolve_role_returns_effective_permissions() {
        let registry = registry_with_engineer();
        let resolved = registry.resolve_role(&RoleId::new("software-engineer")).unwrap();

        assert_eq!(resolved.role().max_security_level, SecurityLevel::Internal);
        assert!(resolved.has_permission(Permission::ViewLogs));
        assert!(resolved.has_permission(Permission::EditJobs));
        assert!(!resolved.has_permission(Permission::AccessSecrets));
        assert_eq!(resolved.registry_version(), 2);
    }

    #[test]
    fn unknown_role_fails() {
        let registry = registry_with_engineer();
        let err = registry.resolve_role(&RoleId::new("ghost-role")).unwrap_err();
        assert_eq!(err, RegistryError::UnknownRole(RoleId::new("ghost-role")));
        assert_eq!(err.failure_kind(), FailureKind::UnknownRole);
    }

    #[test]
    fn disabled_role_fails_until_enabled() {
        let registry = registry_with_engineer();
        let id = RoleId::new("software-engineer");

        let disabled = registry.disable_role(&id).unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.version, 2);

        let err = registry.resolve_role(&id).unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::RoleDisabled);

        registry.enable_role(&id).unwrap();
        assert!(registry.resolve_role(&id).is_ok());
        assert_eq!(registry.list_roles().len(), 1);
    }

    #[test]
    fn duplicate_create_and_missing_update_are_rejected() {
        let registry = registry_with_engineer();

        let err = registry
            .create_role(RoleDefinition::new("software-engineer", "Again"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRole(_)));

        let err = registry
            .update_role(RoleDefinition::new("nobody", "Nobody"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownRole(_)));

        let err = registry
            .update_permission_set(PermissionSetDefinition::new("nothing", "Nothing"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownPermissionSet(_)));
    }

    #[test]
    fn rejected_write_leaves_state_untouched() {
        let registry = registry_with_engineer();
        let before = registry.version();

        let result = registry.create_role(RoleDefinition::new("qa", "QA").grant("nonsense"));
        assert!(result.is_err());
        assert_eq!(registry.version(), before);
        assert_eq!(registry.list_roles().len(), 1);
    }

    #[test]
    fn snapshots_do_not_observe_later_writes() {
        let registry = registry_with_engineer();
        let snapshot = registry.snapshot();

        registry
            .update_role(
                RoleDefinition::new("software-engineer", "Software Engineer")
                    .with_max_level("confidential"),
            )
            .unwrap();

        let old = snapshot.resolve_role(&RoleId::new("software-engineer")).unwrap();
        let new = registry.resolve_role(&RoleId::new("software-engineer")).unwrap();
        assert_eq!(old.role().max_security_level, SecurityLevel::Internal);
        assert_eq!(new.role().max_security_level, SecurityLevel::Confidential);
        assert_eq!(new.role().version, 2);
        assert!(new.registry_version() > old.registry_version());
    }

    #[test]
    fn update_preserves_disabled_flag() {
        let registry = registry_with_engineer();
        let id = RoleId::new("software-engineer");
        registry.disable_role(&id).unwrap();

        let updated = registry
            .update_role(RoleDefinition::new("software-engineer", "Renamed"))
            .unwrap();
        assert!(!updated.enabled);
    }

    #[test]
    fn permission_set_update_reaches_inheriting_roles() {
        let registry = registry_with_engineer();
        registry
            .update_permission_set(
                PermissionSetDefinition::new("developer", "Developer").grant("restart-pods"),
            )
            .unwrap();

        let resolved = registry.resolve_role(&RoleId::new("software-engineer")).unwrap();
        assert!(resolved.has_permission(Permission::RestartPods));
        assert!(!resolved.has_permission(Permission::ViewLogs));
    }

    #[test]
    fn registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RoleRegistry>();
        assert_send_sync::<RegistrySnapshot>();
    }
}
