//! Versioned template store.
//!
//! Same copy-on-write model as the role registry: state lives behind
//! `RwLock<Arc<StoreState>>`, writes publish a new state, and readers hold
//! an `Arc` to the template they selected.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use rolegate_types::{RoleId, TemplateId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ast::{Body, VarType};
use crate::error::{RenderError, StoreError};
use crate::parser::parse;
use crate::render::{Context, Rendered, render};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Default loop cap when neither the definition nor the store sets one.
pub const DEFAULT_ITERATION_CAP: usize = 25;

/// A parsed, type-checked response template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: TemplateId,
    pub intent: String,
    /// `None` marks the global default for the intent.
    pub role_id: Option<RoleId>,
    pub source: String,
    pub body: Body,
    pub iteration_cap: usize,
    pub version: u64,
}

impl Template {
    /// Renders this template.
    pub fn render(&self, context: &Context, strict: bool) -> std::result::Result<Rendered, RenderError> {
        render(&self.body, context, strict)
    }

    pub fn is_global(&self) -> bool {
        self.role_id.is_none()
    }
}

/// Unparsed template, as written by an administrator or a policy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDefinition {
    pub id: String,
    pub intent: String,
    /// Role this template is specific to; absent for the global default.
    #[serde(default, alias = "role")]
    pub role_id: Option<String>,
    pub body: String,
    /// Declared variable schema.
    #[serde(default)]
    pub variables: BTreeMap<String, VarType>,
    /// Cap for loops without an explicit `cap`.
    #[serde(default)]
    pub iteration_cap: Option<usize>,
}

impl TemplateDefinition {
    pub fn new(id: impl Into<String>, intent: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            intent: intent.into(),
            role_id: None,
            body: body.into(),
            variables: BTreeMap::new(),
            iteration_cap: None,
        }
    }

    /// Makes the template specific to a role.
    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.role_id = Some(role.into());
        self
    }

    pub fn declare(mut self, name: impl Into<String>, ty: VarType) -> Self {
        self.variables.insert(name.into(), ty);
        self
    }

    pub fn with_iteration_cap(mut self, cap: usize) -> Self {
        self.iteration_cap = Some(cap);
        self
    }

    fn compile(self, default_cap: usize, version: u64) -> Result<Template> {
        let id = TemplateId::new(self.id.trim());
        if id.is_blank() {
            return Err(StoreError::InvalidDefinition("template id is empty".into()));
        }
        let intent = self.intent.trim().to_string();
        if intent.is_empty() {
            return Err(StoreError::InvalidDefinition(format!(
                "template '{id}' has an empty intent"
            )));
        }
        let role_id = self
            .role_id
            .map(|role| RoleId::new(role.trim()))
            .filter(|role| !role.is_blank());

        let iteration_cap = self.iteration_cap.unwrap_or(default_cap);
        let body = parse(&self.body, &self.variables, iteration_cap)?;

        Ok(Template {
            id,
            intent,
            role_id,
            source: self.body,
            body,
            iteration_cap,
            version,
        })
    }
}

type Binding = (String, Option<RoleId>);

#[derive(Debug, Default, Clone)]
struct StoreState {
    version: u64,
    templates: BTreeMap<TemplateId, Arc<Template>>,
    bindings: BTreeMap<Binding, TemplateId>,
}

/// Immutable view of the store at one version.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    state: Arc<StoreState>,
}

impl StoreSnapshot {
    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn get(&self, id: &TemplateId) -> Option<&Arc<Template>> {
        self.state.templates.get(id)
    }

    /// Selects the template for `intent` and `role`.
    ///
    /// Prefers the role-specific template, then the global default for the
    /// intent, and otherwise fails with `UnknownTemplate`.
    pub fn select(&self, intent: &str, role: &RoleId) -> Result<Arc<Template>> {
        let specific = (intent.to_string(), Some(role.clone()));
        let global = (intent.to_string(), None);

        self.state
            .bindings
            .get(&specific)
            .or_else(|| self.state.bindings.get(&global))
            .and_then(|id| self.state.templates.get(id))
            .cloned()
            .ok_or_else(|| StoreError::UnknownTemplate {
                intent: intent.to_string(),
                role: role.clone(),
            })
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.state.templates.values()
    }
}

/// Thread-safe template store.
#[derive(Debug)]
pub struct TemplateStore {
    state: RwLock<Arc<StoreState>>,
    default_cap: usize,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATION_CAP)
    }
}

impl TemplateStore {
    /// Creates an empty store whose templates default to `default_cap` loop iterations.
    pub fn new(default_cap: usize) -> Self {
        Self {
            state: RwLock::default(),
            default_cap,
        }
    }

    pub fn default_cap(&self) -> usize {
        self.default_cap
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        // State is swapped whole, so a poisoned lock never holds a partial write.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        StoreSnapshot {
            state: Arc::clone(&state),
        }
    }

    pub fn get(&self, id: &TemplateId) -> Option<Arc<Template>> {
        self.snapshot().get(id).cloned()
    }

    pub fn select(&self, intent: &str, role: &RoleId) -> Result<Arc<Template>> {
        self.snapshot().select(intent, role)
    }

    /// Lists templates ordered by id.
    pub fn list(&self) -> Vec<Arc<Template>> {
        self.snapshot().templates().cloned().collect()
    }

    /// Parses and stores a new template.
    pub fn create_template(&self, definition: TemplateDefinition) -> Result<Arc<Template>> {
        let template = definition.compile(self.default_cap, 1)?;
        self.write(|state| {
            if state.templates.contains_key(&template.id) {
                return Err(StoreError::DuplicateTemplate(template.id));
            }
            let binding = (template.intent.clone(), template.role_id.clone());
            if let Some(existing) = state.bindings.get(&binding) {
                return Err(StoreError::BindingTaken {
                    intent: template.intent,
                    existing: existing.clone(),
                });
            }

            let template = Arc::new(template);
            state.bindings.insert(binding, template.id.clone());
            state.templates.insert(template.id.clone(), Arc::clone(&template));
            Ok(template)
        })
    }

    /// Replaces an existing template. It may move to another intent or role.
    pub fn update_template(&self, definition: TemplateDefinition) -> Result<Arc<Template>> {
        let mut template = definition.compile(self.default_cap, 0)?;
        self.write(|state| {
            let existing = state
                .templates
                .get(&template.id)
                .cloned()
                .ok_or_else(|| StoreError::MissingTemplate(template.id.clone()))?;

            let binding = (template.intent.clone(), template.role_id.clone());
            if let Some(other) = state.bindings.get(&binding)
                && *other != template.id
            {
                return Err(StoreError::BindingTaken {
                    intent: template.intent,
                    existing: other.clone(),
                });
            }

            state
                .bindings
                .remove(&(existing.intent.clone(), existing.role_id.clone()));
            template.version = existing.version + 1;

            let template = Arc::new(template);
            state.bindings.insert(binding, template.id.clone());
            state.templates.insert(template.id.clone(), Arc::clone(&template));
            Ok(template)
        })
    }

    fn write<T>(&self, mutate: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = StoreState::clone(&guard);
        let value = mutate(&mut next)?;
        next.version = guard.version + 1;

        debug!(version = next.version, "Template store state published");
        *guard = Arc::new(next);
        info!(version = guard.version, "Template store updated");

        Ok(value)
    }
}
