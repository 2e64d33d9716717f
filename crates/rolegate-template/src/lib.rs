//! # rolegate-template: Conditional response templates
//!
//! A small, sandboxed template language for phrasing answers per role:
//!
//! ```text
//! {% if requires_admin %}Contact DevOps for {{ action }}{% else %}Run {{ command }}{% endif %}
//! {% for cmd in related_commands cap 5 %}- {{ cmd }}
//! {% endfor %}
//! ```
//!
//! Templates are parsed into an AST and type-checked once, when stored.
//! Rendering walks the AST against a [`Context`] of string, bool and list
//! values and never evaluates raw strings.
//!
//! ## Example
//!
//! ```
//! use rolegate_template::{Context, TemplateDefinition, TemplateStore};
//! use rolegate_types::RoleId;
//!
//! let store = TemplateStore::default();
//! store.create_template(TemplateDefinition::new(
//!     "restart-default",
//!     "restart",
//!     "{% if requires_admin %}Contact DevOps for {{action}}{% else %}Run {{command}}{% endif %}",
//! ))?;
//!
//! let template = store.select("restart", &RoleId::new("qa-engineer"))?;
//! let context = Context::new()
//!     .with("requires_admin", true)
//!     .with("action", "restart pod");
//! let rendered = template.render(&context, false)?;
//! assert_eq!(rendered.text, "Contact DevOps for restart pod");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
mod error;
mod lexer;
pub mod parser;
pub mod render;
pub mod store;

pub use ast::{Body, Condition, Node, VarType};
pub use error::{RenderError, StoreError, TemplateError};
pub use parser::parse;
pub use render::{Context, Rendered, Value, render};
pub use store::{
    DEFAULT_ITERATION_CAP, StoreSnapshot, Template, TemplateDefinition, TemplateStore,
};
