//! Renders a parsed [`Body`] against a [`Context`].
//!
//! Rendering is a pure walk of the syntax tree: no I/O, clock or randomness.
//! Identical (body, context, mode) always yields identical output.

use std::collections::BTreeMap;

use rolegate_types::{RenderWarning, WarningCode};
use serde::{Deserialize, Serialize};

use crate::ast::{Body, Condition, Node, VarType};
use crate::error::RenderError;

/// A context value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl Value {
    pub fn var_type(&self) -> VarType {
        match self {
            Value::Bool(_) => VarType::Bool,
            Value::Str(_) => VarType::String,
            Value::List(_) => VarType::List,
        }
    }

    /// Display form: booleans as `true`/`false`, lists comma-joined.
    pub fn display(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items.join(", "),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value)
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Value::List(value.into_iter().map(String::from).collect())
    }
}

/// Variables available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a variable, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Output of a successful render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub warnings: Vec<RenderWarning>,
}

/// Renders `body` against `context`.
///
/// In non-strict mode, missing and mistyped variables degrade to empty
/// output (or `false`) with a warning. In strict mode they abort the render.
/// Loops longer than their cap always render `cap` items and warn.
pub fn render(body: &Body, context: &Context, strict: bool) -> Result<Rendered, RenderError> {
    let mut walker = Walker {
        context,
        strict,
        scope: Vec::new(),
        out: Rendered::default(),
    };
    walker.render_nodes(&body.nodes)?;
    Ok(walker.out)
}

struct Walker<'a> {
    context: &'a Context,
    strict: bool,
    /// Bound loop items, innermost last.
    scope: Vec<(&'a str, &'a str)>,
    out: Rendered,
}

impl<'a> Walker<'a> {
    fn render_nodes(&mut self, nodes: &'a [Node]) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Literal(text) => self.out.text.push_str(text),
                Node::Variable(name) => self.render_variable(name)?,
                Node::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    if self.condition_holds(condition)? {
                        self.render_nodes(then)?;
                    } else {
                        self.render_nodes(otherwise)?;
                    }
                }
                Node::For {
                    list,
                    item,
                    body,
                    cap,
                } => self.render_loop(list, item, body, *cap)?,
            }
        }
        Ok(())
    }

    fn render_variable(&mut self, name: &str) -> Result<(), RenderError> {
        if let Some((_, value)) = self.scope.iter().rev().find(|(item, _)| *item == name) {
            self.out.text.push_str(value);
            return Ok(());
        }

        match self.context.get(name) {
            Some(value) => {
                self.out.text.push_str(&value.display());
                Ok(())
            }
            None => self.unresolved(name),
        }
    }

    fn condition_holds(&mut self, condition: &Condition) -> Result<bool, RenderError> {
        let context = self.context;
        let value = match context.get(&condition.name) {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                self.mismatch(&condition.name, VarType::Bool, other.var_type())?;
                false
            }
            None => {
                self.unresolved(&condition.name)?;
                false
            }
        };
        Ok(value != condition.negated)
    }

    fn render_loop(
        &mut self,
        list: &str,
        item: &'a str,
        body: &'a [Node],
        cap: usize,
    ) -> Result<(), RenderError> {
        let context = self.context;
        let items = match context.get(list) {
            Some(Value::List(items)) => items,
            Some(other) => return self.mismatch(list, VarType::List, other.var_type()),
            None => return self.unresolved(list),
        };

        if items.len() > cap {
            self.out
                .warnings
                .push(RenderWarning::new(WarningCode::IterationCapExceeded, list));
        }

        for value in items.iter().take(cap) {
            self.scope.push((item, value.as_str()));
            let rendered = self.render_nodes(body);
            self.scope.pop();
            rendered?;
        }
        Ok(())
    }

    fn unresolved(&mut self, name: &str) -> Result<(), RenderError> {
        if self.strict {
            return Err(RenderError::UnresolvedVariable(name.to_string()));
        }
        self.out
            .warnings
            .push(RenderWarning::new(WarningCode::UnresolvedVariable, name));
        Ok(())
    }

    fn mismatch(&mut self, name: &str, expected: VarType, found: VarType) -> Result<(), RenderError> {
        if self.strict {
            return Err(RenderError::TypeMismatch {
                name: name.to_string(),
                expected,
                found,
            });
        }
        self.out
            .warnings
            .push(RenderWarning::new(WarningCode::TypeMismatch, name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use proptest::prelude::*;

    const ADMIN_TEMPLATE: &str =
        "{% if requires_admin %}Contact DevOps for {{action}}{% else %}Run {{command}}{% endif %}";

    fn body(source: &str) -> Body {
        parse(source, &BTreeMap::new(), 25).unwrap()
    }

    #[test]
    fn renders_then_branch() {
        let context = Context::new()
            .with("requires_admin", true)
            .with("action", "restart pod");
        let rendered = render(&body(ADMIN_TEMPLATE), &context, false).unwrap();
        assert_eq!(rendered.text, "Contact DevOps for restart pod");
        assert!(rendered.warnings.is_empty());
    }

    #[test]
    fn renders_else_branch() {
        let context = Context::new()
            .with("requires_admin", false)
            .with("command", "kubectl rollout restart deployment/x");
        let rendered = render(&body(ADMIN_TEMPLATE), &context, false).unwrap();
        assert_eq!(rendered.text, "Run kubectl rollout restart deployment/x");
    }

    #[test]
    fn negated_condition() {
        let template = body("{% if not has_documents %}No results.{% else %}Found.{% endif %}");
        let empty = render(&template, &Context::new().with("has_documents", false), false).unwrap();
        let full = render(&template, &Context::new().with("has_documents", true), false).unwrap();
        assert_eq!(empty.text, "No results.");
        assert_eq!(full.text, "Found.");
    }

    #[test]
    fn missing_variable_warns_and_renders_empty() {
        let rendered = render(&body("Run {{command}}."), &Context::new(), false).unwrap();
        assert_eq!(rendered.text, "Run .");
        assert_eq!(
            rendered.warnings,
            vec![RenderWarning::new(WarningCode::UnresolvedVariable, "command")]
        );
    }

    #[test]
    fn missing_condition_is_false() {
        let rendered = render(
            &body("{% if requires_admin %}admin{% else %}self-serve{% endif %}"),
            &Context::new(),
            false,
        )
        .unwrap();
        assert_eq!(rendered.text, "self-serve");
        assert_eq!(rendered.warnings[0].code, WarningCode::UnresolvedVariable);
    }

    #[test]
    fn strict_mode_fails_on_missing_variable() {
        let err = render(&body("Run {{command}}"), &Context::new(), true).unwrap_err();
        assert_eq!(err, RenderError::UnresolvedVariable("command".into()));
        assert_eq!(err.failure_kind(), rolegate_types::FailureKind::UnresolvedVariable);
    }

    #[test]
    fn mistyped_condition_warns_or_fails() {
        let template = body("{% if flag %}on{% else %}off{% endif %}");
        let context = Context::new().with("flag", "yes");

        let lenient = render(&template, &context, false).unwrap();
        assert_eq!(lenient.text, "off");
        assert_eq!(lenient.warnings[0].code, WarningCode::TypeMismatch);

        let strict = render(&template, &context, true).unwrap_err();
        assert!(matches!(strict, RenderError::TypeMismatch { expected: VarType::Bool, .. }));
    }

    #[test]
    fn mistyped_loop_source_renders_nothing() {
        let template = body("[{% for c in cmds %}{{c}}{% endfor %}]");
        let rendered = render(&template, &Context::new().with("cmds", true), false).unwrap();
        assert_eq!(rendered.text, "[]");
        assert_eq!(rendered.warnings[0].code, WarningCode::TypeMismatch);
    }

    #[test]
    fn display_formats_bools_and_lists() {
        let template = body("{{ flag }} / {{ items }}");
        let context = Context::new()
            .with("flag", true)
            .with("items", vec!["a", "b", "c"]);
        assert_eq!(render(&template, &context, false).unwrap().text, "true / a, b, c");
    }

    #[test]
    fn loop_stops_at_cap_and_warns() {
        let template = body("{% for cmd in related_commands cap 2 %}- {{ cmd }}\n{% endfor %}");
        let context = Context::new().with("related_commands", vec!["one", "two", "three"]);
        let rendered = render(&template, &context, false).unwrap();

        assert_eq!(rendered.text, "- one\n- two\n");
        assert_eq!(
            rendered.warnings,
            vec![RenderWarning::new(WarningCode::IterationCapExceeded, "related_commands")]
        );
    }

    #[test]
    fn cap_warning_is_raised_even_in_strict_mode() {
        let template = body("{% for c in cmds cap 1 %}{{c}}{% endfor %}");
        let context = Context::new().with("cmds", vec!["x", "y"]);
        let rendered = render(&template, &context, true).unwrap();
        assert_eq!(rendered.text, "x");
        assert_eq!(rendered.warnings.len(), 1);
    }

    #[test]
    fn nested_loop_items_shadow_outer() {
        let template = body("{% for x in outer %}{% for x in inner %}{{x}}{% endfor %}{{x}};{% endfor %}");
        let context = Context::new()
            .with("outer", vec!["A", "B"])
            .with("inner", vec!["1", "2"]);
        assert_eq!(render(&template, &context, false).unwrap().text, "12A;12B;");
    }

    #[test]
    fn context_deserializes_untagged_values() {
        let context: Context =
            serde_json::from_str(r#"{"flag": true, "name": "x", "items": ["a"]}"#).unwrap();
        assert_eq!(context.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(context.get("name"), Some(&Value::Str("x".into())));
        assert_eq!(context.get("items"), Some(&Value::List(vec!["a".into()])));
    }

    proptest! {
        #[test]
        fn prop_loop_renders_exactly_cap_items(
            items in proptest::collection::vec("[a-z]{1,6}", 0..40),
            cap in 1usize..20,
        ) {
            let template = parse(
                &format!("{{% for i in items cap {cap} %}}[{{{{ i }}}}]{{% endfor %}}"),
                &BTreeMap::new(),
                25,
            )
            .unwrap();
            let context = Context::new().with("items", items.clone());
            let rendered = render(&template, &context, false).unwrap();

            let rendered_items = rendered.text.matches('[').count();
            prop_assert_eq!(rendered_items, items.len().min(cap));
            let capped = rendered
                .warnings
                .iter()
                .any(|w| w.code == WarningCode::IterationCapExceeded);
            prop_assert_eq!(capped, items.len() > cap);
        }

        #[test]
        fn prop_rendering_is_deterministic(
            flag in any::<bool>(),
            action in "[a-z ]{0,20}",
            commands in proptest::collection::vec("[a-z-]{1,10}", 0..10),
        ) {
            let template = body(
                "{% if flag %}{{action}}{% else %}none{% endif %}{% for c in commands cap 5 %}{{c}},{% endfor %}{{missing}}",
            );
            let context = Context::new()
                .with("flag", flag)
                .with("action", action)
                .with("commands", commands);

            let first = render(&template, &context, false).unwrap();
            let second = render(&template, &context, false).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
