//! Template syntax tree.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type of a template variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Bool,
    List,
}

impl VarType {
    pub fn as_str(self) -> &'static str {
        match self {
            VarType::String => "string",
            VarType::Bool => "bool",
            VarType::List => "list",
        }
    }
}

impl Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "str" => Ok(VarType::String),
            "bool" | "boolean" => Ok(VarType::Bool),
            "list" => Ok(VarType::List),
            other => Err(format!("unknown variable type '{other}'")),
        }
    }
}

/// `if` condition: a boolean variable, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub name: String,
    pub negated: bool,
}

/// A node of the template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Verbatim text.
    Literal(String),

    /// `{{ name }}`
    Variable(String),

    /// `{% if [not] name %} then {% else %} otherwise {% endif %}`
    If {
        condition: Condition,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },

    /// `{% for item in list [cap N] %} body {% endfor %}`
    ///
    /// `cap` is always resolved at parse time; loops without an explicit
    /// cap take the template's default.
    For {
        list: String,
        item: String,
        body: Vec<Node>,
        cap: usize,
    },
}

/// A parsed and type-checked template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub nodes: Vec<Node>,

    /// Every free variable with its declared or inferred type.
    pub variables: BTreeMap<String, VarType>,
}

impl Body {
    /// Returns the declared-or-inferred type of a free variable.
    pub fn variable_type(&self, name: &str) -> Option<VarType> {
        self.variables.get(name).copied()
    }
}
