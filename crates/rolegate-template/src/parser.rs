//! Parses template tokens into a type-checked [`Body`].
//!
//! Grammar:
//!
//! ```text
//! body      := (text | output | if | for)*
//! output    := "{{" ident "}}"
//! if        := "{%" "if" ["not"] ident "%}" body ["{%" "else" "%}" body] "{%" "endif" "%}"
//! for       := "{%" "for" ident "in" ident ["cap" N] "%}" body "{%" "endfor" "%}"
//! ```
//!
//! Conditions must be boolean variables and loop sources must be lists.
//! Undeclared variables take their type from usage; a display-only use is
//! compatible with any type.

use std::collections::BTreeMap;

use crate::ast::{Body, Condition, Node, VarType};
use crate::error::{Result, TemplateError};
use crate::lexer::{Spanned, Token, tokenize};

const RESERVED: [&str; 5] = ["not", "in", "cap", "true", "false"];

/// Parses and type-checks `source`.
///
/// `declared` is the template's variable schema; `default_cap` applies to
/// loops without an explicit `cap`.
pub fn parse(source: &str, declared: &BTreeMap<String, VarType>, default_cap: usize) -> Result<Body> {
    if default_cap == 0 {
        return Err(TemplateError::new(0, "default iteration cap must be positive"));
    }
    for name in declared.keys() {
        if !is_identifier(name) {
            return Err(TemplateError::new(
                0,
                format!("declared variable '{name}' is not a valid identifier"),
            ));
        }
    }

    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        declared,
        inferred: BTreeMap::new(),
        loop_items: Vec::new(),
        default_cap,
    };

    let (nodes, terminator) = parser.parse_nodes(&[])?;
    debug_assert!(terminator.is_none());

    let mut variables: BTreeMap<String, VarType> = parser
        .inferred
        .into_iter()
        .map(|(name, usage)| (name, usage.ty))
        .collect();
    variables.extend(declared.iter().map(|(name, ty)| (name.clone(), *ty)));

    Ok(Body { nodes, variables })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.contains(&name)
}

fn looks_like_literal(word: &str) -> bool {
    word.starts_with(['"', '\''])
        || word.starts_with(|c: char| c.is_ascii_digit() || c == '-')
        || word == "true"
        || word == "false"
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    ty: VarType,
    /// `if` and `for` fix a type; display-only use does not.
    fixed: bool,
}

struct Parser<'s, 'd> {
    tokens: Vec<Spanned<'s>>,
    pos: usize,
    declared: &'d BTreeMap<String, VarType>,
    inferred: BTreeMap<String, Usage>,
    /// Loop item names currently in scope, innermost last.
    loop_items: Vec<&'s str>,
    default_cap: usize,
}

impl<'s> Parser<'s, '_> {
    /// Parses nodes until one of `terminators` (a bare tag keyword) or end of input.
    ///
    /// Returns the nodes and the terminator that stopped parsing, if any.
    fn parse_nodes(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, Option<&'s str>)> {
        let mut nodes = Vec::new();

        while let Some(spanned) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            let offset = spanned.offset;
            match spanned.token {
                Token::Text(text) => nodes.push(Node::Literal(text.to_string())),
                Token::Output(expr) => {
                    let name = self.identifier(expr, offset)?;
                    if !self.is_loop_item(name) {
                        self.record_use(name, None, offset)?;
                    }
                    nodes.push(Node::Variable(name.to_string()));
                }
                Token::Tag(tag) => {
                    let words: Vec<&'s str> = tag.split_whitespace().collect();
                    match words.as_slice() {
                        ["if", rest @ ..] => nodes.push(self.parse_if(rest, offset)?),
                        ["for", rest @ ..] => nodes.push(self.parse_for(rest, offset)?),
                        [keyword @ ("else" | "endif" | "endfor")] => {
                            if terminators.contains(keyword) {
                                return Ok((nodes, Some(*keyword)));
                            }
                            return Err(TemplateError::new(
                                offset,
                                format!("unexpected '{{% {keyword} %}}'"),
                            ));
                        }
                        _ => {
                            return Err(TemplateError::new(offset, format!("unknown tag '{tag}'")));
                        }
                    }
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_if(&mut self, words: &[&'s str], offset: usize) -> Result<Node> {
        let (negated, name) = match words {
            ["not", name] => (true, *name),
            [name] => (false, *name),
            [] | ["not"] => return Err(TemplateError::new(offset, "'if' without a condition")),
            _ => {
                return Err(TemplateError::new(
                    offset,
                    "condition must be a single boolean variable, optionally negated with 'not'",
                ));
            }
        };

        if looks_like_literal(name) {
            return Err(TemplateError::new(
                offset,
                format!("condition '{name}' is a literal, not a boolean variable"),
            ));
        }
        let name = self.identifier(name, offset)?;
        if self.is_loop_item(name) {
            return Err(TemplateError::new(
                offset,
                format!("loop item '{name}' is a string and cannot be a condition"),
            ));
        }
        self.record_use(name, Some(VarType::Bool), offset)?;

        let (then, terminator) = self.parse_nodes(&["else", "endif"])?;
        let otherwise = match terminator {
            Some("else") => match self.parse_nodes(&["endif"])? {
                (nodes, Some(_)) => nodes,
                (_, None) => return Err(TemplateError::new(offset, "unclosed 'if'")),
            },
            Some(_) => Vec::new(),
            None => return Err(TemplateError::new(offset, "unclosed 'if'")),
        };

        Ok(Node::If {
            condition: Condition {
                name: name.to_string(),
                negated,
            },
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self, words: &[&'s str], offset: usize) -> Result<Node> {
        let (item, list, cap) = match words {
            [item, "in", list] => (*item, *list, None),
            [item, "in", list, "cap", cap] => (*item, *list, Some(*cap)),
            _ => {
                return Err(TemplateError::new(
                    offset,
                    "expected '{% for item in list %}' or '{% for item in list cap N %}'",
                ));
            }
        };

        let item = self.identifier(item, offset)?;
        let list = self.identifier(list, offset)?;
        let cap = match cap {
            None => self.default_cap,
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) => return Err(TemplateError::new(offset, "loop cap must be positive")),
                Ok(n) => n,
                Err(_) => {
                    return Err(TemplateError::new(
                        offset,
                        format!("loop cap '{raw}' is not a positive integer"),
                    ));
                }
            },
        };

        if self.is_loop_item(list) {
            return Err(TemplateError::new(
                offset,
                format!("loop item '{list}' is a string and cannot be iterated"),
            ));
        }
        self.record_use(list, Some(VarType::List), offset)?;

        self.loop_items.push(item);
        let parsed = self.parse_nodes(&["endfor"]);
        self.loop_items.pop();

        match parsed? {
            (body, Some(_)) => Ok(Node::For {
                list: list.to_string(),
                item: item.to_string(),
                body,
                cap,
            }),
            (_, None) => Err(TemplateError::new(offset, "unclosed 'for'")),
        }
    }

    fn identifier(&self, word: &'s str, offset: usize) -> Result<&'s str> {
        if is_identifier(word) {
            Ok(word)
        } else {
            Err(TemplateError::new(offset, format!("invalid identifier '{word}'")))
        }
    }

    fn is_loop_item(&self, name: &str) -> bool {
        self.loop_items.contains(&name)
    }

    /// Checks a use of `name` against its declared or inferred type.
    ///
    /// `required` is `None` for display (`{{ }}`) uses.
    fn record_use(&mut self, name: &str, required: Option<VarType>, offset: usize) -> Result<()> {
        if let Some(declared) = self.declared.get(name) {
            return match required {
                Some(ty) if ty != *declared => Err(TemplateError::new(
                    offset,
                    format!("variable '{name}' is declared {declared} but used as {ty}"),
                )),
                _ => Ok(()),
            };
        }

        let usage = match required {
            Some(ty) => Usage { ty, fixed: true },
            None => Usage {
                ty: VarType::String,
                fixed: false,
            },
        };

        match self.inferred.get_mut(name) {
            None => {
                self.inferred.insert(name.to_string(), usage);
            }
            Some(existing) if usage.fixed && existing.fixed && existing.ty != usage.ty => {
                return Err(TemplateError::new(
                    offset,
                    format!(
                        "variable '{name}' is used as both {} and {}",
                        existing.ty, usage.ty
                    ),
                ));
            }
            Some(existing) if usage.fixed && !existing.fixed => *existing = usage,
            Some(_) => {}
        }
        Ok(())
    }
}
