//! Splits template source into text, output and tag tokens.

use crate::error::{Result, TemplateError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Verbatim text between delimiters.
    Text(&'a str),
    /// Trimmed contents of `{{ ... }}`.
    Output(&'a str),
    /// Trimmed contents of `{% ... %}`.
    Tag(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned<'a> {
    pub token: Token<'a>,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned<'_>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let next_open = [rest.find("{{"), rest.find("{%")]
            .into_iter()
            .flatten()
            .min();

        let Some(open) = next_open else {
            tokens.push(Spanned {
                token: Token::Text(rest),
                offset: pos,
            });
            break;
        };

        if open > 0 {
            tokens.push(Spanned {
                token: Token::Text(&rest[..open]),
                offset: pos,
            });
        }

        let start = pos + open;
        let is_output = source[start..].starts_with("{{");
        let close = if is_output { "}}" } else { "%}" };
        let inner_start = start + 2;

        let Some(len) = source[inner_start..].find(close) else {
            let kind = if is_output { "{{" } else { "{%" };
            return Err(TemplateError::new(start, format!("unterminated '{kind}'")));
        };

        let inner = source[inner_start..inner_start + len].trim();
        if inner.is_empty() {
            return Err(TemplateError::new(start, "empty delimiter"));
        }

        tokens.push(Spanned {
            token: if is_output {
                Token::Output(inner)
            } else {
                Token::Tag(inner)
            },
            offset: start,
        });
        pos = inner_start + len + close.len();
    }

    Ok(tokens)
}
