//! Evaluation of SCO prerequisite expressions.
//!
//! ```text
//! expr    = and ('|' and)*
//! and     = unary ('&' unary)*
//! unary   = '~' unary | primary
//! primary = '(' expr ')' | N '*' '{' id (',' id)* '}' | id ('=' | '<>') status | id
//! ```
//!
//! Statuses may be written in full or abbreviated (`p`, `c`, `f`, `i`, `b`,
//! `n`). A bare identifier holds when that SCO is completed or passed.

use std::collections::BTreeMap;

use crate::error::PrerequisiteError;
use crate::types::normalize_status;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    Atom(String),
}

fn tokenize(expression: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut atom_start = None;

    let flush = |tokens: &mut Vec<(usize, Token)>, start: Option<usize>, end: usize| {
        if let Some(start) = start {
            let text = expression[start..end].trim();
            if !text.is_empty() {
                tokens.push((start, Token::Atom(text.to_string())));
            }
        }
    };

    for (pos, ch) in expression.char_indices() {
        let token = match ch {
            '&' => Some(Token::And),
            '|' => Some(Token::Or),
            '~' => Some(Token::Not),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            _ => None,
        };
        match token {
            Some(token) => {
                flush(&mut tokens, atom_start.take(), pos);
                tokens.push((pos, token));
            }
            None if atom_start.is_none() && !ch.is_whitespace() => atom_start = Some(pos),
            None => {}
        }
    }
    flush(&mut tokens, atom_start, expression.len());
    tokens
}

fn expand_status(value: &str) -> Option<&'static str> {
    Some(match value.trim() {
        "p" | "passed" => "passed",
        "c" | "completed" => "completed",
        "f" | "failed" => "failed",
        "i" | "incomplete" => "incomplete",
        "b" | "browsed" => "browsed",
        "n" | "not attempted" | "notattempted" => "notattempted",
        _ => return None,
    })
}

struct Parser<'a> {
    tokens: Vec<(usize, Token)>,
    index: usize,
    end: usize,
    statuses: &'a BTreeMap<String, String>,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> PrerequisiteError {
        let position = self.tokens.get(self.index).map_or(self.end, |(pos, _)| *pos);
        PrerequisiteError {
            position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, token)| token)
    }

    fn or(&mut self) -> Result<bool, PrerequisiteError> {
        let mut value = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.index += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, PrerequisiteError> {
        let mut value = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.index += 1;
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<bool, PrerequisiteError> {
        if self.peek() == Some(&Token::Not) {
            self.index += 1;
            return Ok(!self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, PrerequisiteError> {
        match self.peek().cloned() {
            Some(Token::Open) => {
                self.index += 1;
                let value = self.or()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error("expected ')'"));
                }
                self.index += 1;
                Ok(value)
            }
            Some(Token::Atom(text)) => {
                let value = self.atom(&text)?;
                self.index += 1;
                Ok(value)
            }
            Some(_) => Err(self.error("expected identifier or '('")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn status_of(&self, id: &str) -> String {
        self.statuses
            .get(id)
            .map(|status| normalize_status(status))
            .unwrap_or_else(|| "notattempted".to_string())
    }

    fn is_done(&self, id: &str) -> bool {
        matches!(self.status_of(id).as_str(), "completed" | "passed")
    }

    fn atom(&self, text: &str) -> Result<bool, PrerequisiteError> {
        if let Some((count, set)) = text.split_once('*') {
            let count: usize = count
                .trim()
                .parse()
                .map_err(|_| self.error("expected a number before '*'"))?;
            let ids = set
                .trim()
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .ok_or_else(|| self.error("expected '{...}' after '*'"))?;
            let done = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty() && self.is_done(id))
                .count();
            return Ok(done >= count);
        }

        let comparison = text
            .split_once("<>")
            .map(|(id, status)| (id, status, false))
            .or_else(|| text.split_once('=').map(|(id, status)| (id, status, true)));

        match comparison {
            Some((id, status, equal)) => {
                let expected =
                    expand_status(status).ok_or_else(|| self.error("unknown status"))?;
                let matches = self.status_of(id.trim()) == expected;
                Ok(matches == equal)
            }
            None if text.contains(char::is_whitespace) => Err(self.error("unexpected space")),
            None => Ok(self.is_done(text)),
        }
    }
}

/// Evaluates a prerequisites expression against SCO statuses.
///
/// `statuses` maps SCO identifiers to their lesson status. Unknown
/// identifiers count as not attempted. An empty expression holds.
///
/// # Errors
///
/// Returns an error if the expression is malformed.
pub fn evaluate_prerequisites(
    expression: &str,
    statuses: &BTreeMap<String, String>,
) -> Result<bool, PrerequisiteError> {
    let expression = expression.replace("&amp;", "&");
    if expression.trim().is_empty() {
        return Ok(true);
    }

    let mut parser = Parser {
        tokens: tokenize(&expression),
        index: 0,
        end: expression.len(),
        statuses,
    };
    let value = parser.or()?;
    if parser.index < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}
