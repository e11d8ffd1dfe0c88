//! Tokens: the atomic units the rewrite engine matches and substitutes.
//!
//! A [`Token`] carries its source text and a [`TokenKind`]. Literal tokens are compared by
//! text. Variables and wildcards accept any single token when they appear as a pattern
//! position, see [`Token::matches`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod tokens;

pub use tokens::Tokens;

pub type VariableId = u64;

/// Marker that starts an internal (pattern-local) variable, e.g. `#1`.
pub const INTERNAL_MARKER: char = '#';
/// Marker that starts an external (renamed, globally unique) variable, e.g. `$7`.
pub const EXTERNAL_MARKER: char = '$';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Literal,
    InternalVar(VariableId),
    ExternalVar(VariableId),
    Wildcard,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a valid variable reference")]
pub struct MalformedVariable(pub String);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    text: String,
    kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_tag: Option<String>,
}

impl Token {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TokenKind::Literal,
            type_tag: None,
        }
    }

    pub fn internal(id: VariableId) -> Self {
        Self {
            text: format!("{INTERNAL_MARKER}{id}"),
            kind: TokenKind::InternalVar(id),
            type_tag: None,
        }
    }

    pub fn external(id: VariableId) -> Self {
        Self {
            text: format!("{EXTERNAL_MARKER}{id}"),
            kind: TokenKind::ExternalVar(id),
            type_tag: None,
        }
    }

    pub fn wildcard() -> Self {
        Self {
            text: String::from("*"),
            kind: TokenKind::Wildcard,
            type_tag: None,
        }
    }

    pub fn with_type_tag(mut self, type_tag: Option<String>) -> Self {
        self.type_tag = type_tag;
        self
    }

    /// Classifies one raw rule-database string.
    ///
    /// `#<int>` is an internal variable and `$<int>` an external one. A lone marker is an
    /// ordinary literal, but a marker followed by anything other than an integer is an error.
    /// Leading zeros are accepted and dropped, so `#01` is `#1`. A trailing `(type...)` group
    /// is split off into the type tag.
    pub fn parse(raw: &str) -> Result<Self, MalformedVariable> {
        let (head, type_tag) = split_type_tag(raw);

        let token = match parse_variable(head, INTERNAL_MARKER) {
            Some(id) => Self::internal(id?),
            None => match parse_variable(head, EXTERNAL_MARKER) {
                Some(id) => Self::external(id?),
                None => Self::literal(head),
            },
        };

        Ok(token.with_type_tag(type_tag.map(str::to_string)))
    }

    /// Classifies one token of rewrite input. Input never carries internal variables, so only
    /// well-formed `$<int>` references are recognised and everything else is literal.
    pub fn input(raw: &str) -> Self {
        match parse_variable(raw, EXTERNAL_MARKER) {
            Some(Ok(id)) => Self::external(id),
            _ => Self::literal(raw),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.type_tag.as_deref()
    }

    pub fn internal_variable(&self) -> Option<VariableId> {
        match self.kind {
            TokenKind::InternalVar(id) => Some(id),
            _ => None,
        }
    }

    pub fn external_variable(&self) -> Option<VariableId> {
        match self.kind {
            TokenKind::ExternalVar(id) => Some(id),
            _ => None,
        }
    }

    /// `true` for every kind that accepts an arbitrary token as a pattern position.
    pub fn is_variable(&self) -> bool {
        !matches!(self.kind, TokenKind::Literal)
    }

    /// `self` is treated as a pattern position which may accept `input`.
    pub fn matches(&self, input: &Token) -> bool {
        match self.kind {
            TokenKind::Literal => input.kind == TokenKind::Wildcard || self.text == input.text,
            TokenKind::InternalVar(_) | TokenKind::ExternalVar(_) | TokenKind::Wildcard => true,
        }
    }
}

impl PartialEq for Token {
    // Type tags are auxiliary and never take part in comparisons.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl Eq for Token {}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Token {
    fn from(raw: &str) -> Self {
        Self::input(raw)
    }
}

/// `None` if `raw` is not a variable reference with the given marker at all.
fn parse_variable(raw: &str, marker: char) -> Option<Result<VariableId, MalformedVariable>> {
    let suffix = raw.strip_prefix(marker)?;
    if suffix.is_empty() {
        return None;
    }

    // `u64::from_str` alone would also take a leading `+`
    Some(
        Some(suffix)
            .filter(|suffix| suffix.bytes().all(|byte| byte.is_ascii_digit()))
            .and_then(|suffix| suffix.parse().ok())
            .ok_or_else(|| MalformedVariable(raw.to_string())),
    )
}

fn split_type_tag(raw: &str) -> (&str, Option<&str>) {
    let Some(inner) = raw.strip_suffix(')') else {
        return (raw, None);
    };

    match inner.find('(') {
        Some(open) if open > 0 && open + 1 < inner.len() => {
            (&inner[..open], Some(&inner[open + 1..]))
        }
        _ => (raw, None),
    }
}

#[cfg(test)]
mod tests {
    use super::{MalformedVariable, Token, TokenKind};

    #[test]
    fn parse_literal() {
        let token = Token::parse("while").unwrap();
        assert_eq!(token.kind(), TokenKind::Literal);
        assert_eq!(token.text(), "while");
        assert_eq!(token.type_tag(), None);
    }

    #[test]
    fn parse_variables() {
        assert_eq!(Token::parse("#3").unwrap().kind(), TokenKind::InternalVar(3));
        assert_eq!(Token::parse("$12").unwrap().kind(), TokenKind::ExternalVar(12));

        // Lone markers are operators, not variables
        assert_eq!(Token::parse("#").unwrap().kind(), TokenKind::Literal);
        assert_eq!(Token::parse("$").unwrap().kind(), TokenKind::Literal);
    }

    #[test]
    fn parse_malformed_variables() {
        assert_eq!(
            Token::parse("#x").unwrap_err(),
            MalformedVariable(String::from("#x"))
        );
        assert!(Token::parse("$1a").is_err());
        assert!(Token::parse("#-1").is_err());
        assert!(Token::parse("#+1").is_err());
        assert!(Token::parse("$18446744073709551616").is_err());
    }

    #[test]
    fn leading_zeros_are_dropped() {
        let token = Token::parse("#01").unwrap();
        assert_eq!(token.kind(), TokenKind::InternalVar(1));
        assert_eq!(token, Token::internal(1));
        assert_eq!(token.text(), "#1");

        assert_eq!(Token::parse("$007").unwrap(), Token::external(7));
        assert_eq!(Token::input("$00").kind(), TokenKind::ExternalVar(0));
    }

    #[test]
    fn parse_type_tag() {
        let token = Token::parse("#1(int)").unwrap();
        assert_eq!(token.kind(), TokenKind::InternalVar(1));
        assert_eq!(token.type_tag(), Some("int"));

        let token = Token::parse("x(unsigned long)").unwrap();
        assert_eq!(token.text(), "x");
        assert_eq!(token.type_tag(), Some("unsigned long"));

        // Not annotations
        assert_eq!(Token::parse("()").unwrap().text(), "()");
        assert_eq!(Token::parse("f()").unwrap().text(), "f()");
        assert_eq!(Token::parse("(int)").unwrap().text(), "(int)");
    }

    #[test]
    fn type_tag_ignored_by_equality() {
        let plain = Token::parse("x").unwrap();
        let tagged = Token::parse("x(int)").unwrap();
        assert_eq!(plain, tagged);
    }

    #[test]
    fn pattern_matching() {
        let a = Token::literal("a");
        let b = Token::literal("b");

        assert!(a.matches(&a));
        assert!(!a.matches(&b));
        assert!(a.matches(&Token::wildcard()));

        for pattern in [Token::internal(1), Token::external(4), Token::wildcard()] {
            assert!(pattern.matches(&a));
            assert!(pattern.matches(&Token::external(9)));
        }
    }

    #[test]
    fn input_tokens() {
        assert_eq!(Token::input("$4").kind(), TokenKind::ExternalVar(4));
        assert_eq!(Token::input("#4").kind(), TokenKind::Literal);
        assert_eq!(Token::input("$x").kind(), TokenKind::Literal);
    }
}
