use std::fmt;
use std::ops::{Index, Range};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{Token, VariableId};

/// An owned, ordered sequence of [`Token`]s.
///
/// Supports the index-based editing the rewrite engine needs: get, set, remove, insert,
/// slice and splice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tokens {
    tokens: Vec<Token>,
}

impl Tokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `input` on whitespace and classifies every piece with [`Token::input`].
    pub fn from_input(input: &str) -> Self {
        input.split_whitespace().map(Token::input).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn set(&mut self, index: usize, token: Token) -> Token {
        std::mem::replace(&mut self.tokens[index], token)
    }

    pub fn remove(&mut self, index: usize) -> Token {
        self.tokens.remove(index)
    }

    pub fn insert(&mut self, index: usize, token: Token) {
        self.tokens.insert(index, token);
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn slice(&self, range: Range<usize>) -> Tokens {
        self.tokens[range].iter().cloned().collect()
    }

    /// Replaces `range` with `replacement`, returning the removed tokens.
    pub fn splice(
        &mut self,
        range: Range<usize>,
        replacement: impl IntoIterator<Item = Token>,
    ) -> Tokens {
        self.tokens.splice(range, replacement).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(Token::text).collect()
    }

    /// Whether `pattern` matches the tokens starting at `index`, position by position.
    pub fn matches_at(&self, index: usize, pattern: &[Token]) -> bool {
        self.tokens
            .get(index..index + pattern.len())
            .is_some_and(|window| {
                pattern
                    .iter()
                    .zip_eq(window)
                    .all(|(pattern, token)| pattern.matches(token))
            })
    }

    /// Largest external variable id present, if any.
    pub fn max_external_variable(&self) -> Option<VariableId> {
        self.tokens.iter().filter_map(Token::external_variable).max()
    }
}

impl Index<usize> for Tokens {
    type Output = Token;

    fn index(&self, index: usize) -> &Self::Output {
        &self.tokens[index]
    }
}

impl Index<Range<usize>> for Tokens {
    type Output = [Token];

    fn index(&self, range: Range<usize>) -> &Self::Output {
        &self.tokens[range]
    }
}

impl FromIterator<Token> for Tokens {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Token>> for Tokens {
    fn from(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }
}

impl<'a> IntoIterator for &'a Tokens {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl IntoIterator for Tokens {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.iter().join(" "))
    }
}
