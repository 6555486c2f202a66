//! Token, pair, and grammar types shared by the trainer and the persisted formats.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BytepairError, Result};
use crate::serialization;

/// Token identifier used throughout the crate.
///
/// Values `0..=255` are literal bytes, larger values are minted one per merge.
pub type TokenId = u32;

/// Number of literal byte tokens reserved at the start of every grammar.
pub const LITERAL_TOKENS: usize = 256;

/// Ordered pair of adjacent tokens, the key of the pair-frequency queue.
///
/// Serialises as a two-element array `[left, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(TokenId, TokenId)", into = "(TokenId, TokenId)")]
pub struct Pair {
    /// Left token of the pair.
    pub left: TokenId,
    /// Right token of the pair.
    pub right: TokenId,
}

impl Pair {
    /// Creates a pair from its two components.
    #[must_use]
    pub const fn new(left: TokenId, right: TokenId) -> Self {
        Self { left, right }
    }
}

impl From<(TokenId, TokenId)> for Pair {
    fn from((left, right): (TokenId, TokenId)) -> Self {
        Self::new(left, right)
    }
}

impl From<Pair> for (TokenId, TokenId) {
    fn from(pair: Pair) -> Self {
        (pair.left, pair.right)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Append-only list of productions; the index of a rule is the token it defines.
///
/// Rules `0..256` are placeholders `(byte, 0)` for the literal bytes.  Every later rule is
/// the pair merged to mint that token.  Deserialising goes through
/// [`Grammar::from_rules`], so a malformed rule list is rejected.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Pair>", into = "Vec<Pair>")]
pub struct Grammar {
    rules: Vec<Pair>,
}

#[allow(clippy::len_without_is_empty)]
impl Grammar {
    /// Creates a grammar holding only the literal byte placeholders.
    pub fn new() -> Self {
        let rules = (0..LITERAL_TOKENS as TokenId)
            .map(|byte| Pair::new(byte, 0))
            .collect();
        Self { rules }
    }

    /// Rebuilds a grammar from persisted rules, checking that it is well formed.
    ///
    /// The literal placeholders must be intact and every merge may only reference
    /// tokens defined before it.
    pub fn from_rules(rules: Vec<Pair>) -> Result<Self> {
        if rules.len() < LITERAL_TOKENS {
            return Err(BytepairError::Serialization(format!(
                "grammar has {} rules, expected at least {LITERAL_TOKENS}",
                rules.len()
            )));
        }
        for (token, rule) in rules.iter().enumerate().take(LITERAL_TOKENS) {
            if rule.left as usize != token || rule.right != 0 {
                return Err(BytepairError::Serialization(format!(
                    "literal rule {token} is {rule}, expected ({token}, 0)"
                )));
            }
        }
        for (token, rule) in rules.iter().enumerate().skip(LITERAL_TOKENS) {
            if rule.left as usize >= token || rule.right as usize >= token {
                return Err(BytepairError::Serialization(format!(
                    "rule {token} = {rule} references an undefined token"
                )));
            }
        }
        Ok(Self { rules })
    }

    /// Number of rules, which is also the vocabulary size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true once at least one merge has been recorded.
    #[must_use]
    pub fn has_merges(&self) -> bool {
        self.rules.len() > LITERAL_TOKENS
    }

    /// All rules including the literal placeholders.
    #[must_use]
    pub fn rules(&self) -> &[Pair] {
        &self.rules
    }

    /// Only the learned merges, in the order they were introduced.
    #[must_use]
    pub fn merges(&self) -> &[Pair] {
        &self.rules[LITERAL_TOKENS..]
    }

    /// Returns the production for a token if it is defined.
    #[must_use]
    pub fn rule(&self, token: TokenId) -> Option<Pair> {
        self.rules.get(token as usize).copied()
    }

    /// Returns true when the token denotes a literal byte.
    #[must_use]
    pub fn is_literal(token: TokenId) -> bool {
        (token as usize) < LITERAL_TOKENS
    }

    /// Returns true when the token has a production in this grammar.
    #[must_use]
    pub fn defines(&self, token: TokenId) -> bool {
        (token as usize) < self.rules.len()
    }

    /// Appends a merge and returns the freshly minted token.
    pub(crate) fn push(&mut self, pair: Pair) -> Result<TokenId> {
        let token = TokenId::try_from(self.rules.len())
            .map_err(|_| BytepairError::Internal("vocabulary size exceeded u32::MAX".into()))?;
        self.rules.push(pair);
        Ok(token)
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<Pair>> for Grammar {
    type Error = BytepairError;

    fn try_from(rules: Vec<Pair>) -> Result<Self> {
        Self::from_rules(rules)
    }
}

impl From<Grammar> for Vec<Pair> {
    fn from(grammar: Grammar) -> Self {
        grammar.rules
    }
}

/// Result of a training run: the grammar and the fully reduced token stream.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpeModel {
    grammar: Grammar,
    tokens: Vec<TokenId>,
    iterations: u64,
}

impl BpeModel {
    /// Assembles a model, rejecting token streams that use undefined tokens.
    pub fn new(grammar: Grammar, tokens: Vec<TokenId>, iterations: u64) -> Result<Self> {
        if let Some((index, &token)) = tokens
            .iter()
            .enumerate()
            .find(|(_, token)| !grammar.defines(**token))
        {
            return Err(BytepairError::CorruptToken {
                index,
                token,
                grammar_len: grammar.len(),
            });
        }
        Ok(Self {
            grammar,
            tokens,
            iterations,
        })
    }

    /// The learned grammar.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The learned merges without the literal placeholders.
    #[must_use]
    pub fn merges(&self) -> &[Pair] {
        self.grammar.merges()
    }

    /// The reduced token stream.
    #[must_use]
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    /// Number of reduction steps taken to produce the model.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Vocabulary size, literal bytes included.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.grammar.len()
    }

    /// Writes the model in the binary `.bpe` format.
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialization::save_binary(self, path)
    }

    /// Writes the model as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<()> {
        serialization::save_json(self, path, pretty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grammar_reserves_literal_bytes() {
        let grammar = Grammar::new();
        assert_eq!(grammar.len(), 256);
        assert!(!grammar.has_merges());
        assert!(grammar.merges().is_empty());
        assert_eq!(grammar.rule(97), Some(Pair::new(97, 0)));
        assert!(Grammar::is_literal(255));
        assert!(!Grammar::is_literal(256));
    }

    #[test]
    fn push_mints_sequential_tokens() {
        let mut grammar = Grammar::new();
        let first = grammar.push(Pair::new(97, 97)).expect("push first merge");
        let second = grammar.push(Pair::new(first, first)).expect("push second merge");
        assert_eq!((first, second), (256, 257));
        assert_eq!(grammar.merges(), &[Pair::new(97, 97), Pair::new(256, 256)]);
        assert!(grammar.defines(257));
        assert!(!grammar.defines(258));
    }

    #[test]
    fn from_rules_rejects_forward_references() {
        let mut rules = Grammar::new().rules().to_vec();
        rules.push(Pair::new(97, 300));
        let err = Grammar::from_rules(rules).expect_err("forward reference must fail");
        assert!(matches!(
            err,
            BytepairError::Serialization(message) if message.contains("undefined")
        ));
    }

    #[test]
    fn grammar_serde_validates_rules() {
        let mut grammar = Grammar::new();
        grammar.push(Pair::new(97, 98)).expect("push merge");
        assert!(grammar.has_merges());
        let json = serde_json::to_string(&grammar).expect("serialize grammar");
        assert!(json.ends_with("[97,98]]"));
        let parsed: Grammar = serde_json::from_str(&json).expect("deserialize grammar");
        assert_eq!(parsed, grammar);

        let forward = json.replace("[97,98]]", "[97,300]]");
        let err = serde_json::from_str::<Grammar>(&forward).expect_err("forward reference");
        assert!(err.to_string().contains("undefined"));
    }

    #[test]
    fn from_rules_rejects_tampered_literals() {
        let mut rules = Grammar::new().rules().to_vec();
        rules[10] = Pair::new(11, 0);
        assert!(Grammar::from_rules(rules).is_err());
    }

    #[test]
    fn model_rejects_undefined_tokens() {
        let err = BpeModel::new(Grammar::new(), vec![97, 256], 1).expect_err("256 is undefined");
        assert!(matches!(
            err,
            BytepairError::CorruptToken {
                index: 1,
                token: 256,
                grammar_len: 256
            }
        ));
        let model = BpeModel::new(Grammar::new(), vec![97, 98], 1).expect("literal stream");
        assert_eq!(model.vocab_size(), 256);
        assert!(model.merges().is_empty());
    }
}
