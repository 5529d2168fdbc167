//! Ordered rule sets and the rule-text parser.
//!
//! Rule text is one rule per line:
//!
//! ```text
//! # comments and blank lines are skipped
//! layer.{n}.weight, block.{n}.w
//! block.{n}.w,      block.{(n + 1)}.w
//! ```
//!
//! Rules run in line order. Each rule sees the output of the previous one.

use crate::error::{BridgeError, Result};
use crate::options::{BridgeOptions, Direction};
use crate::pattern::CompiledRule;

/// An ordered pipeline of compiled rules.
///
/// Holds no state beyond its rules, so one set can be shared read-only
/// across threads and applied to any number of keys.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Wraps already compiled rules, keeping their order.
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        Self { rules }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the set holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates the rules in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, CompiledRule> {
        self.rules.iter()
    }

    /// Runs `key` through every rule in order and returns the final string.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Expression`] from the first rule whose
    /// arithmetic fails; later rules are not applied.
    pub fn apply(&self, key: &str) -> Result<String> {
        let mut current = key.to_string();
        for rule in &self.rules {
            current = rule.apply(&current)?;
        }
        Ok(current)
    }

    /// Like [`RuleSet::apply`], but returns the key before any rule followed
    /// by the intermediate string after each rule.
    ///
    /// # Errors
    ///
    /// See [`RuleSet::apply`].
    pub fn trace(&self, key: &str) -> Result<Vec<String>> {
        let mut steps = Vec::with_capacity(self.rules.len() + 1);
        steps.push(key.to_string());
        for rule in &self.rules {
            let next = rule.apply(steps.last().map_or(key, String::as_str))?;
            steps.push(next);
        }
        Ok(steps)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a CompiledRule;
    type IntoIter = std::slice::Iter<'a, CompiledRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Parses rule text with substring matching.
///
/// # Errors
///
/// Returns [`BridgeError::Configuration`] naming the first malformed line.
pub fn parse_rules(text: &str, reverse: bool) -> Result<RuleSet> {
    parse_rules_with(text, &BridgeOptions::default().reverse(reverse))
}

/// Parses rule text using the direction and match mode from `options`.
///
/// # Errors
///
/// Returns [`BridgeError::Configuration`] naming the first line that does
/// not split into exactly two comma-separated templates or whose templates
/// do not compile.
pub fn parse_rules_with(text: &str, options: &BridgeOptions) -> Result<RuleSet> {
    let mut rules = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let [source, destination] = parts.as_slice() else {
            return Err(BridgeError::config(format!(
                "expected `source, destination`, found {} part(s) in `{line}`",
                parts.len()
            ))
            .at_line(line_no));
        };

        let rule = CompiledRule::compile_with(
            source,
            destination,
            options.direction,
            options.match_mode,
        )
        .map_err(|err| err.at_line(line_no))?;
        rules.push(rule);
    }

    tracing::debug!(
        rules = rules.len(),
        reverse = options.direction == Direction::Reverse,
        "parsed rule set"
    );
    Ok(RuleSet::new(rules))
}
