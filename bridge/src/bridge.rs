//! The bridge: rename every key of an ordered mapping through a rule set.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::{BridgeError, Result};
use crate::options::BridgeOptions;
use crate::report::{RenameEntry, RenameReport, RenameStatus};
use crate::rules::{parse_rules_with, RuleSet};

/// An insertion-ordered string-keyed mapping, e.g. a checkpoint state dict.
pub type StateDict<V> = IndexMap<String, V>;

/// Renames the keys of `original` using `rules_text`.
///
/// Entries are visited in insertion order and values are cloned unchanged.
/// With `detect_collision` set, the first new key produced twice fails the
/// call; otherwise the later entry's value overwrites the earlier one.
///
/// ```
/// use state_bridge::{bridge, StateDict};
///
/// let mut sd = StateDict::new();
/// sd.insert("layer.3.weight".to_string(), "X");
/// let out = bridge(&sd, "layer.{n}.weight, block.{(n+1)}.w", false, true).unwrap();
/// assert_eq!(out.get("block.4.w"), Some(&"X"));
/// ```
///
/// # Errors
///
/// Returns [`BridgeError::Configuration`] before any key is processed if the
/// rule text does not compile, [`BridgeError::Expression`] if arithmetic
/// fails for some key, and [`BridgeError::Collision`] on a duplicate new key
/// while detection is enabled.
pub fn bridge<V: Clone>(
    original: &StateDict<V>,
    rules_text: &str,
    reverse: bool,
    detect_collision: bool,
) -> Result<StateDict<V>> {
    let options = BridgeOptions::default()
        .reverse(reverse)
        .detect_collision(detect_collision);
    bridge_with(original, rules_text, &options)
}

/// Renames the keys of `original` using `rules_text` and `options`.
///
/// # Errors
///
/// See [`bridge`].
pub fn bridge_with<V: Clone>(
    original: &StateDict<V>,
    rules_text: &str,
    options: &BridgeOptions,
) -> Result<StateDict<V>> {
    let rules = parse_rules_with(rules_text, options)?;
    apply_rules(original, &rules, options.detect_collision)
}

/// Renames the keys of `original` with an already compiled rule set.
///
/// # Errors
///
/// Returns [`BridgeError::Expression`] or [`BridgeError::Collision`] as
/// described for [`bridge`].
pub fn apply_rules<V: Clone>(
    original: &StateDict<V>,
    rules: &RuleSet,
    detect_collision: bool,
) -> Result<StateDict<V>> {
    let mut renamed: StateDict<V> = IndexMap::with_capacity(original.len());

    for (key, value) in original {
        let new_key = rules.apply(key)?;
        tracing::trace!(from = %key, to = %new_key, "renamed key");

        if renamed.contains_key(&new_key) {
            if detect_collision {
                return Err(BridgeError::Collision { key: new_key });
            }
            tracing::warn!(key = %new_key, from = %key, "key collision, overwriting earlier value");
        }
        renamed.insert(new_key, value.clone());
    }

    Ok(renamed)
}

/// Computes the rename of every key in `keys` without building a mapping.
///
/// Collisions are recorded in the report rather than raised, so a caller can
/// inspect every duplicate at once.
///
/// # Errors
///
/// Returns [`BridgeError::Expression`] if arithmetic fails for some key.
pub fn plan<'k, I>(keys: I, rules: &RuleSet) -> Result<RenameReport>
where
    I: IntoIterator<Item = &'k String>,
{
    let mut report = RenameReport::new();
    let mut seen: HashSet<String> = HashSet::new();

    for key in keys {
        let renamed = rules.apply(key)?;
        let status = if !seen.insert(renamed.clone()) {
            RenameStatus::Collision
        } else if renamed == *key {
            RenameStatus::Unchanged
        } else {
            RenameStatus::Renamed
        };
        report.push(RenameEntry {
            original: key.clone(),
            renamed,
            status,
        });
    }

    Ok(report)
}
