//! Rule-driven key renaming for string-keyed mappings.
//!
//! `state-bridge` renames the keys of an ordered mapping (typically a model
//! checkpoint's parameter names) with a small line-oriented rule language.
//! Each rule pairs a source template with a destination template:
//!
//! ```text
//! layer.{n}.weight, block.{n}.w
//! block.{n}.w,      block.{(n + 1)}.w
//! ```
//!
//! `{n}` captures a run of decimal digits; `{(expr)}` evaluates integer
//! arithmetic (`+ - * // %`, unary sign, parentheses) over captured values in
//! a sandboxed evaluator that rejects every other construct.
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`expr`] | Safe arithmetic evaluator |
//! | [`pattern`] | Template compiler (matcher + renderer) |
//! | [`rules`] | Ordered rule sets and the rule-text parser |
//! | [`bridge`](mod@bridge) | Mapping-level renaming with collision detection |
//! | [`report`] | Dry-run rename plans |
//!
//! # Entry Point
//!
//! ```
//! use state_bridge::{bridge, StateDict};
//!
//! let mut sd = StateDict::new();
//! sd.insert("layer.3.weight".to_string(), 0.5_f32);
//!
//! let out = bridge(&sd, "layer.{n}.weight, block.{n}.w", false, true).unwrap();
//! assert_eq!(out.get("block.3.w"), Some(&0.5));
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod bridge;
pub mod error;
pub mod expr;
pub mod options;
pub mod pattern;
pub mod report;
pub mod rules;

pub use bridge::{apply_rules, bridge, bridge_with, plan, StateDict};
pub use error::{BridgeError, ExprError, Result};
pub use options::{BridgeOptions, Direction, MatchMode};
pub use pattern::CompiledRule;
pub use report::{RenameEntry, RenameReport, RenameStatus};
pub use rules::{parse_rules, parse_rules_with, RuleSet};
