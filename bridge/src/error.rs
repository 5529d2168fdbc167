//! Error types: configuration, expression, and collision failures.

/// Failure raised by the arithmetic evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// The expression uses syntax outside the integer whitelist.
    #[error("invalid expression at offset {position}: {message}")]
    Invalid {
        /// Byte offset into the expression text.
        position: usize,
        /// What was found instead of an accepted construct.
        message: String,
    },
    /// Floor division or modulo with a zero divisor.
    #[error("integer division or modulo by zero")]
    DivisionByZero,
    /// A literal or an intermediate result does not fit in an `i64`.
    #[error("integer overflow")]
    Overflow,
}

impl ExprError {
    pub(crate) fn invalid(position: usize, message: impl Into<String>) -> Self {
        Self::Invalid {
            position,
            message: message.into(),
        }
    }
}

/// Any failure surfaced by compiling rules or renaming keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Malformed rule text or a template combination that cannot be compiled.
    #[error(
        "configuration error{}: {message}",
        .line.map(|n| format!(" on line {n}")).unwrap_or_default()
    )]
    Configuration {
        /// 1-based rule-text line, when the failure came from rule text.
        line: Option<usize>,
        /// Description of the problem.
        message: String,
    },
    /// An arithmetic block failed while renaming a key.
    #[error("expression `{expression}` failed while renaming `{key}` with rule `{rule}`: {source}")]
    Expression {
        /// The key (as seen by the failing rule) being renamed.
        key: String,
        /// The failing rule, rendered as `source -> destination`.
        rule: String,
        /// The arithmetic text after capture substitution.
        expression: String,
        /// Underlying evaluator failure.
        #[source]
        source: ExprError,
    },
    /// Two original keys produced the same new key while detection was on.
    #[error("key collision: {key}")]
    Collision {
        /// The new key produced twice.
        key: String,
    },
}

impl BridgeError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            line: None,
            message: message.into(),
        }
    }

    /// Attaches a rule-text line number to a configuration error.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Self::Configuration { message, .. } => Self::Configuration {
                line: Some(line),
                message,
            },
            other => other,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
