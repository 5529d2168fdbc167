//! Bridge configuration.

/// Which side of a rule is matched and which is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Match the source template, render the destination template.
    #[default]
    Forward,
    /// Match the destination template, render the source template.
    Reverse,
}

impl Direction {
    /// Maps the boolean `reverse` flag onto a direction.
    #[must_use]
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Self::Reverse
        } else {
            Self::Forward
        }
    }

    /// Returns true for [`Direction::Reverse`].
    #[must_use]
    pub fn is_reverse(self) -> bool {
        self == Self::Reverse
    }
}

/// How a rule's matcher is positioned against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchMode {
    /// Replace every occurrence of the matcher anywhere in the key.
    #[default]
    Substring,
    /// Fire only when the matcher spans the entire key.
    WholeKey,
}

/// Options shared by every rule compiled for one bridge invocation.
///
/// ```
/// use state_bridge::{BridgeOptions, Direction, MatchMode};
///
/// let options = BridgeOptions::default().reverse(true).anchored(true);
/// assert_eq!(options.direction, Direction::Reverse);
/// assert_eq!(options.match_mode, MatchMode::WholeKey);
/// assert!(options.detect_collision);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Direction applied to every rule.
    pub direction: Direction,
    /// Fail on the first duplicate output key instead of overwriting.
    pub detect_collision: bool,
    /// Substring or whole-key matching.
    pub match_mode: MatchMode,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            detect_collision: true,
            match_mode: MatchMode::Substring,
        }
    }
}

impl BridgeOptions {
    /// Sets the direction from a `reverse` flag.
    #[must_use]
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.direction = Direction::from_reverse(reverse);
        self
    }

    /// Enables or disables collision detection.
    #[must_use]
    pub fn detect_collision(mut self, detect: bool) -> Self {
        self.detect_collision = detect;
        self
    }

    /// Selects whole-key matching when `anchored` is true.
    #[must_use]
    pub fn anchored(mut self, anchored: bool) -> Self {
        self.match_mode = if anchored {
            MatchMode::WholeKey
        } else {
            MatchMode::Substring
        };
        self
    }
}
