//! Rename plan types: per-key outcomes and plan aggregation.

/// Outcome for one original key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStatus {
    /// No rule changed the key.
    Unchanged,
    /// The key was renamed.
    Renamed,
    /// The new key was already produced by an earlier original key.
    Collision,
}

/// A single planned rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEntry {
    /// Key in the original mapping.
    pub original: String,
    /// Key after every rule has been applied.
    pub renamed: String,
    /// Outcome classification.
    pub status: RenameStatus,
}

impl RenameEntry {
    /// Returns true if this entry collides with an earlier one.
    pub fn is_collision(&self) -> bool {
        self.status == RenameStatus::Collision
    }
}

/// Every original key with the key it would be renamed to, in iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// Planned renames.
    pub entries: Vec<RenameEntry>,
}

impl RenameReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: RenameEntry) {
        self.entries.push(entry);
    }

    /// Count of entries whose key changes, colliding ones included.
    pub fn renamed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.original != e.renamed)
            .count()
    }

    /// Count of colliding entries.
    pub fn collision_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_collision()).count()
    }

    /// Returns true if any new key is produced more than once.
    pub fn has_collisions(&self) -> bool {
        self.entries.iter().any(RenameEntry::is_collision)
    }
}
