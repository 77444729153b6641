//! Change classification
//!
//! Decides what a synchronization run does with one destination, given the
//! digests of the distributed source, the current destination and the
//! pristine backup. Pure: no I/O, no state.

use crate::digest::Digest;
use std::fmt;

/// What to do with a single destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Destination absent: write it
    Install,
    /// Destination already holds the distributed content
    Unchanged,
    /// Destination is still the pristine copy: overwrite it
    Update,
    /// Destination was edited since its backup: leave it, write a pending update
    Skip,
    /// Destination differs and has never been backed up: back up, then overwrite
    BackupAndUpdate,
}

impl Action {
    /// Whether applying this action writes the destination itself
    #[must_use]
    pub fn writes_destination(self) -> bool {
        matches!(
            self,
            Action::Install | Action::Update | Action::BackupAndUpdate
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Install => "install",
            Action::Unchanged => "unchanged",
            Action::Update => "update",
            Action::Skip => "skip",
            Action::BackupAndUpdate => "backup-and-update",
        };
        f.write_str(label)
    }
}

/// Classify a destination from its three digests
///
/// | dest | backup | source == dest | action |
/// |---|---|---|---|
/// | absent | any | n/a | `Install` |
/// | present | any | yes | `Unchanged` |
/// | present | absent | no | `BackupAndUpdate` |
/// | present | == dest | no | `Update` |
/// | present | != dest | no | `Skip` |
///
/// # Examples
///
/// ```
/// use stowage_engine::classify::{Action, classify};
/// use stowage_engine::digest::hash_content;
///
/// let shipped = hash_content(b"v2");
/// let edited = hash_content(b"user edit");
/// let pristine = hash_content(b"v1");
/// assert_eq!(classify(&shipped, Some(&edited), Some(&pristine)), Action::Skip);
/// ```
#[must_use]
pub fn classify(source: &Digest, dest: Option<&Digest>, backup: Option<&Digest>) -> Action {
    let Some(dest) = dest else {
        return Action::Install;
    };

    if source == dest {
        return Action::Unchanged;
    }

    match backup {
        None => Action::BackupAndUpdate,
        Some(backup) if backup == dest => Action::Update,
        Some(_) => Action::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_content;

    #[test]
    fn test_full_decision_table() {
        let a = hash_content(b"a");
        let b = hash_content(b"b");
        let c = hash_content(b"c");

        // (source, dest, backup, expected)
        let cases = [
            (a, None, None, Action::Install),
            (a, None, Some(b), Action::Install),
            (a, Some(a), None, Action::Unchanged),
            (a, Some(a), Some(b), Action::Unchanged),
            (a, Some(a), Some(a), Action::Unchanged),
            (a, Some(b), None, Action::BackupAndUpdate),
            (a, Some(b), Some(b), Action::Update),
            (a, Some(b), Some(c), Action::Skip),
            (a, Some(b), Some(a), Action::Skip),
        ];

        for (source, dest, backup, expected) in cases {
            assert_eq!(
                classify(&source, dest.as_ref(), backup.as_ref()),
                expected,
                "dest={dest:?} backup={backup:?}"
            );
        }
    }

    #[test]
    fn test_writes_destination() {
        assert!(Action::Install.writes_destination());
        assert!(Action::Update.writes_destination());
        assert!(Action::BackupAndUpdate.writes_destination());
        assert!(!Action::Skip.writes_destination());
        assert!(!Action::Unchanged.writes_destination());
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(Action::BackupAndUpdate.to_string(), "backup-and-update");
        assert_eq!(Action::Skip.to_string(), "skip");
    }
}
