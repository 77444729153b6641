//! Run statistics and their terminal rendering

use owo_colors::OwoColorize;
use stowage_engine::{RunSummary, SyncOutcome};

/// Counts taken from one synchronization run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Destinations written for the first time
    pub installed: usize,
    /// Unedited destinations replaced by a newer version
    pub updated: usize,
    /// Destinations already matching the source
    pub unchanged: usize,
    /// Edited destinations left alone with a pending update beside them
    pub skipped: usize,
    /// Destinations refused because a link sits on the path
    pub blocked: usize,
    /// Entries refused for an unsafe name or missing manifest entry
    pub rejected: usize,
    /// Entries that failed outright
    pub failed: usize,
    /// Structured documents copied verbatim after a parse failure
    pub fallbacks: usize,
}

impl SyncStats {
    /// Tally a finished run
    pub fn from_summary(summary: &RunSummary) -> Self {
        Self {
            installed: summary.count(SyncOutcome::Installed),
            updated: summary.count(SyncOutcome::Updated),
            unchanged: summary.count(SyncOutcome::Unchanged),
            skipped: summary.count(SyncOutcome::Skipped),
            blocked: summary.count(SyncOutcome::Blocked),
            rejected: summary.rejected().count(),
            failed: summary.failures().count(),
            fallbacks: summary.parse_fallbacks(),
        }
    }

    /// Artifacts whose destination was (or would be) written
    pub fn written(&self) -> usize {
        self.installed + self.updated
    }

    /// Every entry the run reported on
    pub fn total(&self) -> usize {
        self.written()
            + self.unchanged
            + self.skipped
            + self.blocked
            + self.rejected
            + self.failed
    }

    /// Print the one-line run summary
    pub fn print_summary(&self, dry_run: bool) {
        let written = self.written();

        if dry_run {
            println!(
                "{} {} would be written",
                "●".bright_green(),
                written.to_string().bright_white().bold()
            );
        } else if self.failed > 0 {
            println!(
                "{} {} | {} {}",
                "●".bright_green(),
                written.to_string().bright_green().bold(),
                "●".bright_red(),
                self.failed.to_string().bright_red().bold(),
            );
        } else {
            println!(
                "{} {} written",
                "●".bright_green(),
                written.to_string().bright_green().bold()
            );
        }

        let mut parts = Vec::new();
        for (count, label) in [
            (self.installed, "installed"),
            (self.updated, "updated"),
            (self.unchanged, "unchanged"),
            (self.skipped, "skipped (pending update written)"),
            (self.blocked, "blocked by links"),
            (self.rejected, "rejected"),
            (self.fallbacks, "copied verbatim"),
        ] {
            if count > 0 {
                parts.push(format!("{count} {label}"));
            }
        }
        if !parts.is_empty() {
            println!("  {}", parts.join(", ").dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals() {
        let stats = SyncStats {
            installed: 2,
            updated: 1,
            unchanged: 4,
            skipped: 1,
            blocked: 1,
            rejected: 0,
            failed: 1,
            fallbacks: 1,
        };
        assert_eq!(stats.written(), 3);
        assert_eq!(stats.total(), 10);
    }

    #[test]
    fn test_empty_summary() {
        let stats = SyncStats::from_summary(&RunSummary::default());
        assert_eq!(stats, SyncStats::default());
    }
}
