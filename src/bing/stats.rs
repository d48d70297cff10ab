use std::fs::write;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::to_string_pretty;

/// Name of the statistics file written into the destination folder.
pub(crate) const STATISTICS_FILE_NAME: &str = "download_statistics.json";

/// Counts for one collection.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CollectionStats {
    pub(crate) name: String,
    pub(crate) total: usize,
    pub(crate) successful: usize,
    /// Already on disk before this run, included in `successful`.
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
    pub(crate) bytes: u64,
    pub(crate) deleted_from_account: bool,
}

impl CollectionStats {
    pub(crate) fn new(name: &str, total: usize) -> Self {
        CollectionStats {
            name: name.to_string(),
            total,
            ..Self::default()
        }
    }

    /// Whether every image of the collection is on disk.
    pub(crate) fn is_complete(&self) -> bool {
        self.failed == 0 && self.successful == self.total
    }
}

/// Detailed statistics for a run.
#[derive(Serialize, Debug, Clone)]
pub(crate) struct Statistics {
    pub(crate) generated_at: DateTime<Local>,
    pub(crate) elapsed_seconds: f64,
    pub(crate) total: usize,
    pub(crate) successful: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
    pub(crate) bytes: u64,
    pub(crate) collections: Vec<CollectionStats>,
}

impl Statistics {
    pub(crate) fn new(collections: Vec<CollectionStats>, elapsed_seconds: f64) -> Self {
        Statistics {
            generated_at: Local::now(),
            elapsed_seconds,
            total: collections.iter().map(|c| c.total).sum(),
            successful: collections.iter().map(|c| c.successful).sum(),
            skipped: collections.iter().map(|c| c.skipped).sum(),
            failed: collections.iter().map(|c| c.failed).sum(),
            bytes: collections.iter().map(|c| c.bytes).sum(),
            collections,
        }
    }

    /// One line per collection, for the log pane.
    pub(crate) fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .collections
            .iter()
            .map(|c| {
                format!(
                    "{}: {}/{} downloaded ({} already present, {} failed, {} KB)",
                    c.name,
                    c.successful,
                    c.total,
                    c.skipped,
                    c.failed,
                    c.bytes / 1024
                )
            })
            .collect();
        lines.push(format!(
            "Total: {}/{} downloaded ({} already present, {} failed, {} KB)",
            self.successful,
            self.total,
            self.skipped,
            self.failed,
            self.bytes / 1024
        ));
        lines
    }

    pub(crate) fn write_to(&self, directory: &Path) -> anyhow::Result<()> {
        write(directory.join(STATISTICS_FILE_NAME), to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_and_lines() {
        let mut cats = CollectionStats::new("Cats", 3);
        cats.successful = 2;
        cats.skipped = 1;
        cats.failed = 1;
        cats.bytes = 4096;
        let mut dogs = CollectionStats::new("Dogs", 1);
        dogs.successful = 1;

        assert!(!cats.is_complete());
        assert!(dogs.is_complete());

        let statistics = Statistics::new(vec![cats, dogs], 1.5);
        assert_eq!(statistics.total, 4);
        assert_eq!(statistics.successful, 3);
        assert_eq!(statistics.failed, 1);

        let lines = statistics.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Cats: 2/3 downloaded (1 already present, 1 failed, 4 KB)");
        assert!(lines[2].starts_with("Total: 3/4"));
    }
}
