use std::fmt;

/// Result of processing one manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Mask (and image, if requested) were written.
    Exported,
    /// Nothing to export, e.g. an entry with no contour points.
    Skipped,
    Failed,
}

/// Counts of batch outcomes. Combine per-thread tallies with [`ExportTally::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportTally {
    pub exported: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExportTally {
    pub fn record(mut self, outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Exported => self.exported += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
        self
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            exported: self.exported + other.exported,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }

    pub fn total(&self) -> usize {
        self.exported + self.skipped + self.failed
    }

    /// Every one of `expected` entries was accounted for exactly once.
    pub fn is_consistent(&self, expected: usize) -> bool {
        self.total() == expected
    }
}

impl<'a> FromIterator<&'a Outcome> for ExportTally {
    fn from_iter<I: IntoIterator<Item = &'a Outcome>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::record)
    }
}

impl fmt::Display for ExportTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exported, {} skipped, {} failed",
            self.exported, self.skipped, self.failed
        )
    }
}
