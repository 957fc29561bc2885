use std::fmt;

/// Which end of a scanline a repair touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    Min,
    Max,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound_str = match self {
            Bound::Min => "min",
            Bound::Max => "max",
        };
        write!(f, "{}", bound_str)
    }
}

/// A correction applied to the scanline boundaries of a mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairEvent {
    /// A row between two contour rows was synthesized from its neighbours.
    MissingRow { row: usize, min: usize, max: usize },

    /// The middle row of a triple deviated from its neighbours' average and was replaced.
    Outlier {
        rows: [usize; 3],
        bound: Bound,
        before: [usize; 3],
        after: [usize; 3],
    },
}

impl RepairEvent {
    /// Row whose boundary was written by this repair.
    pub fn row(&self) -> usize {
        match self {
            RepairEvent::MissingRow { row, .. } => *row,
            RepairEvent::Outlier { rows, .. } => rows[1],
        }
    }
}

impl fmt::Display for RepairEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairEvent::MissingRow { row, min, max } => {
                write!(f, "Row {} missing, filled columns {} to {}", row, min, max)
            }
            RepairEvent::Outlier {
                rows,
                bound,
                before,
                after,
            } => write!(
                f,
                "Rows {} - {} - {} have absurd {} value. Before: {} - {} - {}. After: {} - {} - {}",
                rows[0], rows[1], rows[2], bound, before[0], before[1], before[2], after[0], after[1], after[2]
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::missing_row(
        RepairEvent::MissingRow { row: 6, min: 11, max: 22 },
        "Row 6 missing, filled columns 11 to 22"
    )]
    #[case::outlier(
        RepairEvent::Outlier { rows: [5, 6, 7], bound: Bound::Min, before: [10, 30, 10], after: [10, 10, 10] },
        "Rows 5 - 6 - 7 have absurd min value. Before: 10 - 30 - 10. After: 10 - 10 - 10"
    )]
    fn test_display(#[case] event: RepairEvent, #[case] expected: &str) {
        assert_eq!(event.to_string(), expected);
    }

    #[test]
    fn test_row() {
        let event = RepairEvent::Outlier {
            rows: [3, 4, 5],
            bound: Bound::Max,
            before: [1, 2, 3],
            after: [1, 2, 3],
        };
        assert_eq!(event.row(), 4);
    }
}
