//! Scanline boundary records and the two repair passes run over them before filling.
use itertools::Itertools;
use ndarray::Array2;

use super::repair::{Bound, RepairEvent};
use super::{OutlierCheck, FOREGROUND};

/// Leftmost and rightmost foreground columns of one mask row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanlineBoundary {
    pub row: usize,
    pub min: usize,
    pub max: usize,
}

impl ScanlineBoundary {
    pub const fn new(row: usize, min: usize, max: usize) -> Self {
        Self { row, min, max }
    }

    pub fn get(&self, bound: Bound) -> usize {
        match bound {
            Bound::Min => self.min,
            Bound::Max => self.max,
        }
    }

    fn set(&mut self, bound: Bound, value: usize) {
        match bound {
            Bound::Min => self.min = value,
            Bound::Max => self.max = value,
        }
    }
}

/// Integer mean of two columns, truncated.
fn mean(a: usize, b: usize) -> usize {
    (a + b) / 2
}

/// Collect a boundary record for every row holding at least one foreground pixel,
/// ordered by row.
pub fn scanline_boundaries(mask: &Array2<u8>) -> Vec<ScanlineBoundary> {
    mask.outer_iter()
        .enumerate()
        .filter_map(|(row, line)| {
            let min = line.iter().position(|&v| v == FOREGROUND)?;
            let max = line.iter().rposition(|&v| v == FOREGROUND)?;
            Some(ScanlineBoundary { row, min, max })
        })
        .collect()
}

/// Synthesize records for rows missing between two consecutive records.
///
/// Each missing row takes the mean of the neighbouring mins and maxes. Only pairs present
/// on entry are considered; synthesized records are merged in and the list re-sorted.
/// Records may arrive in any row order.
pub fn repair_gaps(records: &mut Vec<ScanlineBoundary>) -> Vec<RepairEvent> {
    records.sort_by_key(|record| record.row);
    let mut synthesized = Vec::new();
    for (first, second) in records.iter().tuple_windows() {
        if second.row.abs_diff(first.row) <= 1 {
            continue;
        }
        let min = mean(first.min, second.min);
        let max = mean(first.max, second.max);
        synthesized.extend((first.row + 1..second.row).map(|row| ScanlineBoundary { row, min, max }));
    }

    let events = synthesized
        .iter()
        .map(|record| RepairEvent::MissingRow {
            row: record.row,
            min: record.min,
            max: record.max,
        })
        .collect::<Vec<_>>();

    records.extend(synthesized);
    records.sort_by_key(|record| record.row);
    events
}

/// Replace boundaries of a middle record that stray from the mean of its neighbours by
/// more than `threshold` pixels.
///
/// Triples are visited in row order and corrected in place, so a corrected record is seen
/// as the first record of the following triple.
pub fn repair_outliers(
    records: &mut [ScanlineBoundary],
    threshold: f64,
    check: OutlierCheck,
) -> Vec<RepairEvent> {
    let mut events = Vec::new();
    for index in 1..records.len().saturating_sub(1) {
        let (first, second, third) = (records[index - 1], records[index], records[index + 1]);

        let deviates = |bound: Bound| {
            let average = mean(first.get(bound), third.get(bound));
            (average as f64 - second.get(bound) as f64).abs() > threshold
        };
        let flagged: Vec<Bound> = match check {
            OutlierCheck::MinThenMax => [Bound::Min, Bound::Max]
                .into_iter()
                .find(|&bound| deviates(bound))
                .into_iter()
                .collect(),
            OutlierCheck::Both => [Bound::Min, Bound::Max]
                .into_iter()
                .filter(|&bound| deviates(bound))
                .collect(),
        };

        for bound in flagged {
            let average = mean(first.get(bound), third.get(bound));
            let event = RepairEvent::Outlier {
                rows: [first.row, second.row, third.row],
                bound,
                before: [first.get(bound), second.get(bound), third.get(bound)],
                after: [first.get(bound), average, third.get(bound)],
            };
            tracing::debug!("{}", event);
            records[index].set(bound, average);
            events.push(event);
        }
    }
    events
}
