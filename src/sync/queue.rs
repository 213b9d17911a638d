//! Pending Queues
//!
//! Rows waiting to be appended, plus annotations waiting to be written into
//! the comment column of those rows. Annotation targets are kept relative to
//! the row queue until flush time, when the insertion row is known:
//!
//! ```text
//! absolute_row = insertion_row + offset
//! ```
//!
//! An offset of `-1` targets the row just above the insertion point, which is
//! the most recently flushed row. When the reconciler finds a queued row
//! already in the ledger, annotations on that row are pinned to the row it
//! matched.

use crate::sync::event::{LineEvent, ParseWarning};
use crate::sync::row::Row;

/// Where an annotation will be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationTarget {
    /// Offset relative to the first pending row
    Pending(i64),
    /// A row already present in the ledger
    Absolute(u64),
}

/// A single-cell update targeting a queued row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRequest {
    pub target: AnnotationTarget,
    pub value: String,
}

impl AnnotationRequest {
    pub fn pending(offset: i64, value: impl Into<String>) -> Self {
        AnnotationRequest {
            target: AnnotationTarget::Pending(offset),
            value: value.into(),
        }
    }

    /// Absolute ledger row for a given insertion row
    pub fn target_row(&self, insertion_row: u64) -> Option<u64> {
        match self.target {
            AnnotationTarget::Pending(offset) => {
                let row = insertion_row as i64 + offset;
                (row >= 1).then_some(row as u64)
            }
            AnnotationTarget::Absolute(row) => Some(row),
        }
    }
}

/// Row-insert queue and annotation queue, drained together
#[derive(Debug, Clone, Default)]
pub struct PendingQueues {
    rows: Vec<Row>,
    annotations: Vec<AnnotationRequest>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn annotations(&self) -> &[AnnotationRequest] {
        &self.annotations
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Queue an annotation for the most recently queued row
    pub fn push_annotation(&mut self, value: impl Into<String>) {
        self.annotations
            .push(AnnotationRequest::pending(self.rows.len() as i64 - 1, value));
    }

    /// Route a parsed line into the right queue.
    ///
    /// Unrecognized lines are handed back so the caller can log them.
    pub fn apply(&mut self, event: LineEvent) -> Result<(), ParseWarning> {
        match event {
            LineEvent::Row(row) => self.push_row(row),
            LineEvent::StreamBoundary { row, .. } => self.push_row(row),
            LineEvent::Milestone(milestone) => self.push_annotation(milestone.message()),
            LineEvent::Unrecognized(warning) => return Err(warning),
        }
        Ok(())
    }

    /// Drop a queued row found at `ledger_row`.
    ///
    /// Annotations on the dropped row are pinned to `ledger_row`; those on
    /// later rows shift up by one.
    pub fn remove_row(&mut self, index: usize, ledger_row: u64) -> Row {
        let removed = self.rows.remove(index);
        let index = index as i64;
        for annotation in &mut self.annotations {
            match annotation.target {
                AnnotationTarget::Pending(offset) if offset == index => {
                    annotation.target = AnnotationTarget::Absolute(ledger_row);
                }
                AnnotationTarget::Pending(offset) if offset > index => {
                    annotation.target = AnnotationTarget::Pending(offset - 1);
                }
                _ => {}
            }
        }
        removed
    }

    pub fn take_annotations(&mut self) -> Vec<AnnotationRequest> {
        std::mem::take(&mut self.annotations)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.annotations.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.annotations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::event::parse_line;

    fn row(ts: &str) -> Row {
        Row::from_cells([ts, "user", "x"])
    }

    #[test]
    fn test_annotation_targets_last_row() {
        let mut queues = PendingQueues::new();
        queues.push_row(row("2024-05-01 10:00:00"));
        queues.push_row(row("2024-05-01 10:00:01"));
        queues.push_annotation("note");
        assert_eq!(queues.annotations()[0].target, AnnotationTarget::Pending(1));
    }

    #[test]
    fn test_annotation_on_empty_queue() {
        let mut queues = PendingQueues::new();
        queues.push_annotation("note");
        let annotation = &queues.annotations()[0];
        assert_eq!(annotation.target, AnnotationTarget::Pending(-1));
        assert_eq!(annotation.target_row(17400), Some(17399));
        assert_eq!(annotation.target_row(1), None);
    }

    #[test]
    fn test_remove_row_adjusts_offsets() {
        let mut queues = PendingQueues::new();
        for ts in ["A", "B", "C"] {
            queues.push_row(row(ts));
        }
        queues.annotations.push(AnnotationRequest::pending(1, "on B"));
        queues.annotations.push(AnnotationRequest::pending(2, "on C"));
        queues.annotations.push(AnnotationRequest::pending(0, "on A"));
        queues.annotations.push(AnnotationRequest::pending(-1, "previous"));

        let removed = queues.remove_row(1, 42);
        assert_eq!(removed.timestamp(), "B");
        let targets: Vec<AnnotationTarget> =
            queues.annotations().iter().map(|a| a.target).collect();
        assert_eq!(
            targets,
            vec![
                AnnotationTarget::Absolute(42),
                AnnotationTarget::Pending(1),
                AnnotationTarget::Pending(0),
                AnnotationTarget::Pending(-1),
            ]
        );
        assert_eq!(queues.rows()[1].timestamp(), "C");
        assert_eq!(queues.annotations()[0].target_row(100), Some(42));
        assert_eq!(queues.annotations()[1].target_row(100), Some(101));
    }

    #[test]
    fn test_pinned_annotation_ignores_later_removals() {
        let mut queues = PendingQueues::new();
        for ts in ["A", "B", "C"] {
            queues.push_row(row(ts));
        }
        queues.annotations.push(AnnotationRequest::pending(1, "on B"));

        queues.remove_row(0, 10);
        queues.remove_row(0, 11);
        queues.remove_row(0, 12);

        assert!(queues.rows().is_empty());
        assert_eq!(queues.annotations()[0].target, AnnotationTarget::Absolute(11));
        assert_eq!(queues.annotations()[0].target_row(13), Some(11));
    }

    #[test]
    fn test_parse_and_queue_scenario() {
        let lines = [
            "2024-05-01 10:00:00 === ONLINE ===",
            "2024-05-01 10:00:03\tuser\tgift\t\t5 subs",
            "2024-05-01 12:00:00 === HYPE TRAIN END === level=3 total=5000",
            "garbage",
        ];
        let mut queues = PendingQueues::new();
        let mut warnings = 0;
        for line in lines {
            if queues.apply(parse_line(line)).is_err() {
                warnings += 1;
            }
        }

        assert_eq!(warnings, 1);
        assert_eq!(queues.rows().len(), 2);
        assert!(queues.rows()[0].is_stream_start());
        assert_eq!(
            queues.annotations(),
            &[AnnotationRequest::pending(1, "Hypetrain Completed Level 2")]
        );
    }

    #[test]
    fn test_take_and_clear() {
        let mut queues = PendingQueues::new();
        assert!(queues.is_empty());
        queues.push_row(row("A"));
        queues.push_annotation("x");
        assert_eq!(queues.take_annotations().len(), 1);
        assert!(!queues.is_empty());
        queues.clear();
        assert!(queues.is_empty());
    }
}
