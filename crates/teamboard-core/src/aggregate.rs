//! Derived views: status counts, per-board totals, calendar buckets and the
//! donut layout.
//!
//! Everything here is a pure function of the snapshot it is given. Views are
//! recomputed from the full current set on every change, never patched.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate, TimeZone};
use serde::Serialize;

use teamboard_shared::calendar::{local_date, parse_day_key};
use teamboard_shared::TaskStatus;

use crate::records::{Board, CalendarTarget, Task};

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub todo: usize,
    pub progress: usize,
    pub done: usize,
    pub total: usize,
}

/// Whole-number share of the total per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPercentages {
    pub todo: u32,
    pub progress: u32,
    pub done: u32,
}

impl StatusCounts {
    pub fn tally(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                TaskStatus::Todo => counts.todo += 1,
                TaskStatus::Progress => counts.progress += 1,
                TaskStatus::Done => counts.done += 1,
            }
            counts.total += 1;
        }
        counts
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Todo => self.todo,
            TaskStatus::Progress => self.progress,
            TaskStatus::Done => self.done,
        }
    }

    /// `round(count / total * 100)` per status; `None` when there are no tasks.
    pub fn percentages(&self) -> Option<StatusPercentages> {
        if self.total == 0 {
            return None;
        }
        let pct = |count: usize| ((count as f64 / self.total as f64) * 100.0).round() as u32;
        Some(StatusPercentages {
            todo: pct(self.todo),
            progress: pct(self.progress),
            done: pct(self.done),
        })
    }
}

pub fn counts_by_status(tasks: &[Task]) -> StatusCounts {
    StatusCounts::tally(tasks.iter().map(|t| t.status))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardCounts {
    pub board: Board,
    pub counts: StatusCounts,
}

/// Counts per board, in the order the boards are given.
pub fn counts_by_board(boards: &[Board], tasks: &[Task]) -> Vec<BoardCounts> {
    boards
        .iter()
        .map(|board| BoardCounts {
            board: board.clone(),
            counts: StatusCounts::tally(
                tasks
                    .iter()
                    .filter(|t| t.board_id == board.id)
                    .map(|t| t.status),
            ),
        })
        .collect()
}

/// Everything the summary view shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub overall: StatusCounts,
    pub per_board: Vec<BoardCounts>,
}

impl Summary {
    pub fn compute(boards: &[Board], tasks: &[Task]) -> Self {
        Self {
            overall: counts_by_status(tasks),
            per_board: counts_by_board(boards, tasks),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

/// Tasks created on `date` as seen in `tz`.
///
/// Compares local calendar days, not instants: two tasks on the same local
/// day always match, and 23:59:59 and 00:00:01 never share a bucket.
pub fn tasks_on_date<'a, Tz: TimeZone>(tasks: &'a [Task], date: NaiveDate, tz: &Tz) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| local_date(t.created_at, tz) == Some(date))
        .collect()
}

/// Targets pinned to `date`. Stored day keys are already local.
pub fn targets_on_date(targets: &[CalendarTarget], date: NaiveDate) -> Vec<&CalendarTarget> {
    targets
        .iter()
        .filter(|t| parse_day_key(&t.date).ok() == Some(date))
        .collect()
}

/// Cells of a month view, weeks starting on Sunday: one `None` per weekday
/// before the 1st, then every day of the month. Empty for an invalid month.
pub fn month_grid(year: i32, month: u32) -> Vec<Option<NaiveDate>> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    let leading = first.weekday().num_days_from_sunday() as usize;

    let mut cells = vec![None; leading];
    cells.extend(
        first
            .iter_days()
            .take_while(|d| d.month() == month)
            .map(Some),
    );
    cells
}

/// One cell of the month view. Leading blank cells have no date and no items.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCell {
    pub date: Option<NaiveDate>,
    pub tasks: Vec<Task>,
    pub targets: Vec<CalendarTarget>,
}

pub fn calendar_month<Tz: TimeZone>(
    tasks: &[Task],
    targets: &[CalendarTarget],
    year: i32,
    month: u32,
    tz: &Tz,
) -> Vec<CalendarCell> {
    month_grid(year, month)
        .into_iter()
        .map(|date| match date {
            Some(day) => CalendarCell {
                date,
                tasks: tasks_on_date(tasks, day, tz).into_iter().cloned().collect(),
                targets: targets_on_date(targets, day).into_iter().cloned().collect(),
            },
            None => CalendarCell {
                date: None,
                tasks: Vec::new(),
                targets: Vec::new(),
            },
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Donut
// ---------------------------------------------------------------------------

/// Stacking order of the donut segments.
pub const DONUT_ORDER: [TaskStatus; 3] = [TaskStatus::Done, TaskStatus::Progress, TaskStatus::Todo];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcSegment {
    pub status: TaskStatus,
    /// Stroke length along the circle.
    pub length: f64,
    /// Dash offset: circumference minus the length of this and every earlier
    /// segment.
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DonutLayout {
    /// No tasks: draw a single neutral ring.
    Empty { circumference: f64 },
    Segments {
        circumference: f64,
        arcs: [ArcSegment; 3],
    },
}

impl DonutLayout {
    pub fn compute(counts: &StatusCounts, radius: f64) -> Self {
        let circumference = 2.0 * PI * radius;
        if counts.total == 0 {
            return DonutLayout::Empty { circumference };
        }

        let mut cumulative = 0.0;
        let arcs = DONUT_ORDER.map(|status| {
            let length = circumference * counts.count(status) as f64 / counts.total as f64;
            cumulative += length;
            ArcSegment {
                status,
                length,
                offset: circumference - cumulative,
            }
        });

        DonutLayout::Segments { circumference, arcs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use proptest::prelude::*;
    use teamboard_shared::{BoardId, TaskId, UserId};

    fn task(id: usize, board: &str, status: TaskStatus, created_at: i64) -> Task {
        Task {
            id: TaskId::new(format!("t{id}")),
            text: format!("task {id}"),
            status,
            board_id: BoardId::from(board),
            creator_id: UserId::from("u1"),
            created_at,
            comments: Vec::new(),
        }
    }

    fn board(id: &str) -> Board {
        Board {
            id: BoardId::from(id),
            name: id.to_uppercase(),
            owner_id: UserId::from("u1"),
            members: vec![UserId::from("u1")],
            created_at: 0,
        }
    }

    fn status_strategy() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Todo),
            Just(TaskStatus::Progress),
            Just(TaskStatus::Done),
        ]
    }

    fn tasks_strategy() -> impl Strategy<Value = Vec<Task>> {
        prop::collection::vec((status_strategy(), 0usize..4), 0..60).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (status, b))| task(i, &format!("b{b}"), status, 0))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_counts_sum_to_total(tasks in tasks_strategy()) {
            let counts = counts_by_status(&tasks);
            prop_assert_eq!(counts.todo + counts.progress + counts.done, counts.total);
            prop_assert_eq!(counts.total, tasks.len());

            match counts.percentages() {
                None => prop_assert_eq!(counts.total, 0),
                Some(p) => {
                    for status in TaskStatus::ALL {
                        let expected =
                            (counts.count(status) as f64 / counts.total as f64 * 100.0).round() as u32;
                        let got = match status {
                            TaskStatus::Todo => p.todo,
                            TaskStatus::Progress => p.progress,
                            TaskStatus::Done => p.done,
                        };
                        prop_assert_eq!(got, expected);
                    }
                    let sum = (p.todo + p.progress + p.done) as i64;
                    prop_assert!((sum - 100).abs() <= 2, "sum was {}", sum);
                }
            }
        }

        #[test]
        fn prop_board_counts_match_filtered_status_counts(tasks in tasks_strategy()) {
            let boards: Vec<Board> = (0..5).map(|i| board(&format!("b{i}"))).collect();
            for row in counts_by_board(&boards, &tasks) {
                let own: Vec<Task> = tasks
                    .iter()
                    .filter(|t| t.board_id == row.board.id)
                    .cloned()
                    .collect();
                prop_assert_eq!(row.counts, counts_by_status(&own));
            }
        }
    }

    #[test]
    fn test_percentages_absent_for_empty() {
        assert_eq!(counts_by_status(&[]).percentages(), None);
    }

    #[test]
    fn test_percentages_round_half_up() {
        // 1/8 = 12.5% rounds to 13.
        let mut tasks = vec![task(0, "b", TaskStatus::Done, 0)];
        tasks.extend((1..8).map(|i| task(i, "b", TaskStatus::Todo, 0)));
        let p = counts_by_status(&tasks).percentages().unwrap();
        assert_eq!(p.done, 13);
        assert_eq!(p.todo, 88);
    }

    #[test]
    fn test_midnight_splits_buckets() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let before = tz.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap().timestamp_millis();
        let after = tz.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap().timestamp_millis();
        assert!(after - before < 2_000);

        let tasks = vec![
            task(1, "b", TaskStatus::Todo, before),
            task(2, "b", TaskStatus::Todo, after),
        ];
        let may1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let may2 = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        let on_1: Vec<_> = tasks_on_date(&tasks, may1, &tz).iter().map(|t| t.id.as_str()).collect();
        let on_2: Vec<_> = tasks_on_date(&tasks, may2, &tz).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(on_1, ["t1"]);
        assert_eq!(on_2, ["t2"]);
    }

    #[test]
    fn test_same_local_day_different_instants_match() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let morning = tz.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap().timestamp_millis();
        let night = tz.with_ymd_and_hms(2024, 1, 10, 22, 0, 0).unwrap().timestamp_millis();
        let tasks = vec![
            task(1, "b", TaskStatus::Todo, morning),
            task(2, "b", TaskStatus::Done, night),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(tasks_on_date(&tasks, day, &tz).len(), 2);
    }

    #[test]
    fn test_targets_on_date() {
        let target = |id: &str, date: &str| CalendarTarget {
            id: id.into(),
            text: "ship".into(),
            date: date.into(),
            owner_id: UserId::from("u1"),
            created_at: 0,
        };
        let targets = vec![target("a", "2024-02-29"), target("b", "2024-03-01")];
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let hits = targets_on_date(&targets, leap);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "a");
    }

    #[test]
    fn test_month_grid_leading_blanks() {
        // 1 September 2024 is a Sunday; 1 February 2024 a Thursday.
        let sept = month_grid(2024, 9);
        assert_eq!(sept.len(), 30);
        assert!(sept[0].is_some());

        let feb = month_grid(2024, 2);
        assert_eq!(feb.iter().take_while(|c| c.is_none()).count(), 4);
        assert_eq!(feb.iter().flatten().count(), 29);

        assert!(month_grid(2024, 13).is_empty());
    }

    #[test]
    fn test_calendar_month_places_items() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let created = tz.with_ymd_and_hms(2024, 2, 3, 12, 0, 0).unwrap().timestamp_millis();
        let tasks = vec![task(1, "b", TaskStatus::Todo, created)];
        let cells = calendar_month(&tasks, &[], 2024, 2, &tz);

        let third = cells
            .iter()
            .find(|c| c.date == NaiveDate::from_ymd_opt(2024, 2, 3))
            .unwrap();
        assert_eq!(third.tasks.len(), 1);
        assert_eq!(cells.iter().map(|c| c.tasks.len()).sum::<usize>(), 1);
    }

    #[test]
    fn test_donut_empty() {
        let layout = DonutLayout::compute(&StatusCounts::default(), 90.0);
        assert!(matches!(layout, DonutLayout::Empty { .. }));
    }

    #[test]
    fn test_donut_segments() {
        let counts = StatusCounts {
            todo: 1,
            progress: 1,
            done: 2,
            total: 4,
        };
        let DonutLayout::Segments { circumference, arcs } = DonutLayout::compute(&counts, 90.0) else {
            panic!("expected segments");
        };
        assert_eq!(arcs.map(|a| a.status), DONUT_ORDER);

        let total: f64 = arcs.iter().map(|a| a.length).sum();
        assert!((total - circumference).abs() < 1e-9);
        assert!((arcs[0].length - circumference / 2.0).abs() < 1e-9);
        assert!((arcs[0].offset - circumference / 2.0).abs() < 1e-9);
        assert!(arcs[2].offset.abs() < 1e-9);
    }
}
