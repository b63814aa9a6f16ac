//! Time-interval bucketing.
//!
//! Maps absolute submission timestamps to integer bucket indices
//! relative to an anchor date at a chosen granularity, and clips the
//! submission universe to the filter window. Month arithmetic is
//! calendar-aware, not a fixed day count.

use crate::domain::{DiagnosisId, ItemId, QuestionnaireId, TreatmentId};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// Which patient date all bucket indices are relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Registration,
    Diagnosis(DiagnosisId),
    TreatmentStart(TreatmentId),
}

/// Optional clipping of the submission universe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionWindow {
    pub upper_bound_date: Option<NaiveDate>,
    pub max_intervals: Option<u32>,
}

/// Caller-supplied context for every bucket-dependent computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterContext {
    pub anchor: AnchorKind,
    pub granularity: Granularity,
    #[serde(default)]
    pub submission_window: SubmissionWindow,
    pub item_filter: Option<Vec<ItemId>>,
    pub questionnaire_filter: Option<Vec<QuestionnaireId>>,
}

impl FilterContext {
    pub fn new(anchor: AnchorKind, granularity: Granularity) -> Self {
        Self {
            anchor,
            granularity,
            submission_window: SubmissionWindow::default(),
            item_filter: None,
            questionnaire_filter: None,
        }
    }
}

/// Bucket index of `date` relative to `anchor`:
/// floor((date − anchor) / granularity). Negative for dates before the
/// anchor; callers exclude those.
pub fn bucket_index(anchor: NaiveDate, date: NaiveDate, granularity: Granularity) -> i64 {
    match granularity {
        Granularity::Day => (date - anchor).num_days(),
        Granularity::Week => (date - anchor).num_days().div_euclid(7),
        Granularity::Month => {
            let mut months = i64::from(date.year() - anchor.year()) * 12
                + i64::from(date.month() as i32 - anchor.month() as i32);
            // The month only completes once the day-of-month comes round.
            if date.day() < anchor.day() {
                months -= 1;
            }
            months
        }
    }
}

/// Inclusive date window `[anchor, end]` used to clip submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        if date < self.start {
            return false;
        }
        match self.end {
            Some(end) => date <= end,
            None => true,
        }
    }
}

/// The window `[anchor, anchor + max_intervals · g]`, further clipped
/// by the context's upper bound date when present.
pub fn window(anchor: NaiveDate, ctx: &FilterContext) -> DateWindow {
    let interval_end = ctx.submission_window.max_intervals.map(|n| {
        match ctx.granularity {
            Granularity::Day => anchor
                .checked_add_days(Days::new(u64::from(n)))
                .unwrap_or(NaiveDate::MAX),
            Granularity::Week => anchor
                .checked_add_days(Days::new(u64::from(n) * 7))
                .unwrap_or(NaiveDate::MAX),
            Granularity::Month => anchor
                .checked_add_months(Months::new(n))
                .unwrap_or(NaiveDate::MAX),
        }
    });

    let end = match (interval_end, ctx.submission_window.upper_bound_date) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    DateWindow {
        start: anchor,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_buckets() {
        let anchor = date(2024, 1, 10);
        assert_eq!(bucket_index(anchor, date(2024, 1, 10), Granularity::Day), 0);
        assert_eq!(bucket_index(anchor, date(2024, 1, 15), Granularity::Day), 5);
        assert_eq!(bucket_index(anchor, date(2024, 1, 8), Granularity::Day), -2);
    }

    #[test]
    fn test_week_buckets_floor_negative() {
        let anchor = date(2024, 1, 10);
        assert_eq!(bucket_index(anchor, date(2024, 1, 16), Granularity::Week), 0);
        assert_eq!(bucket_index(anchor, date(2024, 1, 17), Granularity::Week), 1);
        // 3 days before the anchor is week −1, not week 0.
        assert_eq!(bucket_index(anchor, date(2024, 1, 7), Granularity::Week), -1);
    }

    #[test]
    fn test_month_buckets_are_calendar_aware() {
        let anchor = date(2024, 1, 31);
        // Feb 28 is still inside month 0: the 31st never arrived.
        assert_eq!(
            bucket_index(anchor, date(2024, 2, 28), Granularity::Month),
            0
        );
        assert_eq!(
            bucket_index(anchor, date(2024, 3, 31), Granularity::Month),
            2
        );
        // Crossing a year boundary.
        assert_eq!(
            bucket_index(anchor, date(2025, 1, 31), Granularity::Month),
            12
        );
        assert_eq!(
            bucket_index(anchor, date(2023, 12, 31), Granularity::Month),
            -1
        );
    }

    #[test]
    fn test_window_with_max_intervals() {
        let anchor = date(2024, 1, 1);
        let mut ctx = FilterContext::new(AnchorKind::Registration, Granularity::Week);
        ctx.submission_window.max_intervals = Some(4);
        let w = window(anchor, &ctx);
        assert_eq!(w.end, Some(date(2024, 1, 29)));
        assert!(w.contains(date(2024, 1, 29)));
        assert!(!w.contains(date(2024, 1, 30)));
        assert!(!w.contains(date(2023, 12, 31)));
    }

    #[test]
    fn test_window_upper_bound_wins_when_tighter() {
        let anchor = date(2024, 1, 1);
        let mut ctx = FilterContext::new(AnchorKind::Registration, Granularity::Month);
        ctx.submission_window.max_intervals = Some(6);
        ctx.submission_window.upper_bound_date = Some(date(2024, 3, 15));
        let w = window(anchor, &ctx);
        assert_eq!(w.end, Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_unbounded_window() {
        let anchor = date(2024, 1, 1);
        let ctx = FilterContext::new(AnchorKind::Registration, Granularity::Day);
        let w = window(anchor, &ctx);
        assert_eq!(w.end, None);
        assert!(w.contains(date(2030, 1, 1)));
    }
}
