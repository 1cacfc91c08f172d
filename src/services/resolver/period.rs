use chrono::{Datelike, Duration, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::dates::{mentions_weekday, within_horizon};
use crate::models::DateRange;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Week,
    Month,
    Year,
}

/// Offset of the period from the one containing today.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeReference {
    This,
    Next,
    Following,
}

impl TimeReference {
    fn offset(self) -> u32 {
        match self {
            TimeReference::This => 0,
            TimeReference::Next => 1,
            TimeReference::Following => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeekPosition {
    Nth(u8),
    Last,
}

/// A relative span of days such as "next month", "the last week of this
/// month" or "the 10th to the 15th of next month".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodSpec {
    pub unit: PeriodUnit,
    pub reference: TimeReference,
    pub week_position: Option<WeekPosition>,
    pub day_range: Option<(u32, u32)>,
}

static UNIT_AFTER_NEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(week|month|year)\s+after\s+next\b").expect("valid regex"));

static REFERENCE_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(this|current|next|coming|following)\s+(week|month|year)\b").expect("valid regex")
});

static END_OF_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bend\s+of\s+(?:the\s+)?month\b").expect("valid regex"));

static WEEK_POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(first|1st|second|2nd|third|3rd|fourth|4th|last|final)\s+week\b")
        .expect("valid regex")
});

static DAY_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(\d{1,2})(?:st|nd|rd|th)?\s*(?:-|to|through|thru|until|and)\s*(?:the\s+)?(\d{1,2})(?:st|nd|rd|th)?\b",
    )
    .expect("valid regex")
});

/// Recognizes a relative period in an utterance. Utterances naming a
/// weekday are left to the single-date rules.
pub fn classify_period(text: &str) -> Option<PeriodSpec> {
    let lower = text.to_lowercase();
    if mentions_weekday(&lower) {
        return None;
    }

    let (unit, reference) = if let Some(caps) = UNIT_AFTER_NEXT.captures(&lower) {
        (parse_unit(&caps[1])?, TimeReference::Following)
    } else if let Some(caps) = REFERENCE_UNIT.captures(&lower) {
        let reference = match &caps[1] {
            "this" | "current" => TimeReference::This,
            "next" | "coming" => TimeReference::Next,
            _ => TimeReference::Following,
        };
        (parse_unit(&caps[2])?, reference)
    } else if END_OF_MONTH.is_match(&lower) {
        (PeriodUnit::Month, TimeReference::This)
    } else {
        return None;
    };

    let mut spec = PeriodSpec {
        unit,
        reference,
        week_position: None,
        day_range: None,
    };

    if unit != PeriodUnit::Week {
        spec.week_position = WEEK_POSITION
            .captures(&lower)
            .and_then(|caps| parse_week_position(&caps[1]));
        if spec.week_position.is_none() && END_OF_MONTH.is_match(&lower) {
            spec.week_position = Some(WeekPosition::Last);
        }
    }

    if unit == PeriodUnit::Month {
        spec.day_range = DAY_RANGE.captures(&lower).and_then(|caps| {
            let a: u32 = caps[1].parse().ok()?;
            let b: u32 = caps[2].parse().ok()?;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            (1..=31).contains(&lo).then_some((lo, hi.min(31)))
        });
    }

    Some(spec)
}

impl PeriodSpec {
    /// Calendar bounds of the period, before any horizon clipping.
    pub fn bounds(&self, today: NaiveDate) -> Option<DateRange> {
        let offset = self.reference.offset();
        let (start, end) = match self.unit {
            PeriodUnit::Week => {
                let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                let start = monday + Duration::weeks(offset as i64);
                return Some(DateRange::new(start, start + Duration::days(6)));
            }
            PeriodUnit::Month => {
                let start = today.with_day(1)?.checked_add_months(Months::new(offset))?;
                let end = start.checked_add_months(Months::new(1))? - Duration::days(1);
                (start, end)
            }
            PeriodUnit::Year => {
                let start = NaiveDate::from_ymd_opt(today.year() + offset as i32, 1, 1)?;
                let end = NaiveDate::from_ymd_opt(today.year() + offset as i32, 12, 31)?;
                (start, end)
            }
        };

        if let Some((lo, hi)) = self.day_range {
            let day = |n: u32| start + Duration::days((n as i64 - 1).min((end - start).num_days()));
            return Some(DateRange::new(day(lo), day(hi)));
        }

        Some(match self.week_position {
            Some(WeekPosition::Nth(n)) => {
                let week_start = start + Duration::weeks(n.saturating_sub(1) as i64);
                if week_start > end {
                    return None;
                }
                DateRange::new(week_start, (week_start + Duration::days(6)).min(end))
            }
            Some(WeekPosition::Last) => {
                DateRange::new((end - Duration::days(6)).max(start), end)
            }
            None => DateRange::new(start, end),
        })
    }

    /// Every date of the period that is between today and the booking horizon.
    pub fn expand(&self, today: NaiveDate, horizon_days: i64) -> Vec<NaiveDate> {
        let Some(range) = self.bounds(today) else {
            return vec![];
        };
        range
            .days()
            .filter(|d| within_horizon(*d, today, horizon_days))
            .collect()
    }

    pub fn describe(&self) -> String {
        let unit = match self.unit {
            PeriodUnit::Week => "week",
            PeriodUnit::Month => "month",
            PeriodUnit::Year => "year",
        };
        let reference = match self.reference {
            TimeReference::This => format!("this {unit}"),
            TimeReference::Next => format!("next {unit}"),
            TimeReference::Following => format!("the {unit} after next"),
        };
        match (self.day_range, self.week_position) {
            (Some((lo, hi)), _) => {
                format!("the {} to the {} of {reference}", ordinal(lo), ordinal(hi))
            }
            (None, Some(WeekPosition::Last)) => format!("the last week of {reference}"),
            (None, Some(WeekPosition::Nth(n))) => format!("week {n} of {reference}"),
            (None, None) => reference,
        }
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn parse_unit(s: &str) -> Option<PeriodUnit> {
    match s {
        "week" => Some(PeriodUnit::Week),
        "month" => Some(PeriodUnit::Month),
        "year" => Some(PeriodUnit::Year),
        _ => None,
    }
}

fn parse_week_position(s: &str) -> Option<WeekPosition> {
    let position = match s {
        "first" | "1st" => WeekPosition::Nth(1),
        "second" | "2nd" => WeekPosition::Nth(2),
        "third" | "3rd" => WeekPosition::Nth(3),
        "fourth" | "4th" => WeekPosition::Nth(4),
        "last" | "final" => WeekPosition::Last,
        _ => return None,
    };
    Some(position)
}
