use chrono::{NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

use super::dates::contains_word;
use crate::models::Slot;

/// Slots further than this from the requested clock time do not match it.
const TOLERANCE_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    /// Half-open hour window `[start, end)`.
    pub fn hours(self) -> (u32, u32) {
        match self {
            DayPeriod::Morning => (8, 12),
            DayPeriod::Afternoon => (12, 17),
            DayPeriod::Evening => (17, 20),
        }
    }

    pub fn contains(self, slot: &Slot) -> bool {
        let (start, end) = self.hours();
        (start..end).contains(&slot.start.hour())
    }
}

static CLOCK_MINUTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})\s*(a\.?m\.?|p\.?m\.?)?").expect("valid regex")
});

static CLOCK_MERIDIEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\s*(a\.?m\.?|p\.?m\.?)").expect("valid regex"));

static CLOCK_OCLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\s*o'?\s?clock\b").expect("valid regex"));

static ORDINAL_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s|#)(\d{1,2})(?:st|nd|rd|th)?(?:\s|$|[.!,)])").expect("valid regex")
});

const ORDINAL_WORDS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
];

/// Clock time in an utterance. Hours 1 through 7 without am/pm are read as
/// afternoon, since nobody meets an advisor at 3 in the morning.
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let lower = text.to_lowercase();

    if contains_word(&lower, "noon") || contains_word(&lower, "midday") {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }

    let (hour, minute, meridiem) = if let Some(caps) = CLOCK_MINUTES.captures(&lower) {
        (
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps.get(3).map(|m| m.as_str().starts_with('p')),
        )
    } else if let Some(caps) = CLOCK_MERIDIEM.captures(&lower) {
        (caps[1].parse().ok()?, 0, Some(caps[2].starts_with('p')))
    } else if let Some(caps) = CLOCK_OCLOCK.captures(&lower) {
        (caps[1].parse().ok()?, 0, None)
    } else {
        return None;
    };

    let hour = match meridiem {
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        None if (1..=7).contains(&hour) => hour + 12,
        _ => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn parse_day_period(text: &str) -> Option<DayPeriod> {
    let lower = text.to_lowercase();
    if lower.contains("morning") {
        Some(DayPeriod::Morning)
    } else if lower.contains("afternoon") {
        Some(DayPeriod::Afternoon)
    } else if lower.contains("evening") {
        Some(DayPeriod::Evening)
    } else {
        None
    }
}

/// 1-based position named by "second", "3rd", "#2" or a bare number.
pub fn parse_ordinal(text: &str) -> Option<usize> {
    let lower = text.to_lowercase();
    if let Some((_, n)) = ORDINAL_WORDS.iter().find(|(w, _)| contains_word(&lower, w)) {
        return Some(*n);
    }
    ORDINAL_NUMBER
        .captures(&lower)
        .and_then(|caps| caps[1].parse().ok())
        .filter(|n| *n > 0)
}

/// Picks the slot an utterance refers to. Tried in order: an echoed slot id,
/// a clock time (closest slot within tolerance), a part of day, an ordinal.
/// An explicit clock time with nothing close enough is a non-match unless a
/// part of day was also named, in which case the first slot in that window
/// is taken. A time equally close to slots on different dates is a
/// non-match, as is a part of day with no open slots.
pub fn match_slot(text: &str, slots: &[Slot]) -> Option<Slot> {
    if slots.is_empty() {
        return None;
    }

    if let Some(slot) = slots.iter().find(|s| text.contains(&s.id())) {
        return Some(slot.clone());
    }

    let period = parse_day_period(text);
    let candidates: Vec<&Slot> = match period {
        Some(p) => slots.iter().filter(|s| p.contains(s)).collect(),
        None => slots.iter().collect(),
    };
    // a part of day with nothing open in it is not a match
    if period.is_some() && candidates.is_empty() {
        return None;
    }

    if let Some(time) = parse_clock(text) {
        let exact = closest(time, &candidates);
        if exact.is_some() || period.is_none() {
            return exact;
        }
        return candidates.first().map(|s| (*s).clone());
    }

    if period.is_some() {
        return candidates.first().map(|s| (*s).clone());
    }

    let n = parse_ordinal(text)?;
    candidates.get(n - 1).map(|s| (*s).clone())
}

fn closest(time: NaiveTime, candidates: &[&Slot]) -> Option<Slot> {
    let distance = |slot: &Slot| (slot.start.time() - time).num_minutes().abs();
    let best = candidates.iter().map(|s| distance(s)).min()?;
    if best > TOLERANCE_MINUTES {
        return None;
    }

    let tied: Vec<&Slot> = candidates
        .iter()
        .copied()
        .filter(|s| distance(s) == best)
        .collect();
    let first = tied.first()?;
    if tied.iter().any(|s| s.date() != first.date()) {
        return None;
    }
    Some((*first).clone())
}
