use chrono::{Datelike, Duration, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})").expect("valid regex"));

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thur|thu|friday|fri|saturday|sat|sunday|sun)\b",
    )
    .expect("valid regex")
});

static IN_N_DAYS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bin\s+(\d{1,2}|a|one|two|three|four|five|six|seven)\s+(days?|weeks?)\b")
        .expect("valid regex")
});

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s*(\d{{4}}))?"
    ))
    .expect("valid regex")
});

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b\.?(?:,?\s*(\d{{4}}))?"
    ))
    .expect("valid regex")
});

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?\b").expect("valid regex")
});

/// "Tuesday, January 22, 2030", with the weekday and year optional.
static CALENDAR_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:\b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun)\.?,?\s+)?\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s*(\d{{4}}))?"
    ))
    .expect("valid regex")
});

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+or\s+|\s+and\s+|,").expect("valid regex"));

/// Resolves a single date expression relative to `today`. No range checks.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let lower = lower.trim();

    if let Some(caps) = ISO_DATE.captures(lower) {
        let (y, m, d) = (caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d);
    }

    // Calendar dates win over a leading weekday name ("Tuesday, July 1").
    if let Some(caps) = MONTH_DAY.captures(lower) {
        return month_day(today, &caps[1], &caps[2], caps.get(3).map(|m| m.as_str()));
    }
    if let Some(caps) = DAY_MONTH.captures(lower) {
        return month_day(today, &caps[2], &caps[1], caps.get(3).map(|m| m.as_str()));
    }

    if let Some(caps) = NUMERIC_DATE.captures(lower) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) if y.as_str().len() == 2 => Some(2000 + y.as_str().parse::<i32>().ok()?),
            Some(y) => Some(y.as_str().parse().ok()?),
            None => None,
        };
        return resolve_year(today, month, day, year);
    }

    if contains_word(lower, "day after tomorrow") {
        return Some(today + Duration::days(2));
    }
    if contains_word(lower, "today") {
        return Some(today);
    }
    if contains_word(lower, "tomorrow") {
        return Some(today + Duration::days(1));
    }

    if let Some(caps) = IN_N_DAYS.captures(lower) {
        let n = small_number(&caps[1])?;
        let days = if caps[2].starts_with("week") { n * 7 } else { n };
        return Some(today + Duration::days(days));
    }

    if let Some(caps) = WEEKDAY.captures(lower) {
        let weekday = parse_weekday(&caps[1])?;
        let word = &caps[1];

        if lower.contains("next week") || lower.contains("following week") {
            let monday_next_week =
                today - Duration::days(today.weekday().num_days_from_monday() as i64) + Duration::days(7);
            return Some(monday_next_week + Duration::days(weekday.num_days_from_monday() as i64));
        }

        let ahead = days_until(today, weekday);
        if lower.contains(&format!("this {word}")) {
            return Some(today + Duration::days(ahead));
        }
        // Bare and "next" weekdays both mean the next occurrence after today.
        let ahead = if ahead == 0 { 7 } else { ahead };
        return Some(today + Duration::days(ahead));
    }

    None
}

/// Resolves every date mentioned in an utterance joined by "or", "and" or
/// commas. Each part is resolved on its own; the result is sorted and deduplicated.
pub fn parse_dates(text: &str, today: NaiveDate) -> Vec<NaiveDate> {
    let lower = text.to_lowercase();
    let next_week = lower.contains("next week");

    // Whole calendar dates first, so "Tuesday, January 22, 2030" is not split on its commas.
    let mut dates: Vec<NaiveDate> = CALENDAR_DATE
        .captures_iter(&lower)
        .filter_map(|caps| month_day(today, &caps[1], &caps[2], caps.get(3).map(|m| m.as_str())))
        .collect();
    let rest = CALENDAR_DATE.replace_all(&lower, " and ");

    let parts = SEPARATORS.split(&rest).filter_map(|part| {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        // "next week monday or tuesday": the qualifier applies to every part
        if next_week && !part.contains("next week") && WEEKDAY.is_match(part) {
            parse_date(&format!("{part} next week"), today)
        } else {
            parse_date(part, today)
        }
    });
    dates.extend(parts);

    if dates.is_empty() {
        dates.extend(parse_date(&lower, today));
    }

    dates.sort();
    dates.dedup();
    dates
}

pub fn within_horizon(date: NaiveDate, today: NaiveDate, horizon_days: i64) -> bool {
    date >= today && date <= today + Duration::days(horizon_days)
}

pub fn mentions_weekday(text: &str) -> bool {
    WEEKDAY.is_match(&text.to_lowercase())
}

fn days_until(today: NaiveDate, weekday: Weekday) -> i64 {
    let from = today.weekday().num_days_from_monday() as i64;
    let to = weekday.num_days_from_monday() as i64;
    (to - from).rem_euclid(7)
}

fn month_day(today: NaiveDate, month: &str, day: &str, year: Option<&str>) -> Option<NaiveDate> {
    let month = parse_month(month)?;
    let day: u32 = day.parse().ok()?;
    let year = match year {
        Some(y) => Some(y.parse().ok()?),
        None => None,
    };
    resolve_year(today, month, day, year)
}

/// Without an explicit year, a date already past this year means next year.
fn resolve_year(today: NaiveDate, month: u32, day: u32, year: Option<i32>) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if candidate < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

fn parse_month(s: &str) -> Option<u32> {
    let month = match &s[..s.len().min(3)] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub(super) fn parse_weekday(s: &str) -> Option<Weekday> {
    let weekday = match &s[..s.len().min(3)] {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

fn small_number(s: &str) -> Option<i64> {
    let n = match s {
        "a" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        digits => digits.parse().ok()?,
    };
    Some(n)
}

pub(super) fn contains_word(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + phrase.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}
