use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Every slot is this long; the grid is built from it.
pub const SLOT_MINUTES: i64 = 30;

/// Machine-readable slot identifier, echoed back by chat clients.
pub const SLOT_ID_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Slot {
    pub advisor_id: String,
    pub start: NaiveDateTime,
}

impl Slot {
    pub fn new(advisor_id: impl Into<String>, start: NaiveDateTime) -> Self {
        Self {
            advisor_id: advisor_id.into(),
            start,
        }
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::minutes(SLOT_MINUTES)
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn id(&self) -> String {
        self.start.format(SLOT_ID_FORMAT).to_string()
    }

    /// "Monday, October 19, 2026 at 2:00 PM"
    pub fn display(&self) -> String {
        format_slot(&self.start)
    }

    pub fn time_label(&self) -> String {
        format_time(&self.start)
    }
}

pub fn format_slot(dt: &NaiveDateTime) -> String {
    format!("{} at {}", format_date(&dt.date()), format_time(dt))
}

pub fn format_date(d: &NaiveDate) -> String {
    d.format("%A, %B %-d, %Y").to_string()
}

pub fn format_time(dt: &NaiveDateTime) -> String {
    dt.format("%-I:%M %p").to_string()
}

/// Drops sub-second precision so stored and requested timestamps compare equal.
pub fn normalize(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start.and_time(chrono::NaiveTime::MIN)
    }

    pub fn end_datetime(&self) -> NaiveDateTime {
        self.end.and_time(chrono::NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Available,
    Booked,
    Blocked,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Available => "available",
            BlockStatus::Booked => "booked",
            BlockStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "available" => Ok(BlockStatus::Available),
            "booked" => Ok(BlockStatus::Booked),
            "blocked" => Ok(BlockStatus::Blocked),
            other => Err(anyhow::anyhow!("unknown calendar block status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarBlock {
    pub advisor_id: String,
    pub slot_datetime: NaiveDateTime,
    pub status: BlockStatus,
}

/// Weekly working-hour rule the slot grid is generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub days: Vec<Weekday>,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 17,
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl WorkingHours {
    pub fn new(start_hour: u32, end_hour: u32, days: Vec<Weekday>) -> anyhow::Result<Self> {
        if end_hour > 24 || start_hour >= end_hour {
            anyhow::bail!("invalid working hours: {start_hour}:00-{end_hour}:00");
        }
        Ok(Self {
            start_hour,
            end_hour,
            days,
        })
    }

    /// Parses a comma-separated weekday list such as `mon,tue,wed`.
    pub fn parse_days(s: &str) -> anyhow::Result<Vec<Weekday>> {
        s.split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(parse_weekday)
            .collect()
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday())
    }

    pub fn slot_starts(&self, date: NaiveDate) -> Vec<NaiveDateTime> {
        if !self.is_working_day(date) {
            return vec![];
        }

        let Some(first) = date.and_hms_opt(self.start_hour, 0, 0) else {
            return vec![];
        };
        let last = date.and_time(chrono::NaiveTime::MIN) + Duration::hours(self.end_hour as i64);

        let mut starts = vec![];
        let mut current = first;
        while current < last {
            starts.push(current);
            current += Duration::minutes(SLOT_MINUTES);
        }
        starts
    }

    /// True when `dt` is exactly one of the generated slot starts.
    pub fn contains(&self, dt: &NaiveDateTime) -> bool {
        let minutes_into_day = (dt.hour() * 60 + dt.minute()) as i64;
        self.is_working_day(dt.date())
            && dt.second() == 0
            && minutes_into_day >= (self.start_hour * 60) as i64
            && minutes_into_day < (self.end_hour * 60) as i64
            && (minutes_into_day - (self.start_hour * 60) as i64) % SLOT_MINUTES == 0
    }

    pub fn to_human_readable(&self) -> String {
        if self.days.is_empty() {
            return String::new();
        }

        let mut days = self.days.clone();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();

        let names = days
            .iter()
            .map(|d| capitalize(&d.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{names}: {:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}
