use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Named window layouts selectable from settings or `--window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WindowPreset {
    /// Seven days starting on the most recent Friday
    Week,
    /// Four days starting on the most recent Friday, paged a week at a time
    #[default]
    FourDay,
    /// Four days starting today, paged a day at a time
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Friday,
    Today,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    pub anchor: Anchor,
    pub days: u32,
    pub step: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WindowPreset {
    pub fn rule(self) -> WindowRule {
        match self {
            WindowPreset::Week => WindowRule {
                anchor: Anchor::Friday,
                days: 7,
                step: 7,
            },
            WindowPreset::FourDay => WindowRule {
                anchor: Anchor::Friday,
                days: 4,
                step: 7,
            },
            WindowPreset::Rolling => WindowRule {
                anchor: Anchor::Today,
                days: 4,
                step: 1,
            },
        }
    }
}

impl WindowRule {
    pub fn anchor_for(&self, today: NaiveDate) -> NaiveDate {
        match self.anchor {
            Anchor::Friday => last_friday(today),
            Anchor::Today => today,
        }
    }

    /// Moves the anchor by `pages` navigation steps (negative goes back).
    pub fn shift(&self, anchor: NaiveDate, pages: i64) -> NaiveDate {
        add_days(anchor, self.step * pages)
    }

    pub fn dates(&self, anchor: NaiveDate) -> Vec<NaiveDate> {
        (0..self.days as i64).map(|i| add_days(anchor, i)).collect()
    }

    pub fn range(&self, anchor: NaiveDate) -> DateRange {
        DateRange {
            start: anchor,
            end: add_days(anchor, self.days.saturating_sub(1) as i64),
        }
    }

    /// `Fri 16 - Mon 19` for the visible span.
    pub fn range_label(&self, anchor: NaiveDate) -> String {
        let range = self.range(anchor);
        format!("{} - {}", short_day_label(range.start), short_day_label(range.end))
    }
}

/// The Friday on or before `date`.
pub fn last_friday(date: NaiveDate) -> NaiveDate {
    let from_monday = date.weekday().num_days_from_monday() as i64;
    let friday = Weekday::Fri.num_days_from_monday() as i64;
    add_days(date, -((from_monday - friday).rem_euclid(7)))
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(input: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
}

/// `OCTOBER 2026`
pub fn month_title(anchor: NaiveDate) -> String {
    format!("{} {}", anchor.format("%B").to_string().to_uppercase(), anchor.year())
}

/// `FRI 16`, used for column headers.
pub fn day_label(date: NaiveDate) -> String {
    short_day_label(date).to_uppercase()
}

/// `Fri 16`
pub fn short_day_label(date: NaiveDate) -> String {
    format!("{} {}", date.format("%a"), date.day())
}
