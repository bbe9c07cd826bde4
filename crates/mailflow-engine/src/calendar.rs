//! Business-hours calendar
//!
//! The calendar is injected so the engine never reads an ambient clock;
//! business-hours deferral is deterministic under test.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use mailflow_common::config::BusinessHoursConfig;

/// Organization business-hours calendar
pub trait BusinessCalendar: Send + Sync {
    /// Whether `at` falls inside business hours
    fn is_open(&self, at: DateTime<Utc>) -> bool;

    /// The next instant at or after `after` that is inside business hours
    fn next_open(&self, after: DateTime<Utc>) -> DateTime<Utc>;
}

/// Weekday/hour-window calendar in a configured timezone
pub struct WeekdayCalendar {
    tz: Tz,
    open_hour: u32,
    close_hour: u32,
    work_days: Vec<u8>,
}

impl WeekdayCalendar {
    pub fn new(config: &BusinessHoursConfig) -> Self {
        Self {
            tz: config.timezone.parse().unwrap_or(chrono_tz::UTC),
            open_hour: config.open_hour,
            close_hour: config.close_hour,
            work_days: config.work_days.clone(),
        }
    }

    fn is_work_day(&self, day: u8) -> bool {
        self.work_days.contains(&day)
    }
}

impl BusinessCalendar for WeekdayCalendar {
    fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);
        let day = local.weekday().num_days_from_monday() as u8;
        self.is_work_day(day) && local.hour() >= self.open_hour && local.hour() < self.close_hour
    }

    fn next_open(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open(after) {
            return after;
        }

        let local = after.with_timezone(&self.tz);
        // Walk forward day by day to the next opening instant. Bounded by a
        // week plus one day even for degenerate work_days configs.
        for offset in 0..8 {
            let date = local.date_naive() + Duration::days(offset);
            let day = date.weekday().num_days_from_monday() as u8;
            if !self.is_work_day(day) {
                continue;
            }
            let opening = match self
                .tz
                .from_local_datetime(&date.and_hms_opt(self.open_hour, 0, 0).unwrap_or_default())
                .earliest()
            {
                Some(t) => t.with_timezone(&Utc),
                None => continue,
            };
            if opening > after {
                return opening;
            }
        }

        // No work days configured: retry in a day
        after + Duration::days(1)
    }
}
