//! Working-day calendar.
//!
//! Counts business days between two instants, skipping weekends and the
//! days listed in a holiday definition. All arithmetic is done on UTC
//! calendar dates so results do not shift around midnight.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::Result;

/// Holiday definition file, in either supported layout.
#[derive(Deserialize)]
#[serde(untagged)]
enum HolidayFile {
    /// `{"2025-01-01": "New Year's Day"}`
    Labelled(BTreeMap<String, String>),
    /// `{"2025": ["2025-01-01", "2025-03-21"]}`
    ByYear(HashMap<String, Vec<String>>),
}

/// A set of holidays keyed by date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    holidays: BTreeMap<NaiveDate, String>,
}

impl HolidayCalendar {
    /// An empty calendar: every weekday is a working day.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a calendar from `(date, label)` pairs.
    #[must_use]
    pub fn from_dates<I, S>(dates: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, S)>,
        S: Into<String>,
    {
        Self {
            holidays: dates
                .into_iter()
                .map(|(date, label)| (date, label.into()))
                .collect(),
        }
    }

    /// Parse a holiday definition.
    ///
    /// Dates that cannot be parsed are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not one of the two JSON layouts.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: HolidayFile = serde_json::from_str(json)?;
        let entries: Vec<(String, String)> = match file {
            HolidayFile::Labelled(map) => map.into_iter().collect(),
            HolidayFile::ByYear(years) => years
                .into_values()
                .flatten()
                .map(|date| (date, "Holiday".to_string()))
                .collect(),
        };

        let mut holidays = BTreeMap::new();
        for (raw, label) in entries {
            match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
                Ok(date) => {
                    holidays.insert(date, label);
                }
                Err(e) => warn!(date = %raw, error = %e, "Skipping unparsable holiday"),
            }
        }

        debug!(count = holidays.len(), "Parsed holiday calendar");
        Ok(Self { holidays })
    }

    /// Load a holiday file. A missing file yields an empty calendar.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => {
                let calendar = Self::from_json(&json)?;
                info!(path = %path.display(), holidays = calendar.len(), "Loaded holidays");
                Ok(calendar)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Holiday file not found, using weekends only");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of holidays defined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    /// Whether no holidays are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    /// Label of the holiday on `date`, if any.
    #[must_use]
    pub fn holiday(&self, date: NaiveDate) -> Option<&str> {
        self.holidays.get(&date).map(String::as_str)
    }

    /// Whether `date` is a listed holiday.
    #[must_use]
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }

    /// Whether `date` is Monday to Friday and not a holiday.
    #[must_use]
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Working days in `(start, end]`. Zero when `end <= start`.
    #[must_use]
    pub fn working_days(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        let mut count = 0;
        let mut day = start;
        while day < end {
            let Some(next) = day.succ_opt() else {
                break;
            };
            day = next;
            if self.is_working_day(day) {
                count += 1;
            }
        }
        count
    }

    /// The date `n` working days after `start`.
    #[must_use]
    pub fn add_working_days(&self, start: NaiveDate, n: u32) -> NaiveDate {
        let mut day = start;
        let mut remaining = n;
        while remaining > 0 {
            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => break,
            }
            if self.is_working_day(day) {
                remaining -= 1;
            }
        }
        day
    }
}

/// Working days between two instants, compared as UTC calendar dates.
#[must_use]
pub fn working_days_between(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    holidays: &HolidayCalendar,
) -> u32 {
    if end <= start {
        return 0;
    }
    holidays.working_days(start.date_naive(), end.date_naive())
}

/// Shared, reloadable holiday calendar.
///
/// Readers take an `Arc` snapshot so a reload never changes the calendar
/// under a running computation.
#[derive(Debug, Clone, Default)]
pub struct CalendarHandle {
    inner: Arc<RwLock<Arc<HolidayCalendar>>>,
}

impl CalendarHandle {
    /// Wrap a calendar.
    #[must_use]
    pub fn new(calendar: HolidayCalendar) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(calendar))),
        }
    }

    /// Current calendar.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HolidayCalendar> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the calendar.
    pub fn replace(&self, calendar: HolidayCalendar) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(calendar);
    }

    /// Reload from a holiday file.
    ///
    /// On error the previous calendar stays in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn reload(&self, path: &Path) -> Result<usize> {
        let calendar = HolidayCalendar::load(path).await?;
        let count = calendar.len();
        self.replace(calendar);
        Ok(count)
    }
}
