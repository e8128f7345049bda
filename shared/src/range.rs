//! Tab to time range mapping.
//!
//! Every dated tab covers a whole calendar period in the caller's timezone:
//! the period starts at local midnight and ends one millisecond before the
//! next period starts. Weeks start on Monday.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::TaskFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Today,
    Weekly,
    Monthly,
    Yearly,
    All,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::Today, Tab::Weekly, Tab::Monthly, Tab::Yearly, Tab::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Today => "today",
            Tab::Weekly => "weekly",
            Tab::Monthly => "monthly",
            Tab::Yearly => "yearly",
            Tab::All => "all",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Tab::Today => "/today",
            Tab::Weekly => "/weekly",
            Tab::Monthly => "/monthly",
            Tab::Yearly => "/yearly",
            Tab::All => "/all",
        }
    }

    /// `/` and anything unknown land on today.
    pub fn from_path(path: &str) -> Self {
        path.trim_start_matches('/').parse().unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Today => "Today",
            Tab::Weekly => "This Week",
            Tab::Monthly => "This Month",
            Tab::Yearly => "This Year",
            Tab::All => "All Tasks",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Tab::Today => "Today's To-Dos",
            Tab::Weekly => "Weekly To-Dos",
            Tab::Monthly => "Monthly To-Dos",
            Tab::Yearly => "Yearly Plans",
            Tab::All => "All Tasks",
        }
    }

    /// The due-date window for this tab around `now`, in `now`'s timezone.
    pub fn filter<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TaskFilter {
        let tz = now.timezone();
        let today = now.date_naive();

        let (first, next) = match self {
            Tab::All => return TaskFilter::Everything,
            Tab::Today => (today, today + Duration::days(1)),
            Tab::Weekly => {
                let monday =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(7))
            }
            Tab::Monthly => {
                let first = today.with_day(1).unwrap_or(today);
                (first, first_of_next_month(first))
            }
            Tab::Yearly => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(today);
                (first, next)
            }
        };

        TaskFilter::DueWithin {
            start: start_of_day(&tz, first),
            end: start_of_day(&tz, next) - Duration::milliseconds(1),
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tab `{0}`")]
pub struct UnknownTab(pub String);

impl FromStr for Tab {
    type Err = UnknownTab;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|tab| tab.as_str() == s)
            .ok_or_else(|| UnknownTab(s.to_string()))
    }
}

fn first_of_next_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first + Duration::days(31))
}

/// Local midnight of `date` as a UTC instant. Where midnight falls inside a
/// DST gap the first instant that exists after it is used instead.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    let mut probe = midnight;
    for _ in 0..=24 * 4 {
        if let Some(local) = tz.from_local_datetime(&probe).earliest() {
            return local.with_timezone(&Utc);
        }
        probe += Duration::minutes(15);
    }
    Utc.from_utc_datetime(&midnight)
}
