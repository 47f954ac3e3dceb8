//! Calendar arithmetic for to-date windows and partition periods.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// To-date windows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WindowKind {
    Daily,
    #[serde(rename = "MTD")]
    MonthToDate,
    #[serde(rename = "QTD")]
    QuarterToDate,
    #[serde(rename = "YTD")]
    YearToDate,
    Monthly,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "Daily"),
            Self::MonthToDate => write!(f, "MTD"),
            Self::QuarterToDate => write!(f, "QTD"),
            Self::YearToDate => write!(f, "YTD"),
            Self::Monthly => write!(f, "Monthly"),
        }
    }
}

/// Inclusive date range `[start, end]` with a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub kind: WindowKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl TimeWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let first_month = 3 * (quarter_of(date) - 1) + 1;
    NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date)
}

pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

/// Daily, MTD, QTD and YTD windows ending at `latest`.
pub fn to_date_windows(latest: NaiveDate) -> Vec<TimeWindow> {
    vec![
        TimeWindow {
            kind: WindowKind::Daily,
            start: latest,
            end: latest,
            label: latest.format("%Y-%m-%d").to_string(),
        },
        TimeWindow {
            kind: WindowKind::MonthToDate,
            start: month_start(latest),
            end: latest,
            label: latest.format("%Y-%m").to_string(),
        },
        TimeWindow {
            kind: WindowKind::QuarterToDate,
            start: quarter_start(latest),
            end: latest,
            label: format!("{}-Q{}", latest.year(), quarter_of(latest)),
        },
        TimeWindow {
            kind: WindowKind::YearToDate,
            start: year_start(latest),
            end: latest,
            label: latest.year().to_string(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Partition periods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl fmt::Display for PartitionFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

/// A calendar bucket. Ordered chronologically by its first day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub label: String,
}

impl PartitionFrequency {
    pub fn period_of(&self, date: NaiveDate) -> Period {
        match self {
            Self::Daily => Period {
                start: date,
                label: date.format("%Y-%m-%d").to_string(),
            },
            Self::Weekly => {
                // Weeks end on Sunday
                let start = date - Days::new(date.weekday().num_days_from_monday() as u64);
                let end = start + Days::new(6);
                Period {
                    start,
                    label: format!("{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
                }
            }
            Self::Monthly => Period {
                start: month_start(date),
                label: date.format("%Y-%m").to_string(),
            },
            Self::Quarterly => Period {
                start: quarter_start(date),
                label: format!("{}Q{}", date.year(), quarter_of(date)),
            },
            Self::Yearly => Period {
                start: year_start(date),
                label: date.year().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn quarter_boundaries() {
        assert_eq!(quarter_start(d("2024-03-15")), d("2024-01-01"));
        assert_eq!(quarter_start(d("2024-05-15")), d("2024-04-01"));
        assert_eq!(quarter_start(d("2024-12-31")), d("2024-10-01"));
        assert_eq!(quarter_start(d("2024-07-01")), d("2024-07-01"));
    }

    #[test]
    fn to_date_windows_for_latest() {
        let windows = to_date_windows(d("2024-05-15"));
        let starts: Vec<_> = windows.iter().map(|w| (w.kind, w.start, w.label.as_str())).collect();
        assert_eq!(
            starts,
            vec![
                (WindowKind::Daily, d("2024-05-15"), "2024-05-15"),
                (WindowKind::MonthToDate, d("2024-05-01"), "2024-05"),
                (WindowKind::QuarterToDate, d("2024-04-01"), "2024-Q2"),
                (WindowKind::YearToDate, d("2024-01-01"), "2024"),
            ]
        );
        assert!(windows.iter().all(|w| w.end == d("2024-05-15")));
        assert!(windows[2].contains(d("2024-04-01")));
        assert!(!windows[2].contains(d("2024-03-31")));
    }

    #[test]
    fn period_labels() {
        let date = d("2024-03-13"); // Wednesday
        assert_eq!(PartitionFrequency::Daily.period_of(date).label, "2024-03-13");
        assert_eq!(PartitionFrequency::Weekly.period_of(date).label, "2024-03-11/2024-03-17");
        assert_eq!(PartitionFrequency::Monthly.period_of(date).label, "2024-03");
        assert_eq!(PartitionFrequency::Quarterly.period_of(date).label, "2024Q1");
        assert_eq!(PartitionFrequency::Yearly.period_of(date).label, "2024");
    }

    #[test]
    fn sunday_closes_its_week() {
        let sunday = PartitionFrequency::Weekly.period_of(d("2024-03-17"));
        let monday = PartitionFrequency::Weekly.period_of(d("2024-03-18"));
        assert_eq!(sunday.start, d("2024-03-11"));
        assert_eq!(monday.start, d("2024-03-18"));
        assert!(sunday < monday);
    }
}
