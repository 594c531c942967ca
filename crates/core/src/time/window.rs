use anyhow::{ensure, Context};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// A trailing look-back span, anchored to the latest date present in the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub name: String,
    pub days: i64,
}

impl Window {
    pub fn new(name: impl Into<String>, days: i64) -> Self {
        Self {
            name: name.into(),
            days,
        }
    }

    pub fn defaults() -> Vec<Window> {
        vec![
            Window::new("week", 7),
            Window::new("month", 30),
            Window::new("quarter", 90),
        ]
    }

    /// First date (inclusive) that falls inside the window. A span reaching past the
    /// calendar's start covers all data.
    pub fn start(&self, latest: NaiveDate) -> NaiveDate {
        Duration::try_days(self.days)
            .and_then(|span| latest.checked_sub_signed(span))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn contains(&self, latest: NaiveDate, date: NaiveDate) -> bool {
        date >= self.start(latest) && date <= latest
    }
}

/// Longest accepted window, in days (100 years).
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Parses `name:days[,name:days...]`, e.g. `week:7,month:30`.
pub fn parse_windows(s: &str) -> anyhow::Result<Vec<Window>> {
    let mut out: Vec<Window> = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (name, days) = part
            .split_once(':')
            .with_context(|| format!("window {part:?} must look like name:days"))?;
        let name = name.trim();
        ensure!(!name.is_empty(), "window name must be non-empty in {part:?}");

        let days: i64 = days
            .trim()
            .parse()
            .with_context(|| format!("window {name:?} has a non-numeric day count"))?;
        ensure!(
            (1..=MAX_WINDOW_DAYS).contains(&days),
            "window {name:?} must span 1..={MAX_WINDOW_DAYS} days (got {days})"
        );
        ensure!(
            out.iter().all(|w| w.name != name),
            "duplicate window name: {name}"
        );

        out.push(Window::new(name, days));
    }

    ensure!(!out.is_empty(), "at least one window is required");
    Ok(out)
}
