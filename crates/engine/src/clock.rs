use chrono::Local;

use numcast_common::types::DATE_FORMAT;

/// Source of "today" for matching date keys.
pub trait Clock: Send + Sync {
    /// Today's date as `YYYY-MM-DD`.
    fn today(&self) -> String;
}

/// The process-local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> String {
        Local::now().format(DATE_FORMAT).to_string()
    }
}

/// A clock pinned to one date.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn today(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_clock_format() {
        let today = LocalClock.today();
        assert_eq!(today.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&today, DATE_FORMAT).is_ok());
    }
}
