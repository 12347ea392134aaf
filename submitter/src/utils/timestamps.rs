//! Timestamp formatting for generated file names.

use chrono::{DateTime, Utc};

/// Represents a timestamp.
pub type Timestamp = DateTime<Utc>;

/// Format of timestamps in file names, e.g. `2024_05_01@13_45_12_123456`.
pub const TIME_FORMAT: &str = "%Y_%m_%d@%H_%M_%S_%6f";

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp for use in file names.
#[must_use]
pub fn file_timestamp(ts: &Timestamp) -> String {
    ts.format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_timestamp() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::microseconds(89);
        assert_eq!(file_timestamp(&ts), "2021_03_04@05_06_07_000089");
    }

    #[test]
    fn test_now_has_no_separators() {
        let ts = file_timestamp(&now_utc());
        assert!(!ts.contains(' '));
        assert!(!ts.contains(':'));
    }
}
