use chrono::{Duration, NaiveDate, Utc};

/// All attendance dates are calendar days in Indian Standard Time (+05:30).
const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

pub fn ist_today() -> NaiveDate {
    (Utc::now() + Duration::seconds(IST_OFFSET_SECS)).date_naive()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
