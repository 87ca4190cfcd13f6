pub mod context;
pub mod entitlement;
pub mod pairing;
pub mod usage;

use chrono::{DateTime, Duration, Months, Utc};

/// Calendar-month arithmetic that clamps to the end of shorter months.
pub fn add_months(at: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    at.checked_add_months(Months::new(months))
        .unwrap_or_else(|| at + Duration::days(30 * i64::from(months)))
}
