use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};

use crate::descriptor::Millis;

/// Converts a Unix timestamp in milliseconds to a date-time in the given UTC offset.
///
/// Returns `None` if the timestamp is out of range.
pub fn unix_time_millis_to_datetime(millis: Millis, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    offset.timestamp_millis_opt(millis).single()
}

/// Returns the calendar day of the given Unix timestamp in milliseconds.
pub fn calendar_day(millis: Millis, offset: FixedOffset) -> Option<NaiveDate> {
    unix_time_millis_to_datetime(millis, offset).map(|dt| dt.date_naive())
}

/// Builds a `FixedOffset` from a number of minutes east of UTC, falling back to UTC if invalid.
pub fn utc_offset(minutes: i32) -> FixedOffset {
    minutes.checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Returns the text shown in the typing row for the given list of typing users.
pub fn typing_notice_text(typing_users: &[String]) -> String {
    match typing_users {
        [] => String::new(),
        [user] => format!("{user} is typing "),
        [user1, user2] => format!("{user1} and {user2} are typing "),
        [user1, user2, other] => format!("{user1}, {user2}, and {other} are typing "),
        [user1, user2, others @ ..] => format!(
            "{user1}, {user2}, and {} others are typing ",
            others.len()
        ),
    }
}
