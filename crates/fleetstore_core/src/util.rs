//! Small helpers shared by the models and repositories.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Length of the generated service id.
pub const SERVICE_ID_LENGTH: usize = 32;

/// Characters replaced by `_` when a name is normalized.
const SEPARATORS: &[char] = &[
    ' ', '-', ',', ':', ';', '(', ')', '[', ']', '{', '}', '\'', '"', '/', '\\', '|', '<', '>', '=',
    '+', '*', '&', '^', '%', '$', '#', '@', '!', '`', '~', '?',
];

/// Returns the current UTC time as an RFC 3339 string with nanoseconds.
#[must_use]
pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

/// Formats a timestamp the way records store it.
#[must_use]
pub fn format_rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a record timestamp.
#[must_use]
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Generates a record id.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates the random alphanumeric service id.
#[must_use]
pub fn generate_service_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SERVICE_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Trims `value` and replaces separators with `_`.
#[must_use]
pub fn normalize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| if SEPARATORS.contains(&c) { '_' } else { c })
        .collect()
}

/// Normalized and uppercased; the id of a role or claim.
#[must_use]
pub fn normalize_upper(value: &str) -> String {
    normalize(value).to_uppercase()
}

/// Case-insensitive membership test.
#[must_use]
pub fn contains_ignore_case(values: &[String], needle: &str) -> bool {
    values.iter().any(|v| v.eq_ignore_ascii_case(needle))
}
