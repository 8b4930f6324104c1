//! Date shifting.

use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;

/// Parses `text` with the first matching format and shifts it by
/// `shift_days`, rendering the result in the same format.
///
/// Four-digit-year formats only accept four-digit years, so "3-5-81" falls
/// through to a two-digit-year format instead of landing in year 81.
///
/// ```
/// use phi_redactor::redaction::dates::shift_date;
///
/// let formats = vec!["%m/%d/%Y".to_string(), "%B %d, %Y".to_string()];
/// assert_eq!(shift_date("03/01/2020", 30, &formats).as_deref(), Some("03/31/2020"));
/// assert_eq!(shift_date("March 5, 2020", 1, &formats).as_deref(), Some("March 06, 2020"));
/// assert_eq!(shift_date("yesterday", 30, &formats), None);
/// ```
pub fn shift_date(text: &str, shift_days: i64, formats: &[String]) -> Option<String> {
    let trimmed = text.trim();
    for format in formats {
        let Ok(date) = NaiveDate::parse_from_str(trimmed, format) else {
            continue;
        };
        if format.contains("%Y") && date.year() < 1000 {
            continue;
        }
        let shifted = date.checked_add_signed(Duration::days(shift_days))?;
        return Some(shifted.format(format).to_string());
    }
    None
}

/// A plausible date of birth for someone between `min_age` and `max_age`
/// years old as of `today`.
pub fn synthetic_birth_date<R: Rng + ?Sized>(
    rng: &mut R,
    today: NaiveDate,
    min_age: i64,
    max_age: i64,
    format: &str,
) -> String {
    let (low, high) = (min_age.min(max_age), min_age.max(max_age));
    let days = rng.random_range(low * 365..=high * 365);
    today
        .checked_sub_signed(Duration::days(days))
        .unwrap_or(today)
        .format(format)
        .to_string()
}
