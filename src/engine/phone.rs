//! Phone number normalization for gateway destinations.

/// Numbers shorter than this after normalization are not sent.
pub const MIN_DIALABLE_DIGITS: usize = 10;

/// Strip everything but digits and prefix domestic numbers (10 or 11 digits,
/// area code plus subscriber) with `country_code`. Other lengths are returned as
/// bare digits: either already international or invalid.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 | 11 => format!("{country_code}{digits}"),
        _ => digits,
    }
}

pub fn is_dialable(normalized: &str) -> bool {
    normalized.len() >= MIN_DIALABLE_DIGITS
}
