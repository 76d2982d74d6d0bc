//! Pure field checks.

use crate::model::MAX_PAGER_ADDRESS;

/// Non-empty after trimming.
pub fn is_present(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Length in characters, inclusive bounds.
pub fn length_within(value: &str, min: usize, max: usize) -> bool {
    let len = value.chars().count();
    len >= min && len <= max
}

/// Hexadecimal time slots with strictly increasing digit values.
///
/// `"47E"` passes; `"47H"` (not hex) and `"33"` (not increasing) fail.
pub fn is_valid_time_slot(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let mut previous: Option<u32> = None;
    for ch in value.chars() {
        let Some(digit) = ch.to_digit(16) else {
            return false;
        };
        if previous.is_some_and(|p| digit <= p) {
            return false;
        }
        previous = Some(digit);
    }
    true
}

/// Minimal mailbox check: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

/// Decimal string with at most `integer` digits before and `fraction` after the point.
pub fn has_digits(value: &str, integer: usize, fraction: usize) -> bool {
    let unsigned = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return false;
    }
    int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.chars().all(|c| c.is_ascii_digit())
        && int_part.len() <= integer
        && frac_part.len() <= fraction
}

/// Parse a decimal string for range checks.
pub fn parse_decimal(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Pager addresses are 21 bits wide.
pub fn is_valid_pager_address(value: i64) -> bool {
    (0..=i64::from(MAX_PAGER_ADDRESS)).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_slots() {
        assert!(is_valid_time_slot("47E"));
        assert!(is_valid_time_slot("0123456789ABCDEF"));
        assert!(is_valid_time_slot("acf"));
        assert!(!is_valid_time_slot("47H"));
        assert!(!is_valid_time_slot("33"));
        assert!(!is_valid_time_slot("74"));
        assert!(!is_valid_time_slot(""));
    }

    #[test]
    fn emails() {
        assert!(is_valid_email("op@example.org"));
        assert!(!is_valid_email("op@localhost"));
        assert!(!is_valid_email("@example.org"));
        assert!(!is_valid_email("op example@example.org"));
        assert!(!is_valid_email("op@@example.org"));
    }

    #[test]
    fn decimal_digits() {
        assert!(has_digits("8.12345678", 3, 8));
        assert!(has_digits("-179.5", 3, 8));
        assert!(has_digits("12", 3, 3));
        assert!(!has_digits("1234", 3, 3));
        assert!(!has_digits("1.2345", 3, 3));
        assert!(!has_digits("1,5", 3, 3));
        assert!(!has_digits("-", 3, 3));
    }

    #[test]
    fn pager_address_bounds() {
        assert!(is_valid_pager_address(0));
        assert!(is_valid_pager_address(2_097_151));
        assert!(!is_valid_pager_address(2_097_152));
        assert!(!is_valid_pager_address(-1));
    }
}
