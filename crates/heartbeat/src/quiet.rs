//! Quiet-hours window math, in minutes-of-day.

/// Parse `"HH:MM"` into minutes since midnight.
pub fn parse_hhmm(text: &str) -> Option<u16> {
    let (hours, minutes) = text.trim().split_once(':')?;
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Whether `now` falls inside the `[start, end)` quiet window.
///
/// When `start > end` the window wraps past midnight, so "inside" means
/// `now >= start || now < end`.  A zero-length window (`start == end`) is
/// never quiet.
pub fn in_quiet_hours(now: u16, start: u16, end: u16) -> bool {
    if start == end {
        false
    } else if start > end {
        now >= start || now < end
    } else {
        now >= start && now < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_times() {
        assert_eq!(parse_hhmm("22:00"), Some(22 * 60));
        assert_eq!(parse_hhmm("06:30"), Some(6 * 60 + 30));
        assert_eq!(parse_hhmm(" 0:05 "), Some(5));
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("10:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
        assert_eq!(parse_hhmm("1030"), None);
    }

    #[test]
    fn wrapping_window_covers_both_sides_of_midnight() {
        let start = parse_hhmm("22:00").unwrap();
        let end = parse_hhmm("06:00").unwrap();
        assert!(in_quiet_hours(parse_hhmm("23:30").unwrap(), start, end));
        assert!(in_quiet_hours(parse_hhmm("02:00").unwrap(), start, end));
        assert!(!in_quiet_hours(parse_hhmm("10:00").unwrap(), start, end));
    }

    #[test]
    fn same_day_window() {
        let start = parse_hhmm("08:00").unwrap();
        let end = parse_hhmm("20:00").unwrap();
        assert!(in_quiet_hours(parse_hhmm("09:00").unwrap(), start, end));
        assert!(!in_quiet_hours(parse_hhmm("21:00").unwrap(), start, end));
    }

    #[test]
    fn boundaries_are_half_open() {
        let start = parse_hhmm("22:00").unwrap();
        let end = parse_hhmm("06:00").unwrap();
        assert!(in_quiet_hours(start, start, end), "start is inside");
        assert!(!in_quiet_hours(end, start, end), "end is outside");
    }

    #[test]
    fn empty_window_is_never_quiet() {
        assert!(!in_quiet_hours(600, 600, 600));
    }
}
