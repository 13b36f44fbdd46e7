use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::TimeWindow;

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// The calendar day containing `date`
pub fn day_window(date: NaiveDate) -> TimeWindow {
    TimeWindow {
        start: midnight(date),
        end: midnight(date + Days::new(1)),
    }
}

/// The ISO week (Monday to Sunday) containing `date`
pub fn week_window(date: NaiveDate) -> TimeWindow {
    let monday = date - Days::new(u64::from(date.weekday().num_days_from_monday()));

    TimeWindow {
        start: midnight(monday),
        end: midnight(monday + Days::new(7)),
    }
}

/// The calendar month containing `date`
pub fn month_window(date: NaiveDate) -> TimeWindow {
    let first = date - Days::new(u64::from(date.day0()));
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);

    TimeWindow {
        start: midnight(first),
        end: midnight(next),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_starts_on_monday() {
        // 2024-05-15 is a Wednesday
        let window = week_window(date(2024, 5, 15));

        assert_eq!(window.start, midnight(date(2024, 5, 13)));
        assert_eq!(window.end, midnight(date(2024, 5, 20)));

        // Sunday still belongs to the week that started the Monday before
        let sunday = week_window(date(2024, 5, 19));
        assert_eq!(sunday, window);

        let monday = week_window(date(2024, 5, 13));
        assert_eq!(monday, window);
    }

    #[test]
    fn month_spans_whole_month() {
        let window = month_window(date(2024, 2, 17));

        assert_eq!(window.start, midnight(date(2024, 2, 1)));
        assert_eq!(window.end, midnight(date(2024, 3, 1)));

        let december = month_window(date(2024, 12, 31));
        assert_eq!(december.end, midnight(date(2025, 1, 1)));
    }

    #[test]
    fn day_window_is_half_open() {
        let window = day_window(date(2024, 5, 15));

        assert!(window.contains(midnight(date(2024, 5, 15))));
        assert!(!window.contains(midnight(date(2024, 5, 16))));
    }

    #[test]
    fn random_string_has_requested_length() {
        let token = random_string(32);

        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
