use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use cronloop_core::Cadence;

/// Weekly ticks land on this weekday at 00:00 UTC (crontab `@weekly`).
pub const WEEKLY_BOUNDARY_DAY: chrono::Weekday = chrono::Weekday::Sun;

/// Compute the first boundary of `cadence` strictly *after* `now`.
///
/// Every boundary is computed in UTC, has zero seconds and sits on the
/// cadence's grid. A `now` that is exactly on a boundary yields the following
/// one, never `now` itself.
pub fn next_boundary(cadence: Cadence, now: DateTime<Utc>) -> DateTime<Utc> {
    let minute = floor_to_minute(now);
    match cadence {
        Cadence::EveryMinute => minute + Duration::minutes(1),

        Cadence::EveryTenMinutes => {
            let past_grid = i64::from(minute.minute() % 10);
            minute - Duration::minutes(past_grid) + Duration::minutes(10)
        }

        Cadence::Hourly => minute - Duration::minutes(i64::from(minute.minute())) + Duration::hours(1),

        Cadence::Daily => midnight(now.date_naive()) + Duration::days(1),

        Cadence::Weekly => {
            let today = now.date_naive();
            let since = (7 + today.weekday().num_days_from_sunday()
                - WEEKLY_BOUNDARY_DAY.num_days_from_sunday())
                % 7;
            // Today's boundary (since == 0) is at or before `now`, so push a full week.
            midnight(today) + Duration::days(i64::from(7 - since))
        }

        Cadence::Monthly => midnight(first_of_next_month(now.date_naive())),
    }
}

fn floor_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::seconds(i64::from(t.second())) - Duration::nanoseconds(i64::from(t.nanosecond()))
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn first_of_next_month(day: NaiveDate) -> NaiveDate {
    let first = day - Duration::days(i64::from(day.day0()));
    // Day 1 + 32 always lands inside the following month.
    let next = first + Duration::days(32);
    next - Duration::days(i64::from(next.day0()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn hourly_rounds_up_to_next_hour() {
        assert_eq!(
            next_boundary(Cadence::Hourly, at(2024, 5, 14, 10, 15, 0)),
            at(2024, 5, 14, 11, 0, 0)
        );
    }

    #[test]
    fn boundary_is_exclusive_of_now() {
        assert_eq!(
            next_boundary(Cadence::Hourly, at(2024, 5, 14, 10, 0, 0)),
            at(2024, 5, 14, 11, 0, 0)
        );
        assert_eq!(
            next_boundary(Cadence::EveryMinute, at(2024, 5, 14, 10, 7, 0)),
            at(2024, 5, 14, 10, 8, 0)
        );
        assert_eq!(
            next_boundary(Cadence::Daily, at(2024, 5, 14, 0, 0, 0)),
            at(2024, 5, 15, 0, 0, 0)
        );
    }

    #[test]
    fn every_minute_drops_seconds_and_nanos() {
        let now = at(2024, 5, 14, 10, 7, 59) + Duration::milliseconds(999);
        assert_eq!(
            next_boundary(Cadence::EveryMinute, now),
            at(2024, 5, 14, 10, 8, 0)
        );
    }

    #[test]
    fn every_ten_minutes_snaps_to_grid() {
        assert_eq!(
            next_boundary(Cadence::EveryTenMinutes, at(2024, 5, 14, 10, 7, 30)),
            at(2024, 5, 14, 10, 10, 0)
        );
        assert_eq!(
            next_boundary(Cadence::EveryTenMinutes, at(2024, 5, 14, 10, 50, 0)),
            at(2024, 5, 14, 11, 0, 0)
        );
        assert_eq!(
            next_boundary(Cadence::EveryTenMinutes, at(2024, 5, 14, 23, 55, 1)),
            at(2024, 5, 15, 0, 0, 0)
        );
    }

    #[test]
    fn daily_crosses_month_and_year() {
        assert_eq!(
            next_boundary(Cadence::Daily, at(2024, 12, 31, 18, 0, 0)),
            at(2025, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn weekly_lands_on_sunday_midnight() {
        // 2024-05-14 is a Tuesday.
        let next = next_boundary(Cadence::Weekly, at(2024, 5, 14, 9, 0, 0));
        assert_eq!(next, at(2024, 5, 19, 0, 0, 0));
        assert_eq!(next.weekday(), Weekday::Sun);

        // Saturday night rolls over to the next day.
        assert_eq!(
            next_boundary(Cadence::Weekly, at(2024, 5, 18, 23, 59, 59)),
            at(2024, 5, 19, 0, 0, 0)
        );
        // Sunday itself (even exactly at midnight) waits a full week.
        assert_eq!(
            next_boundary(Cadence::Weekly, at(2024, 5, 19, 0, 0, 0)),
            at(2024, 5, 26, 0, 0, 0)
        );
    }

    #[test]
    fn monthly_lands_on_first_of_next_month() {
        assert_eq!(
            next_boundary(Cadence::Monthly, at(2024, 1, 31, 12, 0, 0)),
            at(2024, 2, 1, 0, 0, 0)
        );
        assert_eq!(
            next_boundary(Cadence::Monthly, at(2024, 2, 1, 0, 0, 0)),
            at(2024, 3, 1, 0, 0, 0)
        );
        assert_eq!(
            next_boundary(Cadence::Monthly, at(2024, 12, 15, 8, 30, 0)),
            at(2025, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn every_boundary_is_later_and_on_grid() {
        let mut now = at(2023, 12, 30, 21, 3, 17);
        // Sweep ~3 days in uneven steps so minute/hour/day rollovers are covered.
        for _ in 0..600 {
            for cadence in Cadence::ALL {
                let next = next_boundary(cadence, now);
                assert!(next > now, "{cadence} at {now} gave {next}");
                assert_eq!(next.second(), 0);
                assert_eq!(next.nanosecond(), 0);
                match cadence {
                    Cadence::EveryMinute => assert!(next - now <= Duration::minutes(1)),
                    Cadence::EveryTenMinutes => assert_eq!(next.minute() % 10, 0),
                    Cadence::Hourly => assert_eq!(next.minute(), 0),
                    Cadence::Daily => assert_eq!((next.hour(), next.minute()), (0, 0)),
                    Cadence::Weekly => {
                        assert_eq!(next.weekday(), WEEKLY_BOUNDARY_DAY);
                        assert_eq!((next.hour(), next.minute()), (0, 0));
                    }
                    Cadence::Monthly => {
                        assert_eq!(next.day(), 1);
                        assert_eq!((next.hour(), next.minute()), (0, 0));
                    }
                }
            }
            now += Duration::seconds(437);
        }
    }
}
