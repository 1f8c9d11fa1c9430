use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};

/// Consecutive days with at least one session, ending today or yesterday.
///
/// Returns 0 when neither today nor yesterday has a session. Dates after
/// `today` are ignored.
pub fn current_streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = dates.into_iter().filter(|date| *date <= today).collect();
    let yesterday = today - Duration::days(1);

    let anchor = if days.contains(&today) {
        today
    } else if days.contains(&yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0u32;
    for date in days.iter().rev() {
        let expected = anchor - Duration::days(streak as i64);
        if *date == expected {
            streak += 1;
        } else {
            break;
        }
    }

    streak
}
