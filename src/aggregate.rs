use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::{ActivityDataPoint, EmotionDistribution, LearningSession, TopicProgress};

pub const TOP_TOPICS: usize = 5;

/// Longest activity window, roughly ten years.
pub const MAX_ACTIVITY_DAYS: u32 = 3660;

/// `days` before `date`, saturating at the earliest representable date.
pub fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_sub_signed(Duration::days(days)).unwrap_or(NaiveDate::MIN)
}

pub fn is_valid_score(score: i32) -> bool {
    (0..=100).contains(&score)
}

/// Mean of the scores in [0, 100], rounded to one decimal. Nulls and
/// out-of-range values are skipped; no valid scores gives 0.
pub fn average_score(scores: impl IntoIterator<Item = Option<i32>>) -> f64 {
    let (sum, count) = scores
        .into_iter()
        .flatten()
        .filter(|score| is_valid_score(*score))
        .fold((0i64, 0u32), |(sum, count), score| (sum + score as i64, count + 1));

    if count == 0 {
        return 0.0;
    }
    let mean = sum as f64 / count as f64;
    (mean * 10.0).round() / 10.0
}

/// Rounds halves towards positive infinity.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

pub fn percentage_change(current: i64, previous: i64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    round_half_up((current - previous) as f64 / previous as f64 * 100.0)
}

/// One entry per calendar day from `days - 1` days ago to `today`, oldest
/// first, zero-filled where nothing happened. `days` is capped at
/// [`MAX_ACTIVITY_DAYS`]; days before the earliest representable date are
/// left out.
pub fn activity_series(
    sessions: &[LearningSession],
    days: u32,
    today: NaiveDate,
) -> Vec<ActivityDataPoint> {
    let mut by_day: HashMap<NaiveDate, (usize, i64, Vec<Option<i32>>)> = HashMap::new();

    for session in sessions {
        let entry = by_day.entry(session.started_on()).or_default();
        entry.0 += 1;
        entry.1 += session.minutes();
        entry.2.push(session.quiz_score);
    }

    (0..days.min(MAX_ACTIVITY_DAYS) as i64)
        .rev()
        .filter_map(|offset| today.checked_sub_signed(Duration::days(offset)))
        .map(|date| match by_day.remove(&date) {
            Some((sessions, minutes, scores)) => ActivityDataPoint {
                date,
                sessions,
                minutes,
                average_score: average_score(scores),
            },
            None => ActivityDataPoint {
                date,
                sessions: 0,
                minutes: 0,
                average_score: 0.0,
            },
        })
        .collect()
}

/// Per-topic totals, most recently practiced first, at most `limit` topics.
pub fn topic_progress(sessions: &[LearningSession], limit: usize) -> Vec<TopicProgress> {
    struct Acc {
        sessions: usize,
        minutes: i64,
        scores: Vec<Option<i32>>,
        last_practiced: chrono::DateTime<chrono::Utc>,
    }

    let mut map: HashMap<&str, Acc> = HashMap::new();

    for session in sessions {
        let topic = session.topic_name.trim();
        if topic.is_empty() {
            continue;
        }
        let entry = map.entry(topic).or_insert_with(|| Acc {
            sessions: 0,
            minutes: 0,
            scores: Vec::new(),
            last_practiced: session.started_at,
        });
        entry.sessions += 1;
        entry.minutes += session.minutes();
        entry.scores.push(session.quiz_score);
        if session.started_at > entry.last_practiced {
            entry.last_practiced = session.started_at;
        }
    }

    let mut topics: Vec<TopicProgress> = map
        .into_iter()
        .map(|(name, acc)| TopicProgress {
            name: name.to_string(),
            sessions: acc.sessions,
            total_minutes: acc.minutes,
            average_score: average_score(acc.scores),
            last_practiced: acc.last_practiced,
        })
        .collect();

    topics.sort_by(|a, b| {
        b.last_practiced
            .cmp(&a.last_practiced)
            .then_with(|| a.name.cmp(&b.name))
    });
    topics.truncate(limit);
    topics
}

/// Counts every detected label; sessions without a detected list fall back
/// to their primary emotion.
pub fn emotion_distribution(sessions: &[LearningSession]) -> Vec<EmotionDistribution> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for session in sessions {
        if session.emotions_detected.is_empty() {
            if let Some(primary) = normalize_label(session.primary_emotion.as_deref()) {
                *counts.entry(primary).or_insert(0) += 1;
            }
            continue;
        }
        for label in &session.emotions_detected {
            if let Some(label) = normalize_label(Some(label)) {
                *counts.entry(label).or_insert(0) += 1;
            }
        }
    }

    let total: usize = counts.values().sum();
    let mut distribution: Vec<EmotionDistribution> = counts
        .into_iter()
        .map(|(emotion, count)| EmotionDistribution {
            emotion,
            count,
            percentage: if total == 0 {
                0
            } else {
                round_half_up(count as f64 / total as f64 * 100.0)
            },
        })
        .collect();

    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emotion.cmp(&b.emotion)));
    distribution
}

/// Most frequent label; ties go to the label seen first.
pub fn primary_emotion(labels: &[String]) -> Option<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for label in labels {
        let Some(label) = normalize_label(Some(label)) else {
            continue;
        };
        let count = counts.entry(label.clone()).or_insert(0);
        if *count == 0 {
            order.push(label);
        }
        *count += 1;
    }

    let mut best: Option<(String, usize)> = None;
    for label in order {
        let count = counts[&label];
        if best.as_ref().map_or(true, |(_, top)| count > *top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

fn normalize_label(label: Option<&str>) -> Option<String> {
    let label = label?.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_lowercase())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    pub(crate) fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 12).unwrap()
    }

    pub(crate) fn at(days_ago: i64, hour: u32) -> DateTime<Utc> {
        let date = today() - Duration::days(days_ago);
        Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
    }

    pub(crate) fn session(
        topic: &str,
        days_ago: i64,
        minutes: i32,
        score: Option<i32>,
    ) -> LearningSession {
        let started_at = at(days_ago, 10);
        LearningSession {
            id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            topic_name: topic.to_string(),
            started_at,
            ended_at: Some(started_at + Duration::minutes(minutes as i64)),
            duration_minutes: Some(minutes),
            quiz_score: score,
            emotions_detected: Vec::new(),
            primary_emotion: None,
            message_count: 4,
        }
    }

    #[test]
    fn average_skips_null_and_out_of_range() {
        assert_eq!(average_score(vec![Some(90), None, Some(150), Some(40)]), 65.0);
        assert_eq!(average_score(vec![Some(-5), Some(101)]), 0.0);
        assert_eq!(average_score(Vec::new()), 0.0);
        assert_eq!(average_score(vec![Some(0), Some(100)]), 50.0);
    }

    #[test]
    fn percentage_change_cases() {
        assert_eq!(percentage_change(10, 0), 100);
        assert_eq!(percentage_change(0, 0), 0);
        assert_eq!(percentage_change(15, 10), 50);
        assert_eq!(percentage_change(5, 10), -50);
        assert_eq!(percentage_change(2, 3), -33);
    }

    #[test]
    fn activity_series_has_one_entry_per_day() {
        let sessions = vec![
            session("Arrays", 0, 20, Some(80)),
            session("Arrays", 0, 10, None),
            session("Graphs", 4, 30, Some(60)),
        ];

        for days in [1u32, 7, 30, 90] {
            let series = activity_series(&sessions, days, today());
            assert_eq!(series.len(), days as usize);
            for pair in series.windows(2) {
                assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
            }
            assert_eq!(series.last().unwrap().date, today());
        }

        let week = activity_series(&sessions, 7, today());
        assert_eq!(week[6].sessions, 2);
        assert_eq!(week[6].minutes, 30);
        assert_eq!(week[6].average_score, 80.0);
        assert_eq!(week[2].sessions, 1);
        assert_eq!(week[5].sessions, 0);
        assert_eq!(week[5].average_score, 0.0);
    }

    #[test]
    fn activity_series_caps_oversized_windows() {
        let series = activity_series(&[], 200_000_000, today());
        assert_eq!(series.len(), MAX_ACTIVITY_DAYS as usize);
        assert_eq!(series.last().unwrap().date, today());
    }

    #[test]
    fn activity_series_stops_at_earliest_date() {
        let earliest = NaiveDate::MIN + Duration::days(2);
        let series = activity_series(&[], 7, earliest);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].date, NaiveDate::MIN);
        assert_eq!(days_before(earliest, 10), NaiveDate::MIN);
    }

    #[test]
    fn activity_series_zero_days_is_empty() {
        assert!(activity_series(&[], 0, today()).is_empty());
    }

    #[test]
    fn topics_sum_and_sort_by_recency() {
        let sessions = vec![
            session("Arrays", 5, 20, Some(90)),
            session("Arrays", 1, 15, None),
            session("Arrays", 3, 10, Some(150)),
            session("Arrays", 2, 5, Some(40)),
            session("Graphs", 0, 30, Some(70)),
            session("Trees", 8, 25, None),
        ];

        let topics = topic_progress(&sessions, TOP_TOPICS);
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0].name, "Graphs");
        assert_eq!(topics[1].name, "Arrays");
        assert_eq!(topics[1].sessions, 4);
        assert_eq!(topics[1].total_minutes, 50);
        assert_eq!(topics[1].average_score, 65.0);
        assert_eq!(topics[1].last_practiced, at(1, 10));
        assert_eq!(topics[2].name, "Trees");
        assert_eq!(topics[2].average_score, 0.0);
    }

    #[test]
    fn topics_truncate_to_limit() {
        let sessions: Vec<_> = (0..8)
            .map(|i| session(&format!("Topic {i}"), i, 10, None))
            .collect();
        let topics = topic_progress(&sessions, TOP_TOPICS);
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0].name, "Topic 0");
        assert_eq!(topics[4].name, "Topic 4");
    }

    #[test]
    fn emotions_count_labels_and_fall_back_to_primary() {
        let mut a = session("Arrays", 0, 10, None);
        a.emotions_detected = vec!["Confused".into(), "neutral".into(), "confused".into()];
        let mut b = session("Arrays", 1, 10, None);
        b.primary_emotion = Some("confident".into());
        let c = session("Arrays", 2, 10, None);

        let distribution = emotion_distribution(&[a, b, c]);
        assert_eq!(distribution.len(), 3);
        assert_eq!(distribution[0].emotion, "confused");
        assert_eq!(distribution[0].count, 2);
        assert_eq!(distribution[0].percentage, 50);
        assert_eq!(distribution[1].emotion, "confident");
        assert_eq!(distribution[1].percentage, 25);
        assert_eq!(distribution.iter().map(|e| e.count).sum::<usize>(), 4);
    }

    #[test]
    fn emotions_empty_without_labels() {
        assert!(emotion_distribution(&[session("Arrays", 0, 10, None)]).is_empty());
    }

    #[test]
    fn primary_emotion_prefers_most_frequent_then_first_seen() {
        let labels: Vec<String> = ["neutral", "frustrated", "frustrated", "neutral", "confused"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(primary_emotion(&labels).as_deref(), Some("neutral"));

        let labels = vec!["confused".to_string(), " ".to_string(), "Confused".to_string()];
        assert_eq!(primary_emotion(&labels).as_deref(), Some("confused"));
        assert_eq!(primary_emotion(&[]), None);
    }
}
