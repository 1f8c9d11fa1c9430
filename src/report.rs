use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{DashboardData, DashboardStats};

fn signed_percent(change: i64) -> String {
    if change > 0 {
        format!("+{change}%")
    } else {
        format!("{change}%")
    }
}

fn write_stats(output: &mut String, stats: &DashboardStats) {
    let _ = writeln!(output, "- Sessions: {}", stats.total_sessions);
    let _ = writeln!(output, "- Minutes learned: {}", stats.total_minutes);
    let _ = writeln!(output, "- Current streak: {} days", stats.current_streak);
    let _ = writeln!(output, "- Average quiz score: {:.1}", stats.average_score);
    let _ = writeln!(
        output,
        "- Week over week: {}, month over month: {}",
        signed_percent(stats.weekly_change),
        signed_percent(stats.monthly_change)
    );
}

/// Short plain-text view for the terminal.
pub fn render_summary(user_id: &str, data: &DashboardData) -> String {
    let mut output = String::new();

    if let Some(error) = &data.error {
        let _ = writeln!(output, "Dashboard for {user_id} unavailable: {error}");
        return output;
    }

    let _ = writeln!(output, "Dashboard for {user_id}");
    write_stats(&mut output, &data.stats);

    if !data.activity.is_empty() {
        let days: Vec<String> = data
            .activity
            .iter()
            .map(|point| format!("{}:{}", point.date.format("%m-%d"), point.sessions))
            .collect();
        let _ = writeln!(output, "- Activity: {}", days.join(" "));
    }

    if let Some(top) = data.topic_progress.first() {
        let _ = writeln!(
            output,
            "- Last practiced: {} ({} sessions, avg {:.1})",
            top.name, top.sessions, top.average_score
        );
    }

    if let Some(mood) = data.emotions.first() {
        let _ = writeln!(output, "- Most common emotion: {} ({}%)", mood.emotion, mood.percentage);
    }

    output
}

pub fn build_report(user_id: &str, generated_on: NaiveDate, data: &DashboardData) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Learning Dashboard");
    let _ = writeln!(output, "Generated for {} on {}", user_id, generated_on);
    let _ = writeln!(output);

    if let Some(error) = &data.error {
        let _ = writeln!(output, "> {error}");
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "## Summary");
    write_stats(&mut output, &data.stats);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Activity");
    if data.activity.is_empty() {
        let _ = writeln!(output, "No activity window requested.");
    } else {
        let _ = writeln!(output, "| Date | Sessions | Minutes | Avg score |");
        let _ = writeln!(output, "| --- | ---: | ---: | ---: |");
        for point in &data.activity {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1} |",
                point.date, point.sessions, point.minutes, point.average_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Topics");
    if data.topic_progress.is_empty() {
        let _ = writeln!(output, "No topics practiced yet.");
    } else {
        for topic in &data.topic_progress {
            let _ = writeln!(
                output,
                "- {}: {} sessions, {} min, avg score {:.1}, last practiced {}",
                topic.name,
                topic.sessions,
                topic.total_minutes,
                topic.average_score,
                topic.last_practiced.format("%Y-%m-%d")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Emotions");
    if data.emotions.is_empty() {
        let _ = writeln!(output, "No emotions detected yet.");
    } else {
        for emotion in &data.emotions {
            let _ = writeln!(
                output,
                "- {}: {} ({}%)",
                emotion.emotion, emotion.count, emotion.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Sessions");
    if data.recent_sessions.is_empty() {
        let _ = writeln!(output, "No completed sessions yet.");
    } else {
        for session in &data.recent_sessions {
            let score = session
                .quiz_score
                .map(|score| format!("score {score}"))
                .unwrap_or_else(|| "no quiz".to_string());
            let _ = writeln!(
                output,
                "- {} on {}: {} min, {}",
                session.topic_name,
                session.started_at.format("%Y-%m-%d %H:%M"),
                session.minutes(),
                score
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{self, tests::{session, today}};
    use crate::models::EmotionDistribution;

    fn sample() -> DashboardData {
        let sessions = vec![
            session("Arrays", 0, 20, Some(90)),
            session("Graphs", 1, 30, None),
        ];
        DashboardData {
            stats: DashboardStats {
                total_sessions: 2,
                total_minutes: 50,
                current_streak: 2,
                average_score: 90.0,
                weekly_change: 100,
                monthly_change: -25,
            },
            activity: aggregate::activity_series(&sessions, 3, today()),
            emotions: vec![EmotionDistribution {
                emotion: "confused".to_string(),
                count: 2,
                percentage: 100,
            }],
            topic_progress: aggregate::topic_progress(&sessions, aggregate::TOP_TOPICS),
            recent_sessions: sessions,
            loading: false,
            error: None,
        }
    }

    #[test]
    fn report_lists_every_section() {
        let report = build_report("user_1", today(), &sample());
        assert!(report.contains("Generated for user_1 on 2026-03-12"));
        assert!(report.contains("- Current streak: 2 days"));
        assert!(report.contains("Week over week: +100%, month over month: -25%"));
        assert!(report.contains("| 2026-03-12 | 1 | 20 | 90.0 |"));
        assert!(report.contains("| 2026-03-10 | 0 | 0 | 0.0 |"));
        assert!(report.contains("- Arrays: 1 sessions, 20 min, avg score 90.0"));
        assert!(report.contains("- confused: 2 (100%)"));
        assert!(report.contains("- Graphs on 2026-03-11 10:00: 30 min, no quiz"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let report = build_report("user_1", today(), &DashboardData::default());
        assert!(report.contains("No activity window requested."));
        assert!(report.contains("No topics practiced yet."));
        assert!(report.contains("No completed sessions yet."));
    }

    #[test]
    fn summary_shows_error_only() {
        let data = DashboardData::failed("offline");
        assert_eq!(render_summary("user_1", &data), "Dashboard for user_1 unavailable: offline\n");
    }

    #[test]
    fn summary_mentions_latest_topic() {
        let summary = render_summary("user_1", &sample());
        assert!(summary.contains("- Last practiced: Arrays (1 sessions, avg 90.0)"));
        assert!(summary.contains("03-12:1"));
        assert!(summary.contains("- Most common emotion: confused (100%)"));
    }
}
