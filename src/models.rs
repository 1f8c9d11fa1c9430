use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    pub id: Uuid,
    pub user_id: String,
    pub topic_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub quiz_score: Option<i32>,
    pub emotions_detected: Vec<String>,
    pub primary_emotion: Option<String>,
    pub message_count: i32,
}

impl LearningSession {
    pub fn minutes(&self) -> i64 {
        self.duration_minutes.unwrap_or(0).max(0) as i64
    }

    pub fn started_on(&self) -> NaiveDate {
        self.started_at.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDataPoint {
    pub date: NaiveDate,
    pub sessions: usize,
    pub minutes: i64,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub name: String,
    pub sessions: usize,
    pub total_minutes: i64,
    pub average_score: f64,
    pub last_practiced: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionDistribution {
    pub emotion: String,
    pub count: usize,
    pub percentage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_sessions: usize,
    pub total_minutes: i64,
    pub current_streak: u32,
    pub average_score: f64,
    /// Sessions in the last 7 days vs the 7 before, in percent.
    pub weekly_change: i64,
    /// Sessions in the last 30 days vs the 30 before, in percent.
    pub monthly_change: i64,
}

/// Everything the dashboard view needs in one shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub stats: DashboardStats,
    pub activity: Vec<ActivityDataPoint>,
    pub emotions: Vec<EmotionDistribution>,
    pub recent_sessions: Vec<LearningSession>,
    pub topic_progress: Vec<TopicProgress>,
    pub loading: bool,
    pub error: Option<String>,
}

impl DashboardData {
    /// Placeholder published before the first load completes.
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}
