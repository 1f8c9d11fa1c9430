//! Fan-out/fan-in assembly of a learner's dashboard.
//!
//! Every metric is fetched independently and a failing metric falls back to
//! its empty value, so one bad query never blanks the whole dashboard. Only
//! the up-front probe (and request validation) can fail the pipeline.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::aggregate;
use crate::config::DbConfig;
use crate::db::PgSessionStore;
use crate::error::{DashboardError, StoreError};
use crate::models::{
    ActivityDataPoint, DashboardData, DashboardStats, EmotionDistribution, LearningSession,
    TopicProgress,
};
use crate::store::{SessionQuery, SessionStore};
use crate::streak;

#[derive(Debug, Clone, Copy)]
pub struct DashboardOptions {
    pub activity_days: u32,
    pub recent_limit: i64,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            activity_days: 7,
            recent_limit: 5,
        }
    }
}

pub struct Dashboard<S> {
    store: S,
    options: DashboardOptions,
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn or_empty<T: Default>(label: &'static str, user_id: &str, result: Result<T, StoreError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(
                metric = label,
                user_id,
                error = %err,
                "metric unavailable, using empty value"
            );
            T::default()
        }
    }
}

impl<S: SessionStore> Dashboard<S> {
    pub fn new(store: S, options: DashboardOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fetch_rows(&self, query: SessionQuery<'_>) -> Vec<LearningSession> {
        let label = query.label;
        let user_id = query.user_id;
        or_empty(label, user_id, self.store.fetch_sessions(&query).await)
    }

    async fn fetch_count(&self, query: SessionQuery<'_>) -> i64 {
        let label = query.label;
        let user_id = query.user_id;
        or_empty(label, user_id, self.store.count_sessions(&query).await)
    }

    /// Totals, streak and period-over-period changes.
    pub async fn fetch_stats(&self, user_id: &str, today: NaiveDate) -> DashboardStats {
        let tomorrow = start_of(today.succ_opt().unwrap_or(NaiveDate::MAX));
        let week_start = start_of(aggregate::days_before(today, 6));
        let prev_week_start = start_of(aggregate::days_before(today, 13));
        let month_start = start_of(aggregate::days_before(today, 29));
        let prev_month_start = start_of(aggregate::days_before(today, 59));

        let (sessions, this_week, last_week, this_month, last_month) = tokio::join!(
            self.fetch_rows(SessionQuery::new("stats", user_id)),
            self.fetch_count(
                SessionQuery::new("stats_week", user_id)
                    .since(week_start)
                    .before(tomorrow)
            ),
            self.fetch_count(
                SessionQuery::new("stats_prev_week", user_id)
                    .since(prev_week_start)
                    .before(week_start)
            ),
            self.fetch_count(
                SessionQuery::new("stats_month", user_id)
                    .since(month_start)
                    .before(tomorrow)
            ),
            self.fetch_count(
                SessionQuery::new("stats_prev_month", user_id)
                    .since(prev_month_start)
                    .before(month_start)
            ),
        );

        DashboardStats {
            total_sessions: sessions.len(),
            total_minutes: sessions.iter().map(LearningSession::minutes).sum(),
            current_streak: streak::current_streak(
                sessions.iter().map(LearningSession::started_on),
                today,
            ),
            average_score: aggregate::average_score(sessions.iter().map(|s| s.quiz_score)),
            weekly_change: aggregate::percentage_change(this_week, last_week),
            monthly_change: aggregate::percentage_change(this_month, last_month),
        }
    }

    pub async fn fetch_activity(
        &self,
        user_id: &str,
        days: u32,
        today: NaiveDate,
    ) -> Vec<ActivityDataPoint> {
        let days = days.min(aggregate::MAX_ACTIVITY_DAYS);
        let sessions = if days == 0 {
            Vec::new()
        } else {
            let from = start_of(aggregate::days_before(today, days as i64 - 1));
            self.fetch_rows(SessionQuery::new("activity", user_id).since(from))
                .await
        };
        aggregate::activity_series(&sessions, days, today)
    }

    pub async fn fetch_emotions(&self, user_id: &str) -> Vec<EmotionDistribution> {
        let sessions = self.fetch_rows(SessionQuery::new("emotions", user_id)).await;
        aggregate::emotion_distribution(&sessions)
    }

    pub async fn fetch_recent_sessions(&self, user_id: &str, limit: i64) -> Vec<LearningSession> {
        self.fetch_rows(SessionQuery::new("recent_sessions", user_id).completed().limit(limit))
            .await
    }

    pub async fn fetch_topic_progress(&self, user_id: &str) -> Vec<TopicProgress> {
        let sessions = self.fetch_rows(SessionQuery::new("topics", user_id)).await;
        aggregate::topic_progress(&sessions, aggregate::TOP_TOPICS)
    }

    pub async fn assemble(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<DashboardData, DashboardError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DashboardError::MissingUser);
        }
        self.store.ping().await.map_err(DashboardError::Probe)?;

        let (stats, activity, emotions, recent_sessions, topic_progress) = tokio::join!(
            self.fetch_stats(user_id, today),
            self.fetch_activity(user_id, self.options.activity_days, today),
            self.fetch_emotions(user_id),
            self.fetch_recent_sessions(user_id, self.options.recent_limit),
            self.fetch_topic_progress(user_id),
        );

        Ok(DashboardData {
            stats,
            activity,
            emotions,
            recent_sessions,
            topic_progress,
            loading: false,
            error: None,
        })
    }

    /// Never fails: pipeline errors become zeroed data plus a message.
    pub async fn load(&self, user_id: &str, today: NaiveDate) -> DashboardData {
        match self.assemble(user_id, today).await {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(user_id, kind = ?err.kind(), error = %err, "dashboard load failed");
                DashboardData::failed(err.user_message())
            }
        }
    }
}

/// Builds the Postgres-backed dashboard, or `None` when the database is not
/// configured.
pub fn from_config(
    config: &DbConfig,
    options: DashboardOptions,
) -> anyhow::Result<Option<Dashboard<PgSessionStore>>> {
    Ok(config
        .pool()?
        .map(|pool| Dashboard::new(PgSessionStore::new(pool), options)))
}

/// Loads today's dashboard; an unconfigured database yields empty data
/// without an error.
pub async fn load_today(
    dashboard: Option<&Dashboard<PgSessionStore>>,
    user_id: &str,
) -> DashboardData {
    match dashboard {
        Some(dashboard) => dashboard.load(user_id, Utc::now().date_naive()).await,
        None => {
            tracing::info!("database not configured, returning empty dashboard");
            DashboardData::default()
        }
    }
}
