use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::LearningSession;

/// Filter over `learning_sessions`. Results are always newest first.
#[derive(Debug, Clone)]
pub struct SessionQuery<'a> {
    /// Metric name, used in logs and error messages.
    pub label: &'static str,
    pub user_id: &'a str,
    pub started_from: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub completed_only: bool,
    pub limit: Option<i64>,
}

impl<'a> SessionQuery<'a> {
    pub fn new(label: &'static str, user_id: &'a str) -> Self {
        Self {
            label,
            user_id,
            started_from: None,
            started_before: None,
            completed_only: false,
            limit: None,
        }
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.started_from = Some(from);
        self
    }

    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.started_before = Some(before);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed_only = true;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read side of the session table, as seen by the dashboard.
pub trait SessionStore {
    /// Cheap round trip used to detect an unreachable store up front.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn fetch_sessions(
        &self,
        query: &SessionQuery<'_>,
    ) -> Result<Vec<LearningSession>, StoreError>;

    async fn count_sessions(&self, query: &SessionQuery<'_>) -> Result<i64, StoreError>;
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    impl SessionQuery<'_> {
        /// In-memory equivalent of the SQL filter.
        pub fn matches(&self, session: &LearningSession) -> bool {
            session.user_id == self.user_id
                && self.started_from.map_or(true, |from| session.started_at >= from)
                && self.started_before.map_or(true, |before| session.started_at < before)
                && (!self.completed_only || session.ended_at.is_some())
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub sessions: Vec<LearningSession>,
        pub failing: HashSet<&'static str>,
        pub offline: Option<String>,
        pub queries: AtomicUsize,
    }

    impl MemoryStore {
        pub fn new(sessions: Vec<LearningSession>) -> Self {
            Self {
                sessions,
                ..Self::default()
            }
        }

        pub fn failing_on(mut self, label: &'static str) -> Self {
            self.failing.insert(label);
            self
        }

        pub fn offline(mut self, message: &str) -> Self {
            self.offline = Some(message.to_string());
            self
        }

        fn check(&self, label: &'static str) -> Result<(), StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.offline {
                return Err(StoreError::Simulated(message.clone()));
            }
            if self.failing.contains(label) {
                return Err(StoreError::Simulated(format!("{label} query failed")));
            }
            Ok(())
        }
    }

    impl SessionStore for MemoryStore {
        async fn ping(&self) -> Result<(), StoreError> {
            self.check("ping")
        }

        async fn fetch_sessions(
            &self,
            query: &SessionQuery<'_>,
        ) -> Result<Vec<LearningSession>, StoreError> {
            self.check(query.label)?;
            let mut rows: Vec<LearningSession> = self
                .sessions
                .iter()
                .filter(|session| query.matches(session))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            if let Some(limit) = query.limit {
                rows.truncate(limit.max(0) as usize);
            }
            Ok(rows)
        }

        async fn count_sessions(&self, query: &SessionQuery<'_>) -> Result<i64, StoreError> {
            self.check(query.label)?;
            Ok(self.sessions.iter().filter(|session| query.matches(session)).count() as i64)
        }
    }
}
