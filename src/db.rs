use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::aggregate;
use crate::error::StoreError;
use crate::models::LearningSession;
use crate::store::{SessionQuery, SessionStore};

const SESSION_COLUMNS: &str = "id, user_id, topic_name, started_at, ended_at, duration_minutes, \
     quiz_score, emotions_detected, primary_emotion, message_count";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed session store. Cloning shares the pool.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_filters<'q>(builder: &mut QueryBuilder<'q, Postgres>, query: &SessionQuery<'q>) {
    builder.push(" WHERE user_id = ").push_bind(query.user_id);
    if let Some(from) = query.started_from {
        builder.push(" AND started_at >= ").push_bind(from);
    }
    if let Some(before) = query.started_before {
        builder.push(" AND started_at < ").push_bind(before);
    }
    if query.completed_only {
        builder.push(" AND ended_at IS NOT NULL");
    }
}

fn map_row(row: &PgRow) -> Result<LearningSession, sqlx::Error> {
    Ok(LearningSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        topic_name: row.try_get("topic_name")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        duration_minutes: row.try_get("duration_minutes")?,
        quiz_score: row.try_get("quiz_score")?,
        emotions_detected: row
            .try_get::<Option<Vec<String>>, _>("emotions_detected")?
            .unwrap_or_default(),
        primary_emotion: row.try_get("primary_emotion")?,
        message_count: row.try_get::<Option<i32>, _>("message_count")?.unwrap_or(0),
    })
}

impl SessionStore for PgSessionStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query { label: "ping", source })?;
        Ok(())
    }

    async fn fetch_sessions(
        &self,
        query: &SessionQuery<'_>,
    ) -> Result<Vec<LearningSession>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(SESSION_COLUMNS).push(" FROM learning_sessions");
        push_filters(&mut builder, query);
        builder.push(" ORDER BY started_at DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit.max(0));
        }

        tracing::debug!(metric = query.label, sql = builder.sql(), "fetching sessions");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                label: query.label,
                source,
            })?;

        rows.iter()
            .map(|row| {
                map_row(row).map_err(|source| StoreError::Mapping {
                    label: query.label,
                    source,
                })
            })
            .collect()
    }

    async fn count_sessions(&self, query: &SessionQuery<'_>) -> Result<i64, StoreError> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM learning_sessions");
        push_filters(&mut builder, query);

        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                label: query.label,
                source,
            })?;

        row.try_get("total").map_err(|source| StoreError::Mapping {
            label: query.label,
            source,
        })
    }
}

pub async fn start_session(pool: &PgPool, user_id: &str, topic: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO learning_sessions (id, user_id, topic_name, started_at)
        VALUES ($1, $2, $3, now())
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(topic)
    .execute(pool)
    .await
    .context("failed to start session")?;

    tracing::info!(session_id = %id, user_id, topic, "session started");
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub quiz_score: Option<i32>,
    pub emotions: Vec<String>,
    pub message_count: Option<i32>,
}

/// Labels already on the session followed by the new ones, and the primary
/// emotion of the merged list.
pub fn merge_emotions(existing: &[String], new: &[String]) -> (Vec<String>, Option<String>) {
    let merged: Vec<String> = existing.iter().chain(new).cloned().collect();
    let primary = aggregate::primary_emotion(&merged);
    (merged, primary)
}

/// Closes an open session. Duration is measured from `started_at` and
/// rounded to whole minutes, at least one.
pub async fn end_session(
    pool: &PgPool,
    id: Uuid,
    outcome: &SessionOutcome,
) -> anyhow::Result<LearningSession> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let existing: Vec<String> = sqlx::query(
        "SELECT emotions_detected FROM learning_sessions \
         WHERE id = $1 AND ended_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to load session")?
    .with_context(|| format!("no open session with id {id}"))?
    .try_get::<Option<Vec<String>>, _>("emotions_detected")?
    .unwrap_or_default();

    let (emotions, primary) = merge_emotions(&existing, &outcome.emotions);
    let sql = format!(
        r#"
        UPDATE learning_sessions
        SET ended_at = now(),
            duration_minutes =
                GREATEST(1, ROUND(EXTRACT(EPOCH FROM (now() - started_at)) / 60))::int,
            quiz_score = COALESCE($2, quiz_score),
            emotions_detected = $3,
            primary_emotion = COALESCE($4, primary_emotion),
            message_count = COALESCE($5, message_count)
        WHERE id = $1
        RETURNING {SESSION_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(id)
        .bind(outcome.quiz_score)
        .bind(&emotions)
        .bind(primary)
        .bind(outcome.message_count)
        .fetch_one(&mut *tx)
        .await
        .context("failed to end session")?;
    tx.commit().await.context("failed to commit session end")?;

    let session = map_row(&row)?;
    tracing::info!(session_id = %id, minutes = session.minutes(), "session ended");
    Ok(session)
}

async fn insert_session(
    pool: &PgPool,
    session: &LearningSession,
    import_key: Option<&str>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO learning_sessions
        (id, user_id, topic_name, started_at, ended_at, duration_minutes,
         quiz_score, emotions_detected, primary_emotion, message_count, import_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (import_key) DO NOTHING
        "#,
    )
    .bind(session.id)
    .bind(&session.user_id)
    .bind(&session.topic_name)
    .bind(session.started_at)
    .bind(session.ended_at)
    .bind(session.duration_minutes)
    .bind(session.quiz_score)
    .bind(&session.emotions_detected)
    .bind(&session.primary_emotion)
    .bind(session.message_count)
    .bind(import_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Demo history for `user_id`, relative to now. Re-running is a no-op.
pub async fn seed(pool: &PgPool, user_id: &str) -> anyhow::Result<usize> {
    let sessions = vec![
        (0, "Arrays and Hashing", 25, Some(85), vec!["neutral", "confident"]),
        (1, "Two Pointers", 30, Some(72), vec!["confused", "neutral"]),
        (2, "Arrays and Hashing", 20, Some(90), vec!["confident"]),
        (4, "Binary Search", 35, Some(58), vec!["frustrated", "confused", "confused"]),
        (6, "Linked Lists", 15, None, vec!["neutral"]),
        (9, "Stacks", 40, Some(66), vec!["confused", "neutral"]),
        (16, "Trees", 45, Some(80), vec!["neutral", "confident"]),
        (24, "Graphs", 50, Some(61), vec!["frustrated", "neutral"]),
    ];

    let now = Utc::now();
    let mut inserted = 0usize;

    for (index, (days_ago, topic, minutes, score, emotions)) in sessions.into_iter().enumerate() {
        let started_at = now - Duration::days(days_ago) - Duration::minutes(minutes);
        let emotions: Vec<String> = emotions.into_iter().map(str::to_string).collect();
        let session = LearningSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            topic_name: topic.to_string(),
            started_at,
            ended_at: Some(started_at + Duration::minutes(minutes)),
            duration_minutes: Some(minutes as i32),
            quiz_score: score,
            primary_emotion: aggregate::primary_emotion(&emotions),
            emotions_detected: emotions,
            message_count: (minutes / 2) as i32,
        };
        let key = format!("seed-{user_id}-{index:03}");
        if insert_session(pool, &session, Some(&key)).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[derive(Debug, serde::Deserialize)]
pub struct CsvRow {
    user_id: String,
    topic_name: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
    quiz_score: Option<i32>,
    /// Semicolon separated labels.
    emotions: Option<String>,
    message_count: Option<i32>,
    import_key: Option<String>,
}

/// Maps one CSV record to a session and its import key. A missing duration
/// is derived from the timestamps; an end before the start counts as zero.
pub fn session_from_csv(row: CsvRow) -> (LearningSession, String) {
    let emotions: Vec<String> = row
        .emotions
        .as_deref()
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect();

    let duration_minutes = row.duration_minutes.or_else(|| {
        row.ended_at.map(|ended| {
            let seconds = (ended - row.started_at).num_seconds().max(0);
            (seconds as f64 / 60.0).round() as i32
        })
    });

    let session = LearningSession {
        id: Uuid::new_v4(),
        user_id: row.user_id,
        topic_name: row.topic_name,
        started_at: row.started_at,
        ended_at: row.ended_at,
        duration_minutes,
        quiz_score: row.quiz_score,
        primary_emotion: aggregate::primary_emotion(&emotions),
        emotions_detected: emotions,
        message_count: row.message_count.unwrap_or(0),
    };

    let import_key = row
        .import_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

    (session, import_key)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", line + 1))?;
        let (session, import_key) = session_from_csv(row);

        if insert_session(pool, &session, Some(&import_key)).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
