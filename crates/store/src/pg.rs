//! Postgres-backed `StoreBackend`.

use async_trait::async_trait;
use asya_envelope::{Envelope, EnvelopeState, EnvelopeStatus, EnvelopeUpdate, Route};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::backend::StoreBackend;
use crate::cancellable;
use crate::error::StoreError;

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EnvelopeRow {
    id: String,
    parent_id: Option<String>,
    status: String,
    route: Json<Route>,
    headers: Json<Map<String, Value>>,
    payload: Value,
    result: Option<Value>,
    error: Option<String>,
    progress_percent: f64,
    message: Option<String>,
    actors_completed: i32,
    timeout_sec: Option<i64>,
    deadline: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnvelopeRow> for Envelope {
    type Error = StoreError;

    fn try_from(row: EnvelopeRow) -> Result<Self, StoreError> {
        let status = parse_status(&row.status)?;
        let route = row.route.0;
        let total_actors = route.actors.len();
        let current_actor_idx = route.current;
        let current_actor_name = route.current_actor().map(str::to_string);
        Ok(Envelope {
            id: row.id,
            parent_id: row.parent_id,
            status,
            route,
            headers: row.headers.0,
            payload: row.payload,
            result: row.result,
            error: row.error,
            timeout_sec: row.timeout_sec.map(|v| v as u64),
            deadline: row.deadline,
            progress_percent: row.progress_percent,
            current_actor_idx,
            current_actor_name,
            message: row.message,
            actors_completed: row.actors_completed as usize,
            total_actors,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_status(s: &str) -> Result<EnvelopeStatus, StoreError> {
    serde_json::from_value(Value::String(s.to_string())).map_err(|_| StoreError::Invalid(format!("unknown status '{s}'")))
}

fn status_str(status: EnvelopeStatus) -> String {
    status.to_string()
}

fn envelope_state_str(state: EnvelopeState) -> String {
    match state {
        EnvelopeState::Received => "received".to_string(),
        EnvelopeState::Processing => "processing".to_string(),
        EnvelopeState::Completed => "completed".to_string(),
    }
}

#[derive(sqlx::FromRow)]
struct UpdateRow {
    envelope_id: String,
    status: Option<String>,
    envelope_state: Option<String>,
    actor: Option<String>,
    current_actor_idx: Option<i32>,
    actors: Option<Json<Vec<String>>>,
    message: Option<String>,
    progress_percent: Option<f64>,
    result: Option<Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UpdateRow> for EnvelopeUpdate {
    type Error = StoreError;

    fn try_from(row: UpdateRow) -> Result<Self, StoreError> {
        Ok(EnvelopeUpdate {
            envelope_id: row.envelope_id,
            status: row.status.as_deref().map(parse_status).transpose()?,
            envelope_state: row
                .envelope_state
                .as_deref()
                .map(|s| serde_json::from_value::<EnvelopeState>(Value::String(s.to_string())))
                .transpose()
                .map_err(|_| StoreError::Invalid("unknown envelope_state".into()))?,
            actor: row.actor,
            current_actor_idx: row.current_actor_idx.map(|v| v as usize),
            actors: row.actors.map(|j| j.0),
            message: row.message,
            progress_percent: row.progress_percent,
            result: row.result,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl StoreBackend for PgBackend {
    async fn insert_envelope(&self, ctx: &CancellationToken, envelope: &Envelope) -> Result<(), StoreError> {
        cancellable(ctx, async {
        sqlx::query(
            r#"
            INSERT INTO envelopes
                (id, parent_id, status, route, headers, payload, result, error,
                 progress_percent, message, actors_completed, timeout_sec, deadline, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&envelope.id)
        .bind(&envelope.parent_id)
        .bind(status_str(envelope.status))
        .bind(Json(&envelope.route))
        .bind(Json(&envelope.headers))
        .bind(&envelope.payload)
        .bind(&envelope.result)
        .bind(&envelope.error)
        .bind(envelope.progress_percent)
        .bind(&envelope.message)
        .bind(envelope.actors_completed as i32)
        .bind(envelope.timeout_sec.map(|v| v as i64))
        .bind(envelope.deadline)
        .bind(envelope.created_at)
        .bind(envelope.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
        })
        .await
    }

    async fn get_envelope(&self, ctx: &CancellationToken, id: &str) -> Result<Option<Envelope>, StoreError> {
        cancellable(ctx, async {
        let row: Option<EnvelopeRow> = sqlx::query_as(
            r#"SELECT id, parent_id, status, route, headers, payload, result, error,
                      progress_percent, message, actors_completed, timeout_sec, deadline, created_at, updated_at
               FROM envelopes WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Envelope::try_from).transpose()
        })
        .await
    }

    async fn apply_update(&self, ctx: &CancellationToken, update: &EnvelopeUpdate) -> Result<Envelope, StoreError> {
        cancellable(ctx, async {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, Json<Route>)> =
            sqlx::query_as("SELECT status, route FROM envelopes WHERE id = $1 FOR UPDATE")
                .bind(&update.envelope_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((current_status, current_route)) = current else {
            return Err(StoreError::NotFound(update.envelope_id.clone()));
        };
        if parse_status(&current_status)?.is_terminal() {
            return Err(StoreError::AlreadyTerminal(update.envelope_id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO envelope_updates
                (envelope_id, status, envelope_state, actor, current_actor_idx, actors, message, progress_percent, result, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&update.envelope_id)
        .bind(update.status.map(status_str))
        .bind(update.envelope_state.map(envelope_state_str))
        .bind(&update.actor)
        .bind(update.current_actor_idx.map(|v| v as i32))
        .bind(update.actors.as_ref().map(Json))
        .bind(&update.message)
        .bind(update.progress_percent)
        .bind(&update.result)
        .bind(&update.error)
        .bind(update.created_at)
        .execute(&mut *tx)
        .await?;

        let new_route = match &update.actors {
            Some(actors) => {
                let mut route = current_route.0;
                route.actors = actors.clone();
                if let Some(idx) = update.current_actor_idx {
                    route.current = idx;
                }
                Some(route)
            }
            None if update.current_actor_idx.is_some() => {
                let mut route = current_route.0;
                route.current = update.current_actor_idx.unwrap();
                Some(route)
            }
            None => None,
        };

        let actors_completed_increment = i32::from(matches!(update.envelope_state, Some(EnvelopeState::Completed)));

        sqlx::query(
            r#"
            UPDATE envelopes SET
                status = COALESCE($2, status),
                route = COALESCE($3, route),
                result = COALESCE($4, result),
                error = COALESCE($5, error),
                progress_percent = COALESCE($6, progress_percent),
                message = COALESCE($7, message),
                actors_completed = actors_completed + $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(&update.envelope_id)
        .bind(update.status.map(status_str))
        .bind(new_route.map(|r| Json(r)))
        .bind(&update.result)
        .bind(&update.error)
        .bind(update.progress_percent)
        .bind(&update.message)
        .bind(actors_completed_increment)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let row: EnvelopeRow = sqlx::query_as(
            r#"SELECT id, parent_id, status, route, headers, payload, result, error,
                      progress_percent, message, actors_completed, timeout_sec, deadline, created_at, updated_at
               FROM envelopes WHERE id = $1"#,
        )
        .bind(&update.envelope_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Envelope::try_from(row)
        })
        .await
    }

    async fn list_updates(&self, ctx: &CancellationToken, envelope_id: &str) -> Result<Vec<EnvelopeUpdate>, StoreError> {
        cancellable(ctx, async {
        let rows: Vec<UpdateRow> = sqlx::query_as(
            r#"SELECT envelope_id, status, envelope_state, actor, current_actor_idx, actors, message, progress_percent, result, error, created_at
               FROM envelope_updates WHERE envelope_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(envelope_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EnvelopeUpdate::try_from).collect()
        })
        .await
    }
}
