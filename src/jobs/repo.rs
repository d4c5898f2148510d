use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Fields supplied by the client on create and full update.
#[derive(Debug, Clone)]
pub struct JobFields {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub description: Option<String>,
}

const JOB_COLUMNS: &str =
    "id, user_id, title, company, location, start_date, end_date, description, created_at";

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Job>> {
    let rows = sqlx::query_as::<_, Job>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list jobs by user")?;
    Ok(rows)
}

/// Lookup scoped to the owner; another user's job is indistinguishable from a
/// missing one.
pub async fn find(db: &PgPool, user_id: Uuid, job_id: Uuid) -> anyhow::Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND user_id = $2"
    ))
    .bind(job_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("find job")?;
    Ok(job)
}

pub async fn create(db: &PgPool, user_id: Uuid, fields: &JobFields) -> anyhow::Result<Job> {
    let job = sqlx::query_as::<_, Job>(&format!(
        r#"
        INSERT INTO jobs (user_id, title, company, location, start_date, end_date, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&fields.title)
    .bind(&fields.company)
    .bind(&fields.location)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(&fields.description)
    .fetch_one(db)
    .await
    .context("create job")?;
    Ok(job)
}

pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    job_id: Uuid,
    fields: &JobFields,
) -> anyhow::Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(&format!(
        r#"
        UPDATE jobs
        SET title = $3, company = $4, location = $5,
            start_date = $6, end_date = $7, description = $8
        WHERE id = $1 AND user_id = $2
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(user_id)
    .bind(&fields.title)
    .bind(&fields.company)
    .bind(&fields.location)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(&fields.description)
    .fetch_optional(db)
    .await
    .context("update job")?;
    Ok(job)
}

pub async fn delete(db: &PgPool, user_id: Uuid, job_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND user_id = $2")
        .bind(job_id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete job")?;
    Ok(result.rows_affected() == 1)
}
