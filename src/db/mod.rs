mod models;

pub use models::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;

use crate::forms::SubmissionFilter;

pub type DbPool = Arc<PgPool>;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn list_events(pool: &PgPool) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>("SELECT * FROM events ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn load_event_context(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<EventContext>, sqlx::Error> {
    let event = match sqlx::query_as::<_, Event>("SELECT * FROM events WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?
    {
        Some(event) => event,
        None => return Ok(None),
    };

    let cfp = match sqlx::query_as::<_, Cfp>("SELECT * FROM cfps WHERE event_id = $1")
        .bind(event.id)
        .fetch_optional(pool)
        .await?
    {
        Some(cfp) => cfp,
        None => {
            tracing::warn!(event = %event.slug, "Event has no CFP row");
            return Ok(None);
        }
    };

    let settings: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM event_settings WHERE event_id = $1")
            .bind(event.id)
            .fetch_all(pool)
            .await?;

    let submission_types = sqlx::query_as::<_, SubmissionType>(
        "SELECT * FROM submission_types WHERE event_id = $1 ORDER BY id",
    )
    .bind(event.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(EventContext {
        event,
        settings: EventSettings::new(settings.into_iter().collect::<HashMap<_, _>>()),
        cfp,
        submission_types,
    }))
}

pub async fn get_submission(
    pool: &PgPool,
    event_id: i32,
    code: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE event_id = $1 AND code = $2",
    )
    .bind(event_id)
    .bind(code)
    .fetch_optional(pool)
    .await
}

pub async fn create_submission(
    pool: &PgPool,
    event_id: i32,
    code: &str,
    fields: &SubmissionFields,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions (code, event_id, title, submission_type_id, content_locale,
                                 abstract, description, notes, do_not_record, image, state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(code)
    .bind(event_id)
    .bind(&fields.title)
    .bind(fields.submission_type_id)
    .bind(&fields.content_locale)
    .bind(&fields.abstract_text)
    .bind(&fields.description)
    .bind(&fields.notes)
    .bind(fields.do_not_record)
    .bind(&fields.image)
    .bind(SubmissionState::Submitted.as_str())
    .fetch_one(pool)
    .await
}

/// True when an insert hit a UNIQUE constraint, e.g. a reused submission code.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map_or(false, |e| e.is_unique_violation())
}

pub async fn update_submission(
    pool: &PgPool,
    submission_id: i32,
    fields: &SubmissionFields,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE submissions
        SET title = $2, submission_type_id = $3, content_locale = $4, abstract = $5,
            description = $6, notes = $7, do_not_record = $8, image = $9
        WHERE id = $1
        "#,
    )
    .bind(submission_id)
    .bind(&fields.title)
    .bind(fields.submission_type_id)
    .bind(&fields.content_locale)
    .bind(&fields.abstract_text)
    .bind(&fields.description)
    .bind(&fields.notes)
    .bind(fields.do_not_record)
    .bind(&fields.image)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_submissions_in_state(
    pool: &PgPool,
    event_id: i32,
    state: SubmissionState,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE event_id = $1 AND state = $2")
        .bind(event_id)
        .bind(state.as_str())
        .fetch_one(pool)
        .await
}

/// One count query per state, in `SubmissionState::ALL` order.
pub async fn state_counts(
    pool: &PgPool,
    event_id: i32,
) -> Result<Vec<(SubmissionState, i64)>, sqlx::Error> {
    let mut counts = Vec::with_capacity(SubmissionState::ALL.len());
    for state in SubmissionState::ALL {
        counts.push((state, count_submissions_in_state(pool, event_id, state).await?));
    }
    Ok(counts)
}

pub async fn list_submissions(
    pool: &PgPool,
    event_id: i32,
    filter: &SubmissionFilter,
) -> Result<Vec<Submission>, sqlx::Error> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM submissions WHERE event_id = ");
    query.push_bind(event_id);

    if let Some(type_id) = filter.submission_type_id {
        query.push(" AND submission_type_id = ").push_bind(type_id);
    }
    if !filter.states.is_empty() {
        let states: Vec<String> = filter.states.iter().map(|s| s.to_string()).collect();
        query.push(" AND state = ANY(").push_bind(states).push(")");
    }
    query.push(" ORDER BY created_at DESC");

    query.build_query_as::<Submission>().fetch_all(pool).await
}
