use axum::{
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Serialize;
use sqlx::PgPool;
use std::path::Path as FsPath;
use std::sync::Arc;
use tera::Context;

use crate::db::{self, EventContext, Submission, SubmissionFields};
use crate::error::AppError;
use crate::forms::{
    FormData, InfoForm, InfoFormOptions, SubmissionFilter, SubmissionFilterForm, UploadedFile,
};
use crate::state::AppState;
use crate::storage::{generate_submission_code, remove_media, save_image};
use crate::templates::render;

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let events = db::list_events(state.pool.as_ref()).await?;
    let mut ctx = Context::new();
    ctx.insert("events", &events);
    render("index.html", &ctx)
}

pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
) -> Result<Html<String>, AppError> {
    let ctx = state.event_context(&event).await?;
    let form = InfoForm::new(&ctx, None, InfoFormOptions::default());
    render_info(&ctx, None, &form)
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let ctx = state.event_context(&event).await?;
    let data = read_multipart(multipart).await?;

    let mut form = InfoForm::new(&ctx, None, InfoFormOptions::default());
    let info = match form.clean(&data) {
        Ok(info) => info,
        Err(errors) => {
            tracing::info!(event = %ctx.event.slug, "Rejected submission: {}", errors);
            return Ok(render_info(&ctx, None, &form)?.into_response());
        }
    };

    let (fields, image) = info.into_fields();
    let submission = store_new_submission(
        state.pool.as_ref(),
        &state.config.media_folder,
        ctx.event.id,
        fields,
        image.as_ref(),
        generate_submission_code,
    )
    .await?;
    tracing::info!(
        event = %ctx.event.slug,
        code = %submission.code,
        "Created submission \"{}\"",
        submission.title
    );

    Ok(Redirect::to(&submission_url(&ctx, &submission)).into_response())
}

pub async fn edit_form(
    State(state): State<Arc<AppState>>,
    Path((event, code)): Path<(String, String)>,
) -> Result<Html<String>, AppError> {
    let ctx = state.event_context(&event).await?;
    let submission = load_submission(&state, &ctx, &code).await?;
    let form = InfoForm::new(&ctx, Some(&submission), edit_options(&submission));
    render_info(&ctx, Some(&submission), &form)
}

pub async fn edit_handler(
    State(state): State<Arc<AppState>>,
    Path((event, code)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let ctx = state.event_context(&event).await?;
    let submission = load_submission(&state, &ctx, &code).await?;
    let mut form = InfoForm::new(&ctx, Some(&submission), edit_options(&submission));

    if form.is_readonly() {
        tracing::warn!(
            code = %submission.code,
            state = %submission.state,
            "Ignoring edit of a submission that is no longer editable"
        );
        return Ok(Redirect::to(&submission_url(&ctx, &submission)).into_response());
    }

    let data = read_multipart(multipart).await?;
    let info = match form.clean(&data) {
        Ok(info) => info,
        Err(errors) => {
            tracing::info!(code = %submission.code, "Rejected edit: {}", errors);
            return Ok(render_info(&ctx, Some(&submission), &form)?.into_response());
        }
    };

    let mut fields = SubmissionFields::from(&submission);
    let image = info.apply(&mut fields);
    store_edit(
        state.pool.as_ref(),
        &state.config.media_folder,
        &submission,
        fields,
        image.as_ref(),
    )
    .await?;

    Ok(Redirect::to(&submission_url(&ctx, &submission)).into_response())
}

pub async fn submission_list(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Html<String>, AppError> {
    let listing = load_listing(&state, &event, params).await?;
    let mut ctx = Context::new();
    ctx.insert("event", &listing.event.event);
    ctx.insert("form", listing.form.form());
    ctx.insert("submissions", &listing.rows);
    render("submissions.html", &ctx)
}

#[derive(Serialize)]
pub struct SubmissionRow {
    #[serde(flatten)]
    pub submission: Submission,
    pub submission_type: String,
}

pub struct Listing {
    pub event: EventContext,
    pub form: SubmissionFilterForm,
    pub filter: SubmissionFilter,
    pub rows: Vec<SubmissionRow>,
}

/// Builds the filter form with live counts, binds the query string and
/// loads the matching submissions. An invalid filter falls back to showing
/// everything.
pub async fn load_listing(
    state: &AppState,
    event: &str,
    params: Vec<(String, String)>,
) -> Result<Listing, AppError> {
    let ctx = state.event_context(event).await?;
    let counts = db::state_counts(state.pool.as_ref(), ctx.event.id).await?;
    let mut form = SubmissionFilterForm::new(&ctx, &counts);

    let filter = match form.clean(&FormData::from_pairs(params)) {
        Ok(filter) => filter,
        Err(errors) => {
            tracing::debug!(event = %ctx.event.slug, "Ignoring invalid filter: {}", errors);
            SubmissionFilter::default()
        }
    };

    let rows = db::list_submissions(state.pool.as_ref(), ctx.event.id, &filter)
        .await?
        .into_iter()
        .map(|submission| SubmissionRow {
            submission_type: ctx
                .submission_type(submission.submission_type_id)
                .map(ToString::to_string)
                .unwrap_or_default(),
            submission,
        })
        .collect();

    Ok(Listing {
        event: ctx,
        form,
        filter,
        rows,
    })
}

/// Attempts at finding an unused submission code before giving up.
const CODE_ATTEMPTS: usize = 5;

/// Inserts a new submission together with its image. The image is stored
/// under the submission's code and removed again if the insert fails. A code
/// that is already taken is replaced by a fresh one from `next_code`.
async fn store_new_submission(
    pool: &PgPool,
    media_folder: &FsPath,
    event_id: i32,
    mut fields: SubmissionFields,
    image: Option<&UploadedFile>,
    mut next_code: impl FnMut() -> String,
) -> Result<Submission, AppError> {
    let mut attempt = 1;
    loop {
        let code = next_code();
        let stored = image
            .map(|file| save_image(media_folder, &code, file))
            .transpose()?;
        fields.image = stored.clone();

        let error = match db::create_submission(pool, event_id, &code, &fields).await {
            Ok(submission) => return Ok(submission),
            Err(e) => e,
        };
        if let Some(name) = &stored {
            remove_media(media_folder, name);
        }
        if !db::is_unique_violation(&error) || attempt == CODE_ATTEMPTS {
            return Err(error.into());
        }
        tracing::warn!(code = %code, attempt, "Submission code already taken, retrying");
        attempt += 1;
    }
}

/// Writes changed fields. A new image replaces the old file only once the
/// update went through.
async fn store_edit(
    pool: &PgPool,
    media_folder: &FsPath,
    submission: &Submission,
    mut fields: SubmissionFields,
    image: Option<&UploadedFile>,
) -> Result<(), AppError> {
    let stored = image
        .map(|file| save_image(media_folder, &submission.code, file))
        .transpose()?;
    if stored.is_some() {
        fields.image = stored.clone();
    }
    if fields == SubmissionFields::from(submission) {
        return Ok(());
    }

    if let Err(e) = db::update_submission(pool, submission.id, &fields).await {
        if let Some(name) = &stored {
            remove_media(media_folder, name);
        }
        return Err(e.into());
    }
    tracing::info!(code = %submission.code, "Updated submission");

    if let (Some(_), Some(old)) = (&stored, &submission.image) {
        remove_media(media_folder, old);
    }
    Ok(())
}

async fn load_submission(
    state: &AppState,
    ctx: &EventContext,
    code: &str,
) -> Result<Submission, AppError> {
    db::get_submission(state.pool.as_ref(), ctx.event.id, code)
        .await?
        .ok_or(AppError::NotFound("submission"))
}

fn edit_options(submission: &Submission) -> InfoFormOptions {
    InfoFormOptions {
        readonly: !submission.state.is_editable(),
        ..InfoFormOptions::default()
    }
}

fn submission_url(ctx: &EventContext, submission: &Submission) -> String {
    format!("/{}/submissions/{}", ctx.event.slug, submission.code)
}

async fn read_multipart(mut multipart: Multipart) -> Result<FormData, AppError> {
    let mut data = FormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                data.add_file(
                    name,
                    UploadedFile {
                        filename,
                        content: content.to_vec(),
                    },
                );
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                data.insert(name, text);
            }
        }
    }

    Ok(data)
}

fn render_info(
    ctx: &EventContext,
    submission: Option<&Submission>,
    form: &InfoForm,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("event", &ctx.event);
    context.insert("submission", &submission);
    context.insert("form", form.form());
    context.insert("readonly", &form.is_readonly());
    render("submit.html", &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_event(pool: &PgPool) -> sqlx::Result<(i32, i32)> {
        let event_id: i32 = sqlx::query_scalar(
            "INSERT INTO events (slug, name) VALUES ('democon', 'DemoCon') RETURNING id",
        )
        .fetch_one(pool)
        .await?;
        let type_id: i32 = sqlx::query_scalar(
            "INSERT INTO submission_types (event_id, name) VALUES ($1, 'Talk') RETURNING id",
        )
        .bind(event_id)
        .fetch_one(pool)
        .await?;
        Ok((event_id, type_id))
    }

    fn fields(type_id: i32) -> SubmissionFields {
        SubmissionFields {
            title: "A talk".to_string(),
            submission_type_id: type_id,
            content_locale: "en".to_string(),
            abstract_text: None,
            description: None,
            notes: None,
            do_not_record: false,
            image: None,
        }
    }

    fn cover() -> UploadedFile {
        UploadedFile {
            filename: "cover.png".to_string(),
            content: vec![1, 2, 3],
        }
    }

    fn stored_files(dir: &FsPath) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn taken_code_is_retried_without_leftover_files(pool: PgPool) -> sqlx::Result<()> {
        let media = tempfile::tempdir().unwrap();
        let (event_id, type_id) = seed_event(&pool).await?;
        db::create_submission(&pool, event_id, "TAKEN1", &fields(type_id)).await?;

        let mut codes = vec!["FRESH1", "TAKEN1"];
        let submission = store_new_submission(
            &pool,
            media.path(),
            event_id,
            fields(type_id),
            Some(&cover()),
            || codes.pop().unwrap().to_string(),
        )
        .await
        .unwrap();

        assert_eq!(submission.code, "FRESH1");
        let files = stored_files(media.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("FRESH1_"));
        assert_eq!(submission.image.as_deref(), Some(files[0].as_str()));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_insert_removes_the_stored_image(pool: PgPool) -> sqlx::Result<()> {
        let media = tempfile::tempdir().unwrap();
        let (event_id, _) = seed_event(&pool).await?;

        // No such submission type, so the insert fails on its foreign key.
        let result = store_new_submission(
            &pool,
            media.path(),
            event_id,
            fields(9999),
            Some(&cover()),
            || "NEWONE".to_string(),
        )
        .await;

        assert!(result.is_err());
        assert!(stored_files(media.path()).is_empty());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn replaced_image_removes_the_old_file(pool: PgPool) -> sqlx::Result<()> {
        let media = tempfile::tempdir().unwrap();
        let (event_id, type_id) = seed_event(&pool).await?;
        let submission = store_new_submission(
            &pool,
            media.path(),
            event_id,
            fields(type_id),
            Some(&cover()),
            || "EDITME".to_string(),
        )
        .await
        .unwrap();
        let old = submission.image.clone().unwrap();

        let fields = SubmissionFields::from(&submission);
        store_edit(&pool, media.path(), &submission, fields, Some(&cover()))
            .await
            .unwrap();

        let updated = db::get_submission(&pool, event_id, "EDITME").await?.unwrap();
        let new = updated.image.unwrap();
        assert_ne!(new, old);
        assert_eq!(stored_files(media.path()), vec![new]);
        Ok(())
    }
}
