//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures become a status code plus a localized message.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::domain::Language;
use crate::error::{Operation, QuizError, StoreError};
use crate::logic::*;
use crate::protocol::*;
use crate::report::Report;
use crate::results::{delete_saved, load_saved};
use crate::state::{AppState, SessionHandle};

/// JSON error body `{ "error": "<localized message>" }` with a matching status.
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  pub fn new(err: QuizError, lang: Language, op: Operation) -> Self {
    let status = status_for(&err);
    if status.is_server_error() {
      warn!(target: "quiz", ?op, error = %err, "Request failed");
    } else {
      info!(target: "quiz", ?op, error = %err, "Request rejected");
    }
    Self { status, message: err.user_message(lang, op) }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(ErrorOut { error: self.message })).into_response()
  }
}

pub fn status_for(err: &QuizError) -> StatusCode {
  match err {
    QuizError::NotInProgress => StatusCode::CONFLICT,
    QuizError::SavedResultNotFound => StatusCode::NOT_FOUND,
    QuizError::Storage(StoreError::InvalidProfile(_)) => StatusCode::BAD_REQUEST,
    e if e.is_client_error() => StatusCode::BAD_REQUEST,
    QuizError::Remote(_) | QuizError::OptionsUnavailable(_) | QuizError::Voice(_) => StatusCode::BAD_GATEWAY,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

async fn session(state: &AppState, profile: &str) -> Result<Arc<SessionHandle>, ApiError> {
  state.session(profile).await.map_err(|e| ApiError::new(e, Language::default(), Operation::Results))
}

/// Localize with the profile's current language. Call only after logic released the session lock.
async fn fail(handle: &SessionHandle, op: Operation, err: QuizError) -> ApiError {
  let lang = handle.quiz.lock().await.language();
  ApiError::new(err, lang, op)
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generative: state.model.is_some(), voice: state.live.is_some() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_quiz(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<QuizView>, ApiError> {
  let handle = session(&state, &profile).await?;
  Ok(Json(quiz_view(&state, &handle).await))
}

/// Start and restart share one handler: both reshuffle and clear everything.
#[instrument(level = "info", skip(state))]
pub async fn http_post_start(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<QuizView>, ApiError> {
  let handle = session(&state, &profile).await?;
  match start_quiz(&state, &handle).await {
    Ok(view) => Ok(Json(view)),
    Err(e) => Err(fail(&handle, Operation::Answer, e).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_exit(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<QuizView>, ApiError> {
  let handle = session(&state, &profile).await?;
  match exit_quiz(&state, &handle).await {
    Ok(view) => Ok(Json(view)),
    Err(e) => Err(fail(&handle, Operation::Answer, e).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_previous(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<QuizView>, ApiError> {
  let handle = session(&state, &profile).await?;
  match previous_question(&state, &handle).await {
    Ok(view) => Ok(Json(view)),
    Err(e) => Err(fail(&handle, Operation::Answer, e).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_options(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<OptionsOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match load_options(&state, &handle).await {
    Ok(out) => {
      info!(target: "quiz", id = %out.question.id, options = out.options.len(), local = out.local, "HTTP options served");
      Ok(Json(out))
    }
    Err(e) => Err(fail(&handle, Operation::Options, e).await),
  }
}

#[instrument(level = "info", skip(state, body), fields(score = body.score, remark_len = body.remark.len()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<AnswerOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match submit_answer(&state, &handle, body).await {
    Ok(out) => Ok(Json(out)),
    Err(e) => Err(fail(&handle, Operation::Answer, e).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_results(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<ResultsView>, ApiError> {
  let handle = session(&state, &profile).await?;
  Ok(Json(results_view(&state, &handle).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_report(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<Report>, ApiError> {
  let handle = session(&state, &profile).await?;
  match report_for(&state, &handle).await {
    Ok(report) => Ok(Json(report)),
    Err(e) => Err(fail(&handle, Operation::Report, e).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_save(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<SaveOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  let status = match save_current(&state, &handle).await {
    Ok(s) => s,
    Err(e) => return Err(fail(&handle, Operation::Results, e).await),
  };
  match load_saved(&state.store, &handle.profile).await {
    Ok(saved) => Ok(Json(SaveOut { status, saved })),
    Err(e) => Err(fail(&handle, Operation::Results, e.into()).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_saved(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<SavedOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match load_saved(&state.store, &handle.profile).await {
    Ok(saved) => Ok(Json(SavedOut { saved })),
    Err(e) => Err(fail(&handle, Operation::Results, e.into()).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_saved(
  State(state): State<Arc<AppState>>,
  Path((profile, timestamp)): Path<(String, i64)>,
) -> Result<Json<SavedOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  if let Err(e) = delete_saved(&state.store, &handle.profile, timestamp).await {
    return Err(fail(&handle, Operation::Results, e).await);
  }
  match load_saved(&state.store, &handle.profile).await {
    Ok(saved) => Ok(Json(SavedOut { saved })),
    Err(e) => Err(fail(&handle, Operation::Results, e.into()).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_share_link(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<ShareOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match share_current(&state, &handle).await {
    Ok(out) => Ok(Json(out)),
    Err(e) => Err(fail(&handle, Operation::Share, e).await),
  }
}

#[instrument(level = "info", skip(state, q), fields(param_len = q.results.len()))]
pub async fn http_get_shared(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SharedQuery>,
) -> Result<Json<ResultsView>, ApiError> {
  let lang = q.lang.unwrap_or_default();
  load_shared(&state, &q.results, lang)
    .map(Json)
    .map_err(|e| ApiError::new(e, lang, Operation::Share))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_export(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
  Query(q): Query<ExportQuery>,
) -> Result<Json<ExportOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match export_current(&state, &handle, q.report).await {
    Ok(text) => Ok(Json(ExportOut { text })),
    Err(e) => Err(fail(&handle, Operation::Results, e).await),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_settings(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
) -> Result<Json<SettingsOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match settings_for(&state, &handle).await {
    Ok(out) => Ok(Json(out)),
    Err(e) => Err(fail(&handle, Operation::Results, e).await),
  }
}

#[instrument(level = "info", skip(state, body), fields(language = ?body.language, tts = ?body.tts_enabled))]
pub async fn http_put_settings(
  State(state): State<Arc<AppState>>,
  Path(profile): Path<String>,
  Json(body): Json<SettingsIn>,
) -> Result<Json<SettingsOut>, ApiError> {
  let handle = session(&state, &profile).await?;
  match update_settings(&state, &handle, body).await {
    Ok(out) => Ok(Json(out)),
    Err(e) => Err(fail(&handle, Operation::Results, e).await),
  }
}
