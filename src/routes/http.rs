//! HTTP endpoint handlers. These are thin wrappers that forward to the state
//! layer (or the turn logic) and let `AppError` map failures onto responses.

use axum::{
  extract::{Path, Query, State},
  http::{header, StatusCode},
  response::IntoResponse,
  Json,
};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::domain::{GameSettings, Question, RecordKind, Student};
use crate::error::AppError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

//
// Question bank
//

#[instrument(level = "info", skip(state))]
pub async fn http_list_questions(State(state): State<AppState>) -> Json<Vec<Question>> {
  Json(state.list_questions().await)
}

#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len()))]
pub async fn http_create_question(
  State(state): State<AppState>,
  Json(body): Json<QuestionIn>,
) -> Result<Json<Question>, AppError> {
  let created = state.create_question(body.question, body.answer, body.points).await?;
  info!(target: "game", id = %created.id, "HTTP question created");
  Ok(Json(created))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_update_question(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<QuestionIn>,
) -> Result<Json<Question>, AppError> {
  let updated = state.update_question(&id, body.question, body.answer, body.points).await?;
  Ok(Json(updated))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_question(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
  state.delete_question(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

//
// Roster
//

#[instrument(level = "info", skip(state))]
pub async fn http_list_students(
  State(state): State<AppState>,
  Query(q): Query<StudentListQuery>,
) -> Json<Vec<Student>> {
  Json(state.list_students(q.sort, q.order).await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_student(
  State(state): State<AppState>,
  Json(body): Json<StudentIn>,
) -> Result<Json<Student>, AppError> {
  let created = state.create_student(body.name, body.score).await?;
  info!(target: "game", id = %created.id, "HTTP student created");
  Ok(Json(created))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_update_student(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<StudentIn>,
) -> Result<Json<Student>, AppError> {
  let updated = state.update_student(&id, body.name, body.score).await?;
  Ok(Json(updated))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_student(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
  state.delete_student(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, body), fields(%id, points = body.points))]
pub async fn http_add_points(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<AddPointsIn>,
) -> Result<Json<Student>, AppError> {
  Ok(Json(state.add_points(&id, body.points).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset_scores(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
  let reset = state.reset_scores().await?;
  Ok(Json(json!({ "reset": reset })))
}

//
// Export / import
//

#[instrument(level = "info", skip(state))]
pub async fn http_export_questions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
  let rows = state.list_questions().await;
  info!(target: "import", rows = rows.len(), "question export served");
  attachment("questions.json", &rows)
}

#[instrument(level = "info", skip(state))]
pub async fn http_export_students(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
  let rows = state.list_students(None, None).await;
  info!(target: "import", rows = rows.len(), "student export served");
  attachment("students.json", &rows)
}

/// The export downloads are plain JSON arrays, re-importable as-is.
fn attachment<T: serde::Serialize>(filename: &str, rows: &T) -> Result<impl IntoResponse, AppError> {
  let body = serde_json::to_string_pretty(rows)
    .map_err(|e| AppError::Persistence(format!("export serialization: {}", e)))?;
  Ok((
    [
      (header::CONTENT_TYPE, "application/json".to_string()),
      (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
    ],
    body,
  ))
}

#[instrument(level = "info", skip(state, payload), fields(bytes = payload.len()))]
pub async fn http_import_questions(
  State(state): State<AppState>,
  payload: String,
) -> Result<Json<ImportOut>, AppError> {
  debug!(target: "import", head = %trunc_for_log(&payload, 200), "question import received");
  Ok(Json(state.begin_import(RecordKind::Question, &payload).await?))
}

#[instrument(level = "info", skip(state, payload), fields(bytes = payload.len()))]
pub async fn http_import_students(
  State(state): State<AppState>,
  payload: String,
) -> Result<Json<ImportOut>, AppError> {
  debug!(target: "import", head = %trunc_for_log(&payload, 200), "student import received");
  Ok(Json(state.begin_import(RecordKind::Student, &payload).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_import_status(State(state): State<AppState>) -> Result<Json<ImportStatusOut>, AppError> {
  Ok(Json(state.import_status().await?))
}

#[instrument(level = "info", skip(state, body), fields(groups = body.resolved.len()))]
pub async fn http_resolve_duplicates(
  State(state): State<AppState>,
  Json(body): Json<DuplicateResolutionIn>,
) -> Result<Json<ImportOut>, AppError> {
  Ok(Json(state.resolve_import_duplicates(body.resolved).await?))
}

#[instrument(level = "info", skip(state, body), fields(resolution = ?body.resolution))]
pub async fn http_resolve_conflict(
  State(state): State<AppState>,
  Json(body): Json<ConflictResolutionIn>,
) -> Result<Json<ImportOut>, AppError> {
  Ok(Json(state.resolve_import_conflict(body.resolution).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_cancel_import(State(state): State<AppState>) -> Result<StatusCode, AppError> {
  state.cancel_import().await?;
  Ok(StatusCode::NO_CONTENT)
}

//
// Settings + game
//

#[instrument(level = "info", skip(state))]
pub async fn http_get_settings(State(state): State<AppState>) -> Json<GameSettings> {
  Json(state.settings().await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_put_settings(
  State(state): State<AppState>,
  Json(body): Json<GameSettings>,
) -> Json<GameSettings> {
  Json(state.set_dice_count(body.num_dice).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_game_state(State(state): State<AppState>) -> Json<GameStateOut> {
  Json(state.game_snapshot().await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_roll(State(state): State<AppState>) -> Json<RollOut> {
  Json(logic::do_roll(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.answer.len()))]
pub async fn http_submit_answer(
  State(state): State<AppState>,
  Json(body): Json<AnswerIn>,
) -> Json<AnswerSubmitOut> {
  Json(logic::do_submit_answer(&state, &body.answer).await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_select_student(
  State(state): State<AppState>,
  Json(body): Json<SelectStudentIn>,
) -> Result<StatusCode, AppError> {
  state.select_student(body.student_id).await?;
  Ok(StatusCode::NO_CONTENT)
}
