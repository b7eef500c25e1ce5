//! HTTP API for accounts, the team roster, likes, notices, contact messages
//! and solving

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use creatorgpt::contact::{FAILED_MESSAGE, SENT_MESSAGE};
use creatorgpt::likes::{self, ToggleOutcome};
use creatorgpt::solver::ImageAttachment;
use creatorgpt::{
    format_count, AuthError, ContactForm, ContactStatus, DetailLevel, Error, LikeCounter, NoticeBoard,
    Solver, Subject, TeamMember, User, SUBJECTS, TEAM,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tokens::bearer_token;
use crate::AppState;

/// Extra room over the base64-encoded image for the rest of a `/solve` body
const BODY_OVERHEAD: usize = 64 * 1024;

/// Create the API router
pub fn router(state: Arc<AppState>) -> Router {
    let image_limit = usize::try_from(state.config.max_image_bytes).unwrap_or(usize::MAX);
    let body_limit = (image_limit.saturating_add(2) / 3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD);

    Router::new()
        .route("/health", get(health))
        .route("/subjects", get(list_subjects))
        .route("/team", get(list_team))
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/likes/{subject}", get(get_likes))
        .route("/likes/{subject}/toggle", post(toggle_like))
        .route("/notice", get(get_notice))
        .route("/contact", post(submit_contact))
        .route("/solve", post(solve))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: message.into() }))
}

fn auth_error(err: &AuthError) -> ApiError {
    let status = match err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::EmailAlreadyInUse => StatusCode::CONFLICT,
        AuthError::WeakPassword | AuthError::InvalidEmail => StatusCode::BAD_REQUEST,
        AuthError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.user_message())
}

/// The signed-in user, if the request carries a live token
fn current_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    bearer_token(headers).and_then(|token| state.tokens.resolve(token))
}

fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    current_user(state, headers).ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Sign in required"))
}

/// Health check endpoint
async fn health() -> &'static str {
    "ok"
}

/// Subject catalog
async fn list_subjects() -> Json<Vec<Subject>> {
    Json(SUBJECTS.to_vec())
}

/// Request body for sign-up and sign-in
#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

/// Response for a successful sign-up or sign-in
#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user: User,
}

/// Register a new account and sign in
async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let user = state
        .accounts
        .create(&req.email, &req.password)
        .await
        .map_err(|e| auth_error(&e))?;

    let token = state.tokens.issue(user.clone());
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// Sign in with email and password
async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .accounts
        .verify(&req.email, &req.password)
        .await
        .map_err(|e| {
            warn!(email = %req.email, error = %e, "Sign-in failed");
            auth_error(&e)
        })?;

    info!(uid = %user.uid, "Signed in");
    let token = state.tokens.issue(user.clone());
    Ok(Json(AuthResponse { token, user }))
}

/// Revoke the caller's token
async fn sign_out(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let user = bearer_token(&headers)
        .and_then(|token| state.tokens.revoke(token))
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Sign in required"))?;

    info!(uid = %user.uid, "Signed out");
    Ok(StatusCode::NO_CONTENT)
}

/// Like state for one subject
#[derive(Debug, Serialize)]
struct LikesResponse {
    count: u64,
    is_liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<ToggleOutcome>,
}

impl LikesResponse {
    fn from_counter(counter: &LikeCounter, outcome: Option<ToggleOutcome>) -> Self {
        let like_state = counter.state();
        Self { count: like_state.count, is_liked: like_state.is_liked, outcome }
    }
}

fn new_counter(state: &AppState, subject: &str) -> LikeCounter {
    LikeCounter::new(state.store.clone(), subject).with_max_attempts(state.config.transaction_max_attempts)
}

fn store_error(err: &Error) -> ApiError {
    match err {
        Error::Document(_) | Error::Validation(_) => api_error(StatusCode::BAD_REQUEST, err.to_string()),
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn team_member(id: &str) -> Result<&'static TeamMember, ApiError> {
    TeamMember::find(id).ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown team member: {id}")))
}

/// A roster entry with its like count
#[derive(Debug, Serialize)]
struct TeamEntry {
    #[serde(flatten)]
    member: &'static TeamMember,
    likes: u64,
    likes_display: String,
}

/// Team roster, in display order
async fn list_team(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TeamEntry>>, ApiError> {
    let mut entries = Vec::with_capacity(TEAM.len());
    for member in &TEAM {
        let count = likes::fetch_count(&state.store, member.id)
            .await
            .map_err(|e| store_error(&e))?;
        entries.push(TeamEntry { member, likes: count, likes_display: format_count(count) });
    }
    Ok(Json(entries))
}

/// Like count, plus whether the caller likes the member when signed in
async fn get_likes(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LikesResponse>, ApiError> {
    let member = team_member(&subject)?;

    let Some(user) = current_user(&state, &headers) else {
        let count = likes::fetch_count(&state.store, member.id)
            .await
            .map_err(|e| store_error(&e))?;
        return Ok(Json(LikesResponse { count, is_liked: false, outcome: None }));
    };

    let mut counter = new_counter(&state, member.id);
    counter.load(&user.uid).await.map_err(|e| store_error(&e))?;
    Ok(Json(LikesResponse::from_counter(&counter, None)))
}

/// Like or unlike a team member as the caller.
///
/// Answers `409` with outcome `skipped` while the caller already has a toggle
/// running for the same member. Nothing is toggled if the caller's current
/// state cannot be read.
async fn toggle_like(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<LikesResponse>), ApiError> {
    let user = require_user(&state, &headers)?;
    let member = team_member(&subject)?;
    let mut counter = new_counter(&state, member.id);

    let Some(_pending) = state.pending_toggles.begin(&user.uid, member.id) else {
        debug!(uid = %user.uid, subject = member.id, "Toggle already pending");
        counter.load(&user.uid).await.map_err(|e| store_error(&e))?;
        let body = LikesResponse::from_counter(&counter, Some(ToggleOutcome::Skipped));
        return Ok((StatusCode::CONFLICT, Json(body)));
    };

    counter.load(&user.uid).await.map_err(|e| store_error(&e))?;
    let outcome = counter.toggle(Some(user.uid.as_str())).await;
    let status = match outcome {
        ToggleOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };

    Ok((status, Json(LikesResponse::from_counter(&counter, Some(outcome)))))
}

/// Current notice banner
#[derive(Debug, Serialize)]
struct NoticeResponse {
    text: Option<String>,
}

async fn get_notice(State(state): State<Arc<AppState>>) -> Result<Json<NoticeResponse>, ApiError> {
    let text = NoticeBoard::fetch(&state.store).await.map_err(|e| store_error(&e))?;
    Ok(Json(NoticeResponse { text }))
}

/// Response for a stored contact message
#[derive(Debug, Serialize)]
struct ContactResponse {
    message: &'static str,
}

/// Store a contact message
async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(mut form): Json<ContactForm>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiError> {
    match form.submit(&state.store).await {
        ContactStatus::Sent => Ok((StatusCode::CREATED, Json(ContactResponse { message: SENT_MESSAGE }))),
        ContactStatus::Incomplete => Err(api_error(StatusCode::BAD_REQUEST, "All fields are required.")),
        ContactStatus::Failed => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, FAILED_MESSAGE)),
    }
}

/// Inline image in a `/solve` request
#[derive(Debug, Deserialize)]
struct ImagePayload {
    /// Base64-encoded bytes
    data: String,
    mime_type: String,
}

/// Request body for `/solve`
#[derive(Debug, Deserialize)]
struct SolveRequest {
    subject: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    detail: DetailLevel,
    image: Option<ImagePayload>,
}

/// Generated answer
#[derive(Debug, Serialize)]
struct SolveResponse {
    result: String,
}

/// Answer a question, optionally about an attached image
async fn solve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SolveRequest>,
) -> Result<Json<SolveResponse>, ApiError> {
    let user = require_user(&state, &headers)?;

    let mut solver = Solver::new(state.generator.clone()).with_max_image_bytes(state.config.max_image_bytes);
    solver
        .select_subject(&req.subject)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    solver.set_detail(req.detail);
    solver.set_question(req.question);

    if let Some(image) = req.image {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(image.data.as_bytes())
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid image data"))?;
        let attachment = ImageAttachment::from_bytes(bytes, image.mime_type, state.config.max_image_bytes)
            .map_err(|e| match e {
                Error::ImageTooLarge { .. } => api_error(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
                other => api_error(StatusCode::BAD_REQUEST, other.to_string()),
            })?;
        solver.set_image(attachment);
    }

    if !solver.can_solve() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Enter a question or attach an image."));
    }

    info!(uid = %user.uid, subject = %req.subject, "Solving question");
    let result = solver.solve().await.unwrap_or_default().to_string();
    Ok(Json(SolveResponse { result }))
}
