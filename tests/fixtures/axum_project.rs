// @openapi
use crate::models::{AuditedUser, CreateUserRequest, ListQuery, User, UserId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

/// Lists users, newest first.
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = db.list_users(query.page).await?;
    Ok(Json(users))
}

/// Creates a user.
/// @tag accounts, admin
pub async fn create_user_handler(
    admin: AdminUser,
    Json(body): Json<CreateUserRequest>,
) -> impl IntoResponse {
    if body.email.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "email required"})),
        )
            .into_response();
    }
    let user: User = db.create_user(&body).await;
    (StatusCode::CREATED, Json(user)).into_response()
}

/// Fetches one user.
pub async fn get_user(Path(id): Path<UserId>) -> Json<User> {
    let user = load_user(id);
    Json(user)
}

/// Usage statistics for the dashboard.
pub async fn user_stats(State(state): State<AppState>) -> impl IntoResponse {
    let mut stats = json!({"total": 42, "active_ratio": 0.5, "healthy": true});
    stats["computed_at"] = json!(Utc::now());
    stats["total"] = json!("overwritten");
    Json(stats)
}

/// Deletes a user.
pub async fn delete_user_handler(
    ctx: &mut Context,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    require_owner(ctx, id)?;
    db.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Audit trail of a user.
pub async fn audit(Path(id): Path<u64>) -> Json<AuditedUser> {
    Json(load_audit(id))
}

fn load_user(id: UserId) -> User {
    todo!()
}
