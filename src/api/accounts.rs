use crate::auth::{create_jwt, hash_password, verify_password, Claims};
use crate::models::user::{self, Entity as User};
use crate::services::account_service;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

pub async fn login(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    tracing::info!("Login attempt for user: {}", payload.username);

    let user = match User::find()
        .filter(user::Column::Username.eq(&payload.username))
        .one(&db)
        .await
    {
        Ok(Some(u)) => u,
        _ => {
            tracing::warn!("User not found: {}", payload.username);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response();
        }
    };

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {
            let token = match create_jwt(&user.username, &user.role) {
                Ok(t) => t,
                Err(e) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": e })),
                    )
                        .into_response()
                }
            };
            (StatusCode::OK, Json(json!({ "token": token }))).into_response()
        }
        _ => {
            tracing::warn!("Password verification failed for user: {}", user.username);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
}

/// Create a user account. The first account registered becomes the
/// librarian and receives the full permission set.
pub async fn register(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Username and password are required" })),
        )
            .into_response();
    }

    let existing = User::find()
        .filter(user::Column::Username.eq(&payload.username))
        .one(&db)
        .await
        .unwrap_or(None);
    if existing.is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Username already taken" })),
        )
            .into_response();
    }

    let first_account = matches!(User::find().count(&db).await, Ok(0));

    let password_hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e })),
            )
                .into_response()
        }
    };

    let role = if first_account { "librarian" } else { "member" };
    let now = chrono::Utc::now().to_rfc3339();

    let user = user::ActiveModel {
        username: Set(payload.username),
        password_hash: Set(password_hash),
        role: Set(role.to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    match user.insert(&db).await {
        Ok(model) => {
            if first_account {
                if let Err(e) = account_service::grant_librarian_permissions(&db, model.id).await {
                    tracing::error!("Failed to grant librarian permissions: {}", e);
                }
            }
            (
                StatusCode::CREATED,
                Json(json!({ "message": "Account created", "user": model })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn me(State(db): State<DatabaseConnection>, claims: Claims) -> impl IntoResponse {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let permissions = account_service::permissions_of(&db, user.id)
        .await
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({ "user": user, "permissions": permissions })),
    )
        .into_response()
}
