use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sea_orm::*;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Claims;
use crate::models::author::Entity as Author;
use crate::models::book::Entity as Book;
use crate::models::book_instance::{self, Entity as BookInstance};
use crate::models::genre::{self, Entity as Genre};
use crate::models::language::{self, Entity as Language};

/// Landing page summary: what the catalog holds right now.
pub async fn index(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let num_books = Book::find()
        .count(&db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let num_instances = BookInstance::find()
        .count(&db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let num_instances_available = BookInstance::find()
        .filter(book_instance::Column::Status.eq("available"))
        .count(&db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let num_authors = Author::find()
        .count(&db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let num_genres = Genre::find()
        .count(&db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "num_books": num_books,
        "num_instances": num_instances,
        "num_instances_available": num_instances_available,
        "num_authors": num_authors,
        "num_genres": num_genres,
    })))
}

pub async fn list_genres(State(db): State<DatabaseConnection>) -> impl IntoResponse {
    match Genre::find().order_by_asc(genre::Column::Name).all(&db).await {
        Ok(genres) => (StatusCode::OK, Json(json!({ "genres": genres }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct CreateNameRequest {
    name: String,
}

pub async fn create_genre(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<CreateNameRequest>,
) -> impl IntoResponse {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "add_book").await {
        return resp;
    }

    if payload.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": { "name": "This field is required." } })),
        )
            .into_response();
    }

    let now = chrono::Utc::now().to_rfc3339();
    let new_genre = genre::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_genre.insert(&db).await {
        Ok(model) => (StatusCode::CREATED, Json(json!({ "genre": model }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn list_languages(State(db): State<DatabaseConnection>) -> impl IntoResponse {
    match Language::find()
        .order_by_asc(language::Column::Name)
        .all(&db)
        .await
    {
        Ok(languages) => (StatusCode::OK, Json(json!({ "languages": languages }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn create_language(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<CreateNameRequest>,
) -> impl IntoResponse {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "add_book").await {
        return resp;
    }

    if payload.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": { "name": "This field is required." } })),
        )
            .into_response();
    }

    let now = chrono::Utc::now().to_rfc3339();
    let new_language = language::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_language.insert(&db).await {
        Ok(model) => (StatusCode::CREATED, Json(json!({ "language": model }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
