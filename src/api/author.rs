use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::NaiveDate;
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

use super::{PageQuery, PAGE_SIZE};
use crate::auth::Claims;
use crate::models::author::{self, Entity as Author};
use crate::models::book::{self, Entity as Book};

pub async fn list_authors(
    State(db): State<DatabaseConnection>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let paginator = Author::find()
        .order_by_asc(author::Column::LastName)
        .order_by_asc(author::Column::FirstName)
        .paginate(&db, PAGE_SIZE);

    let total = paginator
        .num_items()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let num_pages = paginator
        .num_pages()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let page = query.page();
    let authors = paginator
        .fetch_page(page - 1)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "authors": authors,
        "page": page,
        "num_pages": num_pages,
        "total": total,
        "is_paginated": num_pages > 1,
    })))
}

pub async fn get_author(
    State(db): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    let found = Author::find_by_id(id).one(&db).await.unwrap_or(None);

    let Some(found) = found else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Author not found" })),
        )
            .into_response();
    };

    let books = Book::find()
        .filter(book::Column::AuthorId.eq(found.id))
        .order_by_asc(book::Column::Title)
        .all(&db)
        .await
        .unwrap_or_default();

    let display_name = found.display_name();

    (
        StatusCode::OK,
        Json(json!({
            "author": found,
            "display_name": display_name,
            "books": books,
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct AuthorForm {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub date_of_death: Option<String>,
}

fn validate_author_form(form: &AuthorForm) -> Result<(), Response> {
    let mut errors = serde_json::Map::new();

    if form.first_name.trim().is_empty() {
        errors.insert("first_name".into(), "This field is required.".into());
    }
    if form.last_name.trim().is_empty() {
        errors.insert("last_name".into(), "This field is required.".into());
    }
    for (field, value) in [
        ("date_of_birth", &form.date_of_birth),
        ("date_of_death", &form.date_of_death),
    ] {
        if let Some(value) = value {
            if !value.is_empty() && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
                errors.insert(field.into(), "Enter a valid date.".into());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response())
    }
}

/// Blank author form with its pre-filled defaults.
pub async fn author_form(State(db): State<DatabaseConnection>, claims: Claims) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "add_author").await {
        return resp;
    }

    (
        StatusCode::OK,
        Json(json!({
            "form": {
                "initial": { "date_of_death": "2000-01-12" }
            }
        })),
    )
        .into_response()
}

pub async fn create_author(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<AuthorForm>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "add_author").await {
        return resp;
    }
    if let Err(resp) = validate_author_form(&payload) {
        return resp;
    }

    let now = chrono::Utc::now().to_rfc3339();
    let new_author = author::ActiveModel {
        first_name: Set(payload.first_name.trim().to_string()),
        last_name: Set(payload.last_name.trim().to_string()),
        date_of_birth: Set(payload.date_of_birth.filter(|d| !d.is_empty())),
        date_of_death: Set(payload.date_of_death.filter(|d| !d.is_empty())),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_author.insert(&db).await {
        Ok(model) => {
            tracing::info!("Author {} created: {}", model.id, model.display_name());
            Redirect::to(&format!("/catalog/authors/{}", model.id)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn update_author(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<AuthorForm>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "change_author").await {
        return resp;
    }
    if let Err(resp) = validate_author_form(&payload) {
        return resp;
    }

    let found = Author::find_by_id(id).one(&db).await.unwrap_or(None);
    let Some(found) = found else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Author not found" })),
        )
            .into_response();
    };

    let mut active: author::ActiveModel = found.into();
    active.first_name = Set(payload.first_name.trim().to_string());
    active.last_name = Set(payload.last_name.trim().to_string());
    active.date_of_birth = Set(payload.date_of_birth.filter(|d| !d.is_empty()));
    active.date_of_death = Set(payload.date_of_death.filter(|d| !d.is_empty()));
    active.updated_at = Set(chrono::Utc::now().to_rfc3339());

    match active.update(&db).await {
        Ok(model) => Redirect::to(&format!("/catalog/authors/{}", model.id)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn delete_author(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "delete_author").await {
        return resp;
    }

    let found = Author::find_by_id(id).one(&db).await.unwrap_or(None);
    let Some(found) = found else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Author not found" })),
        )
            .into_response();
    };

    // Refuse while books still reference the author
    let num_books = Book::find()
        .filter(book::Column::AuthorId.eq(found.id))
        .count(&db)
        .await
        .unwrap_or(0);
    if num_books > 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Cannot delete an author with books in the catalog"
            })),
        )
            .into_response();
    }

    match found.delete(&db).await {
        Ok(_) => Redirect::to("/catalog/authors/").into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
