use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Local;
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::{PageQuery, PAGE_SIZE};
use crate::auth::Claims;
use crate::models::author::{self, Entity as Author};
use crate::models::book::{self, Entity as Book};
use crate::models::book_genre::{self, Entity as BookGenre};
use crate::models::book_instance::{self, Entity as BookInstance};
use crate::models::genre::Entity as Genre;
use crate::models::language::Entity as Language;

pub async fn list_books(
    State(db): State<DatabaseConnection>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let paginator = Book::find()
        .order_by_asc(book::Column::Title)
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
    let books = paginator
        .fetch_page(page - 1)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // Resolve author names for the list rows
    let author_ids: Vec<i32> = books.iter().map(|b| b.author_id).collect();
    let mut author_names: HashMap<i32, String> = HashMap::new();
    if !author_ids.is_empty() {
        for a in Author::find()
            .filter(author::Column::Id.is_in(author_ids))
            .all(&db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        {
            author_names.insert(a.id, a.display_name());
        }
    }

    let rows: Vec<serde_json::Value> = books
        .into_iter()
        .map(|b| {
            let author_name = author_names
                .get(&b.author_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            json!({
                "id": b.id,
                "title": b.title,
                "summary": b.summary,
                "isbn": b.isbn,
                "author_id": b.author_id,
                "author_name": author_name,
                "language_id": b.language_id,
            })
        })
        .collect();

    Ok(Json(json!({
        "books": rows,
        "page": page,
        "num_pages": num_pages,
        "total": total,
        "is_paginated": num_pages > 1,
    })))
}

pub async fn get_book(
    State(db): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    let found = Book::find_by_id(id).one(&db).await.unwrap_or(None);

    let Some(found) = found else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Book not found" })),
        )
            .into_response();
    };

    let book_author = Author::find_by_id(found.author_id)
        .one(&db)
        .await
        .unwrap_or(None);
    let book_language = Language::find_by_id(found.language_id)
        .one(&db)
        .await
        .unwrap_or(None);
    let genres = found
        .find_related(Genre)
        .all(&db)
        .await
        .unwrap_or_default();

    let today = Local::now().date_naive();
    let instances: Vec<serde_json::Value> = found
        .find_related(BookInstance)
        .order_by_asc(book_instance::Column::DueBack)
        .all(&db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|copy| {
            let is_overdue = copy.is_overdue(today);
            json!({
                "id": copy.id,
                "imprint": copy.imprint,
                "status": copy.status,
                "due_back": copy.due_back,
                "borrower_id": copy.borrower_id,
                "is_overdue": is_overdue,
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "book": found,
            "author": book_author,
            "language": book_language,
            "genres": genres,
            "instances": instances,
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct BookForm {
    pub title: String,
    pub summary: Option<String>,
    pub isbn: Option<String>,
    pub author_id: i32,
    pub language_id: i32,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
}

/// Validate the form's references; returns an error response when the
/// title is blank or the author/language don't exist.
async fn validate_book_form(db: &DatabaseConnection, form: &BookForm) -> Result<(), Response> {
    let mut errors = serde_json::Map::new();

    if form.title.trim().is_empty() {
        errors.insert("title".into(), "This field is required.".into());
    }

    let author_exists = Author::find_by_id(form.author_id)
        .one(db)
        .await
        .unwrap_or(None)
        .is_some();
    if !author_exists {
        errors.insert("author_id".into(), "Unknown author.".into());
    }

    let language_exists = Language::find_by_id(form.language_id)
        .one(db)
        .await
        .unwrap_or(None)
        .is_some();
    if !language_exists {
        errors.insert("language_id".into(), "Unknown language.".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response())
    }
}

async fn set_book_genres(
    db: &DatabaseConnection,
    book_id: i32,
    genre_ids: &[i32],
) -> Result<(), DbErr> {
    BookGenre::delete_many()
        .filter(book_genre::Column::BookId.eq(book_id))
        .exec(db)
        .await?;

    for genre_id in genre_ids {
        let link = book_genre::ActiveModel {
            book_id: Set(book_id),
            genre_id: Set(*genre_id),
        };
        BookGenre::insert(link)
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([
                    book_genre::Column::BookId,
                    book_genre::Column::GenreId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec(db)
            .await?;
    }

    Ok(())
}

/// Blank book form: the vocabularies a client needs to render it.
pub async fn book_form(State(db): State<DatabaseConnection>, claims: Claims) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "add_book").await {
        return resp;
    }

    let authors = Author::find()
        .order_by_asc(author::Column::LastName)
        .all(&db)
        .await
        .unwrap_or_default();
    let genres = Genre::find().all(&db).await.unwrap_or_default();
    let languages = Language::find().all(&db).await.unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({
            "form": {
                "authors": authors,
                "genres": genres,
                "languages": languages,
            }
        })),
    )
        .into_response()
}

pub async fn create_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<BookForm>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "add_book").await {
        return resp;
    }
    if let Err(resp) = validate_book_form(&db, &payload).await {
        return resp;
    }

    let now = chrono::Utc::now().to_rfc3339();
    let new_book = book::ActiveModel {
        title: Set(payload.title.trim().to_string()),
        summary: Set(payload.summary.filter(|s| !s.is_empty())),
        isbn: Set(payload.isbn.filter(|s| !s.is_empty())),
        author_id: Set(payload.author_id),
        language_id: Set(payload.language_id),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_book.insert(&db).await {
        Ok(model) => {
            if let Err(e) = set_book_genres(&db, model.id, &payload.genre_ids).await {
                tracing::error!("Failed to link genres for book {}: {}", model.id, e);
            }
            tracing::info!("Book {} created: {}", model.id, model.title);
            Redirect::to(&format!("/catalog/books/{}", model.id)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn update_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<BookForm>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "change_book").await {
        return resp;
    }
    if let Err(resp) = validate_book_form(&db, &payload).await {
        return resp;
    }

    let found = Book::find_by_id(id).one(&db).await.unwrap_or(None);
    let Some(found) = found else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Book not found" })),
        )
            .into_response();
    };

    let mut active: book::ActiveModel = found.into();
    active.title = Set(payload.title.trim().to_string());
    active.summary = Set(payload.summary.filter(|s| !s.is_empty()));
    active.isbn = Set(payload.isbn.filter(|s| !s.is_empty()));
    active.author_id = Set(payload.author_id);
    active.language_id = Set(payload.language_id);
    active.updated_at = Set(chrono::Utc::now().to_rfc3339());

    match active.update(&db).await {
        Ok(model) => {
            if let Err(e) = set_book_genres(&db, model.id, &payload.genre_ids).await {
                tracing::error!("Failed to link genres for book {}: {}", model.id, e);
            }
            Redirect::to(&format!("/catalog/books/{}", model.id)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn delete_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "delete_book").await {
        return resp;
    }

    let found = Book::find_by_id(id).one(&db).await.unwrap_or(None);
    let Some(found) = found else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Book not found" })),
        )
            .into_response();
    };

    match found.delete(&db).await {
        Ok(_) => Redirect::to("/catalog/books/").into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
