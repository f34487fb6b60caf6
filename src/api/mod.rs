pub mod accounts;
pub mod author;
pub mod books;
pub mod catalog;
pub mod loan;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Claims;
use crate::models::user;
use crate::services::account_service;

/// Listing views show this many records per page.
pub const PAGE_SIZE: u64 = 10;

/// 1-based `?page=N` query, like the listing pages
#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
}

impl PageQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }
}

/// Resolve the authenticated user behind a set of claims.
pub(crate) async fn require_user(
    db: &DatabaseConnection,
    claims: &Claims,
) -> Result<user::Model, Response> {
    match account_service::find_by_username(db, &claims.sub).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Unknown user" })),
        )
            .into_response()),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response()),
    }
}

/// 403 unless the user holds the named permission.
pub(crate) async fn require_permission(
    db: &DatabaseConnection,
    user: &user::Model,
    permission: &str,
) -> Result<(), Response> {
    match account_service::has_permission(db, user.id, permission).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(
                "User {} lacks permission '{}'",
                user.username,
                permission
            );
            Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Permission denied" })),
            )
                .into_response())
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response()),
    }
}

pub fn app_router(db: DatabaseConnection) -> Router {
    Router::new()
        // Accounts
        .route("/accounts/login/", post(accounts::login))
        .route("/accounts/register/", post(accounts::register))
        .route("/accounts/me/", get(accounts::me))
        // Catalog landing page
        .route("/catalog/", get(catalog::index))
        // Books
        .route("/catalog/books/", get(books::list_books))
        .route(
            "/catalog/books/create/",
            get(books::book_form).post(books::create_book),
        )
        .route("/catalog/books/:id", get(books::get_book))
        .route("/catalog/books/:id/update/", post(books::update_book))
        .route("/catalog/books/:id/delete/", post(books::delete_book))
        // Authors
        .route("/catalog/authors/", get(author::list_authors))
        .route(
            "/catalog/authors/create/",
            get(author::author_form).post(author::create_author),
        )
        .route("/catalog/authors/:id", get(author::get_author))
        .route("/catalog/authors/:id/update/", post(author::update_author))
        .route("/catalog/authors/:id/delete/", post(author::delete_author))
        // Genres & languages (book form vocabularies)
        .route("/catalog/genres/", get(catalog::list_genres))
        .route("/catalog/genres/create/", post(catalog::create_genre))
        .route("/catalog/languages/", get(catalog::list_languages))
        .route("/catalog/languages/create/", post(catalog::create_language))
        // Borrowing
        .route("/catalog/my-books/", get(loan::my_books))
        .route("/catalog/all-borrowed/", get(loan::all_borrowed))
        .route(
            "/catalog/book/:id/renew/",
            get(loan::renew_form).post(loan::renew_submit),
        )
        .route("/catalog/book/:id/return/", post(loan::mark_returned))
        .route("/catalog/book/:id/borrow/", post(loan::borrow))
        .with_state(db)
}
